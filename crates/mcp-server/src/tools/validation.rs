//! Parameter constraint checks shared by the tool surface. Pure functions:
//! raw value in, validated value or a message naming the parameter and the
//! constraint out.

use crate::client::{ListQuery, RepoSlug, StateFilter};

pub const MIN_LIMIT: u32 = 1;
pub const MAX_LIMIT: u32 = 100;
pub const DEFAULT_LIMIT: u32 = 30;

/// `owner/repo`, both segments non-empty, forge-safe charset.
pub fn parse_repo_slug(raw: &str) -> Result<RepoSlug, String> {
    let malformed =
        || format!("repository must be in 'owner/repo' form, got '{raw}'");

    let mut parts = raw.split('/');
    let (Some(owner), Some(name), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(malformed());
    };
    if owner.is_empty() || name.is_empty() {
        return Err(malformed());
    }
    let valid_segment = |s: &str| {
        s.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    };
    if !valid_segment(owner) || !valid_segment(name) {
        return Err(malformed());
    }
    Ok(RepoSlug {
        owner: owner.to_string(),
        name: name.to_string(),
    })
}

pub fn parse_state(raw: Option<&str>) -> Result<StateFilter, String> {
    match raw {
        None => Ok(StateFilter::default()),
        Some("open") => Ok(StateFilter::Open),
        Some("closed") => Ok(StateFilter::Closed),
        Some("all") => Ok(StateFilter::All),
        Some(other) => Err(format!(
            "state must be one of 'open', 'closed', 'all', got '{other}'"
        )),
    }
}

pub fn check_limit(limit: Option<u32>) -> Result<u32, String> {
    let limit = limit.unwrap_or(DEFAULT_LIMIT);
    if !(MIN_LIMIT..=MAX_LIMIT).contains(&limit) {
        return Err(format!(
            "limit must be between {MIN_LIMIT} and {MAX_LIMIT}, got {limit}"
        ));
    }
    Ok(limit)
}

pub fn check_number(number: u64) -> Result<u64, String> {
    if number < 1 {
        return Err(format!("number must be a positive issue/PR number, got {number}"));
    }
    Ok(number)
}

/// Builds the validated list window out of the raw optional params.
pub fn list_query(
    state: Option<&str>,
    limit: Option<u32>,
    offset: Option<u32>,
) -> Result<ListQuery, String> {
    Ok(ListQuery {
        state: parse_state(state)?,
        limit: check_limit(limit)?,
        offset: offset.unwrap_or(0),
    })
}
