//! Remote URL parsing: SSH (`git@host:owner/repo`) and HTTPS
//! (`https://host/owner/repo`) forms, optional `.git` suffix.

use crate::error::ContextError;
use once_cell::sync::Lazy;
use regex::Regex;

/// Owner/name/host extracted from a remote URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRepo {
    pub owner: String,
    pub name: String,
    pub host: String,
}

static SSH_RE: Lazy<Regex> = Lazy::new(|| {
    // `git@github.com:owner/repo(.git)` and `ssh://git@github.com(:port)/owner/repo(.git)`
    Regex::new(r"^(?:ssh://)?[A-Za-z0-9._-]+@(?P<host>[A-Za-z0-9._-]+)(?::\d+)?[:/](?P<path>.+)$")
        .expect("ssh remote regex")
});

static HTTPS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https?://(?P<host>[A-Za-z0-9._-]+(?::\d+)?)/(?P<path>.+)$")
        .expect("https remote regex")
});

pub fn parse_remote_url(url: &str) -> Result<RemoteRepo, ContextError> {
    let url = url.trim();
    let malformed = || ContextError::MalformedUrl {
        url: url.to_string(),
    };

    let captures = SSH_RE
        .captures(url)
        .or_else(|| HTTPS_RE.captures(url))
        .ok_or_else(malformed)?;

    let host = captures["host"]
        .split(':')
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    let path = captures["path"].trim_matches('/');
    let path = path.strip_suffix(".git").unwrap_or(path);

    let mut segments = path.split('/').filter(|s| !s.is_empty());
    let owner = segments.next().ok_or_else(malformed)?;
    let name = segments.next().ok_or_else(malformed)?;
    // `host/owner/repo/extra` is not a repository URL.
    if segments.next().is_some() {
        return Err(malformed());
    }
    if owner.is_empty() || name.is_empty() || host.is_empty() {
        return Err(malformed());
    }

    Ok(RemoteRepo {
        owner: owner.to_string(),
        name: name.to_string(),
        host,
    })
}
