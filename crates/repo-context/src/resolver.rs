//! Cached repository-identity resolution.
//!
//! Per-key lifecycle: `Unresolved -> Resolving -> {Resolved, Failed}`.
//! `Resolved` entries live until the TTL elapses or an explicit
//! `invalidate`; `Failed` results are never stored, so every call after a
//! failure re-attempts detection.

use crate::error::{ContextError, Result};
use crate::probe::RemoteProbe;
use crate::remote::parse_remote_url;
use forgelink_flightcache::FlightCache;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::time::Duration;

/// A resolved repository identity.
#[derive(Debug, Clone, PartialEq)]
pub struct RepoContext {
    pub owner: String,
    pub name: String,
    pub remote_url: String,
    pub resolved_at: SystemTime,
}

impl RepoContext {
    /// `owner/name` slug form.
    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

pub struct RepoContextResolver {
    probe: Arc<dyn RemoteProbe>,
    host: String,
    cache: FlightCache<PathBuf, RepoContext, ContextError>,
}

impl RepoContextResolver {
    pub fn new(probe: Arc<dyn RemoteProbe>, host: impl Into<String>, ttl: Duration) -> Self {
        Self {
            probe,
            host: host.into(),
            cache: FlightCache::new(ttl),
        }
    }

    /// Resolves the repository identity governing `dir`. Concurrent calls
    /// for the same directory share a single detection; distinct
    /// directories resolve in parallel.
    pub async fn resolve(&self, dir: &Path) -> Result<RepoContext> {
        let key = cache_key(dir);
        self.cache
            .get_or_resolve(key, || self.detect(dir))
            .await
    }

    /// Drops the cached entry for `dir` (e.g. after a detected filesystem
    /// change). The next resolve re-detects.
    pub fn invalidate(&self, dir: &Path) {
        self.cache.invalidate(&cache_key(dir));
    }

    async fn detect(&self, dir: &Path) -> Result<RepoContext> {
        let url = self.probe.remote_url(dir).await?;
        let remote = parse_remote_url(&url)?;
        if remote.host != self.host {
            return Err(ContextError::UnrecognizedHost {
                host: remote.host,
                expected: self.host.clone(),
            });
        }
        log::debug!(
            "resolved {} -> {}/{} ({url})",
            dir.display(),
            remote.owner,
            remote.name
        );
        Ok(RepoContext {
            owner: remote.owner,
            name: remote.name,
            remote_url: url,
            resolved_at: SystemTime::now(),
        })
    }
}

/// Canonicalized where possible so `repo/` and `repo/./src/..` share an
/// entry; falls back to the raw path for directories that do not (yet)
/// exist, which then fail detection with `NotARepository`.
fn cache_key(dir: &Path) -> PathBuf {
    dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf())
}
