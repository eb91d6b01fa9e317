use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ContextError>;

/// Repository-identity resolution failures. Each variant is specific enough
/// for a caller to render actionable guidance; none of them is cached
/// (resolution failures are often transient, e.g. a directory that is about
/// to become a repository).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContextError {
    #[error("{0} is not inside a repository working tree (no .git found in any ancestor)")]
    NotARepository(PathBuf),

    #[error("repository has no '{remote}' remote configured; add one or pass `repository` explicitly")]
    NoRemote { remote: String },

    #[error("remote host '{host}' does not match the configured forge instance '{expected}'")]
    UnrecognizedHost { host: String, expected: String },

    #[error("could not parse remote URL '{url}' as an SSH or HTTPS repository URL")]
    MalformedUrl { url: String },
}
