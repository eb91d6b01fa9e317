//! Remote forge API collaborator: domain records, the classified upstream
//! error, and the closed operation set the tools dispatch into. The core
//! consumes only the [`RemoteApi`] trait; the HTTP adapter lives in
//! [`crate::http`].

use crate::context::ExecutionContext;
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// `owner/name` pair identifying a repository on the forge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoSlug {
    pub owner: String,
    pub name: String,
}

impl fmt::Display for RepoSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// State filter shared by the list operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StateFilter {
    #[default]
    Open,
    Closed,
    All,
}

impl StateFilter {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
            Self::All => "all",
        }
    }
}

/// Window requested from a list operation. Passed to the adapter verbatim;
/// mapping onto a concrete forge's pagination dialect is the adapter's
/// concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListQuery {
    pub state: StateFilter,
    pub limit: u32,
    pub offset: u32,
}

/// Pagination echo included in list results.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Pagination {
    pub limit: u32,
    pub offset: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    pub state: String,
    pub author: Option<String>,
    pub url: Option<String>,
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    pub state: String,
    pub author: Option<String>,
    pub draft: bool,
    pub base_ref: Option<String>,
    pub head_ref: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct IssueComment {
    pub id: u64,
    pub body: String,
    pub author: Option<String>,
    pub url: Option<String>,
}

/// The remote API rejected or failed a call. `retryable` separates
/// transient failures (rate limits, 5xx, network) from terminal ones; the
/// core never retries; policy belongs to the caller.
#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct ApiError {
    pub message: String,
    pub retryable: bool,
    pub status: Option<u16>,
}

impl ApiError {
    pub fn terminal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
            status: None,
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
            status: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }
}

/// The closed set of remote operations the tool surface needs. Handlers
/// call these through the execution context so cancellation and deadlines
/// propagate into the adapter.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    async fn list_issues(
        &self,
        repo: &RepoSlug,
        query: &ListQuery,
        ctx: &ExecutionContext,
    ) -> Result<Vec<Issue>, ApiError>;

    async fn get_issue(
        &self,
        repo: &RepoSlug,
        number: u64,
        ctx: &ExecutionContext,
    ) -> Result<Issue, ApiError>;

    async fn list_pull_requests(
        &self,
        repo: &RepoSlug,
        query: &ListQuery,
        ctx: &ExecutionContext,
    ) -> Result<Vec<PullRequest>, ApiError>;

    async fn get_pull_request(
        &self,
        repo: &RepoSlug,
        number: u64,
        ctx: &ExecutionContext,
    ) -> Result<PullRequest, ApiError>;

    async fn create_issue_comment(
        &self,
        repo: &RepoSlug,
        number: u64,
        body: &str,
        ctx: &ExecutionContext,
    ) -> Result<IssueComment, ApiError>;
}
