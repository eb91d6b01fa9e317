//! Pull request tools: list and fetch.

use super::resolve_repo;
use super::validation::{check_number, list_query, parse_repo_slug};
use crate::client::{Pagination, PullRequest};
use crate::context::ExecutionContext;
use crate::error::ToolError;
use crate::registry::Tool;
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub struct ListPullRequestsTool;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListPullRequestsParams {
    /// Repository in 'owner/repo' form; defaults to the detected current repository
    #[schemars(description = "Repository in 'owner/repo' form; defaults to the detected current repository")]
    pub repository: Option<String>,

    /// Pull request state filter
    #[schemars(description = "Pull request state: open, closed, or all (default open)")]
    pub state: Option<String>,

    /// Page size
    #[schemars(description = "Maximum number of pull requests to return (1-100, default 30)")]
    pub limit: Option<u32>,

    /// Items to skip
    #[schemars(description = "Number of pull requests to skip before the first result")]
    pub offset: Option<u32>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct ListPullRequestsResult {
    pub pull_requests: Vec<PullRequest>,
    pub pagination: Pagination,
}

#[async_trait]
impl Tool for ListPullRequestsTool {
    type Params = ListPullRequestsParams;
    type Output = ListPullRequestsResult;

    fn name(&self) -> &'static str {
        "list_pull_requests"
    }

    fn description(&self) -> &'static str {
        "List pull requests in a repository, newest first"
    }

    fn validate(&self, params: &Self::Params) -> Result<(), String> {
        if let Some(repository) = params.repository.as_deref() {
            parse_repo_slug(repository)?;
        }
        list_query(params.state.as_deref(), params.limit, params.offset)?;
        Ok(())
    }

    async fn run(
        &self,
        params: Self::Params,
        ctx: &ExecutionContext,
    ) -> Result<Self::Output, ToolError> {
        let repo = resolve_repo(params.repository.as_deref(), ctx).await?;
        let query = list_query(params.state.as_deref(), params.limit, params.offset)
            .map_err(ToolError::Validation)?;
        ctx.require_auth().await?;

        let pull_requests = ctx.api().list_pull_requests(&repo, &query, ctx).await?;
        Ok(ListPullRequestsResult {
            pull_requests,
            pagination: Pagination {
                limit: query.limit,
                offset: query.offset,
            },
        })
    }
}

pub struct GetPullRequestTool;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetPullRequestParams {
    /// Repository in 'owner/repo' form; defaults to the detected current repository
    #[schemars(description = "Repository in 'owner/repo' form; defaults to the detected current repository")]
    pub repository: Option<String>,

    /// Pull request number
    #[schemars(description = "Pull request number")]
    pub number: u64,
}

#[async_trait]
impl Tool for GetPullRequestTool {
    type Params = GetPullRequestParams;
    type Output = PullRequest;

    fn name(&self) -> &'static str {
        "get_pull_request"
    }

    fn description(&self) -> &'static str {
        "Fetch a single pull request by number"
    }

    fn validate(&self, params: &Self::Params) -> Result<(), String> {
        if let Some(repository) = params.repository.as_deref() {
            parse_repo_slug(repository)?;
        }
        check_number(params.number)?;
        Ok(())
    }

    async fn run(
        &self,
        params: Self::Params,
        ctx: &ExecutionContext,
    ) -> Result<Self::Output, ToolError> {
        let repo = resolve_repo(params.repository.as_deref(), ctx).await?;
        ctx.require_auth().await?;
        Ok(ctx.api().get_pull_request(&repo, params.number, ctx).await?)
    }
}
