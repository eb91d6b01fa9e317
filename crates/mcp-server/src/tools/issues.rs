//! Issue tools: list, fetch, comment.

use super::validation::{check_number, list_query, parse_repo_slug};
use super::resolve_repo;
use crate::client::{Issue, IssueComment, Pagination};
use crate::context::ExecutionContext;
use crate::error::ToolError;
use crate::registry::Tool;
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub struct ListIssuesTool;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListIssuesParams {
    /// Repository in 'owner/repo' form; defaults to the detected current repository
    #[schemars(description = "Repository in 'owner/repo' form; defaults to the detected current repository")]
    pub repository: Option<String>,

    /// Issue state filter
    #[schemars(description = "Issue state: open, closed, or all (default open)")]
    pub state: Option<String>,

    /// Page size
    #[schemars(description = "Maximum number of issues to return (1-100, default 30)")]
    pub limit: Option<u32>,

    /// Items to skip
    #[schemars(description = "Number of issues to skip before the first result")]
    pub offset: Option<u32>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct ListIssuesResult {
    pub issues: Vec<Issue>,
    pub pagination: Pagination,
}

#[async_trait]
impl Tool for ListIssuesTool {
    type Params = ListIssuesParams;
    type Output = ListIssuesResult;

    fn name(&self) -> &'static str {
        "list_issues"
    }

    fn description(&self) -> &'static str {
        "List issues in a repository, newest first"
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

        let issues = ctx.api().list_issues(&repo, &query, ctx).await?;
        Ok(ListIssuesResult {
            issues,
            pagination: Pagination {
                limit: query.limit,
                offset: query.offset,
            },
        })
    }
}

pub struct GetIssueTool;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetIssueParams {
    /// Repository in 'owner/repo' form; defaults to the detected current repository
    #[schemars(description = "Repository in 'owner/repo' form; defaults to the detected current repository")]
    pub repository: Option<String>,

    /// Issue number
    #[schemars(description = "Issue number")]
    pub number: u64,
}

#[async_trait]
impl Tool for GetIssueTool {
    type Params = GetIssueParams;
    type Output = Issue;

    fn name(&self) -> &'static str {
        "get_issue"
    }

    fn description(&self) -> &'static str {
        "Fetch a single issue by number"
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
        Ok(ctx.api().get_issue(&repo, params.number, ctx).await?)
    }
}

pub struct AddIssueCommentTool;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AddIssueCommentParams {
    /// Repository in 'owner/repo' form; defaults to the detected current repository
    #[schemars(description = "Repository in 'owner/repo' form; defaults to the detected current repository")]
    pub repository: Option<String>,

    /// Issue number to comment on
    #[schemars(description = "Issue number to comment on")]
    pub number: u64,

    /// Comment body (Markdown)
    #[schemars(description = "Comment body in Markdown; must not be empty")]
    pub body: String,
}

#[async_trait]
impl Tool for AddIssueCommentTool {
    type Params = AddIssueCommentParams;
    type Output = IssueComment;

    fn name(&self) -> &'static str {
        "add_issue_comment"
    }

    fn description(&self) -> &'static str {
        "Add a comment to an issue"
    }

    fn validate(&self, params: &Self::Params) -> Result<(), String> {
        if let Some(repository) = params.repository.as_deref() {
            parse_repo_slug(repository)?;
        }
        check_number(params.number)?;
        if params.body.trim().is_empty() {
            return Err("body must not be empty".to_string());
        }
        Ok(())
    }

    async fn run(
        &self,
        params: Self::Params,
        ctx: &ExecutionContext,
    ) -> Result<Self::Output, ToolError> {
        let repo = resolve_repo(params.repository.as_deref(), ctx).await?;
        ctx.require_auth().await?;
        Ok(ctx
            .api()
            .create_issue_comment(&repo, params.number, &params.body, ctx)
            .await?)
    }
}
