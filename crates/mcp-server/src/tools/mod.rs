//! The registered tool surface. Registration order is the manifest order.

pub mod issues;
pub mod pulls;
pub mod repo;
pub mod validation;

use crate::client::RepoSlug;
use crate::context::ExecutionContext;
use crate::error::ToolError;
use crate::registry::{descriptor, DuplicateToolError, ToolRegistry};
use self::validation::parse_repo_slug;

/// Explicit `repository` param wins; otherwise the current repository is
/// detected from the server's working directory (cached).
pub(crate) async fn resolve_repo(
    explicit: Option<&str>,
    ctx: &ExecutionContext,
) -> Result<RepoSlug, ToolError> {
    match explicit {
        Some(raw) => parse_repo_slug(raw).map_err(ToolError::Validation),
        None => {
            let repo = ctx.current_repository().await?;
            Ok(RepoSlug {
                owner: repo.owner,
                name: repo.name,
            })
        }
    }
}

/// Builds the static registry. Called once at startup; the set never
/// changes afterward.
pub fn build_registry() -> Result<ToolRegistry, DuplicateToolError> {
    let mut registry = ToolRegistry::new();
    registry.register(descriptor(issues::ListIssuesTool))?;
    registry.register(descriptor(issues::GetIssueTool))?;
    registry.register(descriptor(issues::AddIssueCommentTool))?;
    registry.register(descriptor(pulls::ListPullRequestsTool))?;
    registry.register(descriptor(pulls::GetPullRequestTool))?;
    registry.register(descriptor(repo::CurrentRepositoryTool))?;
    registry.register(descriptor(repo::AuthStatusTool))?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_builds_with_stable_manifest_order() {
        let registry = build_registry().unwrap();
        let names: Vec<_> = registry.list().into_iter().map(|t| t.name).collect();
        assert_eq!(
            names,
            vec![
                "list_issues",
                "get_issue",
                "add_issue_comment",
                "list_pull_requests",
                "get_pull_request",
                "current_repository",
                "auth_status",
            ]
        );
    }
}
