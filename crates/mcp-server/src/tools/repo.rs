//! Local context tools: current repository identity and auth status.
//! Neither makes a remote API call.

use crate::context::ExecutionContext;
use crate::error::ToolError;
use crate::registry::Tool;
use async_trait::async_trait;
use forgelink_auth::AuthError;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub struct CurrentRepositoryTool;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CurrentRepositoryParams {
    /// Directory to detect from; defaults to the server's working directory
    #[schemars(description = "Directory to detect the repository from; defaults to the server's working directory")]
    pub path: Option<String>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct CurrentRepositoryResult {
    pub owner: String,
    pub name: String,
    /// `owner/name` slug, usable as the `repository` param of other tools
    pub repository: String,
    pub remote_url: String,
}

#[async_trait]
impl Tool for CurrentRepositoryTool {
    type Params = CurrentRepositoryParams;
    type Output = CurrentRepositoryResult;

    fn name(&self) -> &'static str {
        "current_repository"
    }

    fn description(&self) -> &'static str {
        "Detect the repository governing the working directory"
    }

    async fn run(
        &self,
        params: Self::Params,
        ctx: &ExecutionContext,
    ) -> Result<Self::Output, ToolError> {
        let repo = match params.path.as_deref() {
            Some(path) => ctx.repository_at(Path::new(path)).await?,
            None => ctx.current_repository().await?,
        };
        Ok(CurrentRepositoryResult {
            repository: repo.slug(),
            owner: repo.owner,
            name: repo.name,
            remote_url: repo.remote_url,
        })
    }
}

pub struct AuthStatusTool;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AuthStatusParams {}

#[derive(Debug, Serialize, JsonSchema)]
pub struct AuthStatusResult {
    /// Whether a credential is configured at all
    pub configured: bool,
    /// Validation verdict; absent when no credential is configured
    pub valid: Option<bool>,
    /// Login the forge associates with the credential, when known
    pub login: Option<String>,
    /// Masked credential identity; the raw token is never reported
    pub fingerprint: Option<String>,
}

#[async_trait]
impl Tool for AuthStatusTool {
    type Params = AuthStatusParams;
    type Output = AuthStatusResult;

    fn name(&self) -> &'static str {
        "auth_status"
    }

    fn description(&self) -> &'static str {
        "Report whether the configured credential is valid (masked; never reveals the token)"
    }

    async fn run(
        &self,
        _params: Self::Params,
        ctx: &ExecutionContext,
    ) -> Result<Self::Output, ToolError> {
        match ctx.auth_decision().await {
            Ok(decision) => Ok(AuthStatusResult {
                configured: true,
                valid: Some(decision.valid),
                login: decision.login,
                fingerprint: Some(decision.fingerprint.to_string()),
            }),
            Err(ToolError::Auth(AuthError::Missing)) => Ok(AuthStatusResult {
                configured: false,
                valid: None,
                login: None,
                fingerprint: None,
            }),
            Err(err) => Err(err),
        }
    }
}
