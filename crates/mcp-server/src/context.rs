//! Per-request execution context: cancellation signal, deadline, and
//! accessors for the shared resolution services.

use crate::client::RemoteApi;
use crate::error::ToolError;
use forgelink_auth::{AuthDecision, AuthValidator};
use forgelink_repo_context::{RepoContext, RepoContextResolver};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Long-lived resolution services shared across requests. Owned by the
/// server (created at startup, torn down with it) and passed into the
/// dispatcher at construction, never a process-global.
pub struct Services {
    pub repo_resolver: RepoContextResolver,
    pub auth: AuthValidator,
    pub api: Arc<dyn RemoteApi>,
    pub workdir: PathBuf,
}

/// Owned by the dispatcher for the lifetime of exactly one request; never
/// reused. Clones share the same cancellation state so the dispatch task
/// and the handler task observe the same signal.
#[derive(Clone)]
pub struct ExecutionContext {
    cancel: CancellationToken,
    deadline: Instant,
    services: Arc<Services>,
}

impl ExecutionContext {
    pub fn new(services: Arc<Services>, cancel: CancellationToken, deadline: Instant) -> Self {
        Self {
            cancel,
            deadline,
            services,
        }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Time left before the deadline; zero once expired.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves when the request is cancelled (connection closed or
    /// deadline expired). Handlers and collaborators performing blocking
    /// external calls select against this.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }

    pub(crate) fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn api(&self) -> &dyn RemoteApi {
        self.services.api.as_ref()
    }

    /// Repository identity for the server's working directory (cached).
    pub async fn current_repository(&self) -> Result<RepoContext, ToolError> {
        self.repository_at(self.services.workdir.as_path()).await
    }

    /// Repository identity for an explicit directory (cached per key).
    pub async fn repository_at(&self, dir: &Path) -> Result<RepoContext, ToolError> {
        Ok(self.services.repo_resolver.resolve(dir).await?)
    }

    /// Cached auth decision; does not require the credential to be valid.
    pub async fn auth_decision(&self) -> Result<AuthDecision, ToolError> {
        Ok(self.services.auth.decision().await?)
    }

    /// Cached auth decision, required valid. The distinction between a
    /// missing, rejected, and unreachable credential survives into the
    /// error envelope.
    pub async fn require_auth(&self) -> Result<AuthDecision, ToolError> {
        Ok(self.services.auth.require_valid().await?)
    }

    pub fn auth(&self) -> &AuthValidator {
        &self.services.auth
    }
}
