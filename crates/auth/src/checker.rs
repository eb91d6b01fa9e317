use async_trait::async_trait;

/// Outcome of one remote credential check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialStatus {
    /// The service accepted the credential.
    Accepted { login: Option<String> },
    /// The service answered and rejected the credential (wrong or expired).
    Rejected,
}

/// The check could not be completed: network failure, service outage. This
/// is distinct from a rejection and is surfaced as `AuthUnreachable`.
#[derive(Debug, Clone, thiserror::Error)]
#[error("credential check failed: {0}")]
pub struct CheckerError(pub String);

/// Remote collaborator that knows how to ask the forge whether a credential
/// is valid.
#[async_trait]
pub trait CredentialChecker: Send + Sync {
    async fn check(&self, token: &str) -> Result<CredentialStatus, CheckerError>;
}
