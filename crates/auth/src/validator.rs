use crate::checker::{CredentialChecker, CredentialStatus};
use crate::fingerprint::TokenFingerprint;
use forgelink_flightcache::FlightCache;
use std::sync::Arc;
use std::time::SystemTime;
use thiserror::Error;
use tokio::time::Duration;

/// A cached verdict on the configured credential. Never carries the raw
/// token; `fingerprint` is the only credential identity.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthDecision {
    pub valid: bool,
    pub login: Option<String>,
    pub fingerprint: TokenFingerprint,
    pub validated_at: SystemTime,
}

/// The three auth failure classes. They are never conflated: a missing
/// credential, a rejected credential, and an unreachable validation
/// endpoint each render differently to the caller.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AuthError {
    #[error("no credential configured; set FORGELINK_TOKEN to call authenticated tools")]
    Missing,

    #[error("credential {fingerprint} was rejected by the forge (wrong or expired token)")]
    Invalid { fingerprint: TokenFingerprint },

    #[error("could not reach the forge to validate credential {fingerprint}: {reason}")]
    Unreachable {
        fingerprint: TokenFingerprint,
        reason: String,
    },
}

pub struct AuthValidator {
    checker: Arc<dyn CredentialChecker>,
    token: Option<String>,
    call_timeout: Duration,
    cache: FlightCache<TokenFingerprint, AuthDecision, AuthError>,
}

impl AuthValidator {
    pub fn new(
        checker: Arc<dyn CredentialChecker>,
        token: Option<String>,
        ttl: Duration,
        call_timeout: Duration,
    ) -> Self {
        // Empty-after-trim counts as absent, matching the env convention.
        let token = token
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        Self {
            checker,
            token,
            call_timeout,
            cache: FlightCache::new(ttl),
        }
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    /// Fingerprint of the configured credential, if any.
    pub fn fingerprint(&self) -> Option<TokenFingerprint> {
        self.token.as_deref().map(TokenFingerprint::of)
    }

    /// Returns the cached decision for the configured credential, issuing at
    /// most one bounded-duration remote check per cache window. With no
    /// credential configured this fails `Missing` without any outbound call.
    pub async fn decision(&self) -> Result<AuthDecision, AuthError> {
        let token = self.token.as_deref().ok_or(AuthError::Missing)?;
        let fingerprint = TokenFingerprint::of(token);
        self.cache
            .get_or_resolve(fingerprint, || self.check_once(token, fingerprint))
            .await
    }

    /// Like [`decision`](Self::decision), but folds a rejected credential
    /// into `AuthError::Invalid` for callers that require a valid one.
    pub async fn require_valid(&self) -> Result<AuthDecision, AuthError> {
        let decision = self.decision().await?;
        if !decision.valid {
            return Err(AuthError::Invalid {
                fingerprint: decision.fingerprint,
            });
        }
        Ok(decision)
    }

    /// Drops the cached decision (credential rotation). Independent of the
    /// repository-context cache.
    pub fn invalidate(&self) {
        if let Some(fingerprint) = self.fingerprint() {
            self.cache.invalidate(&fingerprint);
        }
    }

    async fn check_once(
        &self,
        token: &str,
        fingerprint: TokenFingerprint,
    ) -> Result<AuthDecision, AuthError> {
        let outcome = tokio::time::timeout(self.call_timeout, self.checker.check(token))
            .await
            .map_err(|_| AuthError::Unreachable {
                fingerprint,
                reason: format!("validation timed out after {:?}", self.call_timeout),
            })?
            .map_err(|err| AuthError::Unreachable {
                fingerprint,
                reason: err.0,
            })?;

        let decision = match outcome {
            CredentialStatus::Accepted { login } => AuthDecision {
                valid: true,
                login,
                fingerprint,
                validated_at: SystemTime::now(),
            },
            CredentialStatus::Rejected => AuthDecision {
                valid: false,
                login: None,
                fingerprint,
                validated_at: SystemTime::now(),
            },
        };
        log::debug!(
            "credential {fingerprint} validated: valid={}",
            decision.valid
        );
        Ok(decision)
    }
}
