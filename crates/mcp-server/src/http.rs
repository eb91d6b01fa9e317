//! reqwest-backed adapter for the remote forge API and the credential
//! check. The dispatch core never touches this module directly; it sees
//! only the `RemoteApi` / `CredentialChecker` traits.

use crate::client::{
    ApiError, Issue, IssueComment, ListQuery, PullRequest, RemoteApi, RepoSlug,
};
use crate::context::ExecutionContext;
use async_trait::async_trait;
use forgelink_auth::{CheckerError, CredentialChecker, CredentialStatus};
use serde::de::DeserializeOwned;
use serde::Deserialize;

const USER_AGENT: &str = concat!("forgelink-mcp/", env!("CARGO_PKG_VERSION"));

pub struct RestClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl RestClient {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            token,
        })
    }

    /// One GET, bounded by the request's remaining deadline and aborted on
    /// cancellation. No retries here: transient failures surface with
    /// `retryable: true` and policy stays with the caller.
    async fn get_json<T: DeserializeOwned>(
        &self,
        path_and_query: &str,
        ctx: &ExecutionContext,
    ) -> Result<T, ApiError> {
        let url = format!("{}{path_and_query}", self.base_url);
        let mut request = self.http.get(&url).timeout(ctx.remaining());
        if let Some(token) = self.token.as_deref() {
            request = request.bearer_auth(token);
        }

        let response = tokio::select! {
            _ = ctx.cancelled() => {
                return Err(ApiError::transient("request cancelled before completion"));
            }
            response = request.send() => response.map_err(classify_transport_error)?,
        };
        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status));
        }
        response
            .json::<T>()
            .await
            .map_err(|err| ApiError::terminal(format!("malformed forge response: {err}")))
    }

    async fn post_json<B: serde::Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        ctx: &ExecutionContext,
    ) -> Result<T, ApiError> {
        let url = format!("{}{path}", self.base_url);
        let mut request = self.http.post(&url).timeout(ctx.remaining()).json(body);
        if let Some(token) = self.token.as_deref() {
            request = request.bearer_auth(token);
        }

        let response = tokio::select! {
            _ = ctx.cancelled() => {
                return Err(ApiError::transient("request cancelled before completion"));
            }
            response = request.send() => response.map_err(classify_transport_error)?,
        };
        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status));
        }
        response
            .json::<T>()
            .await
            .map_err(|err| ApiError::terminal(format!("malformed forge response: {err}")))
    }
}

fn classify_transport_error(err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        ApiError::transient("forge API call timed out")
    } else {
        ApiError::transient(format!("forge API unreachable: {err}"))
    }
}

fn classify_status(status: reqwest::StatusCode) -> ApiError {
    let code = status.as_u16();
    let retryable = status.is_server_error() || code == 429;
    let message = match code {
        401 | 403 => "forge rejected the request (authentication/permission)".to_string(),
        404 => "resource not found on the forge".to_string(),
        429 => "forge rate limit exceeded".to_string(),
        _ => format!("forge returned status {code}"),
    };
    ApiError {
        message,
        retryable,
        status: Some(code),
    }
}

// Wire shapes of the forge REST payloads, converted to the domain records
// at the adapter boundary.

#[derive(Deserialize)]
struct WireUser {
    login: String,
}

#[derive(Deserialize)]
struct WireIssue {
    number: u64,
    title: String,
    state: String,
    user: Option<WireUser>,
    html_url: Option<String>,
    created_at: Option<String>,
}

impl From<WireIssue> for Issue {
    fn from(wire: WireIssue) -> Self {
        Self {
            number: wire.number,
            title: wire.title,
            state: wire.state,
            author: wire.user.map(|u| u.login),
            url: wire.html_url,
            created_at: wire.created_at,
        }
    }
}

#[derive(Deserialize)]
struct WireRef {
    #[serde(rename = "ref")]
    name: String,
}

#[derive(Deserialize)]
struct WirePull {
    number: u64,
    title: String,
    state: String,
    user: Option<WireUser>,
    #[serde(default)]
    draft: bool,
    base: Option<WireRef>,
    head: Option<WireRef>,
    html_url: Option<String>,
}

impl From<WirePull> for PullRequest {
    fn from(wire: WirePull) -> Self {
        Self {
            number: wire.number,
            title: wire.title,
            state: wire.state,
            author: wire.user.map(|u| u.login),
            draft: wire.draft,
            base_ref: wire.base.map(|r| r.name),
            head_ref: wire.head.map(|r| r.name),
            url: wire.html_url,
        }
    }
}

#[derive(Deserialize)]
struct WireComment {
    id: u64,
    body: String,
    user: Option<WireUser>,
    html_url: Option<String>,
}

impl From<WireComment> for IssueComment {
    fn from(wire: WireComment) -> Self {
        Self {
            id: wire.id,
            body: wire.body,
            author: wire.user.map(|u| u.login),
            url: wire.html_url,
        }
    }
}

fn list_path(base: &str, repo: &RepoSlug, query: &ListQuery) -> String {
    format!(
        "/repos/{}/{}/{base}?state={}&limit={}&offset={}",
        repo.owner,
        repo.name,
        query.state.as_str(),
        query.limit,
        query.offset,
    )
}

#[async_trait]
impl RemoteApi for RestClient {
    async fn list_issues(
        &self,
        repo: &RepoSlug,
        query: &ListQuery,
        ctx: &ExecutionContext,
    ) -> Result<Vec<Issue>, ApiError> {
        let wire: Vec<WireIssue> = self.get_json(&list_path("issues", repo, query), ctx).await?;
        Ok(wire.into_iter().map(Into::into).collect())
    }

    async fn get_issue(
        &self,
        repo: &RepoSlug,
        number: u64,
        ctx: &ExecutionContext,
    ) -> Result<Issue, ApiError> {
        let wire: WireIssue = self
            .get_json(&format!("/repos/{}/{}/issues/{number}", repo.owner, repo.name), ctx)
            .await?;
        Ok(wire.into())
    }

    async fn list_pull_requests(
        &self,
        repo: &RepoSlug,
        query: &ListQuery,
        ctx: &ExecutionContext,
    ) -> Result<Vec<PullRequest>, ApiError> {
        let wire: Vec<WirePull> = self.get_json(&list_path("pulls", repo, query), ctx).await?;
        Ok(wire.into_iter().map(Into::into).collect())
    }

    async fn get_pull_request(
        &self,
        repo: &RepoSlug,
        number: u64,
        ctx: &ExecutionContext,
    ) -> Result<PullRequest, ApiError> {
        let wire: WirePull = self
            .get_json(&format!("/repos/{}/{}/pulls/{number}", repo.owner, repo.name), ctx)
            .await?;
        Ok(wire.into())
    }

    async fn create_issue_comment(
        &self,
        repo: &RepoSlug,
        number: u64,
        body: &str,
        ctx: &ExecutionContext,
    ) -> Result<IssueComment, ApiError> {
        let wire: WireComment = self
            .post_json(
                &format!("/repos/{}/{}/issues/{number}/comments", repo.owner, repo.name),
                &serde_json::json!({ "body": body }),
                ctx,
            )
            .await?;
        Ok(wire.into())
    }
}

/// The credential check is a plain `GET /user` with the candidate token.
/// A definitive 401/403 is a rejection; anything that prevents an answer
/// is `CheckerError`, which the validator reports as `AuthUnreachable`.
#[async_trait]
impl CredentialChecker for RestClient {
    async fn check(&self, token: &str) -> Result<CredentialStatus, CheckerError> {
        let url = format!("{}/user", self.base_url);
        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|err| CheckerError(format!("forge unreachable: {err}")))?;

        let status = response.status();
        if status.is_success() {
            let login = response
                .json::<WireUser>()
                .await
                .ok()
                .map(|user| user.login);
            return Ok(CredentialStatus::Accepted { login });
        }
        if matches!(status.as_u16(), 401 | 403) {
            return Ok(CredentialStatus::Rejected);
        }
        Err(CheckerError(format!(
            "unexpected status {} from credential check",
            status.as_u16()
        )))
    }
}
