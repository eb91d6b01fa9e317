//! Shared fixtures for dispatch integration tests: fake collaborators and
//! a duplex-backed server harness.

use async_trait::async_trait;
use forgelink_auth::{
    AuthValidator, CheckerError, CredentialChecker, CredentialStatus,
};
use forgelink_mcp::client::{
    ApiError, Issue, IssueComment, ListQuery, PullRequest, RemoteApi, RepoSlug,
};
use forgelink_mcp::context::{ExecutionContext, Services};
use forgelink_mcp::dispatch::{Dispatcher, DispatcherConfig};
use forgelink_mcp::registry::ToolRegistry;
use forgelink_mcp::tools::build_registry;
use forgelink_mcp::transport::{FrameReader, FramingMode};
use forgelink_repo_context::{ContextError, RemoteProbe, RepoContextResolver};
use serde_json::Value;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};
use tokio::time::Duration;

pub struct FakeApi {
    pub issues: Vec<Issue>,
    pub pulls: Vec<PullRequest>,
    pub delay: Duration,
    calls: AtomicUsize,
}

impl FakeApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            issues: sample_issues(),
            pulls: sample_pulls(),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            issues: sample_issues(),
            pulls: sample_pulls(),
            delay,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn record(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

pub fn sample_issues() -> Vec<Issue> {
    vec![
        Issue {
            number: 12,
            title: "Widget frobnicator jams under load".into(),
            state: "open".into(),
            author: Some("octocat".into()),
            url: Some("https://github.com/acme/widgets/issues/12".into()),
            created_at: Some("2026-07-30T10:00:00Z".into()),
        },
        Issue {
            number: 9,
            title: "Document the widget API".into(),
            state: "open".into(),
            author: Some("hubot".into()),
            url: Some("https://github.com/acme/widgets/issues/9".into()),
            created_at: Some("2026-07-21T08:30:00Z".into()),
        },
    ]
}

pub fn sample_pulls() -> Vec<PullRequest> {
    vec![PullRequest {
        number: 15,
        title: "Unjam the frobnicator".into(),
        state: "open".into(),
        author: Some("octocat".into()),
        draft: false,
        base_ref: Some("main".into()),
        head_ref: Some("fix/frobnicator".into()),
        url: Some("https://github.com/acme/widgets/pull/15".into()),
    }]
}

#[async_trait]
impl RemoteApi for FakeApi {
    async fn list_issues(
        &self,
        _repo: &RepoSlug,
        _query: &ListQuery,
        _ctx: &ExecutionContext,
    ) -> Result<Vec<Issue>, ApiError> {
        self.record().await;
        Ok(self.issues.clone())
    }

    async fn get_issue(
        &self,
        _repo: &RepoSlug,
        number: u64,
        _ctx: &ExecutionContext,
    ) -> Result<Issue, ApiError> {
        self.record().await;
        self.issues
            .iter()
            .find(|i| i.number == number)
            .cloned()
            .ok_or_else(|| ApiError::terminal("resource not found on the forge").with_status(404))
    }

    async fn list_pull_requests(
        &self,
        _repo: &RepoSlug,
        _query: &ListQuery,
        _ctx: &ExecutionContext,
    ) -> Result<Vec<PullRequest>, ApiError> {
        self.record().await;
        Ok(self.pulls.clone())
    }

    async fn get_pull_request(
        &self,
        _repo: &RepoSlug,
        number: u64,
        _ctx: &ExecutionContext,
    ) -> Result<PullRequest, ApiError> {
        self.record().await;
        self.pulls
            .iter()
            .find(|p| p.number == number)
            .cloned()
            .ok_or_else(|| ApiError::terminal("resource not found on the forge").with_status(404))
    }

    async fn create_issue_comment(
        &self,
        _repo: &RepoSlug,
        number: u64,
        body: &str,
        _ctx: &ExecutionContext,
    ) -> Result<IssueComment, ApiError> {
        self.record().await;
        Ok(IssueComment {
            id: 1000 + number,
            body: body.to_string(),
            author: Some("octocat".into()),
            url: None,
        })
    }
}

pub struct FakeProbe {
    url: Result<String, ContextError>,
}

impl FakeProbe {
    pub fn github() -> Arc<Self> {
        Arc::new(Self {
            url: Ok("git@github.com:acme/widgets.git".to_string()),
        })
    }

    pub fn failing(err: ContextError) -> Arc<Self> {
        Arc::new(Self { url: Err(err) })
    }
}

#[async_trait]
impl RemoteProbe for FakeProbe {
    async fn remote_url(&self, _dir: &Path) -> Result<String, ContextError> {
        self.url.clone()
    }
}

pub enum CheckerBehavior {
    Accept,
    Reject,
    Unreachable,
}

pub struct FakeChecker {
    behavior: CheckerBehavior,
    calls: AtomicUsize,
}

impl FakeChecker {
    pub fn new(behavior: CheckerBehavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialChecker for FakeChecker {
    async fn check(&self, _token: &str) -> Result<CredentialStatus, CheckerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            CheckerBehavior::Accept => Ok(CredentialStatus::Accepted {
                login: Some("octocat".into()),
            }),
            CheckerBehavior::Reject => Ok(CredentialStatus::Rejected),
            CheckerBehavior::Unreachable => Err(CheckerError("connection refused".into())),
        }
    }
}

pub fn services(
    api: Arc<dyn RemoteApi>,
    probe: Arc<dyn RemoteProbe>,
    checker: Arc<dyn CredentialChecker>,
    token: Option<&str>,
) -> Arc<Services> {
    Arc::new(Services {
        repo_resolver: RepoContextResolver::new(probe, "github.com", Duration::from_secs(300)),
        auth: AuthValidator::new(
            checker,
            token.map(str::to_string),
            Duration::from_secs(300),
            Duration::from_millis(200),
        ),
        api,
        workdir: std::path::PathBuf::from("/work/widgets"),
    })
}

/// Default-config services: reachable API, detectable repo, valid token.
pub fn happy_services(api: Arc<dyn RemoteApi>) -> Arc<Services> {
    services(
        api,
        FakeProbe::github(),
        FakeChecker::new(CheckerBehavior::Accept),
        Some("ghp_valid"),
    )
}

pub struct TestServer {
    write: WriteHalf<DuplexStream>,
    reader: FrameReader<ReadHalf<DuplexStream>>,
    _task: tokio::task::JoinHandle<()>,
}

impl TestServer {
    pub fn spawn(services: Arc<Services>, config: DispatcherConfig) -> Self {
        Self::spawn_with_registry(Arc::new(build_registry().unwrap()), services, config)
    }

    pub fn spawn_with_registry(
        registry: Arc<ToolRegistry>,
        services: Arc<Services>,
        config: DispatcherConfig,
    ) -> Self {
        let (client_io, server_io) = tokio::io::duplex(262_144);
        let (server_read, server_write) = tokio::io::split(server_io);
        let (client_read, client_write) = tokio::io::split(client_io);

        let task = tokio::spawn(async move {
            let dispatcher = Dispatcher::new(registry, services, config);
            if let Err(err) = dispatcher.serve(server_read, server_write).await {
                log::debug!("test server terminated: {err}");
            }
        });

        Self {
            write: client_write,
            reader: FrameReader::new(client_read, FramingMode::new()),
            _task: task,
        }
    }

    pub async fn send(&mut self, request: Value) {
        let mut bytes = serde_json::to_vec(&request).unwrap();
        bytes.push(b'\n');
        self.write.write_all(&bytes).await.unwrap();
        self.write.flush().await.unwrap();
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.write.write_all(bytes).await.unwrap();
        self.write.flush().await.unwrap();
    }

    /// Next response in write order, or `None` once the server closed the
    /// connection.
    pub async fn recv(&mut self) -> Option<Value> {
        let frame = self.reader.next_frame().await.ok().flatten()?;
        Some(serde_json::from_slice(&frame).unwrap())
    }

    /// Waits for the response correlated to `id`, buffering nothing: tests
    /// that care about write order use `recv` directly.
    pub async fn recv_expecting(&mut self, id: Value) -> Value {
        let response = self.recv().await.expect("server closed unexpectedly");
        assert_eq!(response["id"], id, "unexpected correlation id: {response}");
        response
    }
}
