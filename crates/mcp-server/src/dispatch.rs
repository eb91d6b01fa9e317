//! The dispatch core: one read loop, correlated concurrent handler
//! execution, one serialized write path.
//!
//! Guarantees upheld here:
//! - every accepted request produces exactly one response envelope,
//!   correlated by id; responses may be written in completion order
//! - a slow handler never stalls other in-flight requests; the concurrency
//!   cap admits queued requests in arrival order and never drops them
//! - a fault in one handler (error, panic, deadline) is converted to an
//!   error envelope and never takes down the loop
//! - framing faults terminate the connection; in-flight contexts are then
//!   signaled to cancel

use crate::context::{ExecutionContext, Services};
use crate::error::ToolError;
use crate::registry::{ToolDescriptor, ToolRegistry};
use crate::transport::{FrameReader, FrameWriter, FramingError, FramingMode};
use forgelink_protocol::{
    ErrorKind, ErrorPayload, InitializeResult, ListToolsResult, RequestEnvelope, RequestId,
    ResponseEnvelope, ServerInfo, PROTOCOL_VERSION,
};
use serde_json::Value;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// How long to keep flushing in-flight responses after the inbound stream
/// reaches clean EOF. One-shot runners close stdin right after writing
/// their requests; their responses are still owed.
const EOF_DRAIN_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Clone)]
pub struct DispatcherConfig {
    pub max_concurrency: usize,
    pub default_timeout: Duration,
    pub server_name: String,
    pub server_version: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 8,
            default_timeout: Duration::from_secs(30),
            server_name: env!("CARGO_PKG_NAME").to_string(),
            server_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
    services: Arc<Services>,
    config: DispatcherConfig,
}

impl Dispatcher {
    pub fn new(registry: Arc<ToolRegistry>, services: Arc<Services>, config: DispatcherConfig) -> Self {
        Self {
            registry,
            services,
            config,
        }
    }

    /// Serves one connection until EOF or a framing fault. The returned
    /// error is connection-fatal by definition.
    pub async fn serve<R, W>(&self, read: R, write: W) -> Result<(), FramingError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let mode = FramingMode::new();
        let mut reader = FrameReader::new(read, mode.clone());
        let writer = FrameWriter::spawn(write, mode);
        let limiter = Arc::new(Semaphore::new(self.config.max_concurrency));
        let conn_cancel = CancellationToken::new();
        let mut in_flight: JoinSet<()> = JoinSet::new();

        let loop_result = loop {
            // Reap whatever already finished so the set stays small.
            while in_flight.try_join_next().is_some() {}

            let frame = match reader.next_frame().await {
                Ok(Some(frame)) => frame,
                Ok(None) => break Ok(()),
                Err(err) => break Err(err),
            };

            // A frame that is not a JSON object is a framing fault, not a
            // request: terminate the connection. An object that is not a
            // valid envelope is answered with a ValidationError instead.
            let raw: Value = match serde_json::from_slice(&frame) {
                Ok(raw @ Value::Object(_)) => raw,
                Ok(other) => {
                    break Err(FramingError::Malformed(format!(
                        "expected a request object, got {other}"
                    )))
                }
                Err(err) => break Err(FramingError::Malformed(format!("invalid frame: {err}"))),
            };
            let envelope: RequestEnvelope = match serde_json::from_value(raw.clone()) {
                Ok(envelope) => envelope,
                Err(err) => {
                    let id = raw
                        .get("id")
                        .cloned()
                        .and_then(|id| match id {
                            Value::Number(n) => n.as_i64().map(RequestId::Number),
                            Value::String(s) => Some(RequestId::String(s)),
                            _ => None,
                        });
                    let response = ResponseEnvelope::error(
                        id,
                        ErrorPayload::new(
                            ErrorKind::ValidationError,
                            format!("malformed request envelope: {err}"),
                        ),
                    );
                    self.write_or_stop(&writer, &response).await;
                    continue;
                }
            };

            let id = match envelope.request_id() {
                Ok(Some(id)) => id,
                Ok(None) => {
                    log::debug!("ignoring notification '{}'", envelope.method);
                    continue;
                }
                Err(err) => {
                    let response = ResponseEnvelope::error(
                        None,
                        ErrorPayload::new(ErrorKind::ValidationError, err.to_string()),
                    );
                    self.write_or_stop(&writer, &response).await;
                    continue;
                }
            };

            match envelope.method.as_str() {
                "initialize" => {
                    let result = InitializeResult {
                        protocol_version: PROTOCOL_VERSION.to_string(),
                        server_info: ServerInfo {
                            name: self.config.server_name.clone(),
                            version: self.config.server_version.clone(),
                        },
                        tools: self.registry.list(),
                    };
                    self.respond_inline(&writer, id, result).await;
                    continue;
                }
                "tools/list" => {
                    let result = ListToolsResult {
                        tools: self.registry.list(),
                    };
                    self.respond_inline(&writer, id, result).await;
                    continue;
                }
                _ => {}
            }

            let descriptor = match self.registry.lookup(&envelope.method) {
                Ok(descriptor) => descriptor.clone(),
                Err(err) => {
                    let response = ResponseEnvelope::error(
                        Some(id),
                        ErrorPayload::new(ErrorKind::ToolNotFound, err.to_string()),
                    );
                    self.write_or_stop(&writer, &response).await;
                    continue;
                }
            };

            // Admission control: acquiring here (not in the spawned task)
            // keeps admission in arrival order and applies backpressure to
            // the read loop once the pool is full. Requests queue; they are
            // never dropped.
            let permit = match limiter.clone().acquire_owned().await {
                Ok(permit) => permit,
                // Only possible if the semaphore is closed, which never
                // happens while the loop runs; treat it as shutdown.
                Err(_) => break Ok(()),
            };

            let params = envelope.params.unwrap_or(Value::Object(Default::default()));
            let deadline =
                Instant::now() + descriptor.timeout.unwrap_or(self.config.default_timeout);
            let ctx = ExecutionContext::new(
                self.services.clone(),
                conn_cancel.child_token(),
                deadline,
            );
            in_flight.spawn(run_one(descriptor, params, ctx, id, writer.clone(), permit));
        };

        match loop_result {
            Ok(()) => {
                // Clean EOF: the outbound half may still be open. Flush
                // in-flight work, bounded.
                let drain = async {
                    while in_flight.join_next().await.is_some() {}
                };
                if tokio::time::timeout(EOF_DRAIN_TIMEOUT, drain).await.is_err() {
                    log::warn!("in-flight handlers did not finish draining; cancelling");
                    conn_cancel.cancel();
                }
                Ok(())
            }
            Err(err) => {
                log::error!("connection terminated by framing fault: {err}");
                conn_cancel.cancel();
                let _ = tokio::time::timeout(Duration::from_millis(250), async {
                    while in_flight.join_next().await.is_some() {}
                })
                .await;
                Err(err)
            }
        }
    }

    async fn respond_inline<T: serde::Serialize>(
        &self,
        writer: &FrameWriter,
        id: RequestId,
        result: T,
    ) {
        let value = match serde_json::to_value(result) {
            Ok(value) => value,
            Err(err) => {
                log::error!("unserializable inline result: {err}");
                return;
            }
        };
        self.write_or_stop(writer, &ResponseEnvelope::success(id, value))
            .await;
    }

    async fn write_or_stop(&self, writer: &FrameWriter, response: &ResponseEnvelope) {
        if let Err(err) = writer.write_message(response).await {
            log::error!("failed to write response: {err}");
        }
    }
}

/// Runs one admitted request to completion and writes its single response.
/// Holds the admission permit until the response is out.
async fn run_one(
    descriptor: ToolDescriptor,
    params: Value,
    ctx: ExecutionContext,
    id: RequestId,
    writer: FrameWriter,
    _permit: OwnedSemaphorePermit,
) {
    let tool_name = descriptor.name;
    let mut handler = {
        let ctx = ctx.clone();
        tokio::spawn(async move { descriptor.invoke(params, &ctx).await })
    };

    let outcome: Result<Value, ToolError> = tokio::select! {
        joined = &mut handler => match joined {
            Ok(result) => result,
            Err(join_err) if join_err.is_panic() => {
                log::error!("tool '{tool_name}' panicked: {join_err}");
                Err(ToolError::Internal(format!("tool '{tool_name}' panicked")))
            }
            Err(_) => Err(ToolError::Cancelled),
        },
        _ = tokio::time::sleep_until(ctx.deadline()) => {
            // Signal the handler; its in-flight external call is expected
            // to observe the cancellation. Whatever it produces later is
            // discarded; the timeout envelope below is the one response.
            ctx.cancel();
            Err(ToolError::Timeout)
        }
        _ = ctx.cancelled() => Err(ToolError::Cancelled),
    };

    let response = match outcome {
        // Connection is going away; nobody is owed an envelope.
        Err(ToolError::Cancelled) => return,
        Ok(value) => ResponseEnvelope::success(id, value),
        Err(ToolError::Timeout) => ResponseEnvelope::error(
            Some(id),
            ErrorPayload::new(
                ErrorKind::Timeout,
                format!("tool '{tool_name}' did not complete before its deadline"),
            ),
        ),
        Err(err) => ResponseEnvelope::error(Some(id), err.to_payload()),
    };

    if let Err(err) = writer.write_message(&response).await {
        log::error!("failed to write response for tool '{tool_name}': {err}");
    }
}
