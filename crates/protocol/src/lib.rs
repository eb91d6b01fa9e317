//! Wire protocol for the Forgelink tool server (JSON-RPC 2.0 shaped, framed
//! over a single byte stream).
//!
//! Envelope rules:
//! - a request carries `{id, method, params}`; `id` is caller-assigned and
//!   must be unique for the lifetime of the connection
//! - a response carries `{id, result}` XOR `{id, error}`: never both,
//!   never neither
//! - clients correlate by `id`, not by stream position

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Advertised in the `initialize` handshake result.
pub const PROTOCOL_VERSION: &str = "1.0";

pub const JSONRPC_VERSION: &str = "2.0";

/// Caller-assigned correlation token. Strings and integers only; any other
/// JSON type in the `id` slot is a malformed envelope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

impl From<i32> for RequestId {
    fn from(n: i32) -> Self {
        Self::Number(n.into())
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

/// Incoming request envelope. Immutable once parsed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEnvelope {
    #[serde(default = "jsonrpc_version")]
    pub jsonrpc: String,
    pub id: Option<Value>,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

fn jsonrpc_version() -> String {
    JSONRPC_VERSION.to_string()
}

impl RequestEnvelope {
    pub fn new(id: impl Into<RequestId>, method: impl Into<String>, params: Value) -> Self {
        let id = match id.into() {
            RequestId::Number(n) => Value::from(n),
            RequestId::String(s) => Value::from(s),
        };
        Self {
            jsonrpc: jsonrpc_version(),
            id: Some(id),
            method: method.into(),
            params: Some(params),
        }
    }

    /// Extracts the correlation id, rejecting JSON types that cannot serve
    /// as one. `Ok(None)` means the envelope is a notification.
    pub fn request_id(&self) -> Result<Option<RequestId>, EnvelopeError> {
        match &self.id {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => n
                .as_i64()
                .map(|n| Some(RequestId::Number(n)))
                .ok_or(EnvelopeError::UnusableId),
            Some(Value::String(s)) => Ok(Some(RequestId::String(s.clone()))),
            Some(_) => Err(EnvelopeError::UnusableId),
        }
    }
}

/// Outgoing response envelope. Constructed only through [`ResponseEnvelope::success`]
/// and [`ResponseEnvelope::error`], which keeps the result/error exclusivity
/// invariant out of reach of call sites.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,
}

impl ResponseEnvelope {
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: jsonrpc_version(),
            id: id_value(Some(id)),
            result: Some(result),
            error: None,
        }
    }

    /// `id` is `None` when the request id itself was unusable; those are
    /// answered with a null-id error envelope.
    pub fn error(id: Option<RequestId>, error: ErrorPayload) -> Self {
        Self {
            jsonrpc: jsonrpc_version(),
            id: id_value(id),
            result: None,
            error: Some(error),
        }
    }

    pub fn is_well_formed(&self) -> bool {
        self.result.is_some() ^ self.error.is_some()
    }
}

fn id_value(id: Option<RequestId>) -> Value {
    match id {
        Some(RequestId::Number(n)) => Value::from(n),
        Some(RequestId::String(s)) => Value::from(s),
        None => Value::Null,
    }
}

/// Classified error carried in a response envelope. `kind` is the stable
/// taxonomy name clients branch on; `code` is the JSON-RPC numeric code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: i64,
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ErrorPayload {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            code: kind.code(),
            kind,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// The full error taxonomy visible on the wire. Framing faults never appear
/// here: they terminate the connection instead of producing an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    ToolNotFound,
    ValidationError,
    NotARepository,
    NoRemote,
    UnrecognizedHost,
    MalformedUrl,
    AuthMissing,
    AuthInvalid,
    AuthUnreachable,
    UpstreamError,
    Timeout,
    InternalFault,
}

impl ErrorKind {
    pub fn code(self) -> i64 {
        match self {
            Self::ToolNotFound => -32601,
            Self::ValidationError => -32602,
            Self::InternalFault => -32603,
            Self::Timeout => -32001,
            Self::AuthMissing => -32010,
            Self::AuthInvalid => -32011,
            Self::AuthUnreachable => -32012,
            Self::NotARepository => -32020,
            Self::NoRemote => -32021,
            Self::UnrecognizedHost => -32022,
            Self::MalformedUrl => -32023,
            Self::UpstreamError => -32030,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ToolNotFound => "ToolNotFound",
            Self::ValidationError => "ValidationError",
            Self::NotARepository => "NotARepository",
            Self::NoRemote => "NoRemote",
            Self::UnrecognizedHost => "UnrecognizedHost",
            Self::MalformedUrl => "MalformedUrl",
            Self::AuthMissing => "AuthMissing",
            Self::AuthInvalid => "AuthInvalid",
            Self::AuthUnreachable => "AuthUnreachable",
            Self::UpstreamError => "UpstreamError",
            Self::Timeout => "Timeout",
            Self::InternalFault => "InternalFault",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("request id must be a string or an integer")]
    UnusableId,
}

/// One entry of the tool manifest returned by `initialize` and `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ToolManifestEntry {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// `initialize` handshake result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeResult {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    #[serde(rename = "serverInfo")]
    pub server_info: ServerInfo,
    pub tools: Vec<ToolManifestEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

/// `tools/list` result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListToolsResult {
    pub tools: Vec<ToolManifestEntry>,
}
