//! Static tool registry: name -> {schema, handler}, built once at startup
//! and read-only afterward. Reads take no locks; the registry is shared
//! behind an `Arc`.

use crate::context::ExecutionContext;
use crate::error::ToolError;
use async_trait::async_trait;
use forgelink_protocol::ToolManifestEntry;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::time::Duration;

#[derive(Error, Debug, PartialEq, Eq)]
#[error("tool '{name}' is already registered")]
pub struct DuplicateToolError {
    pub name: String,
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("unknown tool '{name}'; call tools/list for the available tools")]
pub struct ToolNotFoundError {
    pub name: String,
}

/// Dynamic handler seam the dispatcher invokes. Implementations come from
/// the typed [`Tool`] adapter below, never hand-written.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, params: Value, ctx: &ExecutionContext) -> Result<Value, ToolError>;
}

/// One registered tool. Immutable after registry construction.
#[derive(Clone)]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
    /// Overrides the dispatcher's default deadline when set.
    pub timeout: Option<Duration>,
    handler: Arc<dyn ToolHandler>,
}

impl std::fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("input_schema", &self.input_schema)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl ToolDescriptor {
    pub async fn invoke(&self, params: Value, ctx: &ExecutionContext) -> Result<Value, ToolError> {
        self.handler.call(params, ctx).await
    }

    pub fn manifest_entry(&self) -> ToolManifestEntry {
        ToolManifestEntry {
            name: self.name.to_string(),
            description: self.description.to_string(),
            input_schema: self.input_schema.clone(),
        }
    }
}

/// Fixed handler signature every tool registers: validated params in,
/// result or classified error out. Parameter deserialization and
/// constraint validation run before the handler body; a validation
/// failure means the body is never entered.
#[async_trait]
pub trait Tool: Send + Sync + 'static {
    type Params: DeserializeOwned + JsonSchema + Send;
    type Output: Serialize + Send;

    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;

    fn timeout(&self) -> Option<Duration> {
        None
    }

    /// Constraint checks beyond shape. Messages name the parameter and the
    /// constraint that failed.
    fn validate(&self, _params: &Self::Params) -> Result<(), String> {
        Ok(())
    }

    async fn run(
        &self,
        params: Self::Params,
        ctx: &ExecutionContext,
    ) -> Result<Self::Output, ToolError>;
}

struct TypedHandler<T>(T);

#[async_trait]
impl<T: Tool> ToolHandler for TypedHandler<T> {
    async fn call(&self, params: Value, ctx: &ExecutionContext) -> Result<Value, ToolError> {
        let params: T::Params = serde_json::from_value(params)
            .map_err(|e| ToolError::Validation(format!("invalid parameters: {e}")))?;
        self.0.validate(&params).map_err(ToolError::Validation)?;
        let output = self.0.run(params, ctx).await?;
        serde_json::to_value(output)
            .map_err(|e| ToolError::Internal(format!("unserializable tool output: {e}")))
    }
}

/// Builds a descriptor from a typed tool, generating the input schema from
/// the params type.
pub fn descriptor<T: Tool>(tool: T) -> ToolDescriptor {
    let name = tool.name();
    let description = tool.description();
    let timeout = tool.timeout();
    let input_schema = serde_json::to_value(schemars::schema_for!(T::Params))
        .unwrap_or_else(|_| serde_json::json!({"type": "object"}));
    ToolDescriptor {
        name,
        description,
        input_schema,
        timeout,
        handler: Arc::new(TypedHandler(tool)),
    }
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<ToolDescriptor>,
    index: HashMap<&'static str, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, descriptor: ToolDescriptor) -> Result<(), DuplicateToolError> {
        if self.index.contains_key(descriptor.name) {
            return Err(DuplicateToolError {
                name: descriptor.name.to_string(),
            });
        }
        self.index.insert(descriptor.name, self.tools.len());
        self.tools.push(descriptor);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Result<&ToolDescriptor, ToolNotFoundError> {
        self.index
            .get(name)
            .map(|i| &self.tools[*i])
            .ok_or_else(|| ToolNotFoundError {
                name: name.to_string(),
            })
    }

    /// Manifest entries in registration order.
    pub fn list(&self) -> Vec<ToolManifestEntry> {
        self.tools.iter().map(ToolDescriptor::manifest_entry).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
