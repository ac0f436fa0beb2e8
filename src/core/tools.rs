//! Tool-call bridge.
//!
//! The remote model can ask the session to run a named function mid-conversation.
//! Handlers are registered by name in a [`ToolRegistry`]; the [`ToolCallBridge`]
//! runs a batch of requests and produces exactly one [`ToolCallResult`] per
//! request, including for unknown names, handler failures and timeouts.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::core::realtime::{FunctionDeclaration, ToolCallRequest, ToolCallResult};

/// Default upper bound for a single handler invocation.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(15);

/// Failure reported by a tool handler.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Arguments missing or of the wrong shape
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// The side effect itself failed
    #[error("{0}")]
    Failed(String),
}

/// A side-effecting function the model may invoke.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Declaration advertised to the model at session setup.
    fn declaration(&self) -> FunctionDeclaration;

    /// Run the function. The returned value becomes `response.result`.
    async fn invoke(&self, args: Map<String, Value>) -> Result<Value, ToolError>;
}

/// Handlers keyed by function name.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    handlers: HashMap<String, Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its declared name, replacing any previous one.
    pub fn register(&mut self, handler: Arc<dyn ToolHandler>) -> &mut Self {
        let name = handler.declaration().name;
        if self.handlers.insert(name.clone(), handler).is_some() {
            tracing::warn!(tool = %name, "Replaced previously registered tool handler");
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn ToolHandler>> {
        self.handlers.get(name)
    }

    /// Declarations sorted by name.
    pub fn declarations(&self) -> Vec<FunctionDeclaration> {
        let mut declarations: Vec<_> = self.handlers.values().map(|h| h.declaration()).collect();
        declarations.sort_by(|a, b| a.name.cmp(&b.name));
        declarations
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.handlers.keys().collect();
        names.sort();
        f.debug_struct("ToolRegistry").field("tools", &names).finish()
    }
}

/// Runs tool-call batches against the registry.
#[derive(Debug, Clone)]
pub struct ToolCallBridge {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
}

impl ToolCallBridge {
    pub fn new(registry: Arc<ToolRegistry>, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Run every request of a batch concurrently.
    ///
    /// The output has one result per request, in batch order.
    pub async fn dispatch(&self, batch: Vec<ToolCallRequest>) -> Vec<ToolCallResult> {
        join_all(batch.into_iter().map(|request| self.dispatch_one(request))).await
    }

    async fn dispatch_one(&self, request: ToolCallRequest) -> ToolCallResult {
        let ToolCallRequest { id, name, args } = request;

        let Some(handler) = self.registry.get(&name) else {
            tracing::warn!(tool = %name, call_id = %id, "No handler registered for tool call");
            return failure(id, &name, format!("no handler registered for `{}`", name));
        };

        tracing::info!(tool = %name, call_id = %id, "Invoking tool");
        match tokio::time::timeout(self.timeout, handler.invoke(args)).await {
            Ok(Ok(value)) => {
                tracing::debug!(tool = %name, call_id = %id, "Tool call succeeded");
                ToolCallResult {
                    id,
                    name,
                    response: json!({ "result": value }),
                }
            }
            Ok(Err(e)) => {
                tracing::warn!(tool = %name, call_id = %id, error = %e, "Tool call failed");
                failure(id, &name, e.to_string())
            }
            Err(_) => {
                tracing::warn!(
                    tool = %name,
                    call_id = %id,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Tool call timed out"
                );
                failure(
                    id,
                    &name,
                    format!("tool call timed out after {}ms", self.timeout.as_millis()),
                )
            }
        }
    }
}

fn failure(id: String, name: &str, error: String) -> ToolCallResult {
    ToolCallResult {
        id,
        name: name.to_string(),
        response: json!({ "result": "error", "error": error }),
    }
}
