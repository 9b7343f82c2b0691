//! Tool-invocation routing.
//!
//! The engine asks the host application to perform actions by sending
//! tool-invocation batches; an external executor performs them. The router
//! records each invocation, runs the executor on its own task, and hands
//! the outcome back to the session loop for id-correlated delivery. Only id
//! correlation is guaranteed; invocations from one batch may resolve in any
//! order.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::core::engine::ToolInvocation;

/// Errors an executor may surface. Never propagated as a protocol fault:
/// the router encodes them into the result payload.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// The named tool does not exist in the catalog
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// The tool ran and failed
    #[error("tool execution failed: {0}")]
    Failed(String),
}

/// External executor for tool invocations.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Perform `name` with the given argument map and return its payload.
    async fn execute(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value, ExecutorError>;
}

/// One entry of the tool-call log.
///
/// Appended as pending when the invocation arrives; `result` is attached in
/// place once the executor resolves.
#[derive(Debug, Clone, Serialize)]
pub struct ToolCallRecord {
    /// Opaque invocation id
    pub id: String,
    /// Tool name
    pub name: String,
    /// Argument map as received
    pub arguments: serde_json::Value,
    /// Executor payload, present once resolved
    pub result: Option<serde_json::Value>,
}

/// Executor outcome, correlated by the originating invocation id.
#[derive(Debug, Clone)]
pub struct ToolResult {
    /// Invocation id, echoed unchanged
    pub id: String,
    /// Result payload; executor failures are encoded as
    /// `{"error": "..."}` rather than dropped
    pub payload: serde_json::Value,
}

/// Routes invocations to the executor and outcomes back to the session.
pub struct ToolCallRouter {
    executor: Arc<dyn ToolExecutor>,
    log: Arc<RwLock<Vec<ToolCallRecord>>>,
    outcomes_tx: mpsc::UnboundedSender<ToolResult>,
}

impl ToolCallRouter {
    /// Create a router recording into `log` and delivering outcomes on
    /// `outcomes_tx`.
    pub fn new(
        executor: Arc<dyn ToolExecutor>,
        log: Arc<RwLock<Vec<ToolCallRecord>>>,
        outcomes_tx: mpsc::UnboundedSender<ToolResult>,
    ) -> Self {
        Self {
            executor,
            log,
            outcomes_tx,
        }
    }

    /// Dispatch one invocation. Fire-and-forget: the outcome arrives
    /// asynchronously on the outcome channel, and an outcome that resolves
    /// after the session is gone is dropped.
    pub fn dispatch(&self, invocation: ToolInvocation) {
        tracing::debug!(id = %invocation.id, name = %invocation.name, "dispatching tool invocation");

        self.log.write().push(ToolCallRecord {
            id: invocation.id.clone(),
            name: invocation.name.clone(),
            arguments: invocation.arguments.clone(),
            result: None,
        });

        let executor = Arc::clone(&self.executor);
        let outcomes = self.outcomes_tx.clone();
        tokio::spawn(async move {
            let payload = match executor
                .execute(&invocation.name, invocation.arguments)
                .await
            {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::warn!(id = %invocation.id, name = %invocation.name, "tool executor failed: {e}");
                    serde_json::json!({ "error": e.to_string() })
                }
            };
            if outcomes
                .send(ToolResult {
                    id: invocation.id,
                    payload,
                })
                .is_err()
            {
                tracing::debug!("session ended before tool result could be delivered");
            }
        });
    }

    /// Attach `result` to its pending log record. Returns the tool name for
    /// the wire response, or `None` when no pending record matches the id.
    pub fn resolve(&self, result: &ToolResult) -> Option<String> {
        let mut log = self.log.write();
        let record = log
            .iter_mut()
            .find(|record| record.id == result.id && record.result.is_none())?;
        record.result = Some(result.payload.clone());
        Some(record.name.clone())
    }
}
