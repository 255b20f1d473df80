//! Tool catalog and executor traits — the abstraction over agent
//! capabilities.
//!
//! The catalog reports what tools exist, which server hosts each one, and
//! whether a batch of calls may run without human approval. The executor
//! performs one side-effecting call. Both are read-only from the engine's
//! perspective: the loop decides *when* to call a tool, never what the
//! tool does.

use crate::error::ToolError;
use crate::gateway::ToolDefinition;
use crate::message::ToolCall;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A tool's name and description, used where only awareness is needed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
}

/// The server hosting a tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerRef {
    /// Stable lookup key, when the host distinguishes it from the name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    /// Display name
    pub name: String,
}

impl ServerRef {
    /// The identifier to address the server by: the key when present,
    /// the name otherwise.
    pub fn address(&self) -> &str {
        self.key.as_deref().unwrap_or(&self.name)
    }
}

/// Contextual identifiers carried alongside every tool invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionContext {
    /// The resource the conversation is currently about, if any
    #[serde(default)]
    pub resource_id: Option<String>,

    /// The task the conversation is currently about, if any
    #[serde(default)]
    pub task_id: Option<String>,
}

/// The catalog port.
pub trait ToolCatalog: Send + Sync {
    /// Names and descriptions of the currently available tools.
    fn available(&self) -> Vec<ToolInfo>;

    /// Full definitions (including parameter schemas) for sending to the
    /// model in phases that may execute tools.
    fn definitions(&self) -> Vec<ToolDefinition>;

    /// Which server hosts the named tool, if any.
    fn resolve_server(&self, tool_name: &str) -> Option<ServerRef>;

    /// Whether every call in the batch may execute without pausing for
    /// human approval.
    fn all_auto_confirmable(&self, calls: &[ToolCall]) -> bool;
}

/// The executor port: performs one tool call against its hosting server.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(
        &self,
        server: &ServerRef,
        tool_name: &str,
        arguments: serde_json::Value,
        context: &ExecutionContext,
    ) -> std::result::Result<serde_json::Value, ToolError>;
}
