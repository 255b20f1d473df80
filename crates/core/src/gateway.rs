//! LlmGateway trait — the abstraction over the chat completion backend.
//!
//! A gateway knows how to send one chat request to an LLM and deliver the
//! response as a stream of incremental events. The engine calls `open()`
//! without knowing which backend is behind it — pure polymorphism.
//!
//! Each call gets its own correlation id and its own event channel;
//! dropping the receiver releases the subscription. The gateway delivers
//! exactly one terminal event (`Done`, `Stopped`, or `Error`) per
//! correlation id; anything sent after a terminal event is undefined
//! behavior and consumers are free to ignore it.

use crate::error::GatewayError;
use crate::message::{Message, ToolCall};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A value unique to one streaming call, used to route events to the
/// awaiting phase executor and to halt the stream on cancellation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId(pub String);

impl CorrelationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A tool definition sent to the LLM so it knows what tools it can call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub schema: serde_json::Value,
}

/// One chat completion round trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Which backend configuration to use
    pub config_id: String,

    /// The ordered conversation history
    pub messages: Vec<Message>,

    /// Tools the model may call; empty when the phase forbids calls
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,

    /// The system prompt for this call
    pub system_prompt: String,

    /// Correlation id routing this call's event stream
    pub correlation: CorrelationId,
}

/// A single event in a streaming response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Partial text delta.
    Content { delta: String },

    /// Partial deliberation delta; display-only, never a control signal.
    Reasoning { delta: String },

    /// The final tool call list, delivered once per batch (not incremental).
    ToolCalls { calls: Vec<ToolCall> },

    /// Terminal: the stream finished successfully.
    Done,

    /// Terminal: the stream was halted by a cancellation request.
    Stopped,

    /// Terminal: the backend reported a failure.
    Error { message: String },
}

impl StreamEvent {
    /// Whether this event ends the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Stopped | Self::Error { .. })
    }
}

/// The gateway port.
///
/// Implementations wrap a concrete chat backend (an HTTP API, an IPC
/// bridge, a local model) behind the event-stream contract above.
#[async_trait]
pub trait LlmGateway: Send + Sync {
    /// A human-readable name for this gateway.
    fn name(&self) -> &str;

    /// Open one streaming chat call. The returned receiver yields this
    /// call's events until a terminal event arrives; the caller drops it
    /// afterwards to release the subscription.
    async fn open(
        &self,
        request: ChatRequest,
    ) -> std::result::Result<tokio::sync::mpsc::Receiver<StreamEvent>, GatewayError>;

    /// Ask the backend to halt an in-flight stream. The stream answers
    /// with a `Stopped` terminal event; halting an unknown or already
    /// finished correlation id is a no-op.
    async fn halt(&self, correlation: &CorrelationId);
}
