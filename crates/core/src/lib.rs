//! # triact Core
//!
//! Domain types, port traits, and error definitions for the triact agent
//! orchestration loop. This crate has **zero framework dependencies** — it
//! defines the domain model that the engine and every adapter implement
//! against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator of the loop (LLM gateway, tool catalog, tool
//! executor, persistence sink) is defined as a trait here. Implementations
//! live in host applications or adapter crates. This enables:
//! - Swapping backends via configuration
//! - Easy testing with scripted implementations
//! - Clean dependency graph (everything depends inward on core)

pub mod catalog;
pub mod error;
pub mod gateway;
pub mod message;
pub mod sink;

// Re-export key types at crate root for ergonomics
pub use catalog::{ExecutionContext, ServerRef, ToolCatalog, ToolExecutor, ToolInfo};
pub use error::{Error, GatewayError, Result, SinkError, ToolError};
pub use gateway::{ChatRequest, CorrelationId, LlmGateway, StreamEvent, ToolDefinition};
pub use message::{ConversationId, Message, Role, ToolCall};
pub use sink::{MessageSink, NullSink};
