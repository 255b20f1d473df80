//! Persistence sink trait.
//!
//! The engine hands finalized messages to the sink; it never writes
//! partial stream fragments. Persistence is best-effort from the loop's
//! perspective: failures are logged and reported, not escalated.

use crate::error::SinkError;
use crate::message::{ConversationId, Message};
use async_trait::async_trait;

/// The persistence port.
#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Durably store a finalized message.
    ///
    /// Saving a message whose id already exists replaces the stored
    /// record; the engine relies on this for the single permitted
    /// correction of a final answer (control-tag removal).
    async fn save(
        &self,
        message: &Message,
        conversation: &ConversationId,
    ) -> std::result::Result<(), SinkError>;
}

/// A sink that discards everything. Useful for tests and for hosts that
/// keep history purely in memory.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

#[async_trait]
impl MessageSink for NullSink {
    async fn save(
        &self,
        _message: &Message,
        _conversation: &ConversationId,
    ) -> std::result::Result<(), SinkError> {
        Ok(())
    }
}
