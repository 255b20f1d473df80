//! Run observation — the phase vocabulary and the caller's callback set.
//!
//! Everything a host needs to observe a run is delivered through
//! [`RunHandler`]: history snapshots as they mutate, phase and iteration
//! changes, log lines, and errors. All methods default to no-ops so a
//! handler implements only what it cares about.

use serde::{Deserialize, Serialize};
use triact_core::{Error, Message};

/// One directed step of the agent loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// No run in progress
    Idle,
    /// Analyzing and deciding whether to continue
    Thought,
    /// Executing the decided step, possibly through tools
    Action,
    /// Summarizing the latest tool results
    Observation,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Thought => "thought",
            Phase::Action => "action",
            Phase::Observation => "observation",
        };
        write!(f, "{name}")
    }
}

/// Callbacks through which a run reports progress to its caller.
///
/// Called from the run's own task; implementations should return quickly
/// and must be safe to call from any thread.
pub trait RunHandler: Send + Sync {
    /// The working history changed: a message was appended or an
    /// in-progress message grew by a stream delta.
    fn on_history(&self, _history: &[Message]) {}

    /// The run entered a new phase.
    fn on_phase(&self, _phase: Phase) {}

    /// A new loop iteration began (counted from 1).
    fn on_iteration(&self, _iteration: u32) {}

    /// A diagnostic line about the run's progress.
    fn on_log(&self, _message: &str) {}

    /// A recoverable or terminal failure occurred.
    fn on_error(&self, _error: &Error) {}
}

/// A handler that observes nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHandler;

impl RunHandler for NoopHandler {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Phase::Thought).unwrap(), "\"thought\"");
        assert_eq!(serde_json::to_string(&Phase::Idle).unwrap(), "\"idle\"");
    }

    #[test]
    fn phase_displays_lowercase() {
        assert_eq!(Phase::Observation.to_string(), "observation");
    }

    #[test]
    fn noop_handler_accepts_everything() {
        let handler = NoopHandler;
        handler.on_phase(Phase::Action);
        handler.on_iteration(3);
        handler.on_log("nothing to see");
        handler.on_history(&[]);
    }
}
