//! The triact orchestration loop — the heart of the system.
//!
//! The engine drives a language model through a **Think → Act → Observe**
//! cycle:
//!
//! 1. **Think**: stream a turn that analyzes the situation and ends with a
//!    continuation directive (continue, or stop with the final answer)
//! 2. **Act**: stream a turn with the tool catalog attached; execute the
//!    requested tool calls, or pause for human confirmation
//! 3. **Observe**: stream a short summary of the tool results, then loop
//!    back to thinking
//!
//! The loop continues until a think turn decides to stop, an act turn
//! produces no tool calls, the iteration cap is reached, confirmation is
//! required, or the run is cancelled. All collaborators (gateway, catalog,
//! executor, sink) are injected ports defined in `triact-core`.

mod collect;

pub mod directive;
pub mod engine;
pub mod events;
pub mod prompt;

#[cfg(test)]
pub(crate) mod testkit;

pub use directive::{Directive, extract_directive, strip_directive};
pub use engine::{Engine, RunOptions, RunOutcome, RunReport};
pub use events::{NoopHandler, Phase, RunHandler};
pub use prompt::PromptComposer;
