//! The orchestration engine — the think → act → observe state machine.
//!
//! One [`Engine`] drives one logical run at a time: it composes the phase
//! prompt, streams a model turn through the gateway, parses the
//! continuation directive, executes tool calls (or pauses for human
//! confirmation), and loops until a terminal condition. Runs are bounded
//! by an iteration cap and cancellable through [`Engine::stop`].
//!
//! All collaborators are injected ports; the engine owns no backend
//! logic of its own.

use crate::collect::{Turn, TurnOutcome, collect_turn};
use crate::directive::{Directive, extract_directive, strip_directive};
use crate::events::{Phase, RunHandler};
use crate::prompt::PromptComposer;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};
use triact_config::EngineConfig;
use triact_core::{
    ChatRequest, ConversationId, CorrelationId, Error, ExecutionContext, LlmGateway, Message,
    MessageSink, Role, ToolCall, ToolCatalog, ToolDefinition, ToolExecutor,
};

const DEFAULT_MAX_ITERATIONS: u32 = 10;

const FALLBACK_ANSWER: &str =
    "Sorry, I was unable to produce a complete answer. Please try asking again.";

/// Options for one run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Which gateway configuration to use
    pub config_id: String,

    /// The conversation messages are persisted under
    pub conversation_id: ConversationId,

    /// The starting history; the run extends a working copy of it
    pub history: Vec<Message>,

    /// The resource the conversation is currently about, if any
    pub resource_id: Option<String>,

    /// The task the conversation is currently about, if any
    pub task_id: Option<String>,

    /// Override for the engine's iteration cap
    pub max_iterations: Option<u32>,
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// A final answer was produced.
    Completed,
    /// Tool calls await human confirmation; resume with
    /// [`Engine::resume_after_confirmation`].
    AwaitingConfirmation,
    /// The run was cancelled through [`Engine::stop`].
    Cancelled,
    /// The iteration cap was reached.
    IterationCapReached,
    /// A think turn carried no continuation directive.
    MissingDirective,
    /// A stream failed; details went to the handler's `on_error`.
    Failed,
}

/// The result of one run.
#[derive(Debug)]
pub struct RunReport {
    pub outcome: RunOutcome,

    /// Iterations performed (counted from 1; 0 when the loop never ran)
    pub iterations: u32,

    /// The working history at exit, including any partial turn
    pub history: Vec<Message>,
}

/// The orchestration engine.
///
/// Construct with the four injected ports, adjust with the builder
/// methods, then call [`Engine::run`]. One engine instance drives one
/// run at a time; separate conversations get separate instances.
pub struct Engine {
    gateway: Arc<dyn LlmGateway>,
    catalog: Arc<dyn ToolCatalog>,
    executor: Arc<dyn ToolExecutor>,
    sink: Arc<dyn MessageSink>,
    prompts: PromptComposer,
    default_max_iterations: u32,
    fallback_answer: String,
    stopped: AtomicBool,
    live_stream: Mutex<Option<CorrelationId>>,
}

impl Engine {
    pub fn new(
        gateway: Arc<dyn LlmGateway>,
        catalog: Arc<dyn ToolCatalog>,
        executor: Arc<dyn ToolExecutor>,
        sink: Arc<dyn MessageSink>,
    ) -> Self {
        Self {
            gateway,
            catalog,
            executor,
            sink,
            prompts: PromptComposer::new(),
            default_max_iterations: DEFAULT_MAX_ITERATIONS,
            fallback_answer: FALLBACK_ANSWER.into(),
            stopped: AtomicBool::new(false),
            live_stream: Mutex::new(None),
        }
    }

    /// Set the default iteration cap (overridable per run).
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.default_max_iterations = max;
        self
    }

    /// Set the answer used when a final turn carries no visible text.
    pub fn with_fallback_answer(mut self, answer: impl Into<String>) -> Self {
        self.fallback_answer = answer.into();
        self
    }

    /// Replace the prompt composer.
    pub fn with_prompts(mut self, prompts: PromptComposer) -> Self {
        self.prompts = prompts;
        self
    }

    /// Apply settings from a loaded configuration.
    pub fn with_config(mut self, config: &EngineConfig) -> Self {
        self.default_max_iterations = config.max_iterations;
        if let Some(answer) = &config.fallback_answer {
            self.fallback_answer = answer.clone();
        }
        if let Some(context) = &config.context.default {
            self.prompts.set_default_context(context.as_str());
        }
        if let Some(context) = &config.context.thought {
            self.prompts.set_context(Phase::Thought, context.as_str());
        }
        if let Some(context) = &config.context.action {
            self.prompts.set_context(Phase::Action, context.as_str());
        }
        if let Some(context) = &config.context.observation {
            self.prompts.set_context(Phase::Observation, context.as_str());
        }
        self
    }

    /// Request cancellation: the flag is observed at the next suspension
    /// point, and the in-flight stream (if any) is asked to halt.
    pub async fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        if let Some(correlation) = self.current_live() {
            self.gateway.halt(&correlation).await;
        }
    }

    /// Execute the full loop until a terminal condition.
    pub async fn run(&self, mut options: RunOptions, handler: &dyn RunHandler) -> RunReport {
        self.stopped.store(false, Ordering::SeqCst);
        let max_iterations = options
            .max_iterations
            .unwrap_or(self.default_max_iterations);
        let mut history = std::mem::take(&mut options.history);
        let context = ExecutionContext {
            resource_id: options.resource_id.clone(),
            task_id: options.task_id.clone(),
        };

        info!(
            conversation_id = %options.conversation_id,
            max_iterations,
            messages = history.len(),
            "run starting"
        );

        let mut iteration = 0u32;
        let mut outcome = None;

        while iteration < max_iterations && !self.is_stopped() {
            iteration += 1;
            handler.on_iteration(iteration);
            debug!(iteration, "loop iteration");

            // ── Think ──
            handler.on_phase(Phase::Thought);
            let turn = self
                .think_turn(&options, &mut history, handler)
                .await;
            let turn = match self.check_turn(turn, handler) {
                Ok(turn) => turn,
                Err(ended) => {
                    outcome = Some(ended);
                    break;
                }
            };

            let Some(directive) = extract_directive(&turn.content) else {
                warn!("think turn carried no continuation directive");
                handler.on_log("think phase produced no continuation directive; ending run");
                outcome = Some(RunOutcome::MissingDirective);
                break;
            };
            debug!(
                should_continue = directive.should_continue,
                reason = directive.reason.as_deref().unwrap_or(""),
                "directive parsed"
            );

            if !directive.should_continue {
                self.finalize_answer(&directive, &turn, &mut history, &options, handler)
                    .await;
                outcome = Some(RunOutcome::Completed);
                break;
            }

            // ── Act ──
            handler.on_phase(Phase::Action);
            let turn = self.act_turn(&options, &mut history, handler).await;
            let turn = match self.check_turn(turn, handler) {
                Ok(turn) => turn,
                Err(ended) => {
                    outcome = Some(ended);
                    break;
                }
            };

            if turn.tool_calls.is_empty() {
                handler.on_log("act phase requested no tool calls; treating its text as the final answer");
                outcome = Some(RunOutcome::Completed);
                break;
            }

            if !self.catalog.all_auto_confirmable(&turn.tool_calls) {
                handler.on_log("tool calls require confirmation; pausing run");
                if let Some(message) = history
                    .iter_mut()
                    .rev()
                    .find(|m| m.role == Role::Assistant && !m.tool_calls.is_empty())
                {
                    message.pending_tool_calls = Some(turn.tool_calls.clone());
                }
                handler.on_history(&history);
                outcome = Some(RunOutcome::AwaitingConfirmation);
                break;
            }

            self.execute_calls(&turn.tool_calls, &context, &options, &mut history, handler)
                .await;
            if self.is_stopped() {
                outcome = Some(RunOutcome::Cancelled);
                break;
            }

            // ── Observe ──
            handler.on_phase(Phase::Observation);
            let turn = self.observe_turn(&options, &mut history, handler).await;
            if let Err(ended) = self.check_turn(turn, handler) {
                outcome = Some(ended);
                break;
            }
            // The observation never carries a directive; loop back to think.
        }

        let outcome = outcome.unwrap_or_else(|| {
            if self.is_stopped() {
                RunOutcome::Cancelled
            } else {
                warn!(max_iterations, "iteration cap reached");
                handler.on_log("iteration cap reached; ending run");
                RunOutcome::IterationCapReached
            }
        });

        info!(?outcome, iterations = iteration, "run finished");
        handler.on_phase(Phase::Idle);
        RunReport {
            outcome,
            iterations: iteration,
            history,
        }
    }

    /// Execute previously pending tool calls, then re-enter the loop with
    /// the extended history.
    ///
    /// The iteration counter restarts: work is bounded per resume, and
    /// each resume requires an explicit human confirmation.
    pub async fn resume_after_confirmation(
        &self,
        calls: Vec<ToolCall>,
        mut options: RunOptions,
        handler: &dyn RunHandler,
    ) -> RunReport {
        self.stopped.store(false, Ordering::SeqCst);
        let mut history = std::mem::take(&mut options.history);
        let context = ExecutionContext {
            resource_id: options.resource_id.clone(),
            task_id: options.task_id.clone(),
        };

        handler.on_log(&format!(
            "resuming after confirmation of {} tool call(s)",
            calls.len()
        ));

        // Clear the pause marker before executing.
        if let Some(message) = history
            .iter_mut()
            .rev()
            .find(|m| m.pending_tool_calls.is_some())
        {
            message.pending_tool_calls = None;
        }

        self.execute_calls(&calls, &context, &options, &mut history, handler)
            .await;
        if self.is_stopped() {
            handler.on_phase(Phase::Idle);
            return RunReport {
                outcome: RunOutcome::Cancelled,
                iterations: 0,
                history,
            };
        }

        options.history = history;
        self.run(options, handler).await
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn set_live(&self, correlation: Option<CorrelationId>) {
        let mut guard = match self.live_stream.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = correlation;
    }

    fn current_live(&self) -> Option<CorrelationId> {
        match self.live_stream.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    async fn think_turn(
        &self,
        options: &RunOptions,
        history: &mut Vec<Message>,
        handler: &dyn RunHandler,
    ) -> Turn {
        let system_prompt = self.prompts.think_prompt(
            options.resource_id.as_deref(),
            options.task_id.as_deref(),
            &self.catalog.available(),
        );
        // Awareness only: no tool schema in the think phase.
        self.stream_turn(system_prompt, Vec::new(), options, history, handler)
            .await
    }

    async fn act_turn(
        &self,
        options: &RunOptions,
        history: &mut Vec<Message>,
        handler: &dyn RunHandler,
    ) -> Turn {
        let system_prompt = self.prompts.act_prompt(
            options.resource_id.as_deref(),
            options.task_id.as_deref(),
            &self.catalog.available(),
        );
        self.stream_turn(
            system_prompt,
            self.catalog.definitions(),
            options,
            history,
            handler,
        )
        .await
    }

    async fn observe_turn(
        &self,
        options: &RunOptions,
        history: &mut Vec<Message>,
        handler: &dyn RunHandler,
    ) -> Turn {
        let system_prompt = self
            .prompts
            .observe_prompt(options.resource_id.as_deref(), options.task_id.as_deref());
        self.stream_turn(system_prompt, Vec::new(), options, history, handler)
            .await
    }

    /// One gateway round trip: open the stream, collect the turn into the
    /// history, persist the finalized message.
    async fn stream_turn(
        &self,
        system_prompt: String,
        tools: Vec<ToolDefinition>,
        options: &RunOptions,
        history: &mut Vec<Message>,
        handler: &dyn RunHandler,
    ) -> Turn {
        let correlation = CorrelationId::new();
        self.set_live(Some(correlation.clone()));

        let request = ChatRequest {
            config_id: options.config_id.clone(),
            messages: history.clone(),
            tools,
            system_prompt,
            correlation,
        };

        let mut rx = match self.gateway.open(request).await {
            Ok(rx) => rx,
            Err(error) => {
                self.set_live(None);
                return Turn::failed(error);
            }
        };

        let turn = collect_turn(&mut rx, history, handler).await;
        self.set_live(None);

        if matches!(turn.outcome, TurnOutcome::Completed)
            && let Some(message) = history.last()
            && message.has_substance()
        {
            self.save_best_effort(message, &options.conversation_id, handler)
                .await;
        }

        turn
    }

    fn check_turn(&self, turn: Turn, handler: &dyn RunHandler) -> Result<Turn, RunOutcome> {
        match &turn.outcome {
            TurnOutcome::Completed => Ok(turn),
            TurnOutcome::Stopped => {
                handler.on_log("stream halted by stop request");
                Err(RunOutcome::Cancelled)
            }
            TurnOutcome::Failed(error) => {
                warn!(error = %error, "stream failed");
                handler.on_error(&Error::Gateway(error.clone()));
                Err(RunOutcome::Failed)
            }
        }
    }

    /// Replace the final think turn's content with its stripped text, or
    /// a substitute when nothing visible remains.
    async fn finalize_answer(
        &self,
        directive: &Directive,
        turn: &Turn,
        history: &mut Vec<Message>,
        options: &RunOptions,
        handler: &dyn RunHandler,
    ) {
        let stripped = strip_directive(&turn.content);
        let reasoning = turn.reasoning.trim();
        let reason = directive
            .reason
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty());

        let final_content = if !stripped.is_empty() {
            stripped
        } else if !reasoning.is_empty() {
            handler.on_log("final answer empty after control-tag removal; using the model's reasoning");
            reasoning.to_string()
        } else if let Some(reason) = reason {
            handler.on_log("final answer empty after control-tag removal; using the directive reason");
            reason.to_string()
        } else {
            warn!("final answer empty with no substitute available");
            handler.on_log("final answer empty after control-tag removal; using the fallback answer");
            self.fallback_answer.clone()
        };

        let snapshot = match history.iter_mut().rev().find(|m| m.role == Role::Assistant) {
            Some(message) => {
                message.content = final_content;
                message.clone()
            }
            None => return,
        };
        handler.on_history(history);
        self.save_best_effort(&snapshot, &options.conversation_id, handler)
            .await;
    }

    /// Execute a batch of tool calls in order, appending one tool message
    /// per call. Resolution and execution failures are per-call: reported
    /// through `on_error`, answered with an error-text tool message, and
    /// the batch continues.
    async fn execute_calls(
        &self,
        calls: &[ToolCall],
        context: &ExecutionContext,
        options: &RunOptions,
        history: &mut Vec<Message>,
        handler: &dyn RunHandler,
    ) {
        for call in calls {
            if self.is_stopped() {
                return;
            }
            handler.on_log(&format!("executing tool {}", call.name));

            let content = match self.execute_one(call, context).await {
                Ok(output) => output,
                Err(error) => {
                    warn!(tool = %call.name, error = %error, "tool call failed");
                    let text = format!("Error: {error}");
                    handler.on_error(&error);
                    text
                }
            };

            let message = Message::tool_result(&call.id, &call.name, content);
            self.save_best_effort(&message, &options.conversation_id, handler)
                .await;
            history.push(message);
            handler.on_history(history);
        }
    }

    async fn execute_one(&self, call: &ToolCall, context: &ExecutionContext) -> Result<String, Error> {
        let server = self
            .catalog
            .resolve_server(&call.name)
            .ok_or_else(|| Error::Tool(triact_core::ToolError::NotFound(call.name.clone())))?;

        // Best effort: unparseable arguments become an empty object.
        let arguments: serde_json::Value = serde_json::from_str(&call.arguments)
            .unwrap_or_else(|_| serde_json::Value::Object(serde_json::Map::new()));

        let result = self
            .executor
            .execute(&server, &call.name, arguments, context)
            .await
            .map_err(Error::Tool)?;

        Ok(result.to_string())
    }

    async fn save_best_effort(
        &self,
        message: &Message,
        conversation: &ConversationId,
        handler: &dyn RunHandler,
    ) {
        if let Err(error) = self.sink.save(message, conversation).await {
            warn!(error = %error, "failed to persist message");
            handler.on_log(&format!("failed to persist message: {error}"));
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────
