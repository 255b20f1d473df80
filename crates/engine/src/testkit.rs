//! Shared test doubles for engine tests.

use crate::events::{Phase, RunHandler};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use tokio::sync::mpsc;
use triact_core::{
    ChatRequest, ConversationId, CorrelationId, Error, ExecutionContext, GatewayError, LlmGateway,
    Message, MessageSink, ServerRef, SinkError, StreamEvent, ToolCall, ToolCatalog, ToolDefinition,
    ToolError, ToolExecutor, ToolInfo,
};

/// One scripted stream: the events to deliver, and whether to keep the
/// channel open afterwards until `halt` is called (for cancellation
/// tests).
pub(crate) struct Script {
    pub events: Vec<StreamEvent>,
    pub hold_open: bool,
}

impl Script {
    pub fn from_events(events: Vec<StreamEvent>) -> Self {
        Self {
            events,
            hold_open: false,
        }
    }

    /// A turn that streams `content` and finishes.
    pub fn text(content: &str) -> Self {
        Self::from_events(vec![
            StreamEvent::Content {
                delta: content.into(),
            },
            StreamEvent::Done,
        ])
    }

    /// A think turn: visible text followed by a control tag.
    pub fn think(answer: &str, should_continue: bool, reason: &str) -> Self {
        Self::text(&format!(
            "{answer}\n<agent_meta>\n{{\"shouldContinue\": {should_continue}, \"reason\": \"{reason}\"}}\n</agent_meta>"
        ))
    }

    /// An act turn that requests tool calls.
    pub fn tool_calls(note: &str, calls: Vec<ToolCall>) -> Self {
        Self::from_events(vec![
            StreamEvent::Content { delta: note.into() },
            StreamEvent::ToolCalls { calls },
            StreamEvent::Done,
        ])
    }

    /// A turn that fails with a stream error.
    pub fn error(message: &str) -> Self {
        Self::from_events(vec![StreamEvent::Error {
            message: message.into(),
        }])
    }

    /// A turn that delivers `events` and then stays open until halted.
    pub fn hold_after(events: Vec<StreamEvent>) -> Self {
        Self {
            events,
            hold_open: true,
        }
    }
}

/// A gateway that plays back a queue of scripts, one per `open` call.
/// Panics when opened more often than scripted.
pub(crate) struct ScriptedGateway {
    scripts: Mutex<VecDeque<Script>>,
    held: Mutex<HashMap<String, mpsc::Sender<StreamEvent>>>,
    pub halts: Mutex<Vec<String>>,
}

impl ScriptedGateway {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            held: Mutex::new(HashMap::new()),
            halts: Mutex::new(Vec::new()),
        }
    }

    pub fn remaining(&self) -> usize {
        self.scripts.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmGateway for ScriptedGateway {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn open(&self, request: ChatRequest) -> Result<mpsc::Receiver<StreamEvent>, GatewayError> {
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .expect("ScriptedGateway: no more scripts");
        let (tx, rx) = mpsc::channel(64);
        for event in script.events {
            tx.send(event).await.expect("receiver alive during setup");
        }
        if script.hold_open {
            self.held
                .lock()
                .unwrap()
                .insert(request.correlation.0.clone(), tx);
        }
        Ok(rx)
    }

    async fn halt(&self, correlation: &CorrelationId) {
        self.halts.lock().unwrap().push(correlation.0.clone());
        let held = self.held.lock().unwrap().remove(&correlation.0);
        if let Some(tx) = held {
            let _ = tx.send(StreamEvent::Stopped).await;
        }
    }
}

/// A fixed catalog: registered tools resolve to a local server, and a
/// name set controls the confirmation policy.
#[derive(Default)]
pub(crate) struct StaticCatalog {
    tools: Vec<ToolDefinition>,
    auto: HashSet<String>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tool(mut self, name: &str, auto_confirmable: bool) -> Self {
        self.tools.push(ToolDefinition {
            name: name.into(),
            description: format!("The {name} tool"),
            schema: serde_json::json!({ "type": "object" }),
        });
        if auto_confirmable {
            self.auto.insert(name.into());
        }
        self
    }

    /// Mark a name auto-confirmable without hosting it on any server.
    pub fn with_unhosted(mut self, name: &str) -> Self {
        self.auto.insert(name.into());
        self
    }
}

impl ToolCatalog for StaticCatalog {
    fn available(&self) -> Vec<ToolInfo> {
        self.tools
            .iter()
            .map(|t| ToolInfo {
                name: t.name.clone(),
                description: t.description.clone(),
            })
            .collect()
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.clone()
    }

    fn resolve_server(&self, tool_name: &str) -> Option<ServerRef> {
        self.tools.iter().any(|t| t.name == tool_name).then(|| ServerRef {
            key: Some("local".into()),
            name: "Local Tools".into(),
        })
    }

    fn all_auto_confirmable(&self, calls: &[ToolCall]) -> bool {
        calls.iter().all(|c| self.auto.contains(&c.name))
    }
}

/// An executor that returns canned results per tool name and records
/// every invocation.
#[derive(Default)]
pub(crate) struct ScriptedExecutor {
    results: HashMap<String, serde_json::Value>,
    failures: HashSet<String>,
    pub invocations: Mutex<Vec<(String, serde_json::Value, ExecutionContext)>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_result(mut self, tool: &str, value: serde_json::Value) -> Self {
        self.results.insert(tool.into(), value);
        self
    }

    pub fn with_failure(mut self, tool: &str) -> Self {
        self.failures.insert(tool.into());
        self
    }
}

#[async_trait]
impl ToolExecutor for ScriptedExecutor {
    async fn execute(
        &self,
        _server: &ServerRef,
        tool_name: &str,
        arguments: serde_json::Value,
        context: &ExecutionContext,
    ) -> Result<serde_json::Value, ToolError> {
        self.invocations
            .lock()
            .unwrap()
            .push((tool_name.to_string(), arguments, context.clone()));
        if self.failures.contains(tool_name) {
            return Err(ToolError::ExecutionFailed {
                tool_name: tool_name.into(),
                reason: "scripted failure".into(),
            });
        }
        Ok(self
            .results
            .get(tool_name)
            .cloned()
            .unwrap_or_else(|| serde_json::json!({ "ok": true })))
    }
}

/// A sink that records every save.
#[derive(Default)]
pub(crate) struct RecordingSink {
    pub saved: Mutex<Vec<Message>>,
}

#[async_trait]
impl MessageSink for RecordingSink {
    async fn save(&self, message: &Message, _conversation: &ConversationId) -> Result<(), SinkError> {
        self.saved.lock().unwrap().push(message.clone());
        Ok(())
    }
}

/// A sink that always fails.
pub(crate) struct FailingSink;

#[async_trait]
impl MessageSink for FailingSink {
    async fn save(
        &self,
        _message: &Message,
        _conversation: &ConversationId,
    ) -> Result<(), SinkError> {
        Err(SinkError::Storage("scripted sink failure".into()))
    }
}

/// A handler that records everything it observes.
#[derive(Default)]
pub(crate) struct RecordingHandler {
    pub phases: Mutex<Vec<Phase>>,
    pub iterations: Mutex<Vec<u32>>,
    pub logs: Mutex<Vec<String>>,
    pub errors: Mutex<Vec<String>>,
}

impl RunHandler for RecordingHandler {
    fn on_phase(&self, phase: Phase) {
        self.phases.lock().unwrap().push(phase);
    }

    fn on_iteration(&self, iteration: u32) {
        self.iterations.lock().unwrap().push(iteration);
    }

    fn on_log(&self, message: &str) {
        self.logs.lock().unwrap().push(message.to_string());
    }

    fn on_error(&self, error: &Error) {
        self.errors.lock().unwrap().push(error.to_string());
    }
}

/// Helper to create a tool call with JSON arguments.
pub(crate) fn call(id: &str, name: &str, args: serde_json::Value) -> ToolCall {
    ToolCall {
        id: id.into(),
        name: name.into(),
        arguments: serde_json::to_string(&args).unwrap(),
    }
}
