//! Phase prompt composition.
//!
//! Each phase has a fixed core template describing its sole responsibility
//! and output rules. Templates are pure functions of their inputs. A host
//! may layer business context on top: a per-phase string, or a default
//! applied to any phase without its own entry, appended as a separate
//! titled section after the core template.

use crate::events::Phase;
use std::collections::HashMap;
use triact_core::ToolInfo;

/// Builds the system prompt for each phase of the loop.
#[derive(Debug, Default, Clone)]
pub struct PromptComposer {
    default_context: Option<String>,
    contexts: HashMap<Phase, String>,
}

impl PromptComposer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the business context applied to every phase without its own
    /// entry.
    pub fn set_default_context(&mut self, context: impl Into<String>) {
        self.default_context = Some(context.into());
    }

    /// Set the business context for one phase.
    pub fn set_context(&mut self, phase: Phase, context: impl Into<String>) {
        self.contexts.insert(phase, context.into());
    }

    /// The think-phase prompt. Tools are listed for awareness only; the
    /// template forbids calling them in this phase.
    pub fn think_prompt(
        &self,
        resource_id: Option<&str>,
        task_id: Option<&str>,
        tools: &[ToolInfo],
    ) -> String {
        self.with_context(Phase::Thought, think_template(resource_id, task_id, tools))
    }

    /// The act-phase prompt. Tools are listed for execution.
    pub fn act_prompt(
        &self,
        resource_id: Option<&str>,
        task_id: Option<&str>,
        tools: &[ToolInfo],
    ) -> String {
        self.with_context(Phase::Action, act_template(resource_id, task_id, tools))
    }

    /// The observe-phase prompt. No tool list; summary only.
    pub fn observe_prompt(&self, resource_id: Option<&str>, task_id: Option<&str>) -> String {
        self.with_context(Phase::Observation, observe_template(resource_id, task_id))
    }

    fn with_context(&self, phase: Phase, template: String) -> String {
        let context = self
            .contexts
            .get(&phase)
            .map(String::as_str)
            .or(self.default_context.as_deref())
            .map(str::trim)
            .filter(|c| !c.is_empty());

        match context {
            Some(context) => format!("{template}\n\n---\n\n## Business Context\n{context}"),
            None => template,
        }
    }
}

fn base_context(resource_id: Option<&str>, task_id: Option<&str>) -> String {
    let mut out = String::from(
        "You are a capable assistant operating inside a resource-oriented workspace.\n\
         \n\
         Tool usage policy:\n\
         Check the conversation history before calling any tool.\n\
         - If the needed information is already present, use it instead of calling the tool again.\n\
         - Call a tool only when the information is missing, may be stale, or the user explicitly asks for fresh data.",
    );

    if resource_id.is_some() || task_id.is_some() {
        out.push_str("\n\nCurrent context:");
        if let Some(id) = resource_id {
            out.push_str(&format!(
                "\n- Active resource id: {id}. Related tools can look up details for this resource."
            ));
        }
        if let Some(id) = task_id {
            out.push_str(&format!(
                "\n- Active task id: {id}. Related tools can look up details for this task."
            ));
        }
    }

    out
}

fn tools_section(tools: &[ToolInfo]) -> String {
    if tools.is_empty() {
        return String::new();
    }
    let listing = tools
        .iter()
        .map(|t| format!("- {}: {}", t.name, t.description))
        .collect::<Vec<_>>()
        .join("\n");
    format!("\n\n## Available Tools\n{listing}")
}

fn think_template(resource_id: Option<&str>, task_id: Option<&str>, tools: &[ToolInfo]) -> String {
    format!(
        "{base}{tools}\n\n\
         ## Current Phase: Think\n\
         \n\
         Your responsibility:\n\
         Analyze the situation, decide what should happen next, and state whether another action pass is needed.\n\
         \n\
         Notes:\n\
         - You share one conversation history with the act and observe phases.\n\
         - You may consider the tools listed above, but you must not call any tool yourself. Describe the intended tool use in plain text; the act phase performs the call.\n\
         - Always write out your analysis. If you can already answer the user, write the complete answer here.\n\
         - If the history contains an observation with a suggestion, take it into account.\n\
         \n\
         Deciding whether to continue:\n\
         - \"shouldContinue\": true means another action pass is needed: a tool must be called, more data must be processed, or the answer is still incomplete.\n\
         - \"shouldContinue\": false means you can answer directly from what is already known; in that case the complete answer must appear in this turn.\n\
         \n\
         Output format (strict, in this order):\n\
         1. Your analysis, or the complete answer when no further action is needed.\n\
         2. A single control tag, last:\n\
         \n\
         <agent_meta>\n\
         {{\"shouldContinue\": false, \"reason\": \"enough information to answer\"}}\n\
         </agent_meta>\n\
         \n\
         Rules:\n\
         - The tag carries only the two fields shown, \"shouldContinue\" and \"reason\". Never add other fields.\n\
         - Never output only the tag; the visible text comes first.\n\
         - The tag is internal. Do not mention it or its contents in the reply.",
        base = base_context(resource_id, task_id),
        tools = tools_section(tools),
    )
}

fn act_template(resource_id: Option<&str>, task_id: Option<&str>, tools: &[ToolInfo]) -> String {
    format!(
        "{base}{tools}\n\n\
         ## Current Phase: Act\n\
         \n\
         Your responsibility:\n\
         Carry out what the think phase decided. If it called for a tool, call that tool now; a textual description is not a substitute for the call.\n\
         \n\
         Notes:\n\
         - You share one conversation history with the think and observe phases.\n\
         - Output only a brief note on what you are doing. After a tool call the system appends the result; do not invent one.\n\
         - When the think phase did not require a tool, write the answer or analysis it asked for directly.",
        base = base_context(resource_id, task_id),
        tools = tools_section(tools),
    )
}

fn observe_template(resource_id: Option<&str>, task_id: Option<&str>) -> String {
    format!(
        "{base}\n\n\
         ## Current Phase: Observe\n\
         \n\
         Your responsibility:\n\
         Summarize the most recent tool results in one or two sentences. Add a short suggestion for the next step if one is warranted.\n\
         \n\
         Rules:\n\
         - Output only the summary and the optional suggestion.\n\
         - Do not answer the user's question here.",
        base = base_context(resource_id, task_id),
    )
}
