//! Per-phase stream collection.
//!
//! One gateway call produces one assistant turn. The turn's message is
//! created empty, appended to the working history, and mutated in place as
//! deltas arrive, with a history snapshot pushed to the handler after each
//! mutation. Collection ends on the stream's single terminal event;
//! dropping the receiver afterwards releases the subscription.

use crate::events::RunHandler;
use tokio::sync::mpsc;
use tracing::debug;
use triact_core::{GatewayError, Message, StreamEvent, ToolCall};

/// How a collected turn ended.
#[derive(Debug)]
pub(crate) enum TurnOutcome {
    /// The stream delivered `Done`.
    Completed,
    /// The stream delivered `Stopped` in response to a halt request.
    Stopped,
    /// The stream failed or ended without a terminal event.
    Failed(GatewayError),
}

/// One collected assistant turn.
#[derive(Debug)]
pub(crate) struct Turn {
    pub content: String,
    pub reasoning: String,
    pub tool_calls: Vec<ToolCall>,
    pub outcome: TurnOutcome,
}

impl Turn {
    pub(crate) fn failed(error: GatewayError) -> Self {
        Self {
            content: String::new(),
            reasoning: String::new(),
            tool_calls: Vec::new(),
            outcome: TurnOutcome::Failed(error),
        }
    }
}

/// Drain one stream into a fresh assistant message at the end of
/// `history`.
pub(crate) async fn collect_turn(
    rx: &mut mpsc::Receiver<StreamEvent>,
    history: &mut Vec<Message>,
    handler: &dyn RunHandler,
) -> Turn {
    history.push(Message::assistant(""));
    handler.on_history(history);
    let index = history.len() - 1;

    let mut content = String::new();
    let mut reasoning = String::new();
    let mut tool_calls: Vec<ToolCall> = Vec::new();

    let outcome = loop {
        match rx.recv().await {
            Some(StreamEvent::Content { delta }) => {
                if delta.is_empty() {
                    continue;
                }
                content.push_str(&delta);
                history[index].content.push_str(&delta);
                handler.on_history(history);
            }
            Some(StreamEvent::Reasoning { delta }) => {
                if delta.trim().is_empty() {
                    continue;
                }
                reasoning.push_str(&delta);
                let field = history[index].reasoning.get_or_insert_with(String::new);
                field.push_str(&delta);
                handler.on_history(history);
            }
            Some(StreamEvent::ToolCalls { calls }) => {
                debug!(count = calls.len(), "stream delivered tool calls");
                tool_calls = calls.clone();
                history[index].tool_calls = calls;
                handler.on_history(history);
            }
            Some(StreamEvent::Done) => break TurnOutcome::Completed,
            Some(StreamEvent::Stopped) => break TurnOutcome::Stopped,
            Some(StreamEvent::Error { message }) => {
                break TurnOutcome::Failed(GatewayError::Stream(message));
            }
            None => {
                break TurnOutcome::Failed(GatewayError::StreamInterrupted(
                    "event channel closed before a terminal event".into(),
                ));
            }
        }
    };

    // Whitespace-only deliberation is noise; drop it from the record.
    if history[index]
        .reasoning
        .as_deref()
        .is_some_and(|r| r.trim().is_empty())
    {
        history[index].reasoning = None;
    }

    Turn {
        content,
        reasoning,
        tool_calls,
        outcome,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NoopHandler;

    async fn run_collect(events: Vec<StreamEvent>) -> (Turn, Vec<Message>) {
        let (tx, mut rx) = mpsc::channel(16);
        for event in events {
            tx.send(event).await.unwrap();
        }
        drop(tx);
        let mut history = Vec::new();
        let turn = collect_turn(&mut rx, &mut history, &NoopHandler).await;
        (turn, history)
    }

    #[tokio::test]
    async fn accumulates_content_deltas() {
        let (turn, history) = run_collect(vec![
            StreamEvent::Content { delta: "Hel".into() },
            StreamEvent::Content { delta: "lo".into() },
            StreamEvent::Done,
        ])
        .await;

        assert!(matches!(turn.outcome, TurnOutcome::Completed));
        assert_eq!(turn.content, "Hello");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, "Hello");
    }

    #[tokio::test]
    async fn accumulates_reasoning_separately() {
        let (turn, history) = run_collect(vec![
            StreamEvent::Reasoning {
                delta: "thinking ".into(),
            },
            StreamEvent::Reasoning {
                delta: "hard".into(),
            },
            StreamEvent::Content {
                delta: "answer".into(),
            },
            StreamEvent::Done,
        ])
        .await;

        assert_eq!(turn.reasoning, "thinking hard");
        assert_eq!(history[0].reasoning.as_deref(), Some("thinking hard"));
        assert_eq!(history[0].content, "answer");
    }

    #[tokio::test]
    async fn records_tool_call_batch() {
        let calls = vec![ToolCall {
            id: "call_1".into(),
            name: "lookup".into(),
            arguments: "{}".into(),
        }];
        let (turn, history) = run_collect(vec![
            StreamEvent::ToolCalls {
                calls: calls.clone(),
            },
            StreamEvent::Done,
        ])
        .await;

        assert_eq!(turn.tool_calls, calls);
        assert_eq!(history[0].tool_calls, calls);
    }

    #[tokio::test]
    async fn stopped_keeps_partial_content() {
        let (turn, history) = run_collect(vec![
            StreamEvent::Content {
                delta: "partial".into(),
            },
            StreamEvent::Stopped,
        ])
        .await;

        assert!(matches!(turn.outcome, TurnOutcome::Stopped));
        assert_eq!(history[0].content, "partial");
    }

    #[tokio::test]
    async fn error_event_fails_the_turn() {
        let (turn, _) = run_collect(vec![StreamEvent::Error {
            message: "backend exploded".into(),
        }])
        .await;

        match turn.outcome {
            TurnOutcome::Failed(GatewayError::Stream(message)) => {
                assert_eq!(message, "backend exploded");
            }
            other => panic!("expected stream failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn closed_channel_without_terminal_is_interrupted() {
        let (turn, _) = run_collect(vec![StreamEvent::Content { delta: "x".into() }]).await;
        assert!(matches!(
            turn.outcome,
            TurnOutcome::Failed(GatewayError::StreamInterrupted(_))
        ));
    }

    #[tokio::test]
    async fn whitespace_reasoning_is_dropped() {
        let (turn, history) = run_collect(vec![
            StreamEvent::Reasoning { delta: "  ".into() },
            StreamEvent::Content { delta: "hi".into() },
            StreamEvent::Done,
        ])
        .await;

        assert!(turn.reasoning.is_empty());
        assert!(history[0].reasoning.is_none());
    }
}
