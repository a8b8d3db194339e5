//! Client-facing output events.
//!
//! A turn is rendered for the client as a newline-delimited sequence of JSON
//! objects, one per event, emitted strictly in production order. The three
//! recognized shapes are `{"start": ...}`, `{"text": ...}` and
//! `{"image": ...}`; tool-call section markers additionally carry the
//! function name.

use serde::Serialize;
use tokio::sync::mpsc;

/// Section marker emitted when the agent begins streaming its reasoning.
pub const SECTION_REASONING: &str = "reasoning_response";
/// Section marker emitted when a tool call begins.
pub const SECTION_TOOL_CALL: &str = "tool_call";
/// Section marker emitted when the final synthesized answer begins.
pub const SECTION_ANSWER: &str = "assistant_response";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum OutputEvent {
    Start {
        start: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        function: Option<String>,
    },
    Text {
        text: String,
    },
    Image {
        image: String,
    },
}

impl OutputEvent {
    pub fn start(section: impl Into<String>) -> Self {
        Self::Start {
            start: section.into(),
            function: None,
        }
    }

    pub fn tool_start(function: impl Into<String>) -> Self {
        Self::Start {
            start: SECTION_TOOL_CALL.to_string(),
            function: Some(function.into()),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn image(reference: impl Into<String>) -> Self {
        Self::Image {
            image: reference.into(),
        }
    }

    /// Renders the event as one NDJSON line, trailing newline included.
    pub fn to_ndjson(&self) -> String {
        let mut line = serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string());
        line.push('\n');
        line
    }
}

/// Sender half used by tool handlers to relay events while they run.
///
/// Sends are best-effort: a consumer that has gone away must not fail the
/// handler, so send errors are swallowed.
#[derive(Debug, Clone)]
pub struct EventSink {
    sender: mpsc::UnboundedSender<OutputEvent>,
}

impl EventSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<OutputEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    pub fn emit(&self, event: OutputEvent) {
        let _ = self.sender.send(event);
    }

    pub fn text(&self, text: impl Into<String>) {
        self.emit(OutputEvent::text(text));
    }
}
