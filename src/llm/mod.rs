mod openrouter;
pub mod reassembly;

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProviderError;

pub use openrouter::{OpenRouterClient, OpenRouterConfig};
pub use reassembly::{MessageAccumulator, open_stream, reassemble};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One turn of a conversation, in the provider wire shape.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: TurnContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Turn {
    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    /// A tool-result turn answering the tool call with the given id.
    pub fn tool(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: TurnContent::Text(content.into()),
            tool_calls: None,
            tool_call_id: Some(call_id.into()),
        }
    }

    pub fn user_parts(parts: Vec<ContentPart>) -> Self {
        Self {
            role: Role::User,
            content: TurnContent::Parts(parts),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: TurnContent::Text(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

/// Turn content: either one plain string or a sequence of typed parts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TurnContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl TurnContent {
    /// Concatenated text of the content; non-text parts are skipped.
    pub fn to_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    ContentPart::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
    InputAudio { input_audio: InputAudio },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InputAudio {
    pub data: String,
    pub format: String,
}

/// A completed tool call as reconstructed from a stream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionCall,
}

impl ToolCall {
    /// Parses the accumulated argument string. Only valid once the stream
    /// that produced this call has completed.
    pub fn parsed_arguments(&self) -> Result<Value, serde_json::Error> {
        if self.function.arguments.trim().is_empty() {
            return Ok(Value::Object(serde_json::Map::new()));
        }
        serde_json::from_str(&self.function.arguments)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

/// Tool surface advertised to the model on each call.
#[derive(Clone, Debug, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// One incremental fragment of a streamed model response.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct Delta {
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCallFragment>>,
}

impl Delta {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            role: None,
            content: Some(text.into()),
            tool_calls: None,
        }
    }
}

/// A fragment of one tool call, identified by its positional index within
/// the message. The id, type, name and argument string may each arrive in
/// any later fragment carrying the same index.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct ToolCallFragment {
    #[serde(default)]
    pub index: usize,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub function: Option<FunctionFragment>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct FunctionFragment {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
}

/// Item surfaced by the reassembler: every delta in original order, then
/// exactly one completion.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamItem {
    Delta(Delta),
    Complete(ReconstructedMessage),
}

/// The fold of all deltas in one stream.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReconstructedMessage {
    pub role: Option<Role>,
    pub content: String,
    /// Present only if at least one tool-call fragment was observed.
    pub tool_calls: Option<Vec<ToolCall>>,
    /// Set when the underlying transport failed before the stream completed;
    /// the diagnostic is also appended to `content` so it stays visible.
    pub failure: Option<String>,
}

impl ReconstructedMessage {
    /// Streams that never carry a role are treated as assistant messages.
    pub fn role_or_assistant(&self) -> Role {
        self.role.unwrap_or(Role::Assistant)
    }

    pub fn to_turn(&self) -> Turn {
        Turn {
            role: self.role_or_assistant(),
            content: TurnContent::Text(self.content.clone()),
            tool_calls: self.tool_calls.clone(),
            tool_call_id: None,
        }
    }
}

/// One outbound model call.
#[derive(Clone, Debug)]
pub struct ModelRequest {
    pub model: String,
    pub messages: Vec<Turn>,
    pub tools: Vec<ToolDefinition>,
}

pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<Delta, ProviderError>> + Send>>;

/// A remote model endpoint that streams its response as deltas.
#[async_trait]
pub trait ChatStream: Send + Sync {
    async fn stream(&self, request: ModelRequest) -> Result<DeltaStream, ProviderError>;
}
