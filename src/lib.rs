//! Multi-model conversational agent with streaming tool use.
//!
//! Surface:
//! - `Agent` loop alternating streamed reasoning and sequential tool dispatch,
//!   with a terminating `finish` tool and transcript flattening for the final
//!   synthesis pass
//! - Delta reassembly that is independent of fragment granularity and
//!   degrades transport failures to visible diagnostics
//! - Tag-aware output splitting that resolves `<image_ref>` tags against the
//!   images tools introduced during the turn
//! - OpenRouter adapter via `OpenRouterClient`

pub mod agent;
pub mod error;
pub mod events;
pub mod llm;
pub mod prompt;
pub mod splitter;
pub mod tools;
pub mod transcript;

pub use agent::{Agent, AgentBuilder, AgentConfig};
pub use error::{AgentError, ProviderError, SchemaError, ToolError};
pub use events::{EventSink, OutputEvent, SECTION_ANSWER, SECTION_REASONING, SECTION_TOOL_CALL};
pub use llm::{
    ChatStream, Delta, ModelRequest, OpenRouterClient, OpenRouterConfig, ReconstructedMessage,
    Role, StreamItem, ToolCall, ToolDefinition, Turn, TurnContent,
};
pub use prompt::{PromptConfig, PromptSection};
pub use splitter::{ImageRegistry, TagSplitter};
pub use tools::{NamedImage, ToolContext, ToolReply, ToolSpec};
