//! Folds a delta stream into one [`ReconstructedMessage`].
//!
//! Merging is independent of fragment granularity: role is first-non-empty
//! wins, content always appends, and tool-call fragments are merged by their
//! positional index (the id may trail the first fragment for an index, or
//! arrive fragmented itself). A transport failure never escapes this layer;
//! it degrades to a diagnostic delta followed by a completion with
//! `failure` set.

use async_stream::stream;
use futures_util::stream::BoxStream;
use futures_util::{Stream, StreamExt};

use crate::error::ProviderError;
use crate::llm::{
    ChatStream, Delta, DeltaStream, FunctionCall, ModelRequest, ReconstructedMessage, Role,
    StreamItem, ToolCall, ToolCallFragment,
};

#[derive(Debug, Default)]
pub struct MessageAccumulator {
    role: Option<Role>,
    content: String,
    builders: Vec<ToolCallBuilder>,
    saw_tool_calls: bool,
    failure: Option<String>,
}

#[derive(Debug, Default)]
struct ToolCallBuilder {
    id: Option<String>,
    kind: Option<String>,
    name: Option<String>,
    arguments: String,
}

impl ToolCallBuilder {
    fn merge(&mut self, fragment: &ToolCallFragment) {
        if self.id.is_none() {
            self.id = fragment.id.clone().filter(|id| !id.is_empty());
        }
        if self.kind.is_none() {
            self.kind = fragment.kind.clone().filter(|kind| !kind.is_empty());
        }
        if let Some(function) = &fragment.function {
            if self.name.is_none() {
                self.name = function.name.clone().filter(|name| !name.is_empty());
            }
            if let Some(arguments) = &function.arguments {
                self.arguments.push_str(arguments);
            }
        }
    }

    fn finish(self) -> ToolCall {
        ToolCall {
            id: self.id.unwrap_or_default(),
            kind: self.kind.unwrap_or_else(|| "function".to_string()),
            function: FunctionCall {
                name: self.name.unwrap_or_default(),
                arguments: self.arguments,
            },
        }
    }
}

impl MessageAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, delta: &Delta) {
        if self.role.is_none() {
            self.role = delta.role;
        }
        if let Some(content) = &delta.content {
            self.content.push_str(content);
        }
        if let Some(fragments) = &delta.tool_calls {
            self.saw_tool_calls = true;
            for fragment in fragments {
                while self.builders.len() <= fragment.index {
                    self.builders.push(ToolCallBuilder::default());
                }
                self.builders[fragment.index].merge(fragment);
            }
        }
    }

    pub fn mark_failed(&mut self, diagnostic: impl Into<String>) {
        self.failure = Some(diagnostic.into());
    }

    pub fn finish(self) -> ReconstructedMessage {
        let tool_calls = if self.saw_tool_calls {
            Some(
                self.builders
                    .into_iter()
                    .map(ToolCallBuilder::finish)
                    .collect(),
            )
        } else {
            None
        };

        ReconstructedMessage {
            role: self.role,
            content: self.content,
            tool_calls,
            failure: self.failure,
        }
    }
}

/// Surfaces every delta in order, then exactly one completion.
pub fn reassemble(deltas: DeltaStream) -> impl Stream<Item = StreamItem> + Send {
    stream! {
        let mut deltas = deltas;
        let mut accumulator = MessageAccumulator::new();

        while let Some(item) = deltas.next().await {
            match item {
                Ok(delta) => {
                    accumulator.apply(&delta);
                    yield StreamItem::Delta(delta);
                }
                Err(err) => {
                    let delta = Delta::from_text(format!("Error: {err}"));
                    accumulator.apply(&delta);
                    accumulator.mark_failed(err.to_string());
                    yield StreamItem::Delta(delta);
                    break;
                }
            }
        }

        yield StreamItem::Complete(accumulator.finish());
    }
}

/// Opens a model call and reassembles it. A request that fails before any
/// delta arrives degrades the same way as a mid-stream failure.
pub async fn open_stream(
    model: &dyn ChatStream,
    request: ModelRequest,
) -> BoxStream<'static, StreamItem> {
    match model.stream(request).await {
        Ok(deltas) => reassemble(deltas).boxed(),
        Err(err) => stream! {
            let mut accumulator = MessageAccumulator::new();
            let delta = Delta::from_text(format!("Error: {err}"));
            accumulator.apply(&delta);
            accumulator.mark_failed(err.to_string());
            yield StreamItem::Delta(delta);
            yield StreamItem::Complete(accumulator.finish());
        }
        .boxed(),
    }
}

#[cfg(test)]
mod tests {
    use futures_util::stream;

    use super::*;
    use crate::llm::FunctionFragment;

    fn fragment(
        index: usize,
        id: Option<&str>,
        name: Option<&str>,
        arguments: Option<&str>,
    ) -> ToolCallFragment {
        ToolCallFragment {
            index,
            id: id.map(str::to_string),
            kind: Some("function".to_string()),
            function: Some(FunctionFragment {
                name: name.map(str::to_string),
                arguments: arguments.map(str::to_string),
            }),
        }
    }

    fn tool_delta(fragments: Vec<ToolCallFragment>) -> Delta {
        Delta {
            role: None,
            content: None,
            tool_calls: Some(fragments),
        }
    }

    #[test]
    fn content_is_concatenation_of_deltas() {
        let mut accumulator = MessageAccumulator::new();
        accumulator.apply(&Delta {
            role: Some(Role::Assistant),
            content: Some("Hel".to_string()),
            tool_calls: None,
        });
        accumulator.apply(&Delta::from_text("lo "));
        accumulator.apply(&Delta::from_text("world"));

        let message = accumulator.finish();
        assert_eq!(message.role, Some(Role::Assistant));
        assert_eq!(message.content, "Hello world");
        assert!(message.tool_calls.is_none());
        assert!(message.failure.is_none());
    }

    #[test]
    fn role_first_observation_wins() {
        let mut accumulator = MessageAccumulator::new();
        accumulator.apply(&Delta {
            role: Some(Role::Assistant),
            content: None,
            tool_calls: None,
        });
        accumulator.apply(&Delta {
            role: Some(Role::User),
            content: None,
            tool_calls: None,
        });

        assert_eq!(accumulator.finish().role, Some(Role::Assistant));
    }

    #[test]
    fn missing_role_finalizes_unset_and_defaults_to_assistant() {
        let mut accumulator = MessageAccumulator::new();
        accumulator.apply(&Delta::from_text("hi"));

        let message = accumulator.finish();
        assert_eq!(message.role, None);
        assert_eq!(message.role_or_assistant(), Role::Assistant);
    }

    #[test]
    fn reassembly_is_independent_of_fragment_granularity() {
        // One unsplit fragment.
        let mut whole = MessageAccumulator::new();
        whole.apply(&tool_delta(vec![fragment(
            0,
            Some("call_1"),
            Some("lookup"),
            Some("{\"query\":\"rust\"}"),
        )]));

        // The same call split at arbitrary boundaries, with the id and name
        // trailing the first argument fragment.
        let mut split = MessageAccumulator::new();
        split.apply(&tool_delta(vec![fragment(0, None, None, Some("{\"que"))]));
        split.apply(&tool_delta(vec![fragment(
            0,
            Some("call_1"),
            Some("lookup"),
            None,
        )]));
        split.apply(&tool_delta(vec![fragment(0, None, None, Some("ry\":\"ru"))]));
        split.apply(&tool_delta(vec![fragment(0, None, None, Some("st\"}"))]));

        assert_eq!(whole.finish().tool_calls, split.finish().tool_calls);
    }

    #[test]
    fn fragments_merge_by_index_not_arrival_order() {
        let mut accumulator = MessageAccumulator::new();
        accumulator.apply(&tool_delta(vec![fragment(
            1,
            Some("call_b"),
            Some("second"),
            Some("{}"),
        )]));
        accumulator.apply(&tool_delta(vec![fragment(
            0,
            Some("call_a"),
            Some("first"),
            Some("{}"),
        )]));

        let calls = accumulator.finish().tool_calls.expect("tool calls present");
        assert_eq!(calls[0].id, "call_a");
        assert_eq!(calls[0].function.name, "first");
        assert_eq!(calls[1].id, "call_b");
        assert_eq!(calls[1].function.name, "second");
    }

    #[test]
    fn tool_calls_absent_when_no_fragments_observed() {
        let mut accumulator = MessageAccumulator::new();
        accumulator.apply(&Delta::from_text(""));
        let message = accumulator.finish();
        assert_eq!(message.content, "");
        assert!(message.tool_calls.is_none());
    }

    #[tokio::test]
    async fn reassemble_surfaces_all_deltas_then_completion() {
        let deltas: DeltaStream = Box::pin(stream::iter(vec![
            Ok(Delta::from_text("a")),
            Ok(Delta::from_text("b")),
        ]));

        let items = reassemble(deltas).collect::<Vec<_>>().await;
        assert_eq!(items.len(), 3);
        assert_eq!(items[0], StreamItem::Delta(Delta::from_text("a")));
        assert_eq!(items[1], StreamItem::Delta(Delta::from_text("b")));
        match &items[2] {
            StreamItem::Complete(message) => assert_eq!(message.content, "ab"),
            other => panic!("expected completion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn transport_failure_degrades_to_diagnostic_completion() {
        let deltas: DeltaStream = Box::pin(stream::iter(vec![
            Ok(Delta::from_text("partial")),
            Err(ProviderError::Stream("connection reset".to_string())),
        ]));

        let items = reassemble(deltas).collect::<Vec<_>>().await;
        assert_eq!(items.len(), 3);
        match &items[1] {
            StreamItem::Delta(delta) => {
                assert!(delta.content.as_deref().unwrap_or("").contains("connection reset"));
            }
            other => panic!("expected diagnostic delta, got {other:?}"),
        }
        match &items[2] {
            StreamItem::Complete(message) => {
                assert!(message.failure.is_some());
                assert!(message.content.starts_with("partial"));
                assert!(message.content.contains("connection reset"));
            }
            other => panic!("expected completion, got {other:?}"),
        }
    }
}
