//! Flattens a working transcript for the synthesis call.
//!
//! The synthesis model must not see provider-specific tool structures, so
//! every tool-result turn is rewritten as an assistant turn quoting its call
//! id, and tool calls issued by assistant turns are serialized inline as
//! readable annotations. Ordering is preserved exactly; no turn is dropped.

use crate::llm::{Role, Turn};

const REASONING_START: &str = "<reasoning_start />";
const REASONING_END: &str = "<reasoning_end />";

pub fn flatten_for_synthesis(transcript: &[Turn]) -> Vec<Turn> {
    let mut flattened = Vec::with_capacity(transcript.len() + 2);
    flattened.push(Turn::assistant(REASONING_START));

    for turn in transcript {
        match turn.role {
            Role::Tool => {
                let id = turn.tool_call_id.as_deref().unwrap_or("");
                flattened.push(Turn::assistant(format!(
                    "<tool_call_response id=\"{id}\">\n{}\n</tool_call_response>",
                    turn.content.to_text()
                )));
            }
            Role::Assistant => {
                let mut content = turn.content.to_text();
                if let Some(calls) = &turn.tool_calls {
                    for call in calls {
                        let args = serde_json::to_string(&call.function.arguments)
                            .unwrap_or_default();
                        content.push_str(&format!(
                            "<tool_call name=\"{}\" id=\"{}\" args={args}/>",
                            call.function.name, call.id
                        ));
                    }
                }
                flattened.push(Turn::assistant(content));
            }
            _ => flattened.push(turn.clone()),
        }
    }

    flattened.push(Turn::assistant(REASONING_END));
    flattened
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{FunctionCall, ToolCall, TurnContent};

    fn call(id: &str, name: &str, arguments: &str) -> ToolCall {
        ToolCall {
            id: id.to_string(),
            kind: "function".to_string(),
            function: FunctionCall {
                name: name.to_string(),
                arguments: arguments.to_string(),
            },
        }
    }

    #[test]
    fn flattened_transcript_is_bracketed_by_reasoning_markers() {
        let flattened = flatten_for_synthesis(&[Turn::assistant("thinking")]);
        assert_eq!(flattened.first(), Some(&Turn::assistant(REASONING_START)));
        assert_eq!(flattened.last(), Some(&Turn::assistant(REASONING_END)));
        assert_eq!(flattened.len(), 3);
    }

    #[test]
    fn tool_turns_become_assistant_quotes() {
        let transcript = vec![Turn::tool("call_7", "search results")];
        let flattened = flatten_for_synthesis(&transcript);

        assert_eq!(flattened[1].role, Role::Assistant);
        assert_eq!(
            flattened[1].content.to_text(),
            "<tool_call_response id=\"call_7\">\nsearch results\n</tool_call_response>"
        );
        assert!(flattened[1].tool_call_id.is_none());
    }

    #[test]
    fn assistant_tool_calls_are_annotated_inline() {
        let transcript = vec![Turn {
            role: Role::Assistant,
            content: TurnContent::Text("looking it up".to_string()),
            tool_calls: Some(vec![call(
                "call_1",
                "internet_search",
                "{\"query\":\"rust\"}",
            )]),
            tool_call_id: None,
        }];
        let flattened = flatten_for_synthesis(&transcript);

        let content = flattened[1].content.to_text();
        assert!(content.starts_with("looking it up"));
        assert!(content.contains(
            "<tool_call name=\"internet_search\" id=\"call_1\" args=\"{\\\"query\\\":\\\"rust\\\"}\"/>"
        ));
        assert!(flattened[1].tool_calls.is_none());
    }

    #[test]
    fn ordering_is_preserved_and_nothing_is_dropped() {
        let transcript = vec![
            Turn::assistant("first"),
            Turn::tool("call_1", "result"),
            Turn::user("interleaved content"),
            Turn::assistant("second"),
        ];
        let flattened = flatten_for_synthesis(&transcript);

        assert_eq!(flattened.len(), transcript.len() + 2);
        assert_eq!(flattened[1].content.to_text(), "first");
        assert!(flattened[2].content.to_text().contains("result"));
        assert_eq!(flattened[3], transcript[2]);
        assert_eq!(flattened[4].content.to_text(), "second");
    }
}
