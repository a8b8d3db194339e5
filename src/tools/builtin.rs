//! The standard tool family.
//!
//! Search, page fetch and image search are external collaborators reached
//! through the traits below; the handlers here only shape their results into
//! transcript turns and live events. `deep_thought` and `page_content` make
//! nested model calls through the shared [`ChatStream`] and relay the
//! sub-model's text live before folding it into a tool-result turn.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::{Value, json};

use crate::error::ToolError;
use crate::events::EventSink;
use crate::llm::{
    ChatStream, ContentPart, ImageUrl, ModelRequest, ReconstructedMessage, StreamItem, Turn,
    open_stream,
};
use crate::splitter::ImageRegistry;
use crate::tools::{NamedImage, ToolContext, ToolReply, ToolSpec};

const REASONING_DESCRIPTION: &str = "The reason you are calling this tool. Explain why you \
are calling and what you hope to achieve. If this function is the last function you called, \
explain why you are calling it again.";

const SUMMARY_SYSTEM_PROMPT: &str = "Take the webpage content provided by the user and give \
a highly accurate and detailed 5-7 paragraph summary of the content. Make sure to include \
all the key points and information from the content. Do not include anything other than the \
summary.";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FoundImage {
    pub url: String,
    /// Explicit name assigned by the producer; derived from the reference
    /// bytes when absent.
    pub name: Option<String>,
}

#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, ToolError>;
}

#[async_trait]
pub trait ImageSearch: Send + Sync {
    async fn search_images(&self, query: &str) -> Result<Vec<FoundImage>, ToolError>;
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetches a page and returns its content converted to Markdown.
    async fn fetch_markdown(&self, url: &str) -> Result<String, ToolError>;
}

/// The terminating tool. Never executed; its appearance in a message ends
/// the loop.
pub fn finish() -> ToolSpec {
    ToolSpec::terminator(
        "finish",
        "Use this tool after you have completely finished the task. This will return to \
         the user and allow the user to send a message.",
    )
    .with_schema(json!({
        "type": "object",
        "properties": {},
        "additionalProperties": false
    }))
    .expect("valid schema")
}

pub fn deep_thought(model: impl Into<String>) -> ToolSpec {
    let model = model.into();

    ToolSpec::new(
        "deep_thought",
        "Enter a deep thought mode to think about a particular topic. This can be used to \
         reason about a topic in depth and provide a thoughtful response. You cannot use \
         tools while in deep thought mode so be sure to collect any information that you \
         might need before calling this tool.",
    )
    .with_schema(json!({
        "type": "object",
        "properties": {
            "reasoning": {"type": "string", "description": REASONING_DESCRIPTION},
            "topic": {
                "type": "string",
                "description": "The topic to think about. Should be phrased as a question or prompt."
            },
            "extra_information": {
                "type": "string",
                "description": "Any extra information to help with the deep thought process. \
                                Information in past messages that is not included here will \
                                not be accessible while in deep thought mode."
            }
        },
        "required": ["topic", "reasoning"],
        "additionalProperties": false
    }))
    .expect("valid schema")
    .with_handler(move |args, ctx: ToolContext| {
        let model = model.clone();
        async move {
            let topic = required_str(&args, "deep_thought", "topic")?;
            let extra = args
                .get("extra_information")
                .and_then(Value::as_str)
                .map(str::to_string);

            ctx.events
                .text(format!("Thinking deeply about the topic: {topic}\n"));
            match &extra {
                Some(extra) => ctx.events.text(format!("Extra information:\n{extra}\n\n")),
                None => ctx.events.text("No extra information provided.\n"),
            }

            let user_content = match &extra {
                Some(extra) => format!("Context:\n{extra}\n\nUser Query:\n{topic}"),
                None => topic.clone(),
            };
            let request = ModelRequest {
                model,
                messages: vec![
                    Turn::system(ctx.prompt.system_prompt()),
                    Turn::user(user_content),
                ],
                tools: Vec::new(),
            };

            let thought = relay_call(ctx.model.as_ref(), request, &ctx.events).await;

            Ok(ToolReply::from_turn(Turn::tool(
                ctx.call_id,
                format!(
                    "<deep_thinking topic=\"{topic}\">\n{}\n</deep_thinking>",
                    thought.content
                ),
            )))
        }
    })
}

pub fn internet_search(search: Arc<dyn WebSearch>) -> ToolSpec {
    ToolSpec::new(
        "internet_search",
        "Search the internet for information on a particular topic. This can be used to get \
         real-time information that is more up to date than the information in your training \
         data. Only use the snippets from the search results to determine which pages to \
         visit. Call `page_content` after calling this to get the page content.",
    )
    .with_schema(query_schema(
        "The search query to use to search the internet.",
    ))
    .expect("valid schema")
    .with_handler(move |args, ctx| {
        let search = Arc::clone(&search);
        async move {
            let query = required_str(&args, "internet_search", "query")?;
            ctx.events.text(format!(
                "Searching the internet for information on the topic: {query}\n"
            ));

            let results = search.search(&query).await?;

            let mut folded = format!("<internet_search query=\"{query}\">\n");
            for result in &results {
                folded.push_str(&format!(
                    "\t<result title=\"{}\" url=\"{}\" snippet=\"{}\" />\n",
                    result.title, result.url, result.snippet
                ));
                ctx.events
                    .text(format!("Result: {} - {}\n", result.title, result.url));
            }
            folded.push_str("</internet_search>");

            Ok(ToolReply::from_turn(Turn::tool(ctx.call_id, folded)))
        }
    })
}

pub fn image_search(search: Arc<dyn ImageSearch>) -> ToolSpec {
    ToolSpec::new(
        "image_search",
        "Search the internet for images with a particular description. This can be used to \
         find images that are relevant to the topic you are discussing.",
    )
    .with_schema(query_schema(
        "The search query to use to search for images. This should be a description of the \
         image you are looking for.",
    ))
    .expect("valid schema")
    .with_handler(move |args, ctx| {
        let search = Arc::clone(&search);
        async move {
            let query = required_str(&args, "image_search", "query")?;
            ctx.events.text(format!(
                "Searching the internet for images with the description: {query}\n"
            ));

            let found = search.search_images(&query).await?;

            let mut images = Vec::with_capacity(found.len());
            let mut parts = vec![ContentPart::Text {
                text: "[This is the content of the image search results, not a user message.]\n"
                    .to_string(),
            }];
            for image in found {
                let name = image
                    .name
                    .unwrap_or_else(|| ImageRegistry::derived_name(image.url.as_bytes()));

                if image.url.starts_with("data:image/") {
                    let preview: String = image.url.chars().take(25).collect();
                    ctx.events.text(format!("Image: {preview}\n"));
                } else {
                    ctx.events.text(format!("Image: {}\n", image.url));
                }

                parts.push(ContentPart::Text {
                    text: format!("<image name=\"{name}\">\n\t<image_data>"),
                });
                parts.push(ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: image.url.clone(),
                        detail: Some("high".to_string()),
                    },
                });
                parts.push(ContentPart::Text {
                    text: "</image_data>\n</image>\n".to_string(),
                });

                images.push(NamedImage {
                    name,
                    reference: image.url,
                });
            }

            Ok(ToolReply {
                turns: vec![
                    Turn::tool(ctx.call_id, "[Content provided in an user message below]"),
                    Turn::user_parts(parts),
                ],
                images,
            })
        }
    })
}

pub fn page_content(fetcher: Arc<dyn PageFetcher>, summary_model: impl Into<String>) -> ToolSpec {
    let summary_model = summary_model.into();

    ToolSpec::new(
        "page_content",
        "Get the content of a webpage. This can be used to get information from a specific \
         webpage.",
    )
    .with_schema(json!({
        "type": "object",
        "properties": {
            "reasoning": {"type": "string", "description": REASONING_DESCRIPTION},
            "url": {
                "type": "string",
                "description": "The URL of the webpage to get the content of."
            }
        },
        "required": ["url", "reasoning"],
        "additionalProperties": false
    }))
    .expect("valid schema")
    .with_handler(move |args, ctx| {
        let fetcher = Arc::clone(&fetcher);
        let summary_model = summary_model.clone();
        async move {
            let url = required_str(&args, "page_content", "url")?;
            ctx.events
                .text(format!("Getting the content of the webpage: {url}\n"));

            let markdown = fetcher.fetch_markdown(&url).await?;
            ctx.events.text("Page content:\n");
            ctx.events.text(format!("{markdown}\n"));

            let request = ModelRequest {
                model: summary_model,
                messages: vec![Turn::system(SUMMARY_SYSTEM_PROMPT), Turn::user(markdown)],
                tools: Vec::new(),
            };

            ctx.events.text("Page Summary:\n");
            let summary = relay_call(ctx.model.as_ref(), request, &ctx.events).await;
            ctx.events.text("\n");

            Ok(ToolReply::from_turn(Turn::tool(
                ctx.call_id,
                format!(
                    "<page_content url=\"{url}\">\n{}\n</page_content>",
                    summary.content
                ),
            )))
        }
    })
}

/// Opens a nested model call, relaying its text deltas live, and returns
/// the completion. Transport failures have already degraded to diagnostic
/// content by the time the completion arrives.
async fn relay_call(
    model: &dyn ChatStream,
    request: ModelRequest,
    events: &EventSink,
) -> ReconstructedMessage {
    let mut stream = open_stream(model, request).await;
    let mut completion = ReconstructedMessage::default();

    while let Some(item) = stream.next().await {
        match item {
            StreamItem::Delta(delta) => {
                if let Some(text) = delta.content {
                    if !text.is_empty() {
                        events.text(text);
                    }
                }
            }
            StreamItem::Complete(message) => completion = message,
        }
    }

    completion
}

fn query_schema(query_description: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            "reasoning": {"type": "string", "description": REASONING_DESCRIPTION},
            "query": {"type": "string", "description": query_description}
        },
        "required": ["query", "reasoning"],
        "additionalProperties": false
    })
}

fn required_str(args: &Value, tool: &str, field: &str) -> Result<String, ToolError> {
    args.get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ToolError::InvalidArguments {
            tool: tool.to_string(),
            message: format!("missing required field: {field}"),
        })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use futures_util::stream;

    use super::*;
    use crate::error::ProviderError;
    use crate::events::OutputEvent;
    use crate::llm::{Delta, DeltaStream};
    use crate::prompt::PromptConfig;

    struct ScriptedModel {
        scripts: Mutex<Vec<Vec<Result<Delta, ProviderError>>>>,
    }

    impl ScriptedModel {
        fn new(scripts: Vec<Vec<Result<Delta, ProviderError>>>) -> Self {
            Self {
                scripts: Mutex::new(scripts),
            }
        }
    }

    #[async_trait]
    impl ChatStream for ScriptedModel {
        async fn stream(&self, _request: ModelRequest) -> Result<DeltaStream, ProviderError> {
            let mut scripts = self.scripts.lock().expect("lock poisoned");
            if scripts.is_empty() {
                return Err(ProviderError::Request(
                    "no more scripted responses".to_string(),
                ));
            }
            Ok(Box::pin(stream::iter(scripts.remove(0))))
        }
    }

    fn ctx(model: Arc<dyn ChatStream>) -> (ToolContext, tokio::sync::mpsc::UnboundedReceiver<OutputEvent>) {
        let (events, rx) = EventSink::channel();
        (
            ToolContext {
                call_id: "call_1".to_string(),
                events,
                model,
                prompt: PromptConfig::default(),
            },
            rx,
        )
    }

    fn drain(rx: &mut tokio::sync::mpsc::UnboundedReceiver<OutputEvent>) -> Vec<OutputEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    struct FixedSearch;

    #[async_trait]
    impl WebSearch for FixedSearch {
        async fn search(&self, _query: &str) -> Result<Vec<SearchResult>, ToolError> {
            Ok(vec![SearchResult {
                title: "Rust".to_string(),
                url: "https://rust-lang.org".to_string(),
                snippet: "A systems language".to_string(),
            }])
        }
    }

    struct FixedImages;

    #[async_trait]
    impl ImageSearch for FixedImages {
        async fn search_images(&self, _query: &str) -> Result<Vec<FoundImage>, ToolError> {
            Ok(vec![
                FoundImage {
                    url: "https://example.com/cat.png".to_string(),
                    name: Some("cat".to_string()),
                },
                FoundImage {
                    url: "data:image/jpeg;base64,AAAA".to_string(),
                    name: None,
                },
            ])
        }
    }

    struct FixedPage;

    #[async_trait]
    impl PageFetcher for FixedPage {
        async fn fetch_markdown(&self, _url: &str) -> Result<String, ToolError> {
            Ok("# Heading\nbody".to_string())
        }
    }

    #[tokio::test]
    async fn internet_search_folds_results_and_emits_live_lines() {
        let tool = internet_search(Arc::new(FixedSearch));
        let (ctx, mut rx) = ctx(Arc::new(ScriptedModel::new(vec![])));

        let reply = tool
            .execute(
                json!({"query": "rust", "reasoning": "need docs"}),
                ctx,
            )
            .await
            .expect("search succeeds");

        assert_eq!(reply.turns.len(), 1);
        let content = reply.turns[0].content.to_text();
        assert!(content.starts_with("<internet_search query=\"rust\">"));
        assert!(content.contains("title=\"Rust\""));
        assert!(content.ends_with("</internet_search>"));
        assert_eq!(reply.turns[0].tool_call_id.as_deref(), Some("call_1"));

        let events = drain(&mut rx);
        assert!(events.iter().any(|event| matches!(
            event,
            OutputEvent::Text { text } if text.contains("Result: Rust - https://rust-lang.org")
        )));
    }

    #[tokio::test]
    async fn image_search_registers_named_and_derived_images() {
        let tool = image_search(Arc::new(FixedImages));
        let (ctx, mut rx) = ctx(Arc::new(ScriptedModel::new(vec![])));

        let reply = tool
            .execute(json!({"query": "a cat", "reasoning": "show one"}), ctx)
            .await
            .expect("search succeeds");

        assert_eq!(reply.images.len(), 2);
        assert_eq!(reply.images[0].name, "cat");
        assert!(reply.images[1].name.starts_with("image-"));

        // Tool turn plus one typed-parts user turn carrying the images.
        assert_eq!(reply.turns.len(), 2);
        assert_eq!(
            reply.turns[0].content.to_text(),
            "[Content provided in an user message below]"
        );
        match &reply.turns[1].content {
            crate::llm::TurnContent::Parts(parts) => {
                assert!(parts.iter().any(|part| matches!(
                    part,
                    ContentPart::ImageUrl { image_url } if image_url.url == "https://example.com/cat.png"
                )));
            }
            other => panic!("expected typed parts, got {other:?}"),
        }

        let events = drain(&mut rx);
        // Inline data references are previewed, not dumped in full.
        assert!(events.iter().any(|event| matches!(
            event,
            OutputEvent::Text { text } if text == "Image: data:image/jpeg;base64,AA\n"
        )));
    }

    #[tokio::test]
    async fn deep_thought_relays_sub_model_text_and_folds_result() {
        let model = Arc::new(ScriptedModel::new(vec![vec![
            Ok(Delta::from_text("pondering ")),
            Ok(Delta::from_text("done")),
        ]]));
        let tool = deep_thought("google/gemini-2.0-flash-thinking-exp:free");
        let (ctx, mut rx) = ctx(model);

        let reply = tool
            .execute(
                json!({"topic": "why is the sky blue", "reasoning": "physics question"}),
                ctx,
            )
            .await
            .expect("deep thought succeeds");

        let content = reply.turns[0].content.to_text();
        assert_eq!(
            content,
            "<deep_thinking topic=\"why is the sky blue\">\npondering done\n</deep_thinking>"
        );

        let events = drain(&mut rx);
        assert!(events.contains(&OutputEvent::text("pondering ")));
        assert!(events.contains(&OutputEvent::text("done")));
    }

    #[tokio::test]
    async fn page_content_streams_summary_into_tool_turn() {
        let model = Arc::new(ScriptedModel::new(vec![vec![
            Ok(Delta::from_text("A page about headings.")),
        ]]));
        let tool = page_content(Arc::new(FixedPage), "google/gemini-2.0-flash-exp:free");
        let (ctx, mut rx) = ctx(model);

        let reply = tool
            .execute(
                json!({"url": "https://example.com", "reasoning": "read it"}),
                ctx,
            )
            .await
            .expect("page content succeeds");

        let content = reply.turns[0].content.to_text();
        assert_eq!(
            content,
            "<page_content url=\"https://example.com\">\nA page about headings.\n</page_content>"
        );

        let events = drain(&mut rx);
        assert!(events.contains(&OutputEvent::text("Page content:\n")));
        assert!(events.contains(&OutputEvent::text("Page Summary:\n")));
    }

    #[tokio::test]
    async fn collaborator_failure_propagates_as_tool_error() {
        struct FailingSearch;

        #[async_trait]
        impl WebSearch for FailingSearch {
            async fn search(&self, _query: &str) -> Result<Vec<SearchResult>, ToolError> {
                Err(ToolError::Execution("search backend down".to_string()))
            }
        }

        let tool = internet_search(Arc::new(FailingSearch));
        let (ctx, _rx) = ctx(Arc::new(ScriptedModel::new(vec![])));

        let err = tool
            .execute(json!({"query": "rust", "reasoning": "docs"}), ctx)
            .await
            .expect_err("should fail");
        assert!(err.to_string().contains("search backend down"));
    }
}
