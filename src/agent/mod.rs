//! The multi-round reasoning loop.
//!
//! Each turn alternates between streaming a reasoning response from the model
//! and dispatching the tool calls it requested, strictly in order. The loop
//! ends when the model answers without calls, names a terminating tool, or
//! exhausts its round allowance; a second model call then synthesizes the
//! final answer from the flattened working transcript, with `<image_ref>`
//! tags resolved into image events on the way out.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_stream::try_stream;
use futures_util::{Stream, StreamExt, pin_mut};
use serde_json::Value;

use crate::error::AgentError;
use crate::events::{EventSink, OutputEvent, SECTION_ANSWER, SECTION_REASONING};
use crate::llm::{
    ChatStream, ModelRequest, ReconstructedMessage, StreamItem, ToolCall, ToolDefinition, Turn,
    open_stream,
};
use crate::prompt::PromptConfig;
use crate::splitter::{ImageRegistry, TagSplitter};
use crate::tools::{ToolContext, ToolSpec};
use crate::transcript::flatten_for_synthesis;


pub const DEFAULT_MODEL: &str = "google/gemini-2.0-flash-001";
const DEFAULT_MAX_ROUNDS: usize = 24;

const SYNTHESIS_INSTRUCTION: &str = "Take the reasoning messages and create a final response.\n\
Make sure to include any relevant information from the reasoning responses as the user cannot \
see them.\n\
Do not mention that there were reasoning responses. Do not include information that isn't \
provided in the reasoning responses.\n\
When referencing images, use the `<image_ref name=\"image_name\" />` tag to reference the \
image.\n";

#[derive(Clone, Debug)]
pub struct AgentConfig {
    pub reasoning_model: String,
    pub synthesis_model: String,
    pub max_rounds: usize,
    pub prompt: PromptConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            reasoning_model: DEFAULT_MODEL.to_string(),
            synthesis_model: DEFAULT_MODEL.to_string(),
            max_rounds: DEFAULT_MAX_ROUNDS,
            prompt: PromptConfig::default(),
        }
    }
}

#[derive(Default)]
pub struct AgentBuilder {
    model: Option<Arc<dyn ChatStream>>,
    tools: Vec<ToolSpec>,
    config: AgentConfig,
}

impl AgentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn model(mut self, model: Arc<dyn ChatStream>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn tool(mut self, tool: ToolSpec) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn tools(mut self, tools: impl IntoIterator<Item = ToolSpec>) -> Self {
        self.tools.extend(tools);
        self
    }

    pub fn config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    pub fn prompt(mut self, prompt: PromptConfig) -> Self {
        self.config.prompt = prompt;
        self
    }

    pub fn reasoning_model(mut self, model: impl Into<String>) -> Self {
        self.config.reasoning_model = model.into();
        self
    }

    pub fn synthesis_model(mut self, model: impl Into<String>) -> Self {
        self.config.synthesis_model = model.into();
        self
    }

    pub fn max_rounds(mut self, rounds: usize) -> Self {
        self.config.max_rounds = rounds;
        self
    }

    pub fn build(self) -> Result<Agent, AgentError> {
        let model = self
            .model
            .ok_or_else(|| AgentError::Config("no model endpoint configured".to_string()))?;

        let mut tool_map = HashMap::with_capacity(self.tools.len());
        for tool in &self.tools {
            if tool_map.insert(tool.name().to_string(), tool.clone()).is_some() {
                return Err(AgentError::Config(format!(
                    "duplicate tool name: {}",
                    tool.name()
                )));
            }
        }

        Ok(Agent {
            model,
            tools: self.tools,
            tool_map,
            config: self.config,
        })
    }
}

pub struct Agent {
    model: Arc<dyn ChatStream>,
    tools: Vec<ToolSpec>,
    tool_map: HashMap<String, ToolSpec>,
    config: AgentConfig,
}

impl Agent {
    pub fn builder() -> AgentBuilder {
        AgentBuilder::new()
    }

    /// Runs one turn against the prior conversation, streaming output events
    /// as they are produced.
    ///
    /// Tool failures never end the turn; each becomes a diagnostic
    /// tool-result turn the model sees on its next round. A model transport
    /// failure ends the turn after its diagnostic has been streamed.
    pub fn run_turn(
        &self,
        prior: Vec<Turn>,
        user: Turn,
    ) -> impl Stream<Item = Result<OutputEvent, AgentError>> + Send + '_ {
        try_stream! {
            let system = Turn::system(self.config.prompt.system_prompt());
            let definitions: Vec<ToolDefinition> =
                self.tools.iter().map(ToolSpec::definition).collect();

            let mut transcript: Vec<Turn> = Vec::new();
            let mut images = ImageRegistry::new();
            let started = Instant::now();
            let mut finished = false;

            for _ in 0..self.config.max_rounds {
                let mut messages = vec![system.clone()];
                messages.extend(prior.iter().cloned());
                messages.push(user.clone());
                messages.extend(transcript.iter().cloned());

                let request = ModelRequest {
                    model: self.config.reasoning_model.clone(),
                    messages,
                    tools: definitions.clone(),
                };

                yield OutputEvent::start(SECTION_REASONING);
                let stream = open_stream(self.model.as_ref(), request).await;
                pin_mut!(stream);

                let mut completion = ReconstructedMessage::default();
                while let Some(item) = stream.next().await {
                    match item {
                        StreamItem::Delta(delta) => {
                            if let Some(text) = delta.content {
                                if !text.is_empty() {
                                    yield OutputEvent::text(text);
                                }
                            }
                        }
                        StreamItem::Complete(message) => completion = message,
                    }
                }

                // The diagnostic has already been streamed as delta text.
                if completion.failure.is_some() {
                    return;
                }

                let mut recorded = completion.to_turn();
                let Some(calls) = completion.tool_calls else {
                    transcript.push(recorded);
                    finished = true;
                    break;
                };

                // Calls after a terminating tool are never dispatched and
                // never recorded.
                let to_run: Vec<ToolCall> = match calls.iter().position(|call| {
                    self.tool_map
                        .get(&call.function.name)
                        .is_some_and(ToolSpec::terminates)
                }) {
                    Some(position) => {
                        finished = true;
                        calls[..position].to_vec()
                    }
                    None => calls,
                };

                recorded.tool_calls = if to_run.is_empty() {
                    None
                } else {
                    Some(to_run.clone())
                };
                transcript.push(recorded);

                for call in to_run {
                    yield OutputEvent::tool_start(&call.function.name);

                    let Some(spec) = self.tool_map.get(&call.function.name) else {
                        transcript.push(Turn::tool(
                            &call.id,
                            format!("Error: tool \"{}\" is not available.", call.function.name),
                        ));
                        continue;
                    };

                    let args = match call.parsed_arguments() {
                        Ok(args) => args,
                        Err(err) => {
                            transcript.push(Turn::tool(
                                &call.id,
                                format!("Error: could not parse tool arguments: {err}"),
                            ));
                            continue;
                        }
                    };

                    if let Some(reasoning) = args.get("reasoning").and_then(Value::as_str) {
                        yield OutputEvent::text(format!("Reasoning: {reasoning}\n"));
                    }

                    let (events, mut live) = EventSink::channel();
                    let ctx = ToolContext {
                        call_id: call.id.clone(),
                        events,
                        model: Arc::clone(&self.model),
                        prompt: self.config.prompt.clone(),
                    };

                    let execution = spec.execute(args, ctx);
                    pin_mut!(execution);

                    // Relay handler events while it runs. The recv branch is
                    // disabled once the handler drops its sink.
                    let mut live_open = true;
                    let outcome = loop {
                        tokio::select! {
                            event = live.recv(), if live_open => match event {
                                Some(event) => yield event,
                                None => live_open = false,
                            },
                            result = &mut execution => break result,
                        }
                    };
                    while let Ok(event) = live.try_recv() {
                        yield event;
                    }

                    match outcome {
                        Ok(reply) => {
                            for image in reply.images {
                                images.insert(image.name, image.reference);
                            }
                            transcript.extend(reply.turns);
                        }
                        Err(err) => {
                            transcript.push(Turn::tool(&call.id, format!("Error: {err}")));
                        }
                    }
                }

                if finished {
                    break;
                }
            }

            let elapsed = started.elapsed().as_secs_f64().ceil() as u64;
            yield OutputEvent::text(format!("\n\nThought for {elapsed} seconds\n\n"));

            let mut messages = vec![system];
            messages.extend(prior);
            messages.push(user);
            messages.extend(flatten_for_synthesis(&transcript));
            messages.push(Turn::user(SYNTHESIS_INSTRUCTION));

            let request = ModelRequest {
                model: self.config.synthesis_model.clone(),
                messages,
                tools: Vec::new(),
            };

            yield OutputEvent::start(SECTION_ANSWER);
            let stream = open_stream(self.model.as_ref(), request).await;
            pin_mut!(stream);

            let mut splitter = TagSplitter::new();
            while let Some(item) = stream.next().await {
                if let StreamItem::Delta(delta) = item {
                    if let Some(text) = delta.content {
                        for event in splitter.push(&text, &images) {
                            yield event;
                        }
                        if let Some(event) = splitter.flush() {
                            yield event;
                        }
                    }
                }
            }
            for event in splitter.finish() {
                yield event;
            }
        }
    }

    /// Runs one turn and returns only the synthesized answer text.
    pub async fn answer(&self, prior: Vec<Turn>, user: Turn) -> Result<String, AgentError> {
        let stream = self.run_turn(prior, user);
        pin_mut!(stream);

        let mut in_answer = false;
        let mut saw_answer = false;
        let mut answer = String::new();

        while let Some(event) = stream.next().await {
            match event? {
                OutputEvent::Start { start, .. } => {
                    in_answer = start == SECTION_ANSWER;
                    saw_answer |= in_answer;
                }
                OutputEvent::Text { text } if in_answer => answer.push_str(&text),
                _ => {}
            }
        }

        if saw_answer {
            Ok(answer)
        } else {
            Err(AgentError::MissingAnswer)
        }
    }
}
