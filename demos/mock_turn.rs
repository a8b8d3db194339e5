//! Runs one agent turn against a scripted model and prints the NDJSON event
//! stream a server would forward to its client. No network access required.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::{StreamExt, pin_mut, stream};
use minerva::llm::{Delta, DeltaStream, FunctionFragment, ToolCallFragment};
use minerva::tools::builtin;
use minerva::{
    Agent, ChatStream, ModelRequest, NamedImage, ProviderError, ToolReply, ToolSpec, Turn,
};

struct ScriptedModel {
    scripts: Mutex<VecDeque<Vec<Result<Delta, ProviderError>>>>,
}

#[async_trait]
impl ChatStream for ScriptedModel {
    async fn stream(&self, _request: ModelRequest) -> Result<DeltaStream, ProviderError> {
        let script = self
            .scripts
            .lock()
            .expect("lock poisoned")
            .pop_front()
            .ok_or_else(|| ProviderError::Request("no scripted response left".to_string()))?;
        Ok(Box::pin(stream::iter(script)))
    }
}

fn text(content: &str) -> Result<Delta, ProviderError> {
    Ok(Delta::from_text(content))
}

fn call(id: &str, name: &str, arguments: &str) -> Result<Delta, ProviderError> {
    Ok(Delta {
        role: None,
        content: None,
        tool_calls: Some(vec![ToolCallFragment {
            index: 0,
            id: Some(id.to_string()),
            kind: Some("function".to_string()),
            function: Some(FunctionFragment {
                name: Some(name.to_string()),
                arguments: Some(arguments.to_string()),
            }),
        }]),
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let model = Arc::new(ScriptedModel {
        scripts: Mutex::new(VecDeque::from(vec![
            // Round one: reason, then ask for the logo.
            vec![
                text("The user wants the Rust logo; let me fetch it."),
                call(
                    "call_1",
                    "logo_lookup",
                    "{\"reasoning\":\"The user asked to see the Rust logo.\"}",
                ),
            ],
            // Round two: done.
            vec![call("call_2", "finish", "{}")],
            // Synthesis, with the reference tag split across deltas.
            vec![
                text("Here is the Rust logo: <image_ref na"),
                text("me=\"rust-logo\" /> Enjoy!"),
            ],
        ])),
    });

    let logo_lookup = ToolSpec::new("logo_lookup", "Finds the project logo.").with_handler(
        |_args, ctx| {
            let call_id = ctx.call_id.clone();
            async move {
                ctx.events.text("Fetching the logo...\n");
                Ok(ToolReply {
                    turns: vec![Turn::tool(call_id, "Found the logo, named rust-logo.")],
                    images: vec![NamedImage {
                        name: "rust-logo".to_string(),
                        reference: "https://www.rust-lang.org/logos/rust-logo-512x512.png"
                            .to_string(),
                    }],
                })
            }
        },
    );

    let agent = Agent::builder()
        .model(model)
        .tool(logo_lookup)
        .tool(builtin::finish())
        .build()?;

    let events = agent.run_turn(Vec::new(), Turn::user("Show me the Rust logo"));
    pin_mut!(events);
    while let Some(event) = events.next().await {
        print!("{}", event?.to_ndjson());
    }

    Ok(())
}
