//! Tag-aware splitting of streamed text into client events.
//!
//! The splitter consumes text char-by-char across arbitrarily chunked input
//! and recognizes exactly one tag family, `<image_ref name="..." />`,
//! resolving it against an [`ImageRegistry`]. Every other `<...>` run is
//! literal text once it closes. Nothing is ever dropped: malformed tags,
//! unknown image names and truncated streams all degrade to visible text.

use std::collections::HashMap;

use sha2::{Digest, Sha256};

use crate::events::OutputEvent;

const IMAGE_REF_PREFIX: &str = "<image_ref";
const NAME_ATTRIBUTE: &str = "name=\"";

/// Name-to-reference mapping for images introduced earlier in the turn.
///
/// Lives for one agent-loop invocation; it is never persisted across turns.
#[derive(Debug, Clone, Default)]
pub struct ImageRegistry {
    entries: HashMap<String, String>,
}

impl ImageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, reference: impl Into<String>) {
        self.entries.insert(name.into(), reference.into());
    }

    pub fn resolve(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Deterministic name for an image that arrived without one.
    pub fn derived_name(bytes: &[u8]) -> String {
        let digest = Sha256::digest(bytes);
        format!("image-{digest:x}")
    }
}

/// Incremental splitter. One instance per stream; not restartable.
#[derive(Debug, Default)]
pub struct TagSplitter {
    text: String,
    tag: String,
    in_tag: bool,
}

impl TagSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one chunk of text. Events are produced only at tag boundaries,
    /// so the output is identical however the input is chunked.
    pub fn push(&mut self, chunk: &str, images: &ImageRegistry) -> Vec<OutputEvent> {
        let mut events = Vec::new();

        for ch in chunk.chars() {
            if self.in_tag {
                self.tag.push(ch);
                if ch == '>' {
                    self.in_tag = false;
                    self.close_tag(images, &mut events);
                }
            } else if ch == '<' {
                self.in_tag = true;
                self.tag.push(ch);
            } else {
                self.text.push(ch);
            }
        }

        events
    }

    /// Flushes any buffered text as an event, unless a tag is open. Used
    /// between chunks to keep the client stream live.
    pub fn flush(&mut self) -> Option<OutputEvent> {
        if self.in_tag || self.text.is_empty() {
            return None;
        }
        Some(OutputEvent::text(std::mem::take(&mut self.text)))
    }

    /// Ends the stream. An unterminated tag is flushed verbatim so that
    /// truncated streams lose no data.
    pub fn finish(mut self) -> Vec<OutputEvent> {
        let mut events = Vec::new();
        if !self.text.is_empty() {
            events.push(OutputEvent::text(std::mem::take(&mut self.text)));
        }
        if !self.tag.is_empty() {
            events.push(OutputEvent::text(std::mem::take(&mut self.tag)));
        }
        events
    }

    fn close_tag(&mut self, images: &ImageRegistry, events: &mut Vec<OutputEvent>) {
        let tag = std::mem::take(&mut self.tag);

        if !tag.starts_with(IMAGE_REF_PREFIX) {
            self.text.push_str(&tag);
            return;
        }

        let Some(name) = extract_name(&tag) else {
            // Malformed attribute: the whole tag is literal content.
            self.text.push_str(&tag);
            return;
        };

        if !self.text.is_empty() {
            events.push(OutputEvent::text(std::mem::take(&mut self.text)));
        }

        match images.resolve(&name) {
            Some(reference) => events.push(OutputEvent::image(reference)),
            None => events.push(OutputEvent::text(format!("[Image \"{name}\" not found]"))),
        }
    }
}

fn extract_name(tag: &str) -> Option<String> {
    let start = tag.find(NAME_ATTRIBUTE)? + NAME_ATTRIBUTE.len();
    let end = tag[start..].find('"')? + start;
    Some(tag[start..end].to_string())
}
