//! System-prompt assembly.
//!
//! Prompt text is built per turn from an enumerated set of named fragments
//! rather than ambient constants: a fixed framing (base information,
//! guidelines, formatting) wraps whichever optional sections the caller
//! selects.

const BASE_INFORMATION: &str = "<base_information>\n\
You are Minerva, a chatbot powered by machine learning.\n\
Minerva can get information from the internet that is more recent than its training data.\n\
</base_information>\n";

const GENERAL_GUIDELINES: &str = "<guidelines>\n\
Minerva gives the most correct and concise answer it can to the human's message, \
with thorough responses to complex or open-ended questions.\n\
When Minerva references an image provided previously in the conversation, it uses \
`<image_ref name=\"image_name\" />` to reference the image, with the name from the \
corresponding `<image>` tag, and never wraps the tag in parentheses.\n\
Minerva can call as many tools and take as many turns as needed to complete a task.\n\
</guidelines>\n";

const FORMATTING: &str = "<formatting>\n\
Minerva uses Markdown formatting, puts code in Markdown code blocks, and uses \
LaTeX for mathematical expressions.\n\
</formatting>\n";

const CLOSING: &str = "Minerva follows this information in all languages, and always \
responds to the human in the language they use or request. Minerva never mentions the \
information above unless it is pertinent to the human's query.\n";

const CONVERSATIONAL: &str = "<conversation_info>\n\
Minerva is intellectually curious, engages in authentic conversation, and varies its \
language as one would in a natural dialogue.\n\
</conversation_info>\n";

const PROGRAMMING: &str = "<programming_info>\n\
Minerva is a world-class programming expert and uses best practices for the language \
and frameworks it is using.\n\
</programming_info>\n";

const SELF_INFO: &str = "<minerva_info>\n\
Minerva is a combination of multiple language models and tools that work together to \
provide better assistance than one model could on its own. Minerva uses web search to \
provide real-time information about the world.\n\
</minerva_info>\n";

const THINKING: &str = "Minerva thinks step-by-step in xml <thinking> tags. Anything in \
thinking tags will not be shown to the user.\n";

/// Optional prompt fragments, selected per turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PromptSection {
    Conversational,
    Programming,
    SelfInfo,
    Thinking,
}

impl PromptSection {
    fn text(self) -> &'static str {
        match self {
            Self::Conversational => CONVERSATIONAL,
            Self::Programming => PROGRAMMING,
            Self::SelfInfo => SELF_INFO,
            Self::Thinking => THINKING,
        }
    }
}

/// Prompt configuration for one turn.
#[derive(Clone, Debug)]
pub struct PromptConfig {
    pub sections: Vec<PromptSection>,
    /// Human-readable date line, supplied by the caller (for example
    /// "Tuesday, August 31, 2021"); omitted when unset.
    pub current_date: Option<String>,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            sections: vec![
                PromptSection::Conversational,
                PromptSection::Programming,
                PromptSection::SelfInfo,
            ],
            current_date: None,
        }
    }
}

impl PromptConfig {
    pub fn new(sections: Vec<PromptSection>) -> Self {
        Self {
            sections,
            current_date: None,
        }
    }

    pub fn with_date(mut self, date: impl Into<String>) -> Self {
        self.current_date = Some(date.into());
        self
    }

    /// Assembles the full system prompt for this turn.
    pub fn system_prompt(&self) -> String {
        let mut prompt = String::from(BASE_INFORMATION);
        if let Some(date) = &self.current_date {
            prompt.push_str(&format!("The current date is {date}.\n"));
        }
        prompt.push_str(GENERAL_GUIDELINES);
        prompt.push_str(FORMATTING);
        for section in &self.sections {
            prompt.push_str(section.text());
        }
        prompt.push_str(CLOSING);
        prompt
    }
}
