//! Session Instructions Assembly
//!
//! Builds the system instructions sent to the AI at the start of every call.
//! The base prompt and knowledge text come from configuration; this module
//! only combines them, caps the knowledge payload, and appends the routing
//! guidance the tag extractor relies on.

use crate::routing::RouteTable;

/// Default upper bound on knowledge text, in characters.
pub const DEFAULT_KNOWLEDGE_MAX_CHARS: usize = 12_000;

const KNOWLEDGE_HEADING: &str = "# Reference knowledge";
const ROUTING_HEADING: &str = "# Call routing";

/// Assembles the instructions payload for a realtime session.
#[derive(Debug, Clone)]
pub struct InstructionsBuilder {
    base: String,
    knowledge: Option<String>,
    knowledge_max_chars: usize,
    routes: Option<RouteTable>,
}

impl InstructionsBuilder {
    /// Creates a builder around the base system prompt.
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            knowledge: None,
            knowledge_max_chars: DEFAULT_KNOWLEDGE_MAX_CHARS,
            routes: None,
        }
    }

    /// Appends knowledge text. Blank text is treated as absent.
    pub fn knowledge(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        self.knowledge = if text.trim().is_empty() {
            None
        } else {
            Some(text)
        };
        self
    }

    pub fn knowledge_max_chars(mut self, max_chars: usize) -> Self {
        self.knowledge_max_chars = max_chars;
        self
    }

    /// Tells the AI which routing codes it may emit.
    pub fn routes(mut self, routes: &RouteTable) -> Self {
        self.routes = Some(routes.clone());
        self
    }

    pub fn build(&self) -> String {
        let mut instructions = self.base.trim().to_string();

        if let Some(knowledge) = &self.knowledge {
            let capped = truncate_chars(knowledge.trim(), self.knowledge_max_chars);
            if capped.len() < knowledge.trim().len() {
                tracing::warn!(
                    max_chars = self.knowledge_max_chars,
                    "Knowledge text exceeds the configured cap and was truncated"
                );
            }
            if !capped.is_empty() {
                instructions.push_str("\n\n");
                instructions.push_str(KNOWLEDGE_HEADING);
                instructions.push('\n');
                instructions.push_str(capped);
            }
        }

        if let Some(routes) = &self.routes {
            instructions.push_str("\n\n");
            instructions.push_str(ROUTING_HEADING);
            instructions.push('\n');
            instructions.push_str(&routing_guidance(routes));
        }

        instructions
    }
}

fn routing_guidance(routes: &RouteTable) -> String {
    let mut codes: Vec<String> = routes.destinations().to_vec();
    codes.push("MESSAGE".to_string());
    codes.push("END_CALL".to_string());
    format!(
        "When the call should be handed off, include exactly one tag of the form [[ROUTE:CODE]] \
         in your text output and never say it aloud. Valid codes: {}. \
         Use MESSAGE to take a message and END_CALL when the conversation is over.",
        codes.join(", ")
    )
}

/// Returns at most `max_chars` characters of `s`, never splitting a character.
fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_only() {
        let instructions = InstructionsBuilder::new("  You are the receptionist.  ").build();
        assert_eq!(instructions, "You are the receptionist.");
    }

    #[test]
    fn test_knowledge_is_appended_and_capped() {
        let instructions = InstructionsBuilder::new("Base.")
            .knowledge("0123456789")
            .knowledge_max_chars(4)
            .build();
        assert_eq!(instructions, "Base.\n\n# Reference knowledge\n0123");
    }

    #[test]
    fn test_blank_knowledge_is_ignored() {
        let instructions = InstructionsBuilder::new("Base.").knowledge("   \n").build();
        assert_eq!(instructions, "Base.");
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("日本語", 1), "日");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("abc", 0), "");
    }

    #[test]
    fn test_routing_guidance_lists_codes() {
        let table = RouteTable::new(["jay", "office"]);
        let instructions = InstructionsBuilder::new("Base.").routes(&table).build();
        assert!(instructions.starts_with("Base.\n\n# Call routing\n"));
        assert!(instructions.contains("[[ROUTE:CODE]]"));
        assert!(instructions.contains("JAY, OFFICE, MESSAGE, END_CALL"));
    }
}
