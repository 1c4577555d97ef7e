//! Routing tags embedded by the AI in its text output.
//!
//! The AI is instructed to write a directive such as `[[ROUTE:JAY]]` when the
//! caller should be handed off. Tags are advisory: the first recognized code
//! in a turn wins, and unknown or malformed codes are skipped.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

static ROUTE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\[\[?\s*ROUTE\s*[:=]\s*([A-Z0-9_\-]+)\s*\]\]?")
        .expect("route pattern is a valid regex")
});

const TAKE_MESSAGE_CODES: &[&str] = &["MESSAGE", "TAKE_MESSAGE"];
const END_CALL_CODES: &[&str] = &["END", "END_CALL", "HANGUP"];

/// Default human destinations a caller can be transferred to.
pub const DEFAULT_DESTINATIONS: &[&str] = &["JAY", "OFFICE", "FIELD"];

/// A downstream disposition for the call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteTag {
    /// Hand the caller to a named person or desk.
    Transfer(String),
    TakeMessage,
    EndCall,
}

impl fmt::Display for RouteTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteTag::Transfer(code) => write!(f, "{code}"),
            RouteTag::TakeMessage => write!(f, "MESSAGE"),
            RouteTag::EndCall => write!(f, "END_CALL"),
        }
    }
}

/// The closed set of codes the extractor will accept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTable {
    destinations: Vec<String>,
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new(DEFAULT_DESTINATIONS.iter().copied())
    }
}

impl RouteTable {
    /// Builds a table from human destination codes. Codes are matched
    /// case-insensitively; blanks are discarded.
    pub fn new<I, S>(destinations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let destinations = destinations
            .into_iter()
            .map(|d| d.as_ref().trim().to_uppercase())
            .filter(|d| !d.is_empty())
            .collect();
        Self { destinations }
    }

    pub fn destinations(&self) -> &[String] {
        &self.destinations
    }

    /// Resolves a raw code to a tag, if it belongs to the table.
    pub fn resolve(&self, code: &str) -> Option<RouteTag> {
        let code = code.to_uppercase();
        if TAKE_MESSAGE_CODES.contains(&code.as_str()) {
            Some(RouteTag::TakeMessage)
        } else if END_CALL_CODES.contains(&code.as_str()) {
            Some(RouteTag::EndCall)
        } else if self.destinations.contains(&code) {
            Some(RouteTag::Transfer(code))
        } else {
            None
        }
    }

    /// Scans `text` and returns the first recognized tag.
    pub fn find(&self, text: &str) -> Option<RouteTag> {
        ROUTE_PATTERN
            .captures_iter(text)
            .find_map(|caps| caps.get(1).and_then(|m| self.resolve(m.as_str())))
    }
}

/// Accumulates the AI's text for the current turn.
#[derive(Debug, Default)]
pub struct TagExtractor {
    turn_text: String,
}

impl TagExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, fragment: &str) {
        self.turn_text.push_str(fragment);
    }

    pub fn turn_text(&self) -> &str {
        &self.turn_text
    }

    /// Ends the current turn: scans the accumulated text, then clears it.
    pub fn finish_turn(&mut self, table: &RouteTable) -> Option<RouteTag> {
        let tag = table.find(&self.turn_text);
        self.turn_text.clear();
        tag
    }
}
