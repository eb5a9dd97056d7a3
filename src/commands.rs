use serde::{Deserialize, Serialize};
use std::fmt;

/// Marker the model puts in front of a read-only command
pub const QUERY_MARKER: &str = "[cmd:query]";
/// Marker the model puts in front of a state-changing command
pub const MODIFY_MARKER: &str = "[cmd:modify]";

/// Classification chosen by the model through the marker it used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandKind {
    /// Read-only, safe to repeat
    Query,
    /// Changes system state, needs the escalated confirmation
    Modify,
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandKind::Query => write!(f, "query"),
            CommandKind::Modify => write!(f, "modify"),
        }
    }
}

/// A shell command proposed by the model in one response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub text: String,
    pub kind: CommandKind,
}

impl Command {
    pub fn new(text: impl Into<String>, kind: CommandKind) -> Self {
        Self {
            text: text.into(),
            kind,
        }
    }

    pub fn query(text: impl Into<String>) -> Self {
        Self::new(text, CommandKind::Query)
    }

    pub fn modify(text: impl Into<String>) -> Self {
        Self::new(text, CommandKind::Modify)
    }

    pub fn is_modify(&self) -> bool {
        self.kind == CommandKind::Modify
    }
}

/// Extract marked commands from a model response, in line order.
///
/// Only lines whose trimmed form starts with `[cmd:query]` or `[cmd:modify]` count.
/// The label is taken at face value: nothing here checks whether a "query" really is read-only.
pub fn extract_commands(response: &str) -> Vec<Command> {
    response.lines().filter_map(parse_command_line).collect()
}

/// Parse a single line, returning `None` for prose or an empty command
pub fn parse_command_line(line: &str) -> Option<Command> {
    let trimmed = line.trim();

    let (kind, rest) = if let Some(rest) = trimmed.strip_prefix(QUERY_MARKER) {
        (CommandKind::Query, rest)
    } else if let Some(rest) = trimmed.strip_prefix(MODIFY_MARKER) {
        (CommandKind::Modify, rest)
    } else {
        return None;
    };

    let text = clean_command_text(rest);
    if text.is_empty() {
        return None;
    }

    Some(Command { text, kind })
}

/// Strip inline markdown emphasis the model sometimes wraps commands in
fn clean_command_text(raw: &str) -> String {
    raw.trim().replace("**", "").replace('`', "").trim().to_string()
}
