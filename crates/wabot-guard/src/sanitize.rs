//! Command text cleanup and prefix parsing.

/// Strip control characters (newlines survive, tabs become spaces), trim,
/// and cap at `max_len` characters.
pub fn sanitize_input(text: &str, max_len: usize) -> String {
    let cleaned: String = text
        .chars()
        .map(|c| if c == '\t' { ' ' } else { c })
        .filter(|c| *c == '\n' || !c.is_control())
        .collect();
    cleaned.trim().chars().take(max_len).collect()
}

/// A prefixed command split into name and arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    /// Lowercased command name.
    pub name: String,
    /// Whitespace-separated arguments.
    pub args: Vec<String>,
    /// Everything after the name, trimmed.
    pub rest: String,
}

/// Parse `text` as `<prefix><name> [args...]`. `None` when the prefix is
/// missing or nothing follows it.
pub fn parse_command(text: &str, prefix: &str) -> Option<ParsedCommand> {
    let body = text.strip_prefix(prefix)?;
    let body = body.trim_start();
    let (name, rest) = match body.find(char::is_whitespace) {
        Some(idx) => (&body[..idx], body[idx..].trim()),
        None => (body, ""),
    };
    if name.is_empty() {
        return None;
    }
    Some(ParsedCommand {
        name: name.to_lowercase(),
        args: rest.split_whitespace().map(str::to_string).collect(),
        rest: rest.to_string(),
    })
}
