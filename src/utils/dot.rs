//! Graphviz helpers for the CFG dump.

/// Escapes text for use inside a quoted DOT label of a `shape=record` node.
///
/// Besides quotes and backslashes, record labels treat braces, pipes and angle brackets
/// as field syntax, so those are escaped too. Newlines become left-justified line breaks
/// (`\l`), which is how instruction listings are laid out inside a block node.
///
/// # Examples
///
/// ```rust
/// use irflow::utils::escape_dot;
///
/// assert_eq!(escape_dot("call %v1.foo()"), "call %v1.foo()");
/// assert_eq!(escape_dot("\"a\" | {b}"), "\\\"a\\\" \\| \\{b\\}");
/// assert_eq!(escape_dot("x\ny"), "x\\ly");
/// ```
#[must_use]
pub fn escape_dot(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '\\' | '"' | '{' | '}' | '|' | '<' | '>' => {
                out.push('\\');
                out.push(ch);
            }
            '\n' => out.push_str("\\l"),
            '\r' => {}
            _ => out.push(ch),
        }
    }
    out
}
