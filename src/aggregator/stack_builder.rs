//! Build collapsed stack format from Python-style stack traces.
//!
//! Collapsed stacks are the input format for flamegraph generation.
//! Format: "frame;frame;frame count"
//!
//! Example: "a.py:foo;b.py:bar 2"
//! This means: the trace `foo` (in a.py) calling `bar` (in b.py) was seen twice.

use log::debug;
use regex::Regex;
use std::sync::LazyLock;

/// Separator between frames in a folded chain
pub const FRAME_SEPARATOR: char = ';';

/// Matches `File "<path>", line <n>, in <function>`
static FRAME_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"File "(.*)", line (.*), in (.*)"#).ok());

/// A single collapsed stack entry
///
/// **Public** - one line of a fold file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollapsedStack {
    /// Frames as `path:function`, semicolon-separated
    pub stack: String,

    /// Number of reports carrying this stack
    pub weight: u64,
}

impl CollapsedStack {
    /// Create a new collapsed stack
    pub fn new(stack: String, weight: u64) -> Self {
        Self { stack, weight }
    }

    /// Render as a fold file line, without the trailing newline
    pub fn to_line(&self) -> String {
        format!("{} {}", self.stack, self.weight)
    }
}

/// One parsed frame line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame<'a> {
    pub path: &'a str,
    pub line: &'a str,
    pub function: &'a str,
}

impl StackFrame<'_> {
    /// Folded token; the line number does not identify a frame
    pub fn token(&self) -> String {
        format!("{}:{}", self.path, self.function)
    }
}

/// Parse a single line as a stack frame
///
/// Lines that are not frames (source context, the exception message, the
/// `Traceback` header) yield `None`.
pub fn parse_frame(line: &str) -> Option<StackFrame<'_>> {
    let pattern = FRAME_PATTERN.as_ref()?;
    let caps = pattern.captures(line)?;

    Some(StackFrame {
        path: caps.get(1)?.as_str(),
        line: caps.get(2)?.as_str(),
        function: caps.get(3)?.as_str(),
    })
}

/// Fold a stack trace into a `path:function;...` chain
///
/// **Public** - the stack normalizer
///
/// # Arguments
/// * `stack` - Stack trace text
/// * `separator` - Separator the text's lines are joined with
///
/// # Returns
/// Matched frames in original order joined by `;`. Empty when no line
/// matches.
pub fn normalize_stack(stack: &str, separator: &str) -> String {
    let tokens: Vec<String> = stack
        .split(separator)
        .filter_map(parse_frame)
        .map(|frame| frame.token())
        .collect();

    tokens.join(&FRAME_SEPARATOR.to_string())
}

/// Fold a multi-line stack trace the way fold files expect it
///
/// Newlines are first re-joined with `;` and the text is then split on `;`.
pub fn fold_stack(stack: &str) -> String {
    let rejoined = stack.replace('\n', ";");
    let folded = normalize_stack(&rejoined, ";");
    debug!("Folded stack into {} frames", count_frames(&folded));
    folded
}

/// Number of frames in a folded chain
pub fn count_frames(folded: &str) -> usize {
    if folded.is_empty() {
        0
    } else {
        folded.split(FRAME_SEPARATOR).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRACE: &str = "Traceback (most recent call last):\n  File \"tribler/Main.py\", line 12, in run\n    self.start()\n  File \"tribler/Core/Session.py\", line 340, in start\n    raise ValueError(x)\nValueError: boom";

    #[test]
    fn test_collapsed_stack_to_line() {
        let stack = CollapsedStack::new("a.py:foo;b.py:bar".to_string(), 2);
        assert_eq!(stack.to_line(), "a.py:foo;b.py:bar 2");
    }

    #[test]
    fn test_parse_frame() {
        let frame = parse_frame("  File \"x/y.py\", line 42, in handler").unwrap();
        assert_eq!(frame.path, "x/y.py");
        assert_eq!(frame.line, "42");
        assert_eq!(frame.function, "handler");
        assert!(parse_frame("    self.start()").is_none());
    }

    #[test]
    fn test_normalize_drops_context_lines() {
        assert_eq!(
            normalize_stack(TRACE, "\n"),
            "tribler/Main.py:run;tribler/Core/Session.py:start"
        );
    }

    #[test]
    fn test_fold_stack_rejoins_newlines() {
        assert_eq!(fold_stack(TRACE), normalize_stack(TRACE, "\n"));
    }

    #[test]
    fn test_line_numbers_do_not_matter() {
        let a = "File \"a.py\", line 1, in foo";
        let b = "File \"a.py\", line 99, in foo";
        assert_eq!(fold_stack(a), fold_stack(b));
    }

    #[test]
    fn test_empty_and_frameless_input() {
        assert_eq!(fold_stack(""), "");
        assert_eq!(fold_stack("ValueError: boom\nno frames here"), "");
        assert_eq!(count_frames(""), 0);
    }
}
