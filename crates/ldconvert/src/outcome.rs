//! Converter outcome classification.
//!
//! Success is decided by the exit code alone. On failure the captured output
//! is shortened to one line for display: converters written in scripting
//! languages tend to dump a whole stack trace on stderr, and only its final
//! line ("ValueError: ...") means anything to the person who uploaded the log.

use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::error::{Error, Result};
use crate::runner::CompletedInvocation;

/// Header printed by Python before a stack trace.
const TRACEBACK_HEADER: &str = "Traceback (most recent call last)";

/// Lines that name a stack frame location rather than the error itself.
fn frame_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r#"^\s*(File "[^"]*", line \d+|at \S.*:\d+(:\d+)?\)?$|\d+: \S+::|Traceback \(most recent call last\))"#,
        )
        .expect("valid frame pattern")
    })
}

/// Classify a completed invocation.
///
/// # Errors
///
/// Returns [`Error::ConversionFailed`] if the converter exited non-zero.
pub fn interpret(completed: &CompletedInvocation) -> Result<()> {
    if completed.succeeded() {
        return Ok(());
    }

    debug!(
        exit_code = completed.exit_code,
        stderr = %completed.stderr,
        stdout = %completed.stdout,
        "Converter failed"
    );

    Err(Error::ConversionFailed {
        exit_code: completed.exit_code,
        message: diagnostic(&completed.stderr, &completed.stdout, completed.exit_code),
    })
}

/// Pick the text to surface for a failed run: stderr, else stdout, reduced
/// to a single line when it is a stack trace.
#[must_use]
pub fn diagnostic(stderr: &str, stdout: &str, exit_code: i32) -> String {
    let text = match stderr.trim() {
        "" => stdout.trim(),
        stderr => stderr,
    };

    if text.is_empty() {
        return format!("converter exited with code {exit_code} without output");
    }

    if looks_like_traceback(text) {
        if let Some(line) = reduce_traceback(text) {
            return line.to_string();
        }
    }

    text.to_string()
}

/// Whether `text` is a multi-line stack trace dump.
#[must_use]
pub fn looks_like_traceback(text: &str) -> bool {
    if !text.contains('\n') {
        return false;
    }
    text.contains(TRACEBACK_HEADER) || text.lines().any(is_frame_line)
}

/// The last non-empty, non-indented line of `text` that is not a frame
/// location, if any.
#[must_use]
pub fn reduce_traceback(text: &str) -> Option<&str> {
    text.lines()
        .rev()
        .filter(|line| !line.trim().is_empty())
        .filter(|line| !line.starts_with(char::is_whitespace))
        .find(|line| !is_frame_line(line))
        .map(str::trim_end)
}

fn is_frame_line(line: &str) -> bool {
    frame_pattern().is_match(line)
}
