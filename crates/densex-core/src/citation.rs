//! Citation spans
//!
//! Locates an answer inside the passage it was drawn from so that the UI
//! can highlight it.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Character range `[start, end)` inside a context string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    /// Offset of the first character
    pub start: usize,
    /// Offset one past the last character
    pub end: usize,
}

impl Span {
    /// Number of characters covered
    #[must_use]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Whether the span covers nothing
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Find the first occurrence of `answer` (trimmed) in `context`.
///
/// Offsets count characters, not bytes.
pub fn generate_citation(context: &str, answer: &str) -> Result<Span> {
    let answer = answer.trim();
    if context.trim().is_empty() || answer.is_empty() {
        return Err(Error::Citation(
            "context and answer must be non-empty".to_string(),
        ));
    }

    let byte_start = context
        .find(answer)
        .ok_or_else(|| Error::Citation("answer not found in context".to_string()))?;

    let start = context[..byte_start].chars().count();
    Ok(Span {
        start,
        end: start + answer.chars().count(),
    })
}
