//! Splits a raw submission into the part the next author sees and the part
//! they don't.
//!
//! The last non-empty line is the candidate preview. Anything beyond the
//! visible-word cap is moved, from the front of the preview, into the hidden
//! text so a contributor can't reveal an entire passage by pasting it on one
//! line.

use thiserror::Error;

/// Words of a part the next author may read.
pub const MAX_VISIBLE_WORDS: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SanitizeError {
    #[error("No text submitted")]
    Empty,
}

/// Normalized text of one contribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sanitized {
    pub hidden: String,
    pub visible: String,
}

impl Sanitized {
    pub fn word_count(&self) -> usize {
        self.hidden.split_whitespace().count() + self.visible.split_whitespace().count()
    }
}

/// Sanitize with the default visible-word cap.
pub fn sanitize(raw: &str) -> Result<Sanitized, SanitizeError> {
    sanitize_with_cap(raw, MAX_VISIBLE_WORDS)
}

pub fn sanitize_with_cap(raw: &str, max_visible: usize) -> Result<Sanitized, SanitizeError> {
    let lines: Vec<&str> = raw
        .split(['\n', '\r'])
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    let Some((last, earlier)) = lines.split_last() else {
        return Err(SanitizeError::Empty);
    };

    let mut hidden: Vec<&str> = earlier.iter().flat_map(|l| l.split_whitespace()).collect();
    let mut visible: Vec<&str> = last.split_whitespace().collect();

    if visible.len() > max_visible {
        let excess = visible.len() - max_visible;
        hidden.extend(visible.drain(..excess));
    }

    Ok(Sanitized {
        hidden: hidden.join(" "),
        visible: visible.join(" "),
    })
}
