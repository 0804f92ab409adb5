use std::fmt;

use serde::{Deserialize, Serialize};

/// Byte range within a module's source text.
///
/// Spans are produced by the loader collaborator and consumed by the code
/// generator, which rewrites the covered text. Offsets are always relative to
/// the source of the module that owns the span.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct SourceSpan {
    pub start: u32,
    pub end: u32,
}

impl SourceSpan {
    /// Construct a new span from byte offsets.
    pub fn new(start: u32, end: u32) -> Self {
        debug_assert!(start <= end, "span start must not exceed end");

        Self { start, end }
    }

    /// Length of the span in bytes.
    pub fn len(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }

    /// Returns true when the span has zero width.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Check whether the span contains a byte offset.
    pub fn contains(&self, offset: u32) -> bool {
        offset >= self.start && offset < self.end
    }

    /// Returns true if both spans cover at least one common byte.
    pub fn overlaps(&self, other: &Self) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Returns true if `other` lies entirely within this span.
    pub fn encloses(&self, other: &Self) -> bool {
        other.start >= self.start && other.end <= self.end
    }

    /// Slice the covered text out of `source`.
    ///
    /// Returns `None` when the span is out of bounds or does not fall on
    /// character boundaries.
    pub fn slice<'a>(&self, source: &'a str) -> Option<&'a str> {
        source.get(self.start as usize..self.end as usize)
    }

    /// Convert the start offset to a 1-indexed `(line, column)` pair.
    pub fn to_line_col(&self, source: &str) -> (usize, usize) {
        let mut line = 1usize;
        let mut col = 1usize;

        for (idx, ch) in source.char_indices() {
            if idx >= self.start as usize {
                break;
            }

            if ch == '\n' {
                line += 1;
                col = 1;
            } else {
                col += 1;
            }
        }

        (line, col)
    }
}

impl fmt::Display for SourceSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}
