//! Immutable text snapshots for background consumers.
//!
//! A [`TextSnapshot`] flattens the document's paragraphs (in reading order) into one
//! [`ropey::Rope`], separated by `'\n'`, and remembers the generation it was taken at. Offsets
//! in the snapshot are character indices; [`TextSnapshot::to_range`] maps a snapshot range back
//! onto document [`TextRange`]s.

use ropey::{Rope, RopeBuilder};

use crate::document::NodeId;
use crate::position::{Position, TextRange};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ParagraphSpan {
    id: NodeId,
    start: usize,
    len: usize,
}

/// Flattened, generation-stamped document text. Cheap to clone.
#[derive(Debug, Clone)]
pub struct TextSnapshot {
    generation: u64,
    rope: Rope,
    paragraphs: Vec<ParagraphSpan>,
}

impl TextSnapshot {
    pub(crate) fn from_paragraphs(generation: u64, paragraphs: Vec<(NodeId, String)>) -> Self {
        let mut builder = RopeBuilder::new();
        let mut spans = Vec::with_capacity(paragraphs.len());
        let mut start = 0;
        for (i, (id, text)) in paragraphs.iter().enumerate() {
            if i > 0 {
                builder.append("\n");
                start += 1;
            }
            let len = text.chars().count();
            builder.append(text);
            spans.push(ParagraphSpan { id: *id, start, len });
            start += len;
        }
        Self {
            generation,
            rope: builder.finish(),
            paragraphs: spans,
        }
    }

    /// Generation of the document when the snapshot was taken.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The flattened text.
    pub fn rope(&self) -> &Rope {
        &self.rope
    }

    /// The flattened text as a `String`.
    pub fn text(&self) -> String {
        self.rope.to_string()
    }

    /// Number of characters.
    pub fn len_chars(&self) -> usize {
        self.rope.len_chars()
    }

    /// Number of paragraphs.
    pub fn paragraph_count(&self) -> usize {
        self.paragraphs.len()
    }

    /// Paragraph ids with their text, in reading order.
    pub fn paragraphs(&self) -> impl Iterator<Item = (NodeId, String)> + '_ {
        self.paragraphs.iter().map(|span| {
            (
                span.id,
                self.rope.slice(span.start..span.start + span.len).to_string(),
            )
        })
    }

    /// Snapshot character index to document position.
    pub fn to_position(&self, char_idx: usize) -> Option<Position> {
        let index = self
            .paragraphs
            .partition_point(|span| span.start + span.len < char_idx);
        let span = self.paragraphs.get(index)?;
        if char_idx < span.start {
            return None;
        }
        Some(Position::new(span.id, char_idx - span.start))
    }

    /// Document position to snapshot character index.
    pub fn to_char_index(&self, pos: Position) -> Option<usize> {
        self.paragraphs
            .iter()
            .find(|span| span.id == pos.paragraph && pos.offset <= span.len)
            .map(|span| span.start + pos.offset)
    }

    /// Snapshot character range to a document range.
    pub fn to_range(&self, start: usize, end: usize) -> Option<TextRange> {
        Some(TextRange::new(self.to_position(start)?, self.to_position(end)?))
    }
}
