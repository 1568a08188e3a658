//! Logical addressing: positions, ranges, selections and how they move across edits.
//!
//! A [`Position`] names a paragraph by its stable [`NodeId`] plus a character offset inside
//! that paragraph. Positions never hold references into the document; they stay valid across
//! edits only if they are explicitly rebased through the [`PositionMapping`] each edit
//! produces.

use crate::document::NodeId;

/// A caret location: a paragraph id and a character offset inside it.
///
/// Inline elements count as one character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Position {
    /// The paragraph this position lives in.
    pub paragraph: NodeId,
    /// Character offset inside the paragraph (`0..=len`).
    pub offset: usize,
}

impl Position {
    /// Create a position.
    pub fn new(paragraph: NodeId, offset: usize) -> Self {
        Self { paragraph, offset }
    }
}

/// A position resolved down to the inline node it falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedPosition {
    /// Paragraph id.
    pub paragraph: NodeId,
    /// Inline node containing the offset (`None` for an empty paragraph).
    pub inline: Option<NodeId>,
    /// Offset inside that inline node.
    pub inline_offset: usize,
}

/// A half-open range between two positions.
///
/// `start` and `end` are not required to be ordered; [`crate::Document::normalize_range`]
/// returns the document-ordered form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextRange {
    /// Range start.
    pub start: Position,
    /// Range end (exclusive).
    pub end: Position,
}

impl TextRange {
    /// Create a range.
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// Range inside a single paragraph.
    pub fn in_paragraph(paragraph: NodeId, start: usize, end: usize) -> Self {
        Self {
            start: Position::new(paragraph, start),
            end: Position::new(paragraph, end),
        }
    }

    /// Returns `true` if both ends are equal.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// An anchored selection. `anchor == active` is a caret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Selection {
    /// Fixed end.
    pub anchor: Position,
    /// Moving end (where the caret is drawn).
    pub active: Position,
}

impl Selection {
    /// A collapsed selection.
    pub fn caret(pos: Position) -> Self {
        Self {
            anchor: pos,
            active: pos,
        }
    }

    /// Create a selection from anchor to active.
    pub fn new(anchor: Position, active: Position) -> Self {
        Self { anchor, active }
    }

    /// Returns `true` for a caret.
    pub fn is_caret(&self) -> bool {
        self.anchor == self.active
    }

    /// The selection as an (unordered) range.
    pub fn range(&self) -> TextRange {
        TextRange::new(self.anchor, self.active)
    }

    /// Map both ends through `mapping`.
    pub fn mapped(&self, mapping: &PositionMapping) -> Self {
        Self {
            anchor: mapping.map(self.anchor),
            active: mapping.map(self.active),
        }
    }
}

/// One elementary movement of positions caused by an edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapStep {
    /// Content was inserted at `from`: positions in `from.paragraph` at or after `from.offset`
    /// (strictly after, unless `inclusive`) move to `to` plus their distance from `from`.
    Reflow {
        /// Insertion point.
        from: Position,
        /// Where content that followed the insertion point now starts.
        to: Position,
        /// Whether a position exactly at `from` moves too.
        inclusive: bool,
        /// Paragraphs created by the edit.
        created: Vec<NodeId>,
    },
    /// Content between `start` and `end` was removed: positions inside collapse to `start`,
    /// positions after `end` in `end.paragraph` are reattached after `start`.
    Collapse {
        /// First removed position.
        start: Position,
        /// End of the removed content.
        end: Position,
        /// Paragraphs that no longer exist after the edit.
        removed: Vec<NodeId>,
    },
}

impl MapStep {
    fn map(&self, pos: Position) -> Position {
        match self {
            MapStep::Reflow {
                from,
                to,
                inclusive,
                ..
            } => {
                let moves = pos.paragraph == from.paragraph
                    && (pos.offset > from.offset || (*inclusive && pos.offset == from.offset));
                if moves {
                    Position::new(to.paragraph, to.offset + (pos.offset - from.offset))
                } else {
                    pos
                }
            }
            MapStep::Collapse {
                start,
                end,
                removed,
            } => {
                if pos.paragraph == end.paragraph {
                    if pos.offset >= end.offset {
                        return Position::new(start.paragraph, start.offset + pos.offset - end.offset);
                    }
                    if start.paragraph != end.paragraph || pos.offset > start.offset {
                        return *start;
                    }
                    return pos;
                }
                if pos.paragraph == start.paragraph {
                    if pos.offset > start.offset {
                        return *start;
                    }
                    return pos;
                }
                if removed.contains(&pos.paragraph) {
                    return *start;
                }
                pos
            }
        }
    }

    fn inverse(&self) -> MapStep {
        match self {
            MapStep::Reflow {
                from, to, created, ..
            } => MapStep::Collapse {
                start: *from,
                end: *to,
                removed: created.clone(),
            },
            MapStep::Collapse {
                start,
                end,
                removed,
            } => MapStep::Reflow {
                from: *start,
                to: *end,
                inclusive: false,
                created: removed.clone(),
            },
        }
    }
}

/// How positions move across one edit.
///
/// Mapping a position that was valid before the edit yields a position in the post-edit
/// document; callers still clamp against the document to absorb positions whose paragraph
/// disappeared through a route the mapping does not describe.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PositionMapping {
    steps: Vec<MapStep>,
}

impl PositionMapping {
    /// A mapping that moves nothing (formatting edits).
    pub fn identity() -> Self {
        Self::default()
    }

    /// A single-step mapping.
    pub fn single(step: MapStep) -> Self {
        Self { steps: vec![step] }
    }

    /// Append the steps of `next`, which applies after `self`.
    pub fn then(mut self, next: PositionMapping) -> Self {
        self.steps.extend(next.steps);
        self
    }

    /// The elementary steps, in application order.
    pub fn steps(&self) -> &[MapStep] {
        &self.steps
    }

    /// Returns `true` if the mapping moves nothing.
    pub fn is_identity(&self) -> bool {
        self.steps.is_empty()
    }

    /// Map one position.
    pub fn map(&self, pos: Position) -> Position {
        self.steps.iter().fold(pos, |pos, step| step.map(pos))
    }

    /// The mapping of the reverse edit.
    pub fn inverse(&self) -> Self {
        Self {
            steps: self.steps.iter().rev().map(MapStep::inverse).collect(),
        }
    }
}
