//! Commands: the atomic units the editing controller executes and records for undo.

use crate::content::BlockContent;
use crate::document::{Document, Edit, NodeId};
use crate::error::DocumentError;
use crate::format::{Alignment, FormatDelta};
use crate::position::{Position, TextRange};

/// A document mutation as issued by the editor.
///
/// Positions refer to the document as it is when the command starts. Inside a
/// [`Command::Batch`] every command is rebased through the edits of the commands before it,
/// so a batch can be built from positions computed up front (search matches, for instance).
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Insert text. Newlines split paragraphs.
    InsertText {
        /// Insertion point.
        at: Position,
        /// Text to insert.
        text: String,
    },
    /// Delete a range.
    DeleteRange(TextRange),
    /// Set format attributes over a range.
    ApplyFormat {
        /// Target range.
        range: TextRange,
        /// Attributes to set.
        delta: FormatDelta,
    },
    /// Clear format attributes over a range.
    ClearFormat {
        /// Target range.
        range: TextRange,
        /// Attributes to clear.
        delta: FormatDelta,
    },
    /// Insert an inline element.
    InsertInline {
        /// Insertion point.
        at: Position,
        /// Element kind.
        kind: String,
        /// Element payload.
        payload: String,
    },
    /// Insert an empty table.
    InsertTable {
        /// Insertion point.
        at: Position,
        /// Row count.
        rows: usize,
        /// Column count.
        cols: usize,
    },
    /// Split a paragraph.
    SplitParagraph(Position),
    /// Merge two adjacent paragraphs.
    MergeParagraphs {
        /// Paragraph that remains.
        first: NodeId,
        /// Paragraph appended to `first`.
        second: NodeId,
    },
    /// Insert block content (paste).
    InsertFragment {
        /// Insertion point.
        at: Position,
        /// Content to insert.
        blocks: Vec<BlockContent>,
    },
    /// Replace a range with text.
    ReplaceRange {
        /// Range to replace.
        range: TextRange,
        /// Replacement; may be empty.
        text: String,
    },
    /// Remove a whole block.
    RemoveBlock(NodeId),
    /// Change a paragraph's alignment.
    SetAlignment {
        /// Target paragraph.
        paragraph: NodeId,
        /// New alignment.
        alignment: Alignment,
    },
    /// Several commands applied as one.
    Batch(Vec<Command>),
}

/// Result of applying a command.
#[derive(Debug)]
pub(crate) struct Applied {
    pub edits: Vec<Edit>,
    /// Where the caret of the issuing pane goes, if the command moves it.
    pub caret: Option<Position>,
}

/// Edits applied so far by one command; reverted in reverse order on failure.
struct Transaction<'d> {
    doc: &'d mut Document,
    edits: Vec<Edit>,
}

impl<'d> Transaction<'d> {
    fn push(&mut self, edit: Edit) -> &Edit {
        self.edits.push(edit);
        &self.edits[self.edits.len() - 1]
    }

    fn map_since(&self, mark: usize, pos: Position) -> Position {
        self.edits[mark..]
            .iter()
            .fold(pos, |pos, edit| edit.mapping().map(pos))
    }

    /// Undo everything applied so far. Observers never see the partial command and the
    /// generation is restored.
    fn rollback(self) {
        self.doc.abort_transaction(&self.edits);
    }
}

impl Command {
    /// Map every position in the command.
    fn rebased(&self, map: &dyn Fn(Position) -> Position) -> Command {
        let range = |r: &TextRange| TextRange::new(map(r.start), map(r.end));
        match self {
            Command::InsertText { at, text } => Command::InsertText {
                at: map(*at),
                text: text.clone(),
            },
            Command::DeleteRange(r) => Command::DeleteRange(range(r)),
            Command::ApplyFormat { range: r, delta } => Command::ApplyFormat {
                range: range(r),
                delta: delta.clone(),
            },
            Command::ClearFormat { range: r, delta } => Command::ClearFormat {
                range: range(r),
                delta: delta.clone(),
            },
            Command::InsertInline { at, kind, payload } => Command::InsertInline {
                at: map(*at),
                kind: kind.clone(),
                payload: payload.clone(),
            },
            Command::InsertTable { at, rows, cols } => Command::InsertTable {
                at: map(*at),
                rows: *rows,
                cols: *cols,
            },
            Command::SplitParagraph(at) => Command::SplitParagraph(map(*at)),
            Command::InsertFragment { at, blocks } => Command::InsertFragment {
                at: map(*at),
                blocks: blocks.clone(),
            },
            Command::ReplaceRange { range: r, text } => Command::ReplaceRange {
                range: range(r),
                text: text.clone(),
            },
            Command::Batch(commands) => Command::Batch(commands.iter().map(|c| c.rebased(map)).collect()),
            other => other.clone(),
        }
    }

    /// Returns `true` if the command only changes formatting.
    pub fn is_format(&self) -> bool {
        match self {
            Command::ApplyFormat { .. } | Command::ClearFormat { .. } | Command::SetAlignment { .. } => true,
            Command::Batch(commands) => commands.iter().all(Command::is_format),
            _ => false,
        }
    }

    /// Apply atomically: either every edit lands or the document is left untouched.
    pub(crate) fn apply(&self, doc: &mut Document) -> Result<Applied, DocumentError> {
        doc.begin_transaction();
        let mut tx = Transaction {
            doc,
            edits: Vec::new(),
        };
        match self.apply_in(&mut tx) {
            Ok(caret) => {
                tx.doc.finish_transaction();
                Ok(Applied {
                    edits: tx.edits,
                    caret,
                })
            }
            Err(err) => {
                tx.rollback();
                Err(err)
            }
        }
    }

    fn apply_in(&self, tx: &mut Transaction<'_>) -> Result<Option<Position>, DocumentError> {
        let mark = tx.edits.len();
        match self {
            Command::InsertText { at, text } => insert_text(tx, *at, text).map(Some),
            Command::DeleteRange(range) => {
                let range = tx.doc.normalize_range(*range)?;
                if !range.is_empty() {
                    let edit = tx.doc.delete_range(range)?;
                    tx.push(edit);
                }
                Ok(Some(tx.map_since(mark, range.start)))
            }
            Command::ApplyFormat { range, delta } => {
                let edit = tx.doc.apply_format(*range, delta)?;
                tx.push(edit);
                Ok(None)
            }
            Command::ClearFormat { range, delta } => {
                let edit = tx.doc.clear_format(*range, delta)?;
                tx.push(edit);
                Ok(None)
            }
            Command::InsertInline { at, kind, payload } => {
                let edit = tx.doc.insert_inline(*at, kind.as_str(), payload.as_str())?;
                tx.push(edit);
                Ok(Some(tx.map_since(mark, *at)))
            }
            Command::InsertTable { at, rows, cols } => {
                let edit = tx.doc.insert_table(*at, *rows, *cols)?;
                tx.push(edit);
                Ok(Some(tx.map_since(mark, *at)))
            }
            Command::SplitParagraph(at) => {
                let edit = tx.doc.split_paragraph(*at)?;
                tx.push(edit);
                Ok(Some(tx.map_since(mark, *at)))
            }
            Command::MergeParagraphs { first, second } => {
                let edit = tx.doc.merge_paragraphs(*first, *second)?;
                tx.push(edit);
                Ok(Some(tx.map_since(mark, Position::new(*second, 0))))
            }
            Command::InsertFragment { at, blocks } => {
                let edit = tx.doc.insert_fragment(*at, blocks)?;
                tx.push(edit);
                Ok(Some(tx.map_since(mark, *at)))
            }
            Command::ReplaceRange { range, text } => {
                let range = tx.doc.normalize_range(*range)?;
                if !range.is_empty() {
                    let edit = tx.doc.delete_range(range)?;
                    tx.push(edit);
                }
                let at = tx.map_since(mark, range.start);
                if text.is_empty() {
                    Ok(Some(at))
                } else {
                    insert_text(tx, at, text).map(Some)
                }
            }
            Command::RemoveBlock(block) => {
                let edit = tx.doc.remove_block(*block)?;
                tx.push(edit);
                Ok(None)
            }
            Command::SetAlignment { paragraph, alignment } => {
                let edit = tx.doc.set_alignment(*paragraph, *alignment)?;
                tx.push(edit);
                Ok(None)
            }
            Command::Batch(commands) => {
                let mut caret = None;
                for command in commands {
                    let command = command.rebased(&|pos| tx.map_since(mark, pos));
                    if let Some(pos) = command.apply_in(tx)? {
                        caret = Some(pos);
                    }
                }
                Ok(caret)
            }
        }
    }
}

/// Insert text line by line, splitting paragraphs at newlines. Returns the caret after it.
fn insert_text(tx: &mut Transaction<'_>, at: Position, text: &str) -> Result<Position, DocumentError> {
    if text.is_empty() {
        return Err(DocumentError::InvalidText { reason: "empty text" });
    }
    let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
    let mark = tx.edits.len();
    for (i, line) in normalized.split('\n').enumerate() {
        if i > 0 {
            let pos = tx.map_since(mark, at);
            let edit = tx.doc.split_paragraph(pos)?;
            tx.push(edit);
        }
        if !line.is_empty() {
            let pos = tx.map_since(mark, at);
            let edit = tx.doc.insert_text(pos, line)?;
            tx.push(edit);
        }
    }
    Ok(tx.map_since(mark, at))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_multiline_insert_splits_paragraphs() {
        let mut doc = Document::from_plain_text("ab");
        let p = doc.body()[0];
        let applied = Command::InsertText {
            at: Position::new(p, 1),
            text: "x\ny\r\nz".into(),
        }
        .apply(&mut doc)
        .unwrap();
        assert_eq!(doc.plain_text(), "ax\ny\nzb");
        let caret = applied.caret.unwrap();
        assert_eq!(caret.offset, 1);
        assert_eq!(doc.paragraph_text(caret.paragraph).unwrap(), "zb");
    }

    #[test]
    fn test_failed_batch_rolls_back() {
        let mut doc = Document::from_plain_text("hello world");
        let p = doc.body()[0];
        let before = doc.content();
        let generation = doc.generation();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        doc.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let batch = Command::Batch(vec![
            Command::ReplaceRange {
                range: TextRange::in_paragraph(p, 0, 5),
                text: "bye".into(),
            },
            Command::InsertText {
                at: Position::new(p, 99),
                text: "x".into(),
            },
        ]);
        assert!(matches!(batch.apply(&mut doc), Err(DocumentError::OutOfRange { .. })));
        assert_eq!(doc.content(), before);
        assert_eq!(doc.generation(), generation);
        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_successful_batch_notifies_after_the_last_step() {
        let mut doc = Document::from_plain_text("one two");
        let p = doc.body()[0];
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let log = seen.clone();
        doc.subscribe(move |change| {
            if let Ok(mut log) = log.lock() {
                log.push(change.generation);
            }
        });
        let batch = Command::Batch(vec![
            Command::ReplaceRange {
                range: TextRange::in_paragraph(p, 0, 3),
                text: "three".into(),
            },
            Command::DeleteRange(TextRange::in_paragraph(p, 4, 7)),
        ]);
        batch.apply(&mut doc).unwrap();
        assert_eq!(doc.plain_text(), "three ");
        let generations = seen.lock().unwrap().clone();
        assert_eq!(generations.last().copied(), Some(doc.generation()));
        assert!(generations.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_batch_rebases_later_commands() {
        let mut doc = Document::from_plain_text("cat cat cat");
        let p = doc.body()[0];
        let batch = Command::Batch(
            [0, 4, 8]
                .into_iter()
                .map(|start| Command::ReplaceRange {
                    range: TextRange::in_paragraph(p, start, start + 3),
                    text: "tiger".into(),
                })
                .collect(),
        );
        let applied = batch.apply(&mut doc).unwrap();
        assert_eq!(doc.plain_text(), "tiger tiger tiger");
        assert_eq!(applied.caret, Some(Position::new(p, 17)));
    }
}
