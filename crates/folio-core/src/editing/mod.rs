//! Editing controller: selections, commands, undo/redo and clipboard interchange.
//!
//! # Overview
//!
//! The [`EditingController`] is the only component that mutates a [`Document`] during an
//! editing session. Every intent becomes a [`Command`], applied atomically; the resulting
//! edits are recorded for undo and every position the controller holds (each pane's
//! selection plus tracked anchors) is rebased through the edits' position mappings and
//! clamped to the remaining content.
//!
//! Panes have independent selections but share one history, so undo in any pane reverts the
//! most recent change to the document.
//!
//! The controller remembers the document generation it last saw. If the document was changed
//! behind its back, recorded edits no longer describe the document: the history is dropped
//! and the next undo reports [`EditError::StaleHistory`].

pub mod clipboard;
mod command;
mod history;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use unicode_segmentation::UnicodeSegmentation;

use crate::config::UndoConfig;
use crate::content::BlockContent;
use crate::document::{Container, Document, DocumentChange, Edit, NodeId};
use crate::error::{DocumentError, EditError};
use crate::format::{Alignment, FormatDelta};
use crate::layout::LayoutEngine;
use crate::position::{Position, PositionMapping, Selection, TextRange};

pub use clipboard::{ClipboardFlavor, ClipboardPayload, PasteSource};
pub use command::Command;
pub use history::{Clock, ManualClock, SystemClock};

use command::Applied;
use history::{UndoRedoManager, UndoStep};

/// Handle of a position tracked across edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AnchorId(u64);

/// Caret movements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaretMove {
    /// One grapheme back, into the previous paragraph at its start.
    Left,
    /// One grapheme forward, into the next paragraph at its end.
    Right,
    /// To the start of the previous word.
    WordLeft,
    /// To the end of the next word.
    WordRight,
    /// One visual line up.
    Up,
    /// One visual line down.
    Down,
    /// Start of the visual line.
    LineStart,
    /// End of the visual line.
    LineEnd,
    /// Start of the paragraph.
    ParagraphStart,
    /// End of the paragraph.
    ParagraphEnd,
    /// Start of the document.
    DocumentStart,
    /// End of the document.
    DocumentEnd,
}

impl CaretMove {
    fn is_vertical(self) -> bool {
        matches!(self, CaretMove::Up | CaretMove::Down)
    }
}

#[derive(Debug, Clone, Copy)]
struct PaneState {
    selection: Selection,
    /// Horizontal position kept across consecutive vertical moves.
    goal_x: Option<f32>,
}

/// Selections, history and commands over one document.
pub struct EditingController {
    panes: BTreeMap<usize, PaneState>,
    anchors: HashMap<AnchorId, Position>,
    next_anchor: u64,
    history: UndoRedoManager,
    clock: Arc<dyn Clock>,
    generation: u64,
}

impl fmt::Debug for EditingController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EditingController")
            .field("panes", &self.panes)
            .field("anchors", &self.anchors.len())
            .field("history", &self.history)
            .field("generation", &self.generation)
            .finish()
    }
}

impl EditingController {
    /// A controller with one pane (id 0) whose caret sits at the start of `doc`.
    pub fn new(doc: &Document, config: &UndoConfig) -> Self {
        Self::with_clock(doc, config, Arc::new(SystemClock::default()))
    }

    /// Like [`EditingController::new`] with an explicit time source for typing coalescing.
    pub fn with_clock(doc: &Document, config: &UndoConfig, clock: Arc<dyn Clock>) -> Self {
        let mut panes = BTreeMap::new();
        panes.insert(
            0,
            PaneState {
                selection: Selection::caret(doc.first_position()),
                goal_x: None,
            },
        );
        Self {
            panes,
            anchors: HashMap::new(),
            next_anchor: 0,
            history: UndoRedoManager::new(config.capacity, config.coalesce_window_ms),
            clock,
            generation: doc.generation(),
        }
    }

    // ----- panes and anchors -----

    /// Open a pane with its own selection; returns its id.
    pub fn add_pane(&mut self, doc: &Document, selection: Selection) -> usize {
        let id = self.panes.keys().next_back().map_or(0, |last| last + 1);
        let selection = Selection::new(doc.clamp(selection.anchor), doc.clamp(selection.active));
        self.panes.insert(
            id,
            PaneState {
                selection,
                goal_x: None,
            },
        );
        id
    }

    /// Close a pane. The last remaining pane cannot be closed.
    pub fn remove_pane(&mut self, pane: usize) -> bool {
        if self.panes.len() <= 1 {
            return false;
        }
        self.panes.remove(&pane).is_some()
    }

    /// Ids of the open panes, ascending.
    pub fn pane_ids(&self) -> Vec<usize> {
        self.panes.keys().copied().collect()
    }

    fn pane(&self, pane: usize) -> Result<&PaneState, EditError> {
        self.panes.get(&pane).ok_or(EditError::UnknownPane(pane))
    }

    fn pane_mut(&mut self, pane: usize) -> Result<&mut PaneState, EditError> {
        self.panes.get_mut(&pane).ok_or(EditError::UnknownPane(pane))
    }

    /// Selection of `pane`.
    pub fn selection(&self, pane: usize) -> Result<Selection, EditError> {
        Ok(self.pane(pane)?.selection)
    }

    /// Replace the selection of `pane`. Both ends must be valid positions.
    pub fn set_selection(&mut self, doc: &Document, pane: usize, selection: Selection) -> Result<(), EditError> {
        doc.validate(selection.anchor)?;
        doc.validate(selection.active)?;
        let state = self.pane_mut(pane)?;
        state.selection = selection;
        state.goal_x = None;
        self.history.end_group();
        Ok(())
    }

    /// Track `pos` across edits.
    pub fn add_anchor(&mut self, doc: &Document, pos: Position) -> Result<AnchorId, EditError> {
        doc.validate(pos)?;
        let id = AnchorId(self.next_anchor);
        self.next_anchor += 1;
        self.anchors.insert(id, pos);
        Ok(id)
    }

    /// Current position of an anchor.
    pub fn anchor(&self, id: AnchorId) -> Option<Position> {
        self.anchors.get(&id).copied()
    }

    /// Stop tracking an anchor.
    pub fn remove_anchor(&mut self, id: AnchorId) -> bool {
        self.anchors.remove(&id).is_some()
    }

    // ----- history -----

    /// Returns `true` if there is something to undo.
    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    /// Returns `true` if there is something to redo.
    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Number of undo steps.
    pub fn undo_depth(&self) -> usize {
        self.history.undo_depth()
    }

    /// Number of redo steps.
    pub fn redo_depth(&self) -> usize {
        self.history.redo_depth()
    }

    /// Returns `true` if the document matches the last clean point.
    pub fn is_clean(&self) -> bool {
        self.history.is_clean()
    }

    /// Record the current state as clean (e.g. after saving).
    pub fn mark_clean(&mut self) {
        self.history.mark_clean();
    }

    /// Close the current typing group so the next keystroke starts a new undo step.
    pub fn end_group(&mut self) {
        self.history.end_group();
    }

    /// Drop the history if the document changed outside the controller.
    fn sync(&mut self, doc: &Document) -> Result<(), EditError> {
        let found = doc.generation();
        if found == self.generation {
            return Ok(());
        }
        let expected = self.generation;
        log::warn!("document generation moved from {expected} to {found} outside the editor; discarding undo history");
        self.history.clear();
        self.generation = found;
        self.clamp_all(doc);
        Err(EditError::StaleHistory { expected, found })
    }

    fn clamp_all(&mut self, doc: &Document) {
        for state in self.panes.values_mut() {
            state.selection = Selection::new(doc.clamp(state.selection.anchor), doc.clamp(state.selection.active));
        }
        for pos in self.anchors.values_mut() {
            *pos = doc.clamp(*pos);
        }
    }

    fn rebase(&mut self, doc: &Document, mapping: &PositionMapping) {
        if mapping.is_identity() {
            return;
        }
        for state in self.panes.values_mut() {
            let mapped = state.selection.mapped(mapping);
            state.selection = Selection::new(doc.clamp(mapped.anchor), doc.clamp(mapped.active));
        }
        for pos in self.anchors.values_mut() {
            *pos = doc.clamp(mapping.map(*pos));
        }
    }

    // ----- commands -----

    /// Apply `command` on behalf of `pane` and record it for undo.
    ///
    /// Returns the change notifications in application order. A failed command leaves the
    /// document, the selections and the history untouched.
    pub fn execute(&mut self, doc: &mut Document, pane: usize, command: Command) -> Result<Vec<DocumentChange>, EditError> {
        let before = self.pane(pane)?.selection;
        // A stale history is discarded; the command itself still runs.
        let _ = self.sync(doc);
        let typing = matches!(
            &command,
            Command::InsertText { at, text }
                if before.is_caret() && *at == before.active && !text.contains(['\n', '\r'])
        );
        let applied = match command.apply(doc) {
            Ok(applied) => applied,
            Err(err) => {
                self.generation = doc.generation();
                return Err(err.into());
            }
        };
        Ok(self.record(doc, pane, before, applied, typing))
    }

    fn record(&mut self, doc: &Document, pane: usize, before: Selection, applied: Applied, typing: bool) -> Vec<DocumentChange> {
        let Applied { edits, caret } = applied;
        let mapping = edits
            .iter()
            .fold(PositionMapping::identity(), |m, edit| m.then(edit.mapping().clone()));
        self.rebase(doc, &mapping);
        self.generation = doc.generation();
        let after = match self.panes.get_mut(&pane) {
            Some(state) => {
                if let Some(caret) = caret {
                    state.selection = Selection::caret(doc.clamp(caret));
                }
                state.goal_x = None;
                state.selection
            }
            None => Selection::caret(doc.first_position()),
        };
        let edits: Vec<Edit> = edits.into_iter().filter(|edit| !edit.is_noop()).collect();
        let changes: Vec<DocumentChange> = edits.iter().map(|edit| edit.change().clone()).collect();
        if edits.is_empty() {
            log::trace!("command changed nothing; not recorded");
            return changes;
        }
        let now = self.clock.now_ms();
        self.history.push_step(
            UndoStep {
                pane,
                edits,
                before,
                after,
            },
            typing,
            now,
        );
        changes
    }

    /// Revert the most recent undo group.
    pub fn undo(&mut self, doc: &mut Document) -> Result<Vec<DocumentChange>, EditError> {
        self.sync(doc)?;
        let group = self.history.pop_undo_group().ok_or(EditError::NothingToUndo)?;
        let mut changes = Vec::new();
        for step in group.steps.iter().rev() {
            for edit in step.edits.iter().rev() {
                let change = doc.revert(edit).inspect_err(|err| log::error!("undo failed: {err}"));
                self.generation = doc.generation();
                let change = match change {
                    Ok(change) => change,
                    Err(err) => {
                        self.history.clear();
                        self.clamp_all(doc);
                        return Err(err.into());
                    }
                };
                changes.push(change);
                self.rebase(doc, &edit.mapping().inverse());
            }
        }
        if let Some(step) = group.steps.first()
            && let Some(state) = self.panes.get_mut(&step.pane)
        {
            state.selection = Selection::new(doc.clamp(step.before.anchor), doc.clamp(step.before.active));
            state.goal_x = None;
        }
        self.history.push_redo_group(group);
        Ok(changes)
    }

    /// Reapply the most recently undone group.
    pub fn redo(&mut self, doc: &mut Document) -> Result<Vec<DocumentChange>, EditError> {
        self.sync(doc)?;
        let group = self.history.pop_redo_group().ok_or(EditError::NothingToRedo)?;
        let mut changes = Vec::new();
        for step in &group.steps {
            for edit in &step.edits {
                let change = doc.reapply(edit).inspect_err(|err| log::error!("redo failed: {err}"));
                self.generation = doc.generation();
                let change = match change {
                    Ok(change) => change,
                    Err(err) => {
                        self.history.clear();
                        self.clamp_all(doc);
                        return Err(err.into());
                    }
                };
                changes.push(change);
                self.rebase(doc, edit.mapping());
            }
        }
        if let Some(step) = group.steps.last()
            && let Some(state) = self.panes.get_mut(&step.pane)
        {
            state.selection = Selection::new(doc.clamp(step.after.anchor), doc.clamp(step.after.active));
            state.goal_x = None;
        }
        self.history.push_undo_group(group);
        Ok(changes)
    }

    // ----- editing intents -----

    /// Type `text` at the caret, replacing a non-empty selection.
    pub fn type_text(&mut self, doc: &mut Document, pane: usize, text: &str) -> Result<Vec<DocumentChange>, EditError> {
        let selection = self.pane(pane)?.selection;
        let command = if selection.is_caret() {
            Command::InsertText {
                at: selection.active,
                text: text.to_string(),
            }
        } else {
            Command::ReplaceRange {
                range: selection.range(),
                text: text.to_string(),
            }
        };
        self.execute(doc, pane, command)
    }

    /// Split the paragraph at the caret, replacing a non-empty selection.
    pub fn insert_paragraph_break(&mut self, doc: &mut Document, pane: usize) -> Result<Vec<DocumentChange>, EditError> {
        let selection = self.pane(pane)?.selection;
        let command = if selection.is_caret() {
            Command::SplitParagraph(selection.active)
        } else {
            let range = doc.normalize_range(selection.range())?;
            Command::Batch(vec![Command::DeleteRange(range), Command::SplitParagraph(range.start)])
        };
        self.execute(doc, pane, command)
    }

    /// Backspace: delete the selection, the grapheme before the caret, or merge with the
    /// previous paragraph.
    pub fn delete_backward(&mut self, doc: &mut Document, pane: usize) -> Result<Vec<DocumentChange>, EditError> {
        let selection = self.pane(pane)?.selection;
        let command = if !selection.is_caret() {
            Command::DeleteRange(selection.range())
        } else {
            let caret = selection.active;
            if caret.offset > 0 {
                let text = doc.paragraph_text(caret.paragraph)?;
                let from = previous_boundary(&text, caret.offset);
                Command::DeleteRange(TextRange::in_paragraph(caret.paragraph, from, caret.offset))
            } else {
                match sibling_paragraph(doc, caret.paragraph, false) {
                    Some(previous) => Command::MergeParagraphs {
                        first: previous,
                        second: caret.paragraph,
                    },
                    None => return Ok(Vec::new()),
                }
            }
        };
        self.execute(doc, pane, command)
    }

    /// Delete: remove the selection, the grapheme after the caret, or merge the next
    /// paragraph into this one.
    pub fn delete_forward(&mut self, doc: &mut Document, pane: usize) -> Result<Vec<DocumentChange>, EditError> {
        let selection = self.pane(pane)?.selection;
        let command = if !selection.is_caret() {
            Command::DeleteRange(selection.range())
        } else {
            let caret = selection.active;
            let text = doc.paragraph_text(caret.paragraph)?;
            let len = text.chars().count();
            if caret.offset < len {
                let to = next_boundary(&text, caret.offset);
                Command::DeleteRange(TextRange::in_paragraph(caret.paragraph, caret.offset, to))
            } else {
                match sibling_paragraph(doc, caret.paragraph, true) {
                    Some(next) => Command::MergeParagraphs {
                        first: caret.paragraph,
                        second: next,
                    },
                    None => return Ok(Vec::new()),
                }
            }
        };
        self.execute(doc, pane, command)
    }

    /// Set `delta` over the selection, or clear it if the whole selection already has it.
    pub fn toggle_format(&mut self, doc: &mut Document, pane: usize, delta: FormatDelta) -> Result<Vec<DocumentChange>, EditError> {
        let selection = self.pane(pane)?.selection;
        if selection.is_caret() {
            return Err(EditError::EmptySelection);
        }
        let range = selection.range();
        let command = if doc.range_has_format(range, &delta)? {
            Command::ClearFormat { range, delta }
        } else {
            Command::ApplyFormat { range, delta }
        };
        self.execute(doc, pane, command)
    }

    /// Align every paragraph touched by the selection.
    pub fn set_alignment(&mut self, doc: &mut Document, pane: usize, alignment: Alignment) -> Result<Vec<DocumentChange>, EditError> {
        let selection = self.pane(pane)?.selection;
        let range = doc.normalize_range(selection.range())?;
        let order = doc.paragraphs_in_order();
        let from = order.iter().position(|p| *p == range.start.paragraph);
        let to = order.iter().position(|p| *p == range.end.paragraph);
        let paragraphs = match (from, to) {
            (Some(from), Some(to)) => &order[from..=to.max(from)],
            _ => {
                return Err(DocumentError::InvalidPosition {
                    node: range.start.paragraph,
                }
                .into());
            }
        };
        let commands = paragraphs
            .iter()
            .map(|&paragraph| Command::SetAlignment { paragraph, alignment })
            .collect();
        self.execute(doc, pane, Command::Batch(commands))
    }

    /// Insert an inline element at the caret, replacing a non-empty selection.
    pub fn insert_inline(
        &mut self,
        doc: &mut Document,
        pane: usize,
        kind: &str,
        payload: &str,
    ) -> Result<Vec<DocumentChange>, EditError> {
        let selection = self.pane(pane)?.selection;
        let at = self.collapse_target(doc, selection)?;
        let insert = Command::InsertInline {
            at,
            kind: kind.to_string(),
            payload: payload.to_string(),
        };
        let command = if selection.is_caret() {
            insert
        } else {
            Command::Batch(vec![Command::DeleteRange(selection.range()), insert])
        };
        self.execute(doc, pane, command)
    }

    /// Insert an empty `rows` x `cols` table at the caret.
    pub fn insert_table(&mut self, doc: &mut Document, pane: usize, rows: usize, cols: usize) -> Result<Vec<DocumentChange>, EditError> {
        let at = self.pane(pane)?.selection.active;
        self.execute(doc, pane, Command::InsertTable { at, rows, cols })
    }

    fn collapse_target(&self, doc: &Document, selection: Selection) -> Result<Position, EditError> {
        if selection.is_caret() {
            Ok(selection.active)
        } else {
            Ok(doc.normalize_range(selection.range())?.start)
        }
    }

    // ----- clipboard -----

    /// Export the selection of `pane`.
    pub fn export_selection(&self, doc: &Document, pane: usize) -> Result<ClipboardPayload, EditError> {
        let selection = self.pane(pane)?.selection;
        if selection.is_caret() {
            return Err(EditError::EmptySelection);
        }
        Ok(clipboard::export(doc, selection.range())?)
    }

    /// Export and delete the selection of `pane`.
    pub fn cut(&mut self, doc: &mut Document, pane: usize) -> Result<(ClipboardPayload, Vec<DocumentChange>), EditError> {
        let payload = self.export_selection(doc, pane)?;
        let range = self.pane(pane)?.selection.range();
        let changes = self.execute(doc, pane, Command::DeleteRange(range))?;
        Ok((payload, changes))
    }

    /// Paste the richest usable flavour of `source`, replacing a non-empty selection.
    /// Nothing happens if the source holds nothing usable.
    ///
    /// A structured fragment the document rejects (a table pasted too deep, say) is pasted as
    /// plain text instead.
    pub fn paste(&mut self, doc: &mut Document, pane: usize, source: &PasteSource) -> Result<Vec<DocumentChange>, EditError> {
        let Some((flavor, blocks)) = clipboard::import_with_flavor(source) else {
            return Ok(Vec::new());
        };
        if blocks.is_empty() {
            return Ok(Vec::new());
        }
        if flavor == ClipboardFlavor::PlainText {
            return self.paste_blocks(doc, pane, blocks);
        }
        let plain = clipboard::plain_fallback(source, &blocks);
        match self.paste_blocks(doc, pane, blocks) {
            Err(EditError::Document(err)) => {
                log::warn!("pasting {flavor:?} content failed ({err}); pasting plain text");
                self.paste_blocks(doc, pane, plain)
            }
            other => other,
        }
    }

    fn paste_blocks(&mut self, doc: &mut Document, pane: usize, blocks: Vec<BlockContent>) -> Result<Vec<DocumentChange>, EditError> {
        if blocks.is_empty() {
            return Ok(Vec::new());
        }
        let selection = self.pane(pane)?.selection;
        let at = self.collapse_target(doc, selection)?;
        let insert = Command::InsertFragment { at, blocks };
        let command = if selection.is_caret() {
            insert
        } else {
            Command::Batch(vec![Command::DeleteRange(selection.range()), insert])
        };
        self.execute(doc, pane, command)
    }

    // ----- caret movement -----

    /// Move the caret of `pane`; with `extend` the anchor stays put. Vertical and line
    /// movements use `layout` when given and fall back to paragraph steps otherwise.
    pub fn move_caret(
        &mut self,
        doc: &Document,
        pane: usize,
        movement: CaretMove,
        extend: bool,
        layout: Option<&LayoutEngine>,
    ) -> Result<Selection, EditError> {
        let state = *self.pane(pane)?;
        let selection = Selection::new(doc.clamp(state.selection.anchor), doc.clamp(state.selection.active));
        let active = selection.active;
        let mut goal_x = None;

        let target = match movement {
            CaretMove::Left | CaretMove::Right if !extend && !selection.is_caret() => {
                let range = doc.normalize_range(selection.range())?;
                if movement == CaretMove::Left { range.start } else { range.end }
            }
            CaretMove::Left => step_left(doc, active)?,
            CaretMove::Right => step_right(doc, active)?,
            CaretMove::WordLeft => word_left(doc, active)?,
            CaretMove::WordRight => word_right(doc, active)?,
            CaretMove::Up | CaretMove::Down => {
                let down = movement == CaretMove::Down;
                let visual = layout.and_then(|engine| {
                    let x = state
                        .goal_x
                        .or_else(|| engine.caret_rect(doc, active).map(|r| r.x))?;
                    goal_x = Some(x);
                    engine.vertical_neighbor(doc, active, down, x)
                });
                match visual {
                    Some(pos) => pos,
                    None => paragraph_step(doc, active, down),
                }
            }
            CaretMove::LineStart | CaretMove::LineEnd => {
                let end = movement == CaretMove::LineEnd;
                let visual = layout
                    .and_then(|engine| engine.paragraph_layout(doc, active.paragraph))
                    .and_then(|(layout, _)| {
                        let index = layout.line_for_offset(active.offset);
                        let line = layout.lines.get(index)?;
                        if !end {
                            return Some(line.start);
                        }
                        if index + 1 == layout.lines.len() {
                            return Some(line.end);
                        }
                        // A wrapped line ends before its hanging space.
                        let text = doc.paragraph_text(active.paragraph).ok()?;
                        let last = text.chars().nth(line.end.checked_sub(1)?)?;
                        Some(if last.is_whitespace() { line.end - 1 } else { line.end })
                    });
                match visual {
                    Some(offset) => Position::new(active.paragraph, offset),
                    None if end => Position::new(active.paragraph, doc.paragraph_len(active.paragraph)?),
                    None => Position::new(active.paragraph, 0),
                }
            }
            CaretMove::ParagraphStart => Position::new(active.paragraph, 0),
            CaretMove::ParagraphEnd => Position::new(active.paragraph, doc.paragraph_len(active.paragraph)?),
            CaretMove::DocumentStart => doc.first_position(),
            CaretMove::DocumentEnd => doc.last_position(),
        };

        let selection = if extend {
            Selection::new(selection.anchor, target)
        } else {
            Selection::caret(target)
        };
        let state = self.pane_mut(pane)?;
        state.selection = selection;
        state.goal_x = if movement.is_vertical() { goal_x } else { None };
        self.history.end_group();
        Ok(selection)
    }
}

/// Char offsets of the grapheme boundaries of `text`, including 0 and the length.
fn grapheme_boundaries(text: &str) -> Vec<usize> {
    let mut out = vec![0];
    let mut offset = 0;
    for grapheme in text.graphemes(true) {
        offset += grapheme.chars().count();
        out.push(offset);
    }
    out
}

fn previous_boundary(text: &str, offset: usize) -> usize {
    grapheme_boundaries(text)
        .into_iter()
        .rev()
        .find(|b| *b < offset)
        .unwrap_or(0)
}

fn next_boundary(text: &str, offset: usize) -> usize {
    let boundaries = grapheme_boundaries(text);
    let last = boundaries.last().copied().unwrap_or(0);
    boundaries.into_iter().find(|b| *b > offset).unwrap_or(last)
}

/// Word segments of `text` as char ranges.
fn words(text: &str) -> Vec<(usize, usize)> {
    let mut out = Vec::new();
    let mut offset = 0;
    for segment in text.split_word_bounds() {
        let len = segment.chars().count();
        if segment.chars().any(char::is_alphanumeric) {
            out.push((offset, offset + len));
        }
        offset += len;
    }
    out
}

/// The paragraph directly before or after `paragraph` in the same container.
fn sibling_paragraph(doc: &Document, paragraph: NodeId, next: bool) -> Option<NodeId> {
    let container: Container = doc.container_of(paragraph)?;
    let blocks = doc.blocks(container)?;
    let index = blocks.iter().position(|b| *b == paragraph)?;
    let sibling = if next {
        blocks.get(index + 1)?
    } else {
        blocks.get(index.checked_sub(1)?)?
    };
    doc.paragraph(*sibling).map(|_| *sibling)
}

fn step_left(doc: &Document, pos: Position) -> Result<Position, EditError> {
    if pos.offset > 0 {
        let text = doc.paragraph_text(pos.paragraph)?;
        return Ok(Position::new(pos.paragraph, previous_boundary(&text, pos.offset)));
    }
    match doc.previous_paragraph(pos.paragraph) {
        Some(previous) => Ok(Position::new(previous, doc.paragraph_len(previous)?)),
        None => Ok(pos),
    }
}

fn step_right(doc: &Document, pos: Position) -> Result<Position, EditError> {
    let text = doc.paragraph_text(pos.paragraph)?;
    if pos.offset < text.chars().count() {
        return Ok(Position::new(pos.paragraph, next_boundary(&text, pos.offset)));
    }
    Ok(doc
        .next_paragraph(pos.paragraph)
        .map_or(pos, |next| Position::new(next, 0)))
}

fn word_left(doc: &Document, pos: Position) -> Result<Position, EditError> {
    if pos.offset == 0 {
        return step_left(doc, pos);
    }
    let text = doc.paragraph_text(pos.paragraph)?;
    let start = words(&text)
        .into_iter()
        .rev()
        .find(|(start, _)| *start < pos.offset)
        .map_or(0, |(start, _)| start);
    Ok(Position::new(pos.paragraph, start))
}

fn word_right(doc: &Document, pos: Position) -> Result<Position, EditError> {
    let text = doc.paragraph_text(pos.paragraph)?;
    let len = text.chars().count();
    if pos.offset >= len {
        return step_right(doc, pos);
    }
    let end = words(&text)
        .into_iter()
        .find(|(_, end)| *end > pos.offset)
        .map_or(len, |(_, end)| end);
    Ok(Position::new(pos.paragraph, end))
}

/// Vertical movement without layout: same offset in the neighbouring paragraph.
fn paragraph_step(doc: &Document, pos: Position, down: bool) -> Position {
    let neighbour = if down {
        doc.next_paragraph(pos.paragraph)
    } else {
        doc.previous_paragraph(pos.paragraph)
    };
    match neighbour {
        Some(p) => doc.clamp(Position::new(p, pos.offset)),
        None if down => doc.last_position(),
        None => doc.first_position(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::{parse, serialize};
    use pretty_assertions::assert_eq;

    fn controller(doc: &Document) -> (EditingController, ManualClock) {
        let clock = ManualClock::new();
        let editor = EditingController::with_clock(doc, &UndoConfig::default(), Arc::new(clock.clone()));
        (editor, clock)
    }

    fn caret_at(editor: &mut EditingController, doc: &Document, pos: Position) {
        editor.set_selection(doc, 0, Selection::caret(pos)).unwrap();
    }

    #[test]
    fn test_append_then_undo_restores_text() {
        let mut doc = Document::from_plain_text("Hello");
        let p = doc.body()[0];
        let (mut editor, _) = controller(&doc);
        caret_at(&mut editor, &doc, Position::new(p, 5));
        editor.type_text(&mut doc, 0, " world").unwrap();
        assert_eq!(doc.plain_text(), "Hello world");
        editor.undo(&mut doc).unwrap();
        assert_eq!(doc.plain_text(), "Hello");
        assert_eq!(editor.selection(0).unwrap(), Selection::caret(Position::new(p, 5)));
        editor.redo(&mut doc).unwrap();
        assert_eq!(doc.plain_text(), "Hello world");
        assert_eq!(editor.selection(0).unwrap(), Selection::caret(Position::new(p, 11)));
    }

    #[test]
    fn test_typing_within_window_is_one_undo_step() {
        let mut doc = Document::new();
        let (mut editor, clock) = controller(&doc);
        for ch in ["a", "b", "c"] {
            editor.type_text(&mut doc, 0, ch).unwrap();
            clock.advance(200);
        }
        assert_eq!(editor.undo_depth(), 1);
        editor.undo(&mut doc).unwrap();
        assert_eq!(doc.plain_text(), "");
        assert!(!editor.can_undo());
    }

    #[test]
    fn test_pause_past_window_splits_undo_steps() {
        let mut doc = Document::new();
        let (mut editor, clock) = controller(&doc);
        editor.type_text(&mut doc, 0, "a").unwrap();
        clock.advance(1500);
        editor.type_text(&mut doc, 0, "b").unwrap();
        assert_eq!(editor.undo_depth(), 2);
        editor.undo(&mut doc).unwrap();
        assert_eq!(doc.plain_text(), "a");
        editor.undo(&mut doc).unwrap();
        assert_eq!(doc.plain_text(), "");
    }

    #[test]
    fn test_format_command_breaks_coalescing() {
        let mut doc = Document::new();
        let p = doc.body()[0];
        let (mut editor, _) = controller(&doc);
        editor.type_text(&mut doc, 0, "ab").unwrap();
        editor
            .execute(
                &mut doc,
                0,
                Command::ApplyFormat {
                    range: TextRange::in_paragraph(p, 0, 1),
                    delta: FormatDelta::bold(),
                },
            )
            .unwrap();
        editor.type_text(&mut doc, 0, "c").unwrap();
        assert_eq!(editor.undo_depth(), 3);
    }

    #[test]
    fn test_other_panes_are_rebased() {
        let mut doc = Document::from_plain_text("Hello world");
        let p = doc.body()[0];
        let (mut editor, _) = controller(&doc);
        let other = editor.add_pane(&doc, Selection::caret(Position::new(p, 7)));
        let anchor = editor.add_anchor(&doc, Position::new(p, 11)).unwrap();

        caret_at(&mut editor, &doc, Position::new(p, 0));
        editor.type_text(&mut doc, 0, "Oh, ").unwrap();
        assert_eq!(editor.selection(other).unwrap().active, Position::new(p, 11));
        assert_eq!(editor.anchor(anchor), Some(Position::new(p, 15)));

        // Deleting over the other caret clamps it to the deletion start.
        editor
            .set_selection(&doc, 0, Selection::new(Position::new(p, 9), Position::new(p, 15)))
            .unwrap();
        editor.delete_backward(&mut doc, 0).unwrap();
        assert_eq!(doc.plain_text(), "Oh, Hello");
        assert_eq!(editor.selection(other).unwrap().active, Position::new(p, 9));
        assert_eq!(editor.anchor(anchor), Some(Position::new(p, 9)));
    }

    #[test]
    fn test_backspace_at_paragraph_start_merges() {
        let mut doc = Document::from_plain_text("one\ntwo");
        let first = doc.body()[0];
        let second = doc.body()[1];
        let (mut editor, _) = controller(&doc);
        caret_at(&mut editor, &doc, Position::new(second, 0));
        editor.delete_backward(&mut doc, 0).unwrap();
        assert_eq!(doc.plain_text(), "onetwo");
        assert_eq!(editor.selection(0).unwrap().active, Position::new(first, 3));
        editor.undo(&mut doc).unwrap();
        assert_eq!(doc.plain_text(), "one\ntwo");
        assert_eq!(doc.body(), &[first, second]);
    }

    #[test]
    fn test_backspace_removes_whole_grapheme() {
        let mut doc = Document::from_plain_text("ae\u{301}");
        let p = doc.body()[0];
        let (mut editor, _) = controller(&doc);
        caret_at(&mut editor, &doc, Position::new(p, 3));
        editor.delete_backward(&mut doc, 0).unwrap();
        assert_eq!(doc.plain_text(), "a");
    }

    #[test]
    fn test_toggle_format_round_trip() {
        let mut doc = parse("<p>He<i>ll</i>o world</p>").unwrap();
        let before = serialize(&doc);
        let p = doc.body()[0];
        let (mut editor, _) = controller(&doc);
        editor
            .set_selection(&doc, 0, Selection::new(Position::new(p, 0), Position::new(p, 5)))
            .unwrap();
        editor.toggle_format(&mut doc, 0, FormatDelta::bold()).unwrap();
        assert_eq!(serialize(&doc), "<doc>\n<p><b>He</b><b><i>ll</i></b><b>o</b> world</p>\n</doc>\n");
        editor.toggle_format(&mut doc, 0, FormatDelta::bold()).unwrap();
        assert_eq!(serialize(&doc), before);
    }

    #[test]
    fn test_outside_mutation_invalidates_history() {
        let mut doc = Document::from_plain_text("abc");
        let p = doc.body()[0];
        let (mut editor, _) = controller(&doc);
        editor.type_text(&mut doc, 0, "x").unwrap();
        doc.insert_text(Position::new(p, 0), "!").unwrap();
        assert!(matches!(editor.undo(&mut doc), Err(EditError::StaleHistory { .. })));
        assert!(!editor.can_undo());
        assert!(matches!(editor.undo(&mut doc), Err(EditError::NothingToUndo)));
    }

    #[test]
    fn test_failed_command_leaves_state_untouched() {
        let mut doc = Document::from_plain_text("abc");
        let p = doc.body()[0];
        let (mut editor, _) = controller(&doc);
        let err = editor
            .execute(
                &mut doc,
                0,
                Command::InsertText {
                    at: Position::new(p, 10),
                    text: "x".into(),
                },
            )
            .unwrap_err();
        assert_eq!(err, EditError::Document(DocumentError::OutOfRange { offset: 10, len: 3 }));
        assert_eq!(doc.plain_text(), "abc");
        assert!(!editor.can_undo());
    }

    #[test]
    fn test_failed_command_keeps_history_and_generation() {
        let mut doc = Document::from_plain_text("hello world");
        let p = doc.body()[0];
        let (mut editor, _) = controller(&doc);
        caret_at(&mut editor, &doc, Position::new(p, 11));
        editor.type_text(&mut doc, 0, "!").unwrap();
        assert_eq!(editor.undo_depth(), 1);

        let generation = doc.generation();
        let seen = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = seen.clone();
        doc.subscribe(move |_| {
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
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
        assert!(editor.execute(&mut doc, 0, batch).is_err());
        assert_eq!(doc.generation(), generation);
        assert_eq!(seen.load(std::sync::atomic::Ordering::SeqCst), 0);
        assert_eq!(editor.undo_depth(), 1);

        editor.undo(&mut doc).unwrap();
        assert_eq!(doc.plain_text(), "hello world");
    }

    #[test]
    fn test_cut_and_paste_move_text() {
        let mut doc = Document::from_plain_text("one two three");
        let p = doc.body()[0];
        let (mut editor, _) = controller(&doc);
        editor
            .set_selection(&doc, 0, Selection::new(Position::new(p, 3), Position::new(p, 7)))
            .unwrap();
        let (payload, _) = editor.cut(&mut doc, 0).unwrap();
        assert_eq!(payload.plain_text, " two");
        assert_eq!(doc.plain_text(), "one three");
        editor.move_caret(&doc, 0, CaretMove::DocumentEnd, false, None).unwrap();
        editor.paste(&mut doc, 0, &payload.into()).unwrap();
        assert_eq!(doc.plain_text(), "one three two");
        assert_eq!(editor.selection(0).unwrap().active, Position::new(p, 13));
        assert!(matches!(editor.export_selection(&doc, 0), Err(EditError::EmptySelection)));
    }

    #[test]
    fn test_paste_degrades_to_plain_text() {
        let mut doc = Document::from_plain_text("ab");
        let p = doc.body()[0];
        let (mut editor, _) = controller(&doc);
        caret_at(&mut editor, &doc, Position::new(p, 1));
        let source = PasteSource {
            markup: Some("<p><b>oops</p>".into()),
            rich_text: None,
            plain_text: Some("X".into()),
        };
        editor.paste(&mut doc, 0, &source).unwrap();
        assert_eq!(doc.plain_text(), "aXb");
    }

    #[test]
    fn test_rejected_table_paste_falls_back_to_plain_text() {
        let mut doc = parse("<p>intro</p><table><tr><td><p>cell</p></td></tr></table>").unwrap();
        let table = doc.body()[1];
        let cell = doc.table(table).unwrap().rows[0][0];
        let inner = doc.cell(cell).unwrap().blocks[0];
        let (mut editor, _) = controller(&doc);
        caret_at(&mut editor, &doc, Position::new(inner, 4));
        let nested = "<table><tr><td><table><tr><td><p>x</p></td></tr></table></td></tr></table>";

        let source = PasteSource {
            markup: Some(nested.into()),
            rich_text: None,
            plain_text: Some("x".into()),
        };
        editor.paste(&mut doc, 0, &source).unwrap();
        assert_eq!(doc.paragraph_text(inner).unwrap(), "cellx");
        assert_eq!(editor.undo_depth(), 1);

        // Without a plain flavour the fragment's own text is used.
        let markup_only = PasteSource {
            markup: Some(nested.into()),
            ..PasteSource::default()
        };
        editor.paste(&mut doc, 0, &markup_only).unwrap();
        assert_eq!(doc.paragraph_text(inner).unwrap(), "cellxx");
    }

    #[test]
    fn test_caret_movement_without_layout() {
        let doc = Document::from_plain_text("hello big\nworld");
        let first = doc.body()[0];
        let second = doc.body()[1];
        let (mut editor, _) = controller(&doc);
        let moved = |editor: &mut EditingController, m, extend| editor.move_caret(&doc, 0, m, extend, None).unwrap();

        assert_eq!(moved(&mut editor, CaretMove::WordRight, false).active, Position::new(first, 5));
        assert_eq!(moved(&mut editor, CaretMove::WordRight, false).active, Position::new(first, 9));
        assert_eq!(moved(&mut editor, CaretMove::Right, false).active, Position::new(second, 0));
        assert_eq!(moved(&mut editor, CaretMove::Left, false).active, Position::new(first, 9));
        assert_eq!(moved(&mut editor, CaretMove::WordLeft, false).active, Position::new(first, 6));
        let selection = moved(&mut editor, CaretMove::Down, true);
        assert_eq!(selection, Selection::new(Position::new(first, 6), Position::new(second, 5)));
        // Collapsing a selection with Left lands on its start.
        assert_eq!(moved(&mut editor, CaretMove::Left, false).active, Position::new(first, 6));
        assert_eq!(moved(&mut editor, CaretMove::DocumentEnd, false).active, Position::new(second, 5));
    }

    #[test]
    fn test_paragraph_break_replaces_selection() {
        let mut doc = Document::from_plain_text("abcdef");
        let p = doc.body()[0];
        let (mut editor, _) = controller(&doc);
        editor
            .set_selection(&doc, 0, Selection::new(Position::new(p, 4), Position::new(p, 2)))
            .unwrap();
        editor.insert_paragraph_break(&mut doc, 0).unwrap();
        assert_eq!(doc.plain_text(), "ab\nef");
        let caret = editor.selection(0).unwrap().active;
        assert_eq!(caret.offset, 0);
        assert_eq!(doc.paragraph_text(caret.paragraph).unwrap(), "ef");
        editor.undo(&mut doc).unwrap();
        assert_eq!(doc.plain_text(), "abcdef");
    }

    #[test]
    fn test_unknown_pane() {
        let mut doc = Document::new();
        let (mut editor, _) = controller(&doc);
        assert_eq!(editor.type_text(&mut doc, 3, "x"), Err(EditError::UnknownPane(3)));
        assert!(!editor.remove_pane(0));
    }
}
