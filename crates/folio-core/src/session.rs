//! Editor session: the command surface an application shell drives.
//!
//! An [`EditorSession`] owns the document, the editing controller, the view mode controller
//! and one [`LayoutEngine`] per pane. Every [`Action`] goes through [`EditorSession::execute`];
//! edits are forwarded to every pane's layout engine, so split panes stay consistent while
//! keeping their own scroll position and caret.
//!
//! Render-time hints such as questionable ranges reported by a spell checker are tracked with
//! anchors, so they follow the text they flag without ever mutating the document.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::config::EditorConfig;
use crate::document::{Document, DocumentChange};
use crate::editing::{AnchorId, CaretMove, ClipboardPayload, Clock, Command, EditingController, PasteSource};
use crate::error::{EditError, ParseError};
use crate::format::{Alignment, FormatDelta};
use crate::layout::metrics::TextMeasurer;
use crate::layout::{LayoutBox, LayoutEngine, Point, Rect};
use crate::markup;
use crate::position::{Selection, TextRange};
use crate::search::SearchOptions;
use crate::snapshot::TextSnapshot;
use crate::view_mode::{RenderHints, ViewMode, ViewModeController};

/// Identifier of a questionable-range hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HintId(u64);

impl HintId {
    /// Get the underlying numeric id.
    pub fn get(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone)]
struct Hint {
    start: AnchorId,
    end: AnchorId,
    message: String,
}

/// A flagged range, as it currently sits in the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionableRange {
    /// Hint id.
    pub id: HintId,
    /// Flagged text.
    pub range: TextRange,
    /// Why it was flagged.
    pub message: String,
}

/// Discrete operations invoked by menus, toolbars and key bindings.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Type text at the caret of the focused pane.
    InsertText(String),
    /// Split the paragraph at the caret.
    InsertParagraphBreak,
    /// Backspace.
    DeleteBackward,
    /// Delete.
    DeleteForward,
    /// Toggle a format over the selection.
    ToggleFormat(FormatDelta),
    /// Align the selected paragraphs.
    SetAlignment(Alignment),
    /// Insert an empty table at the caret.
    InsertTable {
        /// Row count.
        rows: usize,
        /// Column count.
        cols: usize,
    },
    /// Insert an inline element at the caret.
    InsertInline {
        /// Element kind.
        kind: String,
        /// Element payload.
        payload: String,
    },
    /// Revert the last undo group.
    Undo,
    /// Reapply the last undone group.
    Redo,
    /// Export the selection of the focused pane.
    Copy,
    /// Export and delete the selection of the focused pane.
    Cut,
    /// Paste from what the host found on the clipboard.
    Paste(PasteSource),
    /// Move the caret of the focused pane.
    MoveCaret {
        /// Movement.
        movement: CaretMove,
        /// Keep the anchor in place.
        extend: bool,
    },
    /// Replace the selection of the focused pane.
    Select(Selection),
    /// Place the caret at a point of the focused pane (document coordinates).
    ClickAt {
        /// Where.
        point: Point,
        /// Extend the selection instead of moving the caret.
        extend: bool,
    },
    /// Enter a mode.
    SwitchViewMode(ViewMode),
    /// Enter a mode, or leave it if active.
    ToggleViewMode(ViewMode),
    /// Cycle through the modes.
    CycleViewMode {
        /// Direction.
        forward: bool,
    },
    /// Give a pane the keyboard focus.
    FocusPane(usize),
    /// Scroll the focused pane.
    ScrollBy(f32),
    /// The host window changed size.
    Resize {
        /// New width.
        width: f32,
        /// New height.
        height: f32,
    },
    /// Replace every occurrence of a query.
    ReplaceAll {
        /// Search query.
        query: String,
        /// Search options.
        options: SearchOptions,
        /// Replacement text.
        replacement: String,
    },
    /// Replace the text of a questionable range with a suggestion.
    ApplySuggestion {
        /// Hint to resolve.
        hint: HintId,
        /// Replacement text.
        replacement: String,
    },
}

/// What an action did.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    /// The document changed.
    Edited {
        /// Change notifications, in order.
        changes: Vec<DocumentChange>,
    },
    /// Clipboard content to hand to the host.
    Copied(ClipboardPayload),
    /// Only the selection changed.
    SelectionChanged(Selection),
    /// The view mode (or the geometry it produces) changed.
    ViewChanged(ViewMode),
    /// The focused pane scrolled.
    Scrolled {
        /// New viewport top.
        top: f32,
    },
    /// Keyboard focus moved.
    PaneFocused(usize),
    /// Nothing happened.
    Nothing,
}

/// One open manuscript with its panes.
pub struct EditorSession {
    doc: Document,
    editor: EditingController,
    views: ViewModeController,
    layouts: BTreeMap<usize, LayoutEngine>,
    focused: usize,
    measurer: Arc<dyn TextMeasurer>,
    config: EditorConfig,
    width: f32,
    height: f32,
    hints: BTreeMap<HintId, Hint>,
    next_hint: u64,
}

impl fmt::Debug for EditorSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EditorSession")
            .field("generation", &self.doc.generation())
            .field("mode", &self.views.mode())
            .field("panes", &self.layouts.keys().collect::<Vec<_>>())
            .field("focused", &self.focused)
            .field("hints", &self.hints.len())
            .finish_non_exhaustive()
    }
}

impl EditorSession {
    /// Open `doc` in continuous mode with one pane.
    pub fn new(doc: Document, measurer: Arc<dyn TextMeasurer>, config: EditorConfig) -> Self {
        let editor = EditingController::new(&doc, &config.undo);
        Self::assemble(doc, editor, measurer, config)
    }

    /// Like [`EditorSession::new`] with an explicit clock for typing coalescing.
    pub fn with_clock(doc: Document, measurer: Arc<dyn TextMeasurer>, config: EditorConfig, clock: Arc<dyn Clock>) -> Self {
        let editor = EditingController::with_clock(&doc, &config.undo, clock);
        Self::assemble(doc, editor, measurer, config)
    }

    /// Parse markup and open it.
    pub fn open_markup(text: &str, measurer: Arc<dyn TextMeasurer>, config: EditorConfig) -> Result<Self, ParseError> {
        Ok(Self::new(markup::parse(text)?, measurer, config))
    }

    fn assemble(doc: Document, editor: EditingController, measurer: Arc<dyn TextMeasurer>, config: EditorConfig) -> Self {
        let views = ViewModeController::new(config.view.clone());
        let (width, height) = (config.layout.viewport_width, config.layout.viewport_height);
        let mut layouts = BTreeMap::new();
        layouts.insert(
            0,
            LayoutEngine::new(&doc, measurer.clone(), config.layout.clone(), views.layout_params(width)),
        );
        Self {
            doc,
            editor,
            views,
            layouts,
            focused: 0,
            measurer,
            config,
            width,
            height,
            hints: BTreeMap::new(),
            next_hint: 0,
        }
    }

    // ----- accessors -----

    /// The document. Mutation goes through [`EditorSession::execute`].
    pub fn document(&self) -> &Document {
        &self.doc
    }

    /// The editing controller (selections, history).
    pub fn editor(&self) -> &EditingController {
        &self.editor
    }

    /// The active view mode.
    pub fn view_mode(&self) -> ViewMode {
        self.views.mode()
    }

    /// Pane that receives actions.
    pub fn focused_pane(&self) -> usize {
        self.focused
    }

    /// Open panes, ascending.
    pub fn pane_ids(&self) -> Vec<usize> {
        self.layouts.keys().copied().collect()
    }

    /// Layout engine of `pane`.
    pub fn layout(&self, pane: usize) -> Option<&LayoutEngine> {
        self.layouts.get(&pane)
    }

    /// Selection of the focused pane.
    pub fn selection(&self) -> Selection {
        self.editor
            .selection(self.focused)
            .unwrap_or_else(|_| Selection::caret(self.doc.first_position()))
    }

    /// Current document generation.
    pub fn generation(&self) -> u64 {
        self.doc.generation()
    }

    /// Immutable text for background analysis.
    pub fn snapshot(&self) -> TextSnapshot {
        self.doc.snapshot()
    }

    /// Serialize the document.
    pub fn to_markup(&self) -> String {
        markup::serialize(&self.doc)
    }

    /// Returns `true` if the document differs from the last saved state.
    pub fn is_modified(&self) -> bool {
        !self.editor.is_clean()
    }

    /// Record the current state as saved.
    pub fn mark_saved(&mut self) {
        self.editor.mark_clean();
    }

    /// Render hints for the focused pane.
    pub fn render_hints(&self) -> Result<RenderHints, EditError> {
        let caret = self.selection().active;
        Ok(self
            .views
            .render_hints(&self.doc, caret, self.layouts.get(&self.focused))?)
    }

    /// Drawable boxes of `pane`.
    pub fn visible_boxes(&self, pane: usize) -> Vec<LayoutBox> {
        self.layouts.get(&pane).map(LayoutEngine::visible_boxes).unwrap_or_default()
    }

    /// Caret rectangle of the focused pane.
    pub fn caret_rect(&self) -> Option<Rect> {
        let caret = self.selection().active;
        self.layouts.get(&self.focused)?.caret_rect(&self.doc, caret)
    }

    // ----- questionable ranges -----

    /// Flag `range` for render-time highlighting. The document is not touched.
    pub fn mark_questionable(&mut self, range: TextRange, message: impl Into<String>) -> Result<HintId, EditError> {
        let range = self.doc.normalize_range(range)?;
        let start = self.editor.add_anchor(&self.doc, range.start)?;
        let end = self.editor.add_anchor(&self.doc, range.end)?;
        let id = HintId(self.next_hint);
        self.next_hint += 1;
        self.hints.insert(
            id,
            Hint {
                start,
                end,
                message: message.into(),
            },
        );
        Ok(id)
    }

    /// Flagged ranges that still cover some text.
    pub fn questionable_ranges(&self) -> Vec<QuestionableRange> {
        self.hints
            .iter()
            .filter_map(|(id, hint)| {
                let range = self.hint_range(hint)?;
                Some(QuestionableRange {
                    id: *id,
                    range,
                    message: hint.message.clone(),
                })
            })
            .collect()
    }

    fn hint_range(&self, hint: &Hint) -> Option<TextRange> {
        let range = TextRange::new(self.editor.anchor(hint.start)?, self.editor.anchor(hint.end)?);
        (!range.is_empty()).then_some(range)
    }

    /// Drop a hint.
    pub fn remove_hint(&mut self, id: HintId) -> bool {
        let Some(hint) = self.hints.remove(&id) else {
            return false;
        };
        self.editor.remove_anchor(hint.start);
        self.editor.remove_anchor(hint.end);
        true
    }

    /// Drop every hint.
    pub fn clear_hints(&mut self) {
        let ids: Vec<HintId> = self.hints.keys().copied().collect();
        for id in ids {
            self.remove_hint(id);
        }
    }

    // ----- actions -----

    /// Run one action against the focused pane.
    pub fn execute(&mut self, action: Action) -> Result<ActionOutcome, EditError> {
        let pane = self.focused;
        let doc = &mut self.doc;
        match action {
            Action::InsertText(text) => {
                let changes = self.editor.type_text(doc, pane, &text)?;
                Ok(self.after_edit(changes))
            }
            Action::InsertParagraphBreak => {
                let changes = self.editor.insert_paragraph_break(doc, pane)?;
                Ok(self.after_edit(changes))
            }
            Action::DeleteBackward => {
                let changes = self.editor.delete_backward(doc, pane)?;
                Ok(self.after_edit(changes))
            }
            Action::DeleteForward => {
                let changes = self.editor.delete_forward(doc, pane)?;
                Ok(self.after_edit(changes))
            }
            Action::ToggleFormat(delta) => {
                let changes = self.editor.toggle_format(doc, pane, delta)?;
                Ok(self.after_edit(changes))
            }
            Action::SetAlignment(alignment) => {
                let changes = self.editor.set_alignment(doc, pane, alignment)?;
                Ok(self.after_edit(changes))
            }
            Action::InsertTable { rows, cols } => {
                let changes = self.editor.insert_table(doc, pane, rows, cols)?;
                Ok(self.after_edit(changes))
            }
            Action::InsertInline { kind, payload } => {
                let changes = self.editor.insert_inline(doc, pane, &kind, &payload)?;
                Ok(self.after_edit(changes))
            }
            Action::Undo => {
                let changes = self.editor.undo(doc)?;
                Ok(self.after_edit(changes))
            }
            Action::Redo => {
                let changes = self.editor.redo(doc)?;
                Ok(self.after_edit(changes))
            }
            Action::Copy => Ok(ActionOutcome::Copied(self.editor.export_selection(doc, pane)?)),
            Action::Cut => {
                let (payload, changes) = self.editor.cut(doc, pane)?;
                self.after_edit(changes);
                Ok(ActionOutcome::Copied(payload))
            }
            Action::Paste(source) => {
                let changes = self.editor.paste(doc, pane, &source)?;
                Ok(self.after_edit(changes))
            }
            Action::MoveCaret { movement, extend } => {
                let selection = self
                    .editor
                    .move_caret(doc, pane, movement, extend, self.layouts.get(&pane))?;
                self.follow_caret();
                Ok(ActionOutcome::SelectionChanged(selection))
            }
            Action::Select(selection) => {
                self.editor.set_selection(doc, pane, selection)?;
                self.follow_caret();
                Ok(ActionOutcome::SelectionChanged(selection))
            }
            Action::ClickAt { point, extend } => {
                let Some(pos) = self.layouts.get(&pane).and_then(|layout| layout.hit_test(point)) else {
                    return Ok(ActionOutcome::Nothing);
                };
                let anchor = self.editor.selection(pane)?.anchor;
                let selection = if extend {
                    Selection::new(anchor, pos)
                } else {
                    Selection::caret(pos)
                };
                self.editor.set_selection(doc, pane, selection)?;
                Ok(ActionOutcome::SelectionChanged(selection))
            }
            Action::SwitchViewMode(mode) => {
                self.views.switch_to(mode);
                self.apply_view()
            }
            Action::ToggleViewMode(mode) => {
                self.views.toggle(mode);
                self.apply_view()
            }
            Action::CycleViewMode { forward } => {
                if forward {
                    self.views.cycle_next();
                } else {
                    self.views.cycle_previous();
                }
                self.apply_view()
            }
            Action::FocusPane(target) => {
                if !self.layouts.contains_key(&target) {
                    return Err(EditError::UnknownPane(target));
                }
                self.focused = target;
                self.editor.end_group();
                Ok(ActionOutcome::PaneFocused(target))
            }
            Action::ScrollBy(dy) => {
                let layout = self.layouts.get_mut(&pane).ok_or(EditError::UnknownPane(pane))?;
                layout.scroll_by(doc, dy);
                Ok(ActionOutcome::Scrolled {
                    top: layout.viewport().top,
                })
            }
            Action::Resize { width, height } => {
                if width.is_finite() && width > 0.0 {
                    self.width = width;
                }
                if height.is_finite() && height > 0.0 {
                    self.height = height;
                }
                self.apply_view()
            }
            Action::ReplaceAll {
                query,
                options,
                replacement,
            } => {
                let (_, changes) = self.editor.replace_all(doc, pane, &query, options, &replacement)?;
                Ok(self.after_edit(changes))
            }
            Action::ApplySuggestion { hint, replacement } => self.apply_suggestion(hint, &replacement),
        }
    }

    /// Replace the flagged text with `replacement` as an undoable edit and drop the hint.
    pub fn apply_suggestion(&mut self, hint: HintId, replacement: &str) -> Result<ActionOutcome, EditError> {
        let range = self
            .hints
            .get(&hint)
            .and_then(|h| self.hint_range(h))
            .ok_or(EditError::UnknownHint(hint.get()))?;
        let command = Command::ReplaceRange {
            range,
            text: replacement.to_string(),
        };
        let changes = self.editor.execute(&mut self.doc, self.focused, command)?;
        self.editor.end_group();
        self.remove_hint(hint);
        Ok(self.after_edit(changes))
    }

    fn after_edit(&mut self, changes: Vec<DocumentChange>) -> ActionOutcome {
        if changes.is_empty() {
            return ActionOutcome::Nothing;
        }
        for layout in self.layouts.values_mut() {
            for change in &changes {
                layout.apply_change(&self.doc, change);
            }
        }
        self.follow_caret();
        ActionOutcome::Edited { changes }
    }

    fn follow_caret(&mut self) {
        let caret = self.selection().active;
        if let Some(layout) = self.layouts.get_mut(&self.focused) {
            self.views.follow_caret(&self.doc, layout, caret);
        }
    }

    /// Bring the pane set and every pane's geometry in line with the current mode.
    fn apply_view(&mut self) -> Result<ActionOutcome, EditError> {
        let wanted = self.views.pane_count();
        while self.layouts.len() < wanted {
            let selection = self.editor.selection(self.focused)?;
            let id = self.editor.add_pane(&self.doc, selection);
            let top = self.layouts.get(&self.focused).map_or(0.0, |l| l.viewport().top);
            let mut layout = LayoutEngine::new(
                &self.doc,
                self.measurer.clone(),
                self.config.layout.clone(),
                self.views.layout_params(self.pane_width()),
            );
            layout.set_viewport(&self.doc, top, self.height);
            self.layouts.insert(id, layout);
            log::debug!("opened pane {id}");
        }
        while self.layouts.len() > wanted {
            let Some(id) = self.layouts.keys().rev().copied().find(|id| *id != self.focused) else {
                break;
            };
            self.layouts.remove(&id);
            self.editor.remove_pane(id);
            log::debug!("closed pane {id}");
        }
        let params = self.views.layout_params(self.pane_width());
        for layout in self.layouts.values_mut() {
            layout.set_params(&self.doc, params.clone());
            let top = layout.viewport().top;
            layout.set_viewport(&self.doc, top, self.height);
        }
        self.follow_caret();
        Ok(ActionOutcome::ViewChanged(self.views.mode()))
    }

    fn pane_width(&self) -> f32 {
        self.width / self.views.pane_count() as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LayoutConfig;
    use crate::layout::MonospaceMeasurer;
    use crate::position::Position;
    use pretty_assertions::assert_eq;

    fn session(text: &str) -> EditorSession {
        EditorSession::new(
            Document::from_plain_text(text),
            Arc::new(MonospaceMeasurer::default()),
            EditorConfig::default(),
        )
    }

    #[test]
    fn test_view_mode_round_trip_keeps_content_and_positions() {
        let mut s = session("Hello world\nSecond paragraph");
        let p = s.document().body()[1];
        let selection = Selection::new(Position::new(p, 2), Position::new(p, 8));
        s.execute(Action::Select(selection)).unwrap();
        let markup = s.to_markup();
        let generation = s.generation();

        assert_eq!(
            s.execute(Action::SwitchViewMode(ViewMode::Page)).unwrap(),
            ActionOutcome::ViewChanged(ViewMode::Page)
        );
        assert!(s.layout(0).unwrap().page_count().is_some());
        s.execute(Action::SwitchViewMode(ViewMode::Continuous)).unwrap();

        assert_eq!(s.to_markup(), markup);
        assert_eq!(s.selection(), selection);
        assert_eq!(s.generation(), generation);
        assert!(s.layout(0).unwrap().page_count().is_none());
    }

    #[test]
    fn test_split_panes_have_independent_cursors() {
        let mut s = session("alpha\nbeta");
        let (a, b) = (s.document().body()[0], s.document().body()[1]);
        s.execute(Action::SwitchViewMode(ViewMode::Split)).unwrap();
        assert_eq!(s.pane_ids(), vec![0, 1]);
        assert_eq!(s.layout(1).unwrap().params().content_width, 400.0);

        s.execute(Action::FocusPane(1)).unwrap();
        s.execute(Action::MoveCaret {
            movement: CaretMove::DocumentEnd,
            extend: false,
        })
        .unwrap();
        s.execute(Action::InsertText("!".into())).unwrap();
        assert_eq!(s.document().plain_text(), "alpha\nbeta!");
        assert_eq!(s.selection().active, Position::new(b, 5));
        assert_eq!(s.editor().selection(0).unwrap().active, Position::new(a, 0));
        for pane in [0, 1] {
            assert_eq!(s.layout(pane).unwrap().block_count(), 2);
        }

        s.execute(Action::SwitchViewMode(ViewMode::Continuous)).unwrap();
        assert_eq!(s.pane_ids(), vec![1]);
        assert_eq!(s.layout(1).unwrap().params().content_width, 800.0);
    }

    #[test]
    fn test_questionable_range_follows_edits_and_suggestion_is_undoable() {
        let mut s = session("Fix teh typo");
        let p = s.document().body()[0];
        let hint = s
            .mark_questionable(TextRange::in_paragraph(p, 4, 7), "possible misspelling")
            .unwrap();
        let generation = s.generation();
        s.execute(Action::InsertText("A ".into())).unwrap();
        assert!(s.generation() > generation);
        assert_eq!(s.questionable_ranges()[0].range, TextRange::in_paragraph(p, 6, 9));

        s.execute(Action::ApplySuggestion {
            hint,
            replacement: "the".into(),
        })
        .unwrap();
        assert_eq!(s.document().plain_text(), "A Fix the typo");
        assert!(s.questionable_ranges().is_empty());
        s.execute(Action::Undo).unwrap();
        assert_eq!(s.document().plain_text(), "A Fix teh typo");
        assert_eq!(
            s.apply_suggestion(hint, "x"),
            Err(EditError::UnknownHint(hint.get()))
        );
    }

    #[test]
    fn test_deleting_flagged_text_hides_hint() {
        let mut s = session("one two three");
        let p = s.document().body()[0];
        s.mark_questionable(TextRange::in_paragraph(p, 4, 7), "repeated").unwrap();
        s.execute(Action::Select(Selection::new(Position::new(p, 3), Position::new(p, 8))))
            .unwrap();
        s.execute(Action::DeleteBackward).unwrap();
        assert!(s.questionable_ranges().is_empty());
    }

    #[test]
    fn test_click_places_caret() {
        let mut s = session("Hello world");
        let p = s.document().body()[0];
        let outcome = s
            .execute(Action::ClickAt {
                point: Point::new(41.0, 5.0),
                extend: false,
            })
            .unwrap();
        assert_eq!(outcome, ActionOutcome::SelectionChanged(Selection::caret(Position::new(p, 5))));
        let caret = s.caret_rect().unwrap();
        assert_eq!((caret.x, caret.y), (40.0, 0.0));
    }

    #[test]
    fn test_typewriter_mode_holds_caret_line() {
        let text: Vec<String> = (0..300).map(|i| format!("line {i}")).collect();
        let mut config = EditorConfig::default();
        config.layout = LayoutConfig {
            viewport_height: 400.0,
            ..LayoutConfig::default()
        };
        let mut s = EditorSession::new(
            Document::from_plain_text(&text.join("\n")),
            Arc::new(MonospaceMeasurer::default()),
            config,
        );
        s.execute(Action::SwitchViewMode(ViewMode::Typewriter)).unwrap();
        for _ in 0..40 {
            s.execute(Action::MoveCaret {
                movement: CaretMove::Down,
                extend: false,
            })
            .unwrap();
        }
        let caret = s.caret_rect().unwrap();
        let top = s.layout(0).unwrap().viewport().top;
        let held_at = caret.y + caret.height / 2.0 - top;
        assert!((held_at - 0.4 * 400.0).abs() < 1.0, "caret held at {held_at}");
    }

    #[test]
    fn test_clipboard_actions() {
        let mut s = session("copy me");
        let p = s.document().body()[0];
        s.execute(Action::Select(Selection::new(Position::new(p, 0), Position::new(p, 4))))
            .unwrap();
        let ActionOutcome::Copied(payload) = s.execute(Action::Copy).unwrap() else {
            panic!("copy should produce a payload");
        };
        s.execute(Action::MoveCaret {
            movement: CaretMove::DocumentEnd,
            extend: false,
        })
        .unwrap();
        s.execute(Action::Paste(payload.into())).unwrap();
        assert_eq!(s.document().plain_text(), "copy mecopy");
        assert!(s.is_modified());
        s.mark_saved();
        assert!(!s.is_modified());
    }
}
