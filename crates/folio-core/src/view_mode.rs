//! View modes: a presentation state machine over layout parameters and render hints.
//!
//! The controller never touches the document. It decides which [`LayoutParams`] the panes'
//! layout engines use and what the host should do at render time (dim text, hide chrome,
//! keep the caret line steady).

use std::fmt;

use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

use crate::config::ViewConfig;
use crate::document::Document;
use crate::error::DocumentError;
use crate::layout::{LayoutEngine, LayoutParams};
use crate::position::{Position, TextRange};

/// How the document is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ViewMode {
    /// One endless column.
    #[default]
    Continuous,
    /// Fixed-size pages with margins and explicit breaks.
    Page,
    /// The caret line stays at a fixed height of the viewport.
    Typewriter,
    /// Everything but the active paragraph, sentence or line is dimmed.
    Focus,
    /// No chrome; a narrow text column with an optional overlay.
    DistractionFree,
    /// Two panes over the same document.
    Split,
}

impl ViewMode {
    /// All modes in cycling order.
    pub const ALL: [ViewMode; 6] = [
        ViewMode::Continuous,
        ViewMode::Page,
        ViewMode::Typewriter,
        ViewMode::Focus,
        ViewMode::DistractionFree,
        ViewMode::Split,
    ];

    /// Stable identifier, e.g. for settings and command bindings.
    pub fn id(self) -> &'static str {
        match self {
            ViewMode::Continuous => "continuous",
            ViewMode::Page => "page",
            ViewMode::Typewriter => "typewriter",
            ViewMode::Focus => "focus",
            ViewMode::DistractionFree => "distraction-free",
            ViewMode::Split => "split",
        }
    }

    /// Look a mode up by [`ViewMode::id`].
    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|mode| mode.id() == id)
    }

    /// Human readable name.
    pub fn label(self) -> &'static str {
        match self {
            ViewMode::Continuous => "Continuous",
            ViewMode::Page => "Page Layout",
            ViewMode::Typewriter => "Typewriter",
            ViewMode::Focus => "Focus",
            ViewMode::DistractionFree => "Distraction-Free",
            ViewMode::Split => "Split View",
        }
    }

    /// The mode after this one, wrapping around.
    pub fn next(self) -> Self {
        let i = Self::ALL.iter().position(|m| *m == self).unwrap_or(0);
        Self::ALL[(i + 1) % Self::ALL.len()]
    }

    /// The mode before this one, wrapping around.
    pub fn previous(self) -> Self {
        let i = Self::ALL.iter().position(|m| *m == self).unwrap_or(0);
        Self::ALL[(i + Self::ALL.len() - 1) % Self::ALL.len()]
    }
}

impl fmt::Display for ViewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// What focus mode keeps undimmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FocusScope {
    /// The caret's paragraph.
    #[default]
    Paragraph,
    /// The caret's sentence.
    Sentence,
    /// The caret's visual line.
    Line,
}

/// Focus mode hint: draw everything outside `range` at `dim_opacity`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FocusHint {
    /// Undimmed range.
    pub range: TextRange,
    /// Opacity of the rest.
    pub dim_opacity: f32,
}

/// Render-time decisions for the current mode.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderHints {
    /// Active mode.
    pub mode: ViewMode,
    /// Whether toolbars, rulers and panels are shown.
    pub show_chrome: bool,
    /// Fraction of the viewport height the caret line is held at.
    pub typewriter_anchor: Option<f32>,
    /// Dimming in focus mode.
    pub focus: Option<FocusHint>,
    /// Whether the word count overlay is shown.
    pub show_word_count: bool,
    /// Number of panes to show.
    pub pane_count: usize,
}

/// The view mode state machine.
#[derive(Debug, Clone)]
pub struct ViewModeController {
    mode: ViewMode,
    previous: ViewMode,
    config: ViewConfig,
}

impl ViewModeController {
    /// Start in [`ViewMode::Continuous`].
    pub fn new(config: ViewConfig) -> Self {
        Self {
            mode: ViewMode::Continuous,
            previous: ViewMode::Continuous,
            config,
        }
    }

    pub fn mode(&self) -> ViewMode {
        self.mode
    }

    /// The mode active before the last switch.
    pub fn previous_mode(&self) -> ViewMode {
        self.previous
    }

    pub fn config(&self) -> &ViewConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: ViewConfig) {
        self.config = config;
    }

    /// Switch to `mode`. Returns `true` if the mode changed.
    pub fn switch_to(&mut self, mode: ViewMode) -> bool {
        if mode == self.mode {
            return false;
        }
        log::debug!("view mode {} -> {}", self.mode, mode);
        self.previous = self.mode;
        self.mode = mode;
        true
    }

    /// Enter `mode`, or leave it for the previous mode if it is already active.
    pub fn toggle(&mut self, mode: ViewMode) -> ViewMode {
        if self.mode == mode {
            let back = if self.previous == mode {
                ViewMode::Continuous
            } else {
                self.previous
            };
            self.switch_to(back);
        } else {
            self.switch_to(mode);
        }
        self.mode
    }

    pub fn cycle_next(&mut self) -> ViewMode {
        self.switch_to(self.mode.next());
        self.mode
    }

    pub fn cycle_previous(&mut self) -> ViewMode {
        self.switch_to(self.mode.previous());
        self.mode
    }

    /// Number of panes the mode shows.
    pub fn pane_count(&self) -> usize {
        if self.mode == ViewMode::Split { 2 } else { 1 }
    }

    /// Layout parameters for one pane of `pane_width` pixels.
    pub fn layout_params(&self, pane_width: f32) -> LayoutParams {
        match self.mode {
            ViewMode::Page => LayoutParams::paged(self.config.page.clone()),
            ViewMode::DistractionFree => {
                let width = (pane_width * self.config.distraction_free_text_width).max(1.0);
                LayoutParams {
                    content_width: width,
                    content_x: ((pane_width - width) / 2.0).max(0.0),
                    page: None,
                }
            }
            _ => LayoutParams::continuous(pane_width),
        }
    }

    /// Hints for painting a pane whose caret is at `caret`. Line focus needs `layout`; without
    /// it the paragraph is kept undimmed.
    pub fn render_hints(
        &self,
        doc: &Document,
        caret: Position,
        layout: Option<&LayoutEngine>,
    ) -> Result<RenderHints, DocumentError> {
        let focus = match self.mode {
            ViewMode::Focus => Some(FocusHint {
                range: self.focus_range(doc, caret, layout)?,
                dim_opacity: self.config.focus_dim_opacity,
            }),
            _ => None,
        };
        Ok(RenderHints {
            mode: self.mode,
            show_chrome: self.mode != ViewMode::DistractionFree,
            typewriter_anchor: (self.mode == ViewMode::Typewriter).then_some(self.config.typewriter_focus),
            focus,
            show_word_count: self.mode == ViewMode::DistractionFree && self.config.show_word_count,
            pane_count: self.pane_count(),
        })
    }

    /// The range focus mode keeps undimmed around `caret`.
    pub fn focus_range(
        &self,
        doc: &Document,
        caret: Position,
        layout: Option<&LayoutEngine>,
    ) -> Result<TextRange, DocumentError> {
        let paragraph = caret.paragraph;
        let len = doc.paragraph_len(paragraph)?;
        let whole = TextRange::in_paragraph(paragraph, 0, len);
        match self.config.focus_scope {
            FocusScope::Paragraph => Ok(whole),
            FocusScope::Sentence => {
                let text = doc.paragraph_text(paragraph)?;
                let (start, end) = sentence_around(&text, caret.offset);
                Ok(TextRange::in_paragraph(paragraph, start, end))
            }
            FocusScope::Line => Ok(layout
                .and_then(|engine| engine.paragraph_layout(doc, paragraph))
                .and_then(|(layout, _)| layout.lines.get(layout.line_for_offset(caret.offset)))
                .map_or(whole, |line| TextRange::in_paragraph(paragraph, line.start, line.end))),
        }
    }

    /// Scroll `layout` after the caret moved: typewriter mode holds the caret line at its
    /// anchor, other modes scroll just enough to show it.
    pub fn follow_caret(&self, doc: &Document, layout: &mut LayoutEngine, caret: Position) {
        if self.mode == ViewMode::Typewriter {
            layout.scroll_caret_to(doc, caret, self.config.typewriter_focus);
        } else {
            layout.scroll_into_view(doc, caret);
        }
    }
}

/// Char range of the sentence containing `offset`, including its trailing whitespace.
fn sentence_around(text: &str, offset: usize) -> (usize, usize) {
    let mut last = (0, 0);
    for sentence in text.split_sentence_bounds() {
        let end = last.1 + sentence.chars().count();
        last = (last.1, end);
        if offset < end {
            break;
        }
    }
    last
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LayoutConfig;
    use crate::layout::MonospaceMeasurer;
    use std::sync::Arc;

    fn controller() -> ViewModeController {
        ViewModeController::new(ViewConfig::default())
    }

    #[test]
    fn test_ids_round_trip() {
        for mode in ViewMode::ALL {
            assert_eq!(ViewMode::from_id(mode.id()), Some(mode));
        }
        assert_eq!(ViewMode::from_id("outline"), None);
    }

    #[test]
    fn test_cycling_wraps() {
        let mut views = controller();
        assert_eq!(views.cycle_previous(), ViewMode::Split);
        assert_eq!(views.cycle_next(), ViewMode::Continuous);
        assert_eq!(views.cycle_next(), ViewMode::Page);
    }

    #[test]
    fn test_toggle_returns_to_previous_mode() {
        let mut views = controller();
        views.switch_to(ViewMode::Page);
        assert_eq!(views.toggle(ViewMode::Focus), ViewMode::Focus);
        assert_eq!(views.toggle(ViewMode::Focus), ViewMode::Page);
        assert!(!views.switch_to(ViewMode::Page));
    }

    #[test]
    fn test_layout_params_per_mode() {
        let mut views = controller();
        assert_eq!(views.layout_params(1000.0), LayoutParams::continuous(1000.0));
        views.switch_to(ViewMode::DistractionFree);
        let params = views.layout_params(1000.0);
        assert_eq!((params.content_width, params.content_x), (600.0, 200.0));
        views.switch_to(ViewMode::Page);
        assert!(views.layout_params(1000.0).page.is_some());
        views.switch_to(ViewMode::Split);
        assert_eq!(views.pane_count(), 2);
    }

    #[test]
    fn test_render_hints() {
        let doc = Document::from_plain_text("One. Two three. Four.");
        let p = doc.body()[0];
        let caret = Position::new(p, 7);
        let mut views = controller();

        let hints = views.render_hints(&doc, caret, None).unwrap();
        assert!(hints.show_chrome && hints.focus.is_none() && hints.typewriter_anchor.is_none());

        views.switch_to(ViewMode::Typewriter);
        assert_eq!(views.render_hints(&doc, caret, None).unwrap().typewriter_anchor, Some(0.4));

        views.switch_to(ViewMode::DistractionFree);
        let hints = views.render_hints(&doc, caret, None).unwrap();
        assert!(!hints.show_chrome && hints.show_word_count);

        views.switch_to(ViewMode::Focus);
        let focus = views.render_hints(&doc, caret, None).unwrap().focus.unwrap();
        assert_eq!(focus.range, TextRange::in_paragraph(p, 0, 21));
        assert_eq!(focus.dim_opacity, 0.3);

        views.set_config(ViewConfig {
            focus_scope: FocusScope::Sentence,
            ..ViewConfig::default()
        });
        assert_eq!(views.focus_range(&doc, caret, None).unwrap(), TextRange::in_paragraph(p, 5, 16));
        let end = Position::new(p, 21);
        assert_eq!(views.focus_range(&doc, end, None).unwrap(), TextRange::in_paragraph(p, 16, 21));
    }

    #[test]
    fn test_line_focus_uses_layout() {
        let doc = Document::from_plain_text("aaaa bbbb cccc");
        let p = doc.body()[0];
        let mut views = controller();
        views.set_config(ViewConfig {
            focus_scope: FocusScope::Line,
            ..ViewConfig::default()
        });
        views.switch_to(ViewMode::Focus);
        let mut engine = LayoutEngine::new(
            &doc,
            Arc::new(MonospaceMeasurer::default()),
            LayoutConfig::default(),
            LayoutParams::continuous(48.0),
        );
        engine.set_viewport(&doc, 0.0, 600.0);
        let range = views.focus_range(&doc, Position::new(p, 6), Some(&engine)).unwrap();
        assert_eq!(range, TextRange::in_paragraph(p, 5, 10));
    }

    #[test]
    fn test_switching_modes_never_touches_the_document() {
        let doc = Document::from_plain_text("Stable text");
        let before = doc.content();
        let generation = doc.generation();
        let mut views = controller();
        views.switch_to(ViewMode::Page);
        views.switch_to(ViewMode::Continuous);
        assert_eq!(doc.content(), before);
        assert_eq!(doc.generation(), generation);
    }
}
