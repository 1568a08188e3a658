//! Folio Core - headless rich-text engine for long-form manuscripts
//!
//! # Overview
//!
//! `folio-core` owns a structured document (paragraphs of formatted runs, inline elements and
//! nested tables), reads and writes it as a small tag-based markup, lays it out lazily for a
//! virtual-scrolling viewport, and edits it through undoable commands. Rendering is left to the
//! host: the engine produces positioned boxes and asks a [`TextMeasurer`] for glyph metrics.
//!
//! # Architecture Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  Editor Session (actions, panes, hints)     │  ← Public API
//! ├─────────────────────────────────────────────┤
//! │  Editing Controller  │  View Mode Controller│  ← Commands, undo, modes
//! ├─────────────────────────────────────────────┤
//! │  Layout Engine (virtual scroll, hit test)   │  ← Geometry
//! ├─────────────────────────────────────────────┤
//! │  Markup Codec        │  Text Snapshot       │  ← Persistence, analysis
//! ├─────────────────────────────────────────────┤
//! │  Document Model (tree, positions, changes)  │  ← Storage
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use folio_core::{Action, EditorConfig, EditorSession, MonospaceMeasurer, ViewMode};
//!
//! let mut session = EditorSession::open_markup(
//!     "<doc><p>Call me <b>Ishmael</b>.</p></doc>",
//!     Arc::new(MonospaceMeasurer::default()),
//!     EditorConfig::default(),
//! )
//! .unwrap();
//!
//! session.execute(Action::InsertText("So. ".to_string())).unwrap();
//! session.execute(Action::SwitchViewMode(ViewMode::Page)).unwrap();
//! assert_eq!(session.document().plain_text(), "So. Call me Ishmael.");
//!
//! session.execute(Action::Undo).unwrap();
//! assert_eq!(session.document().plain_text(), "Call me Ishmael.");
//! ```
//!
//! # Module Description
//!
//! - [`document`] - block tree, positions, mutation primitives and change notifications
//! - [`markup`] - tag-based markup parser and serializer
//! - [`layout`] - lazy layout with a height index for virtual scrolling
//! - [`editing`] - commands, undo/redo with typing coalescing, clipboard
//! - [`view_mode`] - continuous, page, typewriter, focus, distraction-free and split modes
//! - [`search`] - find and replace
//! - [`session`] - the action surface an application shell drives
//! - [`snapshot`] - immutable text for background analysis

pub mod config;
pub mod content;
pub mod document;
pub mod editing;
pub mod error;
pub mod format;
pub mod layout;
pub mod markup;
pub mod position;
pub mod search;
pub mod session;
pub mod snapshot;
pub mod view_mode;

/// Placeholder character an inline element contributes to plain text.
pub const OBJECT_REPLACEMENT: char = '\u{FFFC}';

pub use config::{EditorConfig, LayoutConfig, UndoConfig, ViewConfig};
pub use content::{BlockContent, CellContent, ParagraphContent, Span, TableContent};
pub use document::{
    AffectedBlocks, ChangeKind, Document, DocumentChange, MAX_TABLE_DEPTH, Node, NodeId,
};
pub use editing::{
    AnchorId, CaretMove, ClipboardFlavor, ClipboardPayload, Clock, Command, EditingController,
    ManualClock, PasteSource, SystemClock,
};
pub use error::{ConfigError, DocumentError, EditError, MeasureError, ParseError, SearchError};
pub use format::{Alignment, Color, Format, FormatDelta};
pub use layout::metrics::{FallbackMetrics, TextMeasurer};
pub use layout::{
    LayoutBox, LayoutEngine, LayoutParams, MonospaceMeasurer, PageGeometry, Point, Rect,
    RunMetrics, Viewport,
};
pub use position::{PositionMapping, Position, Selection, TextRange};
pub use search::SearchOptions;
pub use session::{Action, ActionOutcome, EditorSession, HintId, QuestionableRange};
pub use snapshot::TextSnapshot;
pub use view_mode::{FocusHint, FocusScope, RenderHints, ViewMode, ViewModeController};
