//! Id-free value forms of document content.
//!
//! These types describe *what* a document contains without the arena ids that give nodes
//! their identity. They are what the markup codec produces, what clipboard fragments carry,
//! and what two documents are compared by.

use crate::format::{Alignment, Format};

/// One piece of paragraph content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Span {
    /// Formatted text.
    Text {
        /// The characters.
        text: String,
        /// Their attributes.
        format: Format,
    },
    /// An atomic inline object (counts as one character).
    Element {
        /// Element kind, e.g. `"image"` or `"footnote"`.
        kind: String,
        /// Opaque payload.
        payload: String,
    },
}

impl Span {
    /// Plain text span.
    pub fn text(text: impl Into<String>) -> Self {
        Span::Text {
            text: text.into(),
            format: Format::plain(),
        }
    }

    /// Formatted text span.
    pub fn styled(text: impl Into<String>, format: Format) -> Self {
        Span::Text {
            text: text.into(),
            format,
        }
    }

    /// Inline element span.
    pub fn element(kind: impl Into<String>, payload: impl Into<String>) -> Self {
        Span::Element {
            kind: kind.into(),
            payload: payload.into(),
        }
    }

    /// Length in character offsets.
    pub fn char_len(&self) -> usize {
        match self {
            Span::Text { text, .. } => text.chars().count(),
            Span::Element { .. } => 1,
        }
    }
}

/// A paragraph without ids.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParagraphContent {
    /// Horizontal alignment.
    pub alignment: Alignment,
    /// Content spans, normalised.
    pub spans: Vec<Span>,
}

impl ParagraphContent {
    /// An empty, left-aligned paragraph.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A paragraph with one plain run.
    pub fn plain(text: impl Into<String>) -> Self {
        Self::from_spans(vec![Span::text(text)])
    }

    /// A left-aligned paragraph from spans (normalised).
    pub fn from_spans(spans: Vec<Span>) -> Self {
        Self {
            alignment: Alignment::Left,
            spans,
        }
        .normalized()
    }

    /// Set the alignment.
    pub fn with_alignment(mut self, alignment: Alignment) -> Self {
        self.alignment = alignment;
        self
    }

    /// Length in character offsets.
    pub fn char_len(&self) -> usize {
        self.spans.iter().map(Span::char_len).sum()
    }

    /// The paragraph's text, with inline elements rendered as U+FFFC.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for span in &self.spans {
            match span {
                Span::Text { text, .. } => out.push_str(text),
                Span::Element { .. } => out.push(crate::OBJECT_REPLACEMENT),
            }
        }
        out
    }

    /// Drop empty text spans and merge neighbours with equal format.
    pub fn normalized(mut self) -> Self {
        let mut out: Vec<Span> = Vec::with_capacity(self.spans.len());
        for span in self.spans.drain(..) {
            match span {
                Span::Text { text, .. } if text.is_empty() => {}
                Span::Text { text, format } => match out.last_mut() {
                    Some(Span::Text {
                        text: prev,
                        format: prev_format,
                    }) if *prev_format == format => prev.push_str(&text),
                    _ => out.push(Span::Text { text, format }),
                },
                element => out.push(element),
            }
        }
        self.spans = out;
        self
    }
}

/// A table cell without ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellContent {
    /// Header cell (`<th>`).
    pub header: bool,
    /// Cell blocks; never empty.
    pub blocks: Vec<BlockContent>,
}

impl CellContent {
    /// A data cell holding one plain paragraph.
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            header: false,
            blocks: vec![BlockContent::Paragraph(ParagraphContent::plain(text))],
        }
    }

    /// A data cell holding one empty paragraph.
    pub fn empty() -> Self {
        Self {
            header: false,
            blocks: vec![BlockContent::Paragraph(ParagraphContent::empty())],
        }
    }
}

/// A table without ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableContent {
    /// Rows of cells.
    pub rows: Vec<Vec<CellContent>>,
}

impl TableContent {
    /// Nesting depth of this table (1 for a table without nested tables).
    pub fn depth(&self) -> usize {
        1 + self
            .rows
            .iter()
            .flatten()
            .flat_map(|cell| cell.blocks.iter())
            .map(BlockContent::table_depth)
            .max()
            .unwrap_or(0)
    }
}

/// A block without ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockContent {
    /// A paragraph.
    Paragraph(ParagraphContent),
    /// A table.
    Table(TableContent),
}

impl BlockContent {
    /// Nesting depth of tables in this block (0 for a paragraph).
    pub fn table_depth(&self) -> usize {
        match self {
            BlockContent::Paragraph(_) => 0,
            BlockContent::Table(table) => table.depth(),
        }
    }

    /// Plain text of this block; cells are separated by tabs, rows and paragraphs by newlines.
    pub fn plain_text(&self) -> String {
        match self {
            BlockContent::Paragraph(p) => p.text(),
            BlockContent::Table(t) => t
                .rows
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|cell| {
                            cell.blocks
                                .iter()
                                .map(BlockContent::plain_text)
                                .collect::<Vec<_>>()
                                .join(" ")
                        })
                        .collect::<Vec<_>>()
                        .join("\t")
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}
