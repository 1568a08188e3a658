//! Greedy line breaking of one paragraph.
//!
//! Text runs are cut at UAX #29 word boundaries. Words are placed left to right while they
//! fit; whitespace always stays on the line it follows (it hangs past the right edge and is
//! ignored for alignment). A word wider than the whole line is broken at grapheme boundaries.

use unicode_segmentation::UnicodeSegmentation;

use crate::document::{Inline, NodeId, Paragraph};
use crate::format::{Alignment, Format};

use super::metrics::{Metrics, RunMetrics};

const EPSILON: f32 = 0.001;

/// What a fragment draws.
#[derive(Debug, Clone, PartialEq)]
pub enum FragmentKind {
    /// A piece of a text run.
    Text {
        /// The characters.
        text: String,
        /// Their format.
        format: Format,
        /// Whitespace only.
        whitespace: bool,
        /// Measured width before justification.
        natural_width: f32,
    },
    /// An inline element.
    Element {
        /// Element kind.
        kind: String,
    },
}

/// A positioned piece of a line. `x` is relative to the paragraph's left edge.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    /// The inline node this fragment comes from.
    pub inline: NodeId,
    /// First paragraph offset covered.
    pub start: usize,
    /// One past the last paragraph offset covered.
    pub end: usize,
    /// Left edge.
    pub x: f32,
    /// Drawn width.
    pub width: f32,
    /// Content.
    pub kind: FragmentKind,
}

/// One line of a laid-out paragraph. `y` is relative to the paragraph's top.
#[derive(Debug, Clone, PartialEq)]
pub struct LineBox {
    /// Top edge.
    pub y: f32,
    /// Line height including line spacing.
    pub height: f32,
    /// Baseline, relative to the paragraph top.
    pub baseline: f32,
    /// Left edge of the content after alignment.
    pub x: f32,
    /// Width of the content without hanging whitespace.
    pub content_width: f32,
    /// First paragraph offset on the line.
    pub start: usize,
    /// One past the last paragraph offset on the line.
    pub end: usize,
    /// Fragments in visual order.
    pub fragments: Vec<Fragment>,
}

/// The lines of one paragraph.
#[derive(Debug, Clone, PartialEq)]
pub struct ParagraphLayout {
    /// Lines, top to bottom. Never empty.
    pub lines: Vec<LineBox>,
    /// Available width the paragraph was broken for.
    pub width: f32,
    /// Total height.
    pub height: f32,
}

#[derive(Debug, Clone)]
struct Piece {
    inline: NodeId,
    start: usize,
    len: usize,
    text: String,
    format: Option<Format>,
    element: Option<String>,
    whitespace: bool,
    metrics: RunMetrics,
}

fn pieces(paragraph: &Paragraph, metrics: &mut Metrics<'_>) -> Vec<Piece> {
    let mut out = Vec::new();
    let mut offset = 0;
    for inline in &paragraph.inlines {
        match inline {
            Inline::Run(run) => {
                for word in run.text.split_word_bounds() {
                    let len = word.chars().count();
                    out.push(Piece {
                        inline: run.id,
                        start: offset,
                        len,
                        text: word.to_string(),
                        format: Some(run.format.clone()),
                        element: None,
                        whitespace: word.chars().all(char::is_whitespace),
                        metrics: metrics.text(word, &run.format),
                    });
                    offset += len;
                }
            }
            Inline::Element(element) => {
                out.push(Piece {
                    inline: element.id,
                    start: offset,
                    len: 1,
                    text: crate::OBJECT_REPLACEMENT.to_string(),
                    format: None,
                    element: Some(element.kind.clone()),
                    whitespace: false,
                    metrics: metrics.element(&element.kind, &element.payload),
                });
                offset += 1;
            }
        }
    }
    out
}

/// Break `paragraph` into lines no wider than `width`.
pub(crate) fn layout_paragraph(
    paragraph: &Paragraph,
    width: f32,
    line_spacing: f32,
    metrics: &mut Metrics<'_>,
) -> ParagraphLayout {
    let mut lines: Vec<Vec<Piece>> = Vec::new();
    let mut current: Vec<Piece> = Vec::new();
    let mut x = 0.0;
    let mut has_content = false;

    for piece in pieces(paragraph, metrics) {
        let w = piece.metrics.width;
        if piece.whitespace {
            x += w;
            current.push(piece);
            continue;
        }
        if x + w <= width + EPSILON {
            x += w;
            has_content = true;
            current.push(piece);
            continue;
        }
        if has_content {
            lines.push(std::mem::take(&mut current));
            x = 0.0;
            has_content = false;
            if w <= width + EPSILON {
                x = w;
                has_content = true;
                current.push(piece);
                continue;
            }
        }
        if w <= width + EPSILON || piece.element.is_some() {
            x += w;
            has_content = true;
            current.push(piece);
            continue;
        }
        // Wider than a whole line: break at grapheme boundaries.
        let Some(format) = piece.format.clone() else {
            continue;
        };
        let mut chunk = String::new();
        let mut chunk_start = piece.start;
        let mut chunk_metrics = RunMetrics::default();
        for grapheme in piece.text.graphemes(true) {
            let gm = metrics.text(grapheme, &format);
            if x + chunk_metrics.width + gm.width > width + EPSILON && (!chunk.is_empty() || !current.is_empty()) {
                if !chunk.is_empty() {
                    let len = chunk.chars().count();
                    current.push(Piece {
                        start: chunk_start,
                        len,
                        text: std::mem::take(&mut chunk),
                        metrics: chunk_metrics,
                        ..piece.clone()
                    });
                    chunk_start += len;
                }
                lines.push(std::mem::take(&mut current));
                x = 0.0;
                chunk_metrics = RunMetrics::default();
            }
            chunk.push_str(grapheme);
            chunk_metrics.width += gm.width;
            chunk_metrics.ascent = chunk_metrics.ascent.max(gm.ascent);
            chunk_metrics.descent = chunk_metrics.descent.max(gm.descent);
        }
        if !chunk.is_empty() {
            let len = chunk.chars().count();
            x += chunk_metrics.width;
            has_content = true;
            current.push(Piece {
                start: chunk_start,
                len,
                text: chunk,
                metrics: chunk_metrics,
                ..piece
            });
        }
    }
    lines.push(current);

    let empty_metrics = metrics.text(" ", &paragraph.format_at(0));
    let count = lines.len();
    let mut boxes = Vec::with_capacity(count);
    let mut y = 0.0;
    let mut line_start = 0;
    for (i, pieces) in lines.into_iter().enumerate() {
        let line = build_line(
            pieces,
            LineContext {
                y,
                width,
                line_spacing,
                alignment: paragraph.alignment,
                last: i + 1 == count,
                start: line_start,
                empty: empty_metrics,
            },
        );
        y += line.height;
        line_start = line.end;
        boxes.push(line);
    }
    ParagraphLayout {
        lines: boxes,
        width,
        height: y,
    }
}

struct LineContext {
    y: f32,
    width: f32,
    line_spacing: f32,
    alignment: Alignment,
    last: bool,
    start: usize,
    empty: RunMetrics,
}

fn build_line(pieces: Vec<Piece>, ctx: LineContext) -> LineBox {
    let (ascent, descent) = if pieces.is_empty() {
        (ctx.empty.ascent, ctx.empty.descent)
    } else {
        pieces.iter().fold((0.0f32, 0.0f32), |(a, d), p| {
            (a.max(p.metrics.ascent), d.max(p.metrics.descent))
        })
    };
    let natural = ascent + descent;
    let height = natural * ctx.line_spacing.max(0.1);
    let trailing = pieces.iter().rev().take_while(|p| p.whitespace).count();
    let content = pieces.len() - trailing;
    let content_width: f32 = pieces[..content].iter().map(|p| p.metrics.width).sum();
    let slack = (ctx.width - content_width).max(0.0);
    let interior_spaces = pieces[..content].iter().filter(|p| p.whitespace).count();
    let (offset, extra) = match ctx.alignment {
        Alignment::Left => (0.0, 0.0),
        Alignment::Center => (slack / 2.0, 0.0),
        Alignment::Right => (slack, 0.0),
        Alignment::Justify if !ctx.last && interior_spaces > 0 => (0.0, slack / interior_spaces as f32),
        Alignment::Justify => (0.0, 0.0),
    };

    let start = pieces.first().map_or(ctx.start, |p| p.start);
    let end = pieces.last().map_or(ctx.start, |p| p.start + p.len);
    let mut x = offset;
    let fragments = pieces
        .into_iter()
        .enumerate()
        .map(|(i, piece)| {
            let grow = if piece.whitespace && i < content { extra } else { 0.0 };
            let width = piece.metrics.width + grow;
            let kind = match piece.element {
                Some(kind) => FragmentKind::Element { kind },
                None => FragmentKind::Text {
                    text: piece.text,
                    format: piece.format.unwrap_or_default(),
                    whitespace: piece.whitespace,
                    natural_width: piece.metrics.width,
                },
            };
            let fragment = Fragment {
                inline: piece.inline,
                start: piece.start,
                end: piece.start + piece.len,
                x,
                width,
                kind,
            };
            x += width;
            fragment
        })
        .collect();
    LineBox {
        y: ctx.y,
        height,
        baseline: ctx.y + (height - natural) / 2.0 + ascent,
        x: offset,
        content_width: content_width + extra * interior_spaces as f32,
        start,
        end,
        fragments,
    }
}

impl ParagraphLayout {
    /// Index of the line showing the caret at `offset`. A wrap offset belongs to the line
    /// it starts.
    pub fn line_for_offset(&self, offset: usize) -> usize {
        let last = self.lines.len().saturating_sub(1);
        self.lines
            .iter()
            .position(|line| offset < line.end)
            .unwrap_or(last)
            .min(last)
    }

    /// Index of the line at vertical offset `y` (clamped).
    pub fn line_at_y(&self, y: f32) -> usize {
        let last = self.lines.len().saturating_sub(1);
        self.lines
            .iter()
            .position(|line| y < line.y + line.height)
            .unwrap_or(last)
    }

    /// Caret stops of a line: `(offset, x)` at every grapheme boundary, in order.
    pub(crate) fn caret_stops(&self, line: usize, metrics: &mut Metrics<'_>) -> Vec<(usize, f32)> {
        let Some(line) = self.lines.get(line) else {
            return Vec::new();
        };
        let mut stops = vec![(line.start, line.x)];
        for fragment in &line.fragments {
            match &fragment.kind {
                FragmentKind::Element { .. } => {}
                FragmentKind::Text {
                    text,
                    format,
                    natural_width,
                    ..
                } => {
                    let scale = if *natural_width > 0.0 {
                        fragment.width / natural_width
                    } else {
                        1.0
                    };
                    let mut chars = 0;
                    let mut boundaries = text.graphemes(true).peekable();
                    while let Some(grapheme) = boundaries.next() {
                        chars += grapheme.chars().count();
                        if boundaries.peek().is_none() {
                            break;
                        }
                        let prefix: String = text.chars().take(chars).collect();
                        let w = metrics.text(&prefix, format).width;
                        stops.push((fragment.start + chars, fragment.x + w * scale));
                    }
                }
            }
            stops.push((fragment.end, fragment.x + fragment.width));
        }
        stops
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ParagraphContent;
    use crate::document::Document;
    use crate::layout::metrics::{FallbackMetrics, MonospaceMeasurer};

    fn paragraph(text: &str) -> Paragraph {
        let doc = Document::from_blocks(&[crate::content::BlockContent::Paragraph(
            ParagraphContent::plain(text),
        )])
        .unwrap();
        doc.paragraph(doc.body()[0]).unwrap().clone()
    }

    fn layout(p: &Paragraph, width: f32) -> ParagraphLayout {
        let measurer = MonospaceMeasurer::default();
        let mut metrics = Metrics::new(&measurer, FallbackMetrics::default());
        layout_paragraph(p, width, 1.0, &mut metrics)
    }

    fn line_texts(layout: &ParagraphLayout) -> Vec<String> {
        layout
            .lines
            .iter()
            .map(|line| {
                line.fragments
                    .iter()
                    .map(|f| match &f.kind {
                        FragmentKind::Text { text, .. } => text.clone(),
                        FragmentKind::Element { .. } => "\u{FFFC}".into(),
                    })
                    .collect()
            })
            .collect()
    }

    #[test]
    fn test_greedy_breaks_with_hanging_space() {
        // 8px per char, 10 chars per line.
        let l = layout(&paragraph("hello big world"), 80.0);
        assert_eq!(line_texts(&l), vec!["hello big ", "world"]);
        assert_eq!(l.lines[0].content_width, 72.0);
        assert_eq!(l.lines[1].start, 10);
        assert_eq!(l.height, 32.0);
    }

    #[test]
    fn test_long_word_breaks_at_graphemes() {
        let l = layout(&paragraph("abcdefghijkl"), 40.0);
        assert_eq!(line_texts(&l), vec!["abcde", "fghij", "kl"]);
    }

    #[test]
    fn test_empty_paragraph_has_one_line() {
        let l = layout(&Paragraph::default(), 100.0);
        assert_eq!(l.lines.len(), 1);
        assert_eq!((l.lines[0].start, l.lines[0].end), (0, 0));
        assert_eq!(l.height, 16.0);
    }

    #[test]
    fn test_alignment_offsets() {
        let mut p = paragraph("ab cd");
        p.alignment = Alignment::Right;
        assert_eq!(layout(&p, 100.0).lines[0].x, 60.0);
        p.alignment = Alignment::Center;
        assert_eq!(layout(&p, 100.0).lines[0].x, 30.0);
    }

    #[test]
    fn test_justify_stretches_all_but_last_line() {
        let mut p = paragraph("aa bb cc dd");
        p.alignment = Alignment::Justify;
        let l = layout(&p, 72.0);
        assert_eq!(line_texts(&l), vec!["aa bb cc ", "dd"]);
        assert_eq!(l.lines[0].content_width, 72.0);
        assert_eq!(l.lines[1].content_width, 16.0);
    }

    #[test]
    fn test_wrap_offset_belongs_to_next_line() {
        let l = layout(&paragraph("hello big world"), 80.0);
        assert_eq!(l.line_for_offset(9), 0);
        assert_eq!(l.line_for_offset(10), 1);
        assert_eq!(l.line_for_offset(15), 1);
    }
}
