//! Clipboard payloads: export in three flavours, import with graceful degradation.
//!
//! The richest flavour wins on paste: markup, then the HTML subset, then plain text. A flavour
//! that fails to parse is logged and skipped, so a damaged payload still pastes as text.

use std::sync::LazyLock;

use regex::Regex;

use crate::content::{BlockContent, CellContent, ParagraphContent, Span, TableContent};
use crate::document::{Document, MAX_TABLE_DEPTH};
use crate::error::{DocumentError, ParseError};
use crate::format::{Alignment, Color, Format};
use crate::markup::{parse_fragment, serialize_fragment};
use crate::position::TextRange;

/// What the editor puts on the clipboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipboardPayload {
    /// Native markup fragment.
    pub markup: String,
    /// HTML subset for other applications.
    pub rich_text: String,
    /// Plain text; paragraphs separated by `\n`.
    pub plain_text: String,
}

/// What the host found on the clipboard.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PasteSource {
    /// Native markup, if present.
    pub markup: Option<String>,
    /// HTML, if present.
    pub rich_text: Option<String>,
    /// Plain text, if present.
    pub plain_text: Option<String>,
}

impl PasteSource {
    /// Plain text only.
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            plain_text: Some(text.into()),
            ..Self::default()
        }
    }
}

impl From<ClipboardPayload> for PasteSource {
    fn from(payload: ClipboardPayload) -> Self {
        Self {
            markup: Some(payload.markup),
            rich_text: Some(payload.rich_text),
            plain_text: Some(payload.plain_text),
        }
    }
}

/// The flavour an import was taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipboardFlavor {
    /// Native markup.
    Markup,
    /// HTML subset.
    RichText,
    /// Plain text.
    PlainText,
}

/// Export `range` in all flavours.
pub fn export(doc: &Document, range: TextRange) -> Result<ClipboardPayload, DocumentError> {
    let blocks = doc.fragment(range)?;
    Ok(ClipboardPayload {
        markup: serialize_fragment(&blocks),
        rich_text: to_html(&blocks),
        plain_text: plain_text_of(&blocks),
    })
}

/// Blocks to paste, from the richest flavour that parses. Empty if nothing usable was found.
pub fn import(source: &PasteSource) -> Vec<BlockContent> {
    import_with_flavor(source).map_or_else(Vec::new, |(_, blocks)| blocks)
}

/// Like [`import`], also reporting which flavour was used.
pub fn import_with_flavor(source: &PasteSource) -> Option<(ClipboardFlavor, Vec<BlockContent>)> {
    if let Some(markup) = source.markup.as_deref().filter(|s| !s.trim().is_empty()) {
        match parse_fragment(markup) {
            Ok(blocks) if !blocks.is_empty() => return Some((ClipboardFlavor::Markup, blocks)),
            Ok(_) => {}
            Err(err) => log::warn!("clipboard markup rejected ({err}); trying rich text"),
        }
    }
    if let Some(html) = source.rich_text.as_deref().filter(|s| !s.trim().is_empty()) {
        match from_html(html) {
            Ok(blocks) if !blocks.is_empty() => return Some((ClipboardFlavor::RichText, blocks)),
            Ok(_) => {}
            Err(err) => log::warn!("clipboard rich text rejected ({err}); falling back to plain text"),
        }
    }
    let text = source.plain_text.as_deref().filter(|s| !s.is_empty())?;
    Some((ClipboardFlavor::PlainText, plain_blocks(text)))
}

/// Plain-text stand-in for a structured fragment the document would not take: the source's
/// plain text if it has one, else the fragment's own text.
pub fn plain_fallback(source: &PasteSource, blocks: &[BlockContent]) -> Vec<BlockContent> {
    match source.plain_text.as_deref().filter(|s| !s.is_empty()) {
        Some(text) => plain_blocks(text),
        None => plain_blocks(&plain_text_of(blocks)),
    }
}

fn plain_text_of(blocks: &[BlockContent]) -> String {
    blocks
        .iter()
        .map(BlockContent::plain_text)
        .collect::<Vec<_>>()
        .join("\n")
        .replace(crate::OBJECT_REPLACEMENT, "")
}

fn plain_blocks(text: &str) -> Vec<BlockContent> {
    text.replace("\r\n", "\n")
        .split(['\n', '\r'])
        .map(|line| BlockContent::Paragraph(ParagraphContent::plain(line)))
        .collect()
}

// ----- HTML export -----

fn to_html(blocks: &[BlockContent]) -> String {
    let mut out = String::new();
    for block in blocks {
        html_block(block, &mut out);
    }
    out
}

fn html_block(block: &BlockContent, out: &mut String) {
    match block {
        BlockContent::Paragraph(p) => {
            match p.alignment {
                Alignment::Left => out.push_str("<p>"),
                other => {
                    out.push_str("<p style=\"text-align:");
                    out.push_str(other.markup_value().unwrap_or("left"));
                    out.push_str("\">");
                }
            }
            for span in &p.spans {
                html_span(span, out);
            }
            out.push_str("</p>");
        }
        BlockContent::Table(t) => {
            out.push_str("<table>");
            for row in &t.rows {
                out.push_str("<tr>");
                for cell in row {
                    let tag = if cell.header { "th" } else { "td" };
                    out.push_str(&format!("<{tag}>"));
                    for block in &cell.blocks {
                        html_block(block, out);
                    }
                    out.push_str(&format!("</{tag}>"));
                }
                out.push_str("</tr>");
            }
            out.push_str("</table>");
        }
    }
}

fn html_span(span: &Span, out: &mut String) {
    match span {
        Span::Element { kind, payload } => {
            out.push_str("<span data-kind=\"");
            html_escape(kind, out);
            out.push_str("\" data-payload=\"");
            html_escape(payload, out);
            out.push_str("\"></span>");
        }
        Span::Text { text, format } => {
            let mut closing = Vec::new();
            for (on, tag) in [
                (format.bold, "b"),
                (format.italic, "i"),
                (format.underline, "u"),
                (format.strike, "s"),
            ] {
                if on {
                    out.push_str(&format!("<{tag}>"));
                    closing.push(tag);
                }
            }
            if format.has_font_override() {
                let mut style = Vec::new();
                if let Some(family) = &format.family {
                    style.push(format!("font-family:'{}'", family.replace('\'', "")));
                }
                if let Some(size) = format.size {
                    style.push(format!("font-size:{size}pt"));
                }
                if let Some(color) = format.color {
                    style.push(format!("color:{}", color.to_hex()));
                }
                out.push_str("<span style=\"");
                html_escape(&style.join(";"), out);
                out.push_str("\">");
                closing.push("span");
            }
            html_escape(text, out);
            for tag in closing.iter().rev() {
                out.push_str(&format!("</{tag}>"));
            }
        }
    }
}

fn html_escape(text: &str, out: &mut String) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            ch => out.push(ch),
        }
    }
}

// ----- HTML import -----

static TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<!--.*?-->|<![^>]*>|<(/?)([A-Za-z][A-Za-z0-9]*)((?:[^>"']|"[^"]*"|'[^']*')*)>|[^<]+"#)
        .expect("valid html token regex")
});
static ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([A-Za-z_:][-A-Za-z0-9_:.]*)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+)))?"#)
        .expect("valid html attribute regex")
});

fn location(input: &str, byte: usize) -> (usize, usize) {
    let before = &input[..byte];
    let line = before.matches('\n').count() + 1;
    let col = before.rsplit('\n').next().map_or(0, |l| l.chars().count()) + 1;
    (line, col)
}

/// Parse the supported HTML subset. Unknown tags are skipped but their text is kept.
pub fn from_html(input: &str) -> Result<Vec<BlockContent>, ParseError> {
    let (token, attr) = (&*TOKEN, &*ATTR);
    let mut builder = HtmlBuilder::default();
    let mut cursor = 0;
    for caps in token.captures_iter(input) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        if whole.start() != cursor {
            let (line, col) = location(input, cursor);
            return Err(ParseError::new(line, col, "unterminated tag"));
        }
        cursor = whole.end();
        let raw = whole.as_str();
        let Some(name) = caps.get(2) else {
            if !raw.starts_with('<') {
                builder.text(&decode_entities(raw));
            }
            continue;
        };
        let name = name.as_str().to_ascii_lowercase();
        let closing = caps.get(1).is_some();
        let attrs: Vec<(String, String)> = caps
            .get(3)
            .map(|m| {
                attr.captures_iter(m.as_str())
                    .filter_map(|a| {
                        let key = a.get(1)?.as_str().to_ascii_lowercase();
                        let value = a.get(2).or(a.get(3)).or(a.get(4)).map_or("", |v| v.as_str());
                        Some((key, decode_entities(value)))
                    })
                    .collect()
            })
            .unwrap_or_default();
        let result = if closing {
            builder.close(&name);
            Ok(())
        } else {
            builder.open(&name, &attrs)
        };
        if let Err(reason) = result {
            let (line, col) = location(input, whole.start());
            return Err(ParseError::new(line, col, reason));
        }
    }
    if cursor != input.len() {
        let (line, col) = location(input, cursor);
        return Err(ParseError::new(line, col, "unterminated tag"));
    }
    Ok(builder.finish())
}

fn decode_entities(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let decoded = tail.find(';').filter(|end| *end <= 10).and_then(|end| {
            let name = &tail[1..end];
            let ch = match name {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some(' '),
                _ => name
                    .strip_prefix("#x")
                    .or_else(|| name.strip_prefix("#X"))
                    .map(|hex| u32::from_str_radix(hex, 16))
                    .or_else(|| name.strip_prefix('#').map(str::parse::<u32>))
                    .and_then(Result::ok)
                    .and_then(char::from_u32),
            };
            ch.map(|ch| (ch, end))
        });
        match decoded {
            Some((ch, end)) => {
                out.push(ch);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    for ch in text.chars() {
        if ch.is_ascii_whitespace() {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.push(ch);
            in_space = false;
        }
    }
    out
}

fn style_value<'a>(attrs: &'a [(String, String)], property: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(k, _)| k == "style")
        .and_then(|(_, style)| {
            style.split(';').find_map(|decl| {
                let (key, value) = decl.split_once(':')?;
                (key.trim().eq_ignore_ascii_case(property)).then(|| value.trim())
            })
        })
}

fn attr_value<'a>(attrs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    attrs.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
}

fn parse_font_size(value: &str) -> Option<u16> {
    let value = value.trim();
    let (number, scale) = if let Some(pt) = value.strip_suffix("pt") {
        (pt, 1.0)
    } else if let Some(px) = value.strip_suffix("px") {
        (px, 0.75)
    } else {
        (value, 1.0)
    };
    let size = number.trim().parse::<f32>().ok()? * scale;
    (size.is_finite() && size > 0.0 && size < f32::from(u16::MAX)).then(|| size.round() as u16)
}

enum Frame {
    Root(Vec<BlockContent>),
    Table {
        rows: Vec<Vec<CellContent>>,
        row: Option<Vec<CellContent>>,
    },
    Cell {
        header: bool,
        blocks: Vec<BlockContent>,
    },
}

struct OpenParagraph {
    alignment: Alignment,
    spans: Vec<Span>,
}

struct HtmlBuilder {
    frames: Vec<Frame>,
    paragraph: Option<OpenParagraph>,
    marks: Vec<(String, Format)>,
    skip: Option<String>,
}

impl Default for HtmlBuilder {
    fn default() -> Self {
        Self {
            frames: vec![Frame::Root(Vec::new())],
            paragraph: None,
            marks: Vec::new(),
            skip: None,
        }
    }
}

impl HtmlBuilder {
    fn format(&self) -> Format {
        self.marks.last().map(|(_, f)| f.clone()).unwrap_or_default()
    }

    fn table_depth(&self) -> usize {
        self.frames.iter().filter(|f| matches!(f, Frame::Table { .. })).count()
    }

    fn in_table_structure(&self) -> bool {
        matches!(self.frames.last(), Some(Frame::Table { .. }))
    }

    fn push_block(&mut self, block: BlockContent) {
        match self.frames.last_mut() {
            Some(Frame::Root(blocks)) | Some(Frame::Cell { blocks, .. }) => blocks.push(block),
            _ => log::debug!("dropping content placed directly inside a table"),
        }
    }

    fn end_paragraph(&mut self) {
        if let Some(p) = self.paragraph.take() {
            let content = ParagraphContent::from_spans(p.spans).with_alignment(p.alignment);
            self.push_block(BlockContent::Paragraph(content));
        }
    }

    fn start_paragraph(&mut self, alignment: Alignment) {
        self.end_paragraph();
        self.paragraph = Some(OpenParagraph {
            alignment,
            spans: Vec::new(),
        });
    }

    fn text(&mut self, raw: &str) {
        if self.skip.is_some() || self.in_table_structure() {
            return;
        }
        let text = collapse_whitespace(raw);
        if self.paragraph.is_none() {
            if text.trim().is_empty() {
                return;
            }
            self.start_paragraph(Alignment::Left);
        }
        let format = self.format();
        if let Some(p) = self.paragraph.as_mut() {
            if p.spans.is_empty() {
                p.spans.push(Span::styled(text.trim_start(), format));
            } else {
                p.spans.push(Span::styled(text, format));
            }
        }
    }

    fn push_mark(&mut self, name: &str, apply: impl FnOnce(&mut Format)) {
        let mut format = self.format();
        apply(&mut format);
        self.marks.push((name.to_string(), format));
    }

    fn alignment_of(attrs: &[(String, String)]) -> Alignment {
        style_value(attrs, "text-align")
            .or_else(|| attr_value(attrs, "align"))
            .and_then(|v| Alignment::from_markup_value(&v.to_ascii_lowercase()))
            .unwrap_or_default()
    }

    fn open(&mut self, name: &str, attrs: &[(String, String)]) -> Result<(), String> {
        if self.skip.is_some() {
            return Ok(());
        }
        match name {
            "head" | "style" | "script" | "title" => self.skip = Some(name.to_string()),
            "p" | "div" | "li" | "blockquote" | "pre" => self.start_paragraph(Self::alignment_of(attrs)),
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                self.start_paragraph(Self::alignment_of(attrs));
                self.push_mark(name, |f| f.bold = true);
            }
            "br" => {
                let alignment = self.paragraph.as_ref().map_or(Alignment::Left, |p| p.alignment);
                self.start_paragraph(alignment);
            }
            "b" | "strong" => self.push_mark(name, |f| f.bold = true),
            "i" | "em" => self.push_mark(name, |f| f.italic = true),
            "u" | "ins" => self.push_mark(name, |f| f.underline = true),
            "s" | "strike" | "del" => self.push_mark(name, |f| f.strike = true),
            "span" | "font" => {
                if let Some(kind) = attr_value(attrs, "data-kind").filter(|k| !k.is_empty()) {
                    if self.paragraph.is_none() {
                        self.start_paragraph(Alignment::Left);
                    }
                    let payload = attr_value(attrs, "data-payload").unwrap_or_default();
                    if let Some(p) = self.paragraph.as_mut() {
                        p.spans.push(Span::element(kind, payload));
                    }
                    // The element's own text content is not part of the document.
                    self.skip = Some(name.to_string());
                    return Ok(());
                }
                let family = style_value(attrs, "font-family")
                    .or_else(|| attr_value(attrs, "face"))
                    .and_then(|f| f.split(',').next())
                    .map(|f| f.trim().trim_matches(['\'', '"']).to_string())
                    .filter(|f| !f.is_empty());
                let size = style_value(attrs, "font-size").and_then(parse_font_size);
                let color = style_value(attrs, "color")
                    .or_else(|| attr_value(attrs, "color"))
                    .and_then(|c| Color::from_hex(c.trim()));
                let weight = style_value(attrs, "font-weight");
                let bold = weight.is_some_and(|w| w == "bold" || w.parse::<u16>().is_ok_and(|n| n >= 600));
                let italic = style_value(attrs, "font-style").is_some_and(|s| s == "italic");
                let decoration = style_value(attrs, "text-decoration").unwrap_or_default();
                self.push_mark(name, |f| {
                    if family.is_some() {
                        f.family = family;
                    }
                    if size.is_some() {
                        f.size = size;
                    }
                    if color.is_some() {
                        f.color = color;
                    }
                    f.bold |= bold;
                    f.italic |= italic;
                    f.underline |= decoration.contains("underline");
                    f.strike |= decoration.contains("line-through");
                });
            }
            "img" => {
                if self.paragraph.is_none() {
                    self.start_paragraph(Alignment::Left);
                }
                let src = attr_value(attrs, "src").unwrap_or_default();
                if let Some(p) = self.paragraph.as_mut() {
                    p.spans.push(Span::element("image", src));
                }
            }
            "table" => {
                self.end_paragraph();
                let depth = self.table_depth() + 1;
                if depth > MAX_TABLE_DEPTH {
                    return Err(format!("tables nested deeper than {MAX_TABLE_DEPTH}"));
                }
                self.frames.push(Frame::Table {
                    rows: Vec::new(),
                    row: None,
                });
            }
            "tr" => {
                self.end_cell();
                if let Some(Frame::Table { rows, row }) = self.frames.last_mut() {
                    if let Some(done) = row.take().filter(|r| !r.is_empty()) {
                        rows.push(done);
                    }
                    *row = Some(Vec::new());
                }
            }
            "td" | "th" => {
                self.end_cell();
                if self.in_table_structure() {
                    self.frames.push(Frame::Cell {
                        header: name == "th",
                        blocks: Vec::new(),
                    });
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn close(&mut self, name: &str) {
        if let Some(skipped) = &self.skip {
            if skipped == name {
                self.skip = None;
            }
            return;
        }
        match name {
            "p" | "div" | "li" | "blockquote" | "pre" => self.end_paragraph(),
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                self.pop_mark(name);
                self.end_paragraph();
            }
            "b" | "strong" | "i" | "em" | "u" | "ins" | "s" | "strike" | "del" | "span" | "font" => {
                self.pop_mark(name)
            }
            "td" | "th" => self.end_cell(),
            "tr" => {
                self.end_cell();
                if let Some(Frame::Table { rows, row }) = self.frames.last_mut()
                    && let Some(done) = row.take().filter(|r| !r.is_empty())
                {
                    rows.push(done);
                }
            }
            "table" => self.end_table(),
            _ => {}
        }
    }

    fn pop_mark(&mut self, name: &str) {
        if let Some(i) = self.marks.iter().rposition(|(n, _)| n == name) {
            self.marks.truncate(i);
        }
    }

    fn end_cell(&mut self) {
        self.end_paragraph();
        if !matches!(self.frames.last(), Some(Frame::Cell { .. })) {
            return;
        }
        let Some(Frame::Cell { header, blocks }) = self.frames.pop() else {
            return;
        };
        let cell = if blocks.is_empty() {
            CellContent {
                header,
                ..CellContent::empty()
            }
        } else {
            CellContent { header, blocks }
        };
        if let Some(Frame::Table { row, .. }) = self.frames.last_mut() {
            row.get_or_insert_with(Vec::new).push(cell);
        }
    }

    fn end_table(&mut self) {
        self.end_cell();
        if !self.in_table_structure() {
            return;
        }
        let Some(Frame::Table { mut rows, row }) = self.frames.pop() else {
            return;
        };
        if let Some(done) = row.filter(|r| !r.is_empty()) {
            rows.push(done);
        }
        if !rows.is_empty() {
            self.push_block(BlockContent::Table(TableContent { rows }));
        }
    }

    fn finish(mut self) -> Vec<BlockContent> {
        self.end_paragraph();
        while self.frames.len() > 1 {
            match self.frames.last() {
                Some(Frame::Cell { .. }) => self.end_cell(),
                Some(Frame::Table { .. }) => self.end_table(),
                _ => break,
            }
        }
        match self.frames.pop() {
            Some(Frame::Root(blocks)) => blocks,
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::FormatDelta;
    use crate::markup::parse;
    use crate::position::Position;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_export_flavours() {
        let doc = parse("<p>one <b>two</b></p><p align=\"center\">three</p>").unwrap();
        let a = doc.body()[0];
        let b = doc.body()[1];
        let payload = export(&doc, TextRange::new(Position::new(a, 4), Position::new(b, 3))).unwrap();
        assert_eq!(payload.markup, "<p><b>two</b></p>\n<p align=\"center\">thr</p>");
        assert_eq!(payload.rich_text, "<p><b>two</b></p><p style=\"text-align:center\">thr</p>");
        assert_eq!(payload.plain_text, "two\nthr");
    }

    #[test]
    fn test_html_round_trip_keeps_formatting() {
        let doc = parse(
            "<p><i>a</i><font family=\"Serif\" size=\"14\" color=\"#ff0000\">b</font><obj kind=\"note\">n</obj></p>\
             <table><tr><th><p>h</p></th><td><p>d</p></td></tr></table>",
        )
        .unwrap();
        let html = to_html(&doc.content());
        assert_eq!(from_html(&html).unwrap(), doc.content());
    }

    #[test]
    fn test_html_subset_import() {
        let blocks = from_html(
            "<html><head><style>p { color: red }</style></head><body>\n\
             <h1>Title</h1><p style=\"text-align: right\">x &amp; <strong>y</strong><br>z</p>\
             <span style=\"font-weight:700\">bold</span></body></html>",
        )
        .unwrap();
        let bold = Format::plain().with_applied(&FormatDelta::bold());
        assert_eq!(
            blocks,
            vec![
                BlockContent::Paragraph(ParagraphContent::from_spans(vec![Span::styled("Title", bold.clone())])),
                BlockContent::Paragraph(
                    ParagraphContent::from_spans(vec![Span::text("x & "), Span::styled("y", bold.clone())])
                        .with_alignment(Alignment::Right)
                ),
                BlockContent::Paragraph(ParagraphContent::plain("z").with_alignment(Alignment::Right)),
                BlockContent::Paragraph(ParagraphContent::from_spans(vec![Span::styled("bold", bold)])),
            ]
        );
    }

    #[test]
    fn test_import_prefers_richest_flavour() {
        let source = PasteSource {
            markup: Some("<p><b>m</b></p>".into()),
            rich_text: Some("<p>h</p>".into()),
            plain_text: Some("t".into()),
        };
        assert_eq!(import_with_flavor(&source).unwrap().0, ClipboardFlavor::Markup);
    }

    #[test]
    fn test_import_degrades_on_parse_failure() {
        let source = PasteSource {
            markup: Some("<p><b>broken</p>".into()),
            rich_text: Some("<table><tr><td><table><tr><td><table></table></td></tr></table></td></tr></table>".into()),
            plain_text: Some("line one\nline two".into()),
        };
        let (flavor, blocks) = import_with_flavor(&source).unwrap();
        assert_eq!(flavor, ClipboardFlavor::PlainText);
        assert_eq!(
            blocks,
            vec![
                BlockContent::Paragraph(ParagraphContent::plain("line one")),
                BlockContent::Paragraph(ParagraphContent::plain("line two")),
            ]
        );

        let rich_only = PasteSource {
            markup: Some("<nope>".into()),
            rich_text: Some("<p>fine</p>".into()),
            plain_text: None,
        };
        assert_eq!(import_with_flavor(&rich_only).unwrap().0, ClipboardFlavor::RichText);
        assert!(import(&PasteSource::default()).is_empty());
    }

    #[test]
    fn test_unterminated_tag_is_reported() {
        let err = from_html("<p>ok</p>\n<b oops").unwrap_err();
        assert_eq!((err.line, err.col), (2, 1));
    }
}
