//! Markup codec: the textual persistence format of a manuscript.
//!
//! ```text
//! <doc>
//! <p>Plain, <b>bold</b> and <b><i>both</i></b>.</p>
//! <p align="center"><font family="Garamond" size="14" color="#202020">Title</font></p>
//! <p>See figure <obj kind="image">figure-1.png</obj>.</p>
//! <table><tr><th><p>Name</p></th><td><p>Value</p></td></tr></table>
//! </doc>
//! ```
//!
//! - Blocks: `p` (optional `align`), `table` / `tr` / `td` / `th`.
//! - Marks: `b`, `i`, `u`, `s`, `font` (`family`, `size`, `color`). Marks nest; a run's
//!   format is the union of the marks around it.
//! - Inline elements: `<obj kind="...">payload</obj>`, one character in the document.
//! - Entities `&amp; &lt; &gt; &quot; &apos;` plus numeric references; `<!-- -->` comments.
//! - Whitespace between blocks is insignificant; text inside a paragraph is kept as is,
//!   except raw line breaks, which read as spaces.
//!
//! [`serialize`] is deterministic and [`parse`] accepts everything it writes, so
//! `parse(&serialize(&doc)) == doc` for every document.

mod lexer;
mod parser;
mod serializer;

use crate::content::BlockContent;
use crate::document::Document;
use crate::error::ParseError;

/// Parse a whole document. The `<doc>` wrapper is optional.
pub fn parse(input: &str) -> Result<Document, ParseError> {
    let blocks = parser::Parser::new(input).document()?;
    // Nesting was bounded while parsing.
    Document::from_blocks(&blocks).map_err(|err| ParseError::new(1, 1, err.to_string()))
}

/// Serialize a document, one top-level block per line.
pub fn serialize(doc: &Document) -> String {
    serializer::write_document(&doc.content())
}

/// Parse a sequence of blocks without the document wrapper (clipboard content).
pub fn parse_fragment(input: &str) -> Result<Vec<BlockContent>, ParseError> {
    parser::Parser::new(input).document()
}

/// Serialize a sequence of blocks without the document wrapper.
pub fn serialize_fragment(blocks: &[BlockContent]) -> String {
    serializer::write_fragment(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{ParagraphContent, Span};
    use crate::format::{Alignment, Color, Format, FormatDelta};
    use crate::position::{Position, TextRange};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_marks_and_elements() {
        let doc = parse(
            r#"<doc><p align="right">a<b>b<i>c</i></b><obj kind="note">x &amp; y</obj></p></doc>"#,
        )
        .unwrap();
        let bold = Format::plain().with_applied(&FormatDelta::bold());
        let bold_italic = bold.with_applied(&FormatDelta::italic());
        assert_eq!(
            doc.content(),
            vec![BlockContent::Paragraph(
                ParagraphContent::from_spans(vec![
                    Span::text("a"),
                    Span::styled("b", bold),
                    Span::styled("c", bold_italic),
                    Span::element("note", "x & y"),
                ])
                .with_alignment(Alignment::Right)
            )]
        );
    }

    #[test]
    fn test_empty_document() {
        let doc = parse("<doc></doc>").unwrap();
        assert_eq!(doc.body().len(), 1);
        assert_eq!(serialize(&doc), "<doc>\n<p></p>\n</doc>\n");
    }

    #[test]
    fn test_serialize_font_attributes() {
        let mut doc = Document::new();
        let p = doc.body()[0];
        doc.insert_text(Position::new(p, 0), "Title").unwrap();
        let delta = FormatDelta {
            family: Some("Garamond".into()),
            size: Some(14),
            color: Some(Color::rgb(0x20, 0x20, 0x20)),
            bold: true,
            ..FormatDelta::default()
        };
        doc.apply_format(TextRange::in_paragraph(p, 0, 5), &delta).unwrap();
        let text = serialize(&doc);
        assert_eq!(
            text,
            "<doc>\n<p><b><font family=\"Garamond\" size=\"14\" color=\"#202020\">Title</font></b></p>\n</doc>\n"
        );
        assert_eq!(parse(&text).unwrap(), doc);
    }

    #[test]
    fn test_bare_cell_content_is_wrapped() {
        let doc = parse("<doc><table><tr><td>one <b>two</b></td><th></th></tr></table></doc>").unwrap();
        assert_eq!(
            serialize(&doc),
            "<doc>\n<table><tr><td><p>one <b>two</b></p></td><th><p></p></th></tr></table>\n</doc>\n"
        );
    }

    #[test]
    fn test_rejects_malformed_input() {
        for (input, line, col) in [
            ("<doc><p>a</b></p></doc>", 1, 10),
            ("<doc>\n<p><blink>x</blink></p></doc>", 2, 4),
            ("<doc><p align=center>x</p></doc>", 1, 15),
            ("<doc>stray</doc>", 1, 6),
            ("<doc><p>open</doc>", 1, 13),
        ] {
            let err = parse(input).unwrap_err();
            assert_eq!((err.line, err.col), (line, col), "{input}: {err}");
        }
    }

    #[test]
    fn test_rejects_deep_table_nesting() {
        let deep = "<doc><table><tr><td><table><tr><td><table><tr><td>x</td></tr></table></td></tr></table></td></tr></table></doc>";
        let err = parse(deep).unwrap_err();
        assert!(err.reason.contains("nesting"), "{err}");
    }

    #[test]
    fn test_fragment_roundtrip() {
        let blocks = vec![
            BlockContent::Paragraph(ParagraphContent::plain("  leading space")),
            BlockContent::Paragraph(ParagraphContent::plain("a < b & \"c\"")),
        ];
        let text = serialize_fragment(&blocks);
        assert_eq!(parse_fragment(&text).unwrap(), blocks);
    }
}
