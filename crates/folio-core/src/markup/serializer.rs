//! Deterministic markup writer.

use crate::content::{BlockContent, ParagraphContent, Span, TableContent};
use crate::format::Format;

pub(crate) fn write_document(blocks: &[BlockContent]) -> String {
    let mut out = String::from("<doc>\n");
    for block in blocks {
        write_block(block, &mut out);
        out.push('\n');
    }
    out.push_str("</doc>\n");
    out
}

pub(crate) fn write_fragment(blocks: &[BlockContent]) -> String {
    let mut out = String::new();
    for (i, block) in blocks.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        write_block(block, &mut out);
    }
    out
}

fn write_block(block: &BlockContent, out: &mut String) {
    match block {
        BlockContent::Paragraph(p) => write_paragraph(p, out),
        BlockContent::Table(t) => write_table(t, out),
    }
}

fn write_paragraph(p: &ParagraphContent, out: &mut String) {
    match p.alignment.markup_value() {
        Some(align) => {
            out.push_str("<p align=\"");
            out.push_str(align);
            out.push_str("\">");
        }
        None => out.push_str("<p>"),
    }
    for span in &p.spans {
        write_span(span, out);
    }
    out.push_str("</p>");
}

fn write_table(t: &TableContent, out: &mut String) {
    out.push_str("<table>");
    for row in &t.rows {
        out.push_str("<tr>");
        for cell in row {
            let tag = if cell.header { "th" } else { "td" };
            out.push('<');
            out.push_str(tag);
            out.push('>');
            for block in &cell.blocks {
                write_block(block, out);
            }
            out.push_str("</");
            out.push_str(tag);
            out.push('>');
        }
        out.push_str("</tr>");
    }
    out.push_str("</table>");
}

fn write_span(span: &Span, out: &mut String) {
    match span {
        Span::Text { text, format } => {
            let closing = open_marks(format, out);
            escape_into(text, out);
            for tag in closing.iter().rev() {
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
        }
        Span::Element { kind, payload } => {
            out.push_str("<obj kind=\"");
            escape_into(kind, out);
            out.push_str("\">");
            escape_into(payload, out);
            out.push_str("</obj>");
        }
    }
}

/// Open mark tags in the fixed order `b, i, u, s, font`; returns the tags to close.
fn open_marks(format: &Format, out: &mut String) -> Vec<&'static str> {
    let mut closing = Vec::new();
    for (on, tag) in [
        (format.bold, "b"),
        (format.italic, "i"),
        (format.underline, "u"),
        (format.strike, "s"),
    ] {
        if on {
            out.push('<');
            out.push_str(tag);
            out.push('>');
            closing.push(tag);
        }
    }
    if format.has_font_override() {
        out.push_str("<font");
        if let Some(family) = &format.family {
            out.push_str(" family=\"");
            escape_into(family, out);
            out.push('"');
        }
        if let Some(size) = format.size {
            out.push_str(&format!(" size=\"{size}\""));
        }
        if let Some(color) = format.color {
            out.push_str(&format!(" color=\"{}\"", color.to_hex()));
        }
        out.push('>');
        closing.push("font");
    }
    closing
}

fn escape_into(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\n' => out.push_str("&#10;"),
            '\r' => out.push_str("&#13;"),
            c => out.push(c),
        }
    }
}
