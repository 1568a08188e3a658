//! Recursive-descent parser from tokens to id-free block content.

use crate::content::{BlockContent, CellContent, ParagraphContent, Span, TableContent};
use crate::document::MAX_TABLE_DEPTH;
use crate::error::ParseError;
use crate::format::{Alignment, Color, Format};

use super::lexer::{Lexer, Token, TokenKind};

const BLOCK_TAGS: &[&str] = &["doc", "p", "table", "tr", "td", "th"];
const INLINE_TAGS: &[&str] = &["b", "i", "u", "s", "font", "obj"];

pub(crate) struct Parser<'a> {
    lexer: Lexer<'a>,
    peeked: Option<Token>,
}

impl<'a> Parser<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            lexer: Lexer::new(input),
            peeked: None,
        }
    }

    fn peek(&mut self) -> Result<&Token, ParseError> {
        let token = match self.peeked.take() {
            Some(token) => token,
            None => self.lexer.next_token()?,
        };
        Ok(self.peeked.insert(token))
    }

    fn next(&mut self) -> Result<Token, ParseError> {
        match self.peeked.take() {
            Some(token) => Ok(token),
            None => self.lexer.next_token(),
        }
    }

    fn skip_blank(&mut self) -> Result<(), ParseError> {
        while matches!(&self.peek()?.kind, TokenKind::Text(t) if t.trim().is_empty()) {
            self.next()?;
        }
        Ok(())
    }

    /// A whole document, with or without the `<doc>` wrapper.
    pub fn document(mut self) -> Result<Vec<BlockContent>, ParseError> {
        self.skip_blank()?;
        let wrapped = matches!(&self.peek()?.kind, TokenKind::Open { name, .. } if name == "doc");
        if wrapped {
            let token = self.next()?;
            if let TokenKind::Open { attrs, self_closing, .. } = &token.kind {
                reject_attrs(&token, attrs, &[])?;
                if *self_closing {
                    self.skip_blank()?;
                    self.expect_eof()?;
                    return Ok(Vec::new());
                }
            }
            let blocks = self.blocks("doc", 0)?;
            self.expect_close("doc")?;
            self.skip_blank()?;
            self.expect_eof()?;
            Ok(blocks)
        } else {
            let blocks = self.blocks("", 0)?;
            self.expect_eof()?;
            Ok(blocks)
        }
    }

    fn expect_eof(&mut self) -> Result<(), ParseError> {
        let token = self.next()?;
        match token.kind {
            TokenKind::Eof => Ok(()),
            _ => Err(ParseError::new(token.line, token.col, "content after the end of the document")),
        }
    }

    fn expect_close(&mut self, expected: &str) -> Result<(), ParseError> {
        let token = self.next()?;
        match &token.kind {
            TokenKind::Close { name } if name == expected => Ok(()),
            TokenKind::Close { name } => Err(ParseError::new(
                token.line,
                token.col,
                format!("mismatched closing tag </{name}>, expected </{expected}>"),
            )),
            TokenKind::Eof => Err(ParseError::new(
                token.line,
                token.col,
                format!("unexpected end of input, expected </{expected}>"),
            )),
            _ => Err(ParseError::new(token.line, token.col, format!("expected </{expected}>"))),
        }
    }

    /// Blocks up to (not including) a closing tag, or the end of input when `closing` is
    /// empty. `depth` is the number of enclosing tables.
    fn blocks(&mut self, closing: &str, depth: usize) -> Result<Vec<BlockContent>, ParseError> {
        let mut blocks = Vec::new();
        loop {
            self.skip_blank()?;
            let token = self.peek()?.clone();
            match &token.kind {
                TokenKind::Eof if closing.is_empty() => return Ok(blocks),
                TokenKind::Eof => {
                    return Err(ParseError::new(
                        token.line,
                        token.col,
                        format!("unexpected end of input, expected </{closing}>"),
                    ));
                }
                TokenKind::Close { .. } => return Ok(blocks),
                TokenKind::Text(_) => {
                    return Err(ParseError::new(token.line, token.col, "text outside a paragraph"));
                }
                TokenKind::Open { name, .. } => match name.as_str() {
                    "p" => blocks.push(BlockContent::Paragraph(self.paragraph()?)),
                    "table" => blocks.push(BlockContent::Table(self.table(depth + 1)?)),
                    other => return Err(unexpected_tag(&token, other, "block content")),
                },
            }
        }
    }

    fn paragraph(&mut self) -> Result<ParagraphContent, ParseError> {
        let token = self.next()?;
        let TokenKind::Open { attrs, self_closing, .. } = &token.kind else {
            return Err(ParseError::new(token.line, token.col, "expected <p>"));
        };
        reject_attrs(&token, attrs, &["align"])?;
        let alignment = match attr(attrs, "align") {
            None => Alignment::Left,
            Some(value) => Alignment::from_markup_value(value).ok_or_else(|| {
                ParseError::new(token.line, token.col, format!("unknown alignment \"{value}\""))
            })?,
        };
        let spans = if *self_closing {
            Vec::new()
        } else {
            let mut spans = Vec::new();
            self.inlines(&Format::plain(), Some("p"), &mut spans)?;
            spans
        };
        Ok(ParagraphContent { alignment, spans }.normalized())
    }

    /// Inline content in `format`. With `closing`, reads up to and including that closing
    /// tag; without, stops before any block tag or closing tag.
    fn inlines(&mut self, format: &Format, closing: Option<&str>, out: &mut Vec<Span>) -> Result<(), ParseError> {
        loop {
            let token = self.peek()?.clone();
            match &token.kind {
                TokenKind::Text(text) => {
                    self.next()?;
                    out.push(Span::Text {
                        text: text.clone(),
                        format: format.clone(),
                    });
                }
                TokenKind::Close { name } => match closing {
                    Some(expected) if expected == name => {
                        self.next()?;
                        return Ok(());
                    }
                    Some(expected) => {
                        return Err(ParseError::new(
                            token.line,
                            token.col,
                            format!("mismatched closing tag </{name}>, expected </{expected}>"),
                        ));
                    }
                    None => return Ok(()),
                },
                TokenKind::Eof => match closing {
                    Some(expected) => {
                        return Err(ParseError::new(
                            token.line,
                            token.col,
                            format!("unexpected end of input, expected </{expected}>"),
                        ));
                    }
                    None => return Ok(()),
                },
                TokenKind::Open { name, attrs, self_closing } => {
                    if BLOCK_TAGS.contains(&name.as_str()) {
                        if closing.is_none() {
                            return Ok(());
                        }
                        return Err(ParseError::new(
                            token.line,
                            token.col,
                            format!("block tag <{name}> inside a paragraph"),
                        ));
                    }
                    self.next()?;
                    if name == "obj" {
                        out.push(self.element(&token, attrs, *self_closing)?);
                        continue;
                    }
                    let nested = mark_format(&token, name, attrs, format)?;
                    if !*self_closing {
                        self.inlines(&nested, Some(name), out)?;
                    }
                }
            }
        }
    }

    fn element(&mut self, token: &Token, attrs: &[(String, String)], self_closing: bool) -> Result<Span, ParseError> {
        reject_attrs(token, attrs, &["kind"])?;
        let kind = attr(attrs, "kind")
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ParseError::new(token.line, token.col, "<obj> requires a kind attribute"))?
            .to_string();
        let mut payload = String::new();
        if !self_closing {
            loop {
                let next = self.next()?;
                match next.kind {
                    TokenKind::Text(text) => payload.push_str(&text),
                    TokenKind::Close { name } if name == "obj" => break,
                    _ => {
                        return Err(ParseError::new(next.line, next.col, "<obj> may only contain text"));
                    }
                }
            }
        }
        Ok(Span::Element { kind, payload })
    }

    fn table(&mut self, depth: usize) -> Result<TableContent, ParseError> {
        let token = self.next()?;
        if depth > MAX_TABLE_DEPTH {
            return Err(ParseError::new(
                token.line,
                token.col,
                format!("table nesting depth {depth} exceeds the maximum of {MAX_TABLE_DEPTH}"),
            ));
        }
        if let TokenKind::Open { attrs, self_closing, .. } = &token.kind {
            reject_attrs(&token, attrs, &[])?;
            if *self_closing {
                return Err(ParseError::new(token.line, token.col, "empty table"));
            }
        }
        let mut rows = Vec::new();
        loop {
            self.skip_blank()?;
            let next = self.next()?;
            match &next.kind {
                TokenKind::Open { name, attrs, self_closing: false } if name == "tr" => {
                    reject_attrs(&next, attrs, &[])?;
                    rows.push(self.row(&next, depth)?);
                }
                TokenKind::Close { name } if name == "table" => break,
                _ => return Err(ParseError::new(next.line, next.col, "expected <tr> or </table>")),
            }
        }
        if rows.is_empty() {
            return Err(ParseError::new(token.line, token.col, "empty table"));
        }
        Ok(TableContent { rows })
    }

    fn row(&mut self, start: &Token, depth: usize) -> Result<Vec<CellContent>, ParseError> {
        let mut cells = Vec::new();
        loop {
            self.skip_blank()?;
            let next = self.next()?;
            match &next.kind {
                TokenKind::Open { name, attrs, self_closing } if name == "td" || name == "th" => {
                    reject_attrs(&next, attrs, &[])?;
                    let header = name == "th";
                    let blocks = if *self_closing { Vec::new() } else { self.cell(name, depth)? };
                    let blocks = if blocks.is_empty() {
                        vec![BlockContent::Paragraph(ParagraphContent::empty())]
                    } else {
                        blocks
                    };
                    cells.push(CellContent { header, blocks });
                }
                TokenKind::Close { name } if name == "tr" => break,
                _ => return Err(ParseError::new(next.line, next.col, "expected <td>, <th> or </tr>")),
            }
        }
        if cells.is_empty() {
            return Err(ParseError::new(start.line, start.col, "empty table row"));
        }
        Ok(cells)
    }

    /// Cell content: blocks, or bare inline content wrapped into paragraphs.
    fn cell(&mut self, closing: &str, depth: usize) -> Result<Vec<BlockContent>, ParseError> {
        let mut blocks = Vec::new();
        loop {
            let mut bare = Vec::new();
            self.inlines(&Format::plain(), None, &mut bare)?;
            let blank = bare
                .iter()
                .all(|span| matches!(span, Span::Text { text, .. } if text.trim().is_empty()));
            if !blank {
                blocks.push(BlockContent::Paragraph(ParagraphContent::from_spans(bare)));
            }
            let token = self.peek()?.clone();
            match &token.kind {
                TokenKind::Open { name, .. } if name == "p" => {
                    blocks.push(BlockContent::Paragraph(self.paragraph()?));
                }
                TokenKind::Open { name, .. } if name == "table" => {
                    blocks.push(BlockContent::Table(self.table(depth + 1)?));
                }
                TokenKind::Open { name, .. } => return Err(unexpected_tag(&token, name, "a cell")),
                _ => {
                    self.expect_close(closing)?;
                    return Ok(blocks);
                }
            }
        }
    }
}

fn attr<'v>(attrs: &'v [(String, String)], key: &str) -> Option<&'v str> {
    attrs.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
}

fn reject_attrs(token: &Token, attrs: &[(String, String)], allowed: &[&str]) -> Result<(), ParseError> {
    match attrs.iter().find(|(k, _)| !allowed.contains(&k.as_str())) {
        Some((key, _)) => Err(ParseError::new(token.line, token.col, format!("unknown attribute {key}"))),
        None => Ok(()),
    }
}

fn unexpected_tag(token: &Token, name: &str, context: &str) -> ParseError {
    if BLOCK_TAGS.contains(&name) || INLINE_TAGS.contains(&name) {
        ParseError::new(token.line, token.col, format!("<{name}> is not allowed in {context}"))
    } else {
        ParseError::new(token.line, token.col, format!("unknown tag <{name}>"))
    }
}

fn mark_format(token: &Token, name: &str, attrs: &[(String, String)], base: &Format) -> Result<Format, ParseError> {
    let mut format = base.clone();
    match name {
        "b" => format.bold = true,
        "i" => format.italic = true,
        "u" => format.underline = true,
        "s" => format.strike = true,
        "font" => {
            reject_attrs(token, attrs, &["family", "size", "color"])?;
            if let Some(family) = attr(attrs, "family") {
                format.family = Some(family.to_string());
            }
            if let Some(size) = attr(attrs, "size") {
                let size = size
                    .parse::<u16>()
                    .ok()
                    .ok_or_else(|| ParseError::new(token.line, token.col, format!("invalid font size \"{size}\"")))?;
                format.size = Some(size);
            }
            if let Some(color) = attr(attrs, "color") {
                format.color = Some(Color::from_hex(color).ok_or_else(|| {
                    ParseError::new(token.line, token.col, format!("invalid color \"{color}\""))
                })?);
            }
            return Ok(format);
        }
        other => return Err(unexpected_tag(token, other, "a paragraph")),
    }
    reject_attrs(token, attrs, &[])?;
    Ok(format)
}
