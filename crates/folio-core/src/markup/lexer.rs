//! Tokenizer for the manuscript markup.

use crate::error::ParseError;

/// Token payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TokenKind {
    /// `<name attr="v">` or `<name/>`.
    Open {
        name: String,
        attrs: Vec<(String, String)>,
        self_closing: bool,
    },
    /// `</name>`.
    Close { name: String },
    /// Character data with entities decoded. Raw line breaks become spaces.
    Text(String),
    Eof,
}

/// A token and where it starts (1-based).
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub line: usize,
    pub col: usize,
}

pub(crate) struct Lexer<'a> {
    input: &'a str,
    pos: usize,
    line: usize,
    col: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn starts_with(&self, s: &str) -> bool {
        self.input[self.pos..].starts_with(s)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn error(&self, reason: impl Into<String>) -> ParseError {
        ParseError::new(self.line, self.col, reason)
    }

    pub fn next_token(&mut self) -> Result<Token, ParseError> {
        loop {
            let (line, col) = (self.line, self.col);
            let kind = match self.peek() {
                None => TokenKind::Eof,
                Some('<') if self.starts_with("<!--") => {
                    self.skip_comment()?;
                    continue;
                }
                Some('<') => self.tag()?,
                Some(_) => TokenKind::Text(self.text()?),
            };
            return Ok(Token { kind, line, col });
        }
    }

    fn skip_comment(&mut self) -> Result<(), ParseError> {
        for _ in 0..4 {
            self.bump();
        }
        while !self.starts_with("-->") {
            if self.bump().is_none() {
                return Err(self.error("unterminated comment"));
            }
        }
        for _ in 0..3 {
            self.bump();
        }
        Ok(())
    }

    fn text(&mut self) -> Result<String, ParseError> {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            match c {
                '<' => break,
                '&' => out.push(self.entity()?),
                '\r' => {
                    self.bump();
                    if self.peek() != Some('\n') {
                        out.push(' ');
                    }
                }
                '\n' => {
                    self.bump();
                    out.push(' ');
                }
                _ => {
                    self.bump();
                    out.push(c);
                }
            }
        }
        Ok(out)
    }

    fn entity(&mut self) -> Result<char, ParseError> {
        let (line, col) = (self.line, self.col);
        self.bump();
        let mut name = String::new();
        loop {
            match self.bump() {
                Some(';') => break,
                Some(c) if c.is_ascii_alphanumeric() || c == '#' => name.push(c),
                _ => return Err(ParseError::new(line, col, "unterminated entity")),
            }
            if name.len() > 10 {
                return Err(ParseError::new(line, col, "unterminated entity"));
            }
        }
        let decoded = match name.as_str() {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => match name.strip_prefix('#') {
                Some(hex) if hex.starts_with(['x', 'X']) => u32::from_str_radix(&hex[1..], 16)
                    .ok()
                    .and_then(char::from_u32),
                Some(dec) => dec.parse::<u32>().ok().and_then(char::from_u32),
                None => None,
            },
        };
        decoded.ok_or_else(|| ParseError::new(line, col, format!("unknown entity &{name};")))
    }

    fn name(&mut self) -> Result<String, ParseError> {
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                name.push(c);
                self.bump();
            } else {
                break;
            }
        }
        if name.is_empty() {
            return Err(self.error("expected a name"));
        }
        Ok(name)
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn tag(&mut self) -> Result<TokenKind, ParseError> {
        self.bump();
        if self.peek() == Some('/') {
            self.bump();
            let name = self.name()?;
            self.skip_whitespace();
            if self.bump() != Some('>') {
                return Err(self.error(format!("malformed closing tag </{name}>")));
            }
            return Ok(TokenKind::Close { name });
        }
        let name = self.name()?;
        let mut attrs: Vec<(String, String)> = Vec::new();
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some('>') => {
                    self.bump();
                    return Ok(TokenKind::Open {
                        name,
                        attrs,
                        self_closing: false,
                    });
                }
                Some('/') => {
                    self.bump();
                    if self.bump() != Some('>') {
                        return Err(self.error("expected '>' after '/'"));
                    }
                    return Ok(TokenKind::Open {
                        name,
                        attrs,
                        self_closing: true,
                    });
                }
                None => return Err(self.error(format!("unterminated tag <{name}>"))),
                Some(_) => {
                    let (line, col) = (self.line, self.col);
                    let key = self.name()?;
                    self.skip_whitespace();
                    if self.bump() != Some('=') {
                        return Err(ParseError::new(line, col, format!("malformed attribute {key}")));
                    }
                    self.skip_whitespace();
                    let value = self.quoted()?;
                    if attrs.iter().any(|(k, _)| *k == key) {
                        return Err(ParseError::new(line, col, format!("duplicate attribute {key}")));
                    }
                    attrs.push((key, value));
                }
            }
        }
    }

    fn quoted(&mut self) -> Result<String, ParseError> {
        let quote = match self.peek() {
            Some(q @ ('"' | '\'')) => q,
            _ => return Err(self.error("attribute value must be quoted")),
        };
        self.bump();
        let mut out = String::new();
        loop {
            match self.peek() {
                None => return Err(self.error("unterminated attribute value")),
                Some(c) if c == quote => {
                    self.bump();
                    return Ok(out);
                }
                Some('&') => out.push(self.entity()?),
                Some('<') => return Err(self.error("'<' inside attribute value")),
                Some(c) => {
                    self.bump();
                    out.push(c);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        let mut lexer = Lexer::new(input);
        let mut out = Vec::new();
        loop {
            let token = lexer.next_token().unwrap();
            if token.kind == TokenKind::Eof {
                return out;
            }
            out.push(token.kind);
        }
    }

    #[test]
    fn test_tags_attributes_and_entities() {
        assert_eq!(
            kinds(r#"<p align="center">a &amp; &#x41;</p>"#),
            vec![
                TokenKind::Open {
                    name: "p".into(),
                    attrs: vec![("align".into(), "center".into())],
                    self_closing: false,
                },
                TokenKind::Text("a & A".into()),
                TokenKind::Close { name: "p".into() },
            ]
        );
    }

    #[test]
    fn test_comments_are_skipped_and_newlines_fold() {
        assert_eq!(
            kinds("a<!-- note -->b\r\nc"),
            vec![TokenKind::Text("a".into()), TokenKind::Text("b c".into())]
        );
    }

    #[test]
    fn test_error_location() {
        let mut lexer = Lexer::new("<p>\n  &bogus;");
        lexer.next_token().unwrap();
        let err = lexer.next_token().unwrap_err();
        assert_eq!((err.line, err.col), (2, 3));
    }
}
