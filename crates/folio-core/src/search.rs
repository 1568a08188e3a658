//! Find and replace over a document.
//!
//! Queries are matched paragraph by paragraph; a match never spans a paragraph break.
//! Offsets are character offsets, so matches are directly usable as [`TextRange`]s. Inline
//! elements take part in matching as U+FFFC.

use regex::{Regex, RegexBuilder};

use crate::document::{Document, DocumentChange};
use crate::editing::{Command, EditingController};
use crate::error::{EditError, SearchError};
use crate::position::{Position, TextRange};

/// Options that control how search is performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchOptions {
    /// If `true`, performs a case-sensitive search.
    pub case_sensitive: bool,
    /// If `true`, matches only whole words.
    pub whole_word: bool,
    /// If `true`, treats the query as a regex pattern.
    pub regex: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            case_sensitive: true,
            whole_word: false,
            regex: false,
        }
    }
}

#[derive(Debug)]
struct CharIndex {
    char_to_byte: Vec<usize>,
    text_len: usize,
}

impl CharIndex {
    fn new(text: &str) -> Self {
        let mut char_to_byte: Vec<usize> = text.char_indices().map(|(b, _)| b).collect();
        char_to_byte.push(text.len());
        Self {
            char_to_byte,
            text_len: text.len(),
        }
    }

    fn char_count(&self) -> usize {
        self.char_to_byte.len().saturating_sub(1)
    }

    fn byte_to_char(&self, byte_offset: usize) -> usize {
        let clamped = byte_offset.min(self.text_len);
        match self.char_to_byte.binary_search(&clamped) {
            Ok(idx) | Err(idx) => idx,
        }
    }

    fn char_at(&self, text: &str, char_offset: usize) -> Option<char> {
        if char_offset >= self.char_count() {
            return None;
        }
        let start = self.char_to_byte[char_offset];
        let end = self.char_to_byte[char_offset + 1];
        text.get(start..end)?.chars().next()
    }
}

fn compile_search_regex(query: &str, options: SearchOptions) -> Result<Regex, SearchError> {
    let pattern = if options.regex {
        query.to_string()
    } else {
        regex::escape(query)
    };

    RegexBuilder::new(&pattern)
        .case_insensitive(!options.case_sensitive)
        .build()
        .map_err(|err| SearchError::InvalidRegex(err.to_string()))
}

fn is_word_char(ch: char) -> bool {
    ch == '_' || ch.is_alphanumeric()
}

/// One match inside a paragraph, with its replacement already expanded.
struct ParagraphMatch {
    start: usize,
    end: usize,
    replacement: Option<String>,
}

fn paragraph_matches(
    text: &str,
    re: &Regex,
    options: SearchOptions,
    replacement: Option<&str>,
) -> Vec<ParagraphMatch> {
    let index = CharIndex::new(text);
    let mut out = Vec::new();
    for caps in re.captures_iter(text) {
        let Some(m) = caps.get(0) else {
            continue;
        };
        let start = index.byte_to_char(m.start());
        let end = index.byte_to_char(m.end());
        if start >= end {
            continue;
        }
        if options.whole_word {
            let before = start.checked_sub(1).and_then(|i| index.char_at(text, i));
            let after = index.char_at(text, end);
            if before.is_some_and(is_word_char) || after.is_some_and(is_word_char) {
                continue;
            }
        }
        let replacement = replacement.map(|template| {
            if options.regex {
                let mut expanded = String::new();
                caps.expand(template, &mut expanded);
                expanded
            } else {
                template.to_string()
            }
        });
        out.push(ParagraphMatch {
            start,
            end,
            replacement,
        });
    }
    out
}

/// All occurrences of `query`, in reading order. Empty for an empty query.
pub fn find_all(doc: &Document, query: &str, options: SearchOptions) -> Result<Vec<TextRange>, SearchError> {
    if query.is_empty() {
        return Ok(Vec::new());
    }
    let re = compile_search_regex(query, options)?;
    let mut out = Vec::new();
    for paragraph in doc.paragraphs_in_order() {
        let Ok(text) = doc.paragraph_text(paragraph) else {
            continue;
        };
        out.extend(
            paragraph_matches(&text, &re, options, None)
                .into_iter()
                .map(|m| TextRange::in_paragraph(paragraph, m.start, m.end)),
        );
    }
    Ok(out)
}

/// The first occurrence starting at or after `from`, wrapping around to the document start.
pub fn find_next(
    doc: &Document,
    query: &str,
    options: SearchOptions,
    from: Position,
) -> Result<Option<TextRange>, SearchError> {
    let matches = find_all(doc, query, options)?;
    let order = doc.paragraphs_in_order();
    let rank = |pos: Position| (order.iter().position(|p| *p == pos.paragraph), pos.offset);
    let from = rank(from);
    Ok(matches
        .iter()
        .find(|m| rank(m.start) >= from)
        .or_else(|| matches.first())
        .copied())
}

/// The last occurrence ending at or before `from`, wrapping around to the document end.
pub fn find_prev(
    doc: &Document,
    query: &str,
    options: SearchOptions,
    from: Position,
) -> Result<Option<TextRange>, SearchError> {
    let matches = find_all(doc, query, options)?;
    let order = doc.paragraphs_in_order();
    let rank = |pos: Position| (order.iter().position(|p| *p == pos.paragraph), pos.offset);
    let from = rank(from);
    Ok(matches
        .iter()
        .rev()
        .find(|m| rank(m.end) <= from)
        .or_else(|| matches.last())
        .copied())
}

/// Returns `true` if `range` is exactly one occurrence of `query`.
pub fn is_match_exact(
    doc: &Document,
    query: &str,
    options: SearchOptions,
    range: TextRange,
) -> Result<bool, SearchError> {
    if range.is_empty() {
        return Ok(false);
    }
    Ok(find_all(doc, query, options)?.contains(&range))
}

/// A single command replacing every occurrence, or `None` if there is nothing to replace.
/// In regex mode `$1`, `${name}` and friends expand to capture groups.
pub fn replace_all_command(
    doc: &Document,
    query: &str,
    options: SearchOptions,
    replacement: &str,
) -> Result<Option<Command>, SearchError> {
    if query.is_empty() {
        return Ok(None);
    }
    let re = compile_search_regex(query, options)?;
    let mut commands = Vec::new();
    for paragraph in doc.paragraphs_in_order() {
        let Ok(text) = doc.paragraph_text(paragraph) else {
            continue;
        };
        for m in paragraph_matches(&text, &re, options, Some(replacement)) {
            commands.push(Command::ReplaceRange {
                range: TextRange::in_paragraph(paragraph, m.start, m.end),
                text: m.replacement.unwrap_or_default(),
            });
        }
    }
    Ok((!commands.is_empty()).then_some(Command::Batch(commands)))
}

impl EditingController {
    /// Replace every occurrence of `query` as one undo step. Returns the number of
    /// replacements and the resulting changes.
    pub fn replace_all(
        &mut self,
        doc: &mut Document,
        pane: usize,
        query: &str,
        options: SearchOptions,
        replacement: &str,
    ) -> Result<(usize, Vec<DocumentChange>), EditError> {
        let Some(command) = replace_all_command(doc, query, options, replacement)? else {
            return Ok((0, Vec::new()));
        };
        let count = match &command {
            Command::Batch(commands) => commands.len(),
            _ => 1,
        };
        log::debug!("replacing {count} occurrence(s) of {query:?}");
        let changes = self.execute(doc, pane, command)?;
        self.end_group();
        Ok((count, changes))
    }
}
