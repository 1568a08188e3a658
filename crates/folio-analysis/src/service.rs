//! Spelling, grammar and typography services.
//!
//! A [`LanguageService`] reads a [`TextSnapshot`] and reports [`Issue`]s whose ranges address
//! the document directly. Services never edit: hosts turn issues into questionable-range hints
//! and apply suggestions through the editing path, so every correction is undoable.

use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use folio_core::{NodeId, TextRange, TextSnapshot};
use regex::Regex;
use serde::Serialize;
use unicode_segmentation::UnicodeSegmentation;

use crate::error::AnalysisError;
use crate::scheduler::CancellationToken;

/// Maximum number of suggestions attached to one issue.
pub const MAX_SUGGESTIONS: usize = 5;

/// What kind of problem an issue reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueKind {
    Spelling,
    Grammar,
    Style,
    Typography,
}

/// One finding of a language service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    /// Flagged text.
    pub range: TextRange,
    pub kind: IssueKind,
    /// Human readable explanation.
    pub message: String,
    /// Replacement candidates, best first.
    pub suggestions: Vec<String>,
    /// Identifier of the rule that fired, if any.
    pub rule: Option<String>,
}

/// A spell or grammar checker.
pub trait LanguageService: Send + Sync {
    /// Short name used in logs and errors.
    fn name(&self) -> &str;

    /// Check `snapshot`. Implementations poll `token` between paragraphs.
    fn check(&self, snapshot: &TextSnapshot, token: &CancellationToken) -> Result<Vec<Issue>, AnalysisError>;
}

/// Tracks failures of one service and rests it after repeated failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceHealth {
    consecutive_failures: u32,
    max_failures: u32,
    cooldown_ms: u64,
    resting_until: Option<u64>,
}

impl Default for ServiceHealth {
    fn default() -> Self {
        Self::new(3, 60_000)
    }
}

impl ServiceHealth {
    /// Rest for `cooldown_ms` after `max_failures` failures in a row.
    pub fn new(max_failures: u32, cooldown_ms: u64) -> Self {
        Self {
            consecutive_failures: 0,
            max_failures: max_failures.max(1),
            cooldown_ms,
            resting_until: None,
        }
    }

    /// Returns `true` if the service may be asked at `now_ms`.
    pub fn is_available(&self, now_ms: u64) -> bool {
        self.resting_until.is_none_or(|until| now_ms >= until)
    }

    /// `Err(ServiceUnavailable)` while the service is resting.
    pub fn ensure_available(&self, service: &str, now_ms: u64) -> Result<(), AnalysisError> {
        if self.is_available(now_ms) {
            Ok(())
        } else {
            Err(AnalysisError::unavailable(service, "resting after repeated failures"))
        }
    }

    /// Fold a finished run into the health state. Cancellation and staleness say nothing about
    /// the service and are ignored.
    pub fn observe<T>(&mut self, service: &str, outcome: &Result<T, AnalysisError>, now_ms: u64) {
        match outcome {
            Ok(_) => {
                self.consecutive_failures = 0;
                self.resting_until = None;
            }
            Err(AnalysisError::ServiceUnavailable { reason, .. }) => {
                self.consecutive_failures += 1;
                log::warn!("{service} failed ({} in a row): {reason}", self.consecutive_failures);
                if self.consecutive_failures >= self.max_failures {
                    self.resting_until = Some(now_ms + self.cooldown_ms);
                    self.consecutive_failures = 0;
                }
            }
            Err(_) => {}
        }
    }
}

/// Words of `text` with their char offsets.
fn words_with_offsets(text: &str) -> impl Iterator<Item = (usize, usize, &str)> {
    let mut chars_before = 0;
    let mut last_byte = 0;
    text.unicode_word_indices().map(move |(byte, word)| {
        chars_before += text[last_byte..byte].chars().count();
        let start = chars_before;
        let len = word.chars().count();
        chars_before += len;
        last_byte = byte + word.len();
        (start, start + len, word)
    })
}

fn edit_distance(a: &[char], b: &[char]) -> usize {
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut prev2: Vec<usize> = vec![0; b.len() + 1];
    let mut cur = vec![0; b.len() + 1];
    for i in 1..=a.len() {
        cur[0] = i;
        for j in 1..=b.len() {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            cur[j] = (prev[j] + 1).min(cur[j - 1] + 1).min(prev[j - 1] + cost);
            // Adjacent transposition.
            if i > 1 && j > 1 && a[i - 1] == b[j - 2] && a[i - 2] == b[j - 1] {
                cur[j] = cur[j].min(prev2[j - 2] + 1);
            }
        }
        std::mem::swap(&mut prev2, &mut prev);
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[b.len()]
}

fn match_case(template: &str, word: &str) -> String {
    let mut chars = template.chars();
    match chars.next() {
        Some(first) if first.is_uppercase() && chars.all(char::is_uppercase) && template.chars().count() > 1 => {
            word.to_uppercase()
        }
        Some(first) if first.is_uppercase() => {
            let mut out = String::with_capacity(word.len());
            let mut rest = word.chars();
            if let Some(c) = rest.next() {
                out.extend(c.to_uppercase());
            }
            out.extend(rest);
            out
        }
        _ => word.to_string(),
    }
}

/// Word-list spell checker with a user dictionary and an ignore list.
#[derive(Debug, Clone, Default)]
pub struct DictionarySpellChecker {
    language: String,
    words: HashSet<String>,
    user_words: BTreeSet<String>,
    ignored: HashSet<String>,
}

impl DictionarySpellChecker {
    /// A checker over `words`.
    pub fn from_words<I, S>(language: &str, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            language: language.to_string(),
            words: words.into_iter().map(|w| w.as_ref().to_lowercase()).collect(),
            ..Self::default()
        }
    }

    /// Load a word list, one word per line. `#` starts a comment line.
    pub fn load<P: AsRef<Path>>(language: &str, path: P) -> Result<Self, AnalysisError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|err| AnalysisError::unavailable("spelling", format!("{}: {err}", path.display())))?;
        let words = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'));
        let checker = Self::from_words(language, words);
        log::debug!("loaded {} words for {language} from {}", checker.words.len(), path.display());
        Ok(checker)
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    /// Returns `true` once a non-empty word list is loaded.
    pub fn is_loaded(&self) -> bool {
        !self.words.is_empty()
    }

    /// Returns `true` if `word` needs no correction. Words with digits are never flagged.
    pub fn is_correct(&self, word: &str) -> bool {
        if word.chars().any(|c| c.is_numeric()) {
            return true;
        }
        let lower = word.to_lowercase();
        self.words.contains(&lower) || self.user_words.contains(&lower) || self.ignored.contains(&lower)
    }

    /// Up to `max` known words within two edits of `word`, closest first.
    pub fn suggestions(&self, word: &str, max: usize) -> Vec<String> {
        let lower: Vec<char> = word.to_lowercase().chars().collect();
        let mut scored: Vec<(usize, &String)> = self
            .words
            .iter()
            .chain(self.user_words.iter())
            .filter(|candidate| candidate.chars().count().abs_diff(lower.len()) <= 2)
            .filter_map(|candidate| {
                let chars: Vec<char> = candidate.chars().collect();
                let distance = edit_distance(&lower, &chars);
                (distance <= 2).then_some((distance, candidate))
            })
            .collect();
        scored.sort();
        scored.dedup_by(|a, b| a.1 == b.1);
        scored
            .into_iter()
            .take(max)
            .map(|(_, candidate)| match_case(word, candidate))
            .collect()
    }

    /// Accept `word` from now on.
    pub fn add_to_user_dictionary(&mut self, word: &str) {
        self.user_words.insert(word.to_lowercase());
    }

    pub fn remove_from_user_dictionary(&mut self, word: &str) -> bool {
        self.user_words.remove(&word.to_lowercase())
    }

    pub fn is_in_user_dictionary(&self, word: &str) -> bool {
        self.user_words.contains(&word.to_lowercase())
    }

    /// User dictionary words, sorted.
    pub fn user_words(&self) -> Vec<String> {
        self.user_words.iter().cloned().collect()
    }

    /// Skip `word` for the rest of the session without adding it to the user dictionary.
    pub fn ignore_word(&mut self, word: &str) {
        self.ignored.insert(word.to_lowercase());
    }

    fn check_paragraph(&self, paragraph: NodeId, text: &str, out: &mut Vec<Issue>) {
        for (start, end, word) in words_with_offsets(text) {
            if self.is_correct(word) {
                continue;
            }
            out.push(Issue {
                range: TextRange::in_paragraph(paragraph, start, end),
                kind: IssueKind::Spelling,
                message: format!("possible misspelling: {word}"),
                suggestions: self.suggestions(word, MAX_SUGGESTIONS),
                rule: None,
            });
        }
    }
}

impl LanguageService for DictionarySpellChecker {
    fn name(&self) -> &str {
        "spelling"
    }

    fn check(&self, snapshot: &TextSnapshot, token: &CancellationToken) -> Result<Vec<Issue>, AnalysisError> {
        if !self.is_loaded() {
            return Err(AnalysisError::unavailable(self.name(), format!("no dictionary for {}", self.language)));
        }
        let mut out = Vec::new();
        for (paragraph, text) in snapshot.paragraphs() {
            token.check()?;
            self.check_paragraph(paragraph, &text, &mut out);
        }
        Ok(out)
    }
}

static DOUBLE_SPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r" {2,}").expect("valid spacing regex"));
static SPACE_BEFORE_PUNCT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r" +([,.;:!?])").expect("valid punctuation regex"));

/// Local grammar and typography rules: repeated words, doubled spaces and spaces before
/// punctuation.
#[derive(Debug, Clone, Copy, Default)]
pub struct TypographyChecker;

impl TypographyChecker {
    fn check_paragraph(paragraph: NodeId, text: &str, out: &mut Vec<Issue>) {
        let first = out.len();
        let char_at = |byte: usize| text[..byte].chars().count();

        let mut previous: Option<(usize, usize, &str)> = None;
        for (start, end, word) in words_with_offsets(text) {
            if let Some((prev_start, prev_end, prev)) = previous {
                let between: String = text.chars().skip(prev_end).take(start - prev_end).collect();
                if prev.to_lowercase() == word.to_lowercase() && between.chars().all(char::is_whitespace) {
                    out.push(Issue {
                        range: TextRange::in_paragraph(paragraph, prev_start, end),
                        kind: IssueKind::Grammar,
                        message: format!("repeated word: {word}"),
                        suggestions: vec![prev.to_string()],
                        rule: Some("REPEATED_WORD".to_string()),
                    });
                }
            }
            previous = Some((start, end, word));
        }

        for m in DOUBLE_SPACE.find_iter(text) {
            out.push(Issue {
                range: TextRange::in_paragraph(paragraph, char_at(m.start()), char_at(m.end())),
                kind: IssueKind::Typography,
                message: "more than one space".to_string(),
                suggestions: vec![" ".to_string()],
                rule: Some("DOUBLE_SPACE".to_string()),
            });
        }
        for caps in SPACE_BEFORE_PUNCT.captures_iter(text) {
            let (Some(all), Some(punct)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            out.push(Issue {
                range: TextRange::in_paragraph(paragraph, char_at(all.start()), char_at(all.end())),
                kind: IssueKind::Typography,
                message: format!("space before '{}'", punct.as_str()),
                suggestions: vec![punct.as_str().to_string()],
                rule: Some("SPACE_BEFORE_PUNCTUATION".to_string()),
            });
        }
        out[first..].sort_by_key(|issue| issue.range.start.offset);
    }
}

impl LanguageService for TypographyChecker {
    fn name(&self) -> &str {
        "typography"
    }

    fn check(&self, snapshot: &TextSnapshot, token: &CancellationToken) -> Result<Vec<Issue>, AnalysisError> {
        let mut out = Vec::new();
        for (paragraph, text) in snapshot.paragraphs() {
            token.check()?;
            Self::check_paragraph(paragraph, &text, &mut out);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_core::Document;
    use pretty_assertions::assert_eq;

    fn checker() -> DictionarySpellChecker {
        DictionarySpellChecker::from_words("en", ["the", "whale", "white", "while", "sea", "call", "me"])
    }

    #[test]
    fn test_flags_unknown_words_with_suggestions() {
        let doc = Document::from_plain_text("Call me Ishmael.\nThe wahle");
        let (a, b) = (doc.body()[0], doc.body()[1]);
        let issues = checker().check(&doc.snapshot(), &CancellationToken::new()).unwrap();
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].range, TextRange::in_paragraph(a, 8, 15));
        assert_eq!(issues[1].range, TextRange::in_paragraph(b, 4, 9));
        assert_eq!(issues[1].suggestions, vec!["whale", "while"]);
    }

    #[test]
    fn test_suggestions_keep_capitalization() {
        assert_eq!(checker().suggestions("Whlae", 1), vec!["Whale"]);
        assert_eq!(checker().suggestions("SAE", 1), vec!["SEA"]);
    }

    #[test]
    fn test_user_dictionary_and_ignore_list() {
        let mut checker = checker();
        assert!(!checker.is_correct("Ishmael"));
        checker.add_to_user_dictionary("Ishmael");
        assert!(checker.is_correct("ishmael"));
        assert_eq!(checker.user_words(), vec!["ishmael"]);
        assert!(checker.remove_from_user_dictionary("ISHMAEL"));
        checker.ignore_word("Queequeg");
        assert!(checker.is_correct("queequeg"));
        assert!(!checker.is_in_user_dictionary("queequeg"));
        assert!(checker.is_correct("1851"));
    }

    #[test]
    fn test_missing_dictionary_is_unavailable() {
        let empty = DictionarySpellChecker::default();
        let doc = Document::from_plain_text("anything");
        assert!(matches!(
            empty.check(&doc.snapshot(), &CancellationToken::new()),
            Err(AnalysisError::ServiceUnavailable { .. })
        ));
        assert!(matches!(
            DictionarySpellChecker::load("en", "/nonexistent/folio.dic"),
            Err(AnalysisError::ServiceUnavailable { .. })
        ));
    }

    #[test]
    fn test_typography_rules() {
        let doc = Document::from_plain_text("It was the the  best , worst");
        let p = doc.body()[0];
        let issues = TypographyChecker.check(&doc.snapshot(), &CancellationToken::new()).unwrap();
        let found: Vec<_> = issues
            .iter()
            .map(|i| (i.rule.as_deref().unwrap_or(""), i.range))
            .collect();
        assert_eq!(
            found,
            vec![
                ("REPEATED_WORD", TextRange::in_paragraph(p, 7, 14)),
                ("DOUBLE_SPACE", TextRange::in_paragraph(p, 14, 16)),
                ("SPACE_BEFORE_PUNCTUATION", TextRange::in_paragraph(p, 20, 22)),
            ]
        );
    }

    #[test]
    fn test_health_rests_after_repeated_failures() {
        let mut health = ServiceHealth::new(2, 1_000);
        let failure: Result<(), _> = Err(AnalysisError::unavailable("grammar", "timeout"));
        health.observe("grammar", &failure, 0);
        assert!(health.is_available(0));
        health.observe("grammar", &failure, 10);
        assert!(!health.is_available(500));
        assert!(health.ensure_available("grammar", 500).is_err());
        assert!(health.is_available(1_010));
        health.observe::<()>("grammar", &Err(AnalysisError::Cancelled), 20);
        health.observe("grammar", &Ok(()), 1_100);
        assert!(health.is_available(1_100));
    }
}
