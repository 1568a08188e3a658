//! Word frequency, overuse and close-repetition analysis.

use std::collections::HashMap;
use std::sync::LazyLock;

use folio_core::{TextRange, TextSnapshot};
use folio_lang::LanguageProfile;
use regex::Regex;
use serde::Serialize;

use crate::error::AnalysisError;
use crate::scheduler::CancellationToken;

static WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\p{L}+").expect("valid word regex"));

/// Analyzer settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrequencyOptions {
    /// A word is overused when it makes up at least this percentage of the counted words.
    pub overuse_threshold: f64,
    /// Two occurrences at most this many words apart are a close repetition.
    pub repetition_distance: usize,
    /// Leave the profile's stop words out of the counts.
    pub filter_stop_words: bool,
    /// Words shorter than this many characters are ignored.
    pub min_word_len: usize,
}

impl Default for FrequencyOptions {
    fn default() -> Self {
        Self {
            overuse_threshold: 1.5,
            repetition_distance: 50,
            filter_stop_words: true,
            min_word_len: 2,
        }
    }
}

/// How often one word occurs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WordFrequency {
    /// The word, lowercase.
    pub word: String,
    pub count: usize,
    /// Share of the counted words, in percent.
    pub percentage: f64,
    pub overused: bool,
}

/// Two occurrences of the same word close to each other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseRepetition {
    /// The word, lowercase.
    pub word: String,
    /// Word index of the first occurrence.
    pub first: usize,
    /// Word index of the second occurrence.
    pub second: usize,
    /// `second - first`.
    pub distance: usize,
    /// Document range of the second occurrence, when analyzed from a snapshot.
    pub range: Option<TextRange>,
}

#[derive(Debug, Clone)]
struct Occurrence {
    index: usize,
    range: Option<TextRange>,
}

/// Result of one analysis run.
#[derive(Debug, Clone, Default)]
pub struct FrequencyReport {
    total_words: usize,
    frequencies: Vec<WordFrequency>,
    repetitions: Vec<CloseRepetition>,
    occurrences: HashMap<String, Vec<Occurrence>>,
}

impl FrequencyReport {
    /// Words counted (stop words excluded when filtering).
    pub fn total_words(&self) -> usize {
        self.total_words
    }

    /// Distinct words counted.
    pub fn unique_words(&self) -> usize {
        self.frequencies.len()
    }

    /// All frequencies, most frequent first.
    pub fn frequencies(&self) -> &[WordFrequency] {
        &self.frequencies
    }

    /// The `n` most frequent words.
    pub fn top_words(&self, n: usize) -> &[WordFrequency] {
        &self.frequencies[..n.min(self.frequencies.len())]
    }

    /// Words at or above the overuse threshold.
    pub fn overused(&self) -> Vec<&WordFrequency> {
        self.frequencies.iter().filter(|f| f.overused).collect()
    }

    /// Close repetitions, closest first.
    pub fn repetitions(&self) -> &[CloseRepetition] {
        &self.repetitions
    }

    /// Frequency of `word` (any case); a zero count if it never occurs.
    pub fn frequency_of(&self, word: &str) -> WordFrequency {
        let word = word.to_lowercase();
        self.frequencies
            .iter()
            .find(|f| f.word == word)
            .cloned()
            .unwrap_or(WordFrequency {
                word,
                count: 0,
                percentage: 0.0,
                overused: false,
            })
    }

    /// Word indices of `word` (any case).
    pub fn positions_of(&self, word: &str) -> Vec<usize> {
        self.occurrences
            .get(&word.to_lowercase())
            .map(|occ| occ.iter().map(|o| o.index).collect())
            .unwrap_or_default()
    }

    /// Document ranges of `word` (any case). Empty for reports built from plain text.
    pub fn ranges_of(&self, word: &str) -> Vec<TextRange> {
        self.occurrences
            .get(&word.to_lowercase())
            .map(|occ| occ.iter().filter_map(|o| o.range).collect())
            .unwrap_or_default()
    }
}

/// Counts words of a text against a language profile.
#[derive(Debug, Clone)]
pub struct WordFrequencyAnalyzer {
    profile: &'static LanguageProfile,
    options: FrequencyOptions,
}

impl WordFrequencyAnalyzer {
    pub fn new(profile: &'static LanguageProfile, options: FrequencyOptions) -> Self {
        Self { profile, options }
    }

    /// Analyzer for a language code, English if the code is unknown.
    pub fn for_language(code: &str) -> Self {
        Self::new(folio_lang::profile_or_default(code), FrequencyOptions::default())
    }

    pub fn options(&self) -> FrequencyOptions {
        self.options
    }

    pub fn profile(&self) -> &'static LanguageProfile {
        self.profile
    }

    /// Analyze free text.
    pub fn analyze_text(&self, text: &str) -> FrequencyReport {
        let mut builder = ReportBuilder::new(self);
        builder.add_paragraph(text, |_, _| None);
        builder.finish()
    }

    /// Analyze a snapshot; occurrences keep their document ranges. Checks `token` between
    /// paragraphs.
    pub fn analyze_snapshot(
        &self,
        snapshot: &TextSnapshot,
        token: &CancellationToken,
    ) -> Result<FrequencyReport, AnalysisError> {
        let mut builder = ReportBuilder::new(self);
        for (paragraph, text) in snapshot.paragraphs() {
            token.check()?;
            builder.add_paragraph(&text, |start, end| {
                Some(TextRange::in_paragraph(paragraph, start, end))
            });
        }
        Ok(builder.finish())
    }
}

struct ReportBuilder<'a> {
    analyzer: &'a WordFrequencyAnalyzer,
    index: usize,
    counted: usize,
    occurrences: HashMap<String, Vec<Occurrence>>,
}

impl<'a> ReportBuilder<'a> {
    fn new(analyzer: &'a WordFrequencyAnalyzer) -> Self {
        Self {
            analyzer,
            index: 0,
            counted: 0,
            occurrences: HashMap::new(),
        }
    }

    fn add_paragraph(&mut self, text: &str, to_range: impl Fn(usize, usize) -> Option<TextRange>) {
        let options = self.analyzer.options;
        let mut chars_before = 0;
        let mut last_byte = 0;
        for m in WORD.find_iter(text) {
            chars_before += text[last_byte..m.start()].chars().count();
            let len = m.as_str().chars().count();
            let (start, end) = (chars_before, chars_before + len);
            chars_before = end;
            last_byte = m.end();

            let word = m.as_str().to_lowercase();
            if len < options.min_word_len {
                continue;
            }
            let index = self.index;
            self.index += 1;
            if options.filter_stop_words && self.analyzer.profile.is_stop_word(&word) {
                continue;
            }
            self.counted += 1;
            self.occurrences.entry(word).or_default().push(Occurrence {
                index,
                range: to_range(start, end),
            });
        }
    }

    fn finish(self) -> FrequencyReport {
        let options = self.analyzer.options;
        let total = self.counted;
        let mut frequencies: Vec<WordFrequency> = self
            .occurrences
            .iter()
            .map(|(word, occ)| {
                let percentage = if total > 0 {
                    100.0 * occ.len() as f64 / total as f64
                } else {
                    0.0
                };
                WordFrequency {
                    word: word.clone(),
                    count: occ.len(),
                    percentage,
                    overused: percentage >= options.overuse_threshold,
                }
            })
            .collect();
        frequencies.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.word.cmp(&b.word)));

        let mut repetitions = Vec::new();
        for (word, occ) in &self.occurrences {
            for pair in occ.windows(2) {
                let distance = pair[1].index - pair[0].index;
                if distance <= options.repetition_distance {
                    repetitions.push(CloseRepetition {
                        word: word.clone(),
                        first: pair[0].index,
                        second: pair[1].index,
                        distance,
                        range: pair[1].range,
                    });
                }
            }
        }
        repetitions.sort_by_key(|r| (r.distance, r.first));
        log::debug!(
            "word frequency: {} counted, {} unique, {} repetitions",
            total,
            frequencies.len(),
            repetitions.len()
        );

        FrequencyReport {
            total_words: total,
            frequencies,
            repetitions,
            occurrences: self.occurrences,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_core::Document;
    use pretty_assertions::assert_eq;

    fn options(filter: bool) -> FrequencyOptions {
        FrequencyOptions {
            filter_stop_words: filter,
            ..FrequencyOptions::default()
        }
    }

    #[test]
    fn test_counts_and_ordering() {
        let analyzer = WordFrequencyAnalyzer::new(&folio_lang::ENGLISH, options(true));
        let report = analyzer.analyze_text("The whale, the WHALE! A white whale and a sea.");
        assert_eq!(report.total_words(), 5);
        assert_eq!(report.unique_words(), 3);
        let top = report.top_words(1);
        assert_eq!(top[0].word, "whale");
        assert_eq!(top[0].count, 3);
        assert_eq!(top[0].percentage, 60.0);
        assert!(top[0].overused);
        assert_eq!(report.frequency_of("Sea").count, 1);
        assert_eq!(report.frequency_of("kraken").count, 0);
        assert_eq!(report.positions_of("whale"), vec![1, 3, 5]);
    }

    #[test]
    fn test_stop_words_kept_when_not_filtering() {
        let analyzer = WordFrequencyAnalyzer::new(&folio_lang::ENGLISH, options(false));
        let report = analyzer.analyze_text("the cat and the hat");
        assert_eq!(report.total_words(), 5);
        assert_eq!(report.frequency_of("the").count, 2);
    }

    #[test]
    fn test_close_repetitions() {
        let analyzer = WordFrequencyAnalyzer::new(
            &folio_lang::ENGLISH,
            FrequencyOptions {
                repetition_distance: 3,
                ..FrequencyOptions::default()
            },
        );
        let report = analyzer.analyze_text("dark night dark sky quiet lonely moon night");
        assert_eq!(
            report
                .repetitions()
                .iter()
                .map(|r| (r.word.as_str(), r.first, r.second))
                .collect::<Vec<_>>(),
            vec![("dark", 0, 2)]
        );
    }

    #[test]
    fn test_snapshot_occurrences_map_to_ranges() {
        let doc = Document::from_plain_text("Żółw idzie.\nWolny żółw!");
        let (a, b) = (doc.body()[0], doc.body()[1]);
        let analyzer = WordFrequencyAnalyzer::for_language("pl");
        let report = analyzer
            .analyze_snapshot(&doc.snapshot(), &CancellationToken::new())
            .unwrap();
        assert_eq!(
            report.ranges_of("żółw"),
            vec![TextRange::in_paragraph(a, 0, 4), TextRange::in_paragraph(b, 6, 10)]
        );
        assert_eq!(report.repetitions()[0].range, Some(TextRange::in_paragraph(b, 6, 10)));
    }

    #[test]
    fn test_cancelled_snapshot_analysis() {
        let doc = Document::from_plain_text("some words");
        let token = CancellationToken::new();
        token.cancel();
        let analyzer = WordFrequencyAnalyzer::for_language("en");
        assert_eq!(
            analyzer.analyze_snapshot(&doc.snapshot(), &token).unwrap_err(),
            AnalysisError::Cancelled
        );
    }
}
