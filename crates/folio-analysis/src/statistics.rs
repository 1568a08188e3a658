//! Document statistics and writing-session tracking.

use std::sync::Arc;

use folio_core::{Clock, OBJECT_REPLACEMENT, TextSnapshot};
use serde::Serialize;
use unicode_segmentation::UnicodeSegmentation;

/// Reading speed used for the reading time estimate.
pub const WORDS_PER_MINUTE: usize = 200;

/// Gaps between edits longer than this do not count as active writing time.
pub const IDLE_THRESHOLD_MS: u64 = 2 * 60 * 1000;

/// Number of words in `text` (Unicode word boundaries).
pub fn count_words(text: &str) -> usize {
    text.unicode_words().count()
}

/// Counts over one snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DocumentStatistics {
    /// Generation of the snapshot.
    pub generation: u64,
    /// Words.
    pub words: usize,
    /// Characters, paragraph breaks and inline elements excluded.
    pub characters: usize,
    /// Characters that are not whitespace.
    pub characters_no_spaces: usize,
    /// Paragraphs, including those inside table cells.
    pub paragraphs: usize,
}

impl DocumentStatistics {
    /// Count `snapshot`.
    pub fn collect(snapshot: &TextSnapshot) -> Self {
        let mut stats = Self {
            generation: snapshot.generation(),
            paragraphs: snapshot.paragraph_count(),
            ..Self::default()
        };
        for (_, text) in snapshot.paragraphs() {
            for ch in text.chars().filter(|ch| *ch != OBJECT_REPLACEMENT) {
                stats.characters += 1;
                if !ch.is_whitespace() {
                    stats.characters_no_spaces += 1;
                }
            }
            stats.words += count_words(&text);
        }
        stats
    }

    /// Minutes needed to read the text, rounded up.
    pub fn reading_time_minutes(&self) -> usize {
        self.words.div_ceil(WORDS_PER_MINUTE)
    }
}

/// Words written and deleted since a writing session started.
///
/// Feed it the word count after every drained statistics result; growth counts as written,
/// shrinkage as deleted.
pub struct SessionTracker {
    clock: Arc<dyn Clock>,
    started_ms: u64,
    last_activity_ms: u64,
    last_words: usize,
    written: usize,
    deleted: usize,
    active_ms: u64,
}

impl std::fmt::Debug for SessionTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTracker")
            .field("started_ms", &self.started_ms)
            .field("written", &self.written)
            .field("deleted", &self.deleted)
            .field("active_ms", &self.active_ms)
            .finish_non_exhaustive()
    }
}

impl SessionTracker {
    /// Start a session on a document that currently has `words` words.
    pub fn start(clock: Arc<dyn Clock>, words: usize) -> Self {
        let now = clock.now_ms();
        Self {
            clock,
            started_ms: now,
            last_activity_ms: now,
            last_words: words,
            written: 0,
            deleted: 0,
            active_ms: 0,
        }
    }

    /// Record the current word count.
    pub fn record(&mut self, words: usize) {
        let now = self.clock.now_ms();
        if words == self.last_words {
            return;
        }
        if words > self.last_words {
            self.written += words - self.last_words;
        } else {
            self.deleted += self.last_words - words;
        }
        self.last_words = words;
        let gap = now.saturating_sub(self.last_activity_ms);
        if gap <= IDLE_THRESHOLD_MS {
            self.active_ms += gap;
        }
        self.last_activity_ms = now;
    }

    /// Words added since the session started.
    pub fn words_written(&self) -> usize {
        self.written
    }

    /// Words removed since the session started.
    pub fn words_deleted(&self) -> usize {
        self.deleted
    }

    /// Net change since the session started.
    pub fn net_words(&self) -> isize {
        self.written as isize - self.deleted as isize
    }

    /// Minutes of writing with no gap longer than [`IDLE_THRESHOLD_MS`].
    pub fn active_minutes(&self) -> u64 {
        self.active_ms / 60_000
    }

    /// Minutes since the session started.
    pub fn duration_minutes(&self) -> u64 {
        self.clock.now_ms().saturating_sub(self.started_ms) / 60_000
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_core::markup::parse;
    use folio_core::{Document, ManualClock};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_counts_cover_cells_and_skip_elements() {
        let doc = parse(
            "<p>Call me Ishmael.<obj kind=\"image\">x</obj></p>\
             <table><tr><td><p>Some years ago</p></td></tr></table>",
        )
        .unwrap();
        let stats = DocumentStatistics::collect(&doc.snapshot());
        assert_eq!(
            stats,
            DocumentStatistics {
                generation: doc.generation(),
                words: 6,
                characters: 30,
                characters_no_spaces: 26,
                paragraphs: 2,
            }
        );
        assert_eq!(stats.reading_time_minutes(), 1);
        assert_eq!(DocumentStatistics::collect(&Document::new().snapshot()).reading_time_minutes(), 0);
    }

    #[test]
    fn test_reading_time_rounds_up() {
        let stats = DocumentStatistics {
            words: 401,
            ..DocumentStatistics::default()
        };
        assert_eq!(stats.reading_time_minutes(), 3);
    }

    #[test]
    fn test_session_tracks_written_deleted_and_active_time() {
        let clock = ManualClock::new();
        let mut tracker = SessionTracker::start(Arc::new(clock.clone()), 100);
        clock.advance(60_000);
        tracker.record(130);
        clock.advance(60_000);
        tracker.record(120);
        // A long break is not active time.
        clock.advance(30 * 60_000);
        tracker.record(125);
        assert_eq!(tracker.words_written(), 35);
        assert_eq!(tracker.words_deleted(), 10);
        assert_eq!(tracker.net_words(), 25);
        assert_eq!(tracker.active_minutes(), 2);
        assert_eq!(tracker.duration_minutes(), 32);
    }
}
