//! # Folio Analysis
//!
//! Background analysis for Folio manuscripts: statistics, word frequency and language
//! services, scheduled off the editing thread.
//!
//! ## Architecture
//!
//! ```text
//! EditorSession ──snapshot()──▶ AnalysisScheduler ──worker threads──▶ jobs
//!       ▲                              │
//!       └──── mark_questionable ◀── drain(generation) ◀── mpsc ───────┘
//! ```
//!
//! Jobs only see an immutable [`folio_core::TextSnapshot`]. Results are stamped with the
//! snapshot generation and dropped on drain when the document has moved on, so a slow
//! checker can never flag text that is no longer there.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::time::Duration;
//! use folio_analysis::{AnalysisOutput, AnalysisScheduler, SubmitAnalysis};
//! use folio_core::Document;
//!
//! let doc = Document::from_plain_text("Call me Ishmael.");
//! let mut scheduler = AnalysisScheduler::<AnalysisOutput>::new();
//! scheduler.submit_statistics(doc.snapshot());
//!
//! for result in scheduler.drain_until_idle(doc.generation(), Duration::from_secs(5)) {
//!     if let Ok(AnalysisOutput::Statistics(stats)) = result.outcome {
//!         assert_eq!(stats.words, 3);
//!     }
//! }
//! ```

pub mod error;
pub mod frequency;
pub mod jobs;
pub mod scheduler;
pub mod service;
pub mod statistics;

pub use error::AnalysisError;
pub use frequency::{CloseRepetition, FrequencyOptions, FrequencyReport, WordFrequency, WordFrequencyAnalyzer};
pub use jobs::{AnalysisOutput, FREQUENCY, STATISTICS, SubmitAnalysis, ensure_fresh};
pub use scheduler::{AnalysisResult, AnalysisScheduler, CancellationToken, TaskId};
pub use service::{
    DictionarySpellChecker, Issue, IssueKind, LanguageService, MAX_SUGGESTIONS, ServiceHealth, TypographyChecker,
};
pub use statistics::{DocumentStatistics, IDLE_THRESHOLD_MS, SessionTracker, WORDS_PER_MINUTE, count_words};
