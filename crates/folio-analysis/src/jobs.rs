//! Ready-made jobs for the [`AnalysisScheduler`].

use std::sync::Arc;

use folio_core::TextSnapshot;

use crate::error::AnalysisError;
use crate::frequency::{FrequencyReport, WordFrequencyAnalyzer};
use crate::scheduler::{AnalysisScheduler, TaskId};
use crate::service::{Issue, LanguageService};
use crate::statistics::DocumentStatistics;

/// Scheduler key of the statistics job.
pub const STATISTICS: &str = "statistics";
/// Scheduler key of the word frequency job.
pub const FREQUENCY: &str = "frequency";

/// What a finished job produced.
#[derive(Debug, Clone)]
pub enum AnalysisOutput {
    /// Counts from [`SubmitAnalysis::submit_statistics`].
    Statistics(DocumentStatistics),
    /// Report from [`SubmitAnalysis::submit_frequency`].
    Frequency(FrequencyReport),
    /// Findings of a language service.
    Issues {
        /// Name of the service that produced them.
        service: String,
        issues: Vec<Issue>,
    },
}

/// Submission helpers for the stock jobs.
pub trait SubmitAnalysis {
    /// Count words, characters and paragraphs.
    fn submit_statistics(&mut self, snapshot: TextSnapshot) -> TaskId;

    /// Run word frequency analysis.
    fn submit_frequency(&mut self, snapshot: TextSnapshot, analyzer: WordFrequencyAnalyzer) -> TaskId;

    /// Run a language service. Tasks are keyed by the service name.
    fn submit_check(&mut self, snapshot: TextSnapshot, service: Arc<dyn LanguageService>) -> TaskId;
}

impl SubmitAnalysis for AnalysisScheduler<AnalysisOutput> {
    fn submit_statistics(&mut self, snapshot: TextSnapshot) -> TaskId {
        self.submit(STATISTICS, snapshot, |snapshot, token| {
            token.check()?;
            Ok(AnalysisOutput::Statistics(DocumentStatistics::collect(snapshot)))
        })
    }

    fn submit_frequency(&mut self, snapshot: TextSnapshot, analyzer: WordFrequencyAnalyzer) -> TaskId {
        self.submit(FREQUENCY, snapshot, move |snapshot, token| {
            analyzer
                .analyze_snapshot(snapshot, token)
                .map(AnalysisOutput::Frequency)
        })
    }

    fn submit_check(&mut self, snapshot: TextSnapshot, service: Arc<dyn LanguageService>) -> TaskId {
        let key = service.name().to_string();
        self.submit(key, snapshot, move |snapshot, token| {
            let issues = service.check(snapshot, token)?;
            Ok(AnalysisOutput::Issues {
                service: service.name().to_string(),
                issues,
            })
        })
    }
}

impl AnalysisOutput {
    /// The issues, if this is a service result.
    pub fn issues(&self) -> Option<&[Issue]> {
        match self {
            Self::Issues { issues, .. } => Some(issues),
            _ => None,
        }
    }
}

/// Turn a scheduler outcome into `Err(Stale)` when it no longer matches `current`.
pub fn ensure_fresh(produced: u64, current: u64) -> Result<(), AnalysisError> {
    if produced == current {
        Ok(())
    } else {
        Err(AnalysisError::Stale { produced, current })
    }
}
