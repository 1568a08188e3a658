use thiserror::Error;

/// Failures of background analysis.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalysisError {
    /// A language service could not run (no dictionary, backend down, cooling off after
    /// repeated failures). The document is unaffected.
    #[error("service {service} unavailable: {reason}")]
    ServiceUnavailable {
        /// Service name.
        service: String,
        /// What went wrong.
        reason: String,
    },
    /// The task's cancellation token fired before it finished.
    #[error("analysis cancelled")]
    Cancelled,
    /// The result was computed for an older document generation.
    #[error("result for generation {produced} is stale (document is at {current})")]
    Stale {
        /// Generation the task analyzed.
        produced: u64,
        /// Generation of the document when the result arrived.
        current: u64,
    },
}

impl AnalysisError {
    pub(crate) fn unavailable(service: &str, reason: impl Into<String>) -> Self {
        Self::ServiceUnavailable {
            service: service.to_string(),
            reason: reason.into(),
        }
    }
}
