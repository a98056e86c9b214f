//! Error taxonomy for report generation.

/// Errors surfaced by the report pipeline.
///
/// Only `PlanningFailure` and `ModelInvocationExhausted` ever reach the caller of
/// [`crate::report::ReportOrchestrator::run`]; `SectionWriteFailure` is contained
/// by the writer and turned into placeholder content. Search provider failures
/// stay [`crate::search::SearchError`] and are absorbed per query by the researcher.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    /// The model never produced a usable value within the attempt ceiling.
    #[error("model invocation exhausted after {attempts} attempts: {last_error}")]
    ModelInvocationExhausted { attempts: u32, last_error: String },

    /// No valid report outline could be produced.
    #[error("report planning failed: {reason}")]
    PlanningFailure { reason: String },

    /// A section could not be written.
    #[error("failed to write section '{section}': {reason}")]
    SectionWriteFailure { section: String, reason: String },

    /// Missing or invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl ReportError {
    pub fn planning(reason: impl Into<String>) -> Self {
        ReportError::PlanningFailure {
            reason: reason.into(),
        }
    }

    /// Whether this error must abort the whole report.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ReportError::PlanningFailure { .. }
                | ReportError::ModelInvocationExhausted { .. }
                | ReportError::Config(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ReportError>;
