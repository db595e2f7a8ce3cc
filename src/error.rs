//! Pipeline Error Types

use crate::backend::BackendError;
use crate::document::Section;
use crate::parser::ParseError;
use crate::store::StoreError;

/// Error raised by any pipeline stage
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("{label}: backend still failing after {attempts} attempts")]
    BackendExhausted {
        label: String,
        attempts: usize,
        #[source]
        source: BackendError,
    },

    #[error("{label}: {source}")]
    BackendRejected {
        label: String,
        #[source]
        source: BackendError,
    },

    #[error("Section parsing failed: {0}")]
    Parse(#[from] ParseError),

    #[error("Analysis of section {section} failed")]
    SectionFanoutFailure {
        section: Section,
        #[source]
        source: Box<AnalysisError>,
    },

    #[error("Section {0} was dispatched more than once")]
    DuplicateTask(Section),

    #[error("Worker task ended abnormally: {0}")]
    WorkerLost(String),

    #[error("Summaries failed for pages {failed_pages:?}")]
    PageSummaryFailure {
        failed_pages: Vec<usize>,
        #[source]
        source: Box<AnalysisError>,
    },

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

impl AnalysisError {
    /// Number of backend attempts behind this failure, when known
    pub fn attempts(&self) -> Option<usize> {
        match self {
            Self::BackendExhausted { attempts, .. } => Some(*attempts),
            Self::SectionFanoutFailure { source, .. } | Self::PageSummaryFailure { source, .. } => {
                source.attempts()
            }
            _ => None,
        }
    }

    /// Whether the parser rejected the document
    pub fn is_parse_error(&self) -> bool {
        matches!(self, Self::Parse(_))
    }
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, AnalysisError>;
