use std::ops::Range;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("regex error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("{stage} extraction unavailable after {attempts} attempt(s): {reason}")]
    ExtractionUnavailable {
        stage: &'static str,
        attempts: u32,
        reason: String,
    },

    #[error("no table candidate found in raw text of pages {pages:?}")]
    NoTableFound { pages: Vec<u32> },

    #[error("splice spans overlap: {first:?} and {second:?}")]
    SpliceConflict {
        first: Range<usize>,
        second: Range<usize>,
    },

    #[error("splice span {span:?} is not valid for a document of {len} bytes")]
    InvalidSpan { span: Range<usize>, len: usize },

    #[error("page {0} is not in the page text store")]
    MissingPage(u32),

    #[error("table group task failed: {0}")]
    GroupTask(String),

    #[error("table summarization unavailable: {0}")]
    SummarizationUnavailable(String),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Raw-text extraction shares the pipeline error type.
pub type IngestError = ReconcileError;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("request failed: {0}")]
    Request(String),

    #[error("{service} did not answer within {after:?}")]
    Timeout {
        service: &'static str,
        after: Duration,
    },
}

pub type Result<T, E = ReconcileError> = std::result::Result<T, E>;
