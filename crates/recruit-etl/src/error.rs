//! Pipeline error types
//!
//! Every failure inside the pipeline is one of four kinds. The kind decides the
//! retry policy: extraction and load failures are transient and retried by the
//! orchestrator, transform and validation failures are not.

use recruit_common::CommonError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for pipeline operations
pub type EtlResult<T> = std::result::Result<T, EtlError>;

/// Pipeline stage a failure is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Extract,
    Transform,
    Load,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Extract => "extract",
            PipelineStage::Transform => "transform",
            PipelineStage::Load => "load",
        }
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse error classification reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    #[serde(rename = "ExtractionError")]
    Extraction,
    #[serde(rename = "TransformError")]
    Transform,
    #[serde(rename = "LoadError")]
    Load,
    #[serde(rename = "ValidationError")]
    Validation,
}

/// Pipeline error
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EtlError {
    /// Upstream read failure, timeout, or malformed page
    #[error("Extraction failed: {0}")]
    Extraction(String),

    /// A chunk computation failed; deterministic, never retried
    #[error("Transform failed: {0}")]
    Transform(String),

    /// Transactional write or bulk index failure
    #[error("Load failed: {0}")]
    Load(String),

    /// Invalid input: bad date range, malformed record, bad parameter
    #[error("Validation failed: {0}")]
    Validation(String),
}

impl EtlError {
    pub fn extraction(message: impl Into<String>) -> Self {
        Self::Extraction(message.into())
    }

    pub fn transform(message: impl Into<String>) -> Self {
        Self::Transform(message.into())
    }

    pub fn load(message: impl Into<String>) -> Self {
        Self::Load(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Wrap a store error that occurred while reading
    pub fn extraction_from(context: &str, err: impl std::fmt::Display) -> Self {
        Self::Extraction(format!("{}: {}", context, err))
    }

    /// Wrap a store error that occurred while writing
    pub fn load_from(context: &str, err: impl std::fmt::Display) -> Self {
        Self::Load(format!("{}: {}", context, err))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            EtlError::Extraction(_) => ErrorKind::Extraction,
            EtlError::Transform(_) => ErrorKind::Transform,
            EtlError::Load(_) => ErrorKind::Load,
            EtlError::Validation(_) => ErrorKind::Validation,
        }
    }

    /// The underlying message without the kind prefix
    pub fn message(&self) -> &str {
        match self {
            EtlError::Extraction(m)
            | EtlError::Transform(m)
            | EtlError::Load(m)
            | EtlError::Validation(m) => m,
        }
    }

    /// Whether the orchestrator may retry the failed stage
    pub fn is_retryable(&self) -> bool {
        matches!(self, EtlError::Extraction(_) | EtlError::Load(_))
    }
}

impl From<CommonError> for EtlError {
    fn from(err: CommonError) -> Self {
        EtlError::Validation(err.to_string())
    }
}

/// An [`EtlError`] tagged with the stage it surfaced from
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{stage} stage failed: {source}")]
pub struct StageError {
    pub stage: PipelineStage,
    #[source]
    pub source: EtlError,
}

impl StageError {
    pub fn new(stage: PipelineStage, source: EtlError) -> Self {
        Self { stage, source }
    }
}
