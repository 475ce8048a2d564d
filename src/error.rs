//! Error types
//!
//! `CompressError` is what the orchestrator can surface, `EngineError` is what
//! the document engine reports, and `IntakeError` covers file intake checks
//! made before a document ever reaches the orchestrator.

use thiserror::Error;

use crate::types::StrategyKind;

/// Errors surfaced by the compression core.
#[derive(Debug, Error)]
pub enum CompressError {
    /// The input cannot be opened as a PDF at all.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    /// One strategy failed internally. Always recovered inside the
    /// orchestrator; exposed so progress observers can report it.
    #[error("{strategy} strategy failed: {reason}")]
    StrategyFailure {
        strategy: StrategyKind,
        reason: String,
    },
}

/// Errors reported by a [`DocumentEngine`](crate::engine::DocumentEngine).
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Failed to load PDF: {0}")]
    Load(String),

    #[error("Page {0} not found")]
    PageNotFound(usize),

    #[error("Render error: {0}")]
    Render(String),

    #[error("Image error: {0}")]
    Image(String),

    #[error("Failed to save PDF: {0}")]
    Save(String),

    /// The engine lacks the capability altogether (e.g. no rasterizer).
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl From<lopdf::Error> for EngineError {
    fn from(err: lopdf::Error) -> Self {
        EngineError::Save(err.to_string())
    }
}

impl From<image::ImageError> for EngineError {
    fn from(err: image::ImageError) -> Self {
        EngineError::Image(err.to_string())
    }
}

/// Boundary-level rejections of a submitted file.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IntakeError {
    #[error("No file selected")]
    NoFileSelected,

    #[error("Only PDF files are supported: {0}")]
    UnsupportedFileType(String),

    #[error("File size of {size} bytes exceeds the {max} byte limit")]
    SizeLimitExceeded { size: u64, max: u64 },
}

pub type Result<T> = std::result::Result<T, CompressError>;
