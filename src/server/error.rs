//! Error responses for the HTTP API

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::error::IntakeError;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Intake(#[from] IntakeError),

    #[error("File size exceeds the {0} byte limit")]
    UploadTooLarge(u64),

    #[error("No file part")]
    NoFilePart,

    #[error("File ID not provided")]
    MissingFileId,

    #[error("{0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Compression failed: {0}")]
    Compression(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: &'static str,
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Intake(IntakeError::SizeLimitExceeded { .. }) | AppError::UploadTooLarge(_) => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            AppError::Intake(_)
            | AppError::NoFilePart
            | AppError::MissingFileId
            | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Compression(_) | AppError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AppError::Intake(IntakeError::NoFileSelected) => "NO_FILE_SELECTED",
            AppError::Intake(IntakeError::UnsupportedFileType(_)) => "INVALID_FILE_TYPE",
            AppError::Intake(IntakeError::SizeLimitExceeded { .. }) | AppError::UploadTooLarge(_) => {
                "FILE_TOO_LARGE"
            }
            AppError::NoFilePart => "NO_FILE_PART",
            AppError::MissingFileId => "MISSING_FILE_ID",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::Compression(_) => "COMPRESSION_FAILED",
            AppError::Io(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error = match &self {
            AppError::Io(e) => {
                tracing::error!("IO error: {}", e);
                "Server error occurred".to_string()
            }
            AppError::Compression(msg) => {
                tracing::error!("Compression error: {}", msg);
                self.to_string()
            }
            _ => self.to_string(),
        };

        let body = Json(ErrorResponse {
            error,
            code: self.code(),
        });
        (status, body).into_response()
    }
}
