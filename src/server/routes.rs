use std::io::ErrorKind;

use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, Path, State};
use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::default_engine;
use crate::intake::{compressed_file_name, validate_upload};
use crate::orchestrator::CompressionOrchestrator;
use crate::types::{round2, size_in_mb, StrategyKind};

use super::error::{AppError, Result};
use super::storage::FileKind;
use super::{AppState, CompressionSummary, UploadRecord};

/// Response header naming the strategy that produced a download.
pub const STRATEGY_HEADER: &str = "x-compression-strategy";

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub success: bool,
    pub file_id: String,
    /// MiB
    pub original_size: f64,
    pub original_name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressRequest {
    pub file_id: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressResponse {
    pub success: bool,
    pub file_id: String,
    pub original_size: f64,
    pub compressed_size: f64,
    pub compression_ratio: f64,
    pub percent_reduction: f64,
    pub strategy: StrategyKind,
    pub skipped: bool,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// POST /upload
///
/// Stores the `file` part of a multipart form and returns its id.
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>> {
    let max = state.config().max_upload_bytes;
    let mut file = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, max))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let name = field.file_name().unwrap_or_default().to_string();
        let data = field.bytes().await.map_err(|e| multipart_error(e, max))?;
        file = Some((name, data));
        break;
    }

    let (name, data) = file.ok_or(AppError::NoFilePart)?;
    validate_upload(&name, data.len() as u64, max)?;

    let id = Uuid::new_v4();
    let size = data.len();
    state.store().write(id, FileKind::Original, data.to_vec()).await?;
    state
        .insert_upload(
            id,
            UploadRecord {
                original_name: name.clone(),
                result: None,
            },
        )
        .await;

    tracing::info!(file_id = %id, file_name = %name, size, "Upload stored");

    Ok(Json(UploadResponse {
        success: true,
        file_id: id.to_string(),
        original_size: size_in_mb(size),
        original_name: name,
    }))
}

/// POST /compress
///
/// Compresses a previously uploaded file. A valid upload always yields a
/// downloadable result, even if it is the original bytes.
pub async fn compress(
    State(state): State<AppState>,
    Json(request): Json<CompressRequest>,
) -> Result<Json<CompressResponse>> {
    let raw_id = request
        .file_id
        .filter(|id| !id.is_empty())
        .ok_or(AppError::MissingFileId)?;
    let id = parse_id(&raw_id, "Original file not found")?;

    let original = state
        .store()
        .read(id, FileKind::Original)
        .await
        .map_err(|e| not_found_or(e, "Original file not found"))?;

    let config = state.compression().clone();
    let result = tokio::task::spawn_blocking(move || {
        CompressionOrchestrator::with_config(default_engine(), config)
            .compress_or_passthrough(original)
    })
    .await
    .map_err(|e| AppError::Compression(e.to_string()))?;

    let stats = result.stats();
    let strategy = result.strategy();
    let skipped = result.skipped();
    state
        .store()
        .write(id, FileKind::Compressed, result.into_bytes())
        .await?;
    state
        .set_result(id, CompressionSummary { strategy, stats })
        .await;

    tracing::info!(
        file_id = %id,
        %strategy,
        original = stats.original_size,
        compressed = stats.compressed_size,
        "Compression finished"
    );

    Ok(Json(CompressResponse {
        success: true,
        file_id: id.to_string(),
        original_size: size_in_mb(stats.original_size),
        compressed_size: size_in_mb(stats.compressed_size),
        compression_ratio: round2(stats.compression_ratio),
        percent_reduction: round2(stats.percent_reduction),
        strategy,
        skipped,
    }))
}

/// GET /download/:file_id
pub async fn download(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> Result<Response> {
    let id = parse_id(&file_id, "Compressed file not found")?;
    let data = state
        .store()
        .read(id, FileKind::Compressed)
        .await
        .map_err(|e| not_found_or(e, "Compressed file not found"))?;

    let record = state.upload(id).await;
    let download_name = match &record {
        Some(record) => compressed_file_name(&record.original_name),
        None => format!("{}_compressed.pdf", id),
    };

    let mut response = (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::CONTENT_DISPOSITION, content_disposition(&download_name)),
        ],
        data,
    )
        .into_response();
    if let Some(summary) = record.and_then(|r| r.result) {
        response.headers_mut().insert(
            HeaderName::from_static(STRATEGY_HEADER),
            HeaderValue::from_static(summary.strategy.as_str()),
        );
    }
    Ok(response)
}

/// `attachment` header value. Non-ASCII names get an RFC 5987 `filename*`
/// next to an ASCII fallback.
fn content_disposition(file_name: &str) -> String {
    if file_name.is_ascii() {
        return format!("attachment; filename=\"{}\"", file_name);
    }
    let fallback: String = file_name
        .chars()
        .map(|c| if c.is_ascii() { c } else { '_' })
        .collect();
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        urlencoding::encode(file_name)
    )
}

fn parse_id(raw: &str, missing: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|_| AppError::NotFound(missing.to_string()))
}

fn not_found_or(err: std::io::Error, missing: &str) -> AppError {
    if err.kind() == ErrorKind::NotFound {
        AppError::NotFound(missing.to_string())
    } else {
        AppError::Io(err)
    }
}

fn multipart_error(err: MultipartError, max: u64) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::UploadTooLarge(max)
    } else {
        AppError::BadRequest(err.body_text())
    }
}
