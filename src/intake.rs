//! File intake and delivery naming.

use std::path::Path;

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::IntakeError;

lazy_static! {
    static ref PDF_EXTENSION: Regex = Regex::new(r"(?i)\.pdf$").unwrap();
    static ref UNSAFE_NAME_CHARS: Regex = Regex::new(r#"[\\/:*?"<>|\x00-\x1f]"#).unwrap();
}

/// Checks a submitted file before its bytes reach the orchestrator.
pub fn validate_upload(file_name: &str, size: u64, max_size: u64) -> Result<(), IntakeError> {
    let file_name = file_name.trim();
    if file_name.is_empty() {
        return Err(IntakeError::NoFileSelected);
    }
    if !PDF_EXTENSION.is_match(file_name) {
        return Err(IntakeError::UnsupportedFileType(file_name.to_string()));
    }
    if size > max_size {
        return Err(IntakeError::SizeLimitExceeded {
            size,
            max: max_size,
        });
    }
    Ok(())
}

/// `report.PDF` -> `report_compressed.pdf`, safe for a download header.
pub fn compressed_file_name(original: &str) -> String {
    let base = Path::new(original.trim())
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let stem = PDF_EXTENSION.replace(base, "");
    let stem = UNSAFE_NAME_CHARS.replace_all(stem.trim(), "_");
    let stem = if stem.is_empty() { "document" } else { stem.as_ref() };
    format!("{}_compressed.pdf", stem)
}
