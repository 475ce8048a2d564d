//! Configuration for the compression plan and the HTTP server.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::engine::{ImageRecompression, SaveOptions};

/// Default upload limit (100 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 100 * 1024 * 1024;

/// Scale and quality for one re-render pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderParams {
    /// Base scale handed to [`determine_optimal_scale`](crate::determine_optimal_scale).
    pub scale: f64,
    /// Lossy image quality, `0.0..=1.0`.
    pub quality: f64,
}

/// Knobs for [`CompressionOrchestrator`](crate::CompressionOrchestrator).
///
/// The acceptance thresholds are empirical: each is the largest allowed
/// `compressed / original` ratio for that strategy's output to be adopted.
#[derive(Debug, Clone, PartialEq)]
pub struct CompressionConfig {
    pub deep: RenderParams,
    pub deep_max_ratio: f64,
    pub standard_max_ratio: f64,
    pub retry: RenderParams,
    pub retry_max_ratio: f64,
    /// Options for the structural re-save and for saving re-rendered output.
    pub save: SaveOptions,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            deep: RenderParams {
                scale: 0.6,
                quality: 0.6,
            },
            deep_max_ratio: 0.7,
            standard_max_ratio: 0.9,
            retry: RenderParams {
                scale: 0.5,
                quality: 0.6,
            },
            retry_max_ratio: 0.8,
            save: SaveOptions::default(),
        }
    }
}

impl CompressionConfig {
    /// Plan used by the CLI and the server: the structural re-save also
    /// recompresses embedded images.
    pub fn with_image_recompression(mut self, settings: ImageRecompression) -> Self {
        self.save.recompress_images = Some(settings);
        self
    }

    /// Applies `PDF_SHRINK_*` overrides for the thresholds and image settings.
    pub fn apply_env(mut self) -> Self {
        if let Some(v) = env_parse("PDF_SHRINK_DEEP_MAX_RATIO") {
            self.deep_max_ratio = v;
        }
        if let Some(v) = env_parse("PDF_SHRINK_STANDARD_MAX_RATIO") {
            self.standard_max_ratio = v;
        }
        if let Some(v) = env_parse("PDF_SHRINK_RETRY_MAX_RATIO") {
            self.retry_max_ratio = v;
        }
        if let Some(images) = self.save.recompress_images.as_mut() {
            if let Some(q) = env_parse("PDF_SHRINK_IMAGE_QUALITY") {
                images.quality = q;
            }
            if let Some(d) = env_parse("PDF_SHRINK_MAX_IMAGE_DIM") {
                images.max_dimension = d;
            }
        }
        self
    }
}

/// HTTP server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_upload_bytes: u64,
    pub temp_dir: PathBuf,
    pub retention: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            temp_dir: env::temp_dir().join("pdf_compressor"),
            retention: Duration::from_secs(60 * 60),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: env::var("PDF_SHRINK_HOST").unwrap_or(defaults.host),
            port: env_parse("PDF_SHRINK_PORT").unwrap_or(defaults.port),
            max_upload_bytes: env_parse::<u64>("PDF_SHRINK_MAX_UPLOAD_MB")
                .map(|mb| mb * 1024 * 1024)
                .unwrap_or(defaults.max_upload_bytes),
            temp_dir: env::var("PDF_SHRINK_TEMP_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.temp_dir),
            retention: env_parse::<u64>("PDF_SHRINK_RETENTION_MINUTES")
                .map(|m| Duration::from_secs(m * 60))
                .unwrap_or(defaults.retention),
        }
    }

    /// How often the temp directory sweep runs.
    pub fn cleanup_interval(&self) -> Duration {
        (self.retention / 4).max(Duration::from_secs(60))
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    match env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(v) => Some(v),
            Err(_) => {
                log::warn!("Ignoring unparsable {}={:?}", key, raw);
                None
            }
        },
        Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_thresholds() {
        let config = CompressionConfig::default();
        assert_eq!(config.deep_max_ratio, 0.7);
        assert_eq!(config.standard_max_ratio, 0.9);
        assert_eq!(config.retry_max_ratio, 0.8);
        assert_eq!(config.deep.scale, 0.6);
        assert_eq!(config.retry.scale, 0.5);
        assert_eq!(config.retry.quality, 0.6);
        assert!(config.save.recompress_images.is_none());
    }

    #[test]
    fn test_cleanup_interval_has_floor() {
        let config = ServerConfig {
            retention: Duration::from_secs(120),
            ..ServerConfig::default()
        };
        assert_eq!(config.cleanup_interval(), Duration::from_secs(60));
        assert_eq!(
            ServerConfig::default().cleanup_interval(),
            Duration::from_secs(15 * 60)
        );
    }
}
