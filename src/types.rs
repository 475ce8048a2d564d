//! Data model shared by the orchestrator and its callers.

use std::fmt;

use serde::Serialize;

/// Which technique produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    /// Every page re-rendered as one lossy image.
    Deep,
    /// Structural re-save of the existing document.
    Standard,
    /// Deep compression again at lower scale and quality.
    DeepRetry,
    /// Original bytes returned unchanged.
    PassThrough,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Deep => "deep",
            StrategyKind::Standard => "standard",
            StrategyKind::DeepRetry => "deep-retry",
            StrategyKind::PassThrough => "pass-through",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A PDF that the engine managed to open. Immutable once loaded.
#[derive(Debug, Clone)]
pub struct Document {
    bytes: Vec<u8>,
    page_count: usize,
}

impl Document {
    pub(crate) fn from_parts(bytes: Vec<u8>, page_count: usize) -> Self {
        Self { bytes, page_count }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Output of one strategy.
#[derive(Debug, Clone)]
pub struct CompressionAttempt {
    pub bytes: Vec<u8>,
    pub page_count: usize,
    pub strategy: StrategyKind,
    /// Base render scale, for re-render strategies.
    pub scale: Option<f64>,
    /// Lossy image quality in `0.0..=1.0`, when images were re-encoded.
    pub quality: Option<f64>,
}

/// Why the original bytes came back unchanged.
#[derive(Debug, Clone, PartialEq)]
pub enum PassThroughReason {
    /// The document opened but no strategy met its threshold.
    NoStrategyAccepted,
    /// The document could not be opened.
    InvalidDocument(String),
}

#[derive(Debug, Clone)]
enum Outcome {
    Compressed(CompressionAttempt),
    PassThrough {
        bytes: Vec<u8>,
        page_count: Option<usize>,
        reason: PassThroughReason,
    },
}

/// Final outcome of one orchestration call.
#[derive(Debug, Clone)]
pub struct CompressionResult {
    original_size: usize,
    outcome: Outcome,
}

impl CompressionResult {
    pub(crate) fn compressed(original_size: usize, attempt: CompressionAttempt) -> Self {
        Self {
            original_size,
            outcome: Outcome::Compressed(attempt),
        }
    }

    pub(crate) fn pass_through(document: Document) -> Self {
        let page_count = document.page_count();
        let bytes = document.into_bytes();
        Self {
            original_size: bytes.len(),
            outcome: Outcome::PassThrough {
                bytes,
                page_count: Some(page_count),
                reason: PassThroughReason::NoStrategyAccepted,
            },
        }
    }

    pub(crate) fn invalid(bytes: Vec<u8>, reason: String) -> Self {
        Self {
            original_size: bytes.len(),
            outcome: Outcome::PassThrough {
                bytes,
                page_count: None,
                reason: PassThroughReason::InvalidDocument(reason),
            },
        }
    }

    pub fn bytes(&self) -> &[u8] {
        match &self.outcome {
            Outcome::Compressed(attempt) => &attempt.bytes,
            Outcome::PassThrough { bytes, .. } => bytes,
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self.outcome {
            Outcome::Compressed(attempt) => attempt.bytes,
            Outcome::PassThrough { bytes, .. } => bytes,
        }
    }

    /// Page count of the returned document, if the input could be opened.
    pub fn page_count(&self) -> Option<usize> {
        match &self.outcome {
            Outcome::Compressed(attempt) => Some(attempt.page_count),
            Outcome::PassThrough { page_count, .. } => *page_count,
        }
    }

    pub fn strategy(&self) -> StrategyKind {
        match &self.outcome {
            Outcome::Compressed(attempt) => attempt.strategy,
            Outcome::PassThrough { .. } => StrategyKind::PassThrough,
        }
    }

    pub fn attempt(&self) -> Option<&CompressionAttempt> {
        match &self.outcome {
            Outcome::Compressed(attempt) => Some(attempt),
            Outcome::PassThrough { .. } => None,
        }
    }

    pub fn pass_through_reason(&self) -> Option<&PassThroughReason> {
        match &self.outcome {
            Outcome::Compressed(_) => None,
            Outcome::PassThrough { reason, .. } => Some(reason),
        }
    }

    /// Compression was skipped and the original bytes are returned.
    pub fn skipped(&self) -> bool {
        matches!(self.outcome, Outcome::PassThrough { .. })
    }

    pub fn original_size(&self) -> usize {
        self.original_size
    }

    pub fn stats(&self) -> CompressionStats {
        match &self.outcome {
            Outcome::Compressed(attempt) => {
                CompressionStats::new(self.original_size, attempt.bytes.len())
            }
            Outcome::PassThrough { .. } => CompressionStats::unchanged(self.original_size),
        }
    }
}

/// Size figures reported to the user.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressionStats {
    pub original_size: usize,
    pub compressed_size: usize,
    pub percent_reduction: f64,
    pub compression_ratio: f64,
}

impl CompressionStats {
    pub fn new(original_size: usize, compressed_size: usize) -> Self {
        if original_size == 0 {
            return Self::unchanged(original_size);
        }
        let original = original_size as f64;
        let compressed = compressed_size as f64;
        Self {
            original_size,
            compressed_size,
            percent_reduction: (1.0 - compressed / original) * 100.0,
            compression_ratio: original / compressed.max(f64::EPSILON),
        }
    }

    pub fn unchanged(size: usize) -> Self {
        Self {
            original_size: size,
            compressed_size: size,
            percent_reduction: 0.0,
            compression_ratio: 1.0,
        }
    }
}

/// Bytes to MiB, rounded to two decimals.
pub fn size_in_mb(bytes: usize) -> f64 {
    round2(bytes as f64 / 1_048_576.0)
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_half_size() {
        let stats = CompressionStats::new(1000, 500);
        assert_eq!(stats.percent_reduction, 50.0);
        assert_eq!(stats.compression_ratio, 2.0);
    }

    #[test]
    fn test_stats_zero_compressed_does_not_divide_by_zero() {
        let stats = CompressionStats::new(1000, 0);
        assert_eq!(stats.percent_reduction, 100.0);
        assert!(stats.compression_ratio.is_finite());
    }

    #[test]
    fn test_stats_empty_original() {
        let stats = CompressionStats::new(0, 0);
        assert_eq!(stats.percent_reduction, 0.0);
        assert_eq!(stats.compression_ratio, 1.0);
    }

    #[test]
    fn test_invalid_pass_through_reports_zero_reduction() {
        let result = CompressionResult::invalid(b"junk".to_vec(), "bad header".into());
        assert!(result.skipped());
        assert_eq!(result.bytes(), b"junk");
        assert_eq!(result.page_count(), None);
        assert_eq!(result.stats(), CompressionStats::unchanged(4));
        assert_eq!(result.strategy(), StrategyKind::PassThrough);
    }

    #[test]
    fn test_size_in_mb() {
        assert_eq!(size_in_mb(1_048_576), 1.0);
        assert_eq!(size_in_mb(1_572_864), 1.5);
        assert_eq!(size_in_mb(0), 0.0);
    }
}
