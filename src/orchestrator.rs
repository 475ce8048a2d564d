//! Multi-strategy compression with fallback.
//!
//! Strategies run in a fixed order and the first one whose output passes its
//! acceptance threshold wins. A strategy that errors or panics counts as
//! rejected; if nothing is accepted the original bytes come back unchanged.

use std::panic::{self, AssertUnwindSafe};

use crate::config::{CompressionConfig, RenderParams};
use crate::engine::{DocumentBuilder, DocumentEngine, ImageFormat, SourceDocument};
use crate::error::{CompressError, EngineError, Result};
use crate::types::{CompressionAttempt, CompressionResult, CompressionStats, Document, StrategyKind};

/// Scale for a page whose larger side measures `max(width, height)` at
/// scale 1.0. Larger pages get a smaller fraction of `base_scale`.
pub fn determine_optimal_scale(width: f64, height: f64, base_scale: f64) -> f64 {
    let max_dimension = width.max(height);
    if max_dimension > 5000.0 {
        base_scale * 0.5
    } else if max_dimension > 3000.0 {
        base_scale * 0.7
    } else if max_dimension > 2000.0 {
        base_scale * 0.8
    } else {
        base_scale
    }
}

/// How a step produces its candidate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Strategy {
    /// Render each page to a raster and rebuild the document from images.
    Rerender(RenderParams),
    /// Re-serialize the document as it is.
    Resave,
}

/// One entry of the fallback chain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrategyStep {
    pub kind: StrategyKind,
    pub strategy: Strategy,
    /// Largest accepted `compressed / original` ratio.
    pub max_ratio: f64,
}

impl StrategyStep {
    pub fn accepts(&self, original_len: usize, candidate_len: usize) -> bool {
        candidate_len as f64 <= self.max_ratio * original_len as f64
    }
}

/// Notifications emitted while a document is being compressed.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Started { size: usize, pages: usize },
    StrategyStarted(StrategyKind),
    PageProcessed { page: usize, total: usize },
    StrategyRejected { kind: StrategyKind, reason: String },
    Finished { strategy: StrategyKind, stats: CompressionStats },
}

impl ProgressEvent {
    /// Status line suitable for a progress display.
    pub fn message(&self) -> String {
        match self {
            ProgressEvent::Started { pages, .. } => format!("Compressing PDF ({} pages)...", pages),
            ProgressEvent::StrategyStarted(StrategyKind::Deep) => {
                "Performing deep compression...".to_string()
            }
            ProgressEvent::StrategyStarted(StrategyKind::Standard) => {
                "Optimizing document structure...".to_string()
            }
            ProgressEvent::StrategyStarted(StrategyKind::DeepRetry) => {
                "Applying maximum compression...".to_string()
            }
            ProgressEvent::StrategyStarted(StrategyKind::PassThrough) => {
                "Keeping original document...".to_string()
            }
            ProgressEvent::PageProcessed { page, total } => {
                format!("Compressing page {} of {}...", page + 1, total)
            }
            ProgressEvent::StrategyRejected { kind, reason } => {
                format!("{} compression rejected: {}", kind, reason)
            }
            ProgressEvent::Finished { strategy, stats } => {
                if *strategy == StrategyKind::PassThrough {
                    "Compression skipped".to_string()
                } else {
                    format!("Reduced by {:.2}%", stats.percent_reduction)
                }
            }
        }
    }

    /// Rough completion fraction, `0.0..=1.0`.
    pub fn fraction(&self) -> f64 {
        match self {
            ProgressEvent::Started { .. } => 0.0,
            ProgressEvent::StrategyStarted(_) => 0.1,
            ProgressEvent::PageProcessed { page, total } => {
                0.1 + 0.8 * (*page + 1) as f64 / (*total).max(1) as f64
            }
            ProgressEvent::StrategyRejected { .. } => 0.1,
            ProgressEvent::Finished { .. } => 1.0,
        }
    }
}

pub trait ProgressObserver {
    fn on_progress(&self, event: &ProgressEvent);
}

impl<F: Fn(&ProgressEvent)> ProgressObserver for F {
    fn on_progress(&self, event: &ProgressEvent) {
        self(event)
    }
}

/// Tries each strategy of the plan and keeps the first accepted result.
pub struct CompressionOrchestrator<E> {
    engine: E,
    plan: Vec<StrategyStep>,
    config: CompressionConfig,
    observer: Option<Box<dyn ProgressObserver>>,
}

impl<E: DocumentEngine> CompressionOrchestrator<E> {
    pub fn new(engine: E) -> Self {
        Self::with_config(engine, CompressionConfig::default())
    }

    pub fn with_config(engine: E, config: CompressionConfig) -> Self {
        Self {
            engine,
            plan: plan(&config),
            config,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: impl ProgressObserver + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn plan(&self) -> &[StrategyStep] {
        &self.plan
    }

    /// Compresses `bytes`. Only [`CompressError::InvalidDocument`] escapes;
    /// every strategy failure is absorbed.
    pub fn compress(&self, bytes: &[u8]) -> Result<CompressionResult> {
        let document = self.open(bytes.to_vec()).map_err(|(_, e)| e)?;
        Ok(self.compress_document(document))
    }

    /// Like [`compress`](Self::compress), but an unreadable input comes back
    /// as a pass-through result with zero reduction.
    pub fn compress_or_passthrough(&self, bytes: Vec<u8>) -> CompressionResult {
        match self.open(bytes) {
            Ok(document) => self.compress_document(document),
            Err((bytes, e)) => {
                let reason = match e {
                    CompressError::InvalidDocument(reason) => reason,
                    other => other.to_string(),
                };
                log::warn!("Passing document through unchanged: {}", reason);
                let result = CompressionResult::invalid(bytes, reason);
                self.notify(ProgressEvent::Finished {
                    strategy: StrategyKind::PassThrough,
                    stats: result.stats(),
                });
                result
            }
        }
    }

    fn open(&self, bytes: Vec<u8>) -> std::result::Result<Document, (Vec<u8>, CompressError)> {
        if bytes.is_empty() {
            return Err((bytes, CompressError::InvalidDocument("empty input".to_string())));
        }
        let loaded = panic::catch_unwind(AssertUnwindSafe(|| self.engine.open_document(&bytes)))
            .unwrap_or_else(|_| Err(EngineError::Load("engine panicked".to_string())));
        match loaded {
            Ok(handle) => {
                let page_count = handle.page_count();
                Ok(Document::from_parts(bytes, page_count))
            }
            Err(e) => Err((bytes, CompressError::InvalidDocument(e.to_string()))),
        }
    }

    fn compress_document(&self, document: Document) -> CompressionResult {
        let original_len = document.len();
        log::debug!(
            "Compressing {} bytes, {} pages",
            original_len,
            document.page_count()
        );
        self.notify(ProgressEvent::Started {
            size: original_len,
            pages: document.page_count(),
        });

        for step in &self.plan {
            self.notify(ProgressEvent::StrategyStarted(step.kind));
            match self.attempt(&document, step) {
                Ok(attempt) => {
                    let stats = CompressionStats::new(original_len, attempt.bytes.len());
                    log::info!(
                        "{} compression accepted: {} -> {} bytes ({:.2}% reduction)",
                        step.kind,
                        original_len,
                        attempt.bytes.len(),
                        stats.percent_reduction
                    );
                    self.notify(ProgressEvent::Finished {
                        strategy: step.kind,
                        stats,
                    });
                    return CompressionResult::compressed(original_len, attempt);
                }
                Err(e) => {
                    let reason = match e {
                        CompressError::StrategyFailure { reason, .. } => reason,
                        other => other.to_string(),
                    };
                    log::debug!("{} compression rejected: {}", step.kind, reason);
                    self.notify(ProgressEvent::StrategyRejected {
                        kind: step.kind,
                        reason,
                    });
                }
            }
        }

        log::info!("No compression strategy reduced the document enough; keeping original");
        let result = CompressionResult::pass_through(document);
        self.notify(ProgressEvent::Finished {
            strategy: StrategyKind::PassThrough,
            stats: result.stats(),
        });
        result
    }

    /// Runs one step and validates its output. Errors and panics both come
    /// back as `StrategyFailure`.
    fn attempt(&self, document: &Document, step: &StrategyStep) -> Result<CompressionAttempt> {
        let fail = |reason: String| CompressError::StrategyFailure {
            strategy: step.kind,
            reason,
        };

        let produced = match panic::catch_unwind(AssertUnwindSafe(|| self.produce(document, step))) {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => {
                log::warn!("{} compression failed: {}", step.kind, e);
                return Err(fail(e.to_string()));
            }
            Err(_) => {
                log::warn!("{} compression panicked", step.kind);
                return Err(fail("panicked".to_string()));
            }
        };

        let reopened = panic::catch_unwind(AssertUnwindSafe(|| self.engine.open_document(&produced)))
            .map_err(|_| fail("output check panicked".to_string()))?
            .map_err(|e| fail(format!("output does not reopen: {}", e)))?;
        let page_count = reopened.page_count();

        if page_count != document.page_count() {
            return Err(fail(format!(
                "page count changed from {} to {}",
                document.page_count(),
                page_count
            )));
        }
        if !step.accepts(document.len(), produced.len()) {
            return Err(fail(format!(
                "{} bytes is above {:.0}% of {}",
                produced.len(),
                step.max_ratio * 100.0,
                document.len()
            )));
        }

        let (scale, quality) = match step.strategy {
            Strategy::Rerender(params) => (Some(params.scale), Some(params.quality)),
            Strategy::Resave => (
                None,
                self.config
                    .save
                    .recompress_images
                    .map(|images| images.quality as f64 / 100.0),
            ),
        };

        Ok(CompressionAttempt {
            bytes: produced,
            page_count,
            strategy: step.kind,
            scale,
            quality,
        })
    }

    fn produce(
        &self,
        document: &Document,
        step: &StrategyStep,
    ) -> std::result::Result<Vec<u8>, EngineError> {
        let source = self.engine.open_document(document.bytes())?;
        match step.strategy {
            Strategy::Rerender(params) => self.rerender(&source, params),
            Strategy::Resave => self.engine.re_save(&source, &self.config.save),
        }
    }

    /// Rebuilds the document from one JPEG per page, in page order. A page
    /// that fails to render is left blank; a missing rasterizer aborts.
    fn rerender(
        &self,
        source: &E::Handle,
        params: RenderParams,
    ) -> std::result::Result<Vec<u8>, EngineError> {
        let total = source.page_count();
        let mut builder = self.engine.create_document();
        let mut rendered = 0;

        for index in 0..total {
            let page = source.page(index)?;
            builder.add_page(page.width, page.height);

            let scale = determine_optimal_scale(page.width, page.height, params.scale);
            log::debug!(
                "Rendering page {} at scale {:.2} ({:.0}x{:.0})",
                index + 1,
                scale,
                page.width * scale,
                page.height * scale
            );

            let drawn = self
                .engine
                .render_page(source, &page, scale)
                .and_then(|raster| self.engine.encode_image(&raster, ImageFormat::Jpeg, params.quality))
                .and_then(|jpeg| builder.draw_image(&jpeg, 0.0, 0.0, page.width, page.height));

            match drawn {
                Ok(()) => rendered += 1,
                Err(e @ EngineError::Unsupported(_)) => return Err(e),
                Err(e) => log::warn!("Page {} not re-rendered: {}", index + 1, e),
            }
            self.notify(ProgressEvent::PageProcessed { page: index, total });
        }

        if total > 0 && rendered == 0 {
            return Err(EngineError::Render("no page could be rendered".to_string()));
        }
        builder.save(&self.config.save)
    }

    fn notify(&self, event: ProgressEvent) {
        if let Some(observer) = &self.observer {
            observer.on_progress(&event);
        }
    }
}

/// The fallback chain: deep, then standard, then a lower-quality deep retry.
/// Iterating it in order and stopping at the first accepted attempt means
/// the retry only runs when the standard re-save fell short.
pub fn plan(config: &CompressionConfig) -> Vec<StrategyStep> {
    vec![
        StrategyStep {
            kind: StrategyKind::Deep,
            strategy: Strategy::Rerender(config.deep),
            max_ratio: config.deep_max_ratio,
        },
        StrategyStep {
            kind: StrategyKind::Standard,
            strategy: Strategy::Resave,
            max_ratio: config.standard_max_ratio,
        },
        StrategyStep {
            kind: StrategyKind::DeepRetry,
            strategy: Strategy::Rerender(config.retry),
            max_ratio: config.retry_max_ratio,
        },
    ]
}
