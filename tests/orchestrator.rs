//! Strategy selection against a synthetic engine with predictable sizes.
//!
//! Mock documents are `MOCK` + one page-count byte + padding. A re-rendered
//! page costs `bytes_per_pixel` bytes per raster pixel; a re-save produces
//! `resave_len` bytes.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use image::RgbImage;

use pdf_shrink::engine::{
    DocumentBuilder, DocumentEngine, EncodedImage, ImageFormat, PageHandle, RasterImage,
    SaveOptions, SourceDocument,
};
use pdf_shrink::{
    CompressError, CompressionOrchestrator, EngineError, PassThroughReason, ProgressEvent,
    StrategyKind,
};

const MAGIC: &[u8] = b"MOCK";
const HEADER_LEN: usize = 5;
const PAGE_SIZE: f64 = 100.0;

fn mock_pdf(pages: u8, len: usize) -> Vec<u8> {
    let mut bytes = MAGIC.to_vec();
    bytes.push(pages);
    bytes.resize(len.max(HEADER_LEN), b'x');
    bytes
}

struct MockDoc {
    pages: usize,
    /// Square page sides in points, cycled over the pages.
    sides: Vec<f64>,
}

impl SourceDocument for MockDoc {
    fn page_count(&self) -> usize {
        self.pages
    }

    fn page(&self, index: usize) -> Result<PageHandle, EngineError> {
        if index >= self.pages {
            return Err(EngineError::PageNotFound(index));
        }
        let side = self.sides[index % self.sides.len()];
        Ok(PageHandle {
            index,
            width: side,
            height: side,
        })
    }
}

struct MockBuilder {
    pages: Vec<usize>,
    drop_page: bool,
}

impl DocumentBuilder for MockBuilder {
    fn add_page(&mut self, _width: f64, _height: f64) {
        self.pages.push(0);
    }

    fn draw_image(
        &mut self,
        image: &EncodedImage,
        _x: f64,
        _y: f64,
        _width: f64,
        _height: f64,
    ) -> Result<(), EngineError> {
        let page = self
            .pages
            .last_mut()
            .ok_or_else(|| EngineError::Save("no page".to_string()))?;
        *page += image.data.len();
        Ok(())
    }

    fn save(mut self, _options: &SaveOptions) -> Result<Vec<u8>, EngineError> {
        if self.drop_page {
            self.pages.pop();
        }
        let body: usize = self.pages.iter().sum();
        Ok(mock_pdf(self.pages.len() as u8, HEADER_LEN + body))
    }
}

struct MockEngine {
    bytes_per_pixel: f64,
    resave_len: usize,
    has_rasterizer: bool,
    failing_pages: Vec<usize>,
    drop_page_on_rerender: bool,
    panic_on_resave: bool,
    page_sides: Vec<f64>,
    rasters: Mutex<Vec<(u32, u32)>>,
    renders: AtomicUsize,
    resaves: AtomicUsize,
}

impl MockEngine {
    fn new(bytes_per_pixel: f64, resave_len: usize) -> Self {
        Self {
            bytes_per_pixel,
            resave_len,
            has_rasterizer: true,
            failing_pages: Vec::new(),
            drop_page_on_rerender: false,
            panic_on_resave: false,
            page_sides: vec![PAGE_SIZE],
            rasters: Mutex::new(Vec::new()),
            renders: AtomicUsize::new(0),
            resaves: AtomicUsize::new(0),
        }
    }

    fn renders(&self) -> usize {
        self.renders.load(Ordering::SeqCst)
    }

    fn resaves(&self) -> usize {
        self.resaves.load(Ordering::SeqCst)
    }
}

impl DocumentEngine for MockEngine {
    type Handle = MockDoc;
    type Builder = MockBuilder;

    fn open_document(&self, bytes: &[u8]) -> Result<MockDoc, EngineError> {
        if bytes.len() < HEADER_LEN || !bytes.starts_with(MAGIC) {
            return Err(EngineError::Load("not a mock document".to_string()));
        }
        Ok(MockDoc {
            pages: bytes[4] as usize,
            sides: self.page_sides.clone(),
        })
    }

    fn render_page(
        &self,
        _document: &MockDoc,
        page: &PageHandle,
        scale: f64,
    ) -> Result<RasterImage, EngineError> {
        if !self.has_rasterizer {
            return Err(EngineError::Unsupported("no rasterizer".to_string()));
        }
        self.renders.fetch_add(1, Ordering::SeqCst);
        if self.failing_pages.contains(&page.index) {
            return Err(EngineError::Render(format!("page {} is broken", page.index)));
        }
        let width = ((page.width * scale).round() as u32).max(1);
        let height = ((page.height * scale).round() as u32).max(1);
        self.rasters.lock().unwrap().push((width, height));
        Ok(RgbImage::new(width, height))
    }

    fn encode_image(
        &self,
        image: &RasterImage,
        format: ImageFormat,
        _quality: f64,
    ) -> Result<EncodedImage, EngineError> {
        let pixels = (image.width() * image.height()) as f64;
        Ok(EncodedImage {
            data: vec![0; (pixels * self.bytes_per_pixel).round() as usize],
            format,
            width: image.width(),
            height: image.height(),
        })
    }

    fn create_document(&self) -> MockBuilder {
        MockBuilder {
            pages: Vec::new(),
            drop_page: self.drop_page_on_rerender,
        }
    }

    fn re_save(&self, document: &MockDoc, _options: &SaveOptions) -> Result<Vec<u8>, EngineError> {
        self.resaves.fetch_add(1, Ordering::SeqCst);
        if self.panic_on_resave {
            panic!("re-save blew up");
        }
        Ok(mock_pdf(document.pages as u8, self.resave_len))
    }
}

// At the default scales a 100pt page renders to 60x60 (deep) or 50x50 (retry).
const DEEP_PIXELS: usize = 3600;
const RETRY_PIXELS: usize = 2500;

#[test]
fn test_deep_compression_preferred() {
    let original = mock_pdf(10, 72_010);
    let orchestrator = CompressionOrchestrator::new(MockEngine::new(1.0, 60_000));

    let result = orchestrator.compress(&original).unwrap();

    assert_eq!(result.strategy(), StrategyKind::Deep);
    assert!(!result.skipped());
    assert_eq!(result.page_count(), Some(10));
    assert_eq!(result.bytes().len(), HEADER_LEN + 10 * DEEP_PIXELS);
    let stats = result.stats();
    assert!((stats.percent_reduction - 50.0).abs() < 0.1);
    assert!((stats.compression_ratio - 2.0).abs() < 0.01);
    assert_eq!(orchestrator.engine().resaves(), 0);

    let attempt = result.attempt().unwrap();
    assert_eq!(attempt.scale, Some(0.6));
    assert_eq!(attempt.quality, Some(0.6));
}

#[test]
fn test_standard_adopted_when_deep_falls_short() {
    let original = mock_pdf(4, 10_000);
    // Deep output: 4 * 3600 bytes, well above 70% of the original.
    let orchestrator = CompressionOrchestrator::new(MockEngine::new(1.0, 8_500));

    let result = orchestrator.compress(&original).unwrap();

    assert_eq!(result.strategy(), StrategyKind::Standard);
    assert_eq!(result.bytes().len(), 8_500);
    assert_eq!(result.page_count(), Some(4));
    assert!(result.attempt().unwrap().scale.is_none());
    // The retry never runs once standard is accepted.
    assert_eq!(orchestrator.engine().renders(), 4);
}

#[test]
fn test_threshold_is_inclusive() {
    let original = mock_pdf(1, 10_000);
    let orchestrator = CompressionOrchestrator::new(MockEngine::new(10.0, 9_000));

    let result = orchestrator.compress(&original).unwrap();

    assert_eq!(result.strategy(), StrategyKind::Standard);
}

#[test]
fn test_large_pages_render_at_reduced_scale() {
    let original = mock_pdf(4, 100_000);
    let mut engine = MockEngine::new(0.0001, 99_000);
    engine.page_sides = vec![2000.0, 2500.0, 4000.0, 6000.0];
    let orchestrator = CompressionOrchestrator::new(engine);

    let result = orchestrator.compress(&original).unwrap();

    assert_eq!(result.strategy(), StrategyKind::Deep);
    // 0.6 base scale: untouched up to 2000pt, then x0.8, x0.7 and x0.5.
    assert_eq!(
        *orchestrator.engine().rasters.lock().unwrap(),
        vec![(1200, 1200), (1200, 1200), (1680, 1680), (1800, 1800)]
    );
}

#[test]
fn test_deep_threshold_boundary() {
    let original = mock_pdf(1, 10_000);

    // 3600 pixels -> 6995 bytes, plus the header: exactly 70%.
    let at_limit = CompressionOrchestrator::new(MockEngine::new(6_995.0 / 3_600.0, 9_500));
    let result = at_limit.compress(&original).unwrap();
    assert_eq!(result.strategy(), StrategyKind::Deep);
    assert_eq!(result.bytes().len(), 7_000);

    let over = CompressionOrchestrator::new(MockEngine::new(6_996.0 / 3_600.0, 9_000));
    let result = over.compress(&original).unwrap();
    assert_eq!(result.strategy(), StrategyKind::Standard);
}

#[test]
fn test_retry_threshold_boundary() {
    let original = mock_pdf(1, 10_000);

    // Deep lands far above 70% and the re-save above 90%; the retry's
    // 2500 pixels come to exactly 80%.
    let at_limit = CompressionOrchestrator::new(MockEngine::new(7_995.0 / 2_500.0, 9_500));
    let result = at_limit.compress(&original).unwrap();
    assert_eq!(result.strategy(), StrategyKind::DeepRetry);
    assert_eq!(result.bytes().len(), 8_000);

    let over = CompressionOrchestrator::new(MockEngine::new(7_996.0 / 2_500.0, 9_500));
    let result = over.compress(&original).unwrap();
    assert_eq!(result.strategy(), StrategyKind::PassThrough);
}

#[test]
fn test_deep_retry_used_after_standard_rejected() {
    let pages = 2;
    let original = mock_pdf(pages, 10_000);
    // Deep lands just above 72%, standard at 95%, retry near 50%.
    let orchestrator = CompressionOrchestrator::new(MockEngine::new(1.0, 9_500));

    let result = orchestrator.compress(&original).unwrap();

    assert_eq!(result.strategy(), StrategyKind::DeepRetry);
    assert_eq!(
        result.bytes().len(),
        HEADER_LEN + pages as usize * RETRY_PIXELS
    );
    assert_eq!(result.attempt().unwrap().scale, Some(0.5));
    assert_eq!(orchestrator.engine().resaves(), 1);
    assert_eq!(orchestrator.engine().renders(), 2 * pages as usize);
}

#[test]
fn test_pass_through_when_nothing_is_small_enough() {
    let original = mock_pdf(3, 5_000);
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let orchestrator = CompressionOrchestrator::new(MockEngine::new(5.0, 4_900))
        .with_observer(move |event: &ProgressEvent| sink.lock().unwrap().push(event.clone()));

    let result = orchestrator.compress(&original).unwrap();

    assert!(result.skipped());
    assert_eq!(result.strategy(), StrategyKind::PassThrough);
    assert_eq!(result.bytes(), original.as_slice());
    assert_eq!(result.page_count(), Some(3));
    assert_eq!(
        result.pass_through_reason(),
        Some(&PassThroughReason::NoStrategyAccepted)
    );
    let stats = result.stats();
    assert_eq!(stats.percent_reduction, 0.0);
    assert_eq!(stats.compression_ratio, 1.0);
    assert_eq!(stats.compressed_size, original.len());

    let events = events.lock().unwrap();
    let rejected: Vec<StrategyKind> = events
        .iter()
        .filter_map(|e| match e {
            ProgressEvent::StrategyRejected { kind, .. } => Some(*kind),
            _ => None,
        })
        .collect();
    assert_eq!(
        rejected,
        vec![StrategyKind::Deep, StrategyKind::Standard, StrategyKind::DeepRetry]
    );
    assert!(matches!(
        events.last(),
        Some(ProgressEvent::Finished {
            strategy: StrategyKind::PassThrough,
            ..
        })
    ));
}

#[test]
fn test_output_never_larger_than_input() {
    let original = mock_pdf(2, 100);
    let orchestrator = CompressionOrchestrator::new(MockEngine::new(50.0, 400));

    let result = orchestrator.compress(&original).unwrap();

    assert!(result.bytes().len() <= original.len());
    assert_eq!(result.bytes(), original.as_slice());
}

#[test]
fn test_page_count_change_rejects_candidate() {
    let original = mock_pdf(5, 100_000);
    let mut engine = MockEngine::new(1.0, 80_000);
    engine.drop_page_on_rerender = true;
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let orchestrator = CompressionOrchestrator::new(engine)
        .with_observer(move |event: &ProgressEvent| sink.lock().unwrap().push(event.clone()));

    let result = orchestrator.compress(&original).unwrap();

    assert_eq!(result.strategy(), StrategyKind::Standard);
    assert_eq!(result.page_count(), Some(5));
    let events = events.lock().unwrap();
    let reason = events
        .iter()
        .find_map(|e| match e {
            ProgressEvent::StrategyRejected {
                kind: StrategyKind::Deep,
                reason,
            } => Some(reason.clone()),
            _ => None,
        })
        .unwrap();
    assert!(reason.contains("page count"), "{}", reason);
}

#[test]
fn test_failed_page_does_not_abort_rerender() {
    let original = mock_pdf(3, 20_000);
    let mut engine = MockEngine::new(1.0, 19_000);
    engine.failing_pages = vec![1];
    let orchestrator = CompressionOrchestrator::new(engine);

    let result = orchestrator.compress(&original).unwrap();

    assert_eq!(result.strategy(), StrategyKind::Deep);
    assert_eq!(result.page_count(), Some(3));
    assert_eq!(result.bytes().len(), HEADER_LEN + 2 * DEEP_PIXELS);
    assert_eq!(orchestrator.engine().renders(), 3);
}

#[test]
fn test_all_pages_failing_rejects_strategy() {
    let original = mock_pdf(2, 20_000);
    let mut engine = MockEngine::new(1.0, 19_000);
    engine.failing_pages = vec![0, 1];
    let orchestrator = CompressionOrchestrator::new(engine);

    let result = orchestrator.compress(&original).unwrap();

    // An all-blank re-render is tiny but must not win.
    assert_eq!(result.strategy(), StrategyKind::PassThrough);
}

#[test]
fn test_missing_rasterizer_falls_back_to_standard() {
    let original = mock_pdf(6, 10_000);
    let mut engine = MockEngine::new(0.1, 7_000);
    engine.has_rasterizer = false;
    let orchestrator = CompressionOrchestrator::new(engine);

    let result = orchestrator.compress(&original).unwrap();

    assert_eq!(result.strategy(), StrategyKind::Standard);
    assert_eq!(orchestrator.engine().renders(), 0);
}

#[test]
fn test_panicking_strategy_is_rejected() {
    let original = mock_pdf(1, 10_000);
    let mut engine = MockEngine::new(10.0, 1_000);
    engine.panic_on_resave = true;
    let orchestrator = CompressionOrchestrator::new(engine);

    let result = orchestrator.compress(&original).unwrap();

    assert!(result.skipped());
    assert_eq!(result.bytes(), original.as_slice());
    assert_eq!(orchestrator.engine().resaves(), 1);
}

#[test]
fn test_malformed_input() {
    let orchestrator = CompressionOrchestrator::new(MockEngine::new(1.0, 10));

    let err = orchestrator.compress(b"%PDF-garbage").unwrap_err();
    assert!(matches!(err, CompressError::InvalidDocument(_)));
    assert!(matches!(
        orchestrator.compress(b"").unwrap_err(),
        CompressError::InvalidDocument(_)
    ));

    let result = orchestrator.compress_or_passthrough(b"%PDF-garbage".to_vec());
    assert!(result.skipped());
    assert_eq!(result.bytes(), b"%PDF-garbage");
    assert_eq!(result.page_count(), None);
    assert!(matches!(
        result.pass_through_reason(),
        Some(PassThroughReason::InvalidDocument(_))
    ));
    assert_eq!(result.stats().percent_reduction, 0.0);
    assert_eq!(orchestrator.engine().renders(), 0);
}

#[test]
fn test_progress_events_for_deep_success() {
    let original = mock_pdf(2, 20_000);
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let orchestrator = CompressionOrchestrator::new(MockEngine::new(1.0, 19_000))
        .with_observer(move |event: &ProgressEvent| sink.lock().unwrap().push(event.clone()));

    orchestrator.compress(&original).unwrap();

    let events = events.lock().unwrap();
    assert_eq!(
        events[..4],
        [
            ProgressEvent::Started {
                size: 20_000,
                pages: 2
            },
            ProgressEvent::StrategyStarted(StrategyKind::Deep),
            ProgressEvent::PageProcessed { page: 0, total: 2 },
            ProgressEvent::PageProcessed { page: 1, total: 2 },
        ]
    );
    assert_eq!(events.len(), 5);
    assert_eq!(events[3].message(), "Compressing page 2 of 2...");
    assert!(matches!(
        events[4],
        ProgressEvent::Finished {
            strategy: StrategyKind::Deep,
            ..
        }
    ));
    assert_eq!(events[4].fraction(), 1.0);
}
