//! Document-processing capability used by the orchestrator.
//!
//! The orchestrator only talks to [`DocumentEngine`]. [`LopdfEngine`] is the
//! production implementation; tests plug in synthetic engines.

mod builder;
mod images;
mod lopdf_engine;
mod raster;

pub use builder::LopdfBuilder;
pub use images::{recompress_images, ImageRecompression, RecompressionSummary};
pub use lopdf_engine::{LopdfEngine, LoadedPdf};
pub use raster::{NoRasterizer, PageRasterizer};

#[cfg(feature = "mupdf")]
pub use raster::MupdfRasterizer;

use crate::error::EngineError;

/// Rasterized page.
pub type RasterImage = image::RgbImage;

/// Rasterizer used by [`default_engine`].
#[cfg(feature = "mupdf")]
pub type DefaultRasterizer = MupdfRasterizer;
#[cfg(not(feature = "mupdf"))]
pub type DefaultRasterizer = NoRasterizer;

pub type DefaultEngine = LopdfEngine<DefaultRasterizer>;

/// Engine with the best rasterizer compiled into this build.
pub fn default_engine() -> DefaultEngine {
    LopdfEngine::new(DefaultRasterizer::default())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
}

/// An encoded raster ready to be embedded.
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub data: Vec<u8>,
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
}

/// One page of an opened document. `width`/`height` are the page size at
/// scale 1.0 (PDF points), with page rotation applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageHandle {
    pub index: usize,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SaveOptions {
    /// Flate-compress streams that carry no filter yet.
    pub compress_streams: bool,
    /// Drop unreachable objects and empty streams, then renumber.
    pub prune_unreferenced: bool,
    /// Re-encode embedded images during a structural re-save.
    pub recompress_images: Option<ImageRecompression>,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            compress_streams: true,
            prune_unreferenced: true,
            recompress_images: None,
        }
    }
}

/// A document the engine has opened.
pub trait SourceDocument {
    fn page_count(&self) -> usize;

    fn page(&self, index: usize) -> Result<PageHandle, EngineError>;
}

/// Assembles a new document page by page.
pub trait DocumentBuilder {
    /// Appends a page of `width` x `height` points.
    fn add_page(&mut self, width: f64, height: f64);

    /// Draws `image` on the most recently added page.
    fn draw_image(
        &mut self,
        image: &EncodedImage,
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    ) -> Result<(), EngineError>;

    fn save(self, options: &SaveOptions) -> Result<Vec<u8>, EngineError>;
}

/// The operations the orchestrator needs from a PDF library.
pub trait DocumentEngine {
    type Handle: SourceDocument;
    type Builder: DocumentBuilder;

    /// Fails with [`EngineError::Load`] on malformed input.
    fn open_document(&self, bytes: &[u8]) -> Result<Self::Handle, EngineError>;

    fn render_page(
        &self,
        document: &Self::Handle,
        page: &PageHandle,
        scale: f64,
    ) -> Result<RasterImage, EngineError>;

    /// `quality` is in `0.0..=1.0`.
    fn encode_image(
        &self,
        image: &RasterImage,
        format: ImageFormat,
        quality: f64,
    ) -> Result<EncodedImage, EngineError>;

    fn create_document(&self) -> Self::Builder;

    /// Re-serializes `document` without re-rendering its content.
    fn re_save(&self, document: &Self::Handle, options: &SaveOptions)
        -> Result<Vec<u8>, EngineError>;
}
