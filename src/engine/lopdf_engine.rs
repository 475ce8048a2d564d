use std::io::Cursor;
use std::panic::{self, AssertUnwindSafe};

use image::codecs::jpeg::JpegEncoder;
use image::ColorType;
use lopdf::{Document as LoDocument, Object, ObjectId};

use crate::error::EngineError;

use super::builder::LopdfBuilder;
use super::images::recompress_images;
use super::raster::{NoRasterizer, PageRasterizer};
use super::{
    DocumentEngine, EncodedImage, ImageFormat, PageHandle, RasterImage, SaveOptions,
    SourceDocument,
};

/// US Letter, used when a page carries no MediaBox anywhere in its tree.
const DEFAULT_PAGE_SIZE: (f64, f64) = (612.0, 792.0);

/// Guard against cyclic `Parent` chains.
const MAX_INHERITANCE_DEPTH: usize = 32;

/// [`DocumentEngine`] built on lopdf, with rendering delegated to `R`.
#[derive(Debug, Clone, Default)]
pub struct LopdfEngine<R = NoRasterizer> {
    rasterizer: R,
}

impl<R: PageRasterizer> LopdfEngine<R> {
    pub fn new(rasterizer: R) -> Self {
        Self { rasterizer }
    }
}

/// A PDF parsed by lopdf, plus its original bytes for the rasterizer.
#[derive(Debug, Clone)]
pub struct LoadedPdf {
    bytes: Vec<u8>,
    doc: LoDocument,
    pages: Vec<PageHandle>,
}

impl LoadedPdf {
    pub fn load(bytes: &[u8]) -> Result<Self, EngineError> {
        // lopdf can panic on some malformed cross-reference tables
        let loaded = panic::catch_unwind(|| LoDocument::load_mem(bytes))
            .map_err(|_| EngineError::Load("parser panicked".to_string()))?;
        let mut doc = loaded.map_err(|e| EngineError::Load(e.to_string()))?;

        if doc.is_encrypted() {
            if let Err(e) = doc.decrypt(b"") {
                log::warn!("PDF is encrypted and the empty password failed: {:?}", e);
            }
        }

        let pages = doc
            .get_pages()
            .into_values()
            .enumerate()
            .map(|(index, page_id)| {
                let (width, height) = page_size(&doc, page_id);
                PageHandle {
                    index,
                    width,
                    height,
                }
            })
            .collect();

        Ok(Self {
            bytes: bytes.to_vec(),
            doc,
            pages,
        })
    }
}

impl SourceDocument for LoadedPdf {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page(&self, index: usize) -> Result<PageHandle, EngineError> {
        self.pages
            .get(index)
            .copied()
            .ok_or(EngineError::PageNotFound(index))
    }
}

impl<R: PageRasterizer> DocumentEngine for LopdfEngine<R> {
    type Handle = LoadedPdf;
    type Builder = LopdfBuilder;

    fn open_document(&self, bytes: &[u8]) -> Result<LoadedPdf, EngineError> {
        LoadedPdf::load(bytes)
    }

    fn render_page(
        &self,
        document: &LoadedPdf,
        page: &PageHandle,
        scale: f64,
    ) -> Result<RasterImage, EngineError> {
        if page.index >= document.page_count() {
            return Err(EngineError::PageNotFound(page.index));
        }
        self.rasterizer.render(&document.bytes, page.index, scale)
    }

    fn encode_image(
        &self,
        image: &RasterImage,
        format: ImageFormat,
        quality: f64,
    ) -> Result<EncodedImage, EngineError> {
        let (width, height) = image.dimensions();
        let mut data = Vec::new();
        match format {
            ImageFormat::Jpeg => {
                let mut encoder = JpegEncoder::new_with_quality(&mut data, jpeg_quality(quality));
                encoder.encode(image.as_raw(), width, height, ColorType::Rgb8.into())?;
            }
            ImageFormat::Png => {
                image.write_to(&mut Cursor::new(&mut data), image::ImageFormat::Png)?;
            }
        }
        Ok(EncodedImage {
            data,
            format,
            width,
            height,
        })
    }

    fn create_document(&self) -> LopdfBuilder {
        LopdfBuilder::new()
    }

    fn re_save(&self, document: &LoadedPdf, options: &SaveOptions) -> Result<Vec<u8>, EngineError> {
        let mut doc = document.doc.clone();
        if let Some(settings) = &options.recompress_images {
            let summary = recompress_images(&mut doc, settings);
            log::debug!(
                "Recompressed {} images ({} skipped, {} failed)",
                summary.recompressed,
                summary.skipped,
                summary.failed
            );
        }
        serialize(&mut doc, options)
    }
}

/// Applies the structural options and writes `doc` out.
pub(super) fn serialize(doc: &mut LoDocument, options: &SaveOptions) -> Result<Vec<u8>, EngineError> {
    if options.prune_unreferenced {
        doc.prune_objects();
        doc.delete_zero_length_streams();
        doc.renumber_objects();
    }
    if options.compress_streams {
        doc.compress();
    }

    let mut buffer = Vec::new();
    panic::catch_unwind(AssertUnwindSafe(|| doc.save_to(&mut buffer)))
        .map_err(|_| EngineError::Save("writer panicked".to_string()))?
        .map_err(|e| EngineError::Save(e.to_string()))?;
    Ok(buffer)
}

/// Maps a `0.0..=1.0` quality onto the JPEG encoder's 1-100 scale.
pub fn jpeg_quality(quality: f64) -> u8 {
    (quality * 100.0).round().clamp(1.0, 100.0) as u8
}

fn page_size(doc: &LoDocument, page_id: ObjectId) -> (f64, f64) {
    let mut media_box = None;
    let mut rotate = None;
    let mut current = Some(page_id);

    for _ in 0..MAX_INHERITANCE_DEPTH {
        let Some(id) = current else { break };
        let Ok(dict) = doc.get_dictionary(id) else { break };

        if media_box.is_none() {
            media_box = dict
                .get(b"MediaBox")
                .ok()
                .and_then(|o| resolve(doc, o).as_array().ok())
                .and_then(|arr| rect_size(doc, arr));
        }
        if rotate.is_none() {
            rotate = dict
                .get(b"Rotate")
                .ok()
                .and_then(|o| resolve(doc, o).as_i64().ok());
        }
        if media_box.is_some() && rotate.is_some() {
            break;
        }
        current = dict.get(b"Parent").and_then(Object::as_reference).ok();
    }

    let (width, height) = media_box.unwrap_or(DEFAULT_PAGE_SIZE);
    match rotate.unwrap_or(0).rem_euclid(360) {
        90 | 270 => (height, width),
        _ => (width, height),
    }
}

fn rect_size(doc: &LoDocument, arr: &[Object]) -> Option<(f64, f64)> {
    let nums: Vec<f64> = arr
        .iter()
        .filter_map(|o| number(resolve(doc, o)))
        .collect();
    match nums.as_slice() {
        [x0, y0, x1, y1] if x1 != x0 && y1 != y0 => Some(((x1 - x0).abs(), (y1 - y0).abs())),
        _ => None,
    }
}

fn resolve<'a>(doc: &'a LoDocument, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        _ => obj,
    }
}

fn number(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(*r as f64),
        _ => None,
    }
}
