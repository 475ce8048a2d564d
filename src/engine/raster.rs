use crate::error::EngineError;

use super::RasterImage;

/// Turns one page of a PDF into pixels.
pub trait PageRasterizer {
    fn render(&self, pdf: &[u8], page_index: usize, scale: f64) -> Result<RasterImage, EngineError>;
}

/// Rasterizer for builds without a rendering backend. Re-render strategies
/// are rejected as a whole.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRasterizer;

impl PageRasterizer for NoRasterizer {
    fn render(&self, _pdf: &[u8], _page_index: usize, _scale: f64) -> Result<RasterImage, EngineError> {
        Err(EngineError::Unsupported(
            "no page rasterizer in this build".to_string(),
        ))
    }
}

/// MuPDF-backed rasterizer.
#[cfg(feature = "mupdf")]
#[derive(Debug, Clone, Copy, Default)]
pub struct MupdfRasterizer;

#[cfg(feature = "mupdf")]
impl PageRasterizer for MupdfRasterizer {
    fn render(&self, pdf: &[u8], page_index: usize, scale: f64) -> Result<RasterImage, EngineError> {
        use mupdf::{Colorspace, Matrix};

        let to_render = |e: mupdf::Error| EngineError::Render(e.to_string());

        let doc = mupdf::Document::from_bytes(pdf, "application/pdf").map_err(to_render)?;
        let page = doc.load_page(page_index as i32).map_err(to_render)?;
        let matrix = Matrix::new_scale(scale as f32, scale as f32);
        let pixmap = page
            .to_pixmap(&matrix, &Colorspace::device_rgb(), false, true)
            .map_err(to_render)?;

        let width = pixmap.width() as u32;
        let height = pixmap.height() as u32;
        let n = pixmap.n() as usize;
        let samples = pixmap.samples();

        let mut rgb = Vec::with_capacity((width * height * 3) as usize);
        for px in samples.chunks(n).take((width * height) as usize) {
            match px {
                [r, g, b, ..] => rgb.extend_from_slice(&[*r, *g, *b]),
                [gray] => rgb.extend_from_slice(&[*gray, *gray, *gray]),
                _ => rgb.extend_from_slice(&[255, 255, 255]),
            }
        }

        RasterImage::from_raw(width, height, rgb)
            .ok_or_else(|| EngineError::Render("pixmap size mismatch".to_string()))
    }
}
