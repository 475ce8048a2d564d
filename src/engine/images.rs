//! Re-encoding of image XObjects embedded in an existing document.
//!
//! Used by the structural re-save: page content is left alone, but large
//! embedded images are downscaled and stored as JPEG when that is smaller.

use std::collections::HashSet;
use std::io::{Read, Write};

use anyhow::{anyhow, bail, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ColorType, DynamicImage, GenericImageView, GrayImage};
use lopdf::{Document as LoDocument, Object, ObjectId, Stream};

/// Settings for embedded image recompression.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageRecompression {
    /// JPEG quality (1-100).
    pub quality: u8,
    /// Longest side after downscaling, in pixels.
    pub max_dimension: u32,
    /// Images with fewer pixels are left alone.
    pub min_pixels: u64,
}

impl Default for ImageRecompression {
    fn default() -> Self {
        Self {
            quality: 50,
            max_dimension: 1500,
            min_pixels: 10_000,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecompressionSummary {
    pub recompressed: usize,
    pub skipped: usize,
    pub failed: usize,
}

enum Outcome {
    Replaced,
    Kept,
}

/// Recompresses every eligible image XObject of `doc` in place.
pub fn recompress_images(doc: &mut LoDocument, settings: &ImageRecompression) -> RecompressionSummary {
    let mut summary = RecompressionSummary::default();
    let mut masks = HashSet::new();

    let candidates: Vec<(ObjectId, Option<ObjectId>)> = doc
        .objects
        .iter()
        .filter_map(|(id, obj)| match obj {
            Object::Stream(stream) if is_image(stream) => {
                let smask = stream.dict.get(b"SMask").and_then(Object::as_reference).ok();
                Some((*id, smask))
            }
            _ => None,
        })
        .collect();
    for (_, smask) in &candidates {
        masks.extend(*smask);
    }

    for (id, smask) in candidates {
        if masks.contains(&id) {
            continue;
        }
        match recompress_one(doc, id, smask, settings) {
            Ok(Outcome::Replaced) => summary.recompressed += 1,
            Ok(Outcome::Kept) => summary.skipped += 1,
            Err(e) => {
                log::debug!("Image {} left untouched: {:#}", id.0, e);
                summary.failed += 1;
            }
        }
    }
    summary
}

fn is_image(stream: &Stream) -> bool {
    matches!(stream.dict.get(b"Subtype").and_then(Object::as_name), Ok(b"Image"))
}

fn stream<'a>(doc: &'a LoDocument, id: ObjectId) -> Result<&'a Stream> {
    match doc.objects.get(&id) {
        Some(Object::Stream(s)) => Ok(s),
        _ => Err(anyhow!("object {} is not a stream", id.0)),
    }
}

fn recompress_one(
    doc: &mut LoDocument,
    id: ObjectId,
    smask: Option<ObjectId>,
    settings: &ImageRecompression,
) -> Result<Outcome> {
    let (img, original_len) = {
        let s = stream(doc, id)?;
        let width = dict_u32(doc, s, b"Width");
        let height = dict_u32(doc, s, b"Height");
        if (width as u64) * (height as u64) < settings.min_pixels || !samples_map_directly(doc, s) {
            return Ok(Outcome::Kept);
        }
        (decode_image(doc, s, width, height)?, s.content.len())
    };

    let img = if img.width() > settings.max_dimension || img.height() > settings.max_dimension {
        img.resize(settings.max_dimension, settings.max_dimension, FilterType::Lanczos3)
    } else {
        img
    };
    let (w, h) = img.dimensions();

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, settings.quality)
        .encode(img.to_rgb8().as_raw(), w, h, ColorType::Rgb8.into())
        .context("JPEG encode")?;

    let resized = {
        let s = stream(doc, id)?;
        (w, h) != (dict_u32(doc, s, b"Width"), dict_u32(doc, s, b"Height"))
    };
    if jpeg.len() >= original_len {
        return Ok(Outcome::Kept);
    }

    // A resized image needs its soft mask resized to match.
    let mask = match smask {
        Some(mask_id) if resized => Some((mask_id, resize_mask(doc, mask_id, w, h)?)),
        _ => None,
    };

    if let Some(Object::Stream(s)) = doc.objects.get_mut(&id) {
        s.dict.set("Filter", Object::Name(b"DCTDecode".to_vec()));
        s.dict.set("Width", Object::Integer(w as i64));
        s.dict.set("Height", Object::Integer(h as i64));
        s.dict.set("ColorSpace", Object::Name(b"DeviceRGB".to_vec()));
        s.dict.set("BitsPerComponent", Object::Integer(8));
        s.dict.remove(b"DecodeParms");
        s.dict.remove(b"Decode");
        s.set_content(jpeg);
        s.allows_compression = false;
    }

    if let Some((mask_id, data)) = mask {
        if let Some(Object::Stream(s)) = doc.objects.get_mut(&mask_id) {
            s.dict.set("Filter", Object::Name(b"FlateDecode".to_vec()));
            s.dict.set("Width", Object::Integer(w as i64));
            s.dict.set("Height", Object::Integer(h as i64));
            s.dict.set("ColorSpace", Object::Name(b"DeviceGray".to_vec()));
            s.dict.set("BitsPerComponent", Object::Integer(8));
            s.dict.remove(b"DecodeParms");
            s.dict.remove(b"Decode");
            s.set_content(data);
            s.allows_compression = false;
        }
    }

    Ok(Outcome::Replaced)
}

/// False when the stored samples are not the final colors: a non-identity
/// `/Decode`, a color-key `/Mask`, or a stencil mask. Re-encoding those as
/// plain JPEG would change what the page shows.
fn samples_map_directly(doc: &LoDocument, s: &Stream) -> bool {
    let is_stencil = s
        .dict
        .get(b"ImageMask")
        .map(|o| resolve(doc, o))
        .and_then(Object::as_bool)
        .unwrap_or(false);
    if is_stencil {
        return false;
    }
    if let Ok(Object::Array(_)) = s.dict.get(b"Mask").map(|o| resolve(doc, o)) {
        return false;
    }
    match s.dict.get(b"Decode").map(|o| resolve(doc, o)) {
        Ok(Object::Array(ranges)) => {
            let values: Vec<Option<f64>> = ranges.iter().map(|o| number(resolve(doc, o))).collect();
            values.len() % 2 == 0
                && values
                    .chunks(2)
                    .all(|pair| *pair == [Some(0.0), Some(1.0)])
        }
        Ok(_) => false,
        Err(_) => true,
    }
}

fn number(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(*r as f64),
        _ => None,
    }
}

fn dict_u32(doc: &LoDocument, s: &Stream, key: &[u8]) -> u32 {
    s.dict
        .get(key)
        .map(|o| resolve(doc, o))
        .and_then(Object::as_i64)
        .map(|v| v.max(0) as u32)
        .unwrap_or(0)
}

fn resolve<'a>(doc: &'a LoDocument, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        _ => obj,
    }
}

fn filter_names(doc: &LoDocument, s: &Stream) -> Vec<Vec<u8>> {
    match s.dict.get(b"Filter").map(|o| resolve(doc, o)) {
        Ok(Object::Name(name)) => vec![name.clone()],
        Ok(Object::Array(arr)) => arr
            .iter()
            .filter_map(|o| resolve(doc, o).as_name().ok().map(<[u8]>::to_vec))
            .collect(),
        _ => Vec::new(),
    }
}

fn decode_image(doc: &LoDocument, s: &Stream, width: u32, height: u32) -> Result<DynamicImage> {
    let filters = filter_names(doc, s);

    if filters.iter().any(|f| f == b"DCTDecode") {
        if filters.len() != 1 {
            bail!("chained JPEG filters");
        }
        return image::load_from_memory(&s.content).context("JPEG decode");
    }
    if filters.iter().any(|f| f != b"FlateDecode") {
        bail!("unsupported filter chain");
    }

    let bits = s
        .dict
        .get(b"BitsPerComponent")
        .map(|o| resolve(doc, o))
        .and_then(Object::as_i64)
        .unwrap_or(8);
    if bits != 8 {
        bail!("{} bits per component", bits);
    }

    let color_space = match s.dict.get(b"ColorSpace").map(|o| resolve(doc, o)) {
        Ok(Object::Name(name)) => name.clone(),
        _ => bail!("non-device color space"),
    };
    let samples = decompress(s)?;

    match color_space.as_slice() {
        b"DeviceGray" => GrayImage::from_raw(width, height, samples)
            .map(DynamicImage::ImageLuma8)
            .ok_or_else(|| anyhow!("gray sample count mismatch")),
        b"DeviceRGB" => image::RgbImage::from_raw(width, height, samples)
            .map(DynamicImage::ImageRgb8)
            .ok_or_else(|| anyhow!("RGB sample count mismatch")),
        b"DeviceCMYK" => image::RgbImage::from_raw(width, height, cmyk_to_rgb(&samples))
            .map(DynamicImage::ImageRgb8)
            .ok_or_else(|| anyhow!("CMYK sample count mismatch")),
        other => bail!("color space {}", String::from_utf8_lossy(other)),
    }
}

/// Decodes a Flate stream, retrying with a plain zlib pass when lopdf
/// refuses the stream parameters.
fn decompress(s: &Stream) -> Result<Vec<u8>> {
    if !s.dict.has(b"Filter") {
        return Ok(s.content.clone());
    }
    match s.decompressed_content() {
        Ok(content) => Ok(content),
        Err(e) => {
            let mut buffer = Vec::new();
            flate2::read::ZlibDecoder::new(&s.content[..])
                .read_to_end(&mut buffer)
                .with_context(|| format!("zlib fallback after {:?}", e))?;
            Ok(buffer)
        }
    }
}

fn cmyk_to_rgb(samples: &[u8]) -> Vec<u8> {
    samples
        .chunks_exact(4)
        .flat_map(|px| {
            let k = 1.0 - px[3] as f32 / 255.0;
            [0, 1, 2].map(|i| ((1.0 - px[i] as f32 / 255.0) * k * 255.0) as u8)
        })
        .collect()
}

fn resize_mask(doc: &LoDocument, mask_id: ObjectId, w: u32, h: u32) -> Result<Vec<u8>> {
    let s = stream(doc, mask_id)?;
    let mw = dict_u32(doc, s, b"Width");
    let mh = dict_u32(doc, s, b"Height");
    let mask = GrayImage::from_raw(mw, mh, decompress(s).context("mask")?)
        .ok_or_else(|| anyhow!("mask sample count mismatch"))?;
    let resized = image::imageops::resize(&mask, w, h, FilterType::Lanczos3);

    let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::best());
    encoder.write_all(resized.as_raw())?;
    Ok(encoder.finish()?)
}
