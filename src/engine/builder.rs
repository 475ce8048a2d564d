use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document as LoDocument, Object, ObjectId, Stream};

use crate::error::EngineError;

use super::lopdf_engine::serialize;
use super::{DocumentBuilder, EncodedImage, ImageFormat, SaveOptions};

struct PendingPage {
    width: f64,
    height: f64,
    /// Image XObjects and the operations placing them.
    images: Vec<(String, ObjectId)>,
    operations: Vec<Operation>,
}

/// Builds a fresh PDF out of full-page images.
pub struct LopdfBuilder {
    doc: LoDocument,
    pages: Vec<PendingPage>,
}

impl LopdfBuilder {
    pub fn new() -> Self {
        Self {
            doc: LoDocument::with_version("1.5"),
            pages: Vec::new(),
        }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

impl Default for LopdfBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentBuilder for LopdfBuilder {
    fn add_page(&mut self, width: f64, height: f64) {
        self.pages.push(PendingPage {
            width,
            height,
            images: Vec::new(),
            operations: Vec::new(),
        });
    }

    fn draw_image(
        &mut self,
        image: &EncodedImage,
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    ) -> Result<(), EngineError> {
        if image.format != ImageFormat::Jpeg {
            return Err(EngineError::Unsupported(format!(
                "embedding {:?} images",
                image.format
            )));
        }
        let Some(page) = self.pages.last_mut() else {
            return Err(EngineError::Save("draw_image before add_page".to_string()));
        };

        let stream = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => image.width as i64,
                "Height" => image.height as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8_i64,
                "Filter" => "DCTDecode",
            },
            image.data.clone(),
        )
        .with_compression(false);
        let image_id = self.doc.add_object(stream);

        let name = format!("Im{}", page.images.len());
        page.operations.extend([
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    real(width),
                    real(0.0),
                    real(0.0),
                    real(height),
                    real(x),
                    real(y),
                ],
            ),
            Operation::new("Do", vec![Object::Name(name.clone().into_bytes())]),
            Operation::new("Q", vec![]),
        ]);
        page.images.push((name, image_id));
        Ok(())
    }

    fn save(mut self, options: &SaveOptions) -> Result<Vec<u8>, EngineError> {
        let pages_id = self.doc.new_object_id();
        let mut kids = Vec::with_capacity(self.pages.len());

        for page in std::mem::take(&mut self.pages) {
            let content = Content {
                operations: page.operations,
            }
            .encode()?;
            let content_id = self.doc.add_object(flate_stream(&content)?);

            let mut xobjects = Dictionary::new();
            for (name, id) in page.images {
                xobjects.set(name, id);
            }

            let page_id = self.doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![real(0.0), real(0.0), real(page.width), real(page.height)],
                "Resources" => dictionary! { "XObject" => xobjects },
                "Contents" => content_id,
            });
            kids.push(Object::Reference(page_id));
        }

        let count = kids.len() as i64;
        self.doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        self.doc.trailer.set("Root", catalog_id);

        serialize(&mut self.doc, options)
    }
}

fn flate_stream(content: &[u8]) -> Result<Stream, EngineError> {
    let to_save = |e: std::io::Error| EngineError::Save(format!("content stream: {}", e));
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(content).map_err(to_save)?;
    let data = encoder.finish().map_err(to_save)?;
    Ok(Stream::new(dictionary! { "Filter" => "FlateDecode" }, data).with_compression(false))
}

fn real(value: f64) -> Object {
    Object::Real(value as _)
}
