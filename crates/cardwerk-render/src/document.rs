// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Document assembler: wraps card rasters into single-page PDFs sized to the
// physical card and concatenates front and back into one document.
//
// Output carries no timestamps or random identifiers, so identical images
// always give identical bytes.

use cardwerk_core::config::{CardSpec, mm_to_pt};
use cardwerk_core::error::{CardwerkError, Result};
use image::RgbImage;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, dictionary};
use tracing::{debug, info, instrument, warn};

const PDF_VERSION: &str = "1.5";
const PRODUCER: &str = "cardwerk";
const IMAGE_NAME: &str = "Im0";

/// Builds card PDFs with fixed page geometry and metadata.
#[derive(Debug, Clone)]
pub struct DocumentAssembler {
    page_width_pt: f32,
    page_height_pt: f32,
}

impl DocumentAssembler {
    pub fn new(card: &CardSpec) -> Self {
        Self {
            page_width_pt: mm_to_pt(card.width_mm) as f32,
            page_height_pt: mm_to_pt(card.height_mm) as f32,
        }
    }

    /// Page size in points.
    pub fn page_size(&self) -> (f32, f32) {
        (self.page_width_pt, self.page_height_pt)
    }

    /// Embed `image` as a Flate-compressed RGB XObject filling one page.
    #[instrument(skip(self, image), fields(width = image.width(), height = image.height()))]
    pub fn to_document(&self, image: &RgbImage, title: &str) -> Result<Vec<u8>> {
        let mut doc = Document::with_version(PDF_VERSION);
        let pages_id = doc.new_object_id();

        let image_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => Object::Integer(i64::from(image.width())),
                "Height" => Object::Integer(i64::from(image.height())),
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => Object::Integer(8),
            },
            image.as_raw().clone(),
        ));

        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        Object::Real(self.page_width_pt),
                        Object::Integer(0),
                        Object::Integer(0),
                        Object::Real(self.page_height_pt),
                        Object::Integer(0),
                        Object::Integer(0),
                    ],
                ),
                Operation::new("Do", vec![Object::Name(IMAGE_NAME.as_bytes().to_vec())]),
                Operation::new("Q", vec![]),
            ],
        };
        let encoded = content
            .encode()
            .map_err(|err| CardwerkError::PdfError(format!("content stream: {err}")))?;
        let content_id = doc.add_object(Stream::new(Dictionary::new(), encoded));

        let mut xobjects = Dictionary::new();
        xobjects.set(IMAGE_NAME, Object::Reference(image_id));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => self.media_box(),
            "Contents" => content_id,
            "Resources" => dictionary! { "XObject" => xobjects },
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::Reference(page_id)],
                "Count" => Object::Integer(1),
            }),
        );
        finish_catalog(&mut doc, pages_id, title);
        doc.compress();

        let bytes = save(&mut doc)?;
        debug!(bytes = bytes.len(), "Single-page document assembled");
        Ok(bytes)
    }

    /// Concatenate two single-page documents into one two-page document.
    #[instrument(skip_all, fields(front = front.len(), back = back.len()))]
    pub fn combine(&self, front: &[u8], back: &[u8], title: &str) -> Result<Vec<u8>> {
        let mut combined = Document::with_version(PDF_VERSION);
        let pages_id = combined.new_object_id();
        combined.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => Vec::<Object>::new(),
                "Count" => Object::Integer(0),
            }),
        );
        finish_catalog(&mut combined, pages_id, title);

        for (index, bytes) in [front, back].into_iter().enumerate() {
            let source = Document::load_mem(bytes).map_err(|err| {
                CardwerkError::PdfError(format!("cannot load page document #{}: {err}", index + 1))
            })?;
            let pages = source.get_pages();
            for page_id in pages.values() {
                append_page(&source, &mut combined, pages_id, *page_id)?;
            }
        }

        let bytes = save(&mut combined)?;
        info!(bytes = bytes.len(), pages = page_count(&bytes)?, "Combined document assembled");
        Ok(bytes)
    }

    fn media_box(&self) -> Vec<Object> {
        vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Real(self.page_width_pt),
            Object::Real(self.page_height_pt),
        ]
    }
}

/// Number of pages in a PDF.
pub fn page_count(bytes: &[u8]) -> Result<usize> {
    let doc = Document::load_mem(bytes)
        .map_err(|err| CardwerkError::PdfError(format!("cannot load document: {err}")))?;
    Ok(doc.get_pages().len())
}

fn finish_catalog(doc: &mut Document, pages_id: ObjectId, title: &str) {
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    let info_id = doc.add_object(dictionary! {
        "Title" => Object::string_literal(title),
        "Producer" => Object::string_literal(PRODUCER),
    });
    doc.trailer.set("Info", info_id);
}

fn save(doc: &mut Document) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    doc.save_to(&mut out)
        .map_err(|err| CardwerkError::PdfError(format!("failed to serialise PDF: {err}")))?;
    Ok(out)
}

/// Copy one page and everything it references into `target`, appending it to
/// the page tree at `pages_id`.
fn append_page(source: &Document, target: &mut Document, pages_id: ObjectId, page_id: ObjectId) -> Result<()> {
    let page = source
        .get_object(page_id)
        .map_err(|err| CardwerkError::PdfError(format!("cannot read page {page_id:?}: {err}")))?;
    let cloned = deep_clone(source, target, page)?;
    let cloned_id = target.add_object(cloned);

    match target.get_object_mut(pages_id) {
        Ok(Object::Dictionary(pages)) => {
            if let Ok(Object::Array(kids)) = pages.get_mut(b"Kids") {
                kids.push(Object::Reference(cloned_id));
            }
            if let Ok(Object::Integer(count)) = pages.get_mut(b"Count") {
                *count += 1;
            }
        }
        _ => return Err(CardwerkError::PdfError("page tree node missing".into())),
    }
    if let Ok(Object::Dictionary(page)) = target.get_object_mut(cloned_id) {
        page.set("Parent", Object::Reference(pages_id));
    }
    Ok(())
}

/// Clone an object graph, skipping /Parent back-references (patched by the
/// caller).
fn deep_clone(source: &Document, target: &mut Document, object: &Object) -> Result<Object> {
    match object {
        Object::Dictionary(dict) => Ok(Object::Dictionary(clone_dictionary(source, target, dict)?)),
        Object::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(deep_clone(source, target, item)?);
            }
            Ok(Object::Array(out))
        }
        Object::Reference(id) => match source.get_object(*id) {
            Ok(referenced) => {
                let cloned = deep_clone(source, target, referenced)?;
                Ok(Object::Reference(target.add_object(cloned)))
            }
            Err(err) => {
                warn!(?id, %err, "Dangling reference replaced with null");
                Ok(Object::Null)
            }
        },
        Object::Stream(stream) => {
            let dict = clone_dictionary(source, target, &stream.dict)?;
            Ok(Object::Stream(Stream::new(dict, stream.content.clone())))
        }
        other => Ok(other.clone()),
    }
}

fn clone_dictionary(source: &Document, target: &mut Document, dict: &Dictionary) -> Result<Dictionary> {
    let mut out = Dictionary::new();
    for (key, value) in dict.iter() {
        if key == b"Parent" {
            continue;
        }
        out.set(key.clone(), deep_clone(source, target, value)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn card_image(shade: u8) -> RgbImage {
        RgbImage::from_fn(1012, 638, |x, y| Rgb([shade, (x % 256) as u8, (y % 256) as u8]))
    }

    #[test]
    fn single_page_is_card_sized() {
        let assembler = DocumentAssembler::new(&CardSpec::default());
        let pdf = assembler.to_document(&card_image(10), "front").unwrap();
        assert!(pdf.starts_with(b"%PDF-1.5"));
        assert_eq!(page_count(&pdf).unwrap(), 1);

        let (w, h) = assembler.page_size();
        assert!((w - 242.65).abs() < 0.1, "width {w}");
        assert!((h - 153.07).abs() < 0.1, "height {h}");
    }

    #[test]
    fn same_image_gives_same_bytes() {
        let assembler = DocumentAssembler::new(&CardSpec::default());
        let a = assembler.to_document(&card_image(99), "front").unwrap();
        let b = assembler.to_document(&card_image(99), "front").unwrap();
        assert_eq!(a, b);
        let c = assembler.to_document(&card_image(98), "front").unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn combine_yields_two_pages_deterministically() {
        let assembler = DocumentAssembler::new(&CardSpec::default());
        let front = assembler.to_document(&card_image(1), "front").unwrap();
        let back = assembler.to_document(&card_image(2), "back").unwrap();
        let combined = assembler.combine(&front, &back, "card").unwrap();
        assert_eq!(page_count(&combined).unwrap(), 2);
        assert_eq!(combined, assembler.combine(&front, &back, "card").unwrap());
    }

    #[test]
    fn combine_rejects_garbage() {
        let assembler = DocumentAssembler::new(&CardSpec::default());
        assert!(matches!(
            assembler.combine(b"nope", b"nope", "card"),
            Err(CardwerkError::PdfError(_))
        ));
    }
}
