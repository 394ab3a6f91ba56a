// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Card renderer: composites template layers, the processed photo, text
// fields, the PDF417 symbol and the MRZ onto fixed-size front and back
// canvases.

use cardwerk_core::config::{AssetConfig, BarcodeSettings, CardSpec, EngineConfig};
use cardwerk_core::error::{CardwerkError, Result};
use cardwerk_core::types::{Identity, LicenseCategory, MrzPayload};
use chrono::NaiveDate;
use image::codecs::png::PngEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgba, RgbaImage, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;
use tracing::{debug, instrument};

use super::assets::TemplateAssets;
use super::layout::{CardField, CardLayout, PixelRect};
use crate::barcode::{BarcodeEncoder, BarcodeSymbol};
use crate::photo::ProcessedPhoto;

const INK: Rgba<u8> = Rgba([20, 20, 20, 255]);
const LABEL: Rgba<u8> = Rgba([70, 90, 80, 255]);
const ACCENT: Rgba<u8> = Rgba([0, 100, 60, 255]);

const TITLE_PX: u32 = 24;
const SUBTITLE_PX: u32 = 16;
const LABEL_PX: u32 = 9;
const VALUE_PX: u32 = 21;
const MRZ_PX: u32 = 21;

/// Renders front and back faces at the configured card size.
#[derive(Debug, Clone)]
pub struct CardRenderer {
    card: CardSpec,
    barcode: BarcodeSettings,
    text: AssetConfig,
    layout: CardLayout,
}

impl CardRenderer {
    pub fn new(config: &EngineConfig) -> Self {
        Self::with_layout(config, CardLayout::standard())
    }

    pub fn with_layout(config: &EngineConfig, layout: CardLayout) -> Self {
        Self {
            card: config.card.clone(),
            barcode: config.barcode.clone(),
            text: config.assets.clone(),
            layout,
        }
    }

    pub fn layout(&self) -> &CardLayout {
        &self.layout
    }

    pub fn card(&self) -> &CardSpec {
        &self.card
    }

    /// Encoder sized to the barcode box, so accepted payloads print at their
    /// native module size. Without a barcode box only the symbology limits
    /// apply.
    pub fn barcode_encoder(&self) -> Result<BarcodeEncoder> {
        match self.rect(CardField::Barcode) {
            Some(r) => BarcodeEncoder::within_box(&self.barcode, r.width, r.height),
            None => BarcodeEncoder::from_settings(&self.barcode),
        }
    }

    fn rect(&self, field: CardField) -> Option<PixelRect> {
        self.layout.rect(field, self.card.dpi)
    }

    fn canvas(&self, assets: &TemplateAssets) -> RgbaImage {
        let (width, height) = (self.card.width_px(), self.card.height_px());
        let mut canvas = fit_layer(&assets.base, width, height);
        imageops::overlay(&mut canvas, &fit_layer(&assets.security, width, height), 0, 0);
        canvas
    }

    /// Front face: emblem, titles, photo, labelled fields, signature box.
    #[instrument(skip_all, fields(license = %identity.license_number))]
    pub fn render_front(
        &self,
        identity: &Identity,
        photo: &ProcessedPhoto,
        assets: &TemplateAssets,
    ) -> Result<RgbImage> {
        let mut canvas = self.canvas(assets);
        let (width, height) = canvas.dimensions();
        imageops::overlay(&mut canvas, &fit_layer(&assets.watermark, width, height), 0, 0);
        let face = &assets.face;

        if let Some(r) = self.rect(CardField::Emblem) {
            let emblem = fit_layer(&assets.emblem, r.width, r.height);
            imageops::overlay(&mut canvas, &emblem, i64::from(r.x), i64::from(r.y));
        }
        if let Some(r) = self.rect(CardField::Title) {
            let centre = (r.x + r.width / 2) as i32;
            face.draw_centred(&mut canvas, &self.text.country_title, centre, r.y as i32, TITLE_PX, ACCENT);
        }
        if let Some(r) = self.rect(CardField::Subtitle) {
            let centre = (r.x + r.width / 2) as i32;
            face.draw_centred(&mut canvas, &self.text.card_title, centre, r.y as i32, SUBTITLE_PX, INK);
        }

        if let Some(r) = self.rect(CardField::Photo) {
            let pixels = photo.to_rgb()?;
            let pixels = if pixels.dimensions() == (r.width, r.height) {
                pixels
            } else {
                imageops::resize(&pixels, r.width, r.height, FilterType::Lanczos3)
            };
            let rgba = DynamicImage::ImageRgb8(pixels).to_rgba8();
            imageops::replace(&mut canvas, &rgba, i64::from(r.x), i64::from(r.y));
            outline(&mut canvas, r, INK);
        }

        for field in CardField::FRONT_TEXT {
            let Some(r) = self.rect(field) else { continue };
            let value = front_value(identity, field);
            face.draw(&mut canvas, field.label(), r.x as i32, r.y as i32, LABEL_PX, LABEL);
            face.draw(&mut canvas, &value, r.x as i32, (r.y + 12) as i32, VALUE_PX, INK);
        }

        if let Some(r) = self.rect(CardField::Signature) {
            outline(&mut canvas, r, LABEL);
            face.draw(
                &mut canvas,
                CardField::Signature.label(),
                (r.x + 4) as i32,
                (r.bottom() + 2) as i32,
                LABEL_PX,
                LABEL,
            );
        }

        debug!(width, height, "Front rendered");
        Ok(flatten(canvas))
    }

    /// Back face: category grid, barcode, fingerprint box, MRZ, footer.
    #[instrument(skip_all, fields(license = %identity.license_number, rows = symbol.rows()))]
    pub fn render_back(
        &self,
        identity: &Identity,
        mrz: &MrzPayload,
        symbol: &BarcodeSymbol,
        assets: &TemplateAssets,
    ) -> Result<RgbImage> {
        let mut canvas = self.canvas(assets);
        let face = &assets.face;

        if let Some(r) = self.rect(CardField::RestrictionsHeader) {
            let restrictions = if identity.restrictions.is_empty() {
                "NONE".to_owned()
            } else {
                identity.restrictions.join(", ").to_uppercase()
            };
            face.draw(
                &mut canvas,
                &format!("RESTRICTIONS: {restrictions}"),
                r.x as i32,
                r.y as i32,
                SUBTITLE_PX,
                INK,
            );
        }

        if let Some(grid) = self.rect(CardField::CategoryGrid) {
            self.draw_category_grid(&mut canvas, grid, identity.category, assets);
        }
        if let Some(r) = self.rect(CardField::CategoryLegend) {
            let legend = format!(
                "{}: {}",
                identity.category,
                identity.category.description().to_uppercase()
            );
            face.draw(&mut canvas, &legend, r.x as i32, r.y as i32, LABEL_PX * 2, INK);
        }

        if let Some(r) = self.rect(CardField::Barcode) {
            let (w, h) = symbol.raster_size(&self.barcode);
            if w > r.width || h > r.height {
                return Err(CardwerkError::InvalidValue {
                    kind: "barcode symbol",
                    value: format!("{w}x{h} px does not fit the {}x{} px barcode box", r.width, r.height),
                });
            }
            let raster = DynamicImage::ImageLuma8(symbol.render(&self.barcode)).to_rgba8();
            let x = r.x + (r.width - raster.width()) / 2;
            let y = r.y + (r.height - raster.height()) / 2;
            imageops::replace(&mut canvas, &raster, i64::from(x), i64::from(y));
            debug!(w = raster.width(), h = raster.height(), "Barcode placed");
        }

        if let Some(r) = self.rect(CardField::Fingerprint) {
            draw_filled_rect_mut(
                &mut canvas,
                Rect::at(r.x as i32, r.y as i32).of_size(r.width.max(1), r.height.max(1)),
                Rgba([255, 255, 255, 255]),
            );
            outline(&mut canvas, r, INK);
            face.draw(
                &mut canvas,
                CardField::Fingerprint.label(),
                r.x as i32,
                (r.bottom() + 4) as i32,
                LABEL_PX,
                LABEL,
            );
        }

        if self.text.render_mrz {
            if let Some(r) = self.rect(CardField::Mrz) {
                let line_height = MRZ_PX + MRZ_PX / 3;
                for (i, line) in mrz.lines.iter().enumerate() {
                    let y = r.y + i as u32 * line_height;
                    face.draw(&mut canvas, line, r.x as i32, y as i32, MRZ_PX, INK);
                }
            }
        }

        if let Some(r) = self.rect(CardField::Footer) {
            let footer = self.text.authority_line.to_uppercase();
            face.draw(&mut canvas, &footer, r.x as i32, r.y as i32, LABEL_PX * 2, LABEL);
        }

        debug!("Back rendered");
        Ok(flatten(canvas))
    }

    fn draw_category_grid(
        &self,
        canvas: &mut RgbaImage,
        grid: PixelRect,
        held: LicenseCategory,
        assets: &TemplateAssets,
    ) {
        let dpi = self.card.dpi;
        let cell_w = cardwerk_core::config::mm_to_px_round(self.layout.category_cell_mm.0, dpi).max(2);
        let cell_h = cardwerk_core::config::mm_to_px_round(self.layout.category_cell_mm.1, dpi).max(2);
        let columns = self.layout.category_columns.max(1);

        for (i, category) in LicenseCategory::ALL.iter().enumerate() {
            let x = grid.x + (i % columns) as u32 * cell_w;
            let y = grid.y + (i / columns) as u32 * cell_h;
            let cell = PixelRect {
                x,
                y,
                width: cell_w - 4,
                height: cell_h - 4,
            };
            let colour = if *category == held {
                draw_filled_rect_mut(
                    canvas,
                    Rect::at(cell.x as i32, cell.y as i32).of_size(cell.width, cell.height),
                    ACCENT,
                );
                Rgba([255, 255, 255, 255])
            } else {
                outline(canvas, cell, LABEL);
                INK
            };
            assets.face.draw(
                canvas,
                category.as_str(),
                (cell.x + 6) as i32,
                (cell.y + 4) as i32,
                LABEL_PX * 2,
                colour,
            );
        }
    }
}

fn front_value(identity: &Identity, field: CardField) -> String {
    match field {
        CardField::Surname => identity.surname.to_uppercase(),
        CardField::Names => identity.given_names.to_uppercase(),
        CardField::IdNumber => identity.id_number.clone(),
        CardField::BirthDate => print_date(identity.birth_date),
        CardField::IssueDate => print_date(identity.issue_date),
        CardField::ExpiryDate => print_date(identity.expiry_date),
        CardField::LicenseNumber => identity.license_number.to_uppercase(),
        CardField::Category => identity.category.to_string(),
        CardField::Restrictions => {
            if identity.restrictions.is_empty() {
                "NONE".into()
            } else {
                identity.restrictions.join(", ").to_uppercase()
            }
        }
        _ => String::new(),
    }
}

fn print_date(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

fn outline(canvas: &mut RgbaImage, r: PixelRect, colour: Rgba<u8>) {
    if r.width > 0 && r.height > 0 {
        draw_hollow_rect_mut(canvas, Rect::at(r.x as i32, r.y as i32).of_size(r.width, r.height), colour);
    }
}

/// Layers produced at load time already have the right size; files with a
/// different size are stretched.
fn fit_layer(layer: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    if layer.dimensions() == (width, height) {
        layer.clone()
    } else {
        imageops::resize(layer, width, height, FilterType::Triangle)
    }
}

fn flatten(canvas: RgbaImage) -> RgbImage {
    DynamicImage::ImageRgba8(canvas).to_rgb8()
}

/// Encode a rendered face as PNG.
pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    image
        .write_with_encoder(PngEncoder::new(&mut buffer))
        .map_err(|err| CardwerkError::ImageError(format!("PNG encoding failed: {err}")))?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::barcode::{BarcodePayload, decode_raster};
    use crate::mrz::MrzEncoder;
    use crate::photo::PhotoNormalizer;
    use cardwerk_core::types::Sex;
    use image::Rgb;

    fn identity() -> Identity {
        Identity {
            surname: "Doe".into(),
            given_names: "John".into(),
            id_number: "9001015800085".into(),
            license_number: "L-ABCD-1234-EFGH".into(),
            birth_date: NaiveDate::from_ymd_opt(1990, 1, 1).unwrap(),
            issue_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            expiry_date: NaiveDate::from_ymd_opt(2029, 2, 28).unwrap(),
            sex: Sex::Male,
            nationality: None,
            category: LicenseCategory::B,
            restrictions: vec![],
        }
    }

    fn photo(config: &EngineConfig) -> ProcessedPhoto {
        let img = RgbImage::from_fn(400, 500, |x, y| {
            if (x / 40 + y / 40) % 2 == 0 {
                Rgb([30, 40, 50])
            } else {
                Rgb([220, 210, 200])
            }
        });
        let mut raw = Vec::new();
        img.write_with_encoder(PngEncoder::new(&mut raw)).unwrap();
        PhotoNormalizer::new(config.photo.clone()).normalize(&raw, None).unwrap()
    }

    fn back_parts(config: &EngineConfig) -> (MrzPayload, BarcodeSymbol) {
        let id = identity();
        let mrz = MrzEncoder::new(&config.assets.issuing_state).encode(&id).unwrap();
        let payload = BarcodePayload::from_identity(&id, &config.assets.issuing_state)
            .to_bytes()
            .unwrap();
        let symbol = CardRenderer::new(config)
            .barcode_encoder()
            .unwrap()
            .encode(&payload)
            .unwrap();
        (mrz, symbol)
    }

    #[test]
    fn both_faces_have_card_dimensions() {
        let config = EngineConfig::default();
        let renderer = CardRenderer::new(&config);
        let assets = TemplateAssets::procedural(&config.card, renderer.layout());
        let front = renderer.render_front(&identity(), &photo(&config), &assets).unwrap();
        let (mrz, symbol) = back_parts(&config);
        let back = renderer.render_back(&identity(), &mrz, &symbol, &assets).unwrap();
        assert_eq!(front.dimensions(), (1012, 638));
        assert_eq!(back.dimensions(), (1012, 638));
    }

    #[test]
    fn rendering_is_byte_identical() {
        let config = EngineConfig::default();
        let renderer = CardRenderer::new(&config);
        let assets = TemplateAssets::procedural(&config.card, renderer.layout());
        let p = photo(&config);
        let a = encode_png(&renderer.render_front(&identity(), &p, &assets).unwrap()).unwrap();
        let b = encode_png(&renderer.render_front(&identity(), &p, &assets).unwrap()).unwrap();
        assert_eq!(a, b);
    }

    /// Cut the barcode raster back out of a rendered back face.
    fn printed_barcode(renderer: &CardRenderer, back: &RgbImage, symbol: &BarcodeSymbol) -> image::GrayImage {
        let (w, h) = symbol.raster_size(&renderer.barcode);
        let r = renderer.layout().rect(CardField::Barcode, 300).unwrap();
        let x = r.x + (r.width - w) / 2;
        let y = r.y + (r.height - h) / 2;
        let region = imageops::crop_imm(back, x, y, w, h).to_image();
        DynamicImage::ImageRgb8(region).to_luma8()
    }

    #[test]
    fn barcode_on_the_back_is_readable() {
        let config = EngineConfig::default();
        let renderer = CardRenderer::new(&config);
        let assets = TemplateAssets::procedural(&config.card, renderer.layout());
        let (mrz, symbol) = back_parts(&config);
        let back = renderer.render_back(&identity(), &mrz, &symbol, &assets).unwrap();

        let decoded = decode_raster(&printed_barcode(&renderer, &back, &symbol)).unwrap();
        let payload = BarcodePayload::from_bytes(&decoded).unwrap();
        assert_eq!(payload.ln, "L-ABCD-1234-EFGH");
        assert_eq!(payload, BarcodePayload::from_identity(&identity(), &config.assets.issuing_state));
    }

    #[test]
    fn largest_accepted_payload_prints_readable() {
        let config = EngineConfig::default();
        let renderer = CardRenderer::new(&config);
        let assets = TemplateAssets::procedural(&config.card, renderer.layout());
        let encoder = renderer.barcode_encoder().unwrap();
        assert_eq!(encoder.capacity(), 256);

        let payload: Vec<u8> = (0..encoder.capacity()).map(|i| b'A' + (i % 26) as u8).collect();
        let symbol = encoder.encode(&payload).unwrap();
        let (w, h) = symbol.raster_size(&config.barcode);
        let r = renderer.layout().rect(CardField::Barcode, 300).unwrap();
        assert!(w <= r.width && h <= r.height);

        let (mrz, _) = back_parts(&config);
        let back = renderer.render_back(&identity(), &mrz, &symbol, &assets).unwrap();
        let decoded = decode_raster(&printed_barcode(&renderer, &back, &symbol)).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn payload_over_the_box_budget_is_rejected() {
        let config = EngineConfig::default();
        let encoder = CardRenderer::new(&config).barcode_encoder().unwrap();
        let mut id = identity();
        id.license_number = "L".repeat(400);
        let payload = BarcodePayload::from_identity(&id, &config.assets.issuing_state)
            .to_bytes()
            .unwrap();
        assert!(matches!(
            encoder.encode(&payload),
            Err(CardwerkError::PayloadTooLarge { capacity: 256, .. })
        ));
    }

    #[test]
    fn oversized_symbol_is_not_rescaled() {
        let config = EngineConfig::default();
        let renderer = CardRenderer::new(&config);
        let assets = TemplateAssets::procedural(&config.card, renderer.layout());
        let tall = crate::barcode::BarcodeEncoder::from_settings(&config.barcode)
            .unwrap()
            .encode(&vec![b'L'; 500])
            .unwrap();
        assert!(tall.rows() > 20);
        let (mrz, _) = back_parts(&config);
        assert!(matches!(
            renderer.render_back(&identity(), &mrz, &tall, &assets),
            Err(CardwerkError::InvalidValue { kind: "barcode symbol", .. })
        ));
    }

    #[test]
    fn photo_lands_in_its_box() {
        let config = EngineConfig::default();
        let renderer = CardRenderer::new(&config);
        let assets = TemplateAssets::procedural(&config.card, renderer.layout());
        let p = photo(&config);
        let front = renderer.render_front(&identity(), &p, &assets).unwrap();
        let r = renderer.layout().rect(CardField::Photo, 300).unwrap();
        let pixels = p.to_rgb().unwrap();
        assert_eq!(front.get_pixel(r.x + 50, r.y + 50), pixels.get_pixel(50, 50));
    }
}
