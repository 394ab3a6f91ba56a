// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Template layers. Each layer comes from a named file when the asset
// directory has one, and is drawn procedurally otherwise. Loading never
// fails: an unreadable file is logged and replaced by the procedural layer.

use std::path::{Path, PathBuf};

use ab_glyph::FontVec;
use cardwerk_core::config::{AssetConfig, CardSpec};
use cardwerk_core::error::CardwerkError;
use image::imageops::FilterType;
use image::{Rgba, RgbaImage};
use imageproc::drawing::{
    draw_filled_ellipse_mut, draw_filled_rect_mut, draw_hollow_ellipse_mut,
    draw_hollow_polygon_mut, draw_hollow_rect_mut, draw_polygon_mut,
};
use imageproc::point::Point;
use imageproc::rect::Rect;
use tracing::{debug, info, warn};

use super::layout::{CardField, CardLayout};
use super::text::TextFace;

/// Named template layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateLayer {
    BaseTemplate,
    SecurityBackground,
    Watermark,
    Emblem,
}

impl TemplateLayer {
    pub const ALL: [TemplateLayer; 4] = [
        TemplateLayer::BaseTemplate,
        TemplateLayer::SecurityBackground,
        TemplateLayer::Watermark,
        TemplateLayer::Emblem,
    ];

    pub fn file_name(&self) -> &'static str {
        match self {
            Self::BaseTemplate => "base_template.png",
            Self::SecurityBackground => "security_background.png",
            Self::Watermark => "watermark.png",
            Self::Emblem => "emblem.png",
        }
    }
}

/// Where a layer's pixels come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerSource {
    File(PathBuf),
    Procedural,
}

impl LayerSource {
    /// Pick the file variant when `directory` holds the layer's file.
    pub fn select(directory: Option<&Path>, layer: TemplateLayer) -> Self {
        match directory.map(|dir| dir.join(layer.file_name())) {
            Some(path) if path.is_file() => Self::File(path),
            _ => Self::Procedural,
        }
    }

    /// Produce the layer at exactly `width` x `height`.
    pub fn produce(&self, layer: TemplateLayer, width: u32, height: u32, watermark: &str) -> RgbaImage {
        if let Self::File(path) = self {
            match image::open(path) {
                Ok(img) => {
                    let img = if img.width() == width && img.height() == height {
                        img.to_rgba8()
                    } else {
                        img.resize_exact(width, height, FilterType::Lanczos3).to_rgba8()
                    };
                    debug!(?layer, path = %path.display(), "Template layer loaded from file");
                    return img;
                }
                Err(err) => {
                    let missing = CardwerkError::AssetMissing(format!("{}: {err}", path.display()));
                    warn!(error = %missing, ?layer, "Falling back to procedural layer");
                }
            }
        }
        procedural(layer, width, height, watermark)
    }
}

/// All layers and the text face, ready for rendering.
#[derive(Debug)]
pub struct TemplateAssets {
    pub base: RgbaImage,
    pub security: RgbaImage,
    pub watermark: RgbaImage,
    pub emblem: RgbaImage,
    pub face: TextFace,
}

impl TemplateAssets {
    /// Load every layer for the given card and layout.
    pub fn load(config: &AssetConfig, card: &CardSpec, layout: &CardLayout) -> Self {
        let (width, height) = (card.width_px(), card.height_px());
        let (emblem_w, emblem_h) = layout
            .rect(CardField::Emblem, card.dpi)
            .map(|r| (r.width.max(1), r.height.max(1)))
            .unwrap_or((100, 60));
        let directory = config.directory.as_deref();

        let mut file_layers = 0;
        let mut layer = |which: TemplateLayer, w: u32, h: u32| {
            let source = LayerSource::select(directory, which);
            if matches!(source, LayerSource::File(_)) {
                file_layers += 1;
            } else if directory.is_some() {
                let missing = CardwerkError::AssetMissing(which.file_name().to_owned());
                warn!(error = %missing, "Using procedural layer");
            }
            source.produce(which, w, h, &config.watermark_text)
        };

        let base = layer(TemplateLayer::BaseTemplate, width, height);
        let security = layer(TemplateLayer::SecurityBackground, width, height);
        let watermark = layer(TemplateLayer::Watermark, width, height);
        let emblem = layer(TemplateLayer::Emblem, emblem_w, emblem_h);
        let face = load_face(config.font_file.as_deref());

        info!(file_layers, face = ?face, "Template assets ready");
        Self {
            base,
            security,
            watermark,
            emblem,
            face,
        }
    }

    /// Fully procedural assets.
    pub fn procedural(card: &CardSpec, layout: &CardLayout) -> Self {
        Self::load(&AssetConfig::default(), card, layout)
    }
}

fn load_face(font_file: Option<&Path>) -> TextFace {
    let Some(path) = font_file else {
        return TextFace::Bitmap;
    };
    let loaded = std::fs::read(path)
        .map_err(|err| err.to_string())
        .and_then(|bytes| FontVec::try_from_vec(bytes).map_err(|err| err.to_string()));
    match loaded {
        Ok(font) => TextFace::Outline(font),
        Err(reason) => {
            let missing = CardwerkError::AssetMissing(format!("{}: {reason}", path.display()));
            warn!(error = %missing, "Falling back to bitmap face");
            TextFace::Bitmap
        }
    }
}

const PAPER: Rgba<u8> = Rgba([246, 248, 240, 255]);
const BORDER: Rgba<u8> = Rgba([0, 100, 60, 255]);

fn procedural(layer: TemplateLayer, width: u32, height: u32, watermark: &str) -> RgbaImage {
    match layer {
        TemplateLayer::BaseTemplate => base_template(width, height),
        TemplateLayer::SecurityBackground => security_background(width, height),
        TemplateLayer::Watermark => watermark_pattern(width, height, watermark),
        TemplateLayer::Emblem => emblem(width, height),
    }
}

fn base_template(width: u32, height: u32) -> RgbaImage {
    let mut img = RgbaImage::from_pixel(width, height, PAPER);
    for inset in 0..4u32 {
        if width > 2 * inset && height > 2 * inset {
            draw_hollow_rect_mut(
                &mut img,
                Rect::at(inset as i32, inset as i32).of_size(width - 2 * inset, height - 2 * inset),
                BORDER,
            );
        }
    }
    img
}

/// Translucent tint zones plus fine guilloche waves.
fn security_background(width: u32, height: u32) -> RgbaImage {
    let mut img = RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 0]));
    let tint = Rgba([255, 150, 150, 40]);
    let soft = Rgba([255, 180, 180, 30]);
    draw_filled_rect_mut(&mut img, Rect::at(0, 0).of_size((width / 3).max(1), height), tint);
    draw_filled_rect_mut(
        &mut img,
        Rect::at((width * 2 / 3) as i32, 0).of_size((width - width * 2 / 3).max(1), (height / 2).max(1)),
        tint,
    );
    draw_filled_rect_mut(
        &mut img,
        Rect::at((width / 2) as i32, (height / 2) as i32)
            .of_size((width - width / 2).max(1), (height - height / 2).max(1)),
        soft,
    );

    let line = Rgba([0, 120, 90, 36]);
    for band in 0..6u32 {
        let base_y = f64::from(height) * (f64::from(band) + 0.5) / 6.0;
        let amplitude = 6.0 + f64::from(band % 3) * 3.0;
        let period = 90.0 + f64::from(band) * 14.0;
        for x in 0..width {
            let y = base_y + amplitude * (f64::from(x) * std::f64::consts::TAU / period).sin();
            let y = y.round() as i64;
            if (0..i64::from(height)).contains(&y) {
                img.put_pixel(x, y as u32, line);
            }
        }
    }
    img
}

/// Repeated issuer text on a staggered grid.
fn watermark_pattern(width: u32, height: u32, text: &str) -> RgbaImage {
    let mut img = RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 0]));
    if text.is_empty() {
        return img;
    }
    let face = TextFace::Bitmap;
    let size = 28;
    let (text_w, text_h) = face.measure(text, size);
    let step_x = (text_w * 3).max(1) as i32;
    let step_y = (text_h * 4).max(1) as i32;
    let colour = Rgba([200, 200, 200, 30]);
    let mut row = 0;
    let mut y = -(text_h as i32);
    while y < height as i32 {
        let offset = if row % 2 == 0 { 0 } else { step_x / 2 };
        let mut x = -(text_w as i32) + offset;
        while x < width as i32 {
            face.draw(&mut img, text, x, y, size, colour);
            x += step_x;
        }
        y += step_y;
        row += 1;
    }
    img
}

/// Simplified shield with a central seal.
fn emblem(width: u32, height: u32) -> RgbaImage {
    let mut img = RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 0]));
    let (cx, cy) = ((width / 2) as i32, (height / 2) as i32);
    let half_w = (width as i32 * 25 / 100).max(2);
    let half_h = (height as i32 * 33 / 100).max(2);

    let shield = [
        Point::new(cx - half_w, cy - half_h),
        Point::new(cx + half_w, cy - half_h),
        Point::new(cx + half_w, cy + half_h / 2),
        Point::new(cx, cy + half_h),
        Point::new(cx - half_w, cy + half_h / 2),
    ];
    draw_polygon_mut(&mut img, &shield, Rgba([0, 100, 0, 255]));
    let outline: Vec<Point<f32>> = shield
        .iter()
        .map(|p| Point::new(p.x as f32, p.y as f32))
        .collect();
    draw_hollow_polygon_mut(&mut img, &outline, Rgba([0, 0, 0, 255]));

    let seal_rx = (half_w * 6 / 10).max(1);
    let seal_ry = (half_h * 4 / 10).max(1);
    draw_filled_ellipse_mut(&mut img, (cx, cy - half_h / 4), seal_rx, seal_ry, Rgba([255, 210, 0, 255]));
    draw_hollow_ellipse_mut(&mut img, (cx, cy - half_h / 4), seal_rx, seal_ry, Rgba([0, 0, 0, 255]));
    img
}
