// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Photo normalizer: subject-aware crop to the biometric aspect ratio, exact
// Lanczos3 resize, sharpening and auto-contrast, then JPEG at a fixed quality
// and density.

use cardwerk_core::config::PhotoSpec;
use cardwerk_core::error::{CardwerkError, Result};
use cardwerk_core::types::CropRegion;
use image::codecs::jpeg::{JpegEncoder, PixelDensity};
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, Rgb, RgbImage};
use imageproc::filter::gaussian_blur_f32;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};

/// Longest edge of the working copy used for subject detection.
const DETECTION_EDGE: u32 = 256;
/// Luma distance from the border mean that counts as subject.
const SUBJECT_THRESHOLD: f32 = 28.0;
/// Fraction of histogram clipped at each end by auto-contrast.
const CONTRAST_CUTOFF: f64 = 0.01;

/// A photo normalized to the biometric photo format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedPhoto {
    /// Encoded JPEG.
    pub jpeg: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// SHA-256 hex of `jpeg`.
    pub hash: String,
    /// Processing parameters the photo was produced with.
    pub parameters: String,
    /// Source rectangle the photo was cut from, when known.
    pub crop: Option<CropRegion>,
    pub enhanced: bool,
}

impl ProcessedPhoto {
    /// Wrap a previously normalized JPEG (for example one read from cache).
    pub fn from_jpeg(jpeg: Vec<u8>, parameters: String) -> Result<Self> {
        let decoded = decode(&jpeg)?;
        let hash = hex::encode(Sha256::digest(&jpeg));
        Ok(Self {
            width: decoded.width(),
            height: decoded.height(),
            jpeg,
            hash,
            parameters,
            crop: None,
            enhanced: false,
        })
    }

    /// Decode to RGB pixels. Renderers always start from the encoded JPEG so
    /// cached and fresh photos draw identically.
    pub fn to_rgb(&self) -> Result<RgbImage> {
        Ok(decode(&self.jpeg)?.to_rgb8())
    }
}

fn decode(bytes: &[u8]) -> Result<DynamicImage> {
    image::load_from_memory(bytes)
        .map_err(|err| CardwerkError::SourceUnavailable(format!("decode failed: {err}")))
}

/// File extension for encoded source bytes; `bin` when the format is unknown.
pub fn source_extension(raw: &[u8]) -> &'static str {
    image::guess_format(raw)
        .ok()
        .and_then(|format| format.extensions_str().first().copied())
        .unwrap_or("bin")
}

/// Turns arbitrary portraits into [`ProcessedPhoto`]s.
#[derive(Debug, Clone)]
pub struct PhotoNormalizer {
    spec: PhotoSpec,
}

impl PhotoNormalizer {
    pub fn new(spec: PhotoSpec) -> Self {
        Self { spec }
    }

    pub fn spec(&self) -> &PhotoSpec {
        &self.spec
    }

    /// Normalize encoded image bytes. `region` marks the subject when the
    /// caller already knows it.
    #[instrument(skip(self, raw), fields(raw_len = raw.len(), region = region.is_some()))]
    pub fn normalize(&self, raw: &[u8], region: Option<CropRegion>) -> Result<ProcessedPhoto> {
        let source = decode(raw)?.to_rgb8();
        let (width, height) = source.dimensions();
        if width < self.spec.min_source_width || height < self.spec.min_source_height {
            return Err(CardwerkError::DimensionError {
                width,
                height,
                min_width: self.spec.min_source_width,
                min_height: self.spec.min_source_height,
            });
        }

        let crop = match region.and_then(|r| clamp_region(r, width, height)) {
            Some(subject) => self.tight_window(subject, width, height),
            None => {
                let subject = detect_subject(&source);
                if subject.is_none() {
                    debug!("No distinct subject found; centre crop");
                }
                self.largest_window(subject, width, height)
            }
        };
        debug!(x = crop.x, y = crop.y, w = crop.width, h = crop.height, "Crop window");

        let cropped = image::imageops::crop_imm(&source, crop.x, crop.y, crop.width, crop.height)
            .to_image();
        let resized = image::imageops::resize(
            &cropped,
            self.spec.width,
            self.spec.height,
            FilterType::Lanczos3,
        );

        let (pixels, enhanced) = match enhance(&resized) {
            Some(image) => (image, true),
            None => {
                warn!("Enhancement skipped: degenerate histogram");
                (resized, false)
            }
        };

        let jpeg = self.encode_jpeg(&pixels)?;
        let hash = hex::encode(Sha256::digest(&jpeg));
        info!(
            width = pixels.width(),
            height = pixels.height(),
            bytes = jpeg.len(),
            enhanced,
            "Photo normalized"
        );

        Ok(ProcessedPhoto {
            jpeg,
            width: pixels.width(),
            height: pixels.height(),
            hash,
            parameters: self.spec.parameter_key(),
            crop: Some(crop),
            enhanced,
        })
    }

    fn encode_jpeg(&self, pixels: &RgbImage) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut buffer, self.spec.jpeg_quality);
        let dpi = u16::try_from(self.spec.dpi).unwrap_or(u16::MAX);
        encoder.set_pixel_density(PixelDensity::dpi(dpi));
        pixels
            .write_with_encoder(encoder)
            .map_err(|err| CardwerkError::ImageError(format!("JPEG encoding failed: {err}")))?;
        Ok(buffer)
    }

    fn aspect(&self) -> f64 {
        f64::from(self.spec.width) / f64::from(self.spec.height)
    }

    /// Largest target-aspect window, centred on the subject when there is one.
    fn largest_window(&self, subject: Option<CropRegion>, width: u32, height: u32) -> CropRegion {
        let aspect = self.aspect();
        let (win_w, win_h) = if f64::from(width) / f64::from(height) > aspect {
            (((f64::from(height) * aspect).round() as u32).min(width), height)
        } else {
            (width, ((f64::from(width) / aspect).round() as u32).min(height))
        };
        let (cx, cy) = match subject {
            Some(s) => (s.x + s.width / 2, s.y + s.height / 2),
            None => (width / 2, height / 2),
        };
        place(cx, cy, win_w, win_h, width, height)
    }

    /// Smallest target-aspect window covering `subject`, never below the
    /// minimum usable source size.
    fn tight_window(&self, subject: CropRegion, width: u32, height: u32) -> CropRegion {
        let aspect = self.aspect();
        let mut win_w = f64::from(subject.width.max(self.spec.min_source_width));
        let mut win_h = f64::from(subject.height.max(self.spec.min_source_height));
        if win_w / win_h > aspect {
            win_h = win_w / aspect;
        } else {
            win_w = win_h * aspect;
        }
        // Shrink uniformly if the window cannot fit the image.
        let scale = (f64::from(width) / win_w).min(f64::from(height) / win_h).min(1.0);
        let win_w = ((win_w * scale).round() as u32).clamp(1, width);
        let win_h = ((win_h * scale).round() as u32).clamp(1, height);
        place(
            subject.x + subject.width / 2,
            subject.y + subject.height / 2,
            win_w,
            win_h,
            width,
            height,
        )
    }
}

/// Centre a window on (cx, cy), shifted to stay inside the image.
fn place(cx: u32, cy: u32, win_w: u32, win_h: u32, width: u32, height: u32) -> CropRegion {
    let x = cx.saturating_sub(win_w / 2).min(width - win_w);
    let y = cy.saturating_sub(win_h / 2).min(height - win_h);
    CropRegion {
        x,
        y,
        width: win_w,
        height: win_h,
    }
}

fn clamp_region(region: CropRegion, width: u32, height: u32) -> Option<CropRegion> {
    if region.x >= width || region.y >= height {
        return None;
    }
    let w = region.width.min(width - region.x);
    let h = region.height.min(height - region.y);
    (w > 0 && h > 0).then_some(CropRegion {
        x: region.x,
        y: region.y,
        width: w,
        height: h,
    })
}

/// Estimate the subject box by background difference against the border.
fn detect_subject(source: &RgbImage) -> Option<CropRegion> {
    let (width, height) = source.dimensions();
    let scale = (f64::from(DETECTION_EDGE) / f64::from(width.max(height))).min(1.0);
    let small_w = ((f64::from(width) * scale).round() as u32).max(1);
    let small_h = ((f64::from(height) * scale).round() as u32).max(1);
    let luma: GrayImage = DynamicImage::ImageRgb8(source.clone())
        .resize_exact(small_w, small_h, FilterType::Triangle)
        .to_luma8();
    let blurred = gaussian_blur_f32(&luma, 1.5);

    let band = (small_w.min(small_h) / 20).max(1);
    let mut border_sum = 0f64;
    let mut border_count = 0u32;
    for (x, y, p) in blurred.enumerate_pixels() {
        if x < band || y < band || x >= small_w - band || y >= small_h - band {
            border_sum += f64::from(p.0[0]);
            border_count += 1;
        }
    }
    let background = (border_sum / f64::from(border_count.max(1))) as f32;

    let (mut min_x, mut min_y, mut max_x, mut max_y) = (u32::MAX, u32::MAX, 0u32, 0u32);
    let mut hits = 0u32;
    for (x, y, p) in blurred.enumerate_pixels() {
        if (f32::from(p.0[0]) - background).abs() > SUBJECT_THRESHOLD {
            hits += 1;
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
    }
    if hits < (small_w * small_h) / 100 {
        return None;
    }

    let back = |v: u32| (f64::from(v) / scale).round() as u32;
    let x = back(min_x).min(width - 1);
    let y = back(min_y).min(height - 1);
    let right = back(max_x + 1).min(width);
    let bottom = back(max_y + 1).min(height);
    Some(CropRegion {
        x,
        y,
        width: right.saturating_sub(x).max(1),
        height: bottom.saturating_sub(y).max(1),
    })
}

/// Sharpen then auto-contrast. `None` when the histogram is too flat to
/// stretch.
fn enhance(image: &RgbImage) -> Option<RgbImage> {
    let sharpened = sharpen(image);
    auto_contrast(&sharpened)
}

/// 3x3 sharpening kernel blended 50/50 with the original.
fn sharpen(image: &RgbImage) -> RgbImage {
    const KERNEL: [[i32; 3]; 3] = [[0, -1, 0], [-1, 5, -1], [0, -1, 0]];
    let (width, height) = image.dimensions();

    RgbImage::from_fn(width, height, |x, y| {
        let mut acc = [0i32; 3];
        for (ky, row) in KERNEL.iter().enumerate() {
            for (kx, weight) in row.iter().enumerate() {
                if *weight == 0 {
                    continue;
                }
                let sx = (x as i64 + kx as i64 - 1).clamp(0, i64::from(width) - 1) as u32;
                let sy = (y as i64 + ky as i64 - 1).clamp(0, i64::from(height) - 1) as u32;
                let p = image.get_pixel(sx, sy).0;
                for c in 0..3 {
                    acc[c] += weight * i32::from(p[c]);
                }
            }
        }
        let original = image.get_pixel(x, y).0;
        let blend = |c: usize| -> u8 {
            let sharp = acc[c].clamp(0, 255);
            ((i32::from(original[c]) + sharp + 1) / 2) as u8
        };
        Rgb([blend(0), blend(1), blend(2)])
    })
}

/// Stretch luma so the 1st and 99th percentiles map to 0 and 255.
fn auto_contrast(image: &RgbImage) -> Option<RgbImage> {
    let mut histogram = [0u64; 256];
    for p in image.pixels() {
        histogram[usize::from(luma_of(p))] += 1;
    }
    let total: u64 = histogram.iter().sum();
    let cutoff = (total as f64 * CONTRAST_CUTOFF) as u64;

    let mut seen = 0u64;
    let mut low = 0usize;
    for (value, count) in histogram.iter().enumerate() {
        seen += count;
        if seen > cutoff {
            low = value;
            break;
        }
    }
    seen = 0;
    let mut high = 255usize;
    for (value, count) in histogram.iter().enumerate().rev() {
        seen += count;
        if seen > cutoff {
            high = value;
            break;
        }
    }
    if high <= low + 1 {
        return None;
    }

    let (low, span) = (low as i32, (high - low) as i32);
    let mut lut = [0u8; 256];
    for (value, slot) in lut.iter_mut().enumerate() {
        *slot = (((value as i32 - low) * 255 + span / 2) / span).clamp(0, 255) as u8;
    }
    let mut out = image.clone();
    for p in out.pixels_mut() {
        for c in p.0.iter_mut() {
            *c = lut[usize::from(*c)];
        }
    }
    Some(out)
}

fn luma_of(p: &Rgb<u8>) -> u8 {
    let [r, g, b] = p.0;
    ((u32::from(r) * 299 + u32::from(g) * 587 + u32::from(b) * 114) / 1000) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Dark ellipse ("head") on a light background.
    fn portrait(width: u32, height: u32) -> Vec<u8> {
        let (cx, cy) = (width as f64 * 0.55, height as f64 * 0.4);
        let (rx, ry) = (width as f64 * 0.18, height as f64 * 0.25);
        let img = RgbImage::from_fn(width, height, |x, y| {
            let dx = (x as f64 - cx) / rx;
            let dy = (y as f64 - cy) / ry;
            if dx * dx + dy * dy <= 1.0 {
                Rgb([120, 80, 60])
            } else {
                Rgb([225, 230, 235])
            }
        });
        let mut buf = Vec::new();
        img.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, 90))
            .unwrap();
        buf
    }

    fn normalizer() -> PhotoNormalizer {
        PhotoNormalizer::new(PhotoSpec::default())
    }

    #[test]
    fn output_is_exact_for_any_source_shape() {
        for (w, h) in [(1024, 1024), (2000, 600), (300, 1200), (107, 130)] {
            let photo = normalizer().normalize(&portrait(w, h), None).unwrap();
            assert_eq!((photo.width, photo.height), (213, 260), "source {w}x{h}");
            let decoded = photo.to_rgb().unwrap();
            assert_eq!(decoded.dimensions(), (213, 260));
        }
    }

    #[test]
    fn crop_keeps_target_aspect_and_follows_subject() {
        let photo = normalizer().normalize(&portrait(1024, 1024), None).unwrap();
        let crop = photo.crop.unwrap();
        assert_eq!(crop.height, 1024);
        assert_eq!(crop.width, (1024.0 * 213.0 / 260.0_f64).round() as u32);
        // Subject centre sits right of the image centre.
        assert!(crop.x > (1024 - crop.width) / 2);
    }

    #[test]
    fn caller_region_overrides_detection() {
        let region = CropRegion {
            x: 10,
            y: 10,
            width: 200,
            height: 240,
        };
        let photo = normalizer()
            .normalize(&portrait(1024, 1024), Some(region))
            .unwrap();
        let crop = photo.crop.unwrap();
        assert!(crop.x <= 10 && crop.y <= 10);
        assert!(crop.width < 400);
    }

    #[test]
    fn too_small_source_is_a_dimension_error() {
        let err = normalizer().normalize(&portrait(100, 100), None).unwrap_err();
        assert!(matches!(err, CardwerkError::DimensionError { width: 100, .. }));
    }

    #[test]
    fn garbage_bytes_are_source_unavailable() {
        let err = normalizer().normalize(b"not an image", None).unwrap_err();
        assert!(matches!(err, CardwerkError::SourceUnavailable(_)));
    }

    #[test]
    fn flat_image_skips_enhancement() {
        let img = RgbImage::from_pixel(400, 500, Rgb([128, 128, 128]));
        let mut buf = Vec::new();
        img.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, 90))
            .unwrap();
        let photo = normalizer().normalize(&buf, None).unwrap();
        assert!(!photo.enhanced);
        assert_eq!((photo.width, photo.height), (213, 260));
    }

    #[test]
    fn normalization_is_deterministic() {
        let raw = portrait(800, 900);
        let a = normalizer().normalize(&raw, None).unwrap();
        let b = normalizer().normalize(&raw, None).unwrap();
        assert_eq!(a.hash, b.hash);
        assert!(a.enhanced);
    }

    #[test]
    fn cached_jpeg_rewraps_with_same_hash() {
        let photo = normalizer().normalize(&portrait(640, 640), None).unwrap();
        let again = ProcessedPhoto::from_jpeg(photo.jpeg.clone(), photo.parameters.clone()).unwrap();
        assert_eq!(again.hash, photo.hash);
        assert_eq!((again.width, again.height), (213, 260));
    }

    #[test]
    fn source_format_is_sniffed() {
        assert_eq!(source_extension(&portrait(200, 200)), "jpg");
        assert_eq!(source_extension(b"not an image"), "bin");
    }
}
