// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF417 reader for verifying printed symbols. Scanning and error correction
// are done by rxing; this module only frames the raster and maps the decoded
// text back to bytes.

use cardwerk_core::config::BarcodeSettings;
use cardwerk_core::error::{CardwerkError, Result};
use image::{GrayImage, Luma, imageops};
use rxing::BarcodeFormat;
use tracing::{debug, instrument};

use super::symbol::BarcodeSymbol;

/// White border added around the raster before scanning.
const MARGIN_PX: u32 = 16;

fn unreadable(reason: impl Into<String>) -> CardwerkError {
    CardwerkError::InvalidValue {
        kind: "barcode symbol",
        value: reason.into(),
    }
}

impl BarcodeSymbol {
    /// Recover the payload by drawing the symbol with `settings` and
    /// scanning the result.
    pub fn decode(&self, settings: &BarcodeSettings) -> Result<Vec<u8>> {
        decode_raster(&self.render(settings))
    }
}

/// Recover the payload from a grayscale image holding one PDF417 symbol.
#[instrument(skip(image), fields(width = image.width(), height = image.height()))]
pub fn decode_raster(image: &GrayImage) -> Result<Vec<u8>> {
    let (width, height) = (image.width() + 2 * MARGIN_PX, image.height() + 2 * MARGIN_PX);
    let mut framed = GrayImage::from_pixel(width, height, Luma([255]));
    imageops::replace(&mut framed, image, i64::from(MARGIN_PX), i64::from(MARGIN_PX));

    let result = rxing::helpers::detect_in_luma(framed.into_raw(), width, height, Some(BarcodeFormat::PDF_417))
        .map_err(|err| unreadable(err.to_string()))?;

    // Byte compaction without an ECI decodes as ISO-8859-1: one code point
    // per byte.
    let bytes = result
        .getText()
        .chars()
        .map(|c| u8::try_from(u32::from(c)).map_err(|_| unreadable(format!("code point {c:?} outside byte range"))))
        .collect::<Result<Vec<u8>>>()?;
    debug!(bytes = bytes.len(), "PDF417 symbol decoded");
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::super::encoder::BarcodeEncoder;
    use super::*;

    #[test]
    fn decodes_what_was_encoded() {
        let settings = BarcodeSettings::default();
        let payload = br#"{"v":1,"ln":"L-ABCD-1234-EFGH","cat":"B"}"#;
        let symbol = BarcodeEncoder::from_settings(&settings).unwrap().encode(payload).unwrap();
        assert_eq!(symbol.decode(&settings).unwrap(), payload);
    }

    #[test]
    fn bytes_above_ascii_survive() {
        let settings = BarcodeSettings::default();
        let payload: Vec<u8> = (0u8..=255).rev().take(90).collect();
        let symbol = BarcodeEncoder::from_settings(&settings).unwrap().encode(&payload).unwrap();
        assert_eq!(symbol.decode(&settings).unwrap(), payload);
    }

    #[test]
    fn blank_raster_is_unreadable() {
        let blank = GrayImage::from_pixel(300, 120, Luma([255]));
        assert!(matches!(
            decode_raster(&blank),
            Err(CardwerkError::InvalidValue { kind: "barcode symbol", .. })
        ));
    }
}
