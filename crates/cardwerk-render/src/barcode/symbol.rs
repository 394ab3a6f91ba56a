// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// A laid-out PDF417 symbol and its raster form.

use cardwerk_core::config::BarcodeSettings;
use cardwerk_core::error::{CardwerkError, Result};
use image::{GrayImage, Luma};

/// Modules in one row: start pattern, left indicator, data columns, right
/// indicator, stop pattern.
pub fn width_modules(columns: usize) -> usize {
    17 * (columns + 3) + 18
}

/// Pixel width of a `columns`-wide symbol drawn with `settings`.
pub fn raster_width(settings: &BarcodeSettings, columns: usize) -> u32 {
    let module = settings.module_width_px.max(1);
    width_modules(columns) as u32 * module + 2 * settings.quiet_zone_modules * module
}

/// Rows that fit in `height` pixels drawn with `settings`.
pub fn rows_within(settings: &BarcodeSettings, height: u32) -> u32 {
    let module = settings.module_width_px.max(1);
    let quiet = settings.quiet_zone_modules * module;
    let row_height = settings.row_height_modules.max(1) * module;
    height.saturating_sub(2 * quiet) / row_height
}

/// Dark/light modules of every row plus the parameters they were laid out
/// with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarcodeSymbol {
    columns: usize,
    level: u8,
    modules: Vec<Vec<bool>>,
}

impl BarcodeSymbol {
    pub(crate) fn new(columns: usize, level: u8, modules: Vec<Vec<bool>>) -> Result<Self> {
        let width = width_modules(columns);
        if modules.is_empty() || modules.iter().any(|row| row.len() != width) {
            return Err(CardwerkError::ImageError(format!(
                "PDF417 matrix does not have {width} modules per row"
            )));
        }
        Ok(Self {
            columns,
            level,
            modules,
        })
    }

    pub fn rows(&self) -> usize {
        self.modules.len()
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn error_correction_level(&self) -> u8 {
        self.level
    }

    pub fn width_modules(&self) -> usize {
        width_modules(self.columns)
    }

    /// Dark/light modules of every row, without quiet zone.
    pub fn module_rows(&self) -> &[Vec<bool>] {
        &self.modules
    }

    /// Pixel size of [`BarcodeSymbol::render`] output.
    pub fn raster_size(&self, settings: &BarcodeSettings) -> (u32, u32) {
        let module = settings.module_width_px.max(1);
        let quiet = settings.quiet_zone_modules * module;
        let row_height = settings.row_height_modules.max(1) * module;
        (
            raster_width(settings, self.columns),
            self.rows() as u32 * row_height + 2 * quiet,
        )
    }

    /// Draw the symbol black on white at an integer module size.
    pub fn render(&self, settings: &BarcodeSettings) -> GrayImage {
        let module = settings.module_width_px.max(1);
        let quiet = settings.quiet_zone_modules * module;
        let row_height = settings.row_height_modules.max(1) * module;
        let (width, height) = self.raster_size(settings);
        let mut image = GrayImage::from_pixel(width, height, Luma([255]));

        for (r, modules) in self.modules.iter().enumerate() {
            let top = quiet + r as u32 * row_height;
            for (m, dark) in modules.iter().enumerate() {
                if !dark {
                    continue;
                }
                let left = quiet + m as u32 * module;
                for y in top..top + row_height {
                    for x in left..left + module {
                        image.put_pixel(x, y, Luma([0]));
                    }
                }
            }
        }
        image
    }
}
