// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF417 encoder. Payload bytes go through byte compaction; symbol layout,
// Reed-Solomon error correction and the ISO/IEC 15438 codeword patterns come
// from rxing. The row budget is derived from the pixel box the symbol is
// printed into, so an accepted payload never has to be rescaled.

use cardwerk_core::config::BarcodeSettings;
use cardwerk_core::error::{CardwerkError, Result};
use rxing::pdf417::encoder::{Compaction, PDF417};
use tracing::{debug, instrument};

use super::symbol::{self, BarcodeSymbol};

pub(crate) const MAX_CODEWORDS: usize = 928;
pub(crate) const MIN_ROWS: usize = 3;
pub(crate) const MAX_ROWS: usize = 90;
pub(crate) const MAX_COLUMNS: usize = 30;
pub(crate) const MAX_LEVEL: u8 = 8;

/// Encodes byte payloads into PDF417 symbols of a fixed column count and a
/// bounded row count.
#[derive(Debug, Clone, Copy)]
pub struct BarcodeEncoder {
    columns: usize,
    level: u8,
    max_rows: usize,
}

impl BarcodeEncoder {
    pub fn new(columns: usize, level: u8) -> Result<Self> {
        if !(1..=MAX_COLUMNS).contains(&columns) {
            return Err(CardwerkError::InvalidValue {
                kind: "barcode column count",
                value: columns.to_string(),
            });
        }
        if level > MAX_LEVEL {
            return Err(CardwerkError::InvalidValue {
                kind: "error correction level",
                value: level.to_string(),
            });
        }
        Ok(Self {
            columns,
            level,
            max_rows: MAX_ROWS,
        })
    }

    /// Encoder without a pixel budget: only the symbology limits apply.
    pub fn from_settings(settings: &BarcodeSettings) -> Result<Self> {
        Self::new(settings.columns, settings.error_correction_level)
    }

    /// Encoder whose symbols, drawn with `settings`, fit a `width` x `height`
    /// pixel box at their native module size.
    pub fn within_box(settings: &BarcodeSettings, width: u32, height: u32) -> Result<Self> {
        let encoder = Self::from_settings(settings)?;
        let needed = symbol::raster_width(settings, encoder.columns);
        if needed > width {
            return Err(CardwerkError::Config(format!(
                "a {}-column barcode is {needed} px wide but its box is {width} px",
                encoder.columns
            )));
        }
        let rows = symbol::rows_within(settings, height) as usize;
        if rows < MIN_ROWS {
            return Err(CardwerkError::Config(format!(
                "a {height} px barcode box holds {rows} rows, at least {MIN_ROWS} are needed"
            )));
        }
        Ok(encoder.with_max_rows(rows))
    }

    /// Cap the row count. Values above the symbology maximum are clamped.
    pub fn with_max_rows(mut self, rows: usize) -> Self {
        self.max_rows = rows.clamp(MIN_ROWS, MAX_ROWS);
        self
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn max_rows(&self) -> usize {
        self.max_rows
    }

    /// Largest payload, in bytes, that fits this encoder's symbol budget.
    pub fn capacity(&self) -> usize {
        capacity(self.columns, self.level, self.max_rows)
    }

    /// Encode `payload` into a symbol.
    #[instrument(skip(self, payload), fields(bytes = payload.len(), columns = self.columns, level = self.level))]
    pub fn encode(&self, payload: &[u8]) -> Result<BarcodeSymbol> {
        if payload.is_empty() {
            return Err(CardwerkError::InvalidValue {
                kind: "barcode payload",
                value: String::new(),
            });
        }
        let capacity = self.capacity();
        if payload.len() > capacity {
            return Err(CardwerkError::PayloadTooLarge {
                size: payload.len(),
                capacity,
            });
        }

        let mut pdf417 = PDF417::new();
        pdf417.setCompaction(Compaction::BYTE);
        let columns = self.columns as u32;
        pdf417.setDimensions(columns, columns, self.max_rows as u32, MIN_ROWS as u32);
        // Byte compaction reads the message as ISO-8859-1, so mapping every
        // byte to the code point of the same value passes it through as is.
        let latin1: String = payload.iter().map(|&b| char::from(b)).collect();
        pdf417
            .generateBarcodeLogic(&latin1, u32::from(self.level))
            .map_err(|err| CardwerkError::ImageError(format!("PDF417 encoding failed: {err}")))?;
        let matrix = pdf417
            .getBarcodeMatrix()
            .as_ref()
            .ok_or_else(|| CardwerkError::ImageError("PDF417 encoder produced no matrix".into()))?;

        // The matrix comes out bottom row first.
        let modules: Vec<Vec<bool>> = matrix
            .getMatrix()
            .into_iter()
            .rev()
            .map(|row| row.into_iter().map(|m| m != 0).collect())
            .collect();

        debug!(rows = modules.len(), "PDF417 symbol laid out");
        BarcodeSymbol::new(self.columns, self.level, modules)
    }
}

/// Number of error correction codewords at `level`.
pub fn ec_codeword_count(level: u8) -> usize {
    1usize << (u32::from(level) + 1)
}

/// Largest payload in bytes for `columns` data columns at `level` with at
/// most `max_rows` rows.
pub fn capacity(columns: usize, level: u8, max_rows: usize) -> usize {
    if columns == 0 || columns > MAX_COLUMNS || level > MAX_LEVEL {
        return 0;
    }
    let max_rows = max_rows.min(MAX_ROWS).min(MAX_CODEWORDS / columns);
    if max_rows < MIN_ROWS {
        return 0;
    }
    // Minus length descriptor and latch.
    let Some(available) = (max_rows * columns).checked_sub(ec_codeword_count(level) + 2) else {
        return 0;
    };
    let mut len = 0;
    while compacted_length(len + 1) <= available {
        len += 1;
    }
    len
}

/// Codewords used by `len` bytes in byte compaction, excluding the latch:
/// five per group of six bytes and one per remaining byte.
fn compacted_length(len: usize) -> usize {
    len / 6 * 5 + len % 6
}
