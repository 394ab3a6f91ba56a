// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF417 barcode: payload, encoder, symbol raster and reader.

pub mod decoder;
pub mod encoder;
pub mod payload;
pub mod symbol;

pub use decoder::decode_raster;
pub use encoder::{BarcodeEncoder, capacity};
pub use payload::BarcodePayload;
pub use symbol::BarcodeSymbol;
