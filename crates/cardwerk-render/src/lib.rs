// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// cardwerk-render: the pure, deterministic half of the pipeline.
//
// Normalizes portrait photos, encodes the TD1 machine-readable zone and the
// PDF417 back-of-card barcode, paints both card faces and wraps them into
// PDF documents. Nothing here touches the artifact store.

pub mod barcode;
pub mod card;
pub mod document;
pub mod mrz;
pub mod photo;

// Re-export the primary structs so callers can use `cardwerk_render::CardRenderer` etc.
pub use barcode::{BarcodeEncoder, BarcodePayload, BarcodeSymbol};
pub use card::{CardLayout, CardRenderer, TemplateAssets, encode_png};
pub use document::{DocumentAssembler, page_count};
pub use mrz::MrzEncoder;
pub use photo::{PhotoNormalizer, ProcessedPhoto, source_extension};
