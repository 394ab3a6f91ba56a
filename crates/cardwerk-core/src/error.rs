// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Cardwerk.

use thiserror::Error;

/// Top-level error type for all Cardwerk component operations.
#[derive(Debug, Error)]
pub enum CardwerkError {
    // -- Source data --
    #[error("source photo unavailable: {0}")]
    SourceUnavailable(String),

    #[error(
        "source image {width}x{height} is below the minimum usable {min_width}x{min_height}"
    )]
    DimensionError {
        width: u32,
        height: u32,
        min_width: u32,
        min_height: u32,
    },

    #[error("identity is missing required fields: {0}")]
    InvalidIdentity(String),

    // -- Encoding --
    #[error("barcode payload of {size} bytes exceeds symbol capacity of {capacity} bytes")]
    PayloadTooLarge { size: usize, capacity: usize },

    #[error("template asset unavailable: {0}")]
    AssetMissing(String),

    #[error("image processing failed: {0}")]
    ImageError(String),

    #[error("PDF operation failed: {0}")]
    PdfError(String),

    // -- Storage --
    #[error("storage is full: {0}")]
    StorageFull(String),

    #[error("write failed: {0}")]
    WriteFailure(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("integrity check failed: expected {expected}, got {actual}")]
    IntegrityMismatch { expected: String, actual: String },

    #[error("database error: {0}")]
    Database(String),

    // -- Orchestration --
    #[error("generation exceeded its {0}s budget")]
    GenerationTimeout(u64),

    // -- Boundaries --
    #[error("invalid {kind} value: {value:?}")]
    InvalidValue { kind: &'static str, value: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CardwerkError {
    /// Classify a failed write, separating a full disk from other failures.
    pub fn from_write(context: &str, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::StorageFull || err.raw_os_error() == Some(28) {
            Self::StorageFull(format!("{context}: {err}"))
        } else {
            Self::WriteFailure(format!("{context}: {err}"))
        }
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, CardwerkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enospc_maps_to_storage_full() {
        let err = CardwerkError::from_write("put", std::io::Error::from_raw_os_error(28));
        assert!(matches!(err, CardwerkError::StorageFull(_)));
    }

    #[test]
    fn other_write_errors_map_to_write_failure() {
        let err = CardwerkError::from_write(
            "put",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
        );
        assert!(matches!(err, CardwerkError::WriteFailure(_)));
    }
}
