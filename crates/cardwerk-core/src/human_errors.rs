// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Operator-facing error descriptions.
//
// Every technical error maps to a plain message with a concrete next step.
// The severity tells the sweeper and the CLI whether retrying makes sense.

use crate::error::CardwerkError;

/// How an operator should react to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Likely to succeed on a later attempt.
    Transient,
    /// Someone has to fix data, disk space or configuration first.
    ActionRequired,
    /// Retrying with the same input will fail again.
    Permanent,
}

/// An error rewritten for operators.
#[derive(Debug, Clone)]
pub struct OperatorNotice {
    pub message: String,
    pub suggestion: String,
    pub retriable: bool,
    pub severity: Severity,
}

impl OperatorNotice {
    fn new(message: impl Into<String>, suggestion: impl Into<String>, severity: Severity) -> Self {
        Self {
            message: message.into(),
            suggestion: suggestion.into(),
            retriable: severity == Severity::Transient,
            severity,
        }
    }
}

/// Describe a `CardwerkError` for the operator console.
pub fn describe_error(err: &CardwerkError) -> OperatorNotice {
    match err {
        CardwerkError::SourceUnavailable(detail) => describe_source_failure(detail),

        CardwerkError::DimensionError {
            width,
            height,
            min_width,
            min_height,
        } => OperatorNotice::new(
            "The source photo is too small.",
            format!(
                "Supply a photo of at least {min_width}x{min_height} pixels (got {width}x{height})."
            ),
            Severity::ActionRequired,
        ),

        CardwerkError::InvalidIdentity(detail) => OperatorNotice::new(
            "The identity record is incomplete.",
            format!("Fill in the missing fields and generate again. ({detail})"),
            Severity::ActionRequired,
        ),

        CardwerkError::PayloadTooLarge { size, capacity } => OperatorNotice::new(
            "The barcode data does not fit on the card.",
            format!(
                "Shorten the encoded fields or lower the error correction level ({size} bytes, capacity {capacity})."
            ),
            Severity::Permanent,
        ),

        CardwerkError::AssetMissing(name) => OperatorNotice::new(
            "A template asset is missing.",
            format!("A built-in placeholder was used instead. Restore '{name}' to use the real artwork."),
            Severity::ActionRequired,
        ),

        CardwerkError::ImageError(_) => OperatorNotice::new(
            "An image could not be processed.",
            "The photo may be damaged or in an unusual format. Re-upload it as JPEG or PNG.",
            Severity::Permanent,
        ),

        CardwerkError::PdfError(_) => OperatorNotice::new(
            "A PDF document could not be assembled.",
            "Try again. If this keeps happening, report it with the entity id.",
            Severity::Permanent,
        ),

        CardwerkError::StorageFull(_) => OperatorNotice::new(
            "Artifact storage is full.",
            "Free disk space or run `cardwerk cleanup`, then generate again.",
            Severity::ActionRequired,
        ),

        CardwerkError::WriteFailure(detail) => OperatorNotice::new(
            "An artifact could not be written.",
            format!("Check permissions on the storage directory and try again. ({detail})"),
            Severity::Transient,
        ),

        CardwerkError::NotFound(what) => OperatorNotice::new(
            "The requested file is not in storage.",
            format!("It may have been cleaned up. Regenerate to recreate it. ({what})"),
            Severity::ActionRequired,
        ),

        CardwerkError::IntegrityMismatch { .. } => OperatorNotice::new(
            "A stored file no longer matches its content hash.",
            "The file was changed on disk. Regenerate the artifact set with --force.",
            Severity::Permanent,
        ),

        CardwerkError::Database(_) => OperatorNotice::new(
            "The storage index had a problem.",
            "Try again. If it persists, check that the index file is not locked by another process.",
            Severity::Transient,
        ),

        CardwerkError::GenerationTimeout(secs) => OperatorNotice::new(
            "Generation took too long.",
            format!("The {secs}s budget ran out, usually on a slow photo fetch. Try again later."),
            Severity::Transient,
        ),

        CardwerkError::InvalidValue { kind, value } => OperatorNotice::new(
            format!("'{value}' is not a valid {kind}."),
            "Use the canonical lower-case value.",
            Severity::Permanent,
        ),

        CardwerkError::Config(detail) => OperatorNotice::new(
            "The engine configuration is invalid.",
            format!("Fix the configuration file and restart. ({detail})"),
            Severity::ActionRequired,
        ),

        CardwerkError::Io(io_err) => match io_err.kind() {
            std::io::ErrorKind::NotFound => OperatorNotice::new(
                "A file or directory could not be found.",
                "Check the configured storage root and photo paths.",
                Severity::ActionRequired,
            ),
            std::io::ErrorKind::PermissionDenied => OperatorNotice::new(
                "Permission denied while accessing storage.",
                "Give the service account write access to the storage root.",
                Severity::ActionRequired,
            ),
            _ => OperatorNotice::new(
                "A file operation failed.",
                "Try again. If this keeps happening, check the disk.",
                Severity::Transient,
            ),
        },

        CardwerkError::Serialization(_) => OperatorNotice::new(
            "Stored data could not be read.",
            "The manifest or index row is malformed. Check the input file.",
            Severity::Permanent,
        ),
    }
}

fn describe_source_failure(detail: &str) -> OperatorNotice {
    let lower = detail.to_ascii_lowercase();

    if lower.contains("timed out") || lower.contains("connect") || lower.contains("status 5") {
        OperatorNotice::new(
            "The photo server did not respond.",
            "The photo host may be down. The request will succeed once it is reachable again.",
            Severity::Transient,
        )
    } else if lower.contains("decode") {
        OperatorNotice::new(
            "The photo could not be decoded.",
            "Re-upload the photo as a JPEG or PNG file.",
            Severity::Permanent,
        )
    } else {
        OperatorNotice::new(
            "The source photo is unavailable.",
            format!("Check the photo reference and try again. ({detail})"),
            Severity::ActionRequired,
        )
    }
}
