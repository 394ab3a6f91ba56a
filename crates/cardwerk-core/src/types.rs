// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Cardwerk artifact engine.
//
// Every status-like value is a closed enum with exactly one canonical text
// form. Parsing accepts only that form; serde and the SQLite index both go
// through the same conversion.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CardwerkError;

/// Declare a closed enum whose only text form is the listed literal.
macro_rules! closed_text_enum {
    (
        $(#[$meta:meta])*
        $name:ident : $kind:literal {
            $( $(#[$vmeta:meta])* $variant:ident => $text:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// The canonical text form.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $( $name::$variant => $text ),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = CardwerkError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $( $text => Ok($name::$variant), )+
                    other => Err(CardwerkError::InvalidValue {
                        kind: $kind,
                        value: other.to_owned(),
                    }),
                }
            }
        }

        impl TryFrom<String> for $name {
            type Error = CardwerkError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> String {
                value.as_str().to_owned()
            }
        }
    };
}

closed_text_enum! {
    /// Lifecycle of an entity's artifact set.
    GenerationStatus: "generation status" {
        /// Nothing was ever generated for the entity.
        NoArtifact => "no_artifact",
        /// A generation is in flight.
        Generating => "generating",
        /// The current artifact set is usable.
        Ready => "ready",
        /// The current artifact set predates the configured minimum version.
        Stale => "stale",
        /// The last attempt failed; any previous artifact set stays current.
        Failed => "failed",
    }
}

closed_text_enum! {
    /// Logical storage partitions.
    StorageCategory: "storage category" {
        License => "license",
        Photo => "photo",
        Temp => "temp",
    }
}

closed_text_enum! {
    /// Files that make up an artifact set.
    ArtifactKind: "artifact kind" {
        FrontImage => "front",
        BackImage => "back",
        FrontDocument => "front_pdf",
        BackDocument => "back_pdf",
        CombinedDocument => "combined",
        OriginalPhoto => "photo_original",
        ProcessedPhoto => "photo_processed",
    }
}

impl ArtifactKind {
    /// Storage partition the file lives in.
    pub fn category(&self) -> StorageCategory {
        match self {
            Self::OriginalPhoto | Self::ProcessedPhoto => StorageCategory::Photo,
            _ => StorageCategory::License,
        }
    }

    /// Label used inside the file name.
    pub fn file_label(&self) -> &'static str {
        match self {
            Self::FrontImage | Self::FrontDocument => "front",
            Self::BackImage | Self::BackDocument => "back",
            Self::CombinedDocument => "combined",
            Self::OriginalPhoto => "original",
            Self::ProcessedPhoto => "processed",
        }
    }

    /// File extension (without the dot).
    pub fn extension(&self) -> &'static str {
        match self {
            Self::FrontImage | Self::BackImage => "png",
            Self::FrontDocument | Self::BackDocument | Self::CombinedDocument => "pdf",
            Self::OriginalPhoto | Self::ProcessedPhoto => "jpg",
        }
    }
}

closed_text_enum! {
    /// Driving licence vehicle categories.
    LicenseCategory: "licence category" {
        A => "A",
        A1 => "A1",
        B => "B",
        C1 => "C1",
        C => "C",
        EB => "EB",
        EC => "EC",
    }
}

impl LicenseCategory {
    /// Human description printed on the card back.
    pub fn description(&self) -> &'static str {
        match self {
            Self::A => "Motorcycles",
            Self::A1 => "Motorcycles up to 125cc",
            Self::B => "Light motor vehicles up to 3500kg",
            Self::C1 => "Medium trucks 3500-16000kg",
            Self::C => "Heavy trucks over 16000kg",
            Self::EB => "Light trailers with B",
            Self::EC => "Heavy trailers with C",
        }
    }
}

closed_text_enum! {
    /// Holder sex as printed on the card.
    Sex: "sex" {
        Male => "M",
        Female => "F",
        Unspecified => "X",
    }
}

impl Default for Sex {
    fn default() -> Self {
        Self::Unspecified
    }
}

/// Identifier of the business entity (licence) an artifact set belongs to.
///
/// Restricted to ASCII alphanumerics, `-` and `_` because it is embedded in
/// file names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityId(String);

impl EntityId {
    pub fn new(value: impl Into<String>) -> Result<Self, CardwerkError> {
        let value = value.into();
        let valid = !value.is_empty()
            && value.len() <= 64
            && value
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if valid {
            Ok(Self(value))
        } else {
            Err(CardwerkError::InvalidValue {
                kind: "entity id",
                value,
            })
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for EntityId {
    type Err = CardwerkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for EntityId {
    type Error = CardwerkError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<EntityId> for String {
    fn from(value: EntityId) -> String {
        value.0
    }
}

/// Identity fields rendered onto the card and encoded in the MRZ/barcode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub surname: String,
    pub given_names: String,
    /// National identity number.
    pub id_number: String,
    pub license_number: String,
    pub birth_date: NaiveDate,
    pub issue_date: NaiveDate,
    pub expiry_date: NaiveDate,
    #[serde(default)]
    pub sex: Sex,
    /// ISO 3166 alpha-3 nationality; the issuing state is used when absent.
    #[serde(default)]
    pub nationality: Option<String>,
    pub category: LicenseCategory,
    #[serde(default)]
    pub restrictions: Vec<String>,
}

impl Identity {
    /// Given names followed by surname.
    pub fn full_name(&self) -> String {
        format!("{} {}", self.given_names.trim(), self.surname.trim())
            .trim()
            .to_owned()
    }
}

/// Where the raw portrait comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PhotoSource {
    /// A file readable by this process.
    Path { path: PathBuf },
    /// An HTTP(S) URL.
    Url { url: String },
    /// Encoded image bytes supplied by the caller.
    Inline { bytes: Vec<u8> },
}

/// Pre-cropped subject region supplied by the caller (source pixels).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Snapshot of everything needed to render one entity's documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceData {
    pub identity: Identity,
    pub photo: PhotoSource,
    #[serde(default)]
    pub photo_region: Option<CropRegion>,
}

/// Three fixed-width machine readable zone lines.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MrzPayload {
    pub lines: [String; 3],
}

impl MrzPayload {
    /// Lines joined by newlines.
    pub fn to_text(&self) -> String {
        self.lines.join("\n")
    }
}

/// Stable reference to one stored file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub kind: ArtifactKind,
    pub category: StorageCategory,
    /// Path relative to the storage root.
    pub relative_path: String,
    /// SHA-256 hex digest of the content.
    pub hash: String,
    pub size_bytes: u64,
}

/// Every file of one artifact set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactFiles {
    pub front_image: FileRef,
    pub back_image: FileRef,
    pub front_document: FileRef,
    pub back_document: FileRef,
    pub combined_document: FileRef,
    pub original_photo: FileRef,
    pub processed_photo: FileRef,
}

impl ArtifactFiles {
    pub fn iter(&self) -> impl Iterator<Item = &FileRef> {
        [
            &self.front_image,
            &self.back_image,
            &self.front_document,
            &self.back_document,
            &self.combined_document,
            &self.original_photo,
            &self.processed_photo,
        ]
        .into_iter()
    }
}

/// The output bundle for one entity at one fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSet {
    pub entity_id: EntityId,
    pub fingerprint: String,
    pub generator_version: semver::Version,
    pub template_version: String,
    pub created_at: DateTime<Utc>,
    pub files: ArtifactFiles,
    pub mrz: MrzPayload,
    /// True when the set was returned from cache without rendering.
    #[serde(default)]
    pub cache_hit: bool,
}

/// A stored file as tracked by the content store index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageEntry {
    pub category: StorageCategory,
    pub hash: String,
    pub relative_path: String,
    pub owner: Option<EntityId>,
    pub label: String,
    pub size_bytes: u64,
    pub ref_count: u32,
    pub superseded: bool,
    pub created_at: DateTime<Utc>,
    pub last_access: DateTime<Utc>,
}

/// File count and byte total for one category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryStats {
    pub file_count: u64,
    pub total_bytes: u64,
}

/// Usage statistics over the whole store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageStats {
    pub file_count: u64,
    pub total_bytes: u64,
    pub per_category: BTreeMap<StorageCategory, CategoryStats>,
}

/// What one cleanup pass removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub temp_removed: u64,
    pub superseded_removed: u64,
    pub orphans_removed: u64,
    pub bytes_freed: u64,
}

impl CleanupReport {
    pub fn total_removed(&self) -> u64 {
        self.temp_removed + self.superseded_removed + self.orphans_removed
    }

    pub fn absorb(&mut self, other: CleanupReport) {
        self.temp_removed += other.temp_removed;
        self.superseded_removed += other.superseded_removed;
        self.orphans_removed += other.orphans_removed;
        self.bytes_freed += other.bytes_freed;
    }
}
