// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Engine configuration.
//
// One explicit struct handed to every component at construction. Loaded from
// and saved to JSON; missing keys fall back to the defaults below.

use std::path::{Path, PathBuf};

use semver::Version;
use serde::{Deserialize, Serialize};

use crate::error::{CardwerkError, Result};
use crate::types::StorageCategory;

/// Millimetres per inch.
pub const MM_PER_INCH: f64 = 25.4;

/// Convert a physical length to pixels, rounding up so the full extent fits.
pub fn mm_to_px_ceil(mm: f64, dpi: u32) -> u32 {
    (mm / MM_PER_INCH * f64::from(dpi)).ceil() as u32
}

/// Convert a layout coordinate to the nearest pixel.
pub fn mm_to_px_round(mm: f64, dpi: u32) -> u32 {
    (mm / MM_PER_INCH * f64::from(dpi)).round() as u32
}

/// Convert millimetres to PDF points.
pub fn mm_to_pt(mm: f64) -> f64 {
    mm * 72.0 / MM_PER_INCH
}

/// Top-level configuration for the artifact engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub storage: StorageConfig,
    /// Version stamped on every artifact set this engine produces.
    pub generator_version: Version,
    /// Artifact sets stamped below this version are stale.
    pub minimum_generator_version: Version,
    pub template_version: String,
    pub photo: PhotoSpec,
    pub card: CardSpec,
    pub barcode: BarcodeSettings,
    pub assets: AssetConfig,
    pub timeouts: TimeoutConfig,
    pub sweeper: SweeperConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            generator_version: Version::new(2, 0, 0),
            minimum_generator_version: Version::new(2, 0, 0),
            template_version: "sa-2024.1".into(),
            photo: PhotoSpec::default(),
            card: CardSpec::default(),
            barcode: BarcodeSettings::default(),
            assets: AssetConfig::default(),
            timeouts: TimeoutConfig::default(),
            sweeper: SweeperConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Default configuration rooted at `root`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        let mut config = Self::default();
        config.storage.root = root.into();
        config
    }

    /// Read a JSON configuration file and validate it.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Reject configurations that could never produce a usable artifact.
    pub fn validate(&self) -> Result<()> {
        if self.generator_version < self.minimum_generator_version {
            return Err(CardwerkError::Config(format!(
                "generator version {} is below the configured minimum {}",
                self.generator_version, self.minimum_generator_version
            )));
        }
        if self.template_version.trim().is_empty() {
            return Err(CardwerkError::Config("template version is empty".into()));
        }
        if self.photo.width == 0 || self.photo.height == 0 {
            return Err(CardwerkError::Config("photo dimensions must be non-zero".into()));
        }
        if self.photo.jpeg_quality == 0 || self.photo.jpeg_quality > 100 {
            return Err(CardwerkError::Config(format!(
                "JPEG quality {} is outside 1..=100",
                self.photo.jpeg_quality
            )));
        }
        if !(1..=30).contains(&self.barcode.columns) {
            return Err(CardwerkError::Config(format!(
                "barcode columns {} outside 1..=30",
                self.barcode.columns
            )));
        }
        if self.barcode.error_correction_level > 8 {
            return Err(CardwerkError::Config(format!(
                "error correction level {} outside 0..=8",
                self.barcode.error_correction_level
            )));
        }
        Ok(())
    }
}

/// Storage root and per-category layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub root: PathBuf,
    pub license_dir: String,
    pub photo_dir: String,
    pub temp_dir: String,
    /// SQLite index file name, relative to `root`.
    pub index_file: String,
    pub temp_max_age_hours: u64,
    pub sweep_interval_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("cardwerk-data"),
            license_dir: "license-outputs".into(),
            photo_dir: "photo-assets".into(),
            temp_dir: "temp".into(),
            index_file: "index.db".into(),
            temp_max_age_hours: 24,
            sweep_interval_secs: 3600,
        }
    }
}

impl StorageConfig {
    pub fn dir_name(&self, category: StorageCategory) -> &str {
        match category {
            StorageCategory::License => &self.license_dir,
            StorageCategory::Photo => &self.photo_dir,
            StorageCategory::Temp => &self.temp_dir,
        }
    }

    pub fn category_dir(&self, category: StorageCategory) -> PathBuf {
        self.root.join(self.dir_name(category))
    }

    pub fn index_path(&self) -> PathBuf {
        self.root.join(&self.index_file)
    }
}

/// Biometric photo target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhotoSpec {
    pub width: u32,
    pub height: u32,
    pub width_mm: f64,
    pub height_mm: f64,
    pub dpi: u32,
    pub jpeg_quality: u8,
    pub min_source_width: u32,
    pub min_source_height: u32,
}

impl Default for PhotoSpec {
    fn default() -> Self {
        let (width_mm, height_mm, dpi) = (18.0, 22.0, 300);
        Self {
            width: mm_to_px_ceil(width_mm, dpi),
            height: mm_to_px_ceil(height_mm, dpi),
            width_mm,
            height_mm,
            dpi,
            jpeg_quality: 95,
            min_source_width: 107,
            min_source_height: 130,
        }
    }
}

impl PhotoSpec {
    /// Stable text of every parameter that affects the processed output.
    pub fn parameter_key(&self) -> String {
        format!(
            "{}x{}@{}dpi/q{}",
            self.width, self.height, self.dpi, self.jpeg_quality
        )
    }
}

/// Physical card canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CardSpec {
    pub width_mm: f64,
    pub height_mm: f64,
    pub dpi: u32,
}

impl Default for CardSpec {
    fn default() -> Self {
        Self {
            width_mm: 85.60,
            height_mm: 54.00,
            dpi: 300,
        }
    }
}

impl CardSpec {
    pub fn width_px(&self) -> u32 {
        mm_to_px_ceil(self.width_mm, self.dpi)
    }

    pub fn height_px(&self) -> u32 {
        mm_to_px_ceil(self.height_mm, self.dpi)
    }
}

/// PDF417 symbol parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BarcodeSettings {
    /// Data columns per row.
    pub columns: usize,
    pub error_correction_level: u8,
    pub module_width_px: u32,
    /// Row height as a multiple of the module width.
    pub row_height_modules: u32,
    pub quiet_zone_modules: u32,
}

impl Default for BarcodeSettings {
    fn default() -> Self {
        Self {
            columns: 14,
            error_correction_level: 5,
            module_width_px: 2,
            row_height_modules: 3,
            quiet_zone_modules: 2,
        }
    }
}

/// Template asset sources and issuer text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetConfig {
    /// Directory with `base_template.png`, `security_background.png`,
    /// `watermark.png` and `emblem.png`. Missing files fall back to
    /// procedural layers.
    pub directory: Option<PathBuf>,
    pub font_file: Option<PathBuf>,
    /// ICAO alpha-3 code of the issuing state.
    pub issuing_state: String,
    pub country_title: String,
    pub card_title: String,
    pub authority_line: String,
    pub watermark_text: String,
    pub render_mrz: bool,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            directory: None,
            font_file: None,
            issuing_state: "ZAF".into(),
            country_title: "REPUBLIC OF SOUTH AFRICA".into(),
            card_title: "DRIVING LICENCE".into(),
            authority_line: "Issued by the Department of Transport".into(),
            watermark_text: "RSA".into(),
            render_mrz: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Wall-clock budget for fetch and render of one generation.
    pub generation_secs: u64,
    pub photo_fetch_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            generation_secs: 60,
            photo_fetch_secs: 30,
        }
    }
}

/// Retry policy for the background sweeper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweeperConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_dimensions_match_the_card_and_photo_formats() {
        let config = EngineConfig::default();
        assert_eq!(config.card.width_px(), 1012);
        assert_eq!(config.card.height_px(), 638);
        assert_eq!((config.photo.width, config.photo.height), (213, 260));
    }

    #[test]
    fn generator_below_minimum_is_rejected() {
        let mut config = EngineConfig::default();
        config.minimum_generator_version = Version::new(3, 0, 0);
        assert!(matches!(config.validate(), Err(CardwerkError::Config(_))));
    }

    #[test]
    fn save_then_load_preserves_settings() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let path = dir.path().join("cardwerk.json");
        let mut config = EngineConfig::with_root(dir.path());
        config.template_version = "sa-2025.2".into();
        config.save(&path).expect("save");
        let loaded = EngineConfig::load(&path).expect("load");
        assert_eq!(loaded, config);
    }

    #[test]
    fn partial_file_uses_defaults() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let path = dir.path().join("partial.json");
        std::fs::write(&path, r#"{"template_version":"custom-1"}"#).expect("write");
        let loaded = EngineConfig::load(&path).expect("load");
        assert_eq!(loaded.template_version, "custom-1");
        assert_eq!(loaded.barcode.columns, 14);
        assert_eq!(loaded.storage.license_dir, "license-outputs");
    }
}
