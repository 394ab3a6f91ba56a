// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Generation fingerprint: SHA-256 over the canonical JSON of everything that
// decides what an artifact set looks like: the source data, the render
// configuration and the generator version.

use cardwerk_core::config::{BarcodeSettings, CardSpec, EngineConfig, PhotoSpec};
use cardwerk_core::error::Result;
use cardwerk_core::types::{CropRegion, Identity, PhotoSource, SourceData};
use cardwerk_store::hash_bytes;
use serde::Serialize;
use serde_json::Value;

/// How the photo enters the fingerprint. Inline bytes are referenced by
/// their hash so the fingerprint input stays small.
#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum PhotoReference<'a> {
    Path { path: String },
    Url { url: &'a str },
    Inline { sha256: String },
}

impl<'a> PhotoReference<'a> {
    fn of(source: &'a PhotoSource) -> Self {
        match source {
            PhotoSource::Path { path } => Self::Path {
                path: path.to_string_lossy().into_owned(),
            },
            PhotoSource::Url { url } => Self::Url { url },
            PhotoSource::Inline { bytes } => Self::Inline {
                sha256: hash_bytes(bytes),
            },
        }
    }
}

/// Configuration that changes the rendered bytes. Asset file locations are
/// left out; the template version stands for the template files.
#[derive(Serialize)]
struct RenderProfile<'a> {
    template_version: &'a str,
    card: &'a CardSpec,
    photo: &'a PhotoSpec,
    barcode: &'a BarcodeSettings,
    issuing_state: &'a str,
    country_title: &'a str,
    card_title: &'a str,
    authority_line: &'a str,
    watermark_text: &'a str,
    render_mrz: bool,
}

impl<'a> RenderProfile<'a> {
    fn of(config: &'a EngineConfig) -> Self {
        let assets = &config.assets;
        Self {
            template_version: &config.template_version,
            card: &config.card,
            photo: &config.photo,
            barcode: &config.barcode,
            issuing_state: &assets.issuing_state,
            country_title: &assets.country_title,
            card_title: &assets.card_title,
            authority_line: &assets.authority_line,
            watermark_text: &assets.watermark_text,
            render_mrz: assets.render_mrz,
        }
    }
}

#[derive(Serialize)]
struct FingerprintInput<'a> {
    identity: &'a Identity,
    photo: PhotoReference<'a>,
    photo_region: Option<CropRegion>,
    render: RenderProfile<'a>,
    generator_version: String,
}

/// Fingerprint of `source` rendered under `config`.
pub fn compute(source: &SourceData, config: &EngineConfig) -> Result<String> {
    let input = FingerprintInput {
        identity: &source.identity,
        photo: PhotoReference::of(&source.photo),
        photo_region: source.photo_region,
        render: RenderProfile::of(config),
        generator_version: config.generator_version.to_string(),
    };
    let canonical = canonical_json(&input)?;
    Ok(hash_bytes(canonical.as_bytes()))
}

/// JSON with object keys sorted at every level and no whitespace.
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String> {
    let sorted = sort_keys(serde_json::to_value(value)?);
    Ok(serde_json::to_string(&sorted)?)
}

fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(entries.into_iter().map(|(k, v)| (k, sort_keys(v))).collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardwerk_core::types::{LicenseCategory, Sex};
    use chrono::NaiveDate;
    use serde_json::json;

    fn source() -> SourceData {
        SourceData {
            identity: Identity {
                surname: "Doe".into(),
                given_names: "John".into(),
                id_number: "9001015800085".into(),
                license_number: "L-ABCD-1234-EFGH".into(),
                birth_date: NaiveDate::from_ymd_opt(1990, 1, 1).unwrap(),
                issue_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
                expiry_date: NaiveDate::from_ymd_opt(2029, 2, 28).unwrap(),
                sex: Sex::Male,
                nationality: None,
                category: LicenseCategory::B,
                restrictions: vec![],
            },
            photo: PhotoSource::Inline { bytes: vec![9; 16] },
            photo_region: None,
        }
    }

    fn config(template: &str, generator: &str) -> EngineConfig {
        EngineConfig {
            template_version: template.into(),
            generator_version: semver::Version::parse(generator).unwrap(),
            ..EngineConfig::default()
        }
    }

    #[test]
    fn canonical_json_sorts_nested_keys() {
        let value = json!({"z": 1, "a": {"y": [ {"b": 1, "a": 2} ], "x": null}});
        assert_eq!(
            canonical_json(&value).unwrap(),
            r#"{"a":{"x":null,"y":[{"a":2,"b":1}]},"z":1}"#
        );
    }

    #[test]
    fn fingerprint_is_stable() {
        let a = compute(&source(), &config("t1", "2.0.0")).unwrap();
        let b = compute(&source(), &config("t1", "2.0.0")).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn every_input_moves_the_fingerprint() {
        let base_config = config("t1", "2.0.0");
        let base = compute(&source(), &base_config).unwrap();
        assert_ne!(base, compute(&source(), &config("t2", "2.0.0")).unwrap());
        assert_ne!(base, compute(&source(), &config("t1", "2.0.1")).unwrap());

        let mut renamed = source();
        renamed.identity.given_names = "Jon".into();
        assert_ne!(base, compute(&renamed, &base_config).unwrap());

        let mut new_photo = source();
        new_photo.photo = PhotoSource::Inline { bytes: vec![8; 16] };
        assert_ne!(base, compute(&new_photo, &base_config).unwrap());

        let mut cropped = source();
        cropped.photo_region = Some(CropRegion {
            x: 1,
            y: 2,
            width: 100,
            height: 120,
        });
        assert_ne!(base, compute(&cropped, &base_config).unwrap());
    }

    #[test]
    fn render_settings_move_the_fingerprint() {
        let base_config = config("t1", "2.0.0");
        let base = compute(&source(), &base_config).unwrap();

        let mut level = base_config.clone();
        level.barcode.error_correction_level = 4;
        assert_ne!(base, compute(&source(), &level).unwrap());

        let mut state = base_config.clone();
        state.assets.issuing_state = "NAM".into();
        assert_ne!(base, compute(&source(), &state).unwrap());

        let mut no_mrz = base_config.clone();
        no_mrz.assets.render_mrz = false;
        assert_ne!(base, compute(&source(), &no_mrz).unwrap());

        let mut quality = base_config.clone();
        quality.photo.jpeg_quality = 90;
        assert_ne!(base, compute(&source(), &quality).unwrap());
    }

    #[test]
    fn asset_locations_do_not_move_the_fingerprint() {
        let base_config = config("t1", "2.0.0");
        let mut moved = base_config.clone();
        moved.assets.directory = Some("/srv/templates".into());
        assert_eq!(
            compute(&source(), &base_config).unwrap(),
            compute(&source(), &moved).unwrap()
        );
    }
}
