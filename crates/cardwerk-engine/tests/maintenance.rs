// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Cleanup, background sweeper and batch maintenance jobs.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use cardwerk_core::EngineConfig;
use cardwerk_core::types::{
    EntityId, Identity, LicenseCategory, PhotoSource, Sex, SourceData, StorageCategory,
};
use cardwerk_engine::{GenerationEngine, Sweeper, regenerate_below, reprocess_photos};
use chrono::NaiveDate;
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};
use semver::Version;
use tempfile::TempDir;

const HOUR: u64 = 3600;

fn config(dir: &TempDir) -> EngineConfig {
    let mut config = EngineConfig::with_root(dir.path());
    config.timeouts.generation_secs = 300;
    config
}

fn entity(id: &str) -> EntityId {
    EntityId::new(id).unwrap()
}

fn portrait_jpeg() -> Vec<u8> {
    let img = RgbImage::from_fn(640, 800, |x, y| {
        let dx = (x as f32 - 320.0) / 150.0;
        let dy = (y as f32 - 360.0) / 230.0;
        if dx * dx + dy * dy < 1.0 {
            Rgb([110, 85, 66])
        } else {
            Rgb([228, 231, 236])
        }
    });
    let mut buf = Vec::new();
    img.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, 90))
        .unwrap();
    buf
}

fn source(given_names: &str) -> SourceData {
    SourceData {
        identity: Identity {
            surname: "Nkosi".into(),
            given_names: given_names.into(),
            id_number: "8802025800081".into(),
            license_number: "L-QRST-5678-UVWX".into(),
            birth_date: NaiveDate::from_ymd_opt(1988, 2, 2).unwrap(),
            issue_date: NaiveDate::from_ymd_opt(2023, 7, 1).unwrap(),
            expiry_date: NaiveDate::from_ymd_opt(2028, 6, 30).unwrap(),
            sex: Sex::Female,
            nationality: None,
            category: LicenseCategory::C1,
            restrictions: vec![],
        },
        photo: PhotoSource::Inline {
            bytes: portrait_jpeg(),
        },
        photo_region: None,
    }
}

/// Write a temp-category file whose mtime lies `age_hours` in the past.
fn aged_temp_file(engine: &GenerationEngine, name: &str, age_hours: u64) -> PathBuf {
    let path = engine
        .store()
        .config()
        .category_dir(StorageCategory::Temp)
        .join(name);
    std::fs::write(&path, b"scratch").unwrap();
    let mtime = SystemTime::now() - Duration::from_secs(age_hours * HOUR);
    File::options()
        .write(true)
        .open(&path)
        .unwrap()
        .set_modified(mtime)
        .unwrap();
    path
}

#[tokio::test(flavor = "multi_thread")]
async fn cleanup_removes_only_old_temp_files() {
    let dir = TempDir::new().unwrap();
    let engine = GenerationEngine::open(config(&dir)).unwrap();
    let fresh = aged_temp_file(&engine, "fresh.tmp", 1);
    let stale = aged_temp_file(&engine, "stale.tmp", 30);

    let report = engine.cleanup(Duration::from_secs(24 * HOUR)).await.unwrap();

    assert_eq!(report.temp_removed, 1);
    assert!(fresh.exists());
    assert!(!stale.exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn cleanup_collects_superseded_outputs() {
    let dir = TempDir::new().unwrap();
    let engine = GenerationEngine::open(config(&dir)).unwrap();
    let id = entity("lic-7");

    let old = engine.generate(&id, &source("Lindiwe"), false).await.unwrap();
    let new = engine.generate(&id, &source("Lindiwe Ann"), false).await.unwrap();
    assert_ne!(old.fingerprint, new.fingerprint);
    // Same photo bytes, so both photo files are shared by the two sets.
    assert_eq!(old.files.original_photo, new.files.original_photo);

    let report = engine.cleanup(Duration::from_secs(24 * HOUR)).await.unwrap();
    assert_eq!(report.superseded_removed, 5);
    assert!(!engine.store().contains(&old.files.front_image).unwrap());
    for file in new.files.iter() {
        assert!(engine.store().contains(file).unwrap(), "{} removed", file.relative_path);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn pinned_outputs_survive_cleanup() {
    let dir = TempDir::new().unwrap();
    let engine = GenerationEngine::open(config(&dir)).unwrap();
    let id = entity("lic-7");

    let old = engine.generate(&id, &source("Lindiwe"), false).await.unwrap();
    engine
        .store()
        .retain(&old.files.combined_document.relative_path)
        .unwrap();
    engine.generate(&id, &source("Lindiwe Ann"), false).await.unwrap();

    let report = engine.cleanup(Duration::from_secs(24 * HOUR)).await.unwrap();
    assert_eq!(report.superseded_removed, 4);
    assert!(engine.store().contains(&old.files.combined_document).unwrap());
}

#[tokio::test(flavor = "multi_thread")]
async fn backups_survive_cleanup() {
    let dir = TempDir::new().unwrap();
    let engine = GenerationEngine::open(config(&dir)).unwrap();
    let id = entity("lic-7");

    let old = engine.generate(&id, &source("Lindiwe"), false).await.unwrap();
    let original = engine.store().read(&old.files.combined_document.relative_path).unwrap();
    let copy = engine.backup(&old.files.combined_document.relative_path).await.unwrap();
    engine.generate(&id, &source("Lindiwe Ann"), false).await.unwrap();

    let report = engine.cleanup(Duration::from_secs(24 * HOUR)).await.unwrap();
    assert_eq!(report.superseded_removed, 5);
    assert!(!engine.store().contains(&old.files.combined_document).unwrap());
    assert_eq!(engine.store().read(&copy).unwrap(), original);
}

#[tokio::test(flavor = "multi_thread")]
async fn sweeper_clears_old_temp_files_then_stops() {
    let dir = TempDir::new().unwrap();
    let engine = Arc::new(GenerationEngine::open(config(&dir)).unwrap());
    let stale = aged_temp_file(&engine, "leftover.partial", 30);

    let sweeper = Sweeper::spawn(Arc::clone(&engine), Duration::from_secs(3600));
    for _ in 0..250 {
        if sweeper.completed_sweeps() > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert!(sweeper.completed_sweeps() >= 1);
    assert!(!stale.exists());
    sweeper.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn regenerate_below_only_touches_old_versions() {
    let dir = TempDir::new().unwrap();
    let sources = BTreeMap::from([
        (entity("lic-1"), source("Ayanda")),
        (entity("lic-2"), source("Buhle")),
        (entity("lic-3"), source("Chipo")),
    ]);
    {
        let engine = GenerationEngine::open(config(&dir)).unwrap();
        for id in ["lic-1", "lic-2"] {
            engine.generate(&entity(id), &sources[&entity(id)], false).await.unwrap();
        }
    }

    let mut upgraded = config(&dir);
    upgraded.generator_version = Version::new(2, 1, 0);
    let engine = Arc::new(GenerationEngine::open(upgraded).unwrap());
    let cutoff = Version::new(2, 1, 0);

    let planned = regenerate_below(&engine, &cutoff, &sources, 2, true).await.unwrap();
    assert!(planned.dry_run);
    assert_eq!((planned.examined, planned.regenerated, planned.skipped), (3, 2, 1));
    assert_eq!(engine.render_passes(), 0);

    let summary = regenerate_below(&engine, &cutoff, &sources, 2, false).await.unwrap();
    assert_eq!((summary.examined, summary.regenerated, summary.skipped, summary.failed), (3, 2, 1, 0));
    assert_eq!(engine.render_passes(), 2);
    let current = engine.current(&entity("lic-1")).await.unwrap().unwrap();
    assert_eq!(current.generator_version, cutoff);

    let again = regenerate_below(&engine, &cutoff, &sources, 2, false).await.unwrap();
    assert_eq!((again.regenerated, again.skipped), (0, 3));
}

#[tokio::test(flavor = "multi_thread")]
async fn reprocess_photos_rerenders_every_entity() {
    let dir = TempDir::new().unwrap();
    let engine = Arc::new(GenerationEngine::open(config(&dir)).unwrap());
    let mut sources = BTreeMap::from([
        (entity("lic-1"), source("Ayanda")),
        (entity("lic-2"), source("Buhle")),
    ]);
    for (id, src) in &sources {
        engine.generate(id, src, false).await.unwrap();
    }

    let summary = reprocess_photos(&engine, &sources, 1, false).await.unwrap();
    assert_eq!((summary.examined, summary.regenerated, summary.failed), (2, 2, 0));
    assert_eq!(engine.render_passes(), 4);

    sources.get_mut(&entity("lic-2")).unwrap().photo = PhotoSource::Path {
        path: dir.path().join("gone.jpg"),
    };
    let summary = reprocess_photos(&engine, &sources, 4, false).await.unwrap();
    assert_eq!((summary.regenerated, summary.failed), (1, 1));
    assert!(summary.failures.contains_key(&entity("lic-2")));
}
