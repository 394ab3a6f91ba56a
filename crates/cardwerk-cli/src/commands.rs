// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Command handlers. Results go to stdout as JSON; failures go to stderr as
// operator notices.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use cardwerk_core::EngineConfig;
use cardwerk_core::error::CardwerkError;
use cardwerk_core::human_errors::describe_error;
use cardwerk_core::types::{EntityId, SourceData};
use cardwerk_engine::{
    GenerateOptions, GenerationEngine, GenerationFailure, Sweeper, regenerate_below, reprocess_photos,
};
use semver::Version;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Engine(#[from] CardwerkError),

    #[error("{entity}: {failure}")]
    Generation {
        entity: EntityId,
        failure: GenerationFailure,
    },
}

/// Print an operator notice for `err` on stderr.
pub fn report(err: &CliError) {
    let (cause, retained) = match err {
        CliError::Engine(cause) => (cause, false),
        CliError::Generation { failure, .. } => (failure.error(), failure.previous().is_some()),
    };
    let notice = describe_error(cause);
    eprintln!("error: {err}");
    eprintln!("  {}", notice.message);
    eprintln!("  {}", notice.suggestion);
    if retained {
        eprintln!("  The previous artifact set is still current and can be served.");
    }
    if notice.retriable {
        eprintln!("  This is usually temporary; retrying may succeed.");
    }
}

pub fn init(path: &Path) -> Result<(), CliError> {
    EngineConfig::default().save(path)?;
    println!("wrote {}", path.display());
    Ok(())
}

pub fn load_config(path: Option<&Path>, root: &Path) -> Result<EngineConfig, CliError> {
    match path {
        Some(path) => Ok(EngineConfig::load(path)?),
        None => Ok(EngineConfig::with_root(root)),
    }
}

pub fn open_engine(config: EngineConfig) -> Result<Arc<GenerationEngine>, CliError> {
    Ok(Arc::new(GenerationEngine::open(config)?))
}

/// Read a manifest: a JSON object from entity id to source data.
pub fn load_manifest(path: &Path) -> Result<BTreeMap<EntityId, SourceData>, CliError> {
    let raw = std::fs::read_to_string(path).map_err(CardwerkError::from)?;
    let manifest = serde_json::from_str(&raw).map_err(CardwerkError::from)?;
    Ok(manifest)
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    let json = serde_json::to_string_pretty(value).map_err(CardwerkError::from)?;
    println!("{json}");
    Ok(())
}

pub async fn generate(
    engine: &Arc<GenerationEngine>,
    manifest: &Path,
    only: Option<&str>,
    force: bool,
    min_version: Option<Version>,
) -> Result<(), CliError> {
    let mut sources = load_manifest(manifest)?;
    if let Some(only) = only {
        let id: EntityId = only.parse()?;
        let source = sources
            .remove(&id)
            .ok_or_else(|| CardwerkError::NotFound(format!("entity {id} in {}", manifest.display())))?;
        sources = BTreeMap::from([(id, source)]);
    }

    let options = GenerateOptions {
        force,
        minimum_version: min_version,
        ..GenerateOptions::default()
    };
    let mut first_failure = None;
    for (entity, source) in &sources {
        match engine.generate_with(entity, source, options.clone()).await {
            Ok(set) => print_json(&set)?,
            Err(failure) => {
                warn!(entity = %entity, error = %failure, "generation failed");
                let err = CliError::Generation {
                    entity: entity.clone(),
                    failure,
                };
                if sources.len() > 1 {
                    report(&err);
                }
                if first_failure.is_none() {
                    first_failure = Some(err);
                }
            }
        }
    }
    match first_failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

pub async fn regenerate(
    engine: &Arc<GenerationEngine>,
    cutoff: &Version,
    manifest: &Path,
    batch_size: usize,
    dry_run: bool,
) -> Result<(), CliError> {
    let sources = load_manifest(manifest)?;
    let summary = regenerate_below(engine, cutoff, &sources, batch_size, dry_run).await?;
    print_json(&summary)
}

pub async fn reprocess(
    engine: &Arc<GenerationEngine>,
    manifest: &Path,
    batch_size: usize,
    dry_run: bool,
) -> Result<(), CliError> {
    let sources = load_manifest(manifest)?;
    let summary = reprocess_photos(engine, &sources, batch_size, dry_run).await?;
    print_json(&summary)
}

pub async fn cleanup(engine: &Arc<GenerationEngine>, older_than_hours: Option<u64>) -> Result<(), CliError> {
    let hours = older_than_hours.unwrap_or(engine.config().storage.temp_max_age_hours);
    let report = engine.cleanup(Duration::from_secs(hours * 3600)).await?;
    print_json(&report)
}

#[derive(Serialize)]
struct BackupView {
    source: String,
    backup: String,
}

pub async fn backup(engine: &Arc<GenerationEngine>, path: &str) -> Result<(), CliError> {
    let backup = engine.backup(path).await?;
    info!(source = path, backup = %backup, "backup written");
    print_json(&BackupView {
        source: path.to_owned(),
        backup,
    })
}

pub async fn stats(engine: &Arc<GenerationEngine>) -> Result<(), CliError> {
    print_json(&engine.stats().await?)
}

#[derive(Serialize)]
struct StatusView {
    entity: EntityId,
    status: cardwerk_core::types::GenerationStatus,
    last_error: Option<String>,
    fingerprint: Option<String>,
    generator_version: Option<String>,
}

pub async fn status(engine: &Arc<GenerationEngine>, entity: &str) -> Result<(), CliError> {
    let entity: EntityId = entity.parse()?;
    let status = engine.status(&entity).await?;
    let current = engine.current(&entity).await?;
    let last_error = engine
        .store()
        .entity_state(&entity)?
        .and_then(|state| state.last_error);
    print_json(&StatusView {
        status,
        last_error,
        fingerprint: current.as_ref().map(|set| set.fingerprint.clone()),
        generator_version: current.map(|set| set.generator_version.to_string()),
        entity,
    })
}

pub async fn sweep(engine: Arc<GenerationEngine>, interval_secs: Option<u64>) -> Result<(), CliError> {
    let interval = interval_secs.unwrap_or(engine.config().storage.sweep_interval_secs);
    let sweeper = Sweeper::spawn(engine, Duration::from_secs(interval.max(1)));
    tokio::signal::ctrl_c().await.map_err(CardwerkError::from)?;
    info!("interrupt received");
    sweeper.shutdown().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const MANIFEST: &str = r#"{
        "lic-1": {
            "identity": {
                "surname": "Doe",
                "given_names": "John",
                "id_number": "9001015800085",
                "license_number": "L-ABCD-1234-EFGH",
                "birth_date": "1990-01-01",
                "issue_date": "2024-03-01",
                "expiry_date": "2029-02-28",
                "sex": "M",
                "category": "B"
            },
            "photo": { "kind": "path", "path": "/srv/photos/lic-1.jpg" }
        }
    }"#;

    #[test]
    fn manifest_maps_entities_to_sources() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("manifest.json");
        std::fs::write(&path, MANIFEST).unwrap();

        let manifest = load_manifest(&path).unwrap();
        let source = &manifest[&EntityId::new("lic-1").unwrap()];
        assert_eq!(source.identity.surname, "Doe");
        assert!(source.photo_region.is_none());
    }

    #[test]
    fn manifest_rejects_invalid_entity_ids() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("manifest.json");
        std::fs::write(&path, MANIFEST.replace("lic-1", "../lic-1")).unwrap();
        assert!(load_manifest(&path).is_err());
    }

    #[test]
    fn missing_config_file_is_an_engine_error() {
        let dir = TempDir::new().unwrap();
        let err = load_config(Some(&dir.path().join("absent.json")), dir.path()).unwrap_err();
        assert!(matches!(err, CliError::Engine(CardwerkError::Io(_))));
    }

    #[test]
    fn init_writes_a_loadable_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cardwerk.json");
        init(&path).unwrap();
        let config = load_config(Some(&path), dir.path()).unwrap();
        assert_eq!(config.template_version, EngineConfig::default().template_version);
    }
}
