// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Operator batch jobs: regenerate everything below a generator version, or
// re-normalize every photo. Both run forced generations in fixed-size
// batches; a batch finishes before the next one starts.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use cardwerk_core::error::Result;
use cardwerk_core::types::{EntityId, SourceData};
use semver::Version;
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{error, info, instrument, warn};

use crate::orchestrator::{GenerateOptions, GenerationEngine};

/// Outcome counts of one batch job. `regenerated + skipped + failed`
/// always equals `examined`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub examined: u64,
    /// In a dry run, the number that would have been regenerated.
    pub regenerated: u64,
    pub skipped: u64,
    pub failed: u64,
    pub dry_run: bool,
    /// Error text per failed entity.
    pub failures: BTreeMap<EntityId, String>,
}

/// Force-regenerate every entity whose current artifact set was stamped
/// with a generator version below `cutoff`. Entities without a current set
/// or already at the cutoff are skipped.
#[instrument(skip(engine, sources), fields(%cutoff, entities = sources.len()))]
pub async fn regenerate_below(
    engine: &Arc<GenerationEngine>,
    cutoff: &Version,
    sources: &BTreeMap<EntityId, SourceData>,
    batch_size: usize,
    dry_run: bool,
) -> Result<BatchSummary> {
    let versions: HashMap<EntityId, Version> = engine
        .current_sets()
        .await?
        .into_iter()
        .map(|set| (set.entity_id, set.generator_version))
        .collect();

    let mut summary = BatchSummary {
        examined: sources.len() as u64,
        dry_run,
        ..BatchSummary::default()
    };
    let targets: Vec<(EntityId, SourceData)> = sources
        .iter()
        .filter(|(entity, _)| versions.get(*entity).is_some_and(|v| v < cutoff))
        .map(|(entity, source)| (entity.clone(), source.clone()))
        .collect();
    summary.skipped = summary.examined - targets.len() as u64;

    run_batches(engine, targets, GenerateOptions::forced(), batch_size, &mut summary).await;
    info!(
        regenerated = summary.regenerated,
        skipped = summary.skipped,
        failed = summary.failed,
        dry_run,
        "regeneration finished"
    );
    Ok(summary)
}

/// Re-normalize the photo of every entity and regenerate its set, ignoring
/// the processed-photo cache.
#[instrument(skip(engine, sources), fields(entities = sources.len()))]
pub async fn reprocess_photos(
    engine: &Arc<GenerationEngine>,
    sources: &BTreeMap<EntityId, SourceData>,
    batch_size: usize,
    dry_run: bool,
) -> Result<BatchSummary> {
    let mut summary = BatchSummary {
        examined: sources.len() as u64,
        dry_run,
        ..BatchSummary::default()
    };
    let targets = sources
        .iter()
        .map(|(entity, source)| (entity.clone(), source.clone()))
        .collect();
    let options = GenerateOptions {
        force: true,
        bypass_photo_cache: true,
        ..GenerateOptions::default()
    };

    run_batches(engine, targets, options, batch_size, &mut summary).await;
    info!(
        reprocessed = summary.regenerated,
        failed = summary.failed,
        dry_run,
        "photo reprocessing finished"
    );
    Ok(summary)
}

async fn run_batches(
    engine: &Arc<GenerationEngine>,
    targets: Vec<(EntityId, SourceData)>,
    options: GenerateOptions,
    batch_size: usize,
    summary: &mut BatchSummary,
) {
    if summary.dry_run {
        summary.regenerated = targets.len() as u64;
        return;
    }

    for (index, batch) in targets.chunks(batch_size.max(1)).enumerate() {
        info!(batch = index + 1, size = batch.len(), "starting batch");
        let mut tasks = JoinSet::new();
        for (entity, source) in batch.iter().cloned() {
            let engine = Arc::clone(engine);
            let options = options.clone();
            tasks.spawn(async move {
                let outcome = engine.generate_with(&entity, &source, options).await;
                (entity, outcome)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(_))) => summary.regenerated += 1,
                Ok((entity, Err(failure))) => {
                    warn!(entity = %entity, error = %failure, "regeneration failed");
                    summary.failed += 1;
                    summary.failures.insert(entity, failure.error().to_string());
                }
                Err(join_err) => {
                    error!(error = %join_err, "regeneration task panicked");
                    summary.failed += 1;
                }
            }
        }
    }
}
