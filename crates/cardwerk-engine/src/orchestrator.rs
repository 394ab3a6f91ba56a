// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Generation orchestrator.
//
// One `generate` call turns a SourceData snapshot into a published artifact
// set. Guarantees:
//
//   * the fingerprint is checked before any rendering; a matching, non-stale
//     set whose files are all present is returned as a cache hit
//   * at most one generation per entity runs at a time; concurrent callers
//     join it and receive the same outcome
//   * fetch and render run under the configured wall-clock budget
//   * a failed attempt never replaces the entity's current artifact set
//   * cleanup never overlaps a publish

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use cardwerk_core::config::EngineConfig;
use cardwerk_core::error::{CardwerkError, Result};
use cardwerk_core::types::{
    ArtifactFiles, ArtifactKind, ArtifactSet, CleanupReport, EntityId, GenerationStatus, SourceData,
    StorageStats,
};
use cardwerk_render::source_extension;
use cardwerk_store::{ContentStore, hash_bytes};
use chrono::Utc;
use semver::Version;
use thiserror::Error;
use tokio::sync::{RwLock, watch};
use tracing::{debug, error, info, instrument, warn};

use crate::fetch::PhotoFetcher;
use crate::fingerprint;
use crate::pipeline::{Pipeline, RenderedArtifacts};

/// Downstream persistence collaborator, told about every published set.
pub trait ArtifactPublisher: Send + Sync {
    fn publish(&self, set: &ArtifactSet) -> Result<()>;
}

/// Per-call generation switches.
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    /// Render even when the fingerprint matches.
    pub force: bool,
    /// Caller's minimum acceptable generator version, on top of the
    /// configured one.
    pub minimum_version: Option<Version>,
    /// Re-normalize the photo instead of reusing a cached processed photo.
    pub bypass_photo_cache: bool,
}

impl GenerateOptions {
    pub fn forced() -> Self {
        Self {
            force: true,
            ..Self::default()
        }
    }
}

/// A failed generation, telling the caller whether a usable set remains.
#[derive(Debug, Clone, Error)]
pub enum GenerationFailure {
    #[error("generation failed and no artifact set exists: {source}")]
    NoArtifact { source: Arc<CardwerkError> },

    #[error("generation failed, previous artifact set {} is still current: {source}", .previous.fingerprint)]
    PreviousRetained {
        previous: Box<ArtifactSet>,
        source: Arc<CardwerkError>,
    },
}

impl GenerationFailure {
    pub fn error(&self) -> &CardwerkError {
        match self {
            Self::NoArtifact { source } | Self::PreviousRetained { source, .. } => &**source,
        }
    }

    /// The artifact set that stayed current, if any.
    pub fn previous(&self) -> Option<&ArtifactSet> {
        match self {
            Self::NoArtifact { .. } => None,
            Self::PreviousRetained { previous, .. } => Some(&**previous),
        }
    }
}

pub type GenerationOutcome = std::result::Result<ArtifactSet, GenerationFailure>;

enum Role {
    Leader(watch::Sender<Option<GenerationOutcome>>),
    Follower(watch::Receiver<Option<GenerationOutcome>>),
}

/// Removes the in-flight marker even when the leading future is dropped.
struct InFlightGuard<'a> {
    engine: &'a GenerationEngine,
    entity: &'a EntityId,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.engine.in_flight().remove(self.entity);
    }
}

pub struct GenerationEngine {
    config: EngineConfig,
    store: Arc<ContentStore>,
    fetcher: PhotoFetcher,
    pipeline: Arc<Pipeline>,
    publisher: Option<Arc<dyn ArtifactPublisher>>,
    in_flight: Mutex<HashMap<EntityId, watch::Receiver<Option<GenerationOutcome>>>>,
    // Publishes share it, cleanup takes it exclusively.
    publish_gate: RwLock<()>,
    render_passes: Arc<AtomicU64>,
    cache_hits: AtomicU64,
}

impl std::fmt::Debug for GenerationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationEngine")
            .field("root", &self.config.storage.root)
            .field("generator_version", &self.config.generator_version.to_string())
            .field("template_version", &self.config.template_version)
            .finish_non_exhaustive()
    }
}

impl GenerationEngine {
    /// Validate `config`, open the content store and load template assets.
    #[instrument(skip_all, fields(root = %config.storage.root.display()))]
    pub fn open(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let store = ContentStore::open(config.storage.clone())?;
        let fetcher = PhotoFetcher::new(Duration::from_secs(config.timeouts.photo_fetch_secs))?;
        let pipeline = Pipeline::new(&config)?;
        info!(
            generator = %config.generator_version,
            template = %config.template_version,
            "Generation engine ready"
        );
        Ok(Self {
            store: Arc::new(store),
            fetcher,
            pipeline: Arc::new(pipeline),
            publisher: None,
            in_flight: Mutex::new(HashMap::new()),
            publish_gate: RwLock::new(()),
            render_passes: Arc::new(AtomicU64::new(0)),
            cache_hits: AtomicU64::new(0),
            config,
        })
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn ArtifactPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<ContentStore> {
        &self.store
    }

    /// Render passes started since the engine opened.
    pub fn render_passes(&self) -> u64 {
        self.render_passes.load(Ordering::Relaxed)
    }

    pub fn cache_hits(&self) -> u64 {
        self.cache_hits.load(Ordering::Relaxed)
    }

    pub fn is_generating(&self, entity: &EntityId) -> bool {
        self.in_flight().contains_key(entity)
    }

    fn in_flight(&self) -> MutexGuard<'_, HashMap<EntityId, watch::Receiver<Option<GenerationOutcome>>>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Generate (or reuse) the artifact set for `entity`.
    pub async fn generate(&self, entity: &EntityId, source: &SourceData, force: bool) -> GenerationOutcome {
        let options = GenerateOptions {
            force,
            ..GenerateOptions::default()
        };
        self.generate_with(entity, source, options).await
    }

    /// Like `generate` with explicit options. A call that finds a generation
    /// for the same entity already running waits for it and returns its
    /// outcome, whatever options either call carried.
    pub async fn generate_with(
        &self,
        entity: &EntityId,
        source: &SourceData,
        options: GenerateOptions,
    ) -> GenerationOutcome {
        loop {
            let role = {
                let mut in_flight = self.in_flight();
                match in_flight.get(entity) {
                    Some(rx) => Role::Follower(rx.clone()),
                    None => {
                        let (tx, rx) = watch::channel(None);
                        in_flight.insert(entity.clone(), rx);
                        Role::Leader(tx)
                    }
                }
            };

            match role {
                Role::Leader(tx) => {
                    let guard = InFlightGuard { engine: self, entity };
                    let outcome = self.run(entity, source, &options).await;
                    drop(guard);
                    tx.send_replace(Some(outcome.clone()));
                    return outcome;
                }
                Role::Follower(mut rx) => {
                    debug!(entity = %entity, "joining in-flight generation");
                    let joined = rx.wait_for(Option::is_some).await.map(|v| (*v).clone());
                    match joined {
                        Ok(Some(outcome)) => return outcome,
                        // The leader was cancelled before finishing; take over.
                        Ok(None) | Err(_) => continue,
                    }
                }
            }
        }
    }

    #[instrument(skip_all, fields(entity = %entity, force = options.force))]
    async fn run(&self, entity: &EntityId, source: &SourceData, options: &GenerateOptions) -> GenerationOutcome {
        let store = Arc::clone(&self.store);
        let id = entity.clone();
        let previous = match blocking(move || store.current_artifact_set(&id)).await {
            Ok(previous) => previous,
            Err(err) => {
                error!(error = %err, "could not read current artifact set");
                return Err(GenerationFailure::NoArtifact { source: Arc::new(err) });
            }
        };

        match self.attempt(entity, source, options, previous.as_ref()).await {
            Ok(set) => Ok(set),
            Err(err) => {
                error!(error = %err, retained = previous.is_some(), "generation aborted");
                let store = Arc::clone(&self.store);
                let id = entity.clone();
                let message = err.to_string();
                let recorded =
                    blocking(move || store.set_status(&id, GenerationStatus::Failed, Some(&message))).await;
                if let Err(status_err) = recorded {
                    warn!(error = %status_err, "could not record failed status");
                }
                let source = Arc::new(err);
                Err(match previous {
                    Some(previous) => GenerationFailure::PreviousRetained {
                        previous: Box::new(previous),
                        source,
                    },
                    None => GenerationFailure::NoArtifact { source },
                })
            }
        }
    }

    async fn attempt(
        &self,
        entity: &EntityId,
        source: &SourceData,
        options: &GenerateOptions,
        previous: Option<&ArtifactSet>,
    ) -> Result<ArtifactSet> {
        let fingerprint = fingerprint::compute(source, &self.config)?;

        if let Some(previous) = previous.filter(|_| !options.force) {
            let minimum = self.effective_minimum(options.minimum_version.as_ref());
            if previous.fingerprint == fingerprint
                && previous.generator_version >= minimum
                && self.files_present(previous).await?
            {
                self.cache_hits.fetch_add(1, Ordering::Relaxed);
                info!(fingerprint = %fingerprint, "cache hit");
                // Clears a failure recorded by an earlier attempt.
                let store = Arc::clone(&self.store);
                let id = entity.clone();
                blocking(move || store.set_status(&id, GenerationStatus::Ready, None)).await?;
                return Ok(ArtifactSet {
                    cache_hit: true,
                    ..previous.clone()
                });
            }
            debug!(
                stored = %previous.fingerprint,
                version = %previous.generator_version,
                %minimum,
                "current artifact set is not reusable"
            );
        }

        let store = Arc::clone(&self.store);
        let id = entity.clone();
        blocking(move || store.set_status(&id, GenerationStatus::Generating, None)).await?;
        info!(fingerprint = %fingerprint, "generation started");

        let budget = self.config.timeouts.generation_secs;
        let rendered = tokio::time::timeout(
            Duration::from_secs(budget),
            self.produce(source, options.bypass_photo_cache),
        )
        .await
        .map_err(|_| CardwerkError::GenerationTimeout(budget))??;

        self.publish(entity, fingerprint, rendered).await
    }

    /// Fetch the photo and run the pipeline.
    async fn produce(&self, source: &SourceData, bypass_photo_cache: bool) -> Result<RenderedArtifacts> {
        let raw = self.fetcher.fetch(&source.photo).await?;
        let region = source.photo_region;
        let cache_key = self.pipeline.photo_cache_key(&hash_bytes(&raw), region);

        let cached = if bypass_photo_cache {
            None
        } else {
            let store = Arc::clone(&self.store);
            let key = cache_key.clone();
            blocking(move || {
                let Some(entry) = store.cached_photo(&key)? else {
                    return Ok(None);
                };
                match store.read(&entry.relative_path) {
                    Ok(jpeg) => Ok(Some(jpeg)),
                    Err(err) => {
                        warn!(error = %err, path = %entry.relative_path, "cached photo unusable, reprocessing");
                        Ok(None)
                    }
                }
            })
            .await?
        };

        let pipeline = Arc::clone(&self.pipeline);
        let passes = Arc::clone(&self.render_passes);
        let identity = source.identity.clone();
        blocking(move || {
            passes.fetch_add(1, Ordering::Relaxed);
            let photo = match cached {
                Some(jpeg) => {
                    debug!("processed photo cache hit");
                    pipeline.reuse_photo(jpeg)?
                }
                None => pipeline.normalize(&raw, region)?,
            };
            pipeline.render(&identity, photo, raw, cache_key)
        })
        .await
    }

    /// Store every file, then make the new set current and supersede the old.
    async fn publish(&self, entity: &EntityId, fingerprint: String, rendered: RenderedArtifacts) -> Result<ArtifactSet> {
        let _gate = self.publish_gate.read().await;
        let store = Arc::clone(&self.store);
        let id = entity.clone();
        let generator_version = self.config.generator_version.clone();
        let template_version = self.config.template_version.clone();

        let set = blocking(move || {
            let put = |kind: ArtifactKind, content: &[u8]| store.put_artifact(&id, kind, content);
            let original = &rendered.original_photo;
            let files = ArtifactFiles {
                front_image: put(ArtifactKind::FrontImage, &rendered.front_png)?,
                back_image: put(ArtifactKind::BackImage, &rendered.back_png)?,
                front_document: put(ArtifactKind::FrontDocument, &rendered.front_pdf)?,
                back_document: put(ArtifactKind::BackDocument, &rendered.back_pdf)?,
                combined_document: put(ArtifactKind::CombinedDocument, &rendered.combined_pdf)?,
                original_photo: store.put_artifact_as(
                    &id,
                    ArtifactKind::OriginalPhoto,
                    original,
                    source_extension(original),
                )?,
                processed_photo: put(ArtifactKind::ProcessedPhoto, &rendered.processed_photo.jpeg)?,
            };
            store.remember_photo(&rendered.photo_cache_key, &files.processed_photo.relative_path)?;

            let set = ArtifactSet {
                entity_id: id.clone(),
                fingerprint,
                generator_version,
                template_version,
                created_at: Utc::now(),
                files,
                mrz: rendered.mrz,
                cache_hit: false,
            };
            let superseded = store.publish_artifact_set(&set)?;
            store.set_status(&id, GenerationStatus::Ready, None)?;
            info!(fingerprint = %set.fingerprint, superseded, "artifact set published");
            Ok(set)
        })
        .await?;

        if let Some(publisher) = &self.publisher {
            if let Err(err) = publisher.publish(&set) {
                warn!(error = %err, "artifact publisher failed; set stays published");
            }
        }
        Ok(set)
    }

    async fn files_present(&self, set: &ArtifactSet) -> Result<bool> {
        let store = Arc::clone(&self.store);
        let files = set.files.clone();
        blocking(move || {
            for file in files.iter() {
                if !store.contains(file)? {
                    debug!(path = %file.relative_path, "cached file missing");
                    return Ok(false);
                }
            }
            Ok(true)
        })
        .await
    }

    fn effective_minimum(&self, requested: Option<&Version>) -> Version {
        match requested {
            Some(requested) if *requested > self.config.minimum_generator_version => requested.clone(),
            _ => self.config.minimum_generator_version.clone(),
        }
    }

    fn is_stale(&self, set: &ArtifactSet) -> bool {
        set.generator_version < self.config.minimum_generator_version
            || set.template_version != self.config.template_version
    }

    /// The entity's current artifact set, if one was ever published.
    pub async fn current(&self, entity: &EntityId) -> Result<Option<ArtifactSet>> {
        let store = Arc::clone(&self.store);
        let id = entity.clone();
        blocking(move || store.current_artifact_set(&id)).await
    }

    /// Current artifact set of every entity.
    pub async fn current_sets(&self) -> Result<Vec<ArtifactSet>> {
        let store = Arc::clone(&self.store);
        blocking(move || store.current_artifact_sets()).await
    }

    /// Lifecycle status of `entity` as seen by this engine's configuration.
    pub async fn status(&self, entity: &EntityId) -> Result<GenerationStatus> {
        if self.is_generating(entity) {
            return Ok(GenerationStatus::Generating);
        }
        let store = Arc::clone(&self.store);
        let id = entity.clone();
        let (state, current) =
            blocking(move || Ok((store.entity_state(&id)?, store.current_artifact_set(&id)?))).await?;

        let stored = match state.map(|s| s.status) {
            // A generating row with nothing in flight was left by an
            // interrupted process.
            Some(GenerationStatus::Generating) | None => match current {
                Some(_) => GenerationStatus::Ready,
                None => GenerationStatus::NoArtifact,
            },
            Some(status) => status,
        };
        Ok(match (stored, current) {
            (GenerationStatus::Ready, Some(set)) if self.is_stale(&set) => GenerationStatus::Stale,
            (GenerationStatus::Ready, None) => GenerationStatus::NoArtifact,
            (status, _) => status,
        })
    }

    /// Run content-store cleanup with publishing paused.
    pub async fn cleanup(&self, older_than: Duration) -> Result<CleanupReport> {
        let _gate = self.publish_gate.write().await;
        let store = Arc::clone(&self.store);
        blocking(move || store.cleanup(older_than)).await
    }

    /// Copy a stored file to a timestamped backup next to it.
    pub async fn backup(&self, relative_path: &str) -> Result<String> {
        let store = Arc::clone(&self.store);
        let relative_path = relative_path.to_owned();
        blocking(move || store.backup(&relative_path)).await
    }

    pub async fn stats(&self) -> Result<StorageStats> {
        let store = Arc::clone(&self.store);
        blocking(move || store.stats()).await
    }
}

/// Run synchronous store or pipeline work on the blocking pool.
async fn blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| CardwerkError::Io(io::Error::other(format!("blocking task failed: {e}"))))?
}
