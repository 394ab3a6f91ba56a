// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Content-addressed file store.
//
// Files are partitioned by category (license outputs, photo assets, temp)
// under one root. License and photo files carry their SHA-256 in the file
// name; temp files get a random name. Every write lands in temp/ first and is
// renamed into place, so a reader never sees a half-written file.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use cardwerk_core::config::StorageConfig;
use cardwerk_core::error::{CardwerkError, Result};
use cardwerk_core::types::{
    ArtifactKind, ArtifactSet, CategoryStats, CleanupReport, EntityId, FileRef, GenerationStatus, StorageCategory,
    StorageEntry, StorageStats,
};
use chrono::Utc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::index::{EntityState, StoreIndex};
use crate::integrity::{hash_bytes, verify_hash};

const STAGING_SUFFIX: &str = "partial";

/// How a file is named inside its category directory.
#[derive(Debug, Clone, Copy)]
pub struct EntryName<'a> {
    pub owner: Option<&'a EntityId>,
    /// Artifact kind or photo variant, e.g. `front` or `processed`.
    pub label: &'a str,
    pub extension: &'a str,
}

impl<'a> EntryName<'a> {
    /// Name for one file of an entity's artifact set.
    pub fn artifact(owner: &'a EntityId, kind: ArtifactKind) -> Self {
        Self {
            owner: Some(owner),
            label: kind.file_label(),
            extension: kind.extension(),
        }
    }

    /// Name for an anonymous working file.
    pub fn scratch(extension: &'a str) -> Self {
        Self {
            owner: None,
            label: "scratch",
            extension,
        }
    }

    fn validate(&self) -> Result<()> {
        let ok = |s: &str| {
            !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        };
        if !ok(self.label) {
            return Err(CardwerkError::InvalidValue {
                kind: "entry label",
                value: self.label.to_owned(),
            });
        }
        if !ok(self.extension) {
            return Err(CardwerkError::InvalidValue {
                kind: "file extension",
                value: self.extension.to_owned(),
            });
        }
        Ok(())
    }

    /// File name within the category directory.
    ///
    /// license: `{owner}_{hash}_{label}.{ext}`
    /// photo:   `{owner}_{label}_{hash}.{ext}`
    /// temp:    `{random}.{ext}`
    fn file_name(&self, category: StorageCategory, hash: &str) -> String {
        let owner = self.owner.map(|o| format!("{o}_")).unwrap_or_default();
        match category {
            StorageCategory::License => format!("{owner}{hash}_{}.{}", self.label, self.extension),
            StorageCategory::Photo => format!("{owner}{}_{hash}.{}", self.label, self.extension),
            StorageCategory::Temp => format!("{}.{}", Uuid::new_v4().simple(), self.extension),
        }
    }
}

/// Durable, content-addressed storage for every generated file.
pub struct ContentStore {
    config: StorageConfig,
    index: StoreIndex,
}

impl ContentStore {
    /// Create the category directories under `config.root` and open the index.
    #[instrument(skip_all, fields(root = %config.root.display()))]
    pub fn open(config: StorageConfig) -> Result<Self> {
        for category in StorageCategory::ALL {
            let dir = config.category_dir(*category);
            fs::create_dir_all(&dir).map_err(|e| CardwerkError::from_write(&dir.display().to_string(), e))?;
        }
        let index = StoreIndex::open(&config.index_path())?;
        info!("content store ready");
        Ok(Self { config, index })
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    pub fn index(&self) -> &StoreIndex {
        &self.index
    }

    /// Absolute location of a stored file.
    pub fn absolute_path(&self, relative_path: &str) -> PathBuf {
        self.config.root.join(relative_path)
    }

    fn relative_path(&self, category: StorageCategory, file_name: &str) -> String {
        format!("{}/{}", self.config.dir_name(category), file_name)
    }

    /// Store `content`. Writing the same bytes under the same name again
    /// returns the existing entry without touching the disk.
    #[instrument(skip(self, content), fields(category = %category, len = content.len()))]
    pub fn put(&self, category: StorageCategory, content: &[u8], name: EntryName<'_>) -> Result<StorageEntry> {
        name.validate()?;
        let hash = hash_bytes(content);
        let now = Utc::now();

        let existing = match category {
            StorageCategory::Temp => self.index.entry_by_hash(category, &hash)?,
            _ => {
                let path = self.relative_path(category, &name.file_name(category, &hash));
                self.index.entry_by_path(&path)?
            }
        };
        if let Some(mut entry) = existing.clone() {
            if entry.hash == hash && self.absolute_path(&entry.relative_path).is_file() {
                self.index.touch(&entry.relative_path, now)?;
                entry.last_access = now;
                debug!(path = %entry.relative_path, "content already stored");
                return Ok(entry);
            }
        }

        let relative_path = match &existing {
            Some(entry) => entry.relative_path.clone(),
            None => self.relative_path(category, &name.file_name(category, &hash)),
        };
        self.write_atomic(&self.absolute_path(&relative_path), content)?;

        let entry = StorageEntry {
            category,
            hash,
            relative_path,
            owner: name.owner.cloned(),
            label: name.label.to_owned(),
            size_bytes: content.len() as u64,
            ref_count: existing.as_ref().map_or(0, |e| e.ref_count),
            superseded: false,
            created_at: now,
            last_access: now,
        };
        self.index.upsert_entry(&entry)?;
        info!(path = %entry.relative_path, "stored");
        Ok(entry)
    }

    /// Store one file of an entity's artifact set and return its reference.
    pub fn put_artifact(&self, owner: &EntityId, kind: ArtifactKind, content: &[u8]) -> Result<FileRef> {
        self.put_artifact_as(owner, kind, content, kind.extension())
    }

    /// Like `put_artifact` with an explicit extension, for source photos
    /// kept in their original format.
    pub fn put_artifact_as(
        &self,
        owner: &EntityId,
        kind: ArtifactKind,
        content: &[u8],
        extension: &str,
    ) -> Result<FileRef> {
        let name = EntryName {
            extension,
            ..EntryName::artifact(owner, kind)
        };
        let entry = self.put(kind.category(), content, name)?;
        Ok(FileRef {
            kind,
            category: entry.category,
            relative_path: entry.relative_path,
            hash: entry.hash,
            size_bytes: entry.size_bytes,
        })
    }

    fn write_atomic(&self, target: &Path, content: &[u8]) -> Result<()> {
        let staging = self
            .config
            .category_dir(StorageCategory::Temp)
            .join(format!("{}.{STAGING_SUFFIX}", Uuid::new_v4().simple()));

        let result = (|| -> io::Result<()> {
            let mut file = File::create(&staging)?;
            file.write_all(content)?;
            file.sync_all()?;
            fs::rename(&staging, target)
        })();

        if let Err(err) = result {
            if let Err(cleanup) = fs::remove_file(&staging) {
                if cleanup.kind() != io::ErrorKind::NotFound {
                    warn!(path = %staging.display(), %cleanup, "Staging file left behind");
                }
            }
            return Err(CardwerkError::from_write(&target.display().to_string(), err));
        }
        Ok(())
    }

    /// Content stored under `hash` in `category`.
    #[instrument(skip(self), fields(category = %category))]
    pub fn get(&self, category: StorageCategory, hash: &str) -> Result<Vec<u8>> {
        let entry = self
            .index
            .entry_by_hash(category, hash)?
            .ok_or_else(|| CardwerkError::NotFound(format!("{category}/{hash}")))?;
        self.read_entry(&entry)
    }

    /// Content of the file at `relative_path`, verified against its hash.
    pub fn read(&self, relative_path: &str) -> Result<Vec<u8>> {
        let entry = self
            .index
            .entry_by_path(relative_path)?
            .ok_or_else(|| CardwerkError::NotFound(relative_path.to_owned()))?;
        self.read_entry(&entry)
    }

    fn read_entry(&self, entry: &StorageEntry) -> Result<Vec<u8>> {
        let bytes = match fs::read(self.absolute_path(&entry.relative_path)) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(CardwerkError::NotFound(entry.relative_path.clone()));
            }
            Err(err) => return Err(err.into()),
        };
        verify_hash(&bytes, &entry.hash)?;
        self.index.touch(&entry.relative_path, Utc::now())?;
        Ok(bytes)
    }

    /// True when `file` is indexed and present on disk.
    pub fn contains(&self, file: &FileRef) -> Result<bool> {
        Ok(self
            .index
            .entry_by_path(&file.relative_path)?
            .is_some_and(|e| e.hash == file.hash && self.absolute_path(&e.relative_path).is_file()))
    }

    /// Hold an external reference to a stored file.
    pub fn retain(&self, relative_path: &str) -> Result<u32> {
        self.index.adjust_refs(relative_path, 1)
    }

    /// Drop an external reference taken with `retain`.
    pub fn release(&self, relative_path: &str) -> Result<u32> {
        self.index.adjust_refs(relative_path, -1)
    }

    /// Copy the stored file at `relative_path` to a timestamped sibling
    /// (`{name}.bak_YYYYmmdd_HHMMSS`) and return the copy's relative path.
    ///
    /// The copy is indexed with one reference held, so cleanup keeps it
    /// until it is released.
    #[instrument(skip(self))]
    pub fn backup(&self, relative_path: &str) -> Result<String> {
        let source = self
            .index
            .entry_by_path(relative_path)?
            .ok_or_else(|| CardwerkError::NotFound(relative_path.to_owned()))?;
        let content = self.read_entry(&source)?;

        let now = Utc::now();
        let backup_path = format!("{relative_path}.bak_{}", now.format("%Y%m%d_%H%M%S"));
        self.write_atomic(&self.absolute_path(&backup_path), &content)?;

        self.index.upsert_entry(&StorageEntry {
            relative_path: backup_path.clone(),
            ref_count: 1,
            superseded: false,
            created_at: now,
            last_access: now,
            ..source
        })?;
        info!(path = %backup_path, "backup created");
        Ok(backup_path)
    }

    /// Make `set` its entity's current artifact set. Every file must already
    /// be stored; the previous set is superseded in the same transaction.
    #[instrument(skip_all, fields(entity = %set.entity_id))]
    pub fn publish_artifact_set(&self, set: &ArtifactSet) -> Result<usize> {
        for file in set.files.iter() {
            if !self.contains(file)? {
                return Err(CardwerkError::NotFound(file.relative_path.clone()));
            }
        }
        self.index.publish_set(set)
    }

    /// Mark the entity's files outside `current` as no longer current.
    /// Nothing is deleted until `cleanup`.
    pub fn supersede(&self, entity: &EntityId, current: &ArtifactSet) -> Result<usize> {
        if &current.entity_id != entity {
            return Err(CardwerkError::InvalidValue {
                kind: "artifact set owner",
                value: current.entity_id.to_string(),
            });
        }
        self.index.supersede(current)
    }

    pub fn current_artifact_set(&self, entity: &EntityId) -> Result<Option<ArtifactSet>> {
        self.index.current_set(entity)
    }

    pub fn current_artifact_sets(&self) -> Result<Vec<ArtifactSet>> {
        self.index.current_sets()
    }

    pub fn set_status(&self, entity: &EntityId, status: GenerationStatus, error: Option<&str>) -> Result<()> {
        self.index.set_status(entity, status, error)
    }

    pub fn entity_state(&self, entity: &EntityId) -> Result<Option<EntityState>> {
        self.index.entity_state(entity)
    }

    /// Stored processed photo for `cache_key`, if it is still on disk.
    pub fn cached_photo(&self, cache_key: &str) -> Result<Option<StorageEntry>> {
        let Some(path) = self.index.cached_photo(cache_key)? else {
            return Ok(None);
        };
        Ok(self
            .index
            .entry_by_path(&path)?
            .filter(|e| self.absolute_path(&e.relative_path).is_file()))
    }

    pub fn remember_photo(&self, cache_key: &str, relative_path: &str) -> Result<()> {
        self.index.remember_photo(cache_key, relative_path)
    }

    /// Remove temp files idle for longer than `older_than`, superseded
    /// license/photo files with no references, and unindexed license/photo
    /// files older than `older_than`.
    #[instrument(skip(self), fields(older_than_secs = older_than.as_secs()))]
    pub fn cleanup(&self, older_than: Duration) -> Result<CleanupReport> {
        let now = SystemTime::now();
        let mut report = CleanupReport::default();

        // Temp: age from the later of mtime and indexed last access.
        for (path, name, meta) in self.list_files(StorageCategory::Temp)? {
            let relative = self.relative_path(StorageCategory::Temp, &name);
            let indexed = self.index.entry_by_path(&relative)?;
            let mut last_used = meta.modified().unwrap_or(now);
            if let Some(entry) = &indexed {
                last_used = last_used.max(SystemTime::from(entry.last_access));
            }
            if age(now, last_used) <= older_than {
                continue;
            }
            if remove_file(&path)? {
                report.temp_removed += 1;
                report.bytes_freed += meta.len();
            }
            if indexed.is_some() {
                self.index.delete_entry(&relative)?;
            }
        }

        for entry in self.index.collectable_entries()? {
            if !self.index.delete_if_collectable(&entry.relative_path)? {
                continue;
            }
            remove_file(&self.absolute_path(&entry.relative_path))?;
            report.superseded_removed += 1;
            report.bytes_freed += entry.size_bytes;
        }

        for category in [StorageCategory::License, StorageCategory::Photo] {
            for (path, name, meta) in self.list_files(category)? {
                let relative = self.relative_path(category, &name);
                if self.index.entry_by_path(&relative)?.is_some() {
                    continue;
                }
                if age(now, meta.modified().unwrap_or(now)) <= older_than {
                    continue;
                }
                if remove_file(&path)? {
                    warn!(path = %relative, "Removed orphaned file");
                    report.orphans_removed += 1;
                    report.bytes_freed += meta.len();
                }
            }
        }

        let pruned = self.index.prune_sets()?;
        info!(
            temp = report.temp_removed,
            superseded = report.superseded_removed,
            orphans = report.orphans_removed,
            bytes = report.bytes_freed,
            pruned_sets = pruned,
            "cleanup finished"
        );
        Ok(report)
    }

    /// File count and bytes per category, measured on disk.
    pub fn stats(&self) -> Result<StorageStats> {
        let mut stats = StorageStats::default();
        for category in StorageCategory::ALL {
            let mut per = CategoryStats::default();
            for (_, _, meta) in self.list_files(*category)? {
                per.file_count += 1;
                per.total_bytes += meta.len();
            }
            stats.file_count += per.file_count;
            stats.total_bytes += per.total_bytes;
            stats.per_category.insert(*category, per);
        }
        debug!(files = stats.file_count, bytes = stats.total_bytes, "storage stats");
        Ok(stats)
    }

    /// Regular files directly inside a category directory, sorted by name.
    fn list_files(&self, category: StorageCategory) -> Result<Vec<(PathBuf, String, fs::Metadata)>> {
        let dir = self.config.category_dir(category);
        let reader = match fs::read_dir(&dir) {
            Ok(reader) => reader,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let mut files = Vec::new();
        for item in reader {
            let item = item?;
            let meta = item.metadata()?;
            if !meta.is_file() {
                continue;
            }
            let Some(name) = item.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            files.push((item.path(), name, meta));
        }
        files.sort_by(|a, b| a.1.cmp(&b.1));
        Ok(files)
    }
}

fn age(now: SystemTime, then: SystemTime) -> Duration {
    now.duration_since(then).unwrap_or_default()
}

/// Delete a file; returns false when it was already gone.
fn remove_file(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardwerk_core::types::{ArtifactFiles, MrzPayload};
    use tempfile::TempDir;

    const HOUR: Duration = Duration::from_secs(3600);

    fn store() -> (TempDir, ContentStore) {
        let dir = TempDir::new().unwrap();
        let config = StorageConfig {
            root: dir.path().to_path_buf(),
            ..StorageConfig::default()
        };
        (dir, ContentStore::open(config).unwrap())
    }

    fn backdate(path: &Path, by: Duration) {
        let file = File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - by).unwrap();
    }

    fn artifact_set(store: &ContentStore, entity: &EntityId, seed: &str) -> ArtifactSet {
        let put = |kind: ArtifactKind| {
            store
                .put_artifact(entity, kind, format!("{seed}-{kind}").as_bytes())
                .unwrap()
        };
        ArtifactSet {
            entity_id: entity.clone(),
            fingerprint: hash_bytes(seed.as_bytes()),
            generator_version: semver::Version::new(2, 0, 0),
            template_version: "t".into(),
            created_at: Utc::now(),
            files: ArtifactFiles {
                front_image: put(ArtifactKind::FrontImage),
                back_image: put(ArtifactKind::BackImage),
                front_document: put(ArtifactKind::FrontDocument),
                back_document: put(ArtifactKind::BackDocument),
                combined_document: put(ArtifactKind::CombinedDocument),
                original_photo: put(ArtifactKind::OriginalPhoto),
                processed_photo: put(ArtifactKind::ProcessedPhoto),
            },
            mrz: MrzPayload {
                lines: ["1".into(), "2".into(), "3".into()],
            },
            cache_hit: false,
        }
    }

    #[test]
    fn put_is_idempotent() {
        let (_dir, store) = store();
        let owner = EntityId::new("lic-1").unwrap();
        let name = EntryName::artifact(&owner, ArtifactKind::FrontImage);
        let a = store.put(StorageCategory::License, b"png bytes", name).unwrap();
        let b = store.put(StorageCategory::License, b"png bytes", name).unwrap();
        assert_eq!(a.relative_path, b.relative_path);
        assert_eq!(a.hash, hash_bytes(b"png bytes"));
        assert_eq!(
            a.relative_path,
            format!("license-outputs/lic-1_{}_front.png", a.hash)
        );
        assert_eq!(store.stats().unwrap().file_count, 1);
    }

    #[test]
    fn photo_and_temp_naming() {
        let (_dir, store) = store();
        let owner = EntityId::new("lic-1").unwrap();
        let photo = store
            .put_artifact(&owner, ArtifactKind::ProcessedPhoto, b"jpeg")
            .unwrap();
        assert_eq!(
            photo.relative_path,
            format!("photo-assets/lic-1_processed_{}.jpg", photo.hash)
        );

        let scratch = store
            .put(StorageCategory::Temp, b"work", EntryName::scratch("bin"))
            .unwrap();
        assert!(scratch.relative_path.starts_with("temp/"));
        assert!(scratch.relative_path.ends_with(".bin"));
        let again = store
            .put(StorageCategory::Temp, b"work", EntryName::scratch("bin"))
            .unwrap();
        assert_eq!(scratch.relative_path, again.relative_path);
    }

    #[test]
    fn get_returns_content_and_detects_tampering() {
        let (_dir, store) = store();
        let entry = store
            .put(StorageCategory::Temp, b"original", EntryName::scratch("txt"))
            .unwrap();
        assert_eq!(store.get(StorageCategory::Temp, &entry.hash).unwrap(), b"original");
        assert!(matches!(
            store.get(StorageCategory::License, &entry.hash),
            Err(CardwerkError::NotFound(_))
        ));

        fs::write(store.absolute_path(&entry.relative_path), b"tampered").unwrap();
        assert!(matches!(
            store.get(StorageCategory::Temp, &entry.hash),
            Err(CardwerkError::IntegrityMismatch { .. })
        ));
    }

    #[test]
    fn put_rewrites_missing_file() {
        let (_dir, store) = store();
        let owner = EntityId::new("e").unwrap();
        let file = store.put_artifact(&owner, ArtifactKind::BackImage, b"back").unwrap();
        fs::remove_file(store.absolute_path(&file.relative_path)).unwrap();
        assert!(!store.contains(&file).unwrap());
        store.put_artifact(&owner, ArtifactKind::BackImage, b"back").unwrap();
        assert!(store.contains(&file).unwrap());
    }

    #[test]
    fn rejects_path_like_labels() {
        let (_dir, store) = store();
        let name = EntryName {
            owner: None,
            label: "../x",
            extension: "png",
        };
        assert!(matches!(
            store.put(StorageCategory::License, b"x", name),
            Err(CardwerkError::InvalidValue { .. })
        ));
    }

    #[test]
    fn cleanup_removes_only_old_temp_files() {
        let (_dir, store) = store();
        let temp = store.config().category_dir(StorageCategory::Temp);
        let fresh = temp.join("fresh.tmp");
        let stale = temp.join("stale.tmp");
        fs::write(&fresh, b"1h").unwrap();
        fs::write(&stale, b"30h").unwrap();
        backdate(&fresh, HOUR);
        backdate(&stale, 30 * HOUR);

        let report = store.cleanup(24 * HOUR).unwrap();
        assert_eq!(report.temp_removed, 1);
        assert!(fresh.exists());
        assert!(!stale.exists());
    }

    #[test]
    fn superseded_files_go_once_unreferenced() {
        let (_dir, store) = store();
        let owner = EntityId::new("lic-7").unwrap();
        let first = artifact_set(&store, &owner, "v1");
        store.publish_artifact_set(&first).unwrap();
        let second = artifact_set(&store, &owner, "v2");
        assert_eq!(store.publish_artifact_set(&second).unwrap(), 7);

        let pinned = first.files.combined_document.relative_path.clone();
        assert_eq!(store.retain(&pinned).unwrap(), 1);

        let report = store.cleanup(24 * HOUR).unwrap();
        assert_eq!(report.superseded_removed, 6);
        assert!(store.absolute_path(&pinned).exists());
        for file in second.files.iter() {
            assert!(store.contains(file).unwrap());
        }

        assert_eq!(store.release(&pinned).unwrap(), 0);
        let report = store.cleanup(24 * HOUR).unwrap();
        assert_eq!(report.superseded_removed, 1);
        assert!(!store.absolute_path(&pinned).exists());
        assert_eq!(
            store.current_artifact_set(&owner).unwrap().unwrap().fingerprint,
            second.fingerprint
        );
    }

    #[test]
    fn backup_outlives_its_superseded_source() {
        let (_dir, store) = store();
        let owner = EntityId::new("lic-9").unwrap();
        let first = artifact_set(&store, &owner, "v1");
        store.publish_artifact_set(&first).unwrap();
        store.publish_artifact_set(&artifact_set(&store, &owner, "v2")).unwrap();

        let source = &first.files.front_document;
        let copy = store.backup(&source.relative_path).unwrap();
        assert!(copy.starts_with(&format!("{}.bak_", source.relative_path)));
        assert_eq!(copy.len(), source.relative_path.len() + ".bak_20261018_120000".len());

        let report = store.cleanup(Duration::ZERO).unwrap();
        assert_eq!(report.superseded_removed, 7);
        assert_eq!(report.orphans_removed, 0);
        assert!(!store.absolute_path(&source.relative_path).exists());
        assert_eq!(store.read(&copy).unwrap(), b"v1-front_pdf".to_vec());
    }

    #[test]
    fn backup_of_unknown_path_is_not_found() {
        let (_dir, store) = store();
        assert!(matches!(
            store.backup("license-outputs/missing.pdf"),
            Err(CardwerkError::NotFound(_))
        ));
    }

    #[test]
    fn publish_refuses_missing_files() {
        let (_dir, store) = store();
        let owner = EntityId::new("lic-8").unwrap();
        let set = artifact_set(&store, &owner, "v1");
        fs::remove_file(store.absolute_path(&set.files.back_document.relative_path)).unwrap();
        assert!(matches!(
            store.publish_artifact_set(&set),
            Err(CardwerkError::NotFound(_))
        ));
        assert!(store.current_artifact_set(&owner).unwrap().is_none());
    }

    #[test]
    fn old_orphans_are_removed() {
        let (_dir, store) = store();
        let license = store.config().category_dir(StorageCategory::License);
        let orphan = license.join("ghost_front.png");
        let young = license.join("young_front.png");
        fs::write(&orphan, b"x").unwrap();
        fs::write(&young, b"y").unwrap();
        backdate(&orphan, 48 * HOUR);

        let report = store.cleanup(24 * HOUR).unwrap();
        assert_eq!(report.orphans_removed, 1);
        assert!(!orphan.exists());
        assert!(young.exists());
    }

    #[test]
    fn stats_break_down_by_category() {
        let (_dir, store) = store();
        let owner = EntityId::new("s").unwrap();
        store.put_artifact(&owner, ArtifactKind::FrontImage, b"12345").unwrap();
        store.put_artifact(&owner, ArtifactKind::OriginalPhoto, b"123").unwrap();
        let stats = store.stats().unwrap();
        assert_eq!(stats.file_count, 2);
        assert_eq!(stats.total_bytes, 8);
        assert_eq!(stats.per_category[&StorageCategory::License].total_bytes, 5);
        assert_eq!(stats.per_category[&StorageCategory::Temp].file_count, 0);
    }

    #[test]
    fn status_passthrough() {
        let (_dir, store) = store();
        let owner = EntityId::new("s").unwrap();
        store.set_status(&owner, GenerationStatus::Generating, None).unwrap();
        assert_eq!(
            store.entity_state(&owner).unwrap().unwrap().status,
            GenerationStatus::Generating
        );
    }
}
