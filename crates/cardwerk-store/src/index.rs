// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// SQLite bookkeeping for the content store.
//
// The index records every stored file (but NOT its bytes), which artifact set
// is current for each entity, the per-entity generation status and the
// processed-photo cache. File content lives on disk under the category
// directories and is addressed by its SHA-256 hash.

use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use cardwerk_core::error::{CardwerkError, Result};
use cardwerk_core::types::{
    ArtifactFiles, ArtifactSet, EntityId, GenerationStatus, MrzPayload, StorageCategory, StorageEntry,
};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, ToSql, params};
use tracing::{debug, info, instrument};

const CREATE_TABLES_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS entries (
        path TEXT PRIMARY KEY,
        category TEXT NOT NULL,
        hash TEXT NOT NULL,
        owner TEXT,
        label TEXT NOT NULL,
        size_bytes INTEGER NOT NULL,
        ref_count INTEGER NOT NULL DEFAULT 0,
        superseded INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        last_access TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS entries_by_hash ON entries (category, hash);
    CREATE INDEX IF NOT EXISTS entries_by_owner ON entries (owner);

    CREATE TABLE IF NOT EXISTS artifact_sets (
        entity_id TEXT NOT NULL,
        fingerprint TEXT NOT NULL,
        generator_version TEXT NOT NULL,
        template_version TEXT NOT NULL,
        created_at TEXT NOT NULL,
        files TEXT NOT NULL,
        mrz TEXT NOT NULL,
        current INTEGER NOT NULL DEFAULT 1,
        PRIMARY KEY (entity_id, fingerprint)
    );

    CREATE TABLE IF NOT EXISTS entity_state (
        entity_id TEXT PRIMARY KEY,
        status TEXT NOT NULL,
        last_error TEXT,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS photo_cache (
        cache_key TEXT PRIMARY KEY,
        path TEXT NOT NULL,
        created_at TEXT NOT NULL
    );
"#;

const ENTRY_COLUMNS: &str =
    "path, category, hash, owner, label, size_bytes, ref_count, superseded, created_at, last_access";

const SET_COLUMNS: &str = "entity_id, fingerprint, generator_version, template_version, created_at, files, mrz";

/// Persisted generation status of one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityState {
    pub status: GenerationStatus,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// SQLite index shared by every store operation.
///
/// `rusqlite` is synchronous; async callers go through `spawn_blocking`.
pub struct StoreIndex {
    conn: Mutex<Connection>,
}

impl StoreIndex {
    /// Open (or create) the index at `path` in WAL mode.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| CardwerkError::Database(format!("open: {e}")))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| CardwerkError::Database(format!("WAL pragma: {e}")))?;
        conn.execute_batch(CREATE_TABLES_SQL)
            .map_err(|e| CardwerkError::Database(format!("create tables: {e}")))?;
        info!("store index opened");
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| CardwerkError::Database(format!("open in-memory: {e}")))?;
        conn.execute_batch(CREATE_TABLES_SQL)
            .map_err(|e| CardwerkError::Database(format!("create tables: {e}")))?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| CardwerkError::Database("index connection poisoned".into()))
    }

    // -----------------------------------------------------------------------
    // Entries
    // -----------------------------------------------------------------------

    /// Insert or replace the row for `entry.relative_path`.
    pub fn upsert_entry(&self, entry: &StorageEntry) -> Result<()> {
        self.lock()?
            .execute(
                "INSERT OR REPLACE INTO entries (path, category, hash, owner, label, size_bytes,
                 ref_count, superseded, created_at, last_access)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    entry.relative_path,
                    entry.category.as_str(),
                    entry.hash,
                    entry.owner.as_ref().map(EntityId::as_str),
                    entry.label,
                    entry.size_bytes as i64,
                    entry.ref_count,
                    entry.superseded,
                    entry.created_at.to_rfc3339(),
                    entry.last_access.to_rfc3339(),
                ],
            )
            .map_err(|e| CardwerkError::Database(format!("upsert entry: {e}")))?;
        Ok(())
    }

    pub fn entry_by_path(&self, path: &str) -> Result<Option<StorageEntry>> {
        let sql = format!("SELECT {ENTRY_COLUMNS} FROM entries WHERE path = ?1");
        self.lock()?
            .query_row(&sql, params![path], row_to_entry)
            .optional()
            .map_err(|e| CardwerkError::Database(format!("entry by path: {e}")))
    }

    /// Oldest entry with this content in `category`.
    pub fn entry_by_hash(&self, category: StorageCategory, hash: &str) -> Result<Option<StorageEntry>> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM entries WHERE category = ?1 AND hash = ?2
             ORDER BY created_at ASC LIMIT 1"
        );
        self.lock()?
            .query_row(&sql, params![category.as_str(), hash], row_to_entry)
            .optional()
            .map_err(|e| CardwerkError::Database(format!("entry by hash: {e}")))
    }

    pub fn entries_in(&self, category: StorageCategory) -> Result<Vec<StorageEntry>> {
        let sql = format!("SELECT {ENTRY_COLUMNS} FROM entries WHERE category = ?1 ORDER BY path");
        self.query_entries(&sql, params![category.as_str()])
    }

    /// Superseded license/photo entries nobody holds a reference to.
    pub fn collectable_entries(&self) -> Result<Vec<StorageEntry>> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM entries
             WHERE superseded = 1 AND ref_count = 0 AND category != ?1 ORDER BY path"
        );
        self.query_entries(&sql, params![StorageCategory::Temp.as_str()])
    }

    fn query_entries(&self, sql: &str, args: impl rusqlite::Params) -> Result<Vec<StorageEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| CardwerkError::Database(format!("prepare entries: {e}")))?;
        let rows = stmt
            .query_map(args, row_to_entry)
            .map_err(|e| CardwerkError::Database(format!("query entries: {e}")))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| CardwerkError::Database(format!("row parse: {e}")))?;
        Ok(rows)
    }

    pub fn touch(&self, path: &str, at: DateTime<Utc>) -> Result<()> {
        self.lock()?
            .execute(
                "UPDATE entries SET last_access = ?1 WHERE path = ?2",
                params![at.to_rfc3339(), path],
            )
            .map_err(|e| CardwerkError::Database(format!("touch: {e}")))?;
        Ok(())
    }

    /// Add `delta` to the reference count (never below zero) and return the
    /// new count.
    #[instrument(skip(self))]
    pub fn adjust_refs(&self, path: &str, delta: i64) -> Result<u32> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE entries SET ref_count = MAX(ref_count + ?1, 0) WHERE path = ?2",
                params![delta, path],
            )
            .map_err(|e| CardwerkError::Database(format!("adjust refs: {e}")))?;
        if changed == 0 {
            return Err(CardwerkError::NotFound(path.to_owned()));
        }
        let count: u32 = conn
            .query_row("SELECT ref_count FROM entries WHERE path = ?1", params![path], |row| {
                row.get(0)
            })
            .map_err(|e| CardwerkError::Database(format!("read refs: {e}")))?;
        debug!(count, "reference count adjusted");
        Ok(count)
    }

    /// Delete the row only if it is still superseded and unreferenced.
    /// Returns whether a row was removed.
    pub fn delete_if_collectable(&self, path: &str) -> Result<bool> {
        let conn = self.lock()?;
        let removed = conn
            .execute(
                "DELETE FROM entries WHERE path = ?1 AND superseded = 1 AND ref_count = 0",
                params![path],
            )
            .map_err(|e| CardwerkError::Database(format!("delete collectable: {e}")))?;
        if removed > 0 {
            conn.execute("DELETE FROM photo_cache WHERE path = ?1", params![path])
                .map_err(|e| CardwerkError::Database(format!("forget photo: {e}")))?;
        }
        Ok(removed > 0)
    }

    pub fn delete_entry(&self, path: &str) -> Result<()> {
        self.lock()?
            .execute("DELETE FROM entries WHERE path = ?1", params![path])
            .map_err(|e| CardwerkError::Database(format!("delete entry: {e}")))?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Artifact sets
    // -----------------------------------------------------------------------

    /// Record `set` as the entity's current artifact set and supersede every
    /// other set and file it owned, in one transaction.
    #[instrument(skip_all, fields(entity = %set.entity_id, fingerprint = %set.fingerprint))]
    pub fn publish_set(&self, set: &ArtifactSet) -> Result<usize> {
        let files = serde_json::to_string(&set.files)?;
        let mrz = serde_json::to_string(&set.mrz)?;
        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(|e| CardwerkError::Database(format!("begin publish: {e}")))?;
        tx.execute(
            "INSERT OR REPLACE INTO artifact_sets (entity_id, fingerprint, generator_version,
             template_version, created_at, files, mrz, current)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1)",
            params![
                set.entity_id.as_str(),
                set.fingerprint,
                set.generator_version.to_string(),
                set.template_version,
                set.created_at.to_rfc3339(),
                files,
                mrz,
            ],
        )
        .map_err(|e| CardwerkError::Database(format!("insert artifact set: {e}")))?;
        let superseded = supersede_in(&tx, set)?;
        tx.commit()
            .map_err(|e| CardwerkError::Database(format!("commit publish: {e}")))?;
        info!(superseded, "artifact set published");
        Ok(superseded)
    }

    /// Mark every set and owned file of `set.entity_id` other than `set` as
    /// superseded. Returns the number of files newly superseded.
    pub fn supersede(&self, set: &ArtifactSet) -> Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(|e| CardwerkError::Database(format!("begin supersede: {e}")))?;
        let superseded = supersede_in(&tx, set)?;
        tx.commit()
            .map_err(|e| CardwerkError::Database(format!("commit supersede: {e}")))?;
        Ok(superseded)
    }

    pub fn current_set(&self, entity: &EntityId) -> Result<Option<ArtifactSet>> {
        let sql = format!("SELECT {SET_COLUMNS} FROM artifact_sets WHERE entity_id = ?1 AND current = 1");
        self.lock()?
            .query_row(&sql, params![entity.as_str()], row_to_artifact_set)
            .optional()
            .map_err(|e| CardwerkError::Database(format!("current set: {e}")))
    }

    /// Current set of every entity, ordered by entity id.
    pub fn current_sets(&self) -> Result<Vec<ArtifactSet>> {
        let sql = format!("SELECT {SET_COLUMNS} FROM artifact_sets WHERE current = 1 ORDER BY entity_id");
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| CardwerkError::Database(format!("prepare current sets: {e}")))?;
        let sets = stmt
            .query_map([], row_to_artifact_set)
            .map_err(|e| CardwerkError::Database(format!("query current sets: {e}")))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| CardwerkError::Database(format!("row parse: {e}")))?;
        Ok(sets)
    }

    /// Drop superseded set rows none of whose files are still indexed.
    pub fn prune_sets(&self) -> Result<usize> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT entity_id, fingerprint, files FROM artifact_sets WHERE current = 0")
            .map_err(|e| CardwerkError::Database(format!("prepare prune: {e}")))?;
        let candidates = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
            })
            .map_err(|e| CardwerkError::Database(format!("query prune: {e}")))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| CardwerkError::Database(format!("row parse: {e}")))?;
        drop(stmt);

        let mut pruned = 0;
        for (entity, fingerprint, files_json) in candidates {
            let files: ArtifactFiles = serde_json::from_str(&files_json)?;
            let mut live = false;
            for file in files.iter() {
                let found: Option<i64> = conn
                    .query_row(
                        "SELECT 1 FROM entries WHERE path = ?1",
                        params![file.relative_path],
                        |row| row.get(0),
                    )
                    .optional()
                    .map_err(|e| CardwerkError::Database(format!("look up entry: {e}")))?;
                if found.is_some() {
                    live = true;
                    break;
                }
            }
            if !live {
                pruned += conn
                    .execute(
                        "DELETE FROM artifact_sets WHERE entity_id = ?1 AND fingerprint = ?2",
                        params![entity, fingerprint],
                    )
                    .map_err(|e| CardwerkError::Database(format!("prune set: {e}")))?;
            }
        }
        Ok(pruned)
    }

    // -----------------------------------------------------------------------
    // Entity status
    // -----------------------------------------------------------------------

    pub fn set_status(&self, entity: &EntityId, status: GenerationStatus, error: Option<&str>) -> Result<()> {
        self.lock()?
            .execute(
                "INSERT OR REPLACE INTO entity_state (entity_id, status, last_error, updated_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![entity.as_str(), status.as_str(), error, Utc::now().to_rfc3339()],
            )
            .map_err(|e| CardwerkError::Database(format!("set status: {e}")))?;
        debug!(entity = %entity, status = %status, "entity status updated");
        Ok(())
    }

    pub fn entity_state(&self, entity: &EntityId) -> Result<Option<EntityState>> {
        self.lock()?
            .query_row(
                "SELECT status, last_error, updated_at FROM entity_state WHERE entity_id = ?1",
                params![entity.as_str()],
                |row| {
                    Ok(EntityState {
                        status: parse_text(row, 0)?,
                        last_error: row.get(1)?,
                        updated_at: parse_time(row, 2)?,
                    })
                },
            )
            .optional()
            .map_err(|e| CardwerkError::Database(format!("entity state: {e}")))
    }

    // -----------------------------------------------------------------------
    // Processed-photo cache
    // -----------------------------------------------------------------------

    pub fn cached_photo(&self, cache_key: &str) -> Result<Option<String>> {
        self.lock()?
            .query_row(
                "SELECT path FROM photo_cache WHERE cache_key = ?1",
                params![cache_key],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| CardwerkError::Database(format!("photo cache lookup: {e}")))
    }

    pub fn remember_photo(&self, cache_key: &str, path: &str) -> Result<()> {
        self.lock()?
            .execute(
                "INSERT OR REPLACE INTO photo_cache (cache_key, path, created_at) VALUES (?1, ?2, ?3)",
                params![cache_key, path, Utc::now().to_rfc3339()],
            )
            .map_err(|e| CardwerkError::Database(format!("photo cache insert: {e}")))?;
        Ok(())
    }
}

fn supersede_in(tx: &rusqlite::Transaction<'_>, set: &ArtifactSet) -> Result<usize> {
    let entity = set.entity_id.as_str();
    tx.execute(
        "UPDATE artifact_sets SET current = 0 WHERE entity_id = ?1 AND fingerprint != ?2",
        params![entity, set.fingerprint],
    )
    .map_err(|e| CardwerkError::Database(format!("supersede sets: {e}")))?;

    let keep: Vec<&str> = set.files.iter().map(|f| f.relative_path.as_str()).collect();
    for path in &keep {
        tx.execute("UPDATE entries SET superseded = 0 WHERE path = ?1", params![path])
            .map_err(|e| CardwerkError::Database(format!("keep current entry: {e}")))?;
    }

    let placeholders = (0..keep.len())
        .map(|i| format!("?{}", i + 3))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "UPDATE entries SET superseded = 1
         WHERE owner = ?1 AND superseded = 0 AND category != ?2 AND path NOT IN ({placeholders})"
    );
    let temp = StorageCategory::Temp.as_str();
    let mut args: Vec<&dyn ToSql> = vec![&entity, &temp];
    args.extend(keep.iter().map(|p| p as &dyn ToSql));
    tx.execute(&sql, args.as_slice())
        .map_err(|e| CardwerkError::Database(format!("supersede entries: {e}")))
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

/// Parse a closed text value, rejecting anything but the canonical form.
fn parse_text<T>(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = CardwerkError>,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e)))
}

fn parse_time(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e)))
}

fn parse_json<T: serde::de::DeserializeOwned>(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e)))
}

/// Column order matches `ENTRY_COLUMNS`.
fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<StorageEntry> {
    let owner: Option<String> = row.get(3)?;
    let owner = owner
        .map(EntityId::new)
        .transpose()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e)))?;
    Ok(StorageEntry {
        relative_path: row.get(0)?,
        category: parse_text(row, 1)?,
        hash: row.get(2)?,
        owner,
        label: row.get(4)?,
        size_bytes: row.get::<_, i64>(5)?.max(0) as u64,
        ref_count: row.get(6)?,
        superseded: row.get(7)?,
        created_at: parse_time(row, 8)?,
        last_access: parse_time(row, 9)?,
    })
}

/// Column order matches `SET_COLUMNS`.
fn row_to_artifact_set(row: &rusqlite::Row<'_>) -> rusqlite::Result<ArtifactSet> {
    let entity: String = row.get(0)?;
    let entity_id = EntityId::new(entity)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))?;
    let version: String = row.get(2)?;
    let generator_version = semver::Version::parse(&version)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e)))?;
    let files: ArtifactFiles = parse_json(row, 5)?;
    let mrz: MrzPayload = parse_json(row, 6)?;
    Ok(ArtifactSet {
        entity_id,
        fingerprint: row.get(1)?,
        generator_version,
        template_version: row.get(3)?,
        created_at: parse_time(row, 4)?,
        files,
        mrz,
        cache_hit: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardwerk_core::types::{ArtifactKind, FileRef};

    fn entry(path: &str, owner: &str, category: StorageCategory) -> StorageEntry {
        let now = Utc::now();
        StorageEntry {
            category,
            hash: format!("{:0>64}", path.len()),
            relative_path: path.into(),
            owner: Some(EntityId::new(owner).unwrap()),
            label: "front".into(),
            size_bytes: 10,
            ref_count: 0,
            superseded: false,
            created_at: now,
            last_access: now,
        }
    }

    fn file(kind: ArtifactKind, path: &str) -> FileRef {
        FileRef {
            kind,
            category: kind.category(),
            relative_path: path.into(),
            hash: "00".into(),
            size_bytes: 10,
        }
    }

    fn set(entity: &str, fingerprint: &str, prefix: &str) -> ArtifactSet {
        let p = |name: &str| format!("license-outputs/{prefix}_{name}");
        ArtifactSet {
            entity_id: EntityId::new(entity).unwrap(),
            fingerprint: fingerprint.into(),
            generator_version: semver::Version::new(2, 0, 0),
            template_version: "t1".into(),
            created_at: Utc::now(),
            files: ArtifactFiles {
                front_image: file(ArtifactKind::FrontImage, &p("front.png")),
                back_image: file(ArtifactKind::BackImage, &p("back.png")),
                front_document: file(ArtifactKind::FrontDocument, &p("front.pdf")),
                back_document: file(ArtifactKind::BackDocument, &p("back.pdf")),
                combined_document: file(ArtifactKind::CombinedDocument, &p("combined.pdf")),
                original_photo: file(ArtifactKind::OriginalPhoto, "photo-assets/shared_original.jpg"),
                processed_photo: file(ArtifactKind::ProcessedPhoto, "photo-assets/shared_processed.jpg"),
            },
            mrz: MrzPayload {
                lines: ["A".into(), "B".into(), "C".into()],
            },
            cache_hit: false,
        }
    }

    fn index_with(set: &ArtifactSet) -> StoreIndex {
        let index = StoreIndex::open_in_memory().unwrap();
        for f in set.files.iter() {
            index
                .upsert_entry(&entry(&f.relative_path, set.entity_id.as_str(), f.category))
                .unwrap();
        }
        index
    }

    #[test]
    fn entry_round_trip() {
        let index = StoreIndex::open_in_memory().unwrap();
        let e = entry("license-outputs/a.png", "e1", StorageCategory::License);
        index.upsert_entry(&e).unwrap();
        let back = index.entry_by_path("license-outputs/a.png").unwrap().unwrap();
        assert_eq!(back.category, StorageCategory::License);
        assert_eq!(back.owner, e.owner);
        assert_eq!(back.hash, e.hash);
        assert!(index.entry_by_path("missing").unwrap().is_none());
    }

    #[test]
    fn non_canonical_category_fails_on_read() {
        let index = StoreIndex::open_in_memory().unwrap();
        index
            .upsert_entry(&entry("license-outputs/a.png", "e1", StorageCategory::License))
            .unwrap();
        index
            .lock()
            .unwrap()
            .execute("UPDATE entries SET category = 'License'", [])
            .unwrap();
        assert!(matches!(
            index.entry_by_path("license-outputs/a.png"),
            Err(CardwerkError::Database(_))
        ));
    }

    #[test]
    fn publish_supersedes_previous_set_but_keeps_shared_files() {
        let first = set("e1", "fp1", "one");
        let index = index_with(&first);
        assert_eq!(index.publish_set(&first).unwrap(), 0);

        let second = set("e1", "fp2", "two");
        for f in second.files.iter() {
            index.upsert_entry(&entry(&f.relative_path, "e1", f.category)).unwrap();
        }
        // The five license files of the first set are superseded; the shared
        // photo entries stay current.
        assert_eq!(index.publish_set(&second).unwrap(), 5);

        let current = index.current_set(&second.entity_id).unwrap().unwrap();
        assert_eq!(current.fingerprint, "fp2");
        let collectable: Vec<_> = index
            .collectable_entries()
            .unwrap()
            .into_iter()
            .map(|e| e.relative_path)
            .collect();
        assert_eq!(collectable.len(), 5);
        assert!(collectable.iter().all(|p| p.contains("one_")));
    }

    #[test]
    fn referenced_entries_are_not_collectable() {
        let first = set("e1", "fp1", "one");
        let index = index_with(&first);
        index.publish_set(&first).unwrap();
        let second = set("e1", "fp2", "two");
        index.publish_set(&second).unwrap();

        let pinned = &first.files.front_image.relative_path;
        assert_eq!(index.adjust_refs(pinned, 1).unwrap(), 1);
        assert!(!index.delete_if_collectable(pinned).unwrap());
        assert_eq!(index.adjust_refs(pinned, -1).unwrap(), 0);
        assert_eq!(index.adjust_refs(pinned, -1).unwrap(), 0);
        assert!(index.delete_if_collectable(pinned).unwrap());
        assert!(matches!(index.adjust_refs("nope", 1), Err(CardwerkError::NotFound(_))));
    }

    #[test]
    fn prune_drops_sets_without_files() {
        let first = set("e1", "fp1", "one");
        let index = index_with(&first);
        index.publish_set(&first).unwrap();
        index.publish_set(&set("e1", "fp2", "two")).unwrap();

        // Shared photo rows keep the old set alive.
        assert_eq!(index.prune_sets().unwrap(), 0);
        for f in first.files.iter() {
            index.delete_entry(&f.relative_path).unwrap();
        }
        assert_eq!(index.prune_sets().unwrap(), 1);
        assert_eq!(index.current_sets().unwrap().len(), 1);
    }

    #[test]
    fn status_and_photo_cache() {
        let index = StoreIndex::open_in_memory().unwrap();
        let id = EntityId::new("e9").unwrap();
        assert!(index.entity_state(&id).unwrap().is_none());
        index.set_status(&id, GenerationStatus::Failed, Some("boom")).unwrap();
        let state = index.entity_state(&id).unwrap().unwrap();
        assert_eq!(state.status, GenerationStatus::Failed);
        assert_eq!(state.last_error.as_deref(), Some("boom"));

        assert!(index.cached_photo("k").unwrap().is_none());
        index.remember_photo("k", "photo-assets/p.jpg").unwrap();
        assert_eq!(index.cached_photo("k").unwrap().as_deref(), Some("photo-assets/p.jpg"));
    }
}
