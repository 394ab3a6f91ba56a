// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// cardwerk-store: content-addressed persistence for generated artifacts.
//
// Files live on disk under per-category directories; a SQLite index tracks
// entries, the current artifact set per entity, entity status and the
// processed-photo cache.

pub mod content_store;
pub mod index;
pub mod integrity;

pub use content_store::{ContentStore, EntryName};
pub use index::{EntityState, StoreIndex};
pub use integrity::{hash_bytes, hash_parts, verify_hash};
