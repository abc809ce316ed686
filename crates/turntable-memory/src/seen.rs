//! Seen-model history.
//!
//! Persists every model identifier that has been shown to the participant,
//! in first-shown order, and lets the sequence generator exclude them from
//! later runs.
//!
//! # Storage layout
//!
//! A single table `seen_models` is created (if it does not already exist):
//!
//! | column     | type    | description                              |
//! |------------|---------|------------------------------------------|
//! | seq        | INTEGER | Insertion order (rowid alias)            |
//! | model      | TEXT    | Model identifier, unique                 |
//! | session_id | TEXT    | Session in which it was first shown      |
//! | first_seen | TEXT    | RFC-3339 time of first display (UTC)     |
//!
//! # Example
//!
//! ```rust
//! use turntable_memory::seen::SeenStore;
//!
//! let store = SeenStore::open_in_memory().unwrap();
//! assert!(store.mark_seen("Set_1_orig_matte_0.glb", "1700000000000-1").unwrap());
//! // Append-only: a second mark is a no-op.
//! assert!(!store.mark_seen("Set_1_orig_matte_0.glb", "1700000000000-2").unwrap());
//! assert_eq!(store.models().unwrap(), vec!["Set_1_orig_matte_0.glb".to_string()]);
//! ```

use std::collections::HashSet;
use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

// ─────────────────────────────────────────────────────────────────────────────
// Error type
// ─────────────────────────────────────────────────────────────────────────────

/// Errors that can arise from seen-history operations.
#[derive(Error, Debug)]
pub enum SeenStoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

// ─────────────────────────────────────────────────────────────────────────────
// SeenEntry
// ─────────────────────────────────────────────────────────────────────────────

/// One row of the seen history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeenEntry {
    pub model: String,
    pub session_id: String,
    pub first_seen: DateTime<Utc>,
}

// ─────────────────────────────────────────────────────────────────────────────
// SeenStore
// ─────────────────────────────────────────────────────────────────────────────

/// SQLite-backed, append-only history of shown models.
pub struct SeenStore {
    conn: Connection,
}

impl SeenStore {
    /// Open (or create) a persistent history at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SeenStoreError> {
        let conn = Connection::open(path.as_ref())?;
        let store = Self { conn };
        store.init_schema()?;
        info!(path = %path.as_ref().display(), count = store.len()?, "opened seen-model history");
        Ok(store)
    }

    /// Open a history that lives only as long as this value.
    pub fn open_in_memory() -> Result<Self, SeenStoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), SeenStoreError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS seen_models (
                seq        INTEGER PRIMARY KEY AUTOINCREMENT,
                model      TEXT NOT NULL UNIQUE,
                session_id TEXT NOT NULL,
                first_seen TEXT NOT NULL
            );",
        )?;
        Ok(())
    }

    /// Record that `model` was shown in `session_id`.
    ///
    /// Returns `true` if this is the first time the model is recorded.
    pub fn mark_seen(&self, model: &str, session_id: &str) -> Result<bool, SeenStoreError> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO seen_models (model, session_id, first_seen)
             VALUES (?1, ?2, ?3)",
            params![model, session_id, Utc::now().to_rfc3339()],
        )?;
        debug!(model, session_id, new = inserted == 1, "marked model as seen");
        Ok(inserted == 1)
    }

    /// `true` if `model` has ever been recorded.
    pub fn contains(&self, model: &str) -> Result<bool, SeenStoreError> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT seq FROM seen_models WHERE model = ?1",
                params![model],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Number of distinct models recorded.
    pub fn len(&self) -> Result<usize, SeenStoreError> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM seen_models", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    pub fn is_empty(&self) -> Result<bool, SeenStoreError> {
        Ok(self.len()? == 0)
    }

    /// Recorded model identifiers in first-shown order.
    pub fn models(&self) -> Result<Vec<String>, SeenStoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT model FROM seen_models ORDER BY seq ASC")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut models = Vec::new();
        for row in rows {
            models.push(row?);
        }
        Ok(models)
    }

    /// Recorded model identifiers as a set, for exclusion filters.
    pub fn model_set(&self) -> Result<HashSet<String>, SeenStoreError> {
        Ok(self.models()?.into_iter().collect())
    }

    /// Full history rows in first-shown order.
    pub fn entries(&self) -> Result<Vec<SeenEntry>, SeenStoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT model, session_id, first_seen
             FROM seen_models
             ORDER BY seq ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            let model: String = row.get(0)?;
            let session_id: String = row.get(1)?;
            let ts_str: String = row.get(2)?;
            Ok((model, session_id, ts_str))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (model, session_id, ts_str) = row?;
            let first_seen = ts_str.parse::<DateTime<Utc>>().map_err(|e| {
                rusqlite::Error::InvalidColumnType(2, e.to_string(), rusqlite::types::Type::Text)
            })?;
            entries.push(SeenEntry {
                model,
                session_id,
                first_seen,
            });
        }
        Ok(entries)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_store_is_empty() {
        let store = SeenStore::open_in_memory().unwrap();
        assert!(store.is_empty().unwrap());
        assert!(store.models().unwrap().is_empty());
    }

    #[test]
    fn mark_seen_is_append_only() {
        let store = SeenStore::open_in_memory().unwrap();
        assert!(store.mark_seen("a.glb", "s1").unwrap());
        assert!(store.mark_seen("b.glb", "s1").unwrap());
        assert!(!store.mark_seen("a.glb", "s2").unwrap());
        assert_eq!(store.len().unwrap(), 2);

        // The first session that showed the model is kept.
        let entries = store.entries().unwrap();
        assert_eq!(entries[0].model, "a.glb");
        assert_eq!(entries[0].session_id, "s1");
    }

    #[test]
    fn models_preserve_first_shown_order() {
        let store = SeenStore::open_in_memory().unwrap();
        for m in ["c.glb", "a.glb", "b.glb"] {
            store.mark_seen(m, "s").unwrap();
        }
        assert_eq!(store.models().unwrap(), vec!["c.glb", "a.glb", "b.glb"]);
        assert!(store.model_set().unwrap().contains("a.glb"));
    }

    #[test]
    fn contains_reports_membership() {
        let store = SeenStore::open_in_memory().unwrap();
        store.mark_seen("a.glb", "s").unwrap();
        assert!(store.contains("a.glb").unwrap());
        assert!(!store.contains("z.glb").unwrap());
    }

    #[test]
    fn history_survives_reopen() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("seen.db");
        {
            let store = SeenStore::open(&path).unwrap();
            store.mark_seen("a.glb", "s1").unwrap();
        }
        let reopened = SeenStore::open(&path).unwrap();
        assert!(reopened.contains("a.glb").unwrap());
        assert_eq!(reopened.entries().unwrap()[0].session_id, "s1");
    }
}
