//! SQLite-backed vocabulary cross-reference.
//!
//! The vocabulary map is a small, rarely-changing table, persisted in its
//! own SQLite database alongside the deployment. This module provides both
//! file-backed and in-memory modes behind an `r2d2` connection pool.
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE vocabulary_map (
//!     vocabulary_id TEXT PRIMARY KEY,
//!     system_uri    TEXT NOT NULL,
//!     other_uri     TEXT
//! );
//! ```

use std::path::Path;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use tracing::debug;

use crate::error::StorageResult;
use crate::vocabulary::{VocabularyMap, VocabularyMapEntry};

/// Vocabulary cross-reference persisted in SQLite.
#[derive(Clone)]
pub struct SqliteVocabularyMap {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteVocabularyMap {
    /// Opens (creating if needed) a file-backed vocabulary database.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let manager = SqliteConnectionManager::file(path);
        let pool = Pool::builder().build(manager)?;
        Ok(SqliteVocabularyMap { pool })
    }

    /// Creates an in-memory vocabulary database.
    ///
    /// The pool is capped at one connection so every caller sees the same
    /// in-memory database.
    pub fn in_memory() -> StorageResult<Self> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder().max_size(1).build(manager)?;
        Ok(SqliteVocabularyMap { pool })
    }

    /// Creates the vocabulary table if it does not exist.
    pub fn init_schema(&self) -> StorageResult<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS vocabulary_map (
                vocabulary_id TEXT PRIMARY KEY,
                system_uri    TEXT NOT NULL,
                other_uri     TEXT
            )",
            [],
        )?;
        Ok(())
    }

    /// Loads the standard cross-reference rows shipped with the bridge.
    ///
    /// Existing rows win; seeding is idempotent.
    pub fn seed_defaults(&self) -> StorageResult<()> {
        let conn = self.pool.get()?;
        let defaults: &[(&str, &str, Option<&str>)] = &[
            ("LOINC", "http://loinc.org", Some("urn:oid:2.16.840.1.113883.6.1")),
            ("SNOMED", "http://snomed.info/sct", Some("urn:oid:2.16.840.1.113883.6.96")),
            ("UCUM", "http://unitsofmeasure.org", None),
            ("RxNorm", "http://www.nlm.nih.gov/research/umls/rxnorm", None),
            ("CPT4", "http://www.ama-assn.org/go/cpt", None),
            ("NDC", "http://hl7.org/fhir/sid/ndc", None),
        ];
        for (vocabulary_id, system_uri, other_uri) in defaults {
            conn.execute(
                "INSERT OR IGNORE INTO vocabulary_map (vocabulary_id, system_uri, other_uri)
                 VALUES (?1, ?2, ?3)",
                params![vocabulary_id, system_uri, other_uri],
            )?;
        }
        Ok(())
    }
}

impl VocabularyMap for SqliteVocabularyMap {
    fn entries(&self) -> StorageResult<Vec<VocabularyMapEntry>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT vocabulary_id, system_uri, other_uri FROM vocabulary_map ORDER BY vocabulary_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(VocabularyMapEntry {
                vocabulary_id: row.get(0)?,
                system_uri: row.get(1)?,
                other_uri: row.get(2)?,
            })
        })?;
        let mut entries = Vec::new();
        for entry in rows {
            entries.push(entry?);
        }
        Ok(entries)
    }

    fn save(&self, entry: &VocabularyMapEntry) -> StorageResult<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO vocabulary_map (vocabulary_id, system_uri, other_uri)
             VALUES (?1, ?2, ?3)",
            params![entry.vocabulary_id, entry.system_uri, entry.other_uri],
        )?;
        debug!(vocabulary = %entry.vocabulary_id, "vocabulary map entry added");
        Ok(())
    }

    fn update(&self, entry: &VocabularyMapEntry) -> StorageResult<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "UPDATE vocabulary_map SET system_uri = ?1, other_uri = ?2
             WHERE vocabulary_id = ?3",
            params![entry.system_uri, entry.other_uri, entry.vocabulary_id],
        )?;
        Ok(())
    }

    fn delete(&self, vocabulary_id: &str) -> StorageResult<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "DELETE FROM vocabulary_map WHERE vocabulary_id = ?1",
            params![vocabulary_id],
        )?;
        Ok(())
    }

    fn vocabulary_for_system(&self, system_uri: &str) -> StorageResult<Option<String>> {
        let conn = self.pool.get()?;
        let vocabulary = conn
            .query_row(
                "SELECT vocabulary_id FROM vocabulary_map
                 WHERE system_uri = ?1 OR other_uri = ?1",
                params![system_uri],
                |row| row.get(0),
            )
            .optional()?;
        Ok(vocabulary)
    }

    fn system_for_vocabulary(&self, vocabulary_id: &str) -> StorageResult<Option<String>> {
        let conn = self.pool.get()?;
        let system = conn
            .query_row(
                "SELECT system_uri FROM vocabulary_map WHERE vocabulary_id = ?1",
                params![vocabulary_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(system)
    }
}
