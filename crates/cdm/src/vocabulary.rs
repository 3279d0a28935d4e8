//! The static vocabulary cross-reference table.
//!
//! One row per internal vocabulary: the coding-system URI callers use for
//! it, plus an optional alternate URI (a legacy or OID form). A given URI
//! resolves to exactly one vocabulary; one vocabulary may accept either of
//! its two URIs.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::StorageResult;

/// One cross-reference row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VocabularyMapEntry {
    /// Internal vocabulary identifier, e.g. `LOINC`.
    pub vocabulary_id: String,
    /// Primary coding-system URI, e.g. `http://loinc.org`.
    pub system_uri: String,
    /// Alternate URI accepted for the same vocabulary.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub other_uri: Option<String>,
}

impl VocabularyMapEntry {
    pub fn new(vocabulary_id: impl Into<String>, system_uri: impl Into<String>) -> Self {
        VocabularyMapEntry {
            vocabulary_id: vocabulary_id.into(),
            system_uri: system_uri.into(),
            other_uri: None,
        }
    }

    pub fn with_other_uri(mut self, other_uri: impl Into<String>) -> Self {
        self.other_uri = Some(other_uri.into());
        self
    }

    /// True when `uri` matches either URI column.
    pub fn matches_uri(&self, uri: &str) -> bool {
        self.system_uri == uri || self.other_uri.as_deref() == Some(uri)
    }
}

/// CRUD plus bidirectional resolution over the cross-reference table.
///
/// Misses are values, not errors: both resolution methods return `None`
/// for an unknown key and callers treat that as "unmapped".
pub trait VocabularyMap: Send + Sync {
    /// All entries, in storage order.
    fn entries(&self) -> StorageResult<Vec<VocabularyMapEntry>>;

    /// Inserts a new entry.
    fn save(&self, entry: &VocabularyMapEntry) -> StorageResult<()>;

    /// Replaces the URIs of an existing vocabulary's entry.
    fn update(&self, entry: &VocabularyMapEntry) -> StorageResult<()>;

    /// Removes the entry for a vocabulary.
    fn delete(&self, vocabulary_id: &str) -> StorageResult<()>;

    /// The vocabulary a coding-system URI belongs to, by either URI column.
    fn vocabulary_for_system(&self, system_uri: &str) -> StorageResult<Option<String>>;

    /// The primary coding-system URI of a vocabulary; first match wins.
    fn system_for_vocabulary(&self, vocabulary_id: &str) -> StorageResult<Option<String>>;
}

/// In-process implementation backed by a `Vec` under a read-write lock.
#[derive(Debug, Default)]
pub struct MemoryVocabularyMap {
    entries: RwLock<Vec<VocabularyMapEntry>>,
}

impl MemoryVocabularyMap {
    pub fn new() -> Self {
        MemoryVocabularyMap::default()
    }

    /// A map pre-loaded with the given entries.
    pub fn with_entries(entries: Vec<VocabularyMapEntry>) -> Self {
        MemoryVocabularyMap {
            entries: RwLock::new(entries),
        }
    }
}

impl VocabularyMap for MemoryVocabularyMap {
    fn entries(&self) -> StorageResult<Vec<VocabularyMapEntry>> {
        Ok(self.entries.read().clone())
    }

    fn save(&self, entry: &VocabularyMapEntry) -> StorageResult<()> {
        self.entries.write().push(entry.clone());
        Ok(())
    }

    fn update(&self, entry: &VocabularyMapEntry) -> StorageResult<()> {
        let mut entries = self.entries.write();
        if let Some(existing) = entries
            .iter_mut()
            .find(|e| e.vocabulary_id == entry.vocabulary_id)
        {
            existing.system_uri = entry.system_uri.clone();
            existing.other_uri = entry.other_uri.clone();
        }
        Ok(())
    }

    fn delete(&self, vocabulary_id: &str) -> StorageResult<()> {
        self.entries
            .write()
            .retain(|e| e.vocabulary_id != vocabulary_id);
        Ok(())
    }

    fn vocabulary_for_system(&self, system_uri: &str) -> StorageResult<Option<String>> {
        Ok(self
            .entries
            .read()
            .iter()
            .find(|e| e.matches_uri(system_uri))
            .map(|e| e.vocabulary_id.clone()))
    }

    fn system_for_vocabulary(&self, vocabulary_id: &str) -> StorageResult<Option<String>> {
        Ok(self
            .entries
            .read()
            .iter()
            .find(|e| e.vocabulary_id == vocabulary_id)
            .map(|e| e.system_uri.clone()))
    }
}
