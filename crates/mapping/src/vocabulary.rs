//! Coding-system resolution against the vocabulary cross-reference.

use std::sync::Arc;

use meridian_cdm::{StorageResult, VocabularyMap};

/// Bidirectional lookup between coding-system URIs and internal
/// vocabulary identifiers.
///
/// A miss is a plain `None` - callers treat it as "unmapped" and fall back
/// to source-text storage. The underlying table is a small, rarely-changing
/// point-query store; callers resolve once per mapping operation and reuse
/// the value rather than re-querying.
#[derive(Clone)]
pub struct VocabularyResolver {
    map: Arc<dyn VocabularyMap>,
}

impl VocabularyResolver {
    pub fn new(map: Arc<dyn VocabularyMap>) -> Self {
        VocabularyResolver { map }
    }

    /// The internal vocabulary a coding-system URI belongs to.
    ///
    /// Matches the primary or alternate URI column exactly.
    pub fn vocabulary_for_system(&self, system_uri: &str) -> StorageResult<Option<String>> {
        if system_uri.is_empty() {
            return Ok(None);
        }
        self.map.vocabulary_for_system(system_uri)
    }

    /// The primary coding-system URI of an internal vocabulary; first
    /// match wins when duplicates exist.
    pub fn system_for_vocabulary(&self, vocabulary_id: &str) -> StorageResult<Option<String>> {
        self.map.system_for_vocabulary(vocabulary_id)
    }
}
