//! Store contracts consumed by the mapping engine.
//!
//! These traits are the whole surface the engine sees of its collaborators.
//! They are synchronous: every call blocks on the caller's thread and the
//! engine holds no state across calls, so any concurrency is supplied by
//! the surrounding service. Implementations must be `Send + Sync`.

use chrono::NaiveDate;
use meridian_fhir::ResourceKind;

use crate::concept::Concept;
use crate::error::StorageResult;
use crate::predicate::{Pagination, Predicate, Sort};
use crate::rows::{FactRow, Partition};

/// Row-level access to the two fact partitions.
pub trait FactStore: Send + Sync {
    /// Looks up a row by its partition-local native key.
    fn find_by_id(&self, partition: Partition, native_id: i64) -> StorageResult<Option<FactRow>>;

    /// Locates the sibling of a paired fact by its join key.
    ///
    /// Sibling rows share person, date, and whole-second time; `concept_id`
    /// selects which half of the pair to return.
    fn find_sibling(
        &self,
        partition: Partition,
        concept_id: i64,
        person_id: i64,
        date: NaiveDate,
        time: Option<&str>,
    ) -> StorageResult<Option<FactRow>>;

    /// Runs a filtered search over one partition.
    ///
    /// Returns a finite, ordered page of rows. Ordering follows `sort`
    /// when given, else the backend default. The sequence is restartable
    /// only by reissuing the search.
    fn search(
        &self,
        partition: Partition,
        predicates: &[Predicate],
        pagination: &Pagination,
        sort: Option<&Sort>,
    ) -> StorageResult<Vec<FactRow>>;

    /// Counts rows matching the predicates.
    fn count(&self, partition: Partition, predicates: &[Predicate]) -> StorageResult<u64>;

    /// Inserts or updates a row, returning its native key.
    ///
    /// A row without an id is inserted and assigned a fresh key; a row with
    /// an id replaces the stored row under that key.
    fn upsert(&self, partition: Partition, row: FactRow) -> StorageResult<i64>;

    /// Removes a row; returns the number of rows removed (0 or 1).
    fn delete(&self, partition: Partition, native_id: i64) -> StorageResult<u64>;
}

/// Vocabulary concept and related-entity lookups.
pub trait ConceptStore: Send + Sync {
    /// Point lookup by concept id.
    fn concept(&self, id: i64) -> StorageResult<Option<Concept>>;

    /// Exact lookup by (vocabulary, code).
    fn concept_by_code(&self, vocabulary_id: &str, code: &str) -> StorageResult<Option<Concept>>;

    /// All concepts carrying the given code, across vocabularies.
    ///
    /// Used for domain routing before the owning vocabulary is known.
    fn concepts_by_code(&self, code: &str) -> StorageResult<Vec<Concept>>;

    /// Display name of a person, when the store knows it.
    fn person_name(&self, person_id: i64) -> StorageResult<Option<String>>;

    /// Display name of a provider, when the store knows it.
    fn provider_name(&self, provider_id: i64) -> StorageResult<Option<String>>;
}

/// Persistent allocation of logical-to-internal identifier pairs.
///
/// For [`ResourceKind::Observation`] the internal id is signed: the
/// magnitude is the native key and the sign encodes the partition
/// (positive = measurement, negative = observation). Other kinds use the
/// plain native key. Pairs are immutable once allocated.
pub trait IdentityStore: Send + Sync {
    /// The internal id previously assigned to a logical id.
    fn internal_for_logical(
        &self,
        kind: ResourceKind,
        logical_id: i64,
    ) -> StorageResult<Option<i64>>;

    /// The logical id previously assigned to an internal id.
    fn logical_for_internal(
        &self,
        kind: ResourceKind,
        internal_id: i64,
    ) -> StorageResult<Option<i64>>;

    /// Returns the logical id for an internal id, allocating one on first use.
    fn allocate(&self, kind: ResourceKind, internal_id: i64) -> StorageResult<i64>;
}
