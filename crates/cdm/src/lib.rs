//! Storage-side model and collaborator contracts for the Meridian bridge.
//!
//! Clinical facts are persisted in two physical partitions: quantitative
//! rows in the measurement partition and categorical or narrative rows in
//! the observation partition. Both share one flat row shape keyed by
//! standardized vocabulary concepts. This crate defines that shape, the
//! vocabulary model, the backend-agnostic filter tree used by searches,
//! and the narrow store traits the mapping engine calls through:
//!
//! - [`FactStore`] - row lookup, sibling join, filtered search, upsert
//! - [`ConceptStore`] - vocabulary concept and related-entity lookups
//! - [`IdentityStore`] - logical-to-signed-internal identifier allocation
//! - [`VocabularyMap`] - the static coding-system cross-reference table
//!
//! Two embedded backends ship with the crate: [`MemoryBackend`], an
//! in-process implementation of the fact/concept/identity contracts, and
//! [`SqliteVocabularyMap`], the SQLite-persisted vocabulary cross-reference.

pub mod concept;
pub mod error;
pub mod memory;
pub mod predicate;
pub mod rows;
pub mod sqlite;
pub mod store;
pub mod vocabulary;

pub use concept::{Concept, Domain};
pub use error::{StorageError, StorageResult};
pub use memory::MemoryBackend;
pub use predicate::{CompareOp, Constraint, Field, FilterValue, Junction, Pagination, Predicate, Sort, SortOrder};
pub use rows::{join_date_time, split_instant, FactRow, Partition, TIME_FORMAT};
pub use sqlite::SqliteVocabularyMap;
pub use store::{ConceptStore, FactStore, IdentityStore};
pub use vocabulary::{MemoryVocabularyMap, VocabularyMap, VocabularyMapEntry};
