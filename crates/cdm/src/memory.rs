//! Embedded in-process backend.
//!
//! Implements the fact, concept, and identity store contracts against plain
//! maps under a read-write lock, evaluating the predicate tree directly
//! against rows. Useful for tests and for embeddings that do not bring
//! their own database; the contract semantics (sibling join key, predicate
//! junctions, pagination windowing) are exactly those real backends must
//! reproduce.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use parking_lot::RwLock;
use tracing::debug;

use meridian_fhir::ResourceKind;

use crate::concept::Concept;
use crate::error::StorageResult;
use crate::predicate::{CompareOp, Constraint, Field, FilterValue, Junction, Pagination, Predicate, Sort, SortOrder};
use crate::rows::{FactRow, Partition};
use crate::store::{ConceptStore, FactStore, IdentityStore};

#[derive(Debug, Default)]
struct PartitionState {
    rows: BTreeMap<i64, FactRow>,
    next_id: i64,
}

impl PartitionState {
    fn upsert(&mut self, mut row: FactRow) -> i64 {
        let id = match row.id {
            Some(id) => id,
            None => {
                self.next_id += 1;
                self.next_id
            }
        };
        row.id = Some(id);
        self.next_id = self.next_id.max(id);
        self.rows.insert(id, row);
        id
    }
}

#[derive(Debug, Default)]
struct IdentityState {
    logical_by_internal: HashMap<(ResourceKind, i64), i64>,
    internal_by_logical: HashMap<(ResourceKind, i64), i64>,
    next_logical: HashMap<ResourceKind, i64>,
}

#[derive(Debug, Default)]
struct Inner {
    measurement: PartitionState,
    observation: PartitionState,
    concepts: HashMap<i64, Concept>,
    persons: HashMap<i64, String>,
    providers: HashMap<i64, String>,
    identity: IdentityState,
}

impl Inner {
    fn partition(&self, partition: Partition) -> &PartitionState {
        match partition {
            Partition::Measurement => &self.measurement,
            Partition::Observation => &self.observation,
        }
    }

    fn partition_mut(&mut self, partition: Partition) -> &mut PartitionState {
        match partition {
            Partition::Measurement => &mut self.measurement,
            Partition::Observation => &mut self.observation,
        }
    }
}

/// In-process fact, concept, and identity store.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    inner: RwLock<Inner>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        MemoryBackend::default()
    }

    /// Loads a vocabulary concept.
    pub fn insert_concept(&self, concept: Concept) {
        self.inner.write().concepts.insert(concept.id, concept);
    }

    /// Registers a person with a display name.
    pub fn insert_person(&self, person_id: i64, name: impl Into<String>) {
        self.inner.write().persons.insert(person_id, name.into());
    }

    /// Registers a provider with a display name.
    pub fn insert_provider(&self, provider_id: i64, name: impl Into<String>) {
        self.inner
            .write()
            .providers
            .insert(provider_id, name.into());
    }

    /// Pins a logical/internal identity pair, e.g. for fixture subjects.
    pub fn register_identity(&self, kind: ResourceKind, logical_id: i64, internal_id: i64) {
        let mut inner = self.inner.write();
        inner
            .identity
            .logical_by_internal
            .insert((kind, internal_id), logical_id);
        inner
            .identity
            .internal_by_logical
            .insert((kind, logical_id), internal_id);
        let next = inner.identity.next_logical.entry(kind).or_insert(0);
        *next = (*next).max(logical_id);
    }
}

impl FactStore for MemoryBackend {
    fn find_by_id(&self, partition: Partition, native_id: i64) -> StorageResult<Option<FactRow>> {
        Ok(self
            .inner
            .read()
            .partition(partition)
            .rows
            .get(&native_id)
            .cloned())
    }

    fn find_sibling(
        &self,
        partition: Partition,
        concept_id: i64,
        person_id: i64,
        date: NaiveDate,
        time: Option<&str>,
    ) -> StorageResult<Option<FactRow>> {
        Ok(self
            .inner
            .read()
            .partition(partition)
            .rows
            .values()
            .find(|row| {
                row.concept_id == concept_id
                    && row.person_id == person_id
                    && row.date == Some(date)
                    && row.time.as_deref() == time
            })
            .cloned())
    }

    fn search(
        &self,
        partition: Partition,
        predicates: &[Predicate],
        pagination: &Pagination,
        sort: Option<&Sort>,
    ) -> StorageResult<Vec<FactRow>> {
        let inner = self.inner.read();
        let mut rows: Vec<FactRow> = inner
            .partition(partition)
            .rows
            .values()
            .filter(|row| matches_predicates(&inner, row, predicates))
            .cloned()
            .collect();

        if let Some(sort) = sort {
            rows.sort_by(|a, b| {
                let ordering = compare_rows(&inner, a, b, sort.field);
                match sort.order {
                    SortOrder::Ascending => ordering,
                    SortOrder::Descending => ordering.reverse(),
                }
            });
        }

        debug!(
            partition = %partition,
            matched = rows.len(),
            "memory backend search"
        );

        let rows = rows.into_iter().skip(pagination.offset);
        Ok(match pagination.limit {
            Some(limit) => rows.take(limit).collect(),
            None => rows.collect(),
        })
    }

    fn count(&self, partition: Partition, predicates: &[Predicate]) -> StorageResult<u64> {
        let inner = self.inner.read();
        Ok(inner
            .partition(partition)
            .rows
            .values()
            .filter(|row| matches_predicates(&inner, row, predicates))
            .count() as u64)
    }

    fn upsert(&self, partition: Partition, row: FactRow) -> StorageResult<i64> {
        Ok(self.inner.write().partition_mut(partition).upsert(row))
    }

    fn delete(&self, partition: Partition, native_id: i64) -> StorageResult<u64> {
        let removed = self
            .inner
            .write()
            .partition_mut(partition)
            .rows
            .remove(&native_id);
        Ok(removed.is_some() as u64)
    }
}

impl ConceptStore for MemoryBackend {
    fn concept(&self, id: i64) -> StorageResult<Option<Concept>> {
        Ok(self.inner.read().concepts.get(&id).cloned())
    }

    fn concept_by_code(&self, vocabulary_id: &str, code: &str) -> StorageResult<Option<Concept>> {
        Ok(self
            .inner
            .read()
            .concepts
            .values()
            .find(|c| c.vocabulary_id == vocabulary_id && c.code == code)
            .cloned())
    }

    fn concepts_by_code(&self, code: &str) -> StorageResult<Vec<Concept>> {
        let mut concepts: Vec<Concept> = self
            .inner
            .read()
            .concepts
            .values()
            .filter(|c| c.code == code)
            .cloned()
            .collect();
        concepts.sort_by_key(|c| c.id);
        Ok(concepts)
    }

    fn person_name(&self, person_id: i64) -> StorageResult<Option<String>> {
        Ok(self.inner.read().persons.get(&person_id).cloned())
    }

    fn provider_name(&self, provider_id: i64) -> StorageResult<Option<String>> {
        Ok(self.inner.read().providers.get(&provider_id).cloned())
    }
}

impl IdentityStore for MemoryBackend {
    fn internal_for_logical(
        &self,
        kind: ResourceKind,
        logical_id: i64,
    ) -> StorageResult<Option<i64>> {
        Ok(self
            .inner
            .read()
            .identity
            .internal_by_logical
            .get(&(kind, logical_id))
            .copied())
    }

    fn logical_for_internal(
        &self,
        kind: ResourceKind,
        internal_id: i64,
    ) -> StorageResult<Option<i64>> {
        Ok(self
            .inner
            .read()
            .identity
            .logical_by_internal
            .get(&(kind, internal_id))
            .copied())
    }

    fn allocate(&self, kind: ResourceKind, internal_id: i64) -> StorageResult<i64> {
        let mut inner = self.inner.write();
        if let Some(logical) = inner.identity.logical_by_internal.get(&(kind, internal_id)) {
            return Ok(*logical);
        }
        let next = inner.identity.next_logical.entry(kind).or_insert(0);
        *next += 1;
        let logical = *next;
        inner
            .identity
            .logical_by_internal
            .insert((kind, internal_id), logical);
        inner
            .identity
            .internal_by_logical
            .insert((kind, logical), internal_id);
        Ok(logical)
    }
}

fn matches_predicates(inner: &Inner, row: &FactRow, predicates: &[Predicate]) -> bool {
    let mut result = true;
    for (index, predicate) in predicates.iter().enumerate() {
        let matched = matches_clause(inner, row, predicate);
        if index == 0 {
            result = matched;
        } else {
            result = match predicate.outer {
                Junction::And => result && matched,
                Junction::Or => result || matched,
            };
        }
    }
    result
}

fn matches_clause(inner: &Inner, row: &FactRow, predicate: &Predicate) -> bool {
    let mut constraints = predicate.constraints.iter();
    let Some(first) = constraints.next() else {
        return true;
    };
    let mut result = matches_constraint(inner, row, first);
    for constraint in constraints {
        let matched = matches_constraint(inner, row, constraint);
        result = match predicate.within {
            Junction::And => result && matched,
            Junction::Or => result || matched,
        };
    }
    result
}

fn matches_constraint(inner: &Inner, row: &FactRow, constraint: &Constraint) -> bool {
    match (&field_value(inner, row, constraint.field), &constraint.value) {
        (Some(FilterValue::Integer(actual)), FilterValue::Integer(expected)) => {
            compare_ord(actual, expected, constraint.op)
        }
        (Some(FilterValue::Date(actual)), FilterValue::Date(expected)) => {
            compare_ord(actual, expected, constraint.op)
        }
        (Some(FilterValue::Text(actual)), FilterValue::Text(expected)) => match constraint.op {
            CompareOp::Contains => actual.to_lowercase().contains(&expected.to_lowercase()),
            op => compare_ord(actual, expected, op),
        },
        (Some(FilterValue::Number(actual)), FilterValue::Number(expected)) => {
            match actual.partial_cmp(expected) {
                Some(ordering) => ordering_matches(ordering, constraint.op),
                None => false,
            }
        }
        _ => false,
    }
}

fn compare_ord<T: Ord>(actual: &T, expected: &T, op: CompareOp) -> bool {
    ordering_matches(actual.cmp(expected), op)
}

fn ordering_matches(ordering: std::cmp::Ordering, op: CompareOp) -> bool {
    use std::cmp::Ordering::*;
    match op {
        CompareOp::Eq => ordering == Equal,
        CompareOp::Ne => ordering != Equal,
        CompareOp::Lt => ordering == Less,
        CompareOp::Le => ordering != Greater,
        CompareOp::Gt => ordering == Greater,
        CompareOp::Ge => ordering != Less,
        CompareOp::Contains => false,
    }
}

fn field_value(inner: &Inner, row: &FactRow, field: Field) -> Option<FilterValue> {
    match field {
        Field::NativeId => row.id.map(FilterValue::Integer),
        Field::ConceptId => Some(FilterValue::Integer(row.concept_id)),
        Field::ConceptVocabulary => inner
            .concepts
            .get(&row.concept_id)
            .map(|c| FilterValue::Text(c.vocabulary_id.clone())),
        Field::ConceptCode => inner
            .concepts
            .get(&row.concept_id)
            .map(|c| FilterValue::Text(c.code.clone())),
        Field::Date => row.date.map(FilterValue::Date),
        Field::Time => row.time.clone().map(FilterValue::Text),
        Field::PersonId => Some(FilterValue::Integer(row.person_id)),
        Field::PersonName => inner
            .persons
            .get(&row.person_id)
            .map(|name| FilterValue::Text(name.clone())),
        Field::SourceValue => row.source_value.clone().map(FilterValue::Text),
    }
}

fn compare_rows(inner: &Inner, a: &FactRow, b: &FactRow, field: Field) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (field_value(inner, a, field), field_value(inner, b, field)) {
        (Some(FilterValue::Integer(x)), Some(FilterValue::Integer(y))) => x.cmp(&y),
        (Some(FilterValue::Date(x)), Some(FilterValue::Date(y))) => x.cmp(&y),
        (Some(FilterValue::Text(x)), Some(FilterValue::Text(y))) => x.cmp(&y),
        (Some(FilterValue::Number(x)), Some(FilterValue::Number(y))) => {
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concept::Domain;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn seed(backend: &MemoryBackend) {
        backend.insert_concept(Concept {
            id: 3004249,
            vocabulary_id: "LOINC".into(),
            code: "8480-6".into(),
            name: "BP systolic".into(),
            domain: Domain::Measurement,
        });
        backend.insert_person(1, "Ada Lovelace");

        for (value, day) in [(120.0, 1), (118.0, 2), (121.0, 3)] {
            let mut row = FactRow::new(3004249, 1);
            row.date = Some(date(2023, 1, day));
            row.time = Some("08:30:00".to_string());
            row.value_as_number = Some(value);
            backend.upsert(Partition::Measurement, row).unwrap();
        }
    }

    #[test]
    fn test_upsert_assigns_sequential_ids() {
        let backend = MemoryBackend::new();
        seed(&backend);
        let row = backend
            .find_by_id(Partition::Measurement, 3)
            .unwrap()
            .unwrap();
        assert_eq!(row.date, Some(date(2023, 1, 3)));
    }

    #[test]
    fn test_search_with_date_range() {
        let backend = MemoryBackend::new();
        seed(&backend);
        let predicates = vec![Predicate::all(vec![Constraint::new(
            Field::Date,
            CompareOp::Ge,
            date(2023, 1, 2),
        )])];
        let rows = backend
            .search(
                Partition::Measurement,
                &predicates,
                &Pagination::unbounded(),
                None,
            )
            .unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_or_junction_widens_results() {
        let backend = MemoryBackend::new();
        seed(&backend);
        let predicates = vec![
            Predicate::all(vec![Constraint::new(Field::NativeId, CompareOp::Eq, 1i64)]),
            Predicate::all(vec![Constraint::new(Field::NativeId, CompareOp::Eq, 2i64)])
                .outer(Junction::Or),
        ];
        let rows = backend
            .search(
                Partition::Measurement,
                &predicates,
                &Pagination::unbounded(),
                None,
            )
            .unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_person_name_contains_is_case_insensitive() {
        let backend = MemoryBackend::new();
        seed(&backend);
        let predicates = vec![Predicate::all(vec![Constraint::new(
            Field::PersonName,
            CompareOp::Contains,
            "lovelace",
        )])];
        assert_eq!(
            backend.count(Partition::Measurement, &predicates).unwrap(),
            3
        );
    }

    #[test]
    fn test_sort_descending_and_pagination() {
        let backend = MemoryBackend::new();
        seed(&backend);
        let rows = backend
            .search(
                Partition::Measurement,
                &[],
                &Pagination::new(0, 2),
                Some(&Sort::descending(Field::Date)),
            )
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].date, Some(date(2023, 1, 3)));
    }

    #[test]
    fn test_sibling_join_requires_exact_time() {
        let backend = MemoryBackend::new();
        seed(&backend);
        let found = backend
            .find_sibling(
                Partition::Measurement,
                3004249,
                1,
                date(2023, 1, 1),
                Some("08:30:00"),
            )
            .unwrap();
        assert!(found.is_some());

        let missed = backend
            .find_sibling(
                Partition::Measurement,
                3004249,
                1,
                date(2023, 1, 1),
                Some("08:30:01"),
            )
            .unwrap();
        assert!(missed.is_none());
    }

    #[test]
    fn test_identity_allocation_is_idempotent() {
        let backend = MemoryBackend::new();
        let first = backend.allocate(ResourceKind::Observation, 5).unwrap();
        let second = backend.allocate(ResourceKind::Observation, 5).unwrap();
        assert_eq!(first, second);
        assert_eq!(
            backend
                .internal_for_logical(ResourceKind::Observation, first)
                .unwrap(),
            Some(5)
        );
    }

    #[test]
    fn test_delete_reports_removed_count() {
        let backend = MemoryBackend::new();
        seed(&backend);
        assert_eq!(backend.delete(Partition::Measurement, 2).unwrap(), 1);
        assert_eq!(backend.delete(Partition::Measurement, 2).unwrap(), 0);
    }
}
