//! The engine facade: the create / read / search / delete surface a
//! resource server drives.

use std::sync::Arc;

use tracing::debug;

use meridian_cdm::{
    CompareOp, ConceptStore, Constraint, FactStore, Field, IdentityStore, Pagination, Partition,
    Predicate, Sort, VocabularyMap,
};
use meridian_fhir::Observation;

use crate::blood_pressure::SYSTOLIC_CONCEPT_ID;
use crate::classify::{ClassifiedFact, Classifier};
use crate::config::MapperConfig;
use crate::error::{MappingError, MappingResult};
use crate::identity::{FactId, IdentityMapper};
use crate::reconstruct::Reconstructor;
use crate::search::{PredicateCompiler, SearchParam};
use crate::vocabulary::VocabularyResolver;

const PARTITIONS: [Partition; 2] = [Partition::Measurement, Partition::Observation];

/// The mapping engine.
///
/// Explicitly constructed from its store collaborators; holds no mutable
/// state, so a single instance may serve concurrent calls from any number
/// of threads. Each operation runs synchronously to completion on the
/// caller's thread.
pub struct ObservationMapper {
    facts: Arc<dyn FactStore>,
    identity: IdentityMapper,
    classifier: Classifier,
    reconstructor: Reconstructor,
    compiler: PredicateCompiler,
}

impl ObservationMapper {
    pub fn new(
        facts: Arc<dyn FactStore>,
        concepts: Arc<dyn ConceptStore>,
        identity_store: Arc<dyn IdentityStore>,
        vocabulary: Arc<dyn VocabularyMap>,
        config: MapperConfig,
    ) -> Self {
        let identity = IdentityMapper::new(identity_store);
        let resolver = VocabularyResolver::new(vocabulary);
        ObservationMapper {
            facts: facts.clone(),
            identity: identity.clone(),
            classifier: Classifier::new(
                facts.clone(),
                concepts.clone(),
                identity.clone(),
                resolver.clone(),
                config.clone(),
            ),
            reconstructor: Reconstructor::new(
                facts,
                concepts,
                identity.clone(),
                resolver.clone(),
                config.clone(),
            ),
            compiler: PredicateCompiler::new(resolver, identity, config),
        }
    }

    /// Stores a new observation, returning its logical identifier.
    ///
    /// If an equivalent fact (same person, effective instant, and code)
    /// already exists, the write updates that fact instead of duplicating
    /// it.
    pub fn create(&self, resource: &Observation) -> MappingResult<i64> {
        let existing = self.find_existing(resource)?;
        self.write(resource, existing)
    }

    /// Updates the observation addressed by `logical_id`.
    pub fn update(&self, resource: &Observation, logical_id: i64) -> MappingResult<i64> {
        let fact_id = self.identity.fact_id(logical_id)?;
        self.write(resource, Some(fact_id))
    }

    /// Reads one observation by logical identifier.
    pub fn read(&self, logical_id: i64) -> MappingResult<Observation> {
        let fact_id = self.identity.fact_id(logical_id)?;
        let row = self
            .facts
            .find_by_id(fact_id.partition(), fact_id.native_id())?
            .ok_or(MappingError::NotFound { logical_id })?;
        self.reconstructor
            .reconstruct(logical_id, &row, fact_id.partition())
    }

    /// Lists observations matching the given parameters.
    ///
    /// Bare diastolic rows are excluded unconditionally so each
    /// blood-pressure pair surfaces exactly once, as its systolic-rooted
    /// composite. Results are ordered per partition (measurements first);
    /// `sort` orders rows within each partition.
    pub fn search(
        &self,
        params: &[SearchParam],
        pagination: &Pagination,
        sort: Option<&Sort>,
    ) -> MappingResult<Vec<Observation>> {
        let mut resources = Vec::new();
        for partition in PARTITIONS {
            let predicates = self.compile_all(params, partition)?;
            let rows = self
                .facts
                .search(partition, &predicates, &Pagination::unbounded(), sort)?;
            for row in rows {
                let fact_id = FactId::new(partition, row.id.unwrap_or_default());
                let logical_id = self.identity.allocate_fact(fact_id)?;
                resources.push(self.reconstructor.reconstruct(logical_id, &row, partition)?);
            }
        }

        let resources = resources.into_iter().skip(pagination.offset);
        Ok(match pagination.limit {
            Some(limit) => resources.take(limit).collect(),
            None => resources.collect(),
        })
    }

    /// Counts observations matching the given parameters, with the same
    /// diastolic exclusion as [`ObservationMapper::search`].
    pub fn count(&self, params: &[SearchParam]) -> MappingResult<u64> {
        let mut total = 0;
        for partition in PARTITIONS {
            let predicates = self.compile_all(params, partition)?;
            total += self.facts.count(partition, &predicates)?;
        }
        Ok(total)
    }

    /// Removes the observation addressed by `logical_id` from its owning
    /// partition; returns the number of rows removed.
    pub fn delete(&self, logical_id: i64) -> MappingResult<u64> {
        let fact_id = self.identity.fact_id(logical_id)?;
        Ok(self
            .facts
            .delete(fact_id.partition(), fact_id.native_id())?)
    }

    /// Classifies and persists, allocating the logical identity.
    ///
    /// The blood-pressure pair is written as two upserts with no
    /// cross-row transaction: the storage collaborator's transaction
    /// boundary, not this engine, owns atomicity of the pair. Concurrent
    /// creation of both halves of the same composite can race.
    fn write(&self, resource: &Observation, existing: Option<FactId>) -> MappingResult<i64> {
        let classified = self.classifier.classify(resource, existing)?;
        let fact_id = match classified {
            ClassifiedFact::Measurements(rows) => {
                let mut primary: Option<i64> = None;
                let mut last = 0;
                for row in rows {
                    let systolic = row.concept_id == SYSTOLIC_CONCEPT_ID;
                    last = self.facts.upsert(Partition::Measurement, row)?;
                    if systolic {
                        primary = Some(last);
                    }
                }
                FactId::Measurement(primary.unwrap_or(last))
            }
            ClassifiedFact::Observation(row) => {
                FactId::Observation(self.facts.upsert(Partition::Observation, *row)?)
            }
        };
        let logical_id = self.identity.allocate_fact(fact_id)?;
        debug!(logical_id, "observation stored");
        Ok(logical_id)
    }

    fn compile_all(
        &self,
        params: &[SearchParam],
        partition: Partition,
    ) -> MappingResult<Vec<Predicate>> {
        let mut predicates = Vec::new();
        for param in params {
            predicates.extend(self.compiler.compile(param, partition)?);
        }
        if partition == Partition::Measurement {
            predicates.push(PredicateCompiler::diastolic_exclusion());
        }
        Ok(predicates)
    }

    /// The create-time duplicate probe: an inbound resource with the same
    /// person, effective instant, and code as a stored fact addresses that
    /// fact rather than creating a sibling duplicate.
    fn find_existing(&self, resource: &Observation) -> MappingResult<Option<FactId>> {
        let Some(subject) = resource.subject.as_ref() else {
            return Ok(None);
        };
        let Some(at) = resource.effective.as_ref().and_then(|e| e.anchor()) else {
            return Ok(None);
        };

        let mut params = vec![
            SearchParam::Patient(subject.id),
            SearchParam::Date {
                op: CompareOp::Eq,
                at,
            },
        ];

        let resolution = self.classifier.resolve_code(&resource.code)?;
        let code_clause = match resolution.concept {
            Some(_) => {
                params.push(SearchParam::Code {
                    system: resolution.system,
                    code: resolution.code,
                });
                None
            }
            // Unmapped code: the only stored trace is the source text.
            None => Some(Predicate::all(vec![Constraint::new(
                Field::SourceValue,
                CompareOp::Eq,
                resolution.source_text,
            )])),
        };

        for partition in PARTITIONS {
            let mut predicates = self.compile_all(&params, partition)?;
            if let Some(clause) = code_clause.clone() {
                predicates.push(clause);
            }
            let rows = self
                .facts
                .search(partition, &predicates, &Pagination::new(0, 1), None)?;
            if let Some(row) = rows.into_iter().next() {
                debug!(partition = %partition, "create matched an existing fact");
                return Ok(Some(FactId::new(partition, row.id.unwrap_or_default())));
            }
        }
        Ok(None)
    }
}
