//! Canonical resource reconstruction from stored rows.
//!
//! The inverse of [`crate::classify`]: operates only on a row already
//! fetched, never raises vocabulary errors, and degrades unmapped concepts
//! to their source text. A systolic row reconstructs as the composite
//! blood-pressure resource, pulling its diastolic sibling in through the
//! (person, date, time) join; a missing sibling still yields a valid
//! one-component composite.

use std::sync::Arc;

use tracing::debug;

use meridian_cdm::{Concept, ConceptStore, FactRow, FactStore, Partition};
use meridian_fhir::{
    CodeableConcept, Coding, Effective, Observation, ObservationComponent, ObservationStatus,
    ObservationValue, Quantity, Reference, ReferenceRange, ResourceKind,
};

use crate::blood_pressure::{
    BP_COMBINED_CODE, BP_COMBINED_DISPLAY, DIASTOLIC_CONCEPT_ID, SYSTOLIC_CONCEPT_ID,
};
use crate::category;
use crate::config::MapperConfig;
use crate::error::MappingResult;
use crate::identity::IdentityMapper;
use crate::vocabulary::VocabularyResolver;

/// Rebuilds canonical resources from physical rows.
pub struct Reconstructor {
    facts: Arc<dyn FactStore>,
    concepts: Arc<dyn ConceptStore>,
    identity: IdentityMapper,
    resolver: VocabularyResolver,
    config: MapperConfig,
}

impl Reconstructor {
    pub fn new(
        facts: Arc<dyn FactStore>,
        concepts: Arc<dyn ConceptStore>,
        identity: IdentityMapper,
        resolver: VocabularyResolver,
        config: MapperConfig,
    ) -> Self {
        Reconstructor {
            facts,
            concepts,
            identity,
            resolver,
            config,
        }
    }

    /// Reconstructs the resource a row represents.
    ///
    /// `logical_id` is the externally addressable identity the caller
    /// resolved for this row. Existence is the caller's concern - this
    /// method never reports `NotFound`.
    pub fn reconstruct(
        &self,
        logical_id: i64,
        row: &FactRow,
        partition: Partition,
    ) -> MappingResult<Observation> {
        let mut observation = Observation::default();
        observation.id = Some(logical_id);
        observation.status = ObservationStatus::Final;

        if partition == Partition::Measurement && row.concept_id == SYSTOLIC_CONCEPT_ID {
            observation.code = CodeableConcept::from_coding(Coding::new(
                self.config.preferred_system_uri.clone(),
                BP_COMBINED_CODE,
                BP_COMBINED_DISPLAY,
            ));
            observation.component = self.reconstruct_pair(row)?;
        } else {
            observation.code = CodeableConcept::from_coding(self.concept_coding(row)?);
            observation.value = self.reconstruct_value(row)?;
            if row.range_low.is_some() || row.range_high.is_some() {
                observation.reference_range = vec![ReferenceRange {
                    low: row.range_low.map(Quantity::from_value),
                    high: row.range_high.map(Quantity::from_value),
                    applies_to: Vec::new(),
                }];
            }
        }

        // Split-field re-join; a malformed time column degrades to an
        // effective-less resource rather than failing the read.
        observation.effective = row.instant().map(Effective::Instant);

        let patient_id = self
            .identity
            .logical_for_related(ResourceKind::Patient, row.person_id)?;
        let mut subject = Reference::new(ResourceKind::Patient, patient_id);
        if let Some(name) = self.concepts.person_name(row.person_id)? {
            subject = subject.with_display(name);
        }
        observation.subject = Some(subject);

        if let Some(visit_id) = row.visit_id {
            let encounter_id = self
                .identity
                .logical_for_related(ResourceKind::Encounter, visit_id)?;
            observation.context = Some(Reference::new(ResourceKind::Encounter, encounter_id));
        }

        if let Some(provider_id) = row.provider_id {
            let practitioner_id = self
                .identity
                .logical_for_related(ResourceKind::Practitioner, provider_id)?;
            let mut performer = Reference::new(ResourceKind::Practitioner, practitioner_id);
            if let Some(name) = self.concepts.provider_name(provider_id)? {
                performer = performer.with_display(name);
            }
            observation.performer = vec![performer];
        }

        if let Some(code) = category::category_for_type_concept(row.type_concept_id) {
            observation.category = vec![CodeableConcept::from_coding(Coding::from_system_code(
                category::OBSERVATION_CATEGORY_SYSTEM,
                code,
            ))];
        }

        Ok(observation)
    }

    /// Systolic component from the addressed row, diastolic appended when
    /// the sibling join finds one. Partial pairing is valid on read.
    fn reconstruct_pair(&self, systolic: &FactRow) -> MappingResult<Vec<ObservationComponent>> {
        let mut components = vec![self.pair_component(systolic)?];

        let sibling = match systolic.date {
            Some(date) => self.facts.find_sibling(
                Partition::Measurement,
                DIASTOLIC_CONCEPT_ID,
                systolic.person_id,
                date,
                systolic.time.as_deref(),
            )?,
            None => None,
        };
        match sibling {
            Some(diastolic) => components.push(self.pair_component(&diastolic)?),
            None => debug!(
                person = systolic.person_id,
                "no diastolic sibling, reconstructing partial pair"
            ),
        }
        Ok(components)
    }

    fn pair_component(&self, row: &FactRow) -> MappingResult<ObservationComponent> {
        Ok(ObservationComponent {
            code: CodeableConcept::from_coding(self.concept_coding(row)?),
            value: self.reconstruct_value(row)?,
        })
    }

    /// The row's code rendered back to a coding. An unmapped concept has
    /// no system or code; its display is the stored source text.
    fn concept_coding(&self, row: &FactRow) -> MappingResult<Coding> {
        let concept = if row.concept_id != 0 {
            self.concepts.concept(row.concept_id)?
        } else {
            None
        };
        Ok(match concept {
            Some(concept) => Coding {
                system: self.resolver.system_for_vocabulary(&concept.vocabulary_id)?,
                code: Some(concept.code),
                display: Some(concept.name),
            },
            None => Coding {
                system: None,
                code: None,
                display: row.source_value.clone(),
            },
        })
    }

    /// Value shape mirrors storage shape: number, else concept, else the
    /// raw value capture, else the code's source text.
    fn reconstruct_value(&self, row: &FactRow) -> MappingResult<Option<ObservationValue>> {
        if let Some(number) = row.value_as_number {
            let mut quantity = Quantity::from_value(number);
            match self.unit_concept(row)? {
                Some(unit) => {
                    quantity.unit = Some(unit.name.clone());
                    quantity.code = Some(unit.code.clone());
                    quantity.system = self.resolver.system_for_vocabulary(&unit.vocabulary_id)?;
                }
                None => quantity.unit = row.unit_source_value.clone(),
            }
            return Ok(Some(ObservationValue::Quantity(quantity)));
        }

        if let Some(concept_id) = row.value_as_concept_id.filter(|id| *id != 0) {
            if let Some(concept) = self.concepts.concept(concept_id)? {
                let coding = Coding {
                    system: self.resolver.system_for_vocabulary(&concept.vocabulary_id)?,
                    code: Some(concept.code),
                    display: Some(concept.name),
                };
                return Ok(Some(ObservationValue::Concept(CodeableConcept::from_coding(
                    coding,
                ))));
            }
        }

        Ok(row
            .value_source_value
            .clone()
            .or_else(|| row.source_value.clone())
            .map(ObservationValue::Text))
    }

    fn unit_concept(&self, row: &FactRow) -> MappingResult<Option<Concept>> {
        match row.unit_concept_id {
            Some(id) if id != 0 => Ok(self.concepts.concept(id)?),
            _ => Ok(None),
        }
    }
}
