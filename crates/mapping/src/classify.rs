//! Partition classification and physical row construction.
//!
//! One inbound resource becomes one row in the measurement or observation
//! partition - or, for the combined blood-pressure code, up to two paired
//! measurement rows (see [`crate::blood_pressure`]).

use std::sync::Arc;

use tracing::{debug, warn};

use meridian_cdm::{Concept, ConceptStore, Domain, FactRow, FactStore, Partition};
use meridian_fhir::{
    CodeableConcept, Coding, Observation, ObservationValue, Quantity, ResourceKind,
};

use crate::blood_pressure::BP_COMBINED_CODE;
use crate::category;
use crate::config::MapperConfig;
use crate::error::{MappingError, MappingResult};
use crate::identity::{FactId, IdentityMapper};
use crate::vocabulary::VocabularyResolver;

/// The physical outcome of classifying one resource.
#[derive(Debug, Clone, PartialEq)]
pub enum ClassifiedFact {
    /// One row - or two for a blood-pressure pair, systolic first.
    Measurements(Vec<FactRow>),
    /// One categorical/narrative row.
    Observation(Box<FactRow>),
}

impl ClassifiedFact {
    /// The partition the rows belong to.
    pub fn partition(&self) -> Partition {
        match self {
            ClassifiedFact::Measurements(_) => Partition::Measurement,
            ClassifiedFact::Observation(_) => Partition::Observation,
        }
    }
}

/// The winning code of a resource, resolved through the vocabulary map.
#[derive(Debug)]
pub(crate) struct CodeResolution {
    /// The resolved concept; `None` means unmapped.
    pub concept: Option<Concept>,
    /// System URI of the coding that won resolution.
    pub system: Option<String>,
    /// Code of the coding that won resolution.
    pub code: Option<String>,
    /// Fallback text: the resource's free-text label, else the first
    /// coding rendered as `"system code display"`.
    pub source_text: String,
}

/// Builds physical rows from canonical resources.
pub struct Classifier {
    pub(crate) facts: Arc<dyn FactStore>,
    pub(crate) concepts: Arc<dyn ConceptStore>,
    pub(crate) identity: IdentityMapper,
    pub(crate) resolver: VocabularyResolver,
    pub(crate) config: MapperConfig,
}

impl Classifier {
    pub fn new(
        facts: Arc<dyn FactStore>,
        concepts: Arc<dyn ConceptStore>,
        identity: IdentityMapper,
        resolver: VocabularyResolver,
        config: MapperConfig,
    ) -> Self {
        Classifier {
            facts,
            concepts,
            identity,
            resolver,
            config,
        }
    }

    /// Classifies a resource and builds the row(s) ready for upsert.
    ///
    /// `existing` addresses the stored row on update; `None` means create.
    pub fn classify(
        &self,
        resource: &Observation,
        existing: Option<FactId>,
    ) -> MappingResult<ClassifiedFact> {
        let person_id = self.resolve_person(resource)?;

        // The combined systolic/diastolic code never appears in the concept
        // table; it bypasses single-row construction entirely.
        if self.has_combined_bp_coding(resource) {
            let rows = self.classify_blood_pressure(resource, existing, person_id)?;
            return Ok(ClassifiedFact::Measurements(rows));
        }

        let resolution = self.resolve_code(&resource.code)?;
        let partition = self.route(resource, &resolution, existing);

        let mut row = match existing {
            Some(fact_id) => {
                let mut loaded = self.load_existing(resource, fact_id)?;
                clear_value_columns(&mut loaded);
                loaded
            }
            None => FactRow::default(),
        };

        row.person_id = person_id;
        row.concept_id = resolution.concept.as_ref().map(|c| c.id).unwrap_or(0);
        row.source_value = if row.concept_id == 0 {
            Some(resolution.source_text.clone())
        } else {
            None
        };

        if let Some(value) = &resource.value {
            self.convert_value(&mut row, value)?;
        }
        if let Some(range) = resource.reference_range.iter().find(|r| !r.is_empty()) {
            row.range_low = range.low.as_ref().map(|q| q.value);
            row.range_high = range.high.as_ref().map(|q| q.value);
        }
        self.apply_effective(&mut row, resource);
        self.apply_visit(&mut row, resource)?;
        self.apply_performer(&mut row, resource)?;
        row.type_concept_id = resolve_category(resource);

        debug!(
            partition = %partition,
            concept = row.concept_id,
            person = person_id,
            "classified observation"
        );

        Ok(match partition {
            Partition::Measurement => ClassifiedFact::Measurements(vec![row]),
            Partition::Observation => ClassifiedFact::Observation(Box::new(row)),
        })
    }

    /// Subject validation: present, Patient-typed, and resolvable.
    pub(crate) fn resolve_person(&self, resource: &Observation) -> MappingResult<i64> {
        let subject = resource.subject.as_ref().ok_or(MappingError::MissingSubject)?;
        if subject.kind != ResourceKind::Patient {
            return Err(MappingError::InvalidSubject { kind: subject.kind });
        }
        self.identity.person_id(subject.id)
    }

    fn has_combined_bp_coding(&self, resource: &Observation) -> bool {
        resource.code.coding.iter().any(|coding| {
            coding.system.as_deref() == Some(self.config.preferred_system_uri.as_str())
                && coding.code.as_deref() == Some(BP_COMBINED_CODE)
        })
    }

    /// Code resolution with precedence: an exact preferred-vocabulary match
    /// wins immediately; otherwise the first coding whose system resolves
    /// to any known vocabulary is the second choice; otherwise unmapped.
    pub(crate) fn resolve_code(&self, code: &CodeableConcept) -> MappingResult<CodeResolution> {
        let source_text = code
            .text
            .clone()
            .filter(|t| !t.is_empty())
            .or_else(|| code.first_coding().map(render_coding))
            .unwrap_or_default();

        let mut second_choice: Option<(&Coding, String)> = None;
        let mut winner: Option<(&Coding, String)> = None;
        for coding in &code.coding {
            let (Some(system), Some(_)) = (coding.system.as_deref(), coding.code.as_deref())
            else {
                continue;
            };
            if system == self.config.preferred_system_uri {
                winner = Some((coding, self.config.preferred_vocabulary.clone()));
                break;
            }
            if second_choice.is_none() {
                if let Some(vocabulary) = self.resolver.vocabulary_for_system(system)? {
                    second_choice = Some((coding, vocabulary));
                }
            }
        }

        let (concept, system, code) = match winner.or(second_choice) {
            Some((coding, vocabulary)) => {
                let code = coding.code.as_deref().unwrap_or_default();
                (
                    self.concepts.concept_by_code(&vocabulary, code)?,
                    coding.system.clone(),
                    coding.code.clone(),
                )
            }
            None => (None, None, None),
        };

        Ok(CodeResolution {
            concept,
            system,
            code,
            source_text,
        })
    }

    /// Domain routing with the value-shape override: a numeric value always
    /// routes to the measurement partition; otherwise the concept's domain
    /// decides, and unmapped or non-clinical domains land in the
    /// observation partition. An update never migrates partitions - the
    /// stored row's home wins.
    fn route(
        &self,
        resource: &Observation,
        resolution: &CodeResolution,
        existing: Option<FactId>,
    ) -> Partition {
        if let Some(fact_id) = existing {
            return fact_id.partition();
        }
        let numeric = matches!(resource.value, Some(ObservationValue::Quantity(_)));
        if numeric {
            return Partition::Measurement;
        }
        match resolution.concept.as_ref().map(|c| &c.domain) {
            Some(Domain::Measurement) => Partition::Measurement,
            Some(Domain::Observation) => Partition::Observation,
            Some(Domain::Other(_)) | None => Partition::Observation,
        }
    }

    pub(crate) fn load_existing(
        &self,
        resource: &Observation,
        fact_id: FactId,
    ) -> MappingResult<FactRow> {
        self.facts
            .find_by_id(fact_id.partition(), fact_id.native_id())?
            .ok_or(MappingError::NotFound {
                logical_id: resource.id.unwrap_or_default(),
            })
    }

    /// Converts the resource's value into the row's value columns.
    pub(crate) fn convert_value(
        &self,
        row: &mut FactRow,
        value: &ObservationValue,
    ) -> MappingResult<()> {
        match value {
            ObservationValue::Quantity(quantity) => self.convert_quantity(row, quantity)?,
            ObservationValue::Concept(concept) => self.convert_coded_value(row, concept)?,
            ObservationValue::Text(text) => {
                row.value_source_value = Some(text.clone());
            }
        }
        Ok(())
    }

    /// Numeric value: store the number, keep the raw captures, and resolve
    /// the unit concept. A unit code without a system URI is assumed to be
    /// in the default unit vocabulary; an unresolvable unit stays
    /// source-text only.
    pub(crate) fn convert_quantity(
        &self,
        row: &mut FactRow,
        quantity: &Quantity,
    ) -> MappingResult<()> {
        row.value_as_number = Some(quantity.value);
        row.value_source_value = Some(quantity.value.to_string());
        row.unit_source_value = quantity.unit.clone();

        if let Some(unit_code) = quantity.code.as_deref().filter(|c| !c.is_empty()) {
            let vocabulary = match quantity.system.as_deref().filter(|s| !s.is_empty()) {
                Some(system) => self.resolver.vocabulary_for_system(system)?,
                None => Some(self.config.default_unit_vocabulary.clone()),
            };
            if let Some(vocabulary) = vocabulary {
                if let Some(concept) = self.concepts.concept_by_code(&vocabulary, unit_code)? {
                    row.unit_concept_id = Some(concept.id);
                }
            }
        }
        Ok(())
    }

    /// Coded value: must resolve to a concept. Unlike the fact code there
    /// is no source-text fallback for values.
    pub(crate) fn convert_coded_value(
        &self,
        row: &mut FactRow,
        value: &CodeableConcept,
    ) -> MappingResult<()> {
        for coding in &value.coding {
            let (Some(system), Some(code)) = (coding.system.as_deref(), coding.code.as_deref())
            else {
                continue;
            };
            let concept = match self.resolver.vocabulary_for_system(system)? {
                Some(vocabulary) => self.concepts.concept_by_code(&vocabulary, code)?,
                None => None,
            };
            let concept = concept.ok_or_else(|| MappingError::UnmappableCodedValue {
                system: system.to_string(),
                code: code.to_string(),
            })?;
            row.value_as_concept_id = Some(concept.id);
            row.value_source_value = Some(render_coding(coding));
            return Ok(());
        }
        Err(MappingError::UnmappableCodedValue {
            system: String::new(),
            code: value.text.clone().unwrap_or_default(),
        })
    }

    pub(crate) fn apply_effective(&self, row: &mut FactRow, resource: &Observation) {
        if let Some(at) = resource.effective.as_ref().and_then(|e| e.anchor()) {
            row.set_instant(at);
        }
    }

    /// Context resolution: an encounter reference must exist; anything
    /// other than an encounter is ignored.
    pub(crate) fn apply_visit(&self, row: &mut FactRow, resource: &Observation) -> MappingResult<()> {
        let Some(context) = resource.context.as_ref() else {
            return Ok(());
        };
        if context.kind != ResourceKind::Encounter {
            warn!(kind = %context.kind, "ignoring non-encounter context");
            return Ok(());
        }
        row.visit_id = Some(self.identity.visit_id(context.id)?);
        Ok(())
    }

    /// Performer resolution: best effort, never fatal.
    pub(crate) fn apply_performer(
        &self,
        row: &mut FactRow,
        resource: &Observation,
    ) -> MappingResult<()> {
        for performer in &resource.performer {
            if performer.kind != ResourceKind::Practitioner {
                continue;
            }
            match self.identity.provider_id(performer.id)? {
                Some(provider_id) => {
                    row.provider_id = Some(provider_id);
                    break;
                }
                None => debug!(performer = performer.id, "performer identity unknown, skipped"),
            }
        }
        Ok(())
    }
}

/// First category coding with a known mapping wins; none maps to the
/// unknown sentinel.
pub(crate) fn resolve_category(resource: &Observation) -> i64 {
    for concept in &resource.category {
        for coding in &concept.coding {
            if let Some(code) = coding.code.as_deref() {
                if let Some(type_concept) = category::type_concept_for_category(code) {
                    return type_concept;
                }
            }
        }
    }
    0
}

/// `"system code display"`, trimmed.
pub(crate) fn render_coding(coding: &Coding) -> String {
    format!(
        "{} {} {}",
        coding.system.as_deref().unwrap_or_default(),
        coding.code.as_deref().unwrap_or_default(),
        coding.display.as_deref().unwrap_or_default()
    )
    .trim()
    .to_string()
}

/// Resets value and range columns so an update does not inherit stale data
/// from the row's previous shape.
pub(crate) fn clear_value_columns(row: &mut FactRow) {
    row.value_as_number = None;
    row.value_as_concept_id = None;
    row.value_source_value = None;
    row.unit_concept_id = None;
    row.unit_source_value = None;
    row.range_low = None;
    row.range_high = None;
    row.source_value = None;
}
