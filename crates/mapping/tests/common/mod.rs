//! Shared fixtures for mapping engine tests.
//!
//! Seeds a [`MemoryBackend`] with a small terminology slice (blood
//! pressure, body weight, smoking status, units) and the identity pairs
//! the fixture resources reference.
#![allow(dead_code)]

use std::sync::Arc;

use chrono::{TimeZone, Utc};

use meridian_cdm::{
    Concept, Domain, MemoryBackend, MemoryVocabularyMap, VocabularyMapEntry,
};
use meridian_fhir::{
    CodeableConcept, Coding, Effective, Observation, ObservationComponent, ObservationValue,
    Quantity, Reference, ResourceKind,
};
use meridian_mapping::{MapperConfig, ObservationMapper};

/// Logical patient id used by all fixture resources.
pub const PATIENT_ID: i64 = 42;
/// Native person key behind [`PATIENT_ID`].
pub const PERSON_ID: i64 = 1;
/// Logical encounter id with a registered visit.
pub const ENCOUNTER_ID: i64 = 100;
/// Logical practitioner id with a registered provider.
pub const PRACTITIONER_ID: i64 = 9;

pub const LOINC: &str = "http://loinc.org";
pub const UCUM: &str = "http://unitsofmeasure.org";
pub const SNOMED: &str = "http://snomed.info/sct";

/// Builds a mapper over a freshly seeded backend; returns both so tests
/// can inspect rows directly.
pub fn seeded_mapper() -> (ObservationMapper, Arc<MemoryBackend>) {
    let backend = Arc::new(MemoryBackend::new());

    for concept in [
        concept(3004249, "LOINC", "8480-6", "Systolic blood pressure", Domain::Measurement),
        concept(3012888, "LOINC", "8462-4", "Diastolic blood pressure", Domain::Measurement),
        concept(3025315, "LOINC", "29463-7", "Body weight", Domain::Measurement),
        concept(40766929, "LOINC", "72166-2", "Tobacco smoking status", Domain::Observation),
        concept(45879404, "SNOMED", "266919005", "Never smoked tobacco", Domain::Other("Meas Value".into())),
        concept(8876, "UCUM", "mm[Hg]", "millimeter mercury column", Domain::Other("Unit".into())),
        concept(9529, "UCUM", "kg", "kilogram", Domain::Other("Unit".into())),
    ] {
        backend.insert_concept(concept);
    }

    backend.insert_person(PERSON_ID, "John Smith");
    backend.insert_provider(5, "Sarah Chen");
    backend.register_identity(ResourceKind::Patient, PATIENT_ID, PERSON_ID);
    backend.register_identity(ResourceKind::Encounter, ENCOUNTER_ID, 10);
    backend.register_identity(ResourceKind::Practitioner, PRACTITIONER_ID, 5);

    let vocabulary = Arc::new(MemoryVocabularyMap::with_entries(vec![
        VocabularyMapEntry::new("LOINC", LOINC).with_other_uri("urn:oid:2.16.840.1.113883.6.1"),
        VocabularyMapEntry::new("UCUM", UCUM),
        VocabularyMapEntry::new("SNOMED", SNOMED),
    ]));

    let mapper = ObservationMapper::new(
        backend.clone(),
        backend.clone(),
        backend.clone(),
        vocabulary,
        MapperConfig::default(),
    );
    (mapper, backend)
}

fn concept(id: i64, vocabulary: &str, code: &str, name: &str, domain: Domain) -> Concept {
    Concept {
        id,
        vocabulary_id: vocabulary.to_string(),
        code: code.to_string(),
        name: name.to_string(),
        domain,
    }
}

/// The fixture effective instant: 2023-01-01T10:00:00Z.
pub fn fixture_instant() -> Effective {
    Effective::Instant(Utc.with_ymd_and_hms(2023, 1, 1, 10, 0, 0).unwrap())
}

/// A body-weight measurement: 72.5 kg, laboratory category.
pub fn weight_observation() -> Observation {
    let mut observation = Observation::new(CodeableConcept::from_coding(Coding::new(
        LOINC, "29463-7", "Body weight",
    )));
    observation.subject = Some(Reference::new(ResourceKind::Patient, PATIENT_ID));
    observation.effective = Some(fixture_instant());
    observation.value = Some(ObservationValue::Quantity(Quantity {
        value: 72.5,
        unit: Some("kg".to_string()),
        system: Some(UCUM.to_string()),
        code: Some("kg".to_string()),
    }));
    observation.category = vec![CodeableConcept::from_coding(Coding::from_system_code(
        "http://hl7.org/fhir/observation-category",
        "laboratory",
    ))];
    observation
}

/// A coded smoking-status observation (observation partition).
pub fn smoking_observation() -> Observation {
    let mut observation = Observation::new(CodeableConcept::from_coding(Coding::new(
        LOINC, "72166-2", "Tobacco smoking status",
    )));
    observation.subject = Some(Reference::new(ResourceKind::Patient, PATIENT_ID));
    observation.effective = Some(fixture_instant());
    observation.value = Some(ObservationValue::Concept(CodeableConcept::from_coding(
        Coding::new(SNOMED, "266919005", "Never smoked tobacco"),
    )));
    observation
}

/// The combined blood-pressure panel with both components.
pub fn bp_observation(systolic: f64, diastolic: f64) -> Observation {
    let mut observation = bp_observation_systolic_only(systolic);
    observation.component.push(bp_component("8462-4", diastolic));
    observation
}

/// A combined panel carrying only the systolic component.
pub fn bp_observation_systolic_only(systolic: f64) -> Observation {
    let mut observation = Observation::new(CodeableConcept::from_coding(Coding::new(
        LOINC,
        "85354-9",
        "Blood pressure systolic & diastolic",
    )));
    observation.subject = Some(Reference::new(ResourceKind::Patient, PATIENT_ID));
    observation.effective = Some(fixture_instant());
    observation.component = vec![bp_component("8480-6", systolic)];
    observation
}

pub fn bp_component(loinc_code: &str, value: f64) -> ObservationComponent {
    ObservationComponent {
        code: CodeableConcept::from_coding(Coding::from_system_code(LOINC, loinc_code)),
        value: Some(ObservationValue::Quantity(Quantity {
            value,
            unit: Some("mmHg".to_string()),
            system: Some(UCUM.to_string()),
            code: Some("mm[Hg]".to_string()),
        })),
    }
}

/// Unwraps a quantity value or panics with context.
pub fn quantity(value: &Option<ObservationValue>) -> &Quantity {
    match value {
        Some(ObservationValue::Quantity(q)) => q,
        other => panic!("expected quantity value, got {:?}", other),
    }
}
