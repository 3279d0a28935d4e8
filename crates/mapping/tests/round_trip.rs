//! Write-then-read round trips for single-valued observations.

mod common;

use chrono::{TimeZone, Utc};

use common::*;
use meridian_cdm::{FactStore, IdentityStore, Pagination, Partition};
use meridian_fhir::{
    CodeableConcept, Coding, Effective, Observation, ObservationStatus, ObservationValue,
    Reference, ResourceKind,
};
use meridian_mapping::MappingError;

#[test]
fn test_quantity_round_trip() {
    let (mapper, _backend) = seeded_mapper();
    let logical_id = mapper.create(&weight_observation()).unwrap();

    let read = mapper.read(logical_id).unwrap();
    assert_eq!(read.id, Some(logical_id));
    assert_eq!(read.status, ObservationStatus::Final);

    let coding = read.code.first_coding().unwrap();
    assert_eq!(coding.system.as_deref(), Some(LOINC));
    assert_eq!(coding.code.as_deref(), Some("29463-7"));
    assert_eq!(coding.display.as_deref(), Some("Body weight"));

    let value = quantity(&read.value);
    assert_eq!(value.value, 72.5);
    assert_eq!(value.code.as_deref(), Some("kg"));
    assert_eq!(value.system.as_deref(), Some(UCUM));

    assert_eq!(
        read.effective,
        Some(Effective::Instant(
            Utc.with_ymd_and_hms(2023, 1, 1, 10, 0, 0).unwrap()
        ))
    );

    let subject = read.subject.unwrap();
    assert_eq!(subject.kind, ResourceKind::Patient);
    assert_eq!(subject.id, PATIENT_ID);
    assert_eq!(subject.display.as_deref(), Some("John Smith"));

    let category = read.category[0].first_coding().unwrap();
    assert_eq!(category.code.as_deref(), Some("laboratory"));
}

#[test]
fn test_coded_value_round_trip() {
    let (mapper, backend) = seeded_mapper();
    let logical_id = mapper.create(&smoking_observation()).unwrap();

    // Coded, non-numeric facts land in the observation partition, so the
    // signed internal id is negative.
    let signed = backend
        .internal_for_logical(ResourceKind::Observation, logical_id)
        .unwrap()
        .unwrap();
    assert!(signed < 0);

    let read = mapper.read(logical_id).unwrap();
    match read.value {
        Some(ObservationValue::Concept(ref concept)) => {
            let coding = concept.first_coding().unwrap();
            assert_eq!(coding.system.as_deref(), Some(SNOMED));
            assert_eq!(coding.code.as_deref(), Some("266919005"));
        }
        ref other => panic!("expected coded value, got {:?}", other),
    }
}

#[test]
fn test_unmapped_code_falls_back_to_source_text() {
    let (mapper, backend) = seeded_mapper();
    let mut observation = Observation::new(CodeableConcept::from_coding(Coding::new(
        "http://example.org/local-codes",
        "XYZ-1",
        "House code",
    )));
    observation.subject = Some(Reference::new(ResourceKind::Patient, PATIENT_ID));
    observation.effective = Some(fixture_instant());

    let logical_id = mapper.create(&observation).unwrap();

    let rows = backend
        .search(Partition::Observation, &[], &Pagination::unbounded(), None)
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].concept_id, 0);
    assert_eq!(
        rows[0].source_value.as_deref(),
        Some("http://example.org/local-codes XYZ-1 House code")
    );

    let read = mapper.read(logical_id).unwrap();
    assert_eq!(
        read.value,
        Some(ObservationValue::Text(
            "http://example.org/local-codes XYZ-1 House code".to_string()
        ))
    );
    assert_eq!(
        read.code.first_coding().unwrap().display.as_deref(),
        Some("http://example.org/local-codes XYZ-1 House code")
    );
}

#[test]
fn test_free_text_code_label_wins_over_coding_concat() {
    let (mapper, backend) = seeded_mapper();
    let mut observation = Observation::new(CodeableConcept {
        coding: vec![Coding::from_system_code("http://example.org/local-codes", "XYZ-1")],
        text: Some("Capillary refill".to_string()),
    });
    observation.subject = Some(Reference::new(ResourceKind::Patient, PATIENT_ID));

    mapper.create(&observation).unwrap();
    let rows = backend
        .search(Partition::Observation, &[], &Pagination::unbounded(), None)
        .unwrap();
    assert_eq!(rows[0].source_value.as_deref(), Some("Capillary refill"));
}

#[test]
fn test_update_replaces_value() {
    let (mapper, backend) = seeded_mapper();
    let logical_id = mapper.create(&weight_observation()).unwrap();

    let mut updated = weight_observation();
    if let Some(ObservationValue::Quantity(ref mut q)) = updated.value {
        q.value = 70.0;
    }
    let updated_id = mapper.update(&updated, logical_id).unwrap();
    assert_eq!(updated_id, logical_id);

    let read = mapper.read(logical_id).unwrap();
    assert_eq!(quantity(&read.value).value, 70.0);

    // Still one row: update reused the stored row.
    assert_eq!(backend.count(Partition::Measurement, &[]).unwrap(), 1);
}

#[test]
fn test_create_deduplicates_same_person_instant_and_code() {
    let (mapper, backend) = seeded_mapper();
    let first = mapper.create(&weight_observation()).unwrap();
    let second = mapper.create(&weight_observation()).unwrap();
    assert_eq!(first, second);
    assert_eq!(backend.count(Partition::Measurement, &[]).unwrap(), 1);
}

#[test]
fn test_context_resolves_to_visit() {
    let (mapper, backend) = seeded_mapper();
    let mut observation = weight_observation();
    observation.context = Some(Reference::new(ResourceKind::Encounter, ENCOUNTER_ID));

    let logical_id = mapper.create(&observation).unwrap();
    let rows = backend
        .search(Partition::Measurement, &[], &Pagination::unbounded(), None)
        .unwrap();
    assert_eq!(rows[0].visit_id, Some(10));

    let read = mapper.read(logical_id).unwrap();
    assert_eq!(
        read.context,
        Some(Reference::new(ResourceKind::Encounter, ENCOUNTER_ID))
    );
}

#[test]
fn test_unknown_encounter_is_fatal() {
    let (mapper, backend) = seeded_mapper();
    let mut observation = weight_observation();
    observation.context = Some(Reference::new(ResourceKind::Encounter, 999));

    let err = mapper.create(&observation).unwrap_err();
    assert!(matches!(
        err,
        MappingError::EncounterNotFound { logical_id: 999 }
    ));
    // The failed write left nothing behind.
    assert_eq!(backend.count(Partition::Measurement, &[]).unwrap(), 0);
}

#[test]
fn test_missing_subject_is_fatal() {
    let (mapper, _backend) = seeded_mapper();
    let mut observation = weight_observation();
    observation.subject = None;
    assert!(matches!(
        mapper.create(&observation).unwrap_err(),
        MappingError::MissingSubject
    ));
}

#[test]
fn test_unknown_patient_identity_is_fatal() {
    let (mapper, _backend) = seeded_mapper();
    let mut observation = weight_observation();
    observation.subject = Some(Reference::new(ResourceKind::Patient, 777));
    assert!(matches!(
        mapper.create(&observation).unwrap_err(),
        MappingError::IdentityNotFound {
            kind: ResourceKind::Patient,
            logical_id: 777
        }
    ));
}

#[test]
fn test_unmappable_coded_value_is_fatal() {
    let (mapper, _backend) = seeded_mapper();
    let mut observation = smoking_observation();
    observation.value = Some(ObservationValue::Concept(CodeableConcept::from_coding(
        Coding::from_system_code(SNOMED, "99999999"),
    )));
    assert!(matches!(
        mapper.create(&observation).unwrap_err(),
        MappingError::UnmappableCodedValue { .. }
    ));
}

#[test]
fn test_performer_round_trip() {
    let (mapper, _backend) = seeded_mapper();
    let mut observation = weight_observation();
    observation.performer = vec![Reference::new(
        ResourceKind::Practitioner,
        PRACTITIONER_ID,
    )];

    let logical_id = mapper.create(&observation).unwrap();
    let read = mapper.read(logical_id).unwrap();
    let performer = &read.performer[0];
    assert_eq!(performer.id, PRACTITIONER_ID);
    assert_eq!(performer.display.as_deref(), Some("Sarah Chen"));
}

#[test]
fn test_read_unknown_logical_id() {
    let (mapper, _backend) = seeded_mapper();
    assert!(matches!(
        mapper.read(12345).unwrap_err(),
        MappingError::IdentityNotFound { .. }
    ));
}
