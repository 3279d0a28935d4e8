//! The systolic/diastolic composite: split on write, merge on read.

mod common;

use common::*;
use meridian_cdm::{CompareOp, FactStore, Pagination, Partition};
use meridian_fhir::{
    CodeableConcept, Coding, Quantity, ReferenceRange,
};
use meridian_mapping::{MappingError, SearchParam};

#[test]
fn test_composite_write_produces_two_sibling_rows() {
    let (mapper, backend) = seeded_mapper();
    mapper.create(&bp_observation(120.0, 80.0)).unwrap();

    let rows = backend
        .search(Partition::Measurement, &[], &Pagination::unbounded(), None)
        .unwrap();
    assert_eq!(rows.len(), 2);

    let systolic = rows.iter().find(|r| r.concept_id == 3004249).unwrap();
    let diastolic = rows.iter().find(|r| r.concept_id == 3012888).unwrap();
    assert_eq!(systolic.value_as_number, Some(120.0));
    assert_eq!(diastolic.value_as_number, Some(80.0));
    assert_eq!(systolic.person_id, diastolic.person_id);
    assert_eq!(systolic.date, diastolic.date);
    assert_eq!(systolic.time, diastolic.time);
    assert_eq!(systolic.time.as_deref(), Some("10:00:00"));
    assert_eq!(systolic.source_value.as_deref(), Some("8480-6"));
}

#[test]
fn test_composite_read_merges_both_components() {
    let (mapper, _backend) = seeded_mapper();
    let logical_id = mapper.create(&bp_observation(120.0, 80.0)).unwrap();

    let read = mapper.read(logical_id).unwrap();
    let coding = read.code.first_coding().unwrap();
    assert_eq!(coding.code.as_deref(), Some("85354-9"));
    assert_eq!(
        coding.display.as_deref(),
        Some("Blood pressure systolic & diastolic")
    );

    assert_eq!(read.component.len(), 2);
    let systolic = &read.component[0];
    assert_eq!(
        systolic.code.first_coding().unwrap().code.as_deref(),
        Some("8480-6")
    );
    assert_eq!(quantity(&systolic.value).value, 120.0);

    let diastolic = &read.component[1];
    assert_eq!(
        diastolic.code.first_coding().unwrap().code.as_deref(),
        Some("8462-4")
    );
    assert_eq!(quantity(&diastolic.value).value, 80.0);
}

#[test]
fn test_partial_pair_reads_single_component() {
    let (mapper, backend) = seeded_mapper();
    let logical_id = mapper
        .create(&bp_observation_systolic_only(130.0))
        .unwrap();

    assert_eq!(backend.count(Partition::Measurement, &[]).unwrap(), 1);

    let read = mapper.read(logical_id).unwrap();
    assert_eq!(read.component.len(), 1);
    assert_eq!(quantity(&read.component[0].value).value, 130.0);
}

#[test]
fn test_listing_excludes_bare_diastolic_rows() {
    let (mapper, _backend) = seeded_mapper();
    mapper.create(&bp_observation(120.0, 80.0)).unwrap();

    let results = mapper.search(&[], &Pagination::unbounded(), None).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(
        results[0].code.first_coding().unwrap().code.as_deref(),
        Some("85354-9")
    );
    assert_eq!(results[0].component.len(), 2);

    assert_eq!(mapper.count(&[]).unwrap(), 1);
}

#[test]
fn test_search_by_combined_code_finds_the_composite() {
    let (mapper, _backend) = seeded_mapper();
    mapper.create(&bp_observation(120.0, 80.0)).unwrap();
    mapper.create(&weight_observation()).unwrap();

    let results = mapper
        .search(
            &[SearchParam::Code {
                system: Some(LOINC.to_string()),
                code: Some("85354-9".to_string()),
            }],
            &Pagination::unbounded(),
            None,
        )
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].component.len(), 2);
}

#[test]
fn test_update_rewrites_both_halves() {
    let (mapper, backend) = seeded_mapper();
    let logical_id = mapper.create(&bp_observation(120.0, 80.0)).unwrap();

    let updated_id = mapper
        .update(&bp_observation(135.0, 88.0), logical_id)
        .unwrap();
    assert_eq!(updated_id, logical_id);

    // Still exactly one pair.
    assert_eq!(backend.count(Partition::Measurement, &[]).unwrap(), 2);

    let read = mapper.read(logical_id).unwrap();
    assert_eq!(quantity(&read.component[0].value).value, 135.0);
    assert_eq!(quantity(&read.component[1].value).value, 88.0);
}

#[test]
fn test_update_against_non_bp_row_is_inconsistent_pairing() {
    let (mapper, _backend) = seeded_mapper();
    let weight_id = mapper.create(&weight_observation()).unwrap();

    let err = mapper
        .update(&bp_observation(120.0, 80.0), weight_id)
        .unwrap_err();
    assert!(matches!(
        err,
        MappingError::InconsistentPairing {
            expected: 3004249,
            found: 3025315
        }
    ));
}

#[test]
fn test_reference_range_distributes_to_named_sibling() {
    let (mapper, backend) = seeded_mapper();
    let mut observation = bp_observation(120.0, 80.0);
    observation.reference_range = vec![
        ReferenceRange {
            low: Some(Quantity::from_value(90.0)),
            high: Some(Quantity::from_value(140.0)),
            applies_to: vec![CodeableConcept::from_coding(Coding::from_system_code(
                LOINC, "8480-6",
            ))],
        },
        ReferenceRange {
            low: Some(Quantity::from_value(60.0)),
            high: Some(Quantity::from_value(90.0)),
            applies_to: vec![CodeableConcept::from_coding(Coding::from_system_code(
                LOINC, "8462-4",
            ))],
        },
    ];
    mapper.create(&observation).unwrap();

    let rows = backend
        .search(Partition::Measurement, &[], &Pagination::unbounded(), None)
        .unwrap();
    let systolic = rows.iter().find(|r| r.concept_id == 3004249).unwrap();
    let diastolic = rows.iter().find(|r| r.concept_id == 3012888).unwrap();
    assert_eq!(systolic.range_low, Some(90.0));
    assert_eq!(systolic.range_high, Some(140.0));
    assert_eq!(diastolic.range_low, Some(60.0));
    assert_eq!(diastolic.range_high, Some(90.0));
}

#[test]
fn test_range_naming_absent_sibling_is_fatal() {
    let (mapper, backend) = seeded_mapper();
    let mut observation = bp_observation_systolic_only(120.0);
    observation.reference_range = vec![ReferenceRange {
        low: Some(Quantity::from_value(60.0)),
        high: Some(Quantity::from_value(90.0)),
        applies_to: vec![CodeableConcept::from_coding(Coding::from_system_code(
            LOINC, "8462-4",
        ))],
    }];

    let err = mapper.create(&observation).unwrap_err();
    assert!(matches!(err, MappingError::RangeWithoutValue { .. }));
    assert_eq!(backend.count(Partition::Measurement, &[]).unwrap(), 0);
}

#[test]
fn test_composite_without_components_is_fatal() {
    let (mapper, _backend) = seeded_mapper();
    let mut observation = bp_observation(120.0, 80.0);
    observation.component.clear();
    assert!(matches!(
        mapper.create(&observation).unwrap_err(),
        MappingError::MissingComponent
    ));
}

#[test]
fn test_date_search_reaches_the_pair_once() {
    let (mapper, _backend) = seeded_mapper();
    mapper.create(&bp_observation(120.0, 80.0)).unwrap();

    let results = mapper
        .search(
            &[SearchParam::Date {
                op: CompareOp::Eq,
                at: match fixture_instant() {
                    meridian_fhir::Effective::Instant(at) => at,
                    _ => unreachable!(),
                },
            }],
            &Pagination::unbounded(),
            None,
        )
        .unwrap();
    assert_eq!(results.len(), 1);
}
