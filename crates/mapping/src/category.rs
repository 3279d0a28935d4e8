//! The fixed category code table.
//!
//! Observation categories map to a small, closed set of type concepts.
//! The reverse direction folds several historical type concepts onto the
//! same category code, so the two functions are intentionally not inverses.

/// Coding system of observation category codes.
pub const OBSERVATION_CATEGORY_SYSTEM: &str = "http://hl7.org/fhir/observation-category";

/// Type concept recorded for facts from a physical examination.
pub const TYPE_CONCEPT_EXAM: i64 = 44818701;
/// Type concept recorded for laboratory results.
pub const TYPE_CONCEPT_LAB: i64 = 44818702;
/// Type concept recorded for survey answers.
pub const TYPE_CONCEPT_SURVEY: i64 = 45905771;

/// The type concept a category code maps to, if any.
pub fn type_concept_for_category(code: &str) -> Option<i64> {
    match code {
        "exam" => Some(TYPE_CONCEPT_EXAM),
        "laboratory" => Some(TYPE_CONCEPT_LAB),
        "survey" => Some(TYPE_CONCEPT_SURVEY),
        _ => None,
    }
}

/// The category code a stored type concept reads back as, if any.
///
/// Folds the legacy lab-result (38000277, 38000278) and examination
/// (38000280, 38000281) type concepts onto their modern category codes.
pub fn category_for_type_concept(type_concept_id: i64) -> Option<&'static str> {
    match type_concept_id {
        TYPE_CONCEPT_EXAM | 38000280 | 38000281 => Some("exam"),
        TYPE_CONCEPT_LAB | 38000277 | 38000278 => Some("laboratory"),
        TYPE_CONCEPT_SURVEY => Some("survey"),
        _ => None,
    }
}
