//! Canonical clinical resource model for the Meridian bridge.
//!
//! This crate contains the externally visible, resource-oriented
//! representation of clinical observations: the nested, code-system-driven
//! shape exchanged with callers of the bridge. It is a pure data model -
//! all translation to and from the partitioned fact store lives in
//! `meridian-mapping`.
//!
//! The types serialize to and from FHIR-style JSON (`valueQuantity`,
//! `effectiveDateTime`, `"Patient/42"` references) via serde.

mod element;
mod observation;

pub use element::{CodeableConcept, Coding, Quantity, Reference, ResourceKind};
pub use observation::{
    Effective, Observation, ObservationComponent, ObservationStatus, ObservationValue,
    ReferenceRange,
};
