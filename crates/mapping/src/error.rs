//! Error types for mapping operations.
//!
//! Vocabulary misses are not errors - unmapped codes fall back to source
//! text. Everything here is fatal for the single logical operation it
//! occurs in: the operation aborts whole, and no partial write of a
//! composite pair is reported as success.

use thiserror::Error;

use meridian_cdm::StorageError;
use meridian_fhir::ResourceKind;

/// The error type for mapping operations.
#[derive(Error, Debug)]
pub enum MappingError {
    /// A coded *value* (not the fact code) has no resolvable concept.
    /// Fact codes fall back to source text; values never do.
    #[error("unmappable coded value: {system}|{code}")]
    UnmappableCodedValue { system: String, code: String },

    /// A referenced related entity has never been assigned an identity.
    #[error("no {kind} identity for logical id {logical_id}")]
    IdentityNotFound {
        kind: ResourceKind,
        logical_id: i64,
    },

    /// The encounter named in the resource's context does not exist.
    #[error("encounter context not found: Encounter/{logical_id}")]
    EncounterNotFound { logical_id: i64 },

    /// A blood-pressure update addressed a row that is not part of the
    /// expected systolic/diastolic pair.
    #[error("inconsistent pairing: expected concept {expected}, found {found}")]
    InconsistentPairing { expected: i64, found: i64 },

    /// A reference range names a pair member that carries no value.
    #[error("reference range applies to {code} but that component has no value")]
    RangeWithoutValue { code: String },

    /// A composite resource carries neither a systolic nor a diastolic
    /// component value.
    #[error("composite observation has no systolic or diastolic component value")]
    MissingComponent,

    /// A component value is neither a quantity nor a coded concept.
    #[error("component {code} must carry a quantity or coded value")]
    InvalidComponentValue { code: String },

    /// The resource has no subject reference.
    #[error("observation requires a subject")]
    MissingSubject,

    /// The subject reference is not a Patient.
    #[error("subject must reference a Patient, got {kind}")]
    InvalidSubject { kind: ResourceKind },

    /// Update or read addressed a resource that does not exist.
    #[error("no stored observation for logical id {logical_id}")]
    NotFound { logical_id: i64 },

    /// An unrecognized search parameter, under strict parameter handling.
    #[error("unsupported search parameter: {name}")]
    UnsupportedSearchParameter { name: String },

    /// A store collaborator failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Result type alias for mapping operations.
pub type MappingResult<T> = Result<T, MappingError>;
