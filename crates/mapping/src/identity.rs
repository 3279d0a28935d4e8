//! Identity translation between logical identifiers and partitioned
//! native keys.
//!
//! Callers address every clinical fact through one logical `Observation`
//! identifier, while storage keys rows per partition. Internally the
//! partition tag is explicit ([`FactId`]); the legacy signed-integer
//! encoding (positive = measurement, negative = observation) appears only
//! at the identity-store boundary, where bit-compatibility with the
//! deployed identifier scheme is required.

use std::sync::Arc;

use meridian_cdm::{IdentityStore, Partition, StorageResult};
use meridian_fhir::ResourceKind;

use crate::error::{MappingError, MappingResult};

/// A partition-tagged native row key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FactId {
    Measurement(i64),
    Observation(i64),
}

impl FactId {
    /// Builds a fact id from a partition and native key.
    pub fn new(partition: Partition, native_id: i64) -> Self {
        match partition {
            Partition::Measurement => FactId::Measurement(native_id),
            Partition::Observation => FactId::Observation(native_id),
        }
    }

    /// The partition this id addresses.
    pub fn partition(&self) -> Partition {
        match self {
            FactId::Measurement(_) => Partition::Measurement,
            FactId::Observation(_) => Partition::Observation,
        }
    }

    /// The native key within the partition.
    pub fn native_id(&self) -> i64 {
        match self {
            FactId::Measurement(id) | FactId::Observation(id) => *id,
        }
    }

    /// Encodes to the signed wire form: measurement keys keep their sign,
    /// observation keys are negated.
    pub fn to_signed(self) -> i64 {
        match self {
            FactId::Measurement(id) => id,
            FactId::Observation(id) => -id,
        }
    }

    /// Decodes the signed wire form; the magnitude is the native key and
    /// the sign selects the partition.
    pub fn from_signed(signed: i64) -> Self {
        if signed < 0 {
            FactId::Observation(-signed)
        } else {
            FactId::Measurement(signed)
        }
    }
}

/// Bidirectional logical/internal identifier translation.
#[derive(Clone)]
pub struct IdentityMapper {
    store: Arc<dyn IdentityStore>,
}

impl IdentityMapper {
    pub fn new(store: Arc<dyn IdentityStore>) -> Self {
        IdentityMapper { store }
    }

    /// Resolves a logical observation id to its fact id.
    ///
    /// Fails with [`MappingError::IdentityNotFound`] when the logical id
    /// has never been assigned.
    pub fn fact_id(&self, logical_id: i64) -> MappingResult<FactId> {
        let signed = self
            .store
            .internal_for_logical(ResourceKind::Observation, logical_id)?
            .ok_or(MappingError::IdentityNotFound {
                kind: ResourceKind::Observation,
                logical_id,
            })?;
        Ok(FactId::from_signed(signed))
    }

    /// The logical id already assigned to a fact, if any.
    pub fn logical_for_fact(&self, fact_id: FactId) -> StorageResult<Option<i64>> {
        self.store
            .logical_for_internal(ResourceKind::Observation, fact_id.to_signed())
    }

    /// The logical id for a fact, allocated on first use.
    pub fn allocate_fact(&self, fact_id: FactId) -> StorageResult<i64> {
        self.store
            .allocate(ResourceKind::Observation, fact_id.to_signed())
    }

    /// Resolves a logical patient id to the native person key.
    pub fn person_id(&self, logical_id: i64) -> MappingResult<i64> {
        self.store
            .internal_for_logical(ResourceKind::Patient, logical_id)?
            .ok_or(MappingError::IdentityNotFound {
                kind: ResourceKind::Patient,
                logical_id,
            })
    }

    /// Resolves a logical encounter id to the native visit key.
    ///
    /// A miss is reported as [`MappingError::EncounterNotFound`]: the
    /// caller named a context that does not exist.
    pub fn visit_id(&self, logical_id: i64) -> MappingResult<i64> {
        self.store
            .internal_for_logical(ResourceKind::Encounter, logical_id)?
            .ok_or(MappingError::EncounterNotFound { logical_id })
    }

    /// Resolves a logical practitioner id to the native provider key.
    /// Performer references are optional context; a miss is a `None`,
    /// not an error.
    pub fn provider_id(&self, logical_id: i64) -> StorageResult<Option<i64>> {
        self.store
            .internal_for_logical(ResourceKind::Practitioner, logical_id)
    }

    /// The logical id of a related (non-observation) entity, falling back
    /// to the native key when no mapping was ever recorded.
    pub fn logical_for_related(&self, kind: ResourceKind, internal_id: i64) -> StorageResult<i64> {
        Ok(self
            .store
            .logical_for_internal(kind, internal_id)?
            .unwrap_or(internal_id))
    }
}
