//! Vocabulary concepts: the unit of semantic identity inside storage.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The storage domain a concept routes facts into.
///
/// The domain is a property of the vocabulary concept itself, maintained by
/// the terminology distribution, not by the mapping engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    /// Quantitative facts; rows land in the measurement partition.
    Measurement,
    /// Categorical and narrative facts; rows land in the observation partition.
    Observation,
    /// Any other domain (condition, drug, ...) the bridge does not route.
    Other(String),
}

impl Domain {
    /// Parses a domain label, case-insensitively.
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "measurement" => Domain::Measurement,
            "observation" => Domain::Observation,
            _ => Domain::Other(s.to_string()),
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Domain::Measurement => write!(f, "measurement"),
            Domain::Observation => write!(f, "observation"),
            Domain::Other(s) => write!(f, "{}", s),
        }
    }
}

/// A normalized vocabulary concept.
///
/// Concept id `0` is the well-known "unmapped" sentinel; rows carrying it
/// fall back to their source text for reconstruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Concept {
    /// Concept identifier; `0` means unmapped.
    pub id: i64,
    /// Identifier of the owning vocabulary, e.g. `LOINC` or `UCUM`.
    pub vocabulary_id: String,
    /// Code within the vocabulary.
    pub code: String,
    /// Preferred name.
    pub name: String,
    /// Storage domain the concept routes into.
    pub domain: Domain,
}

impl Concept {
    /// The unmapped sentinel concept.
    pub fn unmapped() -> Self {
        Concept {
            id: 0,
            vocabulary_id: String::new(),
            code: String::new(),
            name: "No matching concept".to_string(),
            domain: Domain::Other("none".to_string()),
        }
    }

    /// True for the unmapped sentinel.
    pub fn is_unmapped(&self) -> bool {
        self.id == 0
    }
}
