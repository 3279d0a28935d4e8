//! The canonical observation resource.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::element::{CodeableConcept, Quantity, Reference};

/// Lifecycle status of an observation.
///
/// The bridge always reconstructs stored facts as [`ObservationStatus::Final`];
/// inbound resources may carry any status but it is not persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ObservationStatus {
    Registered,
    Preliminary,
    #[default]
    Final,
    Amended,
    Cancelled,
    EnteredInError,
}

impl fmt::Display for ObservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ObservationStatus::Registered => "registered",
            ObservationStatus::Preliminary => "preliminary",
            ObservationStatus::Final => "final",
            ObservationStatus::Amended => "amended",
            ObservationStatus::Cancelled => "cancelled",
            ObservationStatus::EnteredInError => "entered-in-error",
        };
        write!(f, "{}", s)
    }
}

/// The `value[x]` choice: exactly one representation of the observed result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ObservationValue {
    /// A measured amount.
    #[serde(rename = "valueQuantity")]
    Quantity(Quantity),
    /// A coded categorical result.
    #[serde(rename = "valueCodeableConcept")]
    Concept(CodeableConcept),
    /// A narrative result.
    #[serde(rename = "valueString")]
    Text(String),
}

impl ObservationValue {
    /// True for [`ObservationValue::Quantity`].
    pub fn is_numeric(&self) -> bool {
        matches!(self, ObservationValue::Quantity(_))
    }
}

/// The `effective[x]` choice: when the observation applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effective {
    /// A single instant.
    #[serde(rename = "effectiveDateTime")]
    Instant(DateTime<Utc>),
    /// A bounded or half-open interval.
    #[serde(rename = "effectivePeriod")]
    Period {
        #[serde(skip_serializing_if = "Option::is_none")]
        start: Option<DateTime<Utc>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        end: Option<DateTime<Utc>>,
    },
}

impl Effective {
    /// The instant the fact store anchors on: the instant itself, or the
    /// period start.
    pub fn anchor(&self) -> Option<DateTime<Utc>> {
        match self {
            Effective::Instant(at) => Some(*at),
            Effective::Period { start, .. } => *start,
        }
    }
}

/// A component observation: one (code, value) pair inside a composite fact.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservationComponent {
    /// What was observed for this component.
    pub code: CodeableConcept,
    /// The component's result.
    #[serde(flatten)]
    pub value: Option<ObservationValue>,
}

/// A reference range for interpreting a measured value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceRange {
    /// Lower inclusive bound.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub low: Option<Quantity>,
    /// Upper inclusive bound.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub high: Option<Quantity>,
    /// The population or component the range applies to. For composite
    /// facts this names the sibling (e.g. the systolic LOINC code) that
    /// owns the bounds.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub applies_to: Vec<CodeableConcept>,
}

impl ReferenceRange {
    /// True when neither bound is present.
    pub fn is_empty(&self) -> bool {
        self.low.is_none() && self.high.is_none()
    }
}

/// Measurements and simple assertions made about a patient.
///
/// This is the immutable input/output shape of the bridge. `id` is the
/// logical identifier callers address the resource by; it is opaque to the
/// fact store, which keys rows by partition-local native ids.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    /// Logical identifier. Absent on resources that have never been stored.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Lifecycle status.
    #[serde(default)]
    pub status: ObservationStatus,
    /// Classification (e.g. laboratory, exam, survey).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub category: Vec<CodeableConcept>,
    /// What was observed.
    pub code: CodeableConcept,
    /// Who the observation is about.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<Reference>,
    /// The encounter during which the observation was made.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Reference>,
    /// When the observation applies.
    #[serde(flatten)]
    pub effective: Option<Effective>,
    /// Who made the observation.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub performer: Vec<Reference>,
    /// The observed result.
    #[serde(flatten)]
    pub value: Option<ObservationValue>,
    /// Guidance for interpreting the value.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reference_range: Vec<ReferenceRange>,
    /// Component results, used only for paired composite facts such as
    /// blood pressure.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub component: Vec<ObservationComponent>,
}

impl Observation {
    /// Creates an unstored observation for the given code.
    pub fn new(code: CodeableConcept) -> Self {
        Observation {
            code,
            ..Observation::default()
        }
    }
}
