//! Shared datatype elements used by the observation resource.

use std::fmt;
use std::str::FromStr;

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A reference to a code defined by a terminology system.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coding {
    /// Identity of the terminology system, as a URI.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    /// Symbol in the syntax defined by the system.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Representation defined by the system.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

impl Coding {
    /// Creates a coding with all three parts populated.
    pub fn new(
        system: impl Into<String>,
        code: impl Into<String>,
        display: impl Into<String>,
    ) -> Self {
        Coding {
            system: Some(system.into()),
            code: Some(code.into()),
            display: Some(display.into()),
        }
    }

    /// Creates a coding carrying only a system and code.
    pub fn from_system_code(system: impl Into<String>, code: impl Into<String>) -> Self {
        Coding {
            system: Some(system.into()),
            code: Some(code.into()),
            display: None,
        }
    }
}

/// A concept, expressed as one or more codings plus an optional free-text label.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeableConcept {
    /// Codes defined by terminology systems, in caller order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub coding: Vec<Coding>,
    /// Plain-text representation of the concept.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl CodeableConcept {
    /// Creates a concept from a single coding.
    pub fn from_coding(coding: Coding) -> Self {
        CodeableConcept {
            coding: vec![coding],
            text: None,
        }
    }

    /// The first coding, if any.
    pub fn first_coding(&self) -> Option<&Coding> {
        self.coding.first()
    }

    /// True when the concept carries neither codings nor text.
    pub fn is_empty(&self) -> bool {
        self.coding.is_empty() && self.text.is_none()
    }
}

impl From<Coding> for CodeableConcept {
    fn from(coding: Coding) -> Self {
        CodeableConcept::from_coding(coding)
    }
}

/// A measured amount: a numeric value with an optional coded unit.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quantity {
    /// Numerical value.
    pub value: f64,
    /// Human-readable unit representation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// System that defines the coded unit form, as a URI.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    /// Coded form of the unit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl Quantity {
    /// A bare numeric quantity without unit information.
    pub fn from_value(value: f64) -> Self {
        Quantity {
            value,
            ..Quantity::default()
        }
    }

    /// A quantity with a human-readable unit only.
    pub fn with_unit(value: f64, unit: impl Into<String>) -> Self {
        Quantity {
            value,
            unit: Some(unit.into()),
            ..Quantity::default()
        }
    }
}

/// The kinds of resources the bridge exchanges or references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Observation,
    Patient,
    Encounter,
    Practitioner,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Observation => write!(f, "Observation"),
            ResourceKind::Patient => write!(f, "Patient"),
            ResourceKind::Encounter => write!(f, "Encounter"),
            ResourceKind::Practitioner => write!(f, "Practitioner"),
        }
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Observation" => Ok(ResourceKind::Observation),
            "Patient" => Ok(ResourceKind::Patient),
            "Encounter" => Ok(ResourceKind::Encounter),
            "Practitioner" => Ok(ResourceKind::Practitioner),
            _ => Err(format!("unknown resource kind: {}", s)),
        }
    }
}

/// A typed reference to another resource, e.g. `Patient/42`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Kind of the referenced resource.
    pub kind: ResourceKind,
    /// Logical identifier of the referenced resource.
    pub id: i64,
    /// Text alternative for the target, e.g. a person's name.
    pub display: Option<String>,
}

impl Reference {
    /// Creates a reference without display text.
    pub fn new(kind: ResourceKind, id: i64) -> Self {
        Reference {
            kind,
            id,
            display: None,
        }
    }

    /// Attaches display text to the reference.
    pub fn with_display(mut self, display: impl Into<String>) -> Self {
        self.display = Some(display.into());
        self
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

impl FromStr for Reference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, id) = s
            .split_once('/')
            .ok_or_else(|| format!("invalid reference: {}", s))?;
        let kind = kind.parse::<ResourceKind>()?;
        let id = id
            .parse::<i64>()
            .map_err(|_| format!("non-numeric reference id: {}", s))?;
        Ok(Reference {
            kind,
            id,
            display: None,
        })
    }
}

/// Wire shape for [`Reference`]: `{"reference": "Patient/42", "display": "..."}`.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReferenceRepr {
    reference: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    display: Option<String>,
}

impl Serialize for Reference {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        ReferenceRepr {
            reference: self.to_string(),
            display: self.display.clone(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Reference {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let repr = ReferenceRepr::deserialize(deserializer)?;
        let mut reference = repr.reference.parse::<Reference>().map_err(DeError::custom)?;
        reference.display = repr.display;
        Ok(reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reference_round_trip() {
        let reference = Reference::new(ResourceKind::Patient, 42).with_display("John Smith");
        let value = serde_json::to_value(&reference).unwrap();
        assert_eq!(
            value,
            json!({"reference": "Patient/42", "display": "John Smith"})
        );

        let parsed: Reference = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, reference);
    }

    #[test]
    fn test_reference_rejects_non_numeric_id() {
        let result: Result<Reference, _> =
            serde_json::from_value(json!({"reference": "Patient/abc"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_codeable_concept_first_coding() {
        let concept = CodeableConcept {
            coding: vec![
                Coding::from_system_code("http://loinc.org", "8480-6"),
                Coding::from_system_code("http://snomed.info/sct", "271649006"),
            ],
            text: None,
        };
        assert_eq!(
            concept.first_coding().and_then(|c| c.code.as_deref()),
            Some("8480-6")
        );
    }

    #[test]
    fn test_quantity_serializes_camel_case() {
        let quantity = Quantity {
            value: 120.0,
            unit: Some("mmHg".into()),
            system: Some("http://unitsofmeasure.org".into()),
            code: Some("mm[Hg]".into()),
        };
        let value = serde_json::to_value(&quantity).unwrap();
        assert_eq!(value["value"], json!(120.0));
        assert_eq!(value["code"], json!("mm[Hg]"));
    }
}
