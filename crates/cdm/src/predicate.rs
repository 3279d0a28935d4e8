//! Backend-agnostic filter expressions for fact searches.
//!
//! A search compiles to a list of [`Predicate`]s. Each predicate holds one
//! or more field constraints joined by an intra-clause [`Junction`], and an
//! outer junction saying how the predicate combines with the clauses before
//! it. Backends translate the tree into their native query language; the
//! embedded [`MemoryBackend`](crate::memory::MemoryBackend) evaluates it
//! directly against rows.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A filterable field of a fact row or its joined entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    /// The row's native key.
    NativeId,
    /// The row's resolved concept id.
    ConceptId,
    /// The owning vocabulary of the row's concept (joined).
    ConceptVocabulary,
    /// The code of the row's concept (joined).
    ConceptCode,
    /// The fact date column.
    Date,
    /// The formatted time-of-day column.
    Time,
    /// The person the fact is about.
    PersonId,
    /// Any name component of the linked person (joined).
    PersonName,
    /// The source fallback text of an unresolved fact code.
    SourceValue,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Field::NativeId => "id",
            Field::ConceptId => "concept_id",
            Field::ConceptVocabulary => "concept.vocabulary_id",
            Field::ConceptCode => "concept.code",
            Field::Date => "date",
            Field::Time => "time",
            Field::PersonId => "person_id",
            Field::PersonName => "person.name",
            Field::SourceValue => "source_value",
        };
        write!(f, "{}", s)
    }
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// Case-insensitive substring match; string fields only.
    Contains,
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Contains => "contains",
        };
        write!(f, "{}", s)
    }
}

/// A typed comparison value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterValue {
    Integer(i64),
    Number(f64),
    Text(String),
    Date(NaiveDate),
}

impl From<i64> for FilterValue {
    fn from(v: i64) -> Self {
        FilterValue::Integer(v)
    }
}

impl From<&str> for FilterValue {
    fn from(v: &str) -> Self {
        FilterValue::Text(v.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(v: String) -> Self {
        FilterValue::Text(v)
    }
}

impl From<NaiveDate> for FilterValue {
    fn from(v: NaiveDate) -> Self {
        FilterValue::Date(v)
    }
}

/// How constraints or clauses combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Junction {
    And,
    Or,
}

/// One field comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    pub field: Field,
    pub op: CompareOp,
    pub value: FilterValue,
}

impl Constraint {
    pub fn new(field: Field, op: CompareOp, value: impl Into<FilterValue>) -> Self {
        Constraint {
            field,
            op,
            value: value.into(),
        }
    }
}

/// One filter clause: constraints joined by `within`, combined with the
/// preceding clauses by `outer`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    pub constraints: Vec<Constraint>,
    /// Intra-clause junction.
    pub within: Junction,
    /// Junction against the preceding clauses.
    pub outer: Junction,
}

impl Predicate {
    /// A clause whose constraints must all hold.
    pub fn all(constraints: Vec<Constraint>) -> Self {
        Predicate {
            constraints,
            within: Junction::And,
            outer: Junction::And,
        }
    }

    /// A clause where any constraint may hold.
    pub fn any(constraints: Vec<Constraint>) -> Self {
        Predicate {
            constraints,
            within: Junction::Or,
            outer: Junction::And,
        }
    }

    /// Sets the outer junction.
    pub fn outer(mut self, outer: Junction) -> Self {
        self.outer = outer;
        self
    }
}

/// Result-window selection for searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Pagination {
    /// Rows to skip.
    pub offset: usize,
    /// Maximum rows to return; `None` means unbounded.
    pub limit: Option<usize>,
}

impl Pagination {
    /// The full, unwindowed result set.
    pub fn unbounded() -> Self {
        Pagination::default()
    }

    pub fn new(offset: usize, limit: usize) -> Self {
        Pagination {
            offset,
            limit: Some(limit),
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// Result ordering for searches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sort {
    pub field: Field,
    pub order: SortOrder,
}

impl Sort {
    pub fn ascending(field: Field) -> Self {
        Sort {
            field,
            order: SortOrder::Ascending,
        }
    }

    pub fn descending(field: Field) -> Self {
        Sort {
            field,
            order: SortOrder::Descending,
        }
    }
}
