//! The flat fact row shared by both storage partitions.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Storage format of the time-of-day column (whole seconds).
pub const TIME_FORMAT: &str = "%H:%M:%S";

/// The two physical partitions clinical facts are stored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Partition {
    /// Quantitative facts.
    Measurement,
    /// Categorical and narrative facts.
    Observation,
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Partition::Measurement => write!(f, "measurement"),
            Partition::Observation => write!(f, "observation"),
        }
    }
}

/// One stored clinical fact.
///
/// Both partitions share this shape. At most one of `value_as_number`,
/// `value_as_concept_id`, and `value_source_value` is authoritative;
/// `value_source_value` doubles as the raw capture of a numeric or coded
/// value. `source_value` holds the `"system code display"` fallback when
/// the fact's code did not resolve (`concept_id == 0`).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FactRow {
    /// Native key within the owning partition; `None` until first upsert.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Resolved vocabulary concept; `0` means unmapped.
    pub concept_id: i64,
    /// Numeric value, for quantitative facts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_as_number: Option<f64>,
    /// Coded value, for categorical facts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_as_concept_id: Option<i64>,
    /// Raw value capture; authoritative only when the other two are absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_source_value: Option<String>,
    /// Resolved unit concept.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_concept_id: Option<i64>,
    /// Raw unit string as supplied by the caller.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_source_value: Option<String>,
    /// Reference range, lower bound.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range_low: Option<f64>,
    /// Reference range, upper bound.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range_high: Option<f64>,
    /// Fact date; absent when the source resource carried no effective time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    /// Time of day, `%H:%M:%S`-formatted. The partition schema stores the
    /// timestamp split this way; use [`split_instant`] and
    /// [`join_date_time`] rather than formatting inline.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    /// The person the fact is about.
    pub person_id: i64,
    /// The visit the fact was recorded in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visit_id: Option<i64>,
    /// The provider who recorded the fact.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<i64>,
    /// Category concept; `0` means unknown.
    pub type_concept_id: i64,
    /// Source fallback for an unresolved fact code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_value: Option<String>,
}

impl FactRow {
    /// A row for the given person and concept, otherwise empty.
    pub fn new(concept_id: i64, person_id: i64) -> Self {
        FactRow {
            concept_id,
            person_id,
            ..FactRow::default()
        }
    }

    /// Sets the split date/time columns from an instant.
    pub fn set_instant(&mut self, at: DateTime<Utc>) {
        let (date, time) = split_instant(at);
        self.date = Some(date);
        self.time = Some(time);
    }

    /// The fact's instant, re-joined from the split date and time columns.
    ///
    /// A missing time yields midnight; an unparseable time yields `None`
    /// (callers treat that as "no effective time", never as an error).
    pub fn instant(&self) -> Option<DateTime<Utc>> {
        join_date_time(self.date?, self.time.as_deref())
    }
}

/// Splits an instant into the storage date and `%H:%M:%S` time columns.
pub fn split_instant(at: DateTime<Utc>) -> (NaiveDate, String) {
    let naive = at.naive_utc();
    (naive.date(), naive.time().format(TIME_FORMAT).to_string())
}

/// Re-joins split date/time columns into an instant.
///
/// `None` or empty time means midnight. A malformed time string yields
/// `None` so readers can degrade to a date-less resource.
pub fn join_date_time(date: NaiveDate, time: Option<&str>) -> Option<DateTime<Utc>> {
    let time = match time {
        None | Some("") => NaiveTime::MIN,
        Some(s) => NaiveTime::parse_from_str(s, TIME_FORMAT).ok()?,
    };
    Some(Utc.from_utc_datetime(&date.and_time(time)))
}
