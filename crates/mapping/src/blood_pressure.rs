//! The systolic/diastolic blood-pressure pair.
//!
//! The fact store keeps the two pressures as independent measurement rows
//! sharing person, date, and whole-second time, while callers exchange one
//! composite resource carrying both as components. The composite's
//! identity is the systolic row's; the diastolic row is reachable only
//! through the sibling join and is filtered out of listings.

use tracing::debug;

use meridian_cdm::{FactRow, Partition};
use meridian_fhir::{Observation, ObservationValue};

use crate::classify::{clear_value_columns, resolve_category, Classifier};
use crate::error::{MappingError, MappingResult};
use crate::identity::FactId;

/// Concept id of systolic blood pressure.
pub const SYSTOLIC_CONCEPT_ID: i64 = 3004249;
/// Concept id of diastolic blood pressure.
pub const DIASTOLIC_CONCEPT_ID: i64 = 3012888;
/// LOINC code of systolic blood pressure.
pub const SYSTOLIC_LOINC_CODE: &str = "8480-6";
/// LOINC code of diastolic blood pressure.
pub const DIASTOLIC_LOINC_CODE: &str = "8462-4";
/// The combined panel code callers use for the composite resource.
pub const BP_COMBINED_CODE: &str = "85354-9";
/// Display text of the combined panel code.
pub const BP_COMBINED_DISPLAY: &str = "Blood pressure systolic & diastolic";

impl Classifier {
    /// Builds the paired measurement rows for a combined blood-pressure
    /// resource: up to two on create, the stored pair (located via the
    /// sibling join) on update. Returns systolic first.
    pub(crate) fn classify_blood_pressure(
        &self,
        resource: &Observation,
        existing: Option<FactId>,
        person_id: i64,
    ) -> MappingResult<Vec<FactRow>> {
        let systolic_value = self.component_value(resource, SYSTOLIC_LOINC_CODE);
        let diastolic_value = self.component_value(resource, DIASTOLIC_LOINC_CODE);
        if systolic_value.is_none() && diastolic_value.is_none() {
            return Err(MappingError::MissingComponent);
        }

        let (stored_systolic, stored_diastolic) = match existing {
            Some(fact_id) => self.load_pair(resource, fact_id)?,
            None => (None, None),
        };

        let mut systolic = match systolic_value {
            Some(value) => Some(self.build_half(
                SYSTOLIC_CONCEPT_ID,
                SYSTOLIC_LOINC_CODE,
                stored_systolic,
                value,
                person_id,
            )?),
            None => None,
        };
        let mut diastolic = match diastolic_value {
            Some(value) => Some(self.build_half(
                DIASTOLIC_CONCEPT_ID,
                DIASTOLIC_LOINC_CODE,
                stored_diastolic,
                value,
                person_id,
            )?),
            None => None,
        };

        self.distribute_ranges(resource, systolic.as_mut(), diastolic.as_mut())?;

        let type_concept_id = resolve_category(resource);
        for row in [systolic.as_mut(), diastolic.as_mut()].into_iter().flatten() {
            self.apply_effective(row, resource);
            self.apply_visit(row, resource)?;
            self.apply_performer(row, resource)?;
            row.type_concept_id = type_concept_id;
        }

        debug!(
            systolic = systolic.is_some(),
            diastolic = diastolic.is_some(),
            "classified blood-pressure pair"
        );

        Ok([systolic, diastolic].into_iter().flatten().collect())
    }

    /// The value of the component coded with the given LOINC code, if any.
    fn component_value<'r>(
        &self,
        resource: &'r Observation,
        loinc_code: &str,
    ) -> Option<&'r ObservationValue> {
        resource.component.iter().find_map(|component| {
            let coded = component.code.coding.iter().any(|coding| {
                coding.system.as_deref() == Some(self.config.preferred_system_uri.as_str())
                    && coding.code.as_deref() == Some(loinc_code)
            });
            if coded { component.value.as_ref() } else { None }
        })
    }

    /// On update, loads the addressed row, decides which half of the pair
    /// it is, and locates its sibling through the (person, date, time)
    /// join. A row outside the pair is an [`MappingError::InconsistentPairing`].
    fn load_pair(
        &self,
        resource: &Observation,
        fact_id: FactId,
    ) -> MappingResult<(Option<FactRow>, Option<FactRow>)> {
        let row = self.load_existing(resource, fact_id)?;
        let sibling_concept = match row.concept_id {
            SYSTOLIC_CONCEPT_ID => DIASTOLIC_CONCEPT_ID,
            DIASTOLIC_CONCEPT_ID => SYSTOLIC_CONCEPT_ID,
            found => {
                return Err(MappingError::InconsistentPairing {
                    expected: SYSTOLIC_CONCEPT_ID,
                    found,
                });
            }
        };

        let sibling = match row.date {
            Some(date) => self.facts.find_sibling(
                Partition::Measurement,
                sibling_concept,
                row.person_id,
                date,
                row.time.as_deref(),
            )?,
            None => None,
        };

        if row.concept_id == SYSTOLIC_CONCEPT_ID {
            Ok((Some(row), sibling))
        } else {
            Ok((sibling, Some(row)))
        }
    }

    /// One half of the pair: reuse the stored row when present, else start
    /// a fresh one whose source value records the component's LOINC code.
    fn build_half(
        &self,
        concept_id: i64,
        loinc_code: &str,
        stored: Option<FactRow>,
        value: &ObservationValue,
        person_id: i64,
    ) -> MappingResult<FactRow> {
        let mut row = match stored {
            Some(mut row) => {
                clear_value_columns(&mut row);
                row
            }
            None => FactRow::default(),
        };
        row.concept_id = concept_id;
        row.person_id = person_id;
        row.source_value = Some(loinc_code.to_string());

        match value {
            ObservationValue::Quantity(quantity) => self.convert_quantity(&mut row, quantity)?,
            ObservationValue::Concept(concept) => self.convert_coded_value(&mut row, concept)?,
            ObservationValue::Text(_) => {
                return Err(MappingError::InvalidComponentValue {
                    code: loinc_code.to_string(),
                });
            }
        }
        Ok(row)
    }

    /// Walks the reference ranges and applies each bound to the pair
    /// member its `applies_to` code names. Naming an absent member is an
    /// [`MappingError::RangeWithoutValue`].
    fn distribute_ranges<'a>(
        &self,
        resource: &Observation,
        mut systolic: Option<&'a mut FactRow>,
        mut diastolic: Option<&'a mut FactRow>,
    ) -> MappingResult<()> {
        for range in &resource.reference_range {
            if range.is_empty() {
                continue;
            }
            let low = range.low.as_ref().map(|q| q.value);
            let high = range.high.as_ref().map(|q| q.value);

            for concept in &range.applies_to {
                for coding in &concept.coding {
                    if coding.system.as_deref() != Some(self.config.preferred_system_uri.as_str())
                    {
                        continue;
                    }
                    let target = match coding.code.as_deref() {
                        Some(SYSTOLIC_LOINC_CODE) => &mut systolic,
                        Some(DIASTOLIC_LOINC_CODE) => &mut diastolic,
                        _ => continue,
                    };
                    match target.as_deref_mut() {
                        Some(row) => {
                            if low.is_some() {
                                row.range_low = low;
                            }
                            if high.is_some() {
                                row.range_high = high;
                            }
                        }
                        None => {
                            return Err(MappingError::RangeWithoutValue {
                                code: coding.code.clone().unwrap_or_default(),
                            });
                        }
                    }
                }
            }
        }
        Ok(())
    }
}
