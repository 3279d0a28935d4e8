//! Search parameter compilation.
//!
//! Translates external search parameters into the backend-agnostic
//! predicate tree, reproducing the write side's partition and pairing
//! semantics: the combined blood-pressure code is rewritten to the
//! systolic row, identifier lookups honor the signed partition encoding,
//! and every listing excludes bare diastolic rows.

use chrono::{DateTime, Utc};
use tracing::warn;

use meridian_cdm::{
    split_instant, CompareOp, Constraint, Field, Junction, Partition, Predicate,
};

use crate::blood_pressure::{BP_COMBINED_CODE, DIASTOLIC_CONCEPT_ID, SYSTOLIC_LOINC_CODE};
use crate::config::MapperConfig;
use crate::error::{MappingError, MappingResult};
use crate::identity::IdentityMapper;
use crate::vocabulary::VocabularyResolver;

/// A recognized external search parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchParam {
    /// Equality on the logical observation identifier.
    Identifier(i64),
    /// Comparison against the effective instant.
    Date { op: CompareOp, at: DateTime<Utc> },
    /// Token search on the fact code, with an optional system URI.
    Code {
        system: Option<String>,
        code: Option<String>,
    },
    /// Equality on the logical patient identifier of the subject.
    Patient(i64),
    /// Substring match on the subject's name.
    PatientName(String),
    /// Anything the engine does not recognize. Compiles to no constraint
    /// unless strict parameter handling is configured.
    Other { name: String, value: String },
}

/// Compiles search parameters into predicate clauses.
///
/// Stateless between calls; the resolver and identity mapper it holds are
/// read-only collaborators.
pub struct PredicateCompiler {
    resolver: VocabularyResolver,
    identity: IdentityMapper,
    config: MapperConfig,
}

impl PredicateCompiler {
    pub fn new(resolver: VocabularyResolver, identity: IdentityMapper, config: MapperConfig) -> Self {
        PredicateCompiler {
            resolver,
            identity,
            config,
        }
    }

    /// Compiles one parameter for one partition.
    ///
    /// Partition matters only for identifier equality, where the signed
    /// encoding pins the logical id to a single partition; the other
    /// clause shapes are partition-independent.
    pub fn compile(
        &self,
        param: &SearchParam,
        partition: Partition,
    ) -> MappingResult<Vec<Predicate>> {
        match param {
            SearchParam::Identifier(logical_id) => self.compile_identifier(*logical_id, partition),
            SearchParam::Date { op, at } => Ok(compile_date(*op, *at)),
            SearchParam::Code { system, code } => {
                self.compile_code(system.as_deref(), code.as_deref())
            }
            SearchParam::Patient(logical_id) => self.compile_patient(*logical_id),
            SearchParam::PatientName(name) => Ok(vec![Predicate::any(vec![Constraint::new(
                Field::PersonName,
                CompareOp::Contains,
                name.as_str(),
            )])]),
            SearchParam::Other { name, value } => {
                if self.config.strict_search_params {
                    return Err(MappingError::UnsupportedSearchParameter { name: name.clone() });
                }
                warn!(parameter = %name, value = %value, "unrecognized search parameter ignored");
                Ok(Vec::new())
            }
        }
    }

    /// The listing filter that keeps bare diastolic rows out of
    /// measurement-partition results; appended unconditionally to every
    /// search and count.
    pub fn diastolic_exclusion() -> Predicate {
        Predicate::any(vec![Constraint::new(
            Field::ConceptId,
            CompareOp::Ne,
            DIASTOLIC_CONCEPT_ID,
        )])
    }

    fn compile_identifier(
        &self,
        logical_id: i64,
        partition: Partition,
    ) -> MappingResult<Vec<Predicate>> {
        match self.identity.fact_id(logical_id) {
            Ok(fact_id) if fact_id.partition() == partition => {
                Ok(vec![Predicate::any(vec![Constraint::new(
                    Field::NativeId,
                    CompareOp::Eq,
                    fact_id.native_id(),
                )])
                .outer(Junction::Or)])
            }
            // The id lives in the other partition, or was never assigned:
            // nothing here can match it.
            Ok(_) | Err(MappingError::IdentityNotFound { .. }) => Ok(vec![unsatisfiable()]),
            Err(err) => Err(err),
        }
    }

    fn compile_patient(&self, logical_id: i64) -> MappingResult<Vec<Predicate>> {
        match self.identity.person_id(logical_id) {
            Ok(person_id) => Ok(vec![Predicate::any(vec![Constraint::new(
                Field::PersonId,
                CompareOp::Eq,
                person_id,
            )])]),
            Err(MappingError::IdentityNotFound { .. }) => Ok(vec![unsatisfiable()]),
            Err(err) => Err(err),
        }
    }

    /// Token compilation with the pairing rewrite: searching for the
    /// combined panel code finds the systolic rows, mirroring the split
    /// performed on write.
    fn compile_code(
        &self,
        system: Option<&str>,
        code: Option<&str>,
    ) -> MappingResult<Vec<Predicate>> {
        let system = system.filter(|s| !s.is_empty());
        let code = code.filter(|c| !c.is_empty());

        let Some(system) = system else {
            return Ok(match code {
                // No system: match the code across every vocabulary.
                Some(code) => vec![Predicate::any(vec![Constraint::new(
                    Field::ConceptCode,
                    CompareOp::Eq,
                    rewrite_combined(code),
                )])],
                None => Vec::new(),
            });
        };

        let Some(vocabulary) = self.resolver.vocabulary_for_system(system)? else {
            warn!(system, "unknown coding system in code search");
            return Ok(vec![unsatisfiable()]);
        };

        Ok(match code {
            Some(code) => {
                let code = if vocabulary == self.config.preferred_vocabulary {
                    rewrite_combined(code)
                } else {
                    code
                };
                vec![Predicate::all(vec![
                    Constraint::new(Field::ConceptVocabulary, CompareOp::Eq, vocabulary),
                    Constraint::new(Field::ConceptCode, CompareOp::Eq, code),
                ])]
            }
            None => vec![Predicate::any(vec![Constraint::new(
                Field::ConceptVocabulary,
                CompareOp::Eq,
                vocabulary,
            )])],
        })
    }
}

/// Date compilation: the instant splits into a date clause and a
/// time-of-day clause carrying the same operator, AND-joined. Known
/// limitation: for `>`/`<` the time clause also constrains the time of
/// day on every matching date, not just the boundary date.
fn compile_date(op: CompareOp, at: DateTime<Utc>) -> Vec<Predicate> {
    let (date, time) = split_instant(at);
    vec![
        Predicate::all(vec![Constraint::new(Field::Date, op, date)]),
        Predicate::all(vec![Constraint::new(Field::Time, op, time)]),
    ]
}

/// A clause no row satisfies; native keys start at 1.
fn unsatisfiable() -> Predicate {
    Predicate::all(vec![Constraint::new(Field::NativeId, CompareOp::Eq, 0i64)])
}

fn rewrite_combined(code: &str) -> &str {
    if code == BP_COMBINED_CODE {
        SYSTOLIC_LOINC_CODE
    } else {
        code
    }
}
