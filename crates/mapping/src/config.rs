//! Engine configuration.

/// Tunables for the mapping engine.
///
/// The defaults reproduce the deployed behavior: LOINC-first code
/// resolution, UCUM for bare unit codes, and unknown search parameters
/// ignored rather than rejected.
#[derive(Debug, Clone)]
pub struct MapperConfig {
    /// Vocabulary whose codings win code resolution outright.
    pub preferred_vocabulary: String,
    /// Coding-system URI of the preferred vocabulary. Carried in config so
    /// composite detection works even before the cross-reference table is
    /// seeded.
    pub preferred_system_uri: String,
    /// Vocabulary assumed for unit codes that arrive without a system URI.
    pub default_unit_vocabulary: String,
    /// When true, `search` rejects unrecognized parameters instead of
    /// compiling them to no constraint.
    pub strict_search_params: bool,
}

impl Default for MapperConfig {
    fn default() -> Self {
        MapperConfig {
            preferred_vocabulary: "LOINC".to_string(),
            preferred_system_uri: "http://loinc.org".to_string(),
            default_unit_vocabulary: "UCUM".to_string(),
            strict_search_params: false,
        }
    }
}
