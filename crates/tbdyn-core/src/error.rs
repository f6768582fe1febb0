use thiserror::Error;

/// Errors raised while assembling a model stratification.
///
/// Construction is a pure, deterministic step: nothing is recovered
/// internally and no partial configuration is returned on failure.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// A stratum holds the entire population, leaving no mass to mix with.
    #[error(
        "stratum '{stratum}' has no population mass outside itself, \
         between-strata mixing is undefined"
    )]
    DegenerateMixing { stratum: String },

    #[error("no proportion supplied for stratum '{stratum}'")]
    MissingProportion { stratum: String },

    #[error("flow '{flow}' adjustment is missing a factor for stratum '{stratum}'")]
    MissingFlowFactor { flow: String, stratum: String },

    #[error("stratum '{stratum}' is not part of this stratification")]
    UnknownStratum { stratum: String },

    #[error("invalid interpolation breakpoints: {reason}")]
    InvalidBreakpoints { reason: String },

    #[error("mixing matrix has {got} strata but the stratification has {expected}")]
    MixingMatrixSize { got: usize, expected: usize },
}
