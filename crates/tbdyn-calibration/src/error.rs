use thiserror::Error;

/// Errors from prior fitting and posterior summarization.
#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("invalid gamma parameters (shape {shape}, scale {scale}): {reason}")]
    InvalidDistribution {
        shape: f64,
        scale: f64,
        reason: String,
    },

    /// Raised in strict mode when the prior fit fails to reach tolerance.
    #[error("prior fit residual {loss} exceeds tolerance {tol}, parameters may be inaccurate")]
    ToleranceExceeded { loss: f64, tol: f64 },

    #[error("optimization failed: {0}")]
    Optimization(String),

    #[error("trace has no usable draws for parameter '{0}'")]
    EmptyTrace(String),
}
