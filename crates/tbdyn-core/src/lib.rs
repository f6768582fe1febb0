//! Core stratification machinery for the tbdyn tuberculosis model toolkit.
//!
//! A compartmental disease model is partitioned into named sub-groups
//! ("strata"), each holding a share of the total population. This crate
//! provides the configuration objects the solver consumes to weight its
//! transition rates: the population split, a between-strata mixing matrix,
//! and per-flow multiplicative adjustments that may vary over calendar time.

pub mod error;
pub mod interpolation;
pub mod strats;
pub mod types;

pub use error::ConfigurationError;
pub use interpolation::PiecewiseLinear;
pub use strats::trial::{
    apply_trial_strat, get_trial_strat, AcfIntervention, TrialStratificationConfig,
};
pub use types::mixing::MixingMatrix;
pub use types::stratification::{
    FlowAdjustment, FlowMultiplier, SourceStrata, Stratification, StratificationTarget,
};
