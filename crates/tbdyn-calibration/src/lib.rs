//! Calibration analysis utilities for the tbdyn toolkit.
//!
//! Covers the post-calibration workflow: gamma priors fitted from a target
//! median and upper credible bound, summary tables of posterior draws
//! (mean, sd, HDI, effective sample sizes, R-hat), and chart rendering
//! (trace plots, prior-vs-posterior comparison).

pub mod error;
pub mod plots;
pub mod priors;
pub mod summary;

pub use error::CalibrationError;
pub use plots::{plot_post_prior_comparison, plot_trace};
pub use priors::{FitOptions, GammaPrior};
pub use summary::{render_table, summarize, CalibrationTrace, ParameterSummary};
