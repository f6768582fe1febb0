//! Gamma prior construction from a target median and upper credible bound.

use argmin::core::observers::ObserverMode;
use argmin::core::{CostFunction, Error, Executor};
use argmin::solver::neldermead::NelderMead;
use argmin_observer_slog::SlogLogger;
use serde::{Deserialize, Serialize};
use statrs::distribution::{Continuous, ContinuousCDF, Gamma};

use crate::error::CalibrationError;

/// Lower clamp keeping both gamma parameters strictly positive during the
/// derivative-free search.
const PARAM_FLOOR: f64 = 1e-8;

/// A gamma-distributed prior parameterized by shape and scale.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GammaPrior {
    pub name: String,
    pub shape: f64,
    pub scale: f64,
    pub size: usize,
}

impl GammaPrior {
    pub fn new(
        name: impl Into<String>,
        shape: f64,
        scale: f64,
        size: usize,
    ) -> Result<Self, CalibrationError> {
        if !(shape > 0.0 && scale > 0.0) {
            return Err(CalibrationError::InvalidDistribution {
                shape,
                scale,
                reason: "shape and scale must be positive".to_string(),
            });
        }
        Ok(Self {
            name: name.into(),
            shape,
            scale,
            size,
        })
    }

    fn distribution(&self) -> Result<Gamma, CalibrationError> {
        // statrs parameterizes by rate, the inverse of scale.
        Gamma::new(self.shape, 1.0 / self.scale).map_err(|e| {
            CalibrationError::InvalidDistribution {
                shape: self.shape,
                scale: self.scale,
                reason: e.to_string(),
            }
        })
    }

    pub fn mean(&self) -> f64 {
        self.shape * self.scale
    }

    pub fn density(&self, x: f64) -> Result<f64, CalibrationError> {
        Ok(self.distribution()?.pdf(x))
    }

    pub fn quantile(&self, q: f64) -> Result<f64, CalibrationError> {
        Ok(self.distribution()?.inverse_cdf(q))
    }

    /// Density sampled on an even grid spanning the 0.1%–99.9% quantile
    /// range, for plotting.
    pub fn density_curve(&self, points: usize) -> Result<Vec<(f64, f64)>, CalibrationError> {
        let dist = self.distribution()?;
        let lo = dist.inverse_cdf(0.001);
        let hi = dist.inverse_cdf(0.999);
        let step = (hi - lo) / (points.max(2) - 1) as f64;
        Ok((0..points.max(2))
            .map(|i| {
                let x = lo + step * i as f64;
                (x, dist.pdf(x))
            })
            .collect())
    }

    /// Fit a gamma prior whose median and upper 95% credible bound match the
    /// targets.
    ///
    /// Minimizes `|q50 - median| + |q97.5 - upper_ci|` over (shape, scale)
    /// with Nelder-Mead, restarting from the last optimum while the residual
    /// relative to `upper_ci` stays above tolerance, up to
    /// `options.max_eval` restarts. In strict mode a residual above
    /// tolerance after the final restart is an error; otherwise the best
    /// parameters found are returned.
    pub fn from_median(
        name: impl Into<String>,
        median: f64,
        upper_ci: f64,
        options: FitOptions,
    ) -> Result<Self, CalibrationError> {
        let problem = GammaFitProblem { median, upper_ci };
        let mut x = vec![1.0, 1.0];
        let mut loss = f64::INFINITY;
        let mut evals = 0;

        while loss > options.tol && evals < options.max_eval {
            x = run_nelder_mead(&problem, &x, &options)?;
            x[0] = x[0].max(PARAM_FLOOR);
            x[1] = x[1].max(PARAM_FLOOR);
            loss = problem.residual(x[0], x[1])? / upper_ci;
            evals += 1;
        }

        if loss > options.tol && options.strict {
            return Err(CalibrationError::ToleranceExceeded {
                loss,
                tol: options.tol,
            });
        }

        GammaPrior::new(name, x[0], x[1], options.size)
    }
}

/// Options for the gamma prior fit.
#[derive(Clone, Debug)]
pub struct FitOptions {
    /// Residual tolerance, relative to the upper credible bound.
    pub tol: f64,

    /// Maximum number of Nelder-Mead restarts.
    pub max_eval: u32,

    /// Maximum iterations per restart.
    pub max_iterations: u64,

    /// Simplex standard-deviation tolerance (inner convergence criterion).
    pub sd_tolerance: f64,

    /// Fail instead of returning an inaccurate fit.
    pub strict: bool,

    /// Enable verbose solver output.
    pub verbose: bool,

    /// Number of draws the prior produces per sample.
    pub size: usize,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            tol: 1e-6,
            max_eval: 8,
            max_iterations: 1000,
            sd_tolerance: 1e-10,
            strict: false,
            verbose: false,
            size: 1,
        }
    }
}

impl FitOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    pub fn with_max_eval(mut self, max_eval: u32) -> Self {
        self.max_eval = max_eval;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: u64) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_sd_tolerance(mut self, sd_tolerance: f64) -> Self {
        self.sd_tolerance = sd_tolerance;
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }
}

/// Cost function matching a gamma's median and upper 95% bound.
#[derive(Clone)]
struct GammaFitProblem {
    median: f64,
    upper_ci: f64,
}

impl GammaFitProblem {
    fn residual(&self, shape: f64, scale: f64) -> Result<f64, CalibrationError> {
        let dist = Gamma::new(shape, 1.0 / scale).map_err(|e| {
            CalibrationError::InvalidDistribution {
                shape,
                scale,
                reason: e.to_string(),
            }
        })?;
        let eval_median = dist.inverse_cdf(0.5);
        let eval_upper = dist.inverse_cdf(0.975);
        Ok((eval_median - self.median).abs() + (eval_upper - self.upper_ci).abs())
    }
}

impl CostFunction for GammaFitProblem {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, params: &Self::Param) -> Result<Self::Output, Error> {
        let shape = params[0].max(PARAM_FLOOR);
        let scale = params[1].max(PARAM_FLOOR);
        self.residual(shape, scale)
            .map_err(|e| Error::msg(e.to_string()))
    }
}

/// One Nelder-Mead run seeded from `initial`.
fn run_nelder_mead(
    problem: &GammaFitProblem,
    initial: &[f64],
    options: &FitOptions,
) -> Result<Vec<f64>, CalibrationError> {
    // Simplex: the seed plus one vertex per coordinate, perturbed by 10%.
    let mut vertices = vec![initial.to_vec()];
    for i in 0..initial.len() {
        let mut vertex = initial.to_vec();
        vertex[i] = if vertex[i].abs() > PARAM_FLOOR {
            vertex[i] * 1.1
        } else {
            0.1
        };
        vertices.push(vertex);
    }

    let solver = NelderMead::new(vertices)
        .with_sd_tolerance(options.sd_tolerance)
        .map_err(|e| CalibrationError::Optimization(format!("failed to set sd_tolerance: {e}")))?;

    let executor = Executor::new(problem.clone(), solver)
        .configure(|state| state.max_iters(options.max_iterations));

    let run = if options.verbose {
        executor
            .add_observer(SlogLogger::term(), ObserverMode::Always)
            .run()
    } else {
        executor.run()
    };

    // Nelder-Mead can abort outright on pathological targets (an upper bound
    // below the median collapses the simplex). An aborted run counts as a
    // failed restart: keep the seed and let the caller's residual check
    // decide.
    let result = match run {
        Ok(result) => result,
        Err(_) => return Ok(initial.to_vec()),
    };

    Ok(result
        .state()
        .best_param
        .clone()
        .unwrap_or_else(|| initial.to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_positive_parameters() {
        assert!(GammaPrior::new("x", 0.0, 1.0, 1).is_err());
        assert!(GammaPrior::new("x", 1.0, -2.0, 1).is_err());
    }

    #[test]
    fn test_quantiles_are_monotone() {
        let prior = GammaPrior::new("x", 2.0, 3.0, 1).unwrap();
        let q25 = prior.quantile(0.25).unwrap();
        let q50 = prior.quantile(0.5).unwrap();
        let q75 = prior.quantile(0.75).unwrap();
        assert!(q25 < q50 && q50 < q75);
        assert!((prior.mean() - 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_from_median_reproduces_targets() {
        let median = 5.0;
        let upper_ci = 15.0;
        let options = FitOptions::new().with_tol(1e-4);
        let prior = GammaPrior::from_median("delay", median, upper_ci, options).unwrap();

        assert!(prior.shape > 0.0 && prior.scale > 0.0);
        let fit_median = prior.quantile(0.5).unwrap();
        let fit_upper = prior.quantile(0.975).unwrap();
        assert!(
            (fit_median - median).abs() / median < 1e-2,
            "median {fit_median} too far from {median}"
        );
        assert!(
            (fit_upper - upper_ci).abs() / upper_ci < 1e-2,
            "upper bound {fit_upper} too far from {upper_ci}"
        );
    }

    #[test]
    fn test_strict_mode_rejects_unreachable_targets() {
        // No gamma has its upper 95% bound below its median.
        let options = FitOptions::new()
            .with_strict(true)
            .with_max_eval(2)
            .with_max_iterations(200);
        let result = GammaPrior::from_median("bad", 10.0, 1.0, options);
        assert!(matches!(
            result,
            Err(CalibrationError::ToleranceExceeded { .. })
        ));
    }

    #[test]
    fn test_lenient_fit_returns_best_effort_parameters() {
        // Same unreachable targets, but without strict mode the best
        // parameters found are returned instead of an error.
        let options = FitOptions::new().with_max_eval(2).with_max_iterations(200);
        let prior = GammaPrior::from_median("bad", 10.0, 1.0, options).unwrap();
        assert!(prior.shape > 0.0 && prior.scale > 0.0);
    }

    #[test]
    fn test_density_curve_spans_quantile_range() {
        let prior = GammaPrior::new("x", 2.0, 3.0, 1).unwrap();
        let curve = prior.density_curve(100).unwrap();
        assert_eq!(curve.len(), 100);
        assert!(curve.windows(2).all(|w| w[0].0 < w[1].0));
        assert!(curve.iter().all(|(_, d)| *d >= 0.0));
    }
}
