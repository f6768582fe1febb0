//! Piecewise-linear interpolation over calendar-time breakpoints.

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

/// A piecewise-linear function of simulation time.
///
/// Values are interpolated linearly between breakpoints and held flat
/// beyond the first and last ones. The solver evaluates this at every model
/// time when it is used as a flow-rate multiplier.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PiecewiseLinear {
    times: Vec<f64>,
    values: Vec<f64>,
}

impl PiecewiseLinear {
    /// Create a curve from breakpoint times and their values.
    ///
    /// Times must be strictly increasing and match the values in length.
    pub fn new(times: Vec<f64>, values: Vec<f64>) -> Result<Self, ConfigurationError> {
        if times.is_empty() {
            return Err(ConfigurationError::InvalidBreakpoints {
                reason: "at least one breakpoint is required".to_string(),
            });
        }
        if times.len() != values.len() {
            return Err(ConfigurationError::InvalidBreakpoints {
                reason: format!("{} times but {} values", times.len(), values.len()),
            });
        }
        if !times.windows(2).all(|w| w[0] < w[1]) {
            return Err(ConfigurationError::InvalidBreakpoints {
                reason: "breakpoint times must be strictly increasing".to_string(),
            });
        }
        Ok(Self { times, values })
    }

    /// Evaluate the curve at time `t`, with flat extrapolation outside the
    /// breakpoint range.
    pub fn evaluate(&self, t: f64) -> f64 {
        let last = self.times.len() - 1;
        if t <= self.times[0] {
            return self.values[0];
        }
        if t >= self.times[last] {
            return self.values[last];
        }
        let i = self.times.partition_point(|&x| x <= t) - 1;
        let span = self.times[i + 1] - self.times[i];
        let frac = (t - self.times[i]) / span;
        self.values[i] + frac * (self.values[i + 1] - self.values[i])
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_at_breakpoints() {
        let curve = PiecewiseLinear::new(vec![0.0, 1.0, 3.0], vec![0.0, 2.0, 1.0]).unwrap();
        assert_eq!(curve.evaluate(0.0), 0.0);
        assert_eq!(curve.evaluate(1.0), 2.0);
        assert_eq!(curve.evaluate(3.0), 1.0);
    }

    #[test]
    fn test_linear_between_breakpoints() {
        let curve = PiecewiseLinear::new(vec![0.0, 2.0], vec![0.0, 4.0]).unwrap();
        assert!((curve.evaluate(0.5) - 1.0).abs() < 1e-12);
        assert!((curve.evaluate(1.5) - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_flat_extrapolation() {
        let curve = PiecewiseLinear::new(vec![2014.0, 2015.0], vec![1.0, 3.0]).unwrap();
        assert_eq!(curve.evaluate(1900.0), 1.0);
        assert_eq!(curve.evaluate(2100.0), 3.0);
    }

    #[test]
    fn test_rejects_unsorted_times() {
        let result = PiecewiseLinear::new(vec![1.0, 1.0], vec![0.0, 0.0]);
        assert!(matches!(
            result,
            Err(ConfigurationError::InvalidBreakpoints { .. })
        ));
    }

    #[test]
    fn test_rejects_length_mismatch() {
        let result = PiecewiseLinear::new(vec![0.0, 1.0], vec![0.0]);
        assert!(matches!(
            result,
            Err(ConfigurationError::InvalidBreakpoints { .. })
        ));
    }

    #[test]
    fn test_rejects_empty() {
        assert!(PiecewiseLinear::new(vec![], vec![]).is_err());
    }
}
