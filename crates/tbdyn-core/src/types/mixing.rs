//! Between-strata contact weighting.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

/// Relative contact rates between population strata, stored row-major.
///
/// Entry (i, j) is the relative rate at which members of stratum i contact
/// members of stratum j. Row and column order follows the stratum order
/// fixed at construction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MixingMatrix {
    strata: Vec<String>,
    weights: Vec<f64>,
}

impl MixingMatrix {
    /// Build the mixing matrix from population proportions.
    ///
    /// The diagonal is the within-stratum mixing weight. Entry (i, j) for
    /// i != j is `(1 - within_weight) * proportions[j] / sum(proportions[k]
    /// for k != i)`, so the contacts an individual makes outside their own
    /// stratum are distributed according to the other strata's relative
    /// population shares.
    ///
    /// Fails when a proportion is missing or when some stratum's complement
    /// mass is not positive, which would leave between-strata mixing
    /// undefined.
    pub fn from_proportions(
        strata: &[String],
        proportions: &HashMap<String, f64>,
        within_weight: f64,
    ) -> Result<Self, ConfigurationError> {
        let n = strata.len();
        let props = strata
            .iter()
            .map(|s| {
                proportions
                    .get(s)
                    .copied()
                    .ok_or_else(|| ConfigurationError::MissingProportion { stratum: s.clone() })
            })
            .collect::<Result<Vec<f64>, _>>()?;

        let mut weights = vec![0.0; n * n];
        for i in 0..n {
            let non_self: f64 = props
                .iter()
                .enumerate()
                .filter(|(k, _)| *k != i)
                .map(|(_, p)| *p)
                .sum();
            if n > 1 && non_self <= 0.0 {
                return Err(ConfigurationError::DegenerateMixing {
                    stratum: strata[i].clone(),
                });
            }
            for j in 0..n {
                weights[i * n + j] = if i == j {
                    within_weight
                } else {
                    (1.0 - within_weight) * props[j] / non_self
                };
            }
        }

        Ok(Self {
            strata: strata.to_vec(),
            weights,
        })
    }

    /// Number of strata (the matrix is square).
    pub fn len(&self) -> usize {
        self.strata.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strata.is_empty()
    }

    pub fn strata(&self) -> &[String] {
        &self.strata
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.weights[i * self.strata.len() + j]
    }

    pub fn row(&self, i: usize) -> &[f64] {
        let n = self.strata.len();
        &self.weights[i * n..(i + 1) * n]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strata(labels: &[&str]) -> Vec<String> {
        labels.iter().map(|s| s.to_string()).collect()
    }

    fn proportions(entries: &[(&str, f64)]) -> HashMap<String, f64> {
        entries
            .iter()
            .map(|(s, p)| (s.to_string(), *p))
            .collect()
    }

    #[test]
    fn test_two_strata_example() {
        let matrix = MixingMatrix::from_proportions(
            &strata(&["control", "trial"]),
            &proportions(&[("control", 0.7), ("trial", 0.3)]),
            0.9,
        )
        .unwrap();

        // Off-diagonals: (1 - 0.9) * 0.3 / 0.3 and (1 - 0.9) * 0.7 / 0.7.
        assert!((matrix.get(0, 0) - 0.9).abs() < 1e-12);
        assert!((matrix.get(0, 1) - 0.1).abs() < 1e-12);
        assert!((matrix.get(1, 0) - 0.1).abs() < 1e-12);
        assert!((matrix.get(1, 1) - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_diagonal_is_within_weight() {
        let matrix = MixingMatrix::from_proportions(
            &strata(&["a", "b", "c"]),
            &proportions(&[("a", 0.2), ("b", 0.3), ("c", 0.5)]),
            0.6,
        )
        .unwrap();
        for i in 0..3 {
            assert!((matrix.get(i, i) - 0.6).abs() < 1e-12);
        }
    }

    #[test]
    fn test_off_diagonals_proportional_to_population() {
        let matrix = MixingMatrix::from_proportions(
            &strata(&["a", "b", "c"]),
            &proportions(&[("a", 0.2), ("b", 0.3), ("c", 0.5)]),
            0.6,
        )
        .unwrap();
        // Row a distributes (1 - 0.6) over b and c by their shares.
        assert!((matrix.get(0, 1) - 0.4 * 0.3 / 0.8).abs() < 1e-12);
        assert!((matrix.get(0, 2) - 0.4 * 0.5 / 0.8).abs() < 1e-12);
        for i in 0..3 {
            for j in 0..3 {
                assert!(matrix.get(i, j) >= 0.0);
            }
        }
    }

    #[test]
    fn test_equal_proportions_are_symmetric() {
        let matrix = MixingMatrix::from_proportions(
            &strata(&["a", "b", "c"]),
            &proportions(&[("a", 0.25), ("b", 0.25), ("c", 0.5)]),
            0.8,
        )
        .unwrap();
        // a and b hold equal shares, so their entries relative to c match.
        assert!((matrix.get(2, 0) - matrix.get(2, 1)).abs() < 1e-12);
        assert!((matrix.get(0, 2) - matrix.get(1, 2)).abs() < 1e-12);
    }

    #[test]
    fn test_degenerate_proportions_rejected() {
        let result = MixingMatrix::from_proportions(
            &strata(&["control", "trial"]),
            &proportions(&[("control", 1.0), ("trial", 0.0)]),
            0.9,
        );
        assert!(matches!(
            result,
            Err(ConfigurationError::DegenerateMixing { stratum }) if stratum == "control"
        ));
    }

    #[test]
    fn test_missing_proportion_rejected() {
        let result = MixingMatrix::from_proportions(
            &strata(&["control", "trial"]),
            &proportions(&[("control", 1.0)]),
            0.9,
        );
        assert!(matches!(
            result,
            Err(ConfigurationError::MissingProportion { stratum }) if stratum == "trial"
        ));
    }
}
