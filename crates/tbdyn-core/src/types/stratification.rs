//! Stratification configuration consumed by the compartmental-model solver.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;
use crate::interpolation::PiecewiseLinear;
use crate::types::mixing::MixingMatrix;

/// Multiplicative scaling applied to a flow's base rate for one stratum.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum FlowMultiplier {
    /// Fixed factor applied at every model time.
    Constant(f64),
    /// Factor interpolated from calendar-time breakpoints.
    TimeVarying(PiecewiseLinear),
}

impl FlowMultiplier {
    /// The factor in force at simulation time `t`.
    pub fn evaluate(&self, t: f64) -> f64 {
        match self {
            FlowMultiplier::Constant(value) => *value,
            FlowMultiplier::TimeVarying(curve) => curve.evaluate(t),
        }
    }
}

/// Restriction of a flow adjustment to source compartments matching these
/// stratification categories, e.g. `{"age": "15"}` for one age group.
pub type SourceStrata = HashMap<String, String>;

/// One registered flow adjustment: per-stratum multipliers, optionally
/// restricted to a sub-population.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FlowAdjustment {
    pub flow: String,
    pub multipliers: HashMap<String, FlowMultiplier>,
    pub source_strata: Option<SourceStrata>,
}

/// Interface of the compartmental-model stratification configuration.
///
/// The solver's configuration object implements this; unit tests use a
/// recording double so builders can be exercised in isolation.
pub trait StratificationTarget {
    /// Apportion the total population across strata at model initialization.
    fn set_population_split(
        &mut self,
        split: HashMap<String, f64>,
    ) -> Result<(), ConfigurationError>;

    /// Register per-stratum multipliers for a named flow, optionally limited
    /// to source compartments matching `source_strata`. A later registration
    /// for the same flow and filter supersedes the earlier one.
    fn set_flow_adjustments(
        &mut self,
        flow: &str,
        multipliers: HashMap<String, FlowMultiplier>,
        source_strata: Option<SourceStrata>,
    ) -> Result<(), ConfigurationError>;

    /// Install the between-strata contact matrix.
    fn set_mixing_matrix(&mut self, matrix: MixingMatrix) -> Result<(), ConfigurationError>;
}

/// A stratification of the model population into named strata, holding
/// everything the solver needs to weight transition rates.
///
/// All contents are set once at model-build time and read-only afterwards.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Stratification {
    pub id: String,
    pub strata: Vec<String>,
    pub compartments: Vec<String>,
    population_split: HashMap<String, f64>,
    mixing_matrix: Option<MixingMatrix>,
    flow_adjustments: Vec<FlowAdjustment>,
}

impl Stratification {
    pub fn new(id: impl Into<String>, strata: Vec<String>, compartments: Vec<String>) -> Self {
        Self {
            id: id.into(),
            strata,
            compartments,
            population_split: HashMap::new(),
            mixing_matrix: None,
            flow_adjustments: Vec::new(),
        }
    }

    pub fn population_split(&self) -> &HashMap<String, f64> {
        &self.population_split
    }

    pub fn mixing_matrix(&self) -> Option<&MixingMatrix> {
        self.mixing_matrix.as_ref()
    }

    /// All registrations, in the order they were made.
    pub fn flow_adjustments(&self) -> &[FlowAdjustment] {
        &self.flow_adjustments
    }

    /// The multiplier in force for `flow` and `stratum` on a compartment
    /// with the given source strata. Registrations are matched last-wins,
    /// so a later, more specific adjustment fully supersedes an earlier
    /// generic one.
    pub fn resolve_multiplier(
        &self,
        flow: &str,
        stratum: &str,
        source: &SourceStrata,
    ) -> Option<&FlowMultiplier> {
        self.flow_adjustments
            .iter()
            .rev()
            .find(|adj| {
                adj.flow == flow
                    && adj.multipliers.contains_key(stratum)
                    && adj.source_strata.as_ref().is_none_or(|filter| {
                        filter.iter().all(|(k, v)| source.get(k) == Some(v))
                    })
            })
            .and_then(|adj| adj.multipliers.get(stratum))
    }

    fn check_covers_strata(
        &self,
        flow: &str,
        multipliers: &HashMap<String, FlowMultiplier>,
    ) -> Result<(), ConfigurationError> {
        for stratum in &self.strata {
            if !multipliers.contains_key(stratum) {
                return Err(ConfigurationError::MissingFlowFactor {
                    flow: flow.to_string(),
                    stratum: stratum.clone(),
                });
            }
        }
        for stratum in multipliers.keys() {
            if !self.strata.contains(stratum) {
                return Err(ConfigurationError::UnknownStratum {
                    stratum: stratum.clone(),
                });
            }
        }
        Ok(())
    }
}

impl StratificationTarget for Stratification {
    fn set_population_split(
        &mut self,
        split: HashMap<String, f64>,
    ) -> Result<(), ConfigurationError> {
        for stratum in &self.strata {
            if !split.contains_key(stratum) {
                return Err(ConfigurationError::MissingProportion {
                    stratum: stratum.clone(),
                });
            }
        }
        for stratum in split.keys() {
            if !self.strata.contains(stratum) {
                return Err(ConfigurationError::UnknownStratum {
                    stratum: stratum.clone(),
                });
            }
        }
        self.population_split = split;
        Ok(())
    }

    fn set_flow_adjustments(
        &mut self,
        flow: &str,
        multipliers: HashMap<String, FlowMultiplier>,
        source_strata: Option<SourceStrata>,
    ) -> Result<(), ConfigurationError> {
        self.check_covers_strata(flow, &multipliers)?;
        self.flow_adjustments.push(FlowAdjustment {
            flow: flow.to_string(),
            multipliers,
            source_strata,
        });
        Ok(())
    }

    fn set_mixing_matrix(&mut self, matrix: MixingMatrix) -> Result<(), ConfigurationError> {
        if matrix.len() != self.strata.len() {
            return Err(ConfigurationError::MixingMatrixSize {
                got: matrix.len(),
                expected: self.strata.len(),
            });
        }
        self.mixing_matrix = Some(matrix);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strat() -> Stratification {
        Stratification::new(
            "trial",
            vec!["control".to_string(), "trial".to_string()],
            vec!["susceptible".to_string(), "infectious".to_string()],
        )
    }

    fn constant_pair(control: f64, trial: f64) -> HashMap<String, FlowMultiplier> {
        let mut map = HashMap::new();
        map.insert("control".to_string(), FlowMultiplier::Constant(control));
        map.insert("trial".to_string(), FlowMultiplier::Constant(trial));
        map
    }

    #[test]
    fn test_population_split_requires_all_strata() {
        let mut strat = strat();
        let mut split = HashMap::new();
        split.insert("control".to_string(), 1.0);
        assert!(matches!(
            strat.set_population_split(split),
            Err(ConfigurationError::MissingProportion { stratum }) if stratum == "trial"
        ));
    }

    #[test]
    fn test_population_split_rejects_unknown_stratum() {
        let mut strat = strat();
        let mut split = HashMap::new();
        split.insert("control".to_string(), 0.5);
        split.insert("trial".to_string(), 0.4);
        split.insert("ghost".to_string(), 0.1);
        assert!(matches!(
            strat.set_population_split(split),
            Err(ConfigurationError::UnknownStratum { .. })
        ));
    }

    #[test]
    fn test_flow_adjustment_requires_all_strata() {
        let mut strat = strat();
        let mut map = HashMap::new();
        map.insert("control".to_string(), FlowMultiplier::Constant(1.0));
        assert!(matches!(
            strat.set_flow_adjustments("detection", map, None),
            Err(ConfigurationError::MissingFlowFactor { flow, stratum })
                if flow == "detection" && stratum == "trial"
        ));
    }

    #[test]
    fn test_resolve_last_registration_wins() {
        let mut strat = strat();
        strat
            .set_flow_adjustments("detection", constant_pair(1.0, 1.0), None)
            .unwrap();
        strat
            .set_flow_adjustments("detection", constant_pair(0.0, 2.0), None)
            .unwrap();

        let source = SourceStrata::new();
        let m = strat
            .resolve_multiplier("detection", "trial", &source)
            .unwrap();
        assert_eq!(m.evaluate(0.0), 2.0);
    }

    #[test]
    fn test_resolve_respects_source_filter() {
        let mut strat = strat();
        strat
            .set_flow_adjustments("detection", constant_pair(1.0, 1.0), None)
            .unwrap();
        let filter: SourceStrata = [("age".to_string(), "15".to_string())].into();
        strat
            .set_flow_adjustments("detection", constant_pair(0.0, 3.0), Some(filter))
            .unwrap();

        let age_15: SourceStrata = [("age".to_string(), "15".to_string())].into();
        let age_5: SourceStrata = [("age".to_string(), "5".to_string())].into();

        let hit = strat
            .resolve_multiplier("detection", "trial", &age_15)
            .unwrap();
        assert_eq!(hit.evaluate(0.0), 3.0);

        // Other age groups keep the generic adjustment.
        let miss = strat
            .resolve_multiplier("detection", "trial", &age_5)
            .unwrap();
        assert_eq!(miss.evaluate(0.0), 1.0);
    }

    #[test]
    fn test_mixing_matrix_size_checked() {
        use crate::types::mixing::MixingMatrix;

        let mut strat = strat();
        let labels = vec!["a".to_string()];
        let mut props = HashMap::new();
        props.insert("a".to_string(), 1.0);
        let matrix = MixingMatrix::from_proportions(&labels, &props, 1.0).unwrap();
        assert!(matches!(
            strat.set_mixing_matrix(matrix),
            Err(ConfigurationError::MixingMatrixSize { got: 1, expected: 2 })
        ));
    }

    #[test]
    fn test_multiplier_serde_round_trip() {
        let curve = PiecewiseLinear::new(vec![0.0, 1.0], vec![0.0, 2.0]).unwrap();
        let multiplier = FlowMultiplier::TimeVarying(curve);
        let json = serde_json::to_string(&multiplier).unwrap();
        let back: FlowMultiplier = serde_json::from_str(&json).unwrap();
        assert_eq!(back, multiplier);
    }
}
