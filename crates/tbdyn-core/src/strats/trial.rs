//! Trial-arm stratification.
//!
//! Splits the modelled population into an active case finding (ACF) trial
//! arm and a control arm: a custom mixing matrix weights contacts between
//! the arms, constant multipliers adjust the infection and treatment flows
//! per arm, and the detection flow is scaled up in the trial arm during a
//! bounded calendar window, for all but the youngest age groups.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;
use crate::interpolation::PiecewiseLinear;
use crate::types::mixing::MixingMatrix;
use crate::types::stratification::{
    FlowMultiplier, SourceStrata, Stratification, StratificationTarget,
};

/// Flows that inherit the `"infection"` template adjustment when not
/// separately specified.
const INFECTION_FLOWS: [&str; 3] = [
    "infection_from_susceptible",
    "infection_from_late_latent",
    "infection_from_recovered",
];

/// Template key in the adjustments mapping; never registered as a flow.
const INFECTION_TEMPLATE: &str = "infection";

/// Newborns always enter strata in proportion to the standing population.
const BIRTH_FLOW: &str = "birth";

/// Stratification dimension used to filter the ACF override by age group.
const AGE_STRATIFICATION: &str = "age";

/// Number of youngest age groups the ACF intervention does not screen.
const ACF_AGE_GROUPS_SKIPPED: usize = 2;

/// An active case finding round: a bounded calendar window during which the
/// detection flow is scaled for one stratum.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AcfIntervention {
    /// Detection flow the intervention scales.
    pub flow: String,
    /// Stratum receiving the intervention (the trial arm).
    pub stratum: String,
    /// Calendar times at which screening starts, reaches full coverage,
    /// leaves full coverage, and stops.
    pub times: [f64; 4],
    /// Detection multiplier while the round is fully active.
    pub plateau: f64,
}

impl AcfIntervention {
    /// The time-varying multiplier for the intervention arm: rises from
    /// zero to the plateau, holds it, then returns to zero.
    pub fn multiplier(&self) -> Result<FlowMultiplier, ConfigurationError> {
        let curve = PiecewiseLinear::new(
            self.times.to_vec(),
            vec![0.0, self.plateau, self.plateau, 0.0],
        )?;
        Ok(FlowMultiplier::TimeVarying(curve))
    }
}

/// Configuration for the trial-arm stratification, normally deserialized
/// from the caller's nested parameter mapping.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrialStratificationConfig {
    /// Ordered stratum labels; order fixes the mixing-matrix indices.
    pub strata: Vec<String>,
    /// Fraction of the total population in each stratum. Assumed to sum
    /// to 1 for the mixing-matrix normalization to be meaningful.
    pub proportions: HashMap<String, f64>,
    /// Share of contacts an individual has within their own stratum.
    pub prop_mixing_same_stratum: f64,
    /// Per-flow, per-stratum multiplicative factors. The `"infection"`
    /// entry is a template applied to the three infection-source flows
    /// wherever those are not separately specified.
    pub adjustments: HashMap<String, HashMap<String, f64>>,
    /// The active case finding round applied to the trial arm.
    pub acf: AcfIntervention,
}

/// Apply the trial-arm stratification to a configuration target.
///
/// `age_strata` are the model's age-stratum labels in ascending order; the
/// ACF override is registered for every age group except the two youngest.
///
/// Registrations made here, in order:
/// 1. the population split, verbatim from the configured proportions;
/// 2. the mixing matrix built from the proportions and the within-stratum
///    mixing weight;
/// 3. one constant per-stratum adjustment per resolved flow, after the
///    infection template has been distributed;
/// 4. a `"birth"` adjustment equal to the proportions, always injected last
///    among the constant adjustments so it supersedes any caller-supplied
///    one;
/// 5. the ACF override on the detection flow, per eligible age group: the
///    intervention stratum gets the time-varying multiplier, every other
///    stratum a constant zero. Detection is assumed not to apply at all
///    outside the intervention arm in these age groups, and the override
///    fully supersedes any generic adjustment on the flow for those
///    combinations.
pub fn apply_trial_strat<T: StratificationTarget>(
    target: &mut T,
    config: &TrialStratificationConfig,
    age_strata: &[String],
) -> Result<(), ConfigurationError> {
    if !config.strata.contains(&config.acf.stratum) {
        return Err(ConfigurationError::UnknownStratum {
            stratum: config.acf.stratum.clone(),
        });
    }

    target.set_population_split(config.proportions.clone())?;

    let matrix = MixingMatrix::from_proportions(
        &config.strata,
        &config.proportions,
        config.prop_mixing_same_stratum,
    )?;
    target.set_mixing_matrix(matrix)?;

    // Distribute the infection template before applying anything: flows
    // already specified keep their own factors, the template key itself is
    // never registered.
    let mut adjustments = config.adjustments.clone();
    if let Some(template) = adjustments.remove(INFECTION_TEMPLATE) {
        for flow in INFECTION_FLOWS {
            adjustments
                .entry(flow.to_string())
                .or_insert_with(|| template.clone());
        }
    }

    for (flow, factors) in &adjustments {
        let multipliers = factors
            .iter()
            .map(|(stratum, value)| (stratum.clone(), FlowMultiplier::Constant(*value)))
            .collect();
        target.set_flow_adjustments(flow, multipliers, None)?;
    }

    let births = config
        .proportions
        .iter()
        .map(|(stratum, prop)| (stratum.clone(), FlowMultiplier::Constant(*prop)))
        .collect();
    target.set_flow_adjustments(BIRTH_FLOW, births, None)?;

    let acf_multiplier = config.acf.multiplier()?;
    for age in age_strata.iter().skip(ACF_AGE_GROUPS_SKIPPED) {
        let mut multipliers = HashMap::with_capacity(config.strata.len());
        for stratum in &config.strata {
            let multiplier = if *stratum == config.acf.stratum {
                acf_multiplier.clone()
            } else {
                FlowMultiplier::Constant(0.0)
            };
            multipliers.insert(stratum.clone(), multiplier);
        }
        let filter: SourceStrata =
            [(AGE_STRATIFICATION.to_string(), age.clone())].into();
        target.set_flow_adjustments(&config.acf.flow, multipliers, Some(filter))?;
    }

    Ok(())
}

/// Build the trial-arm stratification as a standalone configuration object.
pub fn get_trial_strat(
    compartments: &[String],
    config: &TrialStratificationConfig,
    age_strata: &[String],
) -> Result<Stratification, ConfigurationError> {
    let mut strat =
        Stratification::new("trial", config.strata.clone(), compartments.to_vec());
    apply_trial_strat(&mut strat, config, age_strata)?;
    Ok(strat)
}
