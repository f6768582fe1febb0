//! Posterior summary statistics for calibration traces.
//!
//! Produces per-parameter rows of mean, standard deviation, 94% highest
//! density interval, bulk/tail effective sample sizes and the
//! rank-normalized split potential scale reduction factor (R-hat).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};

use crate::error::CalibrationError;

/// Parameters whose names contain this fragment are nuisance dispersion
/// terms and are excluded from summaries and plots.
pub const DISPERSION_MARKER: &str = "_dispersion";

/// Mass of the reported highest-density interval.
pub const HDI_PROB: f64 = 0.94;

/// Posterior draws from a calibration run, grouped per parameter and chain.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CalibrationTrace {
    parameters: Vec<String>,
    draws: HashMap<String, Vec<Vec<f64>>>,
}

impl CalibrationTrace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) the per-chain draws of one parameter. Parameter
    /// order follows first insertion.
    pub fn insert(&mut self, name: impl Into<String>, chains: Vec<Vec<f64>>) {
        let name = name.into();
        if !self.parameters.contains(&name) {
            self.parameters.push(name.clone());
        }
        self.draws.insert(name, chains);
    }

    pub fn parameters(&self) -> &[String] {
        &self.parameters
    }

    pub fn chains(&self, name: &str) -> Option<&[Vec<f64>]> {
        self.draws.get(name).map(Vec::as_slice)
    }

    /// Parameters retained for reporting (dispersion terms dropped).
    pub fn reported_parameters(&self) -> Vec<&str> {
        self.parameters
            .iter()
            .filter(|name| !name.contains(DISPERSION_MARKER))
            .map(String::as_str)
            .collect()
    }

    /// All draws of one parameter, chains concatenated.
    pub fn pooled(&self, name: &str) -> Option<Vec<f64>> {
        self.draws
            .get(name)
            .map(|chains| chains.iter().flatten().copied().collect())
    }
}

/// Summary row for one calibrated parameter.
#[derive(Clone, Debug, Serialize)]
pub struct ParameterSummary {
    /// Descriptive title when one is supplied, else the parameter id.
    pub name: String,
    pub mean: f64,
    pub sd: f64,
    pub hdi_low: f64,
    pub hdi_high: f64,
    pub ess_bulk: f64,
    pub ess_tail: f64,
    pub r_hat: f64,
}

/// Summarize every reported parameter of the trace.
///
/// `display_names` maps parameter ids to descriptive titles; parameters
/// without an entry keep their id.
pub fn summarize(
    trace: &CalibrationTrace,
    display_names: &HashMap<String, String>,
) -> Result<Vec<ParameterSummary>, CalibrationError> {
    let mut rows = Vec::new();
    for name in trace.reported_parameters() {
        let chains = trace
            .chains(name)
            .ok_or_else(|| CalibrationError::EmptyTrace(name.to_string()))?;
        // Split-chain diagnostics need at least four draws per half.
        if chains.is_empty() || chains.iter().any(|c| c.len() < 8) {
            return Err(CalibrationError::EmptyTrace(name.to_string()));
        }

        let pooled: Vec<f64> = chains.iter().flatten().copied().collect();
        let (hdi_low, hdi_high) = hdi(&pooled, HDI_PROB);

        rows.push(ParameterSummary {
            name: display_names
                .get(name)
                .cloned()
                .unwrap_or_else(|| name.to_string()),
            mean: mean(&pooled),
            sd: sample_var(&pooled).sqrt(),
            hdi_low,
            hdi_high,
            ess_bulk: ess_bulk(chains),
            ess_tail: ess_tail(chains),
            r_hat: split_r_hat(chains),
        });
    }
    Ok(rows)
}

/// Render summary rows as a text table, values rounded to three decimals
/// and the HDI reported as a single "low to high" column.
pub fn render_table(rows: &[ParameterSummary]) -> String {
    let mut out = String::from(
        "Parameter | Mean | Standard deviation | ESS bulk | ESS tail | R-hat | High-density interval\n",
    );
    for row in rows {
        out.push_str(&format!(
            "{} | {:.3} | {:.3} | {:.3} | {:.3} | {:.3} | {:.3} to {:.3}\n",
            row.name,
            row.mean,
            row.sd,
            row.ess_bulk,
            row.ess_tail,
            row.r_hat,
            row.hdi_low,
            row.hdi_high,
        ));
    }
    out
}

/// Shortest interval containing `prob` of the samples.
pub fn hdi(samples: &[f64], prob: f64) -> (f64, f64) {
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let n = sorted.len();
    let window = ((prob * n as f64).floor() as usize).clamp(1, n);

    let mut best = (sorted[0], sorted[n - 1]);
    let mut best_width = f64::INFINITY;
    for i in 0..=(n - window) {
        let width = sorted[i + window - 1] - sorted[i];
        if width < best_width {
            best_width = width;
            best = (sorted[i], sorted[i + window - 1]);
        }
    }
    best
}

fn mean(xs: &[f64]) -> f64 {
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// Sample variance with one delta degree of freedom.
fn sample_var(xs: &[f64]) -> f64 {
    if xs.len() < 2 {
        return 0.0;
    }
    let m = mean(xs);
    xs.iter().map(|x| (x - m) * (x - m)).sum::<f64>() / (xs.len() - 1) as f64
}

/// Linear-interpolation quantile of sorted samples.
fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    let n = sorted.len();
    let h = q * (n - 1) as f64;
    let lo = h.floor() as usize;
    let hi = (lo + 1).min(n - 1);
    sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
}

/// Each chain halved, doubling the chain count. Odd trailing draws are
/// dropped.
fn split_chains(chains: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let mut out = Vec::with_capacity(chains.len() * 2);
    for chain in chains {
        let half = chain.len() / 2;
        out.push(chain[..half].to_vec());
        out.push(chain[half..2 * half].to_vec());
    }
    out
}

/// Replace draws by the standard-normal quantiles of their pooled fractional
/// ranks (average ranks for ties).
fn rank_normalize(chains: &[Vec<f64>]) -> Vec<Vec<f64>> {
    // Fixed, valid parameters: construction cannot fail.
    let normal = Normal::new(0.0, 1.0).expect("standard normal is a valid distribution");

    let mut indexed: Vec<(usize, usize, f64)> = Vec::new();
    for (c, chain) in chains.iter().enumerate() {
        for (i, &value) in chain.iter().enumerate() {
            indexed.push((c, i, value));
        }
    }
    let total = indexed.len();
    indexed.sort_by(|a, b| a.2.total_cmp(&b.2));

    let mut out: Vec<Vec<f64>> = chains.iter().map(|c| vec![0.0; c.len()]).collect();
    let mut pos = 0;
    while pos < total {
        // Group ties and share their average rank.
        let mut end = pos + 1;
        while end < total && indexed[end].2 == indexed[pos].2 {
            end += 1;
        }
        let avg_rank = (pos + 1 + end) as f64 / 2.0;
        let z = normal.inverse_cdf((avg_rank - 0.375) / (total as f64 + 0.25));
        for item in &indexed[pos..end] {
            out[item.0][item.1] = z;
        }
        pos = end;
    }
    out
}

/// Classic potential scale reduction factor over the given chains.
fn potential_scale_reduction(chains: &[Vec<f64>]) -> f64 {
    let m = chains.len();
    let n = chains.iter().map(Vec::len).min().unwrap_or(0);
    if m < 2 || n < 2 {
        return f64::NAN;
    }

    let means: Vec<f64> = chains.iter().map(|c| mean(&c[..n])).collect();
    let within = mean(&chains.iter().map(|c| sample_var(&c[..n])).collect::<Vec<_>>());
    if within <= 0.0 {
        return f64::NAN;
    }
    let var_plus = within * (n - 1) as f64 / n as f64 + sample_var(&means);
    (var_plus / within).sqrt()
}

/// Rank-normalized split R-hat.
fn split_r_hat(chains: &[Vec<f64>]) -> f64 {
    potential_scale_reduction(&rank_normalize(&split_chains(chains)))
}

/// Autocovariance of one chain at lags 0..max_lag, normalized by n.
fn autocovariance(chain: &[f64], max_lag: usize) -> Vec<f64> {
    let n = chain.len();
    let m = mean(chain);
    (0..max_lag)
        .map(|t| {
            (0..n - t)
                .map(|i| (chain[i] - m) * (chain[i + t] - m))
                .sum::<f64>()
                / n as f64
        })
        .collect()
}

/// Effective sample size from the combined-chain autocorrelation, truncated
/// by Geyer's initial positive and monotone sequence criteria.
fn ess(chains: &[Vec<f64>]) -> f64 {
    let m = chains.len();
    let n = chains.iter().map(Vec::len).min().unwrap_or(0);
    if m == 0 || n < 4 {
        return f64::NAN;
    }

    let chain_vars: Vec<f64> = chains.iter().map(|c| sample_var(&c[..n])).collect();
    let within = mean(&chain_vars);
    let means: Vec<f64> = chains.iter().map(|c| mean(&c[..n])).collect();
    let between = if m > 1 { sample_var(&means) } else { 0.0 };
    let var_plus = within * (n - 1) as f64 / n as f64 + between;
    if var_plus <= 0.0 {
        return f64::NAN;
    }

    let max_lag = n - 1;
    let acovs: Vec<Vec<f64>> = chains
        .iter()
        .map(|c| autocovariance(&c[..n], max_lag))
        .collect();
    let mean_acov = |t: usize| mean(&acovs.iter().map(|a| a[t]).collect::<Vec<_>>());
    let rho = |t: usize| 1.0 - (within - mean_acov(t)) / var_plus;

    // Sum autocorrelations in pairs while each pair stays positive and the
    // pair sums stay non-increasing.
    let mut sum_pairs = 0.0;
    let mut prev_pair = f64::INFINITY;
    let mut k = 0;
    loop {
        let t = 2 * k;
        if t + 1 >= max_lag {
            break;
        }
        let even = if t == 0 { 1.0 } else { rho(t) };
        let odd = rho(t + 1);
        let mut pair = even + odd;
        if pair <= 0.0 {
            break;
        }
        if pair > prev_pair {
            pair = prev_pair;
        }
        sum_pairs += pair;
        prev_pair = pair;
        k += 1;
    }

    let tau = (2.0 * sum_pairs - 1.0).max(f64::EPSILON);
    let total = (m * n) as f64;
    (total / tau).min(total * total.log10().max(1.0))
}

/// Bulk effective sample size: ESS of the rank-normalized split chains.
fn ess_bulk(chains: &[Vec<f64>]) -> f64 {
    ess(&rank_normalize(&split_chains(chains)))
}

/// Tail effective sample size: the smaller of the ESS of the 5% and 95%
/// quantile exceedance indicators.
fn ess_tail(chains: &[Vec<f64>]) -> f64 {
    let mut pooled: Vec<f64> = chains.iter().flatten().copied().collect();
    pooled.sort_by(|a, b| a.total_cmp(b));

    let mut tail = f64::INFINITY;
    for q in [0.05, 0.95] {
        let cutoff = quantile_sorted(&pooled, q);
        let indicators: Vec<Vec<f64>> = chains
            .iter()
            .map(|c| {
                c.iter()
                    .map(|&x| if x <= cutoff { 1.0 } else { 0.0 })
                    .collect()
            })
            .collect();
        let e = ess(&split_chains(&indicators));
        if e < tail {
            tail = e;
        }
    }
    tail
}
