//! Chart rendering for calibration outputs.
//!
//! Trace plots (one row per parameter: per-chain draws and the pooled
//! density) and prior-vs-posterior comparison panels.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::Context;
use plotters::prelude::*;

use crate::priors::GammaPrior;
use crate::summary::{CalibrationTrace, DISPERSION_MARKER};

const HIST_BINS: usize = 100;
const ROW_HEIGHT: u32 = 280;

/// Per-bin density estimate of `samples`, as (bin center, density) pairs.
fn histogram_density(samples: &[f64], bins: usize) -> Vec<(f64, f64)> {
    let lo = samples.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let width = (hi - lo) / bins as f64;
    if !(width > 0.0) {
        return vec![(lo, 0.0)];
    }

    let mut counts = vec![0usize; bins];
    for &x in samples {
        let idx = (((x - lo) / width) as usize).min(bins - 1);
        counts[idx] += 1;
    }
    let norm = samples.len() as f64 * width;
    counts
        .iter()
        .enumerate()
        .map(|(i, &c)| (lo + (i as f64 + 0.5) * width, c as f64 / norm))
        .collect()
}

fn padded_range(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let mut lo = f64::INFINITY;
    let mut hi = f64::NEG_INFINITY;
    for v in values {
        lo = lo.min(v);
        hi = hi.max(v);
    }
    if !(hi > lo) {
        hi = lo + 1.0;
    }
    let pad = (hi - lo) * 0.05;
    (lo - pad, hi + pad)
}

/// Draw per-parameter trace plots: chain draws on the left, the pooled
/// histogram density on the right. Dispersion parameters are skipped.
pub fn plot_trace(
    trace: &CalibrationTrace,
    display_names: &HashMap<String, String>,
    path: &Path,
) -> anyhow::Result<()> {
    let params = trace.reported_parameters();
    anyhow::ensure!(!params.is_empty(), "trace has no reportable parameters");
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let root =
        BitMapBackend::new(path, (1600, ROW_HEIGHT * params.len() as u32)).into_drawing_area();
    root.fill(&WHITE)?;
    let cells = root.split_evenly((params.len(), 2));

    for (i, name) in params.iter().enumerate() {
        let chains = trace
            .chains(name)
            .with_context(|| format!("no draws for parameter '{name}'"))?;
        anyhow::ensure!(
            chains.iter().any(|c| !c.is_empty()),
            "parameter '{name}' has only empty chains"
        );
        let title = display_names
            .get(*name)
            .map(String::as_str)
            .unwrap_or(name);

        let max_len = chains.iter().map(Vec::len).max().unwrap_or(0);
        let (lo, hi) = padded_range(chains.iter().flatten().copied());

        let mut left = ChartBuilder::on(&cells[2 * i])
            .caption(title, ("sans-serif", 22).into_font())
            .margin(10)
            .x_label_area_size(30)
            .y_label_area_size(60)
            .build_cartesian_2d(0.0..max_len as f64, lo..hi)?;
        left.configure_mesh().x_desc("Draw").draw()?;
        for (c, chain) in chains.iter().enumerate() {
            left.draw_series(LineSeries::new(
                chain.iter().enumerate().map(|(j, &v)| (j as f64, v)),
                &Palette99::pick(c),
            ))?;
        }

        let pooled: Vec<f64> = chains.iter().flatten().copied().collect();
        let density = histogram_density(&pooled, HIST_BINS);
        let max_density = density.iter().map(|(_, d)| *d).fold(0.0_f64, f64::max);
        let mut right = ChartBuilder::on(&cells[2 * i + 1])
            .margin(10)
            .x_label_area_size(30)
            .y_label_area_size(60)
            .build_cartesian_2d(lo..hi, 0.0..max_density.max(f64::EPSILON) * 1.1)?;
        right.configure_mesh().x_desc("Value").y_desc("Density").draw()?;
        right.draw_series(LineSeries::new(density.into_iter(), &BLUE))?;
    }

    root.present()
        .with_context(|| format!("failed to write plot to {}", path.display()))?;
    Ok(())
}

/// Draw prior-vs-posterior comparison panels, two per row: the prior
/// density as a filled curve and the posterior histogram density as a
/// line. The legend is drawn on the first panel only; a trailing empty
/// panel is left blank when the parameter count is odd.
pub fn plot_post_prior_comparison(
    trace: &CalibrationTrace,
    priors: &[GammaPrior],
    display_names: &HashMap<String, String>,
    path: &Path,
) -> anyhow::Result<()> {
    let reported: Vec<&GammaPrior> = priors
        .iter()
        .filter(|p| !p.name.contains(DISPERSION_MARKER))
        .collect();
    anyhow::ensure!(!reported.is_empty(), "no reportable priors supplied");
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let rows = (reported.len() + 1) / 2;
    let root = BitMapBackend::new(path, (1600, ROW_HEIGHT * rows as u32)).into_drawing_area();
    root.fill(&WHITE)?;
    let cells = root.split_evenly((rows, 2));

    for (i, prior) in reported.iter().enumerate() {
        let pooled = trace
            .pooled(&prior.name)
            .with_context(|| format!("no posterior draws for parameter '{}'", prior.name))?;
        anyhow::ensure!(
            !pooled.is_empty(),
            "parameter '{}' has no posterior draws",
            prior.name
        );

        let prior_curve = prior.density_curve(100)?;
        let posterior_curve = histogram_density(&pooled, HIST_BINS);

        let (x_lo, x_hi) = padded_range(
            prior_curve
                .iter()
                .chain(posterior_curve.iter())
                .map(|(x, _)| *x),
        );
        let y_hi = prior_curve
            .iter()
            .chain(posterior_curve.iter())
            .map(|(_, d)| *d)
            .fold(0.0_f64, f64::max)
            .max(f64::EPSILON)
            * 1.1;

        let title = display_names
            .get(&prior.name)
            .map(String::as_str)
            .unwrap_or(&prior.name);

        let mut chart = ChartBuilder::on(&cells[i])
            .caption(title, ("sans-serif", 22).into_font())
            .margin(10)
            .x_label_area_size(30)
            .y_label_area_size(60)
            .build_cartesian_2d(x_lo..x_hi, 0.0..y_hi)?;
        chart.configure_mesh().draw()?;

        chart
            .draw_series(AreaSeries::new(
                prior_curve.into_iter(),
                0.0,
                BLACK.mix(0.2),
            ))?
            .label("Prior")
            .legend(|(x, y)| {
                Rectangle::new([(x, y - 5), (x + 12, y + 5)], BLACK.mix(0.2).filled())
            });

        chart
            .draw_series(LineSeries::new(posterior_curve.into_iter(), &BLUE))?
            .label("Posterior")
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 12, y)], BLUE.stroke_width(2)));

        if i == 0 {
            chart
                .configure_series_labels()
                .position(SeriesLabelPosition::UpperRight)
                .border_style(BLACK)
                .background_style(WHITE.mix(0.7))
                .draw()?;
        }
    }

    root.present()
        .with_context(|| format!("failed to write plot to {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_histogram_density_integrates_to_one() {
        let samples: Vec<f64> = (0..1000).map(|i| i as f64 / 100.0).collect();
        let density = histogram_density(&samples, 50);
        assert_eq!(density.len(), 50);
        let width = density[1].0 - density[0].0;
        let mass: f64 = density.iter().map(|(_, d)| d * width).sum();
        assert!((mass - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_histogram_density_degenerate_samples() {
        let density = histogram_density(&[2.0, 2.0, 2.0], 10);
        assert_eq!(density, vec![(2.0, 0.0)]);
    }

    #[test]
    fn test_padded_range_handles_constant_input() {
        let (lo, hi) = padded_range([3.0, 3.0].into_iter());
        assert!(lo < 3.0 && hi > 3.0);
    }
}
