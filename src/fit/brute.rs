//! Brute-force chi-squared grid search.
//!
//! For each model kind a deterministic Cartesian grid of parameter values
//! is evaluated in one parallel pass; the cell with the lowest chi-squared
//! is the point estimate. Uncertainties come from the joint confidence
//! region `chi2 <= base + delchi`: per parameter, the distance from the
//! best value to the region's extremes, which is naturally asymmetric.
//! Posterior-like draws are taken from the same region with weights
//! proportional to `1/chi2`.
//!
//! Exact chi-squared ties between cells are resolved deterministically
//! (lowest flat index wins) and surfaced in `GridFit::ambiguous_minimum`.

use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rayon::prelude::*;

use crate::domain::{GofStats, GridFit, ModelKind, ParamRange, ParamSpec, PosteriorSample};
use crate::error::FitError;
use crate::fit::ScaledEpoch;
use crate::math::axis_values;
use crate::models::model_grid;

/// Shared grid-search knobs, drawn from `FitConfig` by the epoch loop.
#[derive(Debug, Clone)]
pub struct GridSearchSettings<'a> {
    /// Axis length per parameter, canonical order.
    pub axis_steps: Vec<usize>,
    pub delchi: f64,
    /// Multipliers applied to `delchi` when the region comes up empty.
    pub relaxation: &'a [f64],
    pub sample_count: usize,
}

/// Unscaled parameter axes for the given ranges.
fn build_axes(
    specs: &[ParamSpec],
    ranges: &[ParamRange],
    steps: &[usize],
) -> Result<Vec<Vec<f64>>, FitError> {
    specs
        .iter()
        .zip(ranges.iter())
        .zip(steps.iter())
        .map(|((spec, range), &n)| axis_values(range, spec.spacing, n))
        .collect()
}

/// Decode a flat combination index (last axis fastest) into unscaled
/// parameter values.
fn decode_params(axes: &[Vec<f64>], flat: usize) -> Vec<f64> {
    let mut out = vec![0.0; axes.len()];
    let mut rest = flat;
    for k in (0..axes.len()).rev() {
        let len = axes[k].len();
        out[k] = axes[k][rest % len];
        rest /= len;
    }
    out
}

/// Chi-squared per grid cell, reduced over the wavelength axis.
fn chi_grid(kind: ModelKind, epoch: &ScaledEpoch, specs: &[ParamSpec], axes: &[Vec<f64>]) -> Vec<f64> {
    let scaled_axes: Vec<Vec<f64>> = axes
        .iter()
        .zip(specs.iter())
        .map(|(axis, spec)| axis.iter().map(|&v| v * spec.scale).collect())
        .collect();
    let axis_refs: Vec<&[f64]> = scaled_axes.iter().map(|a| a.as_slice()).collect();
    let lum = model_grid(kind, &epoch.wavelengths_aa, &axis_refs);

    let n_combos: usize = axes.iter().map(|a| a.len()).product();
    (0..n_combos)
        .into_par_iter()
        .map(|c| {
            let mut chi = 0.0;
            for w in 0..epoch.len() {
                let r = (epoch.lum_scaled[w] - lum[w * n_combos + c]) / epoch.err_scaled[w];
                chi += r * r;
            }
            chi
        })
        .collect()
}

/// Cells below `base + delchi`, relaxing the half-width through the ladder
/// until the region is non-empty. Returns the indices, the half-width that
/// produced them, and whether the ladder was exhausted.
fn region_indices(
    chi: &[f64],
    base: f64,
    delchi: f64,
    relaxation: &[f64],
) -> (Vec<usize>, f64, bool) {
    let mut widths = Vec::with_capacity(1 + relaxation.len());
    widths.push(delchi);
    widths.extend(relaxation.iter().map(|&m| delchi * m));

    for &width in &widths {
        let threshold = base + width;
        let members: Vec<usize> = chi
            .iter()
            .enumerate()
            .filter(|&(_, &c)| c <= threshold)
            .map(|(i, _)| i)
            .collect();
        if !members.is_empty() {
            return (members, width, false);
        }
    }
    (Vec::new(), *widths.last().unwrap_or(&delchi), true)
}

/// Per-parameter asymmetric errors from the region's bounding box.
fn region_errors(
    axes: &[Vec<f64>],
    region: &[usize],
    best: &[f64],
) -> (Vec<f64>, Vec<f64>) {
    let m = axes.len();
    let mut lo = best.to_vec();
    let mut hi = best.to_vec();
    for &idx in region {
        let p = decode_params(axes, idx);
        for j in 0..m {
            lo[j] = lo[j].min(p[j]);
            hi[j] = hi[j].max(p[j]);
        }
    }
    let err_lower = (0..m).map(|j| (best[j] - lo[j]).max(0.0)).collect();
    let err_upper = (0..m).map(|j| (hi[j] - best[j]).max(0.0)).collect();
    (err_lower, err_upper)
}

/// `sample_count` draws from `candidates`, weighted by inverse chi-squared.
fn draw_samples(
    axes: &[Vec<f64>],
    chi: &[f64],
    candidates: &[usize],
    sample_count: usize,
    rng: &mut StdRng,
) -> Result<Vec<PosteriorSample>, FitError> {
    let weights: Vec<f64> = candidates
        .iter()
        .map(|&i| 1.0 / chi[i].max(1e-12))
        .collect();
    let dist = WeightedIndex::new(&weights)
        .map_err(|e| FitError::numerics(format!("Posterior sampling weights invalid: {e}.")))?;

    Ok((0..sample_count)
        .map(|_| {
            let idx = candidates[dist.sample(rng)];
            PosteriorSample {
                values: decode_params(axes, idx),
                chi2: chi[idx],
            }
        })
        .collect())
}

fn in_window(windows: &[ParamRange], params: &[f64]) -> bool {
    windows.iter().zip(params.iter()).all(|(w, &v)| w.contains(v))
}

/// Full brute-force fit over the global parameter ranges.
///
/// When `guided` windows are given they restrict the point estimate and
/// the sampling pool; the uncertainty region is still scanned over the
/// full grid, with its threshold measured from the restricted minimum, so
/// guided errors stay comparable to unguided ones while the pool always
/// contains the reported best cell. If a window is so narrow that no grid
/// cell falls inside it, the restriction is dropped for this epoch.
pub fn fit_grid(
    kind: ModelKind,
    epoch: &ScaledEpoch,
    specs: &[ParamSpec],
    guided: Option<&[ParamRange]>,
    settings: &GridSearchSettings,
    rng: &mut StdRng,
) -> Result<GridFit, FitError> {
    let ranges: Vec<ParamRange> = specs.iter().map(|s| s.range).collect();
    let axes = build_axes(specs, &ranges, &settings.axis_steps)?;
    let chi = chi_grid(kind, epoch, specs, &axes);

    // Candidate set for the point estimate. A window so narrow that it
    // contains no grid cell drops the restriction for this epoch.
    let allowed = |i: usize| match guided {
        Some(windows) => in_window(windows, &decode_params(&axes, i)),
        None => true,
    };
    let mut restricted: Vec<usize> = (0..chi.len()).filter(|&i| allowed(i)).collect();
    let window_active = guided.is_some() && !restricted.is_empty();
    if restricted.is_empty() {
        restricted = (0..chi.len()).collect();
    }

    // Strict `<` keeps the lowest flat index on exact ties.
    let mut best_idx = restricted[0];
    let mut min_chi = chi[best_idx];
    for &i in &restricted[1..] {
        if chi[i] < min_chi {
            min_chi = chi[i];
            best_idx = i;
        }
    }

    let ties: Vec<usize> = restricted
        .iter()
        .copied()
        .filter(|&i| chi[i] == min_chi)
        .collect();
    let ambiguous_minimum = if ties.len() > 1 {
        Some(ties.iter().map(|&i| decode_params(&axes, i)).collect())
    } else {
        None
    };

    let best = decode_params(&axes, best_idx);

    // Region scan covers the full grid, but the threshold is measured
    // from the (possibly window-restricted) minimum, so the best cell is
    // always a member and the ladder never actually relaxes here.
    let (region, region_delchi, _) =
        region_indices(&chi, min_chi, settings.delchi, settings.relaxation);
    let (err_lower, err_upper) = region_errors(&axes, &region, &best);

    // Sampling pool: region intersected with the guided window when one
    // is active. The intersection contains at least the best cell.
    let pool: Vec<usize> = if window_active {
        region
            .iter()
            .copied()
            .filter(|&i| allowed(i))
            .collect()
    } else {
        region.clone()
    };
    let samples = draw_samples(&axes, &chi, &pool, settings.sample_count, rng)?;

    Ok(GridFit {
        values: best,
        err_lower,
        err_upper,
        gof: crate::math::gof_stats(min_chi, epoch.len(), kind.param_count()),
        ambiguous_minimum,
        region_delchi,
        degenerate_samples: false,
        samples,
    })
}

/// Coarse grid follow-up around an externally supplied point estimate
/// (the double-blackbody path: Levenberg-Marquardt provides the values,
/// the grid provides region errors and samples).
///
/// `windows` bound the axes (typically the gradient fit's +/- 1 sigma,
/// clipped to the global ranges); the region threshold is measured from
/// `seed_gof.chi2`, relaxing through the ladder. If even the widest
/// threshold admits no cell, the sample set degenerates to the seed point
/// and the fit is flagged.
pub fn grid_followup(
    kind: ModelKind,
    epoch: &ScaledEpoch,
    specs: &[ParamSpec],
    windows: &[ParamRange],
    seed_values: &[f64],
    seed_gof: GofStats,
    settings: &GridSearchSettings,
    rng: &mut StdRng,
) -> Result<GridFit, FitError> {
    let axes = build_axes(specs, windows, &settings.axis_steps)?;
    let chi = chi_grid(kind, epoch, specs, &axes);

    let (region, region_delchi, exhausted) =
        region_indices(&chi, seed_gof.chi2, settings.delchi, settings.relaxation);

    if exhausted {
        let samples = vec![
            PosteriorSample {
                values: seed_values.to_vec(),
                chi2: seed_gof.chi2,
            };
            settings.sample_count
        ];
        return Ok(GridFit {
            values: seed_values.to_vec(),
            err_lower: vec![0.0; specs.len()],
            err_upper: vec![0.0; specs.len()],
            gof: seed_gof,
            ambiguous_minimum: None,
            region_delchi,
            degenerate_samples: true,
            samples,
        });
    }

    let (err_lower, err_upper) = region_errors(&axes, &region, seed_values);
    let samples = draw_samples(&axes, &chi, &region, settings.sample_count, rng)?;

    Ok(GridFit {
        values: seed_values.to_vec(),
        err_lower,
        err_upper,
        gof: seed_gof,
        ambiguous_minimum: None,
        region_delchi,
        degenerate_samples: false,
        samples,
    })
}
