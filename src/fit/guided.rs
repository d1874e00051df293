//! Anchor-guided fitting across the light curve.
//!
//! Epochs carrying a rest-frame UV band (blueward of the configured
//! cutoff) constrain the SED shape well enough to trust on their own.
//! Those are fitted first, unguided; the ones whose fit quality passes
//! the sigma-distance threshold become *anchors*. Every remaining epoch
//! is then fitted inside per-parameter windows derived from its nearest
//! anchor, widened with temporal distance:
//!
//! ```text
//! [anchor - (k * dt + 1) * err_lower,  anchor + (k * dt + 1) * err_upper]
//! ```
//!
//! A window edge that leaves the global range (or inverts) falls back to
//! the corresponding global bound. With no anchor-eligible epochs, or no
//! good anchors among them, the whole run falls back to unguided fitting
//! and says so in the output warnings.

use rayon::prelude::*;

use crate::domain::{EpochObservations, FitConfig, ModelKind, ParamRange, RunOutput};
use crate::error::FitError;
use crate::fit::epoch::{assemble, fit_epoch};

/// One good anchor epoch's point estimate with asymmetric errors.
#[derive(Debug, Clone)]
struct Anchor {
    mjd: f64,
    values: Vec<f64>,
    err_lower: Vec<f64>,
    err_upper: Vec<f64>,
}

/// Guided search window for one parameter.
///
/// Edges that escape the global range, invert, or go non-finite fall back
/// to the global bounds; a window that still ends up empty collapses to
/// the full range.
fn param_window(
    anchor: f64,
    err_lower: f64,
    err_upper: f64,
    dt: f64,
    err_scale: f64,
    global: &ParamRange,
) -> ParamRange {
    let stretch = err_scale * dt + 1.0;
    let mut lo = anchor - stretch * err_lower;
    let mut hi = anchor + stretch * err_upper;
    if !lo.is_finite() || lo <= global.min || lo >= global.max {
        lo = global.min;
    }
    if !hi.is_finite() || hi >= global.max || hi <= global.min {
        hi = global.max;
    }
    if hi <= lo {
        *global
    } else {
        ParamRange::new(lo, hi)
    }
}

/// Pull the anchor-quality quantities out of a fitted row.
///
/// The authoritative result differs per model: grid for single BB and
/// power law, gradient (symmetric errors) for double BB.
fn anchor_from_row(kind: ModelKind, row: &crate::domain::EpochRow) -> Option<(Anchor, f64)> {
    match kind {
        ModelKind::SingleBb | ModelKind::PowerLaw => {
            let grid = row.grid.as_ref()?;
            let sigma = grid.gof.sigma_distance?;
            Some((
                Anchor {
                    mjd: row.mjd,
                    values: grid.values.clone(),
                    err_lower: grid.err_lower.clone(),
                    err_upper: grid.err_upper.clone(),
                },
                sigma,
            ))
        }
        ModelKind::DoubleBb => {
            let gradient = row.gradient.as_ref()?;
            let sigma = gradient.gof.sigma_distance?;
            Some((
                Anchor {
                    mjd: row.mjd,
                    values: gradient.values.clone(),
                    err_lower: gradient.std_errs.clone(),
                    err_upper: gradient.std_errs.clone(),
                },
                sigma,
            ))
        }
    }
}

/// Fit the light curve with anchor-guided propagation.
pub fn run_guided(
    kind: ModelKind,
    epochs: &[EpochObservations],
    config: &FitConfig,
) -> Result<RunOutput, FitError> {
    config.validate(kind)?;
    if epochs.is_empty() {
        return Err(FitError::invalid_input("No epochs to fit."));
    }
    let specs = config.param_specs(kind);

    let (eligible, rest): (Vec<&EpochObservations>, Vec<&EpochObservations>) = epochs
        .iter()
        .partition(|e| e.has_band_below(config.uv_cutoff_aa));

    if eligible.is_empty() {
        let mut out = crate::fit::run(kind, epochs, config)?;
        out.warnings.push(format!(
            "No epoch carries a band blueward of {} A; guided fitting fell back to unguided.",
            config.uv_cutoff_aa
        ));
        return Ok(out);
    }

    // Phase 1: anchor-eligible epochs, standard policy.
    let anchor_outcomes = eligible
        .par_iter()
        .map(|epoch| fit_epoch(kind, epoch, &specs, config, None))
        .collect::<Result<Vec<_>, _>>()?;

    let anchors: Vec<Anchor> = anchor_outcomes
        .iter()
        .filter_map(|o| anchor_from_row(kind, &o.row))
        .filter(|(_, sigma)| sigma.abs() <= config.good_fit_sigma_dist)
        .map(|(anchor, _)| anchor)
        .collect();

    if anchors.is_empty() {
        let rest_outcomes = rest
            .par_iter()
            .map(|epoch| fit_epoch(kind, epoch, &specs, config, None))
            .collect::<Result<Vec<_>, _>>()?;
        let mut outcomes = anchor_outcomes;
        outcomes.extend(rest_outcomes);
        let warnings = vec![format!(
            "No anchor epoch fit within |sigma distance| <= {}; guided fitting fell back to unguided.",
            config.good_fit_sigma_dist
        )];
        return Ok(assemble(kind, outcomes, false, warnings));
    }

    // Phase 2: everything else, bounded by its nearest good anchor.
    let guided_outcomes = rest
        .par_iter()
        .map(|epoch| {
            let anchor = anchors
                .iter()
                .min_by(|a, b| {
                    (a.mjd - epoch.mjd)
                        .abs()
                        .partial_cmp(&(b.mjd - epoch.mjd).abs())
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .ok_or_else(|| FitError::numerics("Anchor set emptied unexpectedly."))?;
            let dt = (epoch.mjd - anchor.mjd).abs();
            let windows: Vec<ParamRange> = specs
                .iter()
                .enumerate()
                .map(|(j, spec)| {
                    param_window(
                        anchor.values[j],
                        anchor.err_lower[j],
                        anchor.err_upper[j],
                        dt,
                        config.guided_err_scale,
                        &spec.range,
                    )
                })
                .collect();
            fit_epoch(kind, epoch, &specs, config, Some(&windows))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut outcomes = anchor_outcomes;
    outcomes.extend(guided_outcomes);
    Ok(assemble(kind, outcomes, true, Vec::new()))
}
