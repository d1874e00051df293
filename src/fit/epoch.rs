//! Per-epoch fitting loop.
//!
//! Epochs are independent fitting units and run in parallel; order is
//! restored afterwards. Every epoch gets a result row even when nothing
//! could be fitted (too few bands, non-converged optimizer); absent
//! quantities are `None`, never NaN, so downstream tables keep one row per
//! timestamp.
//!
//! Per-model fitting policy:
//! - single BB, power law: gradient fit (context only) + full brute grid
//!   (authoritative values, errors, samples)
//! - double BB: gradient fit is authoritative; a coarse grid around its
//!   +/- 1 sigma box supplies region errors and samples. A failed gradient
//!   fit leaves the epoch without a grid result.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;

use crate::domain::{
    EpochObservations, EpochRow, FitConfig, ModelKind, ParamRange, ParamSpec, RunOutput, SampleRow,
};
use crate::error::FitError;
use crate::fit::{fit_gradient, fit_grid, grid_followup, GridSearchSettings, LmOptions, ScaledEpoch};

/// Everything one epoch contributes to the run output.
#[derive(Debug, Clone)]
pub(crate) struct EpochOutcome {
    pub row: EpochRow,
    pub samples: Vec<SampleRow>,
    pub failed_gradient: usize,
}

/// Per-epoch RNG seed derived from the run seed and the epoch timestamp,
/// so parallel scheduling cannot change which epoch draws which samples.
fn epoch_seed(base: u64, mjd: f64) -> u64 {
    let mut hasher = DefaultHasher::new();
    base.hash(&mut hasher);
    mjd.to_bits().hash(&mut hasher);
    hasher.finish()
}

/// Grid axis lengths per model kind. The power law trades gamma resolution
/// for amplitude resolution (the amplitude spans nine decades); the double
/// BB uses a deliberately coarse axis because cost grows as the 4th power.
pub(crate) fn axis_steps_for(kind: ModelKind, config: &FitConfig) -> Vec<usize> {
    match kind {
        ModelKind::SingleBb => vec![config.grid_steps, config.grid_steps],
        ModelKind::PowerLaw => vec![config.grid_steps * 2, (config.grid_steps / 2).max(2)],
        ModelKind::DoubleBb => vec![config.dbb_grid_steps; 4],
    }
}

/// +/- 1 sigma box around a gradient fit, clipped to the admissible
/// ranges. When the epoch is guided, the admissible range is its guided
/// window, not the global one, so the follow-up grid cannot spill outside
/// the constraint the gradient fit honored. A collapsed axis (zero-width
/// after clipping) falls back to the full admissible range.
fn one_sigma_windows(
    values: &[f64],
    std_errs: &[f64],
    specs: &[ParamSpec],
    guided: Option<&[ParamRange]>,
) -> Vec<ParamRange> {
    values
        .iter()
        .zip(std_errs.iter())
        .zip(specs.iter())
        .enumerate()
        .map(|(j, ((&v, &e), spec))| {
            let outer = guided.map_or(spec.range, |w| w[j]);
            let lo = outer.clamp(v - e);
            let hi = outer.clamp(v + e);
            if hi > lo {
                ParamRange::new(lo, hi)
            } else {
                outer
            }
        })
        .collect()
}

/// Fit one epoch. `guided` carries the per-parameter search windows when
/// anchor-guided propagation is active for this epoch.
pub(crate) fn fit_epoch(
    kind: ModelKind,
    epoch: &EpochObservations,
    specs: &[ParamSpec],
    config: &FitConfig,
    guided: Option<&[ParamRange]>,
) -> Result<EpochOutcome, FitError> {
    let mut row = EpochRow {
        mjd: epoch.mjd,
        days_since_peak: epoch.days_since_peak,
        n_bands: epoch.n_bands(),
        bands: epoch.bands(),
        wavelengths_aa: epoch.wavelengths_aa(),
        gradient: None,
        grid: None,
        guided_windows: guided.map(|w| w.to_vec()),
    };

    if epoch.n_bands() < config.min_bands(kind) {
        return Ok(EpochOutcome {
            row,
            samples: Vec::new(),
            failed_gradient: 0,
        });
    }

    let scaled = ScaledEpoch::from_epoch(epoch);
    let mut rng = StdRng::seed_from_u64(epoch_seed(config.seed, epoch.mjd));
    let settings = GridSearchSettings {
        axis_steps: axis_steps_for(kind, config),
        delchi: config.delchi,
        relaxation: &config.delchi_relaxation,
        sample_count: config.sample_count,
    };
    let lm = LmOptions::default();

    let mut failed_gradient = 0;
    match kind {
        ModelKind::SingleBb | ModelKind::PowerLaw => {
            // The gradient fit is context only here; guided epochs skip it
            // because the grid alone carries the propagated constraint.
            if guided.is_none() {
                row.gradient = fit_gradient(kind, &scaled, specs, None, &lm);
                if row.gradient.is_none() {
                    failed_gradient = 1;
                }
            }
            row.grid = Some(fit_grid(kind, &scaled, specs, guided, &settings, &mut rng)?);
        }
        ModelKind::DoubleBb => {
            row.gradient = fit_gradient(kind, &scaled, specs, guided, &lm);
            match &row.gradient {
                Some(g) => {
                    let windows = one_sigma_windows(&g.values, &g.std_errs, specs, guided);
                    row.grid = Some(grid_followup(
                        kind, &scaled, specs, &windows, &g.values, g.gof, &settings, &mut rng,
                    )?);
                }
                None => failed_gradient = 1,
            }
        }
    }

    let samples = match &row.grid {
        Some(grid) => grid
            .samples
            .iter()
            .enumerate()
            .map(|(i, s)| SampleRow {
                mjd: epoch.mjd,
                sample_index: i,
                days_since_peak: epoch.days_since_peak,
                n_bands: epoch.n_bands(),
                values: s.values.clone(),
                chi2: s.chi2,
                epoch_gof: grid.gof,
            })
            .collect(),
        None => Vec::new(),
    };

    Ok(EpochOutcome {
        row,
        samples,
        failed_gradient,
    })
}

/// Merge per-epoch outcomes into a run output, ordered by MJD.
pub(crate) fn assemble(
    kind: ModelKind,
    mut outcomes: Vec<EpochOutcome>,
    guided: bool,
    warnings: Vec<String>,
) -> RunOutput {
    outcomes.sort_by(|a, b| {
        a.row
            .mjd
            .partial_cmp(&b.row.mjd)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let failed_gradient_fits = outcomes.iter().map(|o| o.failed_gradient).sum();
    let mut rows = Vec::with_capacity(outcomes.len());
    let mut samples = Vec::new();
    for outcome in outcomes {
        rows.push(outcome.row);
        samples.extend(outcome.samples);
    }
    RunOutput {
        model: kind,
        rows,
        samples,
        failed_gradient_fits,
        guided,
        warnings,
    }
}

/// Fit every epoch independently with the standard (unguided) policy.
pub fn run(
    kind: ModelKind,
    epochs: &[EpochObservations],
    config: &FitConfig,
) -> Result<RunOutput, FitError> {
    config.validate(kind)?;
    if epochs.is_empty() {
        return Err(FitError::invalid_input("No epochs to fit."));
    }
    let specs = config.param_specs(kind);
    let outcomes = epochs
        .par_iter()
        .map(|epoch| fit_epoch(kind, epoch, &specs, config, None))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(assemble(kind, outcomes, false, Vec::new()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::exact_epoch;

    fn quick_config() -> FitConfig {
        FitConfig {
            grid_steps: 100,
            sample_count: 40,
            ..FitConfig::default()
        }
    }

    #[test]
    fn single_bb_run_recovers_truth_per_epoch() {
        let config = quick_config();
        let truth = [1e15, 1e4];
        let epochs: Vec<EpochObservations> = (0..3)
            .map(|i| {
                exact_epoch(
                    ModelKind::SingleBb,
                    &truth,
                    &[("UVOT_U", 2500.0), ("ZTF_g", 4722.7), ("ZTF_r", 6339.6)],
                    58000.0 + i as f64,
                    i as f64,
                    0.05,
                )
            })
            .collect();

        let out = run(ModelKind::SingleBb, &epochs, &config).unwrap();
        assert_eq!(out.rows.len(), 3);
        assert!(!out.guided);
        for row in &out.rows {
            let gradient = row.gradient.as_ref().expect("gradient converges");
            let grid = row.grid.as_ref().expect("grid always present");
            assert!((gradient.values[0] / truth[0] - 1.0).abs() < 0.05);
            assert!((gradient.values[1] / truth[1] - 1.0).abs() < 0.05);
            assert!((grid.values[0] / truth[0] - 1.0).abs() < 0.20);
            assert!((grid.values[1] / truth[1] - 1.0).abs() < 0.20);
        }
        assert_eq!(out.samples.len(), 3 * 40);
    }

    #[test]
    fn noisy_three_band_epoch_recovers_blackbody_parameters() {
        // 2% Gaussian scatter; R is looser than T because of the R-T
        // degeneracy at three-band sampling.
        let config = FitConfig::default();
        let truth = [1e15, 1e4];
        let epoch = crate::data::noisy_epoch(
            ModelKind::SingleBb,
            &truth,
            &[("u", 3000.0), ("v", 5000.0), ("i", 8000.0)],
            58000.0,
            0.0,
            0.02,
            42,
        );
        let out = run(ModelKind::SingleBb, &[epoch], &config).unwrap();
        let row = &out.rows[0];
        let gradient = row.gradient.as_ref().expect("gradient converges");
        let grid = row.grid.as_ref().unwrap();
        assert!((gradient.values[1] / truth[1] - 1.0).abs() < 0.05);
        assert!((gradient.values[0] / truth[0] - 1.0).abs() < 0.20);
        assert!((grid.values[1] / truth[1] - 1.0).abs() < 0.05);
        assert!((grid.values[0] / truth[0] - 1.0).abs() < 0.20);
        assert!(grid.gof.sigma_distance.unwrap().abs() <= 3.0);
        // Region errors bracket the truth.
        assert!(grid.values[0] - grid.err_lower[0] <= truth[0] * 1.25);
        assert!(grid.values[0] + grid.err_upper[0] >= truth[0] * 0.8);
    }

    #[test]
    fn rows_are_sorted_by_mjd() {
        let config = quick_config();
        let truth = [1e15, 1e4];
        let epochs: Vec<EpochObservations> = [58005.0, 58001.0, 58003.0]
            .iter()
            .map(|&mjd| {
                exact_epoch(
                    ModelKind::SingleBb,
                    &truth,
                    &[("ZTF_g", 4722.7), ("ZTF_r", 6339.6)],
                    mjd,
                    mjd - 58001.0,
                    0.05,
                )
            })
            .collect();
        let out = run(ModelKind::SingleBb, &epochs, &config).unwrap();
        let mjds: Vec<f64> = out.rows.iter().map(|r| r.mjd).collect();
        assert_eq!(mjds, vec![58001.0, 58003.0, 58005.0]);
    }

    #[test]
    fn degenerate_dof_epoch_keeps_row_with_undefined_reduced_chi2() {
        // Exactly N == M bands: fits proceed, reduced quantities are None.
        let config = quick_config();
        let epoch = exact_epoch(
            ModelKind::SingleBb,
            &[1e15, 1e4],
            &[("ZTF_g", 4722.7), ("ZTF_r", 6339.6)],
            58000.0,
            0.0,
            0.05,
        );
        let out = run(ModelKind::SingleBb, &[epoch], &config).unwrap();
        let grid = out.rows[0].grid.as_ref().unwrap();
        assert!(grid.gof.red_chi2.is_none());
        assert!(grid.gof.sigma_distance.is_none());
        for s in &out.samples {
            assert!(s.epoch_gof.red_chi2.is_none());
        }
    }

    #[test]
    fn under_threshold_epoch_gets_all_undefined_row() {
        let config = quick_config();
        let one_band = exact_epoch(
            ModelKind::SingleBb,
            &[1e15, 1e4],
            &[("ZTF_g", 4722.7)],
            58000.0,
            0.0,
            0.05,
        );
        let full = exact_epoch(
            ModelKind::SingleBb,
            &[1e15, 1e4],
            &[("ZTF_g", 4722.7), ("ZTF_r", 6339.6), ("UVOT_U", 2500.0)],
            58001.0,
            1.0,
            0.05,
        );
        let out = run(ModelKind::SingleBb, &[one_band, full], &config).unwrap();
        assert_eq!(out.rows.len(), 2);
        let skipped = &out.rows[0];
        assert!(skipped.gradient.is_none());
        assert!(skipped.grid.is_none());
        assert_eq!(skipped.n_bands, 1);
        // Skips are not optimizer failures.
        assert_eq!(out.failed_gradient_fits, 0);
        assert!(out.samples.iter().all(|s| s.mjd == 58001.0));
    }

    #[test]
    fn repeated_runs_are_bit_identical() {
        let config = quick_config();
        let epochs = vec![exact_epoch(
            ModelKind::SingleBb,
            &[3e14, 8e3],
            &[("UVOT_U", 2500.0), ("ZTF_g", 4722.7), ("ZTF_r", 6339.6)],
            58000.0,
            0.0,
            0.08,
        )];
        let a = run(ModelKind::SingleBb, &epochs, &config).unwrap();
        let b = run(ModelKind::SingleBb, &epochs, &config).unwrap();
        assert_eq!(a.samples.len(), b.samples.len());
        for (sa, sb) in a.samples.iter().zip(b.samples.iter()) {
            assert_eq!(sa.values, sb.values);
            assert_eq!(sa.chi2, sb.chi2);
        }
    }

    #[test]
    fn sigma_windows_stay_inside_guided_limits() {
        let config = FitConfig::default();
        let specs = config.param_specs(ModelKind::SingleBb);
        let guided = vec![ParamRange::new(5e14, 2e15), ParamRange::new(9e3, 1.1e4)];
        // Error bars wide enough to overflow the guided box on both sides.
        let windows = one_sigma_windows(&[1e15, 1e4], &[5e15, 5e3], &specs, Some(&guided));
        for (w, g) in windows.iter().zip(guided.iter()) {
            assert!(w.is_within(g));
        }
        // Zero errors collapse an axis; the fallback is the guided limit,
        // not the global range.
        let collapsed = one_sigma_windows(&[1e15, 1e4], &[0.0, 0.0], &specs, Some(&guided));
        assert_eq!(collapsed[0], guided[0]);
        assert_eq!(collapsed[1], guided[1]);
        // Unguided epochs keep clipping to the global ranges.
        let unguided = one_sigma_windows(&[1e15, 1e4], &[0.0, 0.0], &specs, None);
        assert_eq!(unguided[0], specs[0].range);
        assert_eq!(unguided[1], specs[1].range);
    }

    #[test]
    fn double_bb_grid_keeps_gradient_point_estimate() {
        let config = FitConfig {
            dbb_grid_steps: 6,
            sample_count: 30,
            ..FitConfig::default()
        };
        let truth = [2e15, 4e3, 5e14, 2e4];
        let epoch = exact_epoch(
            ModelKind::DoubleBb,
            &truth,
            &[
                ("UVOT_UVW2", 2079.0),
                ("UVOT_U", 3465.0),
                ("ZTF_g", 4722.7),
                ("ZTF_r", 6339.6),
                ("ATLAS_o", 6866.3),
            ],
            58000.0,
            0.0,
            0.05,
        );
        let out = run(ModelKind::DoubleBb, &[epoch], &config).unwrap();
        let row = &out.rows[0];
        match (&row.gradient, &row.grid) {
            (Some(g), Some(grid)) => {
                assert_eq!(grid.values, g.values);
                assert_eq!(grid.gof.chi2, g.gof.chi2);
                assert_eq!(out.failed_gradient_fits, 0);
            }
            (None, grid) => {
                // Non-convergence is a counted, non-fatal outcome and the
                // grid stage cannot run without its seed.
                assert!(grid.is_none());
                assert_eq!(out.failed_gradient_fits, 1);
            }
            (Some(_), None) => panic!("grid must follow a converged gradient fit"),
        }
    }
}
