//! Bounded Levenberg-Marquardt point estimation.
//!
//! The gradient fitter minimizes the weighted chi-squared of one epoch's
//! SED in the scaled parameter space, with hard box bounds: every
//! candidate step is clamped back into the admissible ranges before it is
//! evaluated. Damping follows the classic schedule: multiply the damping
//! factor by 10 on a rejected step, by 0.1 on an accepted one.
//!
//! Non-convergence is an expected per-epoch outcome, not an error: the
//! function returns `None` and the caller counts the failure.

use nalgebra::{DMatrix, DVector};

use crate::domain::{AxisSpacing, GradientFit, ModelKind, ParamRange, ParamSpec};
use crate::fit::ScaledEpoch;
use crate::math::{chi_squared, gof_stats};
use crate::models::predict;

/// Levenberg-Marquardt knobs. The defaults suit every model kind in this
/// crate; they exist as a struct mostly so tests can tighten or loosen the
/// iteration cap.
#[derive(Debug, Clone, Copy)]
pub struct LmOptions {
    pub max_iterations: usize,
    pub initial_lambda: f64,
    pub lambda_up: f64,
    pub lambda_down: f64,
    /// Converged when the largest relative parameter change of an accepted
    /// step drops below this.
    pub step_tolerance: f64,
}

impl Default for LmOptions {
    fn default() -> Self {
        Self {
            max_iterations: 400,
            initial_lambda: 1e-3,
            lambda_up: 10.0,
            lambda_down: 0.1,
            step_tolerance: 1e-10,
        }
    }
}

/// Scaled box bounds for each parameter, honoring guided window overrides.
fn scaled_bounds(specs: &[ParamSpec], windows: Option<&[ParamRange]>) -> Vec<ParamRange> {
    specs
        .iter()
        .enumerate()
        .map(|(j, spec)| {
            let range = windows.map_or(spec.range, |w| w[j]);
            ParamRange::new(range.min * spec.scale, range.max * spec.scale)
        })
        .collect()
}

/// Starting point: geometric midpoint for log-natured parameters,
/// arithmetic midpoint for linear ones.
fn initial_point(specs: &[ParamSpec], bounds: &[ParamRange]) -> Vec<f64> {
    specs
        .iter()
        .zip(bounds.iter())
        .map(|(spec, b)| match spec.spacing {
            AxisSpacing::Log => (b.min * b.max).sqrt(),
            AxisSpacing::Linear => 0.5 * (b.min + b.max),
        })
        .collect()
}

fn model_at(kind: ModelKind, epoch: &ScaledEpoch, params: &[f64]) -> Vec<f64> {
    epoch
        .wavelengths_aa
        .iter()
        .map(|&lam| predict(kind, lam, params))
        .collect()
}

/// Forward-difference Jacobian of the *weighted* model,
/// `J[i][j] = (d model_i / d p_j) / err_i`. Steps stay inside the bounds.
fn weighted_jacobian(
    kind: ModelKind,
    epoch: &ScaledEpoch,
    params: &[f64],
    bounds: &[ParamRange],
    base_model: &[f64],
) -> DMatrix<f64> {
    let n = epoch.len();
    let m = params.len();
    let mut jac = DMatrix::zeros(n, m);

    for j in 0..m {
        let span = bounds[j].width();
        let mut h = (params[j].abs() * 1e-7).max(span * 1e-9);
        if params[j] + h > bounds[j].max {
            h = -h;
        }
        let mut bumped = params.to_vec();
        bumped[j] += h;
        for (i, &lam) in epoch.wavelengths_aa.iter().enumerate() {
            let f = predict(kind, lam, &bumped);
            jac[(i, j)] = (f - base_model[i]) / h / epoch.err_scaled[i];
        }
    }
    jac
}

/// Fit `kind` to one epoch with bounded Levenberg-Marquardt.
///
/// `windows`, when given, replaces the global per-parameter ranges (the
/// guided-propagation path). Returns `None` on non-convergence or when the
/// covariance approximation cannot be formed.
pub fn fit_gradient(
    kind: ModelKind,
    epoch: &ScaledEpoch,
    specs: &[ParamSpec],
    windows: Option<&[ParamRange]>,
    opts: &LmOptions,
) -> Option<GradientFit> {
    let m = kind.param_count();
    let n = epoch.len();
    if n < m.min(2) {
        return None;
    }

    let bounds = scaled_bounds(specs, windows);
    let mut params = initial_point(specs, &bounds);
    let mut model = model_at(kind, epoch, &params);
    let mut chi2 = chi_squared(&model, &epoch.lum_scaled, &epoch.err_scaled);
    if !chi2.is_finite() {
        return None;
    }

    let mut lambda = opts.initial_lambda;
    let mut converged = false;
    let mut accepted_any = false;
    let mut iterations = 0;

    for iter in 0..opts.max_iterations {
        iterations = iter + 1;

        let jac = weighted_jacobian(kind, epoch, &params, &bounds, &model);
        let residuals = DVector::from_fn(n, |i, _| {
            (epoch.lum_scaled[i] - model[i]) / epoch.err_scaled[i]
        });
        let hessian = jac.transpose() * &jac;
        let gradient = jac.transpose() * &residuals;

        // Marquardt damping: inflate the diagonal, solve, clamp, evaluate.
        let mut damped = hessian.clone();
        for k in 0..m {
            damped[(k, k)] *= 1.0 + lambda;
        }
        let svd = damped.svd(true, true);
        let delta = match svd.solve(&gradient, 1e-300) {
            Ok(d) => d,
            Err(_) => {
                lambda *= opts.lambda_up;
                continue;
            }
        };

        let candidate: Vec<f64> = params
            .iter()
            .zip(delta.iter())
            .zip(bounds.iter())
            .map(|((&p, &d), b)| b.clamp(p + d))
            .collect();
        let cand_model = model_at(kind, epoch, &candidate);
        let cand_chi2 = chi_squared(&cand_model, &epoch.lum_scaled, &epoch.err_scaled);

        if cand_chi2.is_finite() && cand_chi2 < chi2 {
            let max_rel_step = params
                .iter()
                .zip(candidate.iter())
                .map(|(&old, &new)| (new - old).abs() / old.abs().max(f64::MIN_POSITIVE))
                .fold(0.0f64, f64::max);
            params = candidate;
            model = cand_model;
            chi2 = cand_chi2;
            accepted_any = true;
            lambda = (lambda * opts.lambda_down).max(1e-12);
            if max_rel_step < opts.step_tolerance {
                converged = true;
                break;
            }
        } else {
            lambda *= opts.lambda_up;
            // A stalled solver pinned at huge damping is done improving,
            // but only if it ever improved at all; a stall with zero
            // accepted steps is a failed fit, not a minimum.
            if lambda > 1e12 {
                converged = accepted_any;
                break;
            }
        }
    }

    if !converged {
        return None;
    }

    // Covariance approximation from the undamped normal matrix.
    let jac = weighted_jacobian(kind, epoch, &params, &bounds, &model);
    let hessian = jac.transpose() * &jac;
    let covariance = hessian.pseudo_inverse(1e-12).ok()?;

    let std_errs_scaled: Vec<f64> = (0..m).map(|j| covariance[(j, j)].max(0.0).sqrt()).collect();
    let mut correlation = vec![vec![0.0; m]; m];
    for i in 0..m {
        for j in 0..m {
            if i == j {
                correlation[i][j] = 1.0;
            } else {
                let denom = std_errs_scaled[i] * std_errs_scaled[j];
                if denom > 0.0 {
                    correlation[i][j] = (covariance[(i, j)] / denom).clamp(-1.0, 1.0);
                }
            }
        }
    }

    let values: Vec<f64> = params
        .iter()
        .zip(specs.iter())
        .map(|(&p, spec)| p / spec.scale)
        .collect();
    let std_errs: Vec<f64> = std_errs_scaled
        .iter()
        .zip(specs.iter())
        .map(|(&e, spec)| e / spec.scale)
        .collect();
    if values.iter().any(|v| !v.is_finite()) || std_errs.iter().any(|e| !e.is_finite()) {
        return None;
    }

    Some(GradientFit {
        values,
        std_errs,
        correlation,
        gof: gof_stats(chi2, n, m),
        iterations,
    })
}
