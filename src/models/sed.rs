//! Physical SED models.
//!
//! All models map (wavelength, parameters) to a rest-frame luminosity
//! density in erg/s/Angstrom. Blackbody evaluation is done in CGS with
//! wavelength in cm; the public `predict` entry point takes Angstrom and
//! converts internally.
//!
//! Numerical notes:
//! - The Planck denominator uses `exp_m1` so that small `hc/(lambda k T)`
//!   does not suffer catastrophic cancellation, and a huge exponent
//!   saturates to +inf (luminosity underflows to 0) instead of producing
//!   NaN.
//! - Radii span 1e13..1e19 cm, far outside comfortable optimizer ranges.
//!   The fitters therefore work in a scaled space: radii are multiplied by
//!   `RADIUS_SCALEFACTOR` and luminosities (and the power-law amplitude,
//!   which is linear in L) by `LUM_SCALEFACTOR = RADIUS_SCALEFACTOR^2`.
//!   Because L scales as R^2, the same formulas serve both spaces; the
//!   scaling is a reversible bijection undone before results are reported.

use rayon::prelude::*;

use crate::domain::ModelKind;

/// Speed of light (cm/s).
const C_CGS: f64 = 2.99792458e10;
/// Planck constant (erg s).
const H_CGS: f64 = 6.62607015e-27;
/// Boltzmann constant (erg/K).
const K_B_CGS: f64 = 1.380649e-16;

/// 1 Angstrom = 1e-8 cm.
pub const ANGSTROM_TO_CM: f64 = 1e-8;

/// Fixed conditioning factor applied to radius parameters before fitting.
pub const RADIUS_SCALEFACTOR: f64 = 1e-16;
/// Luminosity-density conditioning factor paired with the radius one
/// (L ~ R^2, so scaling R by s scales L by s^2).
pub const LUM_SCALEFACTOR: f64 = RADIUS_SCALEFACTOR * RADIUS_SCALEFACTOR;

/// Planck blackbody luminosity density, scaled by R^2 as the emitting-area
/// normalization. Wavelength in cm, radius in cm, temperature in K; output
/// in erg/s/Angstrom (the 1e-8 in the constant converts per-cm to per-A).
pub fn blackbody(lam_cm: f64, r_cm: f64, t_k: f64) -> f64 {
    let coeff = 8.0 * std::f64::consts::PI.powi(2) * H_CGS * C_CGS.powi(2) * 1e-8;
    let exponent = (H_CGS * C_CGS) / (lam_cm * K_B_CGS * t_k);
    let denom = exponent.exp_m1();
    coeff * (r_cm * r_cm) / lam_cm.powi(5) / denom
}

/// Unweighted sum of two independent blackbodies.
pub fn double_blackbody(lam_cm: f64, r1_cm: f64, t1_k: f64, r2_cm: f64, t2_k: f64) -> f64 {
    blackbody(lam_cm, r1_cm, t1_k) + blackbody(lam_cm, r2_cm, t2_k)
}

/// Power-law SED: `L = A * lambda^gamma`, wavelength in Angstrom, no
/// physical constants. Units of A follow the luminosity being modelled.
pub fn power_law(lam_aa: f64, a: f64, gamma: f64) -> f64 {
    a * lam_aa.powf(gamma)
}

/// Predict the luminosity density at one wavelength (Angstrom) for the
/// given model kind and parameter vector (canonical order, see
/// `ModelKind::param_names`).
///
/// The function is agnostic to the conditioning scale: feed it scaled
/// parameters and it returns scaled luminosities.
pub fn predict(kind: ModelKind, lam_aa: f64, params: &[f64]) -> f64 {
    match kind {
        ModelKind::SingleBb => blackbody(lam_aa * ANGSTROM_TO_CM, params[0], params[1]),
        ModelKind::DoubleBb => double_blackbody(
            lam_aa * ANGSTROM_TO_CM,
            params[0],
            params[1],
            params[2],
            params[3],
        ),
        ModelKind::PowerLaw => power_law(lam_aa, params[0], params[1]),
    }
}

/// Evaluate `kind` over the full Cartesian grid of parameter axes in one
/// parallel pass.
///
/// Returns a flat row-major array of shape
/// `(wavelengths.len(), axes[0].len(), ..., axes[K-1].len())`, the Rust
/// rendition of an outer-product broadcast. The brute-force fitter reduces
/// this over the wavelength axis to a chi-squared grid.
pub fn model_grid(kind: ModelKind, wavelengths_aa: &[f64], axes: &[&[f64]]) -> Vec<f64> {
    assert_eq!(axes.len(), kind.param_count());
    let n_combos: usize = axes.iter().map(|a| a.len()).product();
    let total = wavelengths_aa.len() * n_combos;

    (0..total)
        .into_par_iter()
        .map(|flat| {
            let w = flat / n_combos;
            let mut combo = flat % n_combos;
            // Decode the combination index, last axis fastest.
            let mut params = [0.0f64; 4];
            for k in (0..axes.len()).rev() {
                let len = axes[k].len();
                params[k] = axes[k][combo % len];
                combo /= len;
            }
            predict(kind, wavelengths_aa[w], &params[..axes.len()])
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blackbody_scales_as_radius_squared() {
        let lam = 5000.0 * ANGSTROM_TO_CM;
        let l1 = blackbody(lam, 1e14, 1e4);
        let l2 = blackbody(lam, 2e14, 1e4);
        assert!((l2 / l1 - 4.0).abs() < 1e-12);
    }

    #[test]
    fn blackbody_peak_follows_wien_displacement() {
        // lambda_max * T ~ 0.29 cm K for the per-wavelength Planck form.
        let t = 1e4;
        let lams: Vec<f64> = (1..2000).map(|i| i as f64 * 1e-6 * 1e-2).collect();
        let peak = lams
            .iter()
            .copied()
            .max_by(|a, b| {
                blackbody(*a, 1e14, t)
                    .partial_cmp(&blackbody(*b, 1e14, t))
                    .unwrap()
            })
            .unwrap();
        assert!((peak * t - 0.29).abs() / 0.29 < 0.05, "peak*T = {}", peak * t);
    }

    #[test]
    fn blackbody_is_finite_for_extreme_ratios() {
        // Tiny wavelength/temperature ratio: the exponential saturates and
        // the luminosity underflows to zero instead of NaN.
        let l = blackbody(10.0 * ANGSTROM_TO_CM, 1e15, 1e3);
        assert!(l.is_finite());
        assert!(l >= 0.0);
        // Large-wavelength limit stays finite too.
        let l = blackbody(1.0, 1e15, 5e5);
        assert!(l.is_finite() && l > 0.0);
    }

    #[test]
    fn scaled_and_unscaled_blackbody_agree() {
        let lam = 6000.0 * ANGSTROM_TO_CM;
        let r = 3.2e15;
        let t = 1.2e4;
        let unscaled = blackbody(lam, r, t);
        let scaled = blackbody(lam, r * RADIUS_SCALEFACTOR, t);
        assert!((scaled / LUM_SCALEFACTOR / unscaled - 1.0).abs() < 1e-12);
    }

    #[test]
    fn grid_matches_scalar_evaluation_pointwise() {
        let wavelengths = [3000.0, 5000.0, 8000.0];
        let r_values = [1e14, 1e15, 1e16, 1e17];
        let t_values = [5e3, 1e4, 2e4];
        let grid = model_grid(
            ModelKind::SingleBb,
            &wavelengths,
            &[&r_values, &t_values],
        );
        assert_eq!(grid.len(), wavelengths.len() * r_values.len() * t_values.len());
        for (w, &lam) in wavelengths.iter().enumerate() {
            for (i, &r) in r_values.iter().enumerate() {
                for (j, &t) in t_values.iter().enumerate() {
                    let flat = (w * r_values.len() + i) * t_values.len() + j;
                    let scalar = predict(ModelKind::SingleBb, lam, &[r, t]);
                    assert!((grid[flat] - scalar).abs() <= scalar.abs() * 1e-14);
                }
            }
        }
    }

    #[test]
    fn double_bb_grid_matches_scalar() {
        let wavelengths = [4000.0, 7000.0];
        let r1 = [1e14, 1e15];
        let t1 = [2e3, 5e3];
        let r2 = [1e14, 1e16];
        let t2 = [2e4, 5e4];
        let grid = model_grid(
            ModelKind::DoubleBb,
            &wavelengths,
            &[&r1, &t1, &r2, &t2],
        );
        // Spot-check one cell: w=1, indices (1, 0, 1, 1).
        let flat = ((((1 * r1.len() + 1) * t1.len() + 0) * r2.len() + 1) * t2.len()) + 1;
        let scalar = predict(ModelKind::DoubleBb, 7000.0, &[1e15, 2e3, 1e16, 5e4]);
        assert!((grid[flat] - scalar).abs() <= scalar.abs() * 1e-14);
    }

    #[test]
    fn power_law_is_plain_amplitude_times_power() {
        let l = power_law(5000.0, 2.0e43, -2.0);
        assert!((l - 2.0e43 * 5000.0f64.powf(-2.0)).abs() < 1e30);
    }
}
