//! Chi-squared goodness-of-fit statistics.
//!
//! The canonical fit-quality scalar everywhere in this crate is the
//! *sigma distance*:
//!
//! ```text
//! sigma_distance = (red_chi2 - 1) / sqrt(2 / (N - M))
//! ```
//!
//! i.e. the signed distance of the reduced chi-squared from its ideal value
//! of 1, in units of its asymptotic 1-sigma spread. 0 is an ideal fit;
//! positive values indicate under-fitting, negative over-fitting. The sign
//! is kept; classification thresholds take the magnitude at the
//! comparison site, never here.
//!
//! When `N - M <= 0` (at least as many free parameters as data points) the
//! reduced chi-squared and everything derived from it are undefined and
//! reported as `None`, never NaN.

use crate::domain::GofStats;

/// Weighted chi-squared: `sum(((obs - model) / err)^2)`.
pub fn chi_squared(model: &[f64], obs: &[f64], err: &[f64]) -> f64 {
    model
        .iter()
        .zip(obs.iter())
        .zip(err.iter())
        .map(|((&m, &o), &e)| {
            let r = (o - m) / e;
            r * r
        })
        .sum()
}

/// Derive the full statistics block from a chi-squared value, `n` data
/// points and `m` free parameters.
pub fn gof_stats(chi2: f64, n: usize, m: usize) -> GofStats {
    if n <= m {
        return GofStats {
            chi2,
            red_chi2: None,
            red_chi2_1sigma: None,
            sigma_distance: None,
        };
    }
    let dof = (n - m) as f64;
    let red_chi2 = chi2 / dof;
    let tolerance = (2.0 / dof).sqrt();
    GofStats {
        chi2,
        red_chi2: Some(red_chi2),
        red_chi2_1sigma: Some(tolerance),
        sigma_distance: Some((red_chi2 - 1.0) / tolerance),
    }
}
