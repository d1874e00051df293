//! Synthetic epochs with known ground truth.
//!
//! Fitting tests need inputs whose right answer is known exactly. Two
//! flavors:
//!
//! - `exact_epoch`: observations equal the model, errors are a fixed
//!   fraction of the flux. The truth is the exact global optimum, so
//!   recovery assertions can use tight tolerances.
//! - `noisy_epoch`: Gaussian scatter at the quoted error level, seeded,
//!   for tests that exercise behavior under realistic noise.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use crate::domain::{BandPoint, EpochObservations, ModelKind};
use crate::models::predict;

/// A noiseless epoch: the model evaluated at each band's wavelength, with
/// `frac_err * flux` quoted as the 1-sigma error.
pub fn exact_epoch(
    kind: ModelKind,
    truth: &[f64],
    bands: &[(&str, f64)],
    mjd: f64,
    days_since_peak: f64,
    frac_err: f64,
) -> EpochObservations {
    let points = bands
        .iter()
        .map(|&(band, lam_aa)| {
            let lum = predict(kind, lam_aa, truth);
            BandPoint {
                band: band.to_string(),
                rest_wavelength_aa: lam_aa,
                lum_density: lum,
                lum_density_err: lum * frac_err,
            }
        })
        .collect();
    EpochObservations {
        mjd,
        days_since_peak,
        points,
    }
}

/// Like `exact_epoch`, but each observation is scattered by a seeded
/// Gaussian at the quoted error level.
pub fn noisy_epoch(
    kind: ModelKind,
    truth: &[f64],
    bands: &[(&str, f64)],
    mjd: f64,
    days_since_peak: f64,
    frac_err: f64,
    seed: u64,
) -> EpochObservations {
    let mut rng = StdRng::seed_from_u64(seed);
    let unit = Normal::new(0.0, 1.0).expect("valid normal parameters");
    let mut epoch = exact_epoch(kind, truth, bands, mjd, days_since_peak, frac_err);
    for point in &mut epoch.points {
        point.lum_density += point.lum_density_err * unit.sample(&mut rng);
    }
    epoch
}
