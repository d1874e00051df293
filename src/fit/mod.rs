//! SED fitting orchestration.
//!
//! Responsibilities:
//!
//! - bounded Levenberg-Marquardt point estimates (`gradient`)
//! - brute-force chi-squared grids with uncertainty regions and
//!   posterior-like sampling (`brute`)
//! - the per-epoch loop and result-table assembly (`epoch`)
//! - UVOT-anchored guided propagation (`guided`)

pub mod brute;
pub mod epoch;
pub mod gradient;
pub mod guided;

pub use brute::*;
pub use epoch::*;
pub use gradient::*;
pub use guided::*;

use crate::domain::EpochObservations;
use crate::models::LUM_SCALEFACTOR;

/// One epoch's observations in the fitters' scaled space.
///
/// Luminosities are multiplied by `LUM_SCALEFACTOR` so that, combined with
/// the radius/amplitude parameter scaling, every quantity the optimizer
/// touches sits in a numerically comfortable range. The transformation is
/// a fixed bijection; results are unscaled before they leave the fitters.
#[derive(Debug, Clone)]
pub struct ScaledEpoch {
    pub wavelengths_aa: Vec<f64>,
    pub lum_scaled: Vec<f64>,
    pub err_scaled: Vec<f64>,
}

impl ScaledEpoch {
    pub fn from_epoch(epoch: &EpochObservations) -> Self {
        Self {
            wavelengths_aa: epoch.points.iter().map(|p| p.rest_wavelength_aa).collect(),
            lum_scaled: epoch
                .points
                .iter()
                .map(|p| p.lum_density * LUM_SCALEFACTOR)
                .collect(),
            err_scaled: epoch
                .points
                .iter()
                .map(|p| p.lum_density_err * LUM_SCALEFACTOR)
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.wavelengths_aa.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wavelengths_aa.is_empty()
    }
}
