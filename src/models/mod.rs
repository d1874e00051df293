//! SED model evaluation for single BB / double BB / power law.
//!
//! The fitters rely on two primitive operations:
//! - predict the luminosity density at one wavelength given a parameter
//!   vector (for residuals and the gradient fitter)
//! - evaluate the model over the full outer-product parameter grid in one
//!   pass (for the brute-force fitter)
//!
//! These are implemented here for each model kind.

pub mod sed;

pub use sed::*;
