//! Parameter grid axis generation.
//!
//! The brute-force fitter explores a deterministic grid over each model
//! parameter:
//!
//! - log-spaced axes for positive parameters spanning several orders of
//!   magnitude (radius, temperature, amplitude)
//! - linearly spaced axes for bounded-range parameters (spectral index)
//!
//! Grid search trades flops for robustness: it cannot get stuck in a local
//! minimum and is reproducible given the same inputs.

use crate::domain::{AxisSpacing, ParamRange};
use crate::error::FitError;

/// Generate `steps` log-spaced points between `min` and `max` (inclusive).
pub fn log_space(min: f64, max: f64, steps: usize) -> Result<Vec<f64>, FitError> {
    if !(min.is_finite() && max.is_finite() && min > 0.0 && max > min) {
        return Err(FitError::invalid_input(format!(
            "Invalid log axis range: min={min}, max={max} (must be finite, >0, and max>min)."
        )));
    }
    if steps < 2 {
        return Err(FitError::invalid_input("Axis steps must be >= 2."));
    }

    let ln_min = min.ln();
    let ln_max = max.ln();
    let step = (ln_max - ln_min) / (steps as f64 - 1.0);

    let mut out = Vec::with_capacity(steps);
    for i in 0..steps {
        out.push((ln_min + step * i as f64).exp());
    }
    Ok(out)
}

/// Generate `steps` linearly spaced points between `min` and `max`
/// (inclusive).
pub fn lin_space(min: f64, max: f64, steps: usize) -> Result<Vec<f64>, FitError> {
    if !(min.is_finite() && max.is_finite() && max > min) {
        return Err(FitError::invalid_input(format!(
            "Invalid linear axis range: min={min}, max={max} (must be finite and max>min)."
        )));
    }
    if steps < 2 {
        return Err(FitError::invalid_input("Axis steps must be >= 2."));
    }

    let step = (max - min) / (steps as f64 - 1.0);
    let mut out = Vec::with_capacity(steps);
    for i in 0..steps {
        out.push(min + step * i as f64);
    }
    Ok(out)
}

/// Build an axis for `range` with the requested spacing.
pub fn axis_values(
    range: &ParamRange,
    spacing: AxisSpacing,
    steps: usize,
) -> Result<Vec<f64>, FitError> {
    match spacing {
        AxisSpacing::Log => log_space(range.min, range.max, steps),
        AxisSpacing::Linear => lin_space(range.min, range.max, steps),
    }
}
