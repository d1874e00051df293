//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory during fitting
//! - exported to JSON/CSV by downstream persistence tools
//! - reloaded later for plotting or comparisons

use serde::{Deserialize, Serialize};

use crate::error::FitError;

/// Which SED model is fitted at each epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    SingleBb,
    DoubleBb,
    PowerLaw,
}

impl ModelKind {
    /// Human-readable label for terminal output.
    pub fn display_name(self) -> &'static str {
        match self {
            ModelKind::SingleBb => "single BB",
            ModelKind::DoubleBb => "double BB",
            ModelKind::PowerLaw => "power law",
        }
    }

    /// Number of free parameters (`M` in the chi-squared bookkeeping).
    pub fn param_count(self) -> usize {
        match self {
            ModelKind::SingleBb => 2,
            ModelKind::DoubleBb => 4,
            ModelKind::PowerLaw => 2,
        }
    }

    /// Parameter names, in the order used by every parameter vector for
    /// this model kind.
    pub fn param_names(self) -> &'static [&'static str] {
        match self {
            ModelKind::SingleBb => &["R_cm", "T_K"],
            ModelKind::DoubleBb => &["R1_cm", "T1_K", "R2_cm", "T2_K"],
            ModelKind::PowerLaw => &["A", "gamma"],
        }
    }
}

/// Inclusive admissible range for one model parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParamRange {
    pub min: f64,
    pub max: f64,
}

impl ParamRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, v: f64) -> bool {
        v >= self.min && v <= self.max
    }

    pub fn clamp(&self, v: f64) -> f64 {
        v.clamp(self.min, self.max)
    }

    pub fn width(&self) -> f64 {
        self.max - self.min
    }

    /// Is this a subrange of (or equal to) `outer`?
    pub fn is_within(&self, outer: &ParamRange) -> bool {
        self.min >= outer.min && self.max <= outer.max
    }

    fn validate(&self, name: &str) -> Result<(), FitError> {
        if !(self.min.is_finite() && self.max.is_finite() && self.max > self.min) {
            return Err(FitError::invalid_input(format!(
                "Invalid bounds for {name}: min={}, max={} (must be finite and max>min).",
                self.min, self.max
            )));
        }
        Ok(())
    }

    fn validate_positive(&self, name: &str) -> Result<(), FitError> {
        self.validate(name)?;
        if self.min <= 0.0 {
            return Err(FitError::invalid_input(format!(
                "Bounds for {name} must be strictly positive (min={}).",
                self.min
            )));
        }
        Ok(())
    }
}

/// How the grid axis for a parameter is spaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AxisSpacing {
    /// Log-spaced; required for positive parameters spanning several
    /// orders of magnitude (R, T, A).
    Log,
    /// Linearly spaced; used for bounded-range parameters (gamma).
    Linear,
}

/// Full description of one free parameter as seen by the fitters.
///
/// `scale` is a fixed numerical-conditioning factor: the optimizer works on
/// `value * scale`, and every output (value, errors, bounds) is divided back
/// out. Radius and amplitude parameters pair with the luminosity scaling
/// (see [`crate::models::RADIUS_SCALEFACTOR`]).
#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: &'static str,
    pub range: ParamRange,
    pub spacing: AxisSpacing,
    pub scale: f64,
}

/// One photometric band's measurement at a single epoch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BandPoint {
    pub band: String,
    /// Rest-frame central wavelength in Angstrom.
    pub rest_wavelength_aa: f64,
    /// Rest-frame luminosity density (erg/s/Angstrom).
    pub lum_density: f64,
    /// 1-sigma error on the luminosity density.
    pub lum_density_err: f64,
}

/// All band measurements sharing one timestamp, a single SED-fitting unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochObservations {
    pub mjd: f64,
    pub days_since_peak: f64,
    pub points: Vec<BandPoint>,
}

impl EpochObservations {
    pub fn n_bands(&self) -> usize {
        self.points.len()
    }

    pub fn bands(&self) -> Vec<String> {
        self.points.iter().map(|p| p.band.clone()).collect()
    }

    pub fn wavelengths_aa(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.rest_wavelength_aa).collect()
    }

    /// Does this epoch carry any band blueward of `cutoff_aa`?
    pub fn has_band_below(&self, cutoff_aa: f64) -> bool {
        self.points.iter().any(|p| p.rest_wavelength_aa < cutoff_aa)
    }
}

/// A raw input row from the (out-of-scope) interpolation subsystem:
/// one row per (timestamp, band) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservationRow {
    pub mjd: f64,
    pub lum_density: f64,
    pub lum_density_err: f64,
    pub band: String,
    pub rest_wavelength_aa: f64,
    pub days_since_peak: f64,
}

/// Group flat input rows into epochs, sorted by MJD.
///
/// Malformed input is fatal here (per the error-handling design): non-finite
/// values, non-positive errors, and duplicate (timestamp, band) pairs raise
/// immediately rather than being silently tolerated.
pub fn group_epochs(rows: &[ObservationRow]) -> Result<Vec<EpochObservations>, FitError> {
    if rows.is_empty() {
        return Err(FitError::invalid_input("No observation rows to fit."));
    }

    let mut epochs: Vec<EpochObservations> = Vec::new();
    for row in rows {
        if !(row.mjd.is_finite()
            && row.lum_density.is_finite()
            && row.lum_density_err.is_finite()
            && row.rest_wavelength_aa.is_finite())
        {
            return Err(FitError::invalid_input(format!(
                "Non-finite observation row at MJD={} band={}.",
                row.mjd, row.band
            )));
        }
        if row.lum_density_err <= 0.0 {
            return Err(FitError::invalid_input(format!(
                "Non-positive luminosity error at MJD={} band={}.",
                row.mjd, row.band
            )));
        }

        let point = BandPoint {
            band: row.band.clone(),
            rest_wavelength_aa: row.rest_wavelength_aa,
            lum_density: row.lum_density,
            lum_density_err: row.lum_density_err,
        };

        // Epochs are keyed by exact MJD value; the binning subsystem upstream
        // guarantees shared timestamps are bit-identical.
        match epochs.iter_mut().find(|e| e.mjd == row.mjd) {
            Some(epoch) => {
                if epoch.points.iter().any(|p| p.band == row.band) {
                    return Err(FitError::invalid_input(format!(
                        "Duplicate band '{}' at MJD={}.",
                        row.band, row.mjd
                    )));
                }
                epoch.points.push(point);
            }
            None => epochs.push(EpochObservations {
                mjd: row.mjd,
                days_since_peak: row.days_since_peak,
                points: vec![point],
            }),
        }
    }

    epochs.sort_by(|a, b| a.mjd.partial_cmp(&b.mjd).unwrap_or(std::cmp::Ordering::Equal));
    Ok(epochs)
}

/// Chi-squared goodness-of-fit statistics for one fit.
///
/// The reduced-chi-squared quantities are `None` whenever `N - M <= 0`
/// (more free parameters than data points), never NaN.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GofStats {
    pub chi2: f64,
    pub red_chi2: Option<f64>,
    /// 1-sigma tolerance on the reduced chi-squared: `sqrt(2/(N-M))`.
    pub red_chi2_1sigma: Option<f64>,
    /// Signed distance of the reduced chi-squared from its ideal value of 1,
    /// in units of the tolerance. Positive = under-fitting, negative =
    /// over-fitting. Classification thresholds take the magnitude.
    pub sigma_distance: Option<f64>,
}

/// Output of the bounded Levenberg-Marquardt fit for one epoch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientFit {
    /// Best-fit parameter values, in `ModelKind::param_names` order,
    /// unscaled physical units.
    pub values: Vec<f64>,
    /// Marginal 1-sigma standard errors from the covariance approximation.
    pub std_errs: Vec<f64>,
    /// Full pairwise correlation matrix (row-major, M x M).
    pub correlation: Vec<Vec<f64>>,
    pub gof: GofStats,
    pub iterations: usize,
}

/// One posterior-like parameter draw from the sub-threshold grid region.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PosteriorSample {
    pub values: Vec<f64>,
    pub chi2: f64,
}

/// Output of the brute-force grid search for one epoch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridFit {
    /// Best-fit parameter values (unscaled physical units).
    pub values: Vec<f64>,
    /// Asymmetric uncertainties: `best - min(region)` per parameter.
    pub err_lower: Vec<f64>,
    /// Asymmetric uncertainties: `max(region) - best` per parameter.
    pub err_upper: Vec<f64>,
    pub gof: GofStats,
    /// Competing parameter tuples when more than one grid cell tied for the
    /// minimum chi-squared. The reported values are a deterministic pick
    /// (lowest flat index); the tie itself is surfaced here.
    pub ambiguous_minimum: Option<Vec<Vec<f64>>>,
    /// The confidence-region half-width actually used, after any relaxation.
    pub region_delchi: f64,
    /// True when the relaxation ladder was exhausted and the sample set is
    /// the best-fit point duplicated, an uncertainty-estimation failure.
    pub degenerate_samples: bool,
    pub samples: Vec<PosteriorSample>,
}

/// One row of the per-epoch results table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochRow {
    pub mjd: f64,
    pub days_since_peak: f64,
    pub n_bands: usize,
    pub bands: Vec<String>,
    pub wavelengths_aa: Vec<f64>,
    /// `None` when the epoch was skipped or the optimizer failed to converge.
    pub gradient: Option<GradientFit>,
    /// `None` when the epoch was skipped (or, for double BB, when the
    /// seeding gradient fit failed).
    pub grid: Option<GridFit>,
    /// The per-parameter windows actually searched when guided fitting was
    /// used for this epoch.
    pub guided_windows: Option<Vec<ParamRange>>,
}

/// One row of the posterior-sample table, keyed by (mjd, sample_index).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleRow {
    pub mjd: f64,
    pub sample_index: usize,
    pub days_since_peak: f64,
    pub n_bands: usize,
    pub values: Vec<f64>,
    pub chi2: f64,
    /// Goodness-of-fit context of the epoch the sample was drawn from.
    pub epoch_gof: GofStats,
}

/// Everything a full run produces for downstream collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutput {
    pub model: ModelKind,
    pub rows: Vec<EpochRow>,
    pub samples: Vec<SampleRow>,
    /// Number of non-converged gradient fits across the whole run.
    pub failed_gradient_fits: usize,
    /// True when anchor-guided propagation was actually applied.
    pub guided: bool,
    pub warnings: Vec<String>,
}

/// A full run's configuration: plain named parameters, no CLI surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitConfig {
    // Single-blackbody parameter space.
    pub bb_r_cm: ParamRange,
    pub bb_t_k: ParamRange,

    // Double-blackbody parameter space. Both radii share one range; the
    // T1 < T2 convention is encoded in the default ranges, not enforced.
    pub dbb_r_cm: ParamRange,
    pub dbb_t1_k: ParamRange,
    pub dbb_t2_k: ParamRange,

    // Power-law parameter space.
    pub pl_a: ParamRange,
    pub pl_gamma: ParamRange,

    /// Grid points per dimension for the 2-parameter brute-force fits.
    pub grid_steps: usize,
    /// Grid points per dimension for the coarse 4-parameter double-BB
    /// follow-up (cost scales as the 4th power of this).
    pub dbb_grid_steps: usize,

    /// Joint confidence-region constant: cells with
    /// `chi2 <= min_chi2 + delchi` form the uncertainty region. The default
    /// 2.3 is a joint 1-sigma criterion for 2 parameters; callers wanting
    /// one-at-a-time 1-sigma errors must set 1.0 explicitly.
    pub delchi: f64,
    /// Multipliers applied to `delchi`, in order, when the confidence
    /// region is empty.
    pub delchi_relaxation: Vec<f64>,

    /// Number of posterior-like draws per epoch.
    pub sample_count: usize,

    /// Error-scale factor `k` in the guided window
    /// `anchor ± (k * dt + 1) * err`.
    pub guided_err_scale: f64,
    /// |sigma distance| at or below which a fit counts as a good anchor.
    pub good_fit_sigma_dist: f64,
    /// Bands blueward of this rest wavelength (Angstrom) mark an epoch as
    /// anchor-eligible.
    pub uv_cutoff_aa: f64,

    /// Minimum band counts per model; epochs below the threshold get an
    /// all-undefined row.
    pub min_bands_single_bb: usize,
    pub min_bands_double_bb: usize,
    pub min_bands_power_law: usize,

    /// Base seed for the posterior draws (per-epoch seeds are derived from
    /// this and the epoch MJD, so parallel scheduling cannot change them).
    pub seed: u64,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            bb_r_cm: ParamRange::new(1e13, 1e19),
            bb_t_k: ParamRange::new(1e3, 5e5),
            dbb_r_cm: ParamRange::new(1e13, 1e19),
            dbb_t1_k: ParamRange::new(1e2, 1e4),
            dbb_t2_k: ParamRange::new(1e4, 5e5),
            pl_a: ParamRange::new(1e42, 1e51),
            pl_gamma: ParamRange::new(-5.0, 0.0),
            grid_steps: 200,
            dbb_grid_steps: 10,
            delchi: 2.3,
            delchi_relaxation: vec![2.0, 5.0, 10.0, 20.0, 50.0, 100.0, 200.0, 500.0],
            sample_count: 200,
            guided_err_scale: 0.1,
            good_fit_sigma_dist: 3.0,
            uv_cutoff_aa: 3000.0,
            min_bands_single_bb: 2,
            min_bands_double_bb: 4,
            min_bands_power_law: 2,
            seed: 42,
        }
    }
}

impl FitConfig {
    /// Minimum band count required to attempt a fit for `kind`.
    pub fn min_bands(&self, kind: ModelKind) -> usize {
        match kind {
            ModelKind::SingleBb => self.min_bands_single_bb,
            ModelKind::DoubleBb => self.min_bands_double_bb,
            ModelKind::PowerLaw => self.min_bands_power_law,
        }
    }

    /// Parameter specs for `kind`, in canonical order.
    pub fn param_specs(&self, kind: ModelKind) -> Vec<ParamSpec> {
        use crate::models::RADIUS_SCALEFACTOR;
        match kind {
            ModelKind::SingleBb => vec![
                ParamSpec {
                    name: "R_cm",
                    range: self.bb_r_cm,
                    spacing: AxisSpacing::Log,
                    scale: RADIUS_SCALEFACTOR,
                },
                ParamSpec {
                    name: "T_K",
                    range: self.bb_t_k,
                    spacing: AxisSpacing::Log,
                    scale: 1.0,
                },
            ],
            ModelKind::DoubleBb => vec![
                ParamSpec {
                    name: "R1_cm",
                    range: self.dbb_r_cm,
                    spacing: AxisSpacing::Log,
                    scale: RADIUS_SCALEFACTOR,
                },
                ParamSpec {
                    name: "T1_K",
                    range: self.dbb_t1_k,
                    spacing: AxisSpacing::Log,
                    scale: 1.0,
                },
                ParamSpec {
                    name: "R2_cm",
                    range: self.dbb_r_cm,
                    spacing: AxisSpacing::Log,
                    scale: RADIUS_SCALEFACTOR,
                },
                ParamSpec {
                    name: "T2_K",
                    range: self.dbb_t2_k,
                    spacing: AxisSpacing::Log,
                    scale: 1.0,
                },
            ],
            ModelKind::PowerLaw => vec![
                ParamSpec {
                    name: "A",
                    range: self.pl_a,
                    // A pairs with the luminosity scaling because
                    // L = A * lambda^gamma is linear in A.
                    spacing: AxisSpacing::Log,
                    scale: crate::models::LUM_SCALEFACTOR,
                },
                ParamSpec {
                    name: "gamma",
                    range: self.pl_gamma,
                    spacing: AxisSpacing::Linear,
                    scale: 1.0,
                },
            ],
        }
    }

    pub fn validate(&self, kind: ModelKind) -> Result<(), FitError> {
        self.bb_r_cm.validate_positive("BB R")?;
        self.bb_t_k.validate_positive("BB T")?;
        self.dbb_r_cm.validate_positive("DBB R")?;
        self.dbb_t1_k.validate_positive("DBB T1")?;
        self.dbb_t2_k.validate_positive("DBB T2")?;
        self.pl_a.validate_positive("PL A")?;
        self.pl_gamma.validate("PL gamma")?;

        if self.grid_steps < 2 {
            return Err(FitError::invalid_input("grid_steps must be >= 2."));
        }
        if self.dbb_grid_steps < 2 {
            return Err(FitError::invalid_input("dbb_grid_steps must be >= 2."));
        }
        if !(self.delchi.is_finite() && self.delchi > 0.0) {
            return Err(FitError::invalid_input("delchi must be finite and > 0."));
        }
        if self.sample_count == 0 {
            return Err(FitError::invalid_input("sample_count must be > 0."));
        }
        if !(self.guided_err_scale.is_finite() && self.guided_err_scale >= 0.0) {
            return Err(FitError::invalid_input("guided_err_scale must be finite and >= 0."));
        }
        if self.min_bands(kind) < kind.param_count().min(2) {
            return Err(FitError::invalid_input(format!(
                "min_bands for {} is below the model's usable floor.",
                kind.display_name()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_epochs_sorts_and_groups_by_mjd() {
        let rows = vec![
            ObservationRow {
                mjd: 58002.0,
                lum_density: 1.0e42,
                lum_density_err: 1.0e40,
                band: "ZTF_g".into(),
                rest_wavelength_aa: 4722.7,
                days_since_peak: 2.0,
            },
            ObservationRow {
                mjd: 58000.0,
                lum_density: 2.0e42,
                lum_density_err: 1.0e40,
                band: "ZTF_r".into(),
                rest_wavelength_aa: 6339.6,
                days_since_peak: 0.0,
            },
            ObservationRow {
                mjd: 58000.0,
                lum_density: 3.0e42,
                lum_density_err: 1.0e40,
                band: "ZTF_g".into(),
                rest_wavelength_aa: 4722.7,
                days_since_peak: 0.0,
            },
        ];
        let epochs = group_epochs(&rows).unwrap();
        assert_eq!(epochs.len(), 2);
        assert_eq!(epochs[0].mjd, 58000.0);
        assert_eq!(epochs[0].n_bands(), 2);
        assert_eq!(epochs[1].n_bands(), 1);
    }

    #[test]
    fn group_epochs_rejects_duplicate_band() {
        let row = ObservationRow {
            mjd: 58000.0,
            lum_density: 1.0e42,
            lum_density_err: 1.0e40,
            band: "ZTF_g".into(),
            rest_wavelength_aa: 4722.7,
            days_since_peak: 0.0,
        };
        let err = group_epochs(&[row.clone(), row]).unwrap_err();
        assert_eq!(err.kind(), crate::error::FitErrorKind::InvalidInput);
    }

    #[test]
    fn config_validation_catches_inverted_bounds() {
        let config = FitConfig {
            bb_t_k: ParamRange::new(5e5, 1e3),
            ..FitConfig::default()
        };
        assert!(config.validate(ModelKind::SingleBb).is_err());
    }

    #[test]
    fn default_config_is_valid_for_all_kinds() {
        let config = FitConfig::default();
        for kind in [ModelKind::SingleBb, ModelKind::DoubleBb, ModelKind::PowerLaw] {
            config.validate(kind).unwrap();
            assert_eq!(config.param_specs(kind).len(), kind.param_count());
        }
    }
}
