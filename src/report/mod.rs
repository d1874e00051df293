//! Human-readable run summaries.
//!
//! The fitting API returns structured data; this module renders the
//! operator-facing digest: counts of fitted, skipped and failed epochs,
//! plus every flag a careful reader should notice (ambiguous grid minima,
//! relaxed confidence regions, degenerate sample sets).

use std::fmt::Write as _;

use crate::domain::{FitConfig, RunOutput};

/// Format a run digest for terminal output.
pub fn format_run_summary(output: &RunOutput, config: &FitConfig) -> String {
    let fitted = output.rows.iter().filter(|r| r.grid.is_some()).count();
    // Skipped means the epoch never entered a fitter; a double-BB epoch
    // whose gradient fit failed to converge is counted under the failure
    // line, not here.
    let min_bands = config.min_bands(output.model);
    let skipped = output
        .rows
        .iter()
        .filter(|r| r.n_bands < min_bands)
        .count();
    let ambiguous = output
        .rows
        .iter()
        .filter(|r| {
            r.grid
                .as_ref()
                .is_some_and(|g| g.ambiguous_minimum.is_some())
        })
        .count();
    let relaxed = output
        .rows
        .iter()
        .filter(|r| r.grid.as_ref().is_some_and(|g| g.region_delchi > config.delchi))
        .count();
    let degenerate = output
        .rows
        .iter()
        .filter(|r| r.grid.as_ref().is_some_and(|g| g.degenerate_samples))
        .count();
    let good = output
        .rows
        .iter()
        .filter(|r| {
            r.grid.as_ref().is_some_and(|g| {
                g.gof
                    .sigma_distance
                    .is_some_and(|s| s.abs() <= config.good_fit_sigma_dist)
            })
        })
        .count();

    let mut out = String::new();
    let _ = writeln!(out, "SED fit summary: {}", output.model.display_name());
    let _ = writeln!(
        out,
        "  epochs: {} total, {} fitted, {} skipped (too few bands)",
        output.rows.len(),
        fitted,
        skipped
    );
    let _ = writeln!(
        out,
        "  fit quality: {} of {} fitted epochs within |sigma distance| <= {}",
        good, fitted, config.good_fit_sigma_dist
    );
    let _ = writeln!(
        out,
        "  gradient fits failed to converge: {}",
        output.failed_gradient_fits
    );
    let _ = writeln!(
        out,
        "  guided propagation: {}",
        if output.guided { "active" } else { "off" }
    );
    let _ = writeln!(out, "  posterior samples: {}", output.samples.len());

    if ambiguous > 0 {
        let _ = writeln!(out, "  NOTE: {ambiguous} epoch(s) had tied grid minima");
    }
    if relaxed > 0 {
        let _ = writeln!(
            out,
            "  NOTE: {relaxed} epoch(s) needed a relaxed confidence region"
        );
    }
    if degenerate > 0 {
        let _ = writeln!(
            out,
            "  WARNING: {degenerate} epoch(s) have degenerate sample sets"
        );
    }
    for warning in &output.warnings {
        let _ = writeln!(out, "  WARNING: {warning}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::exact_epoch;
    use crate::domain::ModelKind;

    #[test]
    fn summary_counts_fitted_and_skipped_epochs() {
        let config = FitConfig {
            grid_steps: 30,
            sample_count: 10,
            ..FitConfig::default()
        };
        let epochs = vec![
            exact_epoch(
                ModelKind::SingleBb,
                &[1e15, 1e4],
                &[("ZTF_g", 4722.7), ("ZTF_r", 6339.6), ("UVOT_U", 2500.0)],
                58000.0,
                0.0,
                0.05,
            ),
            exact_epoch(
                ModelKind::SingleBb,
                &[1e15, 1e4],
                &[("ZTF_g", 4722.7)],
                58001.0,
                1.0,
                0.05,
            ),
        ];
        let out = crate::fit::run(ModelKind::SingleBb, &epochs, &config).unwrap();
        let summary = format_run_summary(&out, &config);
        assert!(summary.contains("single BB"));
        assert!(summary.contains("2 total, 1 fitted, 1 skipped"));
        assert!(summary.contains("posterior samples: 10"));
    }

    #[test]
    fn failed_gradient_epoch_is_not_reported_as_skipped() {
        // A double-BB epoch with plenty of bands whose gradient fit did
        // not converge: it was attempted, so it counts as a failure, not
        // as a skip.
        let config = FitConfig::default();
        let out = RunOutput {
            model: ModelKind::DoubleBb,
            rows: vec![crate::domain::EpochRow {
                mjd: 58000.0,
                days_since_peak: 0.0,
                n_bands: 5,
                bands: vec![
                    "UVOT_UVW2".into(),
                    "UVOT_U".into(),
                    "ZTF_g".into(),
                    "ZTF_r".into(),
                    "ATLAS_o".into(),
                ],
                wavelengths_aa: vec![2079.0, 3465.0, 4722.7, 6339.6, 6866.3],
                gradient: None,
                grid: None,
                guided_windows: None,
            }],
            samples: Vec::new(),
            failed_gradient_fits: 1,
            guided: false,
            warnings: Vec::new(),
        };
        let summary = format_run_summary(&out, &config);
        assert!(summary.contains("1 total, 0 fitted, 0 skipped"));
        assert!(summary.contains("gradient fits failed to converge: 1"));
    }

    #[test]
    fn summary_surfaces_fallback_warnings() {
        let config = FitConfig {
            grid_steps: 30,
            sample_count: 10,
            ..FitConfig::default()
        };
        let epochs = vec![exact_epoch(
            ModelKind::SingleBb,
            &[1e15, 1e4],
            &[("ZTF_g", 4722.7), ("ZTF_r", 6339.6)],
            58000.0,
            0.0,
            0.05,
        )];
        let out = crate::fit::run_guided(ModelKind::SingleBb, &epochs, &config).unwrap();
        let summary = format_run_summary(&out, &config);
        assert!(summary.contains("WARNING"));
        assert!(summary.contains("guided propagation: off"));
    }
}
