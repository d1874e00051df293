//! Domain types used throughout the fitting pipeline.
//!
//! This module defines:
//!
//! - the SED model taxonomy (`ModelKind`) and per-parameter bounds
//! - normalized photometric observations (`BandPoint`, `EpochObservations`)
//! - fit outputs (`GradientFit`, `GridFit`, `EpochRow`, `RunOutput`)
//! - the run configuration (`FitConfig`)

pub mod types;

pub use types::*;
