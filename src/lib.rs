//! `ant-sed` library crate.
//!
//! Fits spectral-energy-distribution (SED) models to each epoch of a
//! multi-band transient light curve and produces a time series of physical
//! parameters (temperature, radius, amplitude, spectral index).
//!
//! The crate is a pure library so that:
//!
//! - core numerics are testable without spawning processes
//! - ingestion, plotting and persistence stay with their own tooling
//! - modules are reusable from pipelines or notebooks

pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod math;
pub mod models;
pub mod report;
