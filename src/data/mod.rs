//! Synthetic observation generation.

pub mod synth;

pub use synth::*;
