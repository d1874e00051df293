//! Numerical primitives shared by the fitters.

pub mod gof;
pub mod grid_axis;

pub use gof::*;
pub use grid_axis::*;
