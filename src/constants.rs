//! Numerical constants and tunable defaults used by the GPE models.

pub use std::f64::consts::PI;

/// Steepness of the smooth step `mstep`.
pub const MSTEP_ALPHA: f64 = 3.0;

/// Newton iterations used to locate the minimum of the lower SOC band.
pub const NEWTON_ITERATIONS: usize = 5;

/// Simulation time at which the relaxation phase starts. Negative times are
/// never shown to the user.
pub const COOLING_START_TIME: f64 = -10000.0;

/// Height of trap walls in units of the chemical potential.
pub const WALL_HEIGHT_MU: f64 = 100.0;

/// Radius at which the cylinder wall starts rising, in units of `(L/2)^2`.
pub const WALL_RADIUS_SQ: f64 = 0.8;

/// Width of the cylinder wall, in units of `(L/2)^2`.
pub const WALL_WIDTH_SQ: f64 = 0.2;
