//! Error types for model configuration, numerical diagnostics and the SOC
//! dispersion helper.

use thiserror::Error;

/// Problems with the parameters a model is built from. These are never
/// recovered locally: fix the parameters and rebuild the model.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("unknown parameter `{0}`")]
    UnknownParameter(String),

    #[error("unknown model `{0}`")]
    UnknownModel(String),

    #[error("parameter `{name}` expects a {expected} value (got {got})")]
    WrongType {
        name: String,
        expected: &'static str,
        got: String,
    },

    #[error("invalid value for `{name}`: {reason}")]
    InvalidValue { name: String, reason: String },

    #[error("a grid needs at least one axis")]
    EmptyGrid,

    #[error("grid size must be positive along axis {axis} (got {n})")]
    NonPositiveGridSize { axis: usize, n: usize },

    #[error("lattice spacing must be positive and finite (got {0})")]
    InvalidSpacing(f64),

    #[error("axis-count and box-length lists differ in length ({shape} vs {lengths})")]
    IncompatibleBox { shape: usize, lengths: usize },

    #[error("expected a `name=value` pair (got `{0}`)")]
    MalformedAssignment(String),
}

/// Numerical faults detected by diagnostics. The propagator itself never
/// raises these; it lets NaN propagate so the fault is visible in the next
/// density read.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("a NaN or Inf value was produced at t = {t}")]
    NanOrInf { t: f64 },

    #[error("total density vanished (sum = {0}); the trap evacuated the box")]
    VanishingDensity(f64),

    #[error("cannot seed tracer particles from a non-finite density")]
    NonFiniteDensity,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispersionError {
    #[error("only derivative orders 0, 1 or 2 are supported (got {0})")]
    UnsupportedOrder(u32),
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    Dispersion(#[from] DispersionError),

    #[error("failed to read or write simulation data")]
    Io(#[from] std::io::Error),

    #[error("unable to parse toml: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
