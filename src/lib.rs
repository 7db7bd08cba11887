//! Split-step Fourier solvers for the Gross–Pitaevskii equation on a
//! periodic 2D box.
//!
//! A model is picked by [`ModelKind`] and built with [`build_model`]; the
//! returned [`Model`] is advanced with [`Model::step`] and inspected through
//! its density, velocity and diagnostics.
//!
//! ```no_run
//! use superhydro::{build_model, ModelKind, ParamValue};
//!
//! let mut model = build_model(ModelKind::Bec, [("nx", ParamValue::Int(64))])?;
//! model.step(10, None);
//! let density = model.density();
//! # Ok::<(), superhydro::ConfigError>(())
//! ```

pub mod bec;
pub mod constants;
pub mod error;
pub mod fft;
pub mod grid;
pub mod model;
pub mod params;
pub mod potential;
pub mod propagator;
pub mod soc;
pub mod tracer;
pub mod utils;

pub use error::{ConfigError, DispersionError, Error, RuntimeError};
pub use model::{build_model, run, Interrupt, Model, ModelKind};
pub use params::{ParamValue, Params, ParamsBuilder, RunConfig};
pub use tracer::TracerParticles;
