//! Model selection and the uniform interface drivers use.
//!
//! Every model is a [`GpeCore`] plus a handful of hooks ([`GpeModel`]); the
//! object-safe [`Model`] trait is implemented for all of them so a driver can
//! hold a `Box<dyn Model>` and never care which physics it runs.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ndarray::ArrayD;
use num_complex::Complex64;

use crate::bec::Bec;
use crate::error::{ConfigError, Result, RuntimeError};
use crate::grid::Grid;
use crate::params::{spec, ParamValue, Params, ParamsBuilder};
use crate::propagator::{GpeCore, SplitStep};
use crate::soc::Soc2;
use crate::tracer::TracerParticles;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelKind {
    Bec,
    BecVortices,
    BecFlow,
    BecVortexRing,
    BecSoliton,
    BecBreather,
    PersistentCurrents,
    Soc1,
    Soc2,
    SuperSolid2,
}

const BASE: &[&str] = &[
    "hbar",
    "nx",
    "ny",
    "dx",
    "cooling",
    "seed",
    "tracer_particles",
    "finger_x",
    "finger_y",
    "finger_k_m",
    "finger_damp",
    "finger_r0",
    "finger_v0_mu",
    "test_finger",
];

const CONDENSATE: &[&str] = &[
    "m",
    "g",
    "healing_length",
    "cooling_steps",
    "dt_t_scale",
    "winding",
    "cylinder",
    "random_phase",
];

const SPIN_ORBIT: &[&str] = &[
    "m",
    "healing_length",
    "cooling_steps",
    "dt_t_scale",
    "soc_d",
    "soc_w",
];

impl ModelKind {
    pub const ALL: [ModelKind; 10] = [
        ModelKind::Bec,
        ModelKind::BecVortices,
        ModelKind::BecFlow,
        ModelKind::BecVortexRing,
        ModelKind::BecSoliton,
        ModelKind::BecBreather,
        ModelKind::PersistentCurrents,
        ModelKind::Soc1,
        ModelKind::Soc2,
        ModelKind::SuperSolid2,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ModelKind::Bec => "bec",
            ModelKind::BecVortices => "bec_vortices",
            ModelKind::BecFlow => "bec_flow",
            ModelKind::BecVortexRing => "bec_vortex_ring",
            ModelKind::BecSoliton => "bec_soliton",
            ModelKind::BecBreather => "bec_breather",
            ModelKind::PersistentCurrents => "persistent_currents",
            ModelKind::Soc1 => "soc1",
            ModelKind::Soc2 => "soc2",
            ModelKind::SuperSolid2 => "super_solid2",
        }
    }

    pub fn components(self) -> usize {
        match self {
            ModelKind::Soc2 | ModelKind::SuperSolid2 => 2,
            _ => 1,
        }
    }

    /// Defaults this model changes relative to the base parameters.
    pub fn overrides(self) -> Vec<(&'static str, ParamValue)> {
        use ParamValue::{Bool, Float, Int};
        match self {
            ModelKind::Bec | ModelKind::BecVortices => vec![],
            ModelKind::BecFlow | ModelKind::BecVortexRing => vec![("cylinder", Bool(false))],
            ModelKind::BecSoliton => vec![("cylinder", Bool(false)), ("finger_v0_mu", Float(0.1))],
            ModelKind::BecBreather => vec![
                ("cylinder", Bool(false)),
                ("nx", Int(256)),
                ("ny", Int(256)),
                ("dt_t_scale", Float(0.5)),
                ("cooling", Float(1e-10)),
                ("finger_v0_mu", Float(0.0)),
            ],
            ModelKind::PersistentCurrents => vec![
                ("cooling", Float(1e-10)),
                ("tracer_particles", Int(100)),
                ("finger_v0_mu", Float(0.0)),
                ("winding", Int(0)),
            ],
            ModelKind::Soc1 | ModelKind::Soc2 | ModelKind::SuperSolid2 => vec![
                ("finger_r0", Float(1.0)),
                ("dx", Float(0.1)),
                ("healing_length", Float(1.0)),
            ],
        }
    }

    /// Names of the parameters this model reads, base parameters first.
    pub fn parameters(self) -> Vec<&'static str> {
        let extra: &[&str] = match self {
            ModelKind::Bec => &[],
            ModelKind::BecVortices => &["n_vortex", "bump_n", "bump_h"],
            ModelKind::BecFlow => &["v_v_c"],
            ModelKind::BecVortexRing => &["v_v_c", "ring_radius"],
            ModelKind::BecSoliton => &["v_v_c", "v_c"],
            ModelKind::BecBreather => &["v_v_c", "a_ho", "shape_r", "n_shape"],
            ModelKind::PersistentCurrents => &["ring_r1", "ring_r2", "ring_dr"],
            ModelKind::Soc1 => &["g", "l_r"],
            ModelKind::Soc2 => &["g_aa", "g_bb", "g_ab", "k_r", "v_v_c"],
            ModelKind::SuperSolid2 => &[
                "g_aa",
                "g_bb",
                "g_ab",
                "k_r",
                "v_v_c",
                "lattice_k_k_r",
                "lattice_v0_mu",
                "lattice_x0",
            ],
        };
        let physics = match self {
            ModelKind::Soc1 | ModelKind::Soc2 | ModelKind::SuperSolid2 => SPIN_ORBIT,
            _ => CONDENSATE,
        };
        let mut names: Vec<&'static str> = BASE.to_vec();
        for name in physics.iter().chain(extra) {
            if !names.contains(name) {
                names.push(*name);
            }
        }
        names
    }

    /// Base defaults with this model's override layer applied.
    pub fn defaults(self) -> Result<Params, ConfigError> {
        ParamsBuilder::new().layer(self.overrides())?.build()
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModelKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModelKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| ConfigError::UnknownModel(s.to_string()))
    }
}

/// `(name, default, doc)` for every parameter `kind` reads, for building a UI.
pub fn get_params_and_docs(
    kind: ModelKind,
) -> Result<Vec<(&'static str, ParamValue, &'static str)>, ConfigError> {
    let defaults = kind.defaults()?;
    kind.parameters()
        .into_iter()
        .map(|name| {
            let spec = spec(name)?;
            Ok((spec.name, spec.get(&defaults), spec.doc()))
        })
        .collect()
}

/// Hooks a concrete model supplies on top of the shared split-step loop.
pub trait GpeModel: SplitStep {
    fn kind(&self) -> ModelKind;

    /// Recompute every derived quantity (grid, kinetic operator, trap, `dt`)
    /// from the current parameters.
    fn init(&mut self) -> Result<(), ConfigError>;

    /// Replace the wavefunction with fresh initial data, relaxing it if the
    /// model calls for it.
    fn set_initial_data(&mut self);

    fn energy(&self) -> f64;

    fn spin_densities(&self) -> Option<(ArrayD<f64>, ArrayD<f64>)> {
        None
    }
}

/// Read-only quantities a display needs besides the density.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Diagnostics {
    pub lxy: (f64, f64),
    pub nxy: (usize, usize),
    pub mu: f64,
    pub t: f64,
    pub dt: f64,
    pub pot_z: Complex64,
    pub z_finger: Complex64,
    pub n_particles: f64,
}

/// Uniform, object-safe access to any model.
pub trait Model {
    fn kind(&self) -> ModelKind;

    /// Advance `n` time steps, advecting `tracers` once per step if given.
    fn step(&mut self, n: usize, tracers: Option<&mut TracerParticles>);

    /// Total density `|psi|²`, summed over components.
    fn density(&self) -> ArrayD<f64>;

    /// Velocity field `vx + i·vy`.
    fn velocity(&self) -> ArrayD<Complex64>;

    /// Velocity field of `psi` instead of the current state. `psi` must
    /// live on the model's grid.
    fn velocity_of(&self, psi: &ArrayD<Complex64>) -> ArrayD<Complex64>;

    /// Per-component densities of spin-orbit coupled models.
    fn spin_densities(&self) -> Option<(ArrayD<f64>, ArrayD<f64>)>;

    fn psi(&self) -> &ArrayD<Complex64>;

    fn grid(&self) -> &Grid;

    fn params(&self) -> &Params;

    fn get(&self, name: &str) -> Result<ParamValue, ConfigError>;

    /// Assign a parameter and recompute everything that depends on it.
    /// Parameters that change the shape of the state also rebuild the
    /// initial data. On error the model is left unchanged.
    fn set(&mut self, name: &str, value: ParamValue) -> Result<(), ConfigError>;

    fn energy(&self) -> f64;

    fn set_cooling_phase(&mut self, cooling_phase: Complex64);

    fn check_finite(&self) -> Result<(), RuntimeError>;

    /// Discard the evolved state and rebuild the initial data.
    fn reset(&mut self) -> Result<(), ConfigError>;

    fn diagnostics(&self) -> Diagnostics;

    /// Move the finger target to the box point `z`.
    fn set_z_finger(&mut self, z: Complex64);

    /// Seed tracer particles from the current density.
    fn seed_tracers(&self, n: usize) -> Result<TracerParticles, RuntimeError>;
}

impl<T: GpeModel> Model for T {
    fn kind(&self) -> ModelKind {
        GpeModel::kind(self)
    }

    fn step(&mut self, n: usize, tracers: Option<&mut TracerParticles>) {
        SplitStep::step(self, n, tracers);
    }

    fn density(&self) -> ArrayD<f64> {
        SplitStep::density(self)
    }

    fn velocity(&self) -> ArrayD<Complex64> {
        SplitStep::velocity(self)
    }

    fn velocity_of(&self, psi: &ArrayD<Complex64>) -> ArrayD<Complex64> {
        SplitStep::velocity_of(self, psi)
    }

    fn spin_densities(&self) -> Option<(ArrayD<f64>, ArrayD<f64>)> {
        GpeModel::spin_densities(self)
    }

    fn psi(&self) -> &ArrayD<Complex64> {
        &self.core().psi
    }

    fn grid(&self) -> &Grid {
        &self.core().grid
    }

    fn params(&self) -> &Params {
        &self.core().params
    }

    fn get(&self, name: &str) -> Result<ParamValue, ConfigError> {
        self.core().params.get(name)
    }

    fn set(&mut self, name: &str, value: ParamValue) -> Result<(), ConfigError> {
        let mut params = self.core().params.clone();
        let spec = params.set(name, value)?;
        params.validate()?;

        let previous = std::mem::replace(&mut self.core_mut().params, params);
        if let Err(err) = self.init() {
            self.core_mut().params = previous;
            self.init()?;
            return Err(err);
        }
        if spec.reinitializes {
            self.set_initial_data();
        }
        log::debug!("set {name} = {value}");
        Ok(())
    }

    fn energy(&self) -> f64 {
        GpeModel::energy(self)
    }

    fn set_cooling_phase(&mut self, cooling_phase: Complex64) {
        self.core_mut().set_cooling_phase(cooling_phase);
    }

    fn check_finite(&self) -> Result<(), RuntimeError> {
        self.core().check_finite()
    }

    fn reset(&mut self) -> Result<(), ConfigError> {
        self.core_mut().reset_finger();
        self.init()?;
        self.set_initial_data();
        self.core_mut().t = 0.0;
        log::info!("reset {}", GpeModel::kind(self));
        Ok(())
    }

    fn diagnostics(&self) -> Diagnostics {
        let core: &GpeCore = self.core();
        Diagnostics {
            lxy: core.lxy(),
            nxy: core.nxy(),
            mu: core.mu,
            t: core.t,
            dt: core.dt,
            pot_z: core.finger.pot_z,
            z_finger: core.z_finger(),
            n_particles: core.n_particles,
        }
    }

    fn set_z_finger(&mut self, z: Complex64) {
        let core = self.core_mut();
        let lxy = core.lxy();
        core.finger.set_z_finger(z, lxy);
        core.params.finger_x = core.finger.finger_x;
        core.params.finger_y = core.finger.finger_y;
    }

    fn seed_tracers(&self, n: usize) -> Result<TracerParticles, RuntimeError> {
        let core = self.core();
        TracerParticles::new(&SplitStep::density(self), &core.grid, n, core.params.seed)
    }
}

/// Build `kind` from its layered defaults plus `overrides`.
pub fn build_model<I, K>(kind: ModelKind, overrides: I) -> Result<Box<dyn Model>, ConfigError>
where
    I: IntoIterator<Item = (K, ParamValue)>,
    K: AsRef<str>,
{
    let params = ParamsBuilder::new()
        .layer(kind.overrides())?
        .layer(overrides)?
        .build()?;
    let model: Box<dyn Model> = match kind {
        ModelKind::Soc2 | ModelKind::SuperSolid2 => Box::new(Soc2::new(kind, params)?),
        _ => Box::new(Bec::new(kind, params)?),
    };
    Ok(model)
}

/// Shutdown request shared between a computation loop and whoever controls
/// it. Checked only between calls to `step`, never during one.
#[derive(Debug, Clone, Default)]
pub struct Interrupt(Arc<AtomicBool>);

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Drive `model` for up to `frames` frames of `steps` steps each, calling
/// `on_frame` after every frame. Returns the number of completed frames,
/// which is smaller than `frames` if `interrupt` was triggered.
pub fn run<F>(
    model: &mut dyn Model,
    frames: usize,
    steps: usize,
    mut tracers: Option<&mut TracerParticles>,
    interrupt: &Interrupt,
    mut on_frame: F,
) -> Result<usize>
where
    F: FnMut(usize, &dyn Model, Option<&TracerParticles>) -> Result<()>,
{
    for frame in 0..frames {
        if interrupt.is_triggered() {
            log::info!("interrupted after {frame} frames");
            return Ok(frame);
        }
        model.step(steps, tracers.as_deref_mut());
        model.check_finite()?;
        log::trace!("frame {frame}: t = {:.4}", model.diagnostics().t);
        on_frame(frame, &*model, tracers.as_deref())?;
    }
    Ok(frames)
}
