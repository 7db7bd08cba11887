//! Tunable model parameters.
//!
//! Every parameter lives in [`Params`] and is described by a [`ParamSpec`] in
//! the [`PARAMS`] registry, which maps its name to a typed getter and setter.
//! Defaults are layered: the base defaults below, then a per-model override
//! layer, then whatever the user supplies (TOML or `name=value` pairs).

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// A dynamically typed parameter value, as exchanged with a UI or config file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
}

impl ParamValue {
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            ParamValue::Float(v) => Some(v),
            ParamValue::Int(v) => Some(v as f64),
            ParamValue::Bool(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            ParamValue::Int(v) => Some(v),
            ParamValue::Float(v) if v.fract() == 0.0 && v.is_finite() => Some(v as i64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            ParamValue::Bool(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(v) => write!(f, "{v}"),
            ParamValue::Int(v) => write!(f, "{v}"),
            ParamValue::Float(v) => write!(f, "{v:?}"),
        }
    }
}

impl FromStr for ParamValue {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(v) = s.parse::<bool>() {
            Ok(ParamValue::Bool(v))
        } else if let Ok(v) = s.parse::<i64>() {
            Ok(ParamValue::Int(v))
        } else if let Ok(v) = s.parse::<f64>() {
            Ok(ParamValue::Float(v))
        } else {
            Err(ConfigError::InvalidValue {
                name: s.to_string(),
                reason: "not a bool, integer or float".to_string(),
            })
        }
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

/// Conversion between a typed field of [`Params`] and a [`ParamValue`].
pub trait ParamType: Sized {
    const TYPE_NAME: &'static str;

    fn to_param(&self) -> ParamValue;

    fn from_param(value: ParamValue) -> Option<Self>;

    fn convert(name: &str, value: ParamValue) -> Result<Self, ConfigError> {
        Self::from_param(value).ok_or_else(|| ConfigError::WrongType {
            name: name.to_string(),
            expected: Self::TYPE_NAME,
            got: value.to_string(),
        })
    }
}

impl ParamType for f64 {
    const TYPE_NAME: &'static str = "float";

    fn to_param(&self) -> ParamValue {
        ParamValue::Float(*self)
    }

    fn from_param(value: ParamValue) -> Option<Self> {
        value.as_f64()
    }
}

impl ParamType for bool {
    const TYPE_NAME: &'static str = "bool";

    fn to_param(&self) -> ParamValue {
        ParamValue::Bool(*self)
    }

    fn from_param(value: ParamValue) -> Option<Self> {
        value.as_bool()
    }
}

impl ParamType for i64 {
    const TYPE_NAME: &'static str = "integer";

    fn to_param(&self) -> ParamValue {
        ParamValue::Int(*self)
    }

    fn from_param(value: ParamValue) -> Option<Self> {
        value.as_i64()
    }
}

macro_rules! unsigned_param {
    ($($ty:ty),*) => {
        $(
            impl ParamType for $ty {
                const TYPE_NAME: &'static str = "non-negative integer";

                fn to_param(&self) -> ParamValue {
                    ParamValue::Int(*self as i64)
                }

                fn from_param(value: ParamValue) -> Option<Self> {
                    value.as_i64().and_then(|v| <$ty>::try_from(v).ok())
                }
            }
        )*
    };
}

unsigned_param!(usize, u32, u64);

/// Registry entry for one parameter.
pub struct ParamSpec {
    pub name: &'static str,
    doc: &'static str,
    get: fn(&Params) -> ParamValue,
    set: fn(&mut Params, ParamValue) -> Result<(), ConfigError>,
    /// Changing this parameter replaces the wavefunction with fresh initial
    /// data instead of keeping the evolved state.
    pub reinitializes: bool,
}

impl ParamSpec {
    pub fn doc(&self) -> &'static str {
        self.doc.trim()
    }

    pub fn get(&self, params: &Params) -> ParamValue {
        (self.get)(params)
    }

    pub fn set(&self, params: &mut Params, value: ParamValue) -> Result<(), ConfigError> {
        (self.set)(params, value)
    }
}

impl fmt::Debug for ParamSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParamSpec")
            .field("name", &self.name)
            .field("reinitializes", &self.reinitializes)
            .finish()
    }
}

macro_rules! define_params {
    ($(
        $(#[doc = $doc:literal])*
        $name:ident : $ty:ty = $default:expr $(, reinit = $reinit:literal)?;
    )*) => {
        /// Every tunable parameter of every model.
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        #[serde(default, deny_unknown_fields)]
        pub struct Params {
            $(
                $(#[doc = $doc])*
                pub $name: $ty,
            )*
        }

        impl Default for Params {
            fn default() -> Self {
                Params {
                    $($name: $default,)*
                }
            }
        }

        /// Name-to-accessor table for [`Params`], in declaration order.
        pub static PARAMS: &[ParamSpec] = &[
            $(
                ParamSpec {
                    name: stringify!($name),
                    doc: concat!($($doc),*),
                    get: |p| ParamType::to_param(&p.$name),
                    set: |p, v| {
                        p.$name = <$ty as ParamType>::convert(stringify!($name), v)?;
                        Ok(())
                    },
                    reinitializes: false $(|| $reinit)?,
                },
            )*
        ];
    };
}

define_params! {
    /// Planck's constant.
    hbar: f64 = 1.0;
    /// Particle mass.
    m: f64 = 1.0;
    /// Interaction strength of single-component models.
    g: f64 = 1.0;
    /// Lattice points along x.
    nx: usize = 32, reinit = true;
    /// Lattice points along y.
    ny: usize = 32, reinit = true;
    /// Lattice spacing (the same along each axis).
    dx: f64 = 1.0;
    /// Amount of dissipation applied during real-time evolution.
    cooling: f64 = 0.01;
    /// Imaginary-time steps used to prepare the initial state.
    cooling_steps: usize = 100;
    /// Time step in units of `hbar/max(K)`.
    dt_t_scale: f64 = 0.1;
    /// Healing length; sets the chemical potential.
    healing_length: f64 = 10.0;
    /// Number of phase windings imprinted on the initial state.
    winding: i64 = 10;
    /// Confine the gas in a cylindrical trap.
    cylinder: bool = true;
    /// Multiply the initial state by a random phase.
    random_phase: bool = false;
    /// Seed for random initial phases and tracer placement.
    seed: u64 = 1;
    /// Relative x position of the finger, in [0, 1].
    finger_x: f64 = 0.5;
    /// Relative y position of the finger, in [0, 1].
    finger_y: f64 = 0.5;
    /// Spring constant of the finger-potential spring.
    finger_k_m: f64 = 10.0;
    /// Damping of the finger-potential spring.
    finger_damp: f64 = 4.0;
    /// Width of the finger potential.
    finger_r0: f64 = 10.0;
    /// Finger potential strength in units of the chemical potential.
    finger_v0_mu: f64 = 0.5;
    /// Move the finger along a circle to exercise the controller.
    test_finger: bool = false;
    /// Target number of vortices for the rotating trap.
    n_vortex: f64 = 0.0;
    /// Number of bumps on the rotating trap wall.
    bump_n: u32 = 1;
    /// Relative size of the bumps on the rotating trap wall.
    bump_h: f64 = 0.1;
    /// Flow velocity in units of the speed of sound.
    v_v_c: f64 = 0.0;
    /// Vortex ring radius as a fraction of Ly/2.
    ring_radius: f64 = 0.5, reinit = true;
    /// Soliton velocity in units of the speed of sound.
    v_c: f64 = 0.0, reinit = true;
    /// Harmonic oscillator length as a fraction of Lx/2.
    a_ho: f64 = 0.04;
    /// Radius of the initial breather shape as a fraction of Lx/2.
    shape_r: f64 = 0.3, reinit = true;
    /// Number of corners of the initial breather shape.
    n_shape: u32 = 3, reinit = true;
    /// Inner radius of the ring trap as a fraction of Lx/2.
    ring_r1: f64 = 0.5;
    /// Outer radius of the ring trap as a fraction of Lx/2.
    ring_r2: f64 = 0.9;
    /// Wall thickness of the ring trap as a fraction of Lx/2.
    ring_dr: f64 = 0.1;
    /// Intra-species interaction of component a.
    g_aa: f64 = 1.0;
    /// Intra-species interaction of component b.
    g_bb: f64 = 1.0;
    /// Inter-species interaction.
    g_ab: f64 = 1.0;
    /// Raman recoil momentum of the two-component model.
    k_r: f64 = 5.0;
    /// SOC detuning d = delta/4E_R.
    soc_d: f64 = 0.125;
    /// SOC strength w = Omega/4E_R.
    soc_w: f64 = 0.25;
    /// SOC lattice spacing of the single-band model (k_R = 2 pi/l_R).
    l_r: f64 = 0.2;
    /// External lattice wave number in units of k_R.
    lattice_k_k_r: f64 = 2.0;
    /// External lattice strength in units of the chemical potential.
    lattice_v0_mu: f64 = 0.1;
    /// Centre of the external lattice.
    lattice_x0: f64 = 0.0;
    /// Number of tracer particles a driver should seed.
    tracer_particles: usize = 0;
}

/// Look up a parameter by name.
pub fn spec(name: &str) -> Result<&'static ParamSpec, ConfigError> {
    PARAMS
        .iter()
        .find(|spec| spec.name == name)
        .ok_or_else(|| ConfigError::UnknownParameter(name.to_string()))
}

impl Params {
    pub fn get(&self, name: &str) -> Result<ParamValue, ConfigError> {
        Ok(spec(name)?.get(self))
    }

    /// Assign a single parameter, returning its registry entry.
    pub fn set(&mut self, name: &str, value: ParamValue) -> Result<&'static ParamSpec, ConfigError> {
        let spec = spec(name)?;
        spec.set(self, value)?;
        Ok(spec)
    }

    /// Reject values no model can run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("hbar", self.hbar),
            ("m", self.m),
            ("g", self.g),
            ("g_aa", self.g_aa),
            ("g_bb", self.g_bb),
            ("dx", self.dx),
            ("dt_t_scale", self.dt_t_scale),
            ("healing_length", self.healing_length),
            ("finger_r0", self.finger_r0),
            ("l_r", self.l_r),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::InvalidValue {
                    name: name.to_string(),
                    reason: format!("must be positive and finite (got {value})"),
                });
            }
        }
        if !self.cooling.is_finite() || self.cooling < 0.0 {
            return Err(ConfigError::InvalidValue {
                name: "cooling".to_string(),
                reason: format!("must be non-negative (got {})", self.cooling),
            });
        }
        if !(self.v_c.abs() < 1.0) {
            return Err(ConfigError::InvalidValue {
                name: "v_c".to_string(),
                reason: format!("soliton speed must lie in (-1, 1) (got {})", self.v_c),
            });
        }
        if self.n_shape == 0 {
            return Err(ConfigError::InvalidValue {
                name: "n_shape".to_string(),
                reason: "a shape needs at least one corner".to_string(),
            });
        }
        Ok(())
    }
}

/// Composes the base defaults with override layers; later layers win.
#[derive(Debug, Clone, Default)]
pub struct ParamsBuilder {
    params: Params,
}

impl ParamsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn layer<I, K>(mut self, values: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, ParamValue)>,
        K: AsRef<str>,
    {
        for (name, value) in values {
            self.params.set(name.as_ref(), value)?;
        }
        Ok(self)
    }

    pub fn build(self) -> Result<Params, ConfigError> {
        self.params.validate()?;
        Ok(self.params)
    }
}

/// Parse a `name=value` pair as given on the command line.
pub fn parse_assignment(s: &str) -> Result<(String, ParamValue), ConfigError> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| ConfigError::MalformedAssignment(s.to_string()))?;
    let name = name.trim();
    spec(name)?;
    Ok((name.to_string(), value.parse()?))
}

/// Contents of a run configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    /// Model name, see `ModelKind`.
    #[serde(default = "default_model")]
    pub model: String,
    /// Number of frames to compute.
    #[serde(default = "default_frames")]
    pub frames: usize,
    /// Inner steps per frame.
    #[serde(default = "default_steps")]
    pub steps_per_frame: usize,
    /// Parameter overrides applied on top of the model defaults.
    #[serde(default)]
    pub params: BTreeMap<String, ParamValue>,
}

fn default_model() -> String {
    "bec".to_string()
}

fn default_frames() -> usize {
    100
}

fn default_steps() -> usize {
    10
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            model: default_model(),
            frames: default_frames(),
            steps_per_frame: default_steps(),
            params: BTreeMap::new(),
        }
    }
}

impl RunConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: RunConfig = toml::from_str(s)?;
        for name in config.params.keys() {
            spec(name)?;
        }
        Ok(config)
    }

    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = std::fs::read_to_string(path)?;
        Self::from_toml_str(&s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_covers_every_field() {
        let defaults = Params::default();
        assert_eq!(spec("healing_length").unwrap().get(&defaults), ParamValue::Float(10.0));
        assert_eq!(spec("nx").unwrap().get(&defaults), ParamValue::Int(32));
        assert_eq!(spec("cylinder").unwrap().get(&defaults), ParamValue::Bool(true));
        assert_eq!(spec("dx").unwrap().doc(), "Lattice spacing (the same along each axis).");

        let mut names: Vec<_> = PARAMS.iter().map(|s| s.name).collect();
        let n = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), n);
    }

    #[test]
    fn test_set_converts_and_type_checks() {
        let mut params = Params::default();
        params.set("dx", ParamValue::Int(2)).unwrap();
        assert_eq!(params.dx, 2.0);

        params.set("nx", ParamValue::Float(64.0)).unwrap();
        assert_eq!(params.nx, 64);

        assert!(matches!(
            params.set("nx", ParamValue::Int(-4)),
            Err(ConfigError::WrongType { .. })
        ));
        assert!(matches!(
            params.set("cylinder", ParamValue::Float(1.0)),
            Err(ConfigError::WrongType { .. })
        ));
        assert_eq!(
            params.set("nope", ParamValue::Int(1)).unwrap_err(),
            ConfigError::UnknownParameter("nope".to_string())
        );
        assert!(params.set("ny", ParamValue::Int(8)).unwrap().reinitializes);
        assert!(!params.set("g", ParamValue::Float(2.0)).unwrap().reinitializes);
    }

    #[test]
    fn test_later_layers_win() {
        let params = ParamsBuilder::new()
            .layer([("cylinder", ParamValue::Bool(false)), ("nx", ParamValue::Int(16))])
            .unwrap()
            .layer([("nx", ParamValue::Int(8))])
            .unwrap()
            .build()
            .unwrap();
        assert!(!params.cylinder);
        assert_eq!(params.nx, 8);
        assert_eq!(params.ny, 32);
    }

    #[test]
    fn test_validation() {
        let err = ParamsBuilder::new()
            .layer([("healing_length", ParamValue::Float(0.0))])
            .unwrap()
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_parse_assignment() {
        assert_eq!(
            parse_assignment("nx=64").unwrap(),
            ("nx".to_string(), ParamValue::Int(64))
        );
        assert_eq!(
            parse_assignment("cooling = 1e-3").unwrap(),
            ("cooling".to_string(), ParamValue::Float(1e-3))
        );
        assert!(matches!(
            parse_assignment("nx"),
            Err(ConfigError::MalformedAssignment(_))
        ));
        assert!(matches!(
            parse_assignment("bogus=1"),
            Err(ConfigError::UnknownParameter(_))
        ));
    }

    #[test]
    fn test_run_config_from_toml() {
        let config = RunConfig::from_toml_str(
            r#"
            model = "bec_flow"
            frames = 5
            [params]
            nx = 64
            healing_length = 2.5
            cylinder = false
            "#,
        )
        .unwrap();
        assert_eq!(config.model, "bec_flow");
        assert_eq!(config.frames, 5);
        assert_eq!(config.steps_per_frame, 10);
        assert_eq!(config.params["nx"], ParamValue::Int(64));
        assert_eq!(config.params["healing_length"], ParamValue::Float(2.5));
        assert_eq!(config.params["cylinder"], ParamValue::Bool(false));

        assert!(RunConfig::from_toml_str("[params]\nnot_a_param = 1\n").is_err());
    }

    #[test]
    fn test_run_config_errors_by_source() {
        assert!(matches!(
            RunConfig::from_toml_str("frames = \"many\"\n"),
            Err(crate::Error::Toml(_))
        ));
        assert!(matches!(
            RunConfig::from_toml_str("[params]\nmass = 2.0\n"),
            Err(crate::Error::Config(_))
        ));
        assert!(matches!(
            RunConfig::read("/nonexistent/superhydro/run.toml"),
            Err(crate::Error::Io(_))
        ));
    }

    #[test]
    fn test_full_params_deserialize_with_defaults() {
        let params: Params = toml::from_str("nx = 16\nfinger_v0_mu = 0.0\n").unwrap();
        assert_eq!(params.nx, 16);
        assert_eq!(params.finger_v0_mu, 0.0);
        assert_eq!(params.ny, 32);
        assert!(toml::from_str::<Params>("unknown = 1\n").is_err());
    }
}
