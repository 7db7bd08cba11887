//! Single-component condensates.
//!
//! All single-component variants share [`Bec`]; the [`ModelKind`] selects the
//! trap, the kinetic operator and the initial state.

use ndarray::{ArrayD, IxDyn, Zip};
use ndarray_rand::RandomExt;
use num_complex::Complex64;
use rand::{rngs::StdRng, SeedableRng};
use rand_distr::Uniform;

use crate::constants::PI;
use crate::error::ConfigError;
use crate::model::{GpeModel, ModelKind};
use crate::params::Params;
use crate::potential::Trap;
use crate::propagator::{local_wavenumbers, GpeCore, SplitStep};
use crate::soc::{Branch, Dispersion};

/// Kinetic energy as a function of momentum.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Kinetic {
    /// `ħ²k²/2m`.
    Free,
    /// Moving frame: `ħ²(kx² + kx·kv + ky²)/2m`.
    Flow { kv: f64 },
    /// Lower spin-orbit band along x, shifted so its minimum is at `k = 0`,
    /// free along y.
    SocBand {
        dispersion: Dispersion,
        k_r: f64,
        e_r: f64,
        v_r: f64,
    },
}

#[derive(Debug, Clone)]
pub struct Bec {
    core: GpeCore,
    kind: ModelKind,
    kinetic: Kinetic,
    n0: f64,
    c_s: f64,
}

impl Bec {
    pub fn new(kind: ModelKind, params: Params) -> Result<Self, ConfigError> {
        if kind.components() != 1 {
            return Err(ConfigError::InvalidValue {
                name: "model".to_string(),
                reason: format!("{kind} is not a single-component model"),
            });
        }
        let core = GpeCore::new(params)?;
        let mut bec = Bec {
            core,
            kind,
            kinetic: Kinetic::Free,
            n0: 0.0,
            c_s: 0.0,
        };
        bec.init()?;
        bec.set_initial_data();
        log::info!(
            "built {kind} on a {:?} grid (mu = {:.4e}, dt = {:.4e}, N = {:.4e})",
            bec.core.nxy(),
            bec.core.mu,
            bec.core.dt,
            bec.core.n_particles
        );
        Ok(bec)
    }

    /// Background density `mu/g`.
    pub fn n0(&self) -> f64 {
        self.n0
    }

    pub fn c_s(&self) -> f64 {
        self.c_s
    }

    pub fn kinetic(&self) -> &Kinetic {
        &self.kinetic
    }

    /// `dψ/dt = Hψ/(iħ)` for an arbitrary `psi`. With `subtract_mu` the
    /// instantaneous chemical potential `<ψ|H|ψ>/<ψ|ψ>` is removed from `H`,
    /// which makes the result orthogonal to `psi`.
    pub fn compute_dy_dt(&self, psi: &ArrayD<Complex64>, subtract_mu: bool) -> ArrayD<Complex64> {
        let g = self.core.params.g;
        let v = self.core.external_potential();
        let mut h_psi = self.core.apply_k(psi);
        Zip::from(&mut h_psi)
            .and(psi)
            .and(&v)
            .for_each(|h, &y, &v| *h += (v + g * y.norm_sqr()) * y);

        if subtract_mu {
            let norm: f64 = psi.iter().map(|y| y.norm_sqr()).sum();
            let overlap: Complex64 = psi.iter().zip(h_psi.iter()).map(|(y, h)| y.conj() * h).sum();
            let mu = overlap / norm;
            Zip::from(&mut h_psi).and(psi).for_each(|h, &y| *h -= mu * y);
        }

        let i_hbar = Complex64::new(0.0, self.core.params.hbar);
        h_psi.mapv_inplace(|h| h / i_hbar);
        h_psi
    }

    fn select_kinetic(&self) -> Kinetic {
        let p = &self.core.params;
        match self.kind {
            ModelKind::BecFlow | ModelKind::BecVortexRing | ModelKind::BecSoliton => {
                let v = p.v_v_c * (self.core.mu / p.m).sqrt();
                Kinetic::Flow { kv: p.m * v / p.hbar }
            }
            ModelKind::Soc1 => {
                // The single-band model needs no lattice-commensurate k_R.
                let k_r = 2.0 * PI / p.l_r;
                Kinetic::SocBand {
                    dispersion: Dispersion::centered(p.soc_d, p.soc_w),
                    k_r,
                    e_r: (p.hbar * k_r).powi(2) / 2.0 / p.m,
                    v_r: p.hbar * k_r / p.m,
                }
            }
            _ => Kinetic::Free,
        }
    }

    fn kinetic_operator(&self) -> ArrayD<f64> {
        let p = &self.core.params;
        let grid = &self.core.grid;
        let kx = grid.axis_wavenumbers(0);
        let ky = grid.axis_wavenumbers(1);
        let hbar2_2m = p.hbar.powi(2) / 2.0 / p.m;
        let shape = IxDyn(grid.shape());
        match self.kinetic {
            Kinetic::Free => grid.kinetic(p.hbar, p.m),
            Kinetic::Flow { kv } => ArrayD::from_shape_fn(shape, |idx| {
                let (kx, ky) = (kx[idx[0]], ky[idx[1]]);
                hbar2_2m * (kx * kx + kx * kv + ky * ky)
            }),
            Kinetic::SocBand {
                dispersion,
                k_r,
                e_r,
                ..
            } => ArrayD::from_shape_fn(shape, |idx| {
                2.0 * e_r * dispersion.bands(kx[idx[0]] / k_r).0 + hbar2_2m * ky[idx[1]].powi(2)
            }),
        }
    }

    fn select_trap(&self) -> Trap {
        let p = &self.core.params;
        let (lx, ly) = self.core.lxy();
        match self.kind {
            ModelKind::Bec | ModelKind::BecFlow | ModelKind::BecSoliton if p.cylinder => {
                Trap::Cylinder
            }
            ModelKind::BecVortices if p.cylinder => {
                let area = 0.8_f64.powi(2) * lx * ly;
                Trap::RotatingBumps {
                    bump_n: p.bump_n,
                    bump_h: p.bump_h,
                    omega: p.n_vortex * p.hbar * PI / p.m / area,
                }
            }
            ModelKind::BecVortexRing => Trap::Channel,
            ModelKind::BecBreather => Trap::Harmonic {
                a_ho: p.a_ho * lx / 2.0,
            },
            ModelKind::PersistentCurrents => Trap::Ring {
                r1: p.ring_r1,
                r2: p.ring_r2,
                dr: p.ring_dr,
            },
            _ => Trap::Free,
        }
    }

    fn uniform(&self) -> ArrayD<Complex64> {
        ArrayD::from_elem(IxDyn(self.core.grid.shape()), Complex64::new(self.n0.sqrt(), 0.0))
    }

    /// `sqrt(max(mu - V, 0)/g)` in the static trap.
    fn thomas_fermi(&self) -> ArrayD<Complex64> {
        let (mu, g) = (self.core.mu, self.core.params.g);
        self.core
            .trap_potential()
            .mapv(|v| Complex64::new(((mu - v).max(0.0) / g).sqrt(), 0.0))
    }

    /// Grey soliton along x moving at `v_c·c_s`, with a linear phase twist
    /// that makes it periodic.
    fn soliton(&self) -> ArrayD<Complex64> {
        let p = &self.core.params;
        let v_c = p.v_c;
        let c_s = (p.g * self.n0 / p.m).sqrt();
        let length = p.hbar / p.m / c_s / (1.0 - v_c * v_c).sqrt();
        let sqrt_n0 = self.n0.sqrt();
        let psi = |x: f64| {
            sqrt_n0 * Complex64::new((1.0 - v_c * v_c).sqrt() * (x / length).tanh(), v_c)
        };
        let lx = self.core.lxy().0;
        let theta = (psi(lx / 2.0) / psi(-lx / 2.0)).arg();
        let x = self.core.grid.axis_values(0);
        ArrayD::from_shape_fn(IxDyn(self.core.grid.shape()), |idx| {
            let x = x[idx[0]];
            psi(x) * Complex64::new(0.0, -theta * x / lx).exp()
        })
    }

    /// Regular `n_shape`-gon of circumradius `shape_r·Lx/2` filled at `n0`.
    fn polygon(&self) -> ArrayD<Complex64> {
        let p = &self.core.params;
        let corners = f64::from(p.n_shape);
        let wedge = 2.0 * PI / corners;
        let radius = p.shape_r * self.core.lxy().0 / 2.0;
        let sqrt_n0 = self.n0.sqrt();
        let x = self.core.grid.axis_values(0);
        let y = self.core.grid.axis_values(1);
        ArrayD::from_shape_fn(IxDyn(self.core.grid.shape()), |idx| {
            let z = Complex64::new(x[idx[0]], y[idx[1]]);
            let theta = (z.arg() + PI).rem_euclid(wedge) - wedge / 2.0;
            let inside = z.norm() * theta.cos() <= radius;
            Complex64::new(if inside { sqrt_n0 } else { 0.0 }, 0.0)
        })
    }

    /// Multiply by `exp(i·winding·θ)` about the origin.
    fn imprint_winding(&mut self, winding: i64) {
        let x = self.core.grid.axis_values(0);
        let y = self.core.grid.axis_values(1);
        let w = winding as f64;
        self.core.psi.indexed_iter_mut().for_each(|(idx, psi)| {
            let theta = y[idx[1]].atan2(x[idx[0]]);
            *psi *= Complex64::new(0.0, w * theta).exp();
        });
    }

    /// Vortex and antivortex at `y = ±R·Ly/2`, forming a ring across the
    /// periodic x direction.
    fn imprint_vortex_ring(&mut self) {
        let r = self.core.params.ring_radius;
        let ly = self.core.lxy().1;
        let x = self.core.grid.axis_values(0);
        let y = self.core.grid.axis_values(1);
        self.core.psi.indexed_iter_mut().for_each(|(idx, psi)| {
            let (x, y) = (x[idx[0]], y[idx[1]]);
            let z0 = Complex64::new(x, y - r * ly / 2.0);
            let z1 = Complex64::new(x, -(y + r * ly / 2.0));
            *psi *= Complex64::new(0.0, (z0 * z1).arg()).exp();
        });
    }

    fn imprint_random_phase(&mut self) {
        let mut rng = StdRng::seed_from_u64(self.core.params.seed);
        let phase = ArrayD::<f64>::random_using(self.core.psi.raw_dim(), Uniform::new(0.0, 2.0 * PI), &mut rng);
        Zip::from(&mut self.core.psi)
            .and(&phase)
            .for_each(|psi, &theta| *psi *= Complex64::new(0.0, theta).exp());
    }
}

impl GpeModel for Bec {
    fn kind(&self) -> ModelKind {
        self.kind
    }

    fn init(&mut self) -> Result<(), ConfigError> {
        self.core.init_base()?;
        let p = &self.core.params;
        self.n0 = self.core.mu / p.g;
        self.c_s = (self.core.mu / p.m).sqrt();
        self.kinetic = self.select_kinetic();
        let k = self.kinetic_operator();
        let trap = self.select_trap();
        self.core.set_kinetic(k)?;
        self.core.set_trap(trap);
        Ok(())
    }

    fn set_initial_data(&mut self) {
        let p = self.core.params.clone();
        match self.kind {
            ModelKind::BecSoliton => {
                self.core.psi = self.soliton();
                self.core.capture_particle_number();
            }
            ModelKind::BecBreather => {
                self.core.psi = self.polygon();
                self.core.capture_particle_number();
            }
            ModelKind::PersistentCurrents => {
                self.core.psi = self.thomas_fermi();
                self.core.capture_particle_number();
                self.relax(p.cooling_steps);
                self.imprint_winding(p.winding);
                if p.random_phase {
                    self.imprint_random_phase();
                }
            }
            ModelKind::Soc1 => {
                self.core.psi = self.thomas_fermi();
                self.core.capture_particle_number();
                self.relax(p.cooling_steps);
            }
            _ => {
                self.core.psi = self.uniform();
                self.core.capture_particle_number();
                // Cool a bit to remove transients.
                self.relax(p.cooling_steps);
                if p.cylinder {
                    self.imprint_winding(p.winding);
                }
                if self.kind == ModelKind::BecVortexRing {
                    self.imprint_vortex_ring();
                }
                if p.random_phase {
                    self.imprint_random_phase();
                }
            }
        }
        self.core.t = 0.0;
    }

    /// `Σ [ψ*·Kψ + (V + g·n/2)·n]·dx·dy`.
    fn energy(&self) -> f64 {
        let g = self.core.params.g;
        let psi = &self.core.psi;
        let v = self.core.external_potential();
        let kinetic: f64 = psi
            .iter()
            .zip(self.core.apply_k(psi).iter())
            .map(|(y, ky)| (y.conj() * ky).re)
            .sum();
        let potential: f64 = psi
            .iter()
            .zip(v.iter())
            .map(|(y, &v)| {
                let n = y.norm_sqr();
                (v + g * n / 2.0) * n
            })
            .sum();
        (kinetic + potential) * self.core.grid.metric()
    }

    /// Spin densities of the single-band model from the spin–quasi-momentum
    /// map: the local wave number picks the point on the lower band.
    fn spin_densities(&self) -> Option<(ArrayD<f64>, ArrayD<f64>)> {
        let Kinetic::SocBand { dispersion, k_r, .. } = self.kinetic else {
            return None;
        };
        let (kx, _) = local_wavenumbers(&self.core.grid, &self.core.psi, 0.0);
        let a = kx.mapv(|k| dispersion.get_ab(k / k_r, Branch::Lower).0.powi(2));
        let b = kx.mapv(|k| dispersion.get_ab(k / k_r, Branch::Lower).1.powi(2));
        Some((a, b))
    }
}

impl SplitStep for Bec {
    fn core(&self) -> &GpeCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut GpeCore {
        &mut self.core
    }

    fn density(&self) -> ArrayD<f64> {
        self.core.psi.mapv(|y| y.norm_sqr())
    }

    fn velocity_of(&self, psi: &ArrayD<Complex64>) -> ArrayD<Complex64> {
        let p = &self.core.params;
        let hbar_m = p.hbar / p.m;
        let (kx, ky) = local_wavenumbers(&self.core.grid, psi, 0.0);
        let vx = match self.kinetic {
            Kinetic::SocBand { dispersion, k_r, v_r, .. } => {
                kx.mapv(|k| dispersion.slope(k / k_r).0 * v_r)
            }
            _ => kx.mapv(|k| k * hbar_m),
        };
        let mut v = ArrayD::zeros(vx.raw_dim());
        Zip::from(&mut v)
            .and(&vx)
            .and(&ky)
            .for_each(|v, &vx, &ky| *v = Complex64::new(vx, ky * hbar_m));
        v
    }

    /// Mean sound speed, or the bulk sound speed for the single-band model.
    fn finger_v_max(&self, density: &ArrayD<f64>) -> f64 {
        match self.kinetic {
            Kinetic::SocBand { .. } => self.c_s,
            _ => {
                let p = &self.core.params;
                (p.g * density.mean().unwrap_or(0.0) / p.m).sqrt()
            }
        }
    }

    fn apply_exp_v(&mut self, dt: f64, factor: f64, density: &ArrayD<f64>) {
        let (g, mu) = (self.core.params.g, self.core.mu);
        let f = self.core.phase * dt * factor;
        let v = self.core.external_potential();
        Zip::from(&mut self.core.psi)
            .and(&v)
            .and(density)
            .par_for_each(|y, &v, &n| *y *= (f * (v + g * n - mu)).exp());
        self.core.renormalize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{ParamValue, ParamsBuilder};
    use assert_approx_eq::assert_approx_eq;

    fn build(kind: ModelKind, extra: &[(&str, ParamValue)]) -> Bec {
        let params = ParamsBuilder::new()
            .layer(kind.overrides())
            .unwrap()
            .layer([
                ("nx", ParamValue::Int(32)),
                ("ny", ParamValue::Int(32)),
                ("cooling_steps", ParamValue::Int(20)),
            ])
            .unwrap()
            .layer(extra.iter().copied())
            .unwrap()
            .build()
            .unwrap();
        Bec::new(kind, params).unwrap()
    }

    #[test]
    fn test_two_component_kinds_are_rejected() {
        let params = ModelKind::Soc2.defaults().unwrap();
        assert!(matches!(
            Bec::new(ModelKind::Soc2, params),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_uniform_ground_state_is_stationary() {
        let mut bec = build(
            ModelKind::Bec,
            &[
                ("cylinder", ParamValue::Bool(false)),
                ("finger_v0_mu", ParamValue::Float(0.0)),
            ],
        );
        let n0 = bec.n0();
        for n in bec.density().iter() {
            assert_approx_eq!(*n, n0, 1e-10 * n0);
        }
        bec.step(10, None);
        for n in bec.density().iter() {
            assert_approx_eq!(*n, n0, 1e-10 * n0);
        }
        for v in bec.velocity().iter() {
            assert!(v.norm() < 1e-10);
        }
    }

    #[test]
    fn test_flow_kinetic_operator_and_time_step() {
        let bec = build(ModelKind::BecFlow, &[("v_v_c", ParamValue::Float(2.0))]);
        let Kinetic::Flow { kv } = *bec.kinetic() else {
            panic!("expected a flow kinetic operator");
        };
        assert!(kv > 0.0);
        let core = bec.core();
        let k_max = core.k.iter().fold(0.0_f64, |a, &k| a.max(k.abs()));
        assert_approx_eq!(core.dt, 0.1 * core.params.hbar / k_max, 1e-15);
    }

    #[test]
    fn test_soliton_has_a_node_at_the_origin() {
        let bec = build(ModelKind::BecSoliton, &[("healing_length", ParamValue::Float(2.0))]);
        let n = bec.density();
        let n0 = bec.n0();
        for j in 0..32 {
            assert!(n[[16, j]] < 1e-12 * n0);
            assert_approx_eq!(n[[2, j]], n0, 1e-3 * n0);
        }
    }

    #[test]
    fn test_moving_soliton_is_periodic() {
        let bec = build(
            ModelKind::BecSoliton,
            &[("healing_length", ParamValue::Float(2.0)), ("v_c", ParamValue::Float(0.5))],
        );
        let psi = &bec.core().psi;
        // Neighbouring points across the boundary have nearly the same phase.
        let jump = (psi[[0, 0]] / psi[[31, 0]]).arg().abs();
        assert!(jump < 0.2, "phase jump {jump}");
        let n = bec.density();
        assert_approx_eq!(n[[16, 0]], 0.25 * bec.n0(), 1e-12);
    }

    #[test]
    fn test_breather_starts_as_a_filled_triangle() {
        let bec = build(
            ModelKind::BecBreather,
            &[("nx", ParamValue::Int(64)), ("ny", ParamValue::Int(64))],
        );
        let n = bec.density();
        let n0 = bec.n0();
        assert_approx_eq!(n[[32, 32]], n0, 1e-12);
        assert_eq!(n[[0, 0]], 0.0);
        assert_eq!(n[[63, 32]], 0.0);
        let filled = n.iter().filter(|&&v| v > 0.0).count() as f64;
        assert_approx_eq!(filled * n0, n.sum(), 1e-10 * n.sum());
    }

    #[test]
    fn test_persistent_current_winding() {
        let bec = build(
            ModelKind::PersistentCurrents,
            &[("winding", ParamValue::Int(2)), ("healing_length", ParamValue::Float(1.0))],
        );
        let psi = &bec.core().psi;
        // Walk once around the ring and count the phase winding.
        let (nx, ny) = bec.core().nxy();
        let (cx, cy) = (nx as f64 / 2.0, ny as f64 / 2.0);
        let radius = 0.35 * nx as f64;
        let points: Vec<Complex64> = (0..=200)
            .map(|i| {
                let a = 2.0 * PI * i as f64 / 200.0;
                let ix = (cx + radius * a.cos()).round() as usize;
                let iy = (cy + radius * a.sin()).round() as usize;
                psi[[ix, iy]]
            })
            .collect();
        let total: f64 = points.windows(2).map(|w| (w[1] / w[0]).arg()).sum();
        assert_approx_eq!(total / 2.0 / PI, 2.0, 1e-6);
    }

    #[test]
    fn test_single_band_soc_model() {
        let bec = build(ModelKind::Soc1, &[]);
        let Kinetic::SocBand { dispersion, .. } = *bec.kinetic() else {
            panic!("expected a spin-orbit band");
        };
        assert_approx_eq!(dispersion.bands(0.0).0, 0.0, 1e-12);
        let core = bec.core();
        assert_approx_eq!(core.k[[0, 0]], 0.0, 1e-9);
        assert!(core.k.iter().all(|&k| k > -1e-9));

        let (a, b) = bec.spin_densities().unwrap();
        for (a, b) in a.iter().zip(b.iter()) {
            assert_approx_eq!(a + b, 1.0, 1e-12);
        }
        assert_eq!(bec.finger_v_max(&bec.density()), bec.c_s());
    }

    #[test]
    fn test_energy_of_uniform_state() {
        let bec = build(
            ModelKind::Bec,
            &[
                ("cylinder", ParamValue::Bool(false)),
                ("finger_v0_mu", ParamValue::Float(0.0)),
            ],
        );
        let n0 = bec.n0();
        let expected = bec.core().params.g * n0 * n0 / 2.0 * 32.0 * 32.0;
        assert_approx_eq!(bec.energy(), expected, 1e-9 * expected);
    }
}
