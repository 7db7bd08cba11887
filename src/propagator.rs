//! Symmetrised (Strang) split-step propagation shared by every model.
//!
//! A model owns a [`GpeCore`] with the grid, the wavefunction and the
//! derived operators, and implements [`SplitStep`] by supplying its density,
//! velocity field and potential exponential. The kinetic exponential and the
//! step loop itself are common.

use ndarray::{ArrayD, Zip};
use num_complex::Complex64;
use num_traits::Zero;

use crate::constants::COOLING_START_TIME;
use crate::error::{ConfigError, RuntimeError};
use crate::grid::Grid;
use crate::params::Params;
use crate::potential::{Finger, Trap, TrapContext};
use crate::tracer::TracerParticles;

/// Propagation phase `-i/(ħ·c)` for a complex cooling phase `c`.
pub fn propagation_phase(hbar: f64, cooling_phase: Complex64) -> Complex64 {
    Complex64::new(0.0, -1.0) / hbar / cooling_phase
}

/// Unit-modulus cooling phase `(1 + i·cooling)/|1 + i·cooling|`.
pub fn cooling_phase(cooling: f64) -> Complex64 {
    let c = Complex64::new(1.0, cooling);
    c / c.norm()
}

/// Local wave numbers `Re(IFFT(k·FFT(y))/y)` along x and y for a
/// single-component field, with `kx_shift` added to the x wave numbers.
/// Points where `y` vanishes get zero.
pub fn local_wavenumbers(
    grid: &Grid,
    y: &ArrayD<Complex64>,
    kx_shift: f64,
) -> (ArrayD<f64>, ArrayD<f64>) {
    let yt = grid.fft(y);
    let component = |axis: usize, shift: f64| {
        let mut z = yt.clone();
        Zip::from(&mut z)
            .and_broadcast(grid.wavenumber(axis))
            .for_each(|z, &k| *z *= k + shift);
        grid.ifft_inplace(&mut z);
        let mut out = ArrayD::zeros(y.raw_dim());
        Zip::from(&mut out).and(&z).and(y).for_each(|o, &z, &y| {
            *o = if y.is_zero() { 0.0 } else { (z / y).re };
        });
        out
    };
    (component(0, kx_shift), component(1, 0.0))
}

/// State and derived operators common to all GPE models.
#[derive(Debug, Clone)]
pub struct GpeCore {
    pub params: Params,
    pub grid: Grid,
    /// Kinetic operator over the spatial grid.
    pub k: ArrayD<f64>,
    /// Wavefunction, shape `N` or `(components, *N)`.
    pub psi: ArrayD<Complex64>,
    /// Simulation time; negative during relaxation.
    pub t: f64,
    pub dt: f64,
    pub mu: f64,
    pub phase: Complex64,
    /// Particle number captured when the initial state was built.
    pub n_particles: f64,
    pub finger: Finger,
    pub trap: Trap,
    v_trap: ArrayD<f64>,
}

impl GpeCore {
    pub fn new(params: Params) -> Result<Self, ConfigError> {
        params.validate()?;
        let grid = Grid::new(&[params.nx, params.ny], params.dx)?;
        let zeros = ArrayD::zeros(grid.shape());
        let finger = Finger {
            finger_x: params.finger_x,
            finger_y: params.finger_y,
            k_m: params.finger_k_m,
            damp: params.finger_damp,
            r0: params.finger_r0,
            v0_mu: params.finger_v0_mu,
            test_finger: params.test_finger,
            pot_z: Complex64::new(0.0, 0.0),
            pot_v: Complex64::new(0.0, 0.0),
        };
        let mut core = GpeCore {
            k: zeros.clone(),
            psi: ArrayD::zeros(grid.shape()),
            t: 0.0,
            dt: 0.0,
            mu: 0.0,
            phase: Complex64::new(0.0, -1.0),
            n_particles: 0.0,
            finger,
            trap: Trap::Free,
            v_trap: zeros,
            grid,
            params,
        };
        core.init_base()?;
        Ok(core)
    }

    /// Recompute the grid, chemical potential, propagation phase and finger
    /// settings from the current parameters. Models follow this with
    /// [`GpeCore::set_kinetic`] and [`GpeCore::set_trap`].
    pub fn init_base(&mut self) -> Result<(), ConfigError> {
        let p = &self.params;
        p.validate()?;
        if self.grid.shape() != &[p.nx, p.ny][..] || self.grid.spacing()[0] != p.dx {
            self.grid = Grid::new(&[p.nx, p.ny], p.dx)?;
        }
        self.mu = p.hbar.powi(2) / 2.0 / p.m / p.healing_length.powi(2);
        self.phase = propagation_phase(p.hbar, cooling_phase(p.cooling));

        self.finger.finger_x = p.finger_x;
        self.finger.finger_y = p.finger_y;
        self.finger.k_m = p.finger_k_m;
        self.finger.damp = p.finger_damp;
        self.finger.r0 = p.finger_r0;
        self.finger.v0_mu = p.finger_v0_mu;
        self.finger.test_finger = p.test_finger;
        self.finger.pot_v = Complex64::new(0.0, 0.0);
        let lxy = self.lxy();
        self.finger.pot_z = crate::potential::wrap_z(self.finger.pot_z, lxy);
        Ok(())
    }

    /// Install the kinetic operator and derive the time step from it.
    ///
    /// Fails when `k` is flat (a grid with a single point per axis) or not
    /// finite, since no time step can be derived from it.
    pub fn set_kinetic(&mut self, k: ArrayD<f64>) -> Result<(), ConfigError> {
        let k_max = k.iter().fold(0.0_f64, |acc, &v| acc.max(v.abs()));
        let dt = self.params.dt_t_scale * self.params.hbar / k_max;
        if !(k_max.is_finite() && k_max > 0.0 && dt.is_finite()) {
            return Err(ConfigError::InvalidValue {
                name: "nx".to_string(),
                reason: format!(
                    "kinetic operator has max |K| = {k_max}, no finite time step (grid {:?})",
                    self.grid.shape()
                ),
            });
        }
        self.dt = dt;
        self.k = k;
        log::debug!("dt = {:.4e} (t_scale = {:.4e})", self.dt, self.params.hbar / k_max);
        Ok(())
    }

    /// Put the finger back at rest at the origin.
    pub fn reset_finger(&mut self) {
        self.finger.pot_z = Complex64::new(0.0, 0.0);
        self.finger.pot_v = Complex64::new(0.0, 0.0);
    }

    pub fn set_trap(&mut self, trap: Trap) {
        self.v_trap = trap.sample(&self.grid, &self.trap_context());
        self.trap = trap;
    }

    /// Override the propagation phase with an explicit complex cooling phase.
    /// `Complex64::i()` gives pure imaginary-time evolution. The next
    /// parameter change restores the phase derived from `cooling`.
    pub fn set_cooling_phase(&mut self, cooling_phase: Complex64) {
        self.phase = propagation_phase(self.params.hbar, cooling_phase);
    }

    pub fn lxy(&self) -> (f64, f64) {
        let l = self.grid.lengths();
        (l[0], l[1])
    }

    pub fn nxy(&self) -> (usize, usize) {
        let n = self.grid.shape();
        (n[0], n[1])
    }

    pub fn t_scale(&self) -> f64 {
        self.params.hbar / self.k.iter().fold(0.0_f64, |acc, &v| acc.max(v.abs()))
    }

    pub fn trap_context(&self) -> TrapContext {
        TrapContext {
            lxy: self.lxy(),
            mu: self.mu,
            hbar: self.params.hbar,
            m: self.params.m,
            t: self.t,
        }
    }

    pub fn trap_potential(&self) -> ArrayD<f64> {
        if self.trap.is_time_dependent() {
            self.trap.sample(&self.grid, &self.trap_context())
        } else {
            self.v_trap.clone()
        }
    }

    /// Trap plus finger bump.
    pub fn external_potential(&self) -> ArrayD<f64> {
        let mut v = self.trap_potential();
        if self.finger.v0_mu != 0.0 {
            v += &self.finger.potential(&self.grid, self.mu);
        }
        v
    }

    pub fn z_finger(&self) -> Complex64 {
        self.finger.z_finger(self.t, self.lxy())
    }

    pub fn step_finger(&mut self, dt: f64, v_max: f64) {
        let target = self.z_finger();
        let lxy = self.lxy();
        self.finger.advance(dt, target, v_max, lxy);
    }

    /// `psi ← IFFT(exp(phase·dt·factor·K)·FFT(psi))` over the spatial axes of
    /// every component.
    pub fn apply_exp_k(&mut self, dt: f64, factor: f64) {
        let f = self.phase * dt * factor;
        let exp_k = self.k.mapv(|k| (f * k).exp());
        self.grid.fft_inplace(&mut self.psi);
        Zip::from(&mut self.psi)
            .and_broadcast(&exp_k)
            .for_each(|y, &e| *y *= e);
        self.grid.ifft_inplace(&mut self.psi);
    }

    /// `IFFT(K·FFT(psi))` for a field shaped like the wavefunction.
    pub fn apply_k(&self, psi: &ArrayD<Complex64>) -> ArrayD<Complex64> {
        let mut y = self.grid.fft(psi);
        Zip::from(&mut y)
            .and_broadcast(&self.k)
            .for_each(|y, &k| *y *= k);
        self.grid.ifft_inplace(&mut y);
        y
    }

    pub fn total_density(&self) -> f64 {
        self.psi.iter().map(|y| y.norm_sqr()).sum()
    }

    /// Rescale `psi` so the total density equals the captured particle
    /// number. A vanished density leaves non-finite values behind, which
    /// [`GpeCore::check_finite`] reports.
    pub fn renormalize(&mut self) {
        let scale = (self.n_particles / self.total_density()).sqrt();
        self.psi.mapv_inplace(|y| y * scale);
    }

    /// Capture the current total density as the conserved particle number.
    pub fn capture_particle_number(&mut self) {
        self.n_particles = self.total_density();
    }

    pub fn check_finite(&self) -> Result<(), RuntimeError> {
        if self.psi.iter().all(|y| y.re.is_finite() && y.im.is_finite()) {
            let total = self.total_density();
            if total > 0.0 {
                return Ok(());
            }
            log::warn!("total density vanished at t = {}", self.t);
            return Err(RuntimeError::VanishingDensity(total));
        }
        log::warn!("non-finite wavefunction at t = {}", self.t);
        Err(RuntimeError::NanOrInf { t: self.t })
    }
}

/// Split-step evolution for a model built on a [`GpeCore`].
pub trait SplitStep {
    fn core(&self) -> &GpeCore;

    fn core_mut(&mut self) -> &mut GpeCore;

    /// `|psi|²`, summed over components.
    fn density(&self) -> ArrayD<f64>;

    /// Velocity field `vx + i·vy` of an arbitrary field `psi` with the
    /// model's shape, from its local wave numbers.
    fn velocity_of(&self, psi: &ArrayD<Complex64>) -> ArrayD<Complex64>;

    /// Velocity field of the current state.
    fn velocity(&self) -> ArrayD<Complex64> {
        self.velocity_of(&self.core().psi)
    }

    /// Maximum speed of the finger potential given the current density.
    fn finger_v_max(&self, density: &ArrayD<f64>) -> f64;

    /// `psi ← exp(phase·dt·factor·V)·psi` followed by renormalisation.
    fn apply_exp_v(&mut self, dt: f64, factor: f64, density: &ArrayD<f64>);

    fn apply_exp_k(&mut self, dt: f64, factor: f64) {
        self.core_mut().apply_exp_k(dt, factor);
    }

    /// Advance `n` steps of size `dt`, kick-drift-kick. If tracers are given
    /// they are advected once per inner step.
    fn step(&mut self, n: usize, mut tracers: Option<&mut TracerParticles>) {
        let dt = self.core().dt;
        self.apply_exp_k(dt, 0.5);
        self.core_mut().t += dt / 2.0;
        for _ in 0..n {
            if let Some(tracers) = tracers.as_deref_mut() {
                tracers.update_velocity(self.velocity());
                tracers.advance(dt, &self.core().grid);
            }

            let density = self.density();
            if self.core().t > 0.0 {
                // The finger stays put while the initial state is prepared.
                let v_max = self.finger_v_max(&density);
                self.core_mut().step_finger(dt, v_max);
            }

            self.apply_exp_v(dt, 1.0, &density);
            self.apply_exp_k(dt, 1.0);
            self.core_mut().t += dt;
        }
        self.apply_exp_k(dt, -0.5);
        let core = self.core_mut();
        core.t -= dt / 2.0;
        core.renormalize();
    }

    /// Imaginary-time relaxation towards the ground state. Runs at negative
    /// times so the finger is held fixed, then restores the previous phase and
    /// resets the clock.
    fn relax(&mut self, steps: usize) {
        let core = self.core_mut();
        let phase = core.phase;
        core.set_cooling_phase(Complex64::i());
        core.t = COOLING_START_TIME;
        self.step(steps, None);
        let core = self.core_mut();
        core.t = 0.0;
        core.phase = phase;
        log::debug!("relaxed for {steps} steps");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use ndarray::IxDyn;

    #[test]
    fn test_cooling_phase_is_unit_modulus() {
        assert_eq!(cooling_phase(0.0), Complex64::new(1.0, 0.0));
        let c = cooling_phase(0.3);
        assert_approx_eq!(c.norm(), 1.0, 1e-15);
        assert!(c.im > 0.0);

        // Real time: exp(phase·dt·E) is a pure rotation.
        let phase = propagation_phase(2.0, cooling_phase(0.0));
        assert_approx_eq!(phase.re, 0.0, 1e-15);
        assert_approx_eq!(phase.im, -0.5, 1e-15);
        // Imaginary time: pure decay.
        let phase = propagation_phase(1.0, Complex64::i());
        assert_approx_eq!(phase.re, -1.0, 1e-15);
        assert_approx_eq!(phase.im, 0.0, 1e-15);
    }

    #[test]
    fn test_local_wavenumbers_of_a_plane_wave() {
        let grid = Grid::new(&[16, 8], 0.5).unwrap();
        let kx = grid.axis_wavenumbers(0)[3];
        let ky = grid.axis_wavenumbers(1)[7];
        let x = grid.axis_values(0);
        let y = grid.axis_values(1);
        let psi = ArrayD::from_shape_fn(IxDyn(&[16, 8]), |i| {
            Complex64::new(0.0, kx * x[i[0]] + ky * y[i[1]]).exp()
        });

        let (lx, ly) = local_wavenumbers(&grid, &psi, 0.0);
        assert!(lx.iter().all(|&k| (k - kx).abs() < 1e-10));
        assert!(ly.iter().all(|&k| (k - ky).abs() < 1e-10));

        let (lx, _) = local_wavenumbers(&grid, &psi, 2.0);
        assert!(lx.iter().all(|&k| (k - kx - 2.0).abs() < 1e-10));
    }

    #[test]
    fn test_flat_kinetic_operator_is_rejected() {
        let mut core = GpeCore::new(Params::default()).unwrap();
        let shape = IxDyn(&[32, 32]);
        assert!(matches!(
            core.set_kinetic(ArrayD::zeros(shape.clone())),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(core.set_kinetic(ArrayD::from_elem(shape.clone(), f64::NAN)).is_err());

        core.set_kinetic(ArrayD::from_elem(shape, 2.0)).unwrap();
        assert_approx_eq!(core.dt, 0.05, 1e-15);
    }

    #[test]
    fn test_reset_finger_stops_it_at_the_origin() {
        let mut core = GpeCore::new(Params::default()).unwrap();
        core.finger.pot_z = Complex64::new(3.0, -1.0);
        core.finger.pot_v = Complex64::new(0.5, 0.5);
        core.reset_finger();
        assert_eq!(core.finger.pot_z, Complex64::new(0.0, 0.0));
        assert_eq!(core.finger.pot_v, Complex64::new(0.0, 0.0));
    }

    #[test]
    fn test_local_wavenumbers_vanish_where_psi_does() {
        let grid = Grid::new(&[8, 8], 1.0).unwrap();
        let psi = ArrayD::zeros(IxDyn(&[8, 8]));
        let (lx, ly) = local_wavenumbers(&grid, &psi, 1.0);
        assert!(lx.iter().chain(ly.iter()).all(|&k| k == 0.0));
    }
}
