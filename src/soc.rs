//! Spin-orbit coupled condensates.
//!
//! Two pseudo-spin components coupled along x with equal Rashba and
//! Dresselhaus terms. The potential step applies a 2×2 matrix exponential at
//! every lattice point, computed in closed form by [`expm2`].

use itertools::izip;
use ndarray::{ArrayD, Axis, IxDyn, Zip};
use num_complex::Complex64;
use num_traits::Zero;

use crate::constants::{NEWTON_ITERATIONS, PI};
use crate::error::{ConfigError, DispersionError};
use crate::model::{GpeModel, ModelKind};
use crate::params::Params;
use crate::potential::Trap;
use crate::propagator::{local_wavenumbers, GpeCore, SplitStep};

/// A 2×2 complex matrix, row major.
pub type Matrix2 = [[Complex64; 2]; 2];

/// `sinh(q)/q`, finite at `q = 0`.
fn sinhc(q: Complex64) -> Complex64 {
    if q.norm() < 1e-4 {
        let q2 = q * q;
        Complex64::new(1.0, 0.0) + q2 / 6.0 + q2 * q2 / 120.0
    } else {
        q.sinh() / q
    }
}

/// Exact exponential of a 2×2 matrix.
///
/// With `s = (a + d)/2` and `q = sqrt(bc - (a - s)(d - s))` the eigenvalues
/// are `s ± q`, and
///
/// `exp(M) = e^s [cosh(q)·I + sinh(q)/q·(M - s·I)]`.
///
/// `sinh(q)/q` is evaluated by a series near `q = 0`, so degenerate
/// eigenvalues (e.g. no Rabi coupling) need no special casing.
pub fn expm2(m: &Matrix2) -> Matrix2 {
    let [[a, b], [c, d]] = *m;
    let s = (a + d) / 2.0;
    let q = (b * c - (a - s) * (d - s)).sqrt();
    let exp_s = s.exp();
    let cosh_q = exp_s * q.cosh();
    let sinhc_q = exp_s * sinhc(q);
    [
        [cosh_q + sinhc_q * (a - s), sinhc_q * b],
        [sinhc_q * c, cosh_q + sinhc_q * (d - s)],
    ]
}

/// Matrix-vector product `A·x`.
pub fn dot2(a: &Matrix2, x: [Complex64; 2]) -> [Complex64; 2] {
    [
        a[0][0] * x[0] + a[0][1] * x[1],
        a[1][0] * x[0] + a[1][1] * x[1],
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    Lower,
    Upper,
}

impl Branch {
    fn sign(self) -> f64 {
        match self {
            Branch::Lower => -1.0,
            Branch::Upper => 1.0,
        }
    }
}

/// Single-particle SOC bands in dimensionless units: momenta in units of
/// `k_R`, energies in units of `2E_R`, `d = δ/4E_R` and `w = Ω/4E_R`.
///
/// `E±(k) = (k² + 1)/2 ∓ sqrt((k - d)² + w²)`
///
/// A non-zero `(k0, e0)` shifts the bands so the point `(k0, e0)` of the
/// unshifted lower band sits at the origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dispersion {
    pub d: f64,
    pub w: f64,
    pub k0: f64,
    pub e0: f64,
}

impl Dispersion {
    pub fn new(d: f64, w: f64) -> Self {
        Dispersion {
            d,
            w,
            k0: 0.0,
            e0: 0.0,
        }
    }

    /// The same bands shifted so the lower-band minimum sits at `k = 0`,
    /// `E = 0`.
    pub fn centered(d: f64, w: f64) -> Self {
        let raw = Dispersion::new(d, w);
        let k0 = raw.get_k0(NEWTON_ITERATIONS);
        Dispersion {
            k0,
            e0: raw.energy(k0).0,
            ..raw
        }
    }

    fn gap(&self, k: f64) -> f64 {
        ((k - self.d).powi(2) + self.w.powi(2)).sqrt()
    }

    fn energy(&self, k: f64) -> (f64, f64) {
        let e = (k * k + 1.0) / 2.0;
        let gap = self.gap(k);
        (e - gap, e + gap)
    }

    fn raw_slope(&self, k: f64) -> (f64, f64) {
        let t = (k - self.d) / self.gap(k);
        (k - t, k + t)
    }

    fn raw_curvature(&self, k: f64) -> (f64, f64) {
        let t = self.w.powi(2) / self.gap(k).powi(3);
        (1.0 - t, 1.0 + t)
    }

    /// `(E₋, E₊)` or their first or second derivative at `k`.
    pub fn es(&self, k: f64, order: u32) -> Result<(f64, f64), DispersionError> {
        match order {
            0 => Ok(self.bands(k)),
            1 => Ok(self.slope(k)),
            2 => Ok(self.curvature(k)),
            _ => Err(DispersionError::UnsupportedOrder(order)),
        }
    }

    /// `(E₋, E₊)` at `k`.
    pub fn bands(&self, k: f64) -> (f64, f64) {
        let (lower, upper) = self.energy(k + self.k0);
        (lower - self.e0, upper - self.e0)
    }

    pub fn slope(&self, k: f64) -> (f64, f64) {
        self.raw_slope(k + self.k0)
    }

    pub fn curvature(&self, k: f64) -> (f64, f64) {
        self.raw_curvature(k + self.k0)
    }

    /// One Newton step towards a stationary point of the unshifted lower band.
    pub fn newton(&self, k: f64) -> f64 {
        k - self.raw_slope(k).0 / self.raw_curvature(k).0
    }

    /// Minimum of the unshifted lower band. The minimum lies on the opposite
    /// side of `d`, so iteration starts from `-sign(d)/2`.
    pub fn get_k0(&self, iterations: usize) -> f64 {
        let sign = if self.d > 0.0 {
            1.0
        } else if self.d < 0.0 {
            -1.0
        } else {
            0.0
        };
        (0..iterations).fold(-sign / 2.0, |k, _| self.newton(k))
    }

    /// Spinor amplitudes `(ψ_a, ψ_b)` of `branch` at momentum `k`.
    pub fn get_ab(&self, k: f64, branch: Branch) -> (f64, f64) {
        let k = k + self.k0;
        let d_ = -branch.sign() * self.gap(k);
        let b_ = k - self.d;
        let theta = (-b_ - d_).atan2(self.w);
        (theta.cos(), theta.sin())
    }
}

/// Two-component SOC condensate, wavefunction shape `(2, Nx, Ny)`.
///
/// The whole system can be boosted by the Bloch momentum `k_B`, rounded to a
/// lattice momentum. `SuperSolid2` adds a cosine lattice commensurate with the
/// box.
#[derive(Debug, Clone)]
pub struct Soc2 {
    core: GpeCore,
    kind: ModelKind,
    dispersion: Dispersion,
    k_b: f64,
    k_r: f64,
    k0: f64,
    e_r: f64,
    v_r: f64,
    omega: f64,
    delta: f64,
    c_s: f64,
    v_ab: ArrayD<Complex64>,
}

impl Soc2 {
    pub fn new(kind: ModelKind, params: Params) -> Result<Self, ConfigError> {
        if !matches!(kind, ModelKind::Soc2 | ModelKind::SuperSolid2) {
            return Err(ConfigError::InvalidValue {
                name: "model".to_string(),
                reason: format!("{kind} is not a two-component model"),
            });
        }
        let core = GpeCore::new(params)?;
        let v_ab = ArrayD::zeros(core.grid.shape());
        let mut model = Soc2 {
            core,
            kind,
            dispersion: Dispersion::new(0.0, 0.0),
            k_b: 0.0,
            k_r: 0.0,
            k0: 0.0,
            e_r: 0.0,
            v_r: 0.0,
            omega: 0.0,
            delta: 0.0,
            c_s: 0.0,
            v_ab,
        };
        model.init()?;
        model.set_initial_data();
        log::info!(
            "built {} on a {:?} grid (k_R = {:.4}, Omega = {:.4}, delta = {:.4})",
            kind.name(),
            model.core.nxy(),
            model.k_r,
            model.omega,
            model.delta
        );
        Ok(model)
    }

    pub fn recoil_momentum(&self) -> f64 {
        self.k_r
    }

    pub fn recoil_energy(&self) -> f64 {
        self.e_r
    }

    pub fn recoil_velocity(&self) -> f64 {
        self.v_r
    }

    pub fn bloch_momentum(&self) -> f64 {
        self.k_b
    }

    pub fn dispersion(&self) -> &Dispersion {
        &self.dispersion
    }

    /// Per-component densities, shape `(2, Nx, Ny)`.
    pub fn densities(&self) -> ArrayD<f64> {
        self.core.psi.mapv(|y| y.norm_sqr())
    }

    /// Bloch momentum of the flow `v_v_c·c_s`, rounded to a lattice momentum.
    fn flow_momentum(&self) -> f64 {
        let p = &self.core.params;
        let v = p.v_v_c * (self.core.mu / p.m).sqrt();
        let k_b = p.m * v / p.hbar;
        let lx = self.core.lxy().0;
        let n = (lx * k_b / 2.0 / PI).round();
        2.0 * PI * n / lx
    }

    fn lattice_trap(&self) -> Trap {
        let p = &self.core.params;
        let lx = self.core.lxy().0;
        let k_l = p.lattice_k_k_r * self.k_r;
        let cells = (lx * k_l / 2.0 / PI).round();
        Trap::Lattice {
            k_l: 2.0 * PI * cells / lx,
            v0: p.lattice_v0_mu * self.core.mu,
            x0: p.lattice_x0,
        }
    }
}

/// The entry of `values` closest to `target`.
fn nearest_to(values: &[f64], target: f64) -> f64 {
    values
        .iter()
        .copied()
        .min_by(|a, b| (a - target).abs().total_cmp(&(b - target).abs()))
        .unwrap_or(target)
}

impl GpeModel for Soc2 {
    fn kind(&self) -> ModelKind {
        self.kind
    }

    fn init(&mut self) -> Result<(), ConfigError> {
        self.core.init_base()?;
        let p = self.core.params.clone();
        self.c_s = (self.core.mu / p.m).sqrt();
        self.k_b = self.flow_momentum();

        // k_R and k0 are snapped to lattice momenta of the boosted frame so
        // the initial plane waves are periodic.
        let kx: Vec<f64> = self
            .core
            .grid
            .axis_wavenumbers(0)
            .iter()
            .map(|k| k + self.k_b)
            .collect();
        self.k_r = nearest_to(&kx, p.k_r);
        self.v_r = p.hbar * self.k_r / p.m;
        self.e_r = (p.hbar * self.k_r).powi(2) / 2.0 / p.m;
        self.omega = 4.0 * p.soc_w * self.e_r;
        self.delta = 4.0 * p.soc_d * self.e_r;
        self.dispersion = Dispersion::new(p.soc_d, p.soc_w);
        self.k0 = nearest_to(&kx, self.dispersion.get_k0(NEWTON_ITERATIONS) * self.k_r);

        let grid = &self.core.grid;
        let ky = grid.axis_wavenumbers(1);
        let hbar2_2m = p.hbar.powi(2) / 2.0 / p.m;
        let k = ArrayD::from_shape_fn(IxDyn(grid.shape()), |idx| {
            hbar2_2m * (kx[idx[0]].powi(2) + ky[idx[1]].powi(2))
        });

        let x = grid.axis_values(0);
        let (half_omega, k_r) = (self.omega / 2.0, self.k_r);
        self.v_ab = ArrayD::from_shape_fn(IxDyn(grid.shape()), |idx| {
            half_omega * Complex64::new(0.0, 2.0 * k_r * x[idx[0]]).exp()
        });

        let trap = match self.kind {
            ModelKind::SuperSolid2 => self.lattice_trap(),
            _ => Trap::Free,
        };
        self.core.set_kinetic(k)?;
        self.core.set_trap(trap);
        Ok(())
    }

    fn set_initial_data(&mut self) {
        let p = &self.core.params;
        let steps = p.cooling_steps;
        let n0 = self.core.mu / p.g_aa + self.core.mu / p.g_bb;
        let (a, b) = self
            .dispersion
            .get_ab(self.dispersion.get_k0(NEWTON_ITERATIONS), Branch::Lower);
        let amplitude = [n0.sqrt() * a, n0.sqrt() * b];
        let momentum = [self.k0 + self.k_r, self.k0 - self.k_r];

        let (nx, ny) = self.core.nxy();
        let x = self.core.grid.axis_values(0);
        self.core.psi = ArrayD::from_shape_fn(IxDyn(&[2, nx, ny]), |idx| {
            let c = idx[0];
            amplitude[c] * Complex64::new(0.0, momentum[c] * x[idx[1]]).exp()
        });
        self.core.capture_particle_number();
        self.relax(steps);
    }

    fn energy(&self) -> f64 {
        let p = &self.core.params;
        let metric = self.core.grid.metric();
        let kinetic: f64 = self
            .core
            .psi
            .iter()
            .zip(self.core.apply_k(&self.core.psi).iter())
            .map(|(y, ky)| (y.conj() * ky).re)
            .sum();

        let v = self.core.external_potential();
        let psi_a = self.core.psi.index_axis(Axis(0), 0);
        let psi_b = self.core.psi.index_axis(Axis(0), 1);
        let potential: f64 = izip!(psi_a.iter(), psi_b.iter(), v.iter(), self.v_ab.iter())
            .map(|(ya, yb, &v, v_ab)| {
                let (na, nb) = (ya.norm_sqr(), yb.norm_sqr());
                v * (na + nb)
                    + (p.g_aa * na * na + p.g_bb * nb * nb + 2.0 * p.g_ab * na * nb) / 2.0
                    - self.delta / 2.0 * (na - nb)
                    + 2.0 * (ya.conj() * v_ab * yb).re
            })
            .sum();
        (kinetic + potential) * metric
    }

    fn spin_densities(&self) -> Option<(ArrayD<f64>, ArrayD<f64>)> {
        let n = self.densities();
        Some((
            n.index_axis(Axis(0), 0).to_owned(),
            n.index_axis(Axis(0), 1).to_owned(),
        ))
    }
}

impl SplitStep for Soc2 {
    fn core(&self) -> &GpeCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut GpeCore {
        &mut self.core
    }

    fn density(&self) -> ArrayD<f64> {
        self.densities().sum_axis(Axis(0))
    }

    /// Velocity of the first component, from its phase gradient in the
    /// boosted frame. A single-component `psi` is taken as that component.
    fn velocity_of(&self, psi: &ArrayD<Complex64>) -> ArrayD<Complex64> {
        let psi_a = if psi.ndim() == self.core.grid.ndim() {
            psi.to_owned()
        } else {
            psi.index_axis(Axis(0), 0).to_owned()
        };
        let (kx, ky) = local_wavenumbers(&self.core.grid, &psi_a, self.k_b);
        let hbar_m = self.core.params.hbar / self.core.params.m;
        let mut v = ArrayD::zeros(kx.raw_dim());
        Zip::from(&mut v)
            .and(&kx)
            .and(&ky)
            .for_each(|v, &kx, &ky| *v = Complex64::new(kx, ky) * hbar_m);
        v
    }

    fn finger_v_max(&self, _density: &ArrayD<f64>) -> f64 {
        self.c_s
    }

    fn apply_exp_v(&mut self, dt: f64, factor: f64, _density: &ArrayD<f64>) {
        let p = &self.core.params;
        let (g_aa, g_bb, g_ab) = (p.g_aa, p.g_bb, p.g_ab);
        let (mu, delta) = (self.core.mu, self.delta);
        let f = self.core.phase * dt * factor;
        let v = self.core.external_potential();

        let (head, tail) = self.core.psi.view_mut().split_at(Axis(0), 1);
        let mut psi_a = head.index_axis_move(Axis(0), 0);
        let mut psi_b = tail.index_axis_move(Axis(0), 0);
        for (ya, yb, &v, &v_ab) in izip!(
            psi_a.iter_mut(),
            psi_b.iter_mut(),
            v.iter(),
            self.v_ab.iter()
        ) {
            let (na, nb) = (ya.norm_sqr(), yb.norm_sqr());
            let va = v + g_aa * na + g_ab * nb - mu - delta / 2.0;
            let vb = v + g_bb * nb + g_ab * na - mu + delta / 2.0;
            let m = [
                [f * va, f * v_ab],
                [f * v_ab.conj(), f * vb],
            ];
            let [a, b] = dot2(&expm2(&m), [*ya, *yb]);
            *ya = a;
            *yb = b;
        }
        self.core.renormalize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn c(re: f64, im: f64) -> Complex64 {
        Complex64::new(re, im)
    }

    fn matmul(a: &Matrix2, b: &Matrix2) -> Matrix2 {
        let mut out = [[Complex64::zero(); 2]; 2];
        for i in 0..2 {
            for j in 0..2 {
                out[i][j] = a[i][0] * b[0][j] + a[i][1] * b[1][j];
            }
        }
        out
    }

    /// Scaling and squaring with a long Taylor series.
    fn expm_reference(m: &Matrix2) -> Matrix2 {
        let squarings = 10;
        let scale = 1.0 / f64::from(1 << squarings);
        let m = m.map(|row| row.map(|v| v * scale));
        let mut term = [[c(1.0, 0.0), c(0.0, 0.0)], [c(0.0, 0.0), c(1.0, 0.0)]];
        let mut sum = term;
        for n in 1..20 {
            term = matmul(&term, &m).map(|row| row.map(|v| v / n as f64));
            for i in 0..2 {
                for j in 0..2 {
                    sum[i][j] += term[i][j];
                }
            }
        }
        for _ in 0..squarings {
            sum = matmul(&sum, &sum);
        }
        sum
    }

    fn assert_matrix_close(a: &Matrix2, b: &Matrix2, tol: f64) {
        for i in 0..2 {
            for j in 0..2 {
                let scale = 1.0 + b[i][j].norm();
                assert!(
                    (a[i][j] - b[i][j]).norm() < tol * scale,
                    "entry ({i}, {j}): {} vs {}",
                    a[i][j],
                    b[i][j]
                );
            }
        }
    }

    #[test]
    fn test_expm2_matches_dense_exponential() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..200 {
            let m = [[(); 2]; 2].map(|row| {
                row.map(|_| c(rng.gen_range(-2.0..2.0), rng.gen_range(-2.0..2.0)))
            });
            assert_matrix_close(&expm2(&m), &expm_reference(&m), 1e-10);
        }
    }

    #[test]
    fn test_expm2_degenerate_eigenvalues() {
        let zero = c(0.0, 0.0);

        // Diagonal with equal entries: q = 0 exactly.
        let a = c(0.3, -1.2);
        let m = [[a, zero], [zero, a]];
        let e = expm2(&m);
        assert_matrix_close(&e, &[[a.exp(), zero], [zero, a.exp()]], 1e-14);

        // Jordan block: defective, q = 0.
        let m = [[a, c(1.0, 0.0)], [zero, a]];
        let e = expm2(&m);
        assert_matrix_close(&e, &[[a.exp(), a.exp()], [zero, a.exp()]], 1e-14);

        // Nearly degenerate.
        let m = [[a, c(1e-9, 0.0)], [c(1e-9, 0.0), a + c(1e-9, 0.0)]];
        assert_matrix_close(&expm2(&m), &expm_reference(&m), 1e-12);
    }

    #[test]
    fn test_dot2() {
        let a = [[c(1.0, 0.0), c(0.0, 1.0)], [c(2.0, 0.0), c(0.0, 0.0)]];
        let y = dot2(&a, [c(1.0, 1.0), c(3.0, 0.0)]);
        assert_eq!(y, [c(1.0, 4.0), c(2.0, 2.0)]);
    }

    #[test]
    fn test_dispersion_derivatives_match_finite_differences() {
        let e = Dispersion::new(0.543 / 4.0, 1.5 / 4.0);
        let h = 1e-5;
        for i in 0..=60 {
            let k = -3.0 + 0.1 * i as f64;
            let (m, _) = e.es(k - h, 0).unwrap();
            let (p, _) = e.es(k + h, 0).unwrap();
            let (z, _) = e.es(k, 0).unwrap();
            let (d1, _) = e.es(k, 1).unwrap();
            let (d2, _) = e.es(k, 2).unwrap();
            assert_approx_eq!(d1, (p - m) / 2.0 / h, 1e-6);
            assert_approx_eq!(d2, (p - 2.0 * z + m) / h / h, 1e-3);

            let (_, mu) = e.es(k - h, 0).unwrap();
            let (_, pu) = e.es(k + h, 0).unwrap();
            let (_, d1u) = e.es(k, 1).unwrap();
            assert_approx_eq!(d1u, (pu - mu) / 2.0 / h, 1e-6);
        }
    }

    #[test]
    fn test_unsupported_order_is_rejected() {
        let e = Dispersion::new(0.1, 0.2);
        assert_eq!(e.es(0.0, 3), Err(DispersionError::UnsupportedOrder(3)));
    }

    #[test]
    fn test_newton_finds_lower_band_minimum() {
        let e = Dispersion::new(0.125, 0.25);
        let k0 = e.get_k0(NEWTON_ITERATIONS);
        assert!(k0 < 0.0);
        assert!(e.es(k0, 1).unwrap().0.abs() < 1e-10);
        assert!(e.es(k0, 2).unwrap().0 > 0.0);
        // Lower than its neighbours.
        let e_min = e.es(k0, 0).unwrap().0;
        assert!(e.es(k0 - 0.01, 0).unwrap().0 > e_min);
        assert!(e.es(k0 + 0.01, 0).unwrap().0 > e_min);
    }

    #[test]
    fn test_centered_dispersion_has_minimum_at_origin() {
        let e = Dispersion::centered(0.125, 0.25);
        let (e0, _) = e.es(0.0, 0).unwrap();
        assert_approx_eq!(e0, 0.0, 1e-14);
        assert!(e.slope(0.0).0.abs() < 1e-10);
        assert!(e.es(0.3, 0).unwrap().0 > 0.0);
        assert!(e.es(-0.3, 0).unwrap().0 > 0.0);
    }

    #[test]
    fn test_get_ab_is_normalized_and_branches_are_orthogonal() {
        let e = Dispersion::new(0.125, 0.25);
        for k in [-1.5, -0.4, 0.0, 0.7, 2.0] {
            let (a, b) = e.get_ab(k, Branch::Lower);
            let (c, d) = e.get_ab(k, Branch::Upper);
            assert_approx_eq!(a * a + b * b, 1.0, 1e-12);
            assert_approx_eq!(a * c + b * d, 0.0, 1e-12);
        }
    }

    #[test]
    fn test_lower_band_spinor_is_an_eigenvector() {
        // H(k) = [[k - d, w], [w, -(k - d)]] in units of 2E_R up to a
        // constant; the lower branch has eigenvalue -sqrt((k-d)² + w²).
        let e = Dispersion::new(0.2, 0.3);
        let k = 0.4;
        let (a, b) = e.get_ab(k, Branch::Lower);
        let gap = ((k - e.d).powi(2) + e.w.powi(2)).sqrt();
        let ha = (k - e.d) * a + e.w * b;
        let hb = e.w * a - (k - e.d) * b;
        assert_approx_eq!(ha, -gap * a, 1e-12);
        assert_approx_eq!(hb, -gap * b, 1e-12);
    }
}
