//! External potentials: smooth walls, static and rotating traps, and the
//! movable "finger" bump that follows the user's pointer on a damped spring.

use ndarray::ArrayD;
use num_complex::Complex64;

use crate::constants::*;
use crate::grid::Grid;

/// Smooth step going from 0 at `t = 0` to 1 at `t = t1`.
///
/// \[
/// \mathrm{mstep}(t) = \frac{1 + \tanh\left(\alpha\tan\left(\frac{\pi}{2}(2t/t_1 - 1)\right)\right)}{2}
/// \]
///
/// The step is infinitely differentiable.
pub fn mstep(t: f64, t1: f64) -> f64 {
    mstep_with_alpha(t, t1, MSTEP_ALPHA)
}

pub fn mstep_with_alpha(t: f64, t1: f64, alpha: f64) -> f64 {
    if t < 0.0 {
        0.0
    } else if t < t1 {
        (1.0 + (alpha * (PI * (2.0 * t / t1 - 1.0) / 2.0).tan()).tanh()) / 2.0
    } else {
        1.0
    }
}

/// Wrap `x` into the periodic interval `[-L/2, L/2)`.
pub fn wrap(x: f64, length: f64) -> f64 {
    let mut r = (x + length / 2.0).rem_euclid(length);
    // rem_euclid may round up to exactly `length` for tiny negative inputs.
    if r >= length {
        r -= length;
    }
    r - length / 2.0
}

/// Wrap a point of the complex plane into the box `lxy`.
pub fn wrap_z(z: Complex64, lxy: (f64, f64)) -> Complex64 {
    Complex64::new(wrap(z.re, lxy.0), wrap(z.im, lxy.1))
}

/// Quantities a trap needs besides the position.
#[derive(Debug, Clone, Copy)]
pub struct TrapContext {
    pub lxy: (f64, f64),
    pub mu: f64,
    pub hbar: f64,
    pub m: f64,
    pub t: f64,
}

/// Static or slowly driven trapping potentials. Each variant is a pure
/// function of position (and of time for `RotatingBumps`).
#[derive(Debug, Clone, PartialEq)]
pub enum Trap {
    Free,
    /// Soft cylindrical wall at `(2x/Lx)² + (2y/Ly)² = 0.8`.
    Cylinder,
    /// Cylinder with `bump_n` bumps of relative height `bump_h`, rotating at
    /// `omega`.
    RotatingBumps { bump_n: u32, bump_h: f64, omega: f64 },
    /// Walls along `y` only, leaving a periodic channel in `x`.
    Channel,
    /// Harmonic well with oscillator length `a_ho` (absolute units).
    Harmonic { a_ho: f64 },
    /// Annulus between relative radii `r1` and `r2` with walls of width `dr`.
    Ring { r1: f64, r2: f64, dr: f64 },
    /// `v0 cos(k_l (x - x0))`.
    Lattice { k_l: f64, v0: f64, x0: f64 },
}

impl Trap {
    pub fn is_time_dependent(&self) -> bool {
        matches!(self, Trap::RotatingBumps { .. })
    }

    pub fn value(&self, x: f64, y: f64, ctx: &TrapContext) -> f64 {
        let (lx, ly) = ctx.lxy;
        let r2_ = (2.0 * x / lx).powi(2) + (2.0 * y / ly).powi(2);
        let wall = |r2: f64| WALL_HEIGHT_MU * ctx.mu * mstep(r2 - WALL_RADIUS_SQ, WALL_WIDTH_SQ);
        match *self {
            Trap::Free => 0.0,
            Trap::Cylinder => wall(r2_),
            Trap::RotatingBumps {
                bump_n,
                bump_h,
                omega,
            } => {
                let theta = y.atan2(x);
                let theta0 = omega * ctx.t;
                wall(r2_ * (1.0 - bump_h * (bump_n as f64 * (theta - theta0)).cos()))
            }
            Trap::Channel => wall((2.0 * y / ly).powi(2)),
            Trap::Harmonic { a_ho } => {
                let mw2 = ctx.hbar.powi(2) / a_ho.powi(4) / ctx.m;
                mw2 * (x * x + y * y) / 2.0
            }
            Trap::Ring { r1, r2, dr } => {
                let step = 1.0 - mstep(r2_ - r1 * r1, dr * dr) + mstep(r2_ - r2 * r2, dr * dr);
                WALL_HEIGHT_MU * ctx.mu * step
            }
            Trap::Lattice { k_l, v0, x0 } => v0 * (k_l * (x - x0)).cos(),
        }
    }

    pub fn sample(&self, grid: &Grid, ctx: &TrapContext) -> ArrayD<f64> {
        if *self == Trap::Free {
            return ArrayD::zeros(grid.shape());
        }
        grid.sample(|p| self.value(p[0], p[1], ctx))
    }
}

/// The user's finger and the potential bump tied to it.
///
/// The bump follows the target `z_finger` through a damped spring and never
/// moves faster than the `v_max` handed to [`Finger::advance`]. Positions are
/// points of the complex plane in physical box coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Finger {
    /// Target position relative to the box, in `[0, 1]`.
    pub finger_x: f64,
    pub finger_y: f64,
    pub k_m: f64,
    pub damp: f64,
    pub r0: f64,
    pub v0_mu: f64,
    pub test_finger: bool,
    pub pot_z: Complex64,
    pub pot_v: Complex64,
}

impl Finger {
    /// Target position at time `t`.
    pub fn z_finger(&self, t: f64, lxy: (f64, f64)) -> Complex64 {
        if self.test_finger {
            if t >= 0.0 {
                3.0 * Complex64::new(0.0, t / 5.0).exp()
            } else {
                Complex64::new(3.0, 0.0)
            }
        } else {
            let (lx, ly) = lxy;
            Complex64::new(lx * (self.finger_x - 0.5), ly * (self.finger_y - 0.5))
        }
    }

    pub fn set_z_finger(&mut self, z: Complex64, lxy: (f64, f64)) {
        self.finger_x = z.re / lxy.0 + 0.5;
        self.finger_y = z.im / lxy.1 + 0.5;
    }

    /// One explicit step of the spring-follow controller.
    pub fn advance(&mut self, dt: f64, target: Complex64, v_max: f64, lxy: (f64, f64)) {
        let mut pot_z = self.pot_z + dt * self.pot_v;
        let accel = -self.k_m * (pot_z - target) - self.damp * self.pot_v;
        self.pot_v += dt * accel;

        // Clamp the speed, keeping the direction.
        let speed = self.pot_v.norm();
        if speed > v_max {
            self.pot_v *= v_max / speed;
        }
        pot_z = wrap_z(pot_z, lxy);
        self.pot_z = pot_z;
    }

    /// Gaussian bump of height `v0_mu·mu` centred on `pot_z`, using the
    /// periodic displacement along both axes.
    pub fn potential(&self, grid: &Grid, mu: f64) -> ArrayD<f64> {
        let lengths = grid.lengths();
        let (lx, ly) = (lengths[0], lengths[1]);
        let (x0, y0) = (self.pot_z.re, self.pot_z.im);
        let v0 = self.v0_mu * mu;
        let r0 = self.r0;
        grid.sample(|p| {
            let x = wrap(p[0] - x0, lx);
            let y = wrap(p[1] - y0, ly);
            v0 * (-(x * x + y * y) / 2.0 / (r0 * r0)).exp()
        })
    }
}
