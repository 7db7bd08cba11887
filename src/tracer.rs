//! Passive tracer particles advected through the superfluid velocity field.

use ndarray::ArrayD;
use num_complex::Complex64;
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::error::RuntimeError;
use crate::grid::Grid;

/// Map a position along one axis to a floating-point grid index,
/// `((pos + L/2) mod L)/L·(N - 1)`.
pub fn position_to_index(pos: f64, length: f64, n: usize) -> f64 {
    (pos + length / 2.0).rem_euclid(length) / length * (n as f64 - 1.0)
}

#[derive(Debug, Clone)]
pub struct TracerParticles {
    positions: Vec<Complex64>,
    velocity: Option<ArrayD<Complex64>>,
    lxy: (f64, f64),
    nxy: (usize, usize),
}

impl TracerParticles {
    /// Seed `n` particles distributed like `density` by rejection sampling:
    /// a random lattice site is accepted with probability `n/n_max`.
    pub fn new(
        density: &ArrayD<f64>,
        grid: &Grid,
        n: usize,
        seed: u64,
    ) -> Result<Self, RuntimeError> {
        let n_max = density.iter().fold(0.0_f64, |acc, &v| acc.max(v));
        if density.iter().any(|v| !v.is_finite()) {
            return Err(RuntimeError::NonFiniteDensity);
        }
        if n > 0 && n_max <= 0.0 {
            return Err(RuntimeError::VanishingDensity(n_max));
        }

        let x = grid.axis_values(0);
        let y = grid.axis_values(1);
        let (nx, ny) = (x.len(), y.len());
        let mut rng = StdRng::seed_from_u64(seed);
        let mut positions = Vec::with_capacity(n);
        while positions.len() < n {
            let ix = rng.gen_range(0..nx);
            let iy = rng.gen_range(0..ny);
            if rng.gen::<f64>() * n_max <= density[[ix, iy]] {
                positions.push(Complex64::new(x[ix], y[iy]));
            }
        }
        log::debug!("seeded {n} tracer particles");

        let l = grid.lengths();
        Ok(TracerParticles {
            positions,
            velocity: None,
            lxy: (l[0], l[1]),
            nxy: (nx, ny),
        })
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Positions in box coordinates.
    pub fn positions(&self) -> &[Complex64] {
        &self.positions
    }

    /// Store the velocity field (`vx + i·vy`) used by the next advance.
    pub fn update_velocity(&mut self, velocity: ArrayD<Complex64>) {
        self.velocity = Some(velocity);
    }

    /// Explicit Euler step using the velocity at the nearest lattice site.
    pub fn advance(&mut self, dt: f64, grid: &Grid) {
        let Some(velocity) = &self.velocity else {
            return;
        };
        let l = grid.lengths();
        let n = grid.shape();
        for pos in self.positions.iter_mut() {
            let ix = nearest(position_to_index(pos.re, l[0], n[0]), n[0]);
            let iy = nearest(position_to_index(pos.im, l[1], n[1]), n[1]);
            *pos += dt * velocity[[ix, iy]];
        }
    }

    /// Floating-point grid indices `(ix, iy)` of every particle, for display.
    pub fn inds(&self) -> Vec<(f64, f64)> {
        let (lx, ly) = self.lxy;
        let (nx, ny) = self.nxy;
        self.positions
            .iter()
            .map(|z| (position_to_index(z.re, lx, nx), position_to_index(z.im, ly, ny)))
            .collect()
    }
}

fn nearest(index: f64, n: usize) -> usize {
    (index.round() as usize).min(n - 1)
}
