//! Real- and momentum-space lattices for a periodic rectangular box.
//!
//! Coordinates and wave numbers are stored "sparse": the array for axis `i`
//! has length `N_i` along that axis and length one along every other axis, so
//! they broadcast against full fields without materialising a mesh.

use ndarray::{Array1, ArrayD, Axis, IxDyn};
use num_complex::Complex64;

use crate::constants::PI;
use crate::error::ConfigError;
use crate::fft::SpectralFft;

/// Angular frequencies `2π·fftfreq(n, d)`.
pub fn angular_frequencies(n: usize, d: f64) -> Array1<f64> {
    let total = n as f64 * d;
    Array1::from_shape_fn(n, |i| {
        let j = if i < (n + 1) / 2 {
            i as f64
        } else {
            i as f64 - n as f64
        };
        2.0 * PI * j / total
    })
}

#[derive(Debug, Clone)]
pub struct Grid {
    shape: Vec<usize>,
    spacing: Vec<f64>,
    lengths: Vec<f64>,
    coords: Vec<ArrayD<f64>>,
    wavenumbers: Vec<ArrayD<f64>>,
    fft: SpectralFft,
}

impl Grid {
    /// Grid with the same spacing `dx` along every axis.
    ///
    /// # Arguments
    ///
    /// * `shape` - Number of points along each axis.
    /// * `dx` - Lattice spacing, positive and finite.
    ///
    /// # Returns
    ///
    /// The grid, or a `ConfigError` for an empty shape, a zero-sized axis or
    /// an invalid spacing.
    pub fn new(shape: &[usize], dx: f64) -> Result<Self, ConfigError> {
        if !(dx.is_finite() && dx > 0.0) {
            return Err(ConfigError::InvalidSpacing(dx));
        }
        let lengths: Vec<f64> = shape.iter().map(|&n| n as f64 * dx).collect();
        Self::with_lengths(shape, &lengths)
    }

    /// Grid with explicit box lengths.
    ///
    /// # Arguments
    ///
    /// * `shape` - Number of points along each axis.
    /// * `lengths` - Box length along each axis; the spacing along axis `i`
    ///   is `lengths[i] / shape[i]`.
    ///
    /// # Returns
    ///
    /// The grid, or a `ConfigError` if `shape` is empty, has a zero-sized
    /// axis or does not match `lengths` in length.
    pub fn with_lengths(shape: &[usize], lengths: &[f64]) -> Result<Self, ConfigError> {
        if shape.is_empty() {
            return Err(ConfigError::EmptyGrid);
        }
        if shape.len() != lengths.len() {
            return Err(ConfigError::IncompatibleBox {
                shape: shape.len(),
                lengths: lengths.len(),
            });
        }
        if let Some((axis, &n)) = shape.iter().enumerate().find(|(_, &n)| n == 0) {
            return Err(ConfigError::NonPositiveGridSize { axis, n });
        }

        let ndim = shape.len();
        let mut spacing = Vec::with_capacity(ndim);
        let mut coords = Vec::with_capacity(ndim);
        let mut wavenumbers = Vec::with_capacity(ndim);
        for (axis, (&n, &length)) in shape.iter().zip(lengths).enumerate() {
            let dx = length / n as f64;
            if !(dx.is_finite() && dx > 0.0) {
                return Err(ConfigError::InvalidSpacing(dx));
            }
            let x = Array1::from_shape_fn(n, |i| i as f64 * dx - length / 2.0);
            let k = angular_frequencies(n, dx);
            coords.push(sparse(x, axis, ndim));
            wavenumbers.push(sparse(k, axis, ndim));
            spacing.push(dx);
        }

        log::debug!("grid shape = {:?}, lengths = {:?}", shape, lengths);

        Ok(Grid {
            shape: shape.to_vec(),
            spacing,
            lengths: lengths.to_vec(),
            coords,
            wavenumbers,
            fft: SpectralFft::new(shape),
        })
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn spacing(&self) -> &[f64] {
        &self.spacing
    }

    pub fn lengths(&self) -> &[f64] {
        &self.lengths
    }

    /// Volume element `Π dx_i`.
    pub fn metric(&self) -> f64 {
        self.spacing.iter().product()
    }

    /// Sparse coordinate array for `axis`.
    pub fn coord(&self, axis: usize) -> &ArrayD<f64> {
        &self.coords[axis]
    }

    /// Sparse angular-frequency array for `axis`.
    pub fn wavenumber(&self, axis: usize) -> &ArrayD<f64> {
        &self.wavenumbers[axis]
    }

    /// The 1D coordinate values along `axis`.
    pub fn axis_values(&self, axis: usize) -> Array1<f64> {
        self.coords[axis].iter().copied().collect()
    }

    /// The 1D wave numbers along `axis`.
    pub fn axis_wavenumbers(&self, axis: usize) -> Array1<f64> {
        self.wavenumbers[axis].iter().copied().collect()
    }

    /// `ħ² Σ k_i² / 2m` over the full grid.
    pub fn kinetic(&self, hbar: f64, m: f64) -> ArrayD<f64> {
        let mut k2 = ArrayD::<f64>::zeros(IxDyn(&self.shape));
        for k in &self.wavenumbers {
            k2 += &k.mapv(|k| k * k);
        }
        k2.mapv_inplace(|k2| hbar * hbar * k2 / 2.0 / m);
        k2
    }

    /// Evaluate `f(position)` at every lattice point.
    pub fn sample<F>(&self, f: F) -> ArrayD<f64>
    where
        F: Fn(&[f64]) -> f64,
    {
        let axes: Vec<Array1<f64>> = (0..self.ndim()).map(|i| self.axis_values(i)).collect();
        let mut position = vec![0.0; self.ndim()];
        ArrayD::from_shape_fn(IxDyn(&self.shape), |idx| {
            for (p, (i, x)) in position.iter_mut().zip(axes.iter().enumerate()) {
                *p = x[idx[i]];
            }
            f(&position)
        })
    }

    pub fn fft(&self, y: &ArrayD<Complex64>) -> ArrayD<Complex64> {
        self.fft.forward(y)
    }

    pub fn ifft(&self, y: &ArrayD<Complex64>) -> ArrayD<Complex64> {
        self.fft.inverse(y)
    }

    pub fn fft_inplace(&self, y: &mut ArrayD<Complex64>) {
        self.fft.forward_inplace(y)
    }

    pub fn ifft_inplace(&self, y: &mut ArrayD<Complex64>) {
        self.fft.inverse_inplace(y)
    }
}

fn sparse(values: Array1<f64>, axis: usize, ndim: usize) -> ArrayD<f64> {
    let mut array = values.into_dyn();
    for _ in 0..axis {
        array = array.insert_axis(Axis(0));
    }
    while array.ndim() < ndim {
        let last = array.ndim();
        array = array.insert_axis(Axis(last));
    }
    array
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_angular_frequencies_match_fftfreq() {
        let k = angular_frequencies(4, 0.25);
        let expected = [0.0, 1.0, -2.0, -1.0].map(|f| 2.0 * PI * f);
        for (a, b) in k.iter().zip(expected) {
            assert_approx_eq!(*a, b, 1e-12);
        }

        let k = angular_frequencies(5, 1.0);
        let expected = [0.0, 0.2, 0.4, -0.4, -0.2].map(|f| 2.0 * PI * f);
        for (a, b) in k.iter().zip(expected) {
            assert_approx_eq!(*a, b, 1e-12);
        }
    }

    #[test]
    fn test_coordinates_are_centered_and_sparse() {
        let grid = Grid::new(&[4, 6], 0.5).unwrap();
        assert_eq!(grid.coord(0).shape(), &[4, 1]);
        assert_eq!(grid.coord(1).shape(), &[1, 6]);
        assert_eq!(grid.lengths(), &[2.0, 3.0]);
        assert_approx_eq!(grid.axis_values(0)[0], -1.0, 1e-12);
        assert_approx_eq!(grid.axis_values(1)[3], 0.0, 1e-12);
        assert_approx_eq!(grid.metric(), 0.25, 1e-12);
    }

    #[test]
    fn test_one_and_three_axes_build_the_same_way() {
        let line = Grid::new(&[8], 1.0).unwrap();
        assert_eq!(line.ndim(), 1);
        assert_eq!(line.kinetic(1.0, 1.0).shape(), &[8]);

        let cube = Grid::new(&[4, 4, 4], 1.0).unwrap();
        assert_eq!(cube.ndim(), 3);
        assert_eq!(cube.coord(2).shape(), &[1, 1, 4]);
        assert_eq!(cube.kinetic(1.0, 1.0).shape(), &[4, 4, 4]);
    }

    #[test]
    fn test_kinetic_operator() {
        let grid = Grid::new(&[8, 8], 1.0).unwrap();
        let k = grid.kinetic(2.0, 0.5);
        let kx = grid.axis_wavenumbers(0);
        let ky = grid.axis_wavenumbers(1);
        assert_approx_eq!(k[[3, 5]], 4.0 * (kx[3].powi(2) + ky[5].powi(2)), 1e-12);
        assert_approx_eq!(k[[0, 0]], 0.0, 1e-12);
    }

    #[test]
    fn test_invalid_grids_are_rejected() {
        assert_eq!(Grid::new(&[], 1.0).unwrap_err(), ConfigError::EmptyGrid);
        assert_eq!(
            Grid::new(&[4, 0], 1.0).unwrap_err(),
            ConfigError::NonPositiveGridSize { axis: 1, n: 0 }
        );
        assert_eq!(Grid::new(&[4], -1.0).unwrap_err(), ConfigError::InvalidSpacing(-1.0));
        assert!(matches!(
            Grid::with_lengths(&[4, 4], &[1.0]),
            Err(ConfigError::IncompatibleBox { .. })
        ));
    }
}
