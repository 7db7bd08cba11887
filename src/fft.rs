//! Fourier transforms over the trailing spatial axes of an array.
//!
//! Plans are created once per grid. Any leading axes (such as the component
//! axis of a spinor wavefunction) are left alone, so the same operator acts
//! on scalar and multi-component fields.

use std::fmt;
use std::sync::Arc;

use ndarray::{ArrayD, Axis, Zip};
use num_complex::Complex64;
use rustfft::{Fft, FftPlanner};

/// Forward and inverse plans for a fixed spatial shape.
#[derive(Clone)]
pub struct SpectralFft {
    shape: Vec<usize>,
    forward: Vec<Arc<dyn Fft<f64>>>,
    inverse: Vec<Arc<dyn Fft<f64>>>,
}

impl fmt::Debug for SpectralFft {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpectralFft").field("shape", &self.shape).finish()
    }
}

impl SpectralFft {
    pub fn new(shape: &[usize]) -> Self {
        let mut planner = FftPlanner::<f64>::new();
        let forward = shape.iter().map(|&n| planner.plan_fft_forward(n)).collect();
        let inverse = shape.iter().map(|&n| planner.plan_fft_inverse(n)).collect();
        SpectralFft {
            shape: shape.to_vec(),
            forward,
            inverse,
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Unnormalised forward transform, in place.
    pub fn forward_inplace(&self, array: &mut ArrayD<Complex64>) {
        let offset = self.leading_axes(array);
        for (i, plan) in self.forward.iter().enumerate() {
            transform_axis(array, Axis(offset + i), plan);
        }
    }

    /// Inverse transform scaled by `1/N`, in place, so that
    /// `inverse(forward(y)) == y`.
    pub fn inverse_inplace(&self, array: &mut ArrayD<Complex64>) {
        let offset = self.leading_axes(array);
        for (i, plan) in self.inverse.iter().enumerate() {
            transform_axis(array, Axis(offset + i), plan);
        }
        let scale = 1.0 / self.shape.iter().product::<usize>() as f64;
        array.mapv_inplace(|v| v * scale);
    }

    pub fn forward(&self, array: &ArrayD<Complex64>) -> ArrayD<Complex64> {
        let mut out = array.to_owned();
        self.forward_inplace(&mut out);
        out
    }

    pub fn inverse(&self, array: &ArrayD<Complex64>) -> ArrayD<Complex64> {
        let mut out = array.to_owned();
        self.inverse_inplace(&mut out);
        out
    }

    fn leading_axes(&self, array: &ArrayD<Complex64>) -> usize {
        let ndim = array.ndim();
        debug_assert!(ndim >= self.shape.len(), "array has fewer axes than the grid");
        let offset = ndim - self.shape.len();
        debug_assert_eq!(&array.shape()[offset..], &self.shape[..]);
        offset
    }
}

/// Transform every lane along `axis`. Lanes are independent so they are
/// processed in parallel.
fn transform_axis(array: &mut ArrayD<Complex64>, axis: Axis, plan: &Arc<dyn Fft<f64>>) {
    Zip::from(array.lanes_mut(axis)).par_for_each(|mut lane| {
        let mut buffer: Vec<Complex64> = lane.iter().copied().collect();
        plan.process(&mut buffer);
        lane.iter_mut()
            .zip(buffer)
            .for_each(|(out, value)| *out = value);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use ndarray::IxDyn;

    #[test]
    fn test_inverse_undoes_forward_2d() {
        let fft = SpectralFft::new(&[8, 6]);
        let psi = ArrayD::from_shape_fn(IxDyn(&[8, 6]), |idx| {
            Complex64::new(idx[0] as f64 * 0.3, (idx[1] as f64).sin())
        });
        let back = fft.inverse(&fft.forward(&psi));
        for (a, b) in psi.iter().zip(back.iter()) {
            assert_approx_eq!(a.re, b.re, 1e-12);
            assert_approx_eq!(a.im, b.im, 1e-12);
        }
    }

    #[test]
    fn test_constant_field_has_only_zero_mode() {
        let fft = SpectralFft::new(&[4, 4]);
        let psi = ArrayD::from_elem(IxDyn(&[4, 4]), Complex64::new(1.0, 0.0));
        let psi_k = fft.forward(&psi);
        assert_approx_eq!(psi_k[[0, 0]].re, 16.0, 1e-12);
        let rest: f64 = psi_k.iter().skip(1).map(|v| v.norm()).sum();
        assert_approx_eq!(rest, 0.0, 1e-12);
    }

    #[test]
    fn test_leading_component_axis_is_untouched() {
        let fft = SpectralFft::new(&[4, 4]);
        let mut spinor = ArrayD::zeros(IxDyn(&[2, 4, 4]));
        spinor.index_axis_mut(Axis(0), 0).fill(Complex64::new(1.0, 0.0));
        spinor.index_axis_mut(Axis(0), 1).fill(Complex64::new(0.0, 2.0));
        fft.forward_inplace(&mut spinor);

        // Each component transforms on its own.
        assert_approx_eq!(spinor[[0, 0, 0]].re, 16.0, 1e-12);
        assert_approx_eq!(spinor[[1, 0, 0]].im, 32.0, 1e-12);
        assert_approx_eq!(spinor[[1, 1, 0]].norm(), 0.0, 1e-12);
    }
}
