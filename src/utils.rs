//! Output helpers for frames computed by a model.
//!
//! Fields are written as comma separated rows (one row per x index), complex
//! values as `re,im` pairs. Densities can also be rendered to a PNG heat map.

use ndarray::{Array1, ArrayD, ArrayView2, Ix2};
use num_complex::Complex64;
use plotters::prelude::*;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::model::Diagnostics;
use crate::params::{Params, PARAMS};
use crate::tracer::TracerParticles;

fn as_2d<T>(array: &ArrayD<T>) -> io::Result<ArrayView2<'_, T>> {
    array
        .view()
        .into_dimensionality::<Ix2>()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
}

/// Writes a real 2D field such as the density.
///
/// # Arguments
///
/// * `array` - A 2D array of real values, one row per x index.
/// * `filename` - The file to write the rows to.
///
/// # Returns
///
/// A `Result` indicating success, or an `InvalidInput` error if `array` is
/// not two-dimensional.
pub fn write_density<P: AsRef<Path>>(array: &ArrayD<f64>, filename: P) -> io::Result<()> {
    let array = as_2d(array)?;
    let mut writer = BufWriter::new(File::create(filename)?);

    for row in array.rows() {
        for (i, value) in row.iter().enumerate() {
            if i > 0 {
                write!(writer, ",")?;
            }
            write!(writer, "{}", value)?;
        }
        writeln!(writer)?;
    }

    writer.flush()
}

/// Writes a complex field as `re,im` pairs.
///
/// Two-component fields are written one component after the other,
/// separated by a blank line.
///
/// # Arguments
///
/// * `psi` - The wavefunction, shaped `[nx, ny]` or `[2, nx, ny]`.
/// * `filename` - The file to write the field to.
///
/// # Returns
///
/// A `Result` indicating success or an I/O error.
pub fn write_phi<P: AsRef<Path>>(psi: &ArrayD<Complex64>, filename: P) -> io::Result<()> {
    let mut writer = BufWriter::new(File::create(filename)?);

    let components: Vec<ArrayView2<'_, Complex64>> = if psi.ndim() == 3 {
        psi.outer_iter()
            .map(|c| {
                c.into_dimensionality::<Ix2>()
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
            })
            .collect::<io::Result<_>>()?
    } else {
        vec![as_2d(psi)?]
    };

    for (n, component) in components.iter().enumerate() {
        if n > 0 {
            writeln!(writer)?;
        }
        for row in component.rows() {
            for (i, z) in row.iter().enumerate() {
                if i > 0 {
                    write!(writer, ",")?;
                }
                write!(writer, "{},{}", z.re, z.im)?;
            }
            writeln!(writer)?;
        }
    }

    writer.flush()
}

/// Writes coordinate values on a single comma separated line.
///
/// # Arguments
///
/// * `data` - The coordinates along one axis.
/// * `filename` - The file to write the line to.
pub fn write_coords<P: AsRef<Path>>(data: &Array1<f64>, filename: P) -> io::Result<()> {
    let mut writer = BufWriter::new(File::create(filename)?);

    for (i, &val) in data.iter().enumerate() {
        if i > 0 {
            write!(writer, ",")?;
        }
        write!(writer, "{}", val)?;
    }
    writeln!(writer)?;

    writer.flush()
}

/// Writes tracer positions as `x,y` lines.
pub fn write_tracers<P: AsRef<Path>>(tracers: &TracerParticles, filename: P) -> io::Result<()> {
    let mut writer = BufWriter::new(File::create(filename)?);
    for z in tracers.positions() {
        writeln!(writer, "{},{}", z.re, z.im)?;
    }
    writer.flush()
}

/// Writes every parameter as a `name = value` line, followed by the derived
/// quantities of the model.
///
/// # Arguments
///
/// * `model` - Name of the model the parameters belong to.
/// * `params` - The parameter set to record.
/// * `diagnostics` - Box size, chemical potential, time step and particle
///   number of the built model.
/// * `filename` - The file to write the parameters to.
///
/// # Returns
///
/// A `Result` indicating success or an I/O error.
pub fn write_params<P: AsRef<Path>>(
    model: &str,
    params: &Params,
    diagnostics: &Diagnostics,
    filename: P,
) -> io::Result<()> {
    let mut writer = BufWriter::new(File::create(filename)?);

    writeln!(writer, "model = {}", model)?;
    for spec in PARAMS {
        writeln!(writer, "{} = {}", spec.name, spec.get(params))?;
    }

    writeln!(writer, "lx = {:.6e}", diagnostics.lxy.0)?;
    writeln!(writer, "ly = {:.6e}", diagnostics.lxy.1)?;
    writeln!(writer, "mu = {:.6e}", diagnostics.mu)?;
    writeln!(writer, "dt = {:.6e}", diagnostics.dt)?;
    writeln!(writer, "n_particles = {:.6e}", diagnostics.n_particles)?;

    writer.flush()
}

/// Renders a 2D density as a grey-scale PNG, one pixel per lattice site.
///
/// # Arguments
///
/// * `density` - A 2D density; the brightest pixel is its maximum.
/// * `filename` - The PNG file to create. The x axis runs left to right.
///
/// # Returns
///
/// A `Result` indicating success, or an I/O error wrapping any drawing
/// failure.
pub fn write_density_png<P: AsRef<Path>>(density: &ArrayD<f64>, filename: P) -> io::Result<()> {
    let density = as_2d(density)?;
    let (nx, ny) = density.dim();
    let n_max = density.iter().fold(0.0_f64, |acc, &v| acc.max(v));
    let scale = if n_max > 0.0 { 255.0 / n_max } else { 0.0 };

    let root = BitMapBackend::new(filename.as_ref(), (nx as u32, ny as u32)).into_drawing_area();
    root.fill(&BLACK).map_err(plot_error)?;
    for ((ix, iy), &n) in density.indexed_iter() {
        let level = (n * scale).clamp(0.0, 255.0) as u8;
        // Image rows go downwards, y goes upwards.
        let pixel = (ix as i32, (ny - 1 - iy) as i32);
        root.draw_pixel(pixel, &RGBColor(level, level, level))
            .map_err(plot_error)?;
    }
    root.present().map_err(plot_error)
}

fn plot_error<E: std::fmt::Display>(e: E) -> io::Error {
    io::Error::new(io::ErrorKind::Other, e.to_string())
}
