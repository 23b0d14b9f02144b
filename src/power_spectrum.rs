// src/power_spectrum.rs
//
// 1D power spectra of 2D field slices, reduced along each axis: FFT every
// row (or column), take |F|^2 and average over the other axis. Spectra are
// stored as a flat little-endian f32 stream, wavenumbers first, then power.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;
use thiserror::Error;

use crate::scalar_field::ScalarField2D;

#[derive(Debug, Error)]
pub enum PowerSpecError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("spectrum file {0} has odd sample count {1}")]
    BadLength(String, usize),
}

/// A reduced power spectrum over one wavenumber axis.
#[derive(Debug, Clone)]
pub struct PowerSpectrum1D {
    pub k: Vec<f64>,
    pub power: Vec<f64>,
}

/// Power spectrum along x, averaged over z. Wavenumbers run over the
/// positive half 2 pi i / (nx dx), i = 0 .. nx/2.
pub fn power_spectrum_x(field: &ScalarField2D) -> PowerSpectrum1D {
    let nx = field.grid.nx;
    let nz = field.grid.nz;
    let rows = (0..nz).map(|k| (0..nx).map(move |i| field.at(i, k)));
    reduced_spectrum(rows, nx, nz, field.grid.dx)
}

/// Power spectrum along z, averaged over x.
pub fn power_spectrum_z(field: &ScalarField2D) -> PowerSpectrum1D {
    let nx = field.grid.nx;
    let nz = field.grid.nz;
    let cols = (0..nx).map(|i| (0..nz).map(move |k| field.at(i, k)));
    reduced_spectrum(cols, nz, nx, field.grid.dz)
}

fn reduced_spectrum(
    lines: impl Iterator<Item = impl Iterator<Item = f64>>,
    n: usize,
    nlines: usize,
    spacing: f64,
) -> PowerSpectrum1D {
    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(n);

    let nk = n / 2 + 1;
    let mut power = vec![0.0; nk];
    let mut buf: Vec<Complex<f64>> = Vec::with_capacity(n);
    for line in lines {
        buf.clear();
        buf.extend(line.map(|v| Complex::new(v, 0.0)));
        fft.process(&mut buf);
        for i in 0..nk {
            power[i] += buf[i].norm_sqr();
        }
    }
    let inv = 1.0 / nlines as f64;
    for p in power.iter_mut() {
        *p *= inv;
    }

    let dk = 2.0 * std::f64::consts::PI / (n as f64 * spacing);
    let k = (0..nk).map(|i| i as f64 * dk).collect();
    PowerSpectrum1D { k, power }
}

impl PowerSpectrum1D {
    pub fn save(&self, path: &Path) -> Result<(), PowerSpecError> {
        let mut w = BufWriter::new(File::create(path)?);
        for &v in &self.k {
            w.write_all(&(v as f32).to_le_bytes())?;
        }
        for &v in &self.power {
            w.write_all(&(v as f32).to_le_bytes())?;
        }
        w.flush()?;
        Ok(())
    }
}

/// Read a stored spectrum: an f32 stream whose first half is wavenumbers
/// and second half the power at each.
pub fn load_power_spectrum(path: &Path) -> Result<PowerSpectrum1D, PowerSpecError> {
    let mut bytes = Vec::new();
    File::open(path)?.read_to_end(&mut bytes)?;
    let n = bytes.len() / 4;
    if bytes.len() % 4 != 0 || n % 2 != 0 {
        return Err(PowerSpecError::BadLength(path.display().to_string(), n));
    }
    let vals: Vec<f64> = bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes(c.try_into().unwrap()) as f64)
        .collect();
    let half = n / 2;
    Ok(PowerSpectrum1D {
        k: vals[..half].to_vec(),
        power: vals[half..].to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Grid2D;

    #[test]
    fn sine_along_x_peaks_at_its_mode() {
        let nx = 64;
        let nz = 8;
        let grid = Grid2D::new(nx, nz, 1.0, 1.0, 0.0, 0.0);
        let mut f = ScalarField2D::zeros(grid);
        // Mode m = 4 along x, identical in every row.
        for k in 0..nz {
            for i in 0..nx {
                let idx = f.idx(i, k);
                f.data[idx] = (2.0 * std::f64::consts::PI * 4.0 * i as f64 / nx as f64).sin();
            }
        }
        let spec = power_spectrum_x(&f);
        let imax = spec
            .power
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .unwrap()
            .0;
        assert_eq!(imax, 4);
        // Power away from the mode is negligible.
        assert!(spec.power[2] < spec.power[4] * 1e-12);
        // k of the peak is 2 pi m / L.
        let expect = 2.0 * std::f64::consts::PI * 4.0 / nx as f64;
        assert!((spec.k[4] - expect).abs() < 1e-12);
    }

    #[test]
    fn constant_field_is_pure_dc() {
        let grid = Grid2D::new(16, 16, 0.5, 0.5, 0.0, 0.0);
        let f = ScalarField2D::zeros(grid).map(|_| 2.0);
        let spec = power_spectrum_z(&f);
        assert!(spec.power[0] > 0.0);
        for &p in &spec.power[1..] {
            assert!(p < 1e-18);
        }
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("by_kx.dat");
        let spec = PowerSpectrum1D {
            k: vec![0.0, 0.1, 0.2],
            power: vec![1.0, 0.5, 0.25],
        };
        spec.save(&path).unwrap();
        let back = load_power_spectrum(&path).unwrap();
        assert_eq!(back.k.len(), 3);
        assert!((back.power[2] - 0.25).abs() < 1e-6);
    }
}
