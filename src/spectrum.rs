// src/spectrum.rs
//
// Particle histogramming: kinetic-energy spectra and velocity-space
// distributions. Spectra accumulate per rank file and merge, so the same
// types serve both the serial and the rayon path.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use thiserror::Error;

use crate::particle::Particle;
use crate::vec3;

#[derive(Debug, Error)]
pub enum SpectrumError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("spectrum file {0} has odd length {1}")]
    BadLength(String, usize),
}

/// Logarithmically spaced bins over (emin, emax].
#[derive(Debug, Clone)]
pub struct LogBins {
    pub emin: f64,
    pub emax: f64,
    pub nbins: usize,
    log_emin: f64,
    dloge: f64,
}

impl LogBins {
    pub fn new(emin: f64, emax: f64, nbins: usize) -> Self {
        let log_emin = emin.log10();
        let dloge = (emax.log10() - log_emin) / nbins as f64;
        Self {
            emin,
            emax,
            nbins,
            log_emin,
            dloge,
        }
    }

    /// Bin index for a value, or None if it falls outside the range.
    #[inline]
    pub fn index(&self, v: f64) -> Option<usize> {
        if v <= 0.0 || v < self.emin || v > self.emax {
            return None;
        }
        let i = ((v.log10() - self.log_emin) / self.dloge) as usize;
        Some(i.min(self.nbins - 1))
    }

    /// Geometric centre of bin i.
    pub fn center(&self, i: usize) -> f64 {
        10f64.powf(self.log_emin + (i as f64 + 0.5) * self.dloge)
    }

    /// Width of bin i in linear units.
    pub fn width(&self, i: usize) -> f64 {
        let lo = 10f64.powf(self.log_emin + i as f64 * self.dloge);
        let hi = 10f64.powf(self.log_emin + (i + 1) as f64 * self.dloge);
        hi - lo
    }

    pub fn centers(&self) -> Vec<f64> {
        (0..self.nbins).map(|i| self.center(i)).collect()
    }
}

/// Kinetic-energy spectrum of one species, accumulated over particles.
#[derive(Debug, Clone)]
pub struct EnergySpectrum {
    pub bins: LogBins,
    pub counts: Vec<f64>,
}

impl EnergySpectrum {
    pub fn new(bins: LogBins) -> Self {
        let counts = vec![0.0; bins.nbins];
        Self { bins, counts }
    }

    /// Deposit one particle; `mass` fixes the energy unit, the statistical
    /// weight |q| is the deposit.
    #[inline]
    pub fn add(&mut self, p: &Particle, mass: f64) {
        if let Some(i) = self.bins.index(p.kinetic_energy(mass)) {
            self.counts[i] += p.q.abs() as f64;
        }
    }

    pub fn merge(&mut self, other: &Self) {
        for (a, b) in self.counts.iter_mut().zip(&other.counts) {
            *a += b;
        }
    }

    /// Differential flux dN/dE: counts divided by the linear bin width.
    pub fn dn_de(&self) -> Vec<f64> {
        self.counts
            .iter()
            .enumerate()
            .map(|(i, &c)| c / self.bins.width(i))
            .collect()
    }

    /// Write as a flat little-endian f64 stream: bin centres then dN/dE.
    pub fn save(&self, path: &Path) -> Result<(), SpectrumError> {
        let mut w = BufWriter::new(File::create(path)?);
        for v in self.bins.centers() {
            w.write_all(&v.to_le_bytes())?;
        }
        for v in self.dn_de() {
            w.write_all(&v.to_le_bytes())?;
        }
        w.flush()?;
        Ok(())
    }
}

/// Read a saved spectrum back as (bin centres, dN/dE).
pub fn load_spectrum(path: &Path) -> Result<(Vec<f64>, Vec<f64>), SpectrumError> {
    let mut bytes = Vec::new();
    File::open(path)?.read_to_end(&mut bytes)?;
    let n = bytes.len() / 8;
    if bytes.len() % 8 != 0 || n % 2 != 0 {
        return Err(SpectrumError::BadLength(path.display().to_string(), bytes.len()));
    }
    let vals: Vec<f64> = bytes
        .chunks_exact(8)
        .map(|c| f64::from_le_bytes(c.try_into().unwrap()))
        .collect();
    let half = n / 2;
    Ok((vals[..half].to_vec(), vals[half..].to_vec()))
}

/// Boxcar smoothing of a 1D series, "same" length, edges renormalised.
pub fn smooth_1d(data: &[f64], ng: usize) -> Vec<f64> {
    if ng <= 1 {
        return data.to_vec();
    }
    let half = (ng / 2) as isize;
    let n = data.len() as isize;
    (0..n)
        .map(|i| {
            let mut sum = 0.0;
            let mut w = 0usize;
            for d in -half..=half {
                let j = i + d;
                if j >= 0 && j < n {
                    sum += data[j as usize];
                    w += 1;
                }
            }
            sum / w as f64
        })
        .collect()
}

/// 2D histogram with uniform bins, x fastest in `counts`.
#[derive(Debug, Clone)]
pub struct Hist2D {
    pub nx: usize,
    pub ny: usize,
    pub xmin: f64,
    pub xmax: f64,
    pub ymin: f64,
    pub ymax: f64,
    pub counts: Vec<f64>,
}

impl Hist2D {
    pub fn new(nx: usize, ny: usize, xmin: f64, xmax: f64, ymin: f64, ymax: f64) -> Self {
        Self {
            nx,
            ny,
            xmin,
            xmax,
            ymin,
            ymax,
            counts: vec![0.0; nx * ny],
        }
    }

    #[inline]
    pub fn add(&mut self, x: f64, y: f64, w: f64) {
        if x < self.xmin || x >= self.xmax || y < self.ymin || y >= self.ymax {
            return;
        }
        let i = ((x - self.xmin) / (self.xmax - self.xmin) * self.nx as f64) as usize;
        let j = ((y - self.ymin) / (self.ymax - self.ymin) * self.ny as f64) as usize;
        self.counts[j.min(self.ny - 1) * self.nx + i.min(self.nx - 1)] += w;
    }

    pub fn merge(&mut self, other: &Self) {
        for (a, b) in self.counts.iter_mut().zip(&other.counts) {
            *a += b;
        }
    }
}

/// 1D histogram on log-spaced bins.
#[derive(Debug, Clone)]
pub struct LogHist1D {
    pub bins: LogBins,
    pub counts: Vec<f64>,
}

impl LogHist1D {
    pub fn new(bins: LogBins) -> Self {
        let counts = vec![0.0; bins.nbins];
        Self { bins, counts }
    }

    #[inline]
    pub fn add(&mut self, v: f64, w: f64) {
        if let Some(i) = self.bins.index(v) {
            self.counts[i] += w;
        }
    }

    pub fn merge(&mut self, other: &Self) {
        for (a, b) in self.counts.iter_mut().zip(&other.counts) {
            *a += b;
        }
    }
}

/// Velocity-space distributions of one species in a region.
///
/// Three Cartesian momentum planes, the field-aligned upara-uperp plane
/// and 1D spectra of ppara, pperp and |p| on log bins.
#[derive(Debug, Clone)]
pub struct VelocityDist {
    pub uxy: Hist2D,
    pub uxz: Hist2D,
    pub uyz: Hist2D,
    pub para_perp: Hist2D,
    pub fpara: LogHist1D,
    pub fperp: LogHist1D,
    pub fmod: LogHist1D,
}

impl VelocityDist {
    /// `pmax` bounds the linear axes at +-pmax; the log spectra run over
    /// (pmax * 1e-4, pmax].
    pub fn new(nbins: usize, pmax: f64) -> Self {
        let plane = || Hist2D::new(nbins, nbins, -pmax, pmax, -pmax, pmax);
        let log_bins = LogBins::new(pmax * 1e-4, pmax, nbins);
        Self {
            uxy: plane(),
            uxz: plane(),
            uyz: plane(),
            para_perp: Hist2D::new(nbins, nbins, -pmax, pmax, 0.0, pmax),
            fpara: LogHist1D::new(log_bins.clone()),
            fperp: LogHist1D::new(log_bins.clone()),
            fmod: LogHist1D::new(log_bins),
        }
    }

    /// Deposit a particle. `bdir` is the local unit magnetic-field
    /// direction at the particle position.
    pub fn add(&mut self, p: &Particle, bdir: [f64; 3]) {
        let u = [p.u[0] as f64, p.u[1] as f64, p.u[2] as f64];
        let w = p.q.abs() as f64;
        self.uxy.add(u[0], u[1], w);
        self.uxz.add(u[0], u[2], w);
        self.uyz.add(u[1], u[2], w);

        let (upara, uperp) = vec3::para_perp(u, bdir);
        self.para_perp.add(upara, uperp, w);
        self.fpara.add(upara.abs(), w);
        self.fperp.add(uperp, w);
        self.fmod.add(vec3::norm(u), w);
    }

    pub fn merge(&mut self, other: &Self) {
        self.uxy.merge(&other.uxy);
        self.uxz.merge(&other.uxz);
        self.uyz.merge(&other.uyz);
        self.para_perp.merge(&other.para_perp);
        self.fpara.merge(&other.fpara);
        self.fperp.merge(&other.fperp);
        self.fmod.merge(&other.fmod);
    }
}

/// Phase-space distributions along the outflow axis: particle x position
/// in di against each momentum component.
#[derive(Debug, Clone)]
pub struct PhaseSpaceDist {
    pub xux: Hist2D,
    pub xuy: Hist2D,
    pub xuz: Hist2D,
}

impl PhaseSpaceDist {
    /// x runs over [xmin, xmax); momentum axes over +-pmax.
    pub fn new(nbins: usize, xmin: f64, xmax: f64, pmax: f64) -> Self {
        let plane = || Hist2D::new(nbins, nbins, xmin, xmax, -pmax, pmax);
        Self {
            xux: plane(),
            xuy: plane(),
            xuz: plane(),
        }
    }

    /// Deposit a particle at outflow position `x` (di).
    #[inline]
    pub fn add(&mut self, x: f64, p: &Particle) {
        let w = p.q.abs() as f64;
        self.xux.add(x, p.u[0] as f64, w);
        self.xuy.add(x, p.u[1] as f64, w);
        self.xuz.add(x, p.u[2] as f64, w);
    }

    pub fn merge(&mut self, other: &Self) {
        self.xux.merge(&other.xux);
        self.xuy.merge(&other.xuy);
        self.xuz.merge(&other.xuz);
    }
}
