// src/canonical.rs
//
// Canonical momentum bookkeeping for the out-of-plane direction. For each
// particle frame the per-rank dumps contribute plain sums of u_y and of
// -A_y interpolated to the particle position; the series of their means
// shows whether u_y - c A_y drifts over the run.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use thiserror::Error;

use crate::particle::{Particle, V0Header};
use crate::scalar_field::ScalarField2D;

#[derive(Debug, Error)]
pub enum CanonicalError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("sums file {0} has wrong size {1} (expected 24 bytes)")]
    BadLength(String, usize),
}

/// Unweighted sums over one particle frame (or one rank of it):
/// particle count, sum of u_y and sum of -A_y at the particle positions.
#[derive(Debug, Clone, Copy, Default)]
pub struct CanonicalSums {
    pub count: f64,
    pub sum_uy: f64,
    pub sum_neg_ay: f64,
}

impl CanonicalSums {
    /// Deposit one particle. `ay` is the vector potential slice of the
    /// matching field frame in di coordinates.
    pub fn add(&mut self, p: &Particle, v0: &V0Header, smime: f64, ay: &ScalarField2D) {
        let pos = p.position_di(v0, smime);
        self.count += 1.0;
        self.sum_uy += p.u[1] as f64;
        self.sum_neg_ay += -ay.sample(pos[0], pos[2]);
    }

    pub fn merge(&mut self, other: &Self) {
        self.count += other.count;
        self.sum_uy += other.sum_uy;
        self.sum_neg_ay += other.sum_neg_ay;
    }

    pub fn mean_uy(&self) -> f64 {
        if self.count > 0.0 {
            self.sum_uy / self.count
        } else {
            0.0
        }
    }

    pub fn mean_ay(&self) -> f64 {
        if self.count > 0.0 {
            -self.sum_neg_ay / self.count
        } else {
            0.0
        }
    }

    /// Three little-endian f64: count, sum_uy, sum_neg_ay.
    pub fn save(&self, path: &Path) -> Result<(), CanonicalError> {
        let mut f = File::create(path)?;
        for v in [self.count, self.sum_uy, self.sum_neg_ay] {
            f.write_all(&v.to_le_bytes())?;
        }
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, CanonicalError> {
        let mut bytes = Vec::new();
        File::open(path)?.read_to_end(&mut bytes)?;
        if bytes.len() != 24 {
            return Err(CanonicalError::BadLength(
                path.display().to_string(),
                bytes.len(),
            ));
        }
        let v: Vec<f64> = bytes
            .chunks_exact(8)
            .map(|c| f64::from_le_bytes(c.try_into().unwrap()))
            .collect();
        Ok(Self {
            count: v[0],
            sum_uy: v[1],
            sum_neg_ay: v[2],
        })
    }
}

/// Out-of-plane vector potential A_y reconstructed from the in-plane
/// field components, using Bz = dAy/dx and Bx = -dAy/dz. The bottom row
/// is integrated along x, each column then along z (trapezoid rule), so
/// Ay is zero at the bottom-left corner of the window.
pub fn vector_potential_y(bx: &ScalarField2D, bz: &ScalarField2D) -> ScalarField2D {
    let g = bz.grid;
    let mut ay = ScalarField2D::zeros(g);
    for i in 1..g.nx {
        let idx = ay.idx(i, 0);
        ay.data[idx] = ay.at(i - 1, 0) + 0.5 * (bz.at(i - 1, 0) + bz.at(i, 0)) * g.dx;
    }
    for k in 1..g.nz {
        for i in 0..g.nx {
            let idx = ay.idx(i, k);
            ay.data[idx] = ay.at(i, k - 1) - 0.5 * (bx.at(i, k - 1) + bx.at(i, k)) * g.dz;
        }
    }
    ay
}

/// Time series of the canonical-momentum diagnostic.
#[derive(Debug, Clone)]
pub struct CanonicalSeries {
    pub time: Vec<f64>,
    pub mean_uy: Vec<f64>,
    pub mean_ay: Vec<f64>,
    /// u_y - ratio * A_y per frame.
    pub conserved: Vec<f64>,
    /// |Delta u_y / Delta A_y| over the whole run.
    pub ratio: f64,
}

/// Build the drift series from per-frame sums. The coupling ratio comes
/// from the net change between the first and last frame, so the conserved
/// combination is exactly equal at the endpoints and any wiggle in between
/// is genuine non-conservation.
pub fn canonical_series(time: &[f64], frames: &[CanonicalSums]) -> CanonicalSeries {
    let mean_uy: Vec<f64> = frames.iter().map(|s| s.mean_uy()).collect();
    let mean_ay: Vec<f64> = frames.iter().map(|s| s.mean_ay()).collect();

    let ratio = match (mean_uy.first(), mean_uy.last(), mean_ay.first(), mean_ay.last()) {
        (Some(&p0), Some(&p1), Some(&a0), Some(&a1)) if (a1 - a0).abs() > 0.0 => {
            ((p1 - p0) / (a1 - a0)).abs()
        }
        _ => 0.0,
    };
    let conserved = mean_uy
        .iter()
        .zip(&mean_ay)
        .map(|(&p, &a)| p - ratio * a)
        .collect();
    CanonicalSeries {
        time: time.to_vec(),
        mean_uy,
        mean_ay,
        conserved,
        ratio,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Grid2D;
    use crate::particle::test_support::test_v0;

    fn particle(u: [f32; 3], q: f32, icell: i32) -> Particle {
        Particle {
            dxyz: [0.0; 3],
            icell,
            u,
            q,
        }
    }

    #[test]
    fn sums_accumulate_unweighted_means() {
        let v0 = test_v0(0);
        let grid = Grid2D::new(8, 8, 1.0, 1.0, -2.0, -2.0);
        let ay = ScalarField2D::zeros(grid).map(|_| 3.0);

        let mut sums = CanonicalSums::default();
        // Interior cell of the 6 x 3 x 6 ghost-padded rank grid.
        let icell = 2 + 1 * 6 + 2 * 6 * 3;
        // Differing statistical weights must not bias the means.
        sums.add(&particle([0.0, 1.0, 0.0], 1.0, icell), &v0, 1.0, &ay);
        sums.add(&particle([0.0, 3.0, 0.0], 7.0, icell), &v0, 1.0, &ay);
        assert!((sums.count - 2.0).abs() < 1e-12);
        assert!((sums.sum_uy - 4.0).abs() < 1e-12);
        assert!((sums.sum_neg_ay + 6.0).abs() < 1e-12);
        assert!((sums.mean_uy() - 2.0).abs() < 1e-12);
        assert!((sums.mean_ay() - 3.0).abs() < 1e-12);
    }

    #[test]
    fn conserved_combination_is_flat_for_proportional_drift() {
        // mean_uy = 2 * mean_ay at every frame.
        let frames: Vec<CanonicalSums> = [1.0, 2.0, 3.0]
            .iter()
            .map(|&a| CanonicalSums {
                count: 1.0,
                sum_uy: 2.0 * a,
                sum_neg_ay: -a,
            })
            .collect();
        let series = canonical_series(&[0.0, 1.0, 2.0], &frames);
        assert!((series.ratio - 2.0).abs() < 1e-12);
        for &c in &series.conserved {
            assert!(c.abs() < 1e-12);
        }
    }

    #[test]
    fn vector_potential_of_uniform_field_is_linear() {
        let grid = Grid2D::new(8, 6, 0.5, 0.25, 0.0, -1.0);
        let bx = ScalarField2D::zeros(grid).map(|_| 1.0);
        let bz = ScalarField2D::zeros(grid).map(|_| 2.0);
        let ay = vector_potential_y(&bx, &bz);
        // Ay = 2 x - z + const, zero at the bottom-left corner.
        for k in 0..grid.nz {
            for i in 0..grid.nx {
                let expect = 2.0 * (i as f64 * grid.dx) - (k as f64 * grid.dz);
                assert!((ay.at(i, k) - expect).abs() < 1e-12, "at ({}, {})", i, k);
            }
        }
    }

    #[test]
    fn sums_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pcan.0");
        let sums = CanonicalSums {
            count: 5.0,
            sum_uy: -1.5,
            sum_neg_ay: 2.5,
        };
        sums.save(&path).unwrap();
        let back = CanonicalSums::load(&path).unwrap();
        assert_eq!(back.count, 5.0);
        assert_eq!(back.sum_uy, -1.5);
        assert_eq!(back.sum_neg_ay, 2.5);
    }
}
