// src/scalar_field.rs

use crate::grid::Grid2D;

/// Scalar quantity defined on an x–z slice grid.
#[derive(Debug, Clone)]
pub struct ScalarField2D {
    pub grid: Grid2D,
    pub data: Vec<f64>,
}

impl ScalarField2D {
    /// Create a field of zeros on the given grid.
    pub fn zeros(grid: Grid2D) -> Self {
        Self {
            grid,
            data: vec![0.0; grid.n_cells()],
        }
    }

    /// Create a field from f32 dump samples (x fastest, as stored on disk).
    pub fn from_f32(grid: Grid2D, raw: &[f32]) -> Self {
        debug_assert_eq!(raw.len(), grid.n_cells());
        Self {
            grid,
            data: raw.iter().map(|&v| v as f64).collect(),
        }
    }

    /// Get the flat index in `data` for grid indices (i, k).
    #[inline]
    pub fn idx(&self, i: usize, k: usize) -> usize {
        self.grid.idx(i, k)
    }

    #[inline]
    pub fn at(&self, i: usize, k: usize) -> f64 {
        self.data[self.grid.idx(i, k)]
    }

    /// Apply `f` cell-wise, returning a new field on the same grid.
    pub fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            grid: self.grid,
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }

    /// Combine two fields cell-wise.
    pub fn zip_with(&self, other: &Self, f: impl Fn(f64, f64) -> f64) -> Self {
        debug_assert_eq!(self.grid, other.grid);
        Self {
            grid: self.grid,
            data: self
                .data
                .iter()
                .zip(&other.data)
                .map(|(&a, &b)| f(a, b))
                .collect(),
        }
    }

    /// Boxcar smoothing with an ng × ng uniform kernel, "same" output size.
    ///
    /// Near the edges the kernel is clipped and the weight renormalised, so
    /// boundary cells are averages over the in-domain part of the stencil.
    pub fn smooth(&self, ng: usize) -> Self {
        if ng <= 1 {
            return self.clone();
        }
        let nx = self.grid.nx as isize;
        let nz = self.grid.nz as isize;
        let half = (ng / 2) as isize;
        let mut out = vec![0.0; self.data.len()];
        for k in 0..nz {
            for i in 0..nx {
                let mut sum = 0.0;
                let mut weight = 0usize;
                for dk in -half..=half {
                    let kk = k + dk;
                    if kk < 0 || kk >= nz {
                        continue;
                    }
                    for di in -half..=half {
                        let ii = i + di;
                        if ii < 0 || ii >= nx {
                            continue;
                        }
                        sum += self.data[(kk * nx + ii) as usize];
                        weight += 1;
                    }
                }
                out[(k * nx + i) as usize] = sum / weight as f64;
            }
        }
        Self {
            grid: self.grid,
            data: out,
        }
    }

    /// Forward difference along x, divided by dx. The last column repeats the
    /// previous one so the result stays on the same grid.
    pub fn diff_x(&self) -> Self {
        let nx = self.grid.nx;
        let nz = self.grid.nz;
        let inv_dx = 1.0 / self.grid.dx;
        let mut out = vec![0.0; self.data.len()];
        for k in 0..nz {
            for i in 0..nx - 1 {
                let idx = self.idx(i, k);
                out[idx] = (self.data[self.idx(i + 1, k)] - self.data[idx]) * inv_dx;
            }
            if nx >= 2 {
                out[self.idx(nx - 1, k)] = out[self.idx(nx - 2, k)];
            }
        }
        Self {
            grid: self.grid,
            data: out,
        }
    }

    /// Forward difference along z, divided by dz. The last row repeats the
    /// previous one.
    pub fn diff_z(&self) -> Self {
        let nx = self.grid.nx;
        let nz = self.grid.nz;
        let inv_dz = 1.0 / self.grid.dz;
        let mut out = vec![0.0; self.data.len()];
        for k in 0..nz - 1 {
            for i in 0..nx {
                let idx = self.idx(i, k);
                out[idx] = (self.data[self.idx(i, k + 1)] - self.data[idx]) * inv_dz;
            }
        }
        if nz >= 2 {
            for i in 0..nx {
                out[self.idx(i, nz - 1)] = out[self.idx(i, nz - 2)];
            }
        }
        Self {
            grid: self.grid,
            data: out,
        }
    }

    /// Bilinear sample at physical coordinates (x, z), clamped to the domain.
    pub fn sample(&self, x: f64, z: f64) -> f64 {
        let g = &self.grid;
        let fx = ((x - g.x0) / g.dx).clamp(0.0, (g.nx - 1) as f64);
        let fz = ((z - g.z0) / g.dz).clamp(0.0, (g.nz - 1) as f64);
        let i0 = fx.floor() as usize;
        let k0 = fz.floor() as usize;
        let i1 = (i0 + 1).min(g.nx - 1);
        let k1 = (k0 + 1).min(g.nz - 1);
        let tx = fx - i0 as f64;
        let tz = fz - k0 as f64;

        let f00 = self.at(i0, k0);
        let f10 = self.at(i1, k0);
        let f01 = self.at(i0, k1);
        let f11 = self.at(i1, k1);
        f00 * (1.0 - tx) * (1.0 - tz)
            + f10 * tx * (1.0 - tz)
            + f01 * (1.0 - tx) * tz
            + f11 * tx * tz
    }

    /// Min/max over finite values. Returns (-1, 1) for all-NaN data so the
    /// plot range never collapses.
    pub fn finite_min_max(&self) -> (f64, f64) {
        let mut lo = f64::INFINITY;
        let mut hi = f64::NEG_INFINITY;
        for &v in &self.data {
            if v.is_finite() {
                if v < lo {
                    lo = v;
                }
                if v > hi {
                    hi = v;
                }
            }
        }
        if !lo.is_finite() || !hi.is_finite() {
            (-1.0, 1.0)
        } else {
            (lo, hi)
        }
    }
}
