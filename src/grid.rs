// src/grid.rs

/// 2D grid for an x–z field slice, in ion inertial lengths (di).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Grid2D {
    pub nx: usize,
    pub nz: usize,
    pub dx: f64,
    pub dz: f64,
    /// Coordinate of the first cell centre along x.
    pub x0: f64,
    /// Coordinate of the first cell centre along z.
    pub z0: f64,
}

impl Grid2D {
    /// Create a new grid with nx × nz cells, spacings dx, dz and origin (x0, z0).
    pub fn new(nx: usize, nz: usize, dx: f64, dz: f64, x0: f64, z0: f64) -> Self {
        Self {
            nx,
            nz,
            dx,
            dz,
            x0,
            z0,
        }
    }

    /// Total number of cells.
    pub fn n_cells(&self) -> usize {
        self.nx * self.nz
    }

    /// Convert (i, k) indices to a flat index into a 1D array. x is fastest.
    #[inline]
    pub fn idx(&self, i: usize, k: usize) -> usize {
        debug_assert!(i < self.nx && k < self.nz);
        k * self.nx + i
    }

    /// Cell-centre x coordinate of column i.
    #[inline]
    pub fn x_at(&self, i: usize) -> f64 {
        self.x0 + i as f64 * self.dx
    }

    /// Cell-centre z coordinate of row k.
    #[inline]
    pub fn z_at(&self, k: usize) -> f64 {
        self.z0 + k as f64 * self.dz
    }

    /// All x coordinates.
    pub fn x_coords(&self) -> Vec<f64> {
        (0..self.nx).map(|i| self.x_at(i)).collect()
    }

    /// All z coordinates.
    pub fn z_coords(&self) -> Vec<f64> {
        (0..self.nz).map(|k| self.z_at(k)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_indexing_is_consistent() {
        let g = Grid2D::new(4, 3, 1.0, 1.0, 0.0, -1.5);
        assert_eq!(g.idx(0, 0), 0);
        assert_eq!(g.idx(1, 0), 1);
        assert_eq!(g.idx(0, 1), 4);
        assert_eq!(g.idx(3, 2), 11);
        assert_eq!(g.n_cells(), 12);
    }

    #[test]
    fn coordinates_start_at_origin() {
        let g = Grid2D::new(8, 4, 0.5, 0.25, 2.0, -0.5);
        assert_eq!(g.x_at(0), 2.0);
        assert_eq!(g.x_at(2), 3.0);
        assert_eq!(g.z_at(0), -0.5);
        assert_eq!(g.z_at(2), 0.0);
        assert_eq!(g.x_coords().len(), 8);
    }
}
