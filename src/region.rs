// src/region.rs
//
// Spatial selection box for particle analyses, and its mapping onto the
// MPI domain decomposition of the PIC run. Particle dumps are per rank, so
// a box in di is first clamped to the domain and then turned into the set
// of ranks whose subdomains overlap it.

use crate::pic_info::PicInfo;

/// Analysis box given as a centre in di and sizes in cells.
#[derive(Debug, Clone, Copy)]
pub struct RegionBox {
    pub center: [f64; 3],
    /// Extent along each axis, in cells of the global grid.
    pub size_cells: [f64; 3],
}

/// Axis-aligned box in di, clamped to the simulation domain.
#[derive(Debug, Clone, Copy)]
pub struct Corners {
    pub lo: [f64; 3],
    pub hi: [f64; 3],
}

impl Corners {
    /// Whether a position in di falls inside the box.
    #[inline]
    pub fn contains(&self, p: [f64; 3]) -> bool {
        (0..3).all(|d| p[d] >= self.lo[d] && p[d] <= self.hi[d])
    }
}

impl RegionBox {
    /// Corner coordinates in di. The domain runs over x in [0, lx],
    /// y in [-ly/2, ly/2], z in [-lz/2, lz/2].
    pub fn corners(&self, info: &PicInfo) -> Corners {
        let d = [info.dx_di, info.dy_di, info.dz_di];
        let dom_lo = [0.0, -0.5 * info.ly_di, -0.5 * info.lz_di];
        let dom_hi = [info.lx_di, 0.5 * info.ly_di, 0.5 * info.lz_di];
        let mut lo = [0.0; 3];
        let mut hi = [0.0; 3];
        for a in 0..3 {
            let half = 0.5 * self.size_cells[a] * d[a];
            lo[a] = (self.center[a] - half).clamp(dom_lo[a], dom_hi[a]);
            hi[a] = (self.center[a] + half).clamp(dom_lo[a], dom_hi[a]);
        }
        Corners { lo, hi }
    }

    /// Ranks of the PIC run whose subdomains overlap the box.
    ///
    /// Rank layout is x fastest: rank = ix + iy * tx + iz * tx * ty.
    pub fn ranks(&self, info: &PicInfo) -> Vec<usize> {
        let corners = self.corners(info);
        let topo = [info.topology_x, info.topology_y, info.topology_z];
        let dom_lo = [0.0, -0.5 * info.ly_di, -0.5 * info.lz_di];
        let len = [info.lx_di, info.ly_di, info.lz_di];

        let mut start = [0usize; 3];
        let mut stop = [0usize; 3];
        for a in 0..3 {
            let sub = len[a] / topo[a] as f64;
            start[a] = (((corners.lo[a] - dom_lo[a]) / sub).floor().max(0.0) as usize)
                .min(topo[a] - 1);
            stop[a] = (((corners.hi[a] - dom_lo[a]) / sub).floor() as usize)
                .clamp(start[a], topo[a] - 1);
        }

        let mut ranks = Vec::new();
        for iz in start[2]..=stop[2] {
            for iy in start[1]..=stop[1] {
                for ix in start[0]..=stop[0] {
                    ranks.push(ix + iy * topo[0] + iz * topo[0] * topo[1]);
                }
            }
        }
        ranks
    }
}
