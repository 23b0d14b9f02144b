// src/particle.rs
//
// Reader for per-rank binary particle dumps.
//
// Layout (all little-endian):
//   23-byte boilerplate: 5 x i8 type sizes, u16 0xCAFE, u32 0xDEADBEEF,
//                        f32 1.0, f64 1.0
//   v0 header:           6 x i32, 10 x f32, 4 x i32
//   array header:        3 x i32 (record size, ndim, particle count)
//   records:             dxyz [f32; 3], icell i32, u [f32; 3], q f32
//
// Record positions are cell-relative: icell indexes the rank-local grid
// including one ghost layer per side, dxyz in [-1, 1] locates the particle
// inside its cell.

use std::fs::File;
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use thiserror::Error;

use crate::pic_info::PicInfo;

const BOILERPLATE_BYTES: usize = 23;
const V0_BYTES: usize = 6 * 4 + 10 * 4 + 4 * 4;
const ARRAY_HEADER_BYTES: usize = 3 * 4;
pub const RECORD_BYTES: usize = 32;
const DATA_OFFSET: usize = BOILERPLATE_BYTES + V0_BYTES + ARRAY_HEADER_BYTES;

#[derive(Debug, Error)]
pub enum ParticleError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("bad magic in particle file boilerplate")]
    BadMagic,
    #[error("unsupported particle record size {0} (expected {RECORD_BYTES})")]
    BadRecordSize(i32),
    #[error("particle file truncated: need {need} bytes, have {have}")]
    UnexpectedEof { need: usize, have: usize },
}

/// Grid and species metadata of one rank-local dump (the "v0" header).
#[derive(Debug, Clone, Copy)]
pub struct V0Header {
    pub version: i32,
    pub dump_type: i32,
    /// Simulation step of the dump.
    pub nt: i32,
    /// Rank-local cells, without ghost layers.
    pub nx: i32,
    pub ny: i32,
    pub nz: i32,
    pub dt: f32,
    /// Cell sizes in de.
    pub dx: f32,
    pub dy: f32,
    pub dz: f32,
    /// Rank-local domain origin in de.
    pub x0: f32,
    pub y0: f32,
    pub z0: f32,
    pub cvac: f32,
    pub eps0: f32,
    pub damp: f32,
    pub rank: i32,
    pub ndom: i32,
    pub spid: i32,
    pub spqm: i32,
}

/// One particle record.
#[derive(Debug, Clone, Copy)]
pub struct Particle {
    /// Cell-relative offsets in [-1, 1].
    pub dxyz: [f32; 3],
    /// Flat index into the ghost-padded rank-local grid.
    pub icell: i32,
    /// Momentum per unit mass (gamma * v / c).
    pub u: [f32; 3],
    /// Statistical weight.
    pub q: f32,
}

impl Particle {
    /// Lorentz factor sqrt(1 + |u|^2).
    #[inline]
    pub fn gamma(&self) -> f64 {
        let u2 = self.u.iter().map(|&c| c as f64 * c as f64).sum::<f64>();
        (1.0 + u2).sqrt()
    }

    /// Kinetic energy (gamma - 1) * mass in units of m_e c^2.
    #[inline]
    pub fn kinetic_energy(&self, mass: f64) -> f64 {
        (self.gamma() - 1.0) * mass
    }

    /// Position in de, reconstructed from the cell index and in-cell offset.
    pub fn position_de(&self, v0: &V0Header) -> [f64; 3] {
        let nx2 = (v0.nx + 2) as i64;
        let ny2 = (v0.ny + 2) as i64;
        let icell = self.icell as i64;
        let iz = icell / (nx2 * ny2);
        let iy = (icell - iz * nx2 * ny2) / nx2;
        let ix = icell - iz * nx2 * ny2 - iy * nx2;
        let x = v0.x0 as f64
            + ((ix as f64 - 1.0) + (self.dxyz[0] as f64 + 1.0) * 0.5) * v0.dx as f64;
        let y = v0.y0 as f64
            + ((iy as f64 - 1.0) + (self.dxyz[1] as f64 + 1.0) * 0.5) * v0.dy as f64;
        let z = v0.z0 as f64
            + ((iz as f64 - 1.0) + (self.dxyz[2] as f64 + 1.0) * 0.5) * v0.dz as f64;
        [x, y, z]
    }

    /// Position in di.
    pub fn position_di(&self, v0: &V0Header, smime: f64) -> [f64; 3] {
        let p = self.position_de(v0);
        [p[0] / smime, p[1] / smime, p[2] / smime]
    }
}

/// Particle species of a dump, fixing mass, charge and file naming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Species {
    Electron,
    Ion,
}

impl Species {
    pub fn from_arg(s: &str) -> Option<Self> {
        match s {
            "e" | "electron" => Some(Self::Electron),
            "i" | "h" | "ion" => Some(Self::Ion),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Electron => "electron",
            Self::Ion => "ion",
        }
    }

    /// Mass in units of m_e.
    pub fn mass(&self, info: &PicInfo) -> f64 {
        match self {
            Self::Electron => 1.0,
            Self::Ion => info.mime,
        }
    }

    /// Signed charge in units of e.
    pub fn charge(&self) -> f64 {
        match self {
            Self::Electron => -1.0,
            Self::Ion => 1.0,
        }
    }

    /// Default momentum-axis extent for velocity distributions.
    pub fn pmax_default(&self) -> f64 {
        match self {
            Self::Electron => 4.0,
            Self::Ion => 40.0,
        }
    }
}

/// Path of the per-rank dump `<base>/particles/T.<tindex>/<species>.<tindex>.<rank>`.
pub fn particle_file_path(base_dir: &Path, species: Species, tindex: usize, rank: usize) -> PathBuf {
    base_dir
        .join("particles")
        .join(format!("T.{}", tindex))
        .join(format!("{}.{}.{}", species.name(), tindex, rank))
}

/// Memory-mapped reader for one per-rank particle dump.
pub struct ParticleFile {
    mmap: Mmap,
    v0: V0Header,
    nptl: usize,
}

impl ParticleFile {
    pub fn open(path: &Path) -> Result<Self, ParticleError> {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };

        // Boilerplate magics. The five type-size bytes are ignored.
        let cafe = read_u16_at(&mmap, 5)?;
        let deadbeef = read_u32_at(&mmap, 7)?;
        if cafe != 0xCAFE || deadbeef != 0xDEAD_BEEF {
            return Err(ParticleError::BadMagic);
        }

        let mut pos = BOILERPLATE_BYTES;
        let mut ints = [0i32; 6];
        for v in ints.iter_mut() {
            *v = read_i32_at(&mmap, pos)?;
            pos += 4;
        }
        let mut floats = [0f32; 10];
        for v in floats.iter_mut() {
            *v = read_f32_at(&mmap, pos)?;
            pos += 4;
        }
        let mut tail = [0i32; 4];
        for v in tail.iter_mut() {
            *v = read_i32_at(&mmap, pos)?;
            pos += 4;
        }
        let v0 = V0Header {
            version: ints[0],
            dump_type: ints[1],
            nt: ints[2],
            nx: ints[3],
            ny: ints[4],
            nz: ints[5],
            dt: floats[0],
            dx: floats[1],
            dy: floats[2],
            dz: floats[3],
            x0: floats[4],
            y0: floats[5],
            z0: floats[6],
            cvac: floats[7],
            eps0: floats[8],
            damp: floats[9],
            rank: tail[0],
            ndom: tail[1],
            spid: tail[2],
            spqm: tail[3],
        };

        let record_size = read_i32_at(&mmap, pos)?;
        let _ndim = read_i32_at(&mmap, pos + 4)?;
        let nptl = read_i32_at(&mmap, pos + 8)?;
        if record_size != RECORD_BYTES as i32 {
            return Err(ParticleError::BadRecordSize(record_size));
        }
        let nptl = nptl.max(0) as usize;

        let need = DATA_OFFSET + nptl * RECORD_BYTES;
        if mmap.len() < need {
            return Err(ParticleError::UnexpectedEof {
                need,
                have: mmap.len(),
            });
        }

        Ok(Self { mmap, v0, nptl })
    }

    pub fn header(&self) -> &V0Header {
        &self.v0
    }

    pub fn nptl(&self) -> usize {
        self.nptl
    }

    /// Read record `n`. The data offset is odd, so fields are decoded one by
    /// one instead of casting the mapped bytes.
    fn record(&self, n: usize) -> Particle {
        let base = DATA_OFFSET + n * RECORD_BYTES;
        let b = &self.mmap;
        Particle {
            dxyz: [
                f32_at(b, base),
                f32_at(b, base + 4),
                f32_at(b, base + 8),
            ],
            icell: i32_at(b, base + 12),
            u: [
                f32_at(b, base + 16),
                f32_at(b, base + 20),
                f32_at(b, base + 24),
            ],
            q: f32_at(b, base + 28),
        }
    }

    /// Iterate over all particles in the file.
    pub fn iter(&self) -> impl Iterator<Item = Particle> + '_ {
        (0..self.nptl).map(move |n| self.record(n))
    }
}

// Bounds-checked header reads.

fn read_u16_at(buf: &[u8], pos: usize) -> Result<u16, ParticleError> {
    let end = pos + 2;
    if end > buf.len() {
        return Err(ParticleError::UnexpectedEof {
            need: end,
            have: buf.len(),
        });
    }
    Ok(u16::from_le_bytes(buf[pos..end].try_into().unwrap()))
}

fn read_u32_at(buf: &[u8], pos: usize) -> Result<u32, ParticleError> {
    let end = pos + 4;
    if end > buf.len() {
        return Err(ParticleError::UnexpectedEof {
            need: end,
            have: buf.len(),
        });
    }
    Ok(u32::from_le_bytes(buf[pos..end].try_into().unwrap()))
}

fn read_i32_at(buf: &[u8], pos: usize) -> Result<i32, ParticleError> {
    Ok(read_u32_at(buf, pos)? as i32)
}

fn read_f32_at(buf: &[u8], pos: usize) -> Result<f32, ParticleError> {
    Ok(f32::from_bits(read_u32_at(buf, pos)?))
}

// Unchecked record reads; the constructor verified the data extent.

#[inline(always)]
fn f32_at(buf: &[u8], pos: usize) -> f32 {
    f32::from_le_bytes(buf[pos..pos + 4].try_into().unwrap())
}

#[inline(always)]
fn i32_at(buf: &[u8], pos: usize) -> i32 {
    i32::from_le_bytes(buf[pos..pos + 4].try_into().unwrap())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::io::Write;

    /// Serialize a synthetic particle file in the on-disk layout.
    pub fn write_particle_file(path: &Path, v0: &V0Header, particles: &[Particle]) {
        let mut bytes: Vec<u8> = Vec::new();
        bytes.extend_from_slice(&[1u8, 2, 4, 4, 8]);
        bytes.extend_from_slice(&0xCAFEu16.to_le_bytes());
        bytes.extend_from_slice(&0xDEAD_BEEFu32.to_le_bytes());
        bytes.extend_from_slice(&1.0f32.to_le_bytes());
        bytes.extend_from_slice(&1.0f64.to_le_bytes());

        for v in [v0.version, v0.dump_type, v0.nt, v0.nx, v0.ny, v0.nz] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        for v in [
            v0.dt, v0.dx, v0.dy, v0.dz, v0.x0, v0.y0, v0.z0, v0.cvac, v0.eps0, v0.damp,
        ] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        for v in [v0.rank, v0.ndom, v0.spid, v0.spqm] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }

        bytes.extend_from_slice(&(RECORD_BYTES as i32).to_le_bytes());
        bytes.extend_from_slice(&1i32.to_le_bytes());
        bytes.extend_from_slice(&(particles.len() as i32).to_le_bytes());

        for p in particles {
            for c in p.dxyz {
                bytes.extend_from_slice(&c.to_le_bytes());
            }
            bytes.extend_from_slice(&p.icell.to_le_bytes());
            for c in p.u {
                bytes.extend_from_slice(&c.to_le_bytes());
            }
            bytes.extend_from_slice(&p.q.to_le_bytes());
        }

        let mut f = File::create(path).unwrap();
        f.write_all(&bytes).unwrap();
    }

    /// A small rank-local header for tests: 4x1x4 cells of size 1 de at origin (0, 0, -2).
    pub fn test_v0(rank: i32) -> V0Header {
        V0Header {
            version: 1,
            dump_type: 1,
            nt: 1000,
            nx: 4,
            ny: 1,
            nz: 4,
            dt: 0.1,
            dx: 1.0,
            dy: 1.0,
            dz: 1.0,
            x0: 0.0,
            y0: 0.0,
            z0: -2.0,
            cvac: 1.0,
            eps0: 1.0,
            damp: 0.0,
            rank,
            ndom: 1,
            spid: 1,
            spqm: -1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn gamma_of_cold_particle_is_one() {
        let p = Particle {
            dxyz: [0.0; 3],
            icell: 0,
            u: [0.0; 3],
            q: 1.0,
        };
        assert!((p.gamma() - 1.0).abs() < 1e-12);
        assert!(p.kinetic_energy(1.0).abs() < 1e-12);
    }

    #[test]
    fn position_reconstruction_matches_cell_decode() {
        let v0 = test_v0(0);
        // Ghost-padded grid is (nx+2) x (ny+2) x (nz+2) = 6 x 3 x 6.
        // Pick interior cell (ix=2, iy=1, iz=3), centred particle.
        let icell = 2 + 1 * 6 + 3 * 6 * 3;
        let p = Particle {
            dxyz: [0.0; 3],
            icell,
            u: [0.0; 3],
            q: 1.0,
        };
        let pos = p.position_de(&v0);
        // x = x0 + ((2 - 1) + 0.5) * dx = 1.5
        assert!((pos[0] - 1.5).abs() < 1e-6);
        // z = z0 + ((3 - 1) + 0.5) * dz = -2 + 2.5 = 0.5
        assert!((pos[2] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn species_lookup() {
        assert_eq!(Species::from_arg("e"), Some(Species::Electron));
        assert_eq!(Species::from_arg("ion"), Some(Species::Ion));
        assert_eq!(Species::from_arg("x"), None);
        assert_eq!(Species::Electron.charge(), -1.0);
    }
}
