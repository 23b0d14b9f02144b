// src/gda.rs
//
// Reader for .gda field dumps: a headerless stream of frames, each an
// nx × nz little-endian f32 slice with x fastest. Frame count comes from
// the file size; a window in di can be cut out of any frame.

use std::fs::File;
use std::path::Path;

use memmap2::Mmap;
use thiserror::Error;

use crate::grid::Grid2D;
use crate::pic_info::PicInfo;
use crate::scalar_field::ScalarField2D;

/// Spatial window of a field slice, in di.
/// x runs over [0, lx_di], z over [-lz_di/2, lz_di/2].
#[derive(Debug, Clone, Copy)]
pub struct FieldWindow {
    pub xl: f64,
    pub xr: f64,
    pub zb: f64,
    pub zt: f64,
}

impl FieldWindow {
    /// The whole x–z plane of the run.
    pub fn full(info: &PicInfo) -> Self {
        Self {
            xl: 0.0,
            xr: info.lx_di,
            zb: -0.5 * info.lz_di,
            zt: 0.5 * info.lz_di,
        }
    }
}

#[derive(Debug, Error)]
pub enum GdaError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("gda file size {size} is not a multiple of the frame size {frame_bytes}")]
    Truncated { size: u64, frame_bytes: u64 },
    #[error("frame {frame} out of range (file holds {nframes})")]
    FrameOutOfRange { frame: usize, nframes: usize },
    #[error("window selects no cells")]
    EmptyWindow,
}

/// Memory-mapped reader for one .gda field file.
pub struct GdaReader {
    mmap: Mmap,
    nx: usize,
    nz: usize,
    dx: f64,
    dz: f64,
    z_offset: f64,
    nframes: usize,
}

impl GdaReader {
    /// Open a .gda file whose frames match the run described by `info`.
    pub fn open(path: &Path, info: &PicInfo) -> Result<Self, GdaError> {
        let file = File::open(path)?;
        let size = file.metadata()?.len();
        let frame_bytes = (info.nx * info.nz * 4) as u64;
        if frame_bytes == 0 || size % frame_bytes != 0 {
            return Err(GdaError::Truncated { size, frame_bytes });
        }
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self {
            mmap,
            nx: info.nx,
            nz: info.nz,
            dx: info.dx_di,
            dz: info.dz_di,
            z_offset: -0.5 * info.lz_di,
            nframes: (size / frame_bytes) as usize,
        })
    }

    /// Number of frames in the file.
    pub fn nframes(&self) -> usize {
        self.nframes
    }

    /// Read the window of one frame as a ScalarField2D.
    pub fn read_frame(&self, frame: usize, win: &FieldWindow) -> Result<ScalarField2D, GdaError> {
        if frame >= self.nframes {
            return Err(GdaError::FrameOutOfRange {
                frame,
                nframes: self.nframes,
            });
        }

        // An inverted window selects nothing; the index clamps below
        // would silently widen it to one cell instead.
        if win.xl > win.xr || win.zb > win.zt {
            return Err(GdaError::EmptyWindow);
        }

        // Window in cell indices, clamped to the domain.
        let i0 = ((win.xl / self.dx).floor().max(0.0) as usize).min(self.nx - 1);
        let i1 = ((win.xr / self.dx).ceil() as usize).clamp(i0, self.nx - 1);
        let k0 = (((win.zb - self.z_offset) / self.dz).floor().max(0.0) as usize).min(self.nz - 1);
        let k1 = (((win.zt - self.z_offset) / self.dz).ceil() as usize).clamp(k0, self.nz - 1);
        let wnx = i1 - i0 + 1;
        let wnz = k1 - k0 + 1;

        let frame_len = self.nx * self.nz;
        let start = frame * frame_len * 4;
        let raw: &[f32] = bytemuck::cast_slice(&self.mmap[start..start + frame_len * 4]);

        let grid = Grid2D::new(
            wnx,
            wnz,
            self.dx,
            self.dz,
            i0 as f64 * self.dx,
            self.z_offset + k0 as f64 * self.dz,
        );
        let mut data = Vec::with_capacity(wnx * wnz);
        for k in k0..=k1 {
            let row = k * self.nx;
            for i in i0..=i1 {
                data.push(raw[row + i] as f64);
            }
        }
        Ok(ScalarField2D { grid, data })
    }
}

/// Read one windowed frame of `<dir>/<name>.gda`.
///
/// Convenience wrapper for operations that pull many different quantities
/// for the same frame.
pub fn read_2d_field(
    dir: &Path,
    name: &str,
    info: &PicInfo,
    frame: usize,
    win: &FieldWindow,
) -> Result<ScalarField2D, GdaError> {
    let path = dir.join(format!("{}.gda", name));
    let reader = GdaReader::open(&path, info)?;
    reader.read_frame(frame, win)
}
