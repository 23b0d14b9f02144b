// src/pic_info.rs
//
// PIC run metadata, loaded from data/pic_info/pic_info_<run>.json.
// The JSON is written once when a run is registered and shared by every
// analysis operation; lengths are in ion inertial lengths (di) unless the
// field name says otherwise.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PicInfo {
    // Global grid
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
    pub lx_di: f64,
    pub ly_di: f64,
    pub lz_di: f64,
    pub dx_di: f64,
    pub dy_di: f64,
    pub dz_di: f64,

    // Plasma parameters
    /// Ion-to-electron mass ratio.
    pub mime: f64,
    /// Particles per cell per species.
    pub nppc: f64,
    /// Asymptotic magnetic field strength.
    pub b0: f64,
    /// Electron thermal speed.
    pub vthe: f64,
    /// Timestep in units of the electron plasma frequency.
    pub dtwpe: f64,
    /// Timestep in units of the electron cyclotron frequency.
    pub dtwce: f64,

    // Dump cadence
    pub fields_interval: usize,
    pub particle_interval: usize,
    /// Field-frame spacing in ion cyclotron times.
    pub dt_fields: f64,
    /// Particle-frame spacing in ion cyclotron times.
    pub dt_particles: f64,
    /// Number of field frames.
    pub ntf: usize,
    /// Number of particle frames.
    pub ntp: usize,

    // MPI domain decomposition of the PIC run
    pub topology_x: usize,
    pub topology_y: usize,
    pub topology_z: usize,
}

impl PicInfo {
    /// Load from a pic_info JSON file.
    pub fn from_json(path: &Path) -> Result<Self, PicInfoError> {
        let file = File::open(path).map_err(|e| PicInfoError::Io(path.display().to_string(), e))?;
        let info: PicInfo = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| PicInfoError::Parse(path.display().to_string(), e))?;
        Ok(info)
    }

    /// sqrt(mi/me), the de → di length conversion factor.
    #[inline]
    pub fn smime(&self) -> f64 {
        self.mime.sqrt()
    }

    /// Alfvén speed of the inflow region in units of c.
    pub fn va(&self) -> f64 {
        let wpe_wce = self.dtwce / self.dtwpe;
        wpe_wce / self.smime()
    }

    /// Number of field frames per particle frame.
    pub fn tratio(&self) -> usize {
        (self.particle_interval / self.fields_interval).max(1)
    }

    /// Total number of PIC MPI ranks.
    pub fn mpi_size(&self) -> usize {
        self.topology_x * self.topology_y * self.topology_z
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PicInfoError {
    #[error("cannot open pic_info file {0}: {1}")]
    Io(String, #[source] std::io::Error),
    #[error("cannot parse pic_info file {0}: {1}")]
    Parse(String, #[source] serde_json::Error),
}

#[cfg(test)]
pub(crate) fn test_info() -> PicInfo {
    PicInfo {
        nx: 64,
        ny: 1,
        nz: 32,
        lx_di: 200.0,
        ly_di: 1.0,
        lz_di: 100.0,
        dx_di: 200.0 / 64.0,
        dy_di: 1.0,
        dz_di: 100.0 / 32.0,
        mime: 25.0,
        nppc: 100.0,
        b0: 1.0,
        vthe: 0.1,
        dtwpe: 0.1,
        dtwce: 0.02,
        fields_interval: 100,
        particle_interval: 1000,
        dt_fields: 2.5,
        dt_particles: 25.0,
        ntf: 10,
        ntp: 2,
        topology_x: 4,
        topology_y: 1,
        topology_z: 2,
    }
}
