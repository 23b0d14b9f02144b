use serde::Serialize;
use serde_json;
use std::fs::File;
use std::path::Path;

#[derive(Serialize)]
pub struct AnalysisConfig {
    pub data: DataConfig,
    pub selection: SelectionConfig,
    pub numerics: NumericsConfig,
    pub run: RunInfo,
}

#[derive(Serialize)]
pub struct DataConfig {
    pub run_dir: String,
    pub pic_info: String,
    pub out_dir: String,
}

#[derive(Serialize)]
pub struct SelectionConfig {
    pub species: String,
    /// Field frame, or None when the operation sweeps all frames.
    pub frame: Option<usize>,
    /// Particle frame for particle-based operations.
    pub tframe: Option<usize>,
    /// Analysis window [xl, xr, zb, zt] in di.
    pub window: [f64; 4],
    /// Region box centre in di and sizes in cells, for particle selections.
    pub region_center: Option<[f64; 3]>,
    pub region_size_cells: Option<[f64; 3]>,
}

#[derive(Serialize)]
pub struct NumericsConfig {
    /// Boxcar kernel width applied to field slices (1 = off).
    pub smooth: usize,
    pub nbins: usize,
    pub emin: f64,
    pub emax: f64,
    pub pmax: f64,
}

#[derive(Serialize)]
pub struct RunInfo {
    pub binary: String,
    pub operation: String,
    pub timestamp_utc: Option<String>,
}

impl AnalysisConfig {
    pub fn write_to_dir(&self, out_dir: &Path) -> std::io::Result<()> {
        let path = out_dir.join("config.json");
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }
}
