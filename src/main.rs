// src/main.rs
//
// CLI driver for post-processing PIC reconnection runs.
//
// A run directory is expected to hold
//   <run>/pic_info.json            run metadata
//   <run>/data/*.gda               field dumps (bx, ey, pe-xx, ...)
//   <run>/particles/T.<t>/...      per-rank particle dumps
//
// Examples:
//
//   cargo run --release -- agyrotropy run=/data/mime25 frame=30 species=e
//       -> agyrotropy map of frame 30 for electrons.
//
//   cargo run --release -- jdote run=/data/mime25 species=e smooth=3
//       -> j.E maps for every field frame, boxcar-smoothed.
//
//   cargo run --release -- spectrum run=/data/mime25 tframe=8 species=e
//       -> energy spectrum over all ranks of particle frame 8, with a
//          two-Maxwellian fit printed and overplotted.
//
//   cargo run --release -- vdist run=/data/mime25 tframe=8 species=i \
//         cx=100 cz=0 sx=20 sz=20
//       -> velocity distributions of ions in a 20 x 20 cell box at
//          (100, 0) di.
//
// Typical outputs (per run directory):
//   <out>/
//     ├── config.json
//     ├── agyrotropy/agyro_e_0030.png
//     ├── spectra/espect_e_0008.dat, espect_e_0008.png
//     ├── vdist/vdist_i_0008.png
//     └── canonical/pcan_e.png

use std::env;
use std::fs::create_dir_all;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use rayon::prelude::*;

use pic_post::canonical::{self, CanonicalSums};
use pic_post::config::{AnalysisConfig, DataConfig, NumericsConfig, RunInfo, SelectionConfig};
use pic_post::derived::{self, PressureTensor};
use pic_post::fitting;
use pic_post::gda::{read_2d_field, FieldWindow};
use pic_post::particle::{particle_file_path, ParticleFile, Species};
use pic_post::pic_info::PicInfo;
use pic_post::power_spectrum::{power_spectrum_x, power_spectrum_z};
use pic_post::region::RegionBox;
use pic_post::scalar_field::ScalarField2D;
use pic_post::spectrum::{EnergySpectrum, LogBins, PhaseSpaceDist, VelocityDist};
use pic_post::vec3;
use pic_post::visualisation::{
    save_canonical_plot, save_field_map, save_momentum_spectra_plot, save_para_perp_panel,
    save_phase_panels, save_power_spectrum_plot, save_spectrum_plot, save_vdist_panels,
};

type AnyError = Box<dyn std::error::Error>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Agyrotropy,
    Epara,
    Curvb,
    Gradb,
    Ppara,
    Jdote,
    Spectrum,
    Vdist,
    Phase,
    Canonical,
    Powerspec,
}

impl Op {
    fn from_str(s: &str) -> Option<Self> {
        match s {
            "agyrotropy" | "agyro" => Some(Self::Agyrotropy),
            "epara" => Some(Self::Epara),
            "curvb" => Some(Self::Curvb),
            "gradb" => Some(Self::Gradb),
            "ppara" => Some(Self::Ppara),
            "jdote" => Some(Self::Jdote),
            "spectrum" | "espect" => Some(Self::Spectrum),
            "vdist" => Some(Self::Vdist),
            "phase" => Some(Self::Phase),
            "canonical" | "pcan" => Some(Self::Canonical),
            "powerspec" => Some(Self::Powerspec),
            _ => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Agyrotropy => "agyrotropy",
            Self::Epara => "epara",
            Self::Curvb => "curvb",
            Self::Gradb => "gradb",
            Self::Ppara => "ppara",
            Self::Jdote => "jdote",
            Self::Spectrum => "spectrum",
            Self::Vdist => "vdist",
            Self::Phase => "phase",
            Self::Canonical => "canonical",
            Self::Powerspec => "powerspec",
        }
    }

    fn uses_particles(&self) -> bool {
        matches!(
            self,
            Self::Spectrum | Self::Vdist | Self::Phase | Self::Canonical
        )
    }
}

fn print_usage() {
    eprintln!(
        r#"Usage:
  cargo run --release -- OP [key=value ...]

Operations:
  agyrotropy | epara | curvb | gradb | ppara | jdote    field-frame maps
  spectrum | vdist | phase | canonical                  particle analyses
  powerspec                                             reduced k spectra

Common keys:
  run=DIR          run directory (default .)
  out=DIR          output directory (default out)
  info=FILE        pic_info JSON (default <run>/pic_info.json)
  species=e|i      particle species (default e)
  frame=N | t=N    field frame; omit to sweep all frames
  tstart=N tend=N  field-frame subrange for the sweep
  tframe=N         particle frame (particle operations; default 1)
  xl= xr= zb= zt=  analysis window in di (default whole domain)
  smooth=N         boxcar kernel width for field maps (default 1)
  field=NAME       .gda quantity for powerspec (default by)
  nbins=N emin= emax= pmax=    histogram controls
  cx= cy= cz= sx= sy= sz=      region box centre (di) and sizes (cells)
"#
    );
}

struct Cli {
    op: Op,
    run_dir: PathBuf,
    out_dir: PathBuf,
    info_path: PathBuf,
    species: Species,
    frame: Option<usize>,
    tstart: Option<usize>,
    tend: Option<usize>,
    tframe: usize,
    window: Option<[f64; 4]>,
    smooth: usize,
    field: String,
    nbins: usize,
    emin: f64,
    emax: f64,
    pmax: Option<f64>,
    region_center: Option<[f64; 3]>,
    region_size: Option<[f64; 3]>,
}

fn parse_args(args: &[String]) -> Result<Cli, String> {
    let op = args
        .first()
        .and_then(|s| Op::from_str(s))
        .ok_or_else(|| "missing or unknown operation".to_string())?;

    let mut cli = Cli {
        op,
        run_dir: PathBuf::from("."),
        out_dir: PathBuf::from("out"),
        info_path: PathBuf::new(),
        species: Species::Electron,
        frame: None,
        tstart: None,
        tend: None,
        tframe: 1,
        window: None,
        smooth: 1,
        field: "by".to_string(),
        nbins: 100,
        emin: 1e-5,
        emax: 10.0,
        pmax: None,
        region_center: None,
        region_size: None,
    };
    let mut win = [f64::NAN; 4];
    let mut center = [f64::NAN; 3];
    let mut size = [f64::NAN; 3];

    for arg in &args[1..] {
        let (key, value) = arg
            .split_once('=')
            .ok_or_else(|| format!("bad argument '{}', expected key=value", arg))?;
        let fval = || {
            value
                .parse::<f64>()
                .map_err(|_| format!("bad value for {}: {}", key, value))
        };
        let ival = || {
            value
                .parse::<usize>()
                .map_err(|_| format!("bad value for {}: {}", key, value))
        };
        match key {
            "run" => cli.run_dir = PathBuf::from(value),
            "out" => cli.out_dir = PathBuf::from(value),
            "info" => cli.info_path = PathBuf::from(value),
            "species" => {
                cli.species = Species::from_arg(value)
                    .ok_or_else(|| format!("unknown species '{}'", value))?
            }
            "frame" | "t" => cli.frame = Some(ival()?),
            "tstart" => cli.tstart = Some(ival()?),
            "tend" => cli.tend = Some(ival()?),
            "tframe" => cli.tframe = ival()?,
            "smooth" => cli.smooth = ival()?.max(1),
            "field" => cli.field = value.to_string(),
            "nbins" => cli.nbins = ival()?.max(2),
            "emin" => cli.emin = fval()?,
            "emax" => cli.emax = fval()?,
            "pmax" => cli.pmax = Some(fval()?),
            "xl" => win[0] = fval()?,
            "xr" => win[1] = fval()?,
            "zb" => win[2] = fval()?,
            "zt" => win[3] = fval()?,
            "cx" => center[0] = fval()?,
            "cy" => center[1] = fval()?,
            "cz" => center[2] = fval()?,
            "sx" => size[0] = fval()?,
            "sy" => size[1] = fval()?,
            "sz" => size[2] = fval()?,
            _ => return Err(format!("unknown key '{}'", key)),
        }
    }

    if win.iter().all(|v| v.is_finite()) {
        cli.window = Some(win);
    }
    if center[0].is_finite() {
        if !center[1].is_finite() {
            center[1] = 0.0;
        }
        if !center[2].is_finite() {
            center[2] = 0.0;
        }
        cli.region_center = Some(center);
        for v in size.iter_mut() {
            if !v.is_finite() {
                *v = 1.0;
            }
        }
        cli.region_size = Some(size);
    }
    if cli.info_path.as_os_str().is_empty() {
        cli.info_path = cli.run_dir.join("pic_info.json");
    }
    Ok(cli)
}

fn frame_tag(frame: usize) -> String {
    format!("{:04}", frame)
}

/// Field frames selected by the CLI: a single frame, a tstart/tend
/// subrange, or the whole run. Clamped to the frames on disk.
fn frame_list(cli: &Cli, ntf: usize) -> Vec<usize> {
    if let Some(f) = cli.frame {
        return vec![f];
    }
    let last = ntf.saturating_sub(1);
    let start = cli.tstart.unwrap_or(0).min(last);
    let end = cli.tend.unwrap_or(last).min(last);
    (start..=end).collect()
}

fn species_field(species: Species, suffix: &str) -> String {
    // pe-xx / pi-xx, vex / vix, ne / ni
    match species {
        Species::Electron => suffix.replace('*', "e"),
        Species::Ion => suffix.replace('*', "i"),
    }
}

fn load_vector(
    dir: &Path,
    names: [&str; 3],
    info: &PicInfo,
    frame: usize,
    win: &FieldWindow,
) -> Result<[ScalarField2D; 3], AnyError> {
    Ok([
        read_2d_field(dir, names[0], info, frame, win)?,
        read_2d_field(dir, names[1], info, frame, win)?,
        read_2d_field(dir, names[2], info, frame, win)?,
    ])
}

fn load_pressure(
    dir: &Path,
    species: Species,
    info: &PicInfo,
    frame: usize,
    win: &FieldWindow,
) -> Result<PressureTensor, AnyError> {
    let name = |c: &str| species_field(species, &format!("p*-{}", c));
    Ok(PressureTensor {
        xx: read_2d_field(dir, &name("xx"), info, frame, win)?,
        yy: read_2d_field(dir, &name("yy"), info, frame, win)?,
        zz: read_2d_field(dir, &name("zz"), info, frame, win)?,
        xy: read_2d_field(dir, &name("xy"), info, frame, win)?,
        xz: read_2d_field(dir, &name("xz"), info, frame, win)?,
        yz: read_2d_field(dir, &name("yz"), info, frame, win)?,
    })
}

fn save_map(
    field: &ScalarField2D,
    smooth: usize,
    title: &str,
    symmetric: bool,
    path: &Path,
) -> Result<(), AnyError> {
    let field = field.smooth(smooth);
    save_field_map(&field, title, symmetric, &path.display().to_string())?;
    Ok(())
}

/// One field frame of a map-producing operation.
fn process_field_frame(cli: &Cli, info: &PicInfo, frame: usize) -> Result<(), AnyError> {
    let data_dir = cli.run_dir.join("data");
    let win = window(cli, info);
    let sp = match cli.species {
        Species::Electron => "e",
        Species::Ion => "i",
    };
    let dir = cli.out_dir.join(cli.op.as_str());
    let tag = frame_tag(frame);
    let png = |stem: &str| dir.join(format!("{}_{}_{}.png", stem, sp, tag));

    // Every map except the reduced spectra needs the magnetic field.
    let load_b = || load_vector(&data_dir, ["bx", "by", "bz"], info, frame, &win);
    match cli.op {
        Op::Agyrotropy => {
            let b = load_b()?;
            let p = load_pressure(&data_dir, cli.species, info, frame, &win)?;
            let a = derived::agyrotropy(&b, &p);
            save_map(&a, cli.smooth, "Agyrotropy A0", false, &png("agyro"))?;
        }
        Op::Epara => {
            let b = load_b()?;
            let e = load_vector(&data_dir, ["ex", "ey", "ez"], info, frame, &win)?;
            let (para, perp) = derived::epara_eperp(&e, &b);
            save_map(&para, cli.smooth, "E_para", true, &png("epara"))?;
            save_map(&perp, cli.smooth, "E_perp", false, &png("eperp"))?;
        }
        Op::Curvb => {
            let b = load_b()?;
            let kappa = derived::curvature_b(&b);
            let mag = derived::magnitude(&kappa);
            save_map(&mag, cli.smooth, "|kappa|", false, &png("curvb"))?;
            save_map(&kappa[0], cli.smooth, "kappa_x", true, &png("curvb_x"))?;
            save_map(&kappa[1], cli.smooth, "kappa_y", true, &png("curvb_y"))?;
            save_map(&kappa[2], cli.smooth, "kappa_z", true, &png("curvb_z"))?;
        }
        Op::Gradb => {
            let b = load_b()?;
            let (gx, gz, mag) = derived::grad_b(&b, info.b0);
            save_map(&mag, cli.smooth, "|grad B| / b0", false, &png("gradb"))?;
            save_map(&gx, cli.smooth, "dB/dx / b0", true, &png("gradb_x"))?;
            save_map(&gz, cli.smooth, "dB/dz / b0", true, &png("gradb_z"))?;
        }
        Op::Ppara => {
            let b = load_b()?;
            let p = load_pressure(&data_dir, cli.species, info, frame, &win)?;
            let (para, perp) = derived::ppara_pperp(&b, &p);
            save_map(&para, cli.smooth, "p_para", false, &png("ppara"))?;
            save_map(&perp, cli.smooth, "p_perp", false, &png("pperp"))?;
        }
        Op::Jdote => {
            let b = load_b()?;
            let e = load_vector(&data_dir, ["ex", "ey", "ez"], info, frame, &win)?;
            let vnames = [
                species_field(cli.species, "v*x"),
                species_field(cli.species, "v*y"),
                species_field(cli.species, "v*z"),
            ];
            let v = load_vector(
                &data_dir,
                [&vnames[0], &vnames[1], &vnames[2]],
                info,
                frame,
                &win,
            )?;
            let n = read_2d_field(&data_dir, &species_field(cli.species, "n*"), info, frame, &win)?;
            let j = derived::current_density(cli.species.charge(), &n, &v);
            let d = derived::jdote(&j, &e, &b);
            save_map(&d.total, cli.smooth, "j.E", true, &png("jdote"))?;
            save_map(&d.para, cli.smooth, "j_para.E_para", true, &png("jdote_para"))?;
            save_map(&d.perp, cli.smooth, "j_perp.E_perp", true, &png("jdote_perp"))?;
        }
        Op::Powerspec => {
            let f = read_2d_field(&data_dir, &cli.field, info, frame, &win)?;
            let kx = power_spectrum_x(&f);
            let kz = power_spectrum_z(&f);
            kx.save(&dir.join(format!("{}_{}.kx", cli.field, tag)))?;
            kz.save(&dir.join(format!("{}_{}.kz", cli.field, tag)))?;
            save_power_spectrum_plot(
                &kx,
                &format!("P({}) vs k_x, frame {}", cli.field, frame),
                "log10 k_x d_i",
                &dir.join(format!("{}_{}_kx.png", cli.field, tag))
                    .display()
                    .to_string(),
            )?;
            save_power_spectrum_plot(
                &kz,
                &format!("P({}) vs k_z, frame {}", cli.field, frame),
                "log10 k_z d_i",
                &dir.join(format!("{}_{}_kz.png", cli.field, tag))
                    .display()
                    .to_string(),
            )?;
        }
        _ => unreachable!(),
    }
    println!("frame {:4}  {} done", frame, cli.op.as_str());
    Ok(())
}

fn window(cli: &Cli, info: &PicInfo) -> FieldWindow {
    match cli.window {
        Some([xl, xr, zb, zt]) => FieldWindow { xl, xr, zb, zt },
        None => FieldWindow::full(info),
    }
}

fn region_ranks(cli: &Cli, info: &PicInfo) -> (Vec<usize>, Option<pic_post::region::Corners>) {
    match (cli.region_center, cli.region_size) {
        (Some(center), Some(size_cells)) => {
            let region = RegionBox {
                center,
                size_cells,
            };
            (region.ranks(info), Some(region.corners(info)))
        }
        _ => ((0..info.mpi_size()).collect(), None),
    }
}

fn run_spectrum(cli: &Cli, info: &PicInfo) -> Result<(), AnyError> {
    let tindex = cli.tframe * info.particle_interval;
    let (ranks, corners) = region_ranks(cli, info);
    let mass = cli.species.mass(info);
    let smime = info.smime();
    let bins = LogBins::new(cli.emin, cli.emax * mass, cli.nbins);
    println!(
        "spectrum: tframe {} (tindex {}), {} ranks",
        cli.tframe,
        tindex,
        ranks.len()
    );

    let spec = ranks
        .par_iter()
        .map(|&rank| {
            let mut spec = EnergySpectrum::new(bins.clone());
            let path = particle_file_path(&cli.run_dir, cli.species, tindex, rank);
            match ParticleFile::open(&path) {
                Ok(file) => {
                    let v0 = *file.header();
                    for p in file.iter() {
                        if let Some(c) = &corners {
                            if !c.contains(p.position_di(&v0, smime)) {
                                continue;
                            }
                        }
                        spec.add(&p, mass);
                    }
                }
                Err(e) => eprintln!("skipping {}: {}", path.display(), e),
            }
            spec
        })
        .reduce(
            || EnergySpectrum::new(bins.clone()),
            |mut a, b| {
                a.merge(&b);
                a
            },
        );

    let dir = cli.out_dir.join("spectra");
    let stem = format!("espect_{}_{}", cli.species.name(), frame_tag(cli.tframe));
    spec.save(&dir.join(format!("{}.dat", stem)))?;

    let ebins = spec.bins.centers();
    let dnde = spec.dn_de();
    let fit = match fitting::fit_two_maxwellians(&ebins, &dnde) {
        Ok(fit) => {
            println!(
                "T_cold = {:.4e}, T_hot = {:.4e} (m_e c^2)",
                fit.cold.temperature(),
                fit.hot.temperature()
            );
            let worst = fit.rel_err.iter().cloned().fold(0.0f64, f64::max);
            println!(
                "nonthermal fraction = {:.4e}, max |f - fit| / f = {:.3e}",
                fit.nonthermal_fraction, worst
            );
            Some(fit.cold)
        }
        Err(e) => {
            eprintln!("Maxwellian fit failed: {}", e);
            None
        }
    };
    // Tail index over the top decade of populated bins.
    let top = dnde.iter().rposition(|&f| f > 0.0).unwrap_or(0);
    let tail = top.saturating_sub(cli.nbins / 4)..top + 1;
    match fitting::fit_power_law(&ebins, &dnde, tail) {
        Ok(pl) => println!("tail index = {:.3}", pl.index),
        Err(e) => eprintln!("power-law fit failed: {}", e),
    }
    save_spectrum_plot(
        &ebins,
        &dnde,
        fit.as_ref(),
        &format!("{} spectrum, tframe {}", cli.species.name(), cli.tframe),
        &dir.join(format!("{}.png", stem)).display().to_string(),
    )?;
    Ok(())
}

fn run_vdist(cli: &Cli, info: &PicInfo) -> Result<(), AnyError> {
    let tindex = cli.tframe * info.particle_interval;
    let field_frame = (cli.tframe * info.tratio()).min(info.ntf.saturating_sub(1));
    let (ranks, corners) = region_ranks(cli, info);
    let smime = info.smime();
    let pmax = cli.pmax.unwrap_or_else(|| cli.species.pmax_default());
    println!(
        "vdist: tframe {} (tindex {}), field frame {}, {} ranks",
        cli.tframe,
        tindex,
        field_frame,
        ranks.len()
    );

    // Local field direction, smoothed, for the field-aligned histograms.
    let data_dir = cli.run_dir.join("data");
    let win = FieldWindow::full(info);
    let b = load_vector(&data_dir, ["bx", "by", "bz"], info, field_frame, &win)?;
    let b = [
        b[0].smooth(cli.smooth),
        b[1].smooth(cli.smooth),
        b[2].smooth(cli.smooth),
    ];

    let vd = ranks
        .par_iter()
        .map(|&rank| {
            let mut vd = VelocityDist::new(cli.nbins, pmax);
            let path = particle_file_path(&cli.run_dir, cli.species, tindex, rank);
            match ParticleFile::open(&path) {
                Ok(file) => {
                    let v0 = *file.header();
                    for p in file.iter() {
                        let pos = p.position_di(&v0, smime);
                        if let Some(c) = &corners {
                            if !c.contains(pos) {
                                continue;
                            }
                        }
                        let bdir = vec3::field_dir([
                            b[0].sample(pos[0], pos[2]),
                            b[1].sample(pos[0], pos[2]),
                            b[2].sample(pos[0], pos[2]),
                        ]);
                        vd.add(&p, bdir);
                    }
                }
                Err(e) => eprintln!("skipping {}: {}", path.display(), e),
            }
            vd
        })
        .reduce(
            || VelocityDist::new(cli.nbins, pmax),
            |mut a, b| {
                a.merge(&b);
                a
            },
        );

    let dir = cli.out_dir.join("vdist");
    let name = cli.species.name();
    let tag = frame_tag(cli.tframe);
    save_vdist_panels(
        &vd.uxy,
        &vd.uxz,
        &vd.uyz,
        name,
        &dir.join(format!("vdist_{}_{}.png", name, tag))
            .display()
            .to_string(),
    )?;
    save_para_perp_panel(
        &vd.para_perp,
        name,
        &dir.join(format!("vdist_para_perp_{}_{}.png", name, tag))
            .display()
            .to_string(),
    )?;
    save_momentum_spectra_plot(
        &vd.fpara,
        &vd.fperp,
        &vd.fmod,
        name,
        &dir.join(format!("fp_{}_{}.png", name, tag))
            .display()
            .to_string(),
    )?;
    Ok(())
}

/// Position-momentum phase space along the outflow axis: x against each
/// momentum component, over the analysis window.
fn run_phase(cli: &Cli, info: &PicInfo) -> Result<(), AnyError> {
    let tindex = cli.tframe * info.particle_interval;
    let (ranks, corners) = region_ranks(cli, info);
    let smime = info.smime();
    let pmax = cli.pmax.unwrap_or_else(|| cli.species.pmax_default());
    let win = window(cli, info);
    println!(
        "phase: tframe {} (tindex {}), x in [{:.1}, {:.1}] di, {} ranks",
        cli.tframe,
        tindex,
        win.xl,
        win.xr,
        ranks.len()
    );

    let ps = ranks
        .par_iter()
        .map(|&rank| {
            let mut ps = PhaseSpaceDist::new(cli.nbins, win.xl, win.xr, pmax);
            let path = particle_file_path(&cli.run_dir, cli.species, tindex, rank);
            match ParticleFile::open(&path) {
                Ok(file) => {
                    let v0 = *file.header();
                    for p in file.iter() {
                        let pos = p.position_di(&v0, smime);
                        if let Some(c) = &corners {
                            if !c.contains(pos) {
                                continue;
                            }
                        }
                        ps.add(pos[0], &p);
                    }
                }
                Err(e) => eprintln!("skipping {}: {}", path.display(), e),
            }
            ps
        })
        .reduce(
            || PhaseSpaceDist::new(cli.nbins, win.xl, win.xr, pmax),
            |mut a, b| {
                a.merge(&b);
                a
            },
        );

    let name = cli.species.name();
    let tag = frame_tag(cli.tframe);
    save_phase_panels(
        &ps.xux,
        &ps.xuy,
        &ps.xuz,
        name,
        &cli.out_dir
            .join("phase")
            .join(format!("phase_{}_{}.png", name, tag))
            .display()
            .to_string(),
    )?;
    Ok(())
}

fn run_canonical(cli: &Cli, info: &PicInfo) -> Result<(), AnyError> {
    let smime = info.smime();
    let data_dir = cli.run_dir.join("data");
    let win = FieldWindow::full(info);
    let dir = cli.out_dir.join("canonical");

    let mut time = Vec::new();
    let mut frames = Vec::new();
    for tframe in 1..=info.ntp {
        let tindex = tframe * info.particle_interval;
        let field_frame = (tframe * info.tratio()).min(info.ntf.saturating_sub(1));
        let bx = read_2d_field(&data_dir, "bx", info, field_frame, &win)?;
        let bz = read_2d_field(&data_dir, "bz", info, field_frame, &win)?;
        let ay = canonical::vector_potential_y(&bx, &bz);

        let sums = (0..info.mpi_size())
            .into_par_iter()
            .map(|rank| {
                let mut sums = CanonicalSums::default();
                let path = particle_file_path(&cli.run_dir, cli.species, tindex, rank);
                match ParticleFile::open(&path) {
                    Ok(file) => {
                        let v0 = *file.header();
                        for p in file.iter() {
                            sums.add(&p, &v0, smime, &ay);
                        }
                    }
                    Err(e) => eprintln!("skipping {}: {}", path.display(), e),
                }
                sums
            })
            .reduce(CanonicalSums::default, |mut a, b| {
                a.merge(&b);
                a
            });

        sums.save(&dir.join(format!(
            "pcan_{}_{}.dat",
            cli.species.name(),
            frame_tag(tframe)
        )))?;
        println!(
            "tframe {:3}  <u_y> = {:+.5e}  <A_y> = {:+.5e}",
            tframe,
            sums.mean_uy(),
            sums.mean_ay()
        );
        time.push(tframe as f64 * info.dt_particles);
        frames.push(sums);
    }

    let series = canonical::canonical_series(&time, &frames);
    println!("coupling ratio |du_y/dA_y| = {:.5e}", series.ratio);
    save_canonical_plot(
        &series,
        &dir.join(format!("pcan_{}.png", cli.species.name()))
            .display()
            .to_string(),
    )?;
    Ok(())
}

fn write_config(cli: &Cli, info_path: &Path) -> Result<(), AnyError> {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .map(|d| d.as_secs().to_string());
    let config = AnalysisConfig {
        data: DataConfig {
            run_dir: cli.run_dir.display().to_string(),
            pic_info: info_path.display().to_string(),
            out_dir: cli.out_dir.display().to_string(),
        },
        selection: SelectionConfig {
            species: cli.species.name().to_string(),
            frame: cli.frame,
            tframe: cli.op.uses_particles().then_some(cli.tframe),
            window: cli.window.unwrap_or([0.0; 4]),
            region_center: cli.region_center,
            region_size_cells: cli.region_size,
        },
        numerics: NumericsConfig {
            smooth: cli.smooth,
            nbins: cli.nbins,
            emin: cli.emin,
            emax: cli.emax,
            pmax: cli.pmax.unwrap_or_else(|| cli.species.pmax_default()),
        },
        run: RunInfo {
            binary: "pic-post".to_string(),
            operation: cli.op.as_str().to_string(),
            timestamp_utc: timestamp,
        },
    };
    config.write_to_dir(&cli.out_dir)?;
    Ok(())
}

fn main() -> Result<(), AnyError> {
    let args: Vec<String> = env::args().skip(1).collect();
    let cli = match parse_args(&args) {
        Ok(cli) => cli,
        Err(msg) => {
            eprintln!("error: {}", msg);
            print_usage();
            std::process::exit(2);
        }
    };

    let info = PicInfo::from_json(&cli.info_path)?;
    create_dir_all(&cli.out_dir)?;
    create_dir_all(cli.out_dir.join(cli.op.as_str()))?;
    create_dir_all(cli.out_dir.join("spectra"))?;
    create_dir_all(cli.out_dir.join("vdist"))?;
    create_dir_all(cli.out_dir.join("phase"))?;
    create_dir_all(cli.out_dir.join("canonical"))?;
    write_config(&cli, &cli.info_path)?;

    println!(
        "run {} | {} x {} cells, {} field frames, {} particle frames, {} ranks",
        cli.run_dir.display(),
        info.nx,
        info.nz,
        info.ntf,
        info.ntp,
        info.mpi_size()
    );

    match cli.op {
        Op::Spectrum => run_spectrum(&cli, &info)?,
        Op::Vdist => run_vdist(&cli, &info)?,
        Op::Phase => run_phase(&cli, &info)?,
        Op::Canonical => run_canonical(&cli, &info)?,
        _ => {
            let frames = frame_list(&cli, info.ntf);
            frames.par_iter().for_each(|&frame| {
                if let Err(e) = process_field_frame(&cli, &info, frame) {
                    eprintln!("frame {}: {}", frame, e);
                }
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn frame_keys_select_single_frame_or_subrange() {
        let cli = parse_args(&args(&["jdote", "t=7"])).unwrap();
        assert_eq!(cli.frame, Some(7));
        assert_eq!(frame_list(&cli, 10), vec![7]);

        let cli = parse_args(&args(&["jdote", "frame=3"])).unwrap();
        assert_eq!(frame_list(&cli, 10), vec![3]);

        let cli = parse_args(&args(&["jdote", "tstart=2", "tend=4"])).unwrap();
        assert_eq!(frame_list(&cli, 10), vec![2, 3, 4]);

        // An open-ended subrange runs to the last frame on disk.
        let cli = parse_args(&args(&["jdote", "tstart=8"])).unwrap();
        assert_eq!(frame_list(&cli, 10), vec![8, 9]);
        let cli = parse_args(&args(&["jdote", "tend=1"])).unwrap();
        assert_eq!(frame_list(&cli, 10), vec![0, 1]);

        // No frame keys: the full sweep, clamped to ntf.
        let cli = parse_args(&args(&["jdote"])).unwrap();
        assert_eq!(frame_list(&cli, 3), vec![0, 1, 2]);

        // Out-of-range bounds clamp instead of panicking.
        let cli = parse_args(&args(&["jdote", "tstart=50", "tend=60"])).unwrap();
        assert_eq!(frame_list(&cli, 10), vec![9]);
    }

    #[test]
    fn parse_args_rejects_malformed_input() {
        assert!(parse_args(&args(&[])).is_err());
        assert!(parse_args(&args(&["not-an-op"])).is_err());
        assert!(parse_args(&args(&["jdote", "frame"])).is_err());
        assert!(parse_args(&args(&["jdote", "frame=abc"])).is_err());
        assert!(parse_args(&args(&["jdote", "bogus=1"])).is_err());
    }

    #[test]
    fn phase_op_parses_and_uses_particles() {
        let cli = parse_args(&args(&["phase", "tframe=3", "pmax=2.5"])).unwrap();
        assert_eq!(cli.op, Op::Phase);
        assert!(cli.op.uses_particles());
        assert_eq!(cli.tframe, 3);
        assert_eq!(cli.pmax, Some(2.5));
    }
}
