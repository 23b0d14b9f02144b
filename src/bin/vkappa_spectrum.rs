// src/bin/vkappa_spectrum.rs
//
// Overlay stored velocity-curvature spectra on one log-log plot.
// Each input is an f32 stream: first half wavenumbers, second half f(k).
//
//   cargo run --release --bin vkappa-spectrum -- out=vkappa.png \
//       data/vkappa_e_0008.dat data/vkappa_i_0008.dat

use std::env;
use std::path::{Path, PathBuf};

use plotters::prelude::*;

use pic_post::power_spectrum::{load_power_spectrum, PowerSpectrum1D};

fn print_usage() {
    eprintln!("Usage: vkappa-spectrum [out=PNG] FILE [FILE ...]");
}

fn stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut out = PathBuf::from("vkappa_spectrum.png");
    let mut files: Vec<PathBuf> = Vec::new();
    for arg in env::args().skip(1) {
        match arg.split_once('=') {
            Some(("out", v)) => out = PathBuf::from(v),
            Some((k, _)) => {
                eprintln!("error: unknown key '{}'", k);
                print_usage();
                std::process::exit(2);
            }
            None => files.push(PathBuf::from(arg)),
        }
    }
    if files.is_empty() {
        print_usage();
        std::process::exit(2);
    }

    let mut spectra: Vec<(String, PowerSpectrum1D)> = Vec::new();
    for path in &files {
        let spec = load_power_spectrum(path)?;
        println!("{}: {} samples", path.display(), spec.k.len());
        spectra.push((stem(path), spec));
    }

    // Log-log points of every series, for the shared axis range.
    let series: Vec<(String, Vec<(f64, f64)>)> = spectra
        .iter()
        .map(|(name, s)| {
            let pts = s
                .k
                .iter()
                .zip(&s.power)
                .filter(|(&k, &p)| k > 0.0 && p > 0.0)
                .map(|(&k, &p)| (k.log10(), p.log10()))
                .collect();
            (name.clone(), pts)
        })
        .collect();

    let mut x_min = f64::INFINITY;
    let mut x_max = f64::NEG_INFINITY;
    let mut y_min = f64::INFINITY;
    let mut y_max = f64::NEG_INFINITY;
    for (_, pts) in &series {
        for &(x, y) in pts {
            x_min = x_min.min(x);
            x_max = x_max.max(x);
            y_min = y_min.min(y);
            y_max = y_max.max(y);
        }
    }
    if !x_min.is_finite() || !y_min.is_finite() {
        eprintln!("no positive samples to plot");
        std::process::exit(1);
    }
    let margin = 0.05 * (y_max - y_min).max(1.0);

    let filename = out.display().to_string();
    let root = BitMapBackend::new(&filename, (1024, 768)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .margin(20)
        .caption("Velocity-curvature spectra", ("sans-serif", 30))
        .set_left_and_bottom_label_area_size(60)
        .build_cartesian_2d(x_min..x_max, (y_min - margin)..(y_max + margin))?;

    chart
        .configure_mesh()
        .x_desc("log10 k")
        .y_desc("log10 f(k)")
        .label_style(("sans-serif", 16))
        .axis_desc_style(("sans-serif", 18))
        .draw()?;

    for (n, (name, pts)) in series.into_iter().enumerate() {
        let color = Palette99::pick(n).to_rgba();
        chart
            .draw_series(LineSeries::new(pts, &color))?
            .label(name)
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
    }

    chart
        .configure_series_labels()
        .border_style(&BLACK)
        .background_style(&WHITE.mix(0.8))
        .draw()?;

    root.present()?;
    println!("wrote {}", out.display());
    Ok(())
}
