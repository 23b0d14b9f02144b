// src/visualisation.rs

use plotters::prelude::*;

use crate::canonical::CanonicalSeries;
use crate::fitting::MaxwellianFit;
use crate::power_spectrum::PowerSpectrum1D;
use crate::scalar_field::ScalarField2D;
use crate::spectrum::{Hist2D, LogHist1D};

/// Map a value to a blue–white–red colour over [lo, hi].
///
/// lo maps to blue, hi to red, the midpoint to white.
fn diverging_color(v: f64, lo: f64, hi: f64) -> RGBColor {
    let mut lo = lo;
    let mut hi = hi;
    if !lo.is_finite() || !hi.is_finite() || (hi - lo).abs() < 1e-9 {
        lo = -1.0;
        hi = 1.0;
    }
    let x = ((v - lo) / (hi - lo)).clamp(0.0, 1.0);
    let r = (255.0 * x) as u8;
    let b = (255.0 * (1.0 - x)) as u8;
    let g = (255.0 * (1.0 - (2.0 * (x - 0.5).abs()))).clamp(0.0, 255.0) as u8;
    RGBColor(r, g, b)
}

/// Map a value to a dark-blue–yellow sequential colour over [lo, hi].
fn sequential_color(v: f64, lo: f64, hi: f64) -> RGBColor {
    let mut lo = lo;
    let mut hi = hi;
    if !lo.is_finite() || !hi.is_finite() || (hi - lo).abs() < 1e-30 {
        lo = 0.0;
        hi = 1.0;
    }
    let x = ((v - lo) / (hi - lo)).clamp(0.0, 1.0);
    let r = (255.0 * x) as u8;
    let g = (32.0 + 208.0 * x) as u8;
    let b = (96.0 * (1.0 - x) + 32.0) as u8;
    RGBColor(r, g, b)
}

/// Save a field slice as a PNG map with one coloured rectangle per cell.
/// - axes are cell indices of the window
/// - `symmetric` centres a blue–white–red scale on zero; otherwise a
///   sequential scale spans the data range
pub fn save_field_map(
    field: &ScalarField2D,
    title: &str,
    symmetric: bool,
    filename: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let nx = field.grid.nx as i32;
    let nz = field.grid.nz as i32;
    let (mut lo, mut hi) = field.finite_min_max();
    if symmetric {
        let m = lo.abs().max(hi.abs());
        lo = -m;
        hi = m;
    }

    let root = BitMapBackend::new(filename, (1024, 768)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .margin(40)
        .caption(title, ("sans-serif", 20))
        .x_label_area_size(40)
        .y_label_area_size(40)
        .build_cartesian_2d(0..nx, 0..nz)?;

    chart
        .configure_mesh()
        .x_desc("x (cell index)")
        .y_desc("z (cell index)")
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    chart.draw_series((0..nx).flat_map(|i| {
        (0..nz).map(move |k| {
            let v = field.at(i as usize, k as usize);
            let color = if symmetric {
                diverging_color(v, lo, hi)
            } else {
                sequential_color(v, lo, hi)
            };
            Rectangle::new([(i, k), (i + 1, k + 1)], color.filled())
        })
    }))?;

    root.present()?;
    Ok(())
}

/// Plot an energy spectrum on log10–log10 axes, with an optional fitted
/// Maxwellian overlaid in red.
pub fn save_spectrum_plot(
    ebins: &[f64],
    dnde: &[f64],
    fit: Option<&MaxwellianFit>,
    title: &str,
    filename: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    // Only positive samples survive the log transform.
    let pts: Vec<(f64, f64)> = ebins
        .iter()
        .zip(dnde)
        .filter(|(&e, &f)| e > 0.0 && f > 0.0)
        .map(|(&e, &f)| (e.log10(), f.log10()))
        .collect();
    if pts.len() < 2 {
        return Ok(());
    }

    let x_min = pts.iter().map(|p| p.0).fold(f64::INFINITY, f64::min);
    let x_max = pts.iter().map(|p| p.0).fold(f64::NEG_INFINITY, f64::max);
    let y_min = pts.iter().map(|p| p.1).fold(f64::INFINITY, f64::min);
    let y_max = pts.iter().map(|p| p.1).fold(f64::NEG_INFINITY, f64::max);
    let margin = 0.05 * (y_max - y_min).max(1.0);

    let root = BitMapBackend::new(filename, (1024, 768)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .margin(20)
        .caption(title, ("sans-serif", 30))
        .set_left_and_bottom_label_area_size(60)
        .build_cartesian_2d(x_min..x_max, (y_min - margin)..(y_max + margin))?;

    chart
        .configure_mesh()
        .x_desc("log10 E (m_e c^2)")
        .y_desc("log10 dN/dE")
        .label_style(("sans-serif", 16))
        .axis_desc_style(("sans-serif", 18))
        .draw()?;

    chart
        .draw_series(LineSeries::new(pts.iter().copied(), &BLACK))?
        .label("spectrum")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &BLACK));

    if let Some(fit) = fit {
        let model: Vec<(f64, f64)> = ebins
            .iter()
            .filter(|&&e| e > 0.0)
            .map(|&e| (e, fit.eval(e)))
            .filter(|(_, f)| *f > 0.0)
            .map(|(e, f)| (e.log10(), f.log10()))
            .filter(|(_, lf)| *lf >= y_min - margin)
            .collect();
        chart
            .draw_series(LineSeries::new(model, &RED))?
            .label(format!("Maxwellian T = {:.3e}", fit.temperature()))
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &RED));
    }

    chart
        .configure_series_labels()
        .border_style(&BLACK)
        .background_style(&WHITE.mix(0.8))
        .draw()?;

    root.present()?;
    Ok(())
}

/// Plot a reduced power spectrum on log10–log10 axes.
pub fn save_power_spectrum_plot(
    spec: &PowerSpectrum1D,
    title: &str,
    x_label: &str,
    filename: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let pts: Vec<(f64, f64)> = spec
        .k
        .iter()
        .zip(&spec.power)
        .filter(|(&k, &p)| k > 0.0 && p > 0.0)
        .map(|(&k, &p)| (k.log10(), p.log10()))
        .collect();
    if pts.len() < 2 {
        return Ok(());
    }

    let x_min = pts.first().map(|p| p.0).unwrap_or(0.0);
    let x_max = pts.last().map(|p| p.0).unwrap_or(1.0);
    let y_min = pts.iter().map(|p| p.1).fold(f64::INFINITY, f64::min);
    let y_max = pts.iter().map(|p| p.1).fold(f64::NEG_INFINITY, f64::max);
    let margin = 0.05 * (y_max - y_min).max(1.0);

    let root = BitMapBackend::new(filename, (1024, 768)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .margin(20)
        .caption(title, ("sans-serif", 30))
        .set_left_and_bottom_label_area_size(60)
        .build_cartesian_2d(x_min..x_max, (y_min - margin)..(y_max + margin))?;

    chart
        .configure_mesh()
        .x_desc(x_label)
        .y_desc("log10 P(k)")
        .label_style(("sans-serif", 16))
        .axis_desc_style(("sans-serif", 18))
        .draw()?;

    chart.draw_series(LineSeries::new(pts, &BLACK))?;

    root.present()?;
    Ok(())
}

/// Plot the canonical-momentum drift series: mean u_y, the scaled mean
/// A_y and their conserved combination versus time.
pub fn save_canonical_plot(
    series: &CanonicalSeries,
    filename: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    if series.time.is_empty() {
        return Ok(());
    }

    let t_min = *series.time.first().unwrap();
    let t_max = *series.time.last().unwrap();

    let scaled_ay: Vec<f64> = series.mean_ay.iter().map(|&a| series.ratio * a).collect();

    let mut y_min = f64::INFINITY;
    let mut y_max = f64::NEG_INFINITY;
    for &v in series
        .mean_uy
        .iter()
        .chain(&scaled_ay)
        .chain(&series.conserved)
    {
        if v.is_finite() {
            if v < y_min {
                y_min = v;
            }
            if v > y_max {
                y_max = v;
            }
        }
    }
    if !y_min.is_finite() || !y_max.is_finite() {
        y_min = -1.0;
        y_max = 1.0;
    } else if (y_max - y_min).abs() < 1e-30 {
        let delta = if y_max.abs() < 1e-30 {
            1.0
        } else {
            0.1 * y_max.abs()
        };
        y_min -= delta;
        y_max += delta;
    } else {
        let margin = 0.1 * (y_max - y_min);
        y_min -= margin;
        y_max += margin;
    }

    let root = BitMapBackend::new(filename, (1024, 768)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .margin(20)
        .caption("Canonical momentum vs time", ("sans-serif", 30))
        .set_left_and_bottom_label_area_size(60)
        .build_cartesian_2d(t_min..t_max, y_min..y_max)?;

    chart
        .configure_mesh()
        .x_desc("time (1/Omega_ci)")
        .y_desc("u_y (c)")
        .label_style(("sans-serif", 16))
        .axis_desc_style(("sans-serif", 18))
        .draw()?;

    chart
        .draw_series(LineSeries::new(
            series
                .time
                .iter()
                .zip(&series.mean_uy)
                .map(|(&t, &v)| (t, v)),
            &RED,
        ))?
        .label("<u_y>")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &RED));

    chart
        .draw_series(LineSeries::new(
            series.time.iter().zip(&scaled_ay).map(|(&t, &v)| (t, v)),
            &BLUE,
        ))?
        .label("c <A_y>")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &BLUE));

    chart
        .draw_series(LineSeries::new(
            series
                .time
                .iter()
                .zip(&series.conserved)
                .map(|(&t, &v)| (t, v)),
            &BLACK,
        ))?
        .label("<u_y> - c <A_y>")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &BLACK));

    chart
        .configure_series_labels()
        .border_style(&BLACK)
        .background_style(&WHITE.mix(0.8))
        .draw()?;

    root.present()?;
    Ok(())
}

fn draw_hist2d_panel(
    area: &DrawingArea<BitMapBackend, plotters::coord::Shift>,
    hist: &Hist2D,
    title: &str,
    x_label: &str,
    y_label: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    // Counts span many decades; colour by log10(1 + n).
    let log_counts: Vec<f64> = hist.counts.iter().map(|&c| (1.0 + c).log10()).collect();
    let hi = log_counts.iter().fold(0.0f64, |a, &b| a.max(b));

    let nx = hist.nx as i32;
    let ny = hist.ny as i32;
    let mut chart = ChartBuilder::on(area)
        .margin(15)
        .caption(title, ("sans-serif", 20))
        .x_label_area_size(35)
        .y_label_area_size(45)
        .build_cartesian_2d(hist.xmin..hist.xmax, hist.ymin..hist.ymax)?;

    chart
        .configure_mesh()
        .x_desc(x_label)
        .y_desc(y_label)
        .axis_desc_style(("sans-serif", 14))
        .draw()?;

    let dx = (hist.xmax - hist.xmin) / nx as f64;
    let dy = (hist.ymax - hist.ymin) / ny as f64;
    chart.draw_series((0..nx).flat_map(|i| {
        let log_counts = &log_counts;
        (0..ny).map(move |j| {
            let v = log_counts[(j * nx + i) as usize];
            let x0 = hist.xmin + i as f64 * dx;
            let y0 = hist.ymin + j as f64 * dy;
            Rectangle::new(
                [(x0, y0), (x0 + dx, y0 + dy)],
                sequential_color(v, 0.0, hi).filled(),
            )
        })
    }))?;
    Ok(())
}

/// Save the three Cartesian momentum-plane histograms of a velocity
/// distribution side by side.
pub fn save_vdist_panels(
    uxy: &Hist2D,
    uxz: &Hist2D,
    uyz: &Hist2D,
    species: &str,
    filename: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let root = BitMapBackend::new(filename, (1536, 512)).into_drawing_area();
    root.fill(&WHITE)?;
    let panels = root.split_evenly((1, 3));

    draw_hist2d_panel(&panels[0], uxy, &format!("{} u_x-u_y", species), "u_x", "u_y")?;
    draw_hist2d_panel(&panels[1], uxz, &format!("{} u_x-u_z", species), "u_x", "u_z")?;
    draw_hist2d_panel(&panels[2], uyz, &format!("{} u_y-u_z", species), "u_y", "u_z")?;

    root.present()?;
    Ok(())
}

/// Save the three position-momentum phase-space histograms of a species
/// side by side: x against u_x, u_y and u_z.
pub fn save_phase_panels(
    xux: &Hist2D,
    xuy: &Hist2D,
    xuz: &Hist2D,
    species: &str,
    filename: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let root = BitMapBackend::new(filename, (1536, 512)).into_drawing_area();
    root.fill(&WHITE)?;
    let panels = root.split_evenly((1, 3));

    draw_hist2d_panel(&panels[0], xux, &format!("{} x-u_x", species), "x (di)", "u_x")?;
    draw_hist2d_panel(&panels[1], xuy, &format!("{} x-u_y", species), "x (di)", "u_y")?;
    draw_hist2d_panel(&panels[2], xuz, &format!("{} x-u_z", species), "x (di)", "u_z")?;

    root.present()?;
    Ok(())
}

/// Plot f(p_para), f(p_perp) and f(|p|) of a velocity distribution on
/// log10-log10 axes.
pub fn save_momentum_spectra_plot(
    fpara: &LogHist1D,
    fperp: &LogHist1D,
    fmod: &LogHist1D,
    species: &str,
    filename: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let to_pts = |h: &LogHist1D| -> Vec<(f64, f64)> {
        h.bins
            .centers()
            .iter()
            .zip(&h.counts)
            .filter(|(&p, &c)| p > 0.0 && c > 0.0)
            .map(|(&p, &c)| (p.log10(), c.log10()))
            .collect()
    };
    let para = to_pts(fpara);
    let perp = to_pts(fperp);
    let modp = to_pts(fmod);

    let mut x_min = f64::INFINITY;
    let mut x_max = f64::NEG_INFINITY;
    let mut y_min = f64::INFINITY;
    let mut y_max = f64::NEG_INFINITY;
    for &(x, y) in para.iter().chain(&perp).chain(&modp) {
        x_min = x_min.min(x);
        x_max = x_max.max(x);
        y_min = y_min.min(y);
        y_max = y_max.max(y);
    }
    if !x_min.is_finite() || !y_min.is_finite() {
        return Ok(());
    }
    let margin = 0.05 * (y_max - y_min).max(1.0);

    let root = BitMapBackend::new(filename, (1024, 768)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .margin(20)
        .caption(
            format!("{} momentum distributions", species),
            ("sans-serif", 30),
        )
        .set_left_and_bottom_label_area_size(60)
        .build_cartesian_2d(x_min..x_max, (y_min - margin)..(y_max + margin))?;

    chart
        .configure_mesh()
        .x_desc("log10 p (m c)")
        .y_desc("log10 f(p)")
        .label_style(("sans-serif", 16))
        .axis_desc_style(("sans-serif", 18))
        .draw()?;

    chart
        .draw_series(LineSeries::new(para, &RED))?
        .label("f(p_para)")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &RED));
    chart
        .draw_series(LineSeries::new(perp, &BLUE))?
        .label("f(p_perp)")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &BLUE));
    chart
        .draw_series(LineSeries::new(modp, &BLACK))?
        .label("f(p)")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &BLACK));

    chart
        .configure_series_labels()
        .border_style(&BLACK)
        .background_style(&WHITE.mix(0.8))
        .draw()?;

    root.present()?;
    Ok(())
}

/// Save the field-aligned u_para-u_perp histogram.
pub fn save_para_perp_panel(
    hist: &Hist2D,
    species: &str,
    filename: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let root = BitMapBackend::new(filename, (800, 600)).into_drawing_area();
    root.fill(&WHITE)?;
    draw_hist2d_panel(
        &root,
        hist,
        &format!("{} u_para-u_perp", species),
        "u_para",
        "u_perp",
    )?;
    root.present()?;
    Ok(())
}
