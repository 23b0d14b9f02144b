// src/fitting.rs
//
// Spectral fits: Maxwellian core(s) and power-law tails of kinetic-energy
// spectra. The Maxwellian model is f(E) = A sqrt(E) exp(-B E) with
// temperature T = 1 / (2 B); fits are initialised by log-linearisation and
// refined with Gauss-Newton on the two parameters.

use nalgebra::{Matrix2, Vector2};
use thiserror::Error;

use crate::spectrum::smooth_1d;

#[derive(Debug, Error)]
pub enum FitError {
    #[error("too few usable points for the fit ({0})")]
    TooFewPoints(usize),
    #[error("normal equations are singular")]
    Singular,
    #[error("fit diverged to non-finite parameters")]
    NotFinite,
}

/// A fitted Maxwellian f(E) = amp * sqrt(E) * exp(-b * E).
#[derive(Debug, Clone, Copy)]
pub struct MaxwellianFit {
    pub amp: f64,
    pub b: f64,
}

impl MaxwellianFit {
    /// Temperature in the energy unit of the spectrum.
    pub fn temperature(&self) -> f64 {
        0.5 / self.b
    }

    #[inline]
    pub fn eval(&self, e: f64) -> f64 {
        self.amp * e.sqrt() * (-self.b * e).exp()
    }
}

/// Fit window ending a fixed margin past the (smoothed) spectral peak.
pub fn thermal_window(dnde: &[f64], margin: usize) -> std::ops::Range<usize> {
    let smoothed = smooth_1d(dnde, 3);
    let ipeak = argmax(&smoothed);
    0..(ipeak + margin + 1).min(dnde.len())
}

fn argmax(v: &[f64]) -> usize {
    let mut best = 0;
    for (i, &x) in v.iter().enumerate() {
        if x > v[best] {
            best = i;
        }
    }
    best
}

/// Fit a single Maxwellian to `dnde[range]` over energies `ebins[range]`.
pub fn fit_maxwellian(
    ebins: &[f64],
    dnde: &[f64],
    range: std::ops::Range<usize>,
) -> Result<MaxwellianFit, FitError> {
    let pts: Vec<(f64, f64)> = range
        .clone()
        .filter(|&i| dnde[i] > 0.0 && ebins[i] > 0.0)
        .map(|i| (ebins[i], dnde[i]))
        .collect();
    if pts.len() < 3 {
        return Err(FitError::TooFewPoints(pts.len()));
    }

    // Log-linearised start: ln(f / sqrt(E)) = ln A - B E.
    let (slope, intercept) = linear_fit(pts.iter().map(|&(e, f)| (e, (f / e.sqrt()).ln())))?;
    let e_peak = pts
        .iter()
        .fold((0.0, 0.0), |acc, &(e, f)| if f > acc.1 { (e, f) } else { acc })
        .0;
    let mut b = if slope < 0.0 { -slope } else { 0.25 / e_peak };
    let mut amp = intercept.exp();

    // Gauss-Newton on (A, B).
    for _ in 0..50 {
        let mut jtj = Matrix2::<f64>::zeros();
        let mut jtr = Vector2::<f64>::zeros();
        for &(e, f) in &pts {
            let base = e.sqrt() * (-b * e).exp();
            let model = amp * base;
            let r = f - model;
            let ja = base;
            let jb = -amp * e * base;
            jtj[(0, 0)] += ja * ja;
            jtj[(0, 1)] += ja * jb;
            jtj[(1, 0)] += jb * ja;
            jtj[(1, 1)] += jb * jb;
            jtr[0] += ja * r;
            jtr[1] += jb * r;
        }
        let inv = jtj.try_inverse().ok_or(FitError::Singular)?;
        let delta = inv * jtr;
        amp += delta[0];
        b += delta[1];
        if !(amp.is_finite() && b.is_finite()) {
            return Err(FitError::NotFinite);
        }
        if b <= 0.0 {
            b = 0.25 / e_peak;
        }
        let step = (delta[0] / amp).abs().max((delta[1] / b).abs());
        if step < 1e-10 {
            break;
        }
    }
    Ok(MaxwellianFit { amp, b })
}

/// Two-temperature decomposition: fit the dominant core, subtract it, then
/// fit a second Maxwellian to the residual.
#[derive(Debug, Clone)]
pub struct TwoMaxwellianFit {
    pub cold: MaxwellianFit,
    pub hot: MaxwellianFit,
    /// Fraction of the spectrum (integrated dN) not accounted for by the
    /// summed fit.
    pub nonthermal_fraction: f64,
    /// |f - (cold + hot)| / f per bin; zero where the spectrum is empty.
    pub rel_err: Vec<f64>,
}

/// Residual diagnostics of a summed two-Maxwellian model against a
/// spectrum: (nonthermal fraction, pointwise relative error).
pub fn summed_fit_errors(
    ebins: &[f64],
    dnde: &[f64],
    cold: &MaxwellianFit,
    hot: &MaxwellianFit,
) -> (f64, Vec<f64>) {
    let mut excess = 0.0;
    let mut total = 0.0;
    let mut rel_err = Vec::with_capacity(ebins.len());
    for (&e, &f) in ebins.iter().zip(dnde) {
        let model = cold.eval(e) + hot.eval(e);
        if f > 0.0 {
            excess += (f - model).max(0.0);
            total += f;
            rel_err.push((f - model).abs() / f);
        } else {
            rel_err.push(0.0);
        }
    }
    let fraction = if total > 0.0 { excess / total } else { 0.0 };
    (fraction, rel_err)
}

pub fn fit_two_maxwellians(ebins: &[f64], dnde: &[f64]) -> Result<TwoMaxwellianFit, FitError> {
    let win = thermal_window(dnde, 10);
    let first = fit_maxwellian(ebins, dnde, win.clone())?;

    let residual: Vec<f64> = ebins
        .iter()
        .zip(dnde)
        .map(|(&e, &f)| (f - first.eval(e)).max(0.0))
        .collect();

    // The residual peak sits above the core; extend the second window
    // past it so the exponential falloff constrains the fit.
    let smoothed = smooth_1d(&residual, 3);
    let ipeak2 = argmax(&smoothed);
    let end = (ipeak2 + 21).min(ebins.len());
    let start = win.end.saturating_sub(10).min(ipeak2);
    let second = fit_maxwellian(ebins, &residual, start..end)?;

    let (cold, hot) = if first.temperature() <= second.temperature() {
        (first, second)
    } else {
        (second, first)
    };
    let (nonthermal_fraction, rel_err) = summed_fit_errors(ebins, dnde, &cold, &hot);
    Ok(TwoMaxwellianFit {
        cold,
        hot,
        nonthermal_fraction,
        rel_err,
    })
}

/// A fitted power law f(E) = amp * E^index.
#[derive(Debug, Clone, Copy)]
pub struct PowerLawFit {
    pub amp: f64,
    pub index: f64,
}

/// Fit a power law to the tail of a spectrum over `range`.
pub fn fit_power_law(
    ebins: &[f64],
    dnde: &[f64],
    range: std::ops::Range<usize>,
) -> Result<PowerLawFit, FitError> {
    let pts: Vec<(f64, f64)> = range
        .filter(|&i| dnde[i] > 0.0 && ebins[i] > 0.0)
        .map(|i| (ebins[i].ln(), dnde[i].ln()))
        .collect();
    if pts.len() < 2 {
        return Err(FitError::TooFewPoints(pts.len()));
    }
    let (slope, intercept) = linear_fit(pts.into_iter())?;
    Ok(PowerLawFit {
        amp: intercept.exp(),
        index: slope,
    })
}

/// Ordinary least squares y = slope * x + intercept.
fn linear_fit(pts: impl Iterator<Item = (f64, f64)>) -> Result<(f64, f64), FitError> {
    let (mut n, mut sx, mut sy, mut sxx, mut sxy) = (0.0, 0.0, 0.0, 0.0, 0.0);
    for (x, y) in pts {
        n += 1.0;
        sx += x;
        sy += y;
        sxx += x * x;
        sxy += x * y;
    }
    let det = n * sxx - sx * sx;
    if det.abs() < 1e-300 {
        return Err(FitError::Singular);
    }
    let slope = (n * sxy - sx * sy) / det;
    let intercept = (sy - slope * sx) / n;
    Ok((slope, intercept))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spectrum::LogBins;

    fn maxwellian_samples(amp: f64, temp: f64, bins: &LogBins) -> (Vec<f64>, Vec<f64>) {
        let b = 0.5 / temp;
        let e = bins.centers();
        let f = e.iter().map(|&e| amp * e.sqrt() * (-b * e).exp()).collect();
        (e, f)
    }

    #[test]
    fn recovers_exact_maxwellian() {
        let bins = LogBins::new(1e-4, 1.0, 80);
        let (e, f) = maxwellian_samples(10.0, 0.02, &bins);
        let fit = fit_maxwellian(&e, &f, 0..e.len()).unwrap();
        assert!((fit.temperature() - 0.02).abs() / 0.02 < 1e-6);
        assert!((fit.amp - 10.0).abs() / 10.0 < 1e-6);
    }

    #[test]
    fn thermal_window_ends_past_the_peak() {
        let bins = LogBins::new(1e-4, 1.0, 80);
        let (_, f) = maxwellian_samples(10.0, 0.02, &bins);
        let win = thermal_window(&f, 10);
        assert!(win.start == 0);
        assert!(win.end <= f.len());
        // The peak itself must be inside the window.
        let ipeak = f
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .unwrap()
            .0;
        assert!(win.contains(&ipeak));
    }

    #[test]
    fn two_maxwellian_split_orders_temperatures() {
        let bins = LogBins::new(1e-4, 10.0, 120);
        let (e, cold) = maxwellian_samples(100.0, 0.01, &bins);
        let (_, hot) = maxwellian_samples(5.0, 0.2, &bins);
        let f: Vec<f64> = cold.iter().zip(&hot).map(|(a, b)| a + b).collect();
        let fit = fit_two_maxwellians(&e, &f).unwrap();
        assert!(fit.cold.temperature() < fit.hot.temperature());
        assert!(fit.cold.temperature() > 0.0);
        // The cold core dominates its window, so its temperature is close.
        let rel = (fit.cold.temperature() - 0.01).abs() / 0.01;
        assert!(rel < 0.5, "cold T off by {}", rel);
    }

    #[test]
    fn summed_fit_errors_vanish_for_an_exact_two_component_spectrum() {
        let bins = LogBins::new(1e-4, 10.0, 100);
        let cold = MaxwellianFit { amp: 100.0, b: 0.5 / 0.01 };
        let hot = MaxwellianFit { amp: 5.0, b: 0.5 / 0.2 };
        let e = bins.centers();
        let f: Vec<f64> = e.iter().map(|&e| cold.eval(e) + hot.eval(e)).collect();

        let (fraction, rel_err) = summed_fit_errors(&e, &f, &cold, &hot);
        assert!(fraction.abs() < 1e-12);
        assert_eq!(rel_err.len(), e.len());
        assert!(rel_err.iter().all(|&r| r < 1e-12));

        // Doubling the spectrum leaves half of it unexplained.
        let f2: Vec<f64> = f.iter().map(|&v| 2.0 * v).collect();
        let (fraction2, rel_err2) = summed_fit_errors(&e, &f2, &cold, &hot);
        assert!((fraction2 - 0.5).abs() < 1e-12);
        assert!(rel_err2.iter().all(|&r| (r - 0.5).abs() < 1e-12));
    }

    #[test]
    fn two_maxwellian_fit_reports_its_residual_diagnostics() {
        let bins = LogBins::new(1e-4, 10.0, 120);
        let (e, cold) = maxwellian_samples(100.0, 0.01, &bins);
        let (_, hot) = maxwellian_samples(5.0, 0.2, &bins);
        let f: Vec<f64> = cold.iter().zip(&hot).map(|(a, b)| a + b).collect();
        let fit = fit_two_maxwellians(&e, &f).unwrap();
        assert_eq!(fit.rel_err.len(), e.len());
        assert!(fit.nonthermal_fraction >= 0.0);
        assert!(fit.nonthermal_fraction < 0.5);
    }

    #[test]
    fn power_law_index_is_recovered() {
        let bins = LogBins::new(0.1, 10.0, 40);
        let e = bins.centers();
        let f: Vec<f64> = e.iter().map(|&e| 3.0 * e.powf(-2.5)).collect();
        let fit = fit_power_law(&e, &f, 0..e.len()).unwrap();
        assert!((fit.index + 2.5).abs() < 1e-9);
        assert!((fit.amp - 3.0).abs() / 3.0 < 1e-9);
    }

    #[test]
    fn degenerate_input_is_rejected() {
        let e = vec![1.0, 2.0, 3.0];
        let f = vec![0.0, 0.0, 0.0];
        assert!(matches!(
            fit_maxwellian(&e, &f, 0..3),
            Err(FitError::TooFewPoints(_))
        ));
    }
}
