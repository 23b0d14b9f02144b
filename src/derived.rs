// src/derived.rs
//
// Derived quantities computed cell-wise from field slices: agyrotropy,
// parallel/perpendicular decompositions, magnetic curvature, |B| gradient
// and j.E. All inputs live on the same window grid; outputs share it.

use crate::scalar_field::ScalarField2D;
use crate::vec3;

/// The six independent components of a species pressure tensor slice.
pub struct PressureTensor {
    pub xx: ScalarField2D,
    pub yy: ScalarField2D,
    pub zz: ScalarField2D,
    pub xy: ScalarField2D,
    pub xz: ScalarField2D,
    pub yz: ScalarField2D,
}

#[inline]
fn b_at(b: &[ScalarField2D; 3], n: usize) -> [f64; 3] {
    [b[0].data[n], b[1].data[n], b[2].data[n]]
}

/// Scalar agyrotropy measure A0 of Scudder & Daughton.
///
/// Built from the nilpotent tensor N = b x P x b: with alpha = tr N and
/// beta its second invariant, A0 = 2 sqrt(alpha^2 - 4 beta) / alpha.
/// A0 = 0 for a gyrotropic pressure tensor and approaches 2 for a fully
/// agyrotropic one.
pub fn agyrotropy(b: &[ScalarField2D; 3], p: &PressureTensor) -> ScalarField2D {
    let grid = p.xx.grid;
    let mut out = ScalarField2D::zeros(grid);
    for n in 0..out.data.len() {
        let [bx, by, bz] = vec3::field_dir(b_at(b, n));
        let (pxx, pyy, pzz) = (p.xx.data[n], p.yy.data[n], p.zz.data[n]);
        let (pxy, pxz, pyz) = (p.xy.data[n], p.xz.data[n], p.yz.data[n]);

        let nxx = by * by * pzz - 2.0 * by * bz * pyz + bz * bz * pyy;
        let nxy = -by * bx * pzz + by * bz * pxz + bz * bx * pyz - bz * bz * pxy;
        let nxz = by * bx * pyz - by * by * pxz - bz * bx * pyy + bz * by * pxy;
        let nyy = bx * bx * pzz - 2.0 * bx * bz * pxz + bz * bz * pxx;
        let nyz = -bx * bx * pyz + bx * by * pxz + bz * bx * pxy - bz * by * pxx;
        let nzz = bx * bx * pyy - 2.0 * bx * by * pxy + by * by * pxx;

        let alpha = nxx + nyy + nzz;
        let beta = -(nxy * nxy + nxz * nxz + nyz * nyz
            - nxx * nyy
            - nxx * nzz
            - nyy * nzz);
        let disc = (alpha * alpha - 4.0 * beta).max(0.0);
        out.data[n] = if alpha != 0.0 {
            2.0 * disc.sqrt() / alpha
        } else {
            0.0
        };
    }
    out
}

/// Split E into its field-aligned and perpendicular magnitudes.
///
/// Epara is signed ((E.B)/|B|); Eperp = sqrt(|E|^2 - Epara^2) with the
/// radicand clamped at zero against rounding.
pub fn epara_eperp(
    e: &[ScalarField2D; 3],
    b: &[ScalarField2D; 3],
) -> (ScalarField2D, ScalarField2D) {
    let grid = e[0].grid;
    let mut para = ScalarField2D::zeros(grid);
    let mut perp = ScalarField2D::zeros(grid);
    for n in 0..para.data.len() {
        let ev = [e[0].data[n], e[1].data[n], e[2].data[n]];
        let bhat = vec3::field_dir(b_at(b, n));
        let (ep, eperp) = vec3::para_perp(ev, bhat);
        para.data[n] = ep;
        perp.data[n] = eperp;
    }
    (para, perp)
}

/// Parallel and perpendicular pressure from the full tensor:
/// ppara = b.P.b, pperp = (tr P - ppara) / 2.
pub fn ppara_pperp(
    b: &[ScalarField2D; 3],
    p: &PressureTensor,
) -> (ScalarField2D, ScalarField2D) {
    let grid = p.xx.grid;
    let mut para = ScalarField2D::zeros(grid);
    let mut perp = ScalarField2D::zeros(grid);
    for n in 0..para.data.len() {
        let [bx, by, bz] = vec3::field_dir(b_at(b, n));
        let ppara = bx * bx * p.xx.data[n]
            + by * by * p.yy.data[n]
            + bz * bz * p.zz.data[n]
            + 2.0 * bx * by * p.xy.data[n]
            + 2.0 * bx * bz * p.xz.data[n]
            + 2.0 * by * bz * p.yz.data[n];
        let trace = p.xx.data[n] + p.yy.data[n] + p.zz.data[n];
        para.data[n] = ppara;
        perp.data[n] = 0.5 * (trace - ppara);
    }
    (para, perp)
}

/// Magnetic curvature as the curl of B / |B|^2 on a 2D x-z slice. Only
/// in-plane derivatives exist (d/dy = 0), so
/// kx = -dz(By/B^2), ky = dz(Bx/B^2) + dx(Bz/B^2), kz = dx(By/B^2).
pub fn curvature_b(b: &[ScalarField2D; 3]) -> [ScalarField2D; 3] {
    let grid = b[0].grid;
    // Components scaled by 1 / |B|^2; zero where the field vanishes.
    let mut scaled = [
        ScalarField2D::zeros(grid),
        ScalarField2D::zeros(grid),
        ScalarField2D::zeros(grid),
    ];
    for n in 0..b[0].data.len() {
        let bv = b_at(b, n);
        let b2 = vec3::dot(bv, bv);
        if b2 > 0.0 {
            for c in 0..3 {
                scaled[c].data[n] = bv[c] / b2;
            }
        }
    }

    let kx = scaled[1].diff_z().map(|v| -v);
    let ky = scaled[0]
        .diff_z()
        .zip_with(&scaled[2].diff_x(), |a, c| a + c);
    let kz = scaled[1].diff_x();
    [kx, ky, kz]
}

/// Magnitude of a vector field, cell-wise.
pub fn magnitude(v: &[ScalarField2D; 3]) -> ScalarField2D {
    let grid = v[0].grid;
    let mut out = ScalarField2D::zeros(grid);
    for n in 0..out.data.len() {
        out.data[n] = vec3::norm([v[0].data[n], v[1].data[n], v[2].data[n]]);
    }
    out
}

/// In-plane gradient of |B|, normalised by b0. Returns the two gradient
/// components and the magnitude |grad |B|| / b0.
pub fn grad_b(
    b: &[ScalarField2D; 3],
    b0: f64,
) -> (ScalarField2D, ScalarField2D, ScalarField2D) {
    let bmag = magnitude(b);
    let gx = bmag.diff_x().map(|v| v / b0);
    let gz = bmag.diff_z().map(|v| v / b0);
    let mag = gx.zip_with(&gz, |a, c| (a * a + c * c).sqrt());
    (gx, gz, mag)
}

/// Energy conversion rate j.E and its field-aligned split.
pub struct JdotE {
    pub total: ScalarField2D,
    pub para: ScalarField2D,
    pub perp: ScalarField2D,
}

/// Compute j.E from a species current density and the electric field.
/// The parallel part is (j.b)(E.b) with b the unit field direction; the
/// perpendicular part is the remainder.
pub fn jdote(
    j: &[ScalarField2D; 3],
    e: &[ScalarField2D; 3],
    b: &[ScalarField2D; 3],
) -> JdotE {
    let grid = j[0].grid;
    let mut total = ScalarField2D::zeros(grid);
    let mut para = ScalarField2D::zeros(grid);
    let mut perp = ScalarField2D::zeros(grid);
    for n in 0..total.data.len() {
        let jv = [j[0].data[n], j[1].data[n], j[2].data[n]];
        let ev = [e[0].data[n], e[1].data[n], e[2].data[n]];
        let bu = vec3::field_dir(b_at(b, n));
        let t = vec3::dot(jv, ev);
        let p = vec3::dot(jv, bu) * vec3::dot(ev, bu);
        total.data[n] = t;
        para.data[n] = p;
        perp.data[n] = t - p;
    }
    JdotE { total, para, perp }
}

/// Current density j = q n v for one species, cell-wise.
pub fn current_density(
    charge: f64,
    number_density: &ScalarField2D,
    v: &[ScalarField2D; 3],
) -> [ScalarField2D; 3] {
    let mut out = [v[0].clone(), v[1].clone(), v[2].clone()];
    for c in 0..3 {
        for n in 0..out[c].data.len() {
            out[c].data[n] = charge * number_density.data[n] * v[c].data[n];
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Grid2D;

    fn uniform(grid: Grid2D, v: f64) -> ScalarField2D {
        ScalarField2D::zeros(grid).map(|_| v)
    }

    fn grid() -> Grid2D {
        Grid2D::new(8, 8, 0.5, 0.5, 0.0, -2.0)
    }

    #[test]
    fn gyrotropic_tensor_has_zero_agyrotropy() {
        let g = grid();
        // B along z, pressure diagonal with pxx = pyy (gyrotropic about z).
        let b = [uniform(g, 0.0), uniform(g, 0.0), uniform(g, 1.0)];
        let p = PressureTensor {
            xx: uniform(g, 2.0),
            yy: uniform(g, 2.0),
            zz: uniform(g, 5.0),
            xy: uniform(g, 0.0),
            xz: uniform(g, 0.0),
            yz: uniform(g, 0.0),
        };
        let a = agyrotropy(&b, &p);
        for &v in &a.data {
            assert!(v.abs() < 1e-12, "A0 = {}", v);
        }
    }

    #[test]
    fn anisotropic_perpendicular_pressure_is_agyrotropic() {
        let g = grid();
        let b = [uniform(g, 0.0), uniform(g, 0.0), uniform(g, 1.0)];
        let p = PressureTensor {
            xx: uniform(g, 3.0),
            yy: uniform(g, 1.0),
            zz: uniform(g, 1.0),
            xy: uniform(g, 0.0),
            xz: uniform(g, 0.0),
            yz: uniform(g, 0.0),
        };
        let a = agyrotropy(&b, &p);
        // alpha = pxx + pyy = 4, beta = pxx * pyy = 3,
        // A0 = 2 sqrt(16 - 12) / 4 = 1.
        for &v in &a.data {
            assert!((v - 1.0).abs() < 1e-12, "A0 = {}", v);
        }
    }

    #[test]
    fn epara_picks_out_the_aligned_component() {
        let g = grid();
        let e = [uniform(g, 3.0), uniform(g, 0.0), uniform(g, 4.0)];
        let b = [uniform(g, 0.0), uniform(g, 0.0), uniform(g, 2.0)];
        let (para, perp) = epara_eperp(&e, &b);
        for n in 0..para.data.len() {
            assert!((para.data[n] - 4.0).abs() < 1e-12);
            assert!((perp.data[n] - 3.0).abs() < 1e-12);
        }
    }

    #[test]
    fn pressure_split_recovers_trace() {
        let g = grid();
        let b = [uniform(g, 1.0), uniform(g, 0.0), uniform(g, 0.0)];
        let p = PressureTensor {
            xx: uniform(g, 4.0),
            yy: uniform(g, 2.0),
            zz: uniform(g, 2.0),
            xy: uniform(g, 0.0),
            xz: uniform(g, 0.0),
            yz: uniform(g, 0.0),
        };
        let (para, perp) = ppara_pperp(&b, &p);
        for n in 0..para.data.len() {
            assert!((para.data[n] - 4.0).abs() < 1e-12);
            assert!((perp.data[n] - 2.0).abs() < 1e-12);
            let trace = para.data[n] + 2.0 * perp.data[n];
            assert!((trace - 8.0).abs() < 1e-12);
        }
    }

    #[test]
    fn straight_field_has_zero_curvature() {
        let g = grid();
        let b = [uniform(g, 0.0), uniform(g, 0.0), uniform(g, 0.7)];
        let kappa = curvature_b(&b);
        for c in 0..3 {
            for &v in &kappa[c].data {
                assert!(v.abs() < 1e-12);
            }
        }
    }

    #[test]
    fn sheared_in_plane_field_has_no_x_curvature() {
        // B = (z, 0, 1): By = 0, so By / B^2 vanishes identically and the
        // x component of curl(B / B^2) must be exactly zero everywhere.
        let g = grid();
        let mut bx = ScalarField2D::zeros(g);
        for k in 0..g.nz {
            for i in 0..g.nx {
                let idx = bx.idx(i, k);
                bx.data[idx] = g.z_at(k);
            }
        }
        let b = [bx, uniform(g, 0.0), uniform(g, 1.0)];
        let kappa = curvature_b(&b);
        for &v in &kappa[0].data {
            assert!(v.abs() < 1e-15, "kappa_x = {}", v);
        }
        // ky = dz(Bx / B^2) is nonzero away from z = 0.
        assert!(kappa[1].data.iter().any(|&v| v.abs() > 1e-6));
    }

    #[test]
    fn out_of_plane_gradient_gives_exact_curl_components() {
        // B = (0, 1/(1+x), 0): By / B^2 = 1 + x, so kz = dx(By/B^2) = 1
        // exactly under the forward difference, and kx = 0.
        let g = grid();
        let mut by = ScalarField2D::zeros(g);
        for k in 0..g.nz {
            for i in 0..g.nx {
                let idx = by.idx(i, k);
                by.data[idx] = 1.0 / (1.0 + g.x_at(i));
            }
        }
        let b = [uniform(g, 0.0), by, uniform(g, 0.0)];
        let kappa = curvature_b(&b);
        for &v in &kappa[2].data {
            assert!((v - 1.0).abs() < 1e-12, "kappa_z = {}", v);
        }
        for &v in &kappa[0].data {
            assert!(v.abs() < 1e-12);
        }

        // B = (0, 1/(3+z), 0): By / B^2 = 3 + z, kx = -dz(By/B^2) = -1.
        let mut by_z = ScalarField2D::zeros(g);
        for k in 0..g.nz {
            for i in 0..g.nx {
                let idx = by_z.idx(i, k);
                by_z.data[idx] = 1.0 / (3.0 + g.z_at(k));
            }
        }
        let b = [uniform(g, 0.0), by_z, uniform(g, 0.0)];
        let kappa = curvature_b(&b);
        for &v in &kappa[0].data {
            assert!((v + 1.0).abs() < 1e-12, "kappa_x = {}", v);
        }
    }

    #[test]
    fn grad_b_of_linear_ramp() {
        let g = grid();
        let mut bz = ScalarField2D::zeros(g);
        for k in 0..g.nz {
            for i in 0..g.nx {
                let idx = bz.idx(i, k);
                bz.data[idx] = 1.0 + 0.5 * g.x_at(i);
            }
        }
        let b = [uniform(g, 0.0), uniform(g, 0.0), bz];
        let (gx, _gz, mag) = grad_b(&b, 2.0);
        // d|B|/dx = 0.5, normalised by b0 = 2.
        for k in 0..g.nz {
            for i in 0..g.nx {
                assert!((gx.at(i, k) - 0.25).abs() < 1e-12);
                assert!((mag.at(i, k) - 0.25).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn jdote_split_sums_to_total() {
        let g = grid();
        let j = [uniform(g, 1.0), uniform(g, 2.0), uniform(g, -1.0)];
        let e = [uniform(g, 0.5), uniform(g, -0.5), uniform(g, 1.0)];
        let b = [uniform(g, 1.0), uniform(g, 1.0), uniform(g, 0.0)];
        let d = jdote(&j, &e, &b);
        for n in 0..d.total.data.len() {
            let sum = d.para.data[n] + d.perp.data[n];
            assert!((sum - d.total.data[n]).abs() < 1e-12);
        }
        // j.E = 0.5 - 1.0 - 1.0 = -1.5
        assert!((d.total.data[0] + 1.5).abs() < 1e-12);
    }

    #[test]
    fn current_density_scales_velocity() {
        let g = grid();
        let n = uniform(g, 2.0);
        let v = [uniform(g, 0.5), uniform(g, 0.0), uniform(g, -0.5)];
        let j = current_density(-1.0, &n, &v);
        assert!((j[0].data[0] + 1.0).abs() < 1e-12);
        assert!((j[2].data[0] - 1.0).abs() < 1e-12);
    }
}
