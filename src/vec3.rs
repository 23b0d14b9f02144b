// src/vec3.rs
//
// Small [f64; 3] helpers for field-aligned decompositions. Fields and
// momenta are carried as plain arrays; everything that needs a direction
// goes through the unit magnetic field vector from `field_dir`.

/// 3D vector dot product.
#[inline]
pub fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

/// Euclidean norm of a 3D vector.
#[inline]
pub fn norm(v: [f64; 3]) -> f64 {
    dot(v, v).sqrt()
}

/// Unit direction of a magnetic field sample. A vanishing field falls
/// back to z, the out-of-plane guide-field axis.
#[inline]
pub fn field_dir(b: [f64; 3]) -> [f64; 3] {
    let n2 = dot(b, b);
    if n2 == 0.0 {
        return [0.0, 0.0, 1.0];
    }
    let inv = 1.0 / n2.sqrt();
    [b[0] * inv, b[1] * inv, b[2] * inv]
}

/// Split a vector along a unit field direction: (parallel, perpendicular).
/// The parallel part is signed; the perpendicular magnitude clamps the
/// radicand at zero against rounding.
#[inline]
pub fn para_perp(v: [f64; 3], bhat: [f64; 3]) -> (f64, f64) {
    let para = dot(v, bhat);
    let perp = (dot(v, v) - para * para).max(0.0).sqrt();
    (para, perp)
}
