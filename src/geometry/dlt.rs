//! Transform estimation from point correspondences.

use super::{Homography, Point};
use nalgebra as na;

/// Hartley normalisation: translate to the centroid and scale so the mean
/// distance from it is `sqrt(2)`.
fn normalize_points(pts: &[Point]) -> (Vec<Point>, na::Matrix3<f64>) {
    let n = pts.len() as f64;
    let (mut cx, mut cy) = (0.0, 0.0);
    for p in pts {
        cx += p.x;
        cy += p.y;
    }
    cx /= n;
    cy /= n;

    let mut mean_dist = 0.0;
    for p in pts {
        mean_dist += ((p.x - cx).powi(2) + (p.y - cy).powi(2)).sqrt();
    }
    mean_dist /= n;
    let s = if mean_dist > 1e-12 {
        2.0_f64.sqrt() / mean_dist
    } else {
        1.0
    };

    let t = na::Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0);
    let out = pts
        .iter()
        .map(|p| {
            let v = t * na::Vector3::new(p.x, p.y, 1.0);
            Point::new(v[0], v[1])
        })
        .collect();
    (out, t)
}

/// Estimates `H` such that `dst ~ H * src` with the normalised DLT.
///
/// Needs at least four correspondences; returns `None` when the input is
/// degenerate (for example three of four points collinear).
pub fn estimate_homography(src: &[Point], dst: &[Point]) -> Option<Homography> {
    if src.len() != dst.len() || src.len() < 4 {
        return None;
    }

    let (s, ts) = normalize_points(src);
    let (d, td) = normalize_points(dst);

    // Pad to at least 9 rows so the thin SVD still yields the full V^T.
    let n = src.len();
    let rows = (2 * n).max(9);
    let mut a = na::DMatrix::<f64>::zeros(rows, 9);
    for k in 0..n {
        let (x, y) = (s[k].x, s[k].y);
        let (u, v) = (d[k].x, d[k].y);

        a[(2 * k, 0)] = -x;
        a[(2 * k, 1)] = -y;
        a[(2 * k, 2)] = -1.0;
        a[(2 * k, 6)] = u * x;
        a[(2 * k, 7)] = u * y;
        a[(2 * k, 8)] = u;

        a[(2 * k + 1, 3)] = -x;
        a[(2 * k + 1, 4)] = -y;
        a[(2 * k + 1, 5)] = -1.0;
        a[(2 * k + 1, 6)] = v * x;
        a[(2 * k + 1, 7)] = v * y;
        a[(2 * k + 1, 8)] = v;
    }

    let svd = a.svd(false, true);
    let sv = &svd.singular_values;
    // A one-dimensional null space is required for a unique solution.
    if sv[0] <= 0.0 || sv[7] <= 1e-9 * sv[0] {
        return None;
    }
    let vt = svd.v_t?;
    let h = vt.row(8);
    let hn = na::Matrix3::from_row_slice(&[h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]]);

    // Denormalise: H = Td^-1 * Hn * Ts
    let td_inv = td.try_inverse()?;
    let h_den = td_inv * hn * ts;
    if h_den[(2, 2)].abs() < 1e-12 {
        return None;
    }
    let homography = Homography::from_matrix(h_den)?;
    homography.inverse()?;
    Some(homography)
}

/// Estimates an affine map `dst ~ A * src` by linear least squares.
///
/// Needs at least three non-collinear correspondences.
pub fn estimate_affine(src: &[Point], dst: &[Point]) -> Option<Homography> {
    if src.len() != dst.len() || src.len() < 3 {
        return None;
    }

    let n = src.len();
    let mut a = na::DMatrix::<f64>::zeros(2 * n, 6);
    let mut b = na::DVector::<f64>::zeros(2 * n);
    for k in 0..n {
        let (x, y) = (src[k].x, src[k].y);
        a[(2 * k, 0)] = x;
        a[(2 * k, 1)] = y;
        a[(2 * k, 2)] = 1.0;
        a[(2 * k + 1, 3)] = x;
        a[(2 * k + 1, 4)] = y;
        a[(2 * k + 1, 5)] = 1.0;
        b[2 * k] = dst[k].x;
        b[2 * k + 1] = dst[k].y;
    }

    let svd = a.svd(true, true);
    let sv = &svd.singular_values;
    if sv[0] <= 0.0 || sv[5] <= 1e-9 * sv[0] {
        return None;
    }
    let p = svd.solve(&b, 1e-12).ok()?;
    let m = na::Matrix3::new(p[0], p[1], p[2], p[3], p[4], p[5], 0.0, 0.0, 1.0);
    let affine = Homography::from_matrix(m)?;
    affine.inverse()?;
    Some(affine)
}
