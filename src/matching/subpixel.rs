//! Subpixel peak refinement with separable quadratic fits.

/// Estimates the sub-sample peak offset for a quadratic fit.
///
/// Given samples at `x = -1, 0, +1` (`fm`, `f0`, `fp`), this returns the peak
/// offset in `[-1, 1]` when the fitted parabola is concave and stable.
pub(crate) fn quad_peak_offset_1d(fm: f32, f0: f32, fp: f32) -> Option<f32> {
    if !fm.is_finite() || !f0.is_finite() || !fp.is_finite() {
        return None;
    }

    let denom = fm - 2.0 * f0 + fp;
    if denom.abs() < 1e-6 || denom >= 0.0 {
        return None;
    }

    let dx = 0.5 * (fm - fp) / denom;
    if dx.is_finite() && dx.abs() <= 1.0 {
        Some(dx)
    } else {
        None
    }
}

/// Refines a peak from the 3x3 score neighbourhood `s` centred at `s[1][1]`.
///
/// `dx` comes from the centre row and `dy` from the centre column; an
/// ill-conditioned axis keeps the integer position.
pub(crate) fn refine_subpixel_2d(center_x: usize, center_y: usize, s: [[f32; 3]; 3]) -> (f64, f64) {
    let dx = quad_peak_offset_1d(s[1][0], s[1][1], s[1][2]).unwrap_or(0.0);
    let dy = quad_peak_offset_1d(s[0][1], s[1][1], s[2][1]).unwrap_or(0.0);
    (
        center_x as f64 + f64::from(dx),
        center_y as f64 + f64::from(dy),
    )
}
