//! Patch plan precomputation for ZNCC.

use crate::image::ImageView;

/// Zero-mean patch buffer and its variance term.
pub(crate) struct PatchPlan {
    width: usize,
    height: usize,
    var_t: f32,
    t_prime: Vec<f32>,
}

impl PatchPlan {
    /// Builds a plan; `None` if the patch has no intensity variation.
    pub(crate) fn from_view(patch: ImageView<'_, u8>) -> Option<Self> {
        let width = patch.width();
        let height = patch.height();
        let count = width.checked_mul(height)?;

        let mut sum = 0.0f64;
        let mut sum_sq = 0.0f64;
        for y in 0..height {
            for &value in patch.row(y)? {
                let v = f64::from(value);
                sum += v;
                sum_sq += v * v;
            }
        }

        let count_f = count as f64;
        let mean = sum / count_f;
        let var_t = sum_sq - sum * mean;
        if var_t <= 1e-8 * count_f {
            return None;
        }

        let mut t_prime = Vec::with_capacity(count);
        for y in 0..height {
            for &value in patch.row(y)? {
                t_prime.push((f64::from(value) - mean) as f32);
            }
        }

        Some(Self {
            width,
            height,
            var_t: var_t as f32,
            t_prime,
        })
    }

    pub(crate) fn width(&self) -> usize {
        self.width
    }

    pub(crate) fn height(&self) -> usize {
        self.height
    }

    /// Sum of squared deviations from the patch mean.
    pub(crate) fn var_t(&self) -> f32 {
        self.var_t
    }

    /// Zero-mean patch in row-major order.
    pub(crate) fn t_prime(&self) -> &[f32] {
        &self.t_prime
    }
}
