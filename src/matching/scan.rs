//! ZNCC evaluation over translation ranges.
//!
//! Scores are `dot / sqrt(var_t * var_i)` where `dot` correlates the
//! zero-mean patch with the image window. Windows whose variance is at most
//! `min_var_i` score `-inf` and can never become peaks.

use crate::image::ImageView;
use crate::matching::peak::{Peak, TopK};
use crate::matching::plan::PatchPlan;
#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Inclusive range of top-left positions to evaluate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct ScanRange {
    pub(crate) x0: usize,
    pub(crate) y0: usize,
    pub(crate) x1: usize,
    pub(crate) y1: usize,
}

impl ScanRange {
    /// Every valid position of `plan` inside `image`, if the patch fits.
    pub(crate) fn full(image: ImageView<'_, u8>, plan: &PatchPlan) -> Option<Self> {
        let max_x = image.width().checked_sub(plan.width())?;
        let max_y = image.height().checked_sub(plan.height())?;
        Some(Self {
            x0: 0,
            y0: 0,
            x1: max_x,
            y1: max_y,
        })
    }

    /// A square window of `radius` around `(x, y)`, clipped to `full`.
    pub(crate) fn around(x: usize, y: usize, radius: usize, full: ScanRange) -> Option<Self> {
        let x0 = x.saturating_sub(radius).max(full.x0);
        let y0 = y.saturating_sub(radius).max(full.y0);
        let x1 = x.saturating_add(radius).min(full.x1);
        let y1 = y.saturating_add(radius).min(full.y1);
        if x0 > x1 || y0 > y1 {
            return None;
        }
        Some(Self { x0, y0, x1, y1 })
    }

    fn width(&self) -> usize {
        self.x1 - self.x0 + 1
    }

    fn height(&self) -> usize {
        self.y1 - self.y0 + 1
    }
}

/// Dense scores over a scan range.
pub(crate) struct ScoreMap {
    range: ScanRange,
    scores: Vec<f32>,
}

impl ScoreMap {
    /// Score at absolute position `(x, y)`; `-inf` outside the range.
    pub(crate) fn get(&self, x: usize, y: usize) -> f32 {
        let r = &self.range;
        if x < r.x0 || x > r.x1 || y < r.y0 || y > r.y1 {
            return f32::NEG_INFINITY;
        }
        self.scores[(y - r.y0) * r.width() + (x - r.x0)]
    }

    /// Best position of the map, ties broken towards the top-left.
    pub(crate) fn best(&self) -> Option<Peak> {
        let mut top = TopK::new(1);
        self.for_each_finite(|peak| top.push(peak));
        top.into_sorted_desc().into_iter().next()
    }

    /// 3x3 local maxima (plateaus included) scoring at least `min_score`,
    /// truncated to the best `k`.
    pub(crate) fn local_maxima(&self, min_score: f32, k: usize) -> Vec<Peak> {
        let mut top = TopK::new(k);
        self.for_each_finite(|peak| {
            if peak.score < min_score {
                return;
            }
            let is_max = (-1isize..=1).all(|dy| {
                (-1isize..=1).all(|dx| {
                    let (nx, ny) = (peak.x as isize + dx, peak.y as isize + dy);
                    if (dx == 0 && dy == 0) || nx < 0 || ny < 0 {
                        return true;
                    }
                    self.get(nx as usize, ny as usize) <= peak.score
                })
            });
            if is_max {
                top.push(peak);
            }
        });
        top.into_sorted_desc()
    }

    fn for_each_finite(&self, mut f: impl FnMut(Peak)) {
        let r = self.range;
        for (row_idx, row) in self.scores.chunks(r.width()).enumerate() {
            for (col_idx, &score) in row.iter().enumerate() {
                if score.is_finite() {
                    f(Peak {
                        x: r.x0 + col_idx,
                        y: r.y0 + row_idx,
                        score,
                    });
                }
            }
        }
    }
}

/// ZNCC of the plan placed with its top-left at `(x, y)`.
pub(crate) fn score_at(
    image: ImageView<'_, u8>,
    plan: &PatchPlan,
    x: usize,
    y: usize,
    min_var_i: f32,
) -> f32 {
    let (tpl_width, tpl_height) = (plan.width(), plan.height());
    if x + tpl_width > image.width() || y + tpl_height > image.height() {
        return f32::NEG_INFINITY;
    }

    let t_prime = plan.t_prime();
    let n = (tpl_width * tpl_height) as f32;
    let mut dot = 0.0f32;
    let mut sum_i = 0.0f32;
    let mut sum_i2 = 0.0f32;
    for ty in 0..tpl_height {
        let Some(img_row) = image.row(y + ty) else {
            return f32::NEG_INFINITY;
        };
        let base = ty * tpl_width;
        for (tx, &value) in img_row[x..x + tpl_width].iter().enumerate() {
            let value = f32::from(value);
            dot += t_prime[base + tx] * value;
            sum_i += value;
            sum_i2 += value * value;
        }
    }

    let var_i = sum_i2 - (sum_i * sum_i) / n;
    if var_i <= min_var_i {
        return f32::NEG_INFINITY;
    }
    let score = dot / (plan.var_t() * var_i).sqrt();
    if score.is_finite() {
        score
    } else {
        f32::NEG_INFINITY
    }
}

fn scan_row(
    image: ImageView<'_, u8>,
    plan: &PatchPlan,
    range: ScanRange,
    y: usize,
    min_var_i: f32,
    out: &mut [f32],
) {
    for (slot, x) in out.iter_mut().zip(range.x0..=range.x1) {
        *slot = score_at(image, plan, x, y, min_var_i);
    }
}

/// Scores every position of `range`.
pub(crate) fn scan(
    image: ImageView<'_, u8>,
    plan: &PatchPlan,
    range: ScanRange,
    min_var_i: f32,
) -> ScoreMap {
    let width = range.width();
    let mut scores = vec![f32::NEG_INFINITY; width * range.height()];
    for (row_idx, row) in scores.chunks_mut(width).enumerate() {
        scan_row(image, plan, range, range.y0 + row_idx, min_var_i, row);
    }
    ScoreMap { range, scores }
}

/// Row-parallel variant of [`scan`]; produces an identical map.
#[cfg(feature = "rayon")]
pub(crate) fn scan_par(
    image: ImageView<'_, u8>,
    plan: &PatchPlan,
    range: ScanRange,
    min_var_i: f32,
) -> ScoreMap {
    let width = range.width();
    let mut scores = vec![f32::NEG_INFINITY; width * range.height()];
    scores
        .par_chunks_mut(width)
        .enumerate()
        .for_each(|(row_idx, row)| {
            scan_row(image, plan, range, range.y0 + row_idx, min_var_i, row);
        });
    ScoreMap { range, scores }
}
