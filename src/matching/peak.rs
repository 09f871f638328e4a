//! Score peaks, top-K tracking and non-maximum suppression.

use std::cmp::Ordering;

/// Peak candidate at a pyramid level; `(x, y)` is the patch's top-left.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Peak {
    pub(crate) x: usize,
    pub(crate) y: usize,
    pub(crate) score: f32,
}

fn peak_cmp_desc(a: &Peak, b: &Peak) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.y.cmp(&b.y))
        .then_with(|| a.x.cmp(&b.x))
}

/// Sorts peaks by descending score with deterministic tie-breaking.
pub(crate) fn sort_peaks_desc(peaks: &mut [Peak]) {
    peaks.sort_by(peak_cmp_desc);
}

/// Top-K container with O(k) insertion cost.
pub(crate) struct TopK {
    k: usize,
    items: Vec<Peak>,
}

impl TopK {
    pub(crate) fn new(k: usize) -> Self {
        Self {
            k,
            items: Vec::with_capacity(k),
        }
    }

    /// Pushes a peak, evicting the worst one if at capacity.
    pub(crate) fn push(&mut self, peak: Peak) {
        if self.k == 0 {
            return;
        }
        if self.items.len() < self.k {
            self.items.push(peak);
            return;
        }

        let mut worst_idx = 0usize;
        for (idx, item) in self.items.iter().enumerate().skip(1) {
            if peak_cmp_desc(item, &self.items[worst_idx]) == Ordering::Greater {
                worst_idx = idx;
            }
        }

        if peak_cmp_desc(&peak, &self.items[worst_idx]) == Ordering::Less {
            self.items[worst_idx] = peak;
        }
    }

    /// Returns peaks sorted by descending score.
    pub(crate) fn into_sorted_desc(mut self) -> Vec<Peak> {
        sort_peaks_desc(&mut self.items);
        self.items
    }
}

/// Applies 2D non-maximum suppression using Chebyshev distance.
///
/// Peaks are kept in descending score order if they are farther than
/// `radius` from every previously kept peak.
pub(crate) fn nms_2d(mut peaks: Vec<Peak>, radius: usize) -> Vec<Peak> {
    sort_peaks_desc(&mut peaks);
    if radius == 0 {
        return peaks;
    }

    let mut kept: Vec<Peak> = Vec::new();
    'outer: for peak in peaks {
        for kept_peak in &kept {
            let dx = peak.x.abs_diff(kept_peak.x);
            let dy = peak.y.abs_diff(kept_peak.y);
            if dx.max(dy) <= radius {
                continue 'outer;
            }
        }
        kept.push(peak);
    }
    kept
}
