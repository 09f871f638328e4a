//! Coarse-to-fine ZNCC keypoint matcher.
//!
//! Each keypoint patch is cut out of the mutated source image and located in
//! the target by zero-mean normalized cross-correlation:
//! - full scan of the coarsest pyramid level both images support,
//! - local maxima, non-maximum suppression and a beam of the best candidates,
//! - per-level refinement inside a small ROI around the upscaled position,
//! - quadratic subpixel refinement at full resolution.

use crate::geometry::Point;
use crate::image::pyramid::ImagePyramid;
use crate::image::{ImageView, OwnedImage};
use crate::matching::peak::{nms_2d, Peak, TopK};
use crate::matching::plan::PatchPlan;
use crate::matching::scan::{scan, score_at, ScanRange, ScoreMap};
use crate::matching::subpixel::refine_subpixel_2d;
use crate::matching::{Match, Matcher};
use crate::template::{Keypoint, Template};
use crate::trace::{trace_debug, trace_event, trace_span, trace_warn};
use crate::util::config::parse_engine_config;
use crate::util::{ErrorKind, OfficialEyeError, OfficialEyeResult};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

/// Coarser pyramid levels are not used once the patch would shrink below this.
const MIN_PATCH_SIDE: usize = 8;

/// Options of the `zncc` matcher.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ZnccConfig {
    /// Maximum number of pyramid levels, including full resolution.
    pub pyramid_levels: usize,
    /// Maximum number of matches reported per keypoint.
    pub topk: usize,
    /// Minimum full-resolution score of a reported match.
    pub min_score: f32,
    /// Minimum intensity variance of a target window.
    pub min_var_i: f32,
    /// Chebyshev radius of non-maximum suppression at full resolution.
    pub nms_radius: usize,
    /// Search radius around upscaled candidates during refinement.
    pub roi_radius: usize,
    /// Candidates carried from the coarse scan into refinement.
    pub beam_width: usize,
    /// Scan rows in parallel (requires the `rayon` feature).
    pub parallel: bool,
}

impl Default for ZnccConfig {
    fn default() -> Self {
        Self {
            pyramid_levels: 3,
            topk: 1,
            min_score: 0.8,
            min_var_i: 1e-3,
            nms_radius: 4,
            roi_radius: 3,
            beam_width: 8,
            parallel: false,
        }
    }
}

impl ZnccConfig {
    fn validate(&self) -> OfficialEyeResult<()> {
        let fail = |problem: &str| {
            OfficialEyeError::new(
                ErrorKind::InvalidConfig,
                format!(
                    "while parsing the configuration of the '{}' matcher",
                    ZnccMatcher::ID
                ),
                problem,
            )
        };
        if self.pyramid_levels == 0 {
            return Err(fail("'pyramid_levels' must be at least 1"));
        }
        if self.beam_width == 0 {
            return Err(fail("'beam_width' must be at least 1"));
        }
        if !(-1.0..=1.0).contains(&self.min_score) {
            return Err(fail("'min_score' must lie in [-1, 1]"));
        }
        if !self.min_var_i.is_finite() || self.min_var_i < 0.0 {
            return Err(fail("'min_var_i' must be a non-negative number"));
        }
        Ok(())
    }
}

#[derive(Debug)]
struct MatchState {
    template_id: String,
    source: OwnedImage,
    target: ImagePyramid,
}

/// ZNCC matcher over image pyramids.
#[derive(Debug)]
pub struct ZnccMatcher {
    config: ZnccConfig,
    state: Option<MatchState>,
    matches: HashMap<String, Vec<Match>>,
}

impl ZnccMatcher {
    pub const ID: &'static str = "zncc";

    pub fn new(config: ZnccConfig) -> OfficialEyeResult<Self> {
        config.validate()?;
        if config.parallel && cfg!(not(feature = "rayon")) {
            trace_warn!("parallel scanning requested without the rayon feature; scanning serially");
        }
        Ok(Self {
            config,
            state: None,
            matches: HashMap::new(),
        })
    }

    pub fn from_config(config: &Value) -> OfficialEyeResult<Self> {
        Self::new(parse_engine_config("matcher", Self::ID, config)?)
    }

    pub fn config(&self) -> &ZnccConfig {
        &self.config
    }

    fn scan_range(&self, image: ImageView<'_, u8>, plan: &PatchPlan, range: ScanRange) -> ScoreMap {
        #[cfg(feature = "rayon")]
        if self.config.parallel {
            return crate::matching::scan::scan_par(image, plan, range, self.config.min_var_i);
        }
        scan(image, plan, range, self.config.min_var_i)
    }

    /// Locates `patch` in the target pyramid; returns full-resolution peaks.
    fn locate(
        &self,
        state: &MatchState,
        keypoint: &Keypoint,
        patch: &OwnedImage,
    ) -> OfficialEyeResult<Vec<Match>> {
        let cfg = &self.config;
        let patches = ImagePyramid::build_u8(patch.view(), cfg.pyramid_levels, MIN_PATCH_SIDE)?;

        let usable = patches.len().min(state.target.len());
        let mut plans = Vec::with_capacity(usable);
        for level in 0..usable {
            match patches.level(level).and_then(PatchPlan::from_view) {
                Some(plan) => plans.push(plan),
                None => break,
            }
        }
        let Some(coarsest) = plans.len().checked_sub(1) else {
            trace_warn!(
                "keypoint '{}' of template '{}' has no texture and cannot be matched",
                keypoint.identifier(),
                state.template_id
            );
            return Ok(Vec::new());
        };

        let level_view = |level: usize| {
            state.target.level(level).ok_or_else(|| {
                OfficialEyeError::new(
                    ErrorKind::Internal,
                    format!("while matching keypoint '{}'", keypoint.identifier()),
                    format!("pyramid level {level} is missing"),
                )
            })
        };

        let image = level_view(coarsest)?;
        let Some(full) = ScanRange::full(image, &plans[coarsest]) else {
            trace_warn!(
                "keypoint '{}' of template '{}' is larger than the target image",
                keypoint.identifier(),
                state.template_id
            );
            return Ok(Vec::new());
        };

        let coarse_min_score = if coarsest == 0 { cfg.min_score } else { 0.0 };
        let map = self.scan_range(image, &plans[coarsest], full);
        let mut candidates = nms_2d(
            map.local_maxima(coarse_min_score, cfg.beam_width.saturating_mul(4)),
            (cfg.nms_radius >> coarsest).max(1),
        );
        candidates.truncate(cfg.beam_width);
        trace_debug!(
            "keypoint '{}': {} coarse candidates at level {coarsest}",
            keypoint.identifier(),
            candidates.len()
        );

        for level in (0..coarsest).rev() {
            let image = level_view(level)?;
            let plan = &plans[level];
            let Some(full) = ScanRange::full(image, plan) else {
                return Ok(Vec::new());
            };
            let mut refined = Vec::with_capacity(candidates.len());
            for cand in &candidates {
                let (x_up, y_up) = (cand.x.saturating_mul(2), cand.y.saturating_mul(2));
                let Some(roi) = ScanRange::around(x_up, y_up, cfg.roi_radius, full) else {
                    continue;
                };
                if let Some(best) = self.scan_range(image, plan, roi).best() {
                    refined.push(best);
                }
            }
            candidates = nms_2d(refined, (cfg.nms_radius >> level).max(1));
        }

        candidates.retain(|peak| peak.score >= cfg.min_score);
        let mut top = TopK::new(cfg.topk);
        for peak in nms_2d(candidates, cfg.nms_radius) {
            top.push(peak);
        }

        let image = level_view(0)?;
        let plan = &plans[0];
        let region = keypoint.region();
        let half_w = (plan.width() as f64 - 1.0) / 2.0;
        let half_h = (plan.height() as f64 - 1.0) / 2.0;
        let matches = top
            .into_sorted_desc()
            .into_iter()
            .map(|peak| {
                let (x, y) = self.subpixel(image, plan, peak);
                Match::new(
                    keypoint.identifier(),
                    region.center(),
                    Point::new(x + half_w, y + half_h),
                    peak.score,
                )
            })
            .collect();
        Ok(matches)
    }

    fn subpixel(&self, image: ImageView<'_, u8>, plan: &PatchPlan, peak: Peak) -> (f64, f64) {
        let mut s = [[f32::NEG_INFINITY; 3]; 3];
        for (row, dy) in s.iter_mut().zip(-1isize..=1) {
            for (slot, dx) in row.iter_mut().zip(-1isize..=1) {
                let (x, y) = (peak.x as isize + dx, peak.y as isize + dy);
                if x >= 0 && y >= 0 {
                    *slot = score_at(image, plan, x as usize, y as usize, self.config.min_var_i);
                }
            }
        }
        refine_subpixel_2d(peak.x, peak.y, s)
    }
}

impl Matcher for ZnccMatcher {
    fn id(&self) -> &str {
        Self::ID
    }

    fn setup(&mut self, template: &Template, target: &OwnedImage) -> OfficialEyeResult<()> {
        let _span = trace_span!("zncc_setup").entered();
        let source = template.mutated_source_image()?;
        let target =
            ImagePyramid::build_u8(target.view(), self.config.pyramid_levels, MIN_PATCH_SIDE)?;
        trace_event!("zncc_pyramid", levels = target.len());
        self.state = Some(MatchState {
            template_id: template.identifier().to_string(),
            source,
            target,
        });
        self.matches.clear();
        Ok(())
    }

    fn match_keypoint(&mut self, keypoint: &Keypoint) -> OfficialEyeResult<()> {
        let state = self.state.as_ref().ok_or_else(|| {
            OfficialEyeError::new(
                ErrorKind::Internal,
                format!("while matching keypoint '{}'", keypoint.identifier()),
                "the matcher was used before setup",
            )
        })?;
        let patch = keypoint.region().crop(&state.source)?;
        let matches = self.locate(state, keypoint, &patch)?;
        trace_event!("zncc_keypoint_matched", matches = matches.len());
        self.matches.insert(keypoint.identifier().to_string(), matches);
        Ok(())
    }

    fn matches_for_keypoint(&self, keypoint: &Keypoint) -> std::slice::Iter<'_, Match> {
        self.matches
            .get(keypoint.identifier())
            .map_or_else(Default::default, |matches| matches.iter())
    }
}
