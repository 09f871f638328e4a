//! Transform fitting shared by the supervisors.

use super::SupervisionResult;
use crate::geometry::{estimate_affine, estimate_homography, Homography, Point};
use crate::matching::MatchingResult;
use crate::template::Template;
use crate::util::{ErrorKind, OfficialEyeError, OfficialEyeResult};
use serde::Deserialize;
use std::collections::HashMap;

/// Transform family fit to the matches.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransformModel {
    /// Full 8-DOF homography.
    #[default]
    Perspective,
    /// 6-DOF affine transform.
    Affine,
}

impl TransformModel {
    /// Smallest number of correspondences that determines the transform.
    pub fn min_matches(self) -> usize {
        match self {
            TransformModel::Perspective => 4,
            TransformModel::Affine => 3,
        }
    }

    /// Estimates the transform with `dst ~ T * src`.
    pub fn estimate(self, src: &[Point], dst: &[Point]) -> Option<Homography> {
        match self {
            TransformModel::Perspective => estimate_homography(src, dst),
            TransformModel::Affine => estimate_affine(src, dst),
        }
    }
}

/// One match as seen by a supervisor.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Correspondence {
    pub(crate) target: Point,
    pub(crate) template: Point,
    pub(crate) weight: f64,
}

/// Checks that every weighted keypoint exists and every weight is usable.
pub(crate) fn validate_weights(
    engine: &str,
    template: &Template,
    weights: &HashMap<String, f64>,
) -> OfficialEyeResult<()> {
    let mut ids: Vec<&String> = weights.keys().collect();
    ids.sort();
    for id in ids {
        let fail = |problem: String| {
            OfficialEyeError::new(
                ErrorKind::InvalidConfig,
                format!(
                    "while setting up the '{engine}' supervisor for template '{}'",
                    template.identifier()
                ),
                problem,
            )
        };
        if template.keypoint(id).is_none() {
            return Err(fail(format!(
                "a weight is given for the unknown keypoint '{id}'"
            )));
        }
        let weight = weights[id];
        if !weight.is_finite() || weight < 0.0 {
            return Err(fail(format!(
                "the weight of keypoint '{id}' must be a non-negative number, got {weight}"
            )));
        }
    }
    Ok(())
}

/// Flattens a matching result in match order, attaching keypoint weights.
pub(crate) fn correspondences(
    matching: &MatchingResult,
    weights: &HashMap<String, f64>,
) -> Vec<Correspondence> {
    matching
        .matches()
        .map(|m| Correspondence {
            target: m.target_point,
            template: m.template_point,
            weight: weights.get(&m.keypoint_id).copied().unwrap_or(1.0),
        })
        .collect()
}

/// Squared reprojection error of one correspondence.
pub(crate) fn squared_error(transform: &Homography, c: &Correspondence) -> f64 {
    transform
        .apply(c.target)
        .map_or(f64::INFINITY, |p| (p - c.template).norm_squared())
}

/// Weighted mean squared error; unweighted if all weights are zero.
pub(crate) fn weighted_mse(transform: &Homography, cs: &[Correspondence]) -> f64 {
    let total_weight: f64 = cs.iter().map(|c| c.weight).sum();
    if total_weight <= 0.0 {
        return cs.iter().map(|c| squared_error(transform, c)).sum::<f64>() / cs.len() as f64;
    }
    cs.iter()
        .map(|c| c.weight * squared_error(transform, c))
        .sum::<f64>()
        / total_weight
}

/// Root mean squared reprojection error.
pub(crate) fn rms_error(transform: &Homography, cs: &[Correspondence]) -> f64 {
    (cs.iter().map(|c| squared_error(transform, c)).sum::<f64>() / cs.len() as f64).sqrt()
}

/// Fits `model` to `cs` and scores the fit; `None` if degenerate.
pub(crate) fn fit(
    template_id: &str,
    model: TransformModel,
    cs: &[Correspondence],
) -> Option<SupervisionResult> {
    if cs.len() < model.min_matches() {
        return None;
    }
    let src: Vec<Point> = cs.iter().map(|c| c.target).collect();
    let dst: Vec<Point> = cs.iter().map(|c| c.template).collect();
    let transform = model.estimate(&src, &dst)?;
    let mse = weighted_mse(&transform, cs);
    let rms = rms_error(&transform, cs);
    if !mse.is_finite() || !rms.is_finite() {
        return None;
    }
    SupervisionResult::new(template_id, transform, mse, rms, cs.len())
}
