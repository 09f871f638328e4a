//! Supervision: turning keypoint matches into candidate transforms.
//!
//! A supervisor consumes a validated [`MatchingResult`] and produces zero or
//! more [`SupervisionResult`]s in production order. A [`SelectionPolicy`]
//! then picks exactly one of them.

mod combinatorial;
mod fit;
mod least_squares;
mod select;

pub use combinatorial::{CombinatorialConfig, CombinatorialSupervisor};
pub use fit::TransformModel;
pub use least_squares::{LeastSquaresConfig, LeastSquaresSupervisor};
pub use select::SelectionPolicy;

use crate::geometry::{Homography, Point};
use crate::image::{ImageView, OwnedImage};
use crate::matching::MatchingResult;
use crate::template::{Feature, Template};
use crate::util::OfficialEyeResult;
use serde::Serialize;
use std::fmt;

/// Strategy producing candidate transforms from matches.
pub trait Supervisor: Send + fmt::Debug {
    /// Identifier the engine is registered under.
    fn id(&self) -> &str;

    /// One-time preparation; may reject options that do not fit the template.
    fn setup(&mut self, template: &Template, matching: &MatchingResult) -> OfficialEyeResult<()>;

    /// Produces candidates in production order; may be empty.
    fn supervise(
        &mut self,
        template: &Template,
        matching: &MatchingResult,
    ) -> OfficialEyeResult<Vec<SupervisionResult>>;
}

/// A transform from target space into template space with its fit quality.
///
/// Both `weighted_mse` and `score` are lower-is-better for every shipped
/// engine.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SupervisionResult {
    template_id: String,
    transform: Homography,
    #[serde(skip)]
    inverse: Homography,
    weighted_mse: f64,
    score: f64,
    match_count: usize,
}

impl SupervisionResult {
    /// Creates a result; `None` if `transform` cannot be inverted.
    pub fn new(
        template_id: impl Into<String>,
        transform: Homography,
        weighted_mse: f64,
        score: f64,
        match_count: usize,
    ) -> Option<Self> {
        let inverse = transform.inverse()?;
        Some(Self {
            template_id: template_id.into(),
            transform,
            inverse,
            weighted_mse,
            score,
            match_count,
        })
    }

    pub fn template_id(&self) -> &str {
        &self.template_id
    }

    /// Target → template transform.
    pub fn transform(&self) -> &Homography {
        &self.transform
    }

    /// Template → target transform.
    pub fn template_to_target(&self) -> &Homography {
        &self.inverse
    }

    pub fn weighted_mse(&self) -> f64 {
        self.weighted_mse
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    /// Number of matches the transform was fit on.
    pub fn match_count(&self) -> usize {
        self.match_count
    }

    /// Maps a target-space point into template space.
    pub fn transform_point(&self, target_point: Point) -> Option<Point> {
        self.transform.apply(target_point)
    }

    /// Extracts the feature region out of a target-space image.
    ///
    /// Every feature pixel is mapped into the target and sampled bilinearly;
    /// pixels that land outside the target are black.
    pub fn warp_feature(
        &self,
        target: ImageView<'_, u8>,
        feature: &Feature,
    ) -> OfficialEyeResult<OwnedImage> {
        let region = feature.region();
        let (x0, y0) = (region.x() as f64, region.y() as f64);
        OwnedImage::from_fn(region.w(), region.h(), |fx, fy| {
            let p = Point::new(x0 + fx as f64, y0 + fy as f64);
            self.inverse
                .apply(p)
                .and_then(|q| target.sample_bilinear(q.x, q.y))
                .map_or(0, |v| v.round().clamp(0.0, 255.0) as u8)
        })
    }
}
