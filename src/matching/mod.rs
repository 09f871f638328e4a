//! Keypoint matching: the `Matcher` strategy and the aggregated result.
//!
//! A matcher is set up once per analysis and then asked for the matches of
//! every keypoint in declaration order. The matches are collected into a
//! [`MatchingResult`] which enforces the per-keypoint match-count bounds
//! before supervision runs.

mod peak;
mod plan;
mod scan;
mod subpixel;
mod zncc;

pub use zncc::{ZnccConfig, ZnccMatcher};

use crate::geometry::Point;
use crate::image::OwnedImage;
use crate::template::{Keypoint, Template};
use crate::util::{ErrorKind, OfficialEyeError, OfficialEyeResult};
use serde::Serialize;
use std::fmt;

/// A correspondence between a template keypoint and a target location.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Match {
    pub keypoint_id: String,
    /// Location in template pixel space.
    pub template_point: Point,
    /// Location in target pixel space.
    pub target_point: Point,
    /// Engine-specific quality of the match.
    pub score: f32,
}

impl Match {
    pub fn new(
        keypoint_id: impl Into<String>,
        template_point: Point,
        target_point: Point,
        score: f32,
    ) -> Self {
        Self {
            keypoint_id: keypoint_id.into(),
            template_point,
            target_point,
            score,
        }
    }
}

/// Strategy locating target correspondences for template keypoints.
pub trait Matcher: Send + fmt::Debug {
    /// Identifier the engine is registered under.
    fn id(&self) -> &str;

    /// One-time preparation against a template and an (already mutated)
    /// target image.
    fn setup(&mut self, template: &Template, target: &OwnedImage) -> OfficialEyeResult<()>;

    /// Finds zero or more matches for `keypoint`.
    fn match_keypoint(&mut self, keypoint: &Keypoint) -> OfficialEyeResult<()>;

    /// Iterates the matches found for `keypoint`, best first.
    fn matches_for_keypoint(&self, keypoint: &Keypoint) -> std::slice::Iter<'_, Match>;
}

/// All matches of one analysis, grouped by keypoint in declaration order.
#[derive(Clone, Debug, Serialize)]
pub struct MatchingResult {
    template_id: String,
    #[serde(serialize_with = "serialize_buckets")]
    buckets: Vec<(String, Vec<Match>)>,
}

fn serialize_buckets<S: serde::Serializer>(
    buckets: &[(String, Vec<Match>)],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    use serde::ser::SerializeMap;
    let mut map = serializer.serialize_map(Some(buckets.len()))?;
    for (id, matches) in buckets {
        map.serialize_entry(id, matches)?;
    }
    map.end()
}

impl MatchingResult {
    /// Creates an empty result with one bucket per keypoint of `template`.
    pub fn new(template: &Template) -> Self {
        Self {
            template_id: template.identifier().to_string(),
            buckets: template
                .keypoints()
                .iter()
                .map(|kp| (kp.identifier().to_string(), Vec::new()))
                .collect(),
        }
    }

    pub fn template_id(&self) -> &str {
        &self.template_id
    }

    /// Records a match; the keypoint must belong to the template.
    pub fn add_match(&mut self, m: Match) -> OfficialEyeResult<()> {
        let bucket = self
            .buckets
            .iter_mut()
            .find(|(id, _)| *id == m.keypoint_id)
            .ok_or_else(|| {
                OfficialEyeError::new(
                    ErrorKind::Internal,
                    format!("while collecting matches for template '{}'", self.template_id),
                    format!(
                        "a match refers to the unknown keypoint '{}'",
                        m.keypoint_id
                    ),
                )
            })?;
        bucket.1.push(m);
        Ok(())
    }

    /// Matches of one keypoint in discovery order.
    pub fn matches_for_keypoint(&self, keypoint_id: &str) -> &[Match] {
        self.buckets
            .iter()
            .find(|(id, _)| id == keypoint_id)
            .map_or(&[], |(_, matches)| matches.as_slice())
    }

    /// Every match, by keypoint declaration order then discovery order.
    pub fn matches(&self) -> impl Iterator<Item = &Match> {
        self.buckets.iter().flat_map(|(_, matches)| matches.iter())
    }

    pub fn total_match_count(&self) -> usize {
        self.buckets.iter().map(|(_, matches)| matches.len()).sum()
    }

    /// Checks the per-keypoint bounds, then that at least one match exists.
    pub fn validate(&self, template: &Template) -> OfficialEyeResult<()> {
        for keypoint in template.keypoints() {
            let count = self.matches_for_keypoint(keypoint.identifier()).len();
            if count < keypoint.matches_min() || count > keypoint.matches_max() {
                return Err(OfficialEyeError::new(
                    ErrorKind::MatchCountOutOfBounds,
                    format!(
                        "while validating the matches of keypoint '{}' of template '{}'",
                        keypoint.identifier(),
                        template.identifier()
                    ),
                    format!(
                        "The keypoint '{}' was matched {count} times, expected between {} and {}.",
                        keypoint.identifier(),
                        keypoint.matches_min(),
                        keypoint.matches_max()
                    ),
                ));
            }
        }
        if self.total_match_count() == 0 {
            return Err(OfficialEyeError::new(
                ErrorKind::CorrespondenceNotFound,
                format!(
                    "while validating the matches of template '{}'",
                    template.identifier()
                ),
                "No keypoint could be matched in the target image.",
            ));
        }
        Ok(())
    }
}
