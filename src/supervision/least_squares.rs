//! Single least-squares fit over every match.

use super::fit::{correspondences, fit, validate_weights, TransformModel};
use super::{SupervisionResult, Supervisor};
use crate::matching::MatchingResult;
use crate::template::Template;
use crate::trace::trace_debug;
use crate::util::config::parse_engine_config;
use crate::util::OfficialEyeResult;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

/// Options of the `least_squares` supervisor.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LeastSquaresConfig {
    pub transform: TransformModel,
    /// Per-keypoint weights; unlisted keypoints weigh 1.
    pub keypoint_weights: HashMap<String, f64>,
}

/// Fits one transform on all matches, producing at most one candidate.
#[derive(Debug)]
pub struct LeastSquaresSupervisor {
    config: LeastSquaresConfig,
}

impl LeastSquaresSupervisor {
    pub const ID: &'static str = "least_squares";

    pub fn new(config: LeastSquaresConfig) -> Self {
        Self { config }
    }

    pub fn from_config(config: &Value) -> OfficialEyeResult<Self> {
        Ok(Self::new(parse_engine_config("supervisor", Self::ID, config)?))
    }

    pub fn config(&self) -> &LeastSquaresConfig {
        &self.config
    }
}

impl Supervisor for LeastSquaresSupervisor {
    fn id(&self) -> &str {
        Self::ID
    }

    fn setup(&mut self, template: &Template, _matching: &MatchingResult) -> OfficialEyeResult<()> {
        validate_weights(Self::ID, template, &self.config.keypoint_weights)
    }

    fn supervise(
        &mut self,
        template: &Template,
        matching: &MatchingResult,
    ) -> OfficialEyeResult<Vec<SupervisionResult>> {
        let cs = correspondences(matching, &self.config.keypoint_weights);
        let result = fit(template.identifier(), self.config.transform, &cs);
        if result.is_none() {
            trace_debug!(
                "least squares fit failed on {} matches of template '{}'",
                cs.len(),
                template.identifier()
            );
        }
        Ok(result.into_iter().collect())
    }
}
