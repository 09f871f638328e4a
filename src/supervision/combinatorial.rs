//! Hypothesise-and-verify supervision over minimal match subsets.
//!
//! Every minimal subset (four matches for a perspective transform, three for
//! an affine one) proposes a transform. A proposal is kept when enough
//! matches agree with it within `max_transformation_error` pixels; it is then
//! refit on those inliers. Distinct inlier sets yield one candidate each, in
//! the order they are first found.

use super::fit::{correspondences, fit, squared_error, validate_weights, TransformModel};
use super::{SupervisionResult, Supervisor};
use crate::geometry::Point;
use crate::matching::MatchingResult;
use crate::template::Template;
use crate::trace::{trace_event, trace_span};
use crate::util::config::parse_engine_config;
use crate::util::{ErrorKind, OfficialEyeError, OfficialEyeResult};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// Options of the `combinatorial` supervisor.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct CombinatorialConfig {
    pub transform: TransformModel,
    pub keypoint_weights: HashMap<String, f64>,
    /// Maximum number of subsets to try.
    pub iterations: usize,
    /// Reprojection error (pixels) under which a match counts as an inlier.
    pub max_transformation_error: f64,
    /// Fraction of all matches a proposal must explain.
    pub min_match_factor: f64,
    /// Seed for subset sampling; random when absent.
    pub seed: Option<u64>,
}

impl Default for CombinatorialConfig {
    fn default() -> Self {
        Self {
            transform: TransformModel::default(),
            keypoint_weights: HashMap::new(),
            iterations: 200,
            max_transformation_error: 5.0,
            min_match_factor: 0.5,
            seed: None,
        }
    }
}

impl CombinatorialConfig {
    fn validate(&self) -> OfficialEyeResult<()> {
        let fail = |problem: &str| {
            OfficialEyeError::new(
                ErrorKind::InvalidConfig,
                format!(
                    "while parsing the configuration of the '{}' supervisor",
                    CombinatorialSupervisor::ID
                ),
                problem,
            )
        };
        if self.iterations == 0 {
            return Err(fail("'iterations' must be at least 1"));
        }
        if !(self.max_transformation_error > 0.0 && self.max_transformation_error.is_finite()) {
            return Err(fail("'max_transformation_error' must be a positive number"));
        }
        if !(0.0..=1.0).contains(&self.min_match_factor) {
            return Err(fail("'min_match_factor' must lie in [0, 1]"));
        }
        Ok(())
    }
}

/// Combinatorial hypothesise-and-verify supervisor.
#[derive(Debug)]
pub struct CombinatorialSupervisor {
    config: CombinatorialConfig,
}

impl CombinatorialSupervisor {
    pub const ID: &'static str = "combinatorial";

    pub fn new(config: CombinatorialConfig) -> OfficialEyeResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn from_config(config: &Value) -> OfficialEyeResult<Self> {
        Self::new(parse_engine_config("supervisor", Self::ID, config)?)
    }

    pub fn config(&self) -> &CombinatorialConfig {
        &self.config
    }

    /// Minimal subsets to try: all of them in lexicographic order when
    /// there are at most `iterations`, otherwise `iterations` random ones.
    fn subsets(&self, n: usize, k: usize) -> Vec<Vec<usize>> {
        let iterations = self.config.iterations;
        if binomial(n, k).is_some_and(|count| count <= iterations) {
            let mut out = Vec::new();
            let mut combo: Vec<usize> = (0..k).collect();
            loop {
                out.push(combo.clone());
                if !next_combination(&mut combo, n) {
                    break;
                }
            }
            return out;
        }

        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        };
        (0..iterations)
            .map(|_| {
                let mut subset = rand::seq::index::sample(&mut rng, n, k).into_vec();
                subset.sort_unstable();
                subset
            })
            .collect()
    }
}

/// `n choose k`; `None` on overflow.
fn binomial(n: usize, k: usize) -> Option<usize> {
    if k > n {
        return Some(0);
    }
    let mut c: usize = 1;
    for i in 0..k {
        c = c.checked_mul(n - i)? / (i + 1);
    }
    Some(c)
}

/// Advances `combo` to the next k-combination of `0..n` in lexicographic
/// order; returns false after the last one.
fn next_combination(combo: &mut [usize], n: usize) -> bool {
    let k = combo.len();
    let mut i = k;
    while i > 0 {
        i -= 1;
        if combo[i] < n - k + i {
            combo[i] += 1;
            for j in i + 1..k {
                combo[j] = combo[j - 1] + 1;
            }
            return true;
        }
    }
    false
}

impl Supervisor for CombinatorialSupervisor {
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
        let _span = trace_span!("combinatorial_supervise").entered();
        let model = self.config.transform;
        let cs = correspondences(matching, &self.config.keypoint_weights);
        let n = cs.len();
        let k = model.min_matches();
        if n < k {
            return Ok(Vec::new());
        }

        let min_inliers = ((self.config.min_match_factor * n as f64).ceil() as usize).max(k);
        let max_err_sq = self.config.max_transformation_error.powi(2);

        let mut seen: HashSet<Vec<usize>> = HashSet::new();
        let mut results = Vec::new();
        let subsets = self.subsets(n, k);
        for subset in &subsets {
            let src: Vec<Point> = subset.iter().map(|&i| cs[i].target).collect();
            let dst: Vec<Point> = subset.iter().map(|&i| cs[i].template).collect();
            let Some(proposal) = model.estimate(&src, &dst) else {
                continue;
            };

            let inliers: Vec<usize> = (0..n)
                .filter(|&i| squared_error(&proposal, &cs[i]) <= max_err_sq)
                .collect();
            if inliers.len() < min_inliers || !seen.insert(inliers.clone()) {
                continue;
            }

            let inlier_cs: Vec<_> = inliers.iter().map(|&i| cs[i]).collect();
            if let Some(result) = fit(template.identifier(), model, &inlier_cs) {
                results.push(result);
            }
        }

        trace_event!(
            "combinatorial_candidates",
            subsets = subsets.len(),
            candidates = results.len()
        );
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::{binomial, next_combination, CombinatorialConfig, CombinatorialSupervisor};
    use crate::util::ErrorKind;
    use serde_json::json;

    #[test]
    fn combinations_are_lexicographic() {
        let mut combo = vec![0, 1];
        let mut all = vec![combo.clone()];
        while next_combination(&mut combo, 4) {
            all.push(combo.clone());
        }
        assert_eq!(
            all,
            vec![
                vec![0, 1],
                vec![0, 2],
                vec![0, 3],
                vec![1, 2],
                vec![1, 3],
                vec![2, 3]
            ]
        );
        assert_eq!(binomial(4, 2), Some(6));
        assert_eq!(binomial(10, 4), Some(210));
    }

    #[test]
    fn small_inputs_are_enumerated_large_ones_sampled() {
        let sup = CombinatorialSupervisor::from_config(&json!({"iterations": 10, "seed": 7}))
            .unwrap();
        assert_eq!(sup.subsets(5, 4).len(), 5);
        let sampled = sup.subsets(30, 4);
        assert_eq!(sampled.len(), 10);
        assert!(sampled.iter().all(|s| s.windows(2).all(|w| w[0] < w[1])));
        assert_eq!(sampled, sup.subsets(30, 4));
    }

    #[test]
    fn config_defaults_and_validation() {
        let sup = CombinatorialSupervisor::from_config(&serde_json::Value::Null).unwrap();
        assert_eq!(sup.config(), &CombinatorialConfig::default());
        let err = CombinatorialSupervisor::from_config(&json!({"min_match_factor": 1.5}))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfig);
        assert!(CombinatorialSupervisor::from_config(&json!({"iterations": 0})).is_err());
    }
}
