//! Policies choosing one supervision result among candidates.

use super::SupervisionResult;
use crate::trace::trace_event;
use crate::util::{ErrorKind, OfficialEyeError, OfficialEyeResult};
use rand::Rng;
use std::fmt;
use std::str::FromStr;

/// How to pick one result out of the supervisor's candidates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SelectionPolicy {
    /// The first candidate produced.
    #[default]
    First,
    /// A uniformly random candidate.
    Random,
    /// The candidate with the smallest weighted MSE; the earliest wins ties.
    BestMse,
    /// The candidate with the smallest score; the earliest wins ties.
    BestScore,
}

impl SelectionPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            SelectionPolicy::First => "first",
            SelectionPolicy::Random => "random",
            SelectionPolicy::BestMse => "best_mse",
            SelectionPolicy::BestScore => "best_score",
        }
    }

    /// Picks one candidate; `None` only when `candidates` is empty.
    pub fn select(self, candidates: Vec<SupervisionResult>) -> Option<SupervisionResult> {
        match self {
            SelectionPolicy::First => candidates.into_iter().next(),
            SelectionPolicy::Random => {
                if candidates.is_empty() {
                    return None;
                }
                let idx = rand::rng().random_range(0..candidates.len());
                candidates.into_iter().nth(idx)
            }
            SelectionPolicy::BestMse => pick_min(candidates, |c| {
                trace_event!("candidate_mse", mse = c.weighted_mse());
                c.weighted_mse()
            }),
            SelectionPolicy::BestScore => pick_min(candidates, SupervisionResult::score),
        }
    }
}

/// Returns the first candidate with the smallest key; NaN keys never win.
fn pick_min(
    candidates: Vec<SupervisionResult>,
    key: impl Fn(&SupervisionResult) -> f64,
) -> Option<SupervisionResult> {
    let mut best: Option<(usize, f64)> = None;
    for (idx, candidate) in candidates.iter().enumerate() {
        let value = key(candidate);
        let better = match best {
            Some((_, best_value)) => value < best_value,
            None => !value.is_nan(),
        };
        if better {
            best = Some((idx, value));
        }
    }
    let idx = best.map_or(0, |(idx, _)| idx);
    candidates.into_iter().nth(idx)
}

impl FromStr for SelectionPolicy {
    type Err = OfficialEyeError;

    fn from_str(s: &str) -> OfficialEyeResult<Self> {
        match s {
            "first" => Ok(SelectionPolicy::First),
            "random" => Ok(SelectionPolicy::Random),
            "best_mse" => Ok(SelectionPolicy::BestMse),
            "best_score" => Ok(SelectionPolicy::BestScore),
            other => Err(OfficialEyeError::new(
                ErrorKind::InvalidIdentifier,
                "while resolving the supervision result selection policy",
                format!("No selection policy is registered under the identifier '{other}'."),
            )),
        }
    }
}

impl fmt::Display for SelectionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::SelectionPolicy;
    use crate::geometry::Homography;
    use crate::supervision::SupervisionResult;
    use crate::util::ErrorKind;

    fn candidate(mse: f64, score: f64) -> SupervisionResult {
        SupervisionResult::new("t", Homography::identity(), mse, score, 4).unwrap()
    }

    #[test]
    fn best_mse_prefers_first_of_ties() {
        let candidates: Vec<_> = [5.0, 2.0, 2.0, 9.0]
            .iter()
            .enumerate()
            .map(|(i, &mse)| candidate(mse, i as f64))
            .collect();
        let best = SelectionPolicy::BestMse.select(candidates).unwrap();
        assert_eq!(best.score(), 1.0);
    }

    #[test]
    fn best_score_and_first() {
        let candidates = vec![candidate(1.0, 3.0), candidate(2.0, 0.5), candidate(3.0, 0.5)];
        let best = SelectionPolicy::BestScore.select(candidates.clone()).unwrap();
        assert_eq!(best.weighted_mse(), 2.0);
        let first = SelectionPolicy::First.select(candidates.clone()).unwrap();
        assert_eq!(first, candidates[0]);
        let random = SelectionPolicy::Random.select(candidates.clone()).unwrap();
        assert!(candidates.contains(&random));
    }

    #[test]
    fn empty_candidates_select_nothing() {
        for policy in [
            SelectionPolicy::First,
            SelectionPolicy::Random,
            SelectionPolicy::BestMse,
            SelectionPolicy::BestScore,
        ] {
            assert!(policy.select(Vec::new()).is_none());
        }
    }

    #[test]
    fn parses_known_policies_only() {
        assert_eq!("best_mse".parse::<SelectionPolicy>().unwrap(), SelectionPolicy::BestMse);
        let err = "best_guess".parse::<SelectionPolicy>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidIdentifier);
        assert!(err.problem().contains("'best_guess'"));
    }
}
