//! Custom engines registered in a context drive the analysis pipeline.

use officialeye::geometry::{Homography, Point};
use officialeye::template::Keypoint;
use officialeye::{
    Context, ErrorKind, Match, Matcher, MatchingResult, OfficialEyeResult, OwnedImage,
    SupervisionResult, Supervisor, Template, TemplateDescription,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Reports a fixed number of matches per keypoint.
#[derive(Debug)]
struct FixedMatcher {
    per_keypoint: HashMap<String, usize>,
    found: HashMap<String, Vec<Match>>,
    empty: Vec<Match>,
}

impl Matcher for FixedMatcher {
    fn id(&self) -> &str {
        "fixed"
    }

    fn setup(&mut self, _template: &Template, _target: &OwnedImage) -> OfficialEyeResult<()> {
        Ok(())
    }

    fn match_keypoint(&mut self, keypoint: &Keypoint) -> OfficialEyeResult<()> {
        let count = self.per_keypoint.get(keypoint.identifier()).copied().unwrap_or(0);
        let center = keypoint.region().center();
        let matches = (0..count)
            .map(|i| {
                let target = Point::new(center.x + i as f64, center.y);
                Match::new(keypoint.identifier(), center, target, 1.0)
            })
            .collect();
        self.found.insert(keypoint.identifier().to_string(), matches);
        Ok(())
    }

    fn matches_for_keypoint(&self, keypoint: &Keypoint) -> std::slice::Iter<'_, Match> {
        self.found
            .get(keypoint.identifier())
            .unwrap_or(&self.empty)
            .iter()
    }
}

/// Returns preset candidates and counts its invocations.
#[derive(Debug)]
struct PresetSupervisor {
    candidates: Vec<SupervisionResult>,
    calls: Arc<AtomicUsize>,
}

impl Supervisor for PresetSupervisor {
    fn id(&self) -> &str {
        "preset"
    }

    fn setup(&mut self, _template: &Template, _matching: &MatchingResult) -> OfficialEyeResult<()> {
        Ok(())
    }

    fn supervise(
        &mut self,
        _template: &Template,
        _matching: &MatchingResult,
    ) -> OfficialEyeResult<Vec<SupervisionResult>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.candidates.clone())
    }
}

fn candidate(mse: f64, score: f64) -> SupervisionResult {
    SupervisionResult::new("sheet", Homography::identity(), mse, score, 4).unwrap()
}

fn context(
    per_keypoint: &[(&str, usize)],
    candidates: Vec<SupervisionResult>,
) -> (Context, Arc<AtomicUsize>) {
    let mut ctx = Context::new();
    let per_keypoint: HashMap<String, usize> = per_keypoint
        .iter()
        .map(|(id, n)| (id.to_string(), *n))
        .collect();
    ctx.register_matcher("fixed", move |_| {
        Ok(Box::new(FixedMatcher {
            per_keypoint: per_keypoint.clone(),
            found: HashMap::new(),
            empty: Vec::new(),
        }) as Box<dyn Matcher>)
    });
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    ctx.register_supervisor("preset", move |_| {
        Ok(Box::new(PresetSupervisor {
            candidates: candidates.clone(),
            calls: Arc::clone(&counter),
        }) as Box<dyn Supervisor>)
    });
    (ctx, calls)
}

/// `right` is declared before `left`.
const SHEET: &str = r#"{
    "id": "sheet",
    "name": "Sheet",
    "source": "sheet.png",
    "keypoints": {
        "right": {"x": 30, "y": 0, "w": 10, "h": 10, "matches": {"min": 0, "max": 2}},
        "left": {"x": 0, "y": 0, "w": 10, "h": 10, "matches": {"min": 1, "max": 2}}
    },
    "matching": {"engine": "fixed"},
    "supervision": {"engine": "preset", "result": "$POLICY"}
}"#;

fn load(ctx: &Context, policy: &str) -> Arc<Template> {
    let desc = TemplateDescription::from_json(&SHEET.replace("$POLICY", policy)).unwrap();
    Template::new(ctx, desc, OwnedImage::filled(40, 20, 200).unwrap()).unwrap()
}

fn target() -> OwnedImage {
    OwnedImage::filled(40, 20, 200).unwrap()
}

#[test]
fn keypoint_below_minimum_skips_supervision() {
    let (ctx, calls) = context(&[("left", 0), ("right", 1)], vec![candidate(1.0, 1.0)]);
    let template = load(&ctx, "first");
    let err = template.run_analysis(&ctx, &target()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MatchCountOutOfBounds);
    assert!(err.problem().contains("'left'"));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn keypoint_above_maximum_fails() {
    let (ctx, calls) = context(&[("left", 1), ("right", 3)], vec![candidate(1.0, 1.0)]);
    let template = load(&ctx, "first");
    let err = template.run_analysis(&ctx, &target()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MatchCountOutOfBounds);
    assert!(err.problem().contains("'right'"));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn first_declared_keypoint_is_reported_first() {
    let (ctx, calls) = context(&[("left", 0), ("right", 3)], vec![candidate(1.0, 1.0)]);
    let template = load(&ctx, "first");
    let ids: Vec<&str> = template.keypoints().iter().map(|k| k.identifier()).collect();
    assert_eq!(ids, ["right", "left"]);
    let err = template.run_analysis(&ctx, &target()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MatchCountOutOfBounds);
    assert!(err.problem().contains("'right'"), "{err}");
    assert!(!err.problem().contains("'left'"), "{err}");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn zero_matches_report_missing_correspondence() {
    let (ctx, calls) = context(&[], vec![candidate(1.0, 1.0)]);
    let desc = TemplateDescription::from_json(
        &json!({
            "id": "loose",
            "name": "Loose",
            "source": "loose.png",
            "keypoints": {
                "any": {"x": 0, "y": 0, "w": 10, "h": 10, "matches": {"min": 0, "max": 3}}
            },
            "matching": {"engine": "fixed"},
            "supervision": {"engine": "preset"}
        })
        .to_string(),
    )
    .unwrap();
    let template = Template::new(&ctx, desc, OwnedImage::filled(20, 20, 0).unwrap()).unwrap();
    let err = template.run_analysis(&ctx, &target()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CorrespondenceNotFound);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn matches_are_collected_in_declaration_order() {
    let (ctx, _) = context(&[("left", 2), ("right", 1)], Vec::new());
    let template = load(&ctx, "first");
    let mut matching = MatchingResult::new(&template);
    let mut matcher = template.matcher(&ctx).unwrap();
    matcher.setup(&template, &target()).unwrap();
    for keypoint in template.keypoints() {
        matcher.match_keypoint(keypoint).unwrap();
        for m in matcher.matches_for_keypoint(keypoint) {
            matching.add_match(m.clone()).unwrap();
        }
    }
    assert!(matching.validate(&template).is_ok());
    assert_eq!(matching.total_match_count(), 3);
    let order: Vec<&str> = matching.matches().map(|m| m.keypoint_id.as_str()).collect();
    assert_eq!(order, ["right", "left", "left"]);
    assert_eq!(matching.matches_for_keypoint("left")[1].target_point.x, 5.5);

    let stray = Match::new("nowhere", Point::origin(), Point::origin(), 1.0);
    assert_eq!(matching.add_match(stray).unwrap_err().kind(), ErrorKind::Internal);
}

#[test]
fn best_mse_picks_the_first_minimum() {
    let candidates = vec![
        candidate(5.0, 0.0),
        candidate(2.0, 1.0),
        candidate(2.0, 2.0),
        candidate(9.0, 3.0),
    ];
    let (ctx, calls) = context(&[("left", 1)], candidates);

    let template = load(&ctx, "best_mse");
    let result = template.run_analysis(&ctx, &target()).unwrap();
    assert_eq!(result.score(), 1.0);

    let (ctx_first, _) = context(&[("left", 1)], vec![candidate(5.0, 0.0), candidate(2.0, 1.0)]);
    let template = load(&ctx_first, "first");
    assert_eq!(template.run_analysis(&ctx_first, &target()).unwrap().score(), 0.0);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn no_candidate_reports_missing_correspondence() {
    let (ctx, calls) = context(&[("left", 1)], Vec::new());
    let template = load(&ctx, "random");
    let err = template.run_analysis(&ctx, &target()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CorrespondenceNotFound);
    assert!(err.problem().contains("'sheet'"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn empty_context_knows_no_engines() {
    let ctx = Context::empty();
    let err = ctx.matcher("zncc", &json!({})).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidIdentifier);
    assert!(err.problem().contains("'zncc'"));
    let err = ctx.supervisor("least_squares", &json!({})).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidIdentifier);
}
