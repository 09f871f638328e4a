use officialeye::analysis::{analyze, analyze_async, render_application_image};
use officialeye::geometry::Point;
use officialeye::{Context, ErrorKind, OwnedImage, SelectionPolicy, Template, TemplateDescription};
use serde_json::{json, Value};
use std::sync::Arc;

const WIDTH: usize = 200;
const HEIGHT: usize = 160;
const SHIFT_X: i64 = 6;
const SHIFT_Y: i64 = 4;

fn lattice(ix: i64, iy: i64) -> f64 {
    let mut h = (ix.wrapping_mul(374_761_393) ^ iy.wrapping_mul(668_265_263)) as u64;
    h = (h ^ (h >> 13)).wrapping_mul(1_274_126_177);
    ((h ^ (h >> 16)) & 0xFF) as f64
}

fn value_noise(x: f64, y: f64, cell: f64) -> f64 {
    let (gx, gy) = (x / cell, y / cell);
    let (ix, iy) = (gx.floor() as i64, gy.floor() as i64);
    let (fx, fy) = (gx - gx.floor(), gy - gy.floor());
    let top = lattice(ix, iy) * (1.0 - fx) + lattice(ix + 1, iy) * fx;
    let bottom = lattice(ix, iy + 1) * (1.0 - fx) + lattice(ix + 1, iy + 1) * fx;
    top * (1.0 - fy) + bottom * fy
}

/// The synthetic document: textured paper with a filled box and a blank box.
fn document(x: i64, y: i64) -> u8 {
    if (80..110).contains(&x) && (60..80).contains(&y) {
        return 10;
    }
    if (120..150).contains(&x) && (30..50).contains(&y) {
        return 245;
    }
    let (xf, yf) = (x as f64, y as f64);
    let v = 0.7 * value_noise(xf, yf, 8.0) + 0.3 * value_noise(xf, yf, 3.0);
    v.round().clamp(0.0, 255.0) as u8
}

fn source_image() -> OwnedImage {
    OwnedImage::from_fn(WIDTH, HEIGHT, |x, y| document(x as i64, y as i64)).unwrap()
}

fn target_image() -> OwnedImage {
    OwnedImage::from_fn(WIDTH, HEIGHT, |x, y| {
        document(x as i64 - SHIFT_X, y as i64 - SHIFT_Y)
    })
    .unwrap()
}

/// Keypoints and features are declared out of alphabetical order so that
/// declaration order is observable.
const CONSENT_FORM: &str = r#"{
    "id": "$ID",
    "name": "Consent form",
    "source": "consent.png",
    "keypoints": {
        "top_left": {"x": 8, "y": 8, "w": 24, "h": 24, "matches": {"min": 1, "max": 1}},
        "top_right": {"x": 160, "y": 8, "w": 24, "h": 24, "matches": {"min": 1, "max": 1}},
        "bottom_left": {"x": 8, "y": 124, "w": 24, "h": 24, "matches": {"min": 1, "max": 1}},
        "bottom_right": {"x": 160, "y": 124, "w": 24, "h": 24, "matches": {"min": 1, "max": 1}},
        "middle": {"x": 90, "y": 100, "w": 24, "h": 24, "matches": {"min": 0, "max": 1}}
    },
    "features": {
        "newsletter": {"x": 122, "y": 32, "w": 26, "h": 16, "feature_class": "tick"},
        "signature": {"x": 20, "y": 60, "w": 40, "h": 16, "feature_class": "text",
                      "mutators": [{"kind": "rotate", "config": {"quarter_turns": 1}}]},
        "consent": {"x": 82, "y": 62, "w": 26, "h": 16, "feature_class": "tick"}
    },
    "feature_classes": {
        "field": {"abstract": true, "meta": {"form": "consent"}},
        "tick": {"inherits": "field", "interpretation": {"method": "checkbox"}},
        "text": {"inherits": "field"}
    },
    "matching": {"engine": "zncc", "config": {"pyramid_levels": 2, "min_score": 0.9}},
    "supervision": {
        "engine": "$SUPERVISOR",
        "config": {
            "least_squares": {"transform": "perspective"},
            "combinatorial": {"max_transformation_error": 2.0, "seed": 11}
        },
        "result": "best_mse"
    }
}"#;

fn description(id: &str, supervisor: &str) -> TemplateDescription {
    let text = CONSENT_FORM
        .replace("$ID", id)
        .replace("$SUPERVISOR", supervisor);
    TemplateDescription::from_json(&text).unwrap()
}

fn assert_shift(result: &officialeye::SupervisionResult) {
    for (x, y) in [(20.0, 20.0), (100.0, 70.0), (180.0, 140.0)] {
        let mapped = result.transform_point(Point::new(x, y)).unwrap();
        assert!((mapped.x - (x - SHIFT_X as f64)).abs() < 0.75, "x: {mapped:?}");
        assert!((mapped.y - (y - SHIFT_Y as f64)).abs() < 0.75, "y: {mapped:?}");
    }
}

#[test]
fn least_squares_recovers_the_shift() {
    let ctx = Context::new();
    let template = Template::new(&ctx, description("consent", "least_squares"), source_image())
        .unwrap();
    assert_eq!(template.policy(), SelectionPolicy::BestMse);

    let result = template.run_analysis(&ctx, &target_image()).unwrap();
    assert_eq!(result.template_id(), "consent");
    assert_eq!(result.match_count(), 5);
    assert!(result.weighted_mse() < 0.5);
    assert_shift(&result);
}

#[test]
fn combinatorial_recovers_the_shift() {
    let ctx = Context::new();
    let template = Template::new(&ctx, description("consent", "combinatorial"), source_image())
        .unwrap();
    let result = template.run_analysis(&ctx, &target_image()).unwrap();
    assert!(result.match_count() >= 4);
    assert_shift(&result);
}

#[test]
fn features_are_interpreted_by_their_class() {
    let ctx = Context::new();
    let template = Template::new(&ctx, description("consent", "least_squares"), source_image())
        .unwrap();
    let target = target_image();
    let result = analyze(&ctx, &template, &target, None).unwrap();

    let ids: Vec<&str> = result.features().iter().map(|f| f.feature_id()).collect();
    assert_eq!(ids, ["newsletter", "signature", "consent"]);
    assert_eq!(result.feature("consent").unwrap().value().unwrap(), &json!(true));
    assert_eq!(result.feature("newsletter").unwrap().value().unwrap(), &json!(false));
    assert_eq!(result.feature("signature").unwrap().value().unwrap(), &Value::Null);

    let report = result.to_json();
    assert_eq!(report["template"], "consent");
    assert_eq!(report["features"][0]["feature"], "newsletter");
    assert_eq!(report["features"].as_array().unwrap().len(), 3);
    assert!(report["supervision"]["transform"].is_array());
    for phase in ["matching", "supervision", "interpretation"] {
        assert!(report["timings"][phase].as_f64().unwrap() >= 0.0);
        assert!(report["timings"][format!("{phase}_cpu")].as_f64().unwrap() >= 0.0);
    }
    let timings = result.timings();
    assert!(timings.matching > std::time::Duration::ZERO);
}

#[test]
fn interpretation_target_must_match_the_target_shape() {
    let ctx = Context::new();
    let template = Template::new(&ctx, description("consent", "least_squares"), source_image())
        .unwrap();
    let small = OwnedImage::filled(WIDTH / 2, HEIGHT, 255).unwrap();
    let err = analyze(&ctx, &template, &target_image(), Some(&small)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    // A blank interpretation target turns every checkbox off.
    let blank = OwnedImage::filled(WIDTH, HEIGHT, 255).unwrap();
    let result = analyze(&ctx, &template, &target_image(), Some(&blank)).unwrap();
    assert_eq!(result.feature("consent").unwrap().value().unwrap(), &json!(false));
}

#[test]
fn async_analysis_matches_the_synchronous_one() {
    let ctx = Arc::new(Context::new());
    let template = Template::new(&ctx, description("consent", "least_squares"), source_image())
        .unwrap();
    let target = Arc::new(target_image());

    let sync = analyze(&ctx, &template, &target, None).unwrap();
    let handle = analyze_async(Arc::clone(&ctx), Arc::clone(&template), Arc::clone(&target), None);
    assert_eq!(handle.template_id(), "consent");
    let async_result = handle.wait().unwrap();

    assert_eq!(async_result.supervision(), sync.supervision());
    for (a, b) in async_result.features().iter().zip(sync.features()) {
        assert_eq!(a.feature_id(), b.feature_id());
        assert_eq!(a.value().ok(), b.value().ok());
    }
}

#[test]
fn shape_changing_feature_mutators_fall_back_with_a_warning() {
    let ctx = Context::new();
    let template = Template::new(&ctx, description("consent", "least_squares"), source_image())
        .unwrap();
    let target = target_image();
    let supervision = template.run_analysis(&ctx, &target).unwrap();
    let application = render_application_image(&template, &target, &supervision).unwrap();

    assert_eq!(application.image.shape(), template.source_image().shape());
    assert_eq!(application.warnings.len(), 1);
    assert!(application.warnings[0].contains("'signature'"));
    // The unmutated region is pasted in place.
    let region = template.feature("signature").unwrap().region();
    let pasted = application.image.crop(region.x(), region.y(), region.w(), region.h()).unwrap();
    let original = template.source_image().crop(region.x(), region.y(), region.w(), region.h()).unwrap();
    let diff: u32 = pasted
        .data()
        .iter()
        .zip(original.data())
        .map(|(&a, &b)| (a as i32 - b as i32).unsigned_abs())
        .max()
        .unwrap();
    assert!(diff <= 40, "max pixel difference {diff}");
}

#[test]
fn unmatchable_target_reports_missing_correspondence() {
    let ctx = Context::new();
    let template = Template::new(&ctx, description("consent", "least_squares"), source_image())
        .unwrap();
    let flat = OwnedImage::filled(WIDTH, HEIGHT, 128).unwrap();
    let err = template.run_analysis(&ctx, &flat).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MatchCountOutOfBounds);
    // The first declared keypoint is validated first.
    assert!(err.while_text().contains("'top_left'"), "{err}");
}

#[test]
fn target_mutators_run_before_matching() {
    let ctx = Context::new();
    let mut desc = description("consent", "least_squares");
    desc.mutators.target = vec![officialeye::mutator::MutatorDescription::new("invert", json!({}))];
    let template = Template::new(&ctx, desc, source_image()).unwrap();
    let inverted = OwnedImage::from_fn(WIDTH, HEIGHT, |x, y| {
        255 - document(x as i64 - SHIFT_X, y as i64 - SHIFT_Y)
    })
    .unwrap();
    let result = template.run_analysis(&ctx, &inverted).unwrap();
    assert_shift(&result);
}
