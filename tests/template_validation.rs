use officialeye::template::description::{
    FeatureClassDescription, FeatureDescription, KeypointDescription,
};
use officialeye::mutator::MutatorDescription;
use officialeye::{Context, ErrorKind, OwnedImage, Template, TemplateDescription};
use serde_json::json;

fn source_image() -> OwnedImage {
    OwnedImage::from_fn(120, 90, |x, y| ((x * 7 + y * 13) % 251) as u8).unwrap()
}

fn description() -> TemplateDescription {
    TemplateDescription::from_json(
        &json!({
            "id": "form",
            "name": "Registration form",
            "source": "form.png",
            "keypoints": {
                "header": {"x": 4, "y": 4, "w": 20, "h": 12, "matches": {"min": 1, "max": 1}}
            },
            "features": {
                "tick": {"x": 50, "y": 40, "w": 10, "h": 10, "feature_class": "box"}
            },
            "feature_classes": {
                "box": {"interpretation": {"method": "checkbox"}}
            },
            "matching": {"engine": "zncc"},
            "supervision": {"engine": "least_squares", "config": {"least_squares": {}}}
        })
        .to_string(),
    )
    .unwrap()
}

#[test]
fn valid_template_loads_and_registers() {
    let ctx = Context::new();
    let template = Template::new(&ctx, description(), source_image()).unwrap();
    assert_eq!(template.identifier(), "form");
    assert_eq!(template.keypoints().len(), 1);
    assert_eq!(template.features()[0].feature_class(), "box");
    assert!(template.validate().is_ok());
    assert_eq!(ctx.template_ids(), vec!["form".to_string()]);
    assert!(ctx.template("form").is_some());
}

#[test]
fn loading_the_same_template_twice_fails() {
    let ctx = Context::new();
    Template::new(&ctx, description(), source_image()).unwrap();
    let err = Template::new(&ctx, description(), source_image()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTemplate);
}

#[test]
fn match_bounds_are_checked() {
    let ctx = Context::new();

    let mut desc = description();
    desc.keypoints[0].1 = KeypointDescription::new(4, 4, 20, 12, 3, 2);
    let err = Template::new(&ctx, desc, source_image()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidKeypoint);

    let mut desc = description();
    desc.keypoints[0].1 = KeypointDescription::new(4, 4, 20, 12, -1, 2);
    let err = Template::new(&ctx, desc, source_image()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidKeypoint);
    assert!(err.while_text().contains("'header'"));

    let mut desc = description();
    desc.keypoints[0].1 = KeypointDescription::new(4, 4, 20, 12, 0, 0);
    let template = Template::new(&ctx, desc, source_image()).unwrap();
    assert_eq!(template.keypoints()[0].matches_max(), 0);
}

#[test]
fn regions_must_fit_the_source_image() {
    let ctx = Context::new();
    let mut desc = description();
    desc.keypoints[0].1 = KeypointDescription::new(110, 4, 20, 12, 1, 1);
    let err = Template::new(&ctx, desc, source_image()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidKeypoint);
}

#[test]
fn duplicate_identifiers_are_rejected() {
    let ctx = Context::new();

    let mut desc = description();
    desc.keypoints
        .push(("header".into(), KeypointDescription::new(60, 4, 20, 12, 1, 1)));
    let err = Template::new(&ctx, desc, source_image()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidKeypoint);
    assert!(err.problem().contains("'header'"));

    let mut desc = description();
    desc.features
        .push(("tick".into(), FeatureDescription::new(70, 40, 10, 10, "box")));
    let err = Template::new(&ctx, desc, source_image()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidFeature);

    let mut desc = description();
    desc.features
        .push(("header".into(), FeatureDescription::new(70, 40, 10, 10, "box")));
    let err = Template::new(&ctx, desc, source_image()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidFeature);
    assert!(err.problem().contains("keypoint"));
}

#[test]
fn unknown_engines_are_named_in_the_error() {
    let ctx = Context::new();

    let mut desc = description();
    desc.matching.engine = "sift".into();
    let err = Template::new(&ctx, desc, source_image()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidIdentifier);
    assert!(err.problem().contains("'sift'"));

    let mut desc = description();
    desc.supervision.engine = "ransac".into();
    let err = Template::new(&ctx, desc, source_image()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidIdentifier);
    assert!(err.problem().contains("'ransac'"));

    let mut desc = description();
    desc.supervision.result = "median".into();
    let err = Template::new(&ctx, desc, source_image()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidIdentifier);
    assert!(err.problem().contains("'median'"));
    assert!(ctx.template_ids().is_empty());
}

#[test]
fn feature_mutator_errors_name_the_feature() {
    let ctx = Context::new();
    let mut desc = description();
    desc.features[0].1.mutators = vec![MutatorDescription::new("sharpen", json!({}))];
    let err = Template::new(&ctx, desc, source_image()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidIdentifier);
    assert_eq!(
        err.while_text(),
        "while loading the mutators of feature 'tick' of template 'form'"
    );
    assert!(err.problem().contains("'sharpen'"));
    assert!(err.cause().is_some());
    assert!(ctx.template_ids().is_empty());
}

#[test]
fn engine_options_are_parsed_at_load_time() {
    let ctx = Context::new();
    let mut desc = description();
    desc.matching.config = json!({"min_score": 0.9, "sharpness": 2});
    let err = Template::new(&ctx, desc, source_image()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidConfig);

    let mut desc = description();
    desc.supervision.config = serde_json::Map::new();
    let template = Template::new(&ctx, desc, source_image()).unwrap();
    assert!(template.supervisor(&ctx).is_ok());
}

#[test]
fn feature_classes_inherit_and_validate() {
    let ctx = Context::new();
    let mut desc = description();
    desc.feature_classes = vec![
        (
            "base".into(),
            serde_json::from_value::<FeatureClassDescription>(json!({
                "abstract": true,
                "meta": {"group": "consent"},
                "interpretation": {"method": "checkbox", "config": {"fill_ratio": 0.3}},
                "min_width": 8
            }))
            .unwrap(),
        ),
        (
            "box".into(),
            serde_json::from_value::<FeatureClassDescription>(json!({
                "inherits": "base",
                "meta": {"label": "tick"}
            }))
            .unwrap(),
        ),
    ];
    let template = Template::new(&ctx, desc.clone(), source_image()).unwrap();
    let class = template.feature_classes().get("box").unwrap();
    assert_eq!(class.parent(), Some("base"));
    assert_eq!(class.meta()["group"], "consent");
    assert_eq!(class.meta()["label"], "tick");
    assert!(class.interpretation().is_some());

    let ctx = Context::new();
    let mut abstract_use = desc.clone();
    abstract_use.features[0].1.feature_class = "base".into();
    let err = Template::new(&ctx, abstract_use, source_image()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidFeature);

    let mut narrow = desc.clone();
    narrow.features[0].1.w = 4;
    let err = Template::new(&ctx, narrow, source_image()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidFeature);
    assert!(err.while_text().contains("'tick'"));

    let mut cyclic = desc;
    cyclic.feature_classes[0].1.inherits = Some("box".into());
    let err = Template::new(&ctx, cyclic, source_image()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidFeatureClass);
}

#[test]
fn unknown_feature_class_is_rejected() {
    let ctx = Context::new();
    let mut desc = description();
    desc.features[0].1.feature_class = "signature".into();
    let err = Template::new(&ctx, desc, source_image()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidFeature);
    assert!(err.problem().contains("signature"));
}
