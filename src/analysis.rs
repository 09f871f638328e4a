//! Full document analysis: correspondence, feature extraction and
//! interpretation.
//!
//! [`analyze`] runs [`Template::run_analysis`] and then, for every feature in
//! declaration order, warps the feature region out of the interpretation
//! target, applies the feature's mutators and interprets the result with the
//! feature class's method. Feature failures are recorded per feature and do
//! not abort the others.

use crate::context::Context;
use crate::image::OwnedImage;
use crate::supervision::SupervisionResult;
use crate::template::{Feature, Template};
use crate::trace::{trace_event, trace_span, trace_warn};
use crate::util::timer::Timer;
use crate::util::{ErrorKind, OfficialEyeError, OfficialEyeResult};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Wall-clock and process CPU duration of each analysis phase.
///
/// CPU time is process-wide, so phases of concurrent analyses overlap.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct PhaseTimings {
    #[serde(serialize_with = "as_millis")]
    pub matching: Duration,
    #[serde(serialize_with = "as_millis")]
    pub matching_cpu: Duration,
    #[serde(serialize_with = "as_millis")]
    pub supervision: Duration,
    #[serde(serialize_with = "as_millis")]
    pub supervision_cpu: Duration,
    #[serde(serialize_with = "as_millis")]
    pub interpretation: Duration,
    #[serde(serialize_with = "as_millis")]
    pub interpretation_cpu: Duration,
}

fn as_millis<S: serde::Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(d.as_secs_f64() * 1e3)
}

/// The interpretation of one feature, or why it failed.
#[derive(Debug)]
pub struct FeatureOutcome {
    feature_id: String,
    value: OfficialEyeResult<Value>,
}

impl FeatureOutcome {
    pub fn feature_id(&self) -> &str {
        &self.feature_id
    }

    pub fn value(&self) -> Result<&Value, &OfficialEyeError> {
        self.value.as_ref()
    }

    pub fn to_json(&self) -> Value {
        match &self.value {
            Ok(value) => json!({"feature": self.feature_id, "value": value}),
            Err(err) => json!({"feature": self.feature_id, "error": err.to_json()}),
        }
    }
}

/// Everything one analysis produced.
#[derive(Debug)]
pub struct AnalysisResult {
    template_id: String,
    supervision: SupervisionResult,
    features: Vec<FeatureOutcome>,
    timings: PhaseTimings,
}

impl AnalysisResult {
    pub fn template_id(&self) -> &str {
        &self.template_id
    }

    /// The selected target → template transform.
    pub fn supervision(&self) -> &SupervisionResult {
        &self.supervision
    }

    /// Feature outcomes in feature declaration order.
    pub fn features(&self) -> &[FeatureOutcome] {
        &self.features
    }

    pub fn feature(&self, id: &str) -> Option<&FeatureOutcome> {
        self.features.iter().find(|f| f.feature_id == id)
    }

    pub fn timings(&self) -> PhaseTimings {
        self.timings
    }

    pub fn to_json(&self) -> Value {
        json!({
            "template": self.template_id,
            "supervision": self.supervision,
            "features": self.features.iter().map(FeatureOutcome::to_json).collect::<Vec<_>>(),
            "timings": self.timings,
        })
    }
}

fn interpret_feature(
    template: &Template,
    supervision: &SupervisionResult,
    target: &OwnedImage,
    feature: &Feature,
) -> OfficialEyeResult<Value> {
    let warped = supervision.warp_feature(target.view(), feature)?;
    let mutated = feature.apply_mutators(warped)?;
    let method = template
        .feature_classes()
        .get(feature.feature_class())
        .and_then(|class| class.interpretation());
    match method {
        Some(method) => method.interpret(mutated.view(), feature.identifier()),
        None => Ok(Value::Null),
    }
}

/// Analyses `target` against `template`.
///
/// Features are extracted from `interpretation_target` when given; it must
/// have the same dimensions as `target`.
pub fn analyze(
    ctx: &Context,
    template: &Template,
    target: &OwnedImage,
    interpretation_target: Option<&OwnedImage>,
) -> OfficialEyeResult<AnalysisResult> {
    let _span = trace_span!("analyze", template = template.identifier()).entered();
    let interpretation_target = interpretation_target.unwrap_or(target);
    if interpretation_target.shape() != target.shape() {
        return Err(OfficialEyeError::new(
            ErrorKind::InvalidInput,
            format!("while analyzing a target with template '{}'", template.identifier()),
            format!(
                "the interpretation target is {}x{}, the target is {}x{}",
                interpretation_target.width(),
                interpretation_target.height(),
                target.width(),
                target.height()
            ),
        ));
    }

    let (supervision, run_timings) = template.run_analysis_timed(ctx, target)?;

    let timer = Timer::start();
    let features: Vec<FeatureOutcome> = template
        .features()
        .iter()
        .map(|feature| FeatureOutcome {
            feature_id: feature.identifier().to_string(),
            value: interpret_feature(template, &supervision, interpretation_target, feature),
        })
        .collect();
    let interpretation = timer.elapsed();
    trace_event!(
        "interpretation_finished",
        features = features.len(),
        failed = features.iter().filter(|f| f.value.is_err()).count(),
        elapsed_ms = interpretation.wall.as_secs_f64() * 1e3,
        cpu_ms = interpretation.cpu.as_secs_f64() * 1e3
    );

    Ok(AnalysisResult {
        template_id: template.identifier().to_string(),
        supervision,
        features,
        timings: PhaseTimings {
            matching: run_timings.matching.wall,
            matching_cpu: run_timings.matching.cpu,
            supervision: run_timings.supervision.wall,
            supervision_cpu: run_timings.supervision.cpu,
            interpretation: interpretation.wall,
            interpretation_cpu: interpretation.cpu,
        },
    })
}

enum HandleState {
    Running(JoinHandle<OfficialEyeResult<AnalysisResult>>),
    Failed(OfficialEyeError),
}

/// An analysis running on its own thread.
///
/// Dropping the handle detaches the thread; its result is discarded.
pub struct AnalysisHandle {
    template_id: String,
    state: HandleState,
}

impl AnalysisHandle {
    pub fn template_id(&self) -> &str {
        &self.template_id
    }

    /// Whether the analysis has finished (successfully or not).
    pub fn is_finished(&self) -> bool {
        match &self.state {
            HandleState::Running(handle) => handle.is_finished(),
            HandleState::Failed(_) => true,
        }
    }

    /// Blocks until the analysis finishes.
    pub fn wait(self) -> OfficialEyeResult<AnalysisResult> {
        match self.state {
            HandleState::Running(handle) => handle.join().unwrap_or_else(|_| {
                Err(OfficialEyeError::new(
                    ErrorKind::Internal,
                    format!("while analyzing with template '{}'", self.template_id),
                    "the analysis thread panicked",
                ))
            }),
            HandleState::Failed(err) => Err(err),
        }
    }
}

/// Starts [`analyze`] on a new thread.
pub fn analyze_async(
    ctx: Arc<Context>,
    template: Arc<Template>,
    target: Arc<OwnedImage>,
    interpretation_target: Option<Arc<OwnedImage>>,
) -> AnalysisHandle {
    let template_id = template.identifier().to_string();
    let spawned = std::thread::Builder::new()
        .name(format!("officialeye-{template_id}"))
        .spawn(move || analyze(&ctx, &template, &target, interpretation_target.as_deref()));
    let state = match spawned {
        Ok(handle) => HandleState::Running(handle),
        Err(err) => HandleState::Failed(
            OfficialEyeError::new(
                ErrorKind::Internal,
                format!("while analyzing with template '{template_id}'"),
                "the analysis thread could not be started",
            )
            .with_cause(err),
        ),
    };
    AnalysisHandle { template_id, state }
}

/// A template source image with extracted features pasted in.
#[derive(Clone, Debug, PartialEq)]
pub struct ApplicationImage {
    pub image: OwnedImage,
    /// One entry per feature that had to be pasted unmutated.
    pub warnings: Vec<String>,
}

/// Pastes every warped and mutated feature of `target` into a copy of the
/// template source image.
///
/// A feature whose mutators change its shape is pasted without them; that
/// fallback is logged and reported in [`ApplicationImage::warnings`].
pub fn render_application_image(
    template: &Template,
    target: &OwnedImage,
    supervision: &SupervisionResult,
) -> OfficialEyeResult<ApplicationImage> {
    let mut image = template.source_image().clone();
    let mut warnings = Vec::new();
    for feature in template.features() {
        let warped = supervision.warp_feature(target.view(), feature)?;
        let mutated = feature.apply_mutators(warped.clone())?;
        let patch = if mutated.shape() == warped.shape() {
            mutated
        } else {
            let warning = format!(
                "the mutators of feature '{}' of template '{}' changed its shape from {}x{} to {}x{}; the unmutated feature is used",
                feature.identifier(),
                template.identifier(),
                warped.width(),
                warped.height(),
                mutated.width(),
                mutated.height()
            );
            trace_warn!("{warning}");
            warnings.push(warning);
            warped
        };
        feature.insert_into_image(&mut image, &patch)?;
    }
    Ok(ApplicationImage { image, warnings })
}

/// Draws keypoint (black) and feature (white) outlines over the source image.
pub fn render_template_overview(template: &Template) -> OwnedImage {
    let mut image = template.source_image().clone();
    for keypoint in template.keypoints() {
        let r = keypoint.region();
        image.draw_rect_outline(r.x(), r.y(), r.w(), r.h(), 0);
    }
    for feature in template.features() {
        let r = feature.region();
        image.draw_rect_outline(r.x(), r.y(), r.w(), r.h(), 255);
    }
    image
}
