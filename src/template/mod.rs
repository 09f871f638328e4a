//! Templates: the annotated reference document and its analysis pipeline.
//!
//! A template is built once from a [`TemplateDescription`] and its source
//! image, validated eagerly (identifiers, regions, feature classes, engine
//! ids and engine options) and then only read. Construction registers the
//! template in the [`Context`].

pub mod description;
mod feature_class;
mod region;

pub use description::TemplateDescription;
pub use feature_class::{FeatureClass, FeatureClassManager};
pub use region::{Feature, Keypoint, Region};

use crate::context::Context;
use crate::image::OwnedImage;
use crate::matching::{Matcher, MatchingResult};
use crate::mutator::{apply_mutators, Mutator, MutatorDescription};
use crate::supervision::{SelectionPolicy, SupervisionResult, Supervisor};
use crate::trace::{trace_event, trace_span, trace_warn};
use crate::util::timer::{Elapsed, Timer};
use crate::util::{ErrorKind, OfficialEyeError, OfficialEyeResult};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Durations of the two correspondence phases.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub(crate) struct RunTimings {
    pub(crate) matching: Elapsed,
    pub(crate) supervision: Elapsed,
}

/// A validated, immutable template.
#[derive(Debug)]
pub struct Template {
    identifier: String,
    name: String,
    source: PathBuf,
    source_image: OwnedImage,
    keypoints: Vec<Keypoint>,
    features: Vec<Feature>,
    feature_classes: FeatureClassManager,
    source_mutators: Vec<Box<dyn Mutator>>,
    target_mutators: Vec<Box<dyn Mutator>>,
    matching_engine: String,
    matching_config: Value,
    supervision_engine: String,
    supervision_config: Map<String, Value>,
    policy: SelectionPolicy,
}

fn build_mutators(
    ctx: &Context,
    template_id: &str,
    list: &str,
    descriptions: &[MutatorDescription],
) -> OfficialEyeResult<Vec<Box<dyn Mutator>>> {
    descriptions
        .iter()
        .map(|m| {
            ctx.mutator(&m.kind, &m.config).map_err(|err| {
                OfficialEyeError::new(
                    err.kind(),
                    format!("while loading the {list} mutators of template '{template_id}'"),
                    err.problem(),
                )
                .with_cause(err)
            })
        })
        .collect()
}

impl Template {
    /// Builds, validates and registers a template.
    pub fn new(
        ctx: &Context,
        desc: TemplateDescription,
        source_image: OwnedImage,
    ) -> OfficialEyeResult<Arc<Self>> {
        let id = desc.id.clone();
        let _span = trace_span!("template_load", template = id.as_str()).entered();
        let size = source_image.shape();

        let mut keypoints: Vec<Keypoint> = Vec::with_capacity(desc.keypoints.len());
        for (kp_id, kp_desc) in &desc.keypoints {
            if keypoints.iter().any(|kp| kp.identifier() == kp_id) {
                return Err(OfficialEyeError::new(
                    ErrorKind::InvalidKeypoint,
                    format!("while loading keypoint '{kp_id}' of template '{id}'"),
                    format!("There is already a keypoint with the same identifier '{kp_id}'."),
                ));
            }
            keypoints.push(Keypoint::new(&id, kp_id, kp_desc, size)?);
        }

        let feature_classes = FeatureClassManager::load(ctx, &id, &desc.feature_classes)?;

        let mut features: Vec<Feature> = Vec::with_capacity(desc.features.len());
        for (f_id, f_desc) in &desc.features {
            let clash = if keypoints.iter().any(|kp| kp.identifier() == f_id) {
                Some("keypoint")
            } else if features.iter().any(|f| f.identifier() == f_id) {
                Some("feature")
            } else {
                None
            };
            if let Some(kind) = clash {
                return Err(OfficialEyeError::new(
                    ErrorKind::InvalidFeature,
                    format!("while loading feature '{f_id}' of template '{id}'"),
                    format!("There is already a {kind} with the same identifier '{f_id}'."),
                ));
            }
            features.push(Feature::new(ctx, &id, f_id, f_desc, size)?);
        }

        let source_mutators = build_mutators(ctx, &id, "source", &desc.mutators.source)?;
        let target_mutators = build_mutators(ctx, &id, "target", &desc.mutators.target)?;

        let policy = desc
            .supervision
            .result
            .parse::<SelectionPolicy>()
            .map_err(|err| {
                OfficialEyeError::new(
                    err.kind(),
                    format!("while loading the supervision settings of template '{id}'"),
                    err.problem(),
                )
            })?;

        let template = Self {
            identifier: id,
            name: desc.name,
            source: desc.source,
            source_image,
            keypoints,
            features,
            feature_classes,
            source_mutators,
            target_mutators,
            matching_engine: desc.matching.engine,
            matching_config: desc.matching.config,
            supervision_engine: desc.supervision.engine,
            supervision_config: desc.supervision.config,
            policy,
        };
        template.validate()?;
        template.matcher(ctx)?;
        template.supervisor(ctx)?;

        let template = Arc::new(template);
        ctx.add_template(Arc::clone(&template))?;
        trace_event!(
            "template_loaded",
            keypoints = template.keypoints.len(),
            features = template.features.len()
        );
        Ok(template)
    }

    /// Reads a JSON template description and its source image from disk.
    ///
    /// A relative `source` is resolved against the description's directory.
    #[cfg(feature = "image-io")]
    pub fn load<P: AsRef<Path>>(ctx: &Context, path: P) -> OfficialEyeResult<Arc<Self>> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|err| {
            OfficialEyeError::new(
                ErrorKind::IoFailed,
                format!("while reading template '{}'", path.display()),
                "the template description could not be read",
            )
            .with_cause(err)
        })?;
        let mut desc = TemplateDescription::from_json(&text).map_err(|err| {
            OfficialEyeError::new(
                err.kind(),
                format!("while parsing template '{}'", path.display()),
                err.problem(),
            )
            .with_cause(err)
        })?;
        desc.source = resolve_source(path, &desc.source);
        let image = crate::image::io::load_gray_image(&desc.source)?;
        Self::new(ctx, desc, image)
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path of the source image as given (or resolved by [`Template::load`]).
    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn width(&self) -> usize {
        self.source_image.width()
    }

    pub fn height(&self) -> usize {
        self.source_image.height()
    }

    /// Keypoints in declaration order.
    pub fn keypoints(&self) -> &[Keypoint] {
        &self.keypoints
    }

    /// Features in declaration order.
    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub fn keypoint(&self, id: &str) -> Option<&Keypoint> {
        self.keypoints.iter().find(|kp| kp.identifier() == id)
    }

    pub fn feature(&self, id: &str) -> Option<&Feature> {
        self.features.iter().find(|f| f.identifier() == id)
    }

    pub fn feature_classes(&self) -> &FeatureClassManager {
        &self.feature_classes
    }

    /// The reference image, without mutators.
    pub fn source_image(&self) -> &OwnedImage {
        &self.source_image
    }

    /// The reference image after the source mutators.
    pub fn mutated_source_image(&self) -> OfficialEyeResult<OwnedImage> {
        apply_mutators(self.source_image.clone(), &self.source_mutators)
    }

    pub fn target_mutators(&self) -> &[Box<dyn Mutator>] {
        &self.target_mutators
    }

    pub fn matching_engine(&self) -> &str {
        &self.matching_engine
    }

    pub fn supervision_engine(&self) -> &str {
        &self.supervision_engine
    }

    pub fn policy(&self) -> SelectionPolicy {
        self.policy
    }

    /// Re-checks every feature against its feature class.
    pub fn validate(&self) -> OfficialEyeResult<()> {
        self.feature_classes.validate(&self.identifier, &self.features)
    }

    /// Instantiates a fresh matcher for one analysis.
    pub fn matcher(&self, ctx: &Context) -> OfficialEyeResult<Box<dyn Matcher>> {
        ctx.matcher(&self.matching_engine, &self.matching_config)
    }

    /// Instantiates a fresh supervisor for one analysis.
    ///
    /// The options are the entry of the supervision config named after the
    /// engine; a missing entry means an empty config.
    pub fn supervisor(&self, ctx: &Context) -> OfficialEyeResult<Box<dyn Supervisor>> {
        let config = match self.supervision_config.get(&self.supervision_engine) {
            Some(config) => config.clone(),
            None => {
                trace_warn!(
                    "template '{}' has no configuration entry for the '{}' supervisor; using defaults",
                    self.identifier,
                    self.supervision_engine
                );
                Value::Object(Map::new())
            }
        };
        ctx.supervisor(&self.supervision_engine, &config)
    }

    /// Establishes correspondence with `target` and returns the selected
    /// target → template transform.
    pub fn run_analysis(
        &self,
        ctx: &Context,
        target: &OwnedImage,
    ) -> OfficialEyeResult<SupervisionResult> {
        self.run_analysis_timed(ctx, target).map(|(result, _)| result)
    }

    pub(crate) fn run_analysis_timed(
        &self,
        ctx: &Context,
        target: &OwnedImage,
    ) -> OfficialEyeResult<(SupervisionResult, RunTimings)> {
        let _span = trace_span!("run_analysis", template = self.identifier.as_str()).entered();
        let target = apply_mutators(target.clone(), &self.target_mutators)?;

        let timer = Timer::start();
        let mut matcher = self.matcher(ctx)?;
        matcher.setup(self, &target)?;
        let mut matching = MatchingResult::new(self);
        for keypoint in &self.keypoints {
            matcher.match_keypoint(keypoint)?;
            for m in matcher.matches_for_keypoint(keypoint) {
                matching.add_match(m.clone())?;
            }
        }
        matching.validate(self)?;
        let matching_time = timer.elapsed();
        trace_event!(
            "matching_finished",
            matches = matching.total_match_count(),
            elapsed_ms = matching_time.wall.as_secs_f64() * 1e3,
            cpu_ms = matching_time.cpu.as_secs_f64() * 1e3
        );

        let timer = Timer::start();
        let mut supervisor = self.supervisor(ctx)?;
        supervisor.setup(self, &matching)?;
        let candidates = supervisor.supervise(self, &matching)?;
        let candidate_count = candidates.len();
        let result = self.policy.select(candidates).ok_or_else(|| {
            OfficialEyeError::new(
                ErrorKind::CorrespondenceNotFound,
                format!("while supervising the matches of template '{}'", self.identifier),
                format!(
                    "The '{}' supervisor could not establish a transform for template '{}'.",
                    self.supervision_engine, self.identifier
                ),
            )
        })?;
        let supervision_time = timer.elapsed();
        trace_event!(
            "supervision_finished",
            candidates = candidate_count,
            elapsed_ms = supervision_time.wall.as_secs_f64() * 1e3,
            cpu_ms = supervision_time.cpu.as_secs_f64() * 1e3
        );

        Ok((
            result,
            RunTimings {
                matching: matching_time,
                supervision: supervision_time,
            },
        ))
    }
}

/// Resolves `source` against the directory of the description at `path`.
#[cfg_attr(not(feature = "image-io"), allow(dead_code))]
fn resolve_source(path: &Path, source: &Path) -> PathBuf {
    if source.is_absolute() {
        return source.to_path_buf();
    }
    path.parent()
        .map_or_else(|| source.to_path_buf(), |dir| dir.join(source))
}
