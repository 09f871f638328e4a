//! OfficialEye extracts information from scanned or photographed documents
//! of a known layout.
//!
//! A [`Template`] annotates a reference image with keypoints (regions to
//! locate in a target image) and features (regions to extract). Analysis
//! matches the keypoints in the target, fits a target → template transform
//! from the matches, warps every feature out of the target and interprets
//! it with the method of its feature class.
//!
//! Engines (matchers, supervisors, interpretation methods and mutators) are
//! resolved by identifier through a [`Context`]. Parallel scanning is
//! available via the `rayon` feature, image files via `image-io`.

pub mod analysis;
pub mod context;
pub mod geometry;
pub mod image;
pub mod interpretation;
pub mod io;
pub mod matching;
pub mod mutator;
pub mod supervision;
pub mod template;
mod trace;
pub mod util;

pub use analysis::{analyze, analyze_async, AnalysisHandle, AnalysisResult, FeatureOutcome};
pub use context::Context;
pub use geometry::{Homography, Point};
pub use image::{ImageView, OwnedImage};
pub use matching::{Match, Matcher, MatchingResult};
pub use supervision::{SelectionPolicy, SupervisionResult, Supervisor};
pub use template::{Template, TemplateDescription};
pub use util::{ErrorKind, OfficialEyeError, OfficialEyeResult};
