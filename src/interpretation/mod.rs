//! Interpretation methods turn an extracted feature image into a value.
//!
//! Methods are configured per feature class with an engine id and options;
//! options are parsed into a typed config with declared defaults when the
//! template loads. Failures are scoped to the feature being interpreted.

mod checkbox;
#[cfg(feature = "image-io")]
mod file;
#[cfg(feature = "tesseract")]
mod tesseract;

pub use checkbox::CheckboxMethod;
#[cfg(feature = "image-io")]
pub use file::FileMethod;
#[cfg(feature = "tesseract")]
pub use tesseract::TesseractMethod;

use crate::image::ImageView;
use crate::util::{ErrorKind, OfficialEyeError, OfficialEyeResult};
use serde::Deserialize;
use serde_json::Value;
use std::fmt;

/// Strategy producing a serializable value from a feature image.
pub trait InterpretationMethod: Send + Sync + fmt::Debug {
    /// Identifier the method is registered under.
    fn id(&self) -> &str;

    /// Interprets the (already warped and mutated) image of `feature_id`.
    fn interpret(&self, feature_image: ImageView<'_, u8>, feature_id: &str)
        -> OfficialEyeResult<Value>;
}

/// Declarative interpretation entry: `{"method": ..., "config": {...}}`.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct InterpretationDescription {
    pub method: String,
    #[serde(default)]
    pub config: Value,
}

impl InterpretationDescription {
    pub fn new(method: impl Into<String>, config: Value) -> Self {
        Self {
            method: method.into(),
            config,
        }
    }
}

/// Builds the error for a method that failed on a feature.
pub fn interpretation_error(
    method: &str,
    feature_id: &str,
    problem: impl Into<String>,
) -> OfficialEyeError {
    OfficialEyeError::new(
        ErrorKind::InterpretationFailed,
        format!("while interpreting feature '{feature_id}' with the '{method}' method"),
        problem,
    )
}
