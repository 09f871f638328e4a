//! Exports feature images to disk.

use super::{interpretation_error, InterpretationMethod};
use crate::image::io::save_gray_image;
use crate::image::{ImageView, OwnedImage};
use crate::util::config::parse_engine_config;
use crate::util::OfficialEyeResult;
use serde::Deserialize;
use serde_json::{json, Value};

/// Writes each feature image to a path; `{feature}` is replaced by its id.
#[derive(Clone, Debug, PartialEq)]
pub struct FileMethod {
    path: String,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    path: String,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            path: "{feature}.png".to_string(),
        }
    }
}

impl FileMethod {
    pub const ID: &'static str = "file";

    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    pub fn from_config(config: &Value) -> OfficialEyeResult<Self> {
        let cfg: FileConfig = parse_engine_config("interpretation method", Self::ID, config)?;
        Ok(Self::new(cfg.path))
    }
}

impl InterpretationMethod for FileMethod {
    fn id(&self) -> &str {
        Self::ID
    }

    fn interpret(&self, feature_image: ImageView<'_, u8>, feature_id: &str) -> OfficialEyeResult<Value> {
        let path = self.path.replace("{feature}", feature_id);
        let owned = OwnedImage::from_view(feature_image)?;
        save_gray_image(&owned, &path).map_err(|err| {
            interpretation_error(Self::ID, feature_id, format!("could not write '{path}'"))
                .with_cause(err)
        })?;
        Ok(json!(path))
    }
}
