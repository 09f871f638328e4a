//! OCR through an external `tesseract` executable.

use super::{interpretation_error, InterpretationMethod};
use crate::image::io::save_gray_image;
use crate::image::{ImageView, OwnedImage};
use crate::util::config::parse_engine_config;
use crate::util::OfficialEyeResult;
use serde::Deserialize;
use serde_json::{json, Value};
use std::process::Command;

/// Recognises text by handing the feature image to `tesseract`.
#[derive(Clone, Debug, PartialEq)]
pub struct TesseractMethod {
    lang: String,
    config: String,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct TesseractConfig {
    lang: String,
    config: String,
}

impl Default for TesseractConfig {
    fn default() -> Self {
        Self {
            lang: "eng".to_string(),
            config: String::new(),
        }
    }
}

impl TesseractMethod {
    pub const ID: &'static str = "ocr_tesseract";

    pub fn from_config(config: &Value) -> OfficialEyeResult<Self> {
        let cfg: TesseractConfig = parse_engine_config("interpretation method", Self::ID, config)?;
        Ok(Self {
            lang: cfg.lang,
            config: cfg.config,
        })
    }
}

impl InterpretationMethod for TesseractMethod {
    fn id(&self) -> &str {
        Self::ID
    }

    fn interpret(&self, feature_image: ImageView<'_, u8>, feature_id: &str) -> OfficialEyeResult<Value> {
        let file = tempfile::Builder::new()
            .prefix("officialeye-")
            .suffix(".png")
            .tempfile()
            .map_err(|err| {
                interpretation_error(Self::ID, feature_id, "could not create a temporary file")
                    .with_cause(err)
            })?;
        save_gray_image(&OwnedImage::from_view(feature_image)?, file.path())?;

        let mut command = Command::new("tesseract");
        command
            .arg(file.path())
            .arg("stdout")
            .arg("-l")
            .arg(&self.lang);
        command.args(self.config.split_whitespace());
        let output = command.output().map_err(|err| {
            interpretation_error(Self::ID, feature_id, "could not start the tesseract executable")
                .with_cause(err)
        })?;
        if !output.status.success() {
            return Err(interpretation_error(
                Self::ID,
                feature_id,
                format!(
                    "tesseract exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ));
        }
        Ok(json!(String::from_utf8_lossy(&output.stdout).trim()))
    }
}
