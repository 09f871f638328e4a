//! Checkbox detection by dark-pixel coverage.

use super::InterpretationMethod;
use crate::image::ImageView;
use crate::util::config::parse_engine_config;
use crate::util::OfficialEyeResult;
use serde::Deserialize;
use serde_json::{json, Value};

/// Reports a feature as checked when enough of it is darker than a threshold.
#[derive(Clone, Debug, PartialEq)]
pub struct CheckboxMethod {
    threshold: u8,
    fill_ratio: f64,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct CheckboxConfig {
    threshold: u8,
    fill_ratio: f64,
}

impl Default for CheckboxConfig {
    fn default() -> Self {
        Self {
            threshold: 128,
            fill_ratio: 0.1,
        }
    }
}

impl CheckboxMethod {
    pub const ID: &'static str = "checkbox";

    pub fn new(threshold: u8, fill_ratio: f64) -> Self {
        Self {
            threshold,
            fill_ratio,
        }
    }

    pub fn from_config(config: &Value) -> OfficialEyeResult<Self> {
        let cfg: CheckboxConfig = parse_engine_config("interpretation method", Self::ID, config)?;
        Ok(Self::new(cfg.threshold, cfg.fill_ratio))
    }

    /// Share of pixels strictly darker than the threshold.
    pub fn dark_ratio(&self, image: ImageView<'_, u8>) -> f64 {
        let mut dark = 0usize;
        for y in 0..image.height() {
            if let Some(row) = image.row(y) {
                dark += row.iter().filter(|&&v| v < self.threshold).count();
            }
        }
        dark as f64 / (image.width() * image.height()) as f64
    }
}

impl InterpretationMethod for CheckboxMethod {
    fn id(&self) -> &str {
        Self::ID
    }

    fn interpret(&self, feature_image: ImageView<'_, u8>, _feature_id: &str) -> OfficialEyeResult<Value> {
        Ok(json!(self.dark_ratio(feature_image) >= self.fill_ratio))
    }
}

#[cfg(test)]
mod tests {
    use super::CheckboxMethod;
    use crate::image::OwnedImage;
    use crate::interpretation::InterpretationMethod;
    use serde_json::json;

    #[test]
    fn detects_filled_and_empty_boxes() {
        let method = CheckboxMethod::from_config(&json!({"fill_ratio": 0.25})).unwrap();
        let empty = OwnedImage::filled(10, 10, 250).unwrap();
        let filled = OwnedImage::from_fn(10, 10, |x, _| if x < 5 { 0 } else { 255 }).unwrap();
        assert_eq!(method.interpret(empty.view(), "box").unwrap(), json!(false));
        assert_eq!(method.interpret(filled.view(), "box").unwrap(), json!(true));
        assert!((method.dark_ratio(filled.view()) - 0.5).abs() < 1e-12);
    }
}
