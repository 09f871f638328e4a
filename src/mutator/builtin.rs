//! Built-in mutators.

use super::Mutator;
use crate::image::OwnedImage;
use crate::util::config::parse_engine_config;
use crate::util::OfficialEyeResult;
use serde::Deserialize;
use serde_json::Value;

const ROLE: &str = "mutator";

/// Thresholds the image to pure black and white.
///
/// With no explicit `threshold` the level is chosen by Otsu's method.
#[derive(Clone, Debug, PartialEq)]
pub struct BinarizationMutator {
    threshold: Option<u8>,
    invert: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct BinarizationConfig {
    threshold: Option<u8>,
    invert: bool,
}

impl BinarizationMutator {
    pub const ID: &'static str = "binarization";

    pub fn new(threshold: Option<u8>, invert: bool) -> Self {
        Self { threshold, invert }
    }

    pub fn from_config(config: &Value) -> OfficialEyeResult<Self> {
        let cfg: BinarizationConfig = parse_engine_config(ROLE, Self::ID, config)?;
        Ok(Self::new(cfg.threshold, cfg.invert))
    }
}

/// Otsu's threshold: maximises the between-class variance of the histogram.
pub(crate) fn otsu_threshold(data: &[u8]) -> u8 {
    let mut hist = [0u64; 256];
    for &v in data {
        hist[v as usize] += 1;
    }
    let total = data.len() as f64;
    let sum_all: f64 = hist
        .iter()
        .enumerate()
        .map(|(v, &c)| v as f64 * c as f64)
        .sum();

    let mut best = (0u8, -1.0f64);
    let mut weight_bg = 0.0;
    let mut sum_bg = 0.0;
    for (t, &count) in hist.iter().enumerate() {
        weight_bg += count as f64;
        if weight_bg == 0.0 {
            continue;
        }
        let weight_fg = total - weight_bg;
        if weight_fg == 0.0 {
            break;
        }
        sum_bg += t as f64 * count as f64;
        let mean_bg = sum_bg / weight_bg;
        let mean_fg = (sum_all - sum_bg) / weight_fg;
        let between = weight_bg * weight_fg * (mean_bg - mean_fg).powi(2);
        if between > best.1 {
            best = (t as u8, between);
        }
    }
    best.0
}

impl Mutator for BinarizationMutator {
    fn id(&self) -> &str {
        Self::ID
    }

    fn mutate(&self, image: &OwnedImage) -> OfficialEyeResult<OwnedImage> {
        let threshold = self
            .threshold
            .unwrap_or_else(|| otsu_threshold(image.data()));
        let (fg, bg) = if self.invert { (0, 255) } else { (255, 0) };
        let data = image
            .data()
            .iter()
            .map(|&v| if v > threshold { fg } else { bg })
            .collect();
        OwnedImage::new(data, image.width(), image.height())
    }
}

/// Inverts intensities (`255 - v`).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct InvertMutator;

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct EmptyConfig {}

impl InvertMutator {
    pub const ID: &'static str = "invert";

    pub fn from_config(config: &Value) -> OfficialEyeResult<Self> {
        let _: EmptyConfig = parse_engine_config(ROLE, Self::ID, config)?;
        Ok(Self)
    }
}

impl Mutator for InvertMutator {
    fn id(&self) -> &str {
        Self::ID
    }

    fn mutate(&self, image: &OwnedImage) -> OfficialEyeResult<OwnedImage> {
        let data = image.data().iter().map(|&v| 255 - v).collect();
        OwnedImage::new(data, image.width(), image.height())
    }
}

/// Square box filter with edge clamping.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoxBlurMutator {
    radius: usize,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct BoxBlurConfig {
    radius: usize,
}

impl Default for BoxBlurConfig {
    fn default() -> Self {
        Self { radius: 1 }
    }
}

impl BoxBlurMutator {
    pub const ID: &'static str = "box_blur";

    pub fn new(radius: usize) -> Self {
        Self { radius }
    }

    pub fn from_config(config: &Value) -> OfficialEyeResult<Self> {
        let cfg: BoxBlurConfig = parse_engine_config(ROLE, Self::ID, config)?;
        Ok(Self::new(cfg.radius))
    }

    fn blur_pass(
        src: &[u8],
        width: usize,
        height: usize,
        radius: usize,
        horizontal: bool,
    ) -> Vec<u8> {
        let mut out = vec![0u8; src.len()];
        for y in 0..height {
            for x in 0..width {
                let (pos, len) = if horizontal { (x, width) } else { (y, height) };
                let lo = pos.saturating_sub(radius);
                let hi = (pos + radius).min(len - 1);
                let mut sum = 0u32;
                for k in lo..=hi {
                    let idx = if horizontal { y * width + k } else { k * width + x };
                    sum += u32::from(src[idx]);
                }
                let count = (hi - lo + 1) as u32;
                out[y * width + x] = ((sum + count / 2) / count) as u8;
            }
        }
        out
    }
}

impl Mutator for BoxBlurMutator {
    fn id(&self) -> &str {
        Self::ID
    }

    fn mutate(&self, image: &OwnedImage) -> OfficialEyeResult<OwnedImage> {
        if self.radius == 0 {
            return Ok(image.clone());
        }
        let (width, height) = image.shape();
        let pass = Self::blur_pass(image.data(), width, height, self.radius, true);
        let data = Self::blur_pass(&pass, width, height, self.radius, false);
        OwnedImage::new(data, width, height)
    }
}

/// Rotates by multiples of 90 degrees clockwise; odd turns swap the shape.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RotateMutator {
    quarter_turns: u8,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RotateConfig {
    quarter_turns: i64,
}

impl Default for RotateConfig {
    fn default() -> Self {
        Self { quarter_turns: 1 }
    }
}

impl RotateMutator {
    pub const ID: &'static str = "rotate";

    pub fn new(quarter_turns: i64) -> Self {
        Self {
            quarter_turns: quarter_turns.rem_euclid(4) as u8,
        }
    }

    pub fn from_config(config: &Value) -> OfficialEyeResult<Self> {
        let cfg: RotateConfig = parse_engine_config(ROLE, Self::ID, config)?;
        Ok(Self::new(cfg.quarter_turns))
    }

    fn rotate_cw(image: &OwnedImage) -> OfficialEyeResult<OwnedImage> {
        let (w, h) = image.shape();
        let src = image.data();
        OwnedImage::from_fn(h, w, |x, y| src[(h - 1 - x) * w + y])
    }
}

impl Mutator for RotateMutator {
    fn id(&self) -> &str {
        Self::ID
    }

    fn mutate(&self, image: &OwnedImage) -> OfficialEyeResult<OwnedImage> {
        let mut out = image.clone();
        for _ in 0..self.quarter_turns {
            out = Self::rotate_cw(&out)?;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::{
        otsu_threshold, BinarizationMutator, BoxBlurMutator, InvertMutator, Mutator,
        RotateMutator,
    };
    use crate::image::OwnedImage;
    use crate::util::ErrorKind;
    use serde_json::json;

    #[test]
    fn rotate_clockwise_swaps_shape() {
        // 1 2 3
        // 4 5 6
        let img = OwnedImage::new(vec![1, 2, 3, 4, 5, 6], 3, 2).unwrap();
        let rotated = RotateMutator::new(1).mutate(&img).unwrap();
        assert_eq!(rotated.shape(), (2, 3));
        assert_eq!(rotated.data(), &[4, 1, 5, 2, 6, 3]);

        let full = RotateMutator::new(4).mutate(&img).unwrap();
        assert_eq!(full, img);
        assert_eq!(RotateMutator::new(-1), RotateMutator::new(3));
    }

    #[test]
    fn otsu_separates_two_modes() {
        let mut data = vec![20u8; 50];
        data.extend(vec![200u8; 50]);
        let t = otsu_threshold(&data);
        assert!((20..200).contains(&t));

        let img = OwnedImage::new(data, 10, 10).unwrap();
        let bin = BinarizationMutator::new(None, false).mutate(&img).unwrap();
        assert_eq!(bin.get(0, 0), Some(0));
        assert_eq!(bin.get(9, 9), Some(255));
    }

    #[test]
    fn box_blur_preserves_constant_images() {
        let img = OwnedImage::filled(5, 4, 77).unwrap();
        let blurred = BoxBlurMutator::new(2).mutate(&img).unwrap();
        assert_eq!(blurred, img);
    }

    #[test]
    fn config_defaults_and_unknown_options() {
        assert_eq!(
            RotateMutator::from_config(&serde_json::Value::Null).unwrap(),
            RotateMutator::new(1)
        );
        assert_eq!(
            BinarizationMutator::from_config(&json!({"threshold": 90})).unwrap(),
            BinarizationMutator::new(Some(90), false)
        );
        let err = InvertMutator::from_config(&json!({"strength": 2})).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfig);
        assert!(err.while_text().contains("'invert' mutator"));
    }
}
