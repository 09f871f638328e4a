//! Image mutators: named, configurable transforms applied before matching
//! and to extracted features.
//!
//! A mutator list is applied strictly in order, so `[m1, m2]` applied to `I`
//! yields `m2(m1(I))` and an empty list is the identity. Mutators may change
//! the image shape; callers that need a fixed shape must check for that.

mod builtin;

pub use builtin::{BinarizationMutator, BoxBlurMutator, InvertMutator, RotateMutator};

use crate::image::OwnedImage;
use crate::util::OfficialEyeResult;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;

/// A pure image-to-image transform.
pub trait Mutator: Send + Sync + fmt::Debug {
    /// Identifier the mutator is registered under.
    fn id(&self) -> &str;

    /// Transforms `image` into a new image.
    fn mutate(&self, image: &OwnedImage) -> OfficialEyeResult<OwnedImage>;
}

/// Declarative mutator entry: `{"kind": ..., "config": {...}}`.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct MutatorDescription {
    #[serde(alias = "id")]
    pub kind: String,
    #[serde(default)]
    pub config: Value,
}

impl MutatorDescription {
    pub fn new(kind: impl Into<String>, config: Value) -> Self {
        Self {
            kind: kind.into(),
            config,
        }
    }
}

/// Applies `mutators` in order.
pub fn apply_mutators(
    image: OwnedImage,
    mutators: &[Box<dyn Mutator>],
) -> OfficialEyeResult<OwnedImage> {
    let mut image = image;
    for mutator in mutators {
        image = mutator.mutate(&image)?;
    }
    Ok(image)
}
