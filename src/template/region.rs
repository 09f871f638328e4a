//! Rectangular template regions: keypoints and features.

use crate::context::Context;
use crate::geometry::Point;
use crate::image::OwnedImage;
use crate::mutator::{apply_mutators, Mutator};
use crate::template::description::{FeatureDescription, KeypointDescription};
use crate::util::{ErrorKind, OfficialEyeError, OfficialEyeResult};

/// Axis-aligned rectangle with an identifier, in template pixel space.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Region {
    identifier: String,
    x: usize,
    y: usize,
    w: usize,
    h: usize,
}

impl Region {
    /// Validates a declared rectangle against the template bounds.
    pub(crate) fn new(
        kind: ErrorKind,
        while_text: &str,
        identifier: &str,
        (x, y, w, h): (i64, i64, i64, i64),
        (width, height): (usize, usize),
    ) -> OfficialEyeResult<Self> {
        let err = |problem: String| OfficialEyeError::new(kind, while_text, problem);
        if x < 0 || y < 0 || w < 0 || h < 0 {
            return Err(err(format!(
                "the region ({x}, {y}, {w}, {h}) has a negative coordinate or extent"
            )));
        }
        if w == 0 || h == 0 {
            return Err(err(format!("the region has an empty extent {w}x{h}")));
        }
        let (x, y, w, h) = (x as usize, y as usize, w as usize, h as usize);
        if x + w > width || y + h > height {
            return Err(err(format!(
                "the region ({x}, {y}, {w}, {h}) does not fit into the {width}x{height} template"
            )));
        }
        Ok(Self {
            identifier: identifier.to_string(),
            x,
            y,
            w,
            h,
        })
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn x(&self) -> usize {
        self.x
    }

    pub fn y(&self) -> usize {
        self.y
    }

    pub fn w(&self) -> usize {
        self.w
    }

    pub fn h(&self) -> usize {
        self.h
    }

    /// Centre of the region in continuous pixel coordinates.
    pub fn center(&self) -> Point {
        Point::new(
            self.x as f64 + (self.w as f64 - 1.0) / 2.0,
            self.y as f64 + (self.h as f64 - 1.0) / 2.0,
        )
    }

    /// Copies the region out of a template-sized image.
    pub fn crop(&self, image: &OwnedImage) -> OfficialEyeResult<OwnedImage> {
        image.crop(self.x, self.y, self.w, self.h)
    }
}

/// A region used to establish correspondence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Keypoint {
    region: Region,
    matches_min: usize,
    matches_max: usize,
}

impl Keypoint {
    /// Validates a keypoint declaration of template `template_id`.
    pub fn new(
        template_id: &str,
        identifier: &str,
        desc: &KeypointDescription,
        template_size: (usize, usize),
    ) -> OfficialEyeResult<Self> {
        let while_text = format!("while loading keypoint '{identifier}' of template '{template_id}'");
        let region = Region::new(
            ErrorKind::InvalidKeypoint,
            &while_text,
            identifier,
            (desc.x, desc.y, desc.w, desc.h),
            template_size,
        )?;

        let (min, max) = (desc.matches.min, desc.matches.max);
        if max < min {
            return Err(OfficialEyeError::new(
                ErrorKind::InvalidKeypoint,
                while_text,
                format!("the lower bound on the match count ({min}) exceeds the upper bound ({max})"),
            ));
        }
        if min < 0 {
            return Err(OfficialEyeError::new(
                ErrorKind::InvalidKeypoint,
                while_text,
                format!("the lower bound on the match count ({min}) cannot be negative"),
            ));
        }

        Ok(Self {
            region,
            matches_min: min as usize,
            matches_max: max as usize,
        })
    }

    pub fn identifier(&self) -> &str {
        self.region.identifier()
    }

    pub fn region(&self) -> &Region {
        &self.region
    }

    pub fn matches_min(&self) -> usize {
        self.matches_min
    }

    pub fn matches_max(&self) -> usize {
        self.matches_max
    }
}

/// A region whose content is extracted and interpreted.
#[derive(Debug)]
pub struct Feature {
    region: Region,
    feature_class: String,
    mutators: Vec<Box<dyn Mutator>>,
}

impl Feature {
    /// Validates a feature declaration and instantiates its mutators.
    ///
    /// The feature class reference is checked later by the template's
    /// feature class manager, once every class is known.
    pub fn new(
        ctx: &Context,
        template_id: &str,
        identifier: &str,
        desc: &FeatureDescription,
        template_size: (usize, usize),
    ) -> OfficialEyeResult<Self> {
        let while_text = format!("while loading feature '{identifier}' of template '{template_id}'");
        let region = Region::new(
            ErrorKind::InvalidFeature,
            &while_text,
            identifier,
            (desc.x, desc.y, desc.w, desc.h),
            template_size,
        )?;
        let mutators = desc
            .mutators
            .iter()
            .map(|m| {
                ctx.mutator(&m.kind, &m.config).map_err(|err| {
                    OfficialEyeError::new(
                        err.kind(),
                        format!(
                            "while loading the mutators of feature '{identifier}' of template '{template_id}'"
                        ),
                        err.problem(),
                    )
                    .with_cause(err)
                })
            })
            .collect::<OfficialEyeResult<Vec<_>>>()?;
        Ok(Self {
            region,
            feature_class: desc.feature_class.clone(),
            mutators,
        })
    }

    pub fn identifier(&self) -> &str {
        self.region.identifier()
    }

    pub fn region(&self) -> &Region {
        &self.region
    }

    /// Identifier of the declared feature class.
    pub fn feature_class(&self) -> &str {
        &self.feature_class
    }

    pub fn mutators(&self) -> &[Box<dyn Mutator>] {
        &self.mutators
    }

    /// Runs the feature's mutators over an extracted feature image.
    pub fn apply_mutators(&self, image: OwnedImage) -> OfficialEyeResult<OwnedImage> {
        apply_mutators(image, &self.mutators)
    }

    /// Pastes a feature-sized image at the feature's location.
    pub fn insert_into_image(
        &self,
        target: &mut OwnedImage,
        feature_image: &OwnedImage,
    ) -> OfficialEyeResult<()> {
        if feature_image.shape() != (self.region.w, self.region.h) {
            return Err(OfficialEyeError::new(
                ErrorKind::InvalidInput,
                format!("while inserting feature '{}' into an image", self.identifier()),
                format!(
                    "the feature image is {}x{}, the feature region is {}x{}",
                    feature_image.width(),
                    feature_image.height(),
                    self.region.w,
                    self.region.h
                ),
            ));
        }
        target.paste(self.region.x, self.region.y, feature_image)
    }
}

#[cfg(test)]
mod tests {
    use super::Keypoint;
    use crate::template::description::KeypointDescription;
    use crate::util::ErrorKind;

    const SIZE: (usize, usize) = (100, 80);

    #[test]
    fn keypoint_bounds_are_validated() {
        let err = Keypoint::new("t", "kp", &KeypointDescription::new(0, 0, 5, 5, 3, 2), SIZE)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidKeypoint);
        assert!(err.problem().contains("exceeds"));

        let err = Keypoint::new("t", "kp", &KeypointDescription::new(0, 0, 5, 5, -1, 2), SIZE)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidKeypoint);
        assert!(err.problem().contains("negative"));

        let kp = Keypoint::new("t", "kp", &KeypointDescription::new(0, 0, 5, 5, 0, 0), SIZE)
            .unwrap();
        assert_eq!((kp.matches_min(), kp.matches_max()), (0, 0));
    }

    #[test]
    fn region_must_fit_template() {
        let err = Keypoint::new("t", "kp", &KeypointDescription::new(90, 0, 11, 5, 0, 1), SIZE)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidKeypoint);
        assert!(err.while_text().contains("'kp' of template 't'"));
        assert!(
            Keypoint::new("t", "kp", &KeypointDescription::new(-1, 0, 5, 5, 0, 1), SIZE).is_err()
        );
        assert!(
            Keypoint::new("t", "kp", &KeypointDescription::new(0, 0, 0, 5, 0, 1), SIZE).is_err()
        );
    }

    #[test]
    fn center_is_the_middle_pixel() {
        let kp = Keypoint::new("t", "kp", &KeypointDescription::new(10, 20, 5, 3, 0, 1), SIZE)
            .unwrap();
        let c = kp.region().center();
        assert_eq!((c.x, c.y), (12.0, 21.0));
    }
}
