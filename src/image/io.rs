//! Convenience helpers for loading and saving images via the `image` crate.
//!
//! Available when the `image-io` feature is enabled.

use crate::image::OwnedImage;
use crate::util::{ErrorKind, OfficialEyeError, OfficialEyeResult};
use std::path::Path;

/// Creates an owned image from a grayscale image buffer.
pub fn owned_from_gray_image(img: &image::GrayImage) -> OfficialEyeResult<OwnedImage> {
    OwnedImage::new(img.as_raw().clone(), img.width() as usize, img.height() as usize)
}

/// Creates an owned grayscale image from a dynamic image.
pub fn owned_from_dynamic_image(img: &image::DynamicImage) -> OfficialEyeResult<OwnedImage> {
    owned_from_gray_image(&img.to_luma8())
}

/// Loads an image from disk and converts it to a grayscale owned image.
pub fn load_gray_image<P: AsRef<Path>>(path: P) -> OfficialEyeResult<OwnedImage> {
    let path = path.as_ref();
    let img = image::open(path).map_err(|err| {
        OfficialEyeError::new(
            ErrorKind::IoFailed,
            format!("while loading image '{}'", path.display()),
            "the image could not be read or decoded",
        )
        .with_cause(err)
    })?;
    owned_from_dynamic_image(&img)
}

/// Writes a grayscale image; the format follows the file extension.
pub fn save_gray_image<P: AsRef<Path>>(img: &OwnedImage, path: P) -> OfficialEyeResult<()> {
    let path = path.as_ref();
    let buffer = image::GrayImage::from_raw(img.width() as u32, img.height() as u32, img.data().to_vec())
        .ok_or_else(|| {
            OfficialEyeError::new(
                ErrorKind::Internal,
                format!("while exporting image '{}'", path.display()),
                "the pixel buffer does not match the image dimensions",
            )
        })?;
    buffer.save(path).map_err(|err| {
        OfficialEyeError::new(
            ErrorKind::IoFailed,
            format!("while exporting image '{}'", path.display()),
            "the image could not be encoded or written",
        )
        .with_cause(err)
    })
}
