//! Image pyramid construction for grayscale `u8` images.
//!
//! Downsampling uses a 2x2 box filter with integer rounding:
//! `dst = ((a + b + c + d) + 2) / 4`. Level `k` therefore maps pixel
//! coordinates of level 0 by a factor of `2^-k`.

use crate::image::{ImageView, OwnedImage};
use crate::util::OfficialEyeResult;

/// Owned image pyramid built from a base level.
#[derive(Debug)]
pub struct ImagePyramid {
    levels: Vec<OwnedImage>,
}

impl ImagePyramid {
    /// Builds a pyramid from a base grayscale view.
    ///
    /// `max_levels` is clamped to at least 1 so the base level is always
    /// present. Construction stops early once a level would be narrower or
    /// shorter than `min_side` pixels.
    pub fn build_u8(
        base: ImageView<'_, u8>,
        max_levels: usize,
        min_side: usize,
    ) -> OfficialEyeResult<Self> {
        let max_levels = max_levels.max(1);
        let min_side = min_side.max(1);
        let mut levels = vec![OwnedImage::from_view(base)?];

        while levels.len() < max_levels {
            let src = match levels.last() {
                Some(level) => level,
                None => break,
            };
            let dst_width = src.width() / 2;
            let dst_height = src.height() / 2;
            if dst_width < min_side || dst_height < min_side {
                break;
            }

            let data = src.data();
            let src_width = src.width();
            let next = OwnedImage::from_fn(dst_width, dst_height, |x, y| {
                let row0 = 2 * y * src_width;
                let row1 = row0 + src_width;
                let a = data[row0 + 2 * x];
                let b = data[row0 + 2 * x + 1];
                let c = data[row1 + 2 * x];
                let d = data[row1 + 2 * x + 1];
                let sum = u16::from(a) + u16::from(b) + u16::from(c) + u16::from(d);
                ((sum + 2) / 4) as u8
            })?;
            levels.push(next);
        }

        Ok(Self { levels })
    }

    /// Returns all pyramid levels (level 0 is the base resolution).
    pub fn levels(&self) -> &[OwnedImage] {
        &self.levels
    }

    /// Returns a view for a specific pyramid level.
    pub fn level(&self, index: usize) -> Option<ImageView<'_, u8>> {
        self.levels.get(index).map(|level| level.view())
    }

    /// Returns the number of levels.
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    /// Always false: the base level is always present.
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}
