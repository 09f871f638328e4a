//! Grayscale image views and owned buffers.
//!
//! `ImageView` is a borrowed 2D view into a 1D buffer with an explicit stride.
//! The stride counts elements between the starts of consecutive rows, so a
//! stride larger than the width represents padded rows. ROI slices are
//! zero-copy views into the same backing slice and retain the original stride.
//!
//! `OwnedImage` is the contiguous buffer that flows through the pipeline:
//! template sources, targets, mutator outputs and extracted features.

use crate::util::{ErrorKind, OfficialEyeError, OfficialEyeResult};

#[cfg(feature = "image-io")]
pub mod io;
pub mod pyramid;

fn invalid_input(problem: String) -> OfficialEyeError {
    OfficialEyeError::new(ErrorKind::InvalidInput, "while constructing an image", problem)
}

/// Borrowed 2D image view with an explicit stride.
#[derive(Copy, Clone, Debug)]
pub struct ImageView<'a, T> {
    data: &'a [T],
    width: usize,
    height: usize,
    stride: usize,
}

impl<'a, T> ImageView<'a, T> {
    /// Creates a contiguous view with `stride == width`.
    pub fn from_slice(data: &'a [T], width: usize, height: usize) -> OfficialEyeResult<Self> {
        Self::new(data, width, height, width)
    }

    /// Creates a view with an explicit stride.
    pub fn new(
        data: &'a [T],
        width: usize,
        height: usize,
        stride: usize,
    ) -> OfficialEyeResult<Self> {
        let needed = required_len(width, height, stride)?;
        if data.len() < needed {
            return Err(invalid_input(format!(
                "buffer too small: needed {needed} elements, got {}",
                data.len()
            )));
        }
        Ok(Self {
            data,
            width,
            height,
            stride,
        })
    }

    /// Returns the image width in pixels.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns the image height in pixels.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Returns the stride in elements between row starts.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Returns the element at `(x, y)` if it is within bounds.
    pub fn get(&self, x: usize, y: usize) -> Option<&'a T> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = y.checked_mul(self.stride)?.checked_add(x)?;
        self.data.get(idx)
    }

    /// Returns a contiguous slice for row `y` with length `width`.
    pub fn row(&self, y: usize) -> Option<&'a [T]> {
        if y >= self.height {
            return None;
        }
        let start = y.checked_mul(self.stride)?;
        let end = start.checked_add(self.width)?;
        self.data.get(start..end)
    }

    /// Returns a zero-copy ROI view into the same backing buffer.
    pub fn roi(
        &self,
        x: usize,
        y: usize,
        width: usize,
        height: usize,
    ) -> OfficialEyeResult<ImageView<'a, T>> {
        let fits = x
            .checked_add(width)
            .zip(y.checked_add(height))
            .is_some_and(|(end_x, end_y)| end_x <= self.width && end_y <= self.height);
        if width == 0 || height == 0 || !fits {
            return Err(invalid_input(format!(
                "roi {width}x{height} at ({x}, {y}) does not fit into a {}x{} image",
                self.width, self.height
            )));
        }
        let start = y * self.stride + x;
        ImageView::new(&self.data[start..], width, height, self.stride)
    }
}

impl ImageView<'_, u8> {
    /// Samples the image at a real-valued position with bilinear interpolation.
    ///
    /// Pixel centres sit at integer coordinates. Returns `None` outside the
    /// image.
    pub fn sample_bilinear(&self, x: f64, y: f64) -> Option<f32> {
        if !x.is_finite() || !y.is_finite() {
            return None;
        }
        let max_x = (self.width - 1) as f64;
        let max_y = (self.height - 1) as f64;
        if x < 0.0 || y < 0.0 || x > max_x || y > max_y {
            return None;
        }
        let x0 = x.floor() as usize;
        let y0 = y.floor() as usize;
        let x1 = (x0 + 1).min(self.width - 1);
        let y1 = (y0 + 1).min(self.height - 1);
        let fx = (x - x0 as f64) as f32;
        let fy = (y - y0 as f64) as f32;

        let p00 = f32::from(*self.get(x0, y0)?);
        let p10 = f32::from(*self.get(x1, y0)?);
        let p01 = f32::from(*self.get(x0, y1)?);
        let p11 = f32::from(*self.get(x1, y1)?);
        let top = p00 + (p10 - p00) * fx;
        let bottom = p01 + (p11 - p01) * fx;
        Some(top + (bottom - top) * fy)
    }
}

fn required_len(width: usize, height: usize, stride: usize) -> OfficialEyeResult<usize> {
    if width == 0 || height == 0 {
        return Err(invalid_input(format!(
            "invalid dimensions {width}x{height}"
        )));
    }
    if stride < width {
        return Err(invalid_input(format!(
            "stride {stride} is smaller than width {width}"
        )));
    }
    (height - 1)
        .checked_mul(stride)
        .and_then(|v| v.checked_add(width))
        .ok_or_else(|| invalid_input(format!("invalid dimensions {width}x{height}")))
}

/// Owned contiguous grayscale image buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OwnedImage {
    data: Vec<u8>,
    width: usize,
    height: usize,
}

impl OwnedImage {
    /// Wraps a row-major buffer of exactly `width * height` bytes.
    pub fn new(data: Vec<u8>, width: usize, height: usize) -> OfficialEyeResult<Self> {
        let needed = required_len(width, height, width)?;
        if data.len() != needed {
            return Err(invalid_input(format!(
                "buffer holds {} bytes, a {width}x{height} image needs {needed}",
                data.len()
            )));
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Creates an image filled with a constant value.
    pub fn filled(width: usize, height: usize, value: u8) -> OfficialEyeResult<Self> {
        let len = required_len(width, height, width)?;
        Self::new(vec![value; len], width, height)
    }

    /// Builds an image by evaluating `f(x, y)` for every pixel.
    pub fn from_fn(
        width: usize,
        height: usize,
        mut f: impl FnMut(usize, usize) -> u8,
    ) -> OfficialEyeResult<Self> {
        let len = required_len(width, height, width)?;
        let mut data = Vec::with_capacity(len);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self::new(data, width, height)
    }

    /// Copies a (possibly strided) view into a contiguous buffer.
    pub fn from_view(view: ImageView<'_, u8>) -> OfficialEyeResult<Self> {
        let mut data = Vec::with_capacity(view.width() * view.height());
        for y in 0..view.height() {
            let row = view
                .row(y)
                .ok_or_else(|| invalid_input(format!("row {y} is out of bounds")))?;
            data.extend_from_slice(row);
        }
        Self::new(data, view.width(), view.height())
    }

    /// Returns a borrowed view of the image.
    pub fn view(&self) -> ImageView<'_, u8> {
        ImageView {
            data: &self.data,
            width: self.width,
            height: self.height,
            stride: self.width,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Returns `(width, height)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// Returns the row-major pixel buffer.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Returns the pixel at `(x, y)` if it is within bounds.
    pub fn get(&self, x: usize, y: usize) -> Option<u8> {
        self.view().get(x, y).copied()
    }

    /// Sets the pixel at `(x, y)`; out-of-bounds writes are ignored.
    pub fn put(&mut self, x: usize, y: usize, value: u8) {
        if x < self.width && y < self.height {
            self.data[y * self.width + x] = value;
        }
    }

    /// Copies a rectangular region into a new image.
    pub fn crop(&self, x: usize, y: usize, width: usize, height: usize) -> OfficialEyeResult<Self> {
        Self::from_view(self.view().roi(x, y, width, height)?)
    }

    /// Pastes `patch` with its top-left corner at `(x, y)`.
    pub fn paste(&mut self, x: usize, y: usize, patch: &OwnedImage) -> OfficialEyeResult<()> {
        // Reuse the ROI bounds check.
        self.view().roi(x, y, patch.width, patch.height)?;
        for py in 0..patch.height {
            let dst = (y + py) * self.width + x;
            let src = py * patch.width;
            self.data[dst..dst + patch.width].copy_from_slice(&patch.data[src..src + patch.width]);
        }
        Ok(())
    }

    /// Draws a one-pixel rectangle outline clipped to the image.
    pub fn draw_rect_outline(&mut self, x: usize, y: usize, width: usize, height: usize, value: u8) {
        if width == 0 || height == 0 {
            return;
        }
        let x1 = x + width - 1;
        let y1 = y + height - 1;
        for px in x..=x1 {
            self.put(px, y, value);
            self.put(px, y1, value);
        }
        for py in y..=y1 {
            self.put(x, py, value);
            self.put(x1, py, value);
        }
    }

    /// Consumes the image and returns its buffer.
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}
