//! Planar geometry: points and projective transforms between image spaces.

mod dlt;

pub use dlt::{estimate_affine, estimate_homography};

use nalgebra as na;
use serde::{Serialize, Serializer};

/// A 2D point in pixel coordinates.
pub type Point = na::Point2<f64>;

/// Projective 3x3 transform between two image planes.
///
/// Serializes as three rows of three numbers.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Homography {
    matrix: na::Matrix3<f64>,
}

impl Homography {
    /// Wraps a matrix, normalising it so that `h[2][2] == 1` when possible.
    pub fn from_matrix(matrix: na::Matrix3<f64>) -> Option<Self> {
        if matrix.iter().any(|v| !v.is_finite()) {
            return None;
        }
        let s = matrix[(2, 2)];
        let matrix = if s.abs() > 1e-12 { matrix / s } else { matrix };
        Some(Self { matrix })
    }

    /// The identity transform.
    pub fn identity() -> Self {
        Self {
            matrix: na::Matrix3::identity(),
        }
    }

    /// Returns the underlying matrix.
    pub fn matrix(&self) -> &na::Matrix3<f64> {
        &self.matrix
    }

    /// Maps a point; `None` if it lands on the line at infinity.
    pub fn apply(&self, p: Point) -> Option<Point> {
        let v = self.matrix * na::Vector3::new(p.x, p.y, 1.0);
        if v.z.abs() < 1e-12 {
            return None;
        }
        Some(Point::new(v.x / v.z, v.y / v.z))
    }

    /// Returns the inverse transform, if the matrix is invertible.
    pub fn inverse(&self) -> Option<Self> {
        let det = self.matrix.determinant();
        if !det.is_finite() || det.abs() < 1e-12 {
            return None;
        }
        self.matrix.try_inverse().and_then(Self::from_matrix)
    }

    /// Returns the matrix as nested row arrays.
    pub fn to_rows(&self) -> [[f64; 3]; 3] {
        let m = &self.matrix;
        [
            [m[(0, 0)], m[(0, 1)], m[(0, 2)]],
            [m[(1, 0)], m[(1, 1)], m[(1, 2)]],
            [m[(2, 0)], m[(2, 1)], m[(2, 2)]],
        ]
    }
}

impl Serialize for Homography {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_rows().serialize(serializer)
    }
}
