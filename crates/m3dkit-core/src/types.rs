//! Common types used across m3dkit
//!
//! Small value types shared by the scene representation and the encoder.

use glam::{DMat4, DQuat, DVec3};
use serde::{Deserialize, Serialize};

/// RGBA color with components in `[0, 1]`
pub type Rgba = [f64; 4];

/// Texture coordinate pair
pub type Uv = [f64; 2];

/// 4x4 transformation matrix, column-major (`m[3]` holds the translation)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Mat4x4 {
    pub m: [[f64; 4]; 4],
}

impl Mat4x4 {
    pub const IDENTITY: Self = Self {
        m: [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ],
    };

    /// Build a rigid transform from a translation and a rotation
    pub fn from_translation_rotation(translation: [f64; 3], rotation: [f64; 4]) -> Self {
        let rotation = DQuat::from_array(rotation).normalize();
        DMat4::from_rotation_translation(rotation, DVec3::from_array(translation)).into()
    }

    /// Get translation component
    pub fn translation(&self) -> [f64; 3] {
        [self.m[3][0], self.m[3][1], self.m[3][2]]
    }

    pub fn to_dmat4(&self) -> DMat4 {
        DMat4::from_cols_array_2d(&self.m)
    }
}

impl Default for Mat4x4 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl From<DMat4> for Mat4x4 {
    fn from(value: DMat4) -> Self {
        Self { m: value.to_cols_array_2d() }
    }
}

impl From<Mat4x4> for DMat4 {
    fn from(value: Mat4x4) -> Self {
        value.to_dmat4()
    }
}

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl BoundingBox {
    /// An inverted box that any point expands
    pub const EMPTY: Self = Self {
        min: [f64::INFINITY; 3],
        max: [f64::NEG_INFINITY; 3],
    };

    pub fn is_empty(&self) -> bool {
        (0..3).any(|i| self.min[i] > self.max[i])
    }

    pub fn expand(&mut self, point: [f64; 3]) {
        for i in 0..3 {
            self.min[i] = self.min[i].min(point[i]);
            self.max[i] = self.max[i].max(point[i]);
        }
    }

    /// Largest absolute coordinate touched by the box
    pub fn max_extent(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        self.min
            .iter()
            .chain(self.max.iter())
            .fold(0.0_f64, |acc, v| acc.max(v.abs()))
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::EMPTY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounding_box_expand() {
        let mut bbox = BoundingBox::EMPTY;
        assert!(bbox.is_empty());
        bbox.expand([1.0, 2.0, 3.0]);
        bbox.expand([-1.0, -2.0, -10.0]);

        assert_eq!(bbox.min, [-1.0, -2.0, -10.0]);
        assert_eq!(bbox.max, [1.0, 2.0, 3.0]);
        assert_eq!(bbox.max_extent(), 10.0);
    }

    #[test]
    fn test_empty_box_extent_is_zero() {
        assert_eq!(BoundingBox::EMPTY.max_extent(), 0.0);
    }

    #[test]
    fn test_matrix_translation() {
        let m = Mat4x4::from_translation_rotation([1.0, 2.0, 3.0], [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(m.translation(), [1.0, 2.0, 3.0]);
        assert_eq!(Mat4x4::from(m.to_dmat4()), m);
    }
}
