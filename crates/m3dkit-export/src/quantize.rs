//! Rounding precision and grid compression
//!
//! Every coordinate is rounded to the quality tier's decimal digits before
//! it is pooled, so equal rounded values share one table entry. Grid
//! compression then rescales the pooled position-kind vertices into the
//! unit cube, which is what allows the integer storage tiers.

use std::fmt;
use std::io::{self, Write};

use byteorder::{LittleEndian, WriteBytesExt};
use serde::{Deserialize, Serialize};

use m3dkit_core::BoundingBox;

use crate::model::Vertex;

/// Triangle count below which the automatic choice is [`Quality::Int8`]
pub const AUTO_QUALITY_TRIANGLES: usize = 1024;

/// Above this magnitude the scaled value has no fractional bits left
const ROUNDING_LIMIT: f64 = 4_503_599_627_370_496.0; // 2^52

/// Numeric precision tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    /// 4 digits, signed 8-bit storage
    Int8 = 0,
    /// 4 digits, signed 16-bit storage
    Int16 = 1,
    /// 7 digits, 32-bit float storage
    Float32 = 2,
    /// 15 digits, 64-bit float storage
    Float64 = 3,
}

impl Quality {
    /// Tier picked when none is requested
    pub fn auto(triangles: usize) -> Self {
        if triangles < AUTO_QUALITY_TRIANGLES {
            Quality::Int8
        } else {
            Quality::Int16
        }
    }

    /// Apply the run policy to a requested tier
    ///
    /// Without grid compression coordinates are unbounded, so the integer
    /// tiers are raised to [`Quality::Float32`].
    pub fn resolve(requested: Option<Quality>, triangles: usize, grid_compression: bool) -> Self {
        let quality = requested.unwrap_or_else(|| Quality::auto(triangles));
        if !grid_compression && quality < Quality::Float32 {
            Quality::Float32
        } else {
            quality
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Quality::Int8),
            1 => Some(Quality::Int16),
            2 => Some(Quality::Float32),
            3 => Some(Quality::Float64),
            _ => None,
        }
    }

    pub fn code(self) -> u32 {
        self as u32
    }

    /// Decimal digits kept when rounding
    pub fn digits(self) -> i32 {
        match self {
            Quality::Int8 | Quality::Int16 => 4,
            Quality::Float32 => 7,
            Quality::Float64 => 15,
        }
    }

    /// Round a value to this tier's digits
    pub fn round(self, value: f64) -> f64 {
        round_to(value, self.digits())
    }

    /// Write one vertex component at tier storage
    pub fn write_coordinate<W: Write + ?Sized>(self, writer: &mut W, value: f64) -> io::Result<()> {
        match self {
            Quality::Int8 => writer.write_i8((value * 127.0) as i8),
            Quality::Int16 => writer.write_i16::<LittleEndian>((value * 32767.0) as i16),
            Quality::Float32 => writer.write_f32::<LittleEndian>(value as f32),
            Quality::Float64 => writer.write_f64::<LittleEndian>(value),
        }
    }

    /// Write one texture coordinate component at tier storage
    pub fn write_texcoord<W: Write + ?Sized>(self, writer: &mut W, value: f64) -> io::Result<()> {
        match self {
            Quality::Int8 => writer.write_u8((value * 255.0) as u8),
            Quality::Int16 => writer.write_u16::<LittleEndian>((value * 65535.0) as u16),
            Quality::Float32 => writer.write_f32::<LittleEndian>(value as f32),
            Quality::Float64 => writer.write_f64::<LittleEndian>(value),
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Quality::Int8 => "int8",
            Quality::Int16 => "int16",
            Quality::Float32 => "float32",
            Quality::Float64 => "float64",
        };
        f.pad(name)
    }
}

/// Round to `digits` decimals, ties to even, with `-0.0` folded to `0.0`
pub fn round_to(value: f64, digits: i32) -> f64 {
    let factor = 10f64.powi(digits);
    let scaled = value * factor;
    if !scaled.is_finite() || scaled.abs() >= ROUNDING_LIMIT {
        return normalize_zero(value);
    }
    normalize_zero(scaled.round_ties_even() / factor)
}

/// Fold negative zero into positive zero
pub fn normalize_zero(value: f64) -> f64 {
    if value == 0.0 {
        0.0
    } else {
        value
    }
}

/// Rescale position-kind vertices into the unit cube
///
/// Returns the largest absolute coordinate `s` found. Vertices are only
/// touched when `s` is neither 0 nor 1; quaternions are never rescaled.
pub fn grid_compress(vertices: &mut [Vertex], quality: Quality) -> f64 {
    let mut bounds = BoundingBox::EMPTY;
    for vertex in vertices.iter().filter(|v| v.is_position()) {
        bounds.expand([vertex.coords[0], vertex.coords[1], vertex.coords[2]]);
    }
    let s = bounds.max_extent();
    if s != 0.0 && s != 1.0 {
        for vertex in vertices.iter_mut().filter(|v| v.is_position()) {
            for c in &mut vertex.coords[..3] {
                *c = quality.round(*c / s);
            }
        }
    }
    tracing::debug!(extent = s, "grid compression bounds");
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_selection() {
        assert_eq!(Quality::auto(1000), Quality::Int8);
        assert_eq!(Quality::auto(1023), Quality::Int8);
        assert_eq!(Quality::auto(1024), Quality::Int16);
        assert_eq!(Quality::auto(1025), Quality::Int16);
    }

    #[test]
    fn test_floating_forced_without_grid() {
        assert_eq!(Quality::resolve(None, 10, false), Quality::Float32);
        assert_eq!(Quality::resolve(Some(Quality::Int16), 10, false), Quality::Float32);
        assert_eq!(Quality::resolve(Some(Quality::Float64), 10, false), Quality::Float64);
        assert_eq!(Quality::resolve(Some(Quality::Int16), 10, true), Quality::Int16);
        assert_eq!(Quality::resolve(None, 5000, true), Quality::Int16);
    }

    #[test]
    fn test_digits() {
        assert_eq!(Quality::Int8.digits(), 4);
        assert_eq!(Quality::Int16.digits(), 4);
        assert_eq!(Quality::Float32.digits(), 7);
        assert_eq!(Quality::Float64.digits(), 15);
    }

    #[test]
    fn test_negative_zero() {
        let rounded = round_to(-0.0, 4);
        assert_eq!(rounded, 0.0);
        assert!(rounded.is_sign_positive());

        // small negatives rounding to zero lose their sign too
        let tiny = round_to(-0.00001, 4);
        assert!(tiny.is_sign_positive());
    }

    #[test]
    fn test_round_to_digits() {
        assert_eq!(round_to(0.123456, 4), 0.1235);
        assert_eq!(round_to(1.0 / 3.0, 7), 0.3333333);
        assert_eq!(round_to(1e300, 4), 1e300);
    }

    #[test]
    fn test_grid_compress_scales_positions() {
        let mut vertices = vec![
            Vertex::position([10.0, -2.0, 0.5], None, None),
            Vertex::position([-4.0, 7.5, 3.0], None, None),
            Vertex::orientation([0.0, 0.0, 0.7071, 0.7071]),
        ];
        let s = grid_compress(&mut vertices, Quality::Int8);
        assert_eq!(s, 10.0);
        for v in vertices.iter().filter(|v| v.is_position()) {
            assert!(v.coords[..3].iter().all(|c| c.abs() <= 1.0));
        }
        assert_eq!(vertices[0].coords[0], 1.0);
        assert_eq!(vertices[1].coords[1], 0.75);
        assert_eq!(vertices[2].coords, [0.0, 0.0, 0.7071, 0.7071]);
    }

    #[test]
    fn test_grid_compress_unit_cube_untouched() {
        let mut vertices = vec![Vertex::position([1.0, -0.3, 0.2], None, None)];
        assert_eq!(grid_compress(&mut vertices, Quality::Int16), 1.0);
        assert_eq!(vertices[0].coords[1], -0.3);
    }

    #[test]
    fn test_integer_storage() {
        let mut out = Vec::new();
        Quality::Int8.write_coordinate(&mut out, -1.0).unwrap();
        Quality::Int8.write_coordinate(&mut out, 0.5).unwrap();
        Quality::Int8.write_texcoord(&mut out, 1.0).unwrap();
        assert_eq!(out, vec![(-127i8) as u8, 63, 255]);
    }
}
