//! Header flags word
//!
//! The `HEAD` chunk declares, in one 32-bit word, the quality tier and the
//! width picked for every table, so the rest of the file can be parsed.

use crate::index::IndexWidth;
use crate::model::Model;
use crate::quantize::Quality;

const QUALITY_SHIFT: u32 = 0;
const VERTEX_SHIFT: u32 = 2;
const STRING_SHIFT: u32 = 4;
const COLOR_SHIFT: u32 = 6;
const TEXCOORD_SHIFT: u32 = 8;
const BONE_SHIFT: u32 = 10;
const SKIN_SLOTS_SHIFT: u32 = 12;
const SKIN_SHIFT: u32 = 14;
const FRAME_CHANGES_SHIFT: u32 = 16;
// bits 18-19 hold the shape width, always 0
const FACE_SHIFT: u32 = 20;

/// Decoded header flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderFlags {
    pub quality: Quality,
    pub vertex: IndexWidth,
    /// Width of string offsets, chosen from the string blob size
    pub string: IndexWidth,
    pub color: IndexWidth,
    pub texcoord: IndexWidth,
    pub bone: IndexWidth,
    /// Skin weight slot category (1, 2, 4 or 8 slots)
    pub skin_slots: u32,
    pub skin: IndexWidth,
    /// Width of the per-frame changed bone count
    pub frame_changes: IndexWidth,
    pub face: IndexWidth,
}

impl HeaderFlags {
    /// Flags describing `model` with a string blob of `string_bytes` bytes
    pub fn for_model(model: &Model, string_bytes: usize) -> Self {
        Self {
            quality: model.quality,
            vertex: model.vertex_width(),
            string: IndexWidth::for_count(string_bytes),
            color: model.color_width(),
            texcoord: model.texcoord_width(),
            bone: model.bone_width(),
            skin_slots: model.skin_slot_category(),
            skin: model.skin_width(),
            frame_changes: model.frame_change_width(),
            face: model.face_width(),
        }
    }

    pub fn to_bits(&self) -> u32 {
        (self.quality.code() << QUALITY_SHIFT)
            | (self.vertex.code() << VERTEX_SHIFT)
            | (self.string.code() << STRING_SHIFT)
            | (self.color.code() << COLOR_SHIFT)
            | (self.texcoord.code() << TEXCOORD_SHIFT)
            | (self.bone.code() << BONE_SHIFT)
            | ((self.skin_slots & 3) << SKIN_SLOTS_SHIFT)
            | (self.skin.code() << SKIN_SHIFT)
            | (self.frame_changes.code() << FRAME_CHANGES_SHIFT)
            | (self.face.code() << FACE_SHIFT)
    }

    pub fn from_bits(bits: u32) -> Self {
        let width = |shift: u32| IndexWidth::from_code(bits >> shift);
        Self {
            quality: match (bits >> QUALITY_SHIFT) & 3 {
                0 => Quality::Int8,
                1 => Quality::Int16,
                2 => Quality::Float32,
                _ => Quality::Float64,
            },
            vertex: width(VERTEX_SHIFT),
            string: width(STRING_SHIFT),
            color: width(COLOR_SHIFT),
            texcoord: width(TEXCOORD_SHIFT),
            bone: width(BONE_SHIFT),
            skin_slots: (bits >> SKIN_SLOTS_SHIFT) & 3,
            skin: width(SKIN_SHIFT),
            frame_changes: width(FRAME_CHANGES_SHIFT),
            face: width(FACE_SHIFT),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_positions() {
        let flags = HeaderFlags {
            quality: Quality::Int16,
            vertex: IndexWidth::U16,
            string: IndexWidth::U8,
            color: IndexWidth::Absent,
            texcoord: IndexWidth::U32,
            bone: IndexWidth::Absent,
            skin_slots: 2,
            skin: IndexWidth::Absent,
            frame_changes: IndexWidth::Absent,
            face: IndexWidth::U16,
        };
        let bits = flags.to_bits();
        assert_eq!(bits & 3, 1);
        assert_eq!((bits >> 2) & 3, 1);
        assert_eq!((bits >> 4) & 3, 0);
        assert_eq!((bits >> 6) & 3, 3);
        assert_eq!((bits >> 8) & 3, 2);
        assert_eq!((bits >> 12) & 3, 2);
        assert_eq!((bits >> 18) & 3, 0);
        assert_eq!((bits >> 20) & 3, 1);
        assert_eq!(HeaderFlags::from_bits(bits), flags);
    }

    #[test]
    fn test_empty_model_flags() {
        let model = Model::new(Quality::Int8);
        let flags = HeaderFlags::for_model(&model, 4);
        assert_eq!(flags.string, IndexWidth::U8);
        assert_eq!(flags.vertex, IndexWidth::Absent);
        assert_eq!(flags.face, IndexWidth::Absent);
        assert_eq!(flags.skin_slots, 0);
    }
}
