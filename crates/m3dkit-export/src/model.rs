//! Frozen model tables
//!
//! A [`Model`] is the result of interning a scene: every table is in
//! first-occurrence order and every cross reference is an index into one
//! of them. Writers only read a model.

use std::hash::{Hash, Hasher};

use smallvec::SmallVec;

use m3dkit_core::{Diagnostics, Severity};

use crate::index::IndexWidth;
use crate::quantize::Quality;

/// Hash a float slice by bit pattern
///
/// Values are rounded and `-0.0` is folded before pooling, so bitwise
/// equality is structural equality.
fn hash_bits<H: Hasher>(values: &[f64], state: &mut H) {
    for v in values {
        v.to_bits().hash(state);
    }
}

fn bits_eq(a: &[f64], b: &[f64]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.to_bits() == y.to_bits())
}

/// Pooled RGBA color
#[derive(Debug, Clone, Copy)]
pub struct Color(pub [f64; 4]);

impl Color {
    /// One channel as stored in the color map
    pub fn channel_byte(&self, channel: usize) -> u8 {
        (self.0[channel] * 255.0) as u8
    }

    /// `rrggbbaa` hex notation
    pub fn to_hex(&self) -> String {
        format!(
            "{:02x}{:02x}{:02x}{:02x}",
            self.channel_byte(0),
            self.channel_byte(1),
            self.channel_byte(2),
            self.channel_byte(3)
        )
    }
}

impl PartialEq for Color {
    fn eq(&self, other: &Self) -> bool {
        bits_eq(&self.0, &other.0)
    }
}

impl Eq for Color {}

impl Hash for Color {
    fn hash<H: Hasher>(&self, state: &mut H) {
        hash_bits(&self.0, state);
    }
}

/// Pooled texture coordinate
#[derive(Debug, Clone, Copy)]
pub struct TexCoord(pub [f64; 2]);

impl TexCoord {
    pub fn in_unit_range(&self) -> bool {
        self.0.iter().all(|c| (0.0..=1.0).contains(c))
    }

    pub fn clamped(&self) -> Self {
        TexCoord([self.0[0].clamp(0.0, 1.0), self.0[1].clamp(0.0, 1.0)])
    }

    /// Value as written out
    ///
    /// Out of range coordinates are clamped unless `allow_unnormalized`;
    /// the condition is reported once per export.
    pub fn for_output(&self, allow_unnormalized: bool, diagnostics: &mut Diagnostics) -> Self {
        if allow_unnormalized || self.in_unit_range() {
            return *self;
        }
        diagnostics.report_once("uv-range", Severity::Error, "Texture UV's are out of 0..1 range");
        self.clamped()
    }
}

impl PartialEq for TexCoord {
    fn eq(&self, other: &Self) -> bool {
        bits_eq(&self.0, &other.0)
    }
}

impl Eq for TexCoord {}

impl Hash for TexCoord {
    fn hash<H: Hasher>(&self, state: &mut H) {
        hash_bits(&self.0, state);
    }
}

/// What a pooled vertex tuple stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexKind {
    /// Position, normal or bone translation
    Position {
        color: Option<u32>,
        skin: Option<u32>,
    },
    /// Bone orientation quaternion `(x, y, z, w)`
    Orientation,
}

/// Pooled vertex table entry
#[derive(Debug, Clone, Copy)]
pub struct Vertex {
    pub coords: [f64; 4],
    pub kind: VertexKind,
}

impl Vertex {
    pub fn position(xyz: [f64; 3], color: Option<u32>, skin: Option<u32>) -> Self {
        Self {
            coords: [xyz[0], xyz[1], xyz[2], 1.0],
            kind: VertexKind::Position { color, skin },
        }
    }

    pub fn orientation(quat: [f64; 4]) -> Self {
        Self {
            coords: quat,
            kind: VertexKind::Orientation,
        }
    }

    pub fn is_position(&self) -> bool {
        matches!(self.kind, VertexKind::Position { .. })
    }

    pub fn color(&self) -> Option<u32> {
        match self.kind {
            VertexKind::Position { color, .. } => color,
            VertexKind::Orientation => None,
        }
    }

    pub fn skin(&self) -> Option<u32> {
        match self.kind {
            VertexKind::Position { skin, .. } => skin,
            VertexKind::Orientation => None,
        }
    }
}

impl PartialEq for Vertex {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && bits_eq(&self.coords, &other.coords)
    }
}

impl Eq for Vertex {}

impl Hash for Vertex {
    fn hash<H: Hasher>(&self, state: &mut H) {
        hash_bits(&self.coords, state);
        self.kind.hash(state);
    }
}

/// One bone influence, weight in 1/255 units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SkinWeight {
    pub bone: u32,
    pub weight: u8,
}

/// Up to eight influences summing to 255
pub type SkinWeights = SmallVec<[SkinWeight; 8]>;

/// Triangle referencing the pooled tables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Face {
    /// String index of the material name
    pub material: Option<u32>,
    pub vertices: [u32; 3],
    pub texcoords: [Option<u32>; 3],
    /// Normal vectors, stored in the vertex table
    pub normals: [Option<u32>; 3],
}

/// Bind-pose bone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bone {
    pub parent: Option<u32>,
    pub name: u32,
    pub position: u32,
    pub orientation: u32,
}

/// Typed material property value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PropertyValue {
    /// Color table index (also used for grayscale properties)
    Color(u32),
    Float(f64),
    Byte(u8),
    /// String index of the texture name
    Map(u32),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaterialProperty {
    pub code: u8,
    pub value: PropertyValue,
}

/// Material with at least one property
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: u32,
    pub properties: Vec<MaterialProperty>,
}

/// Bone transform change recorded in a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoneChange {
    pub bone: u32,
    pub position: u32,
    pub orientation: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub timestamp_ms: u32,
    pub changes: Vec<BoneChange>,
}

/// Animation with at least one frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub name: u32,
    pub duration_ms: u32,
    pub frames: Vec<Frame>,
}

/// Embedded texture payload
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InlinedAsset {
    pub name: u32,
    pub data: Vec<u8>,
}

/// Opaque engine specific chunk appended after the standard ones
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionChunk {
    pub tag: [u8; 4],
    pub data: Vec<u8>,
}

/// Complete, frozen model ready for serialization
#[derive(Debug, Clone)]
pub struct Model {
    pub name: String,
    pub license: String,
    pub author: String,
    pub comment: String,
    pub scale: f64,
    pub quality: Quality,
    pub colors: Vec<Color>,
    pub strings: Vec<String>,
    pub vertices: Vec<Vertex>,
    pub texcoords: Vec<TexCoord>,
    pub faces: Vec<Face>,
    /// Faces carry texture coordinate indices
    pub face_uvs: bool,
    /// Faces carry normal indices
    pub face_normals: bool,
    pub materials: Vec<Material>,
    pub bones: Vec<Bone>,
    pub skins: Vec<SkinWeights>,
    /// Largest number of influences on one vertex
    pub max_influences: usize,
    pub actions: Vec<Action>,
    pub assets: Vec<InlinedAsset>,
    pub extensions: Vec<ExtensionChunk>,
}

impl Model {
    pub fn new(quality: Quality) -> Self {
        Self {
            name: String::new(),
            license: String::new(),
            author: String::new(),
            comment: String::new(),
            scale: 1.0,
            quality,
            colors: Vec::new(),
            strings: Vec::new(),
            vertices: Vec::new(),
            texcoords: Vec::new(),
            faces: Vec::new(),
            face_uvs: false,
            face_normals: false,
            materials: Vec::new(),
            bones: Vec::new(),
            skins: Vec::new(),
            max_influences: 0,
            actions: Vec::new(),
            assets: Vec::new(),
            extensions: Vec::new(),
        }
    }

    /// Weight slot category: 0, 1, 2 or 3 for 1, 2, 4 or 8 slots
    pub fn skin_slot_category(&self) -> u32 {
        match self.max_influences {
            0 | 1 => 0,
            2 => 1,
            3 | 4 => 2,
            _ => 3,
        }
    }

    /// Largest number of changed bones in any frame
    pub fn max_frame_changes(&self) -> usize {
        self.actions
            .iter()
            .flat_map(|a| a.frames.iter())
            .map(|f| f.changes.len())
            .max()
            .unwrap_or(0)
    }

    pub fn has_skeleton(&self) -> bool {
        !self.bones.is_empty() || !self.skins.is_empty()
    }

    pub fn string(&self, index: u32) -> &str {
        self.strings.get(index as usize).map_or("", String::as_str)
    }

    pub fn color_width(&self) -> IndexWidth {
        IndexWidth::for_count(self.colors.len())
    }

    pub fn texcoord_width(&self) -> IndexWidth {
        IndexWidth::for_count(self.texcoords.len())
    }

    pub fn vertex_width(&self) -> IndexWidth {
        IndexWidth::for_count(self.vertices.len())
    }

    pub fn bone_width(&self) -> IndexWidth {
        IndexWidth::for_count(self.bones.len())
    }

    pub fn skin_width(&self) -> IndexWidth {
        IndexWidth::for_count(self.skins.len())
    }

    pub fn face_width(&self) -> IndexWidth {
        IndexWidth::for_count(self.faces.len())
    }

    pub fn frame_change_width(&self) -> IndexWidth {
        IndexWidth::for_count(self.max_frame_changes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_kind_distinguishes_entries() {
        let position = Vertex {
            coords: [0.0, 0.0, 0.0, 1.0],
            kind: VertexKind::Position { color: None, skin: None },
        };
        let orientation = Vertex::orientation([0.0, 0.0, 0.0, 1.0]);
        assert_ne!(position, orientation);
        assert_eq!(position, Vertex::position([0.0; 3], None, None));
    }

    #[test]
    fn test_color_hex() {
        assert_eq!(Color([1.0, 0.0, 0.5, 1.0]).to_hex(), "ff007fff");
    }

    #[test]
    fn test_slot_category() {
        let mut model = Model::new(Quality::Int8);
        for (max, category) in [(0, 0), (1, 0), (2, 1), (3, 2), (4, 2), (5, 3), (8, 3)] {
            model.max_influences = max;
            assert_eq!(model.skin_slot_category(), category, "max {max}");
        }
    }

    #[test]
    fn test_texcoord_clamp() {
        let uv = TexCoord([1.5, -0.25]);
        assert!(!uv.in_unit_range());
        assert_eq!(uv.clamped(), TexCoord([1.0, 0.0]));

        let mut diagnostics = Diagnostics::new();
        assert_eq!(uv.for_output(true, &mut diagnostics), uv);
        assert_eq!(uv.for_output(false, &mut diagnostics), TexCoord([1.0, 0.0]));
        assert_eq!(TexCoord([2.0, 0.5]).for_output(false, &mut diagnostics), TexCoord([1.0, 0.5]));
        assert_eq!(diagnostics.len(), 1);
    }
}
