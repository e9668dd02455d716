//! Chunk assembly

use std::io::{self, Write};

use byteorder::{LittleEndian, WriteBytesExt};

use m3dkit_core::Diagnostics;

use super::HeaderFlags;
use crate::compression::{ModelCompression, StreamCompression};
use crate::exporter::ExportResult;
use crate::index::IndexRef;
use crate::model::{Model, PropertyValue, VertexKind};

/// File magic
pub const FILE_MAGIC: [u8; 4] = *b"3DMO";

/// Size of a chunk header (tag + length)
const CHUNK_HEADER_LEN: u32 = 8;

/// Chunk tags, in the order they appear in a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkTag {
    /// Scale, flags and string table
    Head,
    /// Color map
    ColorMap,
    /// Texture coordinates
    TextureMap,
    /// Vertex table
    Vertices,
    /// Bones and skin records
    Bones,
    Material,
    /// Faces grouped by material
    Mesh,
    /// Annotation labels (reserved)
    Labels,
    Action,
    /// Inlined asset
    Asset,
    /// Engine specific chunk
    Extension([u8; 4]),
    /// Stream terminator, has no length field
    End,
}

impl ChunkTag {
    pub fn from_bytes(tag: [u8; 4]) -> Self {
        match &tag {
            b"HEAD" => ChunkTag::Head,
            b"CMAP" => ChunkTag::ColorMap,
            b"TMAP" => ChunkTag::TextureMap,
            b"VRTS" => ChunkTag::Vertices,
            b"BONE" => ChunkTag::Bones,
            b"MTRL" => ChunkTag::Material,
            b"MESH" => ChunkTag::Mesh,
            b"LBLS" => ChunkTag::Labels,
            b"ACTN" => ChunkTag::Action,
            b"ASET" => ChunkTag::Asset,
            b"OMD3" => ChunkTag::End,
            _ => ChunkTag::Extension(tag),
        }
    }

    pub fn to_bytes(self) -> [u8; 4] {
        match self {
            ChunkTag::Head => *b"HEAD",
            ChunkTag::ColorMap => *b"CMAP",
            ChunkTag::TextureMap => *b"TMAP",
            ChunkTag::Vertices => *b"VRTS",
            ChunkTag::Bones => *b"BONE",
            ChunkTag::Material => *b"MTRL",
            ChunkTag::Mesh => *b"MESH",
            ChunkTag::Labels => *b"LBLS",
            ChunkTag::Action => *b"ACTN",
            ChunkTag::Asset => *b"ASET",
            ChunkTag::Extension(tag) => tag,
            ChunkTag::End => *b"OMD3",
        }
    }
}

/// String blob with the byte offset of every pooled string
///
/// The blob starts with the model name, license, author and comment;
/// offsets are indexed by string pool index.
#[derive(Debug, Clone)]
pub struct StringTable {
    pub blob: Vec<u8>,
    pub offsets: Vec<u32>,
}

impl StringTable {
    pub fn build(model: &Model) -> Self {
        let mut blob = Vec::new();
        for fixed in [&model.name, &model.license, &model.author, &model.comment] {
            blob.extend_from_slice(fixed.as_bytes());
            blob.push(0);
        }
        let mut offsets = Vec::with_capacity(model.strings.len());
        for s in &model.strings {
            offsets.push(blob.len() as u32);
            blob.extend_from_slice(s.as_bytes());
            blob.push(0);
        }
        Self { blob, offsets }
    }

    /// Offset for a string index; unknown indices map to "not set"
    pub fn offset(&self, index: u32) -> IndexRef {
        self.offsets
            .get(index as usize)
            .map_or(IndexRef::NotSet, |&o| IndexRef::Set(o))
    }
}

/// Serializes a [`Model`] into the binary format
#[derive(Debug, Clone, Copy)]
pub struct BinaryWriter {
    pub compress: bool,
    pub allow_unnormalized_uvs: bool,
}

impl Default for BinaryWriter {
    fn default() -> Self {
        Self {
            compress: true,
            allow_unnormalized_uvs: false,
        }
    }
}

fn write_chunk(out: &mut Vec<u8>, tag: ChunkTag, payload: &[u8]) -> io::Result<()> {
    out.write_all(&tag.to_bytes())?;
    out.write_u32::<LittleEndian>(payload.len() as u32 + CHUNK_HEADER_LEN)?;
    out.write_all(payload)
}

impl BinaryWriter {
    /// Encode a complete file: magic, length and chunk stream
    pub fn write(&self, model: &Model, diagnostics: &mut Diagnostics) -> ExportResult<Vec<u8>> {
        let stream = self.chunk_stream(model, diagnostics)?;
        let method = if self.compress {
            StreamCompression::Zlib
        } else {
            StreamCompression::None
        };
        let body = ModelCompression::compress(&stream, method)?;

        let mut file = Vec::with_capacity(body.len() + CHUNK_HEADER_LEN as usize);
        file.write_all(&FILE_MAGIC)?;
        file.write_u32::<LittleEndian>(body.len() as u32 + CHUNK_HEADER_LEN)?;
        file.write_all(&body)?;
        Ok(file)
    }

    /// Uncompressed chunk stream, including the terminator
    pub fn chunk_stream(&self, model: &Model, diagnostics: &mut Diagnostics) -> io::Result<Vec<u8>> {
        let strings = StringTable::build(model);
        let flags = HeaderFlags::for_model(model, strings.blob.len());
        tracing::debug!(?flags, "table widths");

        let mut out = Vec::new();
        let mut payload = Vec::new();

        payload.write_f32::<LittleEndian>(model.scale as f32)?;
        payload.write_u32::<LittleEndian>(flags.to_bits())?;
        payload.write_all(&strings.blob)?;
        write_chunk(&mut out, ChunkTag::Head, &payload)?;

        if !model.colors.is_empty() {
            payload.clear();
            for color in &model.colors {
                for channel in 0..4 {
                    payload.write_u8(color.channel_byte(channel))?;
                }
            }
            write_chunk(&mut out, ChunkTag::ColorMap, &payload)?;
        }

        if !model.texcoords.is_empty() {
            payload.clear();
            for uv in &model.texcoords {
                let uv = uv.for_output(self.allow_unnormalized_uvs, diagnostics);
                model.quality.write_texcoord(&mut payload, uv.0[0])?;
                model.quality.write_texcoord(&mut payload, uv.0[1])?;
            }
            write_chunk(&mut out, ChunkTag::TextureMap, &payload)?;
        }

        if !model.vertices.is_empty() {
            payload.clear();
            for vertex in &model.vertices {
                for c in vertex.coords {
                    model.quality.write_coordinate(&mut payload, c)?;
                }
                let skin = match vertex.kind {
                    VertexKind::Position { skin, .. } => IndexRef::from(skin),
                    VertexKind::Orientation => IndexRef::Alternate,
                };
                flags.color.write(&mut payload, vertex.color())?;
                flags.skin.write(&mut payload, skin)?;
            }
            write_chunk(&mut out, ChunkTag::Vertices, &payload)?;
        }

        if model.has_skeleton() {
            payload.clear();
            self.bones_payload(model, &flags, &strings, &mut payload)?;
            write_chunk(&mut out, ChunkTag::Bones, &payload)?;
        }

        for material in &model.materials {
            payload.clear();
            flags.string.write(&mut payload, strings.offset(material.name))?;
            for prop in &material.properties {
                payload.write_u8(prop.code)?;
                match prop.value {
                    PropertyValue::Color(index) => flags.color.write(&mut payload, index)?,
                    PropertyValue::Byte(value) => payload.write_u8(value)?,
                    PropertyValue::Map(name) => flags.string.write(&mut payload, strings.offset(name))?,
                    PropertyValue::Float(value) => payload.write_f32::<LittleEndian>(value as f32)?,
                }
            }
            write_chunk(&mut out, ChunkTag::Material, &payload)?;
        }

        if !model.faces.is_empty() {
            payload.clear();
            self.mesh_payload(model, &flags, &strings, &mut payload)?;
            write_chunk(&mut out, ChunkTag::Mesh, &payload)?;
        }

        for action in &model.actions {
            payload.clear();
            flags.string.write(&mut payload, strings.offset(action.name))?;
            payload.write_u16::<LittleEndian>(action.frames.len() as u16)?;
            payload.write_u32::<LittleEndian>(action.duration_ms)?;
            for frame in &action.frames {
                payload.write_u32::<LittleEndian>(frame.timestamp_ms)?;
                flags.frame_changes.write(&mut payload, frame.changes.len() as u32)?;
                for change in &frame.changes {
                    flags.bone.write(&mut payload, change.bone)?;
                    flags.vertex.write(&mut payload, change.position)?;
                    flags.vertex.write(&mut payload, change.orientation)?;
                }
            }
            write_chunk(&mut out, ChunkTag::Action, &payload)?;
        }

        for asset in &model.assets {
            payload.clear();
            flags.string.write(&mut payload, strings.offset(asset.name))?;
            payload.write_all(&asset.data)?;
            write_chunk(&mut out, ChunkTag::Asset, &payload)?;
        }

        for extension in &model.extensions {
            write_chunk(&mut out, ChunkTag::Extension(extension.tag), &extension.data)?;
        }

        out.write_all(&ChunkTag::End.to_bytes())?;
        Ok(out)
    }

    fn bones_payload(
        &self,
        model: &Model,
        flags: &HeaderFlags,
        strings: &StringTable,
        out: &mut Vec<u8>,
    ) -> io::Result<()> {
        flags.bone.write(out, model.bones.len() as u32)?;
        flags.skin.write(out, model.skins.len() as u32)?;
        for bone in &model.bones {
            flags.bone.write(out, bone.parent)?;
            flags.string.write(out, strings.offset(bone.name))?;
            flags.vertex.write(out, bone.position)?;
            flags.vertex.write(out, bone.orientation)?;
        }

        let slots = 1usize << flags.skin_slots;
        for skin in &model.skins {
            if flags.skin_slots > 0 {
                for slot in 0..slots {
                    out.write_u8(skin.get(slot).map_or(0, |w| w.weight))?;
                }
            }
            for weight in skin.iter().take(slots).filter(|w| w.weight != 0) {
                flags.bone.write(out, weight.bone)?;
            }
        }
        Ok(())
    }

    fn mesh_payload(
        &self,
        model: &Model,
        flags: &HeaderFlags,
        strings: &StringTable,
        out: &mut Vec<u8>,
    ) -> io::Result<()> {
        let face_flags = (3u8 << 4) | u8::from(model.face_uvs) | (u8::from(model.face_normals) << 1);
        let mut current = None;
        for face in &model.faces {
            if face.material != current {
                current = face.material;
                out.write_u8(0)?;
                let offset = current.map_or(IndexRef::NotSet, |m| strings.offset(m));
                flags.string.write(out, offset)?;
            }
            out.write_u8(face_flags)?;
            for corner in 0..3 {
                flags.vertex.write(out, face.vertices[corner])?;
                if model.face_uvs {
                    flags.texcoord.write(out, face.texcoords[corner])?;
                }
                if model.face_normals {
                    flags.vertex.write(out, face.normals[corner])?;
                }
            }
        }
        Ok(())
    }
}
