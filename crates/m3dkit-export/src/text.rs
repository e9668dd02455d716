//! Textual `.a3d` writer
//!
//! Line oriented equivalent of the binary format built from the same
//! frozen tables. Sections are separated by blank lines and every line
//! ends with CRLF.

use std::fmt::{self, Write as _};

use m3dkit_core::Diagnostics;

use crate::compression::{ModelCompression, StreamCompression};
use crate::exporter::ExportResult;
use crate::material;
use crate::model::{Model, PropertyValue};
use crate::quantize::round_to;

const EOL: &str = "\r\n";

/// Digits used for skin weights in vertex lines
const WEIGHT_DIGITS: i32 = 4;

/// Serializes a [`Model`] into the textual format
#[derive(Debug, Clone, Copy)]
pub struct TextWriter {
    /// Gzip the document
    pub compress: bool,
    pub allow_unnormalized_uvs: bool,
}

impl Default for TextWriter {
    fn default() -> Self {
        Self {
            compress: true,
            allow_unnormalized_uvs: false,
        }
    }
}

impl TextWriter {
    /// Encode the document, gzipped if requested
    pub fn write(&self, model: &Model, diagnostics: &mut Diagnostics) -> ExportResult<Vec<u8>> {
        let document = self.document(model, diagnostics)?;
        let method = if self.compress {
            StreamCompression::Gzip
        } else {
            StreamCompression::None
        };
        Ok(ModelCompression::compress(document.as_bytes(), method)?)
    }

    /// Build the uncompressed document
    pub fn document(&self, model: &Model, diagnostics: &mut Diagnostics) -> Result<String, fmt::Error> {
        let mut s = String::new();
        write_header(&mut s, model)?;
        write_materials(&mut s, model)?;
        self.write_texcoords(&mut s, model, diagnostics)?;
        write_vertices(&mut s, model)?;
        write_mesh(&mut s, model)?;
        if model.has_skeleton() {
            write!(s, "Bones{EOL}")?;
            write_bone_tree(&mut s, model, None, 0)?;
            s.push_str(EOL);
        }
        write_actions(&mut s, model)?;
        write_assets(&mut s, model)?;
        Ok(s)
    }

    fn write_texcoords(&self, s: &mut String, model: &Model, diagnostics: &mut Diagnostics) -> fmt::Result {
        if model.texcoords.is_empty() {
            return Ok(());
        }
        let digits = model.quality.digits();
        write!(s, "Textmap{EOL}")?;
        for uv in &model.texcoords {
            let uv = uv.for_output(self.allow_unnormalized_uvs, diagnostics);
            write!(s, "{} {}{EOL}", round_to(uv.0[0], digits), round_to(uv.0[1], digits))?;
        }
        s.push_str(EOL);
        Ok(())
    }
}

fn write_header(s: &mut String, model: &Model) -> fmt::Result {
    write!(s, "3dmodel {}{EOL}", model.scale)?;
    for line in [&model.name, &model.license, &model.author, &model.comment] {
        write!(s, "{line}{EOL}")?;
    }
    s.push_str(EOL);
    Ok(())
}

fn write_materials(s: &mut String, model: &Model) -> fmt::Result {
    let digits = model.quality.digits();
    for mat in &model.materials {
        write!(s, "Material {}{EOL}", model.string(mat.name))?;
        for prop in &mat.properties {
            let Some(def) = material::property(prop.code) else {
                continue;
            };
            match prop.value {
                PropertyValue::Color(index) => {
                    let hex = model.colors.get(index as usize).map(|c| c.to_hex()).unwrap_or_default();
                    write!(s, "{} #{hex}{EOL}", def.key)?;
                }
                PropertyValue::Float(v) => write!(s, "{} {}{EOL}", def.key, round_to(v, digits))?,
                PropertyValue::Byte(v) => write!(s, "{} {v}{EOL}", def.key)?,
                PropertyValue::Map(name) => write!(s, "{} {}{EOL}", def.key, model.string(name))?,
            }
        }
        s.push_str(EOL);
    }
    Ok(())
}

fn write_vertices(s: &mut String, model: &Model) -> fmt::Result {
    if model.vertices.is_empty() {
        return Ok(());
    }
    write!(s, "Vertex{EOL}")?;
    for vertex in &model.vertices {
        let [x, y, z, w] = vertex.coords;
        write!(s, "{x} {y} {z} {w}")?;
        let skin = vertex.skin().and_then(|i| model.skins.get(i as usize));
        match vertex.color().and_then(|i| model.colors.get(i as usize)) {
            Some(color) => write!(s, " #{}", color.to_hex())?,
            None if skin.is_some() => s.push_str(" #ffffffff"),
            None => {}
        }
        for weight in skin.into_iter().flatten().filter(|w| w.weight != 0) {
            let w = round_to(f64::from(weight.weight) / 255.0, WEIGHT_DIGITS);
            write!(s, " {}:{w}", weight.bone)?;
        }
        s.push_str(EOL);
    }
    s.push_str(EOL);
    Ok(())
}

fn write_mesh(s: &mut String, model: &Model) -> fmt::Result {
    if model.faces.is_empty() {
        return Ok(());
    }
    write!(s, "Mesh{EOL}")?;
    let mut current = None;
    for face in &model.faces {
        if face.material != current {
            current = face.material;
            match current {
                Some(name) => write!(s, "use {}{EOL}", model.string(name))?,
                None => write!(s, "use{EOL}")?,
            }
        }
        for corner in 0..3 {
            if corner > 0 {
                s.push(' ');
            }
            write!(s, "{}/", face.vertices[corner])?;
            if let Some(t) = face.texcoords[corner].filter(|_| model.face_uvs) {
                write!(s, "{t}")?;
            }
            s.push('/');
            if let Some(n) = face.normals[corner].filter(|_| model.face_normals) {
                write!(s, "{n}")?;
            }
        }
        s.push_str(EOL);
    }
    s.push_str(EOL);
    Ok(())
}

/// Children of `parent` depth first, one `/` per level
fn write_bone_tree(s: &mut String, model: &Model, parent: Option<u32>, level: usize) -> fmt::Result {
    for (index, bone) in model.bones.iter().enumerate() {
        if bone.parent != parent {
            continue;
        }
        write!(
            s,
            "{}{} {} {}{EOL}",
            "/".repeat(level),
            bone.position,
            bone.orientation,
            model.string(bone.name)
        )?;
        write_bone_tree(s, model, Some(index as u32), level + 1)?;
    }
    Ok(())
}

fn write_actions(s: &mut String, model: &Model) -> fmt::Result {
    for action in model.actions.iter().filter(|a| !a.frames.is_empty()) {
        write!(s, "Action {} {}{EOL}", action.duration_ms, model.string(action.name))?;
        for frame in &action.frames {
            write!(s, "frame {}{EOL}", frame.timestamp_ms)?;
            for change in &frame.changes {
                write!(s, "{} {} {}{EOL}", change.bone, change.position, change.orientation)?;
            }
        }
        s.push_str(EOL);
    }
    Ok(())
}

fn write_assets(s: &mut String, model: &Model) -> fmt::Result {
    if model.assets.is_empty() {
        return Ok(());
    }
    write!(s, "Assets{EOL}")?;
    for asset in &model.assets {
        write!(s, "{}.png{EOL}", model.string(asset.name))?;
    }
    s.push_str(EOL);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Bone, Color, Face, Material, MaterialProperty, SkinWeight, SkinWeights, TexCoord, Vertex};
    use crate::quantize::Quality;

    fn writer() -> TextWriter {
        TextWriter {
            compress: false,
            allow_unnormalized_uvs: false,
        }
    }

    #[test]
    fn test_header_lines() {
        let mut model = Model::new(Quality::Float32);
        model.scale = 2.5;
        model.name = "Crate".into();
        model.license = "MIT".into();
        model.author = "someone".into();
        model.comment = "line one\r\nline two".into();
        let doc = writer().document(&model, &mut Diagnostics::new()).unwrap();
        assert_eq!(doc, "3dmodel 2.5\r\nCrate\r\nMIT\r\nsomeone\r\nline one\r\nline two\r\n\r\n");
    }

    #[test]
    fn test_sections() {
        let mut model = Model::new(Quality::Int8);
        model.strings = vec!["Red".into(), "root".into(), "tip".into()];
        model.colors = vec![Color([1.0, 0.0, 0.0, 1.0])];
        model.texcoords = vec![TexCoord([0.5, 1.25])];
        model.skins = vec![SkinWeights::from_slice(&[
            SkinWeight { bone: 0, weight: 191 },
            SkinWeight { bone: 1, weight: 64 },
        ])];
        model.max_influences = 2;
        model.vertices = vec![
            Vertex::position([0.0, 0.5, -1.0], Some(0), None),
            Vertex::position([1.0, 0.0, 0.0], None, Some(0)),
            Vertex::orientation([0.0, 0.0, 0.0, 1.0]),
        ];
        model.bones = vec![
            Bone { parent: None, name: 1, position: 0, orientation: 2 },
            Bone { parent: Some(0), name: 2, position: 1, orientation: 2 },
        ];
        model.faces = vec![Face {
            material: Some(0),
            vertices: [0, 1, 0],
            texcoords: [Some(0); 3],
            normals: [None; 3],
        }];
        model.face_uvs = true;
        model.materials = vec![Material {
            name: 0,
            properties: vec![
                MaterialProperty { code: 0, value: PropertyValue::Color(0) },
                MaterialProperty { code: 7, value: PropertyValue::Float(0.5) },
                MaterialProperty { code: 8, value: PropertyValue::Byte(2) },
            ],
        }];

        let mut diagnostics = Diagnostics::new();
        let doc = writer().document(&model, &mut diagnostics).unwrap();
        assert!(doc.contains("Material Red\r\nKd #ff0000ff\r\nd 0.5\r\nil 2\r\n\r\n"));
        assert!(doc.contains("Textmap\r\n0.5 1\r\n\r\n"));
        assert!(doc.contains("Vertex\r\n0 0.5 -1 1 #ff0000ff\r\n1 0 0 1 #ffffffff 0:0.749 1:0.251\r\n"));
        assert!(doc.contains("Mesh\r\nuse Red\r\n0/0/ 1/0/ 0/0/\r\n\r\n"));
        assert!(doc.contains("Bones\r\n0 2 root\r\n/1 2 tip\r\n\r\n"));
        assert!(!doc.replace("\r\n", "").contains('\n'));
        assert!(diagnostics.mentions("UV"));
    }

    #[test]
    fn test_gzip_output() {
        let model = Model::new(Quality::Float32);
        let bytes = TextWriter::default().write(&model, &mut Diagnostics::new()).unwrap();
        assert_eq!(&bytes[..2], &[0x1F, 0x8B]);
    }
}
