//! Scene to model conversion
//!
//! [`ModelBuilder`] owns every pool of one export run. The exporter drives it
//! through its phases in a fixed order (skeleton, mesh, materials, actions)
//! and finally freezes the pools into a [`Model`].
//!
//! Subsystem failures never abort the run: they are reported and switch the
//! affected subsystem off, so the mesh is always exported.

use std::collections::HashSet;

use glam::DVec3;
use indexmap::IndexSet;

use m3dkit_core::{Corner, Diagnostics, MeshObject, PoseSource, Scene, Severity};

use crate::animation::{collect_action_ranges, ActionEncoder};
use crate::exporter::ExportOptions;
use crate::index::IndexWidth;
use crate::material::MaterialEncoder;
use crate::model::{
    Action, Color, Face, InlinedAsset, Material, Model, SkinWeights, TexCoord, Vertex,
};
use crate::names;
use crate::pool::{Pool, PoolKind, StringPool};
use crate::quantize::{grid_compress, Quality};
use crate::skeleton::{encode_skeleton, normalize_weights, Skeleton, SkeletonError};
use crate::textures::{inline_payload, TextureProvider};

/// Accumulates the pooled tables of one export run
pub struct ModelBuilder<'o> {
    options: &'o ExportOptions,
    quality: Quality,
    colors: Pool<Color>,
    strings: StringPool,
    vertices: Pool<Vertex>,
    texcoords: Pool<TexCoord>,
    skins: Pool<SkinWeights>,
    assets: Pool<InlinedAsset>,
    faces: Vec<Face>,
    materials: Vec<Material>,
    /// Material names in order of first reference by a face
    referenced: IndexSet<String>,
    skeleton: Option<Skeleton>,
    actions: Vec<Action>,
    max_influences: usize,
    diagnostics: Diagnostics,
    /// Vertex groups are turned into skins
    skinning: bool,
    animation: bool,
}

impl<'o> ModelBuilder<'o> {
    pub fn new(options: &'o ExportOptions, scene: &Scene) -> Self {
        let quality = Quality::resolve(
            options.quality,
            options.triangle_count(scene),
            options.grid_compression,
        );
        Self {
            options,
            quality,
            colors: Pool::new(PoolKind::Color),
            strings: StringPool::new(),
            vertices: Pool::new(PoolKind::Vertex),
            texcoords: Pool::new(PoolKind::TexCoord),
            skins: Pool::new(PoolKind::Skin),
            assets: Pool::new(PoolKind::Other),
            faces: Vec::new(),
            materials: Vec::new(),
            referenced: IndexSet::new(),
            skeleton: None,
            actions: Vec::new(),
            max_influences: 0,
            diagnostics: Diagnostics::new(),
            skinning: options.skeleton,
            animation: options.animation,
        }
    }

    pub fn quality(&self) -> Quality {
        self.quality
    }

    /// Encode the bind-pose skeleton
    pub fn skeleton(&mut self, scene: &Scene) {
        if self.options.skeleton {
            if let Some(armature) = scene.armature.as_ref().filter(|a| !a.bones.is_empty()) {
                match encode_skeleton(
                    armature,
                    self.options.relative_bones,
                    self.quality,
                    &mut self.vertices,
                    &mut self.strings,
                ) {
                    Ok(skeleton) => self.skeleton = Some(skeleton),
                    Err(err) => {
                        self.diagnostics.error(err.to_string());
                        self.skinning = false;
                        self.animation = false;
                    }
                }
            }
        }
        if self.skeleton.is_none() && self.animation {
            self.diagnostics
                .warning("Skipping skeletal animation in lack of armature.");
            self.animation = false;
        }
    }

    /// Pool the triangles of every exported object
    pub fn mesh(&mut self, scene: &Scene) {
        for object in scene.exported_objects(self.options.selection_only) {
            self.object(object);
        }
        // group by material, keeping the triangle order inside a group
        self.faces.sort_by_key(|f| f.material);
        tracing::debug!(
            faces = self.faces.len(),
            vertices = self.vertices.len(),
            texcoords = self.texcoords.len(),
            skins = self.skins.len(),
            "mesh pooled"
        );
    }

    fn object(&mut self, object: &MeshObject) {
        let slots: Vec<Option<u32>> = if self.options.materials {
            object
                .material_slots
                .iter()
                .map(|slot| {
                    slot.as_deref()
                        .filter(|name| !name.is_empty())
                        .map(|name| self.strings.intern(&names::identifier(name)))
                })
                .collect()
        } else {
            Vec::new()
        };

        if self.skinning && self.animation && object.vertex_groups.is_empty() {
            self.diagnostics.warning(format!(
                "Mesh object '{}' has no vertex groups, no skeletal animation possible!",
                object.name
            ));
        }
        let groups = match &self.skeleton {
            Some(skeleton) if self.skinning => skeleton.map_groups(&object.vertex_groups),
            _ => vec![None; object.vertex_groups.len()],
        };

        for triangle in object.triangles(self.options.apply_modifiers) {
            let mut face = Face {
                material: None,
                vertices: [0; 3],
                texcoords: [None; 3],
                normals: [None; 3],
            };

            if !slots.is_empty() {
                let slot = if triangle.material < slots.len() {
                    triangle.material
                } else {
                    self.diagnostics.report_once(
                        format!("material-index:{}:{}", object.name, triangle.material),
                        Severity::Error,
                        format!(
                            "Polygon face in mesh '{}' referencing a non-existent material (index {}, largest can be {}).",
                            object.name,
                            triangle.material,
                            slots.len() - 1
                        ),
                    );
                    0
                };
                face.material = slots[slot];
                if let Some(Some(name)) = object.material_slots.get(slot) {
                    if face.material.is_some() {
                        self.referenced.insert(name.clone());
                    }
                }
            }

            for (i, corner) in triangle.corners.iter().enumerate() {
                face.vertices[i] = self.corner_vertex(object, &groups, corner);
                if self.options.normals {
                    face.normals[i] = corner.normal.map(|n| self.normal(n));
                }
                if self.options.uvs {
                    face.texcoords[i] = corner
                        .uv
                        .map(|uv| self.texcoords.intern(TexCoord(uv.map(|c| self.quality.round(c)))));
                }
            }
            self.faces.push(face);
        }
    }

    fn corner_vertex(&mut self, object: &MeshObject, groups: &[Option<u32>], corner: &Corner) -> u32 {
        let color = corner
            .color
            .filter(|_| self.options.colors)
            .map(|c| self.colors.intern(Color(c.map(|v| self.quality.round(v)))));
        let skin = if self.skinning && !corner.weights.is_empty() {
            self.skin(object, groups, corner)
        } else {
            None
        };
        let position = corner.position.map(|c| self.quality.round(c));
        self.vertices.intern(Vertex::position(position, color, skin))
    }

    fn skin(&mut self, object: &MeshObject, groups: &[Option<u32>], corner: &Corner) -> Option<u32> {
        if corner.weights.iter().map(|w| w.weight).sum::<f64>() <= 0.0 {
            return None;
        }
        let mut influences = Vec::with_capacity(corner.weights.len());
        for weight in &corner.weights {
            match groups.get(weight.group).copied().flatten() {
                Some(bone) => influences.push((bone, weight.weight)),
                None => {
                    let group = object
                        .vertex_groups
                        .get(weight.group)
                        .cloned()
                        .unwrap_or_else(|| format!("#{}", weight.group));
                    self.diagnostics
                        .error(SkeletonError::UnknownVertexGroup { group }.to_string());
                    self.skinning = false;
                    return None;
                }
            }
        }
        let weights = normalize_weights(&influences)?;
        self.max_influences = self.max_influences.max(weights.len());
        Some(self.skins.intern(weights))
    }

    fn normal(&mut self, normal: [f64; 3]) -> u32 {
        let n = DVec3::from_array(normal).normalize_or_zero();
        let n = n.to_array().map(|c| self.quality.round(c));
        self.vertices.intern(Vertex::position(n, None, None))
    }

    /// Encode every referenced material, inlining textures if requested
    pub fn materials<P: TextureProvider + ?Sized>(&mut self, scene: &Scene, provider: &P) {
        if !self.options.materials {
            return;
        }
        let mut attempted: HashSet<u32> = HashSet::new();
        for name in &self.referenced {
            let Some(material) = scene.material(name) else {
                self.diagnostics
                    .warning(format!("Material '{name}' is not defined in the scene."));
                continue;
            };
            let encoded = MaterialEncoder {
                quality: self.quality,
                colors: &mut self.colors,
                strings: &mut self.strings,
            }
            .encode(material, &mut self.diagnostics);

            if self.options.inline_assets {
                for texture in &encoded.textures {
                    if !attempted.insert(texture.name) {
                        continue;
                    }
                    match inline_payload(provider, &texture.texture) {
                        Ok(Some(data)) => {
                            self.assets.intern(InlinedAsset {
                                name: texture.name,
                                data,
                            });
                        }
                        Ok(None) => {}
                        Err(err) => {
                            self.diagnostics.report_once(
                                format!("texture:{}", texture.texture.name),
                                Severity::Error,
                                err.to_string(),
                            );
                        }
                    }
                }
            }

            if encoded.is_empty() {
                tracing::debug!(material = %name, "material has no properties, dropped");
                continue;
            }
            self.materials.push(Material {
                name: self.strings.intern(&names::identifier(name)),
                properties: encoded.properties,
            });
        }
    }

    /// Sample the scene's actions against the encoded skeleton
    pub fn actions<S: PoseSource + ?Sized>(&mut self, scene: &Scene, source: &mut S) {
        if !self.animation {
            return;
        }
        let skeleton = match &self.skeleton {
            Some(skeleton) if self.skinning => skeleton,
            _ => {
                self.diagnostics
                    .error("Trying to export animations without armature and skin");
                return;
            }
        };
        let ranges = collect_action_ranges(scene, self.options.markers);
        self.actions = ActionEncoder {
            skeleton,
            relative: self.options.relative_bones,
            quality: self.quality,
            fps: self.options.fps,
            vertices: &mut self.vertices,
            strings: &mut self.strings,
        }
        .encode_all(source, &ranges, &mut self.diagnostics);
    }

    /// Freeze the pools into a model, grid compressing its coordinates
    pub fn finish(self) -> (Model, Diagnostics) {
        for (kind, len) in [
            (self.colors.kind(), self.colors.len()),
            (self.vertices.kind(), self.vertices.len()),
            (self.texcoords.kind(), self.texcoords.len()),
            (self.skins.kind(), self.skins.len()),
        ] {
            tracing::debug!(%kind, len, width = ?IndexWidth::for_count(len), "pool frozen");
        }

        let mut vertices = self.vertices.into_vec();
        let mut scale = self.options.scale;
        if self.options.grid_compression {
            let extent = grid_compress(&mut vertices, self.quality);
            if scale <= 0.0 {
                scale = extent;
            }
        }
        if scale <= 0.0 {
            scale = 1.0;
        }

        let texcoords = self.texcoords.into_vec();
        let face_uvs = self.options.uvs && !texcoords.is_empty();
        let face_normals = self.options.normals
            && self
                .faces
                .iter()
                .any(|f| f.normals.iter().any(Option::is_some));

        let mut model = Model::new(self.quality);
        model.name = names::header_line(&self.options.name);
        model.license = names::header_line(&self.options.license);
        model.author = names::header_line(&self.options.author);
        model.comment = names::comment(&self.options.comment);
        model.scale = scale;
        model.colors = self.colors.into_vec();
        model.strings = self.strings.into_vec();
        model.vertices = vertices;
        model.texcoords = texcoords;
        model.faces = self.faces;
        model.face_uvs = face_uvs;
        model.face_normals = face_normals;
        model.materials = self.materials;
        model.bones = self.skeleton.map(|s| s.bones).unwrap_or_default();
        model.skins = self.skins.into_vec();
        model.max_influences = self.max_influences;
        model.actions = self.actions;
        model.assets = self.assets.into_vec();
        (model, self.diagnostics)
    }
}
