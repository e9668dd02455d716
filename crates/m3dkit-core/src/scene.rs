//! Pre-normalized scene representation
//!
//! This is what scene extraction hands to the encoder: triangles that
//! reference raw attribute tuples, materials with resolved values, bones
//! with model-space bind matrices and baked animation clips. Everything is
//! `serde` friendly so a scene can be stored as JSON next to its textures.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result, ResultExt};
use crate::types::{Mat4x4, Rgba, Uv};

fn default_true() -> bool {
    true
}

/// A complete scene snapshot ready for encoding
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Scene {
    /// Mesh objects, in host order
    pub objects: Vec<MeshObject>,
    /// Materials referenced by name from the objects' material slots
    pub materials: Vec<SceneMaterial>,
    /// Bind-pose skeleton, if the scene has one
    pub armature: Option<Armature>,
    /// Baked animation clips
    pub clips: Vec<AnimationClip>,
    /// Clip sampled when an action does not select one (marker ranges)
    pub active_clip: Option<usize>,
    /// Timeline markers
    pub markers: Vec<TimelineMarker>,
    /// First frame of the scene timeline
    pub frame_start: i32,
    /// Last frame of the scene timeline
    pub frame_end: i32,
}

impl Scene {
    /// Parse a scene from its JSON form
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::invalid_data(e.to_string()))
    }

    /// Load a scene file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::FileNotFound(path.to_path_buf()));
        }
        let json = fs::read_to_string(path)
            .with_context(|| format!("reading scene {}", path.display()))?;
        Self::from_json(&json).with_context(|| format!("parsing scene {}", path.display()))
    }

    /// Look up a material by its name
    pub fn material(&self, name: &str) -> Option<&SceneMaterial> {
        self.materials.iter().find(|m| m.name == name)
    }

    /// Objects taking part in an export
    pub fn exported_objects(&self, selection_only: bool) -> impl Iterator<Item = &MeshObject> {
        self.objects
            .iter()
            .filter(move |o| !selection_only || o.selected)
    }

    /// Total triangle count over the exported objects
    pub fn triangle_count(&self, selection_only: bool, apply_modifiers: bool) -> usize {
        self.exported_objects(selection_only)
            .map(|o| o.triangles(apply_modifiers).len())
            .sum()
    }

    /// Create a pose sampler over this scene's clips
    pub fn animator(&self) -> SceneAnimator<'_> {
        SceneAnimator::new(self)
    }
}

/// A triangulated mesh object in model space
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshObject {
    pub name: String,
    #[serde(default = "default_true")]
    pub selected: bool,
    /// Material name per slot; `None` for an empty slot
    pub material_slots: Vec<Option<String>>,
    /// Vertex group names, matched against bone names for skinning
    pub vertex_groups: Vec<String>,
    /// Triangles before modifiers
    pub triangles: Vec<Triangle>,
    /// Triangles with modifiers applied, when the host evaluated them
    pub evaluated_triangles: Option<Vec<Triangle>>,
}

impl MeshObject {
    /// Triangles to export depending on whether modifiers are applied
    pub fn triangles(&self, apply_modifiers: bool) -> &[Triangle] {
        match &self.evaluated_triangles {
            Some(evaluated) if apply_modifiers => evaluated,
            _ => &self.triangles,
        }
    }
}

/// One triangle with its material slot and three corners
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Triangle {
    /// Index into the owning object's material slots
    #[serde(default)]
    pub material: usize,
    pub corners: [Corner; 3],
}

/// Raw per-corner attributes
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Corner {
    pub position: [f64; 3],
    pub normal: Option<[f64; 3]>,
    pub uv: Option<Uv>,
    pub color: Option<Rgba>,
    pub weights: Vec<VertexWeight>,
}

/// Influence of a vertex group on a vertex
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct VertexWeight {
    /// Index into the owning object's vertex groups
    pub group: usize,
    pub weight: f64,
}

/// Reference to an image used by a material
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextureRef {
    pub name: String,
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl TextureRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: None,
        }
    }
}

/// A named material
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneMaterial {
    pub name: String,
    /// Resolved physically based surface; `None` when the host could not
    /// express the material that way
    pub surface: Option<PbrSurface>,
    /// First image texture found in the material, used as diffuse map
    pub fallback_texture: Option<TextureRef>,
}

/// Resolved physically based surface values
///
/// Zero and `None` mean "not set".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PbrSurface {
    pub base_color: Rgba,
    pub alpha: f64,
    pub metallic: f64,
    pub specular: f64,
    pub specular_tint: Option<Rgba>,
    pub emission: Option<Rgba>,
    pub transmission: f64,
    pub normalmap_strength: f64,
    pub roughness: f64,
    pub sheen: f64,
    pub ior: f64,
    pub base_color_texture: Option<TextureRef>,
    pub specular_texture: Option<TextureRef>,
    pub transmission_texture: Option<TextureRef>,
    pub normalmap_texture: Option<TextureRef>,
    pub alpha_texture: Option<TextureRef>,
    pub roughness_texture: Option<TextureRef>,
    pub metallic_texture: Option<TextureRef>,
    pub ior_texture: Option<TextureRef>,
}

/// Bind-pose skeleton
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Armature {
    pub name: String,
    /// Bones in host traversal order
    pub bones: Vec<SceneBone>,
}

impl Armature {
    pub fn find_bone(&self, name: &str) -> Option<&SceneBone> {
        self.bones.iter().find(|b| b.name == name)
    }
}

/// A bone with its model-space bind matrix
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SceneBone {
    pub name: String,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub matrix: Mat4x4,
}

/// A baked animation clip
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationClip {
    pub name: String,
    pub frame_start: i32,
    pub frame_end: i32,
    /// Keyed poses sorted by frame; a bone keeps its last keyed matrix
    pub keys: Vec<PoseKey>,
}

impl AnimationClip {
    /// Model-space matrix of a bone at a frame, if the clip keys it
    pub fn sample(&self, bone: &str, frame: i32) -> Option<Mat4x4> {
        self.keys
            .iter()
            .take_while(|k| k.frame <= frame)
            .filter_map(|k| k.bones.get(bone))
            .last()
            .copied()
    }
}

/// Model-space bone matrices keyed at one frame
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoseKey {
    pub frame: i32,
    pub bones: HashMap<String, Mat4x4>,
}

/// A named timeline marker
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimelineMarker {
    pub name: String,
    pub frame: i32,
}

/// Playback state of a [`SceneAnimator`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Playback {
    pub clip: Option<usize>,
    pub frame: i32,
    pub posed: bool,
}

/// Steps through the baked clips of a [`Scene`]
#[derive(Debug, Clone)]
pub struct SceneAnimator<'a> {
    scene: &'a Scene,
    playback: Playback,
}

impl<'a> SceneAnimator<'a> {
    pub fn new(scene: &'a Scene) -> Self {
        Self {
            scene,
            playback: Playback {
                clip: scene.active_clip,
                frame: scene.frame_start,
                posed: false,
            },
        }
    }

    pub fn playback(&self) -> Playback {
        self.playback
    }
}

impl crate::pose::PoseSource for SceneAnimator<'_> {
    type Snapshot = Playback;

    fn snapshot(&self) -> Playback {
        self.playback
    }

    fn restore(&mut self, snapshot: Playback) {
        self.playback = snapshot;
    }

    fn set_posed(&mut self, posed: bool) {
        self.playback.posed = posed;
    }

    fn select_clip(&mut self, clip: usize) {
        self.playback.clip = Some(clip);
    }

    fn set_frame(&mut self, frame: i32) {
        self.playback.frame = frame;
    }

    fn bone_matrix(&self, bone: &str) -> Option<Mat4x4> {
        let rest = self.scene.armature.as_ref()?.find_bone(bone)?.matrix;
        if !self.playback.posed {
            return Some(rest);
        }
        let keyed = self
            .playback
            .clip
            .and_then(|c| self.scene.clips.get(c))
            .and_then(|clip| clip.sample(bone, self.playback.frame));
        Some(keyed.unwrap_or(rest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::PoseSource;

    fn two_bone_scene() -> Scene {
        let mut keys = HashMap::new();
        keys.insert(
            "tip".to_string(),
            Mat4x4::from_translation_rotation([0.0, 2.0, 0.0], [0.0, 0.0, 0.0, 1.0]),
        );
        Scene {
            armature: Some(Armature {
                name: "rig".into(),
                bones: vec![
                    SceneBone {
                        name: "root".into(),
                        parent: None,
                        matrix: Mat4x4::IDENTITY,
                    },
                    SceneBone {
                        name: "tip".into(),
                        parent: Some("root".into()),
                        matrix: Mat4x4::from_translation_rotation([0.0, 1.0, 0.0], [0.0, 0.0, 0.0, 1.0]),
                    },
                ],
            }),
            clips: vec![AnimationClip {
                name: "wave".into(),
                frame_start: 0,
                frame_end: 4,
                keys: vec![PoseKey { frame: 2, bones: keys }],
            }],
            frame_end: 4,
            ..Default::default()
        }
    }

    #[test]
    fn test_rest_pose_until_posed() {
        let scene = two_bone_scene();
        let mut animator = scene.animator();
        animator.select_clip(0);
        animator.set_frame(3);
        assert_eq!(animator.bone_matrix("tip").map(|m| m.translation()), Some([0.0, 1.0, 0.0]));

        animator.set_posed(true);
        assert_eq!(animator.bone_matrix("tip").map(|m| m.translation()), Some([0.0, 2.0, 0.0]));
    }

    #[test]
    fn test_sample_holds_last_key() {
        let scene = two_bone_scene();
        let clip = &scene.clips[0];
        assert!(clip.sample("tip", 1).is_none());
        assert!(clip.sample("tip", 2).is_some());
        assert!(clip.sample("tip", 4).is_some());
        assert!(clip.sample("root", 4).is_none());
    }

    #[test]
    fn test_unknown_bone_has_no_matrix() {
        let scene = two_bone_scene();
        assert!(scene.animator().bone_matrix("missing").is_none());
    }

    #[test]
    fn test_scene_from_json() {
        let json = r#"{
            "objects": [{
                "name": "Cube",
                "material_slots": ["Red"],
                "triangles": [{
                    "corners": [
                        {"position": [0, 0, 0]},
                        {"position": [1, 0, 0]},
                        {"position": [0, 1, 0], "uv": [0.5, 0.5]}
                    ]
                }]
            }],
            "materials": [{"name": "Red", "surface": {"base_color": [1, 0, 0, 1], "specular": 0.5}}]
        }"#;
        let scene = Scene::from_json(json).unwrap();
        assert_eq!(scene.triangle_count(true, true), 1);
        assert!(scene.objects[0].selected);
        assert_eq!(scene.material("Red").and_then(|m| m.surface.as_ref()).map(|s| s.specular), Some(0.5));
    }

    #[test]
    fn test_malformed_json_is_invalid_data() {
        let err = Scene::from_json(r#"{"objects": 3}"#).unwrap_err();
        assert!(matches!(err, Error::InvalidData { .. }));
    }

    #[test]
    fn test_load_reports_missing_file() {
        let err = Scene::load("/nonexistent/scene.json").unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("scene.json"));
    }

    #[test]
    fn test_load_adds_path_context() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "not json").unwrap();

        let err = Scene::load(&path).unwrap_err();
        assert!(err.to_string().contains("parsing scene"));
        assert!(!err.is_not_found());
    }
}
