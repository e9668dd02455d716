//! Skeleton and skin encoding
//!
//! Bones are interned in host order with their transforms stored as two
//! vertex table entries (translation and orientation quaternion). The
//! hierarchy is validated before anything is interned so that a rejected
//! skeleton leaves no stray entries in the pools.

use std::collections::{HashMap, HashSet};

use glam::{DMat4, DQuat};
use thiserror::Error;

use m3dkit_core::{Armature, Mat4x4};

use crate::model::{Bone, SkinWeight, SkinWeights, Vertex};
use crate::names;
use crate::pool::{Pool, StringPool};
use crate::quantize::Quality;

/// Most influences a vertex can keep
pub const MAX_INFLUENCES: usize = 8;

/// Conditions that disable skeleton (and animation) export
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SkeletonError {
    #[error("Bone '{bone}' references parent '{parent}' which does not precede it.")]
    ParentNotVisited { bone: String, parent: String },

    #[error("Bone name {bone} not unique.")]
    DuplicateName { bone: String },

    #[error("Vertex group name '{group}' does not match any bone.")]
    UnknownVertexGroup { group: String },
}

pub type SkeletonResult<T> = Result<T, SkeletonError>;

impl From<SkeletonError> for m3dkit_core::Error {
    fn from(err: SkeletonError) -> Self {
        m3dkit_core::Error::Skeleton {
            message: err.to_string(),
        }
    }
}

/// Strip scale from a matrix, keeping a normalized rotation and the translation
pub fn normalize_matrix(matrix: &Mat4x4) -> DMat4 {
    let (_, rotation, translation) = matrix.to_dmat4().to_scale_rotation_translation();
    DMat4::from_rotation_translation(rotation.normalize(), translation)
}

/// Translation and orientation of a bone
///
/// With `parent` given the transform is expressed relative to it.
pub fn bone_transform(matrix: &Mat4x4, parent: Option<&Mat4x4>) -> ([f64; 3], [f64; 4]) {
    let mut m = normalize_matrix(matrix);
    if let Some(parent) = parent {
        m = normalize_matrix(parent).inverse() * m;
    }
    let (_, rotation, translation) = m.to_scale_rotation_translation();
    let rotation: DQuat = rotation.normalize();
    (translation.to_array(), rotation.to_array())
}

/// Round a transform and intern it as a position and an orientation entry
pub fn intern_transform(
    vertices: &mut Pool<Vertex>,
    quality: Quality,
    (position, orientation): ([f64; 3], [f64; 4]),
) -> (u32, u32) {
    let pos = vertices.intern(Vertex::position(position.map(|c| quality.round(c)), None, None));
    let ori = vertices.intern(Vertex::orientation(orientation.map(|c| quality.round(c))));
    (pos, ori)
}

/// Encoded bind-pose skeleton
#[derive(Debug, Clone, Default)]
pub struct Skeleton {
    pub bones: Vec<Bone>,
    /// Host bone names, by bone index
    pub host_names: Vec<String>,
    /// Parent bone index, by bone index
    pub parents: Vec<Option<usize>>,
    by_name: HashMap<String, u32>,
}

impl Skeleton {
    pub fn len(&self) -> usize {
        self.bones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    /// Bone index for a host bone name
    pub fn index_of(&self, name: &str) -> Option<u32> {
        self.by_name.get(name).copied()
    }

    /// Bone index for each of an object's vertex groups
    pub fn map_groups(&self, groups: &[String]) -> Vec<Option<u32>> {
        groups.iter().map(|g| self.index_of(g)).collect()
    }
}

/// Check parent ordering and name uniqueness without touching any pool
pub fn validate(armature: &Armature) -> SkeletonResult<()> {
    let mut visited: HashSet<&str> = HashSet::with_capacity(armature.bones.len());
    let mut sanitized: HashSet<String> = HashSet::with_capacity(armature.bones.len());
    for bone in &armature.bones {
        if let Some(parent) = &bone.parent {
            if !visited.contains(parent.as_str()) {
                return Err(SkeletonError::ParentNotVisited {
                    bone: bone.name.clone(),
                    parent: parent.clone(),
                });
            }
        }
        let name = names::identifier(&bone.name);
        if !sanitized.insert(name.clone()) {
            let bone = if name == bone.name {
                format!("'{}'", bone.name)
            } else {
                format!("'{}' ({name})", bone.name)
            };
            return Err(SkeletonError::DuplicateName { bone });
        }
        visited.insert(&bone.name);
    }
    Ok(())
}

/// Validate and intern an armature's bind pose
pub fn encode_skeleton(
    armature: &Armature,
    relative: bool,
    quality: Quality,
    vertices: &mut Pool<Vertex>,
    strings: &mut StringPool,
) -> SkeletonResult<Skeleton> {
    validate(armature)?;

    let mut skeleton = Skeleton::default();
    for bone in &armature.bones {
        let parent = bone.parent.as_deref().and_then(|p| skeleton.by_name.get(p).copied());
        let parent_matrix = parent
            .filter(|_| relative)
            .map(|p| &armature.bones[p as usize].matrix);
        let name = strings.intern(&names::identifier(&bone.name));
        let (position, orientation) =
            intern_transform(vertices, quality, bone_transform(&bone.matrix, parent_matrix));

        let index = skeleton.bones.len() as u32;
        skeleton.bones.push(Bone {
            parent,
            name,
            position,
            orientation,
        });
        skeleton.host_names.push(bone.name.clone());
        skeleton.parents.push(parent.map(|p| p as usize));
        skeleton.by_name.insert(bone.name.clone(), index);
    }
    tracing::debug!(bones = skeleton.len(), armature = %armature.name, "skeleton encoded");
    Ok(skeleton)
}

/// Turn raw influences into byte weights summing to exactly 255
///
/// Keeps the [`MAX_INFLUENCES`] largest influences in their original
/// order. Returns `None` when the weights sum to zero or less.
pub fn normalize_weights(influences: &[(u32, f64)]) -> Option<SkinWeights> {
    let mut kept: Vec<(usize, u32, f64)> = influences
        .iter()
        .enumerate()
        .map(|(i, &(bone, w))| (i, bone, w))
        .collect();
    if kept.len() > MAX_INFLUENCES {
        kept.sort_by(|a, b| b.2.total_cmp(&a.2));
        kept.truncate(MAX_INFLUENCES);
        kept.sort_by_key(|k| k.0);
    }

    let sum: f64 = kept.iter().map(|k| k.2).sum();
    if sum <= 0.0 {
        return None;
    }

    let mut weights = SkinWeights::new();
    let mut total = 0i32;
    let mut largest: Option<(usize, i32)> = None;
    for &(_, bone, w) in &kept {
        let scaled = (w / sum * 255.0).round_ties_even() as i32;
        if largest.map_or(scaled > 0, |(_, max)| scaled > max) {
            largest = Some((weights.len(), scaled));
        }
        let clamped = scaled.clamp(1, 255);
        total += clamped;
        weights.push(SkinWeight {
            bone,
            weight: clamped as u8,
        });
    }
    if let Some((index, _)) = largest {
        let adjusted = i32::from(weights[index].weight) + 255 - total;
        weights[index].weight = adjusted.clamp(1, 255) as u8;
    }
    Some(weights)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::PoolKind;
    use m3dkit_core::SceneBone;

    fn bone(name: &str, parent: Option<&str>, translation: [f64; 3]) -> SceneBone {
        SceneBone {
            name: name.into(),
            parent: parent.map(str::to_string),
            matrix: Mat4x4::from_translation_rotation(translation, [0.0, 0.0, 0.0, 1.0]),
        }
    }

    fn armature(bones: Vec<SceneBone>) -> Armature {
        Armature {
            name: "rig".into(),
            bones,
        }
    }

    #[test]
    fn test_weights_sum_to_255() {
        let weights = normalize_weights(&[(0, 3.0), (1, 1.0)]).unwrap();
        let sum: u32 = weights.iter().map(|w| u32::from(w.weight)).sum();
        assert_eq!(sum, 255);
        assert!(weights.iter().all(|w| w.weight >= 1));
        assert_eq!(weights[0].weight, 191);
        assert_eq!(weights[1].weight, 64);
    }

    #[test]
    fn test_zero_sum_is_unskinned() {
        assert!(normalize_weights(&[(0, 0.0), (1, 0.0)]).is_none());
        assert!(normalize_weights(&[]).is_none());
    }

    #[test]
    fn test_tiny_weights_clamped_and_absorbed() {
        let weights = normalize_weights(&[(0, 1.0), (1, 0.0001), (2, 0.0001)]).unwrap();
        assert_eq!(weights.iter().map(|w| w.weight).collect::<Vec<_>>(), vec![253, 1, 1]);
    }

    #[test]
    fn test_keeps_eight_largest() {
        let influences: Vec<(u32, f64)> = (0..10).map(|i| (i, f64::from(i + 1))).collect();
        let weights = normalize_weights(&influences).unwrap();
        assert_eq!(weights.len(), MAX_INFLUENCES);
        assert_eq!(weights[0].bone, 2);
        assert_eq!(weights.iter().map(|w| u32::from(w.weight)).sum::<u32>(), 255);
    }

    #[test]
    fn test_relative_transform() {
        let parent = Mat4x4::from_translation_rotation([1.0, 0.0, 0.0], [0.0, 0.0, 0.0, 1.0]);
        let child = Mat4x4::from_translation_rotation([1.0, 2.0, 0.0], [0.0, 0.0, 0.0, 1.0]);
        let (pos, ori) = bone_transform(&child, Some(&parent));
        assert!((pos[0]).abs() < 1e-12 && (pos[1] - 2.0).abs() < 1e-12);
        assert!((ori[3] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_scale_is_removed() {
        let scaled = Mat4x4::from(DMat4::from_scale(glam::DVec3::splat(3.0)));
        let (pos, ori) = bone_transform(&scaled, None);
        assert_eq!(pos, [0.0, 0.0, 0.0]);
        assert!((ori[3] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_encode_skeleton() {
        let rig = armature(vec![
            bone("root", None, [0.0, 0.0, 0.0]),
            bone("upper arm", Some("root"), [0.0, 1.0, 0.0]),
        ]);
        let mut vertices = Pool::new(PoolKind::Vertex);
        let mut strings = StringPool::new();
        let skeleton = encode_skeleton(&rig, true, Quality::Float32, &mut vertices, &mut strings).unwrap();

        assert_eq!(skeleton.len(), 2);
        assert_eq!(skeleton.bones[1].parent, Some(0));
        assert_eq!(skeleton.index_of("upper arm"), Some(1));
        assert!(strings.contains("upper_arm"));
        // both bones share the identity orientation entry
        assert_eq!(skeleton.bones[0].orientation, skeleton.bones[1].orientation);
        assert_eq!(vertices.len(), 3);
    }

    #[test]
    fn test_parent_must_precede() {
        let rig = armature(vec![bone("child", Some("root"), [0.0; 3]), bone("root", None, [0.0; 3])]);
        let mut vertices = Pool::new(PoolKind::Vertex);
        let mut strings = StringPool::new();
        let err = encode_skeleton(&rig, true, Quality::Float32, &mut vertices, &mut strings).unwrap_err();
        assert!(matches!(err, SkeletonError::ParentNotVisited { .. }));
        assert!(vertices.is_empty());
        assert!(strings.is_empty());
    }

    #[test]
    fn test_duplicate_sanitized_name() {
        let rig = armature(vec![bone("arm L", None, [0.0; 3]), bone("arm_L", None, [0.0; 3])]);
        let err = validate(&rig).unwrap_err();
        assert_eq!(
            err,
            SkeletonError::DuplicateName {
                bone: "'arm_L'".into()
            }
        );
    }

    #[test]
    fn test_vertex_group_mapping() {
        let rig = armature(vec![bone("root", None, [0.0; 3])]);
        let mut vertices = Pool::new(PoolKind::Vertex);
        let mut strings = StringPool::new();
        let skeleton = encode_skeleton(&rig, false, Quality::Int8, &mut vertices, &mut strings).unwrap();
        assert_eq!(skeleton.map_groups(&["root".into(), "hand".into()]), vec![Some(0), None]);
    }
}
