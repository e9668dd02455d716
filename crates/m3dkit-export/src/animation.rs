//! Animation delta encoding
//!
//! Each action samples every frame of its range and records only the bones
//! whose rounded transform differs from the last recorded one. The pose
//! source is borrowed through a [`PoseGuard`] so its playback state is back
//! where it was once sampling ends, whichever way it ends.

use m3dkit_core::{Diagnostics, PoseGuard, PoseSource, Scene};

use crate::model::{Action, BoneChange, Frame, Vertex};
use crate::names;
use crate::pool::{Pool, StringPool};
use crate::quantize::Quality;
use crate::skeleton::{bone_transform, intern_transform, Skeleton};

/// Name of the action covering the whole timeline when nothing else does
pub const FALLBACK_ACTION: &str = "Anim";

/// A frame range to sample as one action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRange {
    pub name: String,
    /// Clip to select; `None` samples whatever the source has active
    pub clip: Option<usize>,
    pub start: i32,
    pub end: i32,
}

/// Decide which actions to export
///
/// Timeline markers win when requested and present; otherwise every clip
/// with an end frame past 0 becomes an action. When the ranges would not
/// cover any frame, one action spans the whole scene.
pub fn collect_action_ranges(scene: &Scene, use_markers: bool) -> Vec<ActionRange> {
    let mut ranges = Vec::new();
    let mut total_frames = 0i64;

    if use_markers && !scene.markers.is_empty() {
        let mut markers: Vec<_> = scene.markers.iter().collect();
        markers.sort_by_key(|m| m.frame);
        for (i, marker) in markers.iter().enumerate() {
            let end = markers.get(i + 1).map_or(scene.frame_end, |next| next.frame - 1);
            if end > marker.frame {
                ranges.push(ActionRange {
                    name: names::identifier(&marker.name),
                    clip: None,
                    start: marker.frame,
                    end,
                });
                total_frames += i64::from(end - marker.frame);
            }
        }
    } else {
        for (i, clip) in scene.clips.iter().enumerate() {
            if clip.frame_end > 0 {
                ranges.push(ActionRange {
                    name: names::identifier(&clip.name),
                    clip: Some(i),
                    start: clip.frame_start,
                    end: clip.frame_end,
                });
            }
            total_frames += i64::from(clip.frame_end - clip.frame_start);
        }
    }

    if total_frames == 0 {
        ranges.push(ActionRange {
            name: FALLBACK_ACTION.to_string(),
            clip: None,
            start: scene.frame_start,
            end: scene.frame_end,
        });
    }
    ranges
}

/// Samples actions against an encoded skeleton
pub struct ActionEncoder<'a> {
    pub skeleton: &'a Skeleton,
    pub relative: bool,
    pub quality: Quality,
    pub fps: u32,
    pub vertices: &'a mut Pool<Vertex>,
    pub strings: &'a mut StringPool,
}

impl ActionEncoder<'_> {
    fn ms_per_frame(&self) -> f64 {
        1000.0 / f64::from(self.fps.max(1))
    }

    /// Sample all ranges, restoring the source afterwards
    pub fn encode_all<S: PoseSource + ?Sized>(
        &mut self,
        source: &mut S,
        ranges: &[ActionRange],
        diagnostics: &mut Diagnostics,
    ) -> Vec<Action> {
        let mut guard = PoseGuard::new(source);
        ranges
            .iter()
            .filter_map(|range| self.encode(&mut *guard, range, diagnostics))
            .collect()
    }

    /// Sample one range; `None` if no bone ever moved
    pub fn encode<S: PoseSource + ?Sized>(
        &mut self,
        source: &mut S,
        range: &ActionRange,
        diagnostics: &mut Diagnostics,
    ) -> Option<Action> {
        source.set_frame(0);
        source.set_posed(true);
        if let Some(clip) = range.clip {
            source.select_clip(clip);
        }

        let mut last: Vec<(u32, u32)> = self
            .skeleton
            .bones
            .iter()
            .map(|b| (b.position, b.orientation))
            .collect();
        let mut frames = Vec::new();
        let mut origin = range.start;
        let mut last_frame = range.start;

        for frame in range.start..=range.end {
            source.set_frame(frame);
            let mut changes = Vec::new();
            for (index, name) in self.skeleton.host_names.iter().enumerate() {
                let Some(matrix) = source.bone_matrix(name) else {
                    diagnostics.report_once(
                        format!("pose:{name}"),
                        m3dkit_core::Severity::Error,
                        format!("Animated bone name '{name}' does not match any bind-pose bone."),
                    );
                    continue;
                };
                let parent = match self.skeleton.parents[index].filter(|_| self.relative) {
                    Some(p) => {
                        let parent_name = &self.skeleton.host_names[p];
                        let parent = source.bone_matrix(parent_name);
                        if parent.is_none() {
                            diagnostics.report_once(
                                format!("pose-parent:{name}"),
                                m3dkit_core::Severity::Warning,
                                format!(
                                    "Parent bone '{parent_name}' of '{name}' has no pose, '{name}' is stored in model space."
                                ),
                            );
                        }
                        parent
                    }
                    None => None,
                };
                let refs = intern_transform(
                    self.vertices,
                    self.quality,
                    bone_transform(&matrix, parent.as_ref()),
                );
                if last[index] != refs {
                    last[index] = refs;
                    changes.push(BoneChange {
                        bone: index as u32,
                        position: refs.0,
                        orientation: refs.1,
                    });
                }
            }
            if changes.is_empty() {
                continue;
            }
            if frames.is_empty() {
                origin = frame;
            }
            frames.push(Frame {
                timestamp_ms: (f64::from(frame - origin) * self.ms_per_frame()) as u32,
                changes,
            });
            last_frame = frame;
        }

        if frames.is_empty() {
            tracing::debug!(action = %range.name, "action has no changed bones, dropped");
            return None;
        }
        Some(Action {
            name: self.strings.intern(&range.name),
            duration_ms: (f64::from(last_frame - origin + 1) * self.ms_per_frame()) as u32,
            frames,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::PoolKind;
    use crate::skeleton::encode_skeleton;
    use m3dkit_core::{AnimationClip, Armature, Mat4x4, PoseKey, SceneAnimator, SceneBone, TimelineMarker};
    use std::collections::HashMap;

    fn identity_quat() -> [f64; 4] {
        [0.0, 0.0, 0.0, 1.0]
    }

    fn rigged_scene() -> Scene {
        let mut moved = HashMap::new();
        moved.insert(
            "B".to_string(),
            Mat4x4::from_translation_rotation([0.0, 1.0, 0.5], identity_quat()),
        );
        Scene {
            armature: Some(Armature {
                name: "rig".into(),
                bones: vec![
                    SceneBone {
                        name: "A".into(),
                        parent: None,
                        matrix: Mat4x4::IDENTITY,
                    },
                    SceneBone {
                        name: "B".into(),
                        parent: Some("A".into()),
                        matrix: Mat4x4::from_translation_rotation([0.0, 1.0, 0.0], identity_quat()),
                    },
                ],
            }),
            clips: vec![AnimationClip {
                name: "nod".into(),
                frame_start: 0,
                frame_end: 4,
                keys: vec![PoseKey { frame: 3, bones: moved }],
            }],
            frame_start: 0,
            frame_end: 4,
            ..Default::default()
        }
    }

    fn encode_scene(scene: &Scene, ranges: &[ActionRange]) -> (Vec<Action>, Pool<Vertex>) {
        let mut vertices = Pool::new(PoolKind::Vertex);
        let mut strings = StringPool::new();
        let armature = scene.armature.as_ref().unwrap();
        let skeleton = encode_skeleton(armature, true, Quality::Float32, &mut vertices, &mut strings).unwrap();
        let mut diagnostics = Diagnostics::new();
        let mut animator = scene.animator();
        let actions = ActionEncoder {
            skeleton: &skeleton,
            relative: true,
            quality: Quality::Float32,
            fps: 25,
            vertices: &mut vertices,
            strings: &mut strings,
        }
        .encode_all(&mut animator, ranges, &mut diagnostics);
        assert!(diagnostics.is_empty());
        (actions, vertices)
    }

    #[test]
    fn test_only_changed_bone_recorded() {
        let scene = rigged_scene();
        let ranges = collect_action_ranges(&scene, false);
        let (actions, _) = encode_scene(&scene, &ranges);

        assert_eq!(actions.len(), 1);
        let action = &actions[0];
        assert_eq!(action.frames.len(), 1);
        assert_eq!(action.frames[0].timestamp_ms, 0);
        assert_eq!(action.frames[0].changes.len(), 1);
        assert_eq!(action.frames[0].changes[0].bone, 1);
        assert_eq!(action.duration_ms, 40);
    }

    #[test]
    fn test_static_action_dropped() {
        let mut scene = rigged_scene();
        scene.clips[0].keys.clear();
        let ranges = collect_action_ranges(&scene, false);
        let (actions, _) = encode_scene(&scene, &ranges);
        assert!(actions.is_empty());
    }

    #[test]
    fn test_pose_restored_after_sampling() {
        let scene = rigged_scene();
        let mut vertices = Pool::new(PoolKind::Vertex);
        let mut strings = StringPool::new();
        let skeleton = encode_skeleton(
            scene.armature.as_ref().unwrap(),
            false,
            Quality::Int16,
            &mut vertices,
            &mut strings,
        )
        .unwrap();
        let mut animator = scene.animator();
        let before = animator.playback();
        ActionEncoder {
            skeleton: &skeleton,
            relative: false,
            quality: Quality::Int16,
            fps: 30,
            vertices: &mut vertices,
            strings: &mut strings,
        }
        .encode_all(&mut animator, &collect_action_ranges(&scene, false), &mut Diagnostics::new());
        assert_eq!(animator.playback(), before);
    }

    /// Scene animator that has lost one bone's pose
    struct MissingBone<'s> {
        inner: SceneAnimator<'s>,
        missing: &'static str,
    }

    impl<'s> PoseSource for MissingBone<'s> {
        type Snapshot = <SceneAnimator<'s> as PoseSource>::Snapshot;

        fn snapshot(&self) -> Self::Snapshot {
            self.inner.snapshot()
        }

        fn restore(&mut self, snapshot: Self::Snapshot) {
            self.inner.restore(snapshot);
        }

        fn set_posed(&mut self, posed: bool) {
            self.inner.set_posed(posed);
        }

        fn select_clip(&mut self, clip: usize) {
            self.inner.select_clip(clip);
        }

        fn set_frame(&mut self, frame: i32) {
            self.inner.set_frame(frame);
        }

        fn bone_matrix(&self, bone: &str) -> Option<Mat4x4> {
            if bone == self.missing {
                None
            } else {
                self.inner.bone_matrix(bone)
            }
        }
    }

    #[test]
    fn test_unposed_parent_reported_once() {
        let scene = rigged_scene();
        let mut vertices = Pool::new(PoolKind::Vertex);
        let mut strings = StringPool::new();
        let skeleton = encode_skeleton(
            scene.armature.as_ref().unwrap(),
            true,
            Quality::Float32,
            &mut vertices,
            &mut strings,
        )
        .unwrap();
        let mut source = MissingBone {
            inner: scene.animator(),
            missing: "A",
        };
        let mut diagnostics = Diagnostics::new();
        let actions = ActionEncoder {
            skeleton: &skeleton,
            relative: true,
            quality: Quality::Float32,
            fps: 25,
            vertices: &mut vertices,
            strings: &mut strings,
        }
        .encode_all(&mut source, &collect_action_ranges(&scene, false), &mut diagnostics);

        let warnings: Vec<_> = diagnostics
            .iter()
            .filter(|d| d.severity == m3dkit_core::Severity::Warning)
            .collect();
        assert_eq!(warnings.len(), 1);
        assert_eq!(
            warnings[0].message,
            "Parent bone 'A' of 'B' has no pose, 'B' is stored in model space."
        );
        // the child still animates
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].frames[0].changes[0].bone, 1);
    }

    #[test]
    fn test_marker_ranges() {
        let scene = Scene {
            markers: vec![
                TimelineMarker { name: "walk cycle".into(), frame: 10 },
                TimelineMarker { name: "idle".into(), frame: 0 },
                TimelineMarker { name: "blink".into(), frame: 11 },
            ],
            frame_end: 30,
            ..Default::default()
        };
        let ranges = collect_action_ranges(&scene, true);
        assert_eq!(
            ranges,
            vec![
                ActionRange { name: "idle".into(), clip: None, start: 0, end: 9 },
                ActionRange { name: "blink".into(), clip: None, start: 11, end: 30 },
            ]
        );
    }

    #[test]
    fn test_fallback_range() {
        let scene = Scene {
            frame_start: 1,
            frame_end: 1,
            ..Default::default()
        };
        let ranges = collect_action_ranges(&scene, false);
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].name, FALLBACK_ACTION);
        assert_eq!((ranges[0].start, ranges[0].end), (1, 1));
    }
}
