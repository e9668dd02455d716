//! Pose sampling capability
//!
//! Sampling an animation means stepping an externally owned scene through
//! frames. The encoder only borrows that state: [`PoseGuard`] snapshots it
//! on creation and puts it back when dropped, on every exit path.

use std::ops::{Deref, DerefMut};

use crate::types::Mat4x4;

/// Something that can be posed frame by frame
pub trait PoseSource {
    /// Saved playback state
    type Snapshot;

    /// Capture the current playback state
    fn snapshot(&self) -> Self::Snapshot;

    /// Put a previously captured playback state back
    fn restore(&mut self, snapshot: Self::Snapshot);

    /// Switch between rest pose (`false`) and animated pose (`true`)
    fn set_posed(&mut self, posed: bool);

    /// Select the clip subsequent frames are sampled from
    fn select_clip(&mut self, clip: usize);

    /// Move to a frame
    fn set_frame(&mut self, frame: i32);

    /// Model-space matrix of a bone in the current pose
    fn bone_matrix(&self, bone: &str) -> Option<Mat4x4>;
}

/// Restores a [`PoseSource`] to its captured state when dropped
pub struct PoseGuard<'a, S: PoseSource + ?Sized> {
    source: &'a mut S,
    snapshot: Option<S::Snapshot>,
}

impl<'a, S: PoseSource + ?Sized> PoseGuard<'a, S> {
    pub fn new(source: &'a mut S) -> Self {
        let snapshot = source.snapshot();
        Self {
            source,
            snapshot: Some(snapshot),
        }
    }
}

impl<S: PoseSource + ?Sized> Deref for PoseGuard<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        self.source
    }
}

impl<S: PoseSource + ?Sized> DerefMut for PoseGuard<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        self.source
    }
}

impl<S: PoseSource + ?Sized> Drop for PoseGuard<'_, S> {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            self.source.restore(snapshot);
            tracing::trace!("pose state restored");
        }
    }
}
