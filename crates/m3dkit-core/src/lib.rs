//! m3dkit Core Library
//!
//! This crate provides the scene representation handed to the encoder,
//! the pose sampling capability, diagnostics and error handling shared
//! across all m3dkit components.

pub mod error;
pub mod logging;
pub mod pose;
pub mod progress;
pub mod report;
pub mod scene;
pub mod types;

pub use error::{Error, Result, ResultExt};
pub use pose::{PoseGuard, PoseSource};
pub use progress::{ExportPhase, ExportProgress, ProgressCallback};
pub use report::{Diagnostic, Diagnostics, Severity};
pub use scene::*;
pub use types::*;
