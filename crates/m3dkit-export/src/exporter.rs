//! Model 3D exporter
//!
//! [`M3dExporter`] runs one conversion: it normalizes the options against
//! the scene, drives a [`ModelBuilder`] through its phases and serializes
//! the frozen model with the binary or the textual writer.

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use m3dkit_core::{
    Diagnostics, ExportPhase, ExportProgress, PoseSource, ProgressCallback, Scene,
};

use crate::binary::{BinaryWriter, ChunkTag};
use crate::builder::ModelBuilder;
use crate::compression::CompressionError;
use crate::model::{ExtensionChunk, Model};
use crate::quantize::Quality;
use crate::text::TextWriter;
use crate::textures::TextureProvider;

/// Frame rate used when the requested one is out of range
pub const DEFAULT_FPS: u32 = 25;

/// Highest accepted frame rate
pub const MAX_FPS: u32 = 120;

/// Output flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Chunked `.m3d`
    #[default]
    Binary,
    /// Line oriented `.a3d`
    Text,
}

impl OutputFormat {
    /// File name extension for this format
    pub fn extension(self, compressed: bool) -> &'static str {
        match (self, compressed) {
            (OutputFormat::Binary, _) => "m3d",
            (OutputFormat::Text, false) => "a3d",
            (OutputFormat::Text, true) => "a3d.gz",
        }
    }
}

/// Model 3D export options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    /// Model name, defaults to the first exported object
    pub name: String,
    pub license: String,
    /// Author, defaults to the login name
    pub author: String,
    pub comment: String,
    /// Physical scale; zero or less means "take the grid compression extent"
    pub scale: f64,
    /// Only export selected objects
    pub selection_only: bool,
    /// Use the modifier-evaluated triangles when the scene has them
    pub apply_modifiers: bool,
    pub normals: bool,
    pub uvs: bool,
    /// Keep UVs outside 0..1 instead of clamping them
    pub allow_unnormalized_uvs: bool,
    pub colors: bool,
    pub materials: bool,
    pub skeleton: bool,
    pub animation: bool,
    /// Take actions from timeline markers instead of clips
    pub markers: bool,
    pub fps: u32,
    /// Quality tier, `None` for automatic selection
    pub quality: Option<Quality>,
    /// Embed texture payloads
    pub inline_assets: bool,
    pub grid_compression: bool,
    pub stream_compression: bool,
    pub format: OutputFormat,
    /// Store child bones relative to their parent
    pub relative_bones: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            name: String::new(),
            license: "MIT".to_string(),
            author: String::new(),
            comment: String::new(),
            scale: 1.0,
            selection_only: true,
            apply_modifiers: true,
            normals: false,
            uvs: true,
            allow_unnormalized_uvs: false,
            colors: true,
            materials: true,
            skeleton: true,
            animation: true,
            markers: false,
            fps: DEFAULT_FPS,
            quality: None,
            inline_assets: false,
            grid_compression: true,
            stream_compression: true,
            format: OutputFormat::Binary,
            relative_bones: true,
        }
    }
}

impl ExportOptions {
    /// Reject options no export can run with
    pub fn validate(&self) -> ExportResult<()> {
        if !self.scale.is_finite() {
            return Err(ExportError::InvalidOptions(format!(
                "scale must be finite, got {}",
                self.scale
            )));
        }
        Ok(())
    }

    /// Triangles the export will contain
    pub fn triangle_count(&self, scene: &Scene) -> usize {
        scene.triangle_count(self.selection_only, self.apply_modifiers)
    }

    /// Apply the run policy for this scene
    pub fn normalized(&self, scene: &Scene) -> Self {
        let mut options = self.clone();
        if !(1..=MAX_FPS).contains(&options.fps) {
            tracing::debug!(fps = options.fps, "frame rate out of range, using {DEFAULT_FPS}");
            options.fps = DEFAULT_FPS;
        }
        if options.animation {
            options.skeleton = true;
        }
        options.quality = Some(Quality::resolve(
            options.quality,
            options.triangle_count(scene),
            options.grid_compression,
        ));
        if options.author.is_empty() {
            options.author = std::env::var("LOGNAME").unwrap_or_default();
        }
        if options.name.is_empty() {
            if let Some(object) = scene.exported_objects(options.selection_only).next() {
                options.name = object.name.clone();
            }
        }
        options
    }
}

/// Export errors
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Compression(#[from] CompressionError),

    #[error("Invalid export options: {0}")]
    InvalidOptions(String),

    #[error("Text formatting failed")]
    Format(#[from] std::fmt::Error),
}

pub type ExportResult<T> = Result<T, ExportError>;

impl From<ExportError> for m3dkit_core::Error {
    fn from(err: ExportError) -> Self {
        match err {
            ExportError::Io(e) => m3dkit_core::Error::Io(e),
            ExportError::Compression(e) => e.into(),
            ExportError::InvalidOptions(message) => m3dkit_core::Error::invalid_config(message),
            ExportError::Format(e) => m3dkit_core::Error::invalid_data(e.to_string()),
        }
    }
}

/// Table sizes and timing of a finished export
#[derive(Debug, Clone, Serialize)]
pub struct ExportStats {
    pub quality: Quality,
    pub scale: f64,
    pub vertices: usize,
    pub colors: usize,
    pub texcoords: usize,
    pub strings: usize,
    pub faces: usize,
    pub materials: usize,
    pub bones: usize,
    pub skins: usize,
    pub actions: usize,
    pub assets: usize,
    pub bytes: usize,
    pub elapsed: Duration,
}

impl ExportStats {
    fn new(model: &Model, bytes: usize, elapsed: Duration) -> Self {
        Self {
            quality: model.quality,
            scale: model.scale,
            vertices: model.vertices.len(),
            colors: model.colors.len(),
            texcoords: model.texcoords.len(),
            strings: model.strings.len(),
            faces: model.faces.len(),
            materials: model.materials.len(),
            bones: model.bones.len(),
            skins: model.skins.len(),
            actions: model.actions.len(),
            assets: model.assets.len(),
            bytes,
            elapsed,
        }
    }
}

/// Result of a successful export
#[derive(Debug)]
pub struct ExportOutcome {
    /// Encoded file contents
    pub bytes: Vec<u8>,
    /// File name extension matching the encoding
    pub extension: &'static str,
    pub diagnostics: Diagnostics,
    pub stats: ExportStats,
}

impl ExportOutcome {
    /// `path` with the extension of this outcome
    pub fn output_path(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        let already = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(&format!(".{}", self.extension)));
        if already {
            path.to_path_buf()
        } else {
            path.with_extension(self.extension)
        }
    }

    /// Write the file, returning the path actually written
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> ExportResult<PathBuf> {
        let path = self.output_path(path);
        let mut file = File::create(&path)?;
        file.write_all(&self.bytes)?;
        file.flush()?;
        tracing::info!(path = %path.display(), bytes = self.bytes.len(), "model written");
        Ok(path)
    }
}

/// Model 3D exporter
pub struct M3dExporter {
    options: ExportOptions,
    progress: Option<ProgressCallback>,
    extensions: Vec<ExtensionChunk>,
}

impl M3dExporter {
    /// Create a new exporter
    pub fn new(options: ExportOptions) -> Self {
        Self {
            options,
            progress: None,
            extensions: Vec::new(),
        }
    }

    /// Set progress callback
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Append an engine specific chunk to binary output
    ///
    /// The tag must be four ASCII alphanumeric bytes and must not collide
    /// with a standard chunk.
    pub fn with_extension(mut self, chunk: ExtensionChunk) -> ExportResult<Self> {
        let tag_name = String::from_utf8_lossy(&chunk.tag).into_owned();
        if !chunk.tag.iter().all(u8::is_ascii_alphanumeric) {
            return Err(ExportError::InvalidOptions(format!(
                "extension chunk tag '{tag_name}' is not alphanumeric"
            )));
        }
        if !matches!(ChunkTag::from_bytes(chunk.tag), ChunkTag::Extension(_)) {
            return Err(ExportError::InvalidOptions(format!(
                "extension chunk tag '{tag_name}' is reserved"
            )));
        }
        self.extensions.push(chunk);
        Ok(self)
    }

    pub fn options(&self) -> &ExportOptions {
        &self.options
    }

    fn notify(&self, phase: ExportPhase) {
        let progress = ExportProgress::from(phase);
        tracing::info!(phase = ?phase, percent = progress.percent, "export progress");
        if let Some(callback) = &self.progress {
            callback(progress);
        }
    }

    /// Export a scene, sampling animation from its baked clips
    pub fn export(&self, scene: &Scene, textures: &dyn TextureProvider) -> ExportResult<ExportOutcome> {
        let mut animator = scene.animator();
        self.export_with_pose(scene, textures, &mut animator)
    }

    /// Export a scene, sampling animation from an external pose source
    ///
    /// The pose source is restored to its previous state before this
    /// returns.
    pub fn export_with_pose<S: PoseSource + ?Sized>(
        &self,
        scene: &Scene,
        textures: &dyn TextureProvider,
        pose: &mut S,
    ) -> ExportResult<ExportOutcome> {
        let started = Instant::now();
        self.options.validate()?;
        let options = self.options.normalized(scene);
        self.notify(ExportPhase::Start);

        let mut builder = ModelBuilder::new(&options, scene);
        tracing::debug!(quality = %builder.quality(), "quality tier selected");
        builder.skeleton(scene);
        self.notify(ExportPhase::Skeleton);
        builder.mesh(scene);
        self.notify(ExportPhase::Mesh);
        builder.materials(scene, textures);
        self.notify(ExportPhase::Materials);
        builder.actions(scene, pose);
        self.notify(ExportPhase::Actions);

        let (mut model, mut diagnostics) = builder.finish();
        model.extensions = self.extensions.clone();

        let bytes = match options.format {
            OutputFormat::Binary => BinaryWriter {
                compress: options.stream_compression,
                allow_unnormalized_uvs: options.allow_unnormalized_uvs,
            }
            .write(&model, &mut diagnostics)?,
            OutputFormat::Text => TextWriter {
                compress: options.stream_compression,
                allow_unnormalized_uvs: options.allow_unnormalized_uvs,
            }
            .write(&model, &mut diagnostics)?,
        };
        self.notify(ExportPhase::End);

        let elapsed = started.elapsed();
        diagnostics.info(format!("Exported in {:.3} sec", elapsed.as_secs_f64()));
        diagnostics.info(format!("File size {} bytes", bytes.len()));
        let stats = ExportStats::new(&model, bytes.len(), elapsed);

        Ok(ExportOutcome {
            extension: options.format.extension(options.stream_compression),
            bytes,
            diagnostics,
            stats,
        })
    }
}
