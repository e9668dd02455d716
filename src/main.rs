//! m3dkit CLI
//!
//! Command-line interface for encoding pre-normalized scenes into Model 3D
//! files.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};

use m3dkit_core::logging::{self, TracingConfig};
use m3dkit_core::{Scene, Severity};
use m3dkit_export::{ExportOptions, FsTextureProvider, M3dExporter, OutputFormat, Quality};

/// m3dkit - Model 3D encoder
#[derive(Parser)]
#[command(name = "m3dkit")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Output format for reports
    #[arg(long, global = true, default_value = "text")]
    format: ReportFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum ReportFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(ReportFormat::Text),
            "json" => Ok(ReportFormat::Json),
            _ => Err(format!("Unknown format: {}", s)),
        }
    }
}

/// Quality tier as given on the command line
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct QualityArg(Option<Quality>);

impl std::str::FromStr for QualityArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let quality = match s.to_lowercase().as_str() {
            "auto" | "-1" => None,
            "0" | "int8" => Some(Quality::Int8),
            "1" | "int16" => Some(Quality::Int16),
            "2" | "float32" => Some(Quality::Float32),
            "3" | "float64" => Some(Quality::Float64),
            _ => return Err(format!("Unknown quality: {}", s)),
        };
        Ok(QualityArg(quality))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Encode a scene into a Model 3D file
    Export(ExportArgs),

    /// Show information about a scene
    Info(InfoArgs),
}

#[derive(Args)]
struct ExportArgs {
    /// Scene JSON file
    scene: PathBuf,

    /// Output file; the extension is adjusted to the encoding
    #[arg(short, long)]
    output: PathBuf,

    /// Load base options from a JSON file
    #[arg(long)]
    options: Option<PathBuf>,

    /// Model name
    #[arg(long)]
    name: Option<String>,

    /// License string
    #[arg(long)]
    license: Option<String>,

    /// Author string
    #[arg(long)]
    author: Option<String>,

    /// Comment, may span multiple lines
    #[arg(long)]
    comment: Option<String>,

    /// Physical scale; 0 takes the model's extent
    #[arg(long)]
    scale: Option<f64>,

    /// Export unselected objects too
    #[arg(long)]
    all_objects: bool,

    /// Ignore modifier-evaluated triangles
    #[arg(long)]
    no_modifiers: bool,

    /// Export normal vectors
    #[arg(long)]
    normals: bool,

    /// Skip texture coordinates
    #[arg(long)]
    no_uvs: bool,

    /// Keep texture coordinates outside 0..1
    #[arg(long)]
    allow_unnormalized_uvs: bool,

    /// Skip vertex colors
    #[arg(long)]
    no_colors: bool,

    /// Skip materials
    #[arg(long)]
    no_materials: bool,

    /// Skip the skeleton and skinning
    #[arg(long)]
    no_skeleton: bool,

    /// Skip animations
    #[arg(long)]
    no_animation: bool,

    /// Take actions from timeline markers
    #[arg(long)]
    markers: bool,

    /// Frames per second for action timestamps
    #[arg(long)]
    fps: Option<u32>,

    /// Quality tier: auto, int8, int16, float32, float64 (or 0-3)
    #[arg(short, long)]
    quality: Option<QualityArg>,

    /// Embed textures into the model
    #[arg(long)]
    inline: bool,

    /// Store coordinates unscaled
    #[arg(long)]
    no_grid: bool,

    /// Do not compress the output stream
    #[arg(long)]
    no_compress: bool,

    /// Write the textual format
    #[arg(long)]
    ascii: bool,

    /// Store bones in model space instead of relative to their parent
    #[arg(long)]
    absolute_bones: bool,
}

impl ExportArgs {
    /// Build export options, flags overriding the options file
    fn export_options(&self) -> Result<ExportOptions> {
        let mut options = match &self.options {
            Some(path) => {
                let json = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read options file {:?}", path))?;
                serde_json::from_str(&json).context("Failed to parse export options")?
            }
            None => ExportOptions::default(),
        };

        if let Some(name) = &self.name {
            options.name = name.clone();
        }
        if let Some(license) = &self.license {
            options.license = license.clone();
        }
        if let Some(author) = &self.author {
            options.author = author.clone();
        }
        if let Some(comment) = &self.comment {
            options.comment = comment.clone();
        }
        if let Some(scale) = self.scale {
            options.scale = scale;
        }
        if let Some(fps) = self.fps {
            options.fps = fps;
        }
        if let Some(QualityArg(quality)) = self.quality {
            options.quality = quality;
        }

        options.selection_only &= !self.all_objects;
        options.apply_modifiers &= !self.no_modifiers;
        options.normals |= self.normals;
        options.uvs &= !self.no_uvs;
        options.allow_unnormalized_uvs |= self.allow_unnormalized_uvs;
        options.colors &= !self.no_colors;
        options.materials &= !self.no_materials;
        options.skeleton &= !self.no_skeleton;
        options.animation &= !self.no_animation;
        options.markers |= self.markers;
        options.inline_assets |= self.inline;
        options.grid_compression &= !self.no_grid;
        options.stream_compression &= !self.no_compress;
        options.relative_bones &= !self.absolute_bones;
        if self.ascii {
            options.format = OutputFormat::Text;
        }
        Ok(options)
    }
}

#[derive(Args)]
struct InfoArgs {
    /// Scene JSON file
    scene: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_with_config(TracingConfig::with_verbosity(cli.verbose));

    match cli.command {
        Commands::Export(args) => cmd_export(args, cli.format),
        Commands::Info(args) => cmd_info(args, cli.format),
    }
}

fn load_scene(path: &Path) -> Result<Scene> {
    match Scene::load(path) {
        Ok(scene) => Ok(scene),
        Err(e) if e.is_not_found() => bail!("File not found: {:?}", path),
        Err(e) => Err(e).context("Failed to load scene"),
    }
}

fn cmd_export(args: ExportArgs, format: ReportFormat) -> Result<()> {
    info!("Loading scene: {:?}", args.scene);
    let scene = load_scene(&args.scene)?;
    let options = args.export_options()?;

    let textures = FsTextureProvider::new(args.scene.parent().unwrap_or_else(|| Path::new(".")));
    let outcome = M3dExporter::new(options)
        .export(&scene, &textures)
        .context("Export failed")?;
    let written = outcome
        .write_to_file(&args.output)
        .with_context(|| format!("Failed to write {:?}", args.output))?;

    match format {
        ReportFormat::Json => {
            let json = serde_json::json!({
                "output": written,
                "stats": outcome.stats,
                "diagnostics": outcome.diagnostics.iter().map(|d| {
                    serde_json::json!({
                        "severity": d.severity.to_string(),
                        "message": d.message,
                    })
                }).collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        ReportFormat::Text => {
            for diagnostic in outcome.diagnostics.iter().filter(|d| d.severity != Severity::Info) {
                println!("{}", diagnostic);
            }
            let stats = &outcome.stats;
            println!("Exported: {:?}", written);
            println!("============================================");
            println!("  Quality:            {:>12}", stats.quality);
            println!("  Scale:              {:>12}", stats.scale);
            println!("  Vertices:           {:>12}", stats.vertices);
            println!("  Faces:              {:>12}", stats.faces);
            println!("  Materials:          {:>12}", stats.materials);
            println!("  Bones:              {:>12}", stats.bones);
            println!("  Actions:            {:>12}", stats.actions);
            println!("  Inlined assets:     {:>12}", stats.assets);
            println!("  Size:               {:>12}", format_size(stats.bytes as u64));
            println!("  Time:               {:>10.3} s", stats.elapsed.as_secs_f64());
        }
    }

    if outcome.diagnostics.has_errors() {
        warn!(
            errors = outcome.diagnostics.count(Severity::Error),
            "export finished with errors"
        );
    }
    Ok(())
}

fn cmd_info(args: InfoArgs, format: ReportFormat) -> Result<()> {
    let scene = load_scene(&args.scene)?;
    let options = ExportOptions::default();
    let triangles = options.triangle_count(&scene);
    let bones = scene.armature.as_ref().map_or(0, |a| a.bones.len());
    let quality = Quality::auto(triangles);

    match format {
        ReportFormat::Json => {
            let json = serde_json::json!({
                "objects": scene.objects.len(),
                "selected_objects": scene.exported_objects(true).count(),
                "triangles": triangles,
                "materials": scene.materials.len(),
                "bones": bones,
                "clips": scene.clips.len(),
                "markers": scene.markers.len(),
                "auto_quality": quality,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        ReportFormat::Text => {
            println!("Scene: {:?}", args.scene);
            println!("============================================");
            println!("  Objects:            {:>12}", scene.objects.len());
            println!("  Selected objects:   {:>12}", scene.exported_objects(true).count());
            println!("  Triangles:          {:>12}", triangles);
            println!("  Materials:          {:>12}", scene.materials.len());
            println!("  Bones:              {:>12}", bones);
            println!("  Clips:              {:>12}", scene.clips.len());
            println!("  Markers:            {:>12}", scene.markers.len());
            println!("  Auto quality:       {:>12}", quality);
        }
    }
    Ok(())
}

fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
