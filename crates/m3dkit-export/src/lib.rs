//! m3dkit Export Pipeline
//!
//! Encodes a pre-normalized [`Scene`](m3dkit_core::Scene) into the Model 3D
//! format:
//! - binary `.m3d` (chunked, optionally zlib compressed)
//! - textual `.a3d` (line oriented, optionally gzip compressed)
//!
//! The pipeline runs in one pass: scene data is interned into
//! deduplicated pools, the pools are frozen into a [`Model`], coordinates
//! are grid compressed, and one of the writers serializes the model.

pub mod animation;
pub mod binary;
pub mod builder;
pub mod compression;
pub mod exporter;
pub mod index;
pub mod material;
pub mod model;
pub mod names;
pub mod pool;
pub mod quantize;
pub mod skeleton;
pub mod text;
pub mod textures;

pub use binary::{BinaryWriter, ChunkTag, HeaderFlags};
pub use builder::ModelBuilder;
pub use compression::{CompressionError, ModelCompression, StreamCompression};
pub use exporter::{ExportError, ExportOptions, ExportOutcome, ExportStats, M3dExporter, OutputFormat};
pub use index::{IndexRef, IndexWidth};
pub use model::*;
pub use quantize::Quality;
pub use text::TextWriter;
pub use textures::{FsTextureProvider, MemoryTextureProvider, NoTextures, TextureError, TextureProvider};
