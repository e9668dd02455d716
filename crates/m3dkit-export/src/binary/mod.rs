//! Binary `.m3d` container
//!
//! A file is the `3DMO` magic, a little-endian total length and a stream
//! of tagged, length-prefixed chunks closed by a bare `OMD3` tag. The
//! stream may be zlib compressed as a whole.

mod header;
mod writer;

pub use header::HeaderFlags;
pub use writer::{BinaryWriter, ChunkTag, StringTable, FILE_MAGIC};
