//! Texture payloads for inlined assets
//!
//! A [`TextureProvider`] hands out the raw bytes behind a texture
//! reference. Embedded assets must be PNG: PNG data passes through as is,
//! anything else the `image` crate can decode is re-encoded.

use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::ImageFormat;
use thiserror::Error;

use m3dkit_core::TextureRef;

/// PNG file signature
pub const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1A, b'\n'];

/// Payloads this short are never embedded
pub const MIN_PAYLOAD_LEN: usize = 8;

/// Texture payload errors
#[derive(Error, Debug)]
pub enum TextureError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Texture file '{0}' not found. Cannot be inlined.")]
    NotFound(String),

    #[error("Texture file '{0}' not a valid image. Cannot be inlined.")]
    NotAnImage(String),
}

pub type TextureResult<T> = Result<T, TextureError>;

impl From<TextureError> for m3dkit_core::Error {
    fn from(err: TextureError) -> Self {
        match err {
            TextureError::Io(e) => m3dkit_core::Error::Io(e),
            other => m3dkit_core::Error::Texture {
                message: other.to_string(),
            },
        }
    }
}

/// Source of encoded image bytes
pub trait TextureProvider {
    /// Raw bytes of a texture, `None` if it cannot be found
    fn load(&self, texture: &TextureRef) -> TextureResult<Option<Vec<u8>>>;
}

/// Provider that never has any data
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTextures;

impl TextureProvider for NoTextures {
    fn load(&self, _texture: &TextureRef) -> TextureResult<Option<Vec<u8>>> {
        Ok(None)
    }
}

/// Reads texture files relative to a base directory
#[derive(Debug, Clone)]
pub struct FsTextureProvider {
    root: PathBuf,
}

impl FsTextureProvider {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// File a texture reference points to
    pub fn resolve(&self, texture: &TextureRef) -> PathBuf {
        let path = texture
            .path
            .clone()
            .unwrap_or_else(|| PathBuf::from(&texture.name));
        if path.is_absolute() {
            path
        } else {
            self.root.join(path)
        }
    }
}

impl TextureProvider for FsTextureProvider {
    fn load(&self, texture: &TextureRef) -> TextureResult<Option<Vec<u8>>> {
        match std::fs::read(self.resolve(texture)) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory payloads keyed by texture name
#[derive(Debug, Clone, Default)]
pub struct MemoryTextureProvider {
    payloads: HashMap<String, Vec<u8>>,
}

impl MemoryTextureProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, data: Vec<u8>) {
        self.payloads.insert(name.into(), data);
    }

    pub fn with(mut self, name: impl Into<String>, data: Vec<u8>) -> Self {
        self.insert(name, data);
        self
    }
}

impl TextureProvider for MemoryTextureProvider {
    fn load(&self, texture: &TextureRef) -> TextureResult<Option<Vec<u8>>> {
        Ok(self.payloads.get(&texture.name).cloned())
    }
}

pub fn is_png(data: &[u8]) -> bool {
    data.starts_with(&PNG_SIGNATURE)
}

/// Bring image bytes into PNG form
pub fn to_png(name: &str, data: Vec<u8>) -> TextureResult<Vec<u8>> {
    if is_png(&data) {
        return Ok(data);
    }
    let image = image::load_from_memory(&data).map_err(|_| TextureError::NotAnImage(name.to_string()))?;
    tracing::info!(texture = name, "texture is not a png, converting");
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, ImageFormat::Png)?;
    Ok(out.into_inner())
}

/// Payload to embed for a texture
///
/// Returns `Ok(None)` for payloads too short to embed.
pub fn inline_payload<P: TextureProvider + ?Sized>(
    provider: &P,
    texture: &TextureRef,
) -> TextureResult<Option<Vec<u8>>> {
    let data = provider
        .load(texture)?
        .ok_or_else(|| TextureError::NotFound(texture.name.clone()))?;
    if data.len() <= MIN_PAYLOAD_LEN {
        return Err(TextureError::NotAnImage(texture.name.clone()));
    }
    let png = to_png(&texture.name, data)?;
    Ok((png.len() > MIN_PAYLOAD_LEN).then_some(png))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn encoded(format: ImageFormat) -> Vec<u8> {
        let img = RgbaImage::from_pixel(2, 2, Rgba([255, 0, 0, 255]));
        let mut out = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(img).write_to(&mut out, format).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_png_passes_through() {
        let png = encoded(ImageFormat::Png);
        let provider = MemoryTextureProvider::new().with("red", png.clone());
        let payload = inline_payload(&provider, &TextureRef::new("red")).unwrap();
        assert_eq!(payload, Some(png));
    }

    #[test]
    fn test_other_formats_reencoded() {
        let bmp = encoded(ImageFormat::Bmp);
        assert!(!is_png(&bmp));
        let provider = MemoryTextureProvider::new().with("red", bmp);
        let payload = inline_payload(&provider, &TextureRef::new("red")).unwrap().unwrap();
        assert!(is_png(&payload));
    }

    #[test]
    fn test_garbage_rejected() {
        let provider = MemoryTextureProvider::new().with("junk", b"definitely not an image".to_vec());
        let err = inline_payload(&provider, &TextureRef::new("junk")).unwrap_err();
        assert!(matches!(err, TextureError::NotAnImage(_)));
    }

    #[test]
    fn test_missing_texture() {
        let err = inline_payload(&NoTextures, &TextureRef::new("gone")).unwrap_err();
        assert!(matches!(err, TextureError::NotFound(name) if name == "gone"));
    }

    #[test]
    fn test_fs_provider_resolves_relative() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("wood.png"), encoded(ImageFormat::Png)).unwrap();
        let provider = FsTextureProvider::new(dir.path());

        let texture = TextureRef {
            name: "Wood".into(),
            path: Some("wood.png".into()),
        };
        assert!(provider.load(&texture).unwrap().is_some());
        assert!(provider.load(&TextureRef::new("missing.png")).unwrap().is_none());
    }
}
