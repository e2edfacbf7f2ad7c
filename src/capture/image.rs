//! Request-scoped decoded image.

use std::io::Write;
use std::path::Path;

use axum::body::Bytes;
use image::ImageFormat;
use tempfile::NamedTempFile;

/// An uploaded image that decoded successfully.
///
/// The raw bytes are also spilled to a temporary file for analyzers that work
/// on paths. The file is deleted when the value is dropped, so every exit path
/// of a request releases it.
#[derive(Debug)]
pub struct CaptureImage {
    bytes: Bytes,
    width: u32,
    height: u32,
    file: NamedTempFile,
}

#[derive(Debug, thiserror::Error)]
pub enum ImageLoadError {
    #[error("image could not be decoded: {0}")]
    Undecodable(#[from] image::ImageError),

    #[error("temporary image file: {0}")]
    Io(#[from] std::io::Error),
}

impl CaptureImage {
    /// Decode `bytes` and spill them to a temporary file. CPU-bound.
    pub fn decode(bytes: Bytes) -> Result<Self, ImageLoadError> {
        let decoded = image::load_from_memory(&bytes)?;
        let suffix = match image::guess_format(&bytes) {
            Ok(ImageFormat::Png) => ".png",
            _ => ".jpg",
        };

        let mut file = tempfile::Builder::new()
            .prefix("capture-")
            .suffix(suffix)
            .tempfile()?;
        file.write_all(&bytes)?;
        file.flush()?;

        Ok(Self {
            width: decoded.width(),
            height: decoded.height(),
            bytes,
            file,
        })
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::images;

    #[test]
    fn temp_file_is_removed_on_drop() {
        let image = CaptureImage::decode(images::png_bytes(64, 48)).unwrap();
        assert_eq!((image.width(), image.height()), (64, 48));
        let path = image.path().to_path_buf();
        assert!(path.exists());
        assert_eq!(std::fs::read(&path).unwrap(), image.bytes().to_vec());
        drop(image);
        assert!(!path.exists());
    }

    #[test]
    fn garbage_is_not_an_image() {
        let result = CaptureImage::decode(Bytes::from_static(b"definitely not a png"));
        assert!(matches!(result, Err(ImageLoadError::Undecodable(_))));
    }
}
