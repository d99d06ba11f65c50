//! Image file decoding and PNG encoding via the `image` crate.
//!
//! Everything entering the controller is normalised to RGBA8; everything
//! leaving the CLI is written as PNG.

use crate::types::{ImageBuffer, ImageError};
use image::{DynamicImage, ImageFormat, RgbaImage};
use std::io::Cursor;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Decode(String),
    #[error("PNG encode failed: {0}")]
    Encode(String),
    #[error(transparent)]
    Shape(#[from] ImageError),
}

/// Decode any enabled format (PNG, JPEG) into an RGBA buffer.
pub fn decode(bytes: &[u8]) -> Result<ImageBuffer, CodecError> {
    let rgba = image::load_from_memory(bytes)
        .map_err(|e| CodecError::Decode(e.to_string()))?
        .to_rgba8();
    let (width, height) = rgba.dimensions();
    Ok(ImageBuffer::rgba(width, height, rgba.into_raw())?)
}

pub fn decode_file(path: &Path) -> Result<ImageBuffer, CodecError> {
    decode(&std::fs::read(path)?)
}

/// Encode as PNG. Single-channel buffers are expanded to RGBA first.
pub fn encode_png(image: &ImageBuffer) -> Result<Vec<u8>, CodecError> {
    let rgba = image.to_rgba();
    let raw = RgbaImage::from_raw(rgba.width(), rgba.height(), rgba.into_pixels())
        .ok_or_else(|| CodecError::Encode("pixel buffer does not match dimensions".into()))?;
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(raw)
        .write_to(&mut out, ImageFormat::Png)
        .map_err(|e| CodecError::Encode(e.to_string()))?;
    Ok(out.into_inner())
}

pub fn write_png(image: &ImageBuffer, path: &Path) -> Result<(), CodecError> {
    std::fs::write(path, encode_png(image)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{gradient, png_bytes};

    #[test]
    fn decode_png_yields_rgba() {
        let image = decode(&png_bytes(&gradient(5, 3))).unwrap();
        assert_eq!((image.width(), image.height(), image.channels()), (5, 3));
        assert_eq!(image.pixels(), gradient(5, 3).pixels());
    }

    #[test]
    fn decode_garbage_is_decode_error() {
        let err = decode(b"definitely not an image").unwrap_err();
        assert!(matches!(err, CodecError::Decode(_)));
    }

    #[test]
    fn encode_expands_single_channel() {
        let gray = ImageBuffer::new(2, 1, 1, vec![10, 200]).unwrap();
        let back = decode(&encode_png(&gray).unwrap()).unwrap();
        assert_eq!(back.pixels(), &[10, 10, 10, 255, 200, 200, 200, 255]);
    }

    #[test]
    fn write_png_creates_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("out.png");
        write_png(&gradient(4, 4), &path).unwrap();
        assert_eq!(decode_file(&path).unwrap(), gradient(4, 4));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = decode_file(Path::new("/nonexistent/image.png")).unwrap_err();
        assert!(matches!(err, CodecError::Io(_)));
    }
}
