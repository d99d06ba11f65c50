//! Shared types passed between the controller, the relay and the image module.
//!
//! [`ImageBuffer`] is the only pixel container in the crate. It is always
//! row-major, top-to-bottom, with either one channel (intensity) or four
//! (RGBA). The constructor enforces `pixels.len() == width * height * channels`
//! so every consumer can index without re-checking.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ImageError {
    #[error("unsupported channel count {0} (expected 1 or 4)")]
    UnsupportedChannels(u8),
    #[error("{width}x{height} is not a valid frame size")]
    InvalidDimensions { width: u32, height: u32 },
    #[error("buffer holds {actual} bytes, expected {expected}")]
    LengthMismatch { expected: usize, actual: usize },
}

/// Decoded pixels plus their shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageBuffer {
    width: u32,
    height: u32,
    channels: u8,
    #[serde(rename = "bytes", serialize_with = "byte_count")]
    pixels: Vec<u8>,
}

impl ImageBuffer {
    pub fn new(width: u32, height: u32, channels: u8, pixels: Vec<u8>) -> Result<Self, ImageError> {
        if channels != 1 && channels != 4 {
            return Err(ImageError::UnsupportedChannels(channels));
        }
        let expected = Self::expected_len(width, height, channels)
            .filter(|&n| n > 0)
            .ok_or(ImageError::InvalidDimensions { width, height })?;
        if pixels.len() != expected {
            return Err(ImageError::LengthMismatch {
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            channels,
            pixels,
        })
    }

    /// Shorthand for a four-channel buffer.
    pub fn rgba(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, ImageError> {
        Self::new(width, height, 4, pixels)
    }

    /// Byte length of a `width x height x channels` frame, `None` on overflow.
    pub fn expected_len(width: u32, height: u32, channels: u8) -> Option<usize> {
        (width as usize)
            .checked_mul(height as usize)?
            .checked_mul(channels as usize)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Four-channel copy of this buffer.
    ///
    /// Single-channel input is replicated into R, G and B with A = 255.
    pub fn to_rgba(&self) -> ImageBuffer {
        match self.channels {
            1 => ImageBuffer {
                width: self.width,
                height: self.height,
                channels: 4,
                pixels: gray_to_rgba(&self.pixels),
            },
            _ => self.clone(),
        }
    }
}

/// Replicate each intensity byte into an opaque RGBA pixel.
pub fn gray_to_rgba(gray: &[u8]) -> Vec<u8> {
    let mut rgba = Vec::with_capacity(gray.len() * 4);
    for &value in gray {
        rgba.extend_from_slice(&[value, value, value, 255]);
    }
    rgba
}

/// Serialize a byte buffer as its length; pixel payloads are never useful in logs.
#[allow(clippy::ptr_arg)]
pub(crate) fn byte_count<S: serde::Serializer>(bytes: &Vec<u8>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(bytes.len() as u64)
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown operation: {0}")]
pub struct UnknownOperation(pub String);

/// The fixed set of filters the playground exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Grayscale,
    Blur,
    Sobel,
    Binary,
}

impl Operation {
    pub const ALL: [Operation; 4] = [
        Operation::Grayscale,
        Operation::Blur,
        Operation::Sobel,
        Operation::Binary,
    ];

    /// Name used on the relay protocol.
    pub fn name(self) -> &'static str {
        match self {
            Operation::Grayscale => "grayscale",
            Operation::Blur => "blur",
            Operation::Sobel => "sobel",
            Operation::Binary => "binary",
        }
    }

    /// Human-readable label shown in status messages.
    pub fn display_name(self) -> &'static str {
        match self {
            Operation::Grayscale => "Grayscale filter",
            Operation::Blur => "Blur filter",
            Operation::Sobel => "Edge detection",
            Operation::Binary => "Binary threshold",
        }
    }

    /// Id of the loading indicator attached to this filter's control.
    pub fn spinner_id(self) -> &'static str {
        match self {
            Operation::Grayscale => "grayscaleSpinner",
            Operation::Blur => "blurSpinner",
            Operation::Sobel => "sobelSpinner",
            Operation::Binary => "binarySpinner",
        }
    }

    pub fn output_channels(self) -> u8 {
        match self {
            Operation::Sobel => 1,
            Operation::Grayscale | Operation::Blur | Operation::Binary => 4,
        }
    }
}

impl FromStr for Operation {
    type Err = UnknownOperation;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Operation::ALL
            .into_iter()
            .find(|op| op.name() == name)
            .ok_or_else(|| UnknownOperation(name.to_string()))
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
