//! Shared test utilities: synthetic frames and their PNG encodings.
//!
//! # Usage
//!
//! ```ignore
//! use crate::test_helpers::*;
//!
//! let image = gradient(8, 4);
//! controller.load_image(&png_bytes(&image)).unwrap();
//! ```

use crate::codec;
use crate::types::ImageBuffer;

// =========================================================================
// Frames
// =========================================================================

/// Opaque RGBA frame whose colour depends on position, so every pixel and
/// row is distinguishable.
pub fn gradient(width: u32, height: u32) -> ImageBuffer {
    let mut pixels = Vec::with_capacity((width * height * 4) as usize);
    for y in 0..height {
        for x in 0..width {
            pixels.extend_from_slice(&[
                (x * 255 / width.max(1)) as u8,
                (y * 255 / height.max(1)) as u8,
                ((x + y) * 17 % 256) as u8,
                255,
            ]);
        }
    }
    ImageBuffer::rgba(width, height, pixels).unwrap()
}

/// Opaque frame of a single colour.
pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> ImageBuffer {
    let pixels = [rgb[0], rgb[1], rgb[2], 255].repeat((width * height) as usize);
    ImageBuffer::rgba(width, height, pixels).unwrap()
}

// =========================================================================
// Encoding
// =========================================================================

pub fn png_bytes(image: &ImageBuffer) -> Vec<u8> {
    codec::encode_png(image).unwrap()
}
