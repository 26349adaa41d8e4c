// SPDX-FileCopyrightText: 2026 Fieldops Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Small JPEG fixtures for image-path tests.
//!
//! Constant-color images all share one perceptual hash, so tests that need
//! distinct hashes use [`split_jpeg`] with different axes.

use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};

/// A flat gray JPEG of the given dimensions.
pub fn flat_jpeg(width: u32, height: u32, luma: u8) -> Vec<u8> {
    encode(RgbImage::from_pixel(width, height, Rgb([luma, luma, luma])))
}

/// A half-white, half-black JPEG split along the given axis.
///
/// Vertical and horizontal splits produce different perceptual hashes;
/// re-encoding either at another quality keeps its hash stable.
pub fn split_jpeg(width: u32, height: u32, vertical: bool) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        let bright = if vertical { x < width / 2 } else { y < height / 2 };
        if bright {
            Rgb([255, 255, 255])
        } else {
            Rgb([0, 0, 0])
        }
    });
    encode(img)
}

fn encode(img: RgbImage) -> Vec<u8> {
    let mut out = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut out, 85);
    img.write_with_encoder(encoder)
        .expect("in-memory jpeg encode");
    out
}
