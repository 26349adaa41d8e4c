// SPDX-FileCopyrightText: 2026 Fieldops Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! 64-bit perceptual average-hash over prepared JPEG bytes.
//!
//! Submissions store one hash per image slot; a later upload with the same
//! hash anywhere in the collection earns an advisory duplicate-reference
//! note. The hash fingerprints what the image looks like, not its exact
//! bytes, so a re-sent photo matches even after a second trip through JPEG
//! compression.

use image::imageops::FilterType;

use fieldops_core::FieldopsError;

/// Compute the average-hash of an encoded image as a 16-char lowercase hex
/// digest.
///
/// Downsample to 8x8 grayscale, threshold each pixel against the block
/// mean, pack the 64 bits MSB-first in row-major order.
pub fn average_hash_hex(encoded: &[u8]) -> Result<String, FieldopsError> {
    let img = image::load_from_memory(encoded)
        .map_err(|e| FieldopsError::Image(format!("hash decode failed: {e}")))?;
    let gray = img.resize_exact(8, 8, FilterType::Lanczos3).to_luma8();
    let pixels = gray.as_raw();
    let mean = pixels.iter().map(|&p| p as f64).sum::<f64>() / 64.0;
    let mut bits: u64 = 0;
    for &p in pixels {
        bits <<= 1;
        if p as f64 >= mean {
            bits |= 1;
        }
    }
    Ok(format!("{bits:016x}"))
}
