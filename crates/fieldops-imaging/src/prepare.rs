// SPDX-FileCopyrightText: 2026 Fieldops Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Evidence photo normalization: decode, reorient, downscale, flatten,
//! re-encode.
//!
//! Phones send camera images as multi-megabyte JPEGs with an EXIF rotation
//! tag, or screenshots as PNGs with alpha. Everything is normalized to an
//! upright, bounded-size, opaque JPEG before upload so the stored evidence
//! is uniform regardless of source.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::metadata::Orientation;
use image::{DynamicImage, ImageDecoder, ImageReader, Rgb, RgbImage};

use fieldops_core::FieldopsError;

/// Decode raw image bytes (JPEG/PNG/GIF) and re-encode as an upright JPEG.
///
/// - EXIF orientation is applied, then stripped by re-encoding.
/// - The longer side is downscaled to at most `max_dimension_px` (aspect
///   preserved); images already within bounds are never upscaled.
/// - Transparency is flattened onto white.
/// - `jpeg_quality` differs by flow (check-in evidence is compressed harder
///   than submission evidence).
pub fn prepare_image(
    raw: &[u8],
    max_dimension_px: u32,
    jpeg_quality: u8,
) -> Result<Vec<u8>, FieldopsError> {
    let reader = ImageReader::new(Cursor::new(raw))
        .with_guessed_format()
        .map_err(|e| FieldopsError::Image(format!("unrecognized image data: {e}")))?;
    let mut decoder = reader
        .into_decoder()
        .map_err(|e| FieldopsError::Image(format!("image decode failed: {e}")))?;
    let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);
    let mut img = DynamicImage::from_decoder(decoder)
        .map_err(|e| FieldopsError::Image(format!("image decode failed: {e}")))?;
    img.apply_orientation(orientation);

    let longer = img.width().max(img.height());
    if longer > max_dimension_px {
        img = img.resize(max_dimension_px, max_dimension_px, FilterType::Lanczos3);
    }

    let rgb = flatten_to_rgb(&img);
    let mut out = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut out, jpeg_quality);
    rgb.write_with_encoder(encoder)
        .map_err(|e| FieldopsError::Image(format!("jpeg encode failed: {e}")))?;
    tracing::debug!(
        width = rgb.width(),
        height = rgb.height(),
        bytes = out.len(),
        "image prepared"
    );
    Ok(out)
}

/// Flatten any alpha channel onto a white background; pass opaque images
/// through an RGB conversion.
fn flatten_to_rgb(img: &DynamicImage) -> RgbImage {
    if !img.color().has_alpha() {
        return img.to_rgb8();
    }
    let rgba = img.to_rgba8();
    let mut out = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, px) in rgba.enumerate_pixels() {
        let a = px[3] as u32;
        let blend = |c: u8| -> u8 { ((c as u32 * a + 255 * (255 - a)) / 255) as u8 };
        out.put_pixel(x, y, Rgb([blend(px[0]), blend(px[1]), blend(px[2])]));
    }
    out
}
