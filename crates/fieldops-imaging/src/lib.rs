// SPDX-FileCopyrightText: 2026 Fieldops Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Image pipeline primitives for the Fieldops bot.
//!
//! This crate provides:
//! - [`prepare_image`]: decode, EXIF reorient, bounded downscale, alpha
//!   flatten, JPEG re-encode at a per-flow quality
//! - [`average_hash_hex`]: the 64-bit perceptual average-hash used for
//!   submission duplicate detection
//!
//! Both are pure byte-in/byte-out functions; slot assignment, locking and
//! upload live in `fieldops-engine`.

pub mod hash;
pub mod prepare;

pub use hash::average_hash_hex;
pub use prepare::prepare_image;
