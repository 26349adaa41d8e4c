// SPDX-FileCopyrightText: 2026 Fieldops Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook signature verification for the LINE platform.
//!
//! LINE signs every webhook delivery with HMAC-SHA256 over the raw request
//! body, keyed by the channel secret, and sends the result base64-encoded in
//! the `x-line-signature` header. Verification must run on the exact bytes
//! received, before any JSON parsing.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Checks a webhook body against its `x-line-signature` header value.
///
/// Returns `false` for a malformed header as well as for a genuine
/// mismatch; callers treat both the same way (reject the request).
pub fn verify(channel_secret: &str, body: &[u8], signature: &str) -> bool {
    let Ok(expected) = STANDARD.decode(signature) else {
        return false;
    };
    // HMAC accepts keys of any length, so this only fails on internal
    // misuse; treat it as a mismatch rather than panicking.
    let Ok(mut mac) = HmacSha256::new_from_slice(channel_secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    // verify_slice is constant-time.
    mac.verify_slice(&expected).is_ok()
}

/// Produces the signature LINE would send for `body`. Test-only: the adapter
/// never signs outbound traffic.
#[cfg(test)]
pub(crate) fn sign(channel_secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(channel_secret.as_bytes())
        .unwrap_or_else(|_| unreachable!("hmac accepts any key length"));
    mac.update(body);
    STANDARD.encode(mac.finalize().into_bytes())
}
