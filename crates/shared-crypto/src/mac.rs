//! # HMAC-SHA256
//!
//! Pairwise message authentication codes. A tag is only meaningful to the
//! holder of the same key, so a MAC'd message must be re-tagged for every
//! recipient.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 tag length in bytes.
pub const MAC_LEN: usize = 32;

/// HMAC-SHA256 tag.
pub type MacTag = [u8; MAC_LEN];

/// Compute HMAC-SHA256 over `data`.
pub fn hmac_sha256(key: &[u8; 32], data: &[u8]) -> MacTag {
    let mut mac =
        <HmacSha256 as Mac>::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// Verify an HMAC-SHA256 tag in constant time.
pub fn verify_hmac_sha256(key: &[u8; 32], data: &[u8], tag: &[u8]) -> bool {
    let mut mac = match <HmacSha256 as Mac>::new_from_slice(key) {
        Ok(m) => m,
        Err(_) => return false,
    };
    mac.update(data);
    mac.verify_slice(tag).is_ok()
}
