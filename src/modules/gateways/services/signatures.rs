//! Shared webhook signature primitives.
//!
//! Every comparison against a vendor-supplied digest goes through
//! [`constant_time_eq`] to keep verification timing-independent.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256, Sha512};
use subtle::ConstantTimeEq;

/// Hex-encoded HMAC-SHA256 of `payload` under `secret`
pub fn hmac_sha256_hex(secret: &str, payload: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Hex-encoded HMAC-SHA512 of `payload` under `secret`
pub fn hmac_sha512_hex(secret: &str, payload: &[u8]) -> String {
    let mut mac = Hmac::<Sha512>::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Hex-encoded plain SHA512 digest
pub fn sha512_hex(payload: &[u8]) -> String {
    let mut hasher = Sha512::new();
    hasher.update(payload);
    hex::encode(hasher.finalize())
}

/// Hex-encoded MD5 digest (PayFast ITN)
pub fn md5_hex(payload: &[u8]) -> String {
    let mut hasher = md5::Md5::new();
    hasher.update(payload);
    hex::encode(hasher.finalize())
}

/// Constant-time equality over two digest strings
pub fn constant_time_eq(expected: &str, provided: &str) -> bool {
    expected.as_bytes().ct_eq(provided.as_bytes()).into()
}
