//! MySQL lock name encoding.
//!
//! `GET_LOCK` accepts names of at most 64 characters and compares them
//! case-insensitively, so `"Orders"` and `"orders"` name the same lock.
//! Names that fit are used verbatim. Empty and over-long names get a readable
//! prefix plus a digest of the original bytes.

use sha2::{Digest, Sha512};

/// Maximum length for MySQL lock names, in characters.
pub const MAX_NAME_LENGTH: usize = 64;

/// Base32 characters kept from the digest (160 bits).
const HASH_LENGTH_IN_CHARS: usize = 32;

const BASE32_ALPHABET: &[u8; 32] = b"abcdefghijklmnopqrstuvwxyz234567";

/// Encodes a lock name for `GET_LOCK` and friends.
///
/// The mapping is deterministic: every call site that encodes the same
/// logical name reaches the same store lock.
pub fn encode_lock_name(name: &str) -> String {
    if is_verbatim(name) {
        return name.to_string();
    }

    let base = if name.is_empty() { "__empty__" } else { name };
    let prefix: String = base
        .chars()
        .take(MAX_NAME_LENGTH - HASH_LENGTH_IN_CHARS)
        .collect();
    format!("{prefix}{}", compute_hash(name.as_bytes()))
}

fn is_verbatim(name: &str) -> bool {
    !name.is_empty() && name.chars().count() <= MAX_NAME_LENGTH
}

/// SHA-512 of `bytes`, truncated to 160 bits and rendered as lowercase Base32.
fn compute_hash(bytes: &[u8]) -> String {
    let digest = Sha512::digest(bytes);

    let mut out = String::with_capacity(HASH_LENGTH_IN_CHARS);
    let mut buffer = 0u32;
    let mut bits = 0u32;
    for byte in digest.iter().take(HASH_LENGTH_IN_CHARS * 5 / 8) {
        buffer = (buffer << 8) | u32::from(*byte);
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(BASE32_ALPHABET[((buffer >> bits) & 31) as usize] as char);
        }
    }
    out
}
