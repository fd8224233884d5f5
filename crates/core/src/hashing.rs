//! SHA-256 helpers for deterministic id derivation and content hashes.
//!
//! Blueprint-authored entities and ingest-derived documents get their ids
//! from [`get_hash`] so that re-running the same derivation is stable.

use sha2::{Digest, Sha256};

/// Number of hex characters kept by [`get_hash`] (128 bits).
const HASH_ID_LEN: usize = 32;

/// Compute a SHA-256 hex digest of the given bytes.
pub fn sha256_hex(data: &[u8]) -> String {
    let hash = Sha256::digest(data);
    format!("{hash:x}")
}

/// A short, id-friendly hash of a string.
pub fn get_hash(input: &str) -> String {
    let mut hex = sha256_hex(input.as_bytes());
    hex.truncate(HASH_ID_LEN);
    hex
}

/// Hash of any serialisable value, via its canonical JSON form.
///
/// Struct fields serialise in declaration order and maps are `BTreeMap`s,
/// so equal values hash equally.
pub fn hash_json<T: serde::Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let bytes = serde_json::to_vec(value)?;
    Ok(sha256_hex(&bytes))
}
