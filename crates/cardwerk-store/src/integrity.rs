// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Content addressing: SHA-256 digests for stored files and derived cache keys.

use std::fs::File;
use std::io;
use std::path::Path;

use cardwerk_core::error::{CardwerkError, Result};
use sha2::{Digest, Sha256};

/// Separator between parts hashed by `hash_parts`; cannot appear in hex or
/// in the parameter strings we feed it.
const PART_SEPARATOR: u8 = 0x1f;

/// Lowercase hex SHA-256 of `data`. This is the address of a stored file.
pub fn hash_bytes(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Hash a file without loading it into memory.
pub fn hash_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Derive a key from several strings, e.g. (source photo hash, processing
/// parameters) for the processed-photo cache.
pub fn hash_parts(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update([PART_SEPARATOR]);
        }
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Check that `data` still lives at the address `expected_hex`.
pub fn verify_hash(data: &[u8], expected_hex: &str) -> Result<()> {
    let actual = hash_bytes(data);
    if actual.eq_ignore_ascii_case(expected_hex) {
        Ok(())
    } else {
        Err(CardwerkError::IntegrityMismatch {
            expected: expected_hex.to_owned(),
            actual,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn known_digests() {
        assert_eq!(hash_bytes(b""), EMPTY_SHA256);
        assert_eq!(
            hash_bytes(b"hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn file_hash_matches_byte_hash() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"cardwerk front image").unwrap();
        assert_eq!(hash_file(tmp.path()).unwrap(), hash_bytes(b"cardwerk front image"));
    }

    #[test]
    fn parts_are_order_and_boundary_sensitive() {
        assert_ne!(hash_parts(&["ab", "c"]), hash_parts(&["a", "bc"]));
        assert_ne!(hash_parts(&["a", "b"]), hash_parts(&["b", "a"]));
        assert_eq!(hash_parts(&["x"]), hash_bytes(b"x"));
    }

    #[test]
    fn mismatch_reports_both_digests() {
        match verify_hash(b"a", "0000") {
            Err(CardwerkError::IntegrityMismatch { expected, actual }) => {
                assert_eq!(expected, "0000");
                assert_eq!(actual, hash_bytes(b"a"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(verify_hash(b"a", &hash_bytes(b"a")).is_ok());
    }
}
