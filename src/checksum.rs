use std::fs::File;
use std::io::Read;
use std::path::Path;
use sha2::{Digest, Sha256};
use crate::error::{Error, Result};

const BUFFER_SIZE: usize = 8 * 1024;

/// Strips an optional `sha256:` prefix and surrounding whitespace, and lowercases the digest.
pub fn normalize_checksum(checksum: &str) -> String {
    let checksum = checksum.trim();
    checksum
        .strip_prefix("sha256:")
        .unwrap_or(checksum)
        .to_ascii_lowercase()
}

/// Decodes a hex SHA-256 checksum.
///
/// # Errors
///
/// Returns [`Error::ChecksumFormat`] if `checksum` is not 64 hex digits.
pub fn decode_checksum(checksum: &str) -> Result<[u8; 32]> {
    let normalized = normalize_checksum(checksum);
    let bytes = hex::decode(&normalized).map_err(|e| Error::checksum_format(checksum, e))?;
    <[u8; 32]>::try_from(bytes.as_slice()).map_err(|_| {
        Error::checksum_format(checksum, format!("expected 32 bytes, got {}", bytes.len()))
    })
}

/// Computes the SHA-256 of a file, reading it in fixed-size chunks.
pub fn sha256_digest(path: &Path) -> Result<[u8; 32]> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; BUFFER_SIZE];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    let mut digest = [0u8; 32];
    digest.copy_from_slice(hasher.finalize().as_slice());
    Ok(digest)
}

/// Computes the hex encoded SHA-256 of a file.
pub fn sha256_file(path: &Path) -> Result<String> {
    Ok(hex::encode(sha256_digest(path)?))
}

/// Checks a file against an expected hex SHA-256.
///
/// # Errors
///
/// A malformed checksum is [`Error::ChecksumFormat`], not a failed verification.
pub fn verify(path: &Path, expected: &str) -> Result<bool> {
    let expected = decode_checksum(expected)?;
    let actual = sha256_digest(path)?;
    Ok(digests_equal(&actual, &expected))
}

/// Compares every byte regardless of where the first difference is.
fn digests_equal(a: &[u8; 32], b: &[u8; 32]) -> bool {
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
