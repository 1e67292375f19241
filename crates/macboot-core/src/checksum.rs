//! SHA-256 verification for downloaded files.
//!
//! Computed once after a download completes, never inline with the transfer.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;

const BUF_SIZE: usize = 64 * 1024;

/// Compute SHA-256 of a file and return the digest as lowercase hex.
/// Reads in chunks to keep memory use bounded.
pub fn sha256_path(path: &Path) -> Result<String> {
    let mut f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; BUF_SIZE];
    loop {
        let n = f
            .read(&mut buf)
            .with_context(|| format!("read {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    let digest = hasher.finalize();
    Ok(hex::encode(digest))
}

/// Check `path` against an expected hex digest (case-insensitive).
/// Returns the actual digest on mismatch.
pub fn verify_sha256(path: &Path, expected: &str) -> Result<std::result::Result<(), String>> {
    let actual = sha256_path(path)?;
    if actual.eq_ignore_ascii_case(expected.trim()) {
        Ok(Ok(()))
    } else {
        Ok(Err(actual))
    }
}
