//! `macboot checksum`: print the SHA-256 of a file.

use anyhow::{Context, Result};
use macboot_core::checksum;
use std::path::Path;

pub fn run_checksum(path: &Path) -> Result<()> {
    let digest = checksum::sha256_path(path)
        .with_context(|| format!("checksum {}", path.display()))?;
    println!("{}  {}", digest, path.display());
    Ok(())
}
