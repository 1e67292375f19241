//! Download file lifecycle.
//!
//! Transfers write into `<destination>.part`; the part file is renamed onto the
//! destination only after the transfer is verified, and removed otherwise.

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Temporary file suffix used before atomic rename.
pub const TEMP_SUFFIX: &str = ".part";

/// Path for the temp file: appends `.part` to the final path (e.g. `font.zip` → `font.zip.part`).
pub fn temp_path(final_path: &Path) -> PathBuf {
    let mut o = final_path.as_os_str().to_owned();
    o.push(TEMP_SUFFIX);
    PathBuf::from(o)
}

/// Remove a file, treating "already gone" as success.
pub fn remove_if_exists(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// A `.part` file being written. Dropped without `commit`, the file is deleted.
pub struct PartFile {
    file: Option<File>,
    temp_path: PathBuf,
    written: u64,
}

impl PartFile {
    /// Create (or truncate) the temp file at `temp_path`.
    pub fn create(temp_path: &Path) -> io::Result<Self> {
        let file = File::options()
            .write(true)
            .create(true)
            .truncate(true)
            .open(temp_path)?;
        Ok(Self {
            file: Some(file),
            temp_path: temp_path.to_path_buf(),
            written: 0,
        })
    }

    pub fn write_chunk(&mut self, data: &[u8]) -> io::Result<()> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "part file already closed"))?;
        file.write_all(data)?;
        self.written += data.len() as u64;
        Ok(())
    }

    /// Bytes written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    /// Sync and atomically rename onto `final_path`. Fails if `final_path` is on a different filesystem.
    pub fn commit(mut self, final_path: &Path) -> io::Result<()> {
        if let Some(file) = self.file.take() {
            file.sync_all()?;
        }
        std::fs::rename(&self.temp_path, final_path)?;
        self.written = 0;
        self.temp_path = PathBuf::new();
        Ok(())
    }
}

impl Drop for PartFile {
    fn drop(&mut self) {
        drop(self.file.take());
        if self.temp_path.as_os_str().is_empty() {
            return;
        }
        if let Err(e) = remove_if_exists(&self.temp_path) {
            tracing::warn!(path = %self.temp_path.display(), "could not remove partial download: {}", e);
        }
    }
}
