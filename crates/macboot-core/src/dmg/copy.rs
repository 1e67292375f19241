//! Copy an application bundle out of a mounted volume.
//!
//! The bundle is copied into a hidden staging directory next to the target and
//! renamed into place, so an interrupted copy never looks like an installed app.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

fn staging_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "bundle".to_string());
    target.with_file_name(format!(".{}.macboot-partial", name))
}

fn remove_any(path: &Path) -> io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Recursively copy `src` to `dst`, preserving symlinks on unix.
pub(crate) fn copy_tree(src: &Path, dst: &Path) -> io::Result<()> {
    let meta = fs::symlink_metadata(src)?;
    let ft = meta.file_type();
    if ft.is_symlink() {
        #[cfg(unix)]
        {
            let link = fs::read_link(src)?;
            std::os::unix::fs::symlink(link, dst)?;
            return Ok(());
        }
        #[cfg(not(unix))]
        {
            fs::copy(src, dst)?;
            return Ok(());
        }
    }
    if ft.is_dir() {
        fs::create_dir_all(dst)?;
        for entry in fs::read_dir(src)? {
            let entry = entry?;
            copy_tree(&entry.path(), &dst.join(entry.file_name()))?;
        }
        fs::set_permissions(dst, meta.permissions())?;
        return Ok(());
    }
    fs::copy(src, dst)?;
    Ok(())
}

/// Copy the bundle at `src` to `target`. An existing `target` is replaced only when `replace` is set.
pub(crate) fn copy_bundle(src: &Path, target: &Path, replace: bool) -> io::Result<()> {
    if !src.exists() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} not found on mounted volume", src.display()),
        ));
    }
    if target.exists() && !replace {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("{} already exists", target.display()),
        ));
    }

    let staging = staging_path(target);
    remove_any(&staging)?;
    if let Err(e) = copy_tree(src, &staging) {
        if let Err(cleanup) = remove_any(&staging) {
            tracing::warn!(path = %staging.display(), "could not remove partial copy: {}", cleanup);
        }
        return Err(e);
    }
    if replace {
        remove_any(target)?;
    }
    fs::rename(&staging, target).map_err(|e| {
        let _ = remove_any(&staging);
        e
    })
}
