//! Disk-image mount adapter (`hdiutil attach` / `hdiutil detach`).

use std::path::{Path, PathBuf};

use super::command::run_command;
use super::{AdapterError, DiskImageMounter, MountPoint};
use crate::environment::Environment;

#[derive(Debug, Clone)]
pub struct Hdiutil {
    pub program: String,
    pub env: Environment,
}

impl Default for Hdiutil {
    fn default() -> Self {
        Self {
            program: "hdiutil".to_string(),
            env: Environment::from_process(),
        }
    }
}

/// Extract the mount point from `hdiutil attach` output.
///
/// Each line is `device \t content-hint \t mount-path`; only volume lines carry
/// a mount path. The last one wins.
pub fn parse_attach_output(stdout: &str) -> Option<MountPoint> {
    stdout
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split('\t').map(str::trim).collect();
            let mount = fields.last().copied().filter(|f| f.starts_with('/'))?;
            if fields.len() < 2 {
                return None;
            }
            let device = fields
                .first()
                .copied()
                .filter(|d| d.starts_with("/dev/"))
                .map(str::to_string);
            Some(MountPoint {
                path: PathBuf::from(mount),
                device,
            })
        })
        .last()
}

impl DiskImageMounter for Hdiutil {
    fn mount(&self, image: &Path) -> Result<MountPoint, AdapterError> {
        let image_str = image.to_string_lossy();
        let out = run_command(
            &self.program,
            &["attach", "-nobrowse", "-readonly", "-noautoopen", &image_str],
            &self.env,
        )?;
        parse_attach_output(&out.stdout).ok_or_else(|| AdapterError::Parse {
            program: self.program.clone(),
            detail: format!("no mount point in attach output for {}", image.display()),
        })
    }

    fn unmount(&self, mount: &MountPoint) -> Result<(), AdapterError> {
        let path = mount.path.to_string_lossy();
        match run_command(&self.program, &["detach", &path, "-quiet"], &self.env) {
            Ok(_) => Ok(()),
            Err(e) => {
                tracing::warn!(mount = %path, "detach failed ({}); retrying with -force", e);
                run_command(&self.program, &["detach", &path, "-force"], &self.env)?;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_volume_line() {
        let out = "/dev/disk4          \tGUID_partition_scheme          \t\n\
                   /dev/disk4s1        \tApple_HFS                      \t/Volumes/Firefox\n";
        let mp = parse_attach_output(out).unwrap();
        assert_eq!(mp.path, PathBuf::from("/Volumes/Firefox"));
        assert_eq!(mp.device.as_deref(), Some("/dev/disk4s1"));
    }

    #[test]
    fn parses_volume_names_with_spaces() {
        let out = "/dev/disk5s2\tApple_APFS\t/Volumes/Visual Studio Code\n";
        let mp = parse_attach_output(out).unwrap();
        assert_eq!(mp.path, PathBuf::from("/Volumes/Visual Studio Code"));
    }

    #[test]
    fn no_volume_line_is_none() {
        assert!(parse_attach_output("/dev/disk4\tGUID_partition_scheme\t\n").is_none());
        assert!(parse_attach_output("").is_none());
    }
}
