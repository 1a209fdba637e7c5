//! Host-level configuration: ROM path and the two disk directories passed on the
//! command line (§6/§10: `simulatron run --rom <path> --disk-a <dir> --disk-b <dir>
//! [--log-level <level>]`). Validated eagerly so [`crate::Machine::new`] never has to
//! reject a half-built machine.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::HostError;

/// Default interval the disk directory watcher polls at. Not spec-mandated — chosen
/// to be well under anything a human would notice, without busy-spinning a thread
/// per disk.
pub const DEFAULT_DISK_POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone)]
pub struct Config {
    pub rom_path: PathBuf,
    pub disk_a_dir: PathBuf,
    pub disk_b_dir: PathBuf,
    pub disk_poll_interval: Duration,
    pub log_level: String,
}

impl Config {
    /// Build and validate a `Config` from the three `run` subcommand arguments.
    /// Checks ROM size and directory existence up front; per-file disk image size
    /// checks happen when `Machine::new` actually reads the directory contents, since
    /// a directory may legitimately be empty.
    pub fn validate(
        rom_path: PathBuf,
        disk_a_dir: PathBuf,
        disk_b_dir: PathBuf,
        log_level: String,
    ) -> Result<Self, HostError> {
        let rom_len = std::fs::metadata(&rom_path)
            .map_err(|source| HostError::Io {
                path: rom_path.display().to_string(),
                source,
            })?
            .len();
        if rom_len != crate::devices::rom::SIZE as u64 {
            return Err(HostError::BadRomSize {
                path: rom_path.display().to_string(),
                actual: rom_len,
            });
        }

        for dir in [&disk_a_dir, &disk_b_dir] {
            if !dir.is_dir() {
                return Err(HostError::MissingDiskDirectory {
                    path: dir.display().to_string(),
                });
            }
        }

        Ok(Config {
            rom_path,
            disk_a_dir,
            disk_b_dir,
            disk_poll_interval: DEFAULT_DISK_POLL_INTERVAL,
            log_level,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_rom_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let rom_path = dir.path().join("rom.bin");
        let err = Config::validate(rom_path, dir.path().join("DiskA"), dir.path().join("DiskB"), "info".into())
            .unwrap_err();
        assert!(matches!(err, HostError::Io { .. }));
    }

    #[test]
    fn wrong_sized_rom_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let rom_path = dir.path().join("rom.bin");
        std::fs::write(&rom_path, vec![0u8; 100]).unwrap();
        let err = Config::validate(rom_path, dir.path().join("DiskA"), dir.path().join("DiskB"), "info".into())
            .unwrap_err();
        assert!(matches!(err, HostError::BadRomSize { actual: 100, .. }));
    }

    #[test]
    fn missing_disk_directory_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let rom_path = dir.path().join("rom.bin");
        std::fs::write(&rom_path, vec![0u8; crate::devices::rom::SIZE as usize]).unwrap();
        let err = Config::validate(rom_path, dir.path().join("DiskA"), dir.path().join("DiskB"), "info".into())
            .unwrap_err();
        assert!(matches!(err, HostError::MissingDiskDirectory { .. }));
    }

    #[test]
    fn well_formed_arguments_validate() {
        let dir = tempfile::tempdir().unwrap();
        let rom_path = dir.path().join("rom.bin");
        std::fs::write(&rom_path, vec![0u8; crate::devices::rom::SIZE as usize]).unwrap();
        let disk_a_dir = dir.path().join("DiskA");
        let disk_b_dir = dir.path().join("DiskB");
        std::fs::create_dir(&disk_a_dir).unwrap();
        std::fs::create_dir(&disk_b_dir).unwrap();
        let config = Config::validate(rom_path, disk_a_dir.clone(), disk_b_dir, "debug".into()).unwrap();
        assert_eq!(config.disk_a_dir, disk_a_dir);
        assert_eq!(config.log_level, "debug");
    }
}
