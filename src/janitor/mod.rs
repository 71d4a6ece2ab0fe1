//! Cache cleanup run after a controller-issued stop

use std::fs;
use std::path::{Component, Path, PathBuf};

use bytesize::ByteSize;
use serde::{Deserialize, Serialize};

use crate::error::{IdlewatchError, Result};

/// Outcome of one cleanup pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub target: PathBuf,
    pub removed: usize,
    pub bytes_freed: u64,
    pub dry_run: bool,
    pub details: Vec<String>,
}

/// Side-effecting cleanup. Must be idempotent.
pub trait Janitor {
    fn clean(&self) -> Result<CleanupReport>;
}

/// Empties a cache directory, keeping the directory itself
#[derive(Debug, Clone)]
pub struct CacheJanitor {
    target: PathBuf,
    dry_run: bool,
}

impl CacheJanitor {
    pub fn new(target: impl Into<PathBuf>) -> Self {
        Self {
            target: target.into(),
            dry_run: false,
        }
    }

    /// Report what would be removed without touching anything
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    fn check_target(&self) -> Result<()> {
        if self.target.as_os_str().is_empty() {
            return Err(IdlewatchError::SecurityError(
                "cache target is empty".to_string(),
            ));
        }
        if self.target.components().any(|c| c == Component::ParentDir) {
            return Err(IdlewatchError::SecurityError(format!(
                "cache target {} must not contain '..'",
                self.target.display()
            )));
        }
        if !self
            .target
            .components()
            .any(|c| matches!(c, Component::Normal(_)))
        {
            return Err(IdlewatchError::SecurityError(format!(
                "refusing to clean {}: it names no directory of its own",
                self.target.display()
            )));
        }

        // Symlinks may still point at the root
        if self.target.exists() {
            let resolved = fs::canonicalize(&self.target).map_err(|e| {
                IdlewatchError::CleanupFailure(format!(
                    "cannot resolve {}: {}",
                    self.target.display(),
                    e
                ))
            })?;
            if resolved.parent().is_none() {
                return Err(IdlewatchError::SecurityError(format!(
                    "refusing to clean {}: resolves to filesystem root",
                    self.target.display()
                )));
            }
        }
        Ok(())
    }
}

impl Janitor for CacheJanitor {
    fn clean(&self) -> Result<CleanupReport> {
        self.check_target()?;

        let mut report = CleanupReport {
            target: self.target.clone(),
            removed: 0,
            bytes_freed: 0,
            dry_run: self.dry_run,
            details: Vec::new(),
        };

        // Already gone counts as clean
        if !self.target.exists() {
            report
                .details
                .push(format!("{} does not exist, nothing to clean", self.target.display()));
            return Ok(report);
        }

        if !self.target.is_dir() {
            return Err(IdlewatchError::CleanupFailure(format!(
                "{} is not a directory",
                self.target.display()
            )));
        }

        let entries = fs::read_dir(&self.target).map_err(|e| {
            IdlewatchError::CleanupFailure(format!("cannot read {}: {}", self.target.display(), e))
        })?;

        let mut failures: Vec<String> = Vec::new();
        let mut seen = 0;

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    failures.push(format!("unreadable entry: {}", e));
                    continue;
                }
            };
            seen += 1;
            let path = entry.path();
            let size = disk_usage(&path);

            if self.dry_run {
                report
                    .details
                    .push(format!("Would remove: {} ({})", path.display(), ByteSize(size)));
                report.removed += 1;
                report.bytes_freed += size;
                continue;
            }

            match remove_entry(&path) {
                Ok(()) => {
                    report
                        .details
                        .push(format!("Removed: {} ({})", path.display(), ByteSize(size)));
                    report.removed += 1;
                    report.bytes_freed += size;
                }
                Err(e) => {
                    let message = format!("Failed to remove {}: {}", path.display(), e);
                    report.details.push(message.clone());
                    failures.push(message);
                }
            }
        }

        if let Some(first) = failures.first() {
            return Err(IdlewatchError::CleanupFailure(format!(
                "{} of {} entries in {} could not be removed (first: {})",
                failures.len(),
                seen.max(failures.len()),
                self.target.display(),
                first
            )));
        }

        Ok(report)
    }
}

/// Symlinks are removed, never followed
fn remove_entry(path: &Path) -> std::io::Result<()> {
    let meta = fs::symlink_metadata(path)?;
    if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

fn disk_usage(path: &Path) -> u64 {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(_) => return 0,
    };
    if !meta.is_dir() {
        return meta.len();
    }
    fs::read_dir(path)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| disk_usage(&e.path()))
                .sum()
        })
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    fn populate(dir: &Path) {
        let mut file = File::create(dir.join("segment-0001.ts")).unwrap();
        file.write_all(&[0u8; 2048]).unwrap();

        let nested = dir.join("torrent-abc");
        fs::create_dir_all(nested.join("pieces")).unwrap();
        let mut piece = File::create(nested.join("pieces").join("0")).unwrap();
        piece.write_all(&[1u8; 1024]).unwrap();
    }

    #[test]
    fn test_clean_removes_contents_keeps_dir() {
        let temp_dir = TempDir::new().unwrap();
        populate(temp_dir.path());

        let report = CacheJanitor::new(temp_dir.path()).clean().unwrap();

        assert_eq!(report.removed, 2);
        assert_eq!(report.bytes_freed, 3072);
        assert!(!report.dry_run);
        assert!(temp_dir.path().is_dir());
        assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_clean_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        populate(temp_dir.path());
        let janitor = CacheJanitor::new(temp_dir.path());

        janitor.clean().unwrap();
        let second = janitor.clean().unwrap();
        assert_eq!(second.removed, 0);
        assert_eq!(second.bytes_freed, 0);
    }

    #[test]
    fn test_missing_target_is_noop_success() {
        let temp_dir = TempDir::new().unwrap();
        let report = CacheJanitor::new(temp_dir.path().join("never-created"))
            .clean()
            .unwrap();
        assert_eq!(report.removed, 0);
    }

    #[test]
    fn test_dry_run_keeps_files() {
        let temp_dir = TempDir::new().unwrap();
        populate(temp_dir.path());

        let report = CacheJanitor::new(temp_dir.path())
            .dry_run(true)
            .clean()
            .unwrap();

        assert!(report.dry_run);
        assert_eq!(report.removed, 2);
        assert!(report.details.iter().all(|d| d.starts_with("Would remove")));
        assert!(temp_dir.path().join("segment-0001.ts").exists());
    }

    #[test]
    fn test_file_target_is_failure() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("cache");
        File::create(&file_path).unwrap();

        let result = CacheJanitor::new(&file_path).clean();
        assert!(matches!(result, Err(IdlewatchError::CleanupFailure(_))));
    }

    #[test]
    fn test_refuses_root_and_empty() {
        assert!(matches!(
            CacheJanitor::new("/").clean(),
            Err(IdlewatchError::SecurityError(_))
        ));
        assert!(matches!(
            CacheJanitor::new("").clean(),
            Err(IdlewatchError::SecurityError(_))
        ));
    }

    #[test]
    fn test_refuses_current_and_parent_dir_targets() {
        for target in [".", "./", "/srv/..", "cache/../..", "../cache"] {
            let result = CacheJanitor::new(target).dry_run(true).clean();
            assert!(
                matches!(result, Err(IdlewatchError::SecurityError(_))),
                "{} was accepted",
                target
            );
        }
    }

    #[test]
    fn test_relative_target_is_allowed() {
        let dir = TempDir::new().unwrap();
        let cache = dir.path().join("./cache");
        fs::create_dir(&cache).unwrap();
        File::create(cache.join("segment.ts")).unwrap();

        let report = CacheJanitor::new(&cache).clean().unwrap();
        assert_eq!(report.removed, 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_refuses_symlink_to_root() {
        let dir = TempDir::new().unwrap();
        let link = dir.path().join("cache");
        std::os::unix::fs::symlink("/", &link).unwrap();

        let result = CacheJanitor::new(&link).dry_run(true).clean();
        assert!(matches!(result, Err(IdlewatchError::SecurityError(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_removed_not_followed() {
        let outside = TempDir::new().unwrap();
        let kept = outside.path().join("keep.bin");
        File::create(&kept).unwrap();

        let cache = TempDir::new().unwrap();
        std::os::unix::fs::symlink(outside.path(), cache.path().join("link")).unwrap();

        CacheJanitor::new(cache.path()).clean().unwrap();
        assert!(kept.exists());
        assert!(!cache.path().join("link").exists());
    }
}
