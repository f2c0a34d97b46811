//! The filesystem adapter: every syscall the engine needs, behind a trait so
//! tests can swap in a fake. [`PosixFs`] is the only production
//! implementation.

mod immutable;

use std::fs;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};

use nix::unistd::{chown, Gid, Group, Uid, User};

use crate::error::{GuardError, Result};

/// A captured or target (mode, owner, group) triple. `owner`/`group` are
/// empty strings when unspecified ("do not change").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Triple {
    pub mode: String,
    pub owner: String,
    pub group: String,
}

/// One entry returned by a directory scan.
#[derive(Debug, Clone)]
pub struct ScannedEntry {
    pub name: String,
    pub path: PathBuf,
    pub is_dir: bool,
    pub is_symlink: bool,
    /// If `is_symlink` and the link resolves to a directory, that
    /// directory's path. `None` for non-symlinks, broken links, or links
    /// that resolve to a non-directory. Informational only: symlinks are
    /// never followed for mutation regardless of what this resolves to.
    pub resolved_target_dir_if_symlink: Option<PathBuf>,
}

/// Everything the engine needs from the filesystem. Implemented by
/// [`PosixFs`]; kept as a trait so the engine and resolver can be exercised
/// against an in-memory fake in tests that don't want to touch real files.
pub trait FilesystemAdapter {
    fn exists(&self, path: &Path) -> bool;
    fn is_dir(&self, path: &Path) -> bool;
    fn is_symlink(&self, path: &Path) -> bool;
    fn stat(&self, path: &Path) -> Result<Triple>;

    fn chmod(&self, path: &Path, mode: &str) -> Result<()>;
    fn chown(&self, path: &Path, owner: &str) -> Result<()>;
    fn chgrp(&self, path: &Path, group: &str) -> Result<()>;

    /// chmod, then chown (if non-empty), then chgrp (if non-empty), per the
    /// fixed ordering §4.1 requires.
    fn apply_triple(&self, path: &Path, triple: &Triple) -> Result<()>;

    fn read_dir_sorted(&self, path: &Path) -> Result<Vec<ScannedEntry>>;
    fn collect_immediate_files(&self, path: &Path) -> Result<Vec<PathBuf>>;
    fn collect_recursive_files(&self, path: &Path) -> Result<Vec<PathBuf>>;

    fn has_root_privileges(&self) -> bool;

    fn set_immutable(&self, path: &Path) -> Result<ImmutableOutcome>;
    fn clear_immutable(&self, path: &Path) -> Result<ImmutableOutcome>;
    fn is_immutable(&self, path: &Path) -> Result<bool>;
}

/// Result of attempting to change the immutable bit: either it happened, or
/// it was skipped as an advisory no-op because the caller isn't root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImmutableOutcome {
    Applied,
    SkippedNotRoot,
}

pub struct PosixFs;

impl PosixFs {
    pub fn new() -> Self {
        PosixFs
    }

    fn mode_bits(mode: &str) -> Result<u32> {
        u32::from_str_radix(mode, 8)
            .map_err(|_| GuardError::validation("mode", mode, "invalid octal"))
    }
}

impl Default for PosixFs {
    fn default() -> Self {
        Self::new()
    }
}

impl FilesystemAdapter for PosixFs {
    fn exists(&self, path: &Path) -> bool {
        fs::symlink_metadata(path).is_ok()
    }

    fn is_dir(&self, path: &Path) -> bool {
        fs::metadata(path).map(|m| m.is_dir()).unwrap_or(false)
    }

    fn is_symlink(&self, path: &Path) -> bool {
        fs::symlink_metadata(path)
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false)
    }

    fn stat(&self, path: &Path) -> Result<Triple> {
        let meta = fs::metadata(path).map_err(|e| {
            GuardError::io("stat", "read metadata", "", path.display().to_string(), e)
        })?;
        let mode = meta.permissions().mode() & 0o777;
        let owner = User::from_uid(Uid::from_raw(meta.uid()))
            .ok()
            .flatten()
            .map(|u| u.name)
            .unwrap_or_default();
        let group = Group::from_gid(Gid::from_raw(meta.gid()))
            .ok()
            .flatten()
            .map(|g| g.name)
            .unwrap_or_default();
        Ok(Triple {
            mode: format!("{mode:04o}"),
            owner,
            group,
        })
    }

    fn chmod(&self, path: &Path, mode: &str) -> Result<()> {
        let bits = Self::mode_bits(mode)?;
        fs::set_permissions(path, fs::Permissions::from_mode(bits)).map_err(|e| {
            GuardError::io(
                "apply triple",
                "chmod",
                mode,
                path.display().to_string(),
                e,
            )
        })
    }

    fn chown(&self, path: &Path, owner: &str) -> Result<()> {
        let uid = User::from_name(owner)
            .map_err(|e| {
                GuardError::io(
                    "apply triple",
                    "chown",
                    owner,
                    path.display().to_string(),
                    e,
                )
            })?
            .ok_or_else(|| {
                GuardError::io(
                    "apply triple",
                    "chown",
                    owner,
                    path.display().to_string(),
                    "no such user",
                )
            })?
            .uid;
        chown(path, Some(uid), None).map_err(|e| {
            GuardError::io(
                "apply triple",
                "chown",
                owner,
                path.display().to_string(),
                e,
            )
        })
    }

    fn chgrp(&self, path: &Path, group: &str) -> Result<()> {
        let gid = Group::from_name(group)
            .map_err(|e| {
                GuardError::io(
                    "apply triple",
                    "chgrp",
                    group,
                    path.display().to_string(),
                    e,
                )
            })?
            .ok_or_else(|| {
                GuardError::io(
                    "apply triple",
                    "chgrp",
                    group,
                    path.display().to_string(),
                    "no such group",
                )
            })?
            .gid;
        chown(path, None, Some(gid)).map_err(|e| {
            GuardError::io(
                "apply triple",
                "chgrp",
                group,
                path.display().to_string(),
                e,
            )
        })
    }

    fn apply_triple(&self, path: &Path, triple: &Triple) -> Result<()> {
        self.chmod(path, &triple.mode)?;
        if !triple.owner.is_empty() {
            self.chown(path, &triple.owner)?;
        }
        if !triple.group.is_empty() {
            self.chgrp(path, &triple.group)?;
        }
        Ok(())
    }

    fn read_dir_sorted(&self, path: &Path) -> Result<Vec<ScannedEntry>> {
        let mut entries = Vec::new();
        let iter = fs::read_dir(path).map_err(|e| {
            GuardError::io(
                "scan directory",
                "read_dir",
                "",
                path.display().to_string(),
                e,
            )
        })?;
        for entry in iter {
            let entry = entry.map_err(|e| {
                GuardError::io(
                    "scan directory",
                    "read_dir entry",
                    "",
                    path.display().to_string(),
                    e,
                )
            })?;
            let meta = entry.path();
            let sym = self.is_symlink(&meta);
            let is_dir = !sym && self.is_dir(&meta);
            let resolved_target_dir_if_symlink = if sym {
                fs::canonicalize(&meta)
                    .ok()
                    .filter(|target| self.is_dir(target))
            } else {
                None
            };
            entries.push(ScannedEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                path: meta,
                is_dir,
                is_symlink: sym,
                resolved_target_dir_if_symlink,
            });
        }
        // directories first, then case-sensitive ascending by name
        entries.sort_by(|a, b| match (a.is_dir, b.is_dir) {
            (true, false) => std::cmp::Ordering::Less,
            (false, true) => std::cmp::Ordering::Greater,
            _ => a.name.cmp(&b.name),
        });
        Ok(entries)
    }

    fn collect_immediate_files(&self, path: &Path) -> Result<Vec<PathBuf>> {
        Ok(self
            .read_dir_sorted(path)?
            .into_iter()
            .filter(|e| !e.is_dir && !e.is_symlink)
            .map(|e| e.path)
            .collect())
    }

    fn collect_recursive_files(&self, path: &Path) -> Result<Vec<PathBuf>> {
        // WalkDir does its own directory-order traversal; re-sort explicitly
        // so the result matches the deterministic order §4.1 requires
        // rather than whatever order the OS or WalkDir's internal queue
        // happens to yield.
        let mut files = Vec::new();
        for entry in walkdir::WalkDir::new(path).follow_links(false) {
            let entry = entry.map_err(|e| {
                GuardError::io(
                    "scan directory",
                    "walk",
                    "",
                    path.display().to_string(),
                    e,
                )
            })?;
            if entry.path_is_symlink() {
                continue;
            }
            if entry.file_type().is_file() {
                files.push(entry.into_path());
            }
        }
        files.sort();
        Ok(files)
    }

    fn has_root_privileges(&self) -> bool {
        Uid::effective().is_root()
    }

    fn set_immutable(&self, path: &Path) -> Result<ImmutableOutcome> {
        immutable::set_immutable(path, self.has_root_privileges())
    }

    fn clear_immutable(&self, path: &Path) -> Result<ImmutableOutcome> {
        immutable::clear_immutable(path, self.has_root_privileges())
    }

    fn is_immutable(&self, path: &Path) -> Result<bool> {
        immutable::is_immutable(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn apply_triple_chmods_before_chown() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.txt");
        fs::write(&file, b"hi").unwrap();
        let adapter = PosixFs::new();
        let triple = Triple {
            mode: "0640".to_string(),
            owner: String::new(),
            group: String::new(),
        };
        adapter.apply_triple(&file, &triple).unwrap();
        let mode = fs::metadata(&file).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o640);
    }

    // Directories first, then case-sensitive ascending by name.
    #[test]
    fn read_dir_sorted_orders_dirs_before_files_then_by_name() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("b.txt"), b"").unwrap();
        fs::write(dir.path().join("a.txt"), b"").unwrap();
        fs::create_dir(dir.path().join("zdir")).unwrap();
        fs::create_dir(dir.path().join("adir")).unwrap();

        let adapter = PosixFs::new();
        let entries = adapter.read_dir_sorted(dir.path()).unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["adir", "zdir", "a.txt", "b.txt"]);
    }

    #[test]
    fn collect_immediate_files_skips_symlinks_and_subdirs() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("real.txt"), b"hi").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        std::os::unix::fs::symlink(
            dir.path().join("real.txt"),
            dir.path().join("link.txt"),
        )
        .unwrap();

        let adapter = PosixFs::new();
        let files = adapter.collect_immediate_files(dir.path()).unwrap();
        assert_eq!(files, vec![dir.path().join("real.txt")]);
    }

    #[test]
    fn collect_recursive_files_skips_symlinks() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/real.txt"), b"hi").unwrap();
        std::os::unix::fs::symlink(
            dir.path().join("sub/real.txt"),
            dir.path().join("sub/link.txt"),
        )
        .unwrap();

        let adapter = PosixFs::new();
        let files = adapter.collect_recursive_files(dir.path()).unwrap();
        assert_eq!(files, vec![dir.path().join("sub/real.txt")]);
    }
}
