//! Path normalization and validation.
//!
//! A [`ValidatedPath`] is the only form a path takes once it has passed
//! [`PathValidator::validate`]: root-relative, `/`-separated, free of `.`/`..`
//! components, and confirmed (at validation time) not to be a symlink.

use std::fmt::Display;
use std::path::{Component, Path, PathBuf};

use crate::error::{GuardError, Result};

/// Collection/entity names that would shadow a CLI verb.
pub const RESERVED_NAMES: &[&str] = &[
    "to", "from", "add", "remove", "file", "collection", "create", "destroy", "clear", "update",
    "uninstall",
];

/// A path, normalized relative to the registry root, validated not to escape
/// that root and not to be a symlink at the time of validation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ValidatedPath(String);

impl ValidatedPath {
    /// Wrap an already-normalized string without re-validating. Used when
    /// reconstructing entries loaded from a manifest that was itself
    /// validated at `save` time.
    pub fn from_normalized(path: impl Into<String>) -> Self {
        ValidatedPath(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn resolve(&self, root: &Path) -> PathBuf {
        root.join(&self.0)
    }
}

impl Display for ValidatedPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ValidatedPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

pub struct PathValidator<'a> {
    root: &'a Path,
}

impl<'a> PathValidator<'a> {
    pub fn new(root: &'a Path) -> Self {
        PathValidator { root }
    }

    /// Normalize `input` relative to the root and confirm it does not escape
    /// the root, is not empty, and is not currently a symlink on disk.
    pub fn validate(&self, input: &str) -> Result<ValidatedPath> {
        let normalized = self.normalize(input)?;
        let full = self.root.join(&normalized);
        if let Ok(meta) = std::fs::symlink_metadata(&full) {
            if meta.file_type().is_symlink() {
                return Err(GuardError::validation("path", input, "is a symlink"));
            }
        }
        Ok(ValidatedPath(normalized))
    }

    /// Normalize `input` relative to the root. Does not require the path to
    /// exist; used both by `validate` and anywhere only the normal form
    /// (not the symlink check) is needed, e.g. before a registry lookup.
    pub fn normalize(&self, input: &str) -> Result<String> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(GuardError::validation("path", input, "empty"));
        }

        let path = Path::new(trimmed);
        let mut normalized = PathBuf::new();
        for component in path.components() {
            match component {
                Component::Normal(part) => normalized.push(part),
                Component::CurDir => {}
                Component::ParentDir => {
                    if !normalized.pop() {
                        return Err(GuardError::validation(
                            "path",
                            input,
                            "escapes the registry root",
                        ));
                    }
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(GuardError::validation(
                        "path",
                        input,
                        "escapes the registry root",
                    ));
                }
            }
        }

        if normalized.as_os_str().is_empty() {
            return Err(GuardError::validation("path", input, "empty"));
        }

        Ok(normalized.to_string_lossy().replace('\\', "/"))
    }

    /// Validate a collection name: non-empty, not a reserved verb.
    pub fn validate_collection_name(&self, name: &str) -> Result<String> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(GuardError::validation("name", name, "empty"));
        }
        if RESERVED_NAMES.contains(&trimmed) {
            return Err(GuardError::validation(
                "name",
                name,
                "reserved collection name",
            ));
        }
        Ok(trimmed.to_owned())
    }
}

/// Normalize a 4-octal-digit mode string, rejecting anything that isn't a
/// valid octal value in 0000-0777. Special bits (setuid/setgid/sticky) are
/// discarded per the registry's config semantics.
pub fn normalize_mode(input: &str) -> Result<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(GuardError::validation("mode", input, "empty"));
    }
    let value = u32::from_str_radix(trimmed, 8)
        .map_err(|_| GuardError::validation("mode", input, "invalid octal"))?;
    if value > 0o777 {
        return Err(GuardError::validation(
            "mode",
            input,
            "out of range (must be <= 0777)",
        ));
    }
    Ok(format!("{value:04o}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_dot_prefix() {
        let root = Path::new("/tmp/nonexistent-root-for-test");
        let v = PathValidator::new(root);
        assert_eq!(v.normalize("./a/b").unwrap(), "a/b");
        assert_eq!(v.normalize("a/./b").unwrap(), "a/b");
    }

    #[test]
    fn rejects_escaping_root() {
        let root = Path::new("/tmp/nonexistent-root-for-test");
        let v = PathValidator::new(root);
        assert!(v.normalize("../escape").is_err());
        assert!(v.normalize("a/../../escape").is_err());
        assert!(v.normalize("/abs/path").is_err());
    }

    #[test]
    fn rejects_empty() {
        let root = Path::new("/tmp/nonexistent-root-for-test");
        let v = PathValidator::new(root);
        assert!(v.normalize("").is_err());
        assert!(v.normalize("   ").is_err());
        assert!(v.normalize(".").is_err());
    }

    #[test]
    fn reserved_names_rejected() {
        let root = Path::new("/tmp/nonexistent-root-for-test");
        let v = PathValidator::new(root);
        for name in RESERVED_NAMES {
            assert!(v.validate_collection_name(name).is_err());
        }
        assert!(v.validate_collection_name("teamA").is_ok());
    }

    #[test]
    fn mode_parsing_boundaries() {
        assert_eq!(normalize_mode("000").unwrap(), "0000");
        assert_eq!(normalize_mode("777").unwrap(), "0777");
        assert_eq!(normalize_mode("0777").unwrap(), "0777");
        assert!(normalize_mode("888").is_err());
        assert!(normalize_mode("07777").is_err());
        assert!(normalize_mode("abc").is_err());
        assert!(normalize_mode("").is_err());
    }
}
