//! The security wrapper: the only interface the engine uses to reach the
//! registry and the filesystem. Every path/name argument is validated here
//! before it reaches either; every mutation is refused if its target is
//! currently a symlink on disk, even if it was registered before becoming one.

use std::path::Path;

use crate::error::Result;
use crate::fsops::FilesystemAdapter;
use crate::path::{PathValidator, ValidatedPath};
use crate::registry::Registry;

pub struct SecurityWrapper<'a> {
    pub registry: &'a mut Registry,
    pub fs: &'a dyn FilesystemAdapter,
}

impl<'a> SecurityWrapper<'a> {
    pub fn new(registry: &'a mut Registry, fs: &'a dyn FilesystemAdapter) -> Self {
        SecurityWrapper { registry, fs }
    }

    fn validator(&self) -> PathValidator<'_> {
        PathValidator::new(self.registry.root())
    }

    /// Validate a raw path argument into the registry's normalized form.
    pub fn validate_path(&self, input: &str) -> Result<ValidatedPath> {
        self.validator().validate(input)
    }

    /// Normalize without requiring existence (for paths that may not yet be
    /// on disk, e.g. a collection member whose file was deleted).
    pub fn normalize_path(&self, input: &str) -> Result<String> {
        self.validator().normalize(input)
    }

    pub fn validate_collection_name(&self, input: &str) -> Result<String> {
        self.validator().validate_collection_name(input)
    }

    /// Pure boolean: validation errors are silently coerced to "not
    /// registered" so callers can use this in simple conditionals.
    pub fn is_registered_file(&self, input: &str) -> bool {
        match self.normalize_path(input) {
            Ok(normalized) => self.registry.is_file_registered(&normalized),
            Err(_) => false,
        }
    }

    /// Refuse any mutation whose target is currently a symlink on disk, even
    /// if it was registered (as a regular file) before becoming one.
    pub fn reject_symlink_mutation(&self, path: &Path) -> Result<()> {
        if self.fs.is_symlink(path) {
            return Err(crate::error::GuardError::validation(
                "path",
                path.display().to_string(),
                "is a symlink",
            ));
        }
        Ok(())
    }

    pub fn resolve(&self, path: &ValidatedPath) -> std::path::PathBuf {
        path.resolve(self.registry.root())
    }
}
