//! The persisted registry: config, files, collections, folders, and the
//! atomic save/load cycle. This module owns validation of invariants I1-I7
//! from the data model and the in-memory indices the engine and resolver
//! query; it does not touch the filesystem beyond the manifest file itself.

pub mod manifest;

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use log::info;

use crate::error::{EntityKind, GuardError, Result};
use crate::fsops::Triple;
use crate::path::{PathValidator, ValidatedPath};
use manifest::{
    ManifestCollection, ManifestConfig, ManifestDoc, ManifestFile, ManifestFolder,
    ManifestLastToggle,
};

pub const MANIFEST_FILE_NAME: &str = ".guardfile";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleKind {
    File,
    Collection,
}

impl ToggleKind {
    fn as_str(&self) -> &'static str {
        match self {
            ToggleKind::File => "file",
            ToggleKind::Collection => "collection",
        }
    }

    fn parse(s: &str) -> Result<Self> {
        match s {
            "file" => Ok(ToggleKind::File),
            "collection" => Ok(ToggleKind::Collection),
            other => Err(GuardError::Corruption {
                path: String::new(),
                reason: format!("invalid last_toggle type '{other}'"),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LastToggle {
    pub name: String,
    pub kind: ToggleKind,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub default_mode: String,
    pub default_owner: String,
    pub default_group: String,
    pub last_toggle: Option<LastToggle>,
}

#[derive(Debug, Clone)]
pub struct FileEntry {
    pub path: ValidatedPath,
    pub original_mode: String,
    pub original_owner: String,
    pub original_group: String,
    pub guard: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Collection {
    pub name: String,
    pub files: Vec<String>,
    pub guard: bool,
    pub override_mode: Option<String>,
    pub override_owner: Option<String>,
    pub override_group: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Folder {
    pub name: String,
    pub path: String,
    pub guard: bool,
}

/// Turn a folder's directory path into its synthetic `@<relpath>` name.
pub fn folder_name_for(path: &str) -> String {
    format!("@{path}")
}

pub struct Registry {
    root: PathBuf,
    manifest_path: PathBuf,
    config: Config,
    files: BTreeMap<String, FileEntry>,
    file_order: Vec<String>,
    collections: BTreeMap<String, Collection>,
    collection_order: Vec<String>,
    folders: BTreeMap<String, Folder>,
    folder_order: Vec<String>,
}

impl Registry {
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    /// Create a brand-new, empty registry backed by `manifest_path`. Fails if
    /// the manifest already exists and `overwrite` is false.
    pub fn new(
        root: PathBuf,
        manifest_path: PathBuf,
        default_mode: String,
        default_owner: String,
        default_group: String,
        overwrite: bool,
    ) -> Result<Self> {
        if manifest_path.exists() && !overwrite {
            return Err(GuardError::validation(
                "manifest",
                manifest_path.display().to_string(),
                "already exists",
            ));
        }
        Ok(Registry {
            root,
            manifest_path,
            config: Config {
                default_mode,
                default_owner,
                default_group,
                last_toggle: None,
            },
            files: BTreeMap::new(),
            file_order: Vec::new(),
            collections: BTreeMap::new(),
            collection_order: Vec::new(),
            folders: BTreeMap::new(),
            folder_order: Vec::new(),
        })
    }

    /// Load an existing manifest from disk, re-validating invariants I1-I5.
    pub fn load(root: PathBuf, manifest_path: PathBuf) -> Result<Self> {
        let text = fs::read_to_string(&manifest_path).map_err(|e| GuardError::Corruption {
            path: manifest_path.display().to_string(),
            reason: format!("failed to read manifest: {e}"),
        })?;
        let doc: ManifestDoc =
            serde_yaml::from_str(&text).map_err(|e| GuardError::Corruption {
                path: manifest_path.display().to_string(),
                reason: format!("failed to parse manifest: {e}"),
            })?;
        Self::from_manifest(root, manifest_path, doc)
    }

    fn from_manifest(root: PathBuf, manifest_path: PathBuf, doc: ManifestDoc) -> Result<Self> {
        let corrupt = |reason: String| GuardError::Corruption {
            path: manifest_path.display().to_string(),
            reason,
        };

        // I2: default_mode parses as octal <= 0777.
        let default_mode = crate::path::normalize_mode(&doc.config.guard_mode)
            .map_err(|_| corrupt(format!("invalid config mode '{}'", doc.config.guard_mode)))?;

        let last_toggle = match doc.config.last_toggle {
            None => None,
            Some(ManifestLastToggle { name, kind }) => {
                // I5: both fields non-empty, kind in the enumeration.
                if name.trim().is_empty() {
                    return Err(corrupt("last_toggle name is empty".into()));
                }
                let kind = ToggleKind::parse(&kind).map_err(|_| {
                    corrupt(format!("last_toggle type '{kind}' is not file|collection"))
                })?;
                Some(LastToggle { name, kind })
            }
        };

        let config = Config {
            default_mode,
            default_owner: doc.config.guard_owner,
            default_group: doc.config.guard_group,
            last_toggle,
        };

        let mut files = BTreeMap::new();
        let mut file_order = Vec::new();
        for f in doc.files {
            // I4: FileEntry keys are unique normalized paths.
            if files.contains_key(&f.path) {
                return Err(corrupt(format!("duplicate file entry '{}'", f.path)));
            }
            let mode = crate::path::normalize_mode(&f.mode)
                .map_err(|_| corrupt(format!("invalid mode '{}' for file '{}'", f.mode, f.path)))?;
            file_order.push(f.path.clone());
            files.insert(
                f.path.clone(),
                FileEntry {
                    path: ValidatedPath::from_normalized(f.path),
                    original_mode: mode,
                    original_owner: f.owner,
                    original_group: f.group,
                    guard: f.guard,
                },
            );
        }

        let mut collections = BTreeMap::new();
        let mut collection_order = Vec::new();
        let mut seen_names = std::collections::HashSet::new();
        for c in doc.collections {
            // I3: collection names unique, non-empty, not reserved.
            if c.name.trim().is_empty() {
                return Err(corrupt("collection with empty name".into()));
            }
            if crate::path::RESERVED_NAMES.contains(&c.name.as_str()) {
                return Err(corrupt(format!("collection name '{}' is reserved", c.name)));
            }
            if !seen_names.insert(c.name.clone()) {
                return Err(corrupt(format!("duplicate collection name '{}'", c.name)));
            }
            // I1: every path in a collection's file list is also a FileEntry.
            for path in &c.files {
                if !files.contains_key(path) {
                    return Err(corrupt(format!(
                        "collection '{}' references unregistered file '{}'",
                        c.name, path
                    )));
                }
            }
            collection_order.push(c.name.clone());
            collections.insert(
                c.name.clone(),
                Collection {
                    name: c.name,
                    files: c.files,
                    guard: c.guard,
                    override_mode: c.guard_mode,
                    override_owner: c.guard_owner,
                    override_group: c.guard_group,
                },
            );
        }

        let mut folders = BTreeMap::new();
        let mut folder_order = Vec::new();
        for f in doc.folders {
            folder_order.push(f.name.clone());
            folders.insert(
                f.name.clone(),
                Folder {
                    name: f.name,
                    path: f.path,
                    guard: f.guard,
                },
            );
        }

        Ok(Registry {
            root,
            manifest_path,
            config,
            files,
            file_order,
            collections,
            collection_order,
            folders,
            folder_order,
        })
    }

    fn to_manifest(&self) -> ManifestDoc {
        ManifestDoc {
            config: ManifestConfig {
                guard_mode: self.config.default_mode.clone(),
                guard_owner: self.config.default_owner.clone(),
                guard_group: self.config.default_group.clone(),
                last_toggle: self.config.last_toggle.as_ref().map(|t| ManifestLastToggle {
                    name: t.name.clone(),
                    kind: t.kind.as_str().to_owned(),
                }),
            },
            files: self
                .file_order
                .iter()
                .map(|p| {
                    let e = &self.files[p];
                    ManifestFile {
                        path: e.path.as_str().to_owned(),
                        mode: e.original_mode.clone(),
                        owner: e.original_owner.clone(),
                        group: e.original_group.clone(),
                        guard: e.guard,
                    }
                })
                .collect(),
            collections: self
                .collection_order
                .iter()
                .map(|n| {
                    let c = &self.collections[n];
                    ManifestCollection {
                        name: c.name.clone(),
                        files: c.files.clone(),
                        guard: c.guard,
                        guard_mode: c.override_mode.clone(),
                        guard_owner: c.override_owner.clone(),
                        guard_group: c.override_group.clone(),
                    }
                })
                .collect(),
            folders: self
                .folder_order
                .iter()
                .map(|n| {
                    let f = &self.folders[n];
                    ManifestFolder {
                        name: f.name.clone(),
                        path: f.path.clone(),
                        guard: f.guard,
                    }
                })
                .collect(),
        }
    }

    /// Validate invariants I1-I5 against the current in-memory state. Called
    /// before every `save`.
    fn validate_invariants(&self) -> Result<()> {
        for (name, collection) in &self.collections {
            for path in &collection.files {
                if !self.files.contains_key(path) {
                    return Err(GuardError::Corruption {
                        path: self.manifest_path.display().to_string(),
                        reason: format!(
                            "collection '{name}' references unregistered file '{path}'"
                        ),
                    });
                }
            }
        }
        crate::path::normalize_mode(&self.config.default_mode).map_err(|_| {
            GuardError::Corruption {
                path: self.manifest_path.display().to_string(),
                reason: format!("invalid config mode '{}'", self.config.default_mode),
            }
        })?;
        Ok(())
    }

    /// Atomically write the manifest: validate, marshal to a temp file in the
    /// same directory, fsync, rename over the target.
    pub fn save(&self) -> Result<()> {
        self.validate_invariants()?;
        let doc = self.to_manifest();
        let yaml = serde_yaml::to_string(&doc).map_err(|e| {
            GuardError::Corruption {
                path: self.manifest_path.display().to_string(),
                reason: format!("failed to serialize manifest: {e}"),
            }
        })?;

        let dir = self
            .manifest_path
            .parent()
            .unwrap_or_else(|| Path::new("."));
        let tmp_path = dir.join(format!(
            ".guardfile.tmp-{}",
            std::process::id()
        ));

        let write_result = (|| -> Result<()> {
            let mut file = File::create(&tmp_path).map_err(|e| {
                GuardError::io(
                    "save manifest",
                    "create temp file",
                    "",
                    tmp_path.display().to_string(),
                    e,
                )
            })?;
            use std::io::Write;
            file.write_all(yaml.as_bytes()).map_err(|e| {
                GuardError::io(
                    "save manifest",
                    "write temp file",
                    "",
                    tmp_path.display().to_string(),
                    e,
                )
            })?;
            file.sync_all().map_err(|e| {
                GuardError::io(
                    "save manifest",
                    "fsync temp file",
                    "",
                    tmp_path.display().to_string(),
                    e,
                )
            })?;
            Ok(())
        })();

        if let Err(err) = write_result {
            let _ = fs::remove_file(&tmp_path);
            return Err(err);
        }

        if let Err(e) = fs::rename(&tmp_path, &self.manifest_path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(GuardError::io(
                "save manifest",
                "rename",
                "",
                self.manifest_path.display().to_string(),
                e,
            ));
        }

        info!("saved manifest to '{}'", self.manifest_path.display());
        Ok(())
    }

    /// Delete the manifest file. Used by `uninstall` after verification.
    pub fn delete_manifest_file(&self) -> Result<()> {
        fs::remove_file(&self.manifest_path).map_err(|e| {
            GuardError::io(
                "uninstall",
                "remove manifest",
                "",
                self.manifest_path.display().to_string(),
                e,
            )
        })
    }

    // ---- config ----

    pub fn get_config(&self) -> &Config {
        &self.config
    }

    pub fn set_config(&mut self, mode: Option<String>, owner: Option<String>, group: Option<String>) {
        if let Some(m) = mode {
            self.config.default_mode = m;
        }
        if let Some(o) = owner {
            self.config.default_owner = o;
        }
        if let Some(g) = group {
            self.config.default_group = g;
        }
    }

    // ---- last toggle (advisory only, never consulted for correctness) ----

    pub fn get_last_toggle(&self) -> Option<&LastToggle> {
        self.config.last_toggle.as_ref()
    }

    pub fn set_last_toggle(&mut self, name: String, kind: ToggleKind) {
        self.config.last_toggle = Some(LastToggle { name, kind });
    }

    pub fn clear_last_toggle(&mut self) {
        self.config.last_toggle = None;
    }

    // ---- files ----

    pub fn is_file_registered(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    pub fn get_file(&self, path: &str) -> Option<&FileEntry> {
        self.files.get(path)
    }

    pub fn get_file_mut(&mut self, path: &str) -> Option<&mut FileEntry> {
        self.files.get_mut(path)
    }

    pub fn list_files(&self) -> Vec<&FileEntry> {
        self.file_order.iter().filter_map(|p| self.files.get(p)).collect()
    }

    pub fn register_file(&mut self, path: ValidatedPath, triple: Triple) -> Result<()> {
        let key = path.as_str().to_owned();
        if self.files.contains_key(&key) {
            return Err(GuardError::AlreadyExists {
                kind: EntityKind::File,
                name: key,
            });
        }
        self.file_order.push(key.clone());
        self.files.insert(
            key,
            FileEntry {
                path,
                original_mode: triple.mode,
                original_owner: triple.owner,
                original_group: triple.group,
                guard: false,
            },
        );
        Ok(())
    }

    /// Remove a FileEntry and scrub it from every collection's file list
    /// atomically (both updates happen, or neither does - there is no
    /// fallible step between them).
    pub fn unregister_file(&mut self, path: &str, ignore_missing: bool) -> Result<()> {
        if self.files.remove(path).is_none() {
            if ignore_missing {
                return Ok(());
            }
            return Err(GuardError::NotFound {
                kind: EntityKind::File,
                name: path.to_owned(),
            });
        }
        self.file_order.retain(|p| p != path);
        for collection in self.collections.values_mut() {
            collection.files.retain(|p| p != path);
        }
        Ok(())
    }

    pub fn remove_file_from_all_collections(&mut self, path: &str) {
        for collection in self.collections.values_mut() {
            collection.files.retain(|p| p != path);
        }
    }

    // ---- collections ----

    pub fn is_collection_registered(&self, name: &str) -> bool {
        self.collections.contains_key(name)
    }

    pub fn get_collection(&self, name: &str) -> Option<&Collection> {
        self.collections.get(name)
    }

    pub fn get_collection_mut(&mut self, name: &str) -> Option<&mut Collection> {
        self.collections.get_mut(name)
    }

    pub fn list_collections(&self) -> Vec<&Collection> {
        self.collection_order
            .iter()
            .filter_map(|n| self.collections.get(n))
            .collect()
    }

    pub fn register_collection(&mut self, name: String) -> Result<()> {
        if self.collections.contains_key(&name) {
            return Err(GuardError::AlreadyExists {
                kind: EntityKind::Collection,
                name,
            });
        }
        self.collection_order.push(name.clone());
        self.collections.insert(
            name.clone(),
            Collection {
                name,
                files: Vec::new(),
                guard: false,
                override_mode: None,
                override_owner: None,
                override_group: None,
            },
        );
        Ok(())
    }

    pub fn unregister_collection(&mut self, name: &str) -> Result<()> {
        if self.collections.remove(name).is_none() {
            return Err(GuardError::NotFound {
                kind: EntityKind::Collection,
                name: name.to_owned(),
            });
        }
        self.collection_order.retain(|n| n != name);
        Ok(())
    }

    pub fn list_files_in_collection(&self, name: &str) -> Result<&[String]> {
        self.collections
            .get(name)
            .map(|c| c.files.as_slice())
            .ok_or_else(|| GuardError::NotFound {
                kind: EntityKind::Collection,
                name: name.to_owned(),
            })
    }

    pub fn count_files_in_collection(&self, name: &str) -> usize {
        self.collections.get(name).map(|c| c.files.len()).unwrap_or(0)
    }

    /// Add files (already registered as FileEntries) to every named
    /// collection, preserving order and uniqueness.
    pub fn add_files_to_collections(&mut self, collections: &[String], files: &[String]) -> Result<()> {
        for name in collections {
            let collection = self.collections.get_mut(name).ok_or_else(|| GuardError::NotFound {
                kind: EntityKind::Collection,
                name: name.clone(),
            })?;
            for f in files {
                if !collection.files.contains(f) {
                    collection.files.push(f.clone());
                }
            }
        }
        Ok(())
    }

    pub fn remove_files_from_collections(&mut self, collections: &[String], files: &[String]) -> Result<()> {
        for name in collections {
            let collection = self.collections.get_mut(name).ok_or_else(|| GuardError::NotFound {
                kind: EntityKind::Collection,
                name: name.clone(),
            })?;
            collection.files.retain(|p| !files.contains(p));
        }
        Ok(())
    }

    pub fn collection_raw_mode(&self, name: &str) -> Option<String> {
        self.collections.get(name).and_then(|c| c.override_mode.clone())
    }

    pub fn collection_raw_owner(&self, name: &str) -> Option<String> {
        self.collections.get(name).and_then(|c| c.override_owner.clone())
    }

    pub fn collection_raw_group(&self, name: &str) -> Option<String> {
        self.collections.get(name).and_then(|c| c.override_group.clone())
    }

    pub fn collection_effective_mode(&self, name: &str) -> String {
        self.collection_raw_mode(name)
            .unwrap_or_else(|| self.config.default_mode.clone())
    }

    pub fn collection_effective_owner(&self, name: &str) -> String {
        self.collection_raw_owner(name)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| self.config.default_owner.clone())
    }

    pub fn collection_effective_group(&self, name: &str) -> String {
        self.collection_raw_group(name)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| self.config.default_group.clone())
    }

    // ---- folders ----

    pub fn is_folder_registered(&self, name: &str) -> bool {
        self.folders.contains_key(name)
    }

    pub fn get_folder(&self, name: &str) -> Option<&Folder> {
        self.folders.get(name)
    }

    pub fn get_folder_mut(&mut self, name: &str) -> Option<&mut Folder> {
        self.folders.get_mut(name)
    }

    pub fn get_folder_by_path(&self, path: &str) -> Option<&Folder> {
        self.folders.values().find(|f| f.path == path)
    }

    pub fn list_folders(&self) -> Vec<&Folder> {
        self.folder_order.iter().filter_map(|n| self.folders.get(n)).collect()
    }

    pub fn register_folder(&mut self, name: String, path: String) -> Result<()> {
        if self.folders.contains_key(&name) {
            return Err(GuardError::AlreadyExists {
                kind: EntityKind::Folder,
                name,
            });
        }
        self.folder_order.push(name.clone());
        self.folders.insert(
            name.clone(),
            Folder {
                name,
                path,
                guard: false,
            },
        );
        Ok(())
    }

    pub fn unregister_folder(&mut self, name: &str) -> Result<()> {
        if self.folders.remove(name).is_none() {
            return Err(GuardError::NotFound {
                kind: EntityKind::Folder,
                name: name.to_owned(),
            });
        }
        self.folder_order.retain(|n| n != name);
        Ok(())
    }

    // ---- maintenance helpers ----

    /// Remove FileEntries whose path does not exist on disk, and collections
    /// whose file list is empty. Returns (files_removed, collections_removed).
    pub fn cleanup(&mut self, exists: impl Fn(&Path) -> bool) -> (Vec<String>, Vec<String>) {
        let mut removed_files = Vec::new();
        for path in self.file_order.clone() {
            let full = self.root.join(&path);
            if !exists(&full) {
                self.files.remove(&path);
                self.remove_file_from_all_collections(&path);
                removed_files.push(path);
            }
        }
        self.file_order.retain(|p| !removed_files.contains(p));

        let mut removed_collections = Vec::new();
        for name in self.collection_order.clone() {
            if let Some(c) = self.collections.get(&name) {
                if c.files.is_empty() {
                    self.collections.remove(&name);
                    removed_collections.push(name);
                }
            }
        }
        self.collection_order.retain(|n| !removed_collections.contains(n));

        (removed_files, removed_collections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fsops::Triple;
    use tempfile::TempDir;

    fn triple(mode: &str) -> Triple {
        Triple {
            mode: mode.to_string(),
            owner: String::new(),
            group: String::new(),
        }
    }

    // P1: save(load(M)) is logically equal to M.
    #[test]
    fn save_load_round_trip_preserves_entities() {
        let dir = TempDir::new().unwrap();
        let manifest_path = dir.path().join(".guardfile");
        let mut registry = Registry::new(
            dir.path().to_path_buf(),
            manifest_path.clone(),
            "0644".to_string(),
            "alice".to_string(),
            String::new(),
            false,
        )
        .unwrap();

        registry
            .register_file(ValidatedPath::from_normalized("a.txt"), triple("0644"))
            .unwrap();
        registry
            .register_file(ValidatedPath::from_normalized("b.txt"), triple("0640"))
            .unwrap();
        registry.register_collection("teamA".to_string()).unwrap();
        registry
            .add_files_to_collections(&["teamA".to_string()], &["a.txt".to_string()])
            .unwrap();
        registry.get_file_mut("a.txt").unwrap().guard = true;
        registry.set_last_toggle("a.txt".to_string(), ToggleKind::File);
        registry.save().unwrap();

        let reloaded = Registry::load(dir.path().to_path_buf(), manifest_path).unwrap();
        assert_eq!(reloaded.list_files().len(), 2);
        assert_eq!(
            reloaded.get_file("a.txt").unwrap().original_mode,
            "0644"
        );
        assert!(reloaded.get_file("a.txt").unwrap().guard);
        assert_eq!(reloaded.list_collections().len(), 1);
        assert_eq!(
            reloaded.list_files_in_collection("teamA").unwrap(),
            &["a.txt".to_string()]
        );
        assert_eq!(reloaded.get_config().default_owner, "alice");
        assert_eq!(
            reloaded.get_last_toggle().unwrap().name,
            "a.txt".to_string()
        );
    }

    #[test]
    fn new_refuses_to_overwrite_existing_manifest() {
        let dir = TempDir::new().unwrap();
        let manifest_path = dir.path().join(".guardfile");
        std::fs::write(&manifest_path, "config:\n  guard_mode: \"0644\"\n").unwrap();
        let err = Registry::new(
            dir.path().to_path_buf(),
            manifest_path,
            "0644".to_string(),
            String::new(),
            String::new(),
            false,
        )
        .unwrap_err();
        assert!(matches!(err, GuardError::Validation { .. }));
    }

    // I1: a collection referencing an unregistered file is corruption on load.
    #[test]
    fn load_rejects_collection_referencing_unknown_file() {
        let dir = TempDir::new().unwrap();
        let manifest_path = dir.path().join(".guardfile");
        let yaml = "config:\n  guard_mode: \"0644\"\n\
files: []\n\
collections:\n  - name: teamA\n    files: [\"ghost.txt\"]\n    guard: false\n\
folders: []\n";
        std::fs::write(&manifest_path, yaml).unwrap();
        let err = Registry::load(dir.path().to_path_buf(), manifest_path).unwrap_err();
        assert!(matches!(err, GuardError::Corruption { .. }));
    }

    // I3: reserved verbs are rejected the same way at load time.
    #[test]
    fn load_rejects_reserved_collection_name() {
        let dir = TempDir::new().unwrap();
        let manifest_path = dir.path().join(".guardfile");
        let yaml = "config:\n  guard_mode: \"0644\"\n\
files: []\n\
collections:\n  - name: \"create\"\n    files: []\n    guard: false\n\
folders: []\n";
        std::fs::write(&manifest_path, yaml).unwrap();
        let err = Registry::load(dir.path().to_path_buf(), manifest_path).unwrap_err();
        assert!(matches!(err, GuardError::Corruption { .. }));
    }

    // S6: corrupt manifest bytes fail to load with CorruptionError.
    #[test]
    fn load_rejects_unparseable_manifest() {
        let dir = TempDir::new().unwrap();
        let manifest_path = dir.path().join(".guardfile");
        std::fs::write(&manifest_path, b"not: [valid, yaml: at all}}}").unwrap();
        let err = Registry::load(dir.path().to_path_buf(), manifest_path).unwrap_err();
        assert!(matches!(err, GuardError::Corruption { .. }));
    }

    // P6: after unregister_file(p), p appears in no collection's file list.
    #[test]
    fn unregister_file_scrubs_every_collection() {
        let dir = TempDir::new().unwrap();
        let mut registry = Registry::new(
            dir.path().to_path_buf(),
            dir.path().join(".guardfile"),
            "0644".to_string(),
            String::new(),
            String::new(),
            false,
        )
        .unwrap();
        registry
            .register_file(ValidatedPath::from_normalized("s.txt"), triple("0644"))
            .unwrap();
        registry.register_collection("A".to_string()).unwrap();
        registry.register_collection("B".to_string()).unwrap();
        registry
            .add_files_to_collections(
                &["A".to_string(), "B".to_string()],
                &["s.txt".to_string()],
            )
            .unwrap();

        registry.unregister_file("s.txt", false).unwrap();

        assert!(!registry.is_file_registered("s.txt"));
        assert!(registry.list_files_in_collection("A").unwrap().is_empty());
        assert!(registry.list_files_in_collection("B").unwrap().is_empty());
    }

    #[test]
    fn cleanup_drops_empty_collections() {
        let dir = TempDir::new().unwrap();
        let mut registry = Registry::new(
            dir.path().to_path_buf(),
            dir.path().join(".guardfile"),
            "0644".to_string(),
            String::new(),
            String::new(),
            false,
        )
        .unwrap();
        registry.register_collection("teamA".to_string()).unwrap();
        let (removed_files, removed_collections) = registry.cleanup(|_| true);
        assert!(removed_files.is_empty());
        assert_eq!(removed_collections, vec!["teamA".to_string()]);
        assert!(!registry.is_collection_registered("teamA"));
    }
}
