//! The protection engine: the Locked/Unlocked state machine for a single
//! file, and the batch and maintenance operations built on top of it. Every
//! registry/filesystem access goes through [`SecurityWrapper`].

use std::collections::{HashMap, HashSet};

use log::{info, warn};

use crate::diagnostics::Warning;
use crate::error::{GuardError, Result};
use crate::fsops::{FilesystemAdapter, ImmutableOutcome, Triple};
use crate::path::ValidatedPath;
use crate::registry::{folder_name_for, ToggleKind};
use crate::security::SecurityWrapper;

pub struct Engine<'a> {
    pub sec: SecurityWrapper<'a>,
}

/// Counts returned by the maintenance workflows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceCounts {
    pub files: usize,
    pub collections: usize,
}

impl<'a> Engine<'a> {
    pub fn new(sec: SecurityWrapper<'a>) -> Self {
        Engine { sec }
    }

    fn default_triple(&self) -> Triple {
        let cfg = self.sec.registry.get_config();
        Triple {
            mode: cfg.default_mode.clone(),
            owner: cfg.default_owner.clone(),
            group: cfg.default_group.clone(),
        }
    }

    fn collection_triple(&self, name: &str) -> Triple {
        Triple {
            mode: self.sec.registry.collection_effective_mode(name),
            owner: self.sec.registry.collection_effective_owner(name),
            group: self.sec.registry.collection_effective_group(name),
        }
    }

    // ---- single-file transitions ----

    fn immutable_warning(&self, path: &str, outcome: ImmutableOutcome) -> Option<Warning> {
        match outcome {
            ImmutableOutcome::Applied => None,
            ImmutableOutcome::SkippedNotRoot => {
                Some(Warning::ImmutableRequiresRoot(path.to_owned()))
            }
        }
    }

    /// Unlocked -> Locked. Registers the file first if it isn't already.
    fn enable_one(&mut self, key: &str, triple: Triple) -> Result<Option<Warning>> {
        let full = self.sec.registry.root().join(key);
        if !self.sec.fs.exists(&full) {
            return Ok(Some(Warning::FileMissing(key.to_owned())));
        }
        self.sec.reject_symlink_mutation(&full)?;

        if !self.sec.registry.is_file_registered(key) {
            let original = self.sec.fs.stat(&full)?;
            self.sec
                .registry
                .register_file(ValidatedPath::from_normalized(key.to_owned()), original)?;
        }

        if self.sec.registry.get_file(key).map(|e| e.guard) == Some(true) {
            return Ok(Some(Warning::FileAlreadyEnabled(key.to_owned())));
        }

        // step 2: clear_immutable is idempotent, best-effort.
        let mut warnings = Vec::new();
        match self.sec.fs.clear_immutable(&full) {
            Ok(outcome) => warnings.extend(self.immutable_warning(key, outcome)),
            Err(GuardError::Unsupported { .. }) => {
                warnings.push(Warning::ImmutableNotSupported(key.to_owned()))
            }
            Err(e) => warn!("clear_immutable before lock failed for '{key}': {e}"),
        }

        // step 3: apply the locked triple. A failure here is fatal to this
        // file's transition - the batch loop turns it into a warning.
        self.sec.fs.apply_triple(&full, &triple)?;

        // step 4: set_immutable, best-effort - never rolls back the mode.
        match self.sec.fs.set_immutable(&full) {
            Ok(outcome) => warnings.extend(self.immutable_warning(key, outcome)),
            Err(GuardError::Unsupported { .. }) => {
                warnings.push(Warning::ImmutableNotSupported(key.to_owned()))
            }
            Err(e) => warn!("set_immutable failed for '{key}': {e}"),
        }

        self.sec.registry.get_file_mut(key).expect("just ensured").guard = true;
        info!("locked '{key}'");
        Ok(warnings.into_iter().next())
    }

    /// Locked -> Unlocked. Restores the FileEntry's captured original triple.
    fn disable_one(&mut self, key: &str) -> Result<Option<Warning>> {
        let full = self.sec.registry.root().join(key);
        if !self.sec.fs.exists(&full) {
            return Ok(Some(Warning::FileMissing(key.to_owned())));
        }

        let entry = match self.sec.registry.get_file(key) {
            Some(e) => e.clone(),
            None => return Ok(Some(Warning::FileNotRegistered(key.to_owned()))),
        };
        if !entry.guard {
            return Ok(Some(Warning::FileAlreadyDisabled(key.to_owned())));
        }

        self.sec.reject_symlink_mutation(&full)?;

        let currently_immutable = self.sec.fs.is_immutable(&full).unwrap_or(false);
        let mut warnings = Vec::new();
        if currently_immutable {
            match self.sec.fs.clear_immutable(&full) {
                Ok(ImmutableOutcome::Applied) => {}
                Ok(ImmutableOutcome::SkippedNotRoot) => {
                    return Err(GuardError::Privilege {
                        op: "disable".into(),
                        path: key.to_owned(),
                    });
                }
                Err(GuardError::Unsupported { .. }) => {
                    warnings.push(Warning::ImmutableNotSupported(key.to_owned()));
                }
                Err(e) => return Err(e),
            }
        } else {
            // idempotent best-effort clear.
            match self.sec.fs.clear_immutable(&full) {
                Ok(outcome) => warnings.extend(self.immutable_warning(key, outcome)),
                Err(GuardError::Unsupported { .. }) => {
                    warnings.push(Warning::ImmutableNotSupported(key.to_owned()))
                }
                Err(e) => warn!("clear_immutable before unlock failed for '{key}': {e}"),
            }
        }

        // chmod is the core guarantee and is fatal on failure; chown/chgrp
        // are best-effort (resolves the "original owner no longer exists"
        // open question as a warning, not an abort).
        self.sec.fs.chmod(&full, &entry.original_mode)?;
        if !entry.original_owner.is_empty() {
            if let Err(e) = self.sec.fs.chown(&full, &entry.original_owner) {
                warnings.push(Warning::Generic {
                    target: key.to_owned(),
                    detail: e.to_string(),
                });
            }
        }
        if !entry.original_group.is_empty() {
            if let Err(e) = self.sec.fs.chgrp(&full, &entry.original_group) {
                warnings.push(Warning::Generic {
                    target: key.to_owned(),
                    detail: e.to_string(),
                });
            }
        }

        self.sec.registry.get_file_mut(key).expect("checked above").guard = false;
        info!("unlocked '{key}'");
        Ok(warnings.into_iter().next())
    }

    fn toggle_one(&mut self, key: &str, lock_triple: Triple) -> Result<Option<Warning>> {
        let is_locked = self
            .sec
            .registry
            .get_file(key)
            .map(|e| e.guard)
            .unwrap_or(false);
        if is_locked {
            self.disable_one(key)
        } else {
            self.enable_one(key, lock_triple)
        }
    }

    /// Run `op` over `keys` in sorted order, turning every non-fatal error
    /// into a `Warning::Generic` so one bad path never kills the batch.
    /// `GuardError::Privilege`/`GuardError::Conflict` still propagate.
    fn run_batch<F>(&mut self, inputs: &[String], mut op: F) -> Result<Vec<Warning>>
    where
        F: FnMut(&mut Self, &str) -> Result<Option<Warning>>,
    {
        let mut keys: Vec<String> = Vec::with_capacity(inputs.len());
        for input in inputs {
            keys.push(self.sec.normalize_path(input)?);
        }
        keys.sort();
        keys.dedup();

        let mut warnings = Vec::new();
        for key in keys {
            match op(self, &key) {
                Ok(Some(w)) => warnings.push(w),
                Ok(None) => {}
                Err(e @ GuardError::Privilege { .. }) => return Err(e),
                Err(e) => warnings.push(Warning::Generic {
                    target: key,
                    detail: e.to_string(),
                }),
            }
        }
        Ok(warnings)
    }

    pub fn enable_files(&mut self, inputs: &[String]) -> Result<Vec<Warning>> {
        let triple = self.default_triple();
        self.run_batch(inputs, move |e, key| e.enable_one(key, triple.clone()))
    }

    pub fn disable_files(&mut self, inputs: &[String]) -> Result<Vec<Warning>> {
        self.run_batch(inputs, |e, key| e.disable_one(key))
    }

    pub fn toggle_files(&mut self, inputs: &[String]) -> Result<Vec<Warning>> {
        let triple = self.default_triple();
        self.run_batch(inputs, move |e, key| e.toggle_one(key, triple.clone()))
    }

    // ---- folders ----

    fn folder_identity(&self, token: &str) -> Result<(String, String)> {
        if let Some(existing) = self.sec.registry.get_folder(token) {
            return Ok((existing.name.clone(), existing.path.clone()));
        }
        if let Some(stripped) = token.strip_prefix('@') {
            let path = self.sec.normalize_path(stripped)?;
            return Ok((folder_name_for(&path), path));
        }
        let path = self.sec.normalize_path(token)?;
        Ok((folder_name_for(&path), path))
    }

    fn scan_folder(&mut self, name: &str, path: &str) -> Result<(Vec<String>, Option<Warning>)> {
        let full = self.sec.registry.root().join(path);
        if !self.sec.fs.is_dir(&full) {
            return Ok((Vec::new(), Some(Warning::FolderNotFound(name.to_owned()))));
        }
        let files = self.sec.fs.collect_immediate_files(&full)?;
        let root = self.sec.registry.root().to_path_buf();
        let mut keys = Vec::new();
        for f in files {
            let rel = f
                .strip_prefix(&root)
                .unwrap_or(&f)
                .to_string_lossy()
                .replace('\\', "/");
            if !self.sec.registry.is_file_registered(&rel) {
                let triple = self.sec.fs.stat(&f)?;
                self.sec
                    .registry
                    .register_file(ValidatedPath::from_normalized(rel.clone()), triple)?;
            }
            keys.push(rel);
        }
        let warning = if keys.is_empty() {
            Some(Warning::FolderEmpty(name.to_owned()))
        } else {
            None
        };
        Ok((keys, warning))
    }

    fn ensure_folder_registered(&mut self, name: &str, path: &str) -> Result<()> {
        if !self.sec.registry.is_folder_registered(name) {
            self.sec
                .registry
                .register_folder(name.to_owned(), path.to_owned())?;
        }
        Ok(())
    }

    pub fn enable_folders(&mut self, tokens: &[String]) -> Result<Vec<Warning>> {
        let mut sorted = tokens.to_vec();
        sorted.sort();
        let triple = self.default_triple();
        let mut warnings = Vec::new();
        for token in sorted {
            let (name, path) = self.folder_identity(&token)?;
            self.ensure_folder_registered(&name, &path)?;
            let (keys, warn) = self.scan_folder(&name, &path)?;
            warnings.extend(warn);
            for key in keys {
                match self.enable_one(&key, triple.clone()) {
                    Ok(Some(w)) => warnings.push(w),
                    Ok(None) => {}
                    Err(e @ GuardError::Privilege { .. }) => return Err(e),
                    Err(e) => warnings.push(Warning::Generic {
                        target: key,
                        detail: e.to_string(),
                    }),
                }
            }
            if let Some(folder) = self.sec.registry.get_folder_mut(&name) {
                folder.guard = true;
            }
        }
        Ok(warnings)
    }

    pub fn disable_folders(&mut self, tokens: &[String]) -> Result<Vec<Warning>> {
        let mut sorted = tokens.to_vec();
        sorted.sort();
        let mut warnings = Vec::new();
        for token in sorted {
            let (name, path) = self.folder_identity(&token)?;
            self.ensure_folder_registered(&name, &path)?;
            let (keys, warn) = self.scan_folder(&name, &path)?;
            warnings.extend(warn);
            for key in keys {
                match self.disable_one(&key) {
                    Ok(Some(w)) => warnings.push(w),
                    Ok(None) => {}
                    Err(e @ GuardError::Privilege { .. }) => return Err(e),
                    Err(e) => warnings.push(Warning::Generic {
                        target: key,
                        detail: e.to_string(),
                    }),
                }
            }
            if let Some(folder) = self.sec.registry.get_folder_mut(&name) {
                folder.guard = false;
            }
        }
        Ok(warnings)
    }

    pub fn toggle_folders(&mut self, tokens: &[String]) -> Result<Vec<Warning>> {
        let mut sorted = tokens.to_vec();
        sorted.sort();
        let triple = self.default_triple();
        let mut warnings = Vec::new();
        for token in sorted {
            let (name, path) = self.folder_identity(&token)?;
            self.ensure_folder_registered(&name, &path)?;
            let (keys, warn) = self.scan_folder(&name, &path)?;
            warnings.extend(warn);
            for key in keys {
                match self.toggle_one(&key, triple.clone()) {
                    Ok(Some(w)) => warnings.push(w),
                    Ok(None) => {}
                    Err(e @ GuardError::Privilege { .. }) => return Err(e),
                    Err(e) => warnings.push(Warning::Generic {
                        target: key,
                        detail: e.to_string(),
                    }),
                }
            }
            if let Some(folder) = self.sec.registry.get_folder_mut(&name) {
                folder.guard = !folder.guard;
            }
        }
        Ok(warnings)
    }

    // ---- collections ----

    pub fn enable_collections(&mut self, names: &[String]) -> Result<Vec<Warning>> {
        let mut sorted = names.to_vec();
        sorted.sort();
        let mut warnings = Vec::new();
        for name in sorted {
            if !self.sec.registry.is_collection_registered(&name) {
                warnings.push(Warning::CollectionNotFound(name));
                continue;
            }
            let triple = self.collection_triple(&name);
            let files = self.sec.registry.list_files_in_collection(&name)?.to_vec();
            if files.is_empty() {
                warnings.push(Warning::CollectionEmpty(name.clone()));
            }
            for key in &files {
                match self.enable_one(key, triple.clone()) {
                    Ok(Some(w)) => warnings.push(w),
                    Ok(None) => {}
                    Err(e @ GuardError::Privilege { .. }) => return Err(e),
                    Err(e) => warnings.push(Warning::Generic {
                        target: key.clone(),
                        detail: e.to_string(),
                    }),
                }
            }
            if let Some(c) = self.sec.registry.get_collection_mut(&name) {
                c.guard = true;
            }
        }
        Ok(warnings)
    }

    pub fn disable_collections(&mut self, names: &[String]) -> Result<Vec<Warning>> {
        let mut sorted = names.to_vec();
        sorted.sort();
        let mut warnings = Vec::new();
        for name in sorted {
            if !self.sec.registry.is_collection_registered(&name) {
                warnings.push(Warning::CollectionNotFound(name));
                continue;
            }
            let files = self.sec.registry.list_files_in_collection(&name)?.to_vec();
            if files.is_empty() {
                warnings.push(Warning::CollectionEmpty(name.clone()));
            }
            for key in &files {
                match self.disable_one(key) {
                    Ok(Some(w)) => warnings.push(w),
                    Ok(None) => {}
                    Err(e @ GuardError::Privilege { .. }) => return Err(e),
                    Err(e) => warnings.push(Warning::Generic {
                        target: key.clone(),
                        detail: e.to_string(),
                    }),
                }
            }
            if let Some(c) = self.sec.registry.get_collection_mut(&name) {
                c.guard = false;
            }
        }
        Ok(warnings)
    }

    /// Toggle many collections at once. Detects cross-collection conflicts
    /// (shared files, differing guard states) as a pure computation over
    /// already-loaded state *before* touching the filesystem.
    pub fn toggle_collections(&mut self, names: &[String]) -> Result<Vec<Warning>> {
        let mut sorted = names.to_vec();
        sorted.sort();

        let mut registered = Vec::new();
        let mut warnings = Vec::new();
        for name in &sorted {
            if self.sec.registry.is_collection_registered(name) {
                registered.push(name.clone());
            } else {
                warnings.push(Warning::CollectionNotFound(name.clone()));
            }
        }

        for i in 0..registered.len() {
            for j in (i + 1)..registered.len() {
                let (n1, n2) = (&registered[i], &registered[j]);
                let c1 = self.sec.registry.get_collection(n1).unwrap();
                let c2 = self.sec.registry.get_collection(n2).unwrap();
                if c1.guard == c2.guard {
                    continue;
                }
                let set1: HashSet<&String> = c1.files.iter().collect();
                let mut shared: Vec<String> = c2
                    .files
                    .iter()
                    .filter(|f| set1.contains(f))
                    .cloned()
                    .collect();
                if !shared.is_empty() {
                    shared.sort();
                    return Err(GuardError::Conflict {
                        collections: vec![n1.clone(), n2.clone()],
                        shared_paths: shared,
                        states: vec![(n1.clone(), c1.guard), (n2.clone(), c2.guard)],
                    });
                }
            }
        }

        for name in registered {
            let files = self.sec.registry.list_files_in_collection(&name)?.to_vec();
            let currently_guarded = self.sec.registry.get_collection(&name).unwrap().guard;
            if files.is_empty() {
                warnings.push(Warning::CollectionEmpty(name.clone()));
            }
            let triple = self.collection_triple(&name);
            for key in &files {
                match self.toggle_one(key, triple.clone()) {
                    Ok(Some(w)) => warnings.push(w),
                    Ok(None) => {}
                    Err(e @ GuardError::Privilege { .. }) => return Err(e),
                    Err(e) => warnings.push(Warning::Generic {
                        target: key.clone(),
                        detail: e.to_string(),
                    }),
                }
            }
            if let Some(c) = self.sec.registry.get_collection_mut(&name) {
                c.guard = !currently_guarded;
            }
        }
        Ok(warnings)
    }

    /// Disable guard on every file in the collection, remove all files from
    /// the collection, keep the (now empty) collection and the FileEntries.
    pub fn clear_collection(&mut self, name: &str) -> Result<Vec<Warning>> {
        if !self.sec.registry.is_collection_registered(name) {
            return Err(GuardError::NotFound {
                kind: crate::error::EntityKind::Collection,
                name: name.to_owned(),
            });
        }
        let files = self.sec.registry.list_files_in_collection(name)?.to_vec();
        let mut warnings = Vec::new();
        for key in &files {
            match self.disable_one(key) {
                Ok(Some(w)) => warnings.push(w),
                Ok(None) => {}
                Err(e @ GuardError::Privilege { .. }) => return Err(e),
                Err(e) => warnings.push(Warning::Generic {
                    target: key.clone(),
                    detail: e.to_string(),
                }),
            }
        }
        self.sec
            .registry
            .remove_files_from_collections(&[name.to_owned()], &files)?;
        if let Some(c) = self.sec.registry.get_collection_mut(name) {
            c.guard = false;
        }
        Ok(warnings)
    }

    /// Disable guard on the collection's files, unregister the collection.
    /// FileEntries persist.
    pub fn destroy_collection(&mut self, name: &str) -> Result<Vec<Warning>> {
        if !self.sec.registry.is_collection_registered(name) {
            return Err(GuardError::NotFound {
                kind: crate::error::EntityKind::Collection,
                name: name.to_owned(),
            });
        }
        let files = self.sec.registry.list_files_in_collection(name)?.to_vec();
        let mut warnings = Vec::new();
        for key in &files {
            match self.disable_one(key) {
                Ok(Some(w)) => warnings.push(w),
                Ok(None) => {}
                Err(e @ GuardError::Privilege { .. }) => return Err(e),
                Err(e) => warnings.push(Warning::Generic {
                    target: key.clone(),
                    detail: e.to_string(),
                }),
            }
        }
        self.sec.registry.unregister_collection(name)?;
        Ok(warnings)
    }

    // ---- maintenance workflows ----

    /// Remove FileEntries whose path does not exist on disk, collections
    /// with empty file lists, and folders with no immediate files left.
    pub fn cleanup(&mut self) -> Result<(MaintenanceCounts, Vec<Warning>)> {
        let root = self.sec.registry.root().to_path_buf();
        let fs = self.sec.fs;
        let missing: Vec<String> = self
            .sec
            .registry
            .list_files()
            .iter()
            .filter(|e| !fs.exists(&root.join(e.path.as_str())))
            .map(|e| e.path.as_str().to_owned())
            .collect();

        let (removed_files, removed_collections) = self.sec.registry.cleanup(|p| fs.exists(p));

        let warnings: Vec<Warning> = missing.into_iter().map(Warning::FileMissing).collect();

        let folder_names: Vec<String> = self
            .sec
            .registry
            .list_folders()
            .iter()
            .map(|f| f.name.clone())
            .collect();
        for name in folder_names {
            let path = self.sec.registry.get_folder(&name).unwrap().path.clone();
            let full = root.join(&path);
            let empty = !fs.is_dir(&full)
                || fs
                    .collect_immediate_files(&full)
                    .map(|f| f.is_empty())
                    .unwrap_or(true);
            if empty {
                let _ = self.sec.registry.unregister_folder(&name);
            }
        }

        Ok((
            MaintenanceCounts {
                files: removed_files.len(),
                collections: removed_collections.len(),
            },
            warnings,
        ))
    }

    /// Disable guard on every file and every collection. Nothing is
    /// unregistered.
    pub fn reset(&mut self) -> Result<(MaintenanceCounts, Vec<Warning>)> {
        let locked: Vec<String> = self
            .sec
            .registry
            .list_files()
            .iter()
            .filter(|e| e.guard)
            .map(|e| e.path.as_str().to_owned())
            .collect();

        let mut warnings = Vec::new();
        let mut disabled = 0usize;
        for key in &locked {
            match self.disable_one(key) {
                Ok(Some(w)) => warnings.push(w),
                Ok(None) => disabled += 1,
                Err(e @ GuardError::Privilege { .. }) => return Err(e),
                Err(e) => warnings.push(Warning::Generic {
                    target: key.clone(),
                    detail: e.to_string(),
                }),
            }
        }

        let collection_names: Vec<String> = self
            .sec
            .registry
            .list_collections()
            .iter()
            .map(|c| c.name.clone())
            .collect();
        let mut collections_reset = 0usize;
        for name in collection_names {
            if let Some(c) = self.sec.registry.get_collection_mut(&name) {
                if c.guard {
                    c.guard = false;
                    collections_reset += 1;
                }
            }
        }

        Ok((
            MaintenanceCounts {
                files: disabled,
                collections: collections_reset,
            },
            warnings,
        ))
    }

    /// reset, then cleanup, then verify every remaining file is Unlocked;
    /// only then delete the manifest.
    pub fn uninstall(&mut self) -> Result<Vec<Warning>> {
        let (_, mut warnings) = self.reset()?;
        let (_, cleanup_warnings) = self.cleanup()?;
        warnings.extend(cleanup_warnings);

        let still_locked: Vec<String> = self
            .sec
            .registry
            .list_files()
            .iter()
            .filter(|e| e.guard)
            .map(|e| e.path.as_str().to_owned())
            .collect();
        if !still_locked.is_empty() {
            return Err(GuardError::validation(
                "uninstall",
                still_locked.join(", "),
                "files remain locked after reset",
            ));
        }

        self.sec.registry.delete_manifest_file()?;
        Ok(warnings)
    }

    // ---- last-toggle bookkeeping (advisory only) ----

    pub fn record_last_toggle_file(&mut self, path: &str) {
        self.sec
            .registry
            .set_last_toggle(path.to_owned(), ToggleKind::File);
    }

    pub fn record_last_toggle_collection(&mut self, name: &str) {
        self.sec
            .registry
            .set_last_toggle(name.to_owned(), ToggleKind::Collection);
    }
}

/// Build (path -> desired-state collections) maps for conflict detection.
/// Exposed separately for tests; `toggle_collections` inlines the same
/// logic but this is kept as a free function for unit coverage of the
/// intersection rule in isolation.
pub fn conflicting_pairs(
    collections: &HashMap<String, (bool, Vec<String>)>,
) -> Option<(String, String, Vec<String>)> {
    let names: Vec<&String> = collections.keys().collect();
    for i in 0..names.len() {
        for j in (i + 1)..names.len() {
            let (g1, f1) = &collections[names[i]];
            let (g2, f2) = &collections[names[j]];
            if g1 == g2 {
                continue;
            }
            let set1: HashSet<&String> = f1.iter().collect();
            let shared: Vec<String> = f2.iter().filter(|f| set1.contains(f)).cloned().collect();
            if !shared.is_empty() {
                return Some((names[i].clone(), names[j].clone(), shared));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_detection_is_pure_set_intersection() {
        let mut m = HashMap::new();
        m.insert("A".to_string(), (true, vec!["s.txt".to_string()]));
        m.insert("B".to_string(), (false, vec!["s.txt".to_string()]));
        let conflict = conflicting_pairs(&m);
        assert!(conflict.is_some());
        let (_, _, shared) = conflict.unwrap();
        assert_eq!(shared, vec!["s.txt".to_string()]);
    }

    #[test]
    fn no_conflict_when_states_match() {
        let mut m = HashMap::new();
        m.insert("A".to_string(), (true, vec!["s.txt".to_string()]));
        m.insert("B".to_string(), (true, vec!["s.txt".to_string()]));
        assert!(conflicting_pairs(&m).is_none());
    }

    #[test]
    fn no_conflict_when_disjoint() {
        let mut m = HashMap::new();
        m.insert("A".to_string(), (true, vec!["a.txt".to_string()]));
        m.insert("B".to_string(), (false, vec!["b.txt".to_string()]));
        assert!(conflicting_pairs(&m).is_none());
    }

    use crate::fsops::PosixFs;
    use crate::registry::Registry;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn fresh_registry(dir: &TempDir, mode: &str) -> Registry {
        Registry::new(
            dir.path().to_path_buf(),
            dir.path().join(".guardfile"),
            mode.to_string(),
            String::new(),
            String::new(),
            false,
        )
        .unwrap()
    }

    fn file_mode(path: &std::path::Path) -> u32 {
        std::fs::metadata(path).unwrap().permissions().mode() & 0o777
    }

    // S1 (non-root variant): enable locks the file to the configured mode
    // and marks guard=true even though the immutable bit can't actually be
    // set without root (boundary behavior: warning, not failure).
    #[test]
    fn enable_then_disable_restores_original_triple() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, b"hi").unwrap();
        std::fs::set_permissions(&file, std::fs::Permissions::from_mode(0o644)).unwrap();

        let mut registry = fresh_registry(&dir, "0600");
        let fs = PosixFs::new();
        let mut engine = Engine::new(SecurityWrapper::new(&mut registry, &fs));

        let warnings = engine.enable_files(&["a.txt".to_string()]).unwrap();
        assert!(warnings
            .iter()
            .all(|w| matches!(w, Warning::ImmutableRequiresRoot(_))));
        assert_eq!(file_mode(&file), 0o600);
        assert!(engine.sec.registry.get_file("a.txt").unwrap().guard);

        engine.disable_files(&["a.txt".to_string()]).unwrap();
        assert_eq!(file_mode(&file), 0o644);
        assert!(!engine.sec.registry.get_file("a.txt").unwrap().guard);
    }

    // P4: toggle; toggle is the identity on (guard, on-disk triple).
    #[test]
    fn double_toggle_is_identity() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, b"hi").unwrap();
        std::fs::set_permissions(&file, std::fs::Permissions::from_mode(0o644)).unwrap();

        let mut registry = fresh_registry(&dir, "0600");
        let fs = PosixFs::new();
        let mut engine = Engine::new(SecurityWrapper::new(&mut registry, &fs));

        engine.toggle_files(&["a.txt".to_string()]).unwrap();
        assert_eq!(file_mode(&file), 0o600);
        engine.toggle_files(&["a.txt".to_string()]).unwrap();
        assert_eq!(file_mode(&file), 0o644);
        assert!(!engine.sec.registry.get_file("a.txt").unwrap().guard);
    }

    // S3: toggling two collections that share a file and disagree on guard
    // state fails atomically with no filesystem mutation.
    #[test]
    fn toggle_collections_conflict_blocks_all_mutation() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("s.txt");
        std::fs::write(&file, b"hi").unwrap();
        std::fs::set_permissions(&file, std::fs::Permissions::from_mode(0o644)).unwrap();

        let mut registry = fresh_registry(&dir, "0600");
        registry.register_collection("A".to_string()).unwrap();
        registry.register_collection("B".to_string()).unwrap();
        let fs = PosixFs::new();
        let mut engine = Engine::new(SecurityWrapper::new(&mut registry, &fs));

        engine.enable_files(&["s.txt".to_string()]).unwrap();
        engine
            .sec
            .registry
            .add_files_to_collections(&["A".to_string(), "B".to_string()], &["s.txt".to_string()])
            .unwrap();
        engine.sec.registry.get_collection_mut("A").unwrap().guard = true;
        engine.sec.registry.get_collection_mut("B").unwrap().guard = false;

        let mode_before = file_mode(&file);
        let err = engine
            .toggle_collections(&["A".to_string(), "B".to_string()])
            .unwrap_err();
        assert!(matches!(err, GuardError::Conflict { .. }));
        assert_eq!(file_mode(&file), mode_before);
    }

    // S4: cleanup drops a FileEntry whose path no longer exists on disk and
    // warns about it.
    #[test]
    fn cleanup_removes_missing_files() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("f.txt");
        std::fs::write(&file, b"hi").unwrap();

        let mut registry = fresh_registry(&dir, "0600");
        let fs = PosixFs::new();
        let mut engine = Engine::new(SecurityWrapper::new(&mut registry, &fs));
        engine.enable_files(&["f.txt".to_string()]).unwrap();
        std::fs::remove_file(&file).unwrap();

        let (counts, warnings) = engine.cleanup().unwrap();
        assert_eq!(counts.files, 1);
        assert!(warnings.iter().any(|w| matches!(w, Warning::FileMissing(p) if p == "f.txt")));
        assert!(!engine.sec.registry.is_file_registered("f.txt"));
    }

    // S5 (non-root variant): uninstall restores every file and deletes the
    // manifest once verification confirms nothing is left locked.
    #[test]
    fn uninstall_deletes_manifest_after_verification() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("f.txt");
        std::fs::write(&file, b"hi").unwrap();
        std::fs::set_permissions(&file, std::fs::Permissions::from_mode(0o644)).unwrap();

        let mut registry = fresh_registry(&dir, "0600");
        let manifest_path = registry.manifest_path().to_path_buf();
        let fs = PosixFs::new();
        let mut engine = Engine::new(SecurityWrapper::new(&mut registry, &fs));
        engine.enable_files(&["f.txt".to_string()]).unwrap();
        engine.sec.registry.save().unwrap();
        assert!(manifest_path.exists());

        engine.uninstall().unwrap();
        assert_eq!(file_mode(&file), 0o644);
        assert!(!manifest_path.exists());
    }
}
