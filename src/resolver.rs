//! Argument resolution and the orchestrator functions the binary dispatches
//! to. Resolution turns an opaque token into {file, folder, collection};
//! the `run_*` functions batch by kind and drive one or more engine calls,
//! then hand back the warnings collected along the way.

use crate::diagnostics::Warning;
use crate::engine::{Engine, MaintenanceCounts};
use crate::error::{GuardError, Result};
use crate::registry::folder_name_for;
use crate::security::SecurityWrapper;

/// Explicit disambiguation keyword, when the caller supplied one ahead of
/// the name list (`enable file foo`, as opposed to plain `enable foo`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    File,
    Folder,
    Collection,
}

/// Tokens batched by the kind they resolved to, in the order the caller
/// supplied them within each kind.
#[derive(Debug, Default)]
pub struct Resolution {
    pub files: Vec<String>,
    pub folders: Vec<String>,
    pub collections: Vec<String>,
    pub warnings: Vec<Warning>,
}

fn resolve_one(sec: &SecurityWrapper, token: &str, explicit: Option<Kind>) -> Result<Kind> {
    if let Some(kind) = explicit {
        return Ok(kind);
    }
    if sec.registry.is_collection_registered(token) {
        return Ok(Kind::Collection);
    }
    if sec.registry.is_folder_registered(token) {
        return Ok(Kind::Folder);
    }
    if let Ok(normalized) = sec.normalize_path(token) {
        if sec.registry.get_folder_by_path(&normalized).is_some() {
            return Ok(Kind::Folder);
        }
        let full = sec.registry.root().join(&normalized);
        if sec.fs.is_dir(&full) {
            return Ok(Kind::Folder);
        }
    }
    Ok(Kind::File)
}

/// Resolve every token, batching by kind. Preserves the caller's argument
/// order within each kind bucket; the engine sorts internally for its own
/// deterministic iteration.
pub fn resolve_many(sec: &SecurityWrapper, tokens: &[String], explicit: Option<Kind>) -> Result<Resolution> {
    let mut resolution = Resolution::default();
    for token in tokens {
        match resolve_one(sec, token, explicit)? {
            Kind::Collection => resolution.collections.push(token.clone()),
            Kind::Folder => resolution.folders.push(token.clone()),
            Kind::File => resolution.files.push(token.clone()),
        }
    }
    Ok(resolution)
}

fn dispatch(
    engine: &mut Engine,
    resolution: &Resolution,
    files: impl FnOnce(&mut Engine, &[String]) -> Result<Vec<Warning>>,
    folders: impl FnOnce(&mut Engine, &[String]) -> Result<Vec<Warning>>,
    collections: impl FnOnce(&mut Engine, &[String]) -> Result<Vec<Warning>>,
) -> Result<Vec<Warning>> {
    let mut warnings = resolution.warnings.clone();
    if !resolution.files.is_empty() {
        warnings.extend(files(engine, &resolution.files)?);
    }
    if !resolution.folders.is_empty() {
        warnings.extend(folders(engine, &resolution.folders)?);
    }
    if !resolution.collections.is_empty() {
        warnings.extend(collections(engine, &resolution.collections)?);
    }
    Ok(warnings)
}

/// If exactly one file or one collection (and no folders) was named, record
/// it as the advisory `last_toggle` hint. Never consulted for correctness.
fn record_last_toggle(engine: &mut Engine, resolution: &Resolution) {
    match (
        resolution.files.as_slice(),
        resolution.folders.as_slice(),
        resolution.collections.as_slice(),
    ) {
        ([file], [], []) => engine.record_last_toggle_file(file),
        ([], [], [collection]) => engine.record_last_toggle_collection(collection),
        _ => {}
    }
}

pub fn run_enable(engine: &mut Engine, explicit: Option<Kind>, tokens: &[String]) -> Result<Vec<Warning>> {
    let resolution = resolve_many(&engine.sec, tokens, explicit)?;
    let warnings = dispatch(
        engine,
        &resolution,
        |e, v| e.enable_files(v),
        |e, v| e.enable_folders(v),
        |e, v| e.enable_collections(v),
    )?;
    record_last_toggle(engine, &resolution);
    Ok(warnings)
}

pub fn run_disable(engine: &mut Engine, explicit: Option<Kind>, tokens: &[String]) -> Result<Vec<Warning>> {
    let resolution = resolve_many(&engine.sec, tokens, explicit)?;
    let warnings = dispatch(
        engine,
        &resolution,
        |e, v| e.disable_files(v),
        |e, v| e.disable_folders(v),
        |e, v| e.disable_collections(v),
    )?;
    record_last_toggle(engine, &resolution);
    Ok(warnings)
}

pub fn run_toggle(engine: &mut Engine, explicit: Option<Kind>, tokens: &[String]) -> Result<Vec<Warning>> {
    let resolution = resolve_many(&engine.sec, tokens, explicit)?;
    let warnings = dispatch(
        engine,
        &resolution,
        |e, v| e.toggle_files(v),
        |e, v| e.toggle_folders(v),
        |e, v| e.toggle_collections(v),
    )?;
    record_last_toggle(engine, &resolution);
    Ok(warnings)
}

/// `add [file] <paths>...` - always registers FileEntries directly; the
/// explicit `file` keyword the grammar allows is a no-op since this verb
/// never targets folders or collections.
pub fn run_add(engine: &mut Engine, tokens: &[String]) -> Result<Vec<Warning>> {
    let mut sorted = tokens.to_vec();
    sorted.sort();
    let mut warnings = Vec::new();
    for token in sorted {
        let key = engine.sec.normalize_path(&token)?;
        let full = engine.sec.registry.root().join(&key);
        if !engine.sec.fs.exists(&full) {
            warnings.push(Warning::FileMissing(key));
            continue;
        }
        if engine.sec.registry.is_file_registered(&key) {
            warnings.push(Warning::FileAlreadyInRegistry(key));
            continue;
        }
        engine.sec.reject_symlink_mutation(&full)?;
        let triple = engine.sec.fs.stat(&full)?;
        engine
            .sec
            .registry
            .register_file(crate::path::ValidatedPath::from_normalized(key), triple)?;
    }
    Ok(warnings)
}

/// `remove [file] <paths>...`
pub fn run_remove(engine: &mut Engine, tokens: &[String]) -> Result<Vec<Warning>> {
    let mut sorted = tokens.to_vec();
    sorted.sort();
    let mut warnings = Vec::new();
    for token in sorted {
        let key = engine.sec.normalize_path(&token)?;
        if !engine.sec.registry.is_file_registered(&key) {
            warnings.push(Warning::FileNotRegistered(key));
            continue;
        }
        engine.sec.registry.unregister_file(&key, true)?;
    }
    Ok(warnings)
}

/// `create <collection>...`
pub fn run_create(engine: &mut Engine, names: &[String]) -> Result<Vec<Warning>> {
    let mut sorted = names.to_vec();
    sorted.sort();
    for name in sorted {
        let validated = engine.sec.validate_collection_name(&name)?;
        engine.sec.registry.register_collection(validated)?;
    }
    Ok(Vec::new())
}

/// `destroy <collection>...`
pub fn run_destroy(engine: &mut Engine, names: &[String]) -> Result<Vec<Warning>> {
    let mut sorted = names.to_vec();
    sorted.sort();
    let mut warnings = Vec::new();
    for name in sorted {
        warnings.extend(engine.destroy_collection(&name)?);
    }
    Ok(warnings)
}

/// `clear <collection>...`
pub fn run_clear(engine: &mut Engine, names: &[String]) -> Result<Vec<Warning>> {
    let mut sorted = names.to_vec();
    sorted.sort();
    let mut warnings = Vec::new();
    for name in sorted {
        warnings.extend(engine.clear_collection(&name)?);
    }
    Ok(warnings)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOp {
    Add,
    Remove,
}

/// `update <collection> add|remove <paths>...`
pub fn run_update(
    engine: &mut Engine,
    collection: &str,
    op: UpdateOp,
    tokens: &[String],
) -> Result<Vec<Warning>> {
    if !engine.sec.registry.is_collection_registered(collection) {
        return Err(GuardError::NotFound {
            kind: crate::error::EntityKind::Collection,
            name: collection.to_owned(),
        });
    }
    let mut sorted = tokens.to_vec();
    sorted.sort();
    let mut warnings = Vec::new();
    let mut keys = Vec::new();
    for token in &sorted {
        let key = engine.sec.normalize_path(token)?;
        if op == UpdateOp::Add && !engine.sec.registry.is_file_registered(&key) {
            let full = engine.sec.registry.root().join(&key);
            if !engine.sec.fs.exists(&full) {
                warnings.push(Warning::FileMissing(key.clone()));
                continue;
            }
            engine.sec.reject_symlink_mutation(&full)?;
            let triple = engine.sec.fs.stat(&full)?;
            engine
                .sec
                .registry
                .register_file(crate::path::ValidatedPath::from_normalized(key.clone()), triple)?;
        }
        keys.push(key);
    }
    match op {
        UpdateOp::Add => engine
            .sec
            .registry
            .add_files_to_collections(&[collection.to_owned()], &keys)?,
        UpdateOp::Remove => engine
            .sec
            .registry
            .remove_files_from_collections(&[collection.to_owned()], &keys)?,
    }
    Ok(warnings)
}

pub fn run_cleanup(engine: &mut Engine) -> Result<(MaintenanceCounts, Vec<Warning>)> {
    engine.cleanup()
}

pub fn run_reset(engine: &mut Engine) -> Result<(MaintenanceCounts, Vec<Warning>)> {
    engine.reset()
}

pub fn run_uninstall(engine: &mut Engine) -> Result<Vec<Warning>> {
    engine.uninstall()
}

/// Turn a directory token into the folder name it would register under,
/// for display purposes (`show folder <path>` etc).
pub fn display_folder_name(path: &str) -> String {
    folder_name_for(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fsops::PosixFs;
    use crate::registry::Registry;
    use tempfile::TempDir;

    fn fresh_registry(dir: &TempDir) -> Registry {
        Registry::new(
            dir.path().to_path_buf(),
            dir.path().join(".guardfile"),
            "0644".to_string(),
            String::new(),
            String::new(),
            false,
        )
        .unwrap()
    }

    #[test]
    fn resolves_plain_path_as_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"hi").unwrap();
        let mut registry = fresh_registry(&dir);
        let fs = PosixFs::new();
        let sec = SecurityWrapper::new(&mut registry, &fs);
        let resolution = resolve_many(&sec, &["a.txt".to_string()], None).unwrap();
        assert_eq!(resolution.files, vec!["a.txt".to_string()]);
        assert!(resolution.folders.is_empty());
        assert!(resolution.collections.is_empty());
    }

    #[test]
    fn resolves_existing_directory_as_folder() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("docs")).unwrap();
        let mut registry = fresh_registry(&dir);
        let fs = PosixFs::new();
        let sec = SecurityWrapper::new(&mut registry, &fs);
        let resolution = resolve_many(&sec, &["docs".to_string()], None).unwrap();
        assert_eq!(resolution.folders, vec!["docs".to_string()]);
    }

    #[test]
    fn resolves_registered_collection_name() {
        let dir = TempDir::new().unwrap();
        let mut registry = fresh_registry(&dir);
        registry.register_collection("teamA".to_string()).unwrap();
        let fs = PosixFs::new();
        let sec = SecurityWrapper::new(&mut registry, &fs);
        let resolution = resolve_many(&sec, &["teamA".to_string()], None).unwrap();
        assert_eq!(resolution.collections, vec!["teamA".to_string()]);
    }

    #[test]
    fn explicit_kind_overrides_autodetection() {
        let dir = TempDir::new().unwrap();
        let mut registry = fresh_registry(&dir);
        registry.register_collection("docs".to_string()).unwrap();
        let fs = PosixFs::new();
        let sec = SecurityWrapper::new(&mut registry, &fs);
        let resolution = resolve_many(&sec, &["docs".to_string()], Some(Kind::File)).unwrap();
        assert_eq!(resolution.files, vec!["docs".to_string()]);
    }

    // S2: create, update add, enable, disable leaves files unlocked, the
    // collection unguarded, and membership intact.
    #[test]
    fn collection_lifecycle_enable_disable_keeps_membership() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("x.txt"), b"hi").unwrap();
        std::fs::write(dir.path().join("y.txt"), b"hi").unwrap();
        let mut registry = fresh_registry(&dir);
        let fs = PosixFs::new();
        let mut engine = crate::engine::Engine::new(SecurityWrapper::new(&mut registry, &fs));

        run_create(&mut engine, &["teamA".to_string()]).unwrap();
        run_update(
            &mut engine,
            "teamA",
            UpdateOp::Add,
            &["x.txt".to_string(), "y.txt".to_string()],
        )
        .unwrap();

        run_enable(&mut engine, None, &["teamA".to_string()]).unwrap();
        assert!(engine.sec.registry.get_collection("teamA").unwrap().guard);
        run_disable(&mut engine, None, &["teamA".to_string()]).unwrap();
        assert!(!engine.sec.registry.get_collection("teamA").unwrap().guard);

        let members = engine.sec.registry.list_files_in_collection("teamA").unwrap();
        assert_eq!(members.len(), 2);
        assert!(members.contains(&"x.txt".to_string()));
        assert!(members.contains(&"y.txt".to_string()));
    }

    #[test]
    fn clear_empties_membership_but_keeps_collection_and_entries() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("x.txt"), b"hi").unwrap();
        let mut registry = fresh_registry(&dir);
        let fs = PosixFs::new();
        let mut engine = crate::engine::Engine::new(SecurityWrapper::new(&mut registry, &fs));

        run_create(&mut engine, &["teamA".to_string()]).unwrap();
        run_update(&mut engine, "teamA", UpdateOp::Add, &["x.txt".to_string()]).unwrap();
        run_enable(&mut engine, None, &["teamA".to_string()]).unwrap();

        run_clear(&mut engine, &["teamA".to_string()]).unwrap();

        assert!(engine.sec.registry.is_collection_registered("teamA"));
        assert!(engine
            .sec
            .registry
            .list_files_in_collection("teamA")
            .unwrap()
            .is_empty());
        assert!(engine.sec.registry.is_file_registered("x.txt"));
        assert!(!engine.sec.registry.get_file("x.txt").unwrap().guard);
    }

    #[test]
    fn destroy_unregisters_collection_but_keeps_file_entries() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("x.txt"), b"hi").unwrap();
        let mut registry = fresh_registry(&dir);
        let fs = PosixFs::new();
        let mut engine = crate::engine::Engine::new(SecurityWrapper::new(&mut registry, &fs));

        run_create(&mut engine, &["teamA".to_string()]).unwrap();
        run_update(&mut engine, "teamA", UpdateOp::Add, &["x.txt".to_string()]).unwrap();
        run_enable(&mut engine, None, &["teamA".to_string()]).unwrap();

        run_destroy(&mut engine, &["teamA".to_string()]).unwrap();

        assert!(!engine.sec.registry.is_collection_registered("teamA"));
        assert!(engine.sec.registry.is_file_registered("x.txt"));
        assert!(!engine.sec.registry.get_file("x.txt").unwrap().guard);
    }

    // Symlinks are rejected at registration time even though `run_add`
    // otherwise accepts any existing path.
    #[test]
    fn run_add_rejects_symlink() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("real.txt");
        std::fs::write(&target, b"hi").unwrap();
        let link = dir.path().join("link.txt");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let mut registry = fresh_registry(&dir);
        let fs = PosixFs::new();
        let mut engine = crate::engine::Engine::new(SecurityWrapper::new(&mut registry, &fs));

        let err = run_add(&mut engine, &["link.txt".to_string()]).unwrap_err();
        assert!(matches!(err, GuardError::Validation { .. }));
        assert!(!engine.sec.registry.is_file_registered("link.txt"));
    }
}
