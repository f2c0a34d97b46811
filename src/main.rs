//! The `guard` binary: a thin `clap` + `anyhow` shell around the
//! `guard` library. All registry/filesystem logic lives in the library;
//! this file only parses arguments, loads/saves the registry around one
//! dispatched verb, and prints warnings/errors.

mod args;

use std::env;
use std::process::ExitCode;

use anyhow::{bail, Context};
use clap::Parser;
use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::config::{Appender, Config as LogConfig, Root};

use args::{Args, Command};
use guard::diagnostics::{self, Warning};
use guard::engine::Engine;
use guard::fsops::{FilesystemAdapter, PosixFs};
use guard::registry::{Registry, MANIFEST_FILE_NAME};
use guard::resolver::{self, Kind, UpdateOp};
use guard::security::SecurityWrapper;

fn init_logging() {
    let stdout = ConsoleAppender::builder().build();
    let config = LogConfig::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .build(Root::builder().appender("stdout").build(LevelFilter::Info))
        .expect("static log4rs config is always valid");
    let _ = log4rs::init_config(config);
}

/// Split an optional `file|folder|collection` keyword off the front of a
/// token list. This is the CLI's only job in recognizing that grammar;
/// everything downstream works off the resulting `Option<Kind>` plus the
/// remaining tokens.
fn split_kind(tokens: &[String]) -> (Option<Kind>, Vec<String>) {
    match tokens.split_first() {
        Some((head, rest)) if head == "file" => (Some(Kind::File), rest.to_vec()),
        Some((head, rest)) if head == "folder" => (Some(Kind::Folder), rest.to_vec()),
        Some((head, rest)) if head == "collection" => (Some(Kind::Collection), rest.to_vec()),
        _ => (None, tokens.to_vec()),
    }
}

fn print_warnings(warnings: &[Warning]) {
    for line in diagnostics::aggregate(warnings) {
        eprintln!("warning: {line}");
    }
}

fn run() -> anyhow::Result<()> {
    let args = Args::parse();
    let root = env::current_dir().context("failed to read current directory")?;
    let manifest_path = root.join(MANIFEST_FILE_NAME);

    let command = args.command;
    if let Command::Version = command {
        println!("guard {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }
    if let Command::Init { mode, owner, group } = command {
        let normalized_mode = guard::path::normalize_mode(&mode)
            .map_err(|e| anyhow::anyhow!(e))
            .context("invalid mode")?;
        let registry = Registry::new(
            root,
            manifest_path,
            normalized_mode,
            owner.unwrap_or_default(),
            group.unwrap_or_default(),
            false,
        )
        .map_err(|e| anyhow::anyhow!(e))
        .context("init failed")?;
        registry.save().map_err(|e| anyhow::anyhow!(e))?;
        println!("initialized manifest at '{}'", registry.manifest_path().display());
        return Ok(());
    }

    let fs = PosixFs::new();
    let mut registry = Registry::load(root, manifest_path).map_err(|e| anyhow::anyhow!(e))?;

    match command {
        Command::Version | Command::Init { .. } => unreachable!("handled above"),

        Command::Info => {
            println!("manifest: {}", registry.manifest_path().display());
            println!("files: {}", registry.list_files().len());
            println!("collections: {}", registry.list_collections().len());
            println!("folders: {}", registry.list_folders().len());
            println!("root privileges: {}", fs.has_root_privileges());
            Ok(())
        }

        Command::Show { tokens } => {
            show(&registry, &tokens);
            Ok(())
        }

        Command::Config { tokens } => {
            let mutated = config_command(&mut registry, &tokens)?;
            if mutated {
                registry.save().map_err(|e| anyhow::anyhow!(e))?;
            }
            Ok(())
        }

        other => {
            let mut engine = Engine::new(SecurityWrapper::new(&mut registry, &fs));
            let warnings = dispatch_mutation(&mut engine, other)?;
            drop(engine);
            registry.save().map_err(|e| anyhow::anyhow!(e))?;
            print_warnings(&warnings);
            Ok(())
        }
    }
}

fn dispatch_mutation(engine: &mut Engine, command: Command) -> anyhow::Result<Vec<Warning>> {
    let warnings = match command {
        Command::Add { tokens } => {
            let (_, tokens) = split_kind(&tokens);
            resolver::run_add(engine, &tokens)
        }
        Command::Remove { tokens } => {
            let (_, tokens) = split_kind(&tokens);
            resolver::run_remove(engine, &tokens)
        }
        Command::Create { names } => resolver::run_create(engine, &names),
        Command::Destroy { names } => resolver::run_destroy(engine, &names),
        Command::Clear { names } => resolver::run_clear(engine, &names),
        Command::Update { collection, op, paths } => {
            let op = match op.as_str() {
                "add" => UpdateOp::Add,
                "remove" => UpdateOp::Remove,
                other => bail!("unknown update operation '{other}', expected 'add' or 'remove'"),
            };
            resolver::run_update(engine, &collection, op, &paths)
        }
        Command::Enable { tokens } => {
            let (kind, tokens) = split_kind(&tokens);
            resolver::run_enable(engine, kind, &tokens)
        }
        Command::Disable { tokens } => {
            let (kind, tokens) = split_kind(&tokens);
            resolver::run_disable(engine, kind, &tokens)
        }
        Command::Toggle { tokens } => {
            let (kind, tokens) = split_kind(&tokens);
            resolver::run_toggle(engine, kind, &tokens)
        }
        Command::Cleanup => {
            let (counts, warnings) = resolver::run_cleanup(engine)?;
            println!(
                "removed {} file(s), {} empty collection(s)",
                counts.files, counts.collections
            );
            Ok(warnings)
        }
        Command::Reset => {
            let (counts, warnings) = resolver::run_reset(engine)?;
            println!(
                "unlocked {} file(s), reset {} collection(s)",
                counts.files, counts.collections
            );
            Ok(warnings)
        }
        Command::Uninstall => resolver::run_uninstall(engine),
        Command::Version | Command::Init { .. } | Command::Info | Command::Show { .. } | Command::Config { .. } => {
            unreachable!("handled before dispatch_mutation")
        }
    }
    .map_err(|e| anyhow::anyhow!(e))?;
    Ok(warnings)
}

/// `config show` / `config set {mode|owner|group} <value>` / `config <mode> [owner] [group]`.
/// Returns whether the registry was mutated (and so needs saving).
fn config_command(registry: &mut Registry, tokens: &[String]) -> anyhow::Result<bool> {
    match tokens.first().map(String::as_str) {
        None | Some("show") => {
            let cfg = registry.get_config();
            println!("mode: {}", cfg.default_mode);
            println!("owner: {}", cfg.default_owner);
            println!("group: {}", cfg.default_group);
            if let Some(last) = registry.get_last_toggle() {
                println!("last toggle: {} ({:?})", last.name, last.kind);
            }
            Ok(false)
        }
        Some("set") => {
            let field = tokens.get(1).context("config set requires a field")?;
            let value = tokens.get(2).context("config set requires a value")?;
            apply_config_field(registry, field, value)?;
            Ok(true)
        }
        Some(_) => {
            // positional form: <mode> [owner] [group]
            let mode = guard::path::normalize_mode(&tokens[0])
                .map_err(|e| anyhow::anyhow!(e))
                .context("invalid mode")?;
            let owner = tokens.get(1).cloned();
            let group = tokens.get(2).cloned();
            registry.set_config(Some(mode), owner, group);
            Ok(true)
        }
    }
}

fn apply_config_field(registry: &mut Registry, field: &str, value: &str) -> anyhow::Result<()> {
    match field {
        "mode" => {
            let mode = guard::path::normalize_mode(value)
                .map_err(|e| anyhow::anyhow!(e))
                .context("invalid mode")?;
            registry.set_config(Some(mode), None, None);
        }
        "owner" => registry.set_config(None, Some(value.to_owned()), None),
        "group" => registry.set_config(None, None, Some(value.to_owned())),
        other => bail!("unknown config field '{other}', expected mode|owner|group"),
    }
    Ok(())
}

fn show(registry: &Registry, tokens: &[String]) {
    let (kind, names) = split_kind(tokens);
    match kind {
        Some(Kind::Collection) => show_collections(registry, &names),
        Some(Kind::File) | Some(Kind::Folder) => show_files(registry, &names),
        None if !names.is_empty() => show_files(registry, &names),
        None => {
            show_files(registry, &[]);
            show_collections(registry, &[]);
        }
    }
}

fn show_files(registry: &Registry, names: &[String]) {
    for entry in registry.list_files() {
        if !names.is_empty() && !names.iter().any(|n| n == entry.path.as_str()) {
            continue;
        }
        println!(
            "file {}: mode={} owner={} group={} guard={}",
            entry.path, entry.original_mode, entry.original_owner, entry.original_group, entry.guard
        );
    }
}

fn show_collections(registry: &Registry, names: &[String]) {
    for c in registry.list_collections() {
        if !names.is_empty() && !names.iter().any(|n| n == &c.name) {
            continue;
        }
        println!("collection {}: guard={} files=[{}]", c.name, c.guard, c.files.join(", "));
    }
}

fn main() -> ExitCode {
    init_logging();
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
