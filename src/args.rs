//! Command-line grammar (§6). `clap` owns flag parsing; verbs that the
//! spec describes only at the contract level (an optional `file|folder
//! |collection` keyword ahead of a name list, `config`'s two forms) are
//! taken as a raw token list here and split by [`crate::resolver`]'s
//! helpers once the registry is loaded, since the exact surface syntax
//! is explicitly out of this crate's scope.

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "guard", version, about = "Lock down files against accidental changes.", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the manifest in the current directory.
    Init {
        mode: String,
        owner: Option<String>,
        group: Option<String>,
    },

    /// Register files (optionally prefixed with the `file` keyword).
    Add { tokens: Vec<String> },

    /// Unregister files (optionally prefixed with the `file` keyword).
    Remove { tokens: Vec<String> },

    /// Create one or more collections.
    Create { names: Vec<String> },

    /// Disable guard on a collection's files, then unregister it.
    Destroy { names: Vec<String> },

    /// Disable guard on a collection's files and empty its member list.
    Clear { names: Vec<String> },

    /// `update <collection> add|remove <paths>...`
    Update {
        collection: String,
        op: String,
        paths: Vec<String>,
    },

    /// Lock files/folders/collections (optional `file|folder|collection` keyword).
    Enable { tokens: Vec<String> },

    /// Unlock files/folders/collections (optional `file|folder|collection` keyword).
    Disable { tokens: Vec<String> },

    /// Flip the current guard state (optional `file|folder|collection` keyword).
    Toggle { tokens: Vec<String> },

    /// `show [file|collection] [names]...`
    Show { tokens: Vec<String> },

    /// `config show` / `config set {mode|owner|group} <value>` / `config <mode> [owner] [group]`
    Config { tokens: Vec<String> },

    /// Remove stale registry entries (missing files, empty collections/folders).
    Cleanup,

    /// Disable guard everywhere without unregistering anything.
    Reset,

    /// Reset, clean up, verify, then delete the manifest.
    Uninstall,

    /// Print manifest location, counts and privilege state.
    Info,

    /// Print the crate version.
    Version,
}
