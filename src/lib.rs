//! `guard` - a local file-protection tool. See `SPEC_FULL.md` for the full
//! design; this crate is the core library the `guard` binary wires a CLI
//! onto.

pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod fsops;
pub mod path;
pub mod registry;
pub mod resolver;
pub mod security;

pub use engine::Engine;
pub use error::{GuardError, Result};
pub use registry::Registry;
pub use security::SecurityWrapper;
