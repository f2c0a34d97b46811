use thiserror::Error;

/// Unified error taxonomy for the registry, engine and resolver. `main.rs` is
/// the only place this is converted into `anyhow::Error`.
#[derive(Error, Debug)]
pub enum GuardError {
    #[error("invalid {field} '{value}': {reason}")]
    Validation {
        field: String,
        value: String,
        reason: String,
    },

    #[error("{kind} '{name}' not found")]
    NotFound { kind: EntityKind, name: String },

    #[error("{kind} '{name}' already exists")]
    AlreadyExists { kind: EntityKind, name: String },

    #[error("failed to {op}: failed to {step} {value} for {path}: {cause}")]
    Io {
        op: String,
        step: String,
        value: String,
        path: String,
        cause: String,
    },

    #[error("operation '{op}' on '{path}' requires root privileges")]
    Privilege { op: String, path: String },

    #[error("{feature} is not supported on {platform}")]
    Unsupported { feature: String, platform: String },

    #[error("conflicting guard state for collections {collections:?} over shared paths {shared_paths:?} ({states:?})")]
    Conflict {
        collections: Vec<String>,
        shared_paths: Vec<String>,
        states: Vec<(String, bool)>,
    },

    #[error("manifest at '{path}' is corrupt: {reason}")]
    Corruption { path: String, reason: String },

    #[error(transparent)]
    Other(#[from] std::io::Error),
}

/// The three entity kinds a name can resolve to or fail to resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    File,
    Collection,
    Folder,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EntityKind::File => "file",
            EntityKind::Collection => "collection",
            EntityKind::Folder => "folder",
        };
        write!(f, "{s}")
    }
}

pub type Result<T> = std::result::Result<T, GuardError>;

impl GuardError {
    pub fn io(op: impl Into<String>, step: impl Into<String>, value: impl Into<String>, path: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        GuardError::Io {
            op: op.into(),
            step: step.into(),
            value: value.into(),
            path: path.into(),
            cause: cause.to_string(),
        }
    }

    pub fn validation(field: impl Into<String>, value: impl Into<String>, reason: impl Into<String>) -> Self {
        GuardError::Validation {
            field: field.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }
}
