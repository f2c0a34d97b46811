//! The on-disk manifest schema (`.guardfile`), serialized with `serde_yaml`.
//! These types are a pure data-transfer layer: [`super::Registry`] converts
//! to and from them at `load`/`save` time and never exposes them directly.

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct ManifestDoc {
    pub config: ManifestConfig,
    #[serde(default)]
    pub files: Vec<ManifestFile>,
    #[serde(default)]
    pub collections: Vec<ManifestCollection>,
    #[serde(default)]
    pub folders: Vec<ManifestFolder>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct ManifestConfig {
    pub guard_mode: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub guard_owner: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub guard_group: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_toggle: Option<ManifestLastToggle>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ManifestLastToggle {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ManifestFile {
    pub path: String,
    pub mode: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub owner: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub group: String,
    pub guard: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ManifestCollection {
    pub name: String,
    #[serde(default)]
    pub files: Vec<String>,
    pub guard: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guard_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guard_owner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guard_group: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ManifestFolder {
    pub name: String,
    pub path: String,
    pub guard: bool,
}
