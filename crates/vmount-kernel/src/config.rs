//! Static mount configuration.
//!
//! Read once, before the registry's `init`, from a TOML document:
//!
//! ```toml
//! default_mount = "home"
//!
//! [mounts.home]
//! transport = "local"
//! options = { root = "/srv/home" }
//!
//! [mounts.share]
//! transport = "memory"
//! read_only = true
//! internal = false            # default comes from the transport kind
//! pattern = "^(share|s)://"   # default is ^<name>://
//!
//! [mime]
//! ".pdf" = "application/pdf"
//! ```
//!
//! Mounts keep their declaration order. Entries with `enabled = false` are
//! skipped entirely.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use vmount_types::MimeTable;

use crate::vfs::MountParams;

/// Errors loading static configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse mount config: {0}")]
    Parse(#[from] toml::de::Error),
}

fn default_true() -> bool {
    true
}

/// One `[mounts.<name>]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MountConfig {
    pub transport: String,
    #[serde(default)]
    pub options: Map<String, Value>,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub internal: Option<bool>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub special: bool,
}

impl MountConfig {
    /// Registration params for this entry under `name`.
    pub fn to_params(&self, name: &str) -> MountParams {
        MountParams {
            name: name.to_string(),
            transport: self.transport.clone(),
            options: self.options.clone(),
            read_only: self.read_only,
            visible: self.visible,
            internal: self.internal,
            pattern: self.pattern.clone(),
            special: self.special,
            dynamic: false,
        }
    }
}

/// Parsed static configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VfsConfig {
    /// Mount name `resolve` falls back to for unmatched paths.
    pub default_mount: Option<String>,
    pub mounts: IndexMap<String, MountConfig>,
    /// Extension → content-type overrides.
    pub mime: IndexMap<String, String>,
}

impl VfsConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    /// Params for every enabled mount, in declaration order.
    pub fn enabled_mounts(&self) -> impl Iterator<Item = MountParams> + '_ {
        self.mounts
            .iter()
            .filter(|(_, mount)| mount.enabled)
            .map(|(name, mount)| mount.to_params(name))
    }

    /// Names of mounts declared with `enabled = false`.
    pub fn disabled_mounts(&self) -> impl Iterator<Item = &str> {
        self.mounts
            .iter()
            .filter(|(_, mount)| !mount.enabled)
            .map(|(name, _)| name.as_str())
    }

    /// Built-in content types with this config's `[mime]` overrides.
    pub fn mime_table(&self) -> MimeTable {
        MimeTable::with_overrides(self.mime.iter().map(|(ext, ty)| (ext.as_str(), ty.as_str())))
    }
}
