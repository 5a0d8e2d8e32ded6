//! Daemon-wide settings.
//!
//! Optional `daemon.toml` next to the per-deck binding files. Every field
//! has a default, so a missing file just means defaults.

use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DaemonSettings {
    /// Key backlight brightness applied on open and on every clear (percent).
    pub brightness: u8,
    /// Allow `eval` actions from binding files. Off by default: enabling it
    /// means trusting every binding file with in-process script execution.
    pub allow_eval: bool,
    /// Font file for key labels. Unset means the built-in search list.
    pub font: Option<PathBuf>,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            brightness: 80,
            allow_eval: false,
            font: None,
        }
    }
}

impl DaemonSettings {
    /// Load from `path`, or defaults if the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Ok(toml::from_str(&content)?)
        } else {
            Ok(Self::default())
        }
    }
}
