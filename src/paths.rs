//! Per-user directory layout.
//!
//! Follows the freedesktop base-directory spec: configuration under
//! `$XDG_CONFIG_HOME` (default `~/.config`), state under `$XDG_STATE_HOME`
//! (default `~/.local/state`).

use std::path::{Path, PathBuf};

const APP_DIR: &str = "deckd";

/// Directory holding `daemon.toml` and the per-deck binding files.
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

/// Created at startup, reserved for future persisted state.
pub fn state_dir() -> PathBuf {
    dirs::state_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

/// Binding file for one deck, named by its serial number.
pub fn binding_file(config_dir: &Path, serial: &str) -> PathBuf {
    config_dir.join(format!("{serial}.toml"))
}

pub fn settings_file(config_dir: &Path) -> PathBuf {
    config_dir.join("daemon.toml")
}
