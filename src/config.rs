//! Per-deck binding configuration.
//!
//! One TOML document per deck, named by its serial number. The document is
//! an ordered `[[entry]]` array; each entry either binds one grid cell to a
//! label and its actions, or mutates the process environment:
//!
//! ```toml
//! [[entry]]
//! line = 1
//! column = 1
//! label = "Build"
//! shell = "make"
//! cd = "/proj"
//!
//! [[entry]]
//! PATH = "/opt/tools"
//! ```

use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::Deserialize;
use thiserror::Error;
use tracing::{error, info};

use crate::driver::Geometry;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("configuration file not found")]
    NotFound,

    #[error("read error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

/// One grid-cell binding. `line` and `column` are 1-based.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct KeyBinding {
    pub line: u32,
    pub column: u32,
    pub label: String,
    /// Command run through `/bin/sh -c` on press.
    #[serde(default)]
    pub shell: Option<String>,
    /// Working directory for the shell command.
    #[serde(default)]
    pub cd: Option<PathBuf>,
    /// Expression evaluated in-process on press; requires the `allow_eval`
    /// daemon setting.
    #[serde(default)]
    pub eval: Option<String>,
}

/// Environment mutation entry. Only a PATH prepend is defined.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PathDirective {
    #[serde(rename = "PATH")]
    pub path: String,
}

/// One parsed configuration entry, in file order.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum BindingSpec {
    Key(KeyBinding),
    Path(PathDirective),
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default, rename = "entry")]
    entries: Vec<BindingSpec>,
}

/// Key index → binding, iterated in ascending index order so image
/// rendering order is deterministic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyBindingTable {
    keys: BTreeMap<u8, KeyBinding>,
}

impl KeyBindingTable {
    pub fn get(&self, key: u8) -> Option<&KeyBinding> {
        self.keys.get(&key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u8, &KeyBinding)> {
        self.keys.iter().map(|(k, b)| (*k, b))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn clear(&mut self) {
        self.keys.clear();
    }

    fn insert(&mut self, key: u8, binding: KeyBinding) {
        self.keys.insert(key, binding);
    }
}

/// A successfully loaded configuration.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub table: KeyBindingTable,
    /// Modification time of the file the table was built from.
    pub modified: SystemTime,
}

/// Map a 1-based grid cell to a key index, or `None` if the cell lies
/// outside the grid.
pub fn key_index(line: u32, column: u32, geometry: Geometry) -> Option<u8> {
    if line == 0 || column == 0 || column > geometry.columns as u32 {
        return None;
    }
    let index = (line - 1) * geometry.columns as u32 + (column - 1);
    (index < geometry.key_count as u32).then_some(index as u8)
}

/// Read and apply the binding file at `path`.
///
/// Entries are processed in file order: grid-cell entries land in the table
/// (last write wins per index), PATH entries mutate the process environment
/// immediately. Cells outside the grid are logged and skipped; a parse
/// error aborts the whole load.
pub fn load(path: &Path, geometry: Geometry) -> Result<LoadedConfig, ConfigError> {
    if !path.is_file() {
        return Err(ConfigError::NotFound);
    }
    let modified = std::fs::metadata(path)?.modified()?;
    let parsed: ConfigFile = toml::from_str(&std::fs::read_to_string(path)?)?;

    let mut table = KeyBindingTable::default();
    for spec in parsed.entries {
        match spec {
            BindingSpec::Key(binding) => {
                match key_index(binding.line, binding.column, geometry) {
                    Some(index) => table.insert(index, binding),
                    None => error!(
                        "Binding {:?} at line {} column {} is outside the {}x{} grid, skipping",
                        binding.label,
                        binding.line,
                        binding.column,
                        geometry.key_count / geometry.columns.max(1),
                        geometry.columns
                    ),
                }
            }
            BindingSpec::Path(directive) => prepend_env("PATH", &directive.path),
        }
    }
    Ok(LoadedConfig { table, modified })
}

/// Prepend `fragment` plus the separator to a process-wide variable.
///
/// Cumulative on purpose: reloading a file with a PATH entry prepends
/// again, so the variable grows with every reload.
pub fn prepend_env(name: &str, fragment: &str) {
    let current = env::var(name).unwrap_or_default();
    info!("Prepending {fragment:?} to {name}");
    env::set_var(name, format!("{fragment}:{current}"));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    // Environment mutation is process-wide; serialize the tests that touch it.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const GRID: Geometry = Geometry {
        key_count: 15,
        columns: 5,
    };

    fn write_config(body: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn key_index_is_injective_over_the_grid() {
        let mut seen = std::collections::HashSet::new();
        for line in 1..=3u32 {
            for column in 1..=5u32 {
                let index = key_index(line, column, GRID).unwrap();
                assert!(index < GRID.key_count);
                assert!(seen.insert(index), "duplicate index {index}");
            }
        }
        assert_eq!(seen.len(), GRID.key_count as usize);
    }

    #[test]
    fn key_index_rejects_cells_outside_the_grid() {
        assert_eq!(key_index(0, 1, GRID), None);
        assert_eq!(key_index(1, 0, GRID), None);
        // Column overflow must not alias into the next row
        assert_eq!(key_index(1, 6, GRID), None);
        assert_eq!(key_index(4, 1, GRID), None);
    }

    #[test]
    fn parses_both_entry_shapes() {
        let raw = r#"
            [[entry]]
            line = 1
            column = 2
            label = "Build"
            shell = "make"
            cd = "/proj"

            [[entry]]
            PATH = "/opt/tools"
        "#;
        let parsed: ConfigFile = toml::from_str(raw).unwrap();
        assert_eq!(parsed.entries.len(), 2);
        match &parsed.entries[0] {
            BindingSpec::Key(binding) => {
                assert_eq!(binding.label, "Build");
                assert_eq!(binding.shell.as_deref(), Some("make"));
                assert_eq!(binding.cd.as_deref(), Some(Path::new("/proj")));
                assert_eq!(binding.eval, None);
            }
            other => panic!("expected key binding, got {other:?}"),
        }
        match &parsed.entries[1] {
            BindingSpec::Path(directive) => assert_eq!(directive.path, "/opt/tools"),
            other => panic!("expected PATH directive, got {other:?}"),
        }
    }

    #[test]
    fn later_entries_for_the_same_cell_win() {
        let file = write_config(
            r#"
            [[entry]]
            line = 1
            column = 1
            label = "First"

            [[entry]]
            line = 1
            column = 1
            label = "Second"
        "#,
        );
        let loaded = load(file.path(), GRID).unwrap();
        assert_eq!(loaded.table.len(), 1);
        assert_eq!(loaded.table.get(0).unwrap().label, "Second");
    }

    #[test]
    fn out_of_range_entries_are_skipped() {
        let file = write_config(
            r#"
            [[entry]]
            line = 9
            column = 9
            label = "Nowhere"

            [[entry]]
            line = 1
            column = 1
            label = "Here"
        "#,
        );
        let loaded = load(file.path(), GRID).unwrap();
        assert_eq!(loaded.table.len(), 1);
        assert_eq!(loaded.table.get(0).unwrap().label, "Here");
    }

    #[test]
    fn loading_twice_yields_an_identical_table() {
        let file = write_config(
            r#"
            [[entry]]
            line = 2
            column = 3
            label = "Stable"
            shell = "true"
        "#,
        );
        let first = load(file.path(), GRID).unwrap();
        let second = load(file.path(), GRID).unwrap();
        assert_eq!(first.table, second.table);
    }

    #[test]
    fn missing_file_is_not_found() {
        let result = load(Path::new("/nonexistent/deck.toml"), GRID);
        assert!(matches!(result, Err(ConfigError::NotFound)));
    }

    #[test]
    fn malformed_document_is_a_parse_error() {
        let file = write_config("[[entry]\nnot toml");
        assert!(matches!(load(file.path(), GRID), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn entry_with_neither_shape_is_a_parse_error() {
        let file = write_config(
            r#"
            [[entry]]
            label = "No cell"
        "#,
        );
        assert!(matches!(load(file.path(), GRID), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn prepend_is_cumulative_not_idempotent() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::set_var("DECKD_TEST_VAR", "base");
        prepend_env("DECKD_TEST_VAR", "/opt/tools");
        prepend_env("DECKD_TEST_VAR", "/opt/tools");
        assert_eq!(
            env::var("DECKD_TEST_VAR").unwrap(),
            "/opt/tools:/opt/tools:base"
        );
        env::remove_var("DECKD_TEST_VAR");
    }

    #[test]
    fn path_directives_apply_in_file_order() {
        let _guard = ENV_LOCK.lock().unwrap();
        let original = env::var("PATH").unwrap_or_default();
        let file = write_config(
            r#"
            [[entry]]
            PATH = "/first"

            [[entry]]
            PATH = "/second"
        "#,
        );
        load(file.path(), GRID).unwrap();
        let path = env::var("PATH").unwrap();
        assert!(path.starts_with("/second:/first:"));
        env::set_var("PATH", original);
    }
}
