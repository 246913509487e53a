// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::tool::ToolError;

/// Default location for a named JSON store: `<data dir>/embla/<name>.json`.
pub(crate) fn default_path(name: &str) -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("embla")
        .join(format!("{name}.json"))
}

/// Load a JSON list store.  A missing file is an empty store.
pub(crate) fn load<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, ToolError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let raw = std::fs::read_to_string(path)
        .map_err(|e| ToolError::ExecutionFailed(format!("reading {}: {e}", path.display())))?;
    serde_json::from_str(&raw)
        .map_err(|e| ToolError::ExecutionFailed(format!("parsing {}: {e}", path.display())))
}

/// Persist a JSON list store, creating parent directories as needed.
pub(crate) fn save<T: Serialize>(path: &Path, items: &[T]) -> Result<(), ToolError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| ToolError::ExecutionFailed(format!("creating {}: {e}", parent.display())))?;
    }
    let raw = serde_json::to_string_pretty(items)
        .map_err(|e| ToolError::ExecutionFailed(format!("serializing store: {e}")))?;
    std::fs::write(path, raw)
        .map_err(|e| ToolError::ExecutionFailed(format!("writing {}: {e}", path.display())))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let items: Vec<String> = load(&dir.path().join("none.json")).unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("items.json");
        save(&path, &["a".to_string(), "b".to_string()]).unwrap();
        let items: Vec<String> = load(&path).unwrap();
        assert_eq!(items, vec!["a", "b"]);
    }

    #[test]
    fn corrupt_file_is_an_error_not_a_panic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(load::<Vec<String>>(&path).is_err());
    }
}
