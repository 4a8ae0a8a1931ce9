use crate::error::{ParleyError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::Path;

/// Write `bytes` to a sibling temp file and rename it over `path`, so a crash
/// never leaves a half-written record behind.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| {
            ParleyError::storage(format!("Failed to create {}: {e}", parent.display()))
        })?;
    }

    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, bytes).map_err(|e| {
        ParleyError::storage(format!("Failed to write {}: {e}", tmp_path.display()))
    })?;

    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        ParleyError::storage(format!("Failed to replace {}: {e}", path.display()))
    })?;

    tracing::debug!(path = %path.display(), bytes = bytes.len(), "wrote file");
    Ok(())
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let contents = serde_json::to_string_pretty(value)
        .map_err(|e| ParleyError::storage(format!("Failed to serialize: {e}")))?;
    write_atomic(path, contents.as_bytes())
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = fs::read_to_string(path).map_err(|e| {
        ParleyError::storage(format!("Failed to read {}: {e}", path.display()))
    })?;
    serde_json::from_str(&contents).map_err(|e| {
        ParleyError::storage(format!("Failed to parse {}: {e}", path.display()))
    })
}

pub fn remove_file(path: &Path) -> Result<()> {
    fs::remove_file(path)
        .map_err(|e| ParleyError::storage(format!("Failed to delete {}: {e}", path.display())))
}

/// Resolve `key` against a set of ids: an exact id wins, otherwise a unique
/// prefix. `None` means nothing matched; several matches is a validation
/// error.
pub fn resolve_prefix<'a, I>(kind: &str, key: &str, ids: I) -> Result<Option<String>>
where
    I: IntoIterator<Item = &'a str>,
{
    let key = key.trim();
    if key.is_empty() {
        return Ok(None);
    }

    let mut matches = Vec::new();
    for id in ids {
        if id == key {
            return Ok(Some(id.to_string()));
        }
        if id.starts_with(key) {
            matches.push(id);
        }
    }

    match matches.len() {
        0 => Ok(None),
        1 => Ok(Some(matches[0].to_string())),
        n => Err(ParleyError::validation(format!(
            "{kind} id prefix '{key}' is ambiguous ({n} matches)"
        ))),
    }
}

/// First eight characters of an id, for display.
pub fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_atomic_replaces_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("record.json");

        write_atomic(&path, b"one").unwrap();
        write_atomic(&path, b"two").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "two");
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_read_json_reports_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "{not json").unwrap();

        let result: Result<serde_json::Value> = read_json(&path);
        assert!(matches!(result, Err(ParleyError::Storage(_))));
    }

    #[test]
    fn test_resolve_prefix() {
        let ids = ["abc123", "abd456", "xyz789"];
        assert_eq!(
            resolve_prefix("Session", "xy", ids).unwrap(),
            Some("xyz789".to_string())
        );
        assert_eq!(
            resolve_prefix("Session", "abc123", ids).unwrap(),
            Some("abc123".to_string())
        );
        assert_eq!(resolve_prefix("Session", "q", ids).unwrap(), None);
        assert!(matches!(
            resolve_prefix("Session", "ab", ids),
            Err(ParleyError::Validation(_))
        ));
    }

    #[test]
    fn test_short_id() {
        assert_eq!(short_id("0123456789"), "01234567");
        assert_eq!(short_id("abc"), "abc");
    }
}
