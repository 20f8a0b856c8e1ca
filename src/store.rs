//! Persistence for the tunnel document: load-or-default reads, full-document
//! validation, and atomic replacement. The reconciler never writes through
//! this module; mutation belongs to the configuration service alone.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{json, Value};
use thiserror::Error;

use crate::config::{self, SCHEMA_VERSION};

pub const DOCUMENT_FILE: &str = "tunnel_conf.json";

#[derive(Debug, Error)]
pub enum StoreError {
    /// The submitted document failed validation; nothing was written.
    #[error("{0}")]
    Rejected(String),
    #[error("{0}")]
    Io(String),
}

#[derive(Debug, Clone)]
pub struct DocumentStore {
    path: PathBuf,
}

impl DocumentStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            path: data_dir.into().join(DOCUMENT_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn default_document() -> Value {
        json!({ "schema_version": SCHEMA_VERSION, "tunnels": [] })
    }

    /// Read the stored document, creating the default empty one on first
    /// access. A document that exists but cannot be read or parsed is an
    /// error, never silently replaced.
    pub fn load_or_init(&self) -> Result<Value, StoreError> {
        if !self.path.exists() {
            let document = Self::default_document();
            self.persist(&document)?;
            return Ok(document);
        }
        let raw = fs::read_to_string(&self.path)
            .map_err(|e| StoreError::Io(format!("error reading document: {e}")))?;
        serde_json::from_str(&raw).map_err(|e| StoreError::Io(format!("error reading JSON: {e}")))
    }

    /// Validate and persist a full replacement document. All-or-nothing: any
    /// rejection leaves the stored document untouched.
    pub fn replace(&self, document: &Value) -> Result<(), StoreError> {
        validate_document(document).map_err(StoreError::Rejected)?;
        self.persist(document)
    }

    // Temp-file-then-rename so a reader never sees a partial document.
    fn persist(&self, document: &Value) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| StoreError::Io(format!("error creating data dir: {e}")))?;
        }
        let pretty = serde_json::to_string_pretty(document)
            .map_err(|e| StoreError::Io(format!("error encoding document: {e}")))?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, pretty)
            .map_err(|e| StoreError::Io(format!("error writing document: {e}")))?;
        fs::rename(&tmp, &self.path)
            .map_err(|e| StoreError::Io(format!("error writing document: {e}")))?;
        Ok(())
    }
}

fn format_indices(indices: &[usize]) -> String {
    let tags: Vec<String> = indices.iter().map(|i| format!("#{i}")).collect();
    match tags.split_last() {
        Some((last, rest)) if !rest.is_empty() => format!("{} and {last}", rest.join(", ")),
        _ => tags.concat(),
    }
}

/// The write-side rules: every tunnel must validate individually, and no two
/// tunnels may share a `local_port` or a non-empty `name`. Indices in the
/// rejection refer to positions in the submitted document.
pub fn validate_document(document: &Value) -> Result<(), String> {
    let tunnels = document
        .get("tunnels")
        .and_then(Value::as_array)
        .ok_or_else(|| "field 'tunnels' must be a list".to_string())?;

    for (index, tunnel) in tunnels.iter().enumerate() {
        config::validate_tunnel(tunnel, index).map_err(|e| e.to_string())?;
    }

    let mut by_port: BTreeMap<u64, Vec<usize>> = BTreeMap::new();
    let mut by_name: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (index, tunnel) in tunnels.iter().enumerate() {
        if let Some(port) = tunnel.get("local_port").and_then(Value::as_u64) {
            by_port.entry(port).or_default().push(index);
        }
        if let Some(name) = tunnel.get("name").and_then(Value::as_str) {
            let name = name.trim();
            if !name.is_empty() {
                by_name.entry(name).or_default().push(index);
            }
        }
    }

    if let Some((port, indices)) = by_port.iter().find(|(_, indices)| indices.len() > 1) {
        return Err(format!(
            "duplicate local_port {port} (tunnels {})",
            format_indices(indices)
        ));
    }
    if let Some((name, indices)) = by_name.iter().find(|(_, indices)| indices.len() > 1) {
        return Err(format!(
            "duplicate name '{name}' (tunnels {})",
            format_indices(indices)
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tunnel(name: &str, port: u16) -> Value {
        json!({
            "name": name,
            "enabled": true,
            "local_port": port,
            "dest_host": "10.0.0.5",
            "dest_port": 5432,
            "ssh_user": "ops",
            "ssh_host": "10.0.0.1"
        })
    }

    #[test]
    fn first_access_creates_default_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::new(dir.path().join("data"));

        let document = store.load_or_init().unwrap();

        assert_eq!(document, DocumentStore::default_document());
        assert!(store.path().exists());
        // Second read comes back from disk unchanged.
        assert_eq!(store.load_or_init().unwrap(), document);
    }

    #[test]
    fn replace_round_trips_field_for_field() {
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::new(dir.path());
        let document = json!({
            "schema_version": 1,
            "tunnels": [tunnel("db", 5432), tunnel("cache", 6379)]
        });

        store.replace(&document).unwrap();

        assert_eq!(store.load_or_init().unwrap(), document);
        // Stable 2-space indentation on disk.
        let raw = fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("  \"schema_version\": 1"));
    }

    #[test]
    fn duplicate_local_port_is_rejected_with_both_indices() {
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::new(dir.path());
        let original = json!({ "schema_version": 1, "tunnels": [tunnel("db", 5432)] });
        store.replace(&original).unwrap();

        let conflicting = json!({
            "schema_version": 1,
            "tunnels": [tunnel("db", 5432), tunnel("cache", 6379), tunnel("replica", 5432)]
        });
        let err = store.replace(&conflicting).unwrap_err();

        let StoreError::Rejected(detail) = err else {
            panic!("expected rejection");
        };
        assert!(detail.contains("duplicate local_port 5432"));
        assert!(detail.contains("#0 and #2"));
        // The stored document is unchanged after the rejection.
        assert_eq!(store.load_or_init().unwrap(), original);
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let document = json!({
            "tunnels": [tunnel("db", 5432), tunnel("db", 6379)]
        });
        let detail = validate_document(&document).unwrap_err();
        assert!(detail.contains("duplicate name 'db'"));
        assert!(detail.contains("#0 and #1"));
    }

    #[test]
    fn tunnels_field_must_be_a_list() {
        assert!(validate_document(&json!({})).is_err());
        assert!(validate_document(&json!({ "tunnels": "oops" })).is_err());
        assert!(validate_document(&json!({ "tunnels": [] })).is_ok());
    }

    #[test]
    fn invalid_tunnel_is_cited_by_document_index() {
        let mut bad = tunnel("db", 5432);
        bad["dest_host"] = json!("db.internal");
        let document = json!({ "tunnels": [tunnel("web", 8080), bad] });

        let detail = validate_document(&document).unwrap_err();
        assert!(detail.contains("tunnel #1"));
        assert!(detail.contains("IP literal"));
    }

    #[test]
    fn unreadable_existing_document_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::new(dir.path());
        fs::create_dir_all(dir.path()).unwrap();
        fs::write(store.path(), "not json").unwrap();

        let err = store.load_or_init().unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));
    }
}
