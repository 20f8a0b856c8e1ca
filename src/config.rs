use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Well-known document locations, tried in order when no path is given.
pub const DEFAULT_DOCUMENT: &str = "conf_files/conf.json";
pub const FALLBACK_DOCUMENT: &str = "conf_files/tunnel_conf.json";

pub const SCHEMA_VERSION: u64 = 1;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("configuration document not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("error reading JSON: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("tunnel #{index}: {reason}")]
pub struct InvalidTunnel {
    pub index: usize,
    pub reason: String,
}

/// One declared local forward, produced by [`validate_tunnel`]. Defaults for
/// `enabled` and `ssh_port` are applied here, once, and nowhere else.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TunnelSpec {
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub local_port: u16,
    pub dest_host: IpAddr,
    pub dest_port: u16,
    pub ssh_user: String,
    pub ssh_host: IpAddr,
    #[serde(default = "default_ssh_port")]
    pub ssh_port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

fn default_enabled() -> bool {
    true
}

fn default_ssh_port() -> u16 {
    22
}

/// The stored document. Tunnel records stay raw here so one bad record can be
/// rejected on its own without invalidating the rest of the document.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TunnelDocument {
    #[serde(default = "default_schema_version")]
    pub schema_version: u64,
    pub tunnels: Vec<Value>,
}

fn default_schema_version() -> u64 {
    SCHEMA_VERSION
}

pub fn parse_document(raw: &str) -> Result<TunnelDocument, DocumentError> {
    serde_json::from_str(raw).map_err(|e| DocumentError::Malformed(e.to_string()))
}

pub fn load_document(path: &Path) -> Result<TunnelDocument, DocumentError> {
    if !path.exists() {
        return Err(DocumentError::NotFound(path.to_path_buf()));
    }
    let raw = fs::read_to_string(path).map_err(|e| DocumentError::Malformed(e.to_string()))?;
    parse_document(&raw)
}

/// Resolve the document path: explicit argument (tilde-expanded), otherwise
/// the primary well-known location, otherwise the fallback.
pub fn resolve_document_path(arg: Option<&str>) -> PathBuf {
    match arg {
        Some(path) => PathBuf::from(shellexpand::tilde(path).to_string()),
        None => {
            let primary = PathBuf::from(DEFAULT_DOCUMENT);
            if primary.exists() {
                primary
            } else {
                PathBuf::from(FALLBACK_DOCUMENT)
            }
        }
    }
}

/// Whether a raw record takes part in reconciliation. A missing or non-boolean
/// `enabled` counts as enabled; the type error is reported by validation.
pub fn is_enabled(raw: &Value) -> bool {
    raw.get("enabled").map_or(true, |v| v.as_bool().unwrap_or(true))
}

fn invalid(index: usize, reason: impl Into<String>) -> InvalidTunnel {
    InvalidTunnel {
        index,
        reason: reason.into(),
    }
}

fn string_field(
    record: &Map<String, Value>,
    key: &str,
    index: usize,
) -> Result<String, InvalidTunnel> {
    match record.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.clone()),
        Some(Value::String(_)) => Err(invalid(index, format!("'{key}' must not be empty"))),
        _ => Err(invalid(index, format!("'{key}' must be a string"))),
    }
}

fn port_value(value: &Value, key: &str, index: usize) -> Result<u16, InvalidTunnel> {
    match value.as_i64() {
        Some(port) if (1..=65535).contains(&port) => Ok(port as u16),
        Some(_) => Err(invalid(index, format!("'{key}' out of range 1-65535"))),
        None => Err(invalid(index, format!("'{key}' must be an integer"))),
    }
}

fn ip_field(record: &Map<String, Value>, key: &str, index: usize) -> Result<IpAddr, InvalidTunnel> {
    let raw = match record.get(key) {
        Some(Value::String(s)) => s,
        _ => return Err(invalid(index, format!("'{key}' must be a string"))),
    };
    raw.trim()
        .parse()
        .map_err(|_| invalid(index, format!("'{key}' must be an IP literal")))
}

/// Validate one raw record into a [`TunnelSpec`]. Pure; touches no socket or
/// file. `index` only tags the error.
pub fn validate_tunnel(raw: &Value, index: usize) -> Result<TunnelSpec, InvalidTunnel> {
    let record = raw
        .as_object()
        .ok_or_else(|| invalid(index, "must be an object"))?;

    const REQUIRED: [&str; 6] = [
        "name",
        "local_port",
        "dest_host",
        "dest_port",
        "ssh_user",
        "ssh_host",
    ];
    let missing: Vec<&str> = REQUIRED
        .iter()
        .copied()
        .filter(|key| matches!(record.get(*key), None | Some(Value::Null)))
        .collect();
    if !missing.is_empty() {
        return Err(invalid(
            index,
            format!("missing required fields: {}", missing.join(", ")),
        ));
    }

    let enabled = match record.get("enabled") {
        None | Some(Value::Null) => true,
        Some(Value::Bool(flag)) => *flag,
        Some(_) => return Err(invalid(index, "'enabled' must be a boolean")),
    };

    let ssh_port = match record.get("ssh_port") {
        None | Some(Value::Null) => default_ssh_port(),
        Some(value) => port_value(value, "ssh_port", index)?,
    };

    let tags = match record.get("tags") {
        None | Some(Value::Null) => None,
        Some(Value::Array(items)) => {
            let mut tags = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::String(tag) => tags.push(tag.clone()),
                    _ => return Err(invalid(index, "'tags' must be a list of strings")),
                }
            }
            Some(tags)
        }
        Some(_) => return Err(invalid(index, "'tags' must be a list of strings")),
    };

    Ok(TunnelSpec {
        name: string_field(record, "name", index)?,
        enabled,
        local_port: port_value(&record["local_port"], "local_port", index)?,
        dest_host: ip_field(record, "dest_host", index)?,
        dest_port: port_value(&record["dest_port"], "dest_port", index)?,
        ssh_user: string_field(record, "ssh_user", index)?,
        ssh_host: ip_field(record, "ssh_host", index)?,
        ssh_port,
        tags,
    })
}
