//! # Route Table
//!
//! Maps URL path prefixes to upstream base URLs, each with a protection policy.
//!
//! ## Document format
//!
//! Either a bare JSON array of records or `{"services": [...]}`:
//!
//! ```text
//! {"services": [
//!   {"path": "/api/v1/users", "url": "http://127.0.0.1:9001",
//!    "auth_protection": true, "csrf_protection": true,
//!    "session_protection": false, "rbac_protection": true}
//! ]}
//! ```
//!
//! Missing flags default to `false`, `status` defaults to `true`.
//!
//! ## Lifecycle
//!
//! A [`RouteTable`] is immutable. Reloads build a new table, validate it the same way as the
//! initial load and swap it into the [`RouteTableHandle`]; an invalid document leaves the
//! previous table serving traffic.

mod probe;
mod table;
mod watcher;

#[cfg(test)]
mod tests;

pub use probe::HealthProbe;
pub use table::{save_document, RouteTable, RouteTableHandle, RouteTableStats};
pub use watcher::RouteWatcher;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// region: --- Error

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read route document: {0}")]
    Io(String),

    #[error("malformed route document: {0}")]
    Parse(String),

    #[error("invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: &'static str },

    #[error("invalid upstream url {url:?} for path {path:?}")]
    InvalidUrl { path: String, url: String },

    /// Two entries normalize to the same prefix, so neither would reliably win.
    #[error("duplicate path prefix {0:?}")]
    DuplicatePrefix(String),
}

// endregion: --- Error

// region: --- Route Entry

fn default_true() -> bool {
    true
}

/// One route: prefix, upstream and protection flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteEntry {
    #[serde(rename = "path")]
    pub path_prefix: String,
    #[serde(rename = "url")]
    pub upstream_base_url: String,
    #[serde(rename = "auth_protection", default)]
    pub require_auth: bool,
    #[serde(rename = "csrf_protection", default)]
    pub require_csrf: bool,
    #[serde(rename = "session_protection", default)]
    pub require_session: bool,
    #[serde(rename = "rbac_protection", default)]
    pub require_rbac: bool,
    /// Advisory, written by the health probe. Never consulted when dispatching.
    #[serde(rename = "status", default = "default_true")]
    pub last_health_status: bool,
}

impl RouteEntry {
    pub fn new(path_prefix: &str, upstream_base_url: &str) -> Self {
        Self {
            path_prefix: path_prefix.to_string(),
            upstream_base_url: upstream_base_url.to_string(),
            require_auth: false,
            require_csrf: false,
            require_session: false,
            require_rbac: false,
            last_health_status: true,
        }
    }

    /// Whether this entry's prefix covers `path` on a segment boundary.
    pub fn matches(&self, path: &str) -> bool {
        let prefix = self.path_prefix.as_str();
        prefix == "/"
            || path == prefix
            || (path.starts_with(prefix) && path.as_bytes().get(prefix.len()) == Some(&b'/'))
    }

    /// Upstream URL for `path`: base URL plus the path with the prefix removed.
    ///
    /// Callers must reject paths with dot segments first (see [`has_dot_segment`]); the URL
    /// parser resolves them and the result could leave this entry's base path.
    pub fn upstream_url(&self, path: &str, query: Option<&str>) -> String {
        let base = self.upstream_base_url.trim_end_matches('/');
        let rest = if self.path_prefix == "/" {
            path
        } else {
            path.strip_prefix(self.path_prefix.as_str()).unwrap_or("")
        };

        let mut url = format!("{base}{rest}");
        if let Some(q) = query.filter(|q| !q.is_empty()) {
            url.push('?');
            url.push_str(q);
        }
        url
    }

    /// Validate and normalize (trailing `/` removed except for the root prefix).
    fn normalized(mut self) -> Result<Self, ConfigError> {
        let path = self.path_prefix.trim().to_string();
        if path.is_empty() {
            return Err(ConfigError::InvalidPath {
                path,
                reason: "must not be empty",
            });
        }
        if !path.starts_with('/') {
            return Err(ConfigError::InvalidPath {
                path,
                reason: "must start with '/'",
            });
        }
        if path.contains('?') || path.contains('#') {
            return Err(ConfigError::InvalidPath {
                path,
                reason: "must not contain a query or fragment",
            });
        }

        let trimmed = path.trim_end_matches('/');
        self.path_prefix = if trimmed.is_empty() { "/".to_string() } else { trimmed.to_string() };

        let url = self.upstream_base_url.trim().to_string();
        let valid_url = reqwest::Url::parse(&url)
            .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
            .unwrap_or(false);
        if !valid_url {
            return Err(ConfigError::InvalidUrl {
                path: self.path_prefix,
                url,
            });
        }
        self.upstream_base_url = url;

        Ok(self)
    }
}

/// Whether `path` contains a `.` or `..` segment, plain or percent-encoded.
///
/// Backslashes count as separators since the URL parser treats them as `/` for http(s).
pub fn has_dot_segment(path: &str) -> bool {
    let decoded = path
        .to_ascii_lowercase()
        .replace("%2e", ".")
        .replace("%2f", "/")
        .replace("%5c", "\\");
    decoded
        .split(['/', '\\'])
        .any(|segment| segment == "." || segment == "..")
}

// endregion: --- Route Entry

// region: --- Document

#[derive(Deserialize)]
#[serde(untagged)]
enum RouteDocument {
    List(Vec<RouteEntry>),
    Wrapped { services: Vec<RouteEntry> },
}

#[derive(Serialize)]
struct RouteDocumentOut<'a> {
    services: &'a [RouteEntry],
}

/// Parse and validate a route document. Entries keep document order.
pub fn parse_document(doc: &str) -> Result<Vec<RouteEntry>, ConfigError> {
    let entries = match serde_json::from_str::<RouteDocument>(doc) {
        Ok(RouteDocument::List(entries)) | Ok(RouteDocument::Wrapped { services: entries }) => {
            entries
        }
        Err(e) => return Err(ConfigError::Parse(e.to_string())),
    };

    let entries = entries
        .into_iter()
        .map(RouteEntry::normalized)
        .collect::<Result<Vec<_>, _>>()?;

    let mut seen = std::collections::HashSet::new();
    for entry in &entries {
        if !seen.insert(entry.path_prefix.as_str()) {
            return Err(ConfigError::DuplicatePrefix(entry.path_prefix.clone()));
        }
    }

    Ok(entries)
}

/// Render entries as a `{"services": [...]}` document.
pub fn render_document(entries: &[RouteEntry]) -> Result<String, ConfigError> {
    serde_json::to_string_pretty(&RouteDocumentOut { services: entries })
        .map_err(|e| ConfigError::Parse(e.to_string()))
}

// endregion: --- Document
