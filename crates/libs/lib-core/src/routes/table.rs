use super::{parse_document, render_document, ConfigError, RouteEntry};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

// region: --- Route Table

/// An immutable, versioned set of routes.
#[derive(Debug, Clone, Serialize)]
pub struct RouteTable {
    version: u64,
    loaded_at: DateTime<Utc>,
    /// Document order.
    entries: Vec<RouteEntry>,
    /// Indices into `entries`, longest prefix first.
    #[serde(skip)]
    by_length: Vec<usize>,
}

impl RouteTable {
    /// Build a table from already-validated entries.
    fn build(entries: Vec<RouteEntry>, version: u64) -> Self {
        let mut by_length: Vec<usize> = (0..entries.len()).collect();
        by_length.sort_by_key(|&i| std::cmp::Reverse(entries[i].path_prefix.len()));

        Self {
            version,
            loaded_at: Utc::now(),
            entries,
            by_length,
        }
    }

    /// Parse and validate a document into a table with the given version.
    pub fn from_document(doc: &str, version: u64) -> Result<Self, ConfigError> {
        Ok(Self::build(parse_document(doc)?, version))
    }

    pub fn empty() -> Self {
        Self::build(Vec::new(), 0)
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    pub fn entries(&self) -> &[RouteEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The entry with the longest prefix covering `path`.
    pub fn match_path(&self, path: &str) -> Option<&RouteEntry> {
        self.by_length
            .iter()
            .map(|&i| &self.entries[i])
            .find(|entry| entry.matches(path))
    }

    pub fn to_document(&self) -> Result<String, ConfigError> {
        render_document(&self.entries)
    }

    fn same_routes(&self, other: &[RouteEntry]) -> bool {
        self.entries == other
    }
}

// endregion: --- Route Table

// region: --- Handle

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct RouteTableStats {
    pub version: u64,
    pub routes: usize,
    pub reloads: u64,
    pub rejected_reloads: u64,
}

/// Owner of the active table. Readers clone the `Arc` and drop the lock immediately.
pub struct RouteTableHandle {
    current: RwLock<Arc<RouteTable>>,
    reloads: AtomicU64,
    rejected_reloads: AtomicU64,
}

impl RouteTableHandle {
    pub fn new(table: RouteTable) -> Self {
        Self {
            current: RwLock::new(Arc::new(table)),
            reloads: AtomicU64::new(0),
            rejected_reloads: AtomicU64::new(0),
        }
    }

    /// Initial load. Failure here is fatal for the process.
    pub fn load_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let doc = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.as_ref().display(), e)))?;
        Ok(Self::new(RouteTable::from_document(&doc, 1)?))
    }

    /// Snapshot of the active table.
    pub fn current(&self) -> Arc<RouteTable> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn version(&self) -> u64 {
        self.current().version()
    }

    /// Owned copy of the matching entry, so no lock or snapshot outlives the lookup.
    pub fn match_path(&self, path: &str) -> Option<RouteEntry> {
        self.current().match_path(path).cloned()
    }

    /// Validate `doc` and swap it in. Returns the active version afterwards.
    ///
    /// A document identical to the active routes keeps the current version.
    pub fn reload_from_str(&self, doc: &str) -> Result<u64, ConfigError> {
        let entries = match super::parse_document(doc) {
            Ok(entries) => entries,
            Err(e) => {
                self.rejected_reloads.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(error = %e, "[ROUTES] Reload rejected, keeping current table");
                return Err(e);
            }
        };

        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if guard.same_routes(&entries) {
            return Ok(guard.version());
        }

        let version = guard.version() + 1;
        let routes = entries.len();
        *guard = Arc::new(RouteTable::build(entries, version));
        drop(guard);

        self.reloads.fetch_add(1, Ordering::Relaxed);
        tracing::info!(version, routes, "[ROUTES] Route table reloaded");
        Ok(version)
    }

    pub fn reload_from_file(&self, path: impl AsRef<Path>) -> Result<u64, ConfigError> {
        let doc = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            self.rejected_reloads.fetch_add(1, Ordering::Relaxed);
            ConfigError::Io(format!("{}: {}", path.as_ref().display(), e))
        })?;
        self.reload_from_str(&doc)
    }

    /// Replace health flags, only if no reload happened since `expected_version` was read.
    ///
    /// `statuses` is indexed like the snapshot's entries. The version is unchanged.
    pub fn apply_health(&self, expected_version: u64, statuses: &[bool]) -> bool {
        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if guard.version() != expected_version || guard.len() != statuses.len() {
            return false;
        }

        let mut entries = guard.entries().to_vec();
        for (entry, healthy) in entries.iter_mut().zip(statuses) {
            entry.last_health_status = *healthy;
        }
        *guard = Arc::new(RouteTable::build(entries, expected_version));
        true
    }

    pub fn stats(&self) -> RouteTableStats {
        let table = self.current();
        RouteTableStats {
            version: table.version(),
            routes: table.len(),
            reloads: self.reloads.load(Ordering::Relaxed),
            rejected_reloads: self.rejected_reloads.load(Ordering::Relaxed),
        }
    }
}

// endregion: --- Handle

/// Validate `doc` and atomically replace the file at `path` (temp file + rename).
///
/// Returns the validated entries. Nothing is written when validation fails.
pub async fn save_document(path: impl AsRef<Path>, doc: &str) -> Result<Vec<RouteEntry>, ConfigError> {
    let path = path.as_ref();
    let entries = parse_document(doc)?;
    let rendered = render_document(&entries)?;

    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, rendered.as_bytes())
        .await
        .map_err(|e| ConfigError::Io(format!("{}: {}", tmp.display(), e)))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;

    Ok(entries)
}
