//! Per-domain watermark store
//!
//! Maps a domain key to the highest issuance identifier already processed.
//! The store is loaded once at the start of a run, mutated in memory, and
//! written back once at the end with an atomic replace: the document is
//! serialized to a temporary file in the target directory, checked to be
//! non-empty, synced, and renamed over the target. Readers of the file see
//! either the previous or the new version, never a partial write.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::error::{CtMonitorError, Result};

/// Normalize a domain name into a watermark key.
///
/// Every character that is not ASCII alphanumeric is replaced with `-`, so
/// `example.com` becomes `example-com`.
///
/// # Examples
///
/// ```
/// use ct_monitor::watermark::domain_key;
///
/// assert_eq!(domain_key("example.com"), "example-com");
/// assert_eq!(domain_key("*.api.example.com"), "--api-example-com");
/// ```
pub fn domain_key(domain: &str) -> String {
    domain
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect()
}

/// Result of [`WatermarkStore::persist`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    /// The target file was atomically replaced.
    Written,
    /// Serialization produced an empty file; the target was left untouched.
    SkippedEmpty,
}

/// In-memory watermark entries backed by a YAML document on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatermarkStore {
    entries: BTreeMap<String, u64>,
}

impl WatermarkStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the store from `path`.
    ///
    /// A missing or zero-length file yields an empty store. Any other read
    /// or parse failure is returned as `CtMonitorError::Persistence`.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "Watermark file not found, starting empty");
                return Ok(Self::new());
            }
            Err(e) => {
                return Err(CtMonitorError::Persistence(format!(
                    "failed to read {}: {}",
                    path.display(),
                    e
                ))
                .into())
            }
        };

        if contents.trim().is_empty() {
            info!(path = %path.display(), "Watermark file is empty, starting empty");
            return Ok(Self::new());
        }

        let entries: BTreeMap<String, u64> = serde_yaml::from_str(&contents).map_err(|e| {
            CtMonitorError::Persistence(format!("failed to parse {}: {}", path.display(), e))
        })?;

        info!(
            path = %path.display(),
            entries = entries.len(),
            "Loaded watermark file"
        );

        Ok(Self { entries })
    }

    /// Last processed identifier for `key`, or 0 when the key is unseen.
    pub fn get(&self, key: &str) -> u64 {
        self.entries.get(key).copied().unwrap_or(0)
    }

    /// Record `id` for `key` in memory.
    ///
    /// No ordering check is performed; callers only ever advance a key.
    pub fn set(&mut self, key: impl Into<String>, id: u64) {
        self.entries.insert(key.into(), id);
    }

    /// Iterate entries in key order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, u64)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Atomically write the full store to `path`.
    ///
    /// The parent directory is created if needed. Any failure before the
    /// final rename leaves the existing file untouched and removes the
    /// temporary file.
    pub fn persist(&self, path: &Path) -> Result<PersistOutcome> {
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent).map_err(|e| {
            CtMonitorError::Persistence(format!(
                "failed to create directory {}: {}",
                parent.display(),
                e
            ))
        })?;

        let payload = serde_yaml::to_string(&self.entries)?;

        let mut temp = tempfile::Builder::new()
            .prefix(".positions.")
            .suffix(".yaml.tmp")
            .tempfile_in(parent)
            .map_err(|e| {
                CtMonitorError::Persistence(format!("failed to create temp file: {}", e))
            })?;
        temp.write_all(payload.as_bytes())
            .map_err(|e| CtMonitorError::Persistence(format!("failed to write temp file: {}", e)))?;
        temp.as_file()
            .sync_all()
            .map_err(|e| CtMonitorError::Persistence(format!("failed to sync temp file: {}", e)))?;

        let size = temp
            .as_file()
            .metadata()
            .map_err(|e| CtMonitorError::Persistence(format!("failed to stat temp file: {}", e)))?
            .len();
        if size == 0 {
            warn!(path = %path.display(), "Serialized watermark store is empty, not replacing file");
            return Ok(PersistOutcome::SkippedEmpty);
        }

        temp.persist(path).map_err(|e| {
            CtMonitorError::Persistence(format!("failed to persist {}: {}", path.display(), e))
        })?;

        debug!(path = %path.display(), entries = self.entries.len(), "Persisted watermark file");

        Ok(PersistOutcome::Written)
    }
}
