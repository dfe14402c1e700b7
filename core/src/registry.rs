//! Process registry: versioned JSON storage of launched process records
//!
//! Keeps records of launched processes so they can be found, monitored and
//! cleaned up across launcher restarts. Writes are crash-safe via
//! write-to-temp + fsync + rename. Reads validate version and structure;
//! corrupted files surface errors so callers can recover with a clean state,
//! while a missing file reads as an empty registry.
//!
//! Activity of a record is computed through the process probe: the PID must
//! exist, and when both the record and the host expose a start time, the two
//! must agree within tolerance. A reused PID therefore does not keep a dead
//! record alive.

use crate::probe::{start_time_matches, ProcessProbe};
use crate::{LaunchError, Result};
use schema::ProcessRecord;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Registry file format version
pub const REGISTRY_VERSION: u32 = 1;

/// Environment variable overriding the registry file location
pub const REGISTRY_FILE_ENV: &str = "LAUNCHKIT_REGISTRY_FILE";

/// Full registry snapshot written to disk
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RegistrySnapshot {
    /// Format version
    pub version: u32,
    /// RFC3339 timestamp when this snapshot was produced
    pub timestamp: String,
    /// Stored records, newest first
    pub records: Vec<ProcessRecord>,
}

impl RegistrySnapshot {
    /// Create an empty snapshot
    pub fn empty() -> Self {
        Self {
            version: REGISTRY_VERSION,
            timestamp: schema::current_timestamp(),
            records: Vec::new(),
        }
    }
}

/// A stored record annotated with its current activity
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryEntry {
    /// The stored record
    pub record: ProcessRecord,
    /// Whether the recorded process is still running
    pub active: bool,
}

/// Return a default registry path.
///
/// Order:
/// - `LAUNCHKIT_REGISTRY_FILE` env var if provided
/// - `$HOME/.launchkit/registry.json` if HOME exists
/// - `./launchkit_registry.json` otherwise
pub fn default_registry_path() -> PathBuf {
    if let Ok(p) = std::env::var(REGISTRY_FILE_ENV) {
        return PathBuf::from(p);
    }
    if let Some(home) = dirs_next::home_dir() {
        return home.join(".launchkit").join("registry.json");
    }
    PathBuf::from("launchkit_registry.json")
}

/// File-backed registry of launched processes
pub struct ProcessRegistry {
    path: PathBuf,
    probe: Arc<dyn ProcessProbe>,
}

impl ProcessRegistry {
    /// Create a registry stored at `path`, probing liveness through `probe`
    pub fn new(path: impl Into<PathBuf>, probe: Arc<dyn ProcessProbe>) -> Self {
        Self {
            path: path.into(),
            probe,
        }
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Insert or replace a record, keyed by [`ProcessRecord::key`]
    pub fn store(&self, record: ProcessRecord) -> Result<()> {
        let mut snapshot = self.load()?;
        let key = record.key();
        snapshot.records.retain(|existing| existing.key() != key);
        snapshot.records.insert(0, record);
        self.write(&snapshot)?;
        debug!("Stored process record {}", key);
        Ok(())
    }

    /// Look up a record by key
    pub fn get(&self, key: &str) -> Result<Option<ProcessRecord>> {
        let snapshot = self.load()?;
        Ok(snapshot.records.into_iter().find(|r| r.key() == key))
    }

    /// Look up the most recent record with the given name
    pub fn get_by_name(&self, name: &str) -> Result<Option<ProcessRecord>> {
        let snapshot = self.load()?;
        Ok(snapshot.records.into_iter().find(|r| r.name == name))
    }

    /// All records, newest first, each annotated with an activity flag
    pub async fn list(&self) -> Result<Vec<RegistryEntry>> {
        let snapshot = self.load()?;
        let mut entries = Vec::with_capacity(snapshot.records.len());
        for record in snapshot.records {
            let active = self.is_record_active(&record).await;
            entries.push(RegistryEntry { record, active });
        }
        Ok(entries)
    }

    /// Remove a record by key; returns whether it existed
    pub fn remove(&self, key: &str) -> Result<bool> {
        let mut snapshot = self.load()?;
        let before = snapshot.records.len();
        snapshot.records.retain(|r| r.key() != key);
        let removed = snapshot.records.len() < before;
        if removed {
            self.write(&snapshot)?;
        }
        Ok(removed)
    }

    /// Drop every record whose process is no longer running.
    ///
    /// Returns the number of records removed.
    pub async fn prune_inactive(&self) -> Result<usize> {
        let entries = self.list().await?;
        let mut snapshot = RegistrySnapshot::empty();
        let mut pruned = 0;
        for entry in entries {
            if entry.active {
                snapshot.records.push(entry.record);
            } else {
                pruned += 1;
            }
        }
        if pruned > 0 {
            self.write(&snapshot)?;
            debug!("Pruned {} inactive process records", pruned);
        }
        Ok(pruned)
    }

    /// Liveness plus start-time cross-check for one record
    async fn is_record_active(&self, record: &ProcessRecord) -> bool {
        if !self.probe.is_alive(record.pid) {
            return false;
        }
        let probed = self.probe.start_time(record.pid).await;
        start_time_matches(record.start_time, probed)
    }

    /// Load the snapshot; a missing file is an empty registry
    fn load(&self) -> Result<RegistrySnapshot> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(RegistrySnapshot::empty());
            }
            Err(e) => {
                return Err(LaunchError::Io(std::io::Error::new(
                    e.kind(),
                    format!("Failed to read registry {}: {}", self.path.display(), e),
                )));
            }
        };

        let snapshot: RegistrySnapshot =
            serde_json::from_str(&content).map_err(LaunchError::Serialization)?;

        if snapshot.version != REGISTRY_VERSION {
            return Err(LaunchError::Validation(format!(
                "Unsupported registry version {} (expected {})",
                snapshot.version, REGISTRY_VERSION
            )));
        }

        Ok(snapshot)
    }

    /// Atomically write a snapshot to the backing file.
    ///
    /// Steps:
    /// - Ensure the parent directory exists
    /// - Write JSON to a temp file in the same directory
    /// - `flush` + `sync_all` on the temp file
    /// - `rename` the temp file over the destination
    /// - Best-effort fsync of the directory to persist the rename
    fn write(&self, snapshot: &RegistrySnapshot) -> Result<()> {
        let mut snapshot = snapshot.clone();
        snapshot.timestamp = schema::current_timestamp();

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    LaunchError::Io(std::io::Error::new(
                        e.kind(),
                        format!("Failed to create registry dir {}: {}", parent.display(), e),
                    ))
                })?;
            }
        }

        let tmp_path = self.path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(&snapshot).map_err(LaunchError::Serialization)?;

        let mut tmp = File::create(&tmp_path)?;
        tmp.write_all(json.as_bytes())?;
        tmp.flush()?;
        tmp.sync_all()?;
        drop(tmp);

        fs::rename(&tmp_path, &self.path)?;

        if let Some(parent) = self.path.parent() {
            if let Ok(dir) = File::open(parent) {
                if let Err(e) = dir.sync_all() {
                    warn!("Failed to fsync registry dir {}: {}", parent.display(), e);
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::MockProbe;
    use schema::LaunchRequest;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU64, Ordering};

    static TEST_SEQ: AtomicU64 = AtomicU64::new(0);

    fn test_path() -> PathBuf {
        std::env::temp_dir().join(format!(
            "launchkit-registry-test-{}-{}.json",
            std::process::id(),
            TEST_SEQ.fetch_add(1, Ordering::Relaxed)
        ))
    }

    fn record(name: &str, pid: u32, start_time: Option<f64>) -> ProcessRecord {
        let request = LaunchRequest {
            name: name.to_string(),
            command: "/usr/bin/app".to_string(),
            args: vec![],
            environment: HashMap::new(),
            working_directory: None,
        };
        ProcessRecord::from_request(&request, pid, start_time)
    }

    struct Cleanup(PathBuf);
    impl Drop for Cleanup {
        fn drop(&mut self) {
            let _ = fs::remove_file(&self.0);
        }
    }

    #[tokio::test]
    async fn test_missing_file_is_empty_registry() {
        let registry = ProcessRegistry::new(test_path(), Arc::new(MockProbe::new()));
        assert!(registry.list().await.unwrap().is_empty());
        assert_eq!(registry.get_by_name("editor").unwrap(), None);
    }

    #[tokio::test]
    async fn test_store_and_lookup() {
        let path = test_path();
        let _cleanup = Cleanup(path.clone());
        let probe = MockProbe::new();
        let registry = ProcessRegistry::new(path, Arc::new(probe.clone()));

        let record = record("editor", 4321, Some(1700000000.0));
        let key = record.key();
        registry.store(record.clone()).unwrap();

        assert_eq!(registry.get(&key).unwrap(), Some(record.clone()));
        assert_eq!(registry.get_by_name("editor").unwrap(), Some(record));
        assert_eq!(registry.get("other:1").unwrap(), None);
    }

    #[tokio::test]
    async fn test_store_replaces_same_key() {
        let path = test_path();
        let _cleanup = Cleanup(path.clone());
        let registry = ProcessRegistry::new(path, Arc::new(MockProbe::new()));

        let first = record("editor", 4321, Some(1700000000.0));
        let mut second = first.clone();
        second.command = "/usr/local/bin/app".to_string();

        registry.store(first.clone()).unwrap();
        registry.store(second.clone()).unwrap();

        let entries = registry.list().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].record.command, "/usr/local/bin/app");
    }

    #[tokio::test]
    async fn test_active_flag_follows_liveness() {
        let path = test_path();
        let _cleanup = Cleanup(path.clone());
        let probe = MockProbe::new();
        let registry = ProcessRegistry::new(path, Arc::new(probe.clone()));

        registry.store(record("editor", 4321, None)).unwrap();

        let entries = registry.list().await.unwrap();
        assert!(!entries[0].active);

        probe.add_live(4321);
        let entries = registry.list().await.unwrap();
        assert!(entries[0].active);
    }

    #[tokio::test]
    async fn test_start_time_mismatch_marks_inactive() {
        let path = test_path();
        let _cleanup = Cleanup(path.clone());
        let probe = MockProbe::new();
        let registry = ProcessRegistry::new(path, Arc::new(probe.clone()));

        // PID exists but was reused: the host start time disagrees with the
        // recorded one by far more than the tolerance
        probe.add_live(4321);
        probe.set_start_time(4321, 1700009999.0);
        registry
            .store(record("editor", 4321, Some(1700000000.0)))
            .unwrap();

        let entries = registry.list().await.unwrap();
        assert!(!entries[0].active);
    }

    #[tokio::test]
    async fn test_prune_inactive() {
        let path = test_path();
        let _cleanup = Cleanup(path.clone());
        let probe = MockProbe::new();
        let registry = ProcessRegistry::new(path, Arc::new(probe.clone()));

        probe.add_live(100);
        registry.store(record("alive", 100, None)).unwrap();
        registry.store(record("dead-one", 200, None)).unwrap();
        registry.store(record("dead-two", 300, None)).unwrap();

        let pruned = registry.prune_inactive().await.unwrap();
        assert_eq!(pruned, 2);

        let entries = registry.list().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].record.name, "alive");

        // Second prune is a no-op
        assert_eq!(registry.prune_inactive().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_remove() {
        let path = test_path();
        let _cleanup = Cleanup(path.clone());
        let registry = ProcessRegistry::new(path, Arc::new(MockProbe::new()));

        let record = record("editor", 4321, None);
        let key = record.key();
        registry.store(record).unwrap();

        assert!(registry.remove(&key).unwrap());
        assert!(!registry.remove(&key).unwrap());
        assert_eq!(registry.get(&key).unwrap(), None);
    }

    #[tokio::test]
    async fn test_corrupted_file_surfaces_error() {
        let path = test_path();
        let _cleanup = Cleanup(path.clone());
        fs::write(&path, "{not json").unwrap();

        let registry = ProcessRegistry::new(path, Arc::new(MockProbe::new()));
        assert!(matches!(
            registry.list().await.unwrap_err(),
            LaunchError::Serialization(_)
        ));
    }

    #[tokio::test]
    async fn test_version_mismatch_is_validation_error() {
        let path = test_path();
        let _cleanup = Cleanup(path.clone());
        let snapshot = serde_json::json!({
            "version": 99,
            "timestamp": schema::current_timestamp(),
            "records": []
        });
        fs::write(&path, snapshot.to_string()).unwrap();

        let registry = ProcessRegistry::new(path, Arc::new(MockProbe::new()));
        assert!(matches!(
            registry.list().await.unwrap_err(),
            LaunchError::Validation(_)
        ));
    }
}
