//! State persistence behind a narrow repository interface.
//!
//! The on-disk layout is a real external contract (other tooling may read
//! these files), so the formats are fixed: `instances.json` is one JSON
//! object keyed by instance name, `ports.json` one object keyed by
//! stringified port number, `compose.yaml` the derived descriptor. The
//! orchestrator only ever talks to [`StateStore`], which makes the backing
//! store swappable in tests ([`MemoryStore`]).

use crate::error::{Error, Result};
use crate::instance::Instance;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Instance registry: name → record. BTreeMap keeps serialization ordered.
pub type RegistryMap = BTreeMap<String, Instance>;

/// Port map: port → owning instance name. serde_json stringifies the keys.
pub type PortMap = BTreeMap<u16, String>;

/// Repository interface over the persisted state.
///
/// Read methods bootstrap empty state when the file is missing or unreadable
/// (first-run semantics); write methods propagate failures, which abort the
/// command.
pub trait StateStore: Send + Sync {
    fn load_registry(&self) -> Result<RegistryMap>;
    fn save_registry(&self, registry: &RegistryMap) -> Result<()>;

    fn load_ports(&self) -> Result<PortMap>;
    fn save_ports(&self, ports: &PortMap) -> Result<()>;

    /// Persist the descriptor, returning the path the engine should be
    /// pointed at.
    fn write_descriptor(&self, yaml: &str) -> Result<PathBuf>;

    /// Root directory for per-instance volume directories.
    fn volumes_dir(&self) -> PathBuf;
}

/// File-backed store rooted at a state directory (default `~/.dbdock`).
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| Error::Persistence {
            action: "create",
            path: root.clone(),
            source: e,
        })?;
        Ok(Self { root })
    }

    pub fn registry_path(&self) -> PathBuf {
        self.root.join("instances.json")
    }

    pub fn ports_path(&self) -> PathBuf {
        self.root.join("ports.json")
    }

    pub fn descriptor_path(&self) -> PathBuf {
        self.root.join("compose.yaml")
    }

    /// Load a JSON document, treating a missing or unreadable file as empty
    /// state. A corrupt file is logged and also treated as empty: read-side
    /// failures must not brick the tool, and the next write replaces the
    /// file wholesale.
    fn load_json<T: serde::de::DeserializeOwned + Default>(&self, path: &Path) -> T {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return T::default(),
            Err(e) => {
                tracing::warn!("Failed to read {}: {}. Starting from empty state.", path.display(), e);
                return T::default();
            }
        };
        match serde_json::from_str(&contents) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Failed to parse {}: {}. Starting from empty state.", path.display(), e);
                T::default()
            }
        }
    }

    /// Atomic write-then-rename, with fsync before the rename so a crash
    /// never leaves a truncated state file.
    fn atomic_write(path: &Path, contents: &str) -> Result<()> {
        let temp_path = path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path).map_err(|e| Error::Persistence {
            action: "create",
            path: temp_path.clone(),
            source: e,
        })?;

        file.write_all(contents.as_bytes())
            .map_err(|e| Error::Persistence {
                action: "write",
                path: temp_path.clone(),
                source: e,
            })?;

        file.sync_all().map_err(|e| Error::Persistence {
            action: "sync",
            path: temp_path.clone(),
            source: e,
        })?;
        drop(file);

        fs::rename(&temp_path, path).map_err(|e| Error::Persistence {
            action: "rename",
            path: path.to_path_buf(),
            source: e,
        })
    }
}

impl StateStore for FileStore {
    fn load_registry(&self) -> Result<RegistryMap> {
        Ok(self.load_json(&self.registry_path()))
    }

    fn save_registry(&self, registry: &RegistryMap) -> Result<()> {
        let contents = serde_json::to_string_pretty(registry)?;
        Self::atomic_write(&self.registry_path(), &contents)
    }

    fn load_ports(&self) -> Result<PortMap> {
        Ok(self.load_json(&self.ports_path()))
    }

    fn save_ports(&self, ports: &PortMap) -> Result<()> {
        let contents = serde_json::to_string_pretty(ports)?;
        Self::atomic_write(&self.ports_path(), &contents)
    }

    fn write_descriptor(&self, yaml: &str) -> Result<PathBuf> {
        let path = self.descriptor_path();
        Self::atomic_write(&path, yaml)?;
        Ok(path)
    }

    fn volumes_dir(&self) -> PathBuf {
        self.root.join("data")
    }
}

/// In-memory store for tests. Volume directories still need a real location,
/// so callers hand in a scratch root (typically a `TempDir` path).
pub struct MemoryStore {
    root: PathBuf,
    registry: Mutex<RegistryMap>,
    ports: Mutex<PortMap>,
    descriptor: Mutex<Option<String>>,
}

impl MemoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            registry: Mutex::new(RegistryMap::new()),
            ports: Mutex::new(PortMap::new()),
            descriptor: Mutex::new(None),
        }
    }

    /// Last descriptor written, if any.
    pub fn descriptor(&self) -> Option<String> {
        self.descriptor.lock().clone()
    }

    pub fn ports_snapshot(&self) -> PortMap {
        self.ports.lock().clone()
    }
}

impl StateStore for MemoryStore {
    fn load_registry(&self) -> Result<RegistryMap> {
        Ok(self.registry.lock().clone())
    }

    fn save_registry(&self, registry: &RegistryMap) -> Result<()> {
        *self.registry.lock() = registry.clone();
        Ok(())
    }

    fn load_ports(&self) -> Result<PortMap> {
        Ok(self.ports.lock().clone())
    }

    fn save_ports(&self, ports: &PortMap) -> Result<()> {
        *self.ports.lock() = ports.clone();
        Ok(())
    }

    fn write_descriptor(&self, yaml: &str) -> Result<PathBuf> {
        *self.descriptor.lock() = Some(yaml.to_string());
        Ok(self.root.join("compose.yaml"))
    }

    fn volumes_dir(&self) -> PathBuf {
        self.root.join("data")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::Status;
    use chrono::Utc;
    use tempfile::TempDir;

    fn sample_instance(name: &str, port: u16) -> Instance {
        Instance {
            name: name.to_string(),
            engine: "postgresql".to_string(),
            port,
            volume: PathBuf::from(format!("/tmp/{}", name)),
            environment: BTreeMap::new(),
            status: Status::Stopped,
            created_at: Utc::now(),
            uri: format!("postgresql://localhost:{}", port),
        }
    }

    #[test]
    fn test_missing_files_bootstrap_empty() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path().join("state")).unwrap();
        assert!(store.load_registry().unwrap().is_empty());
        assert!(store.load_ports().unwrap().is_empty());
    }

    #[test]
    fn test_registry_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path()).unwrap();

        let mut registry = RegistryMap::new();
        registry.insert("app".to_string(), sample_instance("app", 5000));
        store.save_registry(&registry).unwrap();

        let loaded = store.load_registry().unwrap();
        assert_eq!(loaded, registry);
    }

    #[test]
    fn test_port_map_keys_are_stringified() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path()).unwrap();

        let mut ports = PortMap::new();
        ports.insert(5001, "app".to_string());
        store.save_ports(&ports).unwrap();

        let raw = fs::read_to_string(store.ports_path()).unwrap();
        assert!(raw.contains("\"5001\": \"app\""), "raw: {}", raw);
        assert_eq!(store.load_ports().unwrap(), ports);
    }

    #[test]
    fn test_corrupt_file_bootstraps_empty() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path()).unwrap();
        fs::write(store.registry_path(), "{not json").unwrap();
        assert!(store.load_registry().unwrap().is_empty());
    }

    #[test]
    fn test_atomic_write_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path()).unwrap();
        store.save_ports(&PortMap::new()).unwrap();
        assert!(!store.ports_path().with_extension("tmp").exists());
    }

    #[test]
    fn test_memory_store_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new(dir.path());

        let mut ports = PortMap::new();
        ports.insert(6000, "x".to_string());
        store.save_ports(&ports).unwrap();
        assert_eq!(store.load_ports().unwrap(), ports);

        store.write_descriptor("services: {}\n").unwrap();
        assert_eq!(store.descriptor().unwrap(), "services: {}\n");
    }
}
