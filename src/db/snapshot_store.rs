use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::Context;

use crate::models::Position;

type Snapshots = BTreeMap<String, Vec<Position>>;

/// Last-known positions per wallet.
///
/// `get` returns `None` for a wallet never stored, which is different from
/// `Some(vec![])` for a wallet stored with zero positions.
pub trait SnapshotStore: Send + Sync {
    fn get(&self, wallet: &str) -> anyhow::Result<Option<Vec<Position>>>;

    /// Replace the snapshot for `wallet`. No merging.
    fn put(&self, wallet: &str, positions: &[Position]) -> anyhow::Result<()>;
}

/// All snapshots in one JSON object (`{ "0x..": [ {...}, ... ] }`), read
/// and rewritten wholesale on every access.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    // Serializes read-modify-write within the process.
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// A missing file is an empty store. So is an unreadable or corrupt one.
    fn load(&self) -> Snapshots {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Snapshots::new(),
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "State file unreadable, starting with empty state"
                );
                return Snapshots::new();
            }
        };

        match serde_json::from_str(&raw) {
            Ok(snapshots) => snapshots,
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "State file is corrupt, starting with empty state"
                );
                Snapshots::new()
            }
        }
    }

    fn save(&self, snapshots: &Snapshots) -> anyhow::Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create state directory {}", dir.display()))?;
        }

        let body = serde_json::to_string_pretty(snapshots)?;
        // Write-then-rename so a crash mid-write never leaves half a file.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, body)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

impl SnapshotStore for JsonFileStore {
    fn get(&self, wallet: &str) -> anyhow::Result<Option<Vec<Position>>> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("state store lock poisoned"))?;
        Ok(self.load().remove(wallet))
    }

    fn put(&self, wallet: &str, positions: &[Position]) -> anyhow::Result<()> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("state store lock poisoned"))?;
        let mut snapshots = self.load();
        snapshots.insert(wallet.to_string(), positions.to_vec());
        self.save(&snapshots)?;

        tracing::debug!(
            wallet = %wallet,
            count = positions.len(),
            "Saved position snapshot"
        );
        Ok(())
    }
}

/// Process-local store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    snapshots: Mutex<HashMap<String, Vec<Position>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.snapshots.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SnapshotStore for InMemoryStore {
    fn get(&self, wallet: &str) -> anyhow::Result<Option<Vec<Position>>> {
        let snapshots = self
            .snapshots
            .lock()
            .map_err(|_| anyhow::anyhow!("state store lock poisoned"))?;
        Ok(snapshots.get(wallet).cloned())
    }

    fn put(&self, wallet: &str, positions: &[Position]) -> anyhow::Result<()> {
        let mut snapshots = self
            .snapshots
            .lock()
            .map_err(|_| anyhow::anyhow!("state store lock poisoned"))?;
        snapshots.insert(wallet.to_string(), positions.to_vec());
        Ok(())
    }
}
