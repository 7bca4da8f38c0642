use std::fs;
use std::path::Path;

use crate::memory::{Keyspace, MemoryStore};
use crate::ops::{StoreError, StoreResult};

impl MemoryStore {
    /// Encodes the current keyspace as CBOR. Injected faults are not included.
    pub fn encode_snapshot(&self) -> StoreResult<Vec<u8>> {
        let keyspace = self.clone_keyspace();
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(&keyspace, &mut bytes)
            .map_err(|e| StoreError::Snapshot(e.to_string()))?;
        Ok(bytes)
    }

    /// Rebuilds a store from CBOR snapshot bytes.
    pub fn decode_snapshot(bytes: &[u8]) -> StoreResult<Self> {
        let keyspace: Keyspace =
            ciborium::de::from_reader(bytes).map_err(|e| StoreError::Snapshot(e.to_string()))?;
        Ok(MemoryStore::from_keyspace(keyspace))
    }

    /// Saves a snapshot to `path` via a temporary file and rename.
    pub fn snapshot_to_path(&self, path: impl AsRef<Path>) -> StoreResult<()> {
        let bytes = self.encode_snapshot()?;
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> StoreResult<Self> {
        let bytes = fs::read(path.as_ref())?;
        Self::decode_snapshot(&bytes)
    }

    /// Loads a snapshot if the file exists; otherwise returns an empty store.
    pub fn load_or_default(path: impl AsRef<Path>) -> StoreResult<Self> {
        if !path.as_ref().exists() {
            return Ok(MemoryStore::new());
        }
        Self::load_from_path(path)
    }
}
