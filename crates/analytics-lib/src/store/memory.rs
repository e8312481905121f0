//! In-process artifact store

use super::{ArtifactKey, ArtifactStore, StoreError};
use dashmap::DashMap;

/// Keeps artifacts in memory for the lifetime of the process
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    slots: DashMap<ArtifactKey, Vec<u8>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn save(&self, key: ArtifactKey, blob: &[u8]) -> Result<(), StoreError> {
        self.slots.insert(key, blob.to_vec());
        Ok(())
    }

    fn load(&self, key: ArtifactKey) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.slots.get(&key).map(|entry| entry.value().clone()))
    }

    fn location(&self, key: ArtifactKey) -> String {
        format!("memory://{}", key)
    }
}
