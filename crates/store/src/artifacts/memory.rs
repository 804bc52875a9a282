use std::collections::BTreeMap;
use std::sync::RwLock;

use super::ArtifactStore;
use crate::error::StoreError;

#[derive(Debug, Default)]
pub struct InMemoryArtifactStore {
    files: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl InMemoryArtifactStore {
    pub fn names(&self) -> Result<Vec<String>, StoreError> {
        let files = self.files.read().map_err(|_| StoreError::Poisoned)?;
        Ok(files.keys().cloned().collect())
    }
}

impl ArtifactStore for InMemoryArtifactStore {
    fn location(&self) -> String {
        "memory".to_string()
    }

    fn put(&self, name: &str, contents: &[u8]) -> Result<(), StoreError> {
        let mut files = self.files.write().map_err(|_| StoreError::Poisoned)?;
        files.insert(name.to_string(), contents.to_vec());
        Ok(())
    }

    fn get(&self, name: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let files = self.files.read().map_err(|_| StoreError::Poisoned)?;
        Ok(files.get(name).cloned())
    }

    fn remove(&self, name: &str) -> Result<(), StoreError> {
        let mut files = self.files.write().map_err(|_| StoreError::Poisoned)?;
        files.remove(name);
        Ok(())
    }
}
