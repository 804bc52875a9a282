use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::ArtifactStore;
use crate::error::StoreError;

/// Artifacts as plain files in one output directory.
#[derive(Clone, Debug)]
pub struct DirectoryArtifactStore {
    root: PathBuf,
}

impl DirectoryArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_of(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

impl ArtifactStore for DirectoryArtifactStore {
    fn location(&self) -> String {
        self.root.display().to_string()
    }

    /// Writes through a sibling temp file so a crash never leaves a
    /// half-written artifact under its final name.
    fn put(&self, name: &str, contents: &[u8]) -> Result<(), StoreError> {
        let write_error =
            |error: std::io::Error| StoreError::Write { name: name.to_string(), message: error.to_string() };

        fs::create_dir_all(&self.root).map_err(write_error)?;
        let staging = self.path_of(&format!(".{name}.tmp"));
        fs::write(&staging, contents).map_err(write_error)?;
        fs::rename(&staging, self.path_of(name)).map_err(|error| {
            let _ = fs::remove_file(&staging);
            write_error(error)
        })
    }

    fn get(&self, name: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.path_of(name);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Read { path, source }),
        }
    }

    fn remove(&self, name: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.path_of(name)) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
            Err(error) => Err(StoreError::Write { name: name.to_string(), message: error.to_string() }),
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::DirectoryArtifactStore;
    use crate::artifacts::ArtifactStore;

    #[test]
    fn put_creates_the_directory_and_get_reads_back() {
        let dir = TempDir::new().expect("tempdir");
        let store = DirectoryArtifactStore::new(dir.path().join("nested/out"));

        store.put("knn_estado.csv", b"referencia,vizinho\n").expect("put");

        assert_eq!(
            store.get("knn_estado.csv").expect("get"),
            Some(b"referencia,vizinho\n".to_vec())
        );
        assert!(!dir.path().join("nested/out/.knn_estado.csv.tmp").exists());
    }

    #[test]
    fn failed_rename_leaves_no_staging_file() {
        let dir = TempDir::new().expect("tempdir");
        let store = DirectoryArtifactStore::new(dir.path());
        // A non-empty directory under the final name makes the rename fail.
        std::fs::create_dir_all(dir.path().join("knn_estado.csv/occupied")).expect("blocker");

        let error = store.put("knn_estado.csv", b"referencia,vizinho\n").expect_err("rename fails");

        assert_eq!(error.error_class(), "artifact_write");
        assert!(!dir.path().join(".knn_estado.csv.tmp").exists());
    }

    #[test]
    fn absent_files_read_as_none_and_remove_quietly() {
        let dir = TempDir::new().expect("tempdir");
        let store = DirectoryArtifactStore::new(dir.path());

        assert_eq!(store.get("run_manifest.json").expect("get"), None);
        store.remove("run_manifest.json").expect("remove absent");
    }
}
