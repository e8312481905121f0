//! Filesystem-backed artifact store
//!
//! Each slot is `<dir>/<file_name>`. The file holds a hex SHA-256 of the
//! payload on its first line followed by the payload. Writes go to a
//! temporary sibling and are renamed into place, so readers see either the
//! previous artifact or the new one.

use super::{ArtifactKey, ArtifactStore, StoreError};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Stores artifacts as checksummed files in one directory
#[derive(Debug, Clone)]
pub struct FileArtifactStore {
    dir: PathBuf,
}

impl FileArtifactStore {
    /// Open (and create if needed) the artifact directory
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| StoreError::Io {
            location: dir.display().to_string(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: ArtifactKey) -> PathBuf {
        self.dir.join(key.file_name())
    }

    fn temp_path_for(&self, key: ArtifactKey) -> PathBuf {
        self.dir
            .join(format!(".{}.{}.tmp", key.file_name(), std::process::id()))
    }
}

fn compute_checksum(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn write_synced(path: &Path, checksum: &str, blob: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(checksum.as_bytes())?;
    file.write_all(b"\n")?;
    file.write_all(blob)?;
    file.sync_all()
}

impl ArtifactStore for FileArtifactStore {
    fn save(&self, key: ArtifactKey, blob: &[u8]) -> Result<(), StoreError> {
        let path = self.path_for(key);
        let temp_path = self.temp_path_for(key);
        let checksum = compute_checksum(blob);
        let written = write_synced(&temp_path, &checksum, blob)
            .and_then(|()| fs::rename(&temp_path, &path));
        if let Err(source) = written {
            if let Err(e) = fs::remove_file(&temp_path) {
                if e.kind() != ErrorKind::NotFound {
                    warn!(path = %temp_path.display(), error = %e, "Failed to remove temporary artifact");
                }
            }
            return Err(StoreError::Io {
                location: path.display().to_string(),
                source,
            });
        }

        info!(
            key = %key,
            path = %path.display(),
            size = blob.len(),
            checksum = %checksum,
            "Artifact saved"
        );
        Ok(())
    }

    fn load(&self, key: ArtifactKey) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.path_for(key);
        let location = path.display().to_string();

        let contents = match fs::read(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StoreError::Io { location, source }),
        };

        let newline = contents
            .iter()
            .position(|&b| b == b'\n')
            .ok_or_else(|| StoreError::Corrupt {
                location: location.clone(),
                reason: "missing checksum header".to_string(),
            })?;

        let expected = String::from_utf8_lossy(&contents[..newline]).trim().to_string();
        let payload = &contents[newline + 1..];
        let actual = compute_checksum(payload);
        if expected != actual {
            return Err(StoreError::Corrupt {
                location,
                reason: format!("checksum mismatch: expected {}, got {}", expected, actual),
            });
        }

        debug!(key = %key, size = payload.len(), "Artifact loaded");
        Ok(Some(payload.to_vec()))
    }

    fn location(&self, key: ArtifactKey) -> String {
        self.path_for(key).display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let store = FileArtifactStore::new(dir.path().join("artifacts")).unwrap();

        assert!(store.load(ArtifactKey::Anomaly).unwrap().is_none());
        store.save(ArtifactKey::Anomaly, b"{\"trees\":[]}").unwrap();

        assert!(store.exists(ArtifactKey::Anomaly));
        assert_eq!(
            store.load(ArtifactKey::Anomaly).unwrap(),
            Some(b"{\"trees\":[]}".to_vec())
        );
        assert!(store.path_for(ArtifactKey::Anomaly).ends_with("anomaly_model.json"));
    }

    #[test]
    fn test_overwrite_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let store = FileArtifactStore::new(dir.path()).unwrap();

        store.save(ArtifactKey::Forecaster, b"v1").unwrap();
        store.save(ArtifactKey::Forecaster, b"v2").unwrap();

        assert_eq!(store.load(ArtifactKey::Forecaster).unwrap(), Some(b"v2".to_vec()));
        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_failed_rename_removes_temp_file() {
        let dir = TempDir::new().unwrap();
        let store = FileArtifactStore::new(dir.path()).unwrap();
        let blocker = store.path_for(ArtifactKey::Anomaly);
        fs::create_dir(&blocker).unwrap();
        fs::write(blocker.join("occupied"), b"x").unwrap();

        assert!(matches!(
            store.save(ArtifactKey::Anomaly, b"payload"),
            Err(StoreError::Io { .. })
        ));
        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["anomaly_model.json".to_string()]);
    }

    #[test]
    fn test_tampered_artifact_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let store = FileArtifactStore::new(dir.path()).unwrap();
        store.save(ArtifactKey::Recommender, b"payload").unwrap();

        let path = store.path_for(ArtifactKey::Recommender);
        let mut contents = fs::read(&path).unwrap();
        let last = contents.len() - 1;
        contents[last] = b'X';
        fs::write(&path, contents).unwrap();

        assert!(matches!(
            store.load(ArtifactKey::Recommender),
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_truncated_artifact_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let store = FileArtifactStore::new(dir.path()).unwrap();
        fs::write(store.path_for(ArtifactKey::Anomaly), b"no-header").unwrap();

        assert!(matches!(
            store.load(ArtifactKey::Anomaly),
            Err(StoreError::Corrupt { .. })
        ));
    }
}
