//! On-disk artifact store.
//!
//! Data files are written to `<file>.part` and renamed into place, then the
//! sidecar manifest is written the same way. A stage counts as complete only
//! when the sidecar exists, names the same item and input hash, and its data
//! file is present. Anything still carrying the `.part` suffix is an
//! interrupted write and is swept at the start of a run.

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::artifact::StageArtifact;
use crate::layout::{partial_path, OutputLayout, PARTIAL_SUFFIX};

/// Errors that can occur when reading or writing artifacts.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Parse error in {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Stage {stage} has no persisted artifacts")]
    NotPersisted { stage: String },
}

/// Write `bytes` to `path` atomically: temp file, fsync, rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let io_err = |source| StoreError::IoError {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }

    let temp = partial_path(path);
    let result = (|| {
        let mut file = std::fs::File::create(&temp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        std::fs::rename(&temp, path)
    })();

    if let Err(source) = result {
        std::fs::remove_file(&temp).ok();
        return Err(io_err(source));
    }
    Ok(())
}

/// Reads and writes stage artifacts under an [`OutputLayout`].
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    layout: OutputLayout,
}

impl ArtifactStore {
    /// Open a store, creating the stage directories.
    pub fn open(layout: OutputLayout) -> Result<Self, StoreError> {
        layout.ensure_dirs().map_err(|source| StoreError::IoError {
            path: layout.root().to_path_buf(),
            source,
        })?;
        Ok(Self { layout })
    }

    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    /// Remove leftover `.part` files from interrupted writes.
    pub fn sweep_partials(&self) -> Result<usize, StoreError> {
        let mut removed = 0;
        for stage in crate::state::Stage::ALL {
            let Some(dir) = self.layout.stage_dir(stage) else {
                continue;
            };
            let entries = match std::fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                Err(source) => return Err(StoreError::IoError { path: dir, source }),
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) == Some(PARTIAL_SUFFIX) {
                    std::fs::remove_file(&path)
                        .map_err(|source| StoreError::IoError {
                            path: path.clone(),
                            source,
                        })?;
                    tracing::info!(path = %path.display(), "Removed interrupted write");
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    /// Persist an artifact's data file and then its sidecar.
    pub fn save<A: StageArtifact>(&self, artifact: &A, data: &[u8]) -> Result<(), StoreError> {
        write_atomic(artifact.path(), data)?;
        self.save_manifest(artifact)
    }

    /// Persist only the sidecar; the data file must already be in place.
    pub fn save_manifest<A: StageArtifact>(&self, artifact: &A) -> Result<(), StoreError> {
        let meta_path = self.meta_path::<A>(artifact.item_id())?;
        let json =
            serde_json::to_vec_pretty(artifact).map_err(|source| StoreError::ParseError {
                path: meta_path.clone(),
                source,
            })?;
        write_atomic(&meta_path, &json)
    }

    /// Load the sidecar for `item_id`, if one exists.
    pub fn load_manifest<A: StageArtifact>(&self, item_id: &str) -> Result<Option<A>, StoreError> {
        let meta_path = self.meta_path::<A>(item_id)?;
        let content = match std::fs::read(&meta_path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StoreError::IoError {
                    path: meta_path,
                    source,
                })
            }
        };
        serde_json::from_slice(&content)
            .map(Some)
            .map_err(|source| StoreError::ParseError {
                path: meta_path,
                source,
            })
    }

    /// A previously stored artifact that is still valid for `input_hash`.
    ///
    /// Unreadable or stale entries are treated as absent so the stage reruns.
    pub fn load_valid<A: StageArtifact>(&self, item_id: &str, input_hash: &str) -> Option<A> {
        let mut artifact = match self.load_manifest::<A>(item_id) {
            Ok(Some(artifact)) => artifact,
            Ok(None) => return None,
            Err(err) => {
                tracing::warn!(item_id, error = %err, "Ignoring unreadable manifest");
                return None;
            }
        };

        if artifact.item_id() != item_id || artifact.input_hash() != input_hash {
            tracing::debug!(item_id, stage = %A::STAGE, "Stored artifact is stale");
            return None;
        }
        if !artifact.path().is_file() {
            tracing::debug!(item_id, stage = %A::STAGE, "Stored artifact data file missing");
            return None;
        }
        if let Err(err) = artifact.hydrate() {
            tracing::warn!(item_id, error = %err, "Failed to read stored artifact");
            return None;
        }
        Some(artifact)
    }

    fn meta_path<A: StageArtifact>(&self, item_id: &str) -> Result<PathBuf, StoreError> {
        self.layout
            .meta_path(A::STAGE, item_id)
            .ok_or_else(|| StoreError::NotPersisted {
                stage: A::STAGE.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::ScriptArtifact;
    use chrono::Utc;

    fn temp_store(name: &str) -> (PathBuf, ArtifactStore) {
        let dir = std::env::temp_dir().join(format!(
            "reelsmith_store_{name}_{}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        let store = ArtifactStore::open(OutputLayout::new(&dir)).unwrap();
        (dir, store)
    }

    fn script(store: &ArtifactStore, hash: &str) -> ScriptArtifact {
        ScriptArtifact {
            item_id: "abc".into(),
            text: "So this is absolutely insane. What would you have done?".into(),
            path: store.layout().script_path("abc"),
            word_count: 10,
            target_word_count: 200,
            backend: "dummy".into(),
            input_hash: hash.into(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_save_and_load_valid() {
        let (dir, store) = temp_store("valid");
        let artifact = script(&store, "h1");
        store.save(&artifact, artifact.text.as_bytes()).unwrap();

        let loaded: ScriptArtifact = store.load_valid("abc", "h1").unwrap();
        assert_eq!(loaded.text, artifact.text);
        assert_eq!(loaded.backend, "dummy");

        assert!(store.load_valid::<ScriptArtifact>("abc", "other").is_none());
        assert!(store.load_valid::<ScriptArtifact>("zzz", "h1").is_none());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_missing_data_file_invalidates() {
        let (dir, store) = temp_store("missing");
        let artifact = script(&store, "h1");
        store.save(&artifact, artifact.text.as_bytes()).unwrap();
        std::fs::remove_file(&artifact.path).unwrap();

        assert!(store.load_valid::<ScriptArtifact>("abc", "h1").is_none());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_corrupt_manifest_is_ignored() {
        let (dir, store) = temp_store("corrupt");
        let meta = store
            .layout()
            .meta_path(crate::state::Stage::Rewrite, "abc")
            .unwrap();
        std::fs::write(&meta, b"{not json").unwrap();

        assert!(store.load_manifest::<ScriptArtifact>("abc").is_err());
        assert!(store.load_valid::<ScriptArtifact>("abc", "h1").is_none());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_sweep_removes_partials_only() {
        let (dir, store) = temp_store("sweep");
        let video = store.layout().video_path("abc");
        std::fs::write(partial_path(&video), b"half").unwrap();
        std::fs::write(store.layout().video_path("done"), b"whole").unwrap();

        assert_eq!(store.sweep_partials().unwrap(), 1);
        assert!(!partial_path(&video).exists());
        assert!(store.layout().video_path("done").exists());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_write_atomic_leaves_no_partial() {
        let (dir, store) = temp_store("atomic");
        let path = store.layout().audio_path("abc", "wav");
        write_atomic(&path, b"RIFF").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"RIFF");
        assert!(!partial_path(&path).exists());
        std::fs::remove_dir_all(&dir).ok();
    }
}
