//! Output directory layout.
//!
//! ```text
//! output/
//! ├── scripts/<id>.txt        + <id>.meta.json
//! ├── audio/<id>.<ext>        + <id>.meta.json
//! ├── subtitles/<id>.srt      + <id>.meta.json
//! └── video/<id>.mp4          + <id>.meta.json
//! ```

use std::path::{Path, PathBuf};

use crate::item::sanitize_id;
use crate::state::Stage;

/// Suffix marking a file that is still being written.
pub const PARTIAL_SUFFIX: &str = "part";

/// Resolves artifact paths under one output root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding a persisted stage's artifacts.
    pub fn stage_dir(&self, stage: Stage) -> Option<PathBuf> {
        let name = match stage {
            Stage::Rewrite => "scripts",
            Stage::Synthesize => "audio",
            Stage::Subtitle => "subtitles",
            Stage::Compose => "video",
            Stage::Fetch | Stage::Filter => return None,
        };
        Some(self.root.join(name))
    }

    pub fn script_path(&self, item_id: &str) -> PathBuf {
        self.root
            .join("scripts")
            .join(format!("{}.txt", sanitize_id(item_id)))
    }

    /// Audio path without an extension; the speech backend picks the format.
    pub fn audio_stem(&self, item_id: &str) -> PathBuf {
        self.root.join("audio").join(sanitize_id(item_id))
    }

    pub fn audio_path(&self, item_id: &str, extension: &str) -> PathBuf {
        self.audio_stem(item_id).with_extension(extension)
    }

    pub fn subtitle_path(&self, item_id: &str) -> PathBuf {
        self.root
            .join("subtitles")
            .join(format!("{}.srt", sanitize_id(item_id)))
    }

    pub fn video_path(&self, item_id: &str) -> PathBuf {
        self.root
            .join("video")
            .join(format!("{}.mp4", sanitize_id(item_id)))
    }

    /// Sidecar manifest for a persisted stage.
    pub fn meta_path(&self, stage: Stage, item_id: &str) -> Option<PathBuf> {
        self.stage_dir(stage)
            .map(|dir| dir.join(format!("{}.meta.json", sanitize_id(item_id))))
    }

    /// Create every stage directory.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        for stage in Stage::ALL {
            if let Some(dir) = self.stage_dir(stage) {
                std::fs::create_dir_all(dir)?;
            }
        }
        Ok(())
    }
}

/// `<path>.part`, the in-progress name for `path`.
pub fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(PARTIAL_SUFFIX);
    PathBuf::from(name)
}
