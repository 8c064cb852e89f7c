//! Per-turn temporary audio files.
//!
//! Every recording and every synthesized utterance lives in exactly one
//! [`TurnArtifact`], whose drop removes whatever materialized on disk. The
//! temporary root is shared by all concurrently running calls, so file names
//! carry the call identifier alongside the turn index and role.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::warn;

// Extensions a turn can leave behind: the bare base path plus these. The
// telephony host appends ".wav" to recording targets, synthesis writes ".ul".
const DERIVED_EXTENSIONS: &[&str] = &["wav", "ul"];

#[derive(Debug, Error)]
#[error("artifact operation failed at {path}: {source}")]
pub struct ArtifactError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

impl ArtifactError {
    fn new(path: &Path, source: std::io::Error) -> Self {
        Self {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// What a turn artifact holds, reflected in its file name prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// Caller audio captured by the record command.
    Recording,
    /// Synthesized speech awaiting playback.
    Speech,
}

impl ArtifactKind {
    fn prefix(self) -> &'static str {
        match self {
            ArtifactKind::Recording => "rec",
            ArtifactKind::Speech => "tts",
        }
    }
}

/// Hands out collision-free artifact paths for one call.
pub struct ArtifactStore {
    root: PathBuf,
    call_id: String,
}

impl ArtifactStore {
    /// Ensures the temporary root exists and scopes the store to `call_id`.
    pub fn new(root: impl Into<PathBuf>, call_id: impl Into<String>) -> Result<Self, ArtifactError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| ArtifactError::new(&root, e))?;
        Ok(Self {
            root,
            call_id: call_id.into(),
        })
    }

    /// A fresh artifact for the given turn. The returned value owns the path
    /// family and deletes it when dropped.
    pub fn turn_artifact(&self, kind: ArtifactKind, turn: u32) -> TurnArtifact {
        let base = self
            .root
            .join(format!("{}_{}_{turn}", kind.prefix(), self.call_id));
        TurnArtifact { base }
    }

    /// Copies a caller recording into the long-term recordings directory as
    /// `<call_id>_<turn>.wav`. Callers treat failure as non-fatal.
    pub fn archive_recording(
        &self,
        recording: &Path,
        recordings_dir: &Path,
        turn: u32,
    ) -> Result<PathBuf, ArtifactError> {
        fs::create_dir_all(recordings_dir)
            .map_err(|e| ArtifactError::new(recordings_dir, e))?;
        let dest = recordings_dir.join(format!("{}_{turn}.wav", self.call_id));
        fs::copy(recording, &dest).map_err(|e| ArtifactError::new(&dest, e))?;
        Ok(dest)
    }
}

/// One turn's audio file family: the extensionless base path handed to the
/// telephony host plus every derived extension. Removal happens on drop, so
/// cleanup holds on early returns and propagated errors alike.
pub struct TurnArtifact {
    base: PathBuf,
}

impl TurnArtifact {
    /// Base path without extension, as record/playback commands expect it.
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// The derived file `<base>.<ext>`. Call identifiers may contain dots, so
    /// the extension is appended rather than swapped in with
    /// [`Path::with_extension`], which would truncate at the last dot.
    pub fn derived(&self, ext: &str) -> PathBuf {
        let mut name = self.base.as_os_str().to_os_string();
        name.push(".");
        name.push(ext);
        PathBuf::from(name)
    }
}

impl Drop for TurnArtifact {
    fn drop(&mut self) {
        let mut candidates = vec![self.base.clone()];
        candidates.extend(DERIVED_EXTENSIONS.iter().map(|ext| self.derived(ext)));
        for path in candidates {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("failed to remove artifact {}: {e}", path.display()),
            }
        }
    }
}
