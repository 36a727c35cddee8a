//! Local transcript export
//!
//! Writes a session's finalized transcript as Markdown to the user's
//! Documents folder, or a custom directory from the config.

use crate::error::StoreError;
use crate::session::{render_markdown, TranscriptEntry};
use chrono::Local;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// Default export location under Documents
pub(crate) fn default_transcripts_dir() -> Option<PathBuf> {
    dirs::document_dir().map(|d| d.join("MockInterview").join("transcripts"))
}

pub(crate) struct TranscriptExporter {
    dir: PathBuf,
}

impl TranscriptExporter {
    pub(crate) fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Use the configured directory, falling back to Documents
    pub(crate) fn from_config(custom: Option<&Path>) -> Result<Self, StoreError> {
        match custom {
            Some(dir) => Ok(Self::new(dir)),
            None => default_transcripts_dir()
                .map(Self::new)
                .ok_or(StoreError::NoDataDir),
        }
    }

    fn ensure_dir(&self) -> Result<(), StoreError> {
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir).map_err(|e| StoreError::CreateDirectory {
                path: self.dir.clone(),
                source: e,
            })?;
            info!("Created transcripts directory: {:?}", self.dir);
        }
        Ok(())
    }

    /// Save a transcript and return the path of the written file
    pub(crate) fn save(
        &self,
        session_id: &str,
        title: &str,
        entries: &[TranscriptEntry],
    ) -> Result<PathBuf, StoreError> {
        if entries.is_empty() {
            return Err(StoreError::EmptyTranscript);
        }
        self.ensure_dir()?;

        let timestamp = Local::now().format("%Y-%m-%d-%H-%M-%S");
        let filepath = self
            .dir
            .join(format!("interview-{}-{}.md", session_id, timestamp));

        let write_err = |e| StoreError::WriteFile {
            path: filepath.clone(),
            source: e,
        };
        let mut file = fs::File::create(&filepath).map_err(write_err)?;
        file.write_all(render_markdown(title, entries).as_bytes())
            .map_err(write_err)?;
        file.flush().map_err(write_err)?;

        info!("Saved transcript to: {:?}", filepath);
        Ok(filepath)
    }
}
