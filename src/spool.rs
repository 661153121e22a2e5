//! Spool directory of pending write-intent drafts.
//!
//! The worker drains `*.json` drafts from a spool directory and files each
//! one under `done/` or `failed/` by outcome. Retry scheduling across
//! process restarts is the producer's responsibility; the worker only
//! moves files.

use clinsync_core::WriteDraft;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const DONE_DIR_NAME: &str = "done";
const FAILED_DIR_NAME: &str = "failed";

pub struct Spool {
    dir: PathBuf,
    done: PathBuf,
    failed: PathBuf,
}

impl Spool {
    /// Opens (and creates, if needed) the spool directory structure.
    pub fn open(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        let done = dir.join(DONE_DIR_NAME);
        let failed = dir.join(FAILED_DIR_NAME);
        fs::create_dir_all(&dir)?;
        fs::create_dir_all(&done)?;
        fs::create_dir_all(&failed)?;
        Ok(Self { dir, done, failed })
    }

    /// Reads all pending drafts, oldest file name first.
    ///
    /// Drafts that cannot be parsed are logged and filed under `failed/`
    /// immediately.
    pub fn scan(&self) -> Vec<(PathBuf, WriteDraft)> {
        let mut drafts = Vec::new();

        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) => {
                tracing::warn!(dir = %self.dir.display(), error = %err, "cannot read spool");
                return drafts;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() || path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }

            let parsed = fs::read_to_string(&path)
                .map_err(|err| err.to_string())
                .and_then(|contents| {
                    serde_json::from_str::<WriteDraft>(&contents).map_err(|err| err.to_string())
                });
            match parsed {
                Ok(draft) => drafts.push((path, draft)),
                Err(err) => {
                    tracing::warn!(
                        draft = %path.display(),
                        error = %err,
                        "unreadable draft, filing under failed/"
                    );
                    if let Err(err) = self.finish(&path, false) {
                        tracing::warn!(draft = %path.display(), error = %err, "could not move draft");
                    }
                }
            }
        }

        drafts.sort_by(|(a, _), (b, _)| a.cmp(b));
        drafts
    }

    /// Files a processed draft under `done/` or `failed/`.
    pub fn finish(&self, path: &Path, completed: bool) -> io::Result<()> {
        let name = path
            .file_name()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "draft path has no name"))?;
        let dest = if completed { &self.done } else { &self.failed };
        fs::rename(path, dest.join(name))
    }
}
