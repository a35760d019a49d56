//! Artifact store: the last-applied runtime definition per service.
//!
//! Layout under the stack's build root:
//! `build/<service>/compose.yaml` (committed) and `compose.yaml.next`
//! (staged candidate consumed by the runtime driver). `commit` renames
//! staged → committed and is the only mutator of the committed artifact;
//! `previous` and `diff` never write, which keeps dry runs side-effect
//! free.
//!
//! Change detection compares content fingerprints, never timestamps.

use crate::domain::models::Artifact;
use crate::services::template::fingerprint;
use std::path::{Path, PathBuf};

pub const BUILD_DIR: &str = "build";
const ARTIFACT_FILE: &str = "compose.yaml";
const STAGED_SUFFIX: &str = ".next";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffResult {
    Unchanged,
    Changed,
}

pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(stack_dir: &Path) -> Self {
        Self {
            root: stack_dir.join(BUILD_DIR),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn artifact_path(&self, service: &str) -> PathBuf {
        self.root.join(service).join(ARTIFACT_FILE)
    }

    pub fn staged_path(&self, service: &str) -> PathBuf {
        self.root
            .join(service)
            .join(format!("{ARTIFACT_FILE}{STAGED_SUFFIX}"))
    }

    /// Last committed artifact, or `None` before the first apply.
    pub fn previous(&self, service: &str) -> anyhow::Result<Option<Artifact>> {
        let path = self.artifact_path(service);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(Some(Artifact {
            service: service.to_string(),
            fingerprint: fingerprint(content.as_bytes()),
            content,
        }))
    }

    pub fn diff(&self, service: &str, new: &Artifact) -> anyhow::Result<DiffResult> {
        match self.previous(service)? {
            Some(prev) if prev.fingerprint == new.fingerprint => Ok(DiffResult::Unchanged),
            _ => Ok(DiffResult::Changed),
        }
    }

    /// Write the candidate artifact the driver will converge from.
    pub fn stage(&self, artifact: &Artifact) -> anyhow::Result<PathBuf> {
        let path = self.staged_path(&artifact.service);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, &artifact.content)?;
        Ok(path)
    }

    /// Promote the staged artifact. Called only after the driver confirmed
    /// a successful apply, so the committed file never describes a state
    /// that was not actually reached.
    pub fn commit(&self, service: &str) -> anyhow::Result<()> {
        let staged = self.staged_path(service);
        let committed = self.artifact_path(service);
        std::fs::rename(staged, committed)?;
        Ok(())
    }

    /// Remove a stale staged file, e.g. after a failed apply.
    pub fn discard_staged(&self, service: &str) -> anyhow::Result<()> {
        let staged = self.staged_path(service);
        if staged.exists() {
            std::fs::remove_file(staged)?;
        }
        Ok(())
    }
}
