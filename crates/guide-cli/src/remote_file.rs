//! JSON file standing in for the remote guide store.
//!
//! The whole [`RemoteState`] lives in `remote.json` inside the data directory.
//! It is loaded into a [`MemoryRemote`] at startup and written back on exit.

use anyhow::{Context, Result};
use guide_core::{MemoryRemote, RemoteState};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File name of the remote state inside the data directory.
pub const REMOTE_FILE: &str = "remote.json";

pub struct RemoteFile {
    path: PathBuf,
}

impl RemoteFile {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(REMOTE_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored state. A missing file is an empty store.
    pub fn load(&self) -> Result<RemoteState> {
        if !self.path.exists() {
            debug!("No remote state at {:?}, starting empty", self.path);
            return Ok(RemoteState::default());
        }

        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {:?}", self.path))?;
        let state: RemoteState = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse {:?}", self.path))?;
        Ok(state)
    }

    pub fn open_remote(&self) -> Result<MemoryRemote> {
        Ok(MemoryRemote::from_state(self.load()?))
    }

    /// Write the remote's current contents back to disk.
    pub fn save(&self, remote: &MemoryRemote) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = serde_json::to_string_pretty(&remote.export_state())?;
        fs::write(&self.path, contents)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guide_core::{GuideRemote, NewGuide, Scope};
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_empty_store() {
        let dir = TempDir::new().unwrap();
        let file = RemoteFile::new(dir.path());
        assert!(file.load().unwrap().guides.is_empty());
    }

    #[tokio::test]
    async fn test_state_survives_save_and_load() {
        let dir = TempDir::new().unwrap();
        let file = RemoteFile::new(&dir.path().join("data"));

        let remote = file.open_remote().unwrap();
        let created = remote
            .create_guide(
                Scope::Global,
                NewGuide {
                    title: "Kept".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        remote
            .reorder_guides(Scope::Global, None, std::slice::from_ref(&created.id))
            .await
            .unwrap();
        file.save(&remote).unwrap();

        let reopened = file.open_remote().unwrap();
        let listed = reopened.list_guides(Scope::Global, None).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, created.id);
        assert_eq!(listed[0].title, "Kept");
        assert_eq!(reopened.export_state().guides[0].sort_index, Some(0));
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let file = RemoteFile::new(dir.path());
        fs::write(file.path(), "{not json").unwrap();
        assert!(file.load().is_err());
    }
}
