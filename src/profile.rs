//! Persisted user profile (collected registration slots)

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::flow::SlotStore;
use crate::{Error, Result};

/// A completed registration snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredProfile {
    /// Collected slot values, in collection order
    pub slots: IndexMap<String, String>,
    /// When the snapshot was written
    pub saved_at: DateTime<Utc>,
}

/// File-backed profile storage
///
/// Writes are atomic: the snapshot lands in a temp file in the same directory
/// and is renamed over the previous one, so a crash mid-write never leaves a
/// torn profile behind.
pub struct ProfileStore {
    path: PathBuf,
}

impl ProfileStore {
    /// Store rooted at `dir` (the profile lives at `dir/profile.json`)
    #[must_use]
    pub fn new(dir: &Path) -> Self {
        Self {
            path: dir.join("profile.json"),
        }
    }

    /// Path of the profile file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored profile, if one exists
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(&self) -> Result<Option<StoredProfile>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)?;
        let profile: StoredProfile = serde_json::from_str(&content)?;
        Ok(Some(profile))
    }
}

#[async_trait]
impl SlotStore for ProfileStore {
    async fn save(&self, slots: &IndexMap<String, String>) -> Result<()> {
        let profile = StoredProfile {
            slots: slots.clone(),
            saved_at: Utc::now(),
        };
        let json = serde_json::to_string_pretty(&profile)?;

        let dir = self
            .path
            .parent()
            .ok_or_else(|| Error::Config("profile path has no parent directory".to_string()))?;
        std::fs::create_dir_all(dir)?;

        let mut temp = tempfile::NamedTempFile::new_in(dir)?;
        temp.write_all(json.as_bytes())?;
        temp.persist(&self.path)
            .map_err(|e| Error::Io(e.error))?;

        tracing::info!(path = %self.path.display(), slots = slots.len(), "profile saved");
        Ok(())
    }
}
