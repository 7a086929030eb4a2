//! Desired maturity rating persistence
//!
//! The desired rating is read once at session start and written back
//! whenever the user changes it, or when the synchronizer reconciles it to
//! the server's value after giving up on retries.

use crate::error::{Result, TeleportError};
use crate::types::MaturityRating;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Trait for persisting the desired maturity rating
pub trait PreferenceStore: Send + Sync {
    /// Save the desired rating
    fn save(&self, rating: MaturityRating) -> Result<()>;

    /// Load the desired rating, `None` if nothing was saved yet
    fn load(&self) -> Result<Option<MaturityRating>>;
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredPreference {
    preferred_maturity: MaturityRating,
}

/// JSON file-based preference store
///
/// Atomic writes via temp file + rename to prevent corruption.
pub struct FilePreferenceStore {
    path: PathBuf,
}

impl FilePreferenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PreferenceStore for FilePreferenceStore {
    fn save(&self, rating: MaturityRating) -> Result<()> {
        let json = serde_json::to_string_pretty(&StoredPreference {
            preferred_maturity: rating,
        })?;

        let tmp_path = self.path.with_extension("tmp");

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                TeleportError::Store(format!(
                    "Failed to create preference directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        std::fs::write(&tmp_path, json).map_err(|e| {
            TeleportError::Store(format!(
                "Failed to write preference file {}: {}",
                tmp_path.display(),
                e
            ))
        })?;

        std::fs::rename(&tmp_path, &self.path).map_err(|e| {
            TeleportError::Store(format!(
                "Failed to rename preference file {} → {}: {}",
                tmp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::debug!(path = %self.path.display(), rating = %rating, "Preference saved");
        Ok(())
    }

    fn load(&self) -> Result<Option<MaturityRating>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let json = std::fs::read_to_string(&self.path).map_err(|e| {
            TeleportError::Store(format!(
                "Failed to read preference file {}: {}",
                self.path.display(),
                e
            ))
        })?;

        let stored: StoredPreference = serde_json::from_str(&json).map_err(|e| {
            TeleportError::Store(format!(
                "Failed to parse preference file {}: {}",
                self.path.display(),
                e
            ))
        })?;

        tracing::debug!(
            path = %self.path.display(),
            rating = %stored.preferred_maturity,
            "Preference loaded"
        );
        Ok(Some(stored.preferred_maturity))
    }
}

/// In-memory preference store for testing
#[derive(Default)]
pub struct MemoryPreferenceStore {
    state: std::sync::RwLock<Option<MaturityRating>>,
    writes: std::sync::atomic::AtomicUsize,
}

impl MemoryPreferenceStore {
    /// Start with a saved rating
    pub fn with_rating(rating: MaturityRating) -> Self {
        Self {
            state: std::sync::RwLock::new(Some(rating)),
            writes: Default::default(),
        }
    }

    /// Number of `save` calls so far
    pub fn writes(&self) -> usize {
        self.writes.load(std::sync::atomic::Ordering::SeqCst)
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn save(&self, rating: MaturityRating) -> Result<()> {
        let mut state = self.state.write().map_err(|e| {
            TeleportError::Store(format!("Failed to acquire preference lock: {}", e))
        })?;
        *state = Some(rating);
        self.writes.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }

    fn load(&self) -> Result<Option<MaturityRating>> {
        let state = self.state.read().map_err(|e| {
            TeleportError::Store(format!("Failed to acquire preference lock: {}", e))
        })?;
        Ok(*state)
    }
}
