//! Flat-file JSON storage.
//!
//! A thin seam around read-whole-file / write-whole-file JSON persistence so
//! the stores can later move to a real key-value backend without touching
//! business logic. Writes go to a temp file in the same directory followed by
//! an atomic rename; the JSON body is never appended to or partially updated.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::error::{EngineError, EngineResult};

/// Whole-file JSON store for a single serializable value.
#[derive(Debug, Clone)]
pub struct JsonStore {
    path: PathBuf,
}

impl JsonStore {
    /// Create a store backed by the given file path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored value.
    ///
    /// A missing file is an empty store, not an error. A corrupt file is
    /// logged and also treated as empty: learned data is an optimization, not
    /// a correctness requirement.
    pub async fn load<T>(&self) -> T
    where
        T: DeserializeOwned + Default,
    {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return T::default(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to read store, treating as empty");
                return T::default();
            }
        };

        match serde_json::from_str(&content) {
            Ok(value) => value,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "corrupt store, treating as empty");
                T::default()
            }
        }
    }

    /// Save a value, replacing the whole file atomically.
    pub async fn save<T>(&self, value: &T) -> EngineResult<()>
    where
        T: Serialize,
    {
        let content = serde_json::to_string_pretty(value)?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| EngineError::Storage { path: self.path.clone(), source })?;
        }

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content)
            .await
            .map_err(|source| EngineError::Storage { path: tmp.clone(), source })?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|source| EngineError::Storage { path: self.path.clone(), source })?;

        Ok(())
    }
}
