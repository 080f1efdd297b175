//! Application id to display name mapping.
//!
//! Name resolution is supplied by an external collaborator (the metadata
//! lookup is out of scope); this type is the interface boundary. A JSON
//! object file of `{"app_id": "Name"}` pairs can be loaded directly, and
//! unresolved ids fall back to the raw id string.

use std::collections::HashMap;
use std::path::Path;

use super::LibraryError;

/// Resolved application names, keyed by application id.
#[derive(Debug, Clone, Default)]
pub struct AppNames {
    map: HashMap<String, String>,
}

impl AppNames {
    /// Empty mapping: every id resolves to itself.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from an existing id → name map.
    pub fn from_map(map: HashMap<String, String>) -> Self {
        Self { map }
    }

    /// Load a JSON object file of id → name pairs.
    ///
    /// # Errors
    ///
    /// - `LibraryError::NamesFile` - File unreadable or not a JSON object
    pub async fn load(path: &Path) -> Result<Self, LibraryError> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| LibraryError::NamesFile {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        let map: HashMap<String, String> =
            serde_json::from_str(&raw).map_err(|e| LibraryError::NamesFile {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        tracing::debug!("Loaded {} app name(s) from {}", map.len(), path.display());
        Ok(Self { map })
    }

    /// Display name for an application id, falling back to the id itself.
    pub fn resolve(&self, application_id: &str) -> String {
        self.map
            .get(application_id)
            .cloned()
            .unwrap_or_else(|| application_id.to_string())
    }
}
