/// Extension configuration persisted next to the topic collection.
use serde::{Deserialize, Serialize};

use crate::store::StorageBackend;
use crate::Result;

pub const CONFIG_KEY: &str = "tab_topics_config";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtensionConfig {
    pub dark_theme_enabled: bool,
}

impl ExtensionConfig {
    /// Missing or unreadable config falls back to defaults; a broken stored
    /// blob must never block the popup from opening.
    pub async fn load<B: StorageBackend>(backend: &B) -> Result<ExtensionConfig> {
        match backend.load(CONFIG_KEY).await? {
            Some(json) => Ok(serde_json::from_str(&json).unwrap_or_default()),
            None => Ok(ExtensionConfig::default()),
        }
    }

    pub async fn save<B: StorageBackend>(&self, backend: &B) -> Result<()> {
        let json = serde_json::to_string(self)?;
        backend.save(CONFIG_KEY, &json).await
    }
}
