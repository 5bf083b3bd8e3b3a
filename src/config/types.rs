use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Defaults for livestreamer downloads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Stream quality passed to livestreamer
    pub quality: String,
    /// Write `<output>.json` next to the download
    pub metadata: bool,
    /// Save up to two thumbnails next to the download
    pub thumbnails: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            quality: "source".to_string(),
            metadata: true,
            thumbnails: true,
        }
    }
}

/// Defaults for ffmpeg encodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodeConfig {
    /// Name of the encode plugin to use
    pub plugin: String,
    /// Extra output options, passed as `-key value` after the plugin's own
    pub params: BTreeMap<String, String>,
}

impl Default for EncodeConfig {
    fn default() -> Self {
        Self {
            plugin: "mp4-libx264".to_string(),
            params: BTreeMap::new(),
        }
    }
}

/// Concurrency limits for the two queues
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub max_downloads: usize,
    pub max_encodes: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_downloads: 3,
            max_encodes: 1,
        }
    }
}

/// Per-job overlay for downloads, merged over [`StreamConfig`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DownloadOptions {
    pub quality: Option<String>,
    pub metadata: Option<bool>,
    pub thumbnails: Option<bool>,
}

impl DownloadOptions {
    pub fn merged_over(&self, defaults: &StreamConfig) -> StreamConfig {
        StreamConfig {
            quality: self
                .quality
                .clone()
                .unwrap_or_else(|| defaults.quality.clone()),
            metadata: self.metadata.unwrap_or(defaults.metadata),
            thumbnails: self.thumbnails.unwrap_or(defaults.thumbnails),
        }
    }
}

/// Per-job overlay for encodes, merged over [`EncodeConfig`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EncodeOptions {
    pub plugin: Option<String>,
    pub params: BTreeMap<String, String>,
}

impl EncodeOptions {
    pub fn merged_over(&self, defaults: &EncodeConfig) -> EncodeConfig {
        let mut params = defaults.params.clone();
        params.extend(self.params.clone());

        EncodeConfig {
            plugin: self
                .plugin
                .clone()
                .unwrap_or_else(|| defaults.plugin.clone()),
            params,
        }
    }
}
