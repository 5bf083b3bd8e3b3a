use crate::error::AppResult;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Channel that owns a video
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thumbnail {
    pub url: String,
}

/// A video as described by the Twitch API
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Video {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub game: Option<String>,
    /// Length in seconds
    #[serde(default)]
    pub length: u64,
    /// ISO 8601 recording timestamp
    #[serde(default)]
    pub recorded_at: String,
    pub url: String,
    #[serde(default)]
    pub channel: Channel,
    #[serde(default)]
    pub thumbnails: Vec<Thumbnail>,
}

impl Video {
    /// Load a video descriptor from a JSON file
    pub fn from_file(path: &Path) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Channel name for display, falling back to the login name
    pub fn channel_label(&self) -> &str {
        if self.channel.display_name.is_empty() {
            &self.channel.name
        } else {
            &self.channel.display_name
        }
    }

    /// Short human readable label used in logs
    pub fn label(&self) -> String {
        format!("{} - {}", self.channel_label(), self.title)
    }
}
