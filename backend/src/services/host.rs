//! Boundary with the media-player host
//!
//! The watcher only talks to the player through [`PlaybackHost`] and only
//! learns about playback through [`PlaybackEvent`]s. The Kodi adapter in
//! [`super::kodi`] is one implementation; tests use in-memory fakes.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::media::ZoomAdjustment;

/// Lifecycle signal delivered by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PlaybackEvent {
    PlaybackStarted { is_video: bool },
    PlaybackStopped,
    ItemChanged,
}

/// Whatever the host currently reports about the playing item.
///
/// Any field may be empty for a short while after playback starts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayingItem {
    /// Display label (movie title, or an episode label)
    #[serde(default)]
    pub label: String,
    /// Item title; for episodes this is the episode title
    #[serde(default)]
    pub title: String,
    /// Series title, only set for episodes
    #[serde(default, rename = "showtitle")]
    pub show_title: String,
    /// Built-in item type: `movie`, `episode`, `unknown`...
    #[serde(default, rename = "type")]
    pub item_type: String,
    #[serde(default)]
    pub year: Option<u16>,
    /// First air / release date, `YYYY-MM-DD`
    #[serde(default)]
    pub premiered: String,
    /// Scraper-provided properties (`tmdb_type`, `premiered.year`...)
    #[serde(default, rename = "customproperties")]
    pub custom_properties: HashMap<String, String>,
}

/// Query and control surface of the player
#[async_trait]
pub trait PlaybackHost: Send + Sync {
    /// The item currently playing, or `None` when nothing is
    async fn current_item(&self) -> Result<Option<PlayingItem>>;

    /// Stretch the picture by `vertical_zoom` vertically and by `pixel_ratio`
    /// horizontally, as one view-mode change. [`ZoomAdjustment::IDENTITY`]
    /// resets.
    async fn apply_view_mode(&self, adjustment: ZoomAdjustment) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_playing_item_from_host_json() {
        let json = serde_json::json!({
            "label": "Pilot",
            "title": "Pilot",
            "showtitle": "Example Show",
            "type": "episode",
            "premiered": "2019-09-01",
            "customproperties": { "tmdb_type": "episode" }
        });

        let item: PlayingItem = serde_json::from_value(json).unwrap();
        assert_eq!(item.show_title, "Example Show");
        assert_eq!(item.item_type, "episode");
        assert_eq!(item.year, None);
        assert_eq!(
            item.custom_properties.get("tmdb_type").map(String::as_str),
            Some("episode")
        );
    }

    #[test]
    fn test_playing_item_tolerates_sparse_json() {
        let item: PlayingItem = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(item, PlayingItem::default());
    }
}
