//! Metadata resolver: turns whatever the host reports into a lookup identity
//!
//! Right after playback starts the host may report an empty label, a
//! placeholder, or the previous item's data. [`MetadataResolver::await_stable`]
//! polls until two consecutive reads agree, within a bounded budget.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::host::{PlaybackHost, PlayingItem};
use super::text_utils::{parse_year, strip_episode_qualifiers};
use crate::media::{MediaIdentity, MediaKind};

/// Titles hosts show before real metadata arrives
pub const DEFAULT_PLACEHOLDERS: &[&str] = &["unknown", "untitled", "n/a", "-"];

/// One read of the host's playback info
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Complete(MediaIdentity),
    /// No usable title yet; `kind` keeps whatever type the host did report
    Incomplete { kind: Option<MediaKind> },
}

/// Result of waiting for metadata to settle
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataOutcome {
    /// Two consecutive reads agreed
    Stable(MediaIdentity),
    /// Budget ran out; this is the last complete read
    Degraded(MediaIdentity),
    /// Budget ran out without a single complete read
    Unavailable { kind: Option<MediaKind> },
}

impl MetadataOutcome {
    pub fn identity(&self) -> Option<&MediaIdentity> {
        match self {
            Self::Stable(identity) | Self::Degraded(identity) => Some(identity),
            Self::Unavailable { .. } => None,
        }
    }

    pub fn kind(&self) -> Option<MediaKind> {
        match self {
            Self::Stable(identity) | Self::Degraded(identity) => Some(identity.kind),
            Self::Unavailable { kind } => *kind,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Total number of polls before giving up on stability
    pub max_attempts: u32,
    /// Delay between polls
    pub retry_interval: Duration,
    /// Lowercase titles treated as "not there yet"
    pub placeholders: Vec<String>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            retry_interval: Duration::from_millis(500),
            placeholders: DEFAULT_PLACEHOLDERS.iter().map(|p| p.to_string()).collect(),
        }
    }
}

pub struct MetadataResolver {
    host: Arc<dyn PlaybackHost>,
    config: ResolverConfig,
}

impl MetadataResolver {
    pub fn new(host: Arc<dyn PlaybackHost>, config: ResolverConfig) -> Self {
        Self { host, config }
    }

    /// Single read of the host's current item
    pub async fn resolve(&self) -> Resolution {
        match self.host.current_item().await {
            Ok(Some(item)) => identity_from_item(&item, &self.config.placeholders),
            Ok(None) => {
                debug!("Host reports no playing item");
                Resolution::Incomplete { kind: None }
            }
            Err(e) => {
                warn!(error = %e, "Failed to query playing item");
                Resolution::Incomplete { kind: None }
            }
        }
    }

    /// Poll until two consecutive complete reads agree or the budget runs out
    pub async fn await_stable(&self) -> MetadataOutcome {
        let max_attempts = self.config.max_attempts.max(1);
        let mut previous: Option<MediaIdentity> = None;
        let mut last_complete: Option<MediaIdentity> = None;
        let mut kind_hint: Option<MediaKind> = None;

        for attempt in 1..=max_attempts {
            match self.resolve().await {
                Resolution::Complete(identity) => {
                    kind_hint = Some(identity.kind);
                    if previous.as_ref() == Some(&identity) {
                        info!(attempt = attempt, identity = %identity, "Playback metadata is stable");
                        return MetadataOutcome::Stable(identity);
                    }
                    debug!(
                        attempt = attempt,
                        max_attempts = max_attempts,
                        identity = %identity,
                        "Metadata read, waiting for confirmation"
                    );
                    previous = Some(identity.clone());
                    last_complete = Some(identity);
                }
                Resolution::Incomplete { kind } => {
                    kind_hint = kind.or(kind_hint);
                    previous = None;
                    debug!(
                        attempt = attempt,
                        max_attempts = max_attempts,
                        "Metadata not yet available, retrying"
                    );
                }
            }

            if attempt < max_attempts {
                tokio::time::sleep(self.config.retry_interval).await;
            }
        }

        match last_complete {
            Some(identity) => {
                warn!(identity = %identity, "Metadata never stabilized, using last read");
                MetadataOutcome::Degraded(identity)
            }
            None => {
                warn!(kind = ?kind_hint, "No usable metadata after all retries");
                MetadataOutcome::Unavailable { kind: kind_hint }
            }
        }
    }
}

/// Build an identity from one host report.
///
/// The kind comes from the host's type fields only: a scraper `tmdb_type`
/// wins over the built-in type. Episodes use the series title; when the host
/// has none, episode qualifiers are stripped from the label instead.
pub fn identity_from_item(item: &PlayingItem, placeholders: &[String]) -> Resolution {
    let kind = item
        .custom_properties
        .get("tmdb_type")
        .and_then(|t| MediaKind::from_item_type(t))
        .or_else(|| MediaKind::from_item_type(&item.item_type));

    let Some(kind) = kind else {
        debug!(item_type = %item.item_type, "Playing item has no video kind");
        return Resolution::Incomplete { kind: None };
    };

    let title = match kind {
        MediaKind::Episode => {
            let show_title = item.show_title.trim();
            if !show_title.is_empty() {
                show_title.to_string()
            } else {
                strip_episode_qualifiers(first_non_empty(&item.label, &item.title))
            }
        }
        MediaKind::Movie => first_non_empty(&item.label, &item.title).trim().to_string(),
    };

    if is_placeholder(&title, placeholders) {
        return Resolution::Incomplete { kind: Some(kind) };
    }

    Resolution::Complete(MediaIdentity {
        title,
        year: item_year(item),
        kind,
    })
}

/// Year from `premiered.year`, then the premiere date, then the year field
fn item_year(item: &PlayingItem) -> Option<u16> {
    item.custom_properties
        .get("premiered.year")
        .and_then(|y| parse_year(y))
        .or_else(|| parse_year(&item.premiered))
        .or_else(|| item.year.filter(|y| (1880..=2100).contains(y)))
}

fn first_non_empty<'a>(a: &'a str, b: &'a str) -> &'a str {
    if a.trim().is_empty() { b } else { a }
}

fn is_placeholder(title: &str, placeholders: &[String]) -> bool {
    let title = title.trim();
    title.is_empty() || placeholders.iter().any(|p| p.eq_ignore_ascii_case(title))
}
