//! External service integrations and the playback pipeline

pub mod bluray;
pub mod host;
pub mod kodi;
pub mod logging;
pub mod metadata;
pub mod rate_limiter;
pub mod text_utils;
pub mod watcher;

pub use bluray::{AspectRatioLookup, BlurayClient, CatalogConfig, LookupOutcome};
pub use host::{PlaybackEvent, PlaybackHost, PlayingItem};
pub use kodi::{KodiClient, KodiConfig, NotificationListener};
pub use logging::{LogFormat, init_tracing};
pub use metadata::{MetadataOutcome, MetadataResolver, ResolverConfig};
pub use rate_limiter::{RateLimitedClient, RetryConfig, retry_async};
pub use watcher::{PlaybackWatcher, WatcherState};
