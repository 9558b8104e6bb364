//! Autofit - anamorphic auto-fit service for Kodi
//!
//! Listens for playback notifications, resolves the playing item's aspect
//! ratio and applies the matching zoom and pixel ratio.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{debug, info};

use autofit::config::Config;
use autofit::services::{
    BlurayClient, KodiClient, KodiConfig, LogFormat, NotificationListener, PlaybackWatcher,
    init_tracing,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing(LogFormat::from_env());

    let config = Config::from_env()?;
    info!(
        kodi_url = %config.kodi_url,
        notify_addr = %config.kodi_notify_addr,
        catalog = %config.bluray_base_url,
        "Starting autofit"
    );

    let host = Arc::new(KodiClient::new(KodiConfig::from_config(&config))?);
    let lookup = Arc::new(BlurayClient::new(config.catalog_config())?);
    let settings = Arc::new(config.settings());

    let (event_tx, event_rx) = mpsc::channel(32);
    let listener = tokio::spawn(NotificationListener::new(config.kodi_notify_addr.clone()).run(event_tx));

    let watcher = PlaybackWatcher::new(host, lookup, settings, config.resolver_config());

    let mut states = watcher.subscribe();
    tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = states.borrow_and_update().clone();
            debug!(state = ?state, "Watcher state changed");
        }
    });

    let watcher_task = tokio::spawn(watcher.run(event_rx));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown requested");

    // Dropping the listener closes the event channel; the watcher resets the
    // display and returns.
    listener.abort();
    let _ = listener.await;
    watcher_task.await.context("Playback watcher panicked")?;

    info!("Autofit stopped");
    Ok(())
}
