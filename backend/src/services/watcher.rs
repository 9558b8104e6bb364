//! Playback watcher
//!
//! Consumes [`PlaybackEvent`]s and drives one auto-fit session per playback:
//!
//! ```text
//! Idle -> AwaitingMetadata -> Resolving -> Applied -> Idle
//! ```
//!
//! Every received event bumps the watcher's token. A session remembers the
//! token it started with and its result is only applied while that token is
//! still current, so a session overtaken by a stop or a new item never
//! touches the display.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use super::bluray::{AspectRatioLookup, LookupOutcome};
use super::host::{PlaybackEvent, PlaybackHost};
use super::metadata::{MetadataResolver, ResolverConfig};
use crate::config::{ScreenConfig, SettingsStore};
use crate::error::AutofitError;
use crate::media::{AspectRatioResult, MediaIdentity, ZoomAdjustment, ZoomCalculator};

/// Observable watcher state
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum WatcherState {
    Idle,
    AwaitingMetadata {
        session: u64,
    },
    Resolving {
        session: u64,
        /// `None` when metadata never became usable
        identity: Option<MediaIdentity>,
    },
    Applied {
        session: u64,
        ratio: AspectRatioResult,
        adjustment: ZoomAdjustment,
    },
}

impl WatcherState {
    pub fn session(&self) -> Option<u64> {
        match self {
            Self::Idle => None,
            Self::AwaitingMetadata { session }
            | Self::Resolving { session, .. }
            | Self::Applied { session, .. } => Some(*session),
        }
    }
}

/// What a finished session wants applied
#[derive(Debug, Clone, Copy)]
struct SessionResult {
    ratio: AspectRatioResult,
    adjustment: ZoomAdjustment,
}

enum SessionEnd {
    Finished(SessionResult),
    /// Another event arrived first; `None` means the event stream closed
    Interrupted(Option<PlaybackEvent>),
}

pub struct PlaybackWatcher {
    host: Arc<dyn PlaybackHost>,
    resolver: MetadataResolver,
    lookup: Arc<dyn AspectRatioLookup>,
    settings: Arc<dyn SettingsStore>,
    calculator: ZoomCalculator,
    token: u64,
    /// Adjustment currently on the display, if any
    applied: Option<ZoomAdjustment>,
    state_tx: watch::Sender<WatcherState>,
}

impl PlaybackWatcher {
    pub fn new(
        host: Arc<dyn PlaybackHost>,
        lookup: Arc<dyn AspectRatioLookup>,
        settings: Arc<dyn SettingsStore>,
        resolver_config: ResolverConfig,
    ) -> Self {
        let (state_tx, _) = watch::channel(WatcherState::Idle);
        Self {
            resolver: MetadataResolver::new(host.clone(), resolver_config),
            host,
            lookup,
            settings,
            calculator: ZoomCalculator::default(),
            token: 0,
            applied: None,
            state_tx,
        }
    }

    pub fn with_calculator(mut self, calculator: ZoomCalculator) -> Self {
        self.calculator = calculator;
        self
    }

    /// Receive every state transition
    pub fn subscribe(&self) -> watch::Receiver<WatcherState> {
        self.state_tx.subscribe()
    }

    pub fn state(&self) -> WatcherState {
        self.state_tx.borrow().clone()
    }

    /// Run until the event stream closes. The display is reset on the way out.
    pub async fn run(mut self, mut events: mpsc::Receiver<PlaybackEvent>) {
        info!("Playback watcher started");

        let mut queued: Option<PlaybackEvent> = None;

        loop {
            let event = match queued.take() {
                Some(event) => event,
                None => match events.recv().await {
                    Some(event) => self.accept(event),
                    None => break,
                },
            };

            match event {
                PlaybackEvent::PlaybackStarted { is_video } => {
                    self.reset_display().await;

                    if !is_video {
                        debug!("Non-video playback, ignoring");
                        continue;
                    }

                    let screen = self.settings.screen_config();
                    if !screen.enabled {
                        info!("Auto-fit disabled, leaving display untouched");
                        continue;
                    }

                    let session = self.token;
                    let end = tokio::select! {
                        result = self.run_session(session, screen) => SessionEnd::Finished(result),
                        next = events.recv() => SessionEnd::Interrupted(next),
                    };

                    match end {
                        SessionEnd::Finished(result) => {
                            // An event that raced the session's completion wins
                            if let Ok(next) = events.try_recv() {
                                queued = Some(self.accept(next));
                            }
                            self.apply_if_current(session, result).await;
                        }
                        SessionEnd::Interrupted(Some(next)) => {
                            info!(session = session, event = ?next, "Session interrupted, dropping in-flight work");
                            self.publish(WatcherState::Idle);
                            queued = Some(self.accept(next));
                        }
                        SessionEnd::Interrupted(None) => {
                            info!(session = session, "Event stream closed during session");
                            break;
                        }
                    }
                }
                PlaybackEvent::PlaybackStopped | PlaybackEvent::ItemChanged => {
                    self.reset_display().await;
                }
            }
        }

        self.reset_display().await;
        info!("Playback watcher stopped");
    }

    fn accept(&mut self, event: PlaybackEvent) -> PlaybackEvent {
        self.token += 1;
        debug!(token = self.token, event = ?event, "Playback event");
        event
    }

    /// Resolve metadata, look up the ratio and compute the adjustment.
    /// Never touches the display.
    async fn run_session(&self, session: u64, screen: ScreenConfig) -> SessionResult {
        self.publish(WatcherState::AwaitingMetadata { session });
        let outcome = self.resolver.await_stable().await;

        self.publish(WatcherState::Resolving {
            session,
            identity: outcome.identity().cloned(),
        });

        let ratio = match outcome.identity() {
            Some(identity) => match self.lookup.lookup(identity).await {
                LookupOutcome::Found(ratio) => ratio,
                LookupOutcome::NotFound => {
                    let ratio = AspectRatioResult::fallback(Some(identity.kind));
                    info!(
                        session = session,
                        identity = %identity,
                        ratio = ratio.ratio,
                        "No catalog ratio, using fallback"
                    );
                    ratio
                }
            },
            None => {
                let ratio = AspectRatioResult::fallback(outcome.kind());
                warn!(
                    session = session,
                    kind = ?outcome.kind(),
                    ratio = ratio.ratio,
                    error = %AutofitError::MetadataIncomplete,
                    "Skipping lookup, using fallback"
                );
                ratio
            }
        };

        let adjustment = self.calculator.compute(ratio.ratio, screen.aspect_ratio);
        SessionResult { ratio, adjustment }
    }

    async fn apply_if_current(&mut self, session: u64, result: SessionResult) {
        if session != self.token {
            debug!(session = session, token = self.token, "Discarding stale session result");
            self.publish(WatcherState::Idle);
            return;
        }

        info!(
            session = session,
            ratio = result.ratio.ratio,
            source = ?result.ratio.source,
            vertical_zoom = result.adjustment.vertical_zoom,
            pixel_ratio = result.adjustment.pixel_ratio,
            "Applying view mode"
        );

        if let Err(e) = self.apply(result.adjustment).await {
            error!(session = session, error = %e, "View mode not applied");
        }

        // Counted as applied even on failure so the next stop resets the display
        self.applied = Some(result.adjustment);
        self.publish(WatcherState::Applied {
            session,
            ratio: result.ratio,
            adjustment: result.adjustment,
        });
    }

    async fn apply(&self, adjustment: ZoomAdjustment) -> Result<(), AutofitError> {
        self.host
            .apply_view_mode(adjustment)
            .await
            .map_err(|e| AutofitError::ApplyFailed(format!("{e:#}")))
    }

    /// Put the display back to identity if this watcher changed it
    async fn reset_display(&mut self) {
        if let Some(previous) = self.applied.take() {
            debug!(
                vertical_zoom = previous.vertical_zoom,
                pixel_ratio = previous.pixel_ratio,
                "Resetting view mode"
            );
            if let Err(e) = self.apply(ZoomAdjustment::IDENTITY).await {
                error!(error = %e, "View mode not reset");
            }
        }
        self.publish(WatcherState::Idle);
    }

    fn publish(&self, state: WatcherState) {
        self.state_tx.send_replace(state);
    }
}
