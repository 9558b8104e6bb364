//! Kodi JSON-RPC adapter
//!
//! Queries and view-mode calls go over HTTP (`POST /jsonrpc`). Playback
//! notifications arrive on Kodi's raw TCP JSON-RPC socket as a stream of
//! concatenated JSON objects with no framing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use backoff::ExponentialBackoff;
use backoff::backoff::Backoff;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::host::{PlaybackEvent, PlaybackHost, PlayingItem};
use crate::media::ZoomAdjustment;

/// `Player.GetItem` properties. Kodi 21 rejects defaults such as `label` here.
const ITEM_PROPERTIES: &[&str] = &["showtitle", "premiered", "year", "title", "customproperties"];

#[derive(Debug, Clone)]
pub struct KodiConfig {
    /// JSON-RPC HTTP endpoint, e.g. `http://127.0.0.1:8080/jsonrpc`
    pub url: String,
    /// TCP notification socket, e.g. `127.0.0.1:9090`
    pub notify_addr: String,
    pub user: Option<String>,
    pub password: Option<String>,
    pub request_timeout: Duration,
}

impl KodiConfig {
    pub fn from_config(config: &crate::config::Config) -> Self {
        Self {
            url: config.kodi_url.clone(),
            notify_addr: config.kodi_notify_addr.clone(),
            user: config.kodi_user.clone(),
            password: config.kodi_password.clone(),
            request_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ActivePlayer {
    playerid: i64,
    #[serde(rename = "type")]
    player_type: String,
}

#[derive(Debug, Deserialize)]
struct GetItemResult {
    item: KodiItem,
}

/// Item as Kodi reports it; looser than [`PlayingItem`]
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct KodiItem {
    pub label: String,
    pub title: String,
    pub showtitle: String,
    #[serde(rename = "type")]
    pub item_type: String,
    /// 0 when unknown
    pub year: i64,
    pub premiered: String,
    pub customproperties: HashMap<String, Value>,
}

impl From<KodiItem> for PlayingItem {
    fn from(item: KodiItem) -> Self {
        let custom_properties = item
            .customproperties
            .into_iter()
            .map(|(key, value)| {
                let value = match value {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                (key, value)
            })
            .collect();

        PlayingItem {
            label: item.label,
            title: item.title,
            show_title: item.showtitle,
            item_type: item.item_type,
            year: u16::try_from(item.year).ok().filter(|y| *y > 0),
            premiered: item.premiered,
            custom_properties,
        }
    }
}

/// HTTP JSON-RPC client implementing [`PlaybackHost`]
pub struct KodiClient {
    client: Client,
    config: KodiConfig,
    next_id: AtomicU64,
}

impl KodiClient {
    pub fn new(config: KodiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.request_timeout)
            .build()
            .context("Failed to create Kodi HTTP client")?;

        Ok(Self {
            client,
            config,
            next_id: AtomicU64::new(1),
        })
    }

    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        let mut builder = self.client.post(&self.config.url).json(&request);
        if let Some(user) = &self.config.user {
            builder = builder.basic_auth(user, self.config.password.as_ref());
        }

        let response = builder
            .send()
            .await
            .with_context(|| format!("Failed to call {}", method))?;

        if !response.status().is_success() {
            bail!("{} failed with status: {}", method, response.status());
        }

        let body: RpcResponse<T> = response
            .json()
            .await
            .with_context(|| format!("Failed to parse {} response", method))?;

        if let Some(error) = body.error {
            bail!("{} rejected ({}): {}", method, error.code, error.message);
        }

        body.result
            .with_context(|| format!("{} returned no result", method))
    }

    /// Id of the active video player, if any
    async fn video_player(&self) -> Result<Option<i64>> {
        let players: Vec<ActivePlayer> = self.call("Player.GetActivePlayers", json!({})).await?;
        Ok(players
            .into_iter()
            .find(|p| p.player_type == "video")
            .map(|p| p.playerid))
    }

    async fn set_view_mode(&self, params: Value) -> Result<()> {
        let _: Value = self.call("Player.SetViewMode", params).await?;
        Ok(())
    }
}

/// `Player.SetViewMode` parameters for an adjustment.
///
/// Kodi's `zoom` scales both axes and its `pixelratio` widens the picture on
/// top of that. Dividing the pixel ratio by the zoom keeps the horizontal
/// scale at `pixel_ratio`, so only the height grows by `vertical_zoom`.
pub fn view_mode_params(adjustment: ZoomAdjustment) -> Value {
    json!({
        "viewmode": {
            "zoom": adjustment.vertical_zoom,
            "pixelratio": adjustment.pixel_ratio / adjustment.vertical_zoom,
        }
    })
}

#[async_trait]
impl PlaybackHost for KodiClient {
    async fn current_item(&self) -> Result<Option<PlayingItem>> {
        let Some(player_id) = self.video_player().await? else {
            return Ok(None);
        };

        let result: GetItemResult = self
            .call(
                "Player.GetItem",
                json!({ "playerid": player_id, "properties": ITEM_PROPERTIES }),
            )
            .await?;

        Ok(Some(result.item.into()))
    }

    async fn apply_view_mode(&self, adjustment: ZoomAdjustment) -> Result<()> {
        let params = view_mode_params(adjustment);
        debug!(params = %params, "Setting Kodi view mode");
        self.set_view_mode(params).await
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Notification {
    method: String,
    params: NotificationParams,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct NotificationParams {
    data: Value,
}

/// Map one notification frame to a playback event.
///
/// `Player.OnAVStart` is the start signal since metadata is not ready at
/// `Player.OnPlay`; an `OnPlay` is reported as an item change, which the
/// watcher ignores when nothing is active.
pub fn decode_notification(frame: &Value) -> Option<PlaybackEvent> {
    let notification = Notification::deserialize(frame).ok()?;

    match notification.method.as_str() {
        "Player.OnAVStart" => {
            let item_type = notification.params.data["item"]["type"]
                .as_str()
                .unwrap_or_default();
            Some(PlaybackEvent::PlaybackStarted {
                is_video: !matches!(item_type, "song" | "picture"),
            })
        }
        "Player.OnPlay" => Some(PlaybackEvent::ItemChanged),
        "Player.OnStop" => Some(PlaybackEvent::PlaybackStopped),
        _ => None,
    }
}

/// Split a buffer into complete JSON frames.
///
/// Returns the frames and the number of bytes consumed; an incomplete trailing
/// frame is left for the next read.
pub fn split_frames(buf: &[u8]) -> Result<(Vec<Value>, usize)> {
    let mut stream = serde_json::Deserializer::from_slice(buf).into_iter::<Value>();
    let mut frames = Vec::new();

    loop {
        match stream.next() {
            Some(Ok(frame)) => frames.push(frame),
            Some(Err(e)) if e.is_eof() => break,
            Some(Err(e)) => return Err(e).context("Malformed notification stream"),
            None => break,
        }
    }

    Ok((frames, stream.byte_offset()))
}

/// Reads Kodi's notification socket and forwards playback events.
pub struct NotificationListener {
    addr: String,
    reconnect: ExponentialBackoff,
}

impl NotificationListener {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            reconnect: ExponentialBackoff {
                initial_interval: Duration::from_secs(1),
                max_interval: Duration::from_secs(30),
                max_elapsed_time: None,
                ..Default::default()
            },
        }
    }

    /// Run until the receiving side of `events` is dropped, reconnecting
    /// whenever Kodi goes away.
    pub async fn run(mut self, events: mpsc::Sender<PlaybackEvent>) {
        loop {
            match self.listen_once(&events).await {
                Ok(()) => {
                    info!("Event receiver closed, notification listener stopping");
                    return;
                }
                Err(e) => {
                    let delay = self
                        .reconnect
                        .next_backoff()
                        .unwrap_or(self.reconnect.max_interval);
                    warn!(
                        addr = %self.addr,
                        error = %e,
                        retry_in_ms = delay.as_millis() as u64,
                        "Kodi notification connection lost"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// One connection. `Ok` only when the event receiver is gone.
    async fn listen_once(&mut self, events: &mpsc::Sender<PlaybackEvent>) -> Result<()> {
        let stream = TcpStream::connect(&self.addr)
            .await
            .with_context(|| format!("Failed to connect to {}", self.addr))?;
        info!(addr = %self.addr, "Connected to Kodi notifications");
        self.reconnect.reset();

        forward_notifications(stream, events).await
    }
}

/// Decode notifications from `reader` and send the playback events on.
///
/// Returns `Ok` when the receiver is dropped and an error when the stream
/// ends or turns out malformed.
pub async fn forward_notifications<R>(mut reader: R, events: &mpsc::Sender<PlaybackEvent>) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut buf: Vec<u8> = Vec::with_capacity(8192);
    let mut chunk = [0u8; 4096];

    loop {
        let n = reader
            .read(&mut chunk)
            .await
            .context("Failed to read notification")?;
        if n == 0 {
            bail!("Kodi closed the notification socket");
        }
        buf.extend_from_slice(&chunk[..n]);

        let (frames, consumed) = split_frames(&buf)?;
        buf.drain(..consumed);

        for frame in frames {
            let Some(event) = decode_notification(&frame) else {
                continue;
            };
            debug!(event = ?event, method = %frame["method"], "Kodi notification");
            if events.send(event).await.is_err() {
                return Ok(());
            }
        }
    }
}
