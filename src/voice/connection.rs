//! Realtime voice websocket connection handling
//!
//! A connection is a pair of tasks: the receive task parses server events
//! and forwards them to the driver, the send task writes client events and
//! keeps the socket alive with pings.

use super::messages::{ClientEvent, ServerEvent, SessionConfig};
use super::AudioChunk;
use crate::config::VoiceConfig;
use crate::error::VoiceChannelError;
use base64::Engine;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, trace, warn};

pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// What the receive side reports to the driver
#[derive(Debug)]
pub(crate) enum Inbound {
    Event(ServerEvent),
    /// The socket failed or was closed by the server
    Lost(String),
}

/// Build the websocket URL with the model query parameter
pub(crate) fn build_ws_url(base: &str, model: &str) -> Result<url::Url, String> {
    let mut url = url::Url::parse(base).map_err(|e| e.to_string())?;
    if !model.is_empty() && !url.query_pairs().any(|(k, _)| k == "model") {
        url.query_pairs_mut().append_pair("model", model);
    }
    Ok(url)
}

/// Build the websocket request with Bearer token authentication
pub(crate) fn build_ws_request(url: &url::Url, api_key: &str) -> Result<http::Request<()>, String> {
    let host = match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => format!("{}:{}", host, port),
        (Some(host), None) => host.to_string(),
        (None, _) => return Err("Invalid URL: no host".to_string()),
    };

    let mut builder = http::Request::builder()
        .uri(url.as_str())
        .header("Host", host)
        .header("OpenAI-Beta", "realtime=v1")
        .header("Upgrade", "websocket")
        .header("Connection", "Upgrade")
        .header("Sec-WebSocket-Key", super::helpers::generate_ws_key())
        .header("Sec-WebSocket-Version", "13");
    if !api_key.is_empty() {
        builder = builder.header("Authorization", format!("Bearer {}", api_key));
    }
    builder.body(()).map_err(|e| e.to_string())
}

/// Open the socket, bounded by the configured connect timeout
#[tracing::instrument(skip(config), fields(url = %config.url))]
pub(crate) async fn open(config: &VoiceConfig) -> Result<WsStream, VoiceChannelError> {
    let url = build_ws_url(&config.url, &config.model).map_err(VoiceChannelError::Connection)?;
    let request =
        build_ws_request(&url, config.api_key.expose()).map_err(VoiceChannelError::Connection)?;

    match timeout(config.connect_timeout(), connect_async(request)).await {
        Ok(Ok((stream, _response))) => {
            info!("Connected to realtime voice service");
            Ok(stream)
        }
        Ok(Err(e)) => {
            error!("Voice websocket connection failed: {}", e);
            Err(VoiceChannelError::Connection(e.to_string()))
        }
        Err(_) => {
            error!("Voice websocket connection timed out");
            Err(VoiceChannelError::ConnectionTimeout(
                config.connect_timeout_secs,
            ))
        }
    }
}

/// A live connection: outgoing events in, server events out
pub(crate) struct Connection {
    outgoing: mpsc::Sender<ClientEvent>,
    pub(crate) incoming: mpsc::Receiver<Inbound>,
    recv_task: JoinHandle<()>,
    send_task: JoinHandle<()>,
}

impl Connection {
    /// Split the socket, queue the session configuration and spawn the tasks
    pub(crate) fn spawn(ws: WsStream, session: SessionConfig, ping_interval: Duration) -> Self {
        let (ws_sink, ws_stream) = ws.split();
        let (inbound_tx, incoming) = mpsc::channel(256);
        let (outgoing, outgoing_rx) = mpsc::channel(1000);

        // Queued first so it is the first frame on the wire
        let _ = outgoing.try_send(ClientEvent::SessionUpdate { session });

        let recv_task = spawn_receive_task(ws_stream, inbound_tx.clone());
        let send_task = spawn_send_task(ws_sink, outgoing_rx, inbound_tx, ping_interval);
        Self {
            outgoing,
            incoming,
            recv_task,
            send_task,
        }
    }

    /// Queue an event for the send task. Audio is dropped when the queue is
    /// full rather than stalling the driver.
    pub(crate) fn send(&self, event: ClientEvent) {
        if let Err(e) = self.outgoing.try_send(event) {
            warn!("Dropping outgoing voice event: {}", e);
        }
    }

    /// Tear the connection down without waiting for in-flight work
    pub(crate) fn close(self) {
        drop(self.outgoing);
        self.recv_task.abort();
        // The send task closes the sink once the outgoing queue is dropped;
        // abort as well in case it is blocked on a dead socket
        let send_task = self.send_task;
        tokio::spawn(async move {
            if timeout(Duration::from_secs(1), send_task).await.is_err() {
                debug!("Voice send task did not exit in time");
            }
        });
    }
}

fn spawn_receive_task(
    mut ws_stream: impl StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
        + Unpin
        + Send
        + 'static,
    inbound_tx: mpsc::Sender<Inbound>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(msg_result) = ws_stream.next().await {
            match msg_result {
                Ok(Message::Text(text)) => {
                    trace!("Voice message: {}", text);
                    match serde_json::from_str::<ServerEvent>(&text) {
                        Ok(event) => {
                            if inbound_tx.send(Inbound::Event(event)).await.is_err() {
                                return;
                            }
                        }
                        Err(e) => {
                            warn!("Failed to parse voice message: {} - {}", e, text);
                        }
                    }
                }
                Ok(Message::Close(frame)) => {
                    info!("Voice websocket closed by server: {:?}", frame);
                    let _ = inbound_tx
                        .send(Inbound::Lost("closed by server".to_string()))
                        .await;
                    return;
                }
                Ok(Message::Ping(_)) => {
                    trace!("Received voice websocket ping");
                }
                Ok(Message::Pong(_)) => {
                    trace!("Received voice websocket pong");
                }
                Err(e) => {
                    error!("Voice websocket receive error: {}", e);
                    let _ = inbound_tx.send(Inbound::Lost(e.to_string())).await;
                    return;
                }
                _ => {}
            }
        }
        let _ = inbound_tx
            .send(Inbound::Lost("stream ended".to_string()))
            .await;
    })
}

fn spawn_send_task<S>(
    mut ws_sink: S,
    mut outgoing_rx: mpsc::Receiver<ClientEvent>,
    inbound_tx: mpsc::Sender<Inbound>,
    ping_every: Duration,
) -> JoinHandle<()>
where
    S: SinkExt<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut events_sent = 0u64;
        let mut ping_interval = interval_at(Instant::now() + ping_every, ping_every);
        ping_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                event = outgoing_rx.recv() => {
                    let Some(event) = event else {
                        debug!("Voice outgoing queue closed after {} events", events_sent);
                        let _ = ws_sink.close().await;
                        return;
                    };
                    let json = match serde_json::to_string(&event) {
                        Ok(json) => json,
                        Err(e) => {
                            error!("Failed to serialize voice event: {}", e);
                            continue;
                        }
                    };
                    if let Err(e) = ws_sink.send(Message::Text(json)).await {
                        error!("Failed to send voice event: {}", e);
                        let _ = inbound_tx.send(Inbound::Lost(e.to_string())).await;
                        return;
                    }
                    events_sent += 1;
                }
                _ = ping_interval.tick() => {
                    if ws_sink.send(Message::Ping(vec![])).await.is_err() {
                        warn!("Failed to send voice keepalive ping");
                        let _ = inbound_tx.send(Inbound::Lost("keepalive failed".to_string())).await;
                        return;
                    }
                    trace!("Sent voice keepalive ping");
                }
            }
        }
    })
}

/// Encode an audio chunk as the base64 PCM16 little-endian payload the
/// service expects
pub(crate) fn encode_audio(chunk: &AudioChunk) -> String {
    let bytes: Vec<u8> = chunk
        .samples
        .iter()
        .flat_map(|&s| s.to_le_bytes())
        .collect();
    base64::engine::general_purpose::STANDARD.encode(bytes)
}
