//! Realtime voice channel to the AI interviewer
//!
//! A single driver task owns the websocket connection and the
//! [`VoiceMachine`](state::VoiceMachine). Callers control it through a
//! cloneable [`VoiceHandle`] and observe it through broadcast
//! [`VoiceNotice`]s. Connection loss is recovered by automatic reconnection.

mod connection;
mod helpers;
mod messages;
mod state;

pub(crate) use helpers::pcm16_chunks;
pub use state::{ListeningMode, VoiceState};

use crate::config::VoiceConfig;
use crate::error::VoiceChannelError;
use crate::session::{Speaker, TranscriptUpdate};
use connection::{Connection, Inbound, WsStream};
use messages::{ClientEvent, ServerEvent, SessionConfig};
use state::{VoiceEffect, VoiceInput, VoiceMachine};
use std::future::pending;
use std::pin::Pin;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Sleep};
use tracing::{debug, error, info, trace, warn};

/// Audio chunk ready to be sent over the websocket
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// PCM 16-bit signed samples (mono)
    pub samples: Vec<i16>,
    /// Sample rate in Hz (the realtime service expects 24000)
    pub sample_rate: u32,
}

/// Voice channel event for subscribers
#[derive(Clone, Debug)]
pub enum VoiceNotice {
    State(VoiceState),
    Mode(ListeningMode),
    /// Partial or final transcript for one speaker
    Transcript(TranscriptUpdate),
    /// A speaker's in-flight partial was abandoned
    PartialDiscarded(Speaker),
    /// Error reported by the service or the transport
    Error { message: String },
    /// Attempting to reconnect
    Reconnecting { attempt: u32 },
    /// Successfully reconnected
    Reconnected,
    /// Failed to reconnect after max attempts
    ReconnectFailed,
}

#[derive(Debug)]
pub(crate) enum VoiceCommand {
    Connect {
        instructions: String,
    },
    StartListening,
    StopListening,
    EnableAlwaysListening,
    DisableAlwaysListening,
    Audio(AudioChunk),
    PlayIntroduction {
        text: String,
        reply: oneshot::Sender<Result<(), VoiceChannelError>>,
    },
    Reconnect,
    Shutdown {
        ack: oneshot::Sender<()>,
    },
}

/// Cloneable control handle for the voice channel
#[derive(Clone)]
pub struct VoiceHandle {
    commands: mpsc::Sender<VoiceCommand>,
    notices: broadcast::Sender<VoiceNotice>,
}

impl VoiceHandle {
    /// Subscribe to voice notices
    pub fn subscribe(&self) -> broadcast::Receiver<VoiceNotice> {
        self.notices.subscribe()
    }

    async fn send(&self, command: VoiceCommand) -> Result<(), VoiceChannelError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| VoiceChannelError::Closed)
    }

    /// Open the connection; `instructions` carry the question context
    pub async fn connect(&self, instructions: String) -> Result<(), VoiceChannelError> {
        self.send(VoiceCommand::Connect { instructions }).await
    }

    /// Push-to-talk press
    pub async fn start_listening(&self) -> Result<(), VoiceChannelError> {
        self.send(VoiceCommand::StartListening).await
    }

    /// Push-to-talk release; discards an unfinished utterance
    pub async fn stop_listening(&self) -> Result<(), VoiceChannelError> {
        self.send(VoiceCommand::StopListening).await
    }

    pub async fn enable_always_listening(&self) -> Result<(), VoiceChannelError> {
        self.send(VoiceCommand::EnableAlwaysListening).await
    }

    pub async fn disable_always_listening(&self) -> Result<(), VoiceChannelError> {
        self.send(VoiceCommand::DisableAlwaysListening).await
    }

    /// Forward microphone audio. Dropped unless a listening mode is active.
    pub async fn send_audio(&self, chunk: AudioChunk) -> Result<(), VoiceChannelError> {
        self.send(VoiceCommand::Audio(chunk)).await
    }

    /// Ask the interviewer to speak the introduction now. Fails with
    /// `NotReady` unless the channel is connected and idle-listening.
    pub async fn play_introduction(&self, text: String) -> Result<(), VoiceChannelError> {
        let (reply, rx) = oneshot::channel();
        self.send(VoiceCommand::PlayIntroduction { text, reply })
            .await?;
        rx.await.map_err(|_| VoiceChannelError::Closed)?
    }

    /// Retry connecting after reconnection gave up
    pub async fn reconnect(&self) -> Result<(), VoiceChannelError> {
        self.send(VoiceCommand::Reconnect).await
    }

    /// Forcibly tear down the connection, whatever it is doing. Returns once
    /// the channel is idle. Safe to call repeatedly.
    pub async fn shutdown(&self) {
        let (ack, rx) = oneshot::channel();
        if self.send(VoiceCommand::Shutdown { ack }).await.is_ok() {
            let _ = rx.await;
        }
    }

    /// A handle with no driver behind it; commands land on the returned
    /// receiver
    #[cfg(test)]
    pub(crate) fn detached() -> (Self, mpsc::Receiver<VoiceCommand>) {
        let (commands, rx) = mpsc::channel(64);
        let (notices, _) = broadcast::channel(100);
        (Self { commands, notices }, rx)
    }

    #[cfg(test)]
    pub(crate) fn publish(&self, notice: VoiceNotice) {
        let _ = self.notices.send(notice);
    }
}

/// The voice channel driver
pub struct VoiceChannel {
    config: VoiceConfig,
    machine: VoiceMachine,
    commands: mpsc::Receiver<VoiceCommand>,
    notices: broadcast::Sender<VoiceNotice>,
    instructions: String,
    connection: Option<Connection>,
    connecting: Option<JoinHandle<Result<WsStream, VoiceChannelError>>>,
    retry: Option<Pin<Box<Sleep>>>,
    reconnect_attempts: u32,
}

impl VoiceChannel {
    /// Spawn the driver task. The channel stays idle until `connect`.
    pub(crate) fn spawn(config: VoiceConfig) -> (VoiceHandle, JoinHandle<()>) {
        let (commands_tx, commands) = mpsc::channel(256);
        let (notices, _) = broadcast::channel(100);
        let channel = Self {
            config,
            machine: VoiceMachine::new(),
            commands,
            notices: notices.clone(),
            instructions: String::new(),
            connection: None,
            connecting: None,
            retry: None,
            reconnect_attempts: 0,
        };
        let task = tokio::spawn(channel.run());
        (
            VoiceHandle {
                commands: commands_tx,
                notices,
            },
            task,
        )
    }

    async fn run(mut self) {
        info!("Voice channel started");
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(VoiceCommand::Shutdown { ack }) => {
                        self.teardown();
                        let _ = ack.send(());
                    }
                    Some(command) => self.handle_command(command),
                    None => {
                        self.teardown();
                        break;
                    }
                },
                result = connect_finished(&mut self.connecting) => {
                    self.connecting = None;
                    self.on_connect_result(result);
                }
                inbound = next_inbound(&mut self.connection) => self.on_inbound(inbound),
                _ = retry_due(&mut self.retry) => {
                    self.retry = None;
                    if self.apply(VoiceInput::Connect) {
                        self.begin_connect();
                    }
                }
            }
        }
        info!("Voice channel stopped");
    }

    fn handle_command(&mut self, command: VoiceCommand) {
        match command {
            VoiceCommand::Connect { instructions } => {
                self.instructions = instructions;
                if self.apply(VoiceInput::Connect) {
                    self.reconnect_attempts = 0;
                    self.begin_connect();
                }
            }
            VoiceCommand::StartListening => {
                self.apply(VoiceInput::StartListening);
            }
            VoiceCommand::StopListening => {
                self.apply(VoiceInput::StopListening);
            }
            VoiceCommand::EnableAlwaysListening => {
                self.apply(VoiceInput::EnableAlwaysListening);
            }
            VoiceCommand::DisableAlwaysListening => {
                self.apply(VoiceInput::DisableAlwaysListening);
            }
            VoiceCommand::Audio(chunk) => {
                if !self.machine.mic_open() {
                    trace!("Microphone closed, dropping audio chunk");
                    return;
                }
                if let Some(connection) = &self.connection {
                    connection.send(ClientEvent::InputAudioBufferAppend {
                        audio: connection::encode_audio(&chunk),
                    });
                }
            }
            VoiceCommand::PlayIntroduction { text, reply } => {
                let result = match self.machine.dispatch(VoiceInput::PlayIntroduction { text }) {
                    Ok(effects) => {
                        info!("Playing introduction");
                        self.execute(effects);
                        Ok(())
                    }
                    Err(e) => {
                        debug!("{}", e);
                        Err(VoiceChannelError::NotReady(e.state))
                    }
                };
                let _ = reply.send(result);
            }
            VoiceCommand::Reconnect => {
                if self.machine.state() != VoiceState::Error {
                    debug!(state = %self.machine.state(), "Reconnect ignored");
                    return;
                }
                self.retry = None;
                self.reconnect_attempts = 0;
                if self.apply(VoiceInput::Connect) {
                    self.begin_connect();
                }
            }
            VoiceCommand::Shutdown { ack } => {
                self.teardown();
                let _ = ack.send(());
            }
        }
    }

    /// Drop the connection and any pending reconnect, discarding in-flight
    /// work
    fn teardown(&mut self) {
        if let Some(task) = self.connecting.take() {
            task.abort();
        }
        self.retry = None;
        if let Some(connection) = self.connection.take() {
            connection.close();
            info!("Voice connection closed");
        }
        self.apply(VoiceInput::Shutdown);
    }

    fn begin_connect(&mut self) {
        let config = self.config.clone();
        self.connecting = Some(tokio::spawn(
            async move { connection::open(&config).await },
        ));
    }

    fn on_connect_result(&mut self, result: Result<WsStream, VoiceChannelError>) {
        match result {
            Ok(ws) => {
                let session = SessionConfig::new(&self.instructions, &self.config.voice);
                self.connection = Some(Connection::spawn(
                    ws,
                    session,
                    self.config.ping_interval(),
                ));
                if self.reconnect_attempts > 0 {
                    info!(
                        attempts = self.reconnect_attempts,
                        "Voice channel reconnected"
                    );
                    self.notify(VoiceNotice::Reconnected);
                }
                self.reconnect_attempts = 0;
                self.apply(VoiceInput::Connected);
            }
            Err(e) => {
                self.notify(VoiceNotice::Error {
                    message: e.to_string(),
                });
                self.on_connection_lost();
            }
        }
    }

    fn on_inbound(&mut self, inbound: Inbound) {
        match inbound {
            Inbound::Event(event) => self.on_server_event(event),
            Inbound::Lost(reason) => {
                warn!(reason = %reason, "Voice connection lost");
                if let Some(connection) = self.connection.take() {
                    connection.close();
                }
                self.on_connection_lost();
            }
        }
    }

    fn on_server_event(&mut self, event: ServerEvent) {
        if let Some(message) = event.error_message() {
            error!("Voice service error: {}", message);
            self.notify(VoiceNotice::Error { message });
            return;
        }
        match &event {
            ServerEvent::SessionCreated { session } | ServerEvent::SessionUpdated { session } => {
                if let Some(info) = session {
                    info!(id = ?info.id, model = ?info.model, "Voice session configured");
                }
            }
            _ => {}
        }
        if let Some(input) = event.into_input() {
            self.apply(input);
        }
    }

    /// Enter `error` and schedule a reconnect, or give up after too many
    /// consecutive failures
    fn on_connection_lost(&mut self) {
        self.apply(VoiceInput::ConnectionLost);
        self.reconnect_attempts += 1;
        if self.reconnect_attempts > self.config.max_reconnect_attempts {
            error!(
                "Failed to reconnect voice channel after {} attempts",
                self.config.max_reconnect_attempts
            );
            self.notify(VoiceNotice::ReconnectFailed);
            return;
        }
        info!(
            "Reconnecting voice channel (attempt {}/{})",
            self.reconnect_attempts, self.config.max_reconnect_attempts
        );
        self.notify(VoiceNotice::Reconnecting {
            attempt: self.reconnect_attempts,
        });
        self.retry = Some(Box::pin(sleep(self.config.reconnect_delay())));
    }

    /// Feed an input to the machine and carry out its effects. Returns
    /// whether the transition was accepted.
    fn apply(&mut self, input: VoiceInput) -> bool {
        match self.machine.dispatch(input) {
            Ok(effects) => {
                self.execute(effects);
                true
            }
            Err(e) => {
                debug!("{}", e);
                false
            }
        }
    }

    fn execute(&mut self, effects: Vec<VoiceEffect>) {
        for effect in effects {
            match effect {
                VoiceEffect::State(state) => {
                    debug!(state = %state, "Voice state changed");
                    self.notify(VoiceNotice::State(state));
                }
                VoiceEffect::Mode(mode) => self.notify(VoiceNotice::Mode(mode)),
                VoiceEffect::Transcript(update) => self.notify(VoiceNotice::Transcript(update)),
                VoiceEffect::PartialDiscarded(speaker) => {
                    self.notify(VoiceNotice::PartialDiscarded(speaker))
                }
                VoiceEffect::Send(event) => match &self.connection {
                    Some(connection) => connection.send(event),
                    None => debug!("No voice connection, dropping {:?}", event),
                },
            }
        }
    }

    fn notify(&self, notice: VoiceNotice) {
        // No subscribers is fine
        let _ = self.notices.send(notice);
    }
}

async fn connect_finished(
    task: &mut Option<JoinHandle<Result<WsStream, VoiceChannelError>>>,
) -> Result<WsStream, VoiceChannelError> {
    match task {
        Some(task) => match task.await {
            Ok(result) => result,
            Err(e) => Err(VoiceChannelError::Connection(e.to_string())),
        },
        None => pending().await,
    }
}

async fn next_inbound(connection: &mut Option<Connection>) -> Inbound {
    match connection {
        Some(connection) => match connection.incoming.recv().await {
            Some(inbound) => inbound,
            None => Inbound::Lost("connection tasks ended".to_string()),
        },
        None => pending().await,
    }
}

async fn retry_due(retry: &mut Option<Pin<Box<Sleep>>>) {
    match retry {
        Some(delay) => delay.as_mut().await,
        None => pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Secret;
    use futures_util::{SinkExt, StreamExt};
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio::time::timeout;
    use tokio_tungstenite::tungstenite::Message;

    fn config(url: String, max_reconnect_attempts: u32) -> VoiceConfig {
        VoiceConfig {
            url,
            model: "test-model".into(),
            voice: "alloy".into(),
            api_key: Secret::new("sk-test"),
            connect_timeout_secs: 5,
            max_reconnect_attempts,
            reconnect_delay_secs: 0,
            ping_interval_secs: 30,
        }
    }

    async fn expect_notice(
        rx: &mut broadcast::Receiver<VoiceNotice>,
        matches: impl Fn(&VoiceNotice) -> bool,
    ) -> VoiceNotice {
        timeout(Duration::from_secs(5), async {
            loop {
                match rx.recv().await {
                    Ok(notice) if matches(&notice) => return notice,
                    Ok(_) => continue,
                    Err(e) => panic!("notice stream ended: {}", e),
                }
            }
        })
        .await
        .expect("timed out waiting for notice")
    }

    #[tokio::test]
    async fn test_connects_and_forwards_transcripts() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

            // First frame from the client is the session configuration
            let first = ws.next().await.unwrap().unwrap();
            let json: serde_json::Value =
                serde_json::from_str(first.to_text().unwrap()).unwrap();
            assert_eq!(json["type"], "session.update");
            assert_eq!(json["session"]["instructions"], "Interview about Two Sum");

            for event in [
                r#"{"type": "input_audio_buffer.speech_started"}"#,
                r#"{"type": "conversation.item.input_audio_transcription.delta", "delta": "hash "}"#,
                r#"{"type": "conversation.item.input_audio_transcription.completed", "transcript": "hash map"}"#,
            ] {
                ws.send(Message::Text(event.to_string())).await.unwrap();
            }
            // Keep the socket open until the client goes away
            while let Some(Ok(_)) = ws.next().await {}
        });

        let (handle, task) = VoiceChannel::spawn(config(format!("ws://{}", addr), 0));
        let mut notices = handle.subscribe();
        handle
            .connect("Interview about Two Sum".into())
            .await
            .unwrap();

        expect_notice(&mut notices, |n| {
            matches!(n, VoiceNotice::State(VoiceState::Listening))
        })
        .await;
        let notice = expect_notice(&mut notices, |n| {
            matches!(n, VoiceNotice::Transcript(u) if u.is_final)
        })
        .await;
        match notice {
            VoiceNotice::Transcript(update) => {
                assert_eq!(update.speaker, Speaker::User);
                assert_eq!(update.text, "hash map");
            }
            other => panic!("unexpected notice {:?}", other),
        }

        handle.shutdown().await;
        expect_notice(&mut notices, |n| {
            matches!(n, VoiceNotice::State(VoiceState::Idle))
        })
        .await;

        drop(handle);
        task.await.unwrap();
        server.abort();
    }

    #[tokio::test]
    async fn test_reconnects_after_connection_drop() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let mut configured = Vec::new();
            // The first two sockets are dropped right after configuration
            for round in 0..3 {
                let (stream, _) = listener.accept().await.unwrap();
                let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
                let first = ws.next().await.unwrap().unwrap();
                let json: serde_json::Value =
                    serde_json::from_str(first.to_text().unwrap()).unwrap();
                configured.push((
                    json["type"].as_str().unwrap_or_default().to_string(),
                    json["session"]["instructions"]
                        .as_str()
                        .unwrap_or_default()
                        .to_string(),
                ));
                if round < 2 {
                    ws.close(None).await.unwrap();
                    continue;
                }
                while let Some(Ok(_)) = ws.next().await {}
                break;
            }
            configured
        });

        // One attempt allowed: the second drop only recovers if the counter
        // was reset by the first successful reconnect
        let (handle, task) = VoiceChannel::spawn(config(format!("ws://{}", addr), 1));
        let mut notices = handle.subscribe();
        handle.connect("Interview about LRU cache".into()).await.unwrap();

        for _ in 0..2 {
            expect_notice(&mut notices, |n| {
                matches!(n, VoiceNotice::Reconnecting { attempt: 1 })
            })
            .await;
            expect_notice(&mut notices, |n| {
                matches!(n, VoiceNotice::State(VoiceState::Connecting))
            })
            .await;
            expect_notice(&mut notices, |n| matches!(n, VoiceNotice::Reconnected)).await;
            expect_notice(&mut notices, |n| {
                matches!(n, VoiceNotice::State(VoiceState::Listening))
            })
            .await;
        }
        assert!(handle.play_introduction("Hi there".into()).await.is_ok());

        handle.shutdown().await;
        drop(handle);
        task.await.unwrap();

        let configured = timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(configured.len(), 3);
        for (kind, instructions) in configured {
            assert_eq!(kind, "session.update");
            assert_eq!(instructions, "Interview about LRU cache");
        }
    }

    #[tokio::test]
    async fn test_gives_up_after_max_reconnect_attempts() {
        // Bind then drop to get a port nothing listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let (handle, _task) = VoiceChannel::spawn(config(format!("ws://{}", addr), 2));
        let mut notices = handle.subscribe();
        handle.connect("context".into()).await.unwrap();

        expect_notice(&mut notices, |n| {
            matches!(n, VoiceNotice::Reconnecting { attempt: 2 })
        })
        .await;
        expect_notice(&mut notices, |n| matches!(n, VoiceNotice::ReconnectFailed)).await;

        // Introduction can't be scheduled while the channel is down
        let err = handle
            .play_introduction("hello".into())
            .await
            .unwrap_err();
        assert!(matches!(err, VoiceChannelError::NotReady(VoiceState::Error)));

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_without_connection_is_idempotent() {
        let (handle, _task) = VoiceChannel::spawn(config("ws://127.0.0.1:1".into(), 0));
        handle.shutdown().await;
        handle.shutdown().await;
        assert!(handle.start_listening().await.is_ok());
    }
}
