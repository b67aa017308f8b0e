use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::{broadcast, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::codec::{self, ServerEvent};
use super::transport::{Connector, MessageSink, MessageStream, WireMessage};
use crate::audio::{convert, AudioFrame};
use crate::error::SessionError;
use crate::transcript::{TranscriptAssembler, TurnRecord};

const MAX_RECONNECT_ATTEMPTS: u32 = 5;
const RECONNECT_INITIAL_DELAY: Duration = Duration::from_secs(2);
const RECONNECT_MAX_DELAY: Duration = Duration::from_secs(30);
const RECONNECT_SETUP_TIMEOUT: Duration = Duration::from_secs(10);
const DISCONNECT_GRACE: Duration = Duration::from_secs(2);

/// Event channel capacity; slow subscribers lose the oldest events.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Lifecycle of a live session. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Idle,
    Connecting,
    AwaitingSetup,
    Streaming,
    Reconnecting,
    Closed,
}

/// Events delivered to session subscribers.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Incremental input transcription text, in arrival order
    InputTranscriptChunk(String),
    /// New model output text (overlap-resolved against earlier output)
    ModelOutput(String),
    /// A turn finished; the record text is empty for no-content turns
    TurnComplete(TurnRecord),
    /// The session reached its terminal state, with the last error if any
    Closed(Option<String>),
}

/// Configuration for a live session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Unique session identifier
    pub session_id: String,

    /// Provider model driving transcription and model output
    pub model: String,

    /// Behavior instruction sent with the setup message
    pub system_instruction: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_id: format!("live-{}", uuid::Uuid::new_v4()),
            model: "gemini-2.0-flash-live-001".to_string(),
            system_instruction: "Transcribe the incoming audio and answer succinctly."
                .to_string(),
        }
    }
}

/// Statistics about a live session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    /// Current lifecycle state
    pub state: SessionState,

    /// When the session was created
    pub started_at: DateTime<Utc>,

    /// Audio frames transmitted so far
    pub frames_sent: usize,

    /// Turns finalized so far
    pub turns_completed: usize,

    /// Successful reconnections so far
    pub reconnects: usize,
}

struct Shared {
    config: SessionConfig,
    connector: Box<dyn Connector>,

    /// Write half of the active connection; absent while disconnected
    sink: Mutex<Option<Box<dyn MessageSink>>>,

    state_tx: watch::Sender<SessionState>,

    /// Single-fire setup acknowledgement, one per connection attempt
    setup_tx: StdMutex<Option<oneshot::Sender<Result<(), SessionError>>>>,

    last_server_error: StdMutex<Option<String>>,
    cancel: CancellationToken,
    events: broadcast::Sender<SessionEvent>,
    assembler: TranscriptAssembler,
    frames_sent: AtomicUsize,
    reconnects: AtomicUsize,
}

impl Shared {
    fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    fn set_state(&self, state: SessionState) {
        self.state_tx.send_replace(state);
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn record_error(&self, detail: &str) {
        *self.last_server_error.lock().unwrap() = Some(detail.to_string());
    }

    fn last_error(&self) -> Option<String> {
        self.last_server_error.lock().unwrap().clone()
    }

    fn complete_setup(&self) {
        if let Some(tx) = self.setup_tx.lock().unwrap().take() {
            let _ = tx.send(Ok(()));
        }
    }

    fn fail_setup(&self, error: SessionError) {
        if let Some(tx) = self.setup_tx.lock().unwrap().take() {
            let _ = tx.send(Err(error));
        }
    }

    fn close_with(&self, reason: Option<String>) {
        self.set_state(SessionState::Closed);
        self.emit(SessionEvent::Closed(reason));
    }
}

/// A live streaming session to the provider.
///
/// Owns the connection exclusively: one background receive loop reads and
/// dispatches provider messages for the session's lifetime, reconnecting
/// with bounded backoff when the transport drops. Callers push audio with
/// `send_audio` and observe transcription through `subscribe`.
pub struct LiveSession {
    shared: Arc<Shared>,
    state_rx: watch::Receiver<SessionState>,

    /// Receive half of the setup signal, consumed by the first waiter
    setup_rx: StdMutex<Option<oneshot::Receiver<Result<(), SessionError>>>>,

    recv_task: Mutex<Option<JoinHandle<()>>>,
    started_at: DateTime<Utc>,
}

impl LiveSession {
    pub fn new(config: SessionConfig, connector: Box<dyn Connector>) -> Self {
        let (state_tx, state_rx) = watch::channel(SessionState::Idle);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            shared: Arc::new(Shared {
                config,
                connector,
                sink: Mutex::new(None),
                state_tx,
                setup_tx: StdMutex::new(None),
                last_server_error: StdMutex::new(None),
                cancel: CancellationToken::new(),
                events,
                assembler: TranscriptAssembler::new(),
                frames_sent: AtomicUsize::new(0),
                reconnects: AtomicUsize::new(0),
            }),
            state_rx,
            setup_rx: StdMutex::new(None),
            recv_task: Mutex::new(None),
            started_at: Utc::now(),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    /// Watch channel for state transitions (e.g. to await `Closed`).
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    /// Subscribe to session events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    /// Last error reported by the provider or the transport.
    pub fn last_server_error(&self) -> Option<String> {
        self.shared.last_error()
    }

    /// Session-scoped cancellation token; cancelled on disconnect.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shared.cancel.clone()
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            state: self.state(),
            started_at: self.started_at,
            frames_sent: self.shared.frames_sent.load(Ordering::Relaxed),
            turns_completed: self.shared.assembler.turns_completed(),
            reconnects: self.shared.reconnects.load(Ordering::Relaxed),
        }
    }

    /// Open the connection and send the setup message.
    ///
    /// On failure the session is unusable; construct a new one to retry.
    pub async fn connect(&self) -> Result<(), SessionError> {
        let state = self.state();
        if state != SessionState::Idle {
            return Err(SessionError::Transport(format!(
                "connect called in {:?} state",
                state
            )));
        }

        info!("Connecting session {}", self.shared.config.session_id);
        self.shared.set_state(SessionState::Connecting);
        self.shared.assembler.reset();

        let (mut sink, stream) = match self.shared.connector.connect().await {
            Ok(pair) => pair,
            Err(e) => {
                self.shared.set_state(SessionState::Closed);
                return Err(e);
            }
        };

        let setup = codec::encode_setup(
            &self.shared.config.model,
            &self.shared.config.system_instruction,
        );
        if let Err(e) = sink.send(setup).await {
            self.shared.set_state(SessionState::Closed);
            return Err(e);
        }

        let (setup_tx, setup_rx) = oneshot::channel();
        *self.shared.setup_tx.lock().unwrap() = Some(setup_tx);
        *self.setup_rx.lock().unwrap() = Some(setup_rx);
        *self.shared.sink.lock().await = Some(sink);

        self.shared.set_state(SessionState::AwaitingSetup);

        let shared = Arc::clone(&self.shared);
        let handle = tokio::spawn(receive_loop(shared, stream));
        *self.recv_task.lock().await = Some(handle);

        Ok(())
    }

    /// Wait until the provider acknowledges setup, or the deadline passes.
    ///
    /// One outstanding wait per connection attempt; the signal fires exactly
    /// once with acknowledgement, a provider error, or connection loss.
    pub async fn wait_for_setup_complete(&self, deadline: Duration) -> Result<(), SessionError> {
        let rx = self
            .setup_rx
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| SessionError::Transport("no connection attempt in progress".into()))?;

        tokio::select! {
            result = rx => match result {
                Ok(outcome) => outcome,
                // Sender dropped without firing: the receive loop died first
                Err(_) => Err(SessionError::Transport(
                    self.shared
                        .last_error()
                        .unwrap_or_else(|| "connection lost during setup".into()),
                )),
            },
            _ = tokio::time::sleep(deadline) => Err(SessionError::SetupTimeout(deadline)),
            _ = self.shared.cancel.cancelled() => Err(SessionError::Cancelled),
        }
    }

    /// Transmit one audio frame.
    ///
    /// Outside the `Streaming` state the frame is silently dropped; this is
    /// a live pipeline and stale audio has no value once late. Send faults
    /// are logged and dropped; losing a frame must not kill the session.
    pub async fn send_audio(&self, frame: &AudioFrame) {
        if self.state() != SessionState::Streaming {
            debug!("Dropping audio frame outside Streaming state");
            return;
        }

        let (pcm, rate) = convert::to_wire_pcm(frame);
        let message = codec::encode_audio_chunk(&pcm, rate);

        let mut sink = self.shared.sink.lock().await;
        match sink.as_mut() {
            Some(sink) => match sink.send(message).await {
                Ok(()) => {
                    self.shared.frames_sent.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => warn!("Failed to send audio frame: {}", e),
            },
            None => debug!("No active connection, dropping audio frame"),
        }
    }

    /// Tear the session down. Idempotent; never fails.
    pub async fn disconnect(&self) {
        info!("Disconnecting session {}", self.shared.config.session_id);
        self.shared.cancel.cancel();

        let task = self.recv_task.lock().await.take();
        if let Some(mut task) = task {
            match tokio::time::timeout(DISCONNECT_GRACE, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Receive loop task failed: {}", e),
                Err(_) => {
                    warn!(
                        "Receive loop did not exit within {:?}, aborting it",
                        DISCONNECT_GRACE
                    );
                    task.abort();
                }
            }
        }

        let sink = self.shared.sink.lock().await.take();
        if let Some(mut sink) = sink {
            if let Err(e) = sink.close().await {
                debug!("Close handshake failed: {}", e);
            }
        }

        self.shared.set_state(SessionState::Closed);
    }
}

enum PumpExit {
    Cancelled,
    ConnectionLost(String),
}

/// Background task: read, decode, and dispatch until cancelled or closed.
async fn receive_loop(shared: Arc<Shared>, mut stream: Box<dyn MessageStream>) {
    loop {
        let reason = match pump(&shared, stream.as_mut()).await {
            PumpExit::Cancelled => break,
            PumpExit::ConnectionLost(reason) => reason,
        };

        if shared.cancel.is_cancelled() {
            break;
        }

        // Lost before setup completed: this session never reached Streaming,
        // so it counts as "never connected" rather than degraded.
        if shared.state() == SessionState::AwaitingSetup {
            shared.record_error(&reason);
            shared.fail_setup(SessionError::Transport(reason.clone()));
            shared.close_with(Some(reason));
            return;
        }

        warn!("Connection lost: {}", reason);
        shared.record_error(&reason);

        match reconnect(&shared).await {
            Some(new_stream) => stream = new_stream,
            None => return,
        }
    }
}

/// Read one connection until it drops or the session is cancelled.
async fn pump(shared: &Arc<Shared>, stream: &mut dyn MessageStream) -> PumpExit {
    loop {
        let message = tokio::select! {
            _ = shared.cancel.cancelled() => return PumpExit::Cancelled,
            message = stream.next_message() => message,
        };

        let message = match message {
            None => return PumpExit::ConnectionLost("connection closed by provider".into()),
            Some(Err(e)) => return PumpExit::ConnectionLost(e.to_string()),
            Some(Ok(WireMessage::Close(reason))) => {
                return PumpExit::ConnectionLost(
                    reason.unwrap_or_else(|| "close frame from provider".into()),
                )
            }
            Some(Ok(message)) => message,
        };

        for event in codec::decode(&message) {
            dispatch(shared, event);
        }
    }
}

fn dispatch(shared: &Arc<Shared>, event: ServerEvent) {
    match event {
        ServerEvent::SetupComplete => {
            info!("Setup acknowledged by provider");
            shared.complete_setup();
            shared.set_state(SessionState::Streaming);
        }
        ServerEvent::TranscriptDelta(text) => {
            shared.assembler.append_delta(&text);
            shared.emit(SessionEvent::InputTranscriptChunk(text));
        }
        ServerEvent::ModelOutput(text) => {
            // The provider resends cumulative output; emit only what is new
            if let Some(delta) = shared.assembler.merge_display(&text) {
                shared.emit(SessionEvent::ModelOutput(delta));
            }
        }
        ServerEvent::TurnComplete => {
            let record = shared.assembler.complete_turn();
            debug!(
                "Turn {} complete ({} chars)",
                record.turn_index,
                record.text.len()
            );
            shared.emit(SessionEvent::TurnComplete(record));
        }
        ServerEvent::ProviderError(detail) => {
            warn!("Provider reported error: {}", detail);
            shared.record_error(&detail);
            shared.fail_setup(SessionError::Provider(detail));
        }
        ServerEvent::Unrecognized(raw) => {
            debug!("Unrecognized provider message: {}", raw);
        }
        ServerEvent::DecodeFailure(detail) => {
            warn!("Undecodable provider message: {}", detail);
        }
    }
}

/// Re-establish the connection with bounded exponential backoff.
///
/// Returns the new read half on success. On exhaustion, or on a non-transient
/// failure, the session is closed and `None` returned.
async fn reconnect(shared: &Arc<Shared>) -> Option<Box<dyn MessageStream>> {
    shared.set_state(SessionState::Reconnecting);
    shared.sink.lock().await.take();

    let mut delay = RECONNECT_INITIAL_DELAY;

    for attempt in 1..=MAX_RECONNECT_ATTEMPTS {
        // A mid-turn partial cannot be resumed across a new connection
        shared.assembler.clear_turn();

        tokio::select! {
            _ = shared.cancel.cancelled() => return None,
            _ = tokio::time::sleep(delay) => {}
        }
        delay = (delay * 2).min(RECONNECT_MAX_DELAY);

        info!("Reconnect attempt {}/{}", attempt, MAX_RECONNECT_ATTEMPTS);

        match try_reconnect_once(shared).await {
            Ok(stream) => {
                shared.reconnects.fetch_add(1, Ordering::Relaxed);
                shared.set_state(SessionState::Streaming);
                info!("Reconnected after {} attempt(s)", attempt);
                return Some(stream);
            }
            Err(e) if e.is_transient() => {
                warn!(
                    "Reconnect attempt {}/{} failed: {}",
                    attempt, MAX_RECONNECT_ATTEMPTS, e
                );
                shared.record_error(&e.to_string());
            }
            Err(e) => {
                error!("Reconnect aborted: {}", e);
                shared.record_error(&e.to_string());
                shared.close_with(Some(e.to_string()));
                return None;
            }
        }
    }

    error!(
        "Giving up after {} reconnect attempts",
        MAX_RECONNECT_ATTEMPTS
    );
    let reason = shared
        .last_error()
        .unwrap_or_else(|| "reconnect attempts exhausted".into());
    shared.close_with(Some(reason));
    None
}

/// One reconnect attempt: connect, send setup, await the acknowledgement.
async fn try_reconnect_once(
    shared: &Arc<Shared>,
) -> Result<Box<dyn MessageStream>, SessionError> {
    let (mut sink, mut stream) = shared.connector.connect().await?;

    let setup = codec::encode_setup(&shared.config.model, &shared.config.system_instruction);
    sink.send(setup).await?;

    let acknowledged = tokio::time::timeout(RECONNECT_SETUP_TIMEOUT, async {
        loop {
            let message = match stream.next_message().await {
                None => {
                    return Err(SessionError::Transport(
                        "connection closed during setup".into(),
                    ))
                }
                Some(Err(e)) => return Err(e),
                Some(Ok(WireMessage::Close(reason))) => {
                    return Err(SessionError::Transport(
                        reason.unwrap_or_else(|| "close frame during setup".into()),
                    ))
                }
                Some(Ok(message)) => message,
            };

            for event in codec::decode(&message) {
                match event {
                    ServerEvent::SetupComplete => return Ok(()),
                    ServerEvent::ProviderError(detail) => {
                        return Err(SessionError::Provider(detail))
                    }
                    // Nothing else is meaningful before setup completes
                    _ => {}
                }
            }
        }
    })
    .await;

    match acknowledged {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return Err(e),
        Err(_) => return Err(SessionError::SetupTimeout(RECONNECT_SETUP_TIMEOUT)),
    }

    *shared.sink.lock().await = Some(sink);
    Ok(stream)
}
