//! The live-session state machine. One spawned task owns all session state;
//! user actions arrive over a command channel, transport events over the
//! shared event channel, and every change is published to consumers through
//! a watch channel. Nothing outside the task mutates session state.

pub mod backoff;
pub mod router;
pub mod state;

use crate::transport::{Connector, Generation, Transport, TransportEvent, TransportPayload};
use pose_proto::{Command, Exercise, Preferences};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

pub use state::{ConnectionState, DisplayState, FormStatus, RunState, SessionSnapshot};

use router::RouterAction;

/// Stand-in deadline for the reconnect timer arm when no reconnect is
/// pending; the arm is disabled by its precondition and never fires.
const IDLE_TIMER: Duration = Duration::from_secs(3600);

#[derive(Debug)]
enum UserCommand {
    Connect,
    Start(Exercise),
    Stop,
    Disconnect,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session task is gone")]
    Closed,
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub preferences: Preferences,
    /// Optional label sent with the connect hello, e.g. "pose-live-cli".
    pub client_label: Option<String>,
}

impl SessionOptions {
    pub fn new(preferences: Preferences) -> Self {
        Self {
            preferences,
            client_label: None,
        }
    }
}

pub struct SessionClient;

impl SessionClient {
    /// Spawn the session task. Dropping the returned handle tears the
    /// session down.
    pub fn spawn(connector: Arc<dyn Connector>, options: SessionOptions) -> SessionHandle {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (watch_tx, watch_rx) = watch::channel(SessionSnapshot::default());
        let (audio_tx, audio_rx) = mpsc::unbounded_channel();

        let session = Session {
            connector,
            preferences: options.preferences,
            client_label: options.client_label,
            snapshot: SessionSnapshot::default(),
            watch_tx,
            audio_tx,
            events_tx: event_tx,
            transport: None,
            generation: 0,
            auto_reconnect: true,
            reconnect_at: None,
        };
        tokio::spawn(session_loop(session, command_rx, event_rx));

        SessionHandle {
            commands: command_tx,
            snapshot: watch_rx,
            audio: Some(audio_rx),
        }
    }
}

/// Consumer-facing handle. All operations return immediately after queueing
/// the action; results surface through the snapshot stream.
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<UserCommand>,
    snapshot: watch::Receiver<SessionSnapshot>,
    audio: Option<mpsc::UnboundedReceiver<Vec<u8>>>,
}

impl SessionHandle {
    pub fn connect(&self) -> Result<(), SessionError> {
        self.send(UserCommand::Connect)
    }

    pub fn start(&self, exercise: Exercise) -> Result<(), SessionError> {
        self.send(UserCommand::Start(exercise))
    }

    pub fn stop(&self) -> Result<(), SessionError> {
        self.send(UserCommand::Stop)
    }

    pub fn disconnect(&self) -> Result<(), SessionError> {
        self.send(UserCommand::Disconnect)
    }

    /// Current state. For change notifications use [`SessionHandle::subscribe`].
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }

    /// Take the stream of decoded audio feedback. Yields nothing unless the
    /// audiobot preference is on. Can only be taken once.
    pub fn take_audio(&mut self) -> Option<mpsc::UnboundedReceiver<Vec<u8>>> {
        self.audio.take()
    }

    fn send(&self, command: UserCommand) -> Result<(), SessionError> {
        self.commands
            .send(command)
            .map_err(|_| SessionError::Closed)
    }
}

struct Session {
    connector: Arc<dyn Connector>,
    preferences: Preferences,
    client_label: Option<String>,
    snapshot: SessionSnapshot,
    watch_tx: watch::Sender<SessionSnapshot>,
    audio_tx: mpsc::UnboundedSender<Vec<u8>>,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
    transport: Option<Box<dyn Transport>>,
    generation: Generation,
    auto_reconnect: bool,
    reconnect_at: Option<Instant>,
}

async fn session_loop(
    mut session: Session,
    mut commands: mpsc::UnboundedReceiver<UserCommand>,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
) {
    loop {
        let deadline = session
            .reconnect_at
            .unwrap_or_else(|| Instant::now() + IDLE_TIMER);

        tokio::select! {
            command = commands.recv() => {
                match command {
                    Some(command) => session.handle_command(command).await,
                    None => {
                        // Handle dropped; tear everything down.
                        session.teardown();
                        session.publish();
                        break;
                    }
                }
            }
            Some(event) = events.recv() => session.handle_event(event),
            _ = tokio::time::sleep_until(deadline), if session.reconnect_at.is_some() => {
                session.reconnect_due().await;
            }
        }

        session.publish();
    }
}

impl Session {
    async fn handle_command(&mut self, command: UserCommand) {
        match command {
            UserCommand::Connect => {
                if self.snapshot.connection != ConnectionState::Disconnected {
                    return;
                }
                // Manual (re)connect: re-arm auto-reconnect and reset the
                // attempt budget.
                self.auto_reconnect = true;
                self.reconnect_at = None;
                self.snapshot.reconnect_attempts = 0;
                self.open_transport().await;
            }
            UserCommand::Start(exercise) => {
                if self.snapshot.connection != ConnectionState::Connected {
                    self.snapshot.last_error =
                        Some("Not connected to server. Please connect first.".to_string());
                    return;
                }
                self.snapshot.last_error = None;
                self.send_command(Command::start(exercise, &self.preferences));
            }
            UserCommand::Stop => {
                if self.snapshot.connection == ConnectionState::Connected {
                    self.send_command(Command::Stop);
                }
                // Local reset happens regardless of whether the stop made it out.
                self.snapshot.run = RunState::Idle;
                self.snapshot.display.clear();
            }
            UserCommand::Disconnect => {
                if self.snapshot.connection == ConnectionState::Connected {
                    self.send_command(Command::Disconnect);
                }
                self.teardown();
            }
        }
    }

    fn handle_event(&mut self, event: TransportEvent) {
        if event.generation != self.generation {
            tracing::debug!(
                generation = event.generation,
                current = self.generation,
                "ignoring event from superseded transport"
            );
            return;
        }

        match event.payload {
            TransportPayload::Text(text) => {
                match router::route_text(&mut self.snapshot, self.preferences.audiobot, &text) {
                    RouterAction::Audio(bytes) => {
                        let _ = self.audio_tx.send(bytes);
                    }
                    RouterAction::None => {}
                }
            }
            TransportPayload::Failed(reason) => {
                // Surface the error; the close event that follows drives the
                // actual state transition.
                tracing::warn!(%reason, "transport error");
                self.snapshot.last_error = Some(format!("Connection error: {reason}"));
            }
            TransportPayload::Closed => {
                tracing::info!("transport closed unexpectedly");
                if let Some(mut transport) = self.transport.take() {
                    transport.close();
                }
                self.connection_lost();
            }
        }
    }

    async fn open_transport(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }
        self.generation += 1;
        self.snapshot.connection = ConnectionState::Connecting;
        self.snapshot.last_error = None;
        self.publish();

        match self
            .connector
            .connect(self.generation, self.events_tx.clone())
            .await
        {
            Ok(transport) => {
                self.transport = Some(transport);
                self.snapshot.connection = ConnectionState::Connected;
                self.snapshot.reconnect_attempts = 0;
                self.send_command(Command::Connect {
                    client: self.client_label.clone(),
                });
            }
            Err(err) => {
                tracing::warn!(%err, "connect failed");
                self.connection_lost();
            }
        }
    }

    /// Shared aftermath of a failed connect and an unexpected close.
    fn connection_lost(&mut self) {
        self.snapshot.connection = ConnectionState::Disconnected;
        self.snapshot.run = RunState::Idle;

        if !self.auto_reconnect {
            self.snapshot.last_error = Some("Connection closed.".to_string());
            return;
        }

        match backoff::reconnect_delay(self.snapshot.reconnect_attempts) {
            Some(delay) => {
                tracing::info!(
                    attempts = self.snapshot.reconnect_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "scheduling reconnect"
                );
                self.reconnect_at = Some(Instant::now() + delay);
            }
            None => {
                self.snapshot.last_error =
                    Some("Failed to connect. Please try manually reconnecting.".to_string());
            }
        }
    }

    async fn reconnect_due(&mut self) {
        self.reconnect_at = None;
        self.snapshot.reconnect_attempts += 1;
        tracing::info!(attempt = self.snapshot.reconnect_attempts, "reconnecting");
        self.open_transport().await;
    }

    /// Explicit disconnect (or handle drop): close the transport, cancel any
    /// pending reconnect, and forget the live view. The generation bump makes
    /// anything still in flight from the old transport a no-op.
    fn teardown(&mut self) {
        self.auto_reconnect = false;
        self.reconnect_at = None;
        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }
        self.generation += 1;
        self.snapshot.connection = ConnectionState::Disconnected;
        self.snapshot.run = RunState::Idle;
        self.snapshot.last_error = None;
        self.snapshot.display.clear();
    }

    fn send_command(&self, command: Command) {
        let Some(transport) = &self.transport else {
            return;
        };
        match serde_json::to_string(&command) {
            Ok(json) => {
                if let Err(err) = transport.send(json) {
                    tracing::warn!(%err, "failed to queue command");
                }
            }
            Err(err) => tracing::error!(%err, "failed to serialize command"),
        }
    }

    fn publish(&self) {
        self.watch_tx.send_replace(self.snapshot.clone());
    }
}
