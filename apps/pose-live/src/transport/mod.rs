use async_trait::async_trait;
use tokio::sync::mpsc;

pub mod mock;
pub mod websocket;

/// Identity tag for a transport instance. The session bumps the generation
/// every time it opens or tears down a transport, so late events from a
/// superseded connection can be recognized and ignored.
pub type Generation = u64;

/// Events a transport pushes into the session loop.
#[derive(Debug)]
pub struct TransportEvent {
    pub generation: Generation,
    pub payload: TransportPayload,
}

#[derive(Debug)]
pub enum TransportPayload {
    /// A text frame from the server.
    Text(String),
    /// The transport hit an error mid-stream. A `Closed` event follows.
    Failed(String),
    /// The connection closed (server side or network).
    Closed,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("transport is closed")]
    Closed,
}

/// One live connection to the pose server.
pub trait Transport: Send + Sync {
    /// Queue a text frame for the server. Fails once the transport is closed.
    fn send(&self, text: String) -> Result<(), TransportError>;

    /// Tear the connection down. Events already in flight from this transport
    /// are filtered out by the session via their generation tag.
    fn close(&mut self);
}

/// Factory seam between the session loop and the network, so tests can
/// substitute a scripted transport.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        generation: Generation,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Box<dyn Transport>, TransportError>;
}
