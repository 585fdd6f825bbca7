//! Scripted in-process transport for tests. The connector records every
//! connect attempt and hands out a [`MockLink`] per connection through which
//! a test can play the server side: inject text frames, drop the connection,
//! and inspect what the session sent.

use super::{Connector, Generation, Transport, TransportError, TransportEvent, TransportPayload};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

#[derive(Clone, Default)]
pub struct MockConnector {
    inner: Arc<MockState>,
}

#[derive(Default)]
struct MockState {
    attempts: AtomicU32,
    fail_connects: AtomicU32,
    links: Mutex<Vec<MockLink>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` connect calls fail.
    pub fn fail_next_connects(&self, n: u32) {
        self.inner.fail_connects.store(n, Ordering::SeqCst);
    }

    /// Total connect calls observed, successful or not.
    pub fn attempts(&self) -> u32 {
        self.inner.attempts.load(Ordering::SeqCst)
    }

    /// The link for the most recent successful connection.
    pub fn latest_link(&self) -> Option<MockLink> {
        self.inner.links.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(
        &self,
        generation: Generation,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Box<dyn Transport>, TransportError> {
        self.inner.attempts.fetch_add(1, Ordering::SeqCst);

        let remaining = self.inner.fail_connects.load(Ordering::SeqCst);
        if remaining > 0 {
            self.inner
                .fail_connects
                .store(remaining - 1, Ordering::SeqCst);
            return Err(TransportError::Connect("mock refused connection".into()));
        }

        let link = MockLink {
            generation,
            events,
            sent: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(AtomicBool::new(false)),
        };
        self.inner.links.lock().unwrap().push(link.clone());
        Ok(Box::new(MockTransport { link }))
    }
}

/// Server side of one mock connection.
#[derive(Clone)]
pub struct MockLink {
    pub generation: Generation,
    events: mpsc::UnboundedSender<TransportEvent>,
    sent: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

impl MockLink {
    /// Deliver a text frame to the session, as the server would.
    pub fn server_text(&self, text: &str) {
        let _ = self.events.send(TransportEvent {
            generation: self.generation,
            payload: TransportPayload::Text(text.to_string()),
        });
    }

    /// Report a mid-stream transport error.
    pub fn server_error(&self, reason: &str) {
        let _ = self.events.send(TransportEvent {
            generation: self.generation,
            payload: TransportPayload::Failed(reason.to_string()),
        });
    }

    /// Drop the connection from the server side.
    pub fn server_close(&self) {
        let _ = self.events.send(TransportEvent {
            generation: self.generation,
            payload: TransportPayload::Closed,
        });
    }

    /// Everything the session queued on this connection so far.
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    /// Whether the session closed this transport.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

struct MockTransport {
    link: MockLink,
}

impl Transport for MockTransport {
    fn send(&self, text: String) -> Result<(), TransportError> {
        if self.link.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.link.sent.lock().unwrap().push(text);
        Ok(())
    }

    fn close(&mut self) {
        self.link.closed.store(true, Ordering::SeqCst);
    }
}
