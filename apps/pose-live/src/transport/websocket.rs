//! WebSocket transport backed by tokio-tungstenite. Outbound text goes
//! through an unbounded channel into a pump task; inbound text and the close
//! notification flow back to the session through the shared event channel,
//! tagged with this transport's generation.

use super::{Connector, Generation, Transport, TransportError, TransportEvent, TransportPayload};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

pub struct WebSocketConnector {
    url: String,
}

impl WebSocketConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(
        &self,
        generation: Generation,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Box<dyn Transport>, TransportError> {
        let (ws_stream, _) = connect_async(self.url.as_str())
            .await
            .map_err(|err| TransportError::Connect(err.to_string()))?;
        tracing::debug!(url = %self.url, generation, "websocket connected");

        let (tx_out, rx_out) = mpsc::unbounded_channel::<String>();
        let task = tokio::spawn(handle_websocket(ws_stream, rx_out, generation, events));

        Ok(Box::new(WebSocketTransport {
            tx: tx_out,
            task: Some(task),
        }))
    }
}

pub struct WebSocketTransport {
    tx: mpsc::UnboundedSender<String>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl Transport for WebSocketTransport {
    fn send(&self, text: String) -> Result<(), TransportError> {
        self.tx.send(text).map_err(|_| TransportError::Closed)
    }

    fn close(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Handle WebSocket communication for one connection.
async fn handle_websocket(
    ws_stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    mut rx_out: mpsc::UnboundedReceiver<String>,
    generation: Generation,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    // Forward queued commands to the socket
    let send_task = tokio::spawn(async move {
        while let Some(text) = rx_out.recv().await {
            if ws_sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg) = ws_receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                if events
                    .send(TransportEvent {
                        generation,
                        payload: TransportPayload::Text(text),
                    })
                    .is_err()
                {
                    break;
                }
            }
            Ok(Message::Close(_)) => break,
            Err(err) => {
                let _ = events.send(TransportEvent {
                    generation,
                    payload: TransportPayload::Failed(err.to_string()),
                });
                break;
            }
            _ => {} // Ignore Binary, Ping, Pong
        }
    }

    let _ = events.send(TransportEvent {
        generation,
        payload: TransportPayload::Closed,
    });

    send_task.abort();
}
