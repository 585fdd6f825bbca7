//! Client for live exercise sessions against the pose-estimation server.
//!
//! One [`session::SessionClient`] replaces the four copy-pasted per-page
//! WebSocket handlers of the original web client: it owns the connection
//! lifecycle (disconnected → connecting → connected), the orthogonal run flag
//! (idle ⇄ running), bounded reconnection with backoff, and the routing of
//! inbound frame/status/error/audio messages into a published snapshot that
//! consumers subscribe to.

pub mod config;
pub mod session;
pub mod transport;

pub use config::Config;
pub use session::{SessionClient, SessionHandle, SessionOptions};
