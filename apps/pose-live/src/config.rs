use pose_proto::Preferences;
use std::env;
#[cfg(test)]
use std::sync::Mutex;

/// Client configuration. The web client read the audiobot/language settings
/// ambiently from localStorage; here they are loaded once and passed into the
/// session explicitly.
#[derive(Debug, Clone)]
pub struct Config {
    /// The pose server address (defaults to "127.0.0.1:8765")
    pub server: String,
    pub preferences: Preferences,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let server =
            env::var("POSE_LIVE_SERVER").unwrap_or_else(|_| "127.0.0.1:8765".to_string());
        // Normalize localhost to IPv4 to avoid IPv6 (::1) preference on macOS
        let server = if server.starts_with("localhost:") {
            server.replacen("localhost", "127.0.0.1", 1)
        } else {
            server
        };

        let audiobot = env::var("POSE_LIVE_AUDIOBOT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_default();
        let language = env::var("POSE_LIVE_LANGUAGE")
            .ok()
            .and_then(|v| v.parse().ok());

        Self {
            server,
            preferences: Preferences { audiobot, language },
        }
    }

    /// Full WebSocket URL for the pose server.
    pub fn server_url(&self) -> String {
        build_ws_url(&self.server)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: "127.0.0.1:8765".to_string(),
            preferences: Preferences::default(),
        }
    }
}

/// Promote a bare `host:port` to a WebSocket URL: ws:// for local servers,
/// wss:// for everything else. Explicit ws:// or wss:// values pass through
/// untouched.
pub fn build_ws_url(server: &str) -> String {
    if server.starts_with("ws://") || server.starts_with("wss://") {
        server.to_string()
    } else if server.contains("localhost") || server.contains("127.0.0.1") {
        format!("ws://{server}/ws")
    } else {
        format!("wss://{server}/ws")
    }
}
