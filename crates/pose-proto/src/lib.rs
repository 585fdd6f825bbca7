//! Wire protocol for the pose-estimation live-session WebSocket server.
//!
//! Commands travel client→server as JSON text frames tagged by an `action`
//! field. Inbound messages are not a clean tagged union on the wire: frames
//! and audio carry `type`, status and error messages are bare keys, and two
//! server generations disagree on where the image payload lives (`data` vs
//! `frame`). [`Inbound::classify`] encodes the exact precedence the clients
//! rely on.

pub mod exercise;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

pub use exercise::{AudioBot, Exercise, Language, Preferences};

/// Commands sent to the pose server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Command {
    Connect {
        #[serde(skip_serializing_if = "Option::is_none")]
        client: Option<String>,
    },
    Start {
        exercise: Exercise,
        #[serde(skip_serializing_if = "Option::is_none")]
        audiobot: Option<AudioBot>,
        #[serde(skip_serializing_if = "Option::is_none")]
        language: Option<Language>,
    },
    Stop,
    Disconnect,
}

impl Command {
    /// The `start` command for an exercise, carrying audiobot/language only
    /// when the preferences ask for them.
    pub fn start(exercise: Exercise, prefs: &Preferences) -> Self {
        Command::Start {
            exercise,
            audiobot: prefs.audiobot.is_on().then_some(prefs.audiobot),
            language: prefs.language,
        }
    }
}

/// Run-state notifications from the server.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Connected,
    Started,
    AlreadyRunning,
    Stopped,
    NotRunning,
}

impl Status {
    /// Statuses that mean an exercise run is (now) in progress.
    pub fn is_running(&self) -> bool {
        matches!(self, Status::Started | Status::AlreadyRunning)
    }

    /// Statuses that mean no exercise run is in progress.
    pub fn is_stopped(&self) -> bool {
        matches!(self, Status::Stopped | Status::NotRunning)
    }
}

/// One processed video frame plus whatever counters the server variant
/// attaches. Squats-style servers send `prediction`/`confidence`/`rep_count`;
/// lunges-style servers send `good_form_frames`/`frame_count`/`error_counts`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct FramePayload {
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub frame: Option<String>,
    #[serde(default)]
    pub prediction: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub rep_count: Option<u32>,
    #[serde(default)]
    pub good_form_frames: Option<u64>,
    #[serde(default)]
    pub frame_count: Option<u64>,
    #[serde(default)]
    pub error_counts: Option<HashMap<String, u64>>,
    #[serde(default)]
    pub recording: Option<bool>,
}

impl FramePayload {
    /// Base64 image payload, wherever the server put it. `data` wins when
    /// both keys are present.
    pub fn image_b64(&self) -> Option<&str> {
        self.data.as_deref().or(self.frame.as_deref())
    }

    /// Decode the JPEG bytes, if an image payload is present.
    pub fn decode_image(&self) -> Result<Option<Vec<u8>>, DecodeError> {
        match self.image_b64() {
            Some(b64) => Ok(Some(BASE64.decode(b64)?)),
            None => Ok(None),
        }
    }
}

/// Inbound messages after classification.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Frame(FramePayload),
    Status(Status),
    Error { message: String },
    Audio { audio_b64: String },
}

#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unrecognized message shape: {0}")]
    Shape(String),
}

#[derive(Debug, thiserror::Error)]
#[error("invalid base64 payload: {0}")]
pub struct DecodeError(#[from] base64::DecodeError);

impl Inbound {
    /// Classify a raw text frame. Precedence follows the original clients:
    /// `type=="frame"`, then a `status` key, then an `error` key, then
    /// `type=="audio"`. Anything else is rejected for the caller to log and
    /// drop.
    pub fn classify(text: &str) -> Result<Self, ClassifyError> {
        let value: Value = serde_json::from_str(text)?;

        if value.get("type").and_then(Value::as_str) == Some("frame") {
            let payload: FramePayload = serde_json::from_value(value)?;
            return Ok(Inbound::Frame(payload));
        }

        if let Some(status) = value.get("status") {
            let status: Status = serde_json::from_value(status.clone())
                .map_err(|_| ClassifyError::Shape(format!("unknown status {status}")))?;
            return Ok(Inbound::Status(status));
        }

        if let Some(message) = value.get("error").and_then(Value::as_str) {
            return Ok(Inbound::Error {
                message: message.to_string(),
            });
        }

        if value.get("type").and_then(Value::as_str) == Some("audio") {
            let audio = value
                .get("audio_data")
                .and_then(Value::as_str)
                .ok_or_else(|| ClassifyError::Shape("audio message without audio_data".into()))?;
            return Ok(Inbound::Audio {
                audio_b64: audio.to_string(),
            });
        }

        Err(ClassifyError::Shape(
            value
                .as_object()
                .map(|obj| obj.keys().cloned().collect::<Vec<_>>().join(","))
                .unwrap_or_else(|| value.to_string()),
        ))
    }
}

/// Decode a base64 audio payload (mpeg bytes on current servers).
pub fn decode_audio(audio_b64: &str) -> Result<Vec<u8>, DecodeError> {
    Ok(BASE64.decode(audio_b64)?)
}
