use pose_proto::FramePayload;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Run flag, orthogonal to the connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    #[default]
    Idle,
    Running,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormStatus {
    Good,
    Bad,
}

/// Everything a consumer needs to render the live view. Derived from the
/// latest inbound messages, recomputed per message, never persisted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DisplayState {
    pub frame_jpeg: Option<Vec<u8>>,
    pub feedback: Option<String>,
    pub form_status: Option<FormStatus>,
    pub prediction: Option<String>,
    pub confidence: Option<f64>,
    pub rep_count: u32,
    pub good_form_frames: u64,
    pub frame_count: u64,
    pub error_counts: HashMap<String, u64>,
    pub recording: bool,
}

impl DisplayState {
    pub fn clear(&mut self) {
        *self = DisplayState::default();
    }

    /// Fold one frame message in. Counter fields missing from the message
    /// reset to their defaults, matching the web client's `|| 0` handling.
    pub(crate) fn apply_frame(&mut self, frame: &FramePayload, jpeg: Option<Vec<u8>>) {
        if let Some(bytes) = jpeg {
            self.frame_jpeg = Some(bytes);
        }
        self.prediction = frame.prediction.clone();
        self.confidence = frame.confidence;
        self.rep_count = frame.rep_count.unwrap_or(0);
        self.good_form_frames = frame.good_form_frames.unwrap_or(0);
        self.frame_count = frame.frame_count.unwrap_or(0);
        self.error_counts = frame.error_counts.clone().unwrap_or_default();
        self.recording = frame.recording.unwrap_or(false);

        if let Some(prediction) = frame.prediction.as_deref() {
            if prediction == "good" {
                self.feedback = Some("Good form! Keep it up.".to_string());
                self.form_status = Some(FormStatus::Good);
            } else {
                self.feedback = Some(format!("Form issue: {prediction}"));
                self.form_status = Some(FormStatus::Bad);
            }
        } else if let Some(counts) = &frame.error_counts {
            if counts.is_empty() {
                self.feedback = Some("Correct Form".to_string());
                self.form_status = Some(FormStatus::Good);
            } else {
                // Most frequent form error wins the overlay
                self.feedback = counts
                    .iter()
                    .max_by_key(|(_, count)| **count)
                    .map(|(name, _)| name.clone());
                self.form_status = Some(FormStatus::Bad);
            }
        }
    }
}

/// Snapshot published to consumers after every state change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSnapshot {
    pub connection: ConnectionState,
    pub run: RunState,
    pub reconnect_attempts: u32,
    pub last_error: Option<String>,
    pub display: DisplayState,
}
