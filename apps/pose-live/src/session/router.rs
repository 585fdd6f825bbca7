//! Classifies raw text frames and folds them into the session snapshot.
//! Malformed or unrecognized input is logged and dropped; nothing here ever
//! propagates an error up to the session loop.

use super::state::{RunState, SessionSnapshot};
use pose_proto::{decode_audio, AudioBot, Inbound, Status};

/// Side effect the session loop must carry out after a message is applied.
#[derive(Debug, PartialEq)]
pub enum RouterAction {
    None,
    /// Decoded audio feedback to hand to the consumer.
    Audio(Vec<u8>),
}

/// Apply one raw text frame from the transport.
pub fn route_text(
    snapshot: &mut SessionSnapshot,
    audiobot: AudioBot,
    text: &str,
) -> RouterAction {
    let message = match Inbound::classify(text) {
        Ok(message) => message,
        Err(err) => {
            tracing::warn!(%err, "dropping unroutable message");
            return RouterAction::None;
        }
    };
    apply(snapshot, audiobot, message)
}

pub fn apply(snapshot: &mut SessionSnapshot, audiobot: AudioBot, message: Inbound) -> RouterAction {
    match message {
        Inbound::Frame(frame) => {
            let jpeg = match frame.decode_image() {
                Ok(jpeg) => jpeg,
                Err(err) => {
                    tracing::warn!(%err, "dropping frame with invalid image payload");
                    return RouterAction::None;
                }
            };
            snapshot.display.apply_frame(&frame, jpeg);
            RouterAction::None
        }
        Inbound::Status(status) => {
            tracing::debug!(?status, "status update");
            if status == Status::Connected {
                snapshot.last_error = None;
            } else if status.is_running() {
                snapshot.run = RunState::Running;
            } else if status.is_stopped() {
                snapshot.run = RunState::Idle;
                snapshot.display.clear();
            }
            RouterAction::None
        }
        Inbound::Error { message } => {
            tracing::warn!(error = %message, "server reported an error");
            snapshot.last_error = Some(message);
            snapshot.run = RunState::Idle;
            snapshot.display.clear();
            RouterAction::None
        }
        Inbound::Audio { audio_b64 } => {
            if !audiobot.is_on() {
                return RouterAction::None;
            }
            match decode_audio(&audio_b64) {
                Ok(bytes) => RouterAction::Audio(bytes),
                Err(err) => {
                    tracing::warn!(%err, "dropping undecodable audio payload");
                    RouterAction::None
                }
            }
        }
    }
}
