//! Normalized input events consumed by `advance`
//!
//! The telephony adapter is responsible for turning raw carrier frames into
//! these variants; `advance` never sees a carrier frame.

/// One normalized unit of input to the FSM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputEvent {
    /// The carrier's per-interaction sequence token. Two events with the
    /// same token (and non-`ServerAction` kind) are the same delivery
    /// retried — at-most-once processing.
    pub token: Option<String>,
    pub kind: InputKind,
}

impl InputEvent {
    pub fn server_action(kind: InputKind) -> Self {
        Self { token: None, kind }
    }

    pub fn with_token(token: impl Into<String>, kind: InputKind) -> Self {
        Self { token: Some(token.into()), kind }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputKind {
    /// Carrier has established the session; carries the caller's phone if
    /// it arrived as a start-event side-channel parameter.
    SessionStarted { caller_phone: Option<String> },
    /// A single DTMF digit.
    Dtmf(char),
    /// Recognized end of a free-form voice utterance (reason capture).
    VoiceUtteranceEnded { transcript: String },
    /// A gather (DTMF or voice) timed out without satisfying input.
    GatherTimedOut,
    /// Carrier reports the session has ended.
    SessionStopped,
}
