//! Carrier-facing instructions emitted by the FSM
//!
//! Lives in `shiftcall-core` (not `shiftcall-fsm`) for the same reason
//! `Phase` does: the telephony adapter translates directives into carrier
//! documents, and `CallSession` itself stores the last-emitted set for
//! at-most-once replay, so both need the type without depending on the FSM
//! crate.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What to gather after speaking a prompt, if anything.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Gather {
    /// Wait for DTMF digits terminated by `#` or a fixed max length.
    Dtmf { max_digits: u32, terminator: Option<char>, timeout: Duration },
    /// Wait for a voice utterance to end (free-form reason capture).
    VoiceUtterance { timeout: Duration },
    /// No input expected; the directive is purely informational.
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Directive {
    /// Speak a prompt, optionally followed by a gather.
    Speak { text: String, gather: Gather },
    /// Begin or stop call recording ( session-start directive).
    RecordControl { enabled: bool },
    /// Hand the call leg off to a PSTN number.
    Transfer { target_phone: String, timeout: Duration },
    /// End the call.
    Hangup,
}

impl Directive {
    pub fn speak(text: impl Into<String>) -> Self {
        Directive::Speak { text: text.into(), gather: Gather::None }
    }

    pub fn speak_and_gather_dtmf(
        text: impl Into<String>,
        max_digits: u32,
        terminator: Option<char>,
        timeout: Duration,
    ) -> Self {
        Directive::Speak {
            text: text.into(),
            gather: Gather::Dtmf { max_digits, terminator, timeout },
        }
    }

    pub fn speak_and_gather_voice(text: impl Into<String>, timeout: Duration) -> Self {
        Directive::Speak { text: text.into(), gather: Gather::VoiceUtterance { timeout } }
    }
}
