//! Renders Directives into the carrier's control-plane XML-like response
//! documents.
//!
//! Two distinct moments need a document: (1) the session-start webhook
//! response, which must open the bidirectional media stream and set the
//! boolean record flag on the connect-stream verb in the same breath; (2) a
//! live-call update issued through the carrier's REST call-control API when
//! a mid-call Directive (transfer, hangup) needs to act on a leg that is
//! already connected to our media stream — a WebSocket frame alone can't
//! hand a PSTN leg off or tear it down, only the carrier's call-control
//! plane can.

use shiftcall_core::prelude::*;

/// Renders the initial session-start webhook response: opens the
/// bidirectional media stream at `stream_url` and sets the boolean record
/// flag, with `recording_status_callback` wired up to receive the carrier's
/// eventual recording-ready postback.
pub fn render_connect_stream(
    stream_url: &str,
    record_enabled: bool,
    recording_status_callback: &str,
) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Response>
  <Connect>
    <Stream url="{stream_url}" record="{record_enabled}">
      <Parameter name="recordingStatusCallback" value="{recording_status_callback}" />
    </Stream>
  </Connect>
</Response>"#
    )
}

/// Renders a live-call control-plane update for a mid-call Transfer or
/// Hangup directive. `Speak`/`RecordControl` never reach here — those are
/// realized over the open media-stream WebSocket instead (see
/// `crate::stream`).
pub fn render_call_update(directive: &Directive) -> Option<String> {
    match directive {
        Directive::Transfer { target_phone, timeout } => Some(format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <Response>\n  <Dial timeout=\"{}\">\n    <Number>{target_phone}</Number>\n  </Dial>\n</Response>",
            timeout.as_secs()
        )),
        Directive::Hangup => Some(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<Response>\n  <Hangup/>\n</Response>".to_string(),
        ),
        Directive::Speak { .. } | Directive::RecordControl { .. } => None,
    }
}

/// Renders the TwiML played on answer for an outbound voice-offer call:
/// plays the pre-synthesized offer and awaits a single DTMF accept/decline
/// digit. `gather_action_url` is the carrier's postback once exactly one
/// digit is collected (or the gather times out with none).
pub fn render_offer_gather(offer_text: &str, gather_action_url: &str, timeout_secs: u64) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <Response>\n  <Gather numDigits=\"1\" timeout=\"{timeout_secs}\" action=\"{gather_action_url}\">\n    <Say>{offer_text}</Say>\n  </Gather>\n  <Hangup/>\n</Response>"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn connect_stream_carries_boolean_record_flag() {
        let doc = render_connect_stream("wss://calls.example.com/media/stream", true, "https://calls.example.com/webhooks/voice/recording-status");
        assert!(doc.contains(r#"record="true""#));
        assert!(doc.contains("recordingStatusCallback"));
    }

    #[test]
    fn transfer_directive_renders_dial_with_timeout() {
        let doc = render_call_update(&Directive::Transfer {
            target_phone: "+611234567890".to_string(),
            timeout: Duration::from_secs(30),
        })
        .unwrap();
        assert!(doc.contains("<Number>+611234567890</Number>"));
        assert!(doc.contains(r#"timeout="30""#));
    }

    #[test]
    fn hangup_directive_renders_hangup_verb() {
        let doc = render_call_update(&Directive::Hangup).unwrap();
        assert!(doc.contains("<Hangup/>"));
    }

    #[test]
    fn speak_directive_has_no_call_update_rendering() {
        assert!(render_call_update(&Directive::speak("hi")).is_none());
    }
}
