//! Carrier media-stream wire schema, `{ event, streamSid, media?,
//! dtmf?, start?, stop? }` over the WebSocket.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum StreamFrame {
    #[serde(rename = "start")]
    Start {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        start: StreamStart,
    },
    #[serde(rename = "media")]
    Media {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        media: MediaPayload,
    },
    #[serde(rename = "dtmf")]
    Dtmf {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        dtmf: DtmfPayload,
    },
    #[serde(rename = "stop")]
    Stop {
        #[serde(rename = "streamSid")]
        stream_sid: String,
    },
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StreamStart {
    #[serde(rename = "callSid")]
    pub call_sid: String,
    #[serde(default, rename = "customParameters")]
    pub custom_parameters: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MediaPayload {
    pub payload: String,
    #[serde(default)]
    pub track: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DtmfPayload {
    pub digit: String,
}

/// Outbound "media" event carrying one base64 mu-law frame back to the carrier.
#[derive(Debug, Clone, Serialize)]
pub struct OutboundMediaEvent {
    pub event: &'static str,
    #[serde(rename = "streamSid")]
    pub stream_sid: String,
    pub media: OutboundMediaPayload,
}

#[derive(Debug, Clone, Serialize)]
pub struct OutboundMediaPayload {
    pub payload: String,
}

impl OutboundMediaEvent {
    pub fn new(stream_sid: impl Into<String>, payload_b64: String) -> Self {
        Self { event: "media", stream_sid: stream_sid.into(), media: OutboundMediaPayload { payload: payload_b64 } }
    }
}

/// Outbound "mark" event: a boundary marker so the adapter knows when a
/// synthesized stream has finished playing out. Starting a new speak
/// cancels the current stream, and the mark is how we detect the old one
/// actually stopped.
#[derive(Debug, Clone, Serialize)]
pub struct OutboundMarkEvent {
    pub event: &'static str,
    #[serde(rename = "streamSid")]
    pub stream_sid: String,
    pub mark: MarkName,
}

#[derive(Debug, Clone, Serialize)]
pub struct MarkName {
    pub name: String,
}

impl OutboundMarkEvent {
    pub fn new(stream_sid: impl Into<String>, name: impl Into<String>) -> Self {
        Self { event: "mark", stream_sid: stream_sid.into(), mark: MarkName { name: name.into() } }
    }
}

/// Outbound "clear" event: stop whatever is currently playing. Only one
/// active synthesized-audio stream is allowed per session at a time.
#[derive(Debug, Clone, Serialize)]
pub struct OutboundClearEvent {
    pub event: &'static str,
    #[serde(rename = "streamSid")]
    pub stream_sid: String,
}

impl OutboundClearEvent {
    pub fn new(stream_sid: impl Into<String>) -> Self {
        Self { event: "clear", stream_sid: stream_sid.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_frame_round_trips_custom_parameters() {
        let raw = r#"{"event":"start","streamSid":"MZ1","start":{"callSid":"CA1","customParameters":{"callerPhone":"+61412345678"}}}"#;
        let frame: StreamFrame = serde_json::from_str(raw).unwrap();
        match frame {
            StreamFrame::Start { stream_sid, start } => {
                assert_eq!(stream_sid, "MZ1");
                assert_eq!(start.custom_parameters.get("callerPhone").unwrap(), "+61412345678");
            }
            _ => panic!("expected Start"),
        }
    }

    #[test]
    fn dtmf_frame_parses() {
        let raw = r#"{"event":"dtmf","streamSid":"MZ1","dtmf":{"digit":"5"}}"#;
        let frame: StreamFrame = serde_json::from_str(raw).unwrap();
        match frame {
            StreamFrame::Dtmf { dtmf, .. } => assert_eq!(dtmf.digit, "5"),
            _ => panic!("expected Dtmf"),
        }
    }

    #[test]
    fn outbound_media_event_serializes_with_camel_case_stream_sid() {
        let event = OutboundMediaEvent::new("MZ1", "base64==".to_string());
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"streamSid\":\"MZ1\""));
        assert!(json.contains("\"event\":\"media\""));
    }
}
