//! `axum` media-stream WebSocket adapter
//!
//! Bridges the carrier's wire frames (`crate::frame`) and the
//! transport-agnostic actor (`crate::session`). Inbound frames are read and
//! dispatched to the actor strictly in arrival order; outbound synthesized
//! audio is paced onto the socket from a separate task so a long `Speak`
//! never blocks the read side from seeing a barge-in DTMF digit. Media-frame
//! ingestion must never block on playback pacing.

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use shiftcall_core::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::carrier_api::CarrierControlClient;
use crate::frame::{DtmfPayload, OutboundClearEvent, OutboundMediaEvent, StreamFrame};
use crate::media;
use crate::session::{InboundFrame, OutboundFrame, SessionRuntime};

pub struct StreamHandlerDeps {
    pub runtime: Arc<SessionRuntime>,
    pub carrier_control: Arc<dyn CarrierControlClient>,
}

/// Drives one media-stream WebSocket end to end. Returns once the socket
/// closes (either side) or the FSM reaches a terminal phase.
pub async fn run(socket: WebSocket, deps: StreamHandlerDeps) {
    let (mut ws_sink, mut ws_source) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<Message>(64);

    let writer = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            if ws_sink.send(msg).await.is_err() {
                break;
            }
        }
    });

    let mut session_id: Option<SessionId> = None;
    let mut stream_sid = String::new();
    let mut call_sid = String::new();
    let mut seq: u64 = 0;
    let playback: Arc<Mutex<Option<JoinHandle<()>>>> = Arc::new(Mutex::new(None));

    while let Some(msg) = ws_source.next().await {
        let msg = match msg {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "media-stream socket error, ending session");
                break;
            }
        };
        let Message::Text(text) = msg else { continue };
        let frame: StreamFrame = match serde_json::from_str(&text) {
            Ok(f) => f,
            Err(e) => {
                // Malformed frame: log and ignore, never kill the session.
                warn!(error = %e, "malformed media-stream frame, ignoring");
                continue;
            }
        };

        seq += 1;
        let (inbound, sid) = match frame {
            StreamFrame::Start { stream_sid: sid, start } => {
                call_sid = start.call_sid.clone();
                let caller_phone = start.custom_parameters.get("callerPhone").cloned();
                (InboundFrame::Start { caller_phone }, sid)
            }
            StreamFrame::Media { stream_sid: sid, media } => {
                let mulaw = media::decode_frame_b64(&media.payload).unwrap_or_default();
                (InboundFrame::Media { mulaw }, sid)
            }
            StreamFrame::Dtmf { stream_sid: sid, dtmf } => {
                let Some(digit) = parse_dtmf_digit(&dtmf) else { continue };
                (InboundFrame::Dtmf { digit }, sid)
            }
            StreamFrame::Stop { stream_sid: sid } => (InboundFrame::Stop, sid),
        };
        stream_sid = sid;
        if session_id.is_none() {
            session_id = Some(SessionId(stream_sid.clone()));
        }
        let Some(id) = session_id.clone() else { continue };

        let caller_hint = match &inbound {
            InboundFrame::Start { caller_phone } => caller_phone.clone().unwrap_or_default(),
            _ => String::new(),
        };

        let outbound = match deps.runtime.advance(&id, &id, &caller_hint, seq, inbound).await {
            Ok(o) => o,
            Err(e) => {
                warn!(session_id = %id, error = %e, "session advance failed");
                continue;
            }
        };

        let mut should_close = false;
        for frame_out in outbound {
            match frame_out {
                OutboundFrame::ClearPlayback => {
                    if let Some(handle) = playback.lock().await.take() {
                        handle.abort();
                    }
                    let clear = OutboundClearEvent::new(stream_sid.clone());
                    send_json(&out_tx, &clear).await;
                }
                OutboundFrame::SpeakMulaw(bytes) => {
                    let tx = out_tx.clone();
                    let sid_for_task = stream_sid.clone();
                    let handle = tokio::spawn(async move {
                        pace_mulaw_onto_socket(&tx, &sid_for_task, bytes).await;
                    });
                    *playback.lock().await = Some(handle);
                }
                OutboundFrame::CallUpdate(doc) => {
                    if let Err(e) = deps.carrier_control.update_call(&call_sid, &doc).await {
                        warn!(%call_sid, error = %e, "carrier call update failed");
                    }
                }
                OutboundFrame::Close => should_close = true,
            }
        }
        if should_close {
            break;
        }
    }

    if let Some(handle) = playback.lock().await.take() {
        handle.abort();
    }
    drop(out_tx);
    let _ = writer.await;
    info!(?session_id, "media-stream session ended");
}

fn parse_dtmf_digit(dtmf: &DtmfPayload) -> Option<char> {
    dtmf.digit.chars().next()
}

async fn send_json<T: serde::Serialize>(tx: &mpsc::Sender<Message>, value: &T) {
    if let Ok(json) = serde_json::to_string(value) {
        let _ = tx.send(Message::Text(json)).await;
    }
}

/// Rechunks raw mu-law bytes into 20ms frames and sends them at a 20ms
/// cadence. Cancelled by aborting the `JoinHandle` this runs under when a
/// newer `Speak` supersedes it.
async fn pace_mulaw_onto_socket(tx: &mpsc::Sender<Message>, stream_sid: &str, mulaw_bytes: Vec<u8>) {
    let frames = media::chunk_into_frames(&mulaw_bytes);
    let mut ticker = tokio::time::interval(Duration::from_millis(20));
    for frame in frames {
        ticker.tick().await;
        let payload = media::encode_frame_b64(&frame);
        let event = OutboundMediaEvent::new(stream_sid, payload);
        send_json(tx, &event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dtmf_digit_parses_single_char() {
        let digit = parse_dtmf_digit(&DtmfPayload { digit: "7".to_string() });
        assert_eq!(digit, Some('7'));
    }

    #[test]
    fn dtmf_digit_none_on_empty_payload() {
        let digit = parse_dtmf_digit(&DtmfPayload { digit: String::new() });
        assert_eq!(digit, None);
    }

    #[tokio::test]
    async fn pacing_emits_one_media_event_per_frame() {
        let (tx, mut rx) = mpsc::channel(16);
        let bytes = vec![0u8; media::SAMPLES_PER_FRAME * 2];
        pace_mulaw_onto_socket(&tx, "MZ1", bytes).await;
        drop(tx);
        let mut count = 0;
        while rx.recv().await.is_some() {
            count += 1;
        }
        assert_eq!(count, 2);
    }
}
