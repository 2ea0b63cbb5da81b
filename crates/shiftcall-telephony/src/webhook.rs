//! HTTP webhook handlers the carrier calls into
//!
//! Two endpoints: the session-start webhook (carrier hits this first, over
//! plain HTTP, before ever opening the media-stream WebSocket) and the
//! recording-status webhook (carrier hits this once after the call ends,
//! once the recording asset has finished processing on its side).

use async_trait::async_trait;
use axum::extract::{Form, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use shiftcall_core::prelude::*;
use std::sync::Arc;
use tracing::{info, warn};

use shiftcall_cascade::OfferOutcome;

use crate::app::AppState;
use crate::carrier_doc;

/// Carrier's session-start webhook payload. Field names follow the
/// carrier's own wire convention, not ours.
#[derive(Debug, Deserialize)]
pub struct SessionStartWebhook {
    #[serde(rename = "CallSid")]
    pub call_sid: String,
    #[serde(rename = "From")]
    pub from: Option<String>,
}

pub async fn session_start(State(state): State<AppState>, Form(body): Form<SessionStartWebhook>) -> Response {
    info!(call_sid = %body.call_sid, "session-start webhook");
    let stream_url = format!("wss://{}/media/stream", state.config.general.public_base_domain);
    let recording_status_callback =
        format!("https://{}/webhooks/voice/recording-status", state.config.general.public_base_domain);
    let doc = carrier_doc::render_connect_stream(
        &stream_url,
        state.config.general.recording_enabled,
        &recording_status_callback,
    );
    ([("Content-Type", "text/xml")], doc).into_response()
}

/// Carrier's recording-status webhook payload
#[derive(Debug, Deserialize)]
pub struct RecordingStatusWebhook {
    #[serde(rename = "CallSid")]
    pub call_sid: String,
    #[serde(rename = "RecordingSid")]
    pub recording_sid: String,
    #[serde(rename = "RecordingUrl")]
    pub recording_url: String,
    #[serde(rename = "RecordingStatus")]
    pub recording_status: String,
}

pub async fn recording_status(
    State(state): State<AppState>,
    Form(body): Form<RecordingStatusWebhook>,
) -> StatusCode {
    if body.recording_status != "completed" {
        info!(call_sid = %body.call_sid, status = %body.recording_status, "recording not yet complete, ignoring");
        return StatusCode::NO_CONTENT;
    }
    let Some(sink) = &state.recording_sink else {
        warn!(call_sid = %body.call_sid, "recording-status webhook fired but no recording pipeline is wired up");
        return StatusCode::NO_CONTENT;
    };
    let event = RecordingStatusEvent {
        call_sid: body.call_sid.clone(),
        recording_sid: body.recording_sid,
        telephony_url: body.recording_url,
    };
    if let Err(e) = sink.on_recording_completed(event).await {
        warn!(call_sid = %body.call_sid, error = %e, "recording pipeline handoff failed");
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    StatusCode::NO_CONTENT
}

/// A finalized carrier-hosted recording, handed off to whatever implements
/// the object-store transfer. Kept as a narrow trait here so
/// `shiftcall-telephony` never needs to depend on `shiftcall-recording`
/// directly — the binary's composition root wires the concrete pipeline in.
#[derive(Debug, Clone)]
pub struct RecordingStatusEvent {
    pub call_sid: String,
    pub recording_sid: String,
    pub telephony_url: String,
}

#[async_trait]
pub trait RecordingStatusSink: Send + Sync {
    async fn on_recording_completed(&self, event: RecordingStatusEvent) -> Result<()>;
}

pub type SharedRecordingSink = Arc<dyn RecordingStatusSink>;

/// Carrier's gather-result postback for an outbound voice-offer call.
/// Digit `1` accepts, `2` declines; a timed-out gather (no `Digits` field
/// at all) resolves `NoAnswer`.
#[derive(Debug, Deserialize)]
pub struct OfferGatherWebhook {
    #[serde(rename = "CallSid")]
    pub call_sid: String,
    #[serde(rename = "Digits")]
    pub digits: Option<String>,
}

pub async fn offer_gather(State(state): State<AppState>, Form(body): Form<OfferGatherWebhook>) -> Response {
    let outcome = match body.digits.as_deref() {
        Some("1") => OfferOutcome::Accepted,
        Some("2") => OfferOutcome::Declined,
        _ => OfferOutcome::NoAnswer,
    };
    info!(call_sid = %body.call_sid, ?outcome, "offer-gather webhook");
    state.offer_registry.resolve(&body.call_sid, outcome);
    ([("Content-Type", "text/xml")], "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<Response>\n  <Hangup/>\n</Response>")
        .into_response()
}

/// Carrier's terminal call-status postback for an outbound voice-offer
/// call — fires for busy/failed/no-answer legs that never reach the
/// gather at all, which would otherwise leave the offer pending until its
/// own timeout elapses.
#[derive(Debug, Deserialize)]
pub struct OfferStatusWebhook {
    #[serde(rename = "CallSid")]
    pub call_sid: String,
    #[serde(rename = "CallStatus")]
    pub call_status: String,
}

pub async fn offer_status(State(state): State<AppState>, Form(body): Form<OfferStatusWebhook>) -> StatusCode {
    if matches!(body.call_status.as_str(), "busy" | "failed" | "no-answer" | "canceled") {
        info!(call_sid = %body.call_sid, status = %body.call_status, "offer call ended without a gather result");
        state.offer_registry.resolve(&body.call_sid, OfferOutcome::NoAnswer);
    }
    StatusCode::NO_CONTENT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_start_webhook_parses_form_fields() {
        let raw = "CallSid=CA123&From=%2B61412345678";
        let parsed: SessionStartWebhook = serde_urlencoded::from_str(raw).unwrap();
        assert_eq!(parsed.call_sid, "CA123");
        assert_eq!(parsed.from.as_deref(), Some("+61412345678"));
    }

    #[test]
    fn recording_status_webhook_parses_form_fields() {
        let raw = "CallSid=CA123&RecordingSid=RE1&RecordingUrl=https%3A%2F%2Fcarrier.example%2Frec%2FRE1&RecordingStatus=completed";
        let parsed: RecordingStatusWebhook = serde_urlencoded::from_str(raw).unwrap();
        assert_eq!(parsed.recording_status, "completed");
        assert_eq!(parsed.recording_sid, "RE1");
    }

    #[test]
    fn offer_gather_webhook_parses_digits() {
        let raw = "CallSid=CA1&Digits=1";
        let parsed: OfferGatherWebhook = serde_urlencoded::from_str(raw).unwrap();
        assert_eq!(parsed.digits.as_deref(), Some("1"));
    }

    #[test]
    fn offer_gather_webhook_allows_missing_digits_on_timeout() {
        let raw = "CallSid=CA1";
        let parsed: OfferGatherWebhook = serde_urlencoded::from_str(raw).unwrap();
        assert_eq!(parsed.digits, None);
    }
}
