//! Transport-agnostic per-session actor: drains inbound carrier events in
//! strict arrival order and applies the FSM's directives. Media-frame
//! handling, DTMF handling, and FSM advancement are all serialized within
//! one session.
//!
//! Kept free of `axum`'s WebSocket types on purpose so the whole thing is
//! unit-testable without standing up a real socket — `stream.rs` is the
//! thin adapter that feeds a live `axum::extract::ws::WebSocket` through
//! this runtime.

use chrono::Utc;
use shiftcall_core::prelude::*;
use shiftcall_fsm::{CascadeReleaseHandle, FsmCaps, FsmTuning, InputEvent, InputKind};
use std::sync::Arc;
use tracing::{info, warn};

use shiftcall_catalog::CatalogClient;
use shiftcall_store::{CallEvent, EventStream, SessionKv};

/// Provider key used to append lifecycle events for calls that end before a
/// provider is ever resolved (PIN/phone auth exhausted with no match). The
/// event stream is strictly per-provider ( §4.8), so a call that never
/// authenticates has no real provider to key its `call_started`/
/// `authentication_failed`/`call_ended` rows under; they go to this shared
/// bucket rather than being silently dropped.
const UNAUTHENTICATED_EVENT_PROVIDER: &str = "unauthenticated";

/// A normalized carrier event, already stripped of wire framing.
#[derive(Debug, Clone)]
pub enum InboundFrame {
    Start { caller_phone: Option<String> },
    Media { mulaw: Vec<u8> },
    Dtmf { digit: char },
    VoiceUtteranceEnded { transcript: String },
    GatherTimedOut,
    Stop,
}

/// What the runtime asks the transport layer to do in response.
#[derive(Debug, Clone)]
pub enum OutboundFrame {
    /// Raw mu-law bytes to chunk into 20ms frames and pace onto the wire.
    SpeakMulaw(Vec<u8>),
    /// Cancel whatever synthesized stream is currently playing.
    ClearPlayback,
    /// A carrier call-control document (transfer/hangup).
    CallUpdate(String),
    /// Close the media-stream socket.
    Close,
}

/// Shared dependencies the actor needs beyond the transport.
pub struct SessionRuntime {
    pub store: Arc<dyn SessionKv>,
    pub catalog: Arc<dyn CatalogClient>,
    pub cascade: Arc<dyn CascadeReleaseHandle>,
    pub tts: Arc<dyn crate::tts::TtsEngine>,
    pub events: Arc<dyn EventStream>,
    pub tuning: FsmTuning,
    /// Notified once a call reaches a terminal phase so the recording
    /// pipeline has something to join the eventual carrier webhook against.
    /// `None` when recording is disabled via the `voice_ai_enabled`/
    /// `recording_enabled` feature flags.
    pub recording_context: Option<Arc<dyn crate::recording_hook::RecordingContextSink>>,
}

impl SessionRuntime {
    /// Loads (or creates) the `CallSession` for `id`, advances the FSM with
    /// `frame`, persists the result, and returns the outbound frames to
    /// emit. A carrier-assigned sequence number backs the at-most-once
    /// token; `seq` is the inbound event's ordinal on this
    /// socket, assigned by the transport layer in `stream.rs`.
    pub async fn advance(
        &self,
        id: &SessionId,
        root_id: &SessionId,
        caller_phone_hint: &str,
        seq: u64,
        frame: InboundFrame,
    ) -> Result<Vec<OutboundFrame>> {
        let now = Utc::now();
        let mut session = match self.store.load(id).await? {
            Some(s) => s,
            None => CallSession::new(id.clone(), CallDirection::Inbound, caller_phone_hint.to_string(), now),
        };
        session.root_id = root_id.clone();

        let event = match frame {
            InboundFrame::Start { caller_phone } => InputEvent::with_token(
                format!("seq-{seq}"),
                InputKind::SessionStarted { caller_phone },
            ),
            InboundFrame::Media { .. } => {
                // Media frames never drive FSM transitions directly: speech
                // recognition is a pluggable out-of-scope capability, and
                // absent a transcription hook we simply acknowledge receipt
                // without advancing.
                return Ok(Vec::new());
            }
            InboundFrame::Dtmf { digit } => InputEvent::with_token(format!("seq-{seq}"), InputKind::Dtmf(digit)),
            InboundFrame::VoiceUtteranceEnded { transcript } => {
                InputEvent::with_token(format!("seq-{seq}"), InputKind::VoiceUtteranceEnded { transcript })
            }
            InboundFrame::GatherTimedOut => {
                InputEvent::with_token(format!("seq-{seq}"), InputKind::GatherTimedOut)
            }
            InboundFrame::Stop => InputEvent::server_action(InputKind::SessionStopped),
        };

        let caps = FsmCaps { catalog: self.catalog.as_ref(), cascade: self.cascade.as_ref(), tuning: &self.tuning };
        let expected_updated_at = session.updated_at;
        let was_authenticated = session.worker.is_some() && session.provider.is_some();
        let was_terminal = session.phase.is_terminal();
        let (next, directives) = shiftcall_fsm::advance(&session, &event, now, &caps).await?;

        if !self.store.cas_save(&next, expected_updated_at).await? {
            warn!(session_id = %id, "lost update on session save, caller must retry with reloaded state");
            return Err(OrchestratorError::transient("session save lost the race, retry"));
        }

        self.emit_lifecycle_events(&next, &directives, was_authenticated, was_terminal, now).await;

        if next.phase.is_terminal() {
            if let Some(sink) = &self.recording_context {
                let context = crate::recording_hook::RecordingCallContext {
                    call_id: next.root_id.clone(),
                    provider_id: next.provider.as_ref().map(|p| p.id.clone()),
                    worker_id: next.worker.as_ref().map(|w| w.id.clone()),
                };
                if let Err(e) = sink.record_call_context(context).await {
                    warn!(session_id = %id, error = %e, "failed to hand off recording context");
                }
            }
            self.store.delete(id).await.ok();
        }

        self.render(directives).await
    }

    /// Appends the §4.8 call-lifecycle events this session's transition just
    /// crossed. Best-effort: a failure to append never fails the call, it's
    /// only logged — the event stream feeds external reporting, it isn't
    /// part of the call's own correctness.
    async fn emit_lifecycle_events(
        &self,
        next: &CallSession,
        directives: &[Directive],
        was_authenticated: bool,
        was_terminal: bool,
        now: chrono::DateTime<Utc>,
    ) {
        let now_authenticated = next.worker.is_some() && next.provider.is_some();

        if !was_authenticated && now_authenticated {
            let provider_id = next.provider.as_ref().expect("checked above").id.clone();
            let worker_id = next.worker.as_ref().expect("checked above").id.clone();
            self.append_event(
                &provider_id,
                now,
                CallEvent::CallStarted { session_id: next.id.clone(), caller_phone: next.caller_phone.clone() },
            )
            .await;
            self.append_event(
                &provider_id,
                now,
                CallEvent::CallAuthenticated { session_id: next.id.clone(), worker_id },
            )
            .await;
        } else if !was_authenticated
            && !now_authenticated
            && !was_terminal
            && next.phase == Phase::Error
        {
            self.append_event(
                &ProviderId(UNAUTHENTICATED_EVENT_PROVIDER.to_string()),
                now,
                CallEvent::AuthenticationFailed { session_id: next.id.clone() },
            )
            .await;
        }

        for directive in directives {
            if let Directive::Transfer { target_phone, .. } = directive {
                if let Some(provider) = &next.provider {
                    self.append_event(
                        &provider.id,
                        now,
                        CallEvent::CallTransferred { session_id: next.id.clone(), target_phone: target_phone.clone() },
                    )
                    .await;
                }
            }
        }

        if !was_terminal && next.phase.is_terminal() {
            let provider_id = next
                .provider
                .as_ref()
                .map(|p| p.id.clone())
                .unwrap_or_else(|| ProviderId(UNAUTHENTICATED_EVENT_PROVIDER.to_string()));
            let duration_secs = (now - next.created_at).num_seconds().max(0) as u64;
            let reason = (next.phase == Phase::Error).then(|| "error".to_string());
            self.append_event(
                &provider_id,
                now,
                CallEvent::CallEnded { session_id: next.id.clone(), duration_secs, reason },
            )
            .await;
        }
    }

    async fn append_event(&self, provider_id: &ProviderId, at: chrono::DateTime<Utc>, event: CallEvent) {
        if let Err(e) = self.events.append(provider_id, at, event).await {
            warn!(%provider_id, error = %e, "failed to append call-lifecycle event");
        }
    }

    async fn render(&self, directives: Vec<Directive>) -> Result<Vec<OutboundFrame>> {
        let mut out = Vec::new();
        for directive in directives {
            match &directive {
                Directive::Speak { text, .. } => {
                    out.push(OutboundFrame::ClearPlayback);
                    let mulaw = self.tts.synthesize(text).await?;
                    out.push(OutboundFrame::SpeakMulaw(mulaw));
                }
                Directive::RecordControl { .. } => {
                    // Realized only in the session-start webhook response
                    // (crate::carrier_doc::render_connect_stream), not
                    // mid-stream.
                }
                Directive::Transfer { .. } | Directive::Hangup => {
                    if let Some(doc) = crate::carrier_doc::render_call_update(&directive) {
                        out.push(OutboundFrame::CallUpdate(doc));
                    }
                    if matches!(directive, Directive::Hangup) {
                        out.push(OutboundFrame::Close);
                    }
                }
            }
        }
        Ok(out)
    }
}

/// Derives `caller_phone` from the webhook/stream-start side channel, or
/// falls back to the one-shot carrier control-API fetch.
pub async fn resolve_caller_phone(
    side_channel: Option<String>,
    fallback: &dyn crate::carrier_api::CarrierControlClient,
    call_sid: &str,
) -> Result<String> {
    if let Some(phone) = side_channel.filter(|p| !p.is_empty()) {
        return Ok(phone);
    }
    fallback.fetch_caller_phone(call_sid).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use shiftcall_store::InMemorySessionKv;

    struct FakeCatalog;
    #[async_trait]
    impl CatalogClient for FakeCatalog {
        async fn find_worker_by_phone(&self, _e164: &str) -> Result<Option<Worker>> {
            Ok(None)
        }
        async fn find_worker_by_pin(&self, _pin: &str) -> Result<Option<Worker>> {
            Ok(None)
        }
        async fn worker(&self, _worker_id: &WorkerId) -> Result<Worker> {
            unimplemented!()
        }
        async fn providers_for_worker(&self, _worker_id: &WorkerId) -> Result<Vec<Provider>> {
            unimplemented!()
        }
        async fn provider(&self, _provider_id: &ProviderId) -> Result<Provider> {
            unimplemented!()
        }
        async fn future_scheduled_shifts(&self, _w: &WorkerId, _p: &ProviderId) -> Result<Vec<ShiftOccurrence>> {
            unimplemented!()
        }
        async fn shift(&self, _shift_id: &ShiftId) -> Result<ShiftOccurrence> {
            unimplemented!()
        }
        async fn release_shift(&self, _shift_id: &ShiftId) -> Result<ShiftOccurrence> {
            unimplemented!()
        }
        async fn try_fill_shift(&self, _shift_id: &ShiftId, _worker_id: &WorkerId) -> Result<bool> {
            unimplemented!()
        }
        async fn mark_shift_unfilled_after_text(&self, _shift_id: &ShiftId) -> Result<()> {
            unimplemented!()
        }
        async fn mark_shift_unfilled_after_calls(&self, _shift_id: &ShiftId) -> Result<()> {
            unimplemented!()
        }
        async fn eligible_pool(&self, _provider_id: &ProviderId, _excluded: &[WorkerId]) -> Result<Vec<Worker>> {
            unimplemented!()
        }
    }

    struct FakeCascade;
    #[async_trait]
    impl CascadeReleaseHandle for FakeCascade {
        async fn release(
            &self,
            _shift_id: &ShiftId,
            _releasing_worker_id: &WorkerId,
            _release_attempt_id: &str,
        ) -> Result<()> {
            Ok(())
        }
    }

    struct FakeTts;
    #[async_trait]
    impl crate::tts::TtsEngine for FakeTts {
        async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
            Ok(vec![0u8; text.len()])
        }
    }

    fn runtime() -> SessionRuntime {
        SessionRuntime {
            store: Arc::new(InMemorySessionKv::new()),
            catalog: Arc::new(FakeCatalog),
            cascade: Arc::new(FakeCascade),
            tts: Arc::new(FakeTts),
            events: Arc::new(shiftcall_store::InMemoryEventStream::new()),
            tuning: FsmTuning {
                pin_length: 4,
                max_attempts_per_phase: 3,
                shift_list_page_size: 3,
                dtmf_gather_timeout: std::time::Duration::from_secs(8),
                voice_gather_timeout: std::time::Duration::from_secs(10),
                default_transfer_fallback_number: "+10000000000".to_string(),
            },
            recording_context: None,
        }
    }

    #[tokio::test]
    async fn session_started_with_unknown_phone_falls_back_to_pin_prompt() {
        let rt = runtime();
        let id = SessionId("call-1".into());
        let out = rt
            .advance(&id, &id, "+15550000000", 1, InboundFrame::Start { caller_phone: Some("+15550000000".into()) })
            .await
            .unwrap();
        assert_eq!(out.len(), 2); // disclaimer speak, pin prompt speak
        assert!(matches!(out[0], OutboundFrame::ClearPlayback));
        let session = rt.store.load(&id).await.unwrap().unwrap();
        assert_eq!(session.phase, Phase::PinAuth);
    }

    struct FakeAuthedCatalog;
    #[async_trait]
    impl CatalogClient for FakeAuthedCatalog {
        async fn find_worker_by_phone(&self, _e164: &str) -> Result<Option<Worker>> {
            Ok(Some(Worker {
                id: WorkerId("w1".into()),
                display_name: "Alex Kim".into(),
                pin: "4821".into(),
                phone: "+61412345678".into(),
                provider_ids: vec![ProviderId("p1".into())],
                active: true,
            }))
        }
        async fn find_worker_by_pin(&self, _pin: &str) -> Result<Option<Worker>> {
            unimplemented!()
        }
        async fn worker(&self, _worker_id: &WorkerId) -> Result<Worker> {
            unimplemented!()
        }
        async fn providers_for_worker(&self, _worker_id: &WorkerId) -> Result<Vec<Provider>> {
            Ok(vec![Provider {
                id: ProviderId("p1".into()),
                name: "Acme Care".into(),
                greeting: "Hi".into(),
                timezone: "Australia/Sydney".into(),
                transfer_number: "+611234000".into(),
            }])
        }
        async fn provider(&self, _provider_id: &ProviderId) -> Result<Provider> {
            unimplemented!()
        }
        async fn future_scheduled_shifts(&self, _w: &WorkerId, _p: &ProviderId) -> Result<Vec<ShiftOccurrence>> {
            Ok(vec![])
        }
        async fn shift(&self, _shift_id: &ShiftId) -> Result<ShiftOccurrence> {
            unimplemented!()
        }
        async fn release_shift(&self, _shift_id: &ShiftId) -> Result<ShiftOccurrence> {
            unimplemented!()
        }
        async fn try_fill_shift(&self, _shift_id: &ShiftId, _worker_id: &WorkerId) -> Result<bool> {
            unimplemented!()
        }
        async fn mark_shift_unfilled_after_text(&self, _shift_id: &ShiftId) -> Result<()> {
            unimplemented!()
        }
        async fn mark_shift_unfilled_after_calls(&self, _shift_id: &ShiftId) -> Result<()> {
            unimplemented!()
        }
        async fn eligible_pool(&self, _provider_id: &ProviderId, _excluded: &[WorkerId]) -> Result<Vec<Worker>> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn session_start_with_known_phone_emits_call_started_and_authenticated() {
        let events = Arc::new(shiftcall_store::InMemoryEventStream::new());
        let rt = SessionRuntime { catalog: Arc::new(FakeAuthedCatalog), events: events.clone(), ..runtime() };
        let id = SessionId("call-3".into());
        rt.advance(&id, &id, "+61412345678", 1, InboundFrame::Start { caller_phone: Some("+61412345678".into()) })
            .await
            .unwrap();

        let entries = events.range(&ProviderId("p1".into()), Utc::now().date_naive()).await.unwrap();
        let kinds: Vec<&str> = entries
            .iter()
            .map(|(_, e)| match e {
                CallEvent::CallStarted { .. } => "call_started",
                CallEvent::CallAuthenticated { .. } => "call_authenticated",
                _ => "other",
            })
            .collect();
        assert_eq!(kinds, vec!["call_started", "call_authenticated"]);
    }

    #[tokio::test]
    async fn duplicate_sequence_does_not_advance_phase() {
        let rt = runtime();
        let id = SessionId("call-2".into());
        rt.advance(&id, &id, "+15550000000", 1, InboundFrame::Start { caller_phone: Some("+15550000000".into()) })
            .await
            .unwrap();
        let before = rt.store.load(&id).await.unwrap().unwrap();
        rt.advance(&id, &id, "+15550000000", 1, InboundFrame::Start { caller_phone: Some("+15550000000".into()) })
            .await
            .unwrap();
        let after = rt.store.load(&id).await.unwrap().unwrap();
        assert_eq!(before, after);
    }
}
