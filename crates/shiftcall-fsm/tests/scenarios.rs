//! End-to-end scenario tests against the documented call flows: happy path
//! with a single provider and shift, PIN fallback, and duplicate-token
//! idempotency.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use shiftcall_core::prelude::*;
use shiftcall_fsm::{advance, CascadeReleaseHandle, FsmCaps, FsmTuning, InputEvent, InputKind};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

struct FakeCatalog {
    worker_by_phone: Option<Worker>,
    worker_by_pin: Option<Worker>,
    providers: Vec<Provider>,
    shifts: Vec<ShiftOccurrence>,
    released: Mutex<Vec<ShiftId>>,
}

#[async_trait]
impl shiftcall_catalog::CatalogClient for FakeCatalog {
    async fn find_worker_by_phone(&self, _e164: &str) -> Result<Option<Worker>> {
        Ok(self.worker_by_phone.clone())
    }
    async fn find_worker_by_pin(&self, _pin: &str) -> Result<Option<Worker>> {
        Ok(self.worker_by_pin.clone())
    }
    async fn worker(&self, worker_id: &WorkerId) -> Result<Worker> {
        [&self.worker_by_phone, &self.worker_by_pin]
            .into_iter()
            .flatten()
            .find(|w| &w.id == worker_id)
            .cloned()
            .ok_or_else(|| OrchestratorError::not_found("worker"))
    }
    async fn providers_for_worker(&self, _worker_id: &WorkerId) -> Result<Vec<Provider>> {
        Ok(self.providers.clone())
    }
    async fn provider(&self, provider_id: &ProviderId) -> Result<Provider> {
        self.providers
            .iter()
            .find(|p| &p.id == provider_id)
            .cloned()
            .ok_or_else(|| OrchestratorError::not_found("provider"))
    }
    async fn future_scheduled_shifts(
        &self,
        _worker_id: &WorkerId,
        _provider_id: &ProviderId,
    ) -> Result<Vec<ShiftOccurrence>> {
        Ok(self.shifts.clone())
    }
    async fn shift(&self, shift_id: &ShiftId) -> Result<ShiftOccurrence> {
        self.shifts
            .iter()
            .find(|s| &s.id == shift_id)
            .cloned()
            .ok_or_else(|| OrchestratorError::not_found("shift"))
    }
    async fn release_shift(&self, shift_id: &ShiftId) -> Result<ShiftOccurrence> {
        self.released.lock().unwrap().push(shift_id.clone());
        let mut shift = self.shift(shift_id).await?;
        shift.status = ShiftStatus::Open;
        shift.assigned_worker_id = None;
        Ok(shift)
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
    async fn eligible_pool(
        &self,
        _provider_id: &ProviderId,
        _excluded_worker_ids: &[WorkerId],
    ) -> Result<Vec<Worker>> {
        unimplemented!()
    }
}

struct FakeCascade {
    release_calls: AtomicUsize,
}

#[async_trait]
impl CascadeReleaseHandle for FakeCascade {
    async fn release(
        &self,
        _shift_id: &ShiftId,
        _releasing_worker_id: &WorkerId,
        _release_attempt_id: &str,
    ) -> Result<()> {
        self.release_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn tuning() -> FsmTuning {
    FsmTuning {
        pin_length: 4,
        max_attempts_per_phase: 3,
        shift_list_page_size: 3,
        dtmf_gather_timeout: Duration::from_secs(8),
        voice_gather_timeout: Duration::from_secs(10),
        default_transfer_fallback_number: "+611800000000".into(),
    }
}

fn t(offset_secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap() + chrono::Duration::seconds(offset_secs)
}

fn shift_oliver() -> ShiftOccurrence {
    ShiftOccurrence {
        id: ShiftId("sh1".into()),
        template_id: None,
        provider_id: ProviderId("p1".into()),
        assigned_worker_id: Some(WorkerId("w1".into())),
        patient_display: "Oliver S.".into(),
        scheduled_at: Utc.with_ymd_and_hms(2026, 2, 1, 5, 30, 0).unwrap(),
        scheduled_at_local_display: "Feb 1 4:30PM".into(),
        status: ShiftStatus::Scheduled,
    }
}

fn worker_alex() -> Worker {
    Worker {
        id: WorkerId("w1".into()),
        display_name: "Alex Kim".into(),
        pin: "4821".into(),
        phone: "+61412345678".into(),
        provider_ids: vec![ProviderId("p1".into())],
        active: true,
    }
}

fn provider_acme() -> Provider {
    Provider {
        id: ProviderId("p1".into()),
        name: "Acme Care".into(),
        greeting: "Hi".into(),
        timezone: "Australia/Sydney".into(),
        transfer_number: "+611234000".into(),
    }
}

/// S1: happy path, single provider, one future shift, through to release.
#[tokio::test]
async fn s1_happy_path_single_provider_one_shift() {
    let catalog = FakeCatalog {
        worker_by_phone: Some(worker_alex()),
        worker_by_pin: None,
        providers: vec![provider_acme()],
        shifts: vec![shift_oliver()],
        released: Mutex::new(Vec::new()),
    };
    let cascade = FakeCascade { release_calls: AtomicUsize::new(0) };
    let tuning = tuning();
    let caps = FsmCaps { catalog: &catalog, cascade: &cascade, tuning: &tuning };

    let mut session =
        CallSession::new(SessionId("call1".into()), CallDirection::Inbound, "+61412345678".into(), t(0));

    let (session, directives) = advance(
        &session,
        &InputEvent::with_token("tok1", InputKind::SessionStarted { caller_phone: None }),
        t(1),
        &caps,
    )
    .await
    .unwrap();
    assert_eq!(session.phase, Phase::ShiftList);
    assert!(matches!(&directives[0], Directive::Speak { text, .. } if text.contains("Alex Kim")));

    let (session, _) =
        advance(&session, &InputEvent::with_token("tok2", InputKind::Dtmf('2')), t(2), &caps)
            .await
            .unwrap();
    assert_eq!(session.phase, Phase::ShiftOptions);
    assert_eq!(session.selected_shift.as_ref().unwrap().id, ShiftId("sh1".into()));

    let (session, _) =
        advance(&session, &InputEvent::with_token("tok3", InputKind::Dtmf('1')), t(3), &caps)
            .await
            .unwrap();
    assert_eq!(session.phase, Phase::CollectReason);

    let (session, _) = advance(
        &session,
        &InputEvent::with_token(
            "tok4",
            InputKind::VoiceUtteranceEnded { transcript: "family emergency".into() },
        ),
        t(4),
        &caps,
    )
    .await
    .unwrap();
    assert_eq!(session.phase, Phase::ConfirmRelease);

    let (session, directives) =
        advance(&session, &InputEvent::with_token("tok5", InputKind::Dtmf('1')), t(5), &caps)
            .await
            .unwrap();
    assert_eq!(session.phase, Phase::WorkflowComplete);
    assert_eq!(catalog.released.lock().unwrap().as_slice(), &[ShiftId("sh1".into())]);
    assert_eq!(cascade.release_calls.load(Ordering::SeqCst), 1);
    assert!(!directives.is_empty());
}

/// S2: PIN fallback when the caller's phone isn't on file.
#[tokio::test]
async fn s2_pin_fallback_matches_by_pin() {
    let catalog = FakeCatalog {
        worker_by_phone: None,
        worker_by_pin: Some(Worker { id: WorkerId("w2".into()), ..worker_alex() }),
        providers: vec![provider_acme()],
        shifts: vec![],
        released: Mutex::new(Vec::new()),
    };
    let cascade = FakeCascade { release_calls: AtomicUsize::new(0) };
    let tuning = tuning();
    let caps = FsmCaps { catalog: &catalog, cascade: &cascade, tuning: &tuning };

    let session =
        CallSession::new(SessionId("call2".into()), CallDirection::Inbound, "+15550000000".into(), t(0));

    let (session, _) = advance(
        &session,
        &InputEvent::with_token("tok1", InputKind::SessionStarted { caller_phone: None }),
        t(1),
        &caps,
    )
    .await
    .unwrap();
    assert_eq!(session.phase, Phase::PinAuth);

    let mut session = session;
    for (i, digit) in ['2', '0', '0', '1'].into_iter().enumerate() {
        let (s, _) = advance(
            &session,
            &InputEvent::with_token(format!("pin{i}"), InputKind::Dtmf(digit)),
            t(2 + i as i64),
            &caps,
        )
        .await
        .unwrap();
        session = s;
    }
    let (session, _) =
        advance(&session, &InputEvent::with_token("pinhash", InputKind::Dtmf('#')), t(10), &caps)
            .await
            .unwrap();

    assert_eq!(session.worker.as_ref().unwrap().id, WorkerId("w2".into()));
    assert!(matches!(session.phase, Phase::ShiftList));
}

/// S6: duplicate DTMF delivery must replay the prior directives verbatim and
/// leave phase/attempts unchanged.
#[tokio::test]
async fn s6_duplicate_token_is_idempotent() {
    let catalog = FakeCatalog {
        worker_by_phone: Some(worker_alex()),
        worker_by_pin: None,
        providers: vec![provider_acme()],
        shifts: vec![shift_oliver()],
        released: Mutex::new(Vec::new()),
    };
    let cascade = FakeCascade { release_calls: AtomicUsize::new(0) };
    let tuning = tuning();
    let caps = FsmCaps { catalog: &catalog, cascade: &cascade, tuning: &tuning };

    let session =
        CallSession::new(SessionId("call3".into()), CallDirection::Inbound, "+61412345678".into(), t(0));
    let (session, _) = advance(
        &session,
        &InputEvent::with_token("tok1", InputKind::SessionStarted { caller_phone: None }),
        t(1),
        &caps,
    )
    .await
    .unwrap();

    let (session_after_first, directives_first) =
        advance(&session, &InputEvent::with_token("dup", InputKind::Dtmf('2')), t(2), &caps)
            .await
            .unwrap();
    assert_eq!(session_after_first.phase, Phase::ShiftOptions);

    let (session_after_dup, directives_dup) = advance(
        &session_after_first,
        &InputEvent::with_token("dup", InputKind::Dtmf('2')),
        t(3),
        &caps,
    )
    .await
    .unwrap();

    assert_eq!(session_after_dup, session_after_first, "duplicate token must not mutate state");
    assert_eq!(directives_dup, directives_first);
}
