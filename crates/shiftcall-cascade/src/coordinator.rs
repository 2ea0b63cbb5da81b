//! `CascadeCoordinator`: the Release algorithm and the job handlers that
//! drive text waves and voice-offer rounds

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shiftcall_core::prelude::*;
use shiftcall_fsm::CascadeReleaseHandle;
use std::sync::Arc;
use tracing::{info, warn};

use crate::dialer::{OfferOutcome, OfferScript, VoiceOfferDialer};
use crate::gateway::{MessageGatewayClient, OutboundText};
use crate::plan_store::CascadePlanStore;
use crate::queue::{CascadeQueue, JobHandle, JobKind, ScheduledJob};
use crate::retry::{retry_transient, BackoffPolicy};
use crate::wave;
use shiftcall_catalog::CatalogClient;
use shiftcall_store::{CallEvent, EventStream, UnfilledReason};

pub struct CascadeCoordinator {
    pub catalog: Arc<dyn CatalogClient>,
    pub queue: Arc<dyn CascadeQueue>,
    pub plans: Arc<dyn CascadePlanStore>,
    pub gateway: Arc<dyn MessageGatewayClient>,
    pub dialer: Arc<dyn VoiceOfferDialer>,
    pub events: Arc<dyn EventStream>,
    pub config: CascadeConfig,
    pub base_link_url: String,
}

impl CascadeCoordinator {
    fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy {
            max_attempts: self.config.retry_max_attempts,
            base_delay: self.config.retry_base_delay,
            factor: self.config.retry_backoff_factor,
            max_delay: self.config.retry_max_delay,
        }
    }

    fn link_for(&self, shift_id: &ShiftId, worker_id: &WorkerId) -> String {
        format!("{}/o?s={}&w={}", self.base_link_url.trim_end_matches('/'), shift_id, worker_id)
    }

    /// `Release(shiftId, reason)`. Idempotent on `(shiftId, releaseAttemptId)`.
    pub async fn release(
        &self,
        shift_id: &ShiftId,
        releasing_worker_id: &WorkerId,
        release_attempt_id: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if let Some(existing) = self.plans.load(shift_id).await? {
            if existing.release_attempt_id == release_attempt_id {
                info!(%shift_id, %release_attempt_id, "release already processed, no-op");
                return Ok(());
            }
        }

        let shift = self.catalog.shift(shift_id).await?;
        let pool_workers =
            self.catalog.eligible_pool(&shift.provider_id, std::slice::from_ref(releasing_worker_id)).await?;
        let pool: Vec<WorkerId> = pool_workers.into_iter().map(|w| w.id).collect();

        let hours_until_shift =
            (shift.scheduled_at - now).num_seconds() as f64 / 3600.0;
        let schedule = wave::wave_schedule_minutes(hours_until_shift);

        let plan = CascadePlan {
            shift_id: shift_id.clone(),
            pool,
            wave_schedule_minutes: schedule.to_vec(),
            max_voice_rounds: self.config.max_voice_rounds,
            current_phase: CascadePhase::TextWave(1),
            cancellations: Vec::new(),
            release_attempt_id: release_attempt_id.to_string(),
        };
        self.plans.save(&plan).await?;

        for (idx, delay_minutes) in schedule.iter().enumerate() {
            let wave_num = (idx + 1) as u8;
            let handle = JobHandle::new(shift_id.clone(), format!("wave{wave_num}"));
            self.queue
                .enqueue(ScheduledJob {
                    handle,
                    kind: JobKind::TextWave { wave: wave_num },
                    run_at: now + chrono::Duration::minutes(*delay_minutes as i64),
                })
                .await?;
        }

        self.events
            .append(&shift.provider_id, now, CallEvent::ShiftOpened { shift_id: shift_id.clone() })
            .await?;
        Ok(())
    }

    /// Processes every job currently due. Intended to be polled on
    /// `CascadeConfig::poll_interval` by a background task in the server
    /// binary.
    pub async fn process_due(&self, now: DateTime<Utc>) -> Result<()> {
        for job in self.queue.take_due(now).await? {
            if self.queue.is_cancelled(&job.handle).await? {
                continue;
            }
            match job.kind {
                JobKind::TextWave { wave } => {
                    if let Err(e) = self.run_text_wave(&job.handle, wave, now).await {
                        warn!(shift_id = %job.handle.shift_id, error = %e, "text wave processing failed");
                    }
                }
                JobKind::VoiceOfferRound { round } => {
                    if let Err(e) = self.run_voice_round(&job.handle, round, now).await {
                        warn!(shift_id = %job.handle.shift_id, error = %e, "voice round processing failed");
                    }
                }
            }
        }
        Ok(())
    }

    async fn run_text_wave(&self, handle: &JobHandle, wave_num: u8, now: DateTime<Utc>) -> Result<()> {
        let shift_id = &handle.shift_id;
        let Some(plan) = self.plans.load(shift_id).await? else { return Ok(()) };
        let shift = self.catalog.shift(shift_id).await?;
        if !shift.status.is_open() {
            info!(%shift_id, wave = wave_num, "shift no longer open, halting wave");
            return Ok(());
        }

        let mut sent = 0usize;
        for worker_id in &plan.pool {
            let worker = match self.catalog.worker(worker_id).await {
                Ok(w) if !w.phone.is_empty() => w,
                _ => continue,
            };
            let body = wave::text_body(&shift, wave_num, &self.link_for(shift_id, worker_id));
            let outcome = retry_transient(self.backoff(), || {
                self.gateway.send(OutboundText { to_e164: worker.phone.clone(), body: body.clone() })
            })
            .await;
            match outcome {
                Ok(_) => sent += 1,
                Err(e) => warn!(%shift_id, worker_id = %worker_id, error = %e, "text send failed for worker, skipping"),
            }
        }

        self.events
            .append(
                &shift.provider_id,
                now,
                CallEvent::StaffNotified { shift_id: shift_id.clone(), wave: wave_num, count: sent },
            )
            .await?;

        if wave_num == 3 {
            let mut next_plan = plan;
            next_plan.current_phase = CascadePhase::VoiceCalls;
            self.plans.save(&next_plan).await?;
            let handle = JobHandle::new(shift_id.clone(), "voice-round1");
            self.queue
                .enqueue(ScheduledJob { handle, kind: JobKind::VoiceOfferRound { round: 1 }, run_at: now })
                .await?;
        }
        Ok(())
    }

    async fn run_voice_round(&self, handle: &JobHandle, round: u32, now: DateTime<Utc>) -> Result<()> {
        let shift_id = &handle.shift_id;
        let Some(plan) = self.plans.load(shift_id).await? else { return Ok(()) };
        let mut shift = self.catalog.shift(shift_id).await?;

        for worker_id in plan.pool.clone() {
            if !shift.status.is_open() {
                info!(%shift_id, round, "shift no longer open, halting cascade");
                return Ok(());
            }
            let worker = match self.catalog.worker(&worker_id).await {
                Ok(w) if !w.phone.is_empty() => w,
                _ => continue,
            };
            let (date_display, time_display) =
                crate::wave::split_date_time_display(&shift.scheduled_at_local_display);
            let script = OfferScript {
                worker_first_name: worker.display_name.split_whitespace().next().unwrap_or_default().to_string(),
                patient_first_initial: shift.patient_display.clone(),
                date_display,
                time_display,
            };
            let outcome = self.dialer.place_offer(&worker, &script, self.config.voice_offer_timeout).await;
            match outcome {
                Ok(OfferOutcome::Accepted) => {
                    let filled = self.catalog.try_fill_shift(shift_id, &worker_id).await?;
                    if filled {
                        self.on_accepted(&plan, &worker_id, now).await?;
                        return Ok(());
                    }
                    shift = self.catalog.shift(shift_id).await?;
                }
                Ok(OfferOutcome::Declined) | Ok(OfferOutcome::NoAnswer) => {}
                Err(e) => warn!(%shift_id, worker_id = %worker_id, error = %e, "voice offer failed, skipping"),
            }
        }

        if round < plan.max_voice_rounds {
            let next_handle = JobHandle::new(shift_id.clone(), format!("voice-round{}", round + 1));
            self.queue
                .enqueue(ScheduledJob {
                    handle: next_handle,
                    kind: JobKind::VoiceOfferRound { round: round + 1 },
                    run_at: now,
                })
                .await?;
        } else {
            self.catalog.mark_shift_unfilled_after_calls(shift_id).await?;
            self.events
                .append(
                    &shift.provider_id,
                    now,
                    CallEvent::ShiftUnfilled { shift_id: shift_id.clone(), reason: UnfilledReason::AfterCalls },
                )
                .await?;
            let mut next_plan = plan;
            next_plan.current_phase = CascadePhase::Terminal;
            self.plans.save(&next_plan).await?;
        }
        Ok(())
    }

    /// Once a worker accepts and the shift is filled, cancel every pending
    /// handle of this cascade.
    async fn on_accepted(&self, plan: &CascadePlan, worker_id: &WorkerId, now: DateTime<Utc>) -> Result<()> {
        for wave_num in 1..=3u8 {
            self.queue.cancel(&JobHandle::new(plan.shift_id.clone(), format!("wave{wave_num}"))).await?;
        }
        for round in 1..=plan.max_voice_rounds {
            self.queue.cancel(&JobHandle::new(plan.shift_id.clone(), format!("voice-round{round}"))).await?;
        }
        let shift = self.catalog.shift(&plan.shift_id).await?;
        self.events
            .append(
                &shift.provider_id,
                now,
                CallEvent::ShiftAccepted { shift_id: plan.shift_id.clone(), worker_id: worker_id.clone() },
            )
            .await?;
        let mut next_plan = plan.clone();
        next_plan.current_phase = CascadePhase::Terminal;
        self.plans.save(&next_plan).await
    }
}

#[async_trait]
impl CascadeReleaseHandle for CascadeCoordinator {
    async fn release(
        &self,
        shift_id: &ShiftId,
        releasing_worker_id: &WorkerId,
        release_attempt_id: &str,
    ) -> Result<()> {
        CascadeCoordinator::release(self, shift_id, releasing_worker_id, release_attempt_id, Utc::now()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialer::OfferOutcome;
    use crate::gateway::OutboundText;
    use crate::plan_store::InMemoryCascadePlanStore;
    use crate::queue::InMemoryCascadeQueue;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use shiftcall_store::InMemoryEventStream;
    use std::sync::Mutex as StdMutex;

    struct FakeCatalog {
        shift: StdMutex<ShiftOccurrence>,
        pool: Vec<Worker>,
    }

    #[async_trait]
    impl CatalogClient for FakeCatalog {
        async fn find_worker_by_phone(&self, _e164: &str) -> Result<Option<Worker>> {
            unimplemented!()
        }
        async fn find_worker_by_pin(&self, _pin: &str) -> Result<Option<Worker>> {
            unimplemented!()
        }
        async fn worker(&self, worker_id: &WorkerId) -> Result<Worker> {
            self.pool.iter().find(|w| &w.id == worker_id).cloned().ok_or_else(|| OrchestratorError::not_found("worker"))
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
            Ok(self.shift.lock().unwrap().clone())
        }
        async fn release_shift(&self, shift_id: &ShiftId) -> Result<ShiftOccurrence> {
            let mut s = self.shift.lock().unwrap();
            s.status = ShiftStatus::Open;
            s.assigned_worker_id = None;
            let _ = shift_id;
            Ok(s.clone())
        }
        async fn try_fill_shift(&self, _shift_id: &ShiftId, worker_id: &WorkerId) -> Result<bool> {
            let mut s = self.shift.lock().unwrap();
            if s.status.is_open() {
                s.status = ShiftStatus::Filled;
                s.assigned_worker_id = Some(worker_id.clone());
                Ok(true)
            } else {
                Ok(false)
            }
        }
        async fn mark_shift_unfilled_after_text(&self, _shift_id: &ShiftId) -> Result<()> {
            Ok(())
        }
        async fn mark_shift_unfilled_after_calls(&self, _shift_id: &ShiftId) -> Result<()> {
            self.shift.lock().unwrap().status = ShiftStatus::UnfilledAfterCalls;
            Ok(())
        }
        async fn eligible_pool(&self, _provider_id: &ProviderId, excluded: &[WorkerId]) -> Result<Vec<Worker>> {
            Ok(self.pool.iter().filter(|w| !excluded.contains(&w.id)).cloned().collect())
        }
    }

    struct FakeGateway;
    #[async_trait]
    impl MessageGatewayClient for FakeGateway {
        async fn send(&self, _text: OutboundText) -> Result<String> {
            Ok("sid-1".into())
        }
    }

    struct AlwaysNoAnswerDialer;
    #[async_trait]
    impl VoiceOfferDialer for AlwaysNoAnswerDialer {
        async fn place_offer(&self, _w: &Worker, _s: &OfferScript, _t: std::time::Duration) -> Result<OfferOutcome> {
            Ok(OfferOutcome::NoAnswer)
        }
    }

    fn shift() -> ShiftOccurrence {
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

    fn pool() -> Vec<Worker> {
        vec![
            Worker { id: WorkerId("w10".into()), display_name: "Dana".into(), pin: "1".into(), phone: "+61400000010".into(), provider_ids: vec![], active: true },
            Worker { id: WorkerId("w11".into()), display_name: "Eli".into(), pin: "2".into(), phone: "+61400000011".into(), provider_ids: vec![], active: true },
        ]
    }

    fn coordinator(catalog: Arc<FakeCatalog>) -> CascadeCoordinator {
        CascadeCoordinator {
            catalog,
            queue: Arc::new(InMemoryCascadeQueue::new()),
            plans: Arc::new(InMemoryCascadePlanStore::new()),
            gateway: Arc::new(FakeGateway),
            dialer: Arc::new(AlwaysNoAnswerDialer),
            events: Arc::new(InMemoryEventStream::new()),
            config: CascadeConfig {
                max_voice_rounds: 2,
                voice_offer_timeout: std::time::Duration::from_secs(30),
                retry_max_attempts: 3,
                retry_base_delay: std::time::Duration::from_millis(1),
                retry_backoff_factor: 2.0,
                retry_max_delay: std::time::Duration::from_millis(4),
                poll_interval: std::time::Duration::from_millis(500),
            },
            base_link_url: "https://s.example".into(),
        }
    }

    #[tokio::test]
    async fn release_is_idempotent_on_same_attempt_id() {
        let catalog = Arc::new(FakeCatalog { shift: StdMutex::new(shift()), pool: pool() });
        let coord = coordinator(catalog.clone());
        let now = Utc.with_ymd_and_hms(2026, 2, 1, 2, 30, 0).unwrap();
        coord.release(&ShiftId("sh1".into()), &WorkerId("w1".into()), "attempt-1", now).await.unwrap();
        coord.release(&ShiftId("sh1".into()), &WorkerId("w1".into()), "attempt-1", now).await.unwrap();
        let plan = coord.plans.load(&ShiftId("sh1".into())).await.unwrap().unwrap();
        assert_eq!(plan.wave_schedule_minutes.len(), 3);
    }

    /// S4: voice-offer round-robin to unfilled across two rounds, no accepts.
    #[tokio::test]
    async fn voice_rounds_exhaust_to_unfilled_after_calls() {
        let catalog = Arc::new(FakeCatalog { shift: StdMutex::new(shift()), pool: pool() });
        catalog.shift.lock().unwrap().status = ShiftStatus::Open;
        let coord = coordinator(catalog.clone());
        let now = Utc.with_ymd_and_hms(2026, 2, 1, 2, 30, 0).unwrap();
        let plan = CascadePlan {
            shift_id: ShiftId("sh1".into()),
            pool: vec![WorkerId("w10".into()), WorkerId("w11".into())],
            wave_schedule_minutes: vec![0, 15, 30],
            max_voice_rounds: 2,
            current_phase: CascadePhase::VoiceCalls,
            cancellations: vec![],
            release_attempt_id: "attempt-1".into(),
        };
        coord.plans.save(&plan).await.unwrap();
        coord
            .run_voice_round(&JobHandle::new(ShiftId("sh1".into()), "voice-round1"), 1, now)
            .await
            .unwrap();
        coord
            .run_voice_round(&JobHandle::new(ShiftId("sh1".into()), "voice-round2"), 2, now)
            .await
            .unwrap();

        assert_eq!(catalog.shift.lock().unwrap().status, ShiftStatus::UnfilledAfterCalls);
    }

    /// S3: a worker accepts between Wave 1 and Wave 2; the Wave-2 handler
    /// reads `shift.status != Open` and halts without sending any text.
    #[tokio::test]
    async fn wave_halts_after_shift_filled() {
        let catalog = Arc::new(FakeCatalog { shift: StdMutex::new(shift()), pool: pool() });
        catalog.shift.lock().unwrap().status = ShiftStatus::Open;
        let coord = coordinator(catalog.clone());
        let now = Utc.with_ymd_and_hms(2026, 2, 1, 2, 30, 0).unwrap();
        let plan = CascadePlan {
            shift_id: ShiftId("sh1".into()),
            pool: vec![WorkerId("w10".into()), WorkerId("w11".into())],
            wave_schedule_minutes: vec![0, 15, 30],
            max_voice_rounds: 2,
            current_phase: CascadePhase::TextWave(1),
            cancellations: vec![],
            release_attempt_id: "attempt-1".into(),
        };
        coord.plans.save(&plan).await.unwrap();

        coord.run_text_wave(&JobHandle::new(ShiftId("sh1".into()), "wave1"), 1, now).await.unwrap();

        // Accept lands before Wave 2 runs.
        catalog.try_fill_shift(&ShiftId("sh1".into()), &WorkerId("w10".into())).await.unwrap();
        coord.on_accepted(&plan, &WorkerId("w10".into()), now).await.unwrap();

        // Wave 2's handler re-checks status and halts without sending.
        coord.run_text_wave(&JobHandle::new(ShiftId("sh1".into()), "wave2"), 2, now).await.unwrap();

        let events = coord.events.range(&ProviderId("p1".into()), now.date_naive()).await.unwrap();
        let staff_notified = events.iter().filter(|(_, e)| matches!(e, CallEvent::StaffNotified { .. })).count();
        let accepted = events.iter().filter(|(_, e)| matches!(e, CallEvent::ShiftAccepted { .. })).count();
        assert_eq!(staff_notified, 1, "only Wave 1 should have notified staff");
        assert_eq!(accepted, 1);
        assert_eq!(catalog.shift.lock().unwrap().status, ShiftStatus::Filled);
    }
}
