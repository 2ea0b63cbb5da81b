//! Capability handles injected into `advance`: each transition arm is a
//! pure function of `(session, input)` plus these injected handles.

use async_trait::async_trait;
use shiftcall_core::prelude::*;
use std::time::Duration;

/// What the FSM needs from the Notification Cascade Coordinator. Kept as a
/// trait here (rather than a dependency on `shiftcall-cascade`) so the FSM
/// crate never depends downward on the coordinator that depends on it.
#[async_trait]
pub trait CascadeReleaseHandle: Send + Sync {
    /// `Release(shiftId, reason)`. `releasing_worker_id` is excluded from the
    /// replacement pool ( §4.4 step 1: "excluding the releasing worker").
    /// `release_attempt_id` is an idempotency key — the same id delivered
    /// twice must not double-release.
    async fn release(
        &self,
        shift_id: &ShiftId,
        releasing_worker_id: &WorkerId,
        release_attempt_id: &str,
    ) -> Result<()>;
}

/// Tunables the FSM consults; bound to `AppConfig` fields by the server
/// crate at startup.
#[derive(Debug, Clone)]
pub struct FsmTuning {
    pub pin_length: usize,
    pub max_attempts_per_phase: u32,
    pub shift_list_page_size: usize,
    pub dtmf_gather_timeout: Duration,
    pub voice_gather_timeout: Duration,
    pub default_transfer_fallback_number: String,
}

/// Bundle of everything `advance` needs beyond the session and the event.
pub struct FsmCaps<'a> {
    pub catalog: &'a (dyn shiftcall_catalog::CatalogClient),
    pub cascade: &'a (dyn CascadeReleaseHandle),
    pub tuning: &'a FsmTuning,
}
