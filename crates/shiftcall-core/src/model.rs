//! Core data model shared by every crate in the workspace.
//!
//! These types are plain, serde-(de)serializable structs — the call-state
//! store, the cascade coordinator, and the telephony adapter all read and
//! write them directly rather than through per-crate DTOs.

use crate::directive::Directive;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Opaque identifiers. Newtypes avoid accidentally passing a shift id where a
/// worker id is expected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkerId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProviderId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ShiftId(pub String);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::fmt::Display for ShiftId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Direction a `CallSession` was opened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallDirection {
    Inbound,
    OutboundOffer,
}

/// FSM phases Lives in `shiftcall-core` (rather than
/// `shiftcall-fsm`) because `CallSession` needs to name it and nothing
/// should have to depend on the FSM crate just to read a session snapshot
/// out of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    PhoneAuth,
    PinAuth,
    ProviderSelection,
    ShiftList,
    ShiftOptions,
    CollectReason,
    ConfirmRelease,
    RepresentativeTransfer,
    WorkflowComplete,
    Done,
    Error,
}

impl Phase {
    /// Terminal phases admit no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Done | Phase::Error)
    }
}

/// A worker eligible to take shifts and to be offered replacement shifts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Worker {
    pub id: WorkerId,
    pub display_name: String,
    pub pin: String,
    pub phone: String,
    pub provider_ids: Vec<ProviderId>,
    pub active: bool,
}

/// A tenant organization a worker is associated with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provider {
    pub id: ProviderId,
    pub name: String,
    pub greeting: String,
    pub timezone: String,
    pub transfer_number: String,
}

/// Summary view of a provider used when listing a worker's providers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSummary {
    pub id: ProviderId,
    pub name: String,
}

/// Lifecycle status of a `ShiftOccurrence`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShiftStatus {
    Scheduled,
    Open,
    Filled,
    UnfilledAfterText,
    UnfilledAfterCalls,
    Cancelled,
}

impl ShiftStatus {
    /// Whether the cascade is still eligible to act on this shift.
    pub fn is_open(self) -> bool {
        matches!(self, ShiftStatus::Open)
    }
}

/// A single scheduled occurrence of a shift
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShiftOccurrence {
    pub id: ShiftId,
    pub template_id: Option<String>,
    pub provider_id: ProviderId,
    pub assigned_worker_id: Option<WorkerId>,
    /// Privacy-masked name, e.g. "Oliver S.".
    pub patient_display: String,
    pub scheduled_at: DateTime<Utc>,
    /// Pre-rendered local-timezone display string, e.g. "Feb 1 4:30PM".
    pub scheduled_at_local_display: String,
    pub status: ShiftStatus,
}

impl ShiftOccurrence {
/// Invariant from `assignedWorkerId` is non-null iff status is
    /// `Scheduled` or `Filled`.
    pub fn invariant_holds(&self) -> bool {
        let assigned = self.assigned_worker_id.is_some();
        let should_be_assigned = matches!(self.status, ShiftStatus::Scheduled | ShiftStatus::Filled);
        assigned == should_be_assigned
    }
}

/// A pending leg transfer in progress for a `CallSession`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingTransfer {
    pub target_phone: String,
    pub caller_phone: String,
}

/// Per-call FSM snapshot. Exclusively owned by the FSM while a session is
/// active, enforced by the store's per-key critical section rather than the
/// type system — only the one task handling a given session's socket ever
/// mutates its entry at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallSession {
    pub id: SessionId,
    pub root_id: SessionId,
    pub direction: CallDirection,
    pub caller_phone: String,
    pub phase: Phase,
    pub attempts: HashMap<String, u32>,
    pub last_input_token: Option<String>,
    /// Directives emitted by the most recent `advance` call keyed by that
    /// call's token, so a retried delivery of the same token can be replayed
    /// verbatim without re-running any side effect ( at-most-once).
    pub last_directives: Vec<Directive>,
    /// Scratch buffer for an in-progress DTMF gather (PIN entry, digit
    /// selection). Cleared whenever a gather is satisfied or abandoned.
    pub dtmf_buffer: String,
    pub worker: Option<Worker>,
    pub provider: Option<Provider>,
    pub available_providers: Option<Vec<ProviderSummary>>,
    /// Future scheduled shifts fetched for the current worker/provider,
    /// cached across pagination so `shift_list` doesn't re-query the
    /// catalog on every navigation digit.
    pub available_shifts: Option<Vec<ShiftOccurrence>>,
    pub shift_list_page: usize,
    pub selected_shift: Option<ShiftOccurrence>,
    pub pending_transfer: Option<PendingTransfer>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CallSession {
    pub fn new(id: SessionId, direction: CallDirection, caller_phone: String, now: DateTime<Utc>) -> Self {
        Self {
            root_id: id.clone(),
            id,
            direction,
            caller_phone,
            phase: Phase::PhoneAuth,
            attempts: HashMap::new(),
            last_input_token: None,
            last_directives: Vec::new(),
            dtmf_buffer: String::new(),
            worker: None,
            provider: None,
            available_providers: None,
            available_shifts: None,
            shift_list_page: 0,
            selected_shift: None,
            pending_transfer: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Attempt counter for a phase name: resets on phase entry.
    pub fn attempts_for(&self, phase: Phase) -> u32 {
        self.attempts.get(phase_key(phase)).copied().unwrap_or(0)
    }

    pub fn increment_attempts(&mut self, phase: Phase) {
        let counter = self.attempts.entry(phase_key(phase).to_string()).or_insert(0);
        *counter += 1;
    }

    pub fn reset_attempts(&mut self, phase: Phase) {
        self.attempts.insert(phase_key(phase).to_string(), 0);
    }

    /// Invariant: if phase is at or past `shift_options`, a shift must be
    /// selected.
    pub fn invariant_holds(&self) -> bool {
        let past_shift_options = matches!(
            self.phase,
            Phase::ShiftOptions
                | Phase::CollectReason
                | Phase::ConfirmRelease
                | Phase::RepresentativeTransfer
                | Phase::WorkflowComplete
        );
        !past_shift_options || self.selected_shift.is_some()
    }
}

fn phase_key(phase: Phase) -> &'static str {
    match phase {
        Phase::PhoneAuth => "phone_auth",
        Phase::PinAuth => "pin_auth",
        Phase::ProviderSelection => "provider_selection",
        Phase::ShiftList => "shift_list",
        Phase::ShiftOptions => "shift_options",
        Phase::CollectReason => "collect_reason",
        Phase::ConfirmRelease => "confirm_release",
        Phase::RepresentativeTransfer => "representative_transfer",
        Phase::WorkflowComplete => "workflow_complete",
        Phase::Done => "done",
        Phase::Error => "error",
    }
}

/// Current phase of the cascade as a whole
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CascadePhase {
    TextWave(u8),
    VoiceCalls,
    Terminal,
}

/// Persisted plan for one shift's notification cascade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CascadePlan {
    pub shift_id: ShiftId,
    pub pool: Vec<WorkerId>,
    /// Minutes from release for each text wave
    pub wave_schedule_minutes: Vec<u32>,
    pub max_voice_rounds: u32,
    pub current_phase: CascadePhase,
    /// Job handles that have been scheduled but superseded, so a
    /// late-firing handler can recognize itself as cancelled.
    pub cancellations: Vec<String>,
    pub release_attempt_id: String,
}

/// A durably recorded call asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingAsset {
    pub call_id: SessionId,
    /// Carried from the session snapshot at hangup time so the pipeline can
    /// derive the object-store key (`<prefix>/<providerId>/<workerId>/<callId>`)
    /// without the `CallSession` itself still being around to ask.
    pub provider_id: Option<ProviderId>,
    pub worker_id: Option<WorkerId>,
    pub telephony_url: Option<String>,
    pub object_store_url: Option<String>,
    pub size_bytes: Option<u64>,
}

impl RecordingAsset {
/// Invariant from: exactly one of the two URLs is recorded.
    pub fn invariant_holds(&self) -> bool {
        self.telephony_url.is_some() ^ self.object_store_url.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shift_invariant_rejects_open_with_assignee() {
        let shift = ShiftOccurrence {
            id: ShiftId("sh1".into()),
            template_id: None,
            provider_id: ProviderId("p1".into()),
            assigned_worker_id: Some(WorkerId("w1".into())),
            patient_display: "Oliver S.".into(),
            scheduled_at: Utc::now(),
            scheduled_at_local_display: "Feb 1 4:30PM".into(),
            status: ShiftStatus::Open,
        };
        assert!(!shift.invariant_holds());
    }

    #[test]
    fn recording_invariant_rejects_both_missing() {
        let asset = RecordingAsset {
            call_id: SessionId("c1".into()),
            provider_id: None,
            worker_id: None,
            telephony_url: None,
            object_store_url: None,
            size_bytes: None,
        };
        assert!(!asset.invariant_holds());
    }

    #[test]
    fn session_attempts_reset_independently_per_phase() {
        let mut session = CallSession::new(
            SessionId("s1".into()),
            CallDirection::Inbound,
            "+15551234567".into(),
            Utc::now(),
        );
        session.increment_attempts(Phase::PinAuth);
        session.increment_attempts(Phase::PinAuth);
        assert_eq!(session.attempts_for(Phase::PinAuth), 2);
        assert_eq!(session.attempts_for(Phase::ShiftList), 0);
        session.reset_attempts(Phase::PinAuth);
        assert_eq!(session.attempts_for(Phase::PinAuth), 0);
    }
}
