//! Outbound voice-offer dialing contract.
//!
//! The telephony adapter implements this trait; the cascade crate only
//! depends on the trait so it never needs a dependency on the telephony
//! crate (which in turn depends on `shiftcall-cascade`'s `CascadeCoordinator`
//! to know when a shift has been filled).

use async_trait::async_trait;
use shiftcall_core::prelude::*;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferOutcome {
    Accepted,
    Declined,
    NoAnswer,
}

/// One pre-synthesized offer script for a specific worker/shift pairing.
///
/// §4.4's voice-offer algorithm also names a `suburb` templating field;
/// neither `ShiftOccurrence` nor `Provider` carries a location/suburb
/// attribute in this system's data model ( §3), so there is nothing to
/// fold in here — it's omitted rather than faked.
#[derive(Debug, Clone)]
pub struct OfferScript {
    pub worker_first_name: String,
    pub patient_first_initial: String,
    pub date_display: String,
    pub time_display: String,
}

#[async_trait]
pub trait VoiceOfferDialer: Send + Sync {
    /// Places an outbound call to `worker`, plays the offer, and gathers a
    /// single DTMF digit within `timeout` of answer. Busy, error, and
    /// no-answer all fold into `NoAnswer` so the cascade simply moves on to
    /// the next worker.
    async fn place_offer(
        &self,
        worker: &Worker,
        script: &OfferScript,
        timeout: Duration,
    ) -> Result<OfferOutcome>;
}
