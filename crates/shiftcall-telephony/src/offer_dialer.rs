//! Concrete `VoiceOfferDialer`: places an outbound call, plays the offer
//! script, and gathers the worker's single-digit accept/decline response.
//!
//! The carrier's REST API only gives us a call sid back from the dial
//! request itself — whether the call was ever answered, and what digit (if
//! any) the worker pressed, arrives later as a separate webhook postback.
//! So `place_offer` registers a oneshot channel keyed by call sid before
//! dialing, then waits on it (bounded by `timeout`) instead of blocking on
//! the HTTP response.

use async_trait::async_trait;
use dashmap::DashMap;
use shiftcall_cascade::{OfferOutcome, OfferScript, VoiceOfferDialer};
use shiftcall_core::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::warn;

use crate::carrier_api::CarrierControlClient;
use crate::carrier_doc;

/// Pending offer calls keyed by the carrier's call sid, each holding the
/// sender half of a channel `place_offer` is blocked receiving on.
#[derive(Clone, Default)]
pub struct PendingOfferRegistry {
    pending: Arc<DashMap<String, oneshot::Sender<OfferOutcome>>>,
}

impl PendingOfferRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&self, call_sid: String) -> oneshot::Receiver<OfferOutcome> {
        let (tx, rx) = oneshot::channel();
        self.pending.insert(call_sid, tx);
        rx
    }

    /// Resolves the pending offer for `call_sid`, if one is still waiting.
    /// Called from the gather-result webhook handler. A second postback for
    /// the same call sid (or one arriving after the wait already timed out
    /// and the entry was removed) is simply dropped.
    pub fn resolve(&self, call_sid: &str, outcome: OfferOutcome) {
        if let Some((_, tx)) = self.pending.remove(call_sid) {
            let _ = tx.send(outcome);
        } else {
            warn!(call_sid, "gather result for an offer call with no pending receiver");
        }
    }
}

pub struct HttpVoiceOfferDialer {
    carrier_control: Arc<dyn CarrierControlClient>,
    pending: PendingOfferRegistry,
    public_base_domain: String,
}

impl HttpVoiceOfferDialer {
    pub fn new(
        carrier_control: Arc<dyn CarrierControlClient>,
        pending: PendingOfferRegistry,
        public_base_domain: String,
    ) -> Self {
        Self { carrier_control, pending, public_base_domain }
    }
}

fn offer_text(script: &OfferScript) -> String {
    format!(
        "Hi {}, a shift is open on {} at {} for patient {}. Press 1 to accept, 2 to decline.",
        script.worker_first_name, script.date_display, script.time_display, script.patient_first_initial
    )
}

#[async_trait]
impl VoiceOfferDialer for HttpVoiceOfferDialer {
    async fn place_offer(&self, worker: &Worker, script: &OfferScript, timeout: Duration) -> Result<OfferOutcome> {
        let gather_action_url = format!("https://{}/webhooks/voice/offer-gather", self.public_base_domain);
        let status_callback = format!("https://{}/webhooks/voice/offer-status", self.public_base_domain);
        let twiml = carrier_doc::render_offer_gather(&offer_text(script), &gather_action_url, timeout.as_secs());

        let call_sid = match self.carrier_control.create_call(&worker.phone, &twiml, &status_callback).await {
            Ok(sid) => sid,
            Err(e) if e.is_retry_safe() => return Err(e),
            Err(_) => return Ok(OfferOutcome::NoAnswer),
        };
        let rx = self.pending.register(call_sid.clone());

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(_)) | Err(_) => {
                self.pending.resolve(&call_sid, OfferOutcome::NoAnswer);
                Ok(OfferOutcome::NoAnswer)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolve_before_timeout_returns_the_posted_outcome() {
        let registry = PendingOfferRegistry::new();
        let rx = registry.register("CA1".to_string());
        registry.resolve("CA1", OfferOutcome::Accepted);
        assert_eq!(rx.await.unwrap(), OfferOutcome::Accepted);
    }

    #[test]
    fn resolve_with_no_pending_receiver_is_a_harmless_no_op() {
        let registry = PendingOfferRegistry::new();
        registry.resolve("CAunknown", OfferOutcome::Declined);
    }

    #[test]
    fn offer_text_includes_worker_name_and_patient_initial() {
        let script = OfferScript {
            worker_first_name: "Dana".to_string(),
            patient_first_initial: "M".to_string(),
            date_display: "Mon Aug 3".to_string(),
            time_display: "2:00 PM".to_string(),
        };
        let text = offer_text(&script);
        assert!(text.contains("Dana"));
        assert!(text.contains("patient M"));
    }
}
