//! Narrow seam between the telephony adapter and the recording pipeline,
//! Kept here (rather than a dependency on `shiftcall-recording`)
//! so the adapter never needs to know how a recording asset is eventually
//! transferred to object storage — only that it happened.

use async_trait::async_trait;
use shiftcall_core::prelude::*;

/// Call-identifying context the recording pipeline needs to derive the
/// object-store key once the carrier's recording-status webhook fires, long
/// after the `CallSession` itself has been deleted from the store.
#[derive(Debug, Clone)]
pub struct RecordingCallContext {
    pub call_id: SessionId,
    pub provider_id: Option<ProviderId>,
    pub worker_id: Option<WorkerId>,
}

#[async_trait]
pub trait RecordingContextSink: Send + Sync {
    async fn record_call_context(&self, context: RecordingCallContext) -> Result<()>;
}
