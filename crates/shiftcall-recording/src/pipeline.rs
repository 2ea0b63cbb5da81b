//! The recording pipeline proper
//!
//! Two entry points, fed by the telephony adapter:
//! - `record_call_context` (via `RecordingContextSink`), called once a
//!   session reaches a terminal phase, while `providerId`/`workerId` are
//!   still known.
//! - `on_recording_completed` (via `RecordingStatusSink`), called once the
//!   carrier's recording-status webhook reports the asset finished
//!   processing on its side.
//!
//! Transfer logic: wait `finalize_grace_period`, download the carrier-hosted
//! asset, upload it to `<prefix>/<providerId>/<workerId>/<rootCallId>/recording.wav`
//! with server-side encryption. On success, record the presigned
//! object-store URL and drop the carrier-hosted one. On failure, record the
//! carrier-hosted URL and leave the carrier's copy alone —
//! explicit fallback, never leave a call un-recorded just because the
//! transfer failed.

use async_trait::async_trait;
use shiftcall_core::prelude::*;
use shiftcall_telephony::webhook::{RecordingStatusEvent, RecordingStatusSink};
use shiftcall_telephony::recording_hook::{RecordingCallContext, RecordingContextSink};
use std::sync::Arc;
use tracing::{info, warn};

use crate::object_store::ObjectStoreClient;
use crate::store::RecordingAssetStore;

pub struct RecordingPipeline {
    pub assets: Arc<dyn RecordingAssetStore>,
    pub object_store: Arc<dyn ObjectStoreClient>,
    pub http: reqwest::Client,
    pub config: RecordingConfig,
}

impl RecordingPipeline {
    fn object_key(&self, context: &RecordingAsset) -> String {
        let provider = context.provider_id.as_ref().map(|p| p.0.as_str()).unwrap_or("unknown-provider");
        let worker = context.worker_id.as_ref().map(|w| w.0.as_str()).unwrap_or("unknown-worker");
        format!("{}/{}/{}/{}/recording.wav", self.config.key_prefix, provider, worker, context.call_id)
    }

    async fn transfer(&self, mut asset: RecordingAsset, telephony_url: String) -> Result<RecordingAsset> {
        tokio::time::sleep(self.config.finalize_grace_period).await;

        let download = self
            .http
            .get(&telephony_url)
            .send()
            .await
            .and_then(|r| r.error_for_status());
        let bytes = match download {
            Ok(resp) => resp.bytes().await.ok().map(|b| b.to_vec()),
            Err(e) => {
                warn!(call_id = %asset.call_id, error = %e, "recording download failed, falling back to carrier-hosted url");
                None
            }
        };

        let Some(bytes) = bytes else {
            asset.telephony_url = Some(telephony_url);
            asset.object_store_url = None;
            return Ok(asset);
        };

        let key = self.object_key(&asset);
        let size_bytes = bytes.len() as u64;
        match self.object_store.put_object(&self.config.bucket, &key, bytes).await {
            Ok(()) => match self
                .object_store
                .presigned_get_url(&self.config.bucket, &key, self.config.presigned_url_validity)
                .await
            {
                Ok(url) => {
                    asset.object_store_url = Some(url);
                    asset.telephony_url = None;
                    asset.size_bytes = Some(size_bytes);
                }
                Err(e) => {
                    warn!(call_id = %asset.call_id, error = %e, "presign failed, keeping carrier-hosted url");
                    asset.telephony_url = Some(telephony_url);
                    asset.object_store_url = None;
                }
            },
            Err(e) => {
                warn!(call_id = %asset.call_id, error = %e, "object-store upload failed, keeping carrier-hosted url");
                asset.telephony_url = Some(telephony_url);
                asset.object_store_url = None;
            }
        }
        Ok(asset)
    }
}

#[async_trait]
impl RecordingContextSink for RecordingPipeline {
    async fn record_call_context(&self, context: RecordingCallContext) -> Result<()> {
        let asset = RecordingAsset {
            call_id: context.call_id,
            provider_id: context.provider_id,
            worker_id: context.worker_id,
            telephony_url: None,
            object_store_url: None,
            size_bytes: None,
        };
        self.assets.save(&asset).await
    }
}

#[async_trait]
impl RecordingStatusSink for RecordingPipeline {
    async fn on_recording_completed(&self, event: RecordingStatusEvent) -> Result<()> {
        let call_id = SessionId(event.call_sid.clone());
        let context = self.assets.load(&call_id).await?.unwrap_or(RecordingAsset {
            call_id: call_id.clone(),
            provider_id: None,
            worker_id: None,
            telephony_url: None,
            object_store_url: None,
            size_bytes: None,
        });

        let finalized = self.transfer(context, event.telephony_url).await?;
        debug_assert!(finalized.invariant_holds());
        info!(call_id = %call_id, recording_sid = %event.recording_sid, transferred = finalized.object_store_url.is_some(), "recording finalized");
        self.assets.save(&finalized).await
    }
}
