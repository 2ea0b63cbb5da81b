//! Thin client for the carrier's own control-plane REST API — the
//! out-of-scope external collaborator names. Two contracts only:
//! the one-shot caller-phone fetch and live-call document
//! updates for a leg that's already connected to our media
//! stream.

use async_trait::async_trait;
use shiftcall_core::prelude::*;

#[async_trait]
pub trait CarrierControlClient: Send + Sync {
    /// If the caller phone wasn't available as a side channel, performs a
    /// one-shot fetch against the carrier control API to obtain it.
    async fn fetch_caller_phone(&self, call_sid: &str) -> Result<String>;

    /// Pushes a rendered control document (transfer/hangup) to the
    /// carrier's call-update endpoint for an in-progress call leg.
    async fn update_call(&self, call_sid: &str, document: &str) -> Result<()>;

    /// Places a brand-new outbound call for a voice-offer
    /// round. `twiml` is played/gathered on answer; `status_callback`
    /// receives the carrier's terminal call-status postback so a timed-out
    /// or never-answered call resolves instead of hanging the offer forever.
    async fn create_call(&self, to_e164: &str, twiml: &str, status_callback: &str) -> Result<String>;
}

pub struct HttpCarrierControlClient {
    http: reqwest::Client,
    base_url: String,
    account_sid: String,
    auth_token: String,
    voice_from_number: String,
}

impl HttpCarrierControlClient {
    pub fn new(base_url: String, account_sid: String, auth_token: String, voice_from_number: String) -> Self {
        Self { http: reqwest::Client::new(), base_url, account_sid, auth_token, voice_from_number }
    }
}

#[async_trait]
impl CarrierControlClient for HttpCarrierControlClient {
    async fn fetch_caller_phone(&self, call_sid: &str) -> Result<String> {
        #[derive(serde::Deserialize)]
        struct CallResource {
            from: String,
        }
        let resp = self
            .http
            .get(format!("{}/Accounts/{}/Calls/{call_sid}.json", self.base_url.trim_end_matches('/'), self.account_sid))
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .send()
            .await
            .map_err(|e| OrchestratorError::transient(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(OrchestratorError::transient(format!("carrier call lookup returned {}", resp.status())));
        }
        let call: CallResource =
            resp.json().await.map_err(|e| OrchestratorError::transient(format!("decoding call resource: {e}")))?;
        Ok(call.from)
    }

    async fn update_call(&self, call_sid: &str, document: &str) -> Result<()> {
        let resp = self
            .http
            .post(format!("{}/Accounts/{}/Calls/{call_sid}.json", self.base_url.trim_end_matches('/'), self.account_sid))
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("Twiml", document)])
            .send()
            .await
            .map_err(|e| OrchestratorError::transient(e.to_string()))?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(OrchestratorError::transient(format!("carrier call update returned {}", resp.status())))
        }
    }

    async fn create_call(&self, to_e164: &str, twiml: &str, status_callback: &str) -> Result<String> {
        #[derive(serde::Deserialize)]
        struct CallResource {
            sid: String,
        }
        let resp = self
            .http
            .post(format!("{}/Accounts/{}/Calls.json", self.base_url.trim_end_matches('/'), self.account_sid))
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[
                ("To", to_e164),
                ("From", self.voice_from_number.as_str()),
                ("Twiml", twiml),
                ("StatusCallback", status_callback),
            ])
            .send()
            .await
            .map_err(|e| OrchestratorError::transient(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(OrchestratorError::transient(format!("carrier create-call returned {}", resp.status())));
        }
        let call: CallResource =
            resp.json().await.map_err(|e| OrchestratorError::transient(format!("decoding call resource: {e}")))?;
        Ok(call.sid)
    }
}
