//! Text-message gateway client, `{from, to, body, serviceId}` in,
//! `messageSid` or a non-retriable failure out.

use async_trait::async_trait;
use shiftcall_core::prelude::*;

#[derive(Debug, Clone)]
pub struct OutboundText {
    pub to_e164: String,
    pub body: String,
}

#[async_trait]
pub trait MessageGatewayClient: Send + Sync {
    async fn send(&self, text: OutboundText) -> Result<String>;
}

pub struct HttpMessageGatewayClient {
    http: reqwest::Client,
    base_url: String,
    from_number: String,
    service_id: String,
    api_key: String,
}

impl HttpMessageGatewayClient {
    pub fn new(base_url: String, from_number: String, service_id: String, api_key: String) -> Self {
        Self { http: reqwest::Client::new(), base_url, from_number, service_id, api_key }
    }
}

#[derive(serde::Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    to: &'a str,
    body: &'a str,
    service_id: &'a str,
}

#[derive(serde::Deserialize)]
struct SendResponse {
    message_sid: String,
}

#[async_trait]
impl MessageGatewayClient for HttpMessageGatewayClient {
    async fn send(&self, text: OutboundText) -> Result<String> {
        let resp = self
            .http
            .post(format!("{}/messages", self.base_url.trim_end_matches('/')))
            .bearer_auth(&self.api_key)
            .json(&SendRequest {
                from: &self.from_number,
                to: &text.to_e164,
                body: &text.body,
                service_id: &self.service_id,
            })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    OrchestratorError::transient(e.to_string())
                } else {
                    OrchestratorError::permanent(e.to_string())
                }
            })?;

        let status = resp.status();
        if status.is_server_error() || status.as_u16() == 429 {
            return Err(OrchestratorError::transient(format!("message gateway returned {status}")));
        }
        if !status.is_success() {
            return Err(OrchestratorError::permanent(format!("message gateway returned {status}")));
        }
        let body: SendResponse = resp
            .json()
            .await
            .map_err(|e| OrchestratorError::transient(format!("decoding gateway response: {e}")))?;
        Ok(body.message_sid)
    }
}
