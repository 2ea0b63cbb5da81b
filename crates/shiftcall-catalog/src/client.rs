//! Record-system client contract and HTTP implementation.
//!
//! The record-system is an out-of-scope external collaborator; we
//! only model its contract here — a row-oriented API consumed as KV+query,
//! exactly as describes it.

use async_trait::async_trait;
use shiftcall_core::prelude::*;

/// What the FSM and the cascade coordinator need from the record-system,
/// expressed as a trait so tests can substitute an in-memory fake instead of
/// standing up `wiremock` for every scenario.
#[async_trait]
pub trait CatalogClient: Send + Sync {
    async fn find_worker_by_phone(&self, e164: &str) -> Result<Option<Worker>>;
    async fn find_worker_by_pin(&self, pin: &str) -> Result<Option<Worker>>;
    async fn worker(&self, worker_id: &WorkerId) -> Result<Worker>;
    async fn providers_for_worker(&self, worker_id: &WorkerId) -> Result<Vec<Provider>>;
    async fn provider(&self, provider_id: &ProviderId) -> Result<Provider>;

    /// Future `Scheduled` shifts for a worker at a provider, ascending by
    /// `scheduledAt`, ties broken by id ( pagination ordering).
    async fn future_scheduled_shifts(
        &self,
        worker_id: &WorkerId,
        provider_id: &ProviderId,
    ) -> Result<Vec<ShiftOccurrence>>;

    async fn shift(&self, shift_id: &ShiftId) -> Result<ShiftOccurrence>;

    /// Write-through: flips a shift to `Open`, clears its assignee. Returns
    /// the updated record.
    async fn release_shift(&self, shift_id: &ShiftId) -> Result<ShiftOccurrence>;

    /// Write-through: atomically assigns `worker_id` to `shift_id` provided
    /// the shift is still `Open`; returns `false` if it had already moved on.
    async fn try_fill_shift(&self, shift_id: &ShiftId, worker_id: &WorkerId) -> Result<bool>;

    async fn mark_shift_unfilled_after_text(&self, shift_id: &ShiftId) -> Result<()>;
    async fn mark_shift_unfilled_after_calls(&self, shift_id: &ShiftId) -> Result<()>;

    /// Eligible replacement pool for a released shift step 1:
    /// active workers of the shift's provider with a phone on file,
    /// excluding `excluded_worker_ids`.
    async fn eligible_pool(
        &self,
        provider_id: &ProviderId,
        excluded_worker_ids: &[WorkerId],
    ) -> Result<Vec<Worker>>;
}

/// HTTP-backed `CatalogClient` talking to the record-system's row-oriented
/// API. Thin `reqwest` wrapper, the same idiom used for external HTTP
/// collaborators across the retrieved pack.
pub struct HttpCatalogClient {
    http: reqwest::Client,
    base_url: String,
    base_id: String,
    api_key: String,
}

impl HttpCatalogClient {
    pub fn new(base_url: String, base_id: String, api_key: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            base_id,
            api_key,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}/{}", self.base_url.trim_end_matches('/'), self.base_id, path)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let resp = self
            .http
            .get(self.url(path))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;
        classify_status(&resp)?;
        resp.json::<T>()
            .await
            .map_err(|e| OrchestratorError::transient(format!("decoding response: {e}")))
    }

    async fn patch_json<T: serde::de::DeserializeOwned, B: serde::Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let resp = self
            .http
            .patch(self.url(path))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;
        classify_status(&resp)?;
        resp.json::<T>()
            .await
            .map_err(|e| OrchestratorError::transient(format!("decoding response: {e}")))
    }
}

fn classify_reqwest_error(e: &reqwest::Error) -> OrchestratorError {
    if e.is_timeout() || e.is_connect() {
        OrchestratorError::transient(e.to_string())
    } else {
        OrchestratorError::permanent(e.to_string())
    }
}

fn classify_status(resp: &reqwest::Response) -> Result<()> {
    let status = resp.status();
    if status.is_success() {
        return Ok(());
    }
    if status.as_u16() == 404 {
        return Err(OrchestratorError::not_found(format!("{status}")));
    }
    if status.is_server_error() || status.as_u16() == 429 {
        return Err(OrchestratorError::transient(format!("record-system returned {status}")));
    }
    Err(OrchestratorError::permanent(format!("record-system returned {status}")))
}

#[async_trait]
impl CatalogClient for HttpCatalogClient {
    async fn find_worker_by_phone(&self, e164: &str) -> Result<Option<Worker>> {
        match self
            .get_json::<Worker>(&format!("workers?phone={e164}"))
            .await
        {
            Ok(worker) => Ok(Some(worker)),
            Err(OrchestratorError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn find_worker_by_pin(&self, pin: &str) -> Result<Option<Worker>> {
        match self.get_json::<Worker>(&format!("workers?pin={pin}")).await {
            Ok(worker) => Ok(Some(worker)),
            Err(OrchestratorError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn worker(&self, worker_id: &WorkerId) -> Result<Worker> {
        self.get_json(&format!("workers/{worker_id}")).await
    }

    async fn providers_for_worker(&self, worker_id: &WorkerId) -> Result<Vec<Provider>> {
        self.get_json(&format!("workers/{worker_id}/providers"))
            .await
    }

    async fn provider(&self, provider_id: &ProviderId) -> Result<Provider> {
        self.get_json(&format!("providers/{provider_id}")).await
    }

    async fn future_scheduled_shifts(
        &self,
        worker_id: &WorkerId,
        provider_id: &ProviderId,
    ) -> Result<Vec<ShiftOccurrence>> {
        let mut shifts: Vec<ShiftOccurrence> = self
            .get_json(&format!(
                "shifts?worker={worker_id}&provider={provider_id}&status=Scheduled&future=true"
            ))
            .await?;
        shifts.sort_by(|a, b| a.scheduled_at.cmp(&b.scheduled_at).then_with(|| a.id.0.cmp(&b.id.0)));
        Ok(shifts)
    }

    async fn shift(&self, shift_id: &ShiftId) -> Result<ShiftOccurrence> {
        self.get_json(&format!("shifts/{shift_id}")).await
    }

    async fn release_shift(&self, shift_id: &ShiftId) -> Result<ShiftOccurrence> {
        #[derive(serde::Serialize)]
        struct Patch {
            status: &'static str,
            assigned_worker_id: Option<String>,
        }
        self.patch_json(
            &format!("shifts/{shift_id}"),
            &Patch { status: "Open", assigned_worker_id: None },
        )
        .await
    }

    async fn try_fill_shift(&self, shift_id: &ShiftId, worker_id: &WorkerId) -> Result<bool> {
        #[derive(serde::Serialize)]
        struct Patch<'a> {
            status: &'static str,
            assigned_worker_id: &'a str,
            expected_status: &'static str,
        }
        match self
            .patch_json::<ShiftOccurrence, _>(
                &format!("shifts/{shift_id}"),
                &Patch { status: "Filled", assigned_worker_id: &worker_id.0, expected_status: "Open" },
            )
            .await
        {
            Ok(_) => Ok(true),
            Err(OrchestratorError::PermanentUpstream(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn mark_shift_unfilled_after_text(&self, shift_id: &ShiftId) -> Result<()> {
        #[derive(serde::Serialize)]
        struct Patch {
            status: &'static str,
        }
        let _: ShiftOccurrence = self
            .patch_json(&format!("shifts/{shift_id}"), &Patch { status: "UnfilledAfterText" })
            .await?;
        Ok(())
    }

    async fn mark_shift_unfilled_after_calls(&self, shift_id: &ShiftId) -> Result<()> {
        #[derive(serde::Serialize)]
        struct Patch {
            status: &'static str,
        }
        let _: ShiftOccurrence = self
            .patch_json(&format!("shifts/{shift_id}"), &Patch { status: "UnfilledAfterCalls" })
            .await?;
        Ok(())
    }

    async fn eligible_pool(
        &self,
        provider_id: &ProviderId,
        excluded_worker_ids: &[WorkerId],
    ) -> Result<Vec<Worker>> {
        let all: Vec<Worker> = self
            .get_json(&format!("workers?provider={provider_id}&active=true"))
            .await?;
        Ok(all
            .into_iter()
            .filter(|w| !w.phone.is_empty())
            .filter(|w| !excluded_worker_ids.contains(&w.id))
            .collect())
    }
}
