//! Read-through cache in front of a `CatalogClient`
//!
//! Entries are keyed by `(table, id)`; every read exposes `(value, ageMs)` so
//! callers that are about to write back can enforce the "never use a read
//! older than 5s for a write-back decision" rule themselves — the cache
//! layer just reports the age, it doesn't know which callers need freshness.

use async_trait::async_trait;
use moka::future::Cache;
use shiftcall_core::prelude::*;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::client::CatalogClient;

/// A cached value alongside how long ago it was fetched.
#[derive(Debug, Clone)]
pub struct Aged<T> {
    pub value: T,
    pub age: Duration,
}

impl<T> Aged<T> {
    /// FSM code must not use a read older than 5s for a transition that
    /// writes back.
    pub fn fresh_enough_to_write_back(&self) -> bool {
        self.age <= Duration::from_secs(5)
    }
}

#[derive(Clone)]
struct Entry<T> {
    value: T,
    fetched_at: Instant,
}

/// Decorates any `CatalogClient` with an in-memory TTL cache for the two
/// read-heavy lookups (`provider`, `shift`) that benefit most from caching;
/// writes go straight through and invalidate the relevant cache entry.
pub struct CachedCatalog<C: CatalogClient> {
    inner: Arc<C>,
    providers: Cache<String, Entry<Provider>>,
    shifts: Cache<String, Entry<ShiftOccurrence>>,
}

impl<C: CatalogClient> CachedCatalog<C> {
    pub fn new(inner: Arc<C>, ttl: Duration) -> Self {
        Self {
            inner,
            providers: Cache::builder().time_to_live(ttl).build(),
            shifts: Cache::builder().time_to_live(ttl).build(),
        }
    }

    pub async fn provider_aged(&self, provider_id: &ProviderId) -> Result<Aged<Provider>> {
        if let Some(entry) = self.providers.get(&provider_id.0).await {
            return Ok(Aged { value: entry.value, age: entry.fetched_at.elapsed() });
        }
        let value = self.inner.provider(provider_id).await?;
        self.providers
            .insert(provider_id.0.clone(), Entry { value: value.clone(), fetched_at: Instant::now() })
            .await;
        Ok(Aged { value, age: Duration::ZERO })
    }

    pub async fn shift_aged(&self, shift_id: &ShiftId) -> Result<Aged<ShiftOccurrence>> {
        if let Some(entry) = self.shifts.get(&shift_id.0).await {
            return Ok(Aged { value: entry.value, age: entry.fetched_at.elapsed() });
        }
        let value = self.inner.shift(shift_id).await?;
        self.shifts
            .insert(shift_id.0.clone(), Entry { value: value.clone(), fetched_at: Instant::now() })
            .await;
        Ok(Aged { value, age: Duration::ZERO })
    }

    async fn invalidate_shift(&self, shift_id: &ShiftId) {
        self.shifts.invalidate(&shift_id.0).await;
    }

    pub fn inner(&self) -> &Arc<C> {
        &self.inner
    }
}

#[async_trait]
impl<C: CatalogClient> CatalogClient for CachedCatalog<C> {
    async fn find_worker_by_phone(&self, e164: &str) -> Result<Option<Worker>> {
        self.inner.find_worker_by_phone(e164).await
    }

    async fn find_worker_by_pin(&self, pin: &str) -> Result<Option<Worker>> {
        self.inner.find_worker_by_pin(pin).await
    }

    async fn worker(&self, worker_id: &WorkerId) -> Result<Worker> {
        self.inner.worker(worker_id).await
    }

    async fn providers_for_worker(&self, worker_id: &WorkerId) -> Result<Vec<Provider>> {
        self.inner.providers_for_worker(worker_id).await
    }

    async fn provider(&self, provider_id: &ProviderId) -> Result<Provider> {
        Ok(self.provider_aged(provider_id).await?.value)
    }

    async fn future_scheduled_shifts(
        &self,
        worker_id: &WorkerId,
        provider_id: &ProviderId,
    ) -> Result<Vec<ShiftOccurrence>> {
        self.inner.future_scheduled_shifts(worker_id, provider_id).await
    }

    async fn shift(&self, shift_id: &ShiftId) -> Result<ShiftOccurrence> {
        Ok(self.shift_aged(shift_id).await?.value)
    }

    async fn release_shift(&self, shift_id: &ShiftId) -> Result<ShiftOccurrence> {
        let updated = self.inner.release_shift(shift_id).await?;
        self.invalidate_shift(shift_id).await;
        Ok(updated)
    }

    async fn try_fill_shift(&self, shift_id: &ShiftId, worker_id: &WorkerId) -> Result<bool> {
        let filled = self.inner.try_fill_shift(shift_id, worker_id).await?;
        self.invalidate_shift(shift_id).await;
        Ok(filled)
    }

    async fn mark_shift_unfilled_after_text(&self, shift_id: &ShiftId) -> Result<()> {
        self.inner.mark_shift_unfilled_after_text(shift_id).await?;
        self.invalidate_shift(shift_id).await;
        Ok(())
    }

    async fn mark_shift_unfilled_after_calls(&self, shift_id: &ShiftId) -> Result<()> {
        self.inner.mark_shift_unfilled_after_calls(shift_id).await?;
        self.invalidate_shift(shift_id).await;
        Ok(())
    }

    async fn eligible_pool(
        &self,
        provider_id: &ProviderId,
        excluded_worker_ids: &[WorkerId],
    ) -> Result<Vec<Worker>> {
        self.inner.eligible_pool(provider_id, excluded_worker_ids).await
    }
}
