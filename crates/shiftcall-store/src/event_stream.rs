//! Append-only per-provider event stream
//!
//! Keyed `call-events:<providerId>:<yyyy-mm-dd>`, TTL ~25h so a day's worth
//! of history outlives the day boundary for late-arriving readers without
//! growing unbounded.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use shiftcall_core::prelude::*;
use std::time::Duration as StdDuration;

/// Domain events emitted across the call lifecycle and the cascade,
///
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum CallEvent {
    CallStarted { session_id: SessionId, caller_phone: String },
    CallAuthenticated { session_id: SessionId, worker_id: WorkerId },
    AuthenticationFailed { session_id: SessionId },
    ShiftOpened { shift_id: ShiftId },
    StaffNotified { shift_id: ShiftId, wave: u8, count: usize },
    CallTransferred { session_id: SessionId, target_phone: String },
    CallEnded { session_id: SessionId, duration_secs: u64, reason: Option<String> },
    ShiftAccepted { shift_id: ShiftId, worker_id: WorkerId },
    ShiftUnfilled { shift_id: ShiftId, reason: UnfilledReason },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnfilledReason {
    AfterText,
    AfterCalls,
}

const STREAM_TTL_SECS: u64 = 25 * 3600;

fn stream_key(provider_id: &ProviderId, day: NaiveDate) -> String {
    format!("call-events:{provider_id}:{}", day.format("%Y-%m-%d"))
}

#[async_trait]
pub trait EventStream: Send + Sync {
    /// Appends `event` and returns the stream-assigned id, monotonically
    /// increasing per (provider, day) —
    async fn append(&self, provider_id: &ProviderId, at: DateTime<Utc>, event: CallEvent) -> Result<String>;

    async fn range(&self, provider_id: &ProviderId, day: NaiveDate) -> Result<Vec<(String, CallEvent)>>;
}

pub struct RedisEventStream {
    client: redis::Client,
}

impl RedisEventStream {
    pub fn new(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| OrchestratorError::config(format!("invalid redis url: {e}")))?;
        Ok(Self { client })
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| OrchestratorError::transient(format!("redis connect: {e}")))
    }
}

#[async_trait]
impl EventStream for RedisEventStream {
    async fn append(&self, provider_id: &ProviderId, at: DateTime<Utc>, event: CallEvent) -> Result<String> {
        use redis::AsyncCommands;
        let mut conn = self.connection().await?;
        let key = stream_key(provider_id, at.date_naive());
        let payload = serde_json::to_string(&event)
            .map_err(|e| OrchestratorError::fatal(format!("encoding event: {e}")))?;
        let id: String = conn
            .xadd(&key, "*", &[("data", payload.as_str())])
            .await
            .map_err(|e| OrchestratorError::transient(format!("redis xadd: {e}")))?;
        let _: () = conn
            .expire(&key, STREAM_TTL_SECS as i64)
            .await
            .map_err(|e| OrchestratorError::transient(format!("redis expire: {e}")))?;
        Ok(id)
    }

    async fn range(&self, provider_id: &ProviderId, day: NaiveDate) -> Result<Vec<(String, CallEvent)>> {
        let mut conn = self.connection().await?;
        let key = stream_key(provider_id, day);
        let raw: Vec<(String, Vec<(String, String)>)> = redis::cmd("XRANGE")
            .arg(&key)
            .arg("-")
            .arg("+")
            .query_async(&mut conn)
            .await
            .map_err(|e| OrchestratorError::transient(format!("redis xrange: {e}")))?;
        raw.into_iter()
            .map(|(id, fields)| {
                let data = fields
                    .into_iter()
                    .find(|(k, _)| k == "data")
                    .map(|(_, v)| v)
                    .ok_or_else(|| OrchestratorError::fatal("stream entry missing data field"))?;
                let event = serde_json::from_str(&data)
                    .map_err(|e| OrchestratorError::fatal(format!("corrupt stream entry: {e}")))?;
                Ok((id, event))
            })
            .collect()
    }
}

/// In-memory `EventStream`, ids synthesized as `<millis>-<seq>` to mimic
/// Redis's own id shape closely enough for tests and diagnostics.
pub struct InMemoryEventStream {
    streams: parking_lot::Mutex<std::collections::HashMap<String, Vec<(String, CallEvent)>>>,
}

impl InMemoryEventStream {
    pub fn new() -> Self {
        Self { streams: parking_lot::Mutex::new(std::collections::HashMap::new()) }
    }
}

impl Default for InMemoryEventStream {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventStream for InMemoryEventStream {
    async fn append(&self, provider_id: &ProviderId, at: DateTime<Utc>, event: CallEvent) -> Result<String> {
        let key = stream_key(provider_id, at.date_naive());
        let mut streams = self.streams.lock();
        let entries = streams.entry(key).or_default();
        let id = format!("{}-{}", at.timestamp_millis(), entries.len());
        entries.push((id.clone(), event));
        Ok(id)
    }

    async fn range(&self, provider_id: &ProviderId, day: NaiveDate) -> Result<Vec<(String, CallEvent)>> {
        let key = stream_key(provider_id, day);
        Ok(self.streams.lock().get(&key).cloned().unwrap_or_default())
    }
}

#[allow(dead_code)]
fn ttl_hint() -> StdDuration {
    StdDuration::from_secs(STREAM_TTL_SECS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test]
    async fn ids_are_strictly_increasing_per_provider_day() {
        let stream = InMemoryEventStream::new();
        let provider = ProviderId("p1".into());
        let at = Utc.with_ymd_and_hms(2026, 2, 1, 10, 0, 0).unwrap();
        let id1 = stream
            .append(&provider, at, CallEvent::CallStarted { session_id: SessionId("c1".into()), caller_phone: "+61412345678".into() })
            .await
            .unwrap();
        let id2 = stream
            .append(&provider, at, CallEvent::CallAuthenticated { session_id: SessionId("c1".into()), worker_id: WorkerId("w1".into()) })
            .await
            .unwrap();
        let entries = stream.range(&provider, at.date_naive()).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert!(id1 < id2);
    }

    #[tokio::test]
    async fn stream_is_scoped_per_provider_and_day() {
        let stream = InMemoryEventStream::new();
        let p1 = ProviderId("p1".into());
        let p2 = ProviderId("p2".into());
        let at = Utc.with_ymd_and_hms(2026, 2, 1, 10, 0, 0).unwrap();
        stream
            .append(&p1, at, CallEvent::ShiftOpened { shift_id: ShiftId("sh1".into()) })
            .await
            .unwrap();
        let p2_entries = stream.range(&p2, at.date_naive()).await.unwrap();
        assert!(p2_entries.is_empty());
    }
}
