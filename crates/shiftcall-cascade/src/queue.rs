//! Persistent, time-delayed, idempotently-deletable job handles

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shiftcall_core::prelude::*;

/// A stable handle for one scheduled cascade job. Carries the idempotency
/// key `(shiftId, attemptId)` requires for safe re-delivery.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobHandle {
    pub shift_id: ShiftId,
    pub attempt_id: String,
}

impl JobHandle {
    pub fn new(shift_id: ShiftId, attempt_id: impl Into<String>) -> Self {
        Self { shift_id, attempt_id: attempt_id.into() }
    }

    fn storage_key(&self) -> String {
        format!("{}:{}", self.shift_id, self.attempt_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JobKind {
    TextWave { wave: u8 },
    VoiceOfferRound { round: u32 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub handle: JobHandle,
    pub kind: JobKind,
    pub run_at: DateTime<Utc>,
}

#[async_trait]
pub trait CascadeQueue: Send + Sync {
    async fn enqueue(&self, job: ScheduledJob) -> Result<()>;

    /// Deletes a pending job so a late firing recognizes cancellation,
    /// cancellation semantics. Idempotent: deleting twice, or
    /// deleting a handle that already fired, is not an error.
    async fn cancel(&self, handle: &JobHandle) -> Result<()>;

    async fn is_cancelled(&self, handle: &JobHandle) -> Result<bool>;

    /// Atomically pops every job whose `run_at` is `<= now`.
    async fn take_due(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledJob>>;
}

const DUE_SCRIPT: &str = r#"
local due = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1])
if #due > 0 then
  redis.call('ZREM', KEYS[1], unpack(due))
end
return due
"#;

pub struct RedisCascadeQueue {
    client: redis::Client,
    queue_key: String,
    cancelled_key: String,
}

impl RedisCascadeQueue {
    pub fn new(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| OrchestratorError::config(format!("invalid redis url: {e}")))?;
        Ok(Self {
            client,
            queue_key: "cascade:queue".to_string(),
            cancelled_key: "cascade:cancelled".to_string(),
        })
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| OrchestratorError::transient(format!("redis connect: {e}")))
    }
}

#[async_trait]
impl CascadeQueue for RedisCascadeQueue {
    async fn enqueue(&self, job: ScheduledJob) -> Result<()> {
        use redis::AsyncCommands;
        let mut conn = self.connection().await?;
        let score = job.run_at.timestamp_millis() as f64;
        let body = serde_json::to_string(&job)
            .map_err(|e| OrchestratorError::fatal(format!("encoding job: {e}")))?;
        conn.zadd::<_, _, _, ()>(&self.queue_key, body, score)
            .await
            .map_err(|e| OrchestratorError::transient(format!("redis zadd: {e}")))
    }

    async fn cancel(&self, handle: &JobHandle) -> Result<()> {
        use redis::AsyncCommands;
        let mut conn = self.connection().await?;
        conn.sadd::<_, _, ()>(&self.cancelled_key, handle.storage_key())
            .await
            .map_err(|e| OrchestratorError::transient(format!("redis sadd: {e}")))
    }

    async fn is_cancelled(&self, handle: &JobHandle) -> Result<bool> {
        use redis::AsyncCommands;
        let mut conn = self.connection().await?;
        conn.sismember(&self.cancelled_key, handle.storage_key())
            .await
            .map_err(|e| OrchestratorError::transient(format!("redis sismember: {e}")))
    }

    async fn take_due(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledJob>> {
        let mut conn = self.connection().await?;
        let script = redis::Script::new(DUE_SCRIPT);
        let raw: Vec<String> = script
            .key(&self.queue_key)
            .arg(now.timestamp_millis())
            .invoke_async(&mut conn)
            .await
            .map_err(|e| OrchestratorError::transient(format!("redis due script: {e}")))?;
        raw.into_iter()
            .map(|s| {
                serde_json::from_str(&s).map_err(|e| OrchestratorError::fatal(format!("corrupt job row: {e}")))
            })
            .collect()
    }
}

/// In-memory `CascadeQueue` for tests and single-process diagnostics.
#[derive(Default)]
pub struct InMemoryCascadeQueue {
    pending: parking_lot::Mutex<Vec<ScheduledJob>>,
    cancelled: parking_lot::Mutex<std::collections::HashSet<String>>,
}

impl InMemoryCascadeQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CascadeQueue for InMemoryCascadeQueue {
    async fn enqueue(&self, job: ScheduledJob) -> Result<()> {
        self.pending.lock().push(job);
        Ok(())
    }

    async fn cancel(&self, handle: &JobHandle) -> Result<()> {
        self.cancelled.lock().insert(handle.storage_key());
        self.pending.lock().retain(|j| j.handle != *handle);
        Ok(())
    }

    async fn is_cancelled(&self, handle: &JobHandle) -> Result<bool> {
        Ok(self.cancelled.lock().contains(&handle.storage_key()))
    }

    async fn take_due(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledJob>> {
        let mut pending = self.pending.lock();
        let (due, not_due): (Vec<_>, Vec<_>) = pending.drain(..).partition(|j| j.run_at <= now);
        *pending = not_due;
        Ok(due)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn take_due_returns_only_jobs_at_or_before_now() {
        let queue = InMemoryCascadeQueue::new();
        let now = Utc::now();
        let early = ScheduledJob {
            handle: JobHandle::new(ShiftId("sh1".into()), "wave1"),
            kind: JobKind::TextWave { wave: 1 },
            run_at: now - Duration::seconds(1),
        };
        let late = ScheduledJob {
            handle: JobHandle::new(ShiftId("sh1".into()), "wave2"),
            kind: JobKind::TextWave { wave: 2 },
            run_at: now + Duration::minutes(15),
        };
        queue.enqueue(early).await.unwrap();
        queue.enqueue(late).await.unwrap();
        let due = queue.take_due(now).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].handle.attempt_id, "wave1");
    }

    #[tokio::test]
    async fn cancel_removes_pending_job_and_marks_handle() {
        let queue = InMemoryCascadeQueue::new();
        let handle = JobHandle::new(ShiftId("sh1".into()), "wave2");
        queue
            .enqueue(ScheduledJob { handle: handle.clone(), kind: JobKind::TextWave { wave: 2 }, run_at: Utc::now() + Duration::minutes(15) })
            .await
            .unwrap();
        queue.cancel(&handle).await.unwrap();
        assert!(queue.is_cancelled(&handle).await.unwrap());
        let due = queue.take_due(Utc::now() + Duration::hours(1)).await.unwrap();
        assert!(due.is_empty());
    }
}
