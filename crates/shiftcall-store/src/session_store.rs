//! Call-state KV store.
//!
//! `Save` must be safe against lost updates. We use a Redis Lua script for
//! an atomic compare-and-swap on `updatedAt` rather than `WATCH`/`MULTI`,
//! pushing the invariant into the script itself instead of a round-trip.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shiftcall_core::prelude::*;
use std::time::Duration as StdDuration;
use tracing::warn;

#[async_trait]
pub trait SessionKv: Send + Sync {
    async fn load(&self, id: &SessionId) -> Result<Option<CallSession>>;

    /// Unconditional save; always refreshes the TTL. Used for the very
    /// first write of a newly created session.
    async fn save(&self, session: &CallSession) -> Result<()>;

    /// Compare-and-swap: succeeds (returns `true`) only if the stored
    /// session's `updatedAt` still equals `expected_updated_at`, or the key
    /// is absent. Refreshes the TTL on success.
    async fn cas_save(&self, session: &CallSession, expected_updated_at: DateTime<Utc>) -> Result<bool>;

    async fn delete(&self, id: &SessionId) -> Result<()>;
}

fn session_key(id: &SessionId) -> String {
    format!("shiftcall:session:{id}")
}

const CAS_SAVE_SCRIPT: &str = r#"
local current = redis.call('GET', KEYS[1])
if current then
  local ok, decoded = pcall(cjson.decode, current)
  if ok and decoded['updated_at'] ~= ARGV[2] then
    return 0
  end
end
redis.call('SET', KEYS[1], ARGV[1], 'EX', ARGV[3])
return 1
"#;

pub struct RedisSessionKv {
    client: redis::Client,
    ttl: StdDuration,
}

impl RedisSessionKv {
    pub fn new(redis_url: &str, ttl: StdDuration) -> Result<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| OrchestratorError::config(format!("invalid redis url: {e}")))?;
        Ok(Self { client, ttl })
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| OrchestratorError::transient(format!("redis connect: {e}")))
    }
}

#[async_trait]
impl SessionKv for RedisSessionKv {
    async fn load(&self, id: &SessionId) -> Result<Option<CallSession>> {
        use redis::AsyncCommands;
        let mut conn = self.connection().await?;
        let raw: Option<String> = conn
            .get(session_key(id))
            .await
            .map_err(|e| OrchestratorError::transient(format!("redis get: {e}")))?;
        raw.map(|s| {
            serde_json::from_str(&s).map_err(|e| OrchestratorError::fatal(format!("corrupt session row: {e}")))
        })
        .transpose()
    }

    async fn save(&self, session: &CallSession) -> Result<()> {
        use redis::AsyncCommands;
        let mut conn = self.connection().await?;
        let body = serde_json::to_string(session)
            .map_err(|e| OrchestratorError::fatal(format!("encoding session: {e}")))?;
        conn.set_ex::<_, _, ()>(session_key(&session.id), body, self.ttl.as_secs())
            .await
            .map_err(|e| OrchestratorError::transient(format!("redis set: {e}")))
    }

    async fn cas_save(&self, session: &CallSession, expected_updated_at: DateTime<Utc>) -> Result<bool> {
        let mut conn = self.connection().await?;
        let body = serde_json::to_string(session)
            .map_err(|e| OrchestratorError::fatal(format!("encoding session: {e}")))?;
        let expected = expected_updated_at.to_rfc3339();
        let script = redis::Script::new(CAS_SAVE_SCRIPT);
        let result: i64 = script
            .key(session_key(&session.id))
            .arg(body)
            .arg(expected)
            .arg(self.ttl.as_secs())
            .invoke_async(&mut conn)
            .await
            .map_err(|e| OrchestratorError::transient(format!("redis cas script: {e}")))?;
        if result == 0 {
            warn!(session_id = %session.id, "lost update detected on session save, caller must reload and retry");
        }
        Ok(result == 1)
    }

    async fn delete(&self, id: &SessionId) -> Result<()> {
        use redis::AsyncCommands;
        let mut conn = self.connection().await?;
        conn.del::<_, ()>(session_key(id))
            .await
            .map_err(|e| OrchestratorError::transient(format!("redis del: {e}")))
    }
}

/// In-memory `SessionKv` used by tests and by `probe-call-flow`-style
/// diagnostics that shouldn't need a live Redis.
pub struct InMemorySessionKv {
    entries: parking_lot::Mutex<std::collections::HashMap<String, CallSession>>,
}

impl InMemorySessionKv {
    pub fn new() -> Self {
        Self { entries: parking_lot::Mutex::new(std::collections::HashMap::new()) }
    }
}

impl Default for InMemorySessionKv {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionKv for InMemorySessionKv {
    async fn load(&self, id: &SessionId) -> Result<Option<CallSession>> {
        Ok(self.entries.lock().get(&session_key(id)).cloned())
    }

    async fn save(&self, session: &CallSession) -> Result<()> {
        self.entries.lock().insert(session_key(&session.id), session.clone());
        Ok(())
    }

    async fn cas_save(&self, session: &CallSession, expected_updated_at: DateTime<Utc>) -> Result<bool> {
        let mut entries = self.entries.lock();
        let key = session_key(&session.id);
        if let Some(current) = entries.get(&key) {
            if current.updated_at != expected_updated_at {
                return Ok(false);
            }
        }
        entries.insert(key, session.clone());
        Ok(true)
    }

    async fn delete(&self, id: &SessionId) -> Result<()> {
        self.entries.lock().remove(&session_key(id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(now: DateTime<Utc>) -> CallSession {
        CallSession::new(SessionId("s1".into()), CallDirection::Inbound, "+61412345678".into(), now)
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let store = InMemorySessionKv::new();
        let session = sample(Utc::now());
        store.save(&session).await.unwrap();
        let loaded = store.load(&session.id).await.unwrap().unwrap();
        assert_eq!(loaded, session);
    }

    #[tokio::test]
    async fn cas_save_rejects_stale_expected_timestamp() {
        let store = InMemorySessionKv::new();
        let first = sample(Utc::now());
        store.save(&first).await.unwrap();

        let mut second = first.clone();
        second.updated_at = first.updated_at + chrono::Duration::seconds(1);
        let accepted = store.cas_save(&second, first.updated_at).await.unwrap();
        assert!(accepted);

        let mut stale = second.clone();
        stale.updated_at = second.updated_at + chrono::Duration::seconds(1);
        let rejected = store.cas_save(&stale, first.updated_at).await.unwrap();
        assert!(!rejected);
    }

    #[tokio::test]
    async fn delete_removes_entry() {
        let store = InMemorySessionKv::new();
        let session = sample(Utc::now());
        store.save(&session).await.unwrap();
        store.delete(&session.id).await.unwrap();
        assert!(store.load(&session.id).await.unwrap().is_none());
    }
}
