//! Persistence for `CascadePlan`, exclusively owned by the cascade
//! coordinator. Unlike `CallSession` there's no cross-writer contention to
//! guard against, so no CAS is needed here — just durable save/load/delete.

use async_trait::async_trait;
use shiftcall_core::prelude::*;

#[async_trait]
pub trait CascadePlanStore: Send + Sync {
    async fn load(&self, shift_id: &ShiftId) -> Result<Option<CascadePlan>>;
    async fn save(&self, plan: &CascadePlan) -> Result<()>;
    async fn delete(&self, shift_id: &ShiftId) -> Result<()>;
}

fn plan_key(shift_id: &ShiftId) -> String {
    format!("shiftcall:cascade-plan:{shift_id}")
}

pub struct RedisCascadePlanStore {
    client: redis::Client,
}

impl RedisCascadePlanStore {
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
impl CascadePlanStore for RedisCascadePlanStore {
    async fn load(&self, shift_id: &ShiftId) -> Result<Option<CascadePlan>> {
        use redis::AsyncCommands;
        let mut conn = self.connection().await?;
        let raw: Option<String> = conn
            .get(plan_key(shift_id))
            .await
            .map_err(|e| OrchestratorError::transient(format!("redis get: {e}")))?;
        raw.map(|s| {
            serde_json::from_str(&s).map_err(|e| OrchestratorError::fatal(format!("corrupt plan row: {e}")))
        })
        .transpose()
    }

    async fn save(&self, plan: &CascadePlan) -> Result<()> {
        use redis::AsyncCommands;
        let mut conn = self.connection().await?;
        let body = serde_json::to_string(plan)
            .map_err(|e| OrchestratorError::fatal(format!("encoding plan: {e}")))?;
        conn.set::<_, _, ()>(plan_key(&plan.shift_id), body)
            .await
            .map_err(|e| OrchestratorError::transient(format!("redis set: {e}")))
    }

    async fn delete(&self, shift_id: &ShiftId) -> Result<()> {
        use redis::AsyncCommands;
        let mut conn = self.connection().await?;
        conn.del::<_, ()>(plan_key(shift_id))
            .await
            .map_err(|e| OrchestratorError::transient(format!("redis del: {e}")))
    }
}

#[derive(Default)]
pub struct InMemoryCascadePlanStore {
    plans: parking_lot::Mutex<std::collections::HashMap<String, CascadePlan>>,
}

impl InMemoryCascadePlanStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CascadePlanStore for InMemoryCascadePlanStore {
    async fn load(&self, shift_id: &ShiftId) -> Result<Option<CascadePlan>> {
        Ok(self.plans.lock().get(&plan_key(shift_id)).cloned())
    }

    async fn save(&self, plan: &CascadePlan) -> Result<()> {
        self.plans.lock().insert(plan_key(&plan.shift_id), plan.clone());
        Ok(())
    }

    async fn delete(&self, shift_id: &ShiftId) -> Result<()> {
        self.plans.lock().remove(&plan_key(shift_id));
        Ok(())
    }
}
