//! Durable home for a call's `RecordingAsset` across the gap between "the
//! session ended" and "the carrier's recording-status webhook fired", spec
//! §4.7. Same durable-save/load/delete shape as
//! `shiftcall_cascade::plan_store` — no CAS needed, only one writer ever
//! touches a given call's row.

use async_trait::async_trait;
use shiftcall_core::prelude::*;

#[async_trait]
pub trait RecordingAssetStore: Send + Sync {
    async fn load(&self, call_id: &SessionId) -> Result<Option<RecordingAsset>>;
    async fn save(&self, asset: &RecordingAsset) -> Result<()>;
    async fn delete(&self, call_id: &SessionId) -> Result<()>;
}

fn asset_key(call_id: &SessionId) -> String {
    format!("shiftcall:recording:{call_id}")
}

pub struct RedisRecordingAssetStore {
    client: redis::Client,
}

impl RedisRecordingAssetStore {
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
impl RecordingAssetStore for RedisRecordingAssetStore {
    async fn load(&self, call_id: &SessionId) -> Result<Option<RecordingAsset>> {
        use redis::AsyncCommands;
        let mut conn = self.connection().await?;
        let raw: Option<String> = conn
            .get(asset_key(call_id))
            .await
            .map_err(|e| OrchestratorError::transient(format!("redis get: {e}")))?;
        raw.map(|s| {
            serde_json::from_str(&s).map_err(|e| OrchestratorError::fatal(format!("corrupt recording row: {e}")))
        })
        .transpose()
    }

    async fn save(&self, asset: &RecordingAsset) -> Result<()> {
        use redis::AsyncCommands;
        let mut conn = self.connection().await?;
        let body = serde_json::to_string(asset)
            .map_err(|e| OrchestratorError::fatal(format!("encoding recording asset: {e}")))?;
        conn.set::<_, _, ()>(asset_key(&asset.call_id), body)
            .await
            .map_err(|e| OrchestratorError::transient(format!("redis set: {e}")))
    }

    async fn delete(&self, call_id: &SessionId) -> Result<()> {
        use redis::AsyncCommands;
        let mut conn = self.connection().await?;
        conn.del::<_, ()>(asset_key(call_id))
            .await
            .map_err(|e| OrchestratorError::transient(format!("redis del: {e}")))
    }
}

#[derive(Default)]
pub struct InMemoryRecordingAssetStore {
    assets: parking_lot::Mutex<std::collections::HashMap<String, RecordingAsset>>,
}

impl InMemoryRecordingAssetStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordingAssetStore for InMemoryRecordingAssetStore {
    async fn load(&self, call_id: &SessionId) -> Result<Option<RecordingAsset>> {
        Ok(self.assets.lock().get(&asset_key(call_id)).cloned())
    }

    async fn save(&self, asset: &RecordingAsset) -> Result<()> {
        self.assets.lock().insert(asset_key(&asset.call_id), asset.clone());
        Ok(())
    }

    async fn delete(&self, call_id: &SessionId) -> Result<()> {
        self.assets.lock().remove(&asset_key(call_id));
        Ok(())
    }
}
