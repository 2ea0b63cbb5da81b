//! Operator diagnostic subcommands Plain functions over the same
//! capability handles `serve` wires up — no separate admin surface, just
//! thin main-programs over the production types ( "plugin-style
//! scripts are modeled as thin main-programs over the same capability
//! handles; not part of the core").

use chrono::{NaiveDate, Utc};
use shiftcall_core::config::AppConfig;
use shiftcall_core::prelude::*;
use shiftcall_fsm::{FsmCaps, FsmTuning, InputEvent, InputKind};
use std::sync::Arc;
use tracing::info;

use shiftcall_cascade::{CascadePlanStore, RedisCascadePlanStore};
use shiftcall_catalog::{CachedCatalog, CatalogClient, HttpCatalogClient};
use shiftcall_store::{EventStream, RedisEventStream};

struct NoopCascade;

#[async_trait::async_trait]
impl shiftcall_fsm::CascadeReleaseHandle for NoopCascade {
    async fn release(
        &self,
        shift_id: &ShiftId,
        releasing_worker_id: &WorkerId,
        release_attempt_id: &str,
    ) -> Result<()> {
        info!(%shift_id, %releasing_worker_id, %release_attempt_id, "probe-call-flow: release requested (no-op diagnostic cascade)");
        Ok(())
    }
}

pub async fn probe_call_flow(config: &AppConfig, phone: &str, digits: &str) -> Result<()> {
    let catalog = Arc::new(HttpCatalogClient::new(
        config.catalog.base_url.clone(),
        config.catalog.base_id.clone(),
        config.catalog.api_key.clone(),
    ));
    let cached = CachedCatalog::new(catalog, config.store.catalog_cache_ttl);
    let cascade = NoopCascade;
    let tuning = FsmTuning {
        pin_length: config.telephony.pin_length,
        max_attempts_per_phase: config.telephony.max_attempts_per_phase,
        shift_list_page_size: config.telephony.shift_list_page_size,
        dtmf_gather_timeout: config.telephony.dtmf_gather_timeout,
        voice_gather_timeout: config.telephony.dtmf_gather_timeout,
        default_transfer_fallback_number: config.general.default_transfer_fallback_number.clone(),
    };
    let caps = FsmCaps { catalog: &cached, cascade: &cascade, tuning: &tuning };

    let mut session = CallSession::new(SessionId("probe".into()), CallDirection::Inbound, phone.to_string(), Utc::now());
    println!("-- session start --");
    let (next, directives) = shiftcall_fsm::advance(
        &session,
        &InputEvent::with_token("probe-0", InputKind::SessionStarted { caller_phone: Some(phone.to_string()) }),
        Utc::now(),
        &caps,
    )
    .await?;
    print_step(&next, &directives);
    session = next;

    for (i, digit) in digits.chars().enumerate() {
        println!("-- digit '{digit}' --");
        let (next, directives) = shiftcall_fsm::advance(
            &session,
            &InputEvent::with_token(format!("probe-{}", i + 1), InputKind::Dtmf(digit)),
            Utc::now(),
            &caps,
        )
        .await?;
        print_step(&next, &directives);
        session = next;
        if session.phase.is_terminal() {
            break;
        }
    }
    Ok(())
}

fn print_step(session: &CallSession, directives: &[Directive]) {
    println!("phase: {:?}", session.phase);
    for directive in directives {
        println!("  directive: {directive:?}");
    }
}

pub async fn inspect_cascade(config: &AppConfig, shift_id: &str) -> Result<()> {
    let store = RedisCascadePlanStore::new(&config.store.redis_url)?;
    match store.load(&ShiftId(shift_id.to_string())).await? {
        Some(plan) => {
            println!("{plan:#?}");
            Ok(())
        }
        None => Err(OrchestratorError::not_found(format!("no cascade plan for shift {shift_id}"))),
    }
}

pub async fn verify_recording_pipeline(config: &AppConfig) -> Result<()> {
    use shiftcall_recording::{ObjectStoreClient, S3ObjectStoreClient};
    let client = S3ObjectStoreClient::from_env(&config.recording.region).await;
    let key = format!("{}/_healthcheck", config.recording.key_prefix);
    client.put_object(&config.recording.bucket, &key, b"shiftcall-healthcheck".to_vec()).await?;
    let url = client
        .presigned_get_url(&config.recording.bucket, &key, std::time::Duration::from_secs(60))
        .await?;
    println!("object-store reachable, wrote {}/{}, presigned url: {url}", config.recording.bucket, key);
    Ok(())
}

pub async fn replay_event_stream(config: &AppConfig, provider: &str, date: &str) -> Result<()> {
    let day = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|e| OrchestratorError::input_validation(format!("invalid date {date}: {e}")))?;
    let stream = RedisEventStream::new(&config.store.redis_url)?;
    let entries = stream.range(&ProviderId(provider.to_string()), day).await?;
    if entries.is_empty() {
        println!("no events for provider {provider} on {date}");
        return Ok(());
    }
    for (id, event) in entries {
        println!("{id}  {event:?}");
    }
    Ok(())
}
