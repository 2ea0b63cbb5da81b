//! Composition root: wires every concrete Redis/HTTP/S3 implementation into
//! the trait seams the other crates define, then either serves the
//! telephony adapter or runs one operator diagnostic subcommand

mod cli;
mod diagnostics;

use clap::Parser;
use shiftcall_cascade::{
    CascadeCoordinator, HttpMessageGatewayClient, RedisCascadePlanStore, RedisCascadeQueue,
};
use shiftcall_catalog::{CachedCatalog, HttpCatalogClient};
use shiftcall_core::config::AppConfig;
use shiftcall_core::prelude::*;
use shiftcall_fsm::FsmTuning;
use shiftcall_recording::{RecordingPipeline, RedisRecordingAssetStore, S3ObjectStoreClient};
use shiftcall_store::{EventStream, RedisEventStream, RedisSessionKv};
use shiftcall_telephony::carrier_api::{CarrierControlClient, HttpCarrierControlClient};
use shiftcall_telephony::{AppState, HttpVoiceOfferDialer, PendingOfferRegistry, SessionRuntime};
use std::sync::Arc;
use tracing::{error, info};

use cli::{Cli, Commands};

/// No real TTS vendor is in scope ( names it as an external
/// collaborator); this placeholder hands back silence so the media path
/// still exercises framing/pacing until a real engine is wired in.
struct SilentTtsEngine;

#[async_trait::async_trait]
impl shiftcall_telephony::tts::TtsEngine for SilentTtsEngine {
    async fn synthesize(&self, _text: &str) -> Result<Vec<u8>> {
        Ok(vec![0xFF; shiftcall_telephony::media::SAMPLES_PER_FRAME * 10])
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = match AppConfig::from_file_and_env(std::path::Path::new(&cli.config)) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "failed to load configuration");
            std::process::exit(2);
        }
    };

    let result = match cli.command {
        Commands::Serve => serve(config).await,
        Commands::ProbeCallFlow { phone, digits } => diagnostics::probe_call_flow(&config, &phone, &digits).await,
        Commands::InspectCascade { shift_id } => diagnostics::inspect_cascade(&config, &shift_id).await,
        Commands::VerifyRecordingPipeline => diagnostics::verify_recording_pipeline(&config).await,
        Commands::ReplayEventStream { provider, date } => {
            diagnostics::replay_event_stream(&config, &provider, &date).await
        }
    };

    if let Err(e) = result {
        error!(error = %e, "command failed");
        std::process::exit(1);
    }
}

async fn serve(config: AppConfig) -> Result<()> {
    let config = Arc::new(config);

    let catalog_http = Arc::new(HttpCatalogClient::new(
        config.catalog.base_url.clone(),
        config.catalog.base_id.clone(),
        config.catalog.api_key.clone(),
    ));
    let catalog = Arc::new(CachedCatalog::new(catalog_http, config.store.catalog_cache_ttl));

    let carrier_control: Arc<dyn CarrierControlClient> = Arc::new(HttpCarrierControlClient::new(
        config.telephony.carrier_api_base_url.clone(),
        config.telephony.carrier_account_sid.clone(),
        config.telephony.carrier_auth_token.clone(),
        config.telephony.voice_from_number.clone(),
    ));

    let offer_registry = PendingOfferRegistry::new();
    let dialer = Arc::new(HttpVoiceOfferDialer::new(
        carrier_control.clone(),
        offer_registry.clone(),
        config.general.public_base_domain.clone(),
    ));

    let gateway = Arc::new(HttpMessageGatewayClient::new(
        config.gateway.base_url.clone(),
        config.gateway.from_number.clone(),
        config.gateway.service_id.clone(),
        config.gateway.api_key.clone(),
    ));

    let queue = Arc::new(RedisCascadeQueue::new(&config.store.redis_url)?);
    let plans = Arc::new(RedisCascadePlanStore::new(&config.store.redis_url)?);
    let events: Arc<dyn EventStream> = Arc::new(RedisEventStream::new(&config.store.redis_url)?);

    let cascade = Arc::new(CascadeCoordinator {
        catalog: catalog.clone(),
        queue,
        plans,
        gateway,
        dialer,
        events: events.clone(),
        config: config.cascade.clone(),
        base_link_url: format!("https://{}", config.general.public_base_domain),
    });

    let session_store = Arc::new(RedisSessionKv::new(&config.store.redis_url, config.store.session_ttl)?);

    let recording_sink = if config.general.recording_enabled {
        let object_store = Arc::new(S3ObjectStoreClient::from_env(&config.recording.region).await);
        let assets = Arc::new(RedisRecordingAssetStore::new(&config.store.redis_url)?);
        let pipeline = Arc::new(RecordingPipeline {
            assets,
            object_store,
            http: reqwest::Client::new(),
            config: config.recording.clone(),
        });
        Some(pipeline)
    } else {
        None
    };

    let tuning = FsmTuning {
        pin_length: config.telephony.pin_length,
        max_attempts_per_phase: config.telephony.max_attempts_per_phase,
        shift_list_page_size: config.telephony.shift_list_page_size,
        dtmf_gather_timeout: config.telephony.dtmf_gather_timeout,
        voice_gather_timeout: config.telephony.dtmf_gather_timeout,
        default_transfer_fallback_number: config.general.default_transfer_fallback_number.clone(),
    };

    let runtime = Arc::new(SessionRuntime {
        store: session_store,
        catalog,
        cascade: cascade.clone(),
        tts: Arc::new(SilentTtsEngine),
        events,
        tuning,
        recording_context: recording_sink.clone().map(
            |p| -> Arc<dyn shiftcall_telephony::recording_hook::RecordingContextSink> { p },
        ),
    });

    let state = AppState {
        config: config.clone(),
        runtime,
        carrier_control,
        recording_sink: recording_sink
            .map(|p| -> shiftcall_telephony::webhook::SharedRecordingSink { p }),
        offer_registry,
    };

    let listen_addr = config.telephony.listen_addr.clone();
    let poll_interval = config.cascade.poll_interval;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(poll_interval);
        loop {
            ticker.tick().await;
            if let Err(e) = cascade.process_due(chrono::Utc::now()).await {
                error!(error = %e, "cascade queue-poll tick failed");
            }
        }
    });

    info!(listen_addr = %listen_addr, "starting shiftcall-server");
    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .map_err(|e| OrchestratorError::fatal(format!("binding {listen_addr}: {e}")))?;
    axum::serve(listener, shiftcall_telephony::router(state))
        .await
        .map_err(|e| OrchestratorError::fatal(format!("server error: {e}")))?;
    Ok(())
}
