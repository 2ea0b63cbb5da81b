//! Composition surface for the telephony adapter: `AppState` plus the
//! `axum::Router` wiring webhooks and the media-stream WebSocket together,
//! The binary crate (`shiftcall-server`) owns constructing the
//! concrete dependencies; this module only owns how they're plugged into
//! HTTP routes.

use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;

use shiftcall_core::config::AppConfig;

use crate::carrier_api::CarrierControlClient;
use crate::offer_dialer::PendingOfferRegistry;
use crate::session::SessionRuntime;
use crate::stream::{self, StreamHandlerDeps};
use crate::webhook::{self, SharedRecordingSink};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub runtime: Arc<SessionRuntime>,
    pub carrier_control: Arc<dyn CarrierControlClient>,
    pub recording_sink: Option<SharedRecordingSink>,
    pub offer_registry: PendingOfferRegistry,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/webhooks/voice/start", post(webhook::session_start))
        .route("/webhooks/voice/recording-status", post(webhook::recording_status))
        .route("/webhooks/voice/offer-gather", post(webhook::offer_gather))
        .route("/webhooks/voice/offer-status", post(webhook::offer_status))
        .route("/media/stream", get(media_stream_upgrade))
        .with_state(state)
}

async fn media_stream_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let deps = StreamHandlerDeps { runtime: state.runtime.clone(), carrier_control: state.carrier_control.clone() };
    ws.on_upgrade(move |socket| stream::run(socket, deps))
}
