//! # Shiftcall Telephony
//!
//! The telephony adapter: carrier webhooks, the bidirectional media-stream
//! WebSocket, mu-law framing, and the carrier call-control documents that
//! drive transfer/hangup Deliberately split into a
//! transport-agnostic core (`session`) that owns all FSM-driving logic and a
//! thin `axum` adapter (`stream`, `webhook`, `app`) around it, so the core is
//! unit-testable without a real socket.

pub mod app;
pub mod carrier_api;
pub mod carrier_doc;
pub mod frame;
pub mod media;
pub mod offer_dialer;
pub mod recording_hook;
pub mod session;
pub mod stream;
pub mod tts;
pub mod webhook;

pub use app::{router, AppState};
pub use offer_dialer::{HttpVoiceOfferDialer, PendingOfferRegistry};
pub use session::{InboundFrame, OutboundFrame, SessionRuntime};
