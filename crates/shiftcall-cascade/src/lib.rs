//! # Shiftcall Cascade
//!
//! The Notification Cascade Coordinator: releases a shift into
//! a multi-wave text fan-out followed by sequential voice-offer rounds,
//! idempotently, with cancellation on acceptance.

pub mod coordinator;
pub mod dialer;
pub mod gateway;
pub mod plan_store;
pub mod queue;
pub mod retry;
pub mod wave;

pub use coordinator::CascadeCoordinator;
pub use dialer::{OfferOutcome, OfferScript, VoiceOfferDialer};
pub use gateway::{HttpMessageGatewayClient, MessageGatewayClient, OutboundText};
pub use plan_store::{CascadePlanStore, InMemoryCascadePlanStore, RedisCascadePlanStore};
pub use queue::{CascadeQueue, InMemoryCascadeQueue, JobHandle, JobKind, RedisCascadeQueue, ScheduledJob};
pub use retry::{retry_transient, BackoffPolicy};
