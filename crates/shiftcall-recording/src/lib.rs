//! # Shiftcall Recording
//!
//! Transfers a carrier-hosted call recording to durable object storage once
//! the carrier reports it finalized Plugs into
//! `shiftcall-telephony` through two narrow trait seams
//! (`RecordingContextSink`, `RecordingStatusSink`) rather than a direct
//! dependency in the other direction.

pub mod object_store;
pub mod pipeline;
pub mod store;

pub use object_store::{ObjectStoreClient, S3ObjectStoreClient};
pub use pipeline::RecordingPipeline;
pub use store::{InMemoryRecordingAssetStore, RecordingAssetStore, RedisRecordingAssetStore};
