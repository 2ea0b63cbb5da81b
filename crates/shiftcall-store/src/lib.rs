//! # Shiftcall Store
//!
//! The call-state KV store and the per-provider event stream
//!. Both ship a Redis-backed implementation for production and
//! an in-memory implementation for tests and offline diagnostics.

pub mod event_stream;
pub mod session_store;

pub use event_stream::{CallEvent, EventStream, InMemoryEventStream, RedisEventStream, UnfilledReason};
pub use session_store::{InMemorySessionKv, RedisSessionKv, SessionKv};
