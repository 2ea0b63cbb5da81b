//! # Shiftcall FSM
//!
//! Pure per-call finite state machine: `advance(session, event) ->
//! (session', directives[])`. No I/O beyond the injected `FsmCaps` handles;
//! everything else — the carrier, the store, the cascade coordinator — lives
//! outside this crate and calls into it.

pub mod caps;
pub mod event;
pub mod fsm;
pub mod prompts;

pub use caps::{CascadeReleaseHandle, FsmCaps, FsmTuning};
pub use event::{InputEvent, InputKind};
pub use fsm::advance;
