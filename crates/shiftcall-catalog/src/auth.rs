//! Caller authentication
//!
//! Two independent lookup paths feed the FSM's `phone_auth`/`pin_auth`
//! phases: matching the caller's ANI against a worker's phone on file, and
//! matching a DTMF-entered PIN. Attempt-count enforcement (max 3 attempts
//! before the FSM transitions to `Error`) lives in `shiftcall-fsm`, not here
//! — this module only answers "who is this", never "how many times have they
//! tried".

use shiftcall_core::prelude::*;

use crate::client::CatalogClient;

/// Outcome of an authentication lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthOutcome {
    Matched(Worker),
    NoMatch,
}

/// Looks up a worker by the caller's E.164 phone number (ANI match).
pub async fn authenticate_by_phone<C: CatalogClient + ?Sized>(
    catalog: &C,
    e164: &str,
) -> Result<AuthOutcome> {
    Ok(match catalog.find_worker_by_phone(e164).await? {
        Some(worker) if worker.active => AuthOutcome::Matched(worker),
        _ => AuthOutcome::NoMatch,
    })
}

/// Looks up a worker by a DTMF-entered PIN, used as the fallback path when
/// ANI matching fails ( `phone_auth` → `pin_auth`).
pub async fn authenticate_by_pin<C: CatalogClient + ?Sized>(
    catalog: &C,
    pin: &str,
) -> Result<AuthOutcome> {
    Ok(match catalog.find_worker_by_pin(pin).await? {
        Some(worker) if worker.active => AuthOutcome::Matched(worker),
        _ => AuthOutcome::NoMatch,
    })
}
