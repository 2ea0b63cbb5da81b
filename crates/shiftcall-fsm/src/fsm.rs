//! `Advance(session, event) -> (session', directives[])`
//!
//! Each phase gets its own handler function, all sharing the same shape:
//! `(&CallSession, &InputEvent, DateTime<Utc>, &FsmCaps) -> Result<(CallSession, Vec<Directive>)>`.
//! None of them perform I/O directly except through `caps.catalog`/`caps.cascade`,
//! and none of them touch the carrier — that's the telephony adapter's job.

use chrono::{DateTime, Utc};
use shiftcall_core::prelude::*;
use tracing::{info, warn};

use crate::caps::FsmCaps;
use crate::event::{InputEvent, InputKind};
use crate::prompts;

/// Top-level entry point. Handles at-most-once replay and the
/// carrier-session-stop rule before dispatching to the phase handler.
pub async fn advance(
    session: &CallSession,
    event: &InputEvent,
    now: DateTime<Utc>,
    caps: &FsmCaps<'_>,
) -> Result<(CallSession, Vec<Directive>)> {
    if let Some(token) = &event.token {
        if session.last_input_token.as_deref() == Some(token.as_str()) {
            info!(session_id = %session.id, %token, "duplicate input token, replaying prior directives");
            return Ok((session.clone(), session.last_directives.clone()));
        }
    }

    if matches!(event.kind, InputKind::SessionStopped) && !session.phase.is_terminal() {
        let mut next = session.clone();
        next.phase = Phase::Done;
        return Ok(finish(next, event, now, vec![Directive::Hangup]));
    }

    let (next, directives) = match session.phase {
        Phase::PhoneAuth => handle_phone_auth(session, event, caps).await?,
        Phase::PinAuth => handle_pin_auth(session, event, caps).await?,
        Phase::ProviderSelection => handle_provider_selection(session, event, caps).await?,
        Phase::ShiftList => handle_shift_list(session, event, caps).await?,
        Phase::ShiftOptions => handle_shift_options(session, event, caps).await?,
        Phase::CollectReason => handle_collect_reason(session, event, caps).await?,
        Phase::ConfirmRelease => handle_confirm_release(session, event, caps).await?,
        Phase::RepresentativeTransfer => handle_representative_transfer(session, event),
        Phase::WorkflowComplete => handle_workflow_complete(session, event, caps).await?,
        Phase::Done | Phase::Error => (session.clone(), Vec::new()),
    };

    Ok(finish(next, event, now, directives))
}

/// Stamps the at-most-once bookkeeping and the monotonic `updatedAt`
/// required by 's result guarantees, for every non-replayed call.
fn finish(
    mut next: CallSession,
    event: &InputEvent,
    now: DateTime<Utc>,
    directives: Vec<Directive>,
) -> (CallSession, Vec<Directive>) {
    if let Some(token) = &event.token {
        next.last_input_token = Some(token.clone());
    }
    next.last_directives = directives.clone();
    next.updated_at = now;
    (next, directives)
}

fn transient_retry(session: &CallSession) -> (CallSession, Vec<Directive>) {
    (session.clone(), vec![Directive::speak(prompts::please_wait())])
}

fn fatal_error(mut session: CallSession) -> (CallSession, Vec<Directive>) {
    session.phase = Phase::Error;
    (session, vec![Directive::speak(prompts::apology_and_terminate()), Directive::Hangup])
}

/// Shared "invalid input, attempts++, reprompt or give up" pattern used by
/// every DTMF-gathering phase.
fn reprompt_or_error(
    mut session: CallSession,
    phase_for_attempts: Phase,
    max_attempts: u32,
    reprompt: Directive,
) -> (CallSession, Vec<Directive>) {
    session.increment_attempts(phase_for_attempts);
    if session.attempts_for(phase_for_attempts) >= max_attempts {
        warn!(session_id = %session.id, phase = ?phase_for_attempts, "max attempts exhausted");
        fatal_error(session)
    } else {
        (session, vec![reprompt])
    }
}

fn catalog_error(session: &CallSession, err: OrchestratorError) -> (CallSession, Vec<Directive>) {
    if err.is_retry_safe() {
        transient_retry(session)
    } else {
        fatal_error(session.clone())
    }
}

async fn handle_phone_auth(
    session: &CallSession,
    event: &InputEvent,
    caps: &FsmCaps<'_>,
) -> Result<(CallSession, Vec<Directive>)> {
    if !matches!(event.kind, InputKind::SessionStarted { .. }) {
        return Ok((session.clone(), session.last_directives.clone()));
    }

    match caps.catalog.find_worker_by_phone(&session.caller_phone).await {
        Ok(Some(worker)) => Ok(enter_post_auth(session.clone(), worker, caps).await?),
        Ok(None) => {
            let mut next = session.clone();
            next.phase = Phase::PinAuth;
            next.dtmf_buffer.clear();
            let prompt = Directive::speak_and_gather_dtmf(
                prompts::pin_prompt(),
                caps.tuning.pin_length as u32,
                Some('#'),
                caps.tuning.dtmf_gather_timeout,
            );
            Ok((next, vec![Directive::speak(prompts::disclaimer()), prompt]))
        }
        Err(e) => Ok(catalog_error(session, e)),
    }
}

async fn handle_pin_auth(
    session: &CallSession,
    event: &InputEvent,
    caps: &FsmCaps<'_>,
) -> Result<(CallSession, Vec<Directive>)> {
    let digit = match &event.kind {
        InputKind::Dtmf(d) => *d,
        InputKind::GatherTimedOut => {
            let reprompt = Directive::speak_and_gather_dtmf(
                prompts::pin_invalid_reprompt(),
                caps.tuning.pin_length as u32,
                Some('#'),
                caps.tuning.dtmf_gather_timeout,
            );
            return Ok(reprompt_or_error(
                session.clone(),
                Phase::PinAuth,
                caps.tuning.max_attempts_per_phase,
                reprompt,
            ));
        }
        _ => return Ok((session.clone(), session.last_directives.clone())),
    };

    let mut next = session.clone();
    if digit == '#' {
        // submit
    } else {
        next.dtmf_buffer.push(digit);
        if next.dtmf_buffer.len() < caps.tuning.pin_length {
            return Ok((next, next.last_directives.clone()));
        }
    }

    let pin = std::mem::take(&mut next.dtmf_buffer);
    match caps.catalog.find_worker_by_pin(&pin).await {
        Ok(Some(worker)) => Ok(enter_post_auth(next, worker, caps).await?),
        Ok(None) => {
            next.dtmf_buffer.clear();
            let reprompt = Directive::speak_and_gather_dtmf(
                prompts::pin_invalid_reprompt(),
                caps.tuning.pin_length as u32,
                Some('#'),
                caps.tuning.dtmf_gather_timeout,
            );
            Ok(reprompt_or_error(next, Phase::PinAuth, caps.tuning.max_attempts_per_phase, reprompt))
        }
        Err(e) => Ok(catalog_error(&next, e)),
    }
}

/// Shared success path for `phone_auth`/`pin_auth`: attaches the worker,
/// resolves their provider(s), and routes to `provider_selection` or
/// `shift_list` ( `(phone_auth, session-started)` transition).
async fn enter_post_auth(
    mut session: CallSession,
    worker: Worker,
    caps: &FsmCaps<'_>,
) -> Result<(CallSession, Vec<Directive>)> {
    session.reset_attempts(Phase::PinAuth);
    let providers = match caps.catalog.providers_for_worker(&worker.id).await {
        Ok(p) => p,
        Err(e) => return Ok(catalog_error(&session, e)),
    };
    session.worker = Some(worker);

    if providers.is_empty() {
        warn!(session_id = %session.id, "authenticated worker has no providers on file");
        return Ok(fatal_error(session));
    }

    if providers.len() == 1 {
        let provider = providers.into_iter().next().expect("len checked to be 1");
        session.provider = Some(provider.clone());
        Ok(enter_shift_list(session, &provider.id, caps).await?)
    } else {
        session.phase = Phase::ProviderSelection;
        let summaries: Vec<ProviderSummary> =
            providers.into_iter().map(|p| ProviderSummary { id: p.id, name: p.name }).collect();
        let directive = Directive::speak_and_gather_dtmf(
            prompts::provider_selection_prompt(&summaries),
            1,
            None,
            caps.tuning.dtmf_gather_timeout,
        );
        session.available_providers = Some(summaries);
        Ok((session, vec![directive]))
    }
}

async fn handle_provider_selection(
    session: &CallSession,
    event: &InputEvent,
    caps: &FsmCaps<'_>,
) -> Result<(CallSession, Vec<Directive>)> {
    let summaries = session.available_providers.clone().unwrap_or_default();
    let digit = match &event.kind {
        InputKind::Dtmf(d) => *d,
        InputKind::GatherTimedOut => {
            let reprompt = Directive::speak_and_gather_dtmf(
                prompts::provider_selection_prompt(&summaries),
                1,
                None,
                caps.tuning.dtmf_gather_timeout,
            );
            return Ok(reprompt_or_error(
                session.clone(),
                Phase::ProviderSelection,
                caps.tuning.max_attempts_per_phase,
                reprompt,
            ));
        }
        _ => return Ok((session.clone(), session.last_directives.clone())),
    };

    let index = digit.to_digit(10).and_then(|n| (n as usize).checked_sub(1));
    let selected = index.and_then(|i| summaries.get(i));

    match selected {
        Some(summary) => {
            let provider = match caps.catalog.provider(&summary.id).await {
                Ok(p) => p,
                Err(e) => return Ok(catalog_error(session, e)),
            };
            let mut next = session.clone();
            next.reset_attempts(Phase::ProviderSelection);
            next.provider = Some(provider.clone());
            Ok(enter_shift_list(next, &provider.id, caps).await?)
        }
        None => {
            let reprompt = Directive::speak_and_gather_dtmf(
                prompts::provider_selection_prompt(&summaries),
                1,
                None,
                caps.tuning.dtmf_gather_timeout,
            );
            Ok(reprompt_or_error(
                session.clone(),
                Phase::ProviderSelection,
                caps.tuning.max_attempts_per_phase,
                reprompt,
            ))
        }
    }
}

/// Fetches the worker's future scheduled shifts for `provider_id` and
/// transitions into `shift_list` at page 0 ( pagination).
async fn enter_shift_list(
    mut session: CallSession,
    provider_id: &ProviderId,
    caps: &FsmCaps<'_>,
) -> Result<(CallSession, Vec<Directive>)> {
    let worker_id = session
        .worker
        .as_ref()
        .map(|w| w.id.clone())
        .expect("enter_shift_list is only reached after a worker is attached");
    let shifts = match caps.catalog.future_scheduled_shifts(&worker_id, provider_id).await {
        Ok(s) => s,
        Err(e) => return Ok(catalog_error(&session, e)),
    };
    session.phase = Phase::ShiftList;
    session.shift_list_page = 0;
    session.available_shifts = Some(shifts);
    Ok(render_shift_list_page(session, caps))
}

fn render_shift_list_page(mut session: CallSession, caps: &FsmCaps<'_>) -> (CallSession, Vec<Directive>) {
    let shifts = session.available_shifts.clone().unwrap_or_default();
    if shifts.is_empty() {
        return (session, vec![Directive::speak_and_gather_dtmf(
            prompts::no_shifts_prompt(),
            1,
            None,
            caps.tuning.dtmf_gather_timeout,
        )]);
    }

    let page_size = caps.tuning.shift_list_page_size.max(1);
    let total_pages = shifts.len().div_ceil(page_size);
    session.shift_list_page = session.shift_list_page.min(total_pages.saturating_sub(1));
    let start = session.shift_list_page * page_size;
    let end = (start + page_size).min(shifts.len());
    let page = &shifts[start..end];

    let greeting = if session.shift_list_page == 0 {
        let name = session.worker.as_ref().map(|w| w.display_name.clone()).unwrap_or_default();
        format!("{} ", prompts::greeting(&name, shifts.len()))
    } else {
        String::new()
    };

    let has_prev = session.shift_list_page > 0;
    let has_next = end < shifts.len();
    let body = prompts::shift_list_prompt(page, has_prev, has_next);
    let directive = Directive::speak_and_gather_dtmf(
        format!("{greeting}{body}"),
        1,
        None,
        caps.tuning.dtmf_gather_timeout,
    );
    (session, vec![directive])
}

async fn handle_shift_list(
    session: &CallSession,
    event: &InputEvent,
    caps: &FsmCaps<'_>,
) -> Result<(CallSession, Vec<Directive>)> {
    let digit = match &event.kind {
        InputKind::Dtmf(d) => *d,
        InputKind::GatherTimedOut => {
            return Ok(reprompt_current_shift_list_or_error(session.clone(), caps));
        }
        _ => return Ok((session.clone(), session.last_directives.clone())),
    };

    let mut next = session.clone();

    if digit == '1' {
        return Ok(enter_representative_transfer(next));
    }

    let shifts = session.available_shifts.clone().unwrap_or_default();
    let page_size = caps.tuning.shift_list_page_size.max(1);
    let start = session.shift_list_page * page_size;
    let end = (start + page_size).min(shifts.len());

    if digit == '9' && end < shifts.len() {
        next.shift_list_page += 1;
        next.reset_attempts(Phase::ShiftList);
        return Ok(render_shift_list_page(next, caps));
    }
    if digit == '0' && session.shift_list_page > 0 {
        next.shift_list_page -= 1;
        next.reset_attempts(Phase::ShiftList);
        return Ok(render_shift_list_page(next, caps));
    }

    if let Some(offset) = digit.to_digit(10).and_then(|n| (n as usize).checked_sub(2)) {
        if let Some(shift) = shifts.get(start + offset).filter(|_| start + offset < end) {
            next.selected_shift = Some(shift.clone());
            next.phase = Phase::ShiftOptions;
            next.reset_attempts(Phase::ShiftList);
            let directive = Directive::speak_and_gather_dtmf(
                prompts::shift_options_prompt(shift),
                1,
                None,
                caps.tuning.dtmf_gather_timeout,
            );
            return Ok((next, vec![directive]));
        }
    }

    Ok(reprompt_current_shift_list_or_error(session.clone(), caps))
}

fn reprompt_current_shift_list_or_error(
    session: CallSession,
    caps: &FsmCaps<'_>,
) -> (CallSession, Vec<Directive>) {
    let (_, directives) = render_shift_list_page(session.clone(), caps);
    let reprompt = directives.into_iter().next().unwrap_or_else(|| Directive::speak(prompts::no_shifts_prompt()));
    reprompt_or_error(session, Phase::ShiftList, caps.tuning.max_attempts_per_phase, reprompt)
}

async fn handle_shift_options(
    session: &CallSession,
    event: &InputEvent,
    caps: &FsmCaps<'_>,
) -> Result<(CallSession, Vec<Directive>)> {
    let shift = match &session.selected_shift {
        Some(s) => s.clone(),
        None => return Ok(fatal_error(session.clone())),
    };
    let digit = match &event.kind {
        InputKind::Dtmf(d) => *d,
        InputKind::GatherTimedOut => {
            let reprompt = Directive::speak_and_gather_dtmf(
                prompts::shift_options_prompt(&shift),
                1,
                None,
                caps.tuning.dtmf_gather_timeout,
            );
            return Ok(reprompt_or_error(
                session.clone(),
                Phase::ShiftOptions,
                caps.tuning.max_attempts_per_phase,
                reprompt,
            ));
        }
        _ => return Ok((session.clone(), session.last_directives.clone())),
    };

    let mut next = session.clone();
    match digit {
        '1' => {
            next.phase = Phase::CollectReason;
            next.reset_attempts(Phase::ShiftOptions);
            let directive = Directive::speak_and_gather_voice(
                prompts::collect_reason_prompt(),
                caps.tuning.voice_gather_timeout,
            );
            Ok((next, vec![directive]))
        }
        '2' => Ok(enter_representative_transfer(next)),
        _ => {
            let reprompt = Directive::speak_and_gather_dtmf(
                prompts::shift_options_prompt(&shift),
                1,
                None,
                caps.tuning.dtmf_gather_timeout,
            );
            Ok(reprompt_or_error(next, Phase::ShiftOptions, caps.tuning.max_attempts_per_phase, reprompt))
        }
    }
}

async fn handle_collect_reason(
    session: &CallSession,
    event: &InputEvent,
    caps: &FsmCaps<'_>,
) -> Result<(CallSession, Vec<Directive>)> {
    let shift = match &session.selected_shift {
        Some(s) => s.clone(),
        None => return Ok(fatal_error(session.clone())),
    };
    match &event.kind {
        InputKind::VoiceUtteranceEnded { .. } => {
            let mut next = session.clone();
            next.phase = Phase::ConfirmRelease;
            let directive = Directive::speak_and_gather_dtmf(
                prompts::confirm_release_prompt(&shift),
                1,
                None,
                caps.tuning.dtmf_gather_timeout,
            );
            Ok((next, vec![directive]))
        }
        InputKind::GatherTimedOut => {
            let reprompt = Directive::speak_and_gather_voice(
                prompts::collect_reason_prompt(),
                caps.tuning.voice_gather_timeout,
            );
            Ok(reprompt_or_error(
                session.clone(),
                Phase::CollectReason,
                caps.tuning.max_attempts_per_phase,
                reprompt,
            ))
        }
        _ => Ok((session.clone(), session.last_directives.clone())),
    }
}

async fn handle_confirm_release(
    session: &CallSession,
    event: &InputEvent,
    caps: &FsmCaps<'_>,
) -> Result<(CallSession, Vec<Directive>)> {
    let shift = match &session.selected_shift {
        Some(s) => s.clone(),
        None => return Ok(fatal_error(session.clone())),
    };
    let digit = match &event.kind {
        InputKind::Dtmf(d) => *d,
        InputKind::GatherTimedOut => {
            let reprompt = Directive::speak_and_gather_dtmf(
                prompts::confirm_release_prompt(&shift),
                1,
                None,
                caps.tuning.dtmf_gather_timeout,
            );
            return Ok(reprompt_or_error(
                session.clone(),
                Phase::ConfirmRelease,
                caps.tuning.max_attempts_per_phase,
                reprompt,
            ));
        }
        _ => return Ok((session.clone(), session.last_directives.clone())),
    };

    let mut next = session.clone();
    match digit {
        '1' => {
            if let Err(e) = caps.catalog.release_shift(&shift.id).await {
                return Ok(catalog_error(&next, e));
            }
            // Idempotency key derived from (rootId, shiftId) so a retried
            // advance on the same call never double-releases
            let release_attempt_id = format!("{}:{}", next.root_id, shift.id);
            let releasing_worker_id = next
                .worker
                .as_ref()
                .map(|w| w.id.clone())
                .expect("confirm_release is only reached after a worker is attached");
            if let Err(e) = caps.cascade.release(&shift.id, &releasing_worker_id, &release_attempt_id).await {
                warn!(session_id = %next.id, shift_id = %shift.id, error = %e, "cascade release failed, offering representative transfer");
                return Ok(enter_representative_transfer(next));
            }
            next.phase = Phase::WorkflowComplete;
            let directive = Directive::speak_and_gather_dtmf(
                prompts::workflow_complete_prompt(),
                1,
                None,
                caps.tuning.dtmf_gather_timeout,
            );
            Ok((next, vec![directive]))
        }
        '2' => {
            next.phase = Phase::ShiftOptions;
            next.reset_attempts(Phase::ConfirmRelease);
            let directive = Directive::speak_and_gather_dtmf(
                prompts::shift_options_prompt(&shift),
                1,
                None,
                caps.tuning.dtmf_gather_timeout,
            );
            Ok((next, vec![directive]))
        }
        _ => {
            let reprompt = Directive::speak_and_gather_dtmf(
                prompts::confirm_release_prompt(&shift),
                1,
                None,
                caps.tuning.dtmf_gather_timeout,
            );
            Ok(reprompt_or_error(next, Phase::ConfirmRelease, caps.tuning.max_attempts_per_phase, reprompt))
        }
    }
}

fn enter_representative_transfer(mut session: CallSession) -> (CallSession, Vec<Directive>) {
    let target = session
        .provider
        .as_ref()
        .map(|p| p.transfer_number.clone())
        .filter(|n| !n.is_empty());
    session.phase = Phase::RepresentativeTransfer;
    session.pending_transfer =
        Some(PendingTransfer { target_phone: target.clone().unwrap_or_default(), caller_phone: session.caller_phone.clone() });
    let directive = Directive::Transfer {
        target_phone: target.unwrap_or_default(),
        timeout: std::time::Duration::from_secs(30),
    };
    (session, vec![directive])
}

fn handle_representative_transfer(
    session: &CallSession,
    event: &InputEvent,
) -> (CallSession, Vec<Directive>) {
    match &event.kind {
        InputKind::SessionStarted { .. } => {
            let target = session
                .pending_transfer
                .as_ref()
                .map(|t| t.target_phone.clone())
                .unwrap_or_default();
            (session.clone(), vec![Directive::Transfer { target_phone: target, timeout: std::time::Duration::from_secs(30) }])
        }
        _ => (session.clone(), session.last_directives.clone()),
    }
}

async fn handle_workflow_complete(
    session: &CallSession,
    event: &InputEvent,
    caps: &FsmCaps<'_>,
) -> Result<(CallSession, Vec<Directive>)> {
    let digit = match &event.kind {
        InputKind::Dtmf(d) => *d,
        InputKind::GatherTimedOut => {
            let mut next = session.clone();
            next.phase = Phase::Done;
            return Ok((next, vec![Directive::speak(prompts::goodbye()), Directive::Hangup]));
        }
        _ => return Ok((session.clone(), session.last_directives.clone())),
    };

    let mut next = session.clone();
    if digit == '1' {
        next.phase = Phase::Done;
        Ok((next, vec![Directive::speak(prompts::goodbye()), Directive::Hangup]))
    } else {
        let reprompt = Directive::speak_and_gather_dtmf(
            prompts::workflow_complete_prompt(),
            1,
            None,
            caps.tuning.dtmf_gather_timeout,
        );
        Ok(reprompt_or_error(next, Phase::WorkflowComplete, caps.tuning.max_attempts_per_phase, reprompt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn base_session() -> CallSession {
        CallSession::new(
            SessionId("s1".into()),
            CallDirection::Inbound,
            "+61412345678".into(),
            Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap(),
        )
    }

    #[test]
    fn reprompt_or_error_transitions_to_error_at_max_attempts() {
        let session = base_session();
        let reprompt = Directive::speak("try again");
        let (s1, d1) = reprompt_or_error(session, Phase::PinAuth, 3, reprompt.clone());
        assert_eq!(s1.attempts_for(Phase::PinAuth), 1);
        assert_eq!(d1, vec![reprompt.clone()]);

        let (s2, _) = reprompt_or_error(s1, Phase::PinAuth, 3, reprompt.clone());
        assert_eq!(s2.attempts_for(Phase::PinAuth), 2);
        assert_ne!(s2.phase, Phase::Error);

        let (s3, d3) = reprompt_or_error(s2, Phase::PinAuth, 3, reprompt);
        assert_eq!(s3.phase, Phase::Error);
        assert!(matches!(d3.last(), Some(Directive::Hangup)));
    }

    #[test]
    fn transient_retry_leaves_phase_unchanged() {
        let session = base_session();
        let (next, directives) = transient_retry(&session);
        assert_eq!(next.phase, session.phase);
        assert_eq!(directives.len(), 1);
    }
}
