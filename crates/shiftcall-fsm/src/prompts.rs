//! Prompt text builders, kept apart from transition logic so `fsm.rs` reads
//! as pure control flow.

use shiftcall_core::prelude::*;

pub fn disclaimer() -> &'static str {
    "This call may be recorded for quality and training purposes."
}

pub fn pin_prompt() -> String {
    "Please enter your PIN followed by the pound key.".to_string()
}

pub fn pin_invalid_reprompt() -> String {
    "That PIN wasn't recognized. Please try again, followed by the pound key.".to_string()
}

pub fn greeting(display_name: &str, shift_count: usize) -> String {
    let plural = if shift_count == 1 { "shift" } else { "shifts" };
    format!("Hi {display_name}, you have {shift_count} upcoming {plural}.")
}

pub fn provider_selection_prompt(providers: &[ProviderSummary]) -> String {
    let mut out = String::from("You work with multiple providers. ");
    for (idx, p) in providers.iter().enumerate() {
        out.push_str(&format!("Press {} for {}. ", idx + 1, p.name));
    }
    out
}

/// Shift-list menu for one page. Digit "1" is always speak-to-representative;
/// shifts in the page occupy digits 2 and up.
pub fn shift_list_prompt(page: &[ShiftOccurrence], has_prev: bool, has_next: bool) -> String {
    let mut out = String::from("Press 1 to speak to a representative. ");
    for (idx, shift) in page.iter().enumerate() {
        let digit = idx + 2;
        out.push_str(&format!(
            "Press {digit} for {} on {}. ",
            shift.patient_display, shift.scheduled_at_local_display
        ));
    }
    if has_prev {
        out.push_str("Press 0 for the previous page. ");
    }
    if has_next {
        out.push_str("Press 9 for more shifts. ");
    }
    out
}

pub fn no_shifts_prompt() -> String {
    "You have no upcoming shifts at this time. Press 1 to speak to a representative, or hang up."
        .to_string()
}

pub fn shift_options_prompt(shift: &ShiftOccurrence) -> String {
    format!(
        "For {} on {}: press 1 to release this shift, or press 2 to speak to a representative.",
        shift.patient_display, shift.scheduled_at_local_display
    )
}

pub fn collect_reason_prompt() -> String {
    "Please briefly say the reason you're releasing this shift, then pause.".to_string()
}

pub fn confirm_release_prompt(shift: &ShiftOccurrence) -> String {
    format!(
        "To confirm releasing the shift for {} on {}, press 1. To go back, press 2.",
        shift.patient_display, shift.scheduled_at_local_display
    )
}

pub fn workflow_complete_prompt() -> String {
    "The shift has been released and eligible staff will be notified. Press 1 to finish this call, \
     or stay on the line for other options."
        .to_string()
}

pub fn goodbye() -> &'static str {
    "Thank you, goodbye."
}

pub fn apology_and_terminate() -> &'static str {
    "We're sorry, we weren't able to complete that request. Goodbye."
}

pub fn please_wait() -> &'static str {
    "Please wait a moment while we look that up."
}
