//! Wave delay schedule and text-message body builder

use shiftcall_core::prelude::*;

/// Minutes between text waves for a shift `hours` away at release time.
/// Boundaries are inclusive on the lower side: a shift exactly on a
/// threshold (e.g. 2.0 hours) claims the tighter spacing.
pub fn wave_spacing_minutes(hours_until_shift: f64) -> u32 {
    if hours_until_shift <= 2.0 {
        10
    } else if hours_until_shift <= 3.0 {
        15
    } else if hours_until_shift <= 4.0 {
        20
    } else if hours_until_shift <= 5.0 {
        25
    } else {
        30
    }
}

/// Absolute delays (minutes from release) for waves 1, 2, 3: `[0, D, 2D]`.
pub fn wave_schedule_minutes(hours_until_shift: f64) -> [u32; 3] {
    let d = wave_spacing_minutes(hours_until_shift);
    [0, d, 2 * d]
}

/// Text body for wave `wave` (1-indexed):
/// `"JOB AVAILABLE[ (Wave K)]: <Patient>, <date> <time>. Reply or view: <link>"`.
/// The wave indicator is omitted for wave 1.
pub fn text_body(shift: &ShiftOccurrence, wave: u8, link: &str) -> String {
    let wave_suffix = if wave == 1 { String::new() } else { format!(" (Wave {wave})") };
    format!(
        "JOB AVAILABLE{wave_suffix}: {}, {}. Reply or view: {link}",
        shift.patient_display, shift.scheduled_at_local_display
    )
}

/// Splits a pre-rendered local display string (e.g. `"Feb 1 4:30PM"`) into
/// its date and time parts on the last whitespace boundary, for callers that
/// need to template the two separately (the voice-offer script). Falls back
/// to putting the whole string in the date part if there's no split point.
pub fn split_date_time_display(display: &str) -> (String, String) {
    match display.rsplit_once(' ') {
        Some((date, time)) => (date.to_string(), time.to_string()),
        None => (display.to_string(), String::new()),
    }
}

/// Number of SMS segments a body would occupy under the 160-char
/// single-segment convention boundary test.
pub fn segment_count(body: &str) -> usize {
    let len = body.chars().count();
    if len <= 160 {
        1
    } else {
        len.div_ceil(153) // multi-segment messages lose bytes to the UDH
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn shift() -> ShiftOccurrence {
        ShiftOccurrence {
            id: ShiftId("sh1".into()),
            template_id: None,
            provider_id: ProviderId("p1".into()),
            assigned_worker_id: None,
            patient_display: "Oliver S.".into(),
            scheduled_at: Utc.with_ymd_and_hms(2026, 2, 1, 5, 30, 0).unwrap(),
            scheduled_at_local_display: "Feb 1 4:30PM".into(),
            status: ShiftStatus::Open,
        }
    }

    #[test]
    fn wave_spacing_boundaries_take_the_lower_bucket() {
        assert_eq!(wave_spacing_minutes(2.0), 10);
        assert_eq!(wave_spacing_minutes(2.0001), 15);
        assert_eq!(wave_spacing_minutes(3.0), 15);
        assert_eq!(wave_spacing_minutes(4.0), 20);
        assert_eq!(wave_spacing_minutes(5.0), 25);
        assert_eq!(wave_spacing_minutes(5.0001), 30);
    }

    #[test]
    fn schedule_doubles_spacing_for_wave_three() {
        assert_eq!(wave_schedule_minutes(3.0), [0, 15, 30]);
    }

    #[test]
    fn wave_one_omits_indicator() {
        let body = text_body(&shift(), 1, "https://s.example/x");
        assert!(!body.contains("Wave"));
        assert!(body.starts_with("JOB AVAILABLE:"));
    }

    #[test]
    fn wave_two_includes_indicator() {
        let body = text_body(&shift(), 2, "https://s.example/x");
        assert!(body.contains("(Wave 2)"));
    }

    #[test]
    fn split_date_time_display_splits_on_last_space() {
        assert_eq!(split_date_time_display("Feb 1 4:30PM"), ("Feb 1".to_string(), "4:30PM".to_string()));
    }

    #[test]
    fn split_date_time_display_falls_back_when_no_space() {
        assert_eq!(split_date_time_display("unknown"), ("unknown".to_string(), String::new()));
    }

    #[test]
    fn segment_count_boundary_at_160_chars() {
        let body_160 = "x".repeat(160);
        let body_161 = "x".repeat(161);
        assert_eq!(segment_count(&body_160), 1);
        assert_eq!(segment_count(&body_161), 2);
    }
}
