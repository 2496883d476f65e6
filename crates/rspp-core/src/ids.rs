// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Small identity and time helpers shared across the runtime core.

/// Return current epoch time in milliseconds.
pub fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Generate a fresh random-v4 identifier in standard hyphenated form.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Build the stable `providerInvocationID` named in the invocation
/// controller contract: `pvi/{session}/{turn|session}/{event}/{modality}`.
pub fn provider_invocation_id(
    session_id: &str,
    turn_or_session: &str,
    event_id: &str,
    modality: &str,
) -> String {
    format!("pvi/{session_id}/{turn_or_session}/{event_id}/{modality}")
}

/// Minimal RFC 3339 timestamp parser sufficient to validate `expiresAtUTC`
/// fields and order an issued-at against an expires-at. Avoids pulling in a
/// full date-time crate for one comparison.
///
/// Accepts `YYYY-MM-DDTHH:MM:SS[.fff]Z` or `+HH:MM`/`-HH:MM` offsets.
pub fn parse_rfc3339_millis(s: &str) -> Option<i64> {
    let s = s.trim();
    if s.len() < 20 {
        return None;
    }
    let year: i64 = s.get(0..4)?.parse().ok()?;
    let month: i64 = s.get(5..7)?.parse().ok()?;
    let day: i64 = s.get(8..10)?.parse().ok()?;
    let hour: i64 = s.get(11..13)?.parse().ok()?;
    let min: i64 = s.get(14..16)?.parse().ok()?;
    let sec: i64 = s.get(17..19)?.parse().ok()?;
    if !(1..=9999).contains(&year) || !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return None;
    }

    let mut rest = s.get(19..)?;
    let mut frac_ms: i64 = 0;
    if let Some(stripped) = rest.strip_prefix('.') {
        let frac_end = stripped.find(|c: char| !c.is_ascii_digit()).unwrap_or(stripped.len());
        let frac_str = &stripped[..frac_end];
        if !frac_str.is_empty() {
            let padded = format!("{:0<3}", &frac_str[..frac_str.len().min(3)]);
            frac_ms = padded.parse().ok()?;
        }
        rest = &stripped[frac_end..];
    }

    let offset_minutes: i64 = if rest == "Z" || rest.is_empty() {
        0
    } else if rest.len() == 6 && (rest.starts_with('+') || rest.starts_with('-')) {
        let sign = if rest.starts_with('-') { -1 } else { 1 };
        let oh: i64 = rest.get(1..3)?.parse().ok()?;
        let om: i64 = rest.get(4..6)?.parse().ok()?;
        sign * (oh * 60 + om)
    } else {
        return None;
    };

    let days_in_month = [0, 31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];
    let is_leap = |y: i64| (y % 4 == 0 && y % 100 != 0) || y % 400 == 0;
    let mut days: i64 = 0;
    if year >= 1970 {
        for y in 1970..year {
            days += if is_leap(y) { 366 } else { 365 };
        }
    } else {
        for y in year..1970 {
            days -= if is_leap(y) { 366 } else { 365 };
        }
    }
    for m in 1..month {
        days += days_in_month[m as usize];
        if m == 2 && is_leap(year) {
            days += 1;
        }
    }
    days += day - 1;

    let seconds = days * 86_400 + hour * 3_600 + min * 60 + sec - offset_minutes * 60;
    Some(seconds * 1000 + frac_ms)
}

/// Validate that `s` is a syntactically well-formed RFC 3339 timestamp.
pub fn is_rfc3339(s: &str) -> bool {
    parse_rfc3339_millis(s).is_some()
}

#[cfg(test)]
#[path = "ids_tests.rs"]
mod tests;
