//! Phone number canonicalization.
//!
//! Both the user-claimed number and the provider-asserted number are reduced
//! to E.164 (`+<country><national>`) before comparison or storage. The
//! default country code covers national-format input; anything that cannot
//! be normalized is rejected rather than stored as free text.

/// Strip formatting characters that commonly appear in user input.
fn strip_formatting(raw: &str) -> String {
    raw.chars().filter(|c| !matches!(c, ' ' | '-' | '(' | ')' | '.')).collect()
}

/// Normalize a phone number to E.164.
///
/// Accepted inputs:
/// - `+<digits>` international form (8-15 digits after the `+`)
/// - `00<digits>` international form with the 00 exit prefix
/// - `<country_code><national>` without the `+`
/// - a bare national number, optionally with a single leading trunk `0`,
///   interpreted against `default_country_code`
///
/// Returns `None` when the input cannot be reduced to a plausible E.164
/// number.
pub fn normalize(raw: &str, default_country_code: &str) -> Option<String> {
    let cleaned = strip_formatting(raw.trim());
    if cleaned.is_empty() {
        return None;
    }

    let digits: String = if let Some(rest) = cleaned.strip_prefix('+') {
        rest.to_string()
    } else if let Some(rest) = cleaned.strip_prefix("00") {
        rest.to_string()
    } else {
        let national: String = cleaned.clone();
        if !national.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        // Already carries the country code without a plus
        if national.starts_with(default_country_code) && plausible_e164(&national) && national.len() > 10 {
            national
        } else {
            // Bare national number, possibly with a trunk zero
            let trimmed = national.strip_prefix('0').unwrap_or(&national);
            format!("{default_country_code}{trimmed}")
        }
    };

    if !digits.chars().all(|c| c.is_ascii_digit()) || !plausible_e164(&digits) {
        return None;
    }

    Some(format!("+{digits}"))
}

/// E.164 allows up to 15 digits; anything under 8 is not a full number.
fn plausible_e164(digits: &str) -> bool {
    (8..=15).contains(&digits.len()) && !digits.starts_with('0')
}
