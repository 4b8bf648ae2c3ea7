//! Field-level validation helpers shared by the wire validator and the
//! command builder (stored records are a second trust boundary and get the
//! same checks).

use crate::outcome::{Failure, Outcome};

/// Minimum length for identifiers and timestamp strings.
pub const MIN_TEXT_LEN: usize = 4;

/// Trimmed, non-empty text of at least [`MIN_TEXT_LEN`] characters.
///
/// Returns the trimmed value; the raw input is never stored.
pub fn text(label: &str, raw: &str) -> Outcome<String> {
    let trimmed = raw.trim();
    if trimmed.chars().count() < MIN_TEXT_LEN {
        return Err(Failure::invalid_arguments(format!(
            "{label}: must be at least {MIN_TEXT_LEN} characters"
        )));
    }
    Ok(trimmed.to_string())
}

/// Unit count: an integer of at least 1.
pub fn units(label: &str, value: i64) -> Outcome<i64> {
    if value < 1 {
        return Err(Failure::invalid_arguments(format!(
            "{label}: must be at least 1 (found {value})"
        )));
    }
    Ok(value)
}

/// Price: a finite number of at least 0.
pub fn price(label: &str, value: f64) -> Outcome<f64> {
    if !value.is_finite() || value < 0.0 {
        return Err(Failure::invalid_arguments(format!(
            "{label}: must be a number of at least 0 (found {value})"
        )));
    }
    Ok(value)
}
