//! Input normalization shared by registration and event recording.
//!
//! Every function returns the normalized value that is stored and digested, so two
//! spellings of the same input can never produce two different digests.

use crate::TypesError;
use chrono::{NaiveDate, Utc};

pub const IDENTITY_NUMBER_DIGITS: std::ops::RangeInclusive<usize> = 4..=20;
pub const SECRET_DIGITS: std::ops::RangeInclusive<usize> = 4..=12;
pub const MAX_DISPLAY_NAME_CHARS: usize = 128;
pub const MAX_REGION_CODE_CHARS: usize = 32;
pub const MAX_EVENT_KIND_CHARS: usize = 64;
pub const MAX_UNIT_CHARS: usize = 16;

/// Strip grouping spaces and hyphens, then require ASCII digits only.
pub fn normalize_identity_number(raw: &str) -> Result<String, TypesError> {
    let normalized: String = raw
        .trim()
        .chars()
        .filter(|c| *c != ' ' && *c != '-')
        .collect();

    if normalized.is_empty() {
        return Err(TypesError::missing("identity_number"));
    }
    if !normalized.chars().all(|c| c.is_ascii_digit()) {
        return Err(TypesError::invalid("identity_number", "must contain digits only"));
    }
    if !IDENTITY_NUMBER_DIGITS.contains(&normalized.len()) {
        return Err(TypesError::invalid(
            "identity_number",
            format!(
                "must have between {} and {} digits",
                IDENTITY_NUMBER_DIGITS.start(),
                IDENTITY_NUMBER_DIGITS.end()
            ),
        ));
    }
    Ok(normalized)
}

/// PINs are digested verbatim; no trimming so that " 1234" never silently equals "1234".
pub fn validate_secret(raw: &str) -> Result<(), TypesError> {
    if raw.is_empty() {
        return Err(TypesError::missing("pin"));
    }
    if !raw.chars().all(|c| c.is_ascii_digit()) || !SECRET_DIGITS.contains(&raw.len()) {
        return Err(TypesError::invalid(
            "pin",
            format!(
                "must be {} to {} digits",
                SECRET_DIGITS.start(),
                SECRET_DIGITS.end()
            ),
        ));
    }
    Ok(())
}

pub fn normalize_display_name(raw: &str) -> Result<String, TypesError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(TypesError::missing("full_name"));
    }
    if trimmed.chars().count() > MAX_DISPLAY_NAME_CHARS {
        return Err(TypesError::invalid(
            "full_name",
            format!("must be at most {MAX_DISPLAY_NAME_CHARS} characters"),
        ));
    }
    if trimmed.chars().any(char::is_control) {
        return Err(TypesError::invalid(
            "full_name",
            "must not contain control characters",
        ));
    }
    Ok(trimmed.to_string())
}

/// Dates are `YYYY-MM-DD` and may not lie in the future.
pub fn parse_date_of_birth(raw: Option<&str>) -> Result<Option<NaiveDate>, TypesError> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| TypesError::invalid("date_of_birth", "expected YYYY-MM-DD"))?;
    if date > Utc::now().date_naive() {
        return Err(TypesError::invalid("date_of_birth", "must not be in the future"));
    }
    Ok(Some(date))
}

pub fn normalize_region_code(raw: Option<&str>) -> Result<Option<String>, TypesError> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    if raw.chars().count() > MAX_REGION_CODE_CHARS {
        return Err(TypesError::invalid(
            "region_code",
            format!("must be at most {MAX_REGION_CODE_CHARS} characters"),
        ));
    }
    if !raw
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(TypesError::invalid(
            "region_code",
            "may only contain ASCII letters, digits, '-' and '_'",
        ));
    }
    Ok(Some(raw.to_string()))
}

pub fn normalize_event_kind(raw: &str) -> Result<String, TypesError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(TypesError::missing("event_kind"));
    }
    if trimmed.chars().count() > MAX_EVENT_KIND_CHARS {
        return Err(TypesError::invalid(
            "event_kind",
            format!("must be at most {MAX_EVENT_KIND_CHARS} characters"),
        ));
    }
    if trimmed.chars().any(char::is_control) {
        return Err(TypesError::invalid(
            "event_kind",
            "must not contain control characters",
        ));
    }
    Ok(trimmed.to_string())
}

pub fn normalize_unit(raw: Option<&str>) -> Result<Option<String>, TypesError> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    if raw.chars().count() > MAX_UNIT_CHARS {
        return Err(TypesError::invalid(
            "unit",
            format!("must be at most {MAX_UNIT_CHARS} characters"),
        ));
    }
    if raw.chars().any(char::is_control) {
        return Err(TypesError::invalid("unit", "must not contain control characters"));
    }
    Ok(Some(raw.to_string()))
}

pub fn validate_quantity(quantity: Option<f64>) -> Result<Option<f64>, TypesError> {
    match quantity {
        Some(q) if !q.is_finite() => Err(TypesError::invalid("quantity", "must be a finite number")),
        other => Ok(other),
    }
}
