//! Guard helpers for process transitions.
//!
//! Transition guards check that the fields a lab step produces are present before the step
//! may be marked complete. Each helper fails with [`WorkflowError::MissingRequiredField`]
//! naming the first absent field, so a caller can fix the record and retry.

use crate::{WorkflowError, WorkflowResult};

/// Returns the value if present.
///
/// # Arguments
///
/// * `value` - The optional field value.
/// * `field` - Field name reported in the error.
///
/// # Errors
///
/// Returns `WorkflowError::MissingRequiredField` if `value` is `None`.
pub fn require<T: Copy>(value: Option<T>, field: &'static str) -> WorkflowResult<T> {
    value.ok_or(WorkflowError::MissingRequiredField { field })
}

/// Returns the count if present and greater than zero.
///
/// A zero count is reported the same as an absent one: nothing was produced yet.
///
/// # Errors
///
/// Returns `WorkflowError::MissingRequiredField` if `value` is `None` or zero.
pub fn require_positive(value: Option<u32>, field: &'static str) -> WorkflowResult<u32> {
    match value {
        Some(n) if n > 0 => Ok(n),
        _ => Err(WorkflowError::MissingRequiredField { field }),
    }
}

/// Returns the text if present and not blank.
///
/// # Errors
///
/// Returns `WorkflowError::MissingRequiredField` if `value` is `None` or whitespace only.
pub fn require_text<'a>(value: Option<&'a str>, field: &'static str) -> WorkflowResult<&'a str> {
    match value {
        Some(s) if !s.trim().is_empty() => Ok(s),
        _ => Err(WorkflowError::MissingRequiredField { field }),
    }
}

/// Rejects percentages outside `0..=100`.
///
/// # Errors
///
/// Returns `WorkflowError::InvalidInput` if the percentage exceeds 100.
pub fn validate_percentage(value: Option<u8>, field: &str) -> WorkflowResult<()> {
    match value {
        Some(p) if p > 100 => Err(WorkflowError::InvalidInput(format!(
            "{field} must be between 0 and 100, got {p}"
        ))),
        _ => Ok(()),
    }
}

/// Normalises free text: trims it and maps blank input to `None`.
pub fn clean_text(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_reports_field_name() {
        let err = require::<u32>(None, "gel_date").unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::MissingRequiredField { field: "gel_date" }
        ));
        assert_eq!(require(Some(3), "x").unwrap(), 3);
    }

    #[test]
    fn zero_counts_are_missing() {
        assert!(require_positive(Some(0), "number_of_cuts").is_err());
        assert!(require_positive(None, "number_of_cuts").is_err());
        assert_eq!(require_positive(Some(2), "number_of_cuts").unwrap(), 2);
    }

    #[test]
    fn blank_text_is_missing() {
        assert!(require_text(Some("  "), "pcr_kit").is_err());
        assert!(require_text(None, "pcr_kit").is_err());
        assert_eq!(require_text(Some("Qiagen"), "pcr_kit").unwrap(), "Qiagen");
    }

    #[test]
    fn percentage_bounds() {
        assert!(validate_percentage(Some(100), "percentage").is_ok());
        assert!(validate_percentage(None, "percentage").is_ok());
        assert!(matches!(
            validate_percentage(Some(101), "percentage"),
            Err(WorkflowError::InvalidInput(_))
        ));
    }

    #[test]
    fn clean_text_trims_and_drops_blank() {
        assert_eq!(clean_text(Some("  note ".into())), Some("note".into()));
        assert_eq!(clean_text(Some("   ".into())), None);
        assert_eq!(clean_text(None), None);
    }
}
