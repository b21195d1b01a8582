//! Response Validator — turns the raw text a generation call returns into a
//! validated `OptimizationResult`, or a typed failure. Pure transformation:
//! nothing is persisted here and no error escapes as a panic.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Minimum length of an optimized resume worth persisting.
const MIN_RESUME_CHARS: usize = 100;
/// Minimum length of a useful changes summary.
const MIN_SUMMARY_CHARS: usize = 20;
/// Minimum length of the caller-supplied resume and job description.
const MIN_INPUT_CHARS: usize = 10;

/// Validated output of one optimization call. Field names follow the
/// external contract's camelCase keys on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationResult {
    pub optimized_resume: String,
    pub changes_summary: String,
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("required job fields are missing: {0}")]
    MissingRequiredData(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("AI response could not be parsed as JSON")]
    ProcessingError(#[from] serde_json::Error),

    #[error("AI response is not a JSON object")]
    InvalidResponseFormat,

    #[error("AI response is missing a textual 'optimizedResume' field")]
    InvalidResumeFormat,

    #[error("AI response is missing a textual 'changesSummary' field")]
    InvalidChangesSummary,

    #[error("optimized resume is too short ({0} characters, minimum 100)")]
    InvalidContentLength(usize),

    #[error("changes summary is too short ({0} characters, minimum 20)")]
    InvalidSummaryLength(usize),
}

impl ValidationError {
    /// Stable error code surfaced to API clients so they can tell the
    /// failure categories apart.
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::MissingRequiredData(_) => "MISSING_REQUIRED_DATA",
            ValidationError::InvalidInput(_) => "INVALID_INPUT",
            ValidationError::ProcessingError(_) => "PROCESSING_ERROR",
            ValidationError::InvalidResponseFormat => "INVALID_RESPONSE_FORMAT",
            ValidationError::InvalidResumeFormat => "INVALID_RESUME_FORMAT",
            ValidationError::InvalidChangesSummary => "INVALID_CHANGES_SUMMARY",
            ValidationError::InvalidContentLength(_) => "INVALID_CONTENT_LENGTH",
            ValidationError::InvalidSummaryLength(_) => "INVALID_SUMMARY_LENGTH",
        }
    }
}

/// Checks the caller-supplied inputs before any external call is made, so a
/// doomed request never burns a generation call.
pub fn validate_optimize_inputs(
    base_resume: Option<&str>,
    job_description: Option<&str>,
) -> Result<(), ValidationError> {
    let base_resume = base_resume.map(str::trim).filter(|s| !s.is_empty());
    let job_description = job_description.map(str::trim).filter(|s| !s.is_empty());

    let mut missing = Vec::new();
    if base_resume.is_none() {
        missing.push("base_resume");
    }
    if job_description.is_none() {
        missing.push("job_description");
    }
    if !missing.is_empty() {
        return Err(ValidationError::MissingRequiredData(missing.join(", ")));
    }

    for (name, value) in [
        ("base_resume", base_resume),
        ("job_description", job_description),
    ] {
        let len = value.unwrap_or_default().chars().count();
        if len < MIN_INPUT_CHARS {
            return Err(ValidationError::InvalidInput(format!(
                "{name} is too short ({len} characters, minimum {MIN_INPUT_CHARS})"
            )));
        }
    }

    Ok(())
}

/// Validates raw generation output into an `OptimizationResult`.
///
/// Pipeline: extract the JSON payload (tolerating fences and surrounding
/// prose), strict-parse it, then check shape and content lengths in order,
/// short-circuiting at the first failure.
pub fn validate(raw: &str) -> Result<OptimizationResult, ValidationError> {
    let payload = extract_payload(raw);
    let value: Value = serde_json::from_str(payload)?;

    let object = value
        .as_object()
        .ok_or(ValidationError::InvalidResponseFormat)?;

    let optimized_resume = object
        .get("optimizedResume")
        .and_then(Value::as_str)
        .ok_or(ValidationError::InvalidResumeFormat)?;

    let changes_summary = object
        .get("changesSummary")
        .and_then(Value::as_str)
        .ok_or(ValidationError::InvalidChangesSummary)?;

    let resume_len = optimized_resume.chars().count();
    if resume_len < MIN_RESUME_CHARS {
        return Err(ValidationError::InvalidContentLength(resume_len));
    }

    let summary_len = changes_summary.chars().count();
    if summary_len < MIN_SUMMARY_CHARS {
        return Err(ValidationError::InvalidSummaryLength(summary_len));
    }

    Ok(OptimizationResult {
        optimized_resume: optimized_resume.to_string(),
        changes_summary: changes_summary.to_string(),
    })
}

/// Extracts the JSON payload from raw model output: strips code fences,
/// then trims to the outermost brace pair when the text is wrapped in prose.
/// Returns the input unchanged when no braces are found; the parse step
/// reports that as a `ProcessingError`.
fn extract_payload(raw: &str) -> &str {
    let text = strip_code_fences(raw.trim()).trim();
    if text.starts_with('{') && text.ends_with('}') {
        return text;
    }
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => text,
    }
}

/// Strips ```json ... ``` or ``` ... ``` code fences from model output.
fn strip_code_fences(text: &str) -> &str {
    let text = text.trim();
    if let Some(stripped) = text.strip_prefix("```json") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else if let Some(stripped) = text.strip_prefix("```") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response_json(resume_len: usize, summary_len: usize) -> String {
        format!(
            r#"{{"optimizedResume": "{}", "changesSummary": "{}"}}"#,
            "r".repeat(resume_len),
            "s".repeat(summary_len)
        )
    }

    // -- extraction ---------------------------------------------------------

    #[test]
    fn test_strip_fences_with_json_tag() {
        let input = "```json\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_code_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_strip_fences_without_tag() {
        let input = "```\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_code_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_extract_passes_bare_json_through() {
        assert_eq!(extract_payload("{\"a\": 1}"), "{\"a\": 1}");
    }

    #[test]
    fn test_extract_trims_surrounding_prose() {
        let input = "Here is your optimized resume:\n{\"a\": 1}\nHope this helps!";
        assert_eq!(extract_payload(input), "{\"a\": 1}");
    }

    #[test]
    fn test_extract_handles_prose_plus_fences() {
        let input = "Sure! Here it is:\n```json\n{\"a\": 1}\n```";
        assert_eq!(extract_payload(input), "{\"a\": 1}");
    }

    #[test]
    fn test_extract_without_braces_is_unchanged() {
        assert_eq!(extract_payload("no json here"), "no json here");
    }

    // -- validation pipeline ------------------------------------------------

    #[test]
    fn test_fenced_round_trip_succeeds() {
        let resume = "r".repeat(101);
        let summary = "s".repeat(21);
        let raw = format!(
            "```json\n{{\"optimizedResume\": \"{resume}\", \"changesSummary\": \"{summary}\"}}\n```"
        );
        let result = validate(&raw).unwrap();
        assert_eq!(result.optimized_resume, resume);
        assert_eq!(result.changes_summary, summary);
    }

    #[test]
    fn test_validate_is_idempotent() {
        let raw = response_json(150, 30);
        let first = validate(&raw).unwrap();
        let second = validate(&raw).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_invalid_json_is_processing_error() {
        let err = validate("```json\nnot json at all\n```").unwrap_err();
        assert!(matches!(err, ValidationError::ProcessingError(_)));
        assert_eq!(err.code(), "PROCESSING_ERROR");
    }

    #[test]
    fn test_non_object_is_invalid_response_format() {
        let err = validate("[1, 2, 3]").unwrap_err();
        assert!(matches!(err, ValidationError::InvalidResponseFormat));
    }

    #[test]
    fn test_missing_resume_field() {
        let err = validate(r#"{"changesSummary": "a long enough summary here"}"#).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidResumeFormat));
    }

    #[test]
    fn test_non_string_resume_field() {
        let err =
            validate(r#"{"optimizedResume": 42, "changesSummary": "a summary"}"#).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidResumeFormat));
    }

    #[test]
    fn test_missing_summary_field() {
        let raw = format!(r#"{{"optimizedResume": "{}"}}"#, "r".repeat(150));
        let err = validate(&raw).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidChangesSummary));
    }

    #[test]
    fn test_short_resume_is_invalid_content_length() {
        let raw = format!(
            r#"{{"optimizedResume": "short", "changesSummary": "{}"}}"#,
            "s".repeat(21)
        );
        let err = validate(&raw).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidContentLength(5)));
    }

    #[test]
    fn test_short_summary_is_invalid_summary_length() {
        let err = validate(&response_json(150, 19)).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidSummaryLength(19)));
    }

    #[test]
    fn test_length_boundaries_are_inclusive() {
        assert!(validate(&response_json(100, 20)).is_ok());
        assert!(validate(&response_json(99, 20)).is_err());
        assert!(validate(&response_json(100, 19)).is_err());
    }

    #[test]
    fn test_result_serializes_with_camel_case_keys() {
        let result = validate(&response_json(120, 25)).unwrap();
        let value = serde_json::to_value(&result).unwrap();
        assert!(value.get("optimizedResume").is_some());
        assert!(value.get("changesSummary").is_some());
    }

    // -- pre-call input validation ------------------------------------------

    #[test]
    fn test_inputs_both_missing_names_both_fields() {
        let err = validate_optimize_inputs(None, None).unwrap_err();
        match err {
            ValidationError::MissingRequiredData(fields) => {
                assert!(fields.contains("base_resume"));
                assert!(fields.contains("job_description"));
            }
            other => panic!("expected MissingRequiredData, got {other:?}"),
        }
    }

    #[test]
    fn test_blank_input_counts_as_missing() {
        let err = validate_optimize_inputs(Some("   "), Some("a real description")).unwrap_err();
        match err {
            ValidationError::MissingRequiredData(fields) => {
                assert_eq!(fields, "base_resume");
            }
            other => panic!("expected MissingRequiredData, got {other:?}"),
        }
    }

    #[test]
    fn test_short_input_is_invalid_input() {
        let err = validate_optimize_inputs(Some("too short"), Some("a long job description"))
            .unwrap_err();
        match err {
            ValidationError::InvalidInput(msg) => assert!(msg.contains("base_resume")),
            other => panic!("expected InvalidInput, got {other:?}"),
        }
    }

    #[test]
    fn test_ten_character_inputs_pass() {
        assert!(validate_optimize_inputs(Some("0123456789"), Some("0123456789")).is_ok());
    }
}
