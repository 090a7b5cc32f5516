//! AI-friendly error types with suggestions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes for protocol responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ElementNotFound,
    ElementAmbiguous,
    StaleReference,
    Timeout,
    NoTab,
    NavigationFailed,
    ConnectionClosed,
    InvalidRequest,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ElementNotFound => "ELEMENT_NOT_FOUND",
            ErrorCode::ElementAmbiguous => "ELEMENT_AMBIGUOUS",
            ErrorCode::StaleReference => "STALE_REFERENCE",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::NoTab => "NO_TAB",
            ErrorCode::NavigationFailed => "NAVIGATION_FAILED",
            ErrorCode::ConnectionClosed => "CONNECTION_CLOSED",
            ErrorCode::InvalidRequest => "INVALID_REQUEST",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error response with AI-friendly context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(suggestion) = &self.suggestion {
            write!(f, " (hint: {})", suggestion)?;
        }
        Ok(())
    }
}

impl std::error::Error for ApiError {}

impl ApiError {
    fn with(code: ErrorCode, message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            suggestion: Some(suggestion.into()),
        }
    }

    pub fn ref_not_found(reference: &str) -> Self {
        Self::with(
            ErrorCode::ElementNotFound,
            format!("Reference '{}' is not known", reference),
            "Run 'tabpilot snapshot' to get current element references",
        )
    }

    /// Create a not-found error for a pattern or role selector.
    pub fn no_match(selector: impl fmt::Display) -> Self {
        Self::with(
            ErrorCode::ElementNotFound,
            format!("No element matches {}", selector),
            "Take a fresh snapshot and check the role, name or pattern",
        )
    }

    pub fn ambiguous(selector: impl fmt::Display, count: usize) -> Self {
        Self::with(
            ErrorCode::ElementAmbiguous,
            format!("{} elements match {}", count, selector),
            "Address the element by its snapshot reference or narrow the selector",
        )
    }

    pub fn stale_reference(reference: &str) -> Self {
        Self::with(
            ErrorCode::StaleReference,
            format!("Reference '{}' points to an element that is no longer in the page", reference),
            "The page changed since the snapshot. Run 'tabpilot snapshot' again",
        )
    }

    pub fn timeout(method: &str, timeout_ms: u128) -> Self {
        Self::with(
            ErrorCode::Timeout,
            format!("'{}' did not complete within {}ms", method, timeout_ms),
            "The page host may be busy or hung; retry or restart 'tabpilot host'",
        )
    }

    pub fn no_tab() -> Self {
        Self::with(
            ErrorCode::NoTab,
            "No page host is connected",
            "Start one with 'tabpilot host --url <url>'",
        )
    }

    pub fn navigation_failed(url: &str, reason: impl fmt::Display) -> Self {
        Self::with(
            ErrorCode::NavigationFailed,
            format!("Failed to load '{}': {}", url, reason),
            "Check the URL. Supported schemes are about:blank, data: and file:",
        )
    }

    pub fn connection_closed() -> Self {
        Self::with(
            ErrorCode::ConnectionClosed,
            "Connection to the page host closed before a response arrived",
            "Reconnect the page host and retry the command",
        )
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::with(
            ErrorCode::InvalidRequest,
            message,
            "Check the command parameters and try again",
        )
    }

    /// Create an invalid request error with a custom suggestion.
    pub fn invalid_request_with_suggestion(
        message: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::with(ErrorCode::InvalidRequest, message, suggestion)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::with(
            ErrorCode::InternalError,
            message,
            "This is an internal error. Please report it if it persists.",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// All error constructors must provide a suggestion.
    fn assert_has_suggestion(err: &ApiError, context: &str) {
        assert!(
            err.suggestion.is_some(),
            "{} should have a suggestion, but got None",
            context
        );
    }

    #[test]
    fn test_every_constructor_has_suggestion() {
        let cases = [
            (ApiError::ref_not_found("e9"), "ref_not_found"),
            (ApiError::no_match("role=button"), "no_match"),
            (ApiError::ambiguous("role=button", 2), "ambiguous"),
            (ApiError::stale_reference("e1"), "stale_reference"),
            (ApiError::timeout("snapshot", 30000), "timeout"),
            (ApiError::no_tab(), "no_tab"),
            (ApiError::navigation_failed("x", "bad"), "navigation_failed"),
            (ApiError::connection_closed(), "connection_closed"),
            (ApiError::invalid_request("bad"), "invalid_request"),
            (ApiError::internal("oops"), "internal"),
        ];
        for (err, context) in &cases {
            assert_has_suggestion(err, context);
        }
    }

    #[test]
    fn test_ref_not_found_mentions_ref() {
        let err = ApiError::ref_not_found("e99");
        assert_eq!(err.code, ErrorCode::ElementNotFound);
        assert!(err.message.contains("e99"));
        assert!(err.suggestion.as_ref().unwrap().contains("snapshot"));
    }

    #[test]
    fn test_ambiguous_reports_count() {
        let err = ApiError::ambiguous("role=button name=\"OK\"", 3);
        assert_eq!(err.code, ErrorCode::ElementAmbiguous);
        assert!(err.message.starts_with("3 elements"));
    }

    #[test]
    fn test_display_format_with_suggestion() {
        let err = ApiError::no_tab();
        let display = format!("{}", err);
        assert!(display.contains("[NO_TAB]"));
        assert!(display.contains("(hint:"));
    }

    #[test]
    fn test_code_display_matches_serde() {
        for code in [
            ErrorCode::ElementNotFound,
            ErrorCode::StaleReference,
            ErrorCode::ConnectionClosed,
            ErrorCode::InternalError,
        ] {
            let json = serde_json::to_string(&code).unwrap();
            assert_eq!(json, format!("\"{}\"", code));
        }
    }

    #[test]
    fn test_json_deserialization_without_suggestion() {
        let json = r#"{"code":"TIMEOUT","message":"too slow"}"#;
        let err: ApiError = serde_json::from_str(json).unwrap();
        assert_eq!(err.code, ErrorCode::Timeout);
        assert_eq!(err.message, "too slow");
        assert_eq!(err.suggestion, None);
    }
}
