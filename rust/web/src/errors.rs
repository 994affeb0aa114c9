//! Error handling for the web layer.
//!
//! Session store transactions return typed failures; this module maps them
//! onto the wire format every endpoint shares: a machine-readable code, a
//! human-readable message, optional structured details, and a status code.

use serde::{Deserialize, Serialize};
use std::fmt;
use warp::http::StatusCode;
use warp::reply::{self, Response};
use warp::Reply;

/// Standard error body for all API endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorResponse {
    /// Machine-readable error code (e.g., "not_your_turn")
    pub error: String,
    /// Human-readable error message
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(
        error: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            details: Some(details),
        }
    }

    pub fn into_response(self, status: StatusCode) -> Response {
        reply::with_status(reply::json(&self), status).into_response()
    }
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error, self.message)
    }
}

/// Classification used to pick the log level for a rejected request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Expected client errors (4xx), normal operation
    Client,
    /// Unexpected server errors (5xx)
    Server,
    /// System integrity at risk (poisoned storage and the like)
    Critical,
}

/// Conversion from a typed failure to an HTTP response, with logging.
pub trait IntoErrorResponse {
    fn status_code(&self) -> StatusCode;

    fn error_code(&self) -> &'static str;

    fn error_message(&self) -> String;

    fn error_details(&self) -> Option<serde_json::Value> {
        None
    }

    fn severity(&self) -> ErrorSeverity {
        if self.status_code().is_server_error() {
            ErrorSeverity::Server
        } else {
            ErrorSeverity::Client
        }
    }

    fn to_error_response(&self) -> ErrorResponse {
        if let Some(details) = self.error_details() {
            ErrorResponse::with_details(self.error_code(), self.error_message(), details)
        } else {
            ErrorResponse::new(self.error_code(), self.error_message())
        }
    }

    fn into_http_response(self) -> Response
    where
        Self: Sized,
    {
        let status = self.status_code();
        let severity = self.severity();
        let body = self.to_error_response();

        match severity {
            ErrorSeverity::Client => {
                tracing::info!(error = %body.error, message = %body.message, "client error");
            }
            ErrorSeverity::Server => {
                tracing::error!(error = %body.error, message = %body.message, "server error");
            }
            ErrorSeverity::Critical => {
                tracing::error!(error = %body.error, message = %body.message, "critical error");
            }
        }

        body.into_response(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn error_response_serialization() {
        let error = ErrorResponse::new("not_your_turn", "It's not player p2's turn");
        let value = serde_json::to_value(&error).expect("serialize");

        assert_eq!(value["error"], "not_your_turn");
        assert_eq!(value["message"], "It's not player p2's turn");
        assert!(value.get("details").is_none());
    }

    #[test]
    fn error_response_with_details() {
        let error = ErrorResponse::with_details(
            "invalid_turn_number",
            "stale submission",
            json!({"expected": 4, "got": 3}),
        );
        let value = serde_json::to_value(&error).expect("serialize");
        assert_eq!(value["details"]["expected"], 4);
    }

    #[test]
    fn error_response_display() {
        let error = ErrorResponse::new("game_not_found", "no such session");
        assert_eq!(format!("{error}"), "game_not_found: no such session");
    }
}
