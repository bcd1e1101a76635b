//! Error taxonomy for FakeAI
//!
//! Mirrors the kinds enumerated in the specification's failure semantics:
//! validation, auth, rate-limit, context-overflow, not-found, timeout,
//! cancelled, overload, internal. Conversion to the OpenAI error envelope
//! happens only here, at the HTTP boundary — internal crates propagate
//! `Result<T, Error>` and never format JSON themselves.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Validation(String),

    #[error("invalid api key")]
    InvalidApiKey,

    #[error("missing api key")]
    MissingApiKey,

    #[error("rate limit exceeded")]
    RateLimitExceeded { retry_after_secs: u64 },

    #[error(
        "This model's maximum context length is {context_window} tokens. However, your messages resulted in {total_tokens} tokens ({prompt_tokens} in the messages, {completion_tokens} in the completion). Please reduce the length of the messages or completion."
    )]
    ContextLengthExceeded {
        context_window: u32,
        prompt_tokens: u32,
        completion_tokens: u32,
        total_tokens: u32,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("request timed out")]
    Timeout,

    #[error("request cancelled")]
    Cancelled,

    #[error("server overloaded")]
    Overload,

    #[error("internal error: {0}")]
    Internal(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// The OpenAI-style `code` field for this error kind.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Validation(_) => "invalid_request_error",
            Error::InvalidApiKey => "invalid_api_key",
            Error::MissingApiKey => "invalid_api_key",
            Error::RateLimitExceeded { .. } => "rate_limit_exceeded",
            Error::ContextLengthExceeded { .. } => "context_length_exceeded",
            Error::NotFound(_) => "not_found",
            Error::Timeout => "timeout",
            Error::Cancelled => "cancelled",
            Error::Overload => "overloaded",
            Error::Internal(_) => "internal_error",
            Error::Serialization(_) => "invalid_request_error",
        }
    }

    /// The `type` field OpenAI clients match on.
    pub fn error_type(&self) -> &'static str {
        match self {
            Error::InvalidApiKey | Error::MissingApiKey => "invalid_request_error",
            Error::RateLimitExceeded { .. } => "rate_limit_error",
            Error::Overload => "overloaded_error",
            Error::Internal(_) => "internal_error",
            _ => "invalid_request_error",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Error::Validation(_) | Error::ContextLengthExceeded { .. } | Error::Serialization(_) => {
                StatusCode::BAD_REQUEST
            }
            Error::InvalidApiKey | Error::MissingApiKey => StatusCode::UNAUTHORIZED,
            Error::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Timeout => StatusCode::REQUEST_TIMEOUT,
            Error::Cancelled => StatusCode::BAD_REQUEST,
            Error::Overload => StatusCode::SERVICE_UNAVAILABLE,
            Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn param(&self) -> Option<&'static str> {
        match self {
            Error::ContextLengthExceeded { .. } => Some("messages"),
            _ => None,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    message: String,
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    param: Option<&'static str>,
    code: &'static str,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        if matches!(self, Error::Internal(_)) {
            let trace_id = uuid::Uuid::new_v4();
            tracing::error!(%trace_id, error = %self, "internal error");
        }

        let retry_after = match &self {
            Error::RateLimitExceeded { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        };

        let body = ErrorBody {
            error: ErrorDetail {
                message: self.to_string(),
                kind: self.error_type(),
                param: self.param(),
                code: self.code(),
            },
        };

        let mut response = (status, axum::Json(body)).into_response();
        if let Some(secs) = retry_after
            && let Ok(value) = axum::http::HeaderValue::from_str(&secs.to_string())
        {
            response.headers_mut().insert("retry-after", value);
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_overflow_message_contains_window() {
        let err = Error::ContextLengthExceeded {
            context_window: 8192,
            prompt_tokens: 7000,
            completion_tokens: 200000,
            total_tokens: 207000,
        };
        assert!(err.to_string().contains("8192"));
        assert_eq!(err.code(), "context_length_exceeded");
    }

    #[test]
    fn rate_limit_exceeded_carries_retry_after() {
        let err = Error::RateLimitExceeded { retry_after_secs: 12 };
        assert_eq!(err.code(), "rate_limit_exceeded");
        assert_eq!(err.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn invalid_api_key_is_401() {
        assert_eq!(Error::InvalidApiKey.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(Error::MissingApiKey.status(), StatusCode::UNAUTHORIZED);
    }
}
