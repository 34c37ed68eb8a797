//! Error taxonomy for the orchestration layer.
//!
//! Every failure surfaced to a caller carries its classification, the remote
//! diagnostic payload where one exists, and (when the recovery engine chose a
//! strategy it could not execute) a suggested next action.

use serde_json::Value;
use thiserror::Error;

use super::models::recovery::ErrorClass;

/// Errors surfaced by the orchestration layer.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Caller input rejected by the remote system. Never retried.
    #[error("validation rejected: {message}")]
    Validation {
        message: String,
        diagnostics: Value,
    },

    /// Resource or scoping context absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// Lease already held, duplicate active changeset, or remote 409.
    /// Surfaced immediately, never retried.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Rate limit still in effect after the retry budget was spent.
    #[error("rate limited: max attempts exceeded after {attempts} attempts")]
    RateLimited {
        attempts: u32,
        diagnostics: Value,
    },

    /// Client-side poll/wait deadline elapsed. The remote operation may
    /// still be in flight; remote state is unknown.
    #[error("deadline exceeded after {waited_ms}ms; the remote operation may still be in flight")]
    Timeout { waited_ms: u64 },

    /// Permission denied without a usable alternative credential.
    #[error("permission denied: {message}")]
    Permission {
        message: String,
        suggestion: Option<String>,
    },

    /// Circuit breaker is open for this operation key; no remote call was
    /// attempted.
    #[error("circuit open for {operation}; retry in {retry_in_ms}ms")]
    CircuitOpen {
        operation: String,
        retry_in_ms: u64,
    },

    /// Activation reached a terminal failure state. Carries the remote
    /// diagnostic payload verbatim.
    #[error("activation ended in {state} on {network}")]
    ActivationFailed {
        state: String,
        network: String,
        diagnostics: Value,
    },

    /// Transport-level failure from the gateway.
    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// Catch-all, surfaced with the raw diagnostic.
    #[error("{message}")]
    Unknown {
        message: String,
        suggestion: Option<String>,
        diagnostics: Value,
    },
}

impl OrchestratorError {
    /// Classification of this error in the recovery taxonomy.
    pub fn classification(&self) -> ErrorClass {
        match self {
            Self::Validation { .. } => ErrorClass::Validation,
            Self::NotFound(_) => ErrorClass::Unknown,
            Self::Conflict(_) => ErrorClass::Conflict,
            Self::RateLimited { .. } => ErrorClass::RateLimited,
            Self::Timeout { .. } => ErrorClass::Timeout,
            Self::Permission { .. } => ErrorClass::PermissionDenied,
            Self::CircuitOpen { .. } => ErrorClass::ServiceUnavailable,
            Self::ActivationFailed { .. } => ErrorClass::Unknown,
            Self::Gateway(e) => e.classification(),
            Self::Unknown { .. } => ErrorClass::Unknown,
        }
    }

    /// Suggested next action attached by the recovery engine, if any.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Permission { suggestion, .. } | Self::Unknown { suggestion, .. } => {
                suggestion.as_deref()
            }
            _ => None,
        }
    }

    /// Attach a suggested-but-unexecuted recovery strategy as metadata.
    pub fn with_suggestion(self, hint: impl Into<String>) -> Self {
        match self {
            Self::Permission { message, .. } => Self::Permission {
                message,
                suggestion: Some(hint.into()),
            },
            Self::Unknown {
                message,
                diagnostics,
                ..
            } => Self::Unknown {
                message,
                suggestion: Some(hint.into()),
                diagnostics,
            },
            other => other,
        }
    }
}

/// Transport and status errors from the remote API gateway.
///
/// The gateway owns authentication, serialization, and raw transport; this
/// layer only needs the status code, the remote error detail when the body
/// carries one, and whether the failure is transient.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Remote rejected the request parameters (400/422).
    #[error("invalid request: {message}")]
    InvalidRequest { message: String, body: Value },

    /// Authentication or authorization failed (401/403).
    #[error("permission denied: {message}")]
    PermissionDenied { message: String, body: Value },

    /// Resource absent on the remote side (404).
    #[error("remote resource not found: {message}")]
    NotFound { message: String },

    /// Remote state conflict (409).
    #[error("remote conflict: {message}")]
    Conflict { message: String, body: Value },

    /// Rate limit exceeded (429). `retry_after_ms` comes from the remote
    /// hint when present.
    #[error("rate limit exceeded")]
    RateLimited {
        retry_after_ms: Option<u64>,
        body: Value,
    },

    /// Remote server fault (500/502).
    #[error("remote server error (status {status}): {message}")]
    ServerError {
        status: u16,
        message: String,
        body: Value,
    },

    /// Remote temporarily unavailable (503).
    #[error("remote service unavailable")]
    ServiceUnavailable { body: Value },

    /// Request or gateway-level deadline elapsed (504 or client timeout).
    #[error("request timed out")]
    Timeout,

    /// Network-level failure before a status was received.
    #[error("network error: {0}")]
    Network(String),

    /// Anything the gateway could not map.
    #[error("unexpected remote response (status {status}): {message}")]
    Unexpected {
        status: u16,
        message: String,
        body: Value,
    },
}

impl GatewayError {
    /// Map an HTTP status and parsed body into a gateway error.
    pub fn from_status(status: u16, body: Value) -> Self {
        let message = body
            .pointer("/detail")
            .or_else(|| body.pointer("/title"))
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();

        match status {
            400 | 422 => Self::InvalidRequest { message, body },
            401 | 403 => Self::PermissionDenied { message, body },
            404 => Self::NotFound { message },
            409 => Self::Conflict { message, body },
            429 => Self::RateLimited {
                retry_after_ms: body
                    .pointer("/retryAfter")
                    .and_then(Value::as_u64)
                    .map(|s| s * 1000),
                body,
            },
            500 | 502 => Self::ServerError {
                status,
                message,
                body,
            },
            503 => Self::ServiceUnavailable { body },
            504 => Self::Timeout,
            _ => Self::Unexpected {
                status,
                message,
                body,
            },
        }
    }

    /// HTTP status associated with this error, if one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::InvalidRequest { .. } => Some(400),
            Self::PermissionDenied { .. } => Some(403),
            Self::NotFound { .. } => Some(404),
            Self::Conflict { .. } => Some(409),
            Self::RateLimited { .. } => Some(429),
            Self::ServerError { status, .. } | Self::Unexpected { status, .. } => Some(*status),
            Self::ServiceUnavailable { .. } => Some(503),
            Self::Timeout => Some(504),
            Self::Network(_) => None,
        }
    }

    /// Whether a retry of the same request could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. }
                | Self::ServerError { .. }
                | Self::ServiceUnavailable { .. }
                | Self::Timeout
                | Self::Network(_)
        )
    }

    /// Remote diagnostic payload, verbatim where one exists.
    pub fn diagnostics(&self) -> Value {
        match self {
            Self::InvalidRequest { body, .. }
            | Self::PermissionDenied { body, .. }
            | Self::Conflict { body, .. }
            | Self::RateLimited { body, .. }
            | Self::ServerError { body, .. }
            | Self::ServiceUnavailable { body }
            | Self::Unexpected { body, .. } => body.clone(),
            Self::NotFound { message } => Value::String(message.clone()),
            Self::Timeout => Value::Null,
            Self::Network(msg) => Value::String(msg.clone()),
        }
    }

    /// Classification in the recovery taxonomy.
    pub fn classification(&self) -> ErrorClass {
        match self {
            Self::InvalidRequest { .. } => ErrorClass::Validation,
            Self::PermissionDenied { .. } => ErrorClass::PermissionDenied,
            Self::NotFound { .. } => ErrorClass::Unknown,
            Self::Conflict { .. } => ErrorClass::Conflict,
            Self::RateLimited { .. } => ErrorClass::RateLimited,
            Self::ServerError { .. } => ErrorClass::TransientServer,
            Self::ServiceUnavailable { .. } => ErrorClass::ServiceUnavailable,
            Self::Timeout | Self::Network(_) => ErrorClass::Timeout,
            Self::Unexpected { .. } => ErrorClass::Unknown,
        }
    }
}

/// Result alias used throughout the orchestration layer.
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_status_mapping() {
        let err = GatewayError::from_status(429, json!({"retryAfter": 2}));
        assert!(matches!(
            err,
            GatewayError::RateLimited {
                retry_after_ms: Some(2000),
                ..
            }
        ));

        let err = GatewayError::from_status(400, json!({"detail": "bad zone"}));
        match err {
            GatewayError::InvalidRequest { message, .. } => assert_eq!(message, "bad zone"),
            other => panic!("unexpected: {other:?}"),
        }

        assert!(matches!(
            GatewayError::from_status(503, Value::Null),
            GatewayError::ServiceUnavailable { .. }
        ));
        assert!(matches!(
            GatewayError::from_status(504, Value::Null),
            GatewayError::Timeout
        ));
        assert!(matches!(
            GatewayError::from_status(418, Value::Null),
            GatewayError::Unexpected { status: 418, .. }
        ));
    }

    #[test]
    fn test_transient_errors() {
        assert!(GatewayError::from_status(429, Value::Null).is_transient());
        assert!(GatewayError::from_status(500, Value::Null).is_transient());
        assert!(GatewayError::from_status(503, Value::Null).is_transient());
        assert!(GatewayError::Timeout.is_transient());
        assert!(GatewayError::Network("reset".into()).is_transient());

        assert!(!GatewayError::from_status(400, Value::Null).is_transient());
        assert!(!GatewayError::from_status(403, Value::Null).is_transient());
        assert!(!GatewayError::from_status(409, Value::Null).is_transient());
    }

    #[test]
    fn test_classification_roundtrip() {
        let err = OrchestratorError::Gateway(GatewayError::from_status(429, Value::Null));
        assert_eq!(err.classification(), ErrorClass::RateLimited);

        let err = OrchestratorError::Conflict("lease held".into());
        assert_eq!(err.classification(), ErrorClass::Conflict);

        let err = OrchestratorError::Timeout { waited_ms: 40_000 };
        assert_eq!(err.classification(), ErrorClass::Timeout);
    }

    #[test]
    fn test_suggestion_metadata() {
        let err = OrchestratorError::Permission {
            message: "no access to contract".into(),
            suggestion: None,
        }
        .with_suggestion("account_switch: configure an alternate tenant credential");

        assert!(err.suggestion().is_some());
        assert!(err.suggestion().unwrap().starts_with("account_switch"));
    }
}
