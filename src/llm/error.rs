//! Canonical error catalog and native-status mapping.
//!
//! Whatever provider fails, clients always receive the OpenAI error envelope
//! `{"error": {"message", "type", "param", "code"}}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::transport::NativeResponse;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub message: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub param: Option<String>,
    pub code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub error: ErrorDetail,
}

impl ErrorPayload {
    /// Accept a provider body that is already an OpenAI error envelope.
    pub fn from_native(body: &Value) -> Option<Self> {
        let error = body.get("error")?;
        let message = error.get("message")?.as_str()?;
        let text = |key: &str| {
            error
                .get(key)
                .and_then(Value::as_str)
                .map(str::to_string)
        };

        Some(Self {
            error: ErrorDetail {
                message: message.to_string(),
                kind: text("type").unwrap_or_else(|| "invalid_request_error".to_string()),
                param: text("param"),
                code: text("code"),
            },
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    AuthRequired,
    InvalidProvider,
    BadRequest,
    ModelNotFound,
    NotImplemented,
    InternalServerError,
    UnknownError,
    InvalidRequestUrl,
}

impl ErrorKind {
    pub fn default_status(&self) -> u16 {
        match self {
            Self::AuthRequired => 401,
            Self::InvalidProvider => 400,
            Self::BadRequest => 400,
            Self::ModelNotFound => 404,
            Self::NotImplemented => 400,
            Self::InternalServerError => 500,
            Self::UnknownError => 500,
            Self::InvalidRequestUrl => 404,
        }
    }

    pub fn payload(&self) -> ErrorPayload {
        let (message, kind, code) = match self {
            Self::AuthRequired => (
                "You didn't provide an API key. You need to provide your API key in an \
                 Authorization header using Bearer auth (i.e. Authorization: Bearer YOUR_KEY).",
                "invalid_request_error",
                None,
            ),
            Self::InvalidProvider => (
                "Invalid LLM Provider specified.",
                "invalid_llm_provider",
                None,
            ),
            Self::BadRequest => ("Invalid Request Body.", "invalid_request_body", None),
            Self::ModelNotFound => (
                "The model does not exist or you do not have access to it.",
                "invalid_request_error",
                Some("model_not_found"),
            ),
            Self::NotImplemented => ("Not Implemented.", "not_implemented", None),
            Self::InternalServerError => ("Internal Server Error.", "internal_server_error", None),
            Self::UnknownError => ("Unknown Error.", "unknown_error", None),
            Self::InvalidRequestUrl => (
                "Unknown request URL. Please check the URL for typos.",
                "invalid_request_error",
                Some("unknown_url"),
            ),
        };

        ErrorPayload {
            error: ErrorDetail {
                message: message.to_string(),
                kind: kind.to_string(),
                param: None,
                code: code.map(str::to_string),
            },
        }
    }
}

/// Failed arm of an adapter call: HTTP status plus canonical error body.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("provider call failed with status {status_code}: {}", .error.error.message)]
pub struct ProviderFailure {
    pub status_code: u16,
    pub error: ErrorPayload,
}

impl ProviderFailure {
    pub fn new(kind: ErrorKind) -> Self {
        Self::with_status(kind, kind.default_status())
    }

    pub fn with_status(kind: ErrorKind, status_code: u16) -> Self {
        Self {
            status_code,
            error: kind.payload(),
        }
    }

    /// Catalog entry with a more specific message.
    pub fn with_message(kind: ErrorKind, message: impl Into<String>) -> Self {
        let mut failure = Self::new(kind);
        failure.error.error.message = message.into();
        failure
    }

    pub fn code(&self) -> Option<&str> {
        self.error.error.code.as_deref()
    }
}

pub type ProviderResult<T> = Result<T, ProviderFailure>;

/// Map a non-200 completion or embedding response onto the catalog.
pub fn completion_failure(response: &NativeResponse) -> ProviderFailure {
    match response.status {
        400 if response.body.mentions("model is required") => {
            ProviderFailure::with_status(ErrorKind::ModelNotFound, 400)
        }
        400 => ProviderFailure::new(ErrorKind::BadRequest),
        500 => ProviderFailure::new(ErrorKind::InternalServerError),
        _ => ProviderFailure::new(ErrorKind::UnknownError),
    }
}

/// Map a non-200 model catalog response; the native status is preserved.
pub fn catalog_failure(response: &NativeResponse) -> ProviderFailure {
    let kind = match response.status {
        404 => ErrorKind::InvalidRequestUrl,
        401 => ErrorKind::AuthRequired,
        400 => ErrorKind::BadRequest,
        500 => ErrorKind::InternalServerError,
        _ => ErrorKind::UnknownError,
    };
    ProviderFailure::with_status(kind, response.status)
}

/// A 200 response that lacks the field the adapter needs.
pub fn malformed_success(provider: &str, field: &str) -> ProviderFailure {
    tracing::warn!(provider, field, "provider success body is missing expected field");
    ProviderFailure::new(ErrorKind::UnknownError)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::transport::NativeBody;
    use serde_json::json;

    fn response(status: u16, body: Value) -> NativeResponse {
        NativeResponse::new(status, NativeBody::Json(body))
    }

    #[test]
    fn test_payload_shape() {
        let value = serde_json::to_value(ErrorKind::ModelNotFound.payload()).unwrap();
        assert_eq!(
            value,
            json!({
                "error": {
                    "message": "The model does not exist or you do not have access to it.",
                    "type": "invalid_request_error",
                    "param": null,
                    "code": "model_not_found"
                }
            })
        );
    }

    #[test]
    fn test_completion_failure_mapping() {
        let missing_model = completion_failure(&response(400, json!({"error": "model is required"})));
        assert_eq!(missing_model.status_code, 400);
        assert_eq!(missing_model.code(), Some("model_not_found"));

        let bad = completion_failure(&response(400, json!({"error": "bad"})));
        assert_eq!(bad.error.error.kind, "invalid_request_body");

        let internal = completion_failure(&response(500, json!({})));
        assert_eq!(internal.error.error.kind, "internal_server_error");
        assert_eq!(internal.status_code, 500);

        let other = completion_failure(&response(503, json!({})));
        assert_eq!(other.status_code, 500);
        assert_eq!(other.error.error.kind, "unknown_error");
    }

    #[test]
    fn test_catalog_failure_keeps_status() {
        let not_found = catalog_failure(&response(404, json!({})));
        assert_eq!(not_found.status_code, 404);
        assert_eq!(not_found.code(), Some("unknown_url"));

        let teapot = catalog_failure(&response(418, json!({})));
        assert_eq!(teapot.status_code, 418);
        assert_eq!(teapot.error.error.kind, "unknown_error");
    }

    #[test]
    fn test_from_native_envelope() {
        let payload = ErrorPayload::from_native(&json!({
            "error": {"message": "Incorrect API key", "type": "invalid_request_error", "code": "invalid_api_key"}
        }))
        .unwrap();
        assert_eq!(payload.error.code.as_deref(), Some("invalid_api_key"));
        assert!(payload.error.param.is_none());

        assert!(ErrorPayload::from_native(&json!({"error": "plain"})).is_none());
    }
}
