use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::core::DispatchError;
use crate::llm::{ErrorKind, ErrorPayload, ProviderFailure};

/// Gateway-level failures. Every variant renders the OpenAI error envelope.
#[derive(Debug)]
pub enum ApiError {
    /// Missing or unknown gateway key (401)
    Unauthorized,

    /// No route for the request URL (404)
    UnknownUrl,

    /// `LLM_PROVIDER` names no registered adapter (400)
    InvalidProvider(String),

    /// Body is not valid JSON for the endpoint (400)
    InvalidBody(String),

    /// Body exceeds the request size limit (413)
    PayloadTooLarge,

    /// Adapter failure, surfaced with its own status and payload
    Upstream(ProviderFailure),
}

impl ApiError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::UnknownUrl => StatusCode::NOT_FOUND,
            Self::InvalidProvider(_) | Self::InvalidBody(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Upstream(failure) => StatusCode::from_u16(failure.status_code)
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        }
    }

    pub fn payload(&self) -> ErrorPayload {
        match self {
            Self::Unauthorized => ErrorKind::AuthRequired.payload(),
            Self::UnknownUrl => ErrorKind::InvalidRequestUrl.payload(),
            Self::InvalidProvider(_) => ErrorKind::InvalidProvider.payload(),
            Self::InvalidBody(_) | Self::PayloadTooLarge => ErrorKind::BadRequest.payload(),
            Self::Upstream(failure) => failure.error.clone(),
        }
    }

    /// Get error message
    pub fn message(&self) -> String {
        self.payload().error.message
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status_code(), axum::Json(self.payload())).into_response()
    }
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::InvalidProvider(name) => Self::InvalidProvider(name),
            DispatchError::InvalidBody(reason) => Self::InvalidBody(reason),
            DispatchError::Provider(failure) => Self::Upstream(failure),
        }
    }
}

impl From<ProviderFailure> for ApiError {
    fn from(failure: ProviderFailure) -> Self {
        Self::Upstream(failure)
    }
}
