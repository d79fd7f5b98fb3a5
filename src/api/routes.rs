use crate::api::ApiError;
use crate::core::{ChatReply, Router};
use crate::llm::StreamFrame;
use axum::body::{Body, Bytes};
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::ReceiverStream;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub gateway: String,
}

/// Health check handler
pub async fn health() -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            gateway: "switchyard".to_string(),
        }),
    )
}

/// `POST /v1/chat/completions`
pub async fn chat_completions(
    State(router): State<Arc<Router>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    match router.chat_completions(&headers, &body).await? {
        ChatReply::Complete(completion) => Ok(Json(completion).into_response()),
        ChatReply::Stream(frames) => Ok(sse_response(frames, router.stream_delay())),
    }
}

/// `POST /v1/embeddings`
pub async fn embeddings(
    State(router): State<Arc<Router>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let response = router.embeddings(&headers, &body).await?;
    Ok(Json(response).into_response())
}

/// `GET /v1/models`
pub async fn list_models(
    State(router): State<Arc<Router>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let models = router.list_models(&headers).await?;
    Ok(Json(models).into_response())
}

/// `GET /v1/models/{model_id}`; ids may contain slashes.
pub async fn get_model(
    State(router): State<Arc<Router>>,
    Path(model_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let model = router.get_model(&headers, &model_id).await?;
    Ok(Json(model).into_response())
}

pub async fn unknown_url() -> ApiError {
    ApiError::UnknownUrl
}

/// Stream pre-rendered frames as `text/event-stream`. A producer task feeds
/// the body through a channel so the optional delay paces delivery.
fn sse_response(frames: Vec<StreamFrame>, delay: Duration) -> Response {
    let (sender, receiver) = tokio::sync::mpsc::channel::<Result<String, Infallible>>(32);

    tokio::spawn(async move {
        for (i, frame) in frames.iter().enumerate() {
            if i > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if sender.send(Ok(frame.to_sse())).await.is_err() {
                tracing::debug!("client went away mid-stream");
                break;
            }
        }
    });

    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(ReceiverStream::new(receiver)),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_response_format() {
        let response = HealthResponse {
            status: "ok".to_string(),
            version: "0.1.0".to_string(),
            gateway: "switchyard".to_string(),
        };

        assert_eq!(response.status, "ok");
        assert_eq!(response.gateway, "switchyard");
    }
}
