//! HTTP route handlers for the correction API.

use axum::Router;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Json, Response};
use axum::routing::{get, post};
use autofix::correct::{CorrectError, correct_code};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, warn};

use crate::state::AppState;

const INVALID_PAYLOAD: &str = "Invalid request payload.";

const INDEX_HTML: &str = include_str!("../static/index.html");

/// Build the API router.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/correct", post(correct))
}

pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn health() -> &'static str {
    "ok"
}

/// Body of `POST /api/correct`. Both fields are required; they are optional
/// here so a missing or null field maps to our own 400 instead of axum's 422.
#[derive(Debug, Deserialize)]
pub struct CorrectRequest {
    pub code: Option<String>,
    pub prompt: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CorrectResponse {
    pub corrected_code: String,
}

/// Error body `{"error": ...}` with its status.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

/// POST /api/correct - rewrite `code` following `prompt`.
pub async fn correct(
    State(state): State<AppState>,
    payload: Result<Json<CorrectRequest>, JsonRejection>,
) -> Result<Json<CorrectResponse>, ApiError> {
    let Ok(Json(request)) = payload else {
        warn!("rejected malformed correction payload");
        return Err(ApiError::bad_request(INVALID_PAYLOAD));
    };
    let (Some(code), Some(prompt)) = (request.code, request.prompt) else {
        warn!("rejected correction payload with missing fields");
        return Err(ApiError::bad_request(INVALID_PAYLOAD));
    };

    let oracle = state.oracle.clone();
    let result =
        tokio::task::spawn_blocking(move || correct_code(oracle.as_ref(), &code, Some(prompt.as_str())))
            .await
            .map_err(|err| {
                error!(err = %err, "correction task failed");
                ApiError::internal(err.to_string())
            })?;

    match result {
        Ok(corrected_code) => Ok(Json(CorrectResponse { corrected_code })),
        Err(CorrectError::EmptyInput) => Err(ApiError::bad_request(INVALID_PAYLOAD)),
        Err(err) => {
            error!(err = %err, "correction failed");
            Err(ApiError::internal(err.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use autofix::io::oracle::OracleError;
    use autofix::test_support::ScriptedOracle;

    use super::*;

    fn state_with(oracle: Arc<ScriptedOracle>) -> State<AppState> {
        State(AppState::new(oracle))
    }

    fn body(code: Option<&str>, prompt: Option<&str>) -> Result<Json<CorrectRequest>, JsonRejection> {
        Ok(Json(CorrectRequest {
            code: code.map(str::to_string),
            prompt: prompt.map(str::to_string),
        }))
    }

    #[tokio::test]
    async fn health_is_ok() {
        assert_eq!(health().await, "ok");
    }

    #[tokio::test]
    async fn index_serves_form() {
        let Html(page) = index().await;
        assert!(page.contains("/api/correct"));
    }

    #[tokio::test]
    async fn missing_prompt_is_bad_request() {
        let oracle = Arc::new(ScriptedOracle::new(vec![]));
        let err = correct(state_with(oracle.clone()), body(Some("x = 1"), None))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.message, INVALID_PAYLOAD);
        assert_eq!(oracle.calls(), 0);
    }

    #[tokio::test]
    async fn missing_code_is_bad_request() {
        let oracle = Arc::new(ScriptedOracle::new(vec![]));
        let err = correct(state_with(oracle), body(None, Some("Fix it")))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn null_code_is_bad_request() {
        let request: CorrectRequest =
            serde_json::from_str(r#"{"code": null, "prompt": "Fix it"}"#).expect("json");
        let oracle = Arc::new(ScriptedOracle::new(vec![]));
        let err = correct(state_with(oracle.clone()), Ok(Json(request)))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.message, INVALID_PAYLOAD);
        assert_eq!(oracle.calls(), 0);
    }

    #[tokio::test]
    async fn success_returns_sanitized_code() {
        let oracle = Arc::new(ScriptedOracle::new(vec![Ok(
            "Here you go:\n```python\nprint('hi')\n```".to_string(),
        )]));
        let Json(response) = correct(
            state_with(oracle.clone()),
            body(Some("print 'hi'"), Some("Port to Python 3")),
        )
        .await
        .expect("corrected");

        assert_eq!(response.corrected_code, "print('hi')");
        let prompts = oracle.prompts();
        assert_eq!(prompts[0].system.as_deref(), Some("Port to Python 3"));
        assert_eq!(prompts[0].prompt, "print 'hi'");
    }

    #[tokio::test]
    async fn oracle_failure_is_internal_error() {
        let oracle = Arc::new(ScriptedOracle::new(vec![Err(OracleError::permanent(
            "HTTP 403: API key not valid",
        ))]));
        let err = correct(state_with(oracle), body(Some("x = 1"), Some("Fix it")))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.message.contains("API key not valid"));
    }

    #[tokio::test]
    async fn empty_reply_is_internal_error() {
        let oracle = Arc::new(ScriptedOracle::new(vec![Ok("```\n```".to_string())]));
        let err = correct(state_with(oracle), body(Some("x = 1"), Some("Fix it")))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
