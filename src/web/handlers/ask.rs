use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use log::debug;
use serde::Deserialize;

use crate::answer_proxy::GatewayError;
use crate::deadline::{Deadline, ANSWER_PROXY};
use crate::web::render::{AskView, View};
use crate::web::state::AppState;

use super::error_json;

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    #[serde(default)]
    pub question: Option<String>,
}

const ASK_ENDPOINT: &str = "/api/ask";

/// GET /ask
pub async fn ask_page(State(state): State<AppState>) -> Response {
    state.renderer.page(View::Ask(AskView {
        endpoint: ASK_ENDPOINT,
    }))
}

/// POST /api/ask
///
/// Forwards the question to the answer service and relays its reply. The
/// upstream body is passed through untouched on success and on upstream
/// errors; only an unreachable service gets a body of our own.
pub async fn ask_api(
    State(state): State<AppState>,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> Response {
    let question = match payload {
        Ok(Json(req)) => req.question.unwrap_or_default(),
        Err(rejection) => {
            debug!("Rejected ask request: {}", rejection);
            return error_json(StatusCode::BAD_REQUEST, "invalid request");
        }
    };

    if question.trim().is_empty() {
        return error_json(StatusCode::BAD_REQUEST, "question is required");
    }

    match state.answers.ask(&question, Deadline::within(ANSWER_PROXY)).await {
        Ok(reply) => relay(StatusCode::OK, &reply.content_type, reply.body),
        Err(GatewayError::Unavailable(_)) => {
            error_json(StatusCode::BAD_GATEWAY, "answer service unavailable")
        }
        Err(GatewayError::Upstream {
            content_type, body, ..
        }) => relay(StatusCode::BAD_GATEWAY, &content_type, body),
    }
}

fn relay(status: StatusCode, content_type: &str, body: Bytes) -> Response {
    let content_type = HeaderValue::from_str(content_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/json"));
    (status, [(CONTENT_TYPE, content_type)], body).into_response()
}
