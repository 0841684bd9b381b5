use axum::body::Bytes;
use log::{debug, warn};
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use serde::Serialize;
use thiserror::Error;

use crate::deadline::Deadline;
use crate::error::QaDeskError;

const GENERATE_ANSWER_PATH: &str = "/generate-answer";
const DEFAULT_CONTENT_TYPE: &str = "application/json";

#[derive(Error, Debug)]
pub enum GatewayError {
    /// The service could not be reached or its response could not be read.
    #[error("answer service unavailable: {0}")]
    Unavailable(String),

    /// The service answered with a non-success status.
    #[error("answer service returned {status}")]
    Upstream {
        status: StatusCode,
        content_type: String,
        body: Bytes,
    },
}

/// A successful reply, relayed to the caller untouched.
#[derive(Debug, Clone)]
pub struct AnswerReply {
    pub content_type: String,
    pub body: Bytes,
}

#[derive(Serialize)]
struct AskRequest<'a> {
    question: &'a str,
}

/// Forwards questions to the external answer service. One attempt per call,
/// no retries.
#[derive(Clone)]
pub struct AnswerProxy {
    client: reqwest::Client,
    base_url: String,
}

impl AnswerProxy {
    pub fn new(base_url: impl Into<String>) -> Result<Self, QaDeskError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| QaDeskError::Error(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
        })
    }

    pub fn endpoint(&self) -> String {
        format!("{}{}", self.base_url, GENERATE_ANSWER_PATH)
    }

    pub async fn ask(&self, question: &str, deadline: Deadline) -> Result<AnswerReply, GatewayError> {
        if deadline.is_expired() {
            return Err(GatewayError::Unavailable("deadline exceeded".into()));
        }

        let url = self.endpoint();
        debug!("Forwarding question to {}", url);

        let response = self
            .client
            .post(&url)
            .timeout(deadline.remaining())
            .json(&AskRequest { question })
            .send()
            .await
            .map_err(|e| {
                warn!("Answer service request failed: {}", e);
                GatewayError::Unavailable(e.to_string())
            })?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_owned();

        let body = response.bytes().await.map_err(|e| {
            warn!("Failed to read answer service response: {}", e);
            GatewayError::Unavailable(e.to_string())
        })?;

        if status.as_u16() >= 300 {
            warn!("Answer service returned {}", status);
            return Err(GatewayError::Upstream {
                status,
                content_type,
                body,
            });
        }

        Ok(AnswerReply { content_type, body })
    }
}
