use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use rusqlite::Error as RusqliteError;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QaDeskError {
    #[error("{0}")]
    Validation(String), // Rejected user input, shown inline on forms

    #[error("qa pair {0} not found")]
    NotFound(i64),

    #[error("Database error: {0}")]
    Database(#[from] RusqliteError), // Converts rusqlite::Error automatically

    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Deadline exceeded while waiting for {0}")]
    Timeout(&'static str),

    #[error("Template error: {0}")]
    Template(#[from] handlebars::RenderError),

    #[error("Template setup error: {0}")]
    TemplateSetup(#[from] handlebars::TemplateError),

    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    #[error("Error: {0}")]
    Error(String), // Allows custom application errors
}

impl QaDeskError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            QaDeskError::Validation(_) => StatusCode::BAD_REQUEST,
            QaDeskError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Page-level mapping. Store failures expose their message; this is an internal tool.
impl IntoResponse for QaDeskError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match self {
            QaDeskError::NotFound(_) => (status, "404 page not found").into_response(),
            other => {
                if status.is_server_error() {
                    log::error!("Request failed: {}", other);
                }
                (status, other.to_string()).into_response()
            }
        }
    }
}
