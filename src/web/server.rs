use axum::{
    extract::{Path, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use rust_embed::RustEmbed;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::time::Instant;

use crate::deadline::{Deadline, SHORT_READ};
use crate::error::QaDeskError;

use super::handlers::{self, ask, home, qa};
use super::state::AppState;

#[derive(RustEmbed)]
#[folder = "static/"]
struct Asset;

pub struct WebServer {
    host: String,
    port: u16,
}

impl WebServer {
    pub fn new(host: String, port: u16) -> Self {
        Self { host, port }
    }

    pub async fn start(&self, state: AppState) -> Result<(), QaDeskError> {
        let app = create_router(state);

        let addr: SocketAddr = format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| QaDeskError::Error(format!("Invalid address: {}", e)))?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| QaDeskError::Error(format!("Failed to bind to {}: {}", addr, e)))?;

        println!("qadesk listening on http://{}", addr);
        log::info!("Server ready to handle requests on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                shutdown_signal().await;
                log::info!("Shutdown signal received, draining connections");
                println!("\nShutdown signal received - stopping server gracefully...");
            })
            .await
            .map_err(|e| QaDeskError::Error(format!("Server error: {}", e)))?;

        log::info!("Server shutdown complete");
        Ok(())
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(home::home).fallback(method_not_allowed))
        .route("/health", get(health_check).fallback(method_not_allowed))
        // Ask
        .route("/ask", get(ask::ask_page).fallback(method_not_allowed))
        .route("/api/ask", post(ask::ask_api).fallback(method_not_allowed))
        // QA pairs
        .route("/qa", get(qa::list).fallback(method_not_allowed))
        .route(
            "/qa/create",
            get(qa::create_form).post(qa::create).fallback(method_not_allowed),
        )
        .route(
            "/qa/edit",
            get(qa::edit_form).post(qa::edit).fallback(method_not_allowed),
        )
        .route(
            "/qa/delete",
            get(qa::delete_confirm).post(qa::delete).fallback(method_not_allowed),
        )
        // Embedded assets
        .route("/static/{*path}", get(static_handler).fallback(method_not_allowed))
        .fallback(not_found)
        .layer(middleware::from_fn(access_log))
        .with_state(state)
}

/// Logs one line per request once the response is ready.
async fn access_log(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let query = req
        .uri()
        .query()
        .map(|q| format!("?{}", q))
        .unwrap_or_default();
    let started = Instant::now();

    let response = next.run(req).await;

    log::info!(
        "{} {}{} {} {:?}",
        method,
        path,
        query,
        response.status().as_u16(),
        started.elapsed()
    );
    response
}

async fn health_check(State(state): State<AppState>) -> Response {
    match state.store.ping(Deadline::within(SHORT_READ)).await {
        Ok(()) => (StatusCode::OK, "ok").into_response(),
        Err(e) => {
            log::warn!("Health check failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, "unavailable").into_response()
        }
    }
}

async fn method_not_allowed() -> Response {
    handlers::error_json(StatusCode::METHOD_NOT_ALLOWED, "method not allowed")
}

async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "404 page not found").into_response()
}

async fn static_handler(Path(path): Path<String>) -> Response {
    match Asset::get(&path) {
        Some(content) => {
            let mime = mime_guess::from_path(&path).first_or_octet_stream();
            (
                [(header::CONTENT_TYPE, mime.as_ref().to_owned())],
                content.data,
            )
                .into_response()
        }
        None => not_found().await,
    }
}

/// Waits for a shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            log::info!("Received SIGINT (Ctrl+C)");
        },
        _ = terminate => {
            log::info!("Received SIGTERM");
        },
    }
}
