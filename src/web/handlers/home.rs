use axum::extract::State;
use axum::response::Response;

use crate::web::render::{HomeView, View};
use crate::web::state::AppState;

pub async fn home(State(state): State<AppState>) -> Response {
    state.renderer.page(View::Home(HomeView {
        version: env!("CARGO_PKG_VERSION"),
    }))
}
