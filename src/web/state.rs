use std::sync::Arc;

use crate::answer_proxy::AnswerProxy;
use crate::qa::QaStore;

use super::render::Renderer;

/// Shared application state passed to all Axum handlers via `.with_state()`.
#[derive(Clone)]
pub struct AppState {
    pub store: QaStore,
    pub renderer: Arc<Renderer>,
    pub answers: AnswerProxy,
}

impl AppState {
    pub fn new(store: QaStore, renderer: Renderer, answers: AnswerProxy) -> Self {
        Self {
            store,
            renderer: Arc::new(renderer),
            answers,
        }
    }
}
