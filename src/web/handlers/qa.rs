use axum::extract::rejection::FormRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::Form;
use log::{debug, warn};
use serde::Deserialize;

use crate::deadline::{Deadline, SHORT_READ, STORE_OPERATION};
use crate::error::QaDeskError;
use crate::list_query::ListParams;
use crate::web::render::{QaDeleteView, QaFormView, QaListView, View};
use crate::web::state::AppState;

const LIST_PATH: &str = "/qa";

/// Query string as decoded key/value pairs. Repeated keys are kept in order
/// so lookups can take the first occurrence instead of rejecting the request.
type QueryPairs = Vec<(String, String)>;

fn first_value<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

fn list_params(pairs: &[(String, String)]) -> ListParams {
    ListParams::from_raw(
        first_value(pairs, "page"),
        first_value(pairs, "page_size"),
        first_value(pairs, "sort"),
        first_value(pairs, "search"),
    )
}

/// Absent or unparseable ids are treated as a lookup that finds nothing.
fn resolve_id(pairs: &[(String, String)]) -> Result<i64, QaDeskError> {
    first_value(pairs, "id")
        .and_then(|s| s.trim().parse::<i64>().ok())
        .ok_or(QaDeskError::NotFound(0))
}

#[derive(Debug, Default, Deserialize)]
pub struct QaFormInput {
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub answer: String,
}

fn invalid_form(rejection: FormRejection) -> Response {
    debug!("Rejected form body: {}", rejection);
    (StatusCode::BAD_REQUEST, "invalid form").into_response()
}

/// GET /qa
pub async fn list(
    State(state): State<AppState>,
    Query(pairs): Query<QueryPairs>,
) -> Result<Response, QaDeskError> {
    let params = list_params(&pairs);

    let result = state
        .store
        .list(Deadline::within(STORE_OPERATION), params.clone())
        .await?;

    Ok(state
        .renderer
        .page(View::QaList(QaListView::new(&params, result))))
}

/// GET /qa/create
pub async fn create_form(State(state): State<AppState>) -> Response {
    state.renderer.page(View::QaForm(QaFormView::create()))
}

/// POST /qa/create
pub async fn create(
    State(state): State<AppState>,
    form: Result<Form<QaFormInput>, FormRejection>,
) -> Result<Response, QaDeskError> {
    let Form(input) = match form {
        Ok(form) => form,
        Err(rejection) => return Ok(invalid_form(rejection)),
    };

    match state
        .store
        .create(Deadline::within(STORE_OPERATION), &input.question, &input.answer)
        .await
    {
        Ok(_) => Ok(Redirect::to(LIST_PATH).into_response()),
        Err(QaDeskError::Validation(message)) => Ok(state.renderer.page(View::QaForm(
            QaFormView::create_with(&input.question, &input.answer, Some(message)),
        ))),
        Err(e) => Err(e),
    }
}

/// GET /qa/edit?id=
pub async fn edit_form(
    State(state): State<AppState>,
    Query(pairs): Query<QueryPairs>,
) -> Result<Response, QaDeskError> {
    let id = resolve_id(&pairs)?;
    let pair = state.store.get(Deadline::within(SHORT_READ), id).await?;
    Ok(state.renderer.page(View::QaForm(QaFormView::edit(&pair))))
}

/// POST /qa/edit?id=
pub async fn edit(
    State(state): State<AppState>,
    Query(pairs): Query<QueryPairs>,
    form: Result<Form<QaFormInput>, FormRejection>,
) -> Result<Response, QaDeskError> {
    let id = resolve_id(&pairs)?;
    let Form(input) = match form {
        Ok(form) => form,
        Err(rejection) => return Ok(invalid_form(rejection)),
    };

    match state
        .store
        .update(Deadline::within(STORE_OPERATION), id, &input.question, &input.answer)
        .await
    {
        Ok(()) => Ok(Redirect::to(LIST_PATH).into_response()),
        Err(QaDeskError::Validation(message)) => Ok(state.renderer.page(View::QaForm(
            QaFormView::edit_with(id, &input.question, &input.answer, Some(message)),
        ))),
        Err(e) => Err(e),
    }
}

/// GET /qa/delete?id=
pub async fn delete_confirm(
    State(state): State<AppState>,
    Query(pairs): Query<QueryPairs>,
) -> Result<Response, QaDeskError> {
    let id = resolve_id(&pairs)?;
    let pair = state.store.get(Deadline::within(SHORT_READ), id).await?;
    Ok(state.renderer.page(View::QaDelete(QaDeleteView::new(pair))))
}

/// POST /qa/delete?id=
///
/// Deleting something that is already gone still lands back on the list.
pub async fn delete(
    State(state): State<AppState>,
    Query(pairs): Query<QueryPairs>,
) -> Result<Response, QaDeskError> {
    let result = match resolve_id(&pairs) {
        Ok(id) => state.store.delete(Deadline::within(STORE_OPERATION), id).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => {}
        Err(QaDeskError::NotFound(_)) => {
            warn!(
                "Delete requested for missing qa pair {:?}",
                first_value(&pairs, "id")
            );
        }
        Err(e) => return Err(e),
    }

    Ok(Redirect::to(LIST_PATH).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn pairs(raw: &[(&str, &str)]) -> QueryPairs {
        raw.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_first_occurrence_wins() {
        let query = pairs(&[("sort", "question_asc"), ("page", "2"), ("sort", "id_asc")]);
        assert_eq!(first_value(&query, "sort"), Some("question_asc"));
        assert_eq!(first_value(&query, "page"), Some("2"));
        assert_eq!(first_value(&query, "search"), None);
    }

    #[test]
    fn test_resolve_id() {
        assert_eq!(resolve_id(&pairs(&[("id", " 7 "), ("id", "8")])).unwrap(), 7);
        for raw in [&[][..], &[("id", "abc")][..], &[("id", "")][..]] {
            assert!(matches!(
                resolve_id(&pairs(raw)),
                Err(QaDeskError::NotFound(0))
            ));
        }
    }
}
