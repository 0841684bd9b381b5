use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use chrono::Datelike;
use handlebars::Handlebars;
use log::{debug, error};
use rust_embed::RustEmbed;
use serde::Serialize;
use strum::IntoEnumIterator;

use crate::error::QaDeskError;
use crate::list_query::{ListParams, ListResult, SortKey};
use crate::qa::QaPair;

#[derive(RustEmbed)]
#[folder = "templates/"]
struct Templates;

const LAYOUT: &str = "layout";
const TEMPLATE_EXTENSION: &str = ".hbs";

/// Which item of the top navigation is highlighted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nav {
    Home,
    Qa,
    Ask,
}

#[derive(Debug, Serialize)]
pub struct HomeView {
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct AskView {
    pub endpoint: &'static str,
}

#[derive(Debug, Serialize)]
pub struct SortOption {
    pub value: &'static str,
    pub label: &'static str,
    pub selected: bool,
}

#[derive(Debug, Serialize)]
pub struct QaListView {
    pub items: Vec<QaPair>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
    pub page_count: u64,
    pub sort: &'static str,
    pub sort_options: Vec<SortOption>,
    pub search: String,
    pub prev_url: Option<String>,
    pub next_url: Option<String>,
}

impl QaListView {
    pub fn new(params: &ListParams, result: ListResult) -> Self {
        let page_count = result.page_count(params.page_size());
        let page = params.page();

        let prev_url = (page > 1).then(|| list_url(&params.with_page(page - 1)));
        let next_url = (u64::from(page) < page_count).then(|| list_url(&params.with_page(page + 1)));

        let sort_options = SortKey::iter()
            .map(|key| SortOption {
                value: key.into(),
                label: key.label(),
                selected: key == params.sort(),
            })
            .collect();

        Self {
            items: result.items,
            total: result.total,
            page,
            page_size: params.page_size(),
            page_count,
            sort: params.sort().into(),
            sort_options,
            search: params.search().unwrap_or_default().to_owned(),
            prev_url,
            next_url,
        }
    }
}

/// `/qa` link that reproduces `params`, search text percent-encoded.
pub fn list_url(params: &ListParams) -> String {
    let sort: &'static str = params.sort().into();
    let mut url = format!(
        "/qa?page={}&page_size={}&sort={}",
        params.page(),
        params.page_size(),
        sort
    );
    if let Some(search) = params.search() {
        url.push_str("&search=");
        url.push_str(&urlencoding::encode(search));
    }
    url
}

#[derive(Debug, Serialize)]
pub struct QaFormView {
    pub heading: &'static str,
    pub action: String,
    pub submit_label: &'static str,
    pub question: String,
    pub answer: String,
    pub error: Option<String>,
}

impl QaFormView {
    pub fn create() -> Self {
        Self::create_with("", "", None)
    }

    pub fn create_with(question: &str, answer: &str, error: Option<String>) -> Self {
        Self {
            heading: "New question",
            action: "/qa/create".to_owned(),
            submit_label: "Create",
            question: question.to_owned(),
            answer: answer.to_owned(),
            error,
        }
    }

    pub fn edit(pair: &QaPair) -> Self {
        Self::edit_with(pair.id(), pair.question(), pair.answer(), None)
    }

    pub fn edit_with(id: i64, question: &str, answer: &str, error: Option<String>) -> Self {
        Self {
            heading: "Edit question",
            action: format!("/qa/edit?id={}", id),
            submit_label: "Save",
            question: question.to_owned(),
            answer: answer.to_owned(),
            error,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct QaDeleteView {
    pub pair: QaPair,
    pub action: String,
}

impl QaDeleteView {
    pub fn new(pair: QaPair) -> Self {
        let action = format!("/qa/delete?id={}", pair.id());
        Self { pair, action }
    }
}

/// Every page the app can render, each with its own data.
#[derive(Debug)]
pub enum View {
    Home(HomeView),
    Ask(AskView),
    QaList(QaListView),
    QaForm(QaFormView),
    QaDelete(QaDeleteView),
}

impl View {
    fn template(&self) -> &'static str {
        match self {
            View::Home(_) => "home",
            View::Ask(_) => "ask",
            View::QaList(_) => "qa_list",
            View::QaForm(_) => "qa_form",
            View::QaDelete(_) => "qa_delete",
        }
    }

    fn title(&self) -> String {
        match self {
            View::Home(_) => "Home".to_owned(),
            View::Ask(_) => "Ask a question".to_owned(),
            View::QaList(_) => "Questions".to_owned(),
            View::QaForm(form) => form.heading.to_owned(),
            View::QaDelete(view) => format!("Delete question {}", view.pair.id()),
        }
    }

    fn nav(&self) -> Nav {
        match self {
            View::Home(_) => Nav::Home,
            View::Ask(_) => Nav::Ask,
            View::QaList(_) | View::QaForm(_) | View::QaDelete(_) => Nav::Qa,
        }
    }
}

#[derive(Serialize)]
struct LayoutContext<'a> {
    title: &'a str,
    year: i32,
    nav_home: bool,
    nav_qa: bool,
    nav_ask: bool,
    content: &'a str,
}

pub struct Renderer {
    registry: Handlebars<'static>,
}

impl Renderer {
    /// Registers every embedded template. Strict mode turns a reference to a
    /// missing field into a render error instead of empty output.
    pub fn new() -> Result<Self, QaDeskError> {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(true);

        for file in Templates::iter() {
            let Some(name) = file.strip_suffix(TEMPLATE_EXTENSION) else {
                continue;
            };
            let embedded = Templates::get(&file)
                .ok_or_else(|| QaDeskError::Error(format!("Embedded template {} vanished", file)))?;
            let source = std::str::from_utf8(&embedded.data)
                .map_err(|e| QaDeskError::Error(format!("Template {} is not UTF-8: {}", file, e)))?;

            registry.register_template_string(name, source)?;
            debug!("Registered template {}", name);
        }

        for required in [LAYOUT, "home", "ask", "qa_list", "qa_form", "qa_delete"] {
            if !registry.has_template(required) {
                return Err(QaDeskError::Error(format!("Missing template {}", required)));
            }
        }

        Ok(Self { registry })
    }

    /// Renders the complete document for `view` into memory.
    pub fn render(&self, view: &View) -> Result<String, QaDeskError> {
        let content = match view {
            View::Home(data) => self.registry.render(view.template(), data)?,
            View::Ask(data) => self.registry.render(view.template(), data)?,
            View::QaList(data) => self.registry.render(view.template(), data)?,
            View::QaForm(data) => self.registry.render(view.template(), data)?,
            View::QaDelete(data) => self.registry.render(view.template(), data)?,
        };

        let title = view.title();
        let nav = view.nav();
        let layout = LayoutContext {
            title: &title,
            year: chrono::Local::now().year(),
            nav_home: nav == Nav::Home,
            nav_qa: nav == Nav::Qa,
            nav_ask: nav == Nav::Ask,
            content: &content,
        };

        Ok(self.registry.render(LAYOUT, &layout)?)
    }

    /// Renders `view` as a complete HTML response. Nothing reaches the client
    /// unless the whole document rendered.
    pub fn page(&self, view: View) -> Response {
        match self.render(&view) {
            Ok(html) => Html(html).into_response(),
            Err(e) => {
                error!("Failed to render {}: {}", view.template(), e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Template error").into_response()
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn registry_mut(&mut self) -> &mut Handlebars<'static> {
        &mut self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_all_views_render_inside_layout() {
        let renderer = Renderer::new().unwrap();
        let params = ListParams::default();
        let views = vec![
            View::Home(HomeView { version: "test" }),
            View::Ask(AskView { endpoint: "/api/ask" }),
            View::QaList(QaListView::new(
                &params,
                ListResult { items: vec![QaPair::new(1, "q", "a")], total: 1 },
            )),
            View::QaForm(QaFormView::create()),
            View::QaDelete(QaDeleteView::new(QaPair::new(3, "gone?", "soon"))),
        ];

        for view in &views {
            let html = renderer.render(view).unwrap();
            assert!(html.starts_with("<!DOCTYPE html>"), "{}", view.template());
            assert!(html.contains("</html>"));
            assert!(html.contains(&chrono::Local::now().year().to_string()));
        }
    }

    #[test]
    fn test_user_text_is_escaped() {
        let renderer = Renderer::new().unwrap();
        let view = View::QaForm(QaFormView::create_with(
            "<script>alert(1)</script>",
            "a & b",
            Some("question and answer required".into()),
        ));
        let html = renderer.render(&view).unwrap();
        assert!(!html.contains("<script>alert(1)</script>"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(html.contains("question and answer required"));
    }

    #[test]
    fn test_list_links_keep_filter_and_sort() {
        let params = ListParams::new(Some(2), Some(5), Some("question_asc"), Some("rust & go"));
        let result = ListResult { items: Vec::new(), total: 12 };
        let view = QaListView::new(&params, result);

        assert_eq!(view.page_count, 3);
        assert_eq!(
            view.prev_url.as_deref(),
            Some("/qa?page=1&page_size=5&sort=question_asc&search=rust%20%26%20go")
        );
        assert_eq!(
            view.next_url.as_deref(),
            Some("/qa?page=3&page_size=5&sort=question_asc&search=rust%20%26%20go")
        );
        assert_eq!(view.sort_options.iter().filter(|o| o.selected).count(), 1);
    }

    #[test]
    fn test_first_and_last_page_have_no_outer_links() {
        let view = QaListView::new(&ListParams::default(), ListResult { items: Vec::new(), total: 0 });
        assert_eq!(view.page_count, 1);
        assert!(view.prev_url.is_none());
        assert!(view.next_url.is_none());
    }

    #[tokio::test]
    async fn test_render_failure_is_a_500_without_partial_html() {
        let mut renderer = Renderer::new().unwrap();
        renderer
            .registry_mut()
            .register_template_string("home", "<p>{{no_such_field}}</p>")
            .unwrap();

        let response = renderer.page(View::Home(HomeView { version: "test" }));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"Template error");
    }
}
