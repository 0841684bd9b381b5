//! Search, sort and pagination for the qa_pairs listing.
//!
//! Raw request values are normalized into [`ListParams`], which never fails:
//! anything out of range or unparseable falls back to its default. A
//! [`ListQuery`] is then built from the parameters. Only whitelisted ordering
//! clauses are interpolated into the SQL; the search pattern, limit and
//! offset are always bound.
use rusqlite::types::Value;
use serde::Serialize;
use strum::{AsRefStr, EnumIter, EnumString, IntoStaticStr};

use crate::qa::QaPair;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, AsRefStr, IntoStaticStr, EnumString, EnumIter, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    IdDesc,
    IdAsc,
    QuestionAsc,
    QuestionDesc,
}

impl SortKey {
    /// Unknown or absent keys sort newest first.
    pub fn parse(raw: Option<&str>) -> Self {
        raw.and_then(|s| s.trim().parse().ok()).unwrap_or_default()
    }

    /// Question orders break ties on id so equal questions keep a stable
    /// position across pages.
    pub fn order_clause(&self) -> &'static str {
        match self {
            SortKey::IdDesc => "id DESC",
            SortKey::IdAsc => "id ASC",
            SortKey::QuestionAsc => "question COLLATE NOCASE ASC, id DESC",
            SortKey::QuestionDesc => "question COLLATE NOCASE DESC, id DESC",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SortKey::IdDesc => "Newest first",
            SortKey::IdAsc => "Oldest first",
            SortKey::QuestionAsc => "Question A-Z",
            SortKey::QuestionDesc => "Question Z-A",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListParams {
    page: u32,
    page_size: u32,
    sort: SortKey,
    search: Option<String>,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: Self::DEFAULT_PAGE_SIZE,
            sort: SortKey::default(),
            search: None,
        }
    }
}

impl ListParams {
    pub const DEFAULT_PAGE_SIZE: u32 = 10;
    pub const MAX_PAGE_SIZE: u32 = 100;

    pub fn new(page: Option<i64>, page_size: Option<i64>, sort: Option<&str>, search: Option<&str>) -> Self {
        let page = page
            .filter(|p| *p >= 1)
            .and_then(|p| u32::try_from(p).ok())
            .unwrap_or(1);

        // Out of range sizes use the default rather than being clamped to the cap
        let page_size = page_size
            .filter(|s| (1..=i64::from(Self::MAX_PAGE_SIZE)).contains(s))
            .map(|s| s as u32)
            .unwrap_or(Self::DEFAULT_PAGE_SIZE);

        let search = search
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned);

        Self {
            page,
            page_size,
            sort: SortKey::parse(sort),
            search,
        }
    }

    /// Builds parameters from raw query-string values; unparseable numbers
    /// count as absent.
    pub fn from_raw(page: Option<&str>, page_size: Option<&str>, sort: Option<&str>, search: Option<&str>) -> Self {
        let parse = |v: Option<&str>| v.and_then(|s| s.trim().parse::<i64>().ok());
        Self::new(parse(page), parse(page_size), sort, search)
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn sort(&self) -> SortKey {
        self.sort
    }

    pub fn search(&self) -> Option<&str> {
        self.search.as_deref()
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.page_size)
    }

    /// Same filter and sort, different page.
    pub fn with_page(&self, page: u32) -> Self {
        Self {
            page: page.max(1),
            ..self.clone()
        }
    }
}

/// The two statements that answer one listing request.
#[derive(Debug, Clone, PartialEq)]
pub struct ListQuery {
    pub count_sql: String,
    pub count_params: Vec<Value>,
    pub page_sql: String,
    pub page_params: Vec<Value>,
}

impl ListQuery {
    const COLUMNS: &'static str = "id, question, answer";
    const TABLE: &'static str = "qa_pairs";

    pub fn build(params: &ListParams) -> Self {
        let mut filter_params = Vec::new();
        let where_clause = match params.search() {
            Some(search) => {
                filter_params.push(Value::Text(like_pattern(search)));
                " WHERE question LIKE ?1 ESCAPE '\\' OR answer LIKE ?1 ESCAPE '\\'"
            }
            None => "",
        };

        let count_sql = format!("SELECT COUNT(*) FROM {}{}", Self::TABLE, where_clause);

        let limit_index = filter_params.len() + 1;
        let page_sql = format!(
            "SELECT {} FROM {}{} ORDER BY {} LIMIT ?{} OFFSET ?{}",
            Self::COLUMNS,
            Self::TABLE,
            where_clause,
            params.sort().order_clause(),
            limit_index,
            limit_index + 1
        );

        let mut page_params = filter_params.clone();
        page_params.push(Value::Integer(i64::from(params.page_size())));
        page_params.push(Value::Integer(params.offset() as i64));

        Self {
            count_sql,
            count_params: filter_params,
            page_sql,
            page_params,
        }
    }
}

/// Escapes LIKE wildcards so the search text matches literally, then wraps it
/// for a substring match.
fn like_pattern(search: &str) -> String {
    let mut pattern = String::with_capacity(search.len() + 2);
    pattern.push('%');
    for c in search.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListResult {
    pub items: Vec<QaPair>,
    pub total: u64,
}

impl ListResult {
    /// At least one page, even when nothing matches.
    pub fn page_count(&self, page_size: u32) -> u64 {
        let page_size = u64::from(page_size.max(1));
        self.total.div_ceil(page_size).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn test_defaults_when_absent() {
        let params = ListParams::new(None, None, None, None);
        assert_eq!(params, ListParams::default());
        assert_eq!(params.page(), 1);
        assert_eq!(params.page_size(), 10);
        assert_eq!(params.sort(), SortKey::IdDesc);
        assert_eq!(params.search(), None);
        assert_eq!(params.offset(), 0);
    }

    #[test]
    fn test_page_size_edges() {
        assert_eq!(ListParams::new(None, Some(1), None, None).page_size(), 1);
        assert_eq!(ListParams::new(None, Some(100), None, None).page_size(), 100);
        assert_eq!(ListParams::new(None, Some(101), None, None).page_size(), 10);
        assert_eq!(ListParams::new(None, Some(0), None, None).page_size(), 10);
        assert_eq!(ListParams::new(None, Some(-5), None, None).page_size(), 10);
    }

    #[test]
    fn test_raw_values_that_do_not_parse_fall_back() {
        let params = ListParams::from_raw(Some("two"), Some("lots"), Some("sideways"), Some("   "));
        assert_eq!(params, ListParams::default());

        let params = ListParams::from_raw(Some(" 3 "), Some("25"), Some("question_desc"), Some("  rust "));
        assert_eq!(params.page(), 3);
        assert_eq!(params.page_size(), 25);
        assert_eq!(params.sort(), SortKey::QuestionDesc);
        assert_eq!(params.search(), Some("rust"));
        assert_eq!(params.offset(), 50);
    }

    #[test]
    fn test_sort_keys_parse_from_wire_names() {
        assert_eq!(SortKey::parse(Some("question_asc")), SortKey::QuestionAsc);
        assert_eq!(SortKey::parse(Some("question_desc")), SortKey::QuestionDesc);
        assert_eq!(SortKey::parse(Some("id_asc")), SortKey::IdAsc);
        assert_eq!(SortKey::parse(Some("id_desc")), SortKey::IdDesc);
        assert_eq!(SortKey::parse(Some("ID_ASC")), SortKey::IdDesc);
        assert_eq!(SortKey::parse(Some("id; DROP TABLE qa_pairs")), SortKey::IdDesc);
        assert_eq!(SortKey::QuestionAsc.as_ref(), "question_asc");
    }

    #[test]
    fn test_query_without_search() {
        let query = ListQuery::build(&ListParams::new(Some(2), Some(10), Some("id_desc"), None));
        assert_eq!(query.count_sql, "SELECT COUNT(*) FROM qa_pairs");
        assert!(query.count_params.is_empty());
        assert_eq!(
            query.page_sql,
            "SELECT id, question, answer FROM qa_pairs ORDER BY id DESC LIMIT ?1 OFFSET ?2"
        );
        assert_eq!(query.page_params, vec![Value::Integer(10), Value::Integer(10)]);
    }

    #[test]
    fn test_query_with_search_binds_pattern_first() {
        let query = ListQuery::build(&ListParams::new(None, Some(5), Some("question_asc"), Some("Rust")));
        assert_eq!(
            query.count_sql,
            "SELECT COUNT(*) FROM qa_pairs WHERE question LIKE ?1 ESCAPE '\\' OR answer LIKE ?1 ESCAPE '\\'"
        );
        assert_eq!(query.count_params, vec![Value::Text("%Rust%".into())]);
        assert!(query
            .page_sql
            .ends_with("ORDER BY question COLLATE NOCASE ASC, id DESC LIMIT ?2 OFFSET ?3"));
        assert_eq!(
            query.page_params,
            vec![Value::Text("%Rust%".into()), Value::Integer(5), Value::Integer(0)]
        );
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("100%"), "%100\\%%");
        assert_eq!(like_pattern("snake_case"), "%snake\\_case%");
        assert_eq!(like_pattern("a\\b"), "%a\\\\b%");
        assert_eq!(like_pattern("plain"), "%plain%");
    }

    #[test]
    fn test_page_count() {
        let result = |total| ListResult { items: Vec::new(), total };
        assert_eq!(result(0).page_count(10), 1);
        assert_eq!(result(10).page_count(10), 1);
        assert_eq!(result(11).page_count(10), 2);
        assert_eq!(result(15).page_count(10), 2);
        assert_eq!(result(100).page_count(7), 15);
    }

    proptest! {
        #[test]
        fn prop_non_positive_pages_normalize_to_one(page in i64::MIN..=0) {
            prop_assert_eq!(ListParams::new(Some(page), None, None, None).page(), 1);
        }

        #[test]
        fn prop_out_of_range_page_sizes_use_default(
            size in prop_oneof![i64::MIN..=0, 101..=i64::MAX]
        ) {
            prop_assert_eq!(ListParams::new(None, Some(size), None, None).page_size(), 10);
        }

        #[test]
        fn prop_in_range_page_sizes_are_kept(size in 1i64..=100) {
            prop_assert_eq!(ListParams::new(None, Some(size), None, None).page_size() as i64, size);
        }

        #[test]
        fn prop_unknown_sort_keys_default_to_id_desc(raw in "[a-zA-Z_ ;]{0,24}") {
            prop_assume!(!["question_asc", "question_desc", "id_asc", "id_desc"].contains(&raw.trim()));
            prop_assert_eq!(SortKey::parse(Some(&raw)), SortKey::IdDesc);
        }

        #[test]
        fn prop_ordering_clause_is_always_whitelisted(raw in ".{0,32}") {
            let query = ListQuery::build(&ListParams::new(None, None, Some(&raw), Some(&raw)));
            let allowed = [
                "ORDER BY id DESC LIMIT",
                "ORDER BY id ASC LIMIT",
                "ORDER BY question COLLATE NOCASE ASC, id DESC LIMIT",
                "ORDER BY question COLLATE NOCASE DESC, id DESC LIMIT",
            ];
            prop_assert!(allowed.iter().any(|clause| query.page_sql.contains(clause)));
            prop_assert_eq!(query.count_params.len(), usize::from(!raw.trim().is_empty()));
        }
    }
}
