use log::{debug, info, Level};
use logging_timer::timer;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::Serialize;

use crate::db::Database;
use crate::deadline::Deadline;
use crate::error::QaDeskError;
use crate::list_query::{ListParams, ListQuery, ListResult};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct QaPair {
    id: i64,
    question: String,
    answer: String,
}

impl QaPair {
    #[cfg(test)]
    pub(crate) fn new(id: i64, question: &str, answer: &str) -> Self {
        QaPair {
            id,
            question: question.to_owned(),
            answer: answer.to_owned(),
        }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn answer(&self) -> &str {
        &self.answer
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(QaPair {
            id: row.get(0)?,
            question: row.get(1)?,
            answer: row.get(2)?,
        })
    }

    /// Trims both fields and rejects either being empty.
    pub fn validate(question: &str, answer: &str) -> Result<(String, String), QaDeskError> {
        let question = question.trim();
        let answer = answer.trim();
        if question.is_empty() || answer.is_empty() {
            return Err(QaDeskError::Validation(
                "question and answer required".to_owned(),
            ));
        }
        Ok((question.to_owned(), answer.to_owned()))
    }

    pub fn create(conn: &Connection, question: &str, answer: &str) -> Result<i64, QaDeskError> {
        let (question, answer) = Self::validate(question, answer)?;

        let id: i64 = conn.query_row(
            "INSERT INTO qa_pairs (question, answer) VALUES (?1, ?2) RETURNING id",
            params![question, answer],
            |row| row.get(0),
        )?;

        Ok(id)
    }

    pub fn get_by_id(conn: &Connection, id: i64) -> Result<Self, QaDeskError> {
        conn.query_row(
            "SELECT id, question, answer FROM qa_pairs WHERE id = ?1",
            [id],
            Self::from_row,
        )
        .optional()?
        .ok_or(QaDeskError::NotFound(id))
    }

    pub fn update(conn: &Connection, id: i64, question: &str, answer: &str) -> Result<(), QaDeskError> {
        let (question, answer) = Self::validate(question, answer)?;

        let rows = conn.execute(
            "UPDATE qa_pairs SET question = ?1, answer = ?2 WHERE id = ?3",
            params![question, answer, id],
        )?;

        if rows == 0 {
            return Err(QaDeskError::NotFound(id));
        }
        Ok(())
    }

    pub fn delete(conn: &Connection, id: i64) -> Result<(), QaDeskError> {
        let rows = conn.execute("DELETE FROM qa_pairs WHERE id = ?1", [id])?;
        if rows == 0 {
            return Err(QaDeskError::NotFound(id));
        }
        Ok(())
    }

    /// Runs the count and the page select inside one read transaction so the
    /// total always describes the same snapshot as the rows. Joins the
    /// caller's transaction when one is already open.
    pub fn list(conn: &Connection, params: &ListParams) -> Result<ListResult, QaDeskError> {
        let _tmr = timer!(Level::Trace; "QaPair::list", "page {} size {}", params.page(), params.page_size());

        let query = ListQuery::build(params);
        debug!("List query: {}", query.page_sql);

        let tx = if conn.is_autocommit() {
            Some(conn.unchecked_transaction()?)
        } else {
            None
        };

        let total: i64 = conn.query_row(
            &query.count_sql,
            params_from_iter(query.count_params.iter()),
            |row| row.get(0),
        )?;

        let items = {
            let mut stmt = conn.prepare(&query.page_sql)?;
            let rows = stmt.query_map(params_from_iter(query.page_params.iter()), Self::from_row)?;
            rows.collect::<Result<Vec<_>, _>>()?
        };

        if let Some(tx) = tx {
            tx.commit()?;
        }

        Ok(ListResult {
            items,
            total: total.max(0) as u64,
        })
    }
}

/// Async face of the qa_pairs table. Every call runs on the blocking pool and
/// is bounded by the caller's deadline.
#[derive(Clone)]
pub struct QaStore {
    db: Database,
}

impl QaStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn ping(&self, deadline: Deadline) -> Result<(), QaDeskError> {
        self.db.ping(deadline).await
    }

    pub async fn create(&self, deadline: Deadline, question: &str, answer: &str) -> Result<i64, QaDeskError> {
        // Validate up front so bad input never reaches the pool
        let (question, answer) = QaPair::validate(question, answer)?;
        let id = self
            .db
            .run(deadline, "create qa pair", move |conn| {
                QaPair::create(conn, &question, &answer)
            })
            .await?;
        info!("Created qa pair {}", id);
        Ok(id)
    }

    pub async fn get(&self, deadline: Deadline, id: i64) -> Result<QaPair, QaDeskError> {
        self.db
            .run(deadline, "get qa pair", move |conn| QaPair::get_by_id(conn, id))
            .await
    }

    pub async fn update(&self, deadline: Deadline, id: i64, question: &str, answer: &str) -> Result<(), QaDeskError> {
        let (question, answer) = QaPair::validate(question, answer)?;
        self.db
            .run(deadline, "update qa pair", move |conn| {
                QaPair::update(conn, id, &question, &answer)
            })
            .await?;
        info!("Updated qa pair {}", id);
        Ok(())
    }

    pub async fn delete(&self, deadline: Deadline, id: i64) -> Result<(), QaDeskError> {
        self.db
            .run(deadline, "delete qa pair", move |conn| QaPair::delete(conn, id))
            .await?;
        info!("Deleted qa pair {}", id);
        Ok(())
    }

    pub async fn list(&self, deadline: Deadline, params: ListParams) -> Result<ListResult, QaDeskError> {
        self.db
            .run(deadline, "list qa pairs", move |conn| QaPair::list(conn, &params))
            .await
    }
}
