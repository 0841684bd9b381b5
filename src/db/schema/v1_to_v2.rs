pub const UPGRADE_1_TO_2_SQL: &str = r#"
--
-- Schema Upgrade: Version 1 → 2
--
-- Adds a case-insensitive index on question to back the question sort orders.
-- Ties are broken by id, so the index carries it as a second column.
--

CREATE INDEX IF NOT EXISTS idx_qa_pairs_question
    ON qa_pairs (question COLLATE NOCASE, id);
"#;
