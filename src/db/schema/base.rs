pub const CREATE_SCHEMA_SQL: &str = r#"
-- Schema version 1: the qa_pairs table

CREATE TABLE IF NOT EXISTS qa_pairs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,  -- Store-assigned, never reused
    question TEXT NOT NULL,                -- Trimmed, never empty
    answer TEXT NOT NULL                   -- Trimmed, never empty
);
"#;
