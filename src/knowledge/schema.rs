//! Schema, connection factory and small helpers for the knowledge index.

use std::path::Path;

use chrono::{SecondsFormat, Utc};
use rusqlite::Connection;
use sha2::{Digest, Sha256};

use crate::error::AppError;

pub(crate) const DB_FILENAME: &str = "chunks.db";

/// Stored in `PRAGMA user_version`. Bump when the DDL changes.
pub(crate) const SCHEMA_VERSION: i64 = 1;

/// Create the schema on a fresh database, or check the version of an
/// existing one.
///
/// - `documents` holds one row per ingested file (title, source, hash).
/// - `chunks` is an FTS5 table; only `text` is tokenized.
pub(crate) fn init_schema(conn: &Connection) -> Result<(), AppError> {
    let version: i64 = conn
        .query_row("PRAGMA user_version;", [], |row| row.get(0))
        .map_err(|e| AppError::Knowledge(format!("read schema version: {e}")))?;

    if version == 0 {
        return conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS documents (
                    doc_id TEXT PRIMARY KEY,
                    title TEXT NOT NULL,
                    source TEXT NOT NULL,
                    content_hash TEXT NOT NULL UNIQUE,
                    chunk_count INTEGER NOT NULL,
                    created_at TEXT NOT NULL
                );

                CREATE VIRTUAL TABLE IF NOT EXISTS chunks USING fts5(
                    id UNINDEXED,
                    doc_id UNINDEXED,
                    text,
                    position UNINDEXED
                );

                PRAGMA user_version = 1;
                ",
            )
            .map_err(|e| AppError::Knowledge(format!("initialize schema: {e}")));
    }

    if version != SCHEMA_VERSION {
        return Err(AppError::Knowledge(format!(
            "unsupported schema version {version}, expected {SCHEMA_VERSION}"
        )));
    }
    Ok(())
}

/// Open `db_path` with WAL journaling and a 5 s busy timeout.
pub(crate) fn open_conn(db_path: &Path) -> Result<Connection, AppError> {
    let conn = Connection::open(db_path)
        .map_err(|e| AppError::Knowledge(format!("open {}: {e}", db_path.display())))?;

    conn.pragma_update(None, "journal_mode", "WAL")
        .map_err(|e| AppError::Knowledge(format!("set journal_mode WAL: {e}")))?;
    conn.pragma_update(None, "busy_timeout", 5000)
        .map_err(|e| AppError::Knowledge(format!("set busy_timeout: {e}")))?;

    Ok(conn)
}

pub(crate) fn sha256_hex(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

pub(crate) fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Turn free text into an FTS5 `MATCH` expression: every alphanumeric run
/// becomes a quoted term, terms are OR-joined. Returns `None` when the text
/// has no terms.
pub(crate) fn match_expression(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{t}\""))
        .collect();
    if terms.is_empty() { None } else { Some(terms.join(" OR ")) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_expression_quotes_and_joins() {
        assert_eq!(
            match_expression("Neoavanguardia (Gruppo 63)").as_deref(),
            Some("\"Neoavanguardia\" OR \"Gruppo\" OR \"63\"")
        );
        assert_eq!(
            match_expression("Spoken Word / Slam").as_deref(),
            Some("\"Spoken\" OR \"Word\" OR \"Slam\"")
        );
    }

    #[test]
    fn match_expression_keeps_accented_letters() {
        assert_eq!(match_expression("città").as_deref(), Some("\"città\""));
    }

    #[test]
    fn match_expression_empty_for_punctuation() {
        assert_eq!(match_expression("  / () ?"), None);
    }

    #[test]
    fn hash_is_stable_hex() {
        let h = sha256_hex("abc");
        assert_eq!(h.len(), 64);
        assert_eq!(h, sha256_hex("abc"));
        assert_ne!(h, sha256_hex("abd"));
    }
}
