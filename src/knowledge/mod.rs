//! Local style archive for retrieval-augmented prompting.
//!
//! Style documents (`*.txt`) are split into overlapping chunks and indexed in
//! a SQLite FTS5 table at `<work_dir>/knowledge/chunks.db`. Retrieval ranks
//! chunks with BM25. Raw document text is also copied to
//! `<work_dir>/knowledge/docs/<doc_id>.txt` so the index can be inspected.
//!
//! Re-ingesting identical content is a no-op: documents are deduplicated by
//! the SHA-256 of their text.

mod schema;

use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use text_splitter::{ChunkConfig, TextSplitter};
use tracing::{debug, info, warn};

use crate::config::KnowledgeConfig;
use crate::error::AppError;
use schema::{DB_FILENAME, init_schema, match_expression, now_iso8601, open_conn, sha256_hex};

const KNOWLEDGE_DIR: &str = "knowledge";
const DOCS_DIR: &str = "docs";

#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    dir: PathBuf,
    docs_dir: PathBuf,
    db_path: PathBuf,
    chunk_size: usize,
    chunk_overlap: usize,
}

/// Descriptor of one ingested document.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentInfo {
    pub doc_id: String,
    pub title: String,
    pub source: String,
    pub content_hash: String,
    pub chunk_count: usize,
    pub created_at: String,
}

/// A retrieved chunk with its BM25 relevance (higher is better).
#[derive(Debug, Clone)]
pub struct Passage {
    pub text: String,
    pub title: String,
    pub score: f32,
}

/// Counts from one `ingest_dir` run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// `*.txt` files read.
    pub files: usize,
    /// Files whose content was not already indexed.
    pub new_documents: usize,
    /// Chunks written for the new documents.
    pub chunks: usize,
}

impl KnowledgeBase {
    /// Open (or create) the archive under `work_dir`.
    pub fn open(work_dir: &Path, config: &KnowledgeConfig) -> Result<Self, AppError> {
        if config.chunk_size == 0 {
            return Err(AppError::Knowledge("chunk_size must be > 0".to_string()));
        }
        let dir = work_dir.join(KNOWLEDGE_DIR);
        let docs_dir = dir.join(DOCS_DIR);
        fs::create_dir_all(&docs_dir)
            .map_err(|e| AppError::Knowledge(format!("cannot create {}: {e}", docs_dir.display())))?;

        let kb = Self {
            db_path: dir.join(DB_FILENAME),
            dir,
            docs_dir,
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
        };
        init_schema(&open_conn(&kb.db_path)?)?;
        debug!(path = %kb.db_path.display(), "knowledge base opened");
        Ok(kb)
    }

    pub fn root_dir(&self) -> &Path {
        &self.dir
    }

    /// Index every `*.txt` file directly inside `source_dir`.
    pub fn ingest_dir(&self, source_dir: &Path) -> Result<IngestReport, AppError> {
        let entries = fs::read_dir(source_dir).map_err(|e| {
            AppError::Knowledge(format!("cannot read {}: {e}", source_dir.display()))
        })?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "txt"))
            .collect();
        paths.sort();

        let splitter = self.splitter()?;
        let mut conn = open_conn(&self.db_path)?;
        let mut report = IngestReport::default();

        for path in paths {
            let content = match fs::read_to_string(&path) {
                Ok(c) => c,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable style document");
                    continue;
                }
            };
            report.files += 1;
            if content.trim().is_empty() {
                continue;
            }
            if let Some(chunks) = self.add_document(&mut conn, &splitter, &path, &content)? {
                report.new_documents += 1;
                report.chunks += chunks;
            }
        }

        info!(
            source = %source_dir.display(),
            files = report.files,
            new_documents = report.new_documents,
            chunks = report.chunks,
            "style archive ingested"
        );
        Ok(report)
    }

    /// Reuse a populated index, otherwise ingest `source_dir`.
    /// Returns `None` when the existing index was reused.
    pub fn ensure_loaded(&self, source_dir: &Path) -> Result<Option<IngestReport>, AppError> {
        let count = self.document_count()?;
        if count > 0 {
            debug!(documents = count, "reusing persisted style index");
            return Ok(None);
        }
        self.ingest_dir(source_dir).map(Some)
    }

    /// BM25-ranked chunks matching any term of `query`, best first.
    pub fn search(&self, query: &str, top_k: usize) -> Result<Vec<Passage>, AppError> {
        let Some(expr) = match_expression(query) else {
            return Ok(Vec::new());
        };
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let conn = open_conn(&self.db_path)?;
        let mut stmt = conn
            .prepare(
                "SELECT chunks.text, bm25(chunks) AS rank, documents.title
                 FROM chunks
                 JOIN documents ON documents.doc_id = chunks.doc_id
                 WHERE chunks MATCH ?1
                 ORDER BY rank
                 LIMIT ?2",
            )
            .map_err(|e| AppError::Knowledge(format!("prepare search: {e}")))?;

        let rows = stmt
            .query_map(params![expr, top_k as i64], |row| {
                let bm25: f64 = row.get(1)?;
                Ok(Passage { text: row.get(0)?, score: (-bm25) as f32, title: row.get(2)? })
            })
            .map_err(|e| AppError::Knowledge(format!("execute search: {e}")))?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row.map_err(|e| AppError::Knowledge(format!("map search row: {e}")))?);
        }
        debug!(query, hits = results.len(), "style archive searched");
        Ok(results)
    }

    pub fn document_count(&self) -> Result<usize, AppError> {
        let conn = open_conn(&self.db_path)?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))
            .map_err(|e| AppError::Knowledge(format!("count documents: {e}")))?;
        Ok(count as usize)
    }

    /// All documents, ordered by title.
    pub fn list_documents(&self) -> Result<Vec<DocumentInfo>, AppError> {
        let conn = open_conn(&self.db_path)?;
        let mut stmt = conn
            .prepare(
                "SELECT doc_id, title, source, content_hash, chunk_count, created_at
                 FROM documents ORDER BY title",
            )
            .map_err(|e| AppError::Knowledge(format!("prepare list_documents: {e}")))?;

        let rows = stmt
            .query_map([], |row| {
                Ok(DocumentInfo {
                    doc_id: row.get(0)?,
                    title: row.get(1)?,
                    source: row.get(2)?,
                    content_hash: row.get(3)?,
                    chunk_count: row.get::<_, i64>(4)? as usize,
                    created_at: row.get(5)?,
                })
            })
            .map_err(|e| AppError::Knowledge(format!("query list_documents: {e}")))?;

        let mut docs = Vec::new();
        for row in rows {
            docs.push(row.map_err(|e| AppError::Knowledge(format!("map list_documents row: {e}")))?);
        }
        Ok(docs)
    }

    fn splitter(&self) -> Result<TextSplitter<text_splitter::Characters>, AppError> {
        let config = ChunkConfig::new(self.chunk_size)
            .with_overlap(self.chunk_overlap)
            .map_err(|e| AppError::Knowledge(format!("invalid chunk settings: {e}")))?;
        Ok(TextSplitter::new(config))
    }

    /// Insert one document and its chunks. Returns the chunk count, or `None`
    /// when identical content is already indexed.
    fn add_document(
        &self,
        conn: &mut Connection,
        splitter: &TextSplitter<text_splitter::Characters>,
        path: &Path,
        content: &str,
    ) -> Result<Option<usize>, AppError> {
        let content_hash = sha256_hex(content);
        let existing: Option<String> = conn
            .query_row(
                "SELECT doc_id FROM documents WHERE content_hash = ?1",
                params![content_hash],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| AppError::Knowledge(format!("find by hash: {e}")))?;
        if let Some(doc_id) = existing {
            debug!(path = %path.display(), doc_id, "already indexed");
            return Ok(None);
        }

        let doc_id = uuid::Uuid::now_v7().to_string();
        let title = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| doc_id.clone());
        let chunks: Vec<(usize, &str)> = splitter
            .chunk_indices(content)
            .filter(|(_, t)| !t.trim().is_empty())
            .collect();

        let tx = conn
            .transaction()
            .map_err(|e| AppError::Knowledge(format!("begin ingest tx: {e}")))?;
        tx.execute(
            "INSERT INTO documents (doc_id, title, source, content_hash, chunk_count, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                doc_id,
                title,
                path.display().to_string(),
                content_hash,
                chunks.len() as i64,
                now_iso8601(),
            ],
        )
        .map_err(|e| AppError::Knowledge(format!("insert document: {e}")))?;
        for (position, text) in &chunks {
            tx.execute(
                "INSERT INTO chunks (id, doc_id, text, position) VALUES (?1, ?2, ?3, ?4)",
                params![uuid::Uuid::now_v7().to_string(), doc_id, text, *position as i64],
            )
            .map_err(|e| AppError::Knowledge(format!("insert chunk: {e}")))?;
        }
        tx.commit()
            .map_err(|e| AppError::Knowledge(format!("commit ingest tx: {e}")))?;

        fs::write(self.docs_dir.join(format!("{doc_id}.txt")), content)
            .map_err(|e| AppError::Knowledge(format!("write document copy for {doc_id}: {e}")))?;

        debug!(path = %path.display(), doc_id, chunks = chunks.len(), "document indexed");
        Ok(Some(chunks.len()))
    }
}
