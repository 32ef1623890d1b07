//! BM25 keyword index over chunk names and code, kept beside the LanceDB table

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, Occur, Query, QueryParser, TermQuery};
use tantivy::schema::{Field, IndexRecordOption, STORED, STRING, Schema, TEXT, Value};
use tantivy::{Index, IndexWriter, ReloadPolicy, TantivyDocument, Term, doc};

use crate::indexer::CodeChunk;

const WRITER_HEAP_BYTES: usize = 50_000_000;
const STALE_LOCK_AGE: Duration = Duration::from_secs(300);

/// Tantivy index with one document per chunk id
pub struct KeywordIndex {
    index: Index,
    id_field: Field,
    project_field: Field,
    text_field: Field,
    index_path: PathBuf,
    /// Only one IndexWriter may exist at a time
    writer_lock: Mutex<()>,
}

impl KeywordIndex {
    /// Open the index at `index_path`, creating it when missing
    pub fn open<P: AsRef<Path>>(index_path: P) -> Result<Self> {
        let index_path = index_path.as_ref().to_path_buf();

        let mut schema_builder = Schema::builder();
        let id_field = schema_builder.add_text_field("id", STRING | STORED);
        let project_field = schema_builder.add_text_field("project_id", STRING);
        let text_field = schema_builder.add_text_field("text", TEXT);
        let schema = schema_builder.build();

        std::fs::create_dir_all(&index_path).context("Failed to create keyword index directory")?;

        let index = if index_path.join("meta.json").exists() {
            Index::open_in_dir(&index_path).context("Failed to open existing keyword index")?
        } else {
            Index::create_in_dir(&index_path, schema).context("Failed to create keyword index")?
        };

        Ok(Self {
            index,
            id_field,
            project_field,
            text_field,
            index_path,
            writer_lock: Mutex::new(()),
        })
    }

    fn is_lock_stale(lock_path: &Path) -> bool {
        std::fs::metadata(lock_path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| modified.elapsed().ok())
            .is_some_and(|age| age > STALE_LOCK_AGE)
    }

    /// Remove lock files left behind by a crashed process. Returns whether any were removed.
    fn cleanup_stale_locks(&self) -> Result<bool> {
        let mut removed = false;
        for name in [".tantivy-writer.lock", ".tantivy-meta.lock"] {
            let lock_path = self.index_path.join(name);
            if Self::is_lock_stale(&lock_path) {
                tracing::warn!("Removing stale keyword index lock: {:?}", lock_path);
                std::fs::remove_file(&lock_path).context("Failed to remove stale lock file")?;
                removed = true;
            }
        }
        Ok(removed)
    }

    fn writer(&self) -> Result<IndexWriter<TantivyDocument>> {
        match self.index.writer(WRITER_HEAP_BYTES) {
            Ok(writer) => Ok(writer),
            Err(e) if e.to_string().to_lowercase().contains("lock") => {
                if self.cleanup_stale_locks()? {
                    self.index
                        .writer(WRITER_HEAP_BYTES)
                        .context("Failed to create index writer after cleaning stale locks")
                } else {
                    anyhow::bail!("Keyword index is in use by another process: {}", e)
                }
            }
            Err(e) => Err(e).context("Failed to create index writer"),
        }
    }

    /// Replace the documents for the given chunks
    pub fn upsert(&self, chunks: &[CodeChunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        let _guard = self
            .writer_lock
            .lock()
            .map_err(|e| anyhow::anyhow!("Failed to acquire writer lock: {}", e))?;
        let mut writer = self.writer()?;

        for chunk in chunks {
            writer.delete_term(Term::from_field_text(self.id_field, &chunk.id));
            writer
                .add_document(doc!(
                    self.id_field => chunk.id.as_str(),
                    self.project_field => chunk.project_id.as_str(),
                    self.text_field => format!("{}\n{}", chunk.name, chunk.code),
                ))
                .context("Failed to add document")?;
        }

        writer.commit().context("Failed to commit keyword documents")?;
        Ok(())
    }

    pub fn delete_ids(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let _guard = self
            .writer_lock
            .lock()
            .map_err(|e| anyhow::anyhow!("Failed to acquire writer lock: {}", e))?;
        let mut writer = self.writer()?;
        for id in ids {
            writer.delete_term(Term::from_field_text(self.id_field, id));
        }
        writer.commit().context("Failed to commit keyword deletion")?;
        Ok(())
    }

    pub fn delete_project(&self, project_id: &str) -> Result<()> {
        let _guard = self
            .writer_lock
            .lock()
            .map_err(|e| anyhow::anyhow!("Failed to acquire writer lock: {}", e))?;
        let mut writer = self.writer()?;
        writer.delete_term(Term::from_field_text(self.project_field, project_id));
        writer
            .commit()
            .context("Failed to commit project deletion")?;
        Ok(())
    }

    /// BM25 search within one project. Returns `(chunk id, score)` best first.
    pub fn search(&self, project_id: &str, query_text: &str, limit: usize) -> Result<Vec<(String, f32)>> {
        let reader = self
            .index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .context("Failed to create index reader")?;
        let searcher = reader.searcher();

        // Lenient parsing so code like `a::b` or `foo(` does not fail
        let query_parser = QueryParser::for_index(&self.index, vec![self.text_field]);
        let (text_query, _errors) = query_parser.parse_query_lenient(query_text);
        let project_query: Box<dyn Query> = Box::new(TermQuery::new(
            Term::from_field_text(self.project_field, project_id),
            IndexRecordOption::Basic,
        ));
        let query = BooleanQuery::new(vec![
            (Occur::Must, text_query),
            (Occur::Must, project_query),
        ]);

        let top_docs = searcher
            .search(&query, &TopDocs::with_limit(limit))
            .context("Failed to execute keyword search")?;

        let mut results = Vec::with_capacity(top_docs.len());
        for (score, address) in top_docs {
            let doc: TantivyDocument = searcher
                .doc(address)
                .context("Failed to retrieve document")?;
            if let Some(id) = doc.get_first(self.id_field).and_then(|v| v.as_str()) {
                results.push((id.to_string(), score));
            }
        }
        Ok(results)
    }
}
