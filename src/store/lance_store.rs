//! LanceDB chunk store
//!
//! One table holds every project's chunks. Dependency lists are stored as JSON text
//! and the vector column is nullable so chunks without an embedding still persist.

use super::keyword_index::KeywordIndex;
use super::upsert::{dedupe_batch, preserve_identity};
use super::{ChunkStore, ScoredChunk, sql_in_list, sql_literal};
use crate::error::StoreError;
use crate::indexer::{ChunkType, CodeChunk};
use anyhow::{Context, Result};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatch, RecordBatchIterator,
    StringArray, UInt32Array, types::Float32Type,
};
use arrow_schema::{DataType, Field, Schema};
use futures::stream::TryStreamExt;
use lancedb::Table;
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Paths per `IN (...)` filter when looking up existing rows
const FILTER_CHUNK: usize = 200;

pub struct LanceChunkStore {
    connection: Connection,
    table_name: String,
    db_path: String,
    dimension: AtomicUsize,
    keywords: KeywordIndex,
}

impl LanceChunkStore {
    /// Connect to (or create) the database at `db_path`
    pub async fn with_path(db_path: &str, table_name: &str) -> Result<Self> {
        tracing::info!("Connecting to LanceDB at: {}", db_path);

        let connection = lancedb::connect(db_path)
            .execute()
            .await
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))
            .context("Failed to connect to LanceDB")?;

        let keywords = KeywordIndex::open(std::path::Path::new(db_path).join("keyword_index"))?;

        Ok(Self {
            connection,
            table_name: table_name.to_string(),
            db_path: db_path.to_string(),
            dimension: AtomicUsize::new(0),
            keywords,
        })
    }

    fn create_schema(dimension: usize) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("project_id", DataType::Utf8, false),
            Field::new("path", DataType::Utf8, false),
            Field::new("name", DataType::Utf8, false),
            Field::new("chunk_type", DataType::Utf8, false),
            Field::new("code", DataType::Utf8, false),
            Field::new("line_start", DataType::UInt32, false),
            Field::new("line_end", DataType::UInt32, false),
            Field::new("dependencies", DataType::Utf8, false),
            Field::new("dependents", DataType::Utf8, false),
            Field::new("created_at", DataType::Int64, false),
            Field::new("updated_at", DataType::Int64, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    dimension as i32,
                ),
                true,
            ),
        ]))
    }

    async fn get_table(&self) -> Result<Table> {
        self.connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|_| StoreError::NotInitialized)
            .context("Failed to open chunk table")
    }

    fn create_record_batch(
        chunks: &[CodeChunk],
        dimension: usize,
        schema: Arc<Schema>,
    ) -> Result<RecordBatch> {
        let vector_array = FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(
            chunks.iter().map(|c| {
                c.embedding
                    .as_ref()
                    .map(|v| v.iter().copied().map(Some).collect::<Vec<_>>())
            }),
            dimension as i32,
        );

        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(string_array(chunks, |c| c.id.as_str())),
                Arc::new(string_array(chunks, |c| c.project_id.as_str())),
                Arc::new(string_array(chunks, |c| c.path.as_str())),
                Arc::new(string_array(chunks, |c| c.name.as_str())),
                Arc::new(string_array(chunks, |c| c.chunk_type.as_str())),
                Arc::new(string_array(chunks, |c| c.code.as_str())),
                Arc::new(UInt32Array::from(
                    chunks.iter().map(|c| c.line_start as u32).collect::<Vec<_>>(),
                )),
                Arc::new(UInt32Array::from(
                    chunks.iter().map(|c| c.line_end as u32).collect::<Vec<_>>(),
                )),
                Arc::new(json_array(chunks, |c| &c.dependencies)?),
                Arc::new(json_array(chunks, |c| &c.dependents)?),
                Arc::new(Int64Array::from(
                    chunks.iter().map(|c| c.created_at).collect::<Vec<_>>(),
                )),
                Arc::new(Int64Array::from(
                    chunks.iter().map(|c| c.updated_at).collect::<Vec<_>>(),
                )),
                Arc::new(vector_array),
            ],
        )
        .context("Failed to create RecordBatch")
    }

    /// Decode rows back into chunks, with the `_distance` column when present
    fn chunks_from_batch(batch: &RecordBatch) -> Result<Vec<(CodeChunk, Option<f32>)>> {
        let ids = column::<StringArray>(batch, "id")?;
        let project_ids = column::<StringArray>(batch, "project_id")?;
        let paths = column::<StringArray>(batch, "path")?;
        let names = column::<StringArray>(batch, "name")?;
        let chunk_types = column::<StringArray>(batch, "chunk_type")?;
        let codes = column::<StringArray>(batch, "code")?;
        let line_starts = column::<UInt32Array>(batch, "line_start")?;
        let line_ends = column::<UInt32Array>(batch, "line_end")?;
        let dependencies = column::<StringArray>(batch, "dependencies")?;
        let dependents = column::<StringArray>(batch, "dependents")?;
        let created = column::<Int64Array>(batch, "created_at")?;
        let updated = column::<Int64Array>(batch, "updated_at")?;
        let vectors = batch
            .column_by_name("vector")
            .and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>());
        let distances = batch
            .column_by_name("_distance")
            .and_then(|c| c.as_any().downcast_ref::<Float32Array>());

        let mut rows = Vec::with_capacity(batch.num_rows());
        for i in 0..batch.num_rows() {
            let chunk_type: ChunkType = chunk_types
                .value(i)
                .parse()
                .map_err(|e: String| anyhow::anyhow!(e))?;
            let embedding = vectors.filter(|v| !v.is_null(i)).and_then(|v| {
                v.value(i)
                    .as_any()
                    .downcast_ref::<Float32Array>()
                    .map(|values| values.values().to_vec())
            });

            let chunk = CodeChunk {
                id: ids.value(i).to_string(),
                project_id: project_ids.value(i).to_string(),
                path: paths.value(i).to_string(),
                name: names.value(i).to_string(),
                chunk_type,
                code: codes.value(i).to_string(),
                line_start: line_starts.value(i) as usize,
                line_end: line_ends.value(i) as usize,
                dependencies: serde_json::from_str(dependencies.value(i))
                    .context("Invalid dependencies column")?,
                dependents: serde_json::from_str(dependents.value(i))
                    .context("Invalid dependents column")?,
                embedding,
                created_at: created.value(i),
                updated_at: updated.value(i),
            };
            rows.push((chunk, distances.map(|d| d.value(i))));
        }
        Ok(rows)
    }

    async fn query_chunks(&self, filter: String) -> Result<Vec<CodeChunk>> {
        let table = self.get_table().await?;
        let stream = table
            .query()
            .only_if(filter)
            .execute()
            .await
            .context("Failed to query chunks")?;
        let batches: Vec<RecordBatch> = stream
            .try_collect()
            .await
            .context("Failed to collect chunk rows")?;

        let mut chunks = Vec::new();
        for batch in &batches {
            chunks.extend(Self::chunks_from_batch(batch)?.into_iter().map(|(c, _)| c));
        }
        Ok(chunks)
    }

    /// Stored rows of a project at any of the given paths
    async fn existing_at_paths(&self, project_id: &str, paths: &[&str]) -> Result<Vec<CodeChunk>> {
        let mut existing = Vec::new();
        for group in paths.chunks(FILTER_CHUNK) {
            let filter = format!(
                "project_id = {} AND path IN ({})",
                sql_literal(project_id),
                sql_in_list(group.iter().copied())
            );
            existing.extend(self.query_chunks(filter).await?);
        }
        Ok(existing)
    }

    async fn delete_ids(&self, table: &Table, project_id: &str, ids: &[String]) -> Result<()> {
        for group in ids.chunks(FILTER_CHUNK) {
            let filter = format!(
                "project_id = {} AND id IN ({})",
                sql_literal(project_id),
                sql_in_list(group.iter().map(String::as_str))
            );
            table
                .delete(&filter)
                .await
                .map_err(|e| StoreError::DeleteFailed(e.to_string()))?;
        }
        Ok(())
    }
}

fn column<'b, T: Array + 'static>(batch: &'b RecordBatch, name: &str) -> Result<&'b T> {
    batch
        .column_by_name(name)
        .with_context(|| format!("Missing {} column", name))?
        .as_any()
        .downcast_ref::<T>()
        .with_context(|| format!("Invalid {} type", name))
}

fn string_array<'a>(chunks: &'a [CodeChunk], field: impl Fn(&'a CodeChunk) -> &'a str) -> StringArray {
    StringArray::from(chunks.iter().map(field).collect::<Vec<_>>())
}

/// Name lists are stored as JSON arrays in a string column
fn json_array<'a>(
    chunks: &'a [CodeChunk],
    field: impl Fn(&'a CodeChunk) -> &'a Vec<String>,
) -> Result<StringArray> {
    let encoded = chunks
        .iter()
        .map(|c| serde_json::to_string(field(c)))
        .collect::<Result<Vec<_>, _>>()
        .context("Failed to encode dependency list")?;
    Ok(StringArray::from(encoded))
}

#[async_trait::async_trait]
impl ChunkStore for LanceChunkStore {
    async fn initialize(&self, dimension: usize) -> Result<()> {
        tracing::info!(
            "Initializing LanceDB with dimension {} at {}",
            dimension,
            self.db_path
        );
        self.dimension.store(dimension, Ordering::SeqCst);

        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .context("Failed to list tables")?;

        if table_names.contains(&self.table_name) {
            tracing::debug!("Table '{}' already exists", self.table_name);
            return Ok(());
        }

        let schema = Self::create_schema(dimension);
        let empty_batch = RecordBatch::new_empty(schema.clone());
        let batches =
            RecordBatchIterator::new(vec![empty_batch].into_iter().map(Ok), schema.clone());

        self.connection
            .create_table(&self.table_name, Box::new(batches))
            .execute()
            .await
            .map_err(|e| StoreError::TableCreationFailed {
                table: self.table_name.clone(),
                reason: e.to_string(),
            })?;

        tracing::info!("Created table '{}'", self.table_name);
        Ok(())
    }

    async fn upsert_chunks(&self, project_id: &str, chunks: Vec<CodeChunk>) -> Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }
        let dimension = self.dimension.load(Ordering::SeqCst);
        if dimension == 0 {
            return Err(StoreError::NotInitialized.into());
        }
        if let Some(bad) = chunks
            .iter()
            .filter_map(|c| c.embedding.as_ref())
            .find(|e| e.len() != dimension)
        {
            return Err(StoreError::UpsertFailed(format!(
                "embedding has {} dimensions, table expects {}",
                bad.len(),
                dimension
            ))
            .into());
        }

        let mut incoming: Vec<CodeChunk> = dedupe_batch(chunks)
            .into_iter()
            .map(|mut c| {
                c.project_id = project_id.to_string();
                c
            })
            .collect();

        let mut paths: Vec<&str> = Vec::new();
        for chunk in &incoming {
            if !paths.contains(&chunk.path.as_str()) {
                paths.push(&chunk.path);
            }
        }
        let existing = self.existing_at_paths(project_id, &paths).await?;
        drop(paths);
        let replaced = preserve_identity(&existing, &mut incoming);

        let table = self.get_table().await?;
        self.delete_ids(&table, project_id, &replaced).await?;

        let schema = Self::create_schema(dimension);
        let batch = Self::create_record_batch(&incoming, dimension, schema.clone())?;
        let count = batch.num_rows();
        let batches = RecordBatchIterator::new(vec![batch].into_iter().map(Ok), schema);

        table
            .add(Box::new(batches))
            .execute()
            .await
            .map_err(|e| StoreError::UpsertFailed(e.to_string()))?;

        self.keywords.delete_ids(&replaced)?;
        self.keywords.upsert(&incoming)?;

        tracing::info!(
            "Upserted {} chunks ({} replaced) for project {}",
            count,
            replaced.len(),
            project_id
        );
        Ok(count)
    }

    async fn get_chunks_by_project(&self, project_id: &str) -> Result<Vec<CodeChunk>> {
        self.query_chunks(format!("project_id = {}", sql_literal(project_id)))
            .await
    }

    async fn count_chunks(&self, project_id: &str) -> Result<usize> {
        let table = self.get_table().await?;
        table
            .count_rows(Some(format!("project_id = {}", sql_literal(project_id))))
            .await
            .context("Failed to count rows")
    }

    async fn delete_chunks(&self, project_id: &str, ids: &[String]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let table = self.get_table().await?;
        let before = self.count_chunks(project_id).await?;
        self.delete_ids(&table, project_id, ids).await?;
        self.keywords.delete_ids(ids)?;
        let after = self.count_chunks(project_id).await?;
        Ok(before.saturating_sub(after))
    }

    async fn delete_project(&self, project_id: &str) -> Result<usize> {
        let table = self.get_table().await?;
        let count = self.count_chunks(project_id).await?;
        table
            .delete(&format!("project_id = {}", sql_literal(project_id)))
            .await
            .map_err(|e| StoreError::DeleteFailed(e.to_string()))?;
        self.keywords.delete_project(project_id)?;

        tracing::info!("Deleted {} chunks of project {}", count, project_id);
        Ok(count)
    }

    async fn search_similar(
        &self,
        project_id: &str,
        vector: Vec<f32>,
        limit: usize,
        min_score: f32,
    ) -> Result<Vec<ScoredChunk>> {
        let table = self.get_table().await?;
        let stream = table
            .vector_search(vector)
            .context("Failed to create vector search")?
            .limit(limit)
            .only_if(format!("project_id = {}", sql_literal(project_id)))
            .execute()
            .await
            .map_err(|e| StoreError::SearchFailed(e.to_string()))?;

        let batches: Vec<RecordBatch> = stream
            .try_collect()
            .await
            .context("Failed to collect search results")?;

        let mut results = Vec::new();
        for batch in &batches {
            for (chunk, distance) in Self::chunks_from_batch(batch)? {
                let distance = distance.context("Missing _distance column")?;
                let score = 1.0 / (1.0 + distance);
                if score >= min_score {
                    results.push(ScoredChunk { chunk, score });
                }
            }
        }
        Ok(results)
    }

    async fn search_keyword(
        &self,
        project_id: &str,
        keyword: &str,
        limit: usize,
    ) -> Result<Vec<ScoredChunk>> {
        let hits = self.keywords.search(project_id, keyword, limit)?;
        if hits.is_empty() {
            return Ok(Vec::new());
        }

        let filter = format!(
            "project_id = {} AND id IN ({})",
            sql_literal(project_id),
            sql_in_list(hits.iter().map(|(id, _)| id.as_str()))
        );
        let mut by_id: HashMap<String, CodeChunk> = self
            .query_chunks(filter)
            .await?
            .into_iter()
            .map(|c| (c.id.clone(), c))
            .collect();

        Ok(hits
            .into_iter()
            .filter_map(|(id, score)| by_id.remove(&id).map(|chunk| ScoredChunk { chunk, score }))
            .collect())
    }
}
