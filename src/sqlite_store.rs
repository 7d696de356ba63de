//! SQLite-backed [`VectorIndex`] and [`FileHashStore`].
//!
//! Vectors are stored as little-endian f32 BLOBs next to the chunk text and
//! metadata. Queries load every vector and rank by cosine similarity in
//! Rust, which is adequate for course-sized corpora.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

use tutor_harness_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use tutor_harness_core::models::{Chunk, ChunkMetadata, ScoredChunk};
use tutor_harness_core::store::{FileHashStore, VectorIndex};

/// SQLite implementation of [`VectorIndex`] over the `chunks` table.
pub struct SqliteIndex {
    pool: SqlitePool,
}

impl SqliteIndex {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn ranked(&self, vector: &[f32], k: usize) -> Result<Vec<(Chunk, f64)>> {
        let rows = sqlx::query(
            "SELECT content, source, page, title, course_id, uploaded_by, timestamp, embedding \
             FROM chunks ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .context("loading chunk vectors")?;

        let mut scored: Vec<(Chunk, f64)> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let page: i64 = row.get("page");
                let chunk = Chunk {
                    content: row.get("content"),
                    metadata: ChunkMetadata {
                        source: row.get("source"),
                        page: page as u32,
                        title: row.get("title"),
                        course_id: row.get("course_id"),
                        uploaded_by: row.get("uploaded_by"),
                        timestamp: row.get("timestamp"),
                    },
                };
                let score = cosine_similarity(vector, &blob_to_vec(&blob)) as f64;
                (chunk, score)
            })
            .collect();

        // Stable sort keeps insertion order among equal scores.
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }
}

async fn insert_chunks(tx: &mut Transaction<'_, Sqlite>, items: &[(Chunk, Vec<f32>)]) -> Result<()> {
    for (chunk, vector) in items {
        let meta = &chunk.metadata;
        sqlx::query(
            r#"
            INSERT INTO chunks (content, source, page, title, course_id, uploaded_by,
                                timestamp, dims, embedding)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&chunk.content)
        .bind(&meta.source)
        .bind(meta.page as i64)
        .bind(&meta.title)
        .bind(&meta.course_id)
        .bind(&meta.uploaded_by)
        .bind(&meta.timestamp)
        .bind(vector.len() as i64)
        .bind(vec_to_blob(vector))
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

async fn delete_sources(tx: &mut Transaction<'_, Sqlite>, sources: &[String]) -> Result<()> {
    for source in sources {
        sqlx::query("DELETE FROM chunks WHERE source = ?")
            .bind(source)
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    async fn upsert(&self, items: &[(Chunk, Vec<f32>)]) -> Result<()> {
        self.replace(&[], items).await
    }

    async fn remove_sources(&self, sources: &[String]) -> Result<()> {
        self.replace(sources, &[]).await
    }

    async fn replace(&self, stale_sources: &[String], items: &[(Chunk, Vec<f32>)]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        delete_sources(&mut tx, stale_sources).await?;
        insert_chunks(&mut tx, items).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        Ok(self
            .ranked(vector, k)
            .await?
            .into_iter()
            .map(|(chunk, score)| ScoredChunk {
                content: chunk.content,
                metadata: chunk.metadata,
                score,
            })
            .collect())
    }

    async fn query_unscored(&self, vector: &[f32], k: usize) -> Result<Vec<Chunk>> {
        Ok(self
            .ranked(vector, k)
            .await?
            .into_iter()
            .map(|(chunk, _)| chunk)
            .collect())
    }

    async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM chunks").execute(&self.pool).await?;
        Ok(())
    }

    async fn len(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }
}

/// SQLite implementation of [`FileHashStore`] over the `file_hashes` table.
pub struct SqliteHashStore {
    pool: SqlitePool,
}

impl SqliteHashStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

const UPSERT_HASH: &str = r#"
    INSERT INTO file_hashes (file_name, hash, updated_at) VALUES (?, ?, ?)
    ON CONFLICT(file_name) DO UPDATE SET
        hash = excluded.hash,
        updated_at = excluded.updated_at
"#;

#[async_trait]
impl FileHashStore for SqliteHashStore {
    async fn get(&self, file_name: &str) -> Result<Option<String>> {
        let hash: Option<String> =
            sqlx::query_scalar("SELECT hash FROM file_hashes WHERE file_name = ?")
                .bind(file_name)
                .fetch_optional(&self.pool)
                .await?;
        Ok(hash)
    }

    async fn set(&self, file_name: &str, hash: &str) -> Result<()> {
        sqlx::query(UPSERT_HASH)
            .bind(file_name)
            .bind(hash)
            .bind(chrono::Utc::now().timestamp())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_many(&self, entries: &[(String, String)]) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;
        for (name, hash) in entries {
            sqlx::query(UPSERT_HASH)
                .bind(name)
                .bind(hash)
                .bind(now)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM file_hashes")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
