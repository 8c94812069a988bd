//! SQLite-backed `VectorStore`.

use super::{ScoredChunk, SearchFilter, VectorStore};
use crate::chunk::{Chunk, Modality, SourceType};
use crate::config::StoreConfig;
use crate::error::{Result, StorageError};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use tokio::sync::OnceCell;
use tracing::{debug, info};

pub struct SqliteChunkStore {
    pool: OnceCell<SqlitePool>,
    config: StoreConfig,
}

impl SqliteChunkStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            pool: OnceCell::new(),
            config,
        }
    }

    async fn pool(&self) -> Result<&SqlitePool> {
        self.pool
            .get_or_try_init(|| async { self.connect().await })
            .await
    }

    async fn connect(&self) -> Result<SqlitePool> {
        let database_url = if self.config.database_url.contains('?') {
            self.config.database_url.clone()
        } else {
            format!("{}?mode=rwc", self.config.database_url)
        };

        info!(url = %self.config.database_url, "opening chunk store");
        let pool = SqlitePool::connect(&database_url)
            .await
            .map_err(|e| StorageError::WriteFailed(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                id TEXT PRIMARY KEY,
                modality TEXT NOT NULL,
                content TEXT NOT NULL,
                source_file TEXT NOT NULL,
                source_type TEXT NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}',
                embedding BLOB,
                confidence REAL NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .map_err(|e| StorageError::WriteFailed(e.to_string()))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_source_file ON chunks(source_file)")
            .execute(&pool)
            .await
            .map_err(|e| StorageError::WriteFailed(e.to_string()))?;

        Ok(pool)
    }

    fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn deserialize_embedding(data: &[u8]) -> Vec<f32> {
        data.chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() || a.is_empty() {
            return 0.0;
        }
        let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
        let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }
        dot / (norm_a * norm_b)
    }

    fn row_to_chunk(row: &sqlx::sqlite::SqliteRow) -> Result<Chunk> {
        let modality_str: String = row.get("modality");
        let source_type_str: String = row.get("source_type");
        let metadata_json: String = row.get("metadata");
        let embedding_blob: Option<Vec<u8>> = row.get("embedding");
        let created_at: String = row.get("created_at");

        Ok(Chunk {
            id: row.get("id"),
            modality: parse_modality(&modality_str)?,
            content: row.get("content"),
            source_file: row.get("source_file"),
            source_type: parse_source_type(&source_type_str)?,
            metadata: serde_json::from_str(&metadata_json).unwrap_or_default(),
            embedding: embedding_blob.map(|b| Self::deserialize_embedding(&b)),
            confidence: row.get::<f64, _>("confidence") as f32,
            created_at: chrono::DateTime::parse_from_rfc3339(&created_at)
                .map_err(|e| StorageError::SearchFailed(e.to_string()))?
                .with_timezone(&chrono::Utc),
        })
    }
}

fn parse_modality(s: &str) -> Result<Modality> {
    match s {
        "TEXT" => Ok(Modality::Text),
        "IMAGE" => Ok(Modality::Image),
        "AUDIO" => Ok(Modality::Audio),
        other => Err(StorageError::SearchFailed(format!("unknown modality: {other}")).into()),
    }
}

fn parse_source_type(s: &str) -> Result<SourceType> {
    match s {
        "uploaded_text" => Ok(SourceType::UploadedText),
        "uploaded_image" => Ok(SourceType::UploadedImage),
        "uploaded_audio" => Ok(SourceType::UploadedAudio),
        "pdf_text" => Ok(SourceType::PdfText),
        "pdf_embedded_image" => Ok(SourceType::PdfEmbeddedImage),
        "pdf_image_ocr" => Ok(SourceType::PdfImageOcr),
        "docx_text" => Ok(SourceType::DocxText),
        other => Err(StorageError::SearchFailed(format!("unknown source_type: {other}")).into()),
    }
}

#[async_trait]
impl VectorStore for SqliteChunkStore {
    async fn add(&self, chunk: Chunk) -> Result<()> {
        let Some(embedding) = &chunk.embedding else {
            return Err(StorageError::MissingEmbedding(chunk.id).into());
        };
        let pool = self.pool().await?;

        let existing: Option<(String,)> = sqlx::query_as("SELECT id FROM chunks WHERE id = ?1")
            .bind(&chunk.id)
            .fetch_optional(pool)
            .await
            .map_err(|e| StorageError::SearchFailed(e.to_string()))?;
        if existing.is_some() {
            return Err(StorageError::DuplicateId(chunk.id).into());
        }

        let metadata_json = serde_json::to_string(&chunk.metadata)
            .map_err(|e| StorageError::WriteFailed(e.to_string()))?;
        let embedding_blob = Self::serialize_embedding(embedding);

        sqlx::query(
            r#"
            INSERT INTO chunks
                (id, modality, content, source_file, source_type, metadata, embedding, confidence, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&chunk.id)
        .bind(chunk.modality.to_string())
        .bind(&chunk.content)
        .bind(&chunk.source_file)
        .bind(chunk.source_type.to_string())
        .bind(&metadata_json)
        .bind(&embedding_blob)
        .bind(chunk.confidence as f64)
        .bind(chunk.created_at.to_rfc3339())
        .execute(pool)
        .await
        .map_err(|e| StorageError::WriteFailed(e.to_string()))?;

        debug!(chunk_id = %chunk.id, "added chunk");
        Ok(())
    }

    async fn search(
        &self,
        query_embedding: &[f32],
        top_k: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<ScoredChunk>> {
        let pool = self.pool().await?;

        let rows = sqlx::query("SELECT * FROM chunks WHERE embedding IS NOT NULL")
            .fetch_all(pool)
            .await
            .map_err(|e| StorageError::SearchFailed(e.to_string()))?;

        let mut scored = Vec::new();
        for row in &rows {
            let chunk = Self::row_to_chunk(row)?;

            if let Some(modality) = filter.modality {
                if chunk.modality != modality {
                    continue;
                }
            }
            if let Some(source_file) = &filter.source_file {
                if &chunk.source_file != source_file {
                    continue;
                }
            }

            let Some(embedding) = &chunk.embedding else {
                continue;
            };
            let similarity = Self::cosine_similarity(query_embedding, embedding);
            scored.push(ScoredChunk { chunk, similarity });
        }

        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk.id.cmp(&b.chunk.id))
        });
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn delete(&self, chunk_id: &str) -> Result<()> {
        let pool = self.pool().await?;
        sqlx::query("DELETE FROM chunks WHERE id = ?1")
            .bind(chunk_id)
            .execute(pool)
            .await
            .map_err(|e| StorageError::WriteFailed(e.to_string()))?;
        Ok(())
    }

    async fn delete_source(&self, source_file: &str) -> Result<usize> {
        let pool = self.pool().await?;
        let result = sqlx::query("DELETE FROM chunks WHERE source_file = ?1")
            .bind(source_file)
            .execute(pool)
            .await
            .map_err(|e| StorageError::WriteFailed(e.to_string()))?;
        Ok(result.rows_affected() as usize)
    }

    async fn reset(&self) -> Result<()> {
        let pool = self.pool().await?;
        sqlx::query("DELETE FROM chunks")
            .execute(pool)
            .await
            .map_err(|e| StorageError::WriteFailed(e.to_string()))?;
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        let pool = self.pool().await?;
        let row = sqlx::query("SELECT COUNT(*) as c FROM chunks")
            .fetch_one(pool)
            .await
            .map_err(|e| StorageError::SearchFailed(e.to_string()))?;
        Ok(row.get::<i64, _>("c") as usize)
    }

    async fn count_by_modality(&self) -> Result<std::collections::HashMap<Modality, usize>> {
        let pool = self.pool().await?;
        let rows = sqlx::query("SELECT modality, COUNT(*) as c FROM chunks GROUP BY modality")
            .fetch_all(pool)
            .await
            .map_err(|e| StorageError::SearchFailed(e.to_string()))?;

        let mut counts = std::collections::HashMap::new();
        for row in &rows {
            let modality_str: String = row.get("modality");
            let modality = parse_modality(&modality_str)?;
            counts.insert(modality, row.get::<i64, _>("c") as usize);
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::SourceType;

    async fn test_store() -> SqliteChunkStore {
        let store = SqliteChunkStore::new(StoreConfig {
            database_url: "sqlite::memory:".to_string(),
            ..StoreConfig::default()
        });
        store.pool().await.unwrap();
        store
    }

    fn chunk_with_embedding(embedding: Vec<f32>, source_file: &str) -> Chunk {
        let mut chunk = Chunk::new(Modality::Text, "content", source_file, SourceType::UploadedText);
        chunk.embedding = Some(embedding);
        chunk
    }

    #[tokio::test]
    async fn test_add_rejects_missing_embedding() {
        let store = test_store().await;
        let chunk = Chunk::new(Modality::Text, "x", "f.txt", SourceType::UploadedText);
        assert!(store.add(chunk).await.is_err());
    }

    #[tokio::test]
    async fn test_add_rejects_duplicate_id() {
        let store = test_store().await;
        let chunk = chunk_with_embedding(vec![1.0, 0.0], "f.txt");
        let dup = Chunk {
            id: chunk.id.clone(),
            ..chunk_with_embedding(vec![0.0, 1.0], "f.txt")
        };
        store.add(chunk).await.unwrap();
        assert!(store.add(dup).await.is_err());
    }

    #[tokio::test]
    async fn test_search_ranks_by_similarity() {
        let store = test_store().await;
        store.add(chunk_with_embedding(vec![1.0, 0.0], "a.txt")).await.unwrap();
        store.add(chunk_with_embedding(vec![0.0, 1.0], "b.txt")).await.unwrap();

        let results = store
            .search(&[1.0, 0.0], 5, &SearchFilter::default())
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk.source_file, "a.txt");
        assert!(results[0].similarity > results[1].similarity);
    }

    #[tokio::test]
    async fn test_delete_source_removes_all_its_chunks() {
        let store = test_store().await;
        store.add(chunk_with_embedding(vec![1.0, 0.0], "a.txt")).await.unwrap();
        store.add(chunk_with_embedding(vec![0.0, 1.0], "a.txt")).await.unwrap();
        store.add(chunk_with_embedding(vec![1.0, 1.0], "b.txt")).await.unwrap();

        let removed = store.delete_source("a.txt").await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_reset_clears_store() {
        let store = test_store().await;
        store.add(chunk_with_embedding(vec![1.0, 0.0], "a.txt")).await.unwrap();
        store.reset().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_count_by_modality_groups_correctly() {
        let store = test_store().await;
        store.add(chunk_with_embedding(vec![1.0, 0.0], "a.txt")).await.unwrap();
        let mut image_chunk = Chunk::new(Modality::Image, "img", "b.png", SourceType::UploadedImage);
        image_chunk.embedding = Some(vec![1.0, 1.0]);
        store.add(image_chunk).await.unwrap();

        let counts = store.count_by_modality().await.unwrap();
        assert_eq!(counts.get(&Modality::Text), Some(&1));
        assert_eq!(counts.get(&Modality::Image), Some(&1));
    }
}
