//! Response caching keyed on the full answer context, not just the raw prompt
//!
//! Two queries that retrieve the same evidence set and land on the same
//! response strategy can reuse a generated answer; two queries with the same
//! text but different retrieved evidence (the corpus changed underneath
//! them) must not.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use tracing::{debug, info};

/// Configuration for response caching
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseCacheConfig {
    pub enabled: bool,
    pub max_entries: usize,
    pub ttl_seconds: i64,
    pub db_path: String,
}

impl Default for ResponseCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 1000,
            ttl_seconds: 3600,
            db_path: "cache.db".to_string(),
        }
    }
}

/// Response cache backed by SQLite
pub struct ResponseCache {
    pool: SqlitePool,
    config: ResponseCacheConfig,
}

impl ResponseCache {
    pub async fn new(config: ResponseCacheConfig) -> Result<Self> {
        if !config.enabled {
            info!("response cache is disabled");
        }

        info!("initializing response cache at: {}", config.db_path);

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", config.db_path))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS response_cache (
                key TEXT PRIMARY KEY,
                response TEXT NOT NULL,
                created_at TEXT NOT NULL,
                last_accessed TEXT NOT NULL,
                hit_count INTEGER NOT NULL DEFAULT 0,
                strategy TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_last_accessed ON response_cache(last_accessed)")
            .execute(&pool)
            .await?;

        Ok(Self { pool, config })
    }

    /// Deterministic key covering the query, the persona, the response
    /// strategy chosen, and the exact set of evidence chunk ids used —
    /// the same query against a different corpus state must miss.
    pub fn compute_cache_key(
        query: &str,
        persona: &str,
        strategy: &str,
        evidence_chunk_ids: &[String],
    ) -> String {
        let mut hasher = DefaultHasher::new();

        query.hash(&mut hasher);
        persona.hash(&mut hasher);
        strategy.hash(&mut hasher);

        let mut sorted_ids = evidence_chunk_ids.to_vec();
        sorted_ids.sort();
        for id in &sorted_ids {
            id.hash(&mut hasher);
        }

        format!("{:x}", hasher.finish())
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        if !self.config.enabled {
            return Ok(None);
        }

        let result = sqlx::query_as::<_, (String, String, i64)>(
            r#"
            SELECT response, created_at, hit_count
            FROM response_cache
            WHERE key = ?
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        let Some((response, created_at_str, hit_count)) = result else {
            debug!("cache miss for key: {}", key);
            return Ok(None);
        };

        let created_at = DateTime::parse_from_rfc3339(&created_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        let age = Utc::now().signed_duration_since(created_at);
        let ttl = Duration::seconds(self.config.ttl_seconds);

        if age > ttl {
            debug!("cache entry expired (age: {}s, ttl: {}s)", age.num_seconds(), ttl.num_seconds());
            self.invalidate(key).await?;
            return Ok(None);
        }

        sqlx::query(
            r#"
            UPDATE response_cache
            SET last_accessed = ?, hit_count = ?
            WHERE key = ?
            "#,
        )
        .bind(Utc::now().to_rfc3339())
        .bind(hit_count + 1)
        .bind(key)
        .execute(&self.pool)
        .await?;

        debug!("cache hit (hits: {})", hit_count + 1);
        Ok(Some(response))
    }

    pub async fn set(&self, key: String, response: String, strategy: &str) -> Result<()> {
        if !self.config.enabled {
            return Ok(());
        }

        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO response_cache (key, response, created_at, last_accessed, hit_count, strategy)
            VALUES (?, ?, ?, ?, 0, ?)
            "#,
        )
        .bind(&key)
        .bind(&response)
        .bind(&now)
        .bind(&now)
        .bind(strategy)
        .execute(&self.pool)
        .await?;

        debug!("cached response (strategy: {})", strategy);

        self.enforce_size_limit().await?;

        Ok(())
    }

    async fn enforce_size_limit(&self) -> Result<()> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM response_cache")
            .fetch_one(&self.pool)
            .await?;

        if count.0 > self.config.max_entries as i64 {
            let to_remove = count.0 - self.config.max_entries as i64;

            sqlx::query(
                r#"
                DELETE FROM response_cache
                WHERE key IN (
                    SELECT key FROM response_cache
                    ORDER BY last_accessed ASC
                    LIMIT ?
                )
                "#,
            )
            .bind(to_remove)
            .execute(&self.pool)
            .await?;

            info!("evicted {} old cache entries (LRU)", to_remove);
        }

        Ok(())
    }

    pub async fn invalidate(&self, key: &str) -> Result<()> {
        if !self.config.enabled {
            return Ok(());
        }

        sqlx::query("DELETE FROM response_cache WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn clear(&self) -> Result<()> {
        if !self.config.enabled {
            return Ok(());
        }

        sqlx::query("DELETE FROM response_cache").execute(&self.pool).await?;
        info!("cleared all cache entries");
        Ok(())
    }

    pub async fn stats(&self) -> Result<CacheStats> {
        let total_entries: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM response_cache")
            .fetch_one(&self.pool)
            .await?;

        let total_hits: (i64,) =
            sqlx::query_as("SELECT COALESCE(SUM(hit_count), 0) FROM response_cache")
                .fetch_one(&self.pool)
                .await?;

        Ok(CacheStats {
            total_entries: total_entries.0 as usize,
            total_hits: total_hits.0 as usize,
            max_entries: self.config.max_entries,
            ttl_seconds: self.config.ttl_seconds,
        })
    }

    pub async fn cleanup_expired(&self) -> Result<usize> {
        if !self.config.enabled {
            return Ok(0);
        }

        let cutoff = Utc::now() - Duration::seconds(self.config.ttl_seconds);

        let result = sqlx::query("DELETE FROM response_cache WHERE created_at < ?")
            .bind(cutoff.to_rfc3339())
            .execute(&self.pool)
            .await?;

        let removed = result.rows_affected() as usize;
        if removed > 0 {
            info!("cleaned up {} expired cache entries", removed);
        }
        Ok(removed)
    }
}

/// Cache statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub total_hits: usize,
    pub max_entries: usize,
    pub ttl_seconds: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn test_config(db_path: String) -> ResponseCacheConfig {
        ResponseCacheConfig {
            enabled: true,
            max_entries: 10,
            ttl_seconds: 3600,
            db_path,
        }
    }

    #[tokio::test]
    async fn test_cache_key_is_deterministic_and_evidence_sensitive() -> Result<()> {
        let key1 = ResponseCache::compute_cache_key(
            "What is the warranty period?",
            "standard",
            "answer",
            &["chunk-1".to_string(), "chunk-2".to_string()],
        );
        let key2 = ResponseCache::compute_cache_key(
            "What is the warranty period?",
            "standard",
            "answer",
            &["chunk-2".to_string(), "chunk-1".to_string()],
        );
        assert_eq!(key1, key2, "evidence order must not affect the key");

        let key3 = ResponseCache::compute_cache_key(
            "What is the warranty period?",
            "standard",
            "answer",
            &["chunk-3".to_string()],
        );
        assert_ne!(key1, key3, "a different evidence set must produce a different key");

        Ok(())
    }

    #[tokio::test]
    async fn test_cache_operations() -> Result<()> {
        let temp_file = NamedTempFile::new()?;
        let db_path = temp_file.path().to_str().unwrap().to_string();
        let cache = ResponseCache::new(test_config(db_path)).await?;

        let key = "test_key";
        let response = "Test response";

        assert!(cache.get(key).await?.is_none());

        cache.set(key.to_string(), response.to_string(), "answer").await?;

        let cached = cache.get(key).await?;
        assert_eq!(cached, Some(response.to_string()));

        let stats = cache.stats().await?;
        assert_eq!(stats.total_entries, 1);
        assert_eq!(stats.total_hits, 1);

        cache.invalidate(key).await?;
        assert!(cache.get(key).await?.is_none());

        Ok(())
    }

    #[tokio::test]
    async fn test_disabled_cache_is_a_no_op() -> Result<()> {
        let temp_file = NamedTempFile::new()?;
        let db_path = temp_file.path().to_str().unwrap().to_string();
        let mut config = test_config(db_path);
        config.enabled = false;
        let cache = ResponseCache::new(config).await?;

        cache.set("k".to_string(), "v".to_string(), "answer").await?;
        assert!(cache.get("k").await?.is_none());

        Ok(())
    }
}
