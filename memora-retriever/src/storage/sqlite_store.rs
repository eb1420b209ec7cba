//! SQLite implementation of [`CatalogStore`].
//!
//! ## Database Schema
//!
//! ```sql
//! CREATE TABLE memories (
//!     file_id TEXT PRIMARY KEY,        -- first 128 bits of the blake3 hash, hex
//!     path TEXT NOT NULL,              -- absolute path
//!     hash TEXT NOT NULL UNIQUE,       -- full blake3 hash, hex
//!     created_at TEXT NOT NULL,
//!     modified_at TEXT NOT NULL,
//!     exif_date TEXT,                  -- local capture time, nullable
//!     ocr_text TEXT,
//!     caption TEXT,
//!     memory_summary TEXT,
//!     tags TEXT,                       -- comma separated
//!     thumbnail BLOB,                  -- JPEG
//!     vision_json TEXT,
//!     vision_status TEXT NOT NULL,     -- pending | done | skipped | failed
//!     embedding BLOB,                  -- f16 vector
//!     indexed_at TEXT DEFAULT CURRENT_TIMESTAMP
//! );
//!
//! CREATE TABLE vision_config (
//!     id INTEGER PRIMARY KEY CHECK (id = 1),
//!     endpoint_url TEXT NOT NULL,
//!     model_name TEXT NOT NULL,
//!     api_key TEXT
//! );
//! ```
//!
//! The database lives at `<root>/.memory_index.db` and uses the same SQLite
//! tuning as the rest of the workspace: WAL journal, 64KB pages for the
//! thumbnail and embedding blobs, full auto-vacuum.

use super::{CatalogStore, IndexedVector, MemoryRecord, VisionStatus, dequantize, quantize};
use anyhow::{Context, Result};
use async_trait::async_trait;
use memora_vision::VisionConfig;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// File name of the catalog inside a mounted directory.
pub const CATALOG_FILE_NAME: &str = ".memory_index.db";

const RECORD_COLUMNS: &str = "file_id, path, hash, created_at, modified_at, exif_date, ocr_text, \
     caption, memory_summary, tags, thumbnail, vision_json, vision_status, embedding";

#[derive(Clone, Debug)]
pub struct ContentCatalog {
    db_path: Option<PathBuf>,
    pool: SqlitePool,
}

impl ContentCatalog {
    /// Location of the catalog for a mounted directory.
    pub fn db_path_for(root: &Path) -> PathBuf {
        root.join(CATALOG_FILE_NAME)
    }

    /// Whether a catalog has already been created under `root`.
    pub fn exists(root: &Path) -> bool {
        Self::db_path_for(root).is_file()
    }

    /// Opens (creating if needed) the catalog of a mounted directory.
    pub async fn open(root: &Path) -> Result<Self> {
        let db_path = Self::db_path_for(root);

        let pool = SqlitePool::connect_with(
            SqliteConnectOptions::new()
                .filename(&db_path)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                .busy_timeout(std::time::Duration::from_secs(5))
                .foreign_keys(true)
                .create_if_missing(true)
                .auto_vacuum(sqlx::sqlite::SqliteAutoVacuum::Full)
                .page_size(1 << 16)
                .optimize_on_close(true, 1 << 10),
        )
        .await
        .with_context(|| format!("opening catalog {}", db_path.display()))?;
        Self::new_with_pool(Some(db_path), pool).await
    }

    /// Opens an in-memory catalog for tests.
    ///
    /// The pool is pinned to one connection that never expires, since every
    /// new `:memory:` connection would otherwise see an empty database.
    pub async fn open_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Self::new_with_pool(None, pool).await
    }

    async fn new_with_pool(db_path: Option<PathBuf>, pool: SqlitePool) -> Result<Self> {
        Self::create_tables(&pool).await?;
        Ok(Self { db_path, pool })
    }

    async fn create_tables(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS memories (
                file_id TEXT PRIMARY KEY,
                path TEXT NOT NULL,
                hash TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL,
                modified_at TEXT NOT NULL,
                exif_date TEXT,
                ocr_text TEXT,
                caption TEXT,
                memory_summary TEXT,
                tags TEXT,
                thumbnail BLOB,
                vision_json TEXT,
                vision_status TEXT NOT NULL DEFAULT 'pending',
                embedding BLOB,
                indexed_at TEXT DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS vision_config (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                endpoint_url TEXT NOT NULL,
                model_name TEXT NOT NULL,
                api_key TEXT
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_memories_created ON memories(created_at)")
            .execute(pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_memories_exif ON memories(exif_date)")
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Path of the database file, `None` for in-memory catalogs.
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Get the underlying SQLite connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn record_from_row(row: &SqliteRow) -> Result<MemoryRecord> {
        let file_id: String = row.get("file_id");

        let status_text: String = row.get("vision_status");
        let vision_status = status_text.parse::<VisionStatus>().unwrap_or_else(|e| {
            warn!("Record {} has {}; treating as pending", file_id, e);
            VisionStatus::Pending
        });

        let tags: Option<String> = row.get("tags");
        let tags = tags
            .map(|t| {
                t.split(',')
                    .map(|tag| tag.trim().to_string())
                    .filter(|tag| !tag.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let embedding_bytes: Option<Vec<u8>> = row.get("embedding");
        let embedding = embedding_bytes
            .map(|bytes| dequantize(&bytemuck::pod_collect_to_vec::<u8, half::f16>(&bytes)));

        Ok(MemoryRecord {
            path: row.get("path"),
            hash: row.get("hash"),
            created_at: row.try_get("created_at")?,
            modified_at: row.try_get("modified_at")?,
            exif_date: row.try_get("exif_date")?,
            ocr_text: row.get("ocr_text"),
            caption: row.get("caption"),
            memory_summary: row.get("memory_summary"),
            tags,
            thumbnail: row.get("thumbnail"),
            vision_json: row.get("vision_json"),
            vision_status,
            embedding,
            file_id,
        })
    }
}

#[async_trait]
impl CatalogStore for ContentCatalog {
    async fn upsert_record(&self, record: &MemoryRecord) -> Result<()> {
        let embedding = record.embedding.as_deref().map(quantize);
        let embedding_bytes = embedding
            .as_ref()
            .map(|e| bytemuck::cast_slice::<half::f16, u8>(e));
        let tags = (!record.tags.is_empty()).then(|| record.tags_text());

        sqlx::query(
            r#"
            INSERT INTO memories (file_id, path, hash, created_at, modified_at, exif_date,
                ocr_text, caption, memory_summary, tags, thumbnail, vision_json, vision_status,
                embedding, indexed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, datetime('now'))
            ON CONFLICT(file_id) DO UPDATE SET
                path = excluded.path,
                created_at = excluded.created_at,
                modified_at = excluded.modified_at,
                exif_date = excluded.exif_date,
                ocr_text = excluded.ocr_text,
                caption = excluded.caption,
                memory_summary = excluded.memory_summary,
                tags = excluded.tags,
                thumbnail = excluded.thumbnail,
                vision_json = excluded.vision_json,
                vision_status = excluded.vision_status,
                embedding = excluded.embedding,
                indexed_at = datetime('now')
            "#,
        )
        .bind(&record.file_id)
        .bind(&record.path)
        .bind(&record.hash)
        .bind(record.created_at)
        .bind(record.modified_at)
        .bind(record.exif_date)
        .bind(&record.ocr_text)
        .bind(&record.caption)
        .bind(&record.memory_summary)
        .bind(tags)
        .bind(&record.thumbnail)
        .bind(&record.vision_json)
        .bind(record.vision_status.as_str())
        .bind(embedding_bytes)
        .execute(&self.pool)
        .await?;

        debug!("Stored record {} for {}", record.file_id, record.path);
        Ok(())
    }

    async fn get_record(&self, file_id: &str) -> Result<Option<MemoryRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM memories WHERE file_id = ?1"
        ))
        .bind(file_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::record_from_row).transpose()
    }

    async fn contains_hash(&self, hash: &str) -> Result<bool> {
        let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM memories WHERE hash = ?1")
            .bind(hash)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }

    async fn list_records(&self, limit: usize, offset: usize) -> Result<Vec<MemoryRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM memories ORDER BY created_at DESC, rowid ASC LIMIT ?1 OFFSET ?2"
        ))
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::record_from_row).collect()
    }

    async fn embedded_vectors(&self) -> Result<Vec<IndexedVector>> {
        let rows = sqlx::query(
            "SELECT file_id, path, embedding FROM memories WHERE embedding IS NOT NULL ORDER BY rowid",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut vectors = Vec::with_capacity(rows.len());
        for row in rows {
            let bytes: Vec<u8> = row.get("embedding");
            vectors.push(IndexedVector {
                file_id: row.get("file_id"),
                path: row.get("path"),
                vector: dequantize(&bytemuck::pod_collect_to_vec::<u8, half::f16>(&bytes)),
            });
        }
        Ok(vectors)
    }

    async fn count_records(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM memories")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    async fn count_embedded(&self) -> Result<usize> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(1) FROM memories WHERE embedding IS NOT NULL")
                .fetch_one(&self.pool)
                .await?;
        Ok(count as usize)
    }

    async fn vision_status_counts(&self) -> Result<BTreeMap<String, usize>> {
        let rows = sqlx::query(
            "SELECT vision_status, COUNT(1) AS n FROM memories GROUP BY vision_status",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let status: String = row.get("vision_status");
                let count: i64 = row.get("n");
                (status, count as usize)
            })
            .collect())
    }

    async fn thumbnail(&self, file_id: &str) -> Result<Option<Vec<u8>>> {
        let thumbnail: Option<Option<Vec<u8>>> =
            sqlx::query_scalar("SELECT thumbnail FROM memories WHERE file_id = ?1")
                .bind(file_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(thumbnail.flatten())
    }

    async fn vision_config(&self) -> Result<Option<VisionConfig>> {
        let row = sqlx::query(
            "SELECT endpoint_url, model_name, api_key FROM vision_config WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| VisionConfig {
            endpoint_url: row.get("endpoint_url"),
            model_name: row.get("model_name"),
            api_key: row.get("api_key"),
        }))
    }

    async fn save_vision_config(&self, config: &VisionConfig) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO vision_config (id, endpoint_url, model_name, api_key)
            VALUES (1, ?1, ?2, ?3)
            ON CONFLICT(id) DO UPDATE SET
                endpoint_url = excluded.endpoint_url,
                model_name = excluded.model_name,
                api_key = excluded.api_key
            "#,
        )
        .bind(&config.endpoint_url)
        .bind(&config.model_name)
        .bind(&config.api_key)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn database_size_bytes(&self) -> Result<Option<u64>> {
        if self.db_path.is_none() {
            return Ok(None);
        }
        let page_size: i64 = sqlx::query_scalar("PRAGMA page_size")
            .fetch_one(&self.pool)
            .await?;
        let page_count: i64 = sqlx::query_scalar("PRAGMA page_count")
            .fetch_one(&self.pool)
            .await?;
        Ok(Some((page_size * page_count) as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use chrono::{NaiveDate, TimeZone, Utc};
    use tempfile::tempdir;

    fn record(file_id: &str, hash: &str, day: u32) -> MemoryRecord {
        let created = Utc.with_ymd_and_hms(2024, 5, day, 12, 0, 0).unwrap();
        MemoryRecord {
            file_id: file_id.to_string(),
            path: format!("/photos/{file_id}.jpg"),
            hash: hash.to_string(),
            created_at: created,
            modified_at: created,
            exif_date: None,
            ocr_text: None,
            caption: None,
            memory_summary: None,
            tags: Vec::new(),
            thumbnail: None,
            vision_json: None,
            vision_status: VisionStatus::Skipped,
            embedding: None,
        }
    }

    #[tokio::test]
    async fn test_record_round_trip() -> Result<()> {
        let catalog = ContentCatalog::open_memory().await?;

        let mut original = record("a1", "hash-a1", 1);
        original.exif_date = NaiveDate::from_ymd_opt(2023, 7, 14)
            .and_then(|d| d.and_hms_opt(18, 30, 5));
        original.memory_summary = Some("Fireworks over the river".to_string());
        original.tags = vec!["fireworks".to_string(), "night".to_string()];
        original.thumbnail = Some(vec![0xFF, 0xD8, 0xFF]);
        original.vision_status = VisionStatus::Done;
        original.embedding = Some(vec![0.5, -0.25, 1.0]);

        catalog.upsert_record(&original).await?;
        let fetched = catalog.get_record("a1").await?.unwrap();

        assert_eq!(fetched, original);
        assert_eq!(catalog.get_record("missing").await?, None);
        assert!(catalog.contains_hash("hash-a1").await?);
        assert!(!catalog.contains_hash("hash-zz").await?);
        assert_eq!(catalog.thumbnail("a1").await?, Some(vec![0xFF, 0xD8, 0xFF]));
        Ok(())
    }

    #[tokio::test]
    async fn test_described_tags_round_trip() -> Result<()> {
        let catalog = ContentCatalog::open_memory().await?;
        let description = memora_vision::parse_description(
            r#"{"caption": "Skyline at dusk", "tags": ["New York, NY", "skyline"]}"#,
        )?;

        let mut original = record("c1", "hash-c1", 3);
        original.caption = description.caption;
        original.memory_summary = description.summary;
        original.tags = description.tags;
        catalog.upsert_record(&original).await?;

        let fetched = catalog.get_record("c1").await?.unwrap();
        assert_eq!(fetched.tags, vec!["new york ny", "skyline"]);
        assert_eq!(fetched, original);
        Ok(())
    }

    #[tokio::test]
    async fn test_upsert_replaces_by_file_id() -> Result<()> {
        let catalog = ContentCatalog::open_memory().await?;

        catalog.upsert_record(&record("a1", "hash-a1", 1)).await?;
        let mut moved = record("a1", "hash-a1", 1);
        moved.path = "/photos/renamed.jpg".to_string();
        catalog.upsert_record(&moved).await?;

        assert_eq!(catalog.count_records().await?, 1);
        assert_eq!(
            catalog.get_record("a1").await?.unwrap().path,
            "/photos/renamed.jpg"
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_list_newest_first() -> Result<()> {
        let catalog = ContentCatalog::open_memory().await?;
        for (id, day) in [("old", 1), ("new", 20), ("mid", 10)] {
            catalog
                .upsert_record(&record(id, &format!("hash-{id}"), day))
                .await?;
        }

        let ids: Vec<String> = catalog
            .list_records(10, 0)
            .await?
            .into_iter()
            .map(|r| r.file_id)
            .collect();
        assert_eq!(ids, vec!["new", "mid", "old"]);

        let page = catalog.list_records(1, 1).await?;
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].file_id, "mid");
        Ok(())
    }

    #[tokio::test]
    async fn test_embedded_vectors_in_insertion_order() -> Result<()> {
        let catalog = ContentCatalog::open_memory().await?;
        for (i, id) in ["c", "a", "b"].iter().enumerate() {
            let mut r = record(id, &format!("hash-{id}"), 1);
            r.embedding = Some(vec![i as f32, 0.0]);
            catalog.upsert_record(&r).await?;
        }
        catalog.upsert_record(&record("none", "hash-none", 1)).await?;

        let vectors = catalog.embedded_vectors().await?;
        let ids: Vec<&str> = vectors.iter().map(|v| v.file_id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
        assert_eq!(vectors[2].vector, vec![2.0, 0.0]);
        assert_eq!(catalog.count_embedded().await?, 3);
        assert_eq!(catalog.count_records().await?, 4);
        Ok(())
    }

    #[tokio::test]
    async fn test_vision_status_counts() -> Result<()> {
        let catalog = ContentCatalog::open_memory().await?;
        let mut done = record("d", "hash-d", 1);
        done.vision_status = VisionStatus::Done;
        catalog.upsert_record(&done).await?;
        catalog.upsert_record(&record("s1", "hash-s1", 1)).await?;
        catalog.upsert_record(&record("s2", "hash-s2", 1)).await?;

        let counts = catalog.vision_status_counts().await?;
        assert_eq!(counts.get("done"), Some(&1));
        assert_eq!(counts.get("skipped"), Some(&2));
        assert_eq!(counts.get("failed"), None);
        Ok(())
    }

    #[tokio::test]
    async fn test_vision_config_single_row() -> Result<()> {
        let catalog = ContentCatalog::open_memory().await?;
        assert_eq!(catalog.vision_config().await?, None);

        let first = VisionConfig::new("http://localhost:1234", "llava");
        catalog.save_vision_config(&first).await?;
        let second = VisionConfig::new("http://ollama:11434", "qwen2-vl").with_api_key("k");
        catalog.save_vision_config(&second).await?;

        assert_eq!(catalog.vision_config().await?, Some(second));
        let rows: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM vision_config")
            .fetch_one(catalog.pool())
            .await?;
        assert_eq!(rows, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_file_backed_catalog() -> Result<()> {
        let temp_dir = tempdir()?;
        assert!(!ContentCatalog::exists(temp_dir.path()));

        let catalog = ContentCatalog::open(temp_dir.path()).await?;
        catalog.upsert_record(&record("a", "hash-a", 1)).await?;

        assert!(ContentCatalog::exists(temp_dir.path()));
        assert!(catalog.database_size_bytes().await?.unwrap_or(0) > 0);
        assert_eq!(
            catalog.db_path(),
            Some(temp_dir.path().join(CATALOG_FILE_NAME).as_path())
        );
        Ok(())
    }
}
