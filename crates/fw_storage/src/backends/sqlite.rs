use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use fw_core::{AnalysisResult, Article, ArticleStorage, CollectionRef, Error, Result, SaveCounts};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;

const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS articles (
        database_name TEXT NOT NULL,
        collection_name TEXT NOT NULL,
        url TEXT NOT NULL,
        title TEXT NOT NULL,
        source_page_url TEXT,
        content TEXT NOT NULL,
        source TEXT NOT NULL,
        fetched_at TEXT NOT NULL,
        published_date TEXT,
        analyzed INTEGER NOT NULL DEFAULT 0,
        analysis TEXT,
        PRIMARY KEY (database_name, collection_name, url)
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_articles_fetched_at
    ON articles (database_name, collection_name, fetched_at)
    "#,
];

pub struct SQLiteStorage {
    pool: Arc<SqlitePool>,
}

fn db_err(context: &str) -> impl Fn(sqlx::Error) -> Error + '_ {
    move |e| Error::Database(format!("{}: {}", context, e))
}

// Fixed-width UTC timestamps so text comparison orders them correctly.
fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Database(format!("Failed to parse timestamp '{}': {}", raw, e)))
}

fn row_to_article(row: &SqliteRow) -> Result<Article> {
    let read = db_err("Failed to read article row");
    let fetched_at: String = row.try_get("fetched_at").map_err(&read)?;
    let published_date: Option<String> = row.try_get("published_date").map_err(&read)?;
    let analysis: Option<String> = row.try_get("analysis").map_err(&read)?;

    Ok(Article {
        url: row.try_get("url").map_err(&read)?,
        title: row.try_get("title").map_err(&read)?,
        source_page_url: row.try_get("source_page_url").map_err(&read)?,
        content: row.try_get("content").map_err(&read)?,
        source: row.try_get("source").map_err(&read)?,
        fetched_at: parse_ts(&fetched_at)?,
        published_date: published_date.as_deref().map(parse_ts).transpose()?,
        analyzed: row.try_get("analyzed").map_err(&read)?,
        analysis: analysis
            .as_deref()
            .map(serde_json::from_str::<AnalysisResult>)
            .transpose()?,
    })
}

impl SQLiteStorage {
    /// Connect using a `sqlite:` URL, creating the file if needed.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| Error::Config(format!("Invalid SQLite URL '{}': {}", url, e)))?
            .create_if_missing(true);
        Self::with_options(options).await
    }

    pub async fn new_with_path(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Database(format!("Failed to create database directory: {}", e)))?;
        }
        let options = SqliteConnectOptions::new()
            .filename(PathBuf::from(db_path))
            .create_if_missing(true);
        Self::with_options(options).await
    }

    async fn with_options(options: SqliteConnectOptions) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(db_err("Failed to connect to database"))?;

        for (i, migration) in MIGRATIONS.iter().enumerate() {
            sqlx::query(migration)
                .execute(&pool)
                .await
                .map_err(|e| Error::Database(format!("Failed to run migration {}: {}", i, e)))?;
        }

        Ok(Self { pool: Arc::new(pool) })
    }
}

#[async_trait]
impl ArticleStorage for SQLiteStorage {
    async fn exists(&self, collection: &CollectionRef, url: &str) -> Result<bool> {
        let row = sqlx::query(
            "SELECT 1 FROM articles WHERE database_name = ? AND collection_name = ? AND url = ?",
        )
        .bind(&collection.database)
        .bind(&collection.collection)
        .bind(url)
        .fetch_optional(&*self.pool)
        .await
        .map_err(db_err("Failed to check article"))?;
        Ok(row.is_some())
    }

    async fn upsert_articles(&self, collection: &CollectionRef, articles: &[Article]) -> Result<SaveCounts> {
        let mut tx = self.pool.begin().await.map_err(db_err("Failed to begin transaction"))?;
        let mut counts = SaveCounts::default();

        for article in articles {
            let existing = sqlx::query(
                "SELECT 1 FROM articles WHERE database_name = ? AND collection_name = ? AND url = ?",
            )
            .bind(&collection.database)
            .bind(&collection.collection)
            .bind(&article.url)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err("Failed to check article"))?;

            let analysis = article.analysis.as_ref().map(serde_json::to_string).transpose()?;

            sqlx::query(
                r#"
                INSERT INTO articles
                (database_name, collection_name, url, title, source_page_url, content, source,
                 fetched_at, published_date, analyzed, analysis)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT (database_name, collection_name, url) DO UPDATE SET
                    title = excluded.title,
                    source_page_url = excluded.source_page_url,
                    content = excluded.content,
                    source = excluded.source,
                    fetched_at = excluded.fetched_at,
                    published_date = excluded.published_date,
                    analyzed = excluded.analyzed,
                    analysis = excluded.analysis
                "#,
            )
            .bind(&collection.database)
            .bind(&collection.collection)
            .bind(&article.url)
            .bind(&article.title)
            .bind(article.source_page_url.as_deref())
            .bind(&article.content)
            .bind(&article.source)
            .bind(format_ts(&article.fetched_at))
            .bind(article.published_date.as_ref().map(format_ts))
            .bind(article.analyzed)
            .bind(analysis)
            .execute(&mut *tx)
            .await
            .map_err(db_err("Failed to store article"))?;

            if existing.is_some() {
                counts.updated += 1;
            } else {
                counts.inserted += 1;
            }
        }

        tx.commit().await.map_err(db_err("Failed to commit articles"))?;
        Ok(counts)
    }

    async fn get_article(&self, collection: &CollectionRef, url: &str) -> Result<Option<Article>> {
        let row = sqlx::query(
            "SELECT * FROM articles WHERE database_name = ? AND collection_name = ? AND url = ?",
        )
        .bind(&collection.database)
        .bind(&collection.collection)
        .bind(url)
        .fetch_optional(&*self.pool)
        .await
        .map_err(db_err("Failed to get article"))?;

        row.as_ref().map(row_to_article).transpose()
    }

    async fn find_unanalyzed(
        &self,
        collection: &CollectionRef,
        fetched_since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Article>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM articles
            WHERE database_name = ? AND collection_name = ?
              AND analyzed = 0 AND fetched_at >= ?
            ORDER BY rowid
            LIMIT ?
            "#,
        )
        .bind(&collection.database)
        .bind(&collection.collection)
        .bind(format_ts(&fetched_since))
        .bind(limit as i64)
        .fetch_all(&*self.pool)
        .await
        .map_err(db_err("Failed to query unanalyzed articles"))?;

        rows.iter().map(row_to_article).collect()
    }

    async fn save_analysis(
        &self,
        collection: &CollectionRef,
        result: &AnalysisResult,
        mark_analyzed: bool,
    ) -> Result<bool> {
        let analysis = serde_json::to_string(result)?;
        let done = sqlx::query(
            r#"
            UPDATE articles SET analysis = ?, analyzed = ?
            WHERE database_name = ? AND collection_name = ? AND url = ?
            "#,
        )
        .bind(analysis)
        .bind(mark_analyzed)
        .bind(&collection.database)
        .bind(&collection.collection)
        .bind(&result.article_url)
        .execute(&*self.pool)
        .await
        .map_err(db_err("Failed to save analysis"))?;

        Ok(done.rows_affected() > 0)
    }

    async fn count_older_than(&self, collection: &CollectionRef, cutoff: DateTime<Utc>) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM articles WHERE database_name = ? AND collection_name = ? AND fetched_at < ?",
        )
        .bind(&collection.database)
        .bind(&collection.collection)
        .bind(format_ts(&cutoff))
        .fetch_one(&*self.pool)
        .await
        .map_err(db_err("Failed to count old articles"))?;
        Ok(count as u64)
    }

    async fn delete_older_than(&self, collection: &CollectionRef, cutoff: DateTime<Utc>) -> Result<u64> {
        let done = sqlx::query(
            "DELETE FROM articles WHERE database_name = ? AND collection_name = ? AND fetched_at < ?",
        )
        .bind(&collection.database)
        .bind(&collection.collection)
        .bind(format_ts(&cutoff))
        .execute(&*self.pool)
        .await
        .map_err(db_err("Failed to delete old articles"))?;
        Ok(done.rows_affected())
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}
