use crate::types::{
    Analysis, AnalysisFilter, AnalysisStatus, Article, CandidateArticle, PipelineError, Result,
};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::path::Path;
use tracing::{debug, info};

/// Durable record of every known article, its analysis state, and the dated
/// reports. Owns identity arbitration: coordinators hand results back here
/// and never write anywhere else.
pub struct ArticleStore {
    pool: SqlitePool,
}

impl ArticleStore {
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.init_schema().await?;
        info!("opened article store at {}", path.display());
        Ok(store)
    }

    /// Private in-memory database, used by tests.
    pub async fn open_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(":memory:")
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS articles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                natural_key TEXT NOT NULL UNIQUE,
                journal TEXT NOT NULL,
                title TEXT NOT NULL,
                abstract TEXT NOT NULL,
                doi TEXT,
                url TEXT NOT NULL,
                published TEXT NOT NULL,
                fetched_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS analyses (
                article_id INTEGER PRIMARY KEY REFERENCES articles(id) ON DELETE CASCADE,
                status TEXT NOT NULL,
                score REAL,
                rationale TEXT NOT NULL,
                summary TEXT,
                model TEXT NOT NULL,
                analyzed_at TEXT NOT NULL,
                raw_response TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS reports (
                date TEXT PRIMARY KEY,
                generated_at TEXT NOT NULL,
                body TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_articles_published ON articles (published)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Insert a candidate unless its natural key is already known. Safe to
    /// call repeatedly with identical input; returns the id and whether a row
    /// was created.
    pub async fn upsert_candidate(&self, candidate: &CandidateArticle) -> Result<(i64, bool)> {
        let key = candidate.natural_key();
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query("SELECT id FROM articles WHERE natural_key = ?")
            .bind(&key)
            .fetch_optional(&mut *tx)
            .await?;
        if let Some(row) = existing {
            let id: i64 = row.try_get("id")?;
            tx.commit().await?;
            debug!("candidate already known: {} (id {})", key, id);
            return Ok((id, false));
        }

        let result = sqlx::query(
            r#"
            INSERT INTO articles (natural_key, journal, title, abstract, doi, url, published, fetched_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&key)
        .bind(&candidate.journal)
        .bind(&candidate.title)
        .bind(&candidate.abstract_text)
        .bind(&candidate.doi)
        .bind(&candidate.url)
        .bind(candidate.published)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;
        let id = result.last_insert_rowid();
        tx.commit().await?;

        debug!("stored new article {} ({})", id, key);
        Ok((id, true))
    }

    /// Articles eligible for (re-)analysis, ordered by publication date then
    /// id so batches are deterministic.
    pub async fn list_pending_analysis(&self, filter: &AnalysisFilter) -> Result<Vec<Article>> {
        let rows = match filter {
            AnalysisFilter::Pending => {
                sqlx::query(
                    r#"
                    SELECT a.* FROM articles a
                    LEFT JOIN analyses n ON n.article_id = a.id
                    WHERE n.article_id IS NULL OR n.status = 'failed'
                    ORDER BY a.published ASC, a.id ASC
                    "#,
                )
                .fetch_all(&self.pool)
                .await?
            }
            AnalysisFilter::Reanalyze { date: Some(date) } => {
                sqlx::query(
                    "SELECT * FROM articles WHERE published = ? ORDER BY published ASC, id ASC",
                )
                .bind(*date)
                .fetch_all(&self.pool)
                .await?
            }
            AnalysisFilter::Reanalyze { date: None } => {
                sqlx::query("SELECT * FROM articles ORDER BY published ASC, id ASC")
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        rows.iter().map(article_from_row).collect()
    }

    /// Replace the article's current analysis in one atomic step. The old
    /// result stays visible until the transaction commits.
    pub async fn commit_analysis(&self, article_id: i64, analysis: &Analysis) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let exists = sqlx::query("SELECT id FROM articles WHERE id = ?")
            .bind(article_id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(PipelineError::Conflict { id: article_id });
        }

        sqlx::query(
            r#"
            INSERT INTO analyses (article_id, status, score, rationale, summary, model, analyzed_at, raw_response)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (article_id) DO UPDATE SET
                status = excluded.status,
                score = excluded.score,
                rationale = excluded.rationale,
                summary = excluded.summary,
                model = excluded.model,
                analyzed_at = excluded.analyzed_at,
                raw_response = excluded.raw_response
            "#,
        )
        .bind(article_id)
        .bind(analysis.status.as_str())
        .bind(analysis.score)
        .bind(&analysis.rationale)
        .bind(&analysis.summary)
        .bind(&analysis.model)
        .bind(analysis.analyzed_at)
        .bind(&analysis.raw_response)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn get_analysis(&self, article_id: i64) -> Result<Option<Analysis>> {
        let row = sqlx::query("SELECT * FROM analyses WHERE article_id = ?")
            .bind(article_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(analysis_from_row).transpose()
    }

    pub async fn get_article(&self, article_id: i64) -> Result<Option<Article>> {
        let row = sqlx::query("SELECT * FROM articles WHERE id = ?")
            .bind(article_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(article_from_row).transpose()
    }

    /// Succeeded analyses published on `date` with score at or above the
    /// threshold; ordered score descending, tie-broken by publication date
    /// then id, so aggregation is deterministic.
    pub async fn query_for_report(
        &self,
        date: NaiveDate,
        min_relevance: f64,
    ) -> Result<Vec<(Article, Analysis)>> {
        let rows = sqlx::query(
            r#"
            SELECT a.*,
                   n.status, n.score, n.rationale, n.summary,
                   n.model, n.analyzed_at, n.raw_response
            FROM articles a
            JOIN analyses n ON n.article_id = a.id
            WHERE n.status = 'succeeded' AND n.score >= ? AND a.published = ?
            ORDER BY n.score DESC, a.published ASC, a.id ASC
            "#,
        )
        .bind(min_relevance)
        .bind(date)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| Ok((article_from_row(row)?, analysis_from_row(row)?)))
            .collect()
    }

    /// Recent articles with their current analysis (if any), newest and most
    /// relevant first. Backs the `list` command.
    pub async fn list_recent(
        &self,
        days: u32,
        min_relevance: f64,
        today: NaiveDate,
    ) -> Result<Vec<(Article, Option<Analysis>)>> {
        let cutoff = today - Duration::days(i64::from(days));
        let rows = sqlx::query(
            r#"
            SELECT a.*,
                   n.status, n.score, n.rationale, n.summary,
                   n.model, n.analyzed_at, n.raw_response
            FROM articles a
            LEFT JOIN analyses n ON n.article_id = a.id
            WHERE a.published >= ?
              AND (n.score IS NULL OR n.score >= ?)
            ORDER BY
                CASE WHEN n.score IS NULL THEN 1 ELSE 0 END,
                n.score DESC,
                a.published DESC,
                a.id ASC
            "#,
        )
        .bind(cutoff)
        .bind(min_relevance)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let article = article_from_row(row)?;
                let status: Option<String> = row.try_get("status")?;
                let analysis = match status {
                    Some(_) => Some(analysis_from_row(row)?),
                    None => None,
                };
                Ok((article, analysis))
            })
            .collect()
    }

    /// Persist the rendered report for a date, replacing any prior one in
    /// full.
    pub async fn save_report(
        &self,
        date: NaiveDate,
        generated_at: DateTime<Utc>,
        body: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO reports (date, generated_at, body)
            VALUES (?, ?, ?)
            ON CONFLICT (date) DO UPDATE SET
                generated_at = excluded.generated_at,
                body = excluded.body
            "#,
        )
        .bind(date)
        .bind(generated_at)
        .bind(body)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_report(&self, date: NaiveDate) -> Result<Option<(DateTime<Utc>, String)>> {
        let row = sqlx::query("SELECT generated_at, body FROM reports WHERE date = ?")
            .bind(date)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(Some((row.try_get("generated_at")?, row.try_get("body")?))),
            None => Ok(None),
        }
    }

    pub async fn article_count(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM articles")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("n")?)
    }
}

fn article_from_row(row: &SqliteRow) -> Result<Article> {
    Ok(Article {
        id: row.try_get("id")?,
        natural_key: row.try_get("natural_key")?,
        journal: row.try_get("journal")?,
        title: row.try_get("title")?,
        abstract_text: row.try_get("abstract")?,
        doi: row.try_get("doi")?,
        url: row.try_get("url")?,
        published: row.try_get("published")?,
        fetched_at: row.try_get("fetched_at")?,
    })
}

fn analysis_from_row(row: &SqliteRow) -> Result<Analysis> {
    let status: String = row.try_get("status")?;
    let status = AnalysisStatus::parse(&status)
        .ok_or_else(|| PipelineError::Corrupt(format!("unknown analysis status '{status}'")))?;
    Ok(Analysis {
        status,
        score: row.try_get("score")?,
        rationale: row.try_get("rationale")?,
        summary: row.try_get("summary")?,
        model: row.try_get("model")?,
        analyzed_at: row.try_get("analyzed_at")?,
        raw_response: row.try_get("raw_response")?,
    })
}
