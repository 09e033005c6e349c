use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{migrate::MigrateError, sqlite::SqlitePoolOptions, Row, SqlitePool};
use thiserror::Error;
use uuid::Uuid;

use contentgen_core::{
    Faq, GenerationResult, Locale, Subject, SubjectFields, SubjectKind,
};

/// Top-level database handle that owns the SQLite connection pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Establishes a new SQLite connection pool for the provided connection string.
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(StorageError::Connect)?;

        apply_pragmas(&pool).await?;

        Ok(Self { pool })
    }

    /// Opens a private in-memory database backed by a single long-lived connection.
    pub async fn in_memory() -> Result<Self, StorageError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(StorageError::Connect)?;

        apply_pragmas(&pool).await?;

        Ok(Self { pool })
    }

    /// Applies migrations located under `migrations/`.
    pub async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(StorageError::Migration)?;
        Ok(())
    }

    /// Returns a handle to page through subjects and flip their progress flag.
    pub fn subjects(&self) -> SubjectRepository {
        SubjectRepository {
            pool: self.pool.clone(),
        }
    }

    /// Returns a handle for the generated content records.
    pub fn content(&self) -> ContentRepository {
        ContentRepository {
            pool: self.pool.clone(),
        }
    }

    /// Returns a handle for per-locale run checkpoints.
    pub fn checkpoints(&self) -> CheckpointRepository {
        CheckpointRepository {
            pool: self.pool.clone(),
        }
    }

    /// Returns a handle for affiliate merchant rows.
    pub fn merchants(&self) -> MerchantRepository {
        MerchantRepository {
            pool: self.pool.clone(),
        }
    }

    /// Exposes the inner pool when lower level access is required.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

async fn apply_pragmas(pool: &SqlitePool) -> Result<(), StorageError> {
    sqlx::query("PRAGMA foreign_keys = ON;")
        .execute(pool)
        .await
        .map_err(StorageError::Pragma)?;

    sqlx::query("PRAGMA journal_mode = WAL;")
        .fetch_one(pool)
        .await
        .map_err(StorageError::Pragma)?;

    sqlx::query("PRAGMA synchronous = NORMAL;")
        .execute(pool)
        .await
        .map_err(StorageError::Pragma)?;

    sqlx::query("PRAGMA busy_timeout = 5000;")
        .execute(pool)
        .await
        .map_err(StorageError::Pragma)?;

    Ok(())
}

/// General storage level errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to connect to sqlite: {0}")]
    Connect(sqlx::Error),
    #[error("failed to apply pragma: {0}")]
    Pragma(sqlx::Error),
    #[error("failed to run database migrations: {0}")]
    Migration(MigrateError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Repository over the subject tables (`postal_codes`, `bank_codes`).
#[derive(Clone)]
pub struct SubjectRepository {
    pool: SqlitePool,
}

/// Parameters of one keyset page over eligible subjects.
#[derive(Debug, Clone)]
pub struct SubjectPageQuery<'a> {
    pub kind: SubjectKind,
    pub locale: &'a Locale,
    /// Only subjects with an id strictly greater than this are returned.
    pub after_id: Option<i64>,
    pub limit: u32,
    /// Return subjects even when they already have content for the locale.
    pub include_completed: bool,
}

const POSTAL_CODE_PAGE: &str = r#"
SELECT s.id, s.code, s.area, s.state
  FROM postal_codes AS s
 WHERE s.status = 1
   AND s.is_deleted = 0
   AND s.id > ?
   AND (? = 1 OR NOT EXISTS (
        SELECT 1 FROM content_records AS c
         WHERE c.reference_type = 'PostalCode'
           AND c.reference_id = s.id
           AND c.country_code = ?
           AND c.language = ?))
 ORDER BY s.id
 LIMIT ?
"#;

const BANK_CODE_PAGE: &str = r#"
SELECT s.id, s.bank, s.swift_code, s.city, s.branch
  FROM bank_codes AS s
 WHERE s.status = 1
   AND s.is_deleted = 0
   AND s.id > ?
   AND (? = 1 OR (s.content_generated = 0 AND NOT EXISTS (
        SELECT 1 FROM content_records AS c
         WHERE c.reference_type = 'BankCode'
           AND c.reference_id = s.id
           AND c.country_code = ?
           AND c.language = ?)))
 ORDER BY s.id
 LIMIT ?
"#;

impl SubjectRepository {
    /// Fetches the next page of eligible subjects for one locale, ordered by id.
    pub async fn fetch_page(&self, query: &SubjectPageQuery<'_>) -> Result<Vec<Subject>, SubjectError> {
        let sql = match query.kind {
            SubjectKind::PostalCode => POSTAL_CODE_PAGE,
            SubjectKind::BankCode => BANK_CODE_PAGE,
        };

        let rows = sqlx::query(sql)
            .bind(query.after_id.unwrap_or(0))
            .bind(i64::from(query.include_completed))
            .bind(&query.locale.country_code)
            .bind(&query.locale.language)
            .bind(i64::from(query.limit))
            .fetch_all(&self.pool)
            .await?;

        let subjects = rows
            .into_iter()
            .map(|row| {
                let fields = match query.kind {
                    SubjectKind::PostalCode => SubjectFields::PostalCode {
                        code: row.try_get("code")?,
                        area: row.try_get("area")?,
                        state: row.try_get("state")?,
                    },
                    SubjectKind::BankCode => SubjectFields::BankCode {
                        bank: row.try_get("bank")?,
                        swift_code: row.try_get("swift_code")?,
                        city: row.try_get("city")?,
                        branch: row.try_get("branch")?,
                    },
                };
                Ok(Subject {
                    id: row.try_get("id")?,
                    fields,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()?;

        Ok(subjects)
    }

    /// Sets the global progress flag. Returns `false` for kinds without one or unknown ids.
    pub async fn mark_processed(
        &self,
        kind: SubjectKind,
        id: i64,
        at: DateTime<Utc>,
    ) -> Result<bool, SubjectError> {
        if !kind.tracks_progress() {
            return Ok(false);
        }

        let result = sqlx::query(
            "UPDATE bank_codes SET content_generated = 1, updated_at = ? \
             WHERE id = ? AND content_generated = 0",
        )
        .bind(to_rfc3339(at))
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Reads the global progress flag; `None` when the kind has none or the id is unknown.
    pub async fn is_processed(&self, kind: SubjectKind, id: i64) -> Result<Option<bool>, SubjectError> {
        if !kind.tracks_progress() {
            return Ok(None);
        }

        let row = sqlx::query("SELECT content_generated FROM bank_codes WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| row.get::<i64, _>("content_generated") != 0))
    }
}

/// Errors raised by the subject repository.
#[derive(Debug, Error)]
pub enum SubjectError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Repository for the `content_records` result store.
#[derive(Clone)]
pub struct ContentRepository {
    pool: SqlitePool,
}

/// Payload required to upsert a content record.
pub struct NewContentRecord<'a> {
    pub kind: SubjectKind,
    pub reference_id: i64,
    pub locale: &'a Locale,
    pub result: &'a GenerationResult,
    pub source: &'a str,
    pub model: Option<&'a str>,
    pub written_at: DateTime<Utc>,
}

impl ContentRepository {
    /// Inserts or overwrites the record keyed by (reference type, id, country, language).
    pub async fn upsert(&self, record: &NewContentRecord<'_>) -> Result<(), ContentError> {
        let highlights_json = serde_json::to_string(&record.result.highlights)?;
        let faqs_json = serde_json::to_string(&record.result.faqs)?;
        let written_at = to_rfc3339(record.written_at);

        sqlx::query(
            "INSERT INTO content_records \
             (id, reference_type, reference_id, country_code, country_name, language, overview, description, \
              highlights_json, faqs_json, source, model, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(reference_type, reference_id, country_code, language) DO UPDATE \
             SET country_name = excluded.country_name, \
                 overview = excluded.overview, \
                 description = excluded.description, \
                 highlights_json = excluded.highlights_json, \
                 faqs_json = excluded.faqs_json, \
                 source = excluded.source, \
                 model = excluded.model, \
                 updated_at = excluded.updated_at",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(record.kind.reference_type())
        .bind(record.reference_id)
        .bind(&record.locale.country_code)
        .bind(&record.locale.country_name)
        .bind(&record.locale.language)
        .bind(&record.result.overview)
        .bind(&record.result.description)
        .bind(highlights_json)
        .bind(faqs_json)
        .bind(record.source)
        .bind(record.model)
        .bind(&written_at)
        .bind(&written_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Loads the record for one subject and locale.
    pub async fn fetch(
        &self,
        kind: SubjectKind,
        reference_id: i64,
        country_code: &str,
        language: &str,
    ) -> Result<Option<ContentRecord>, ContentError> {
        let row = sqlx::query_as::<_, ContentRecordRow>(
            "SELECT id, reference_type, reference_id, country_code, country_name, language, overview, \
                    description, highlights_json, faqs_json, source, model, created_at, updated_at \
               FROM content_records \
              WHERE reference_type = ? AND reference_id = ? AND country_code = ? AND language = ?",
        )
        .bind(kind.reference_type())
        .bind(reference_id)
        .bind(country_code)
        .bind(language)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ContentRecordRow::into_domain).transpose()
    }

    /// Lists the (country, language) pairs that already have content for a subject.
    pub async fn locales_for(
        &self,
        kind: SubjectKind,
        reference_id: i64,
    ) -> Result<Vec<(String, String)>, ContentError> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT country_code, language FROM content_records \
              WHERE reference_type = ? AND reference_id = ? \
              ORDER BY country_code, language",
        )
        .bind(kind.reference_type())
        .bind(reference_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Counts every record stored for a subject kind.
    pub async fn count(&self, kind: SubjectKind) -> Result<u64, ContentError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM content_records WHERE reference_type = ?")
                .bind(kind.reference_type())
                .fetch_one(&self.pool)
                .await?;
        Ok(count as u64)
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ContentRecordRow {
    id: String,
    reference_type: String,
    reference_id: i64,
    country_code: String,
    country_name: String,
    language: String,
    overview: Option<String>,
    description: String,
    highlights_json: String,
    faqs_json: String,
    source: String,
    model: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ContentRecordRow {
    fn into_domain(self) -> Result<ContentRecord, ContentError> {
        let highlights: Vec<String> = serde_json::from_str(&self.highlights_json)?;
        let faqs: Vec<Faq> = serde_json::from_str(&self.faqs_json)?;
        Ok(ContentRecord {
            id: self.id,
            reference_type: self.reference_type,
            reference_id: self.reference_id,
            country_code: self.country_code,
            country_name: self.country_name,
            language: self.language,
            result: GenerationResult {
                description: self.description,
                overview: self.overview,
                highlights,
                faqs,
            },
            source: self.source,
            model: self.model,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// A persisted content record with its provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentRecord {
    pub id: String,
    pub reference_type: String,
    pub reference_id: i64,
    pub country_code: String,
    pub country_name: String,
    pub language: String,
    pub result: GenerationResult,
    pub source: String,
    pub model: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Errors that can occur while reading or writing content records.
#[derive(Debug, Error)]
pub enum ContentError {
    #[error("failed to encode or decode content json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Repository storing per-locale progress of generation runs.
#[derive(Clone)]
pub struct CheckpointRepository {
    pool: SqlitePool,
}

/// Lifecycle of a locale work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointStatus {
    Running,
    Complete,
    Error,
}

impl CheckpointStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Complete => "complete",
            Self::Error => "error",
        }
    }

    fn parse(value: &str) -> Self {
        match value {
            "complete" => Self::Complete,
            "error" => Self::Error,
            _ => Self::Running,
        }
    }
}

/// Progress of one (kind, country, language) work item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationCheckpoint {
    pub kind: SubjectKind,
    pub country_code: String,
    pub language: String,
    pub status: CheckpointStatus,
    pub cursor: Option<i64>,
    pub processed: u64,
    pub failed: u64,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GenerationCheckpoint {
    /// Returns `true` when a previous run drained the item without failures.
    pub fn is_settled(&self) -> bool {
        self.status == CheckpointStatus::Complete && self.failed == 0
    }
}

impl CheckpointRepository {
    pub async fn upsert(&self, checkpoint: &GenerationCheckpoint) -> Result<(), CheckpointError> {
        sqlx::query(
            "INSERT INTO generation_checkpoints \
             (reference_type, country_code, language, status, cursor, processed, failed, started_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(reference_type, country_code, language) DO UPDATE \
             SET status = excluded.status, \
                 cursor = excluded.cursor, \
                 processed = excluded.processed, \
                 failed = excluded.failed, \
                 started_at = excluded.started_at, \
                 updated_at = excluded.updated_at",
        )
        .bind(checkpoint.kind.reference_type())
        .bind(&checkpoint.country_code)
        .bind(&checkpoint.language)
        .bind(checkpoint.status.as_str())
        .bind(checkpoint.cursor)
        .bind(checkpoint.processed as i64)
        .bind(checkpoint.failed as i64)
        .bind(to_rfc3339(checkpoint.started_at))
        .bind(to_rfc3339(checkpoint.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn fetch(
        &self,
        kind: SubjectKind,
        country_code: &str,
        language: &str,
    ) -> Result<Option<GenerationCheckpoint>, CheckpointError> {
        let row = sqlx::query(
            "SELECT status, cursor, processed, failed, started_at, updated_at \
               FROM generation_checkpoints \
              WHERE reference_type = ? AND country_code = ? AND language = ?",
        )
        .bind(kind.reference_type())
        .bind(country_code)
        .bind(language)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let status: String = row.try_get("status")?;
        let processed: i64 = row.try_get("processed")?;
        let failed: i64 = row.try_get("failed")?;
        Ok(Some(GenerationCheckpoint {
            kind,
            country_code: country_code.to_string(),
            language: language.to_string(),
            status: CheckpointStatus::parse(&status),
            cursor: row.try_get("cursor")?,
            processed: processed.max(0) as u64,
            failed: failed.max(0) as u64,
            started_at: row.try_get("started_at")?,
            updated_at: row.try_get("updated_at")?,
        }))
    }
}

/// Errors raised while persisting checkpoints.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Repository over affiliate merchants synced from the partner network.
#[derive(Clone)]
pub struct MerchantRepository {
    pool: SqlitePool,
}

/// One entry of the advertiser listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerchantListing {
    pub advertiser_id: i64,
    pub name: String,
}

/// A merchant whose details still need to be fetched.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct PendingMerchant {
    pub id: i64,
    pub advertiser_id: i64,
    pub name: String,
}

/// Details fetched for a single merchant.
pub struct MerchantDetails<'a> {
    pub name: Option<&'a str>,
    pub url: Option<&'a str>,
    pub description: Option<&'a str>,
    pub details_json: &'a str,
}

impl MerchantRepository {
    /// Upserts the listing in one transaction and flags every row for a detail refresh.
    pub async fn upsert_listing(
        &self,
        listing: &[MerchantListing],
        at: DateTime<Utc>,
    ) -> Result<u64, MerchantError> {
        let at = to_rfc3339(at);
        let mut tx = self.pool.begin().await?;
        let mut written = 0;
        for merchant in listing {
            let result = sqlx::query(
                "INSERT INTO merchants (advertiser_id, name, details_fetched, created_at, updated_at) \
                 VALUES (?, ?, 0, ?, ?) \
                 ON CONFLICT(advertiser_id) DO UPDATE \
                 SET name = excluded.name, details_fetched = 0, updated_at = excluded.updated_at",
            )
            .bind(merchant.advertiser_id)
            .bind(&merchant.name)
            .bind(&at)
            .bind(&at)
            .execute(&mut *tx)
            .await?;
            written += result.rows_affected();
        }
        tx.commit().await?;
        Ok(written)
    }

    /// Returns the first merchant after `after_id` that still lacks details.
    pub async fn next_pending(&self, after_id: i64) -> Result<Option<PendingMerchant>, MerchantError> {
        let row = sqlx::query_as::<_, PendingMerchant>(
            "SELECT id, advertiser_id, name FROM merchants \
              WHERE details_fetched = 0 AND id > ? \
              ORDER BY id LIMIT 1",
        )
        .bind(after_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Stores fetched details and sets `details_fetched`.
    pub async fn store_details(
        &self,
        id: i64,
        details: &MerchantDetails<'_>,
        at: DateTime<Utc>,
    ) -> Result<bool, MerchantError> {
        let result = sqlx::query(
            "UPDATE merchants \
                SET name = COALESCE(?, name), \
                    url = ?, \
                    description = ?, \
                    details_json = ?, \
                    details_fetched = 1, \
                    updated_at = ? \
              WHERE id = ?",
        )
        .bind(details.name)
        .bind(details.url)
        .bind(details.description)
        .bind(details.details_json)
        .bind(to_rfc3339(at))
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn count_pending(&self) -> Result<u64, MerchantError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM merchants WHERE details_fetched = 0")
                .fetch_one(&self.pool)
                .await?;
        Ok(count as u64)
    }
}

/// Errors raised by the merchant repository.
#[derive(Debug, Error)]
pub enum MerchantError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

fn to_rfc3339(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup_db() -> Database {
        let db = Database::in_memory().await.expect("connect");
        db.run_migrations().await.expect("migrations");
        db
    }

    async fn insert_bank(db: &Database, id: i64, swift: &str) {
        sqlx::query(
            "INSERT INTO bank_codes (id, bank, city, branch, swift_code, created_at, updated_at) \
             VALUES (?, 'Example Bank', 'Karachi', NULL, ?, '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z')",
        )
        .bind(id)
        .bind(swift)
        .execute(db.pool())
        .await
        .expect("insert bank code");
    }

    async fn insert_postal(db: &Database, id: i64, code: &str, status: i64, deleted: i64) {
        sqlx::query(
            "INSERT INTO postal_codes (id, code, area, state, status, is_deleted, created_at, updated_at) \
             VALUES (?, ?, 'Karachi', 'Sindh', ?, ?, '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z')",
        )
        .bind(id)
        .bind(code)
        .bind(status)
        .bind(deleted)
        .execute(db.pool())
        .await
        .expect("insert postal code");
    }

    fn locale(country: &str, language: &str) -> Locale {
        Locale {
            country_code: country.into(),
            country_name: country.to_uppercase(),
            language: language.into(),
        }
    }

    fn result(description: &str) -> GenerationResult {
        GenerationResult {
            description: description.into(),
            overview: None,
            highlights: vec!["Fast transfers".into()],
            faqs: vec![
                Faq {
                    question: "Q1?".into(),
                    answer: "A1.".into(),
                },
                Faq {
                    question: "Q2?".into(),
                    answer: "A2.".into(),
                },
                Faq {
                    question: "Q3?".into(),
                    answer: "A3.".into(),
                },
            ],
        }
    }

    fn record<'a>(locale: &'a Locale, result: &'a GenerationResult) -> NewContentRecord<'a> {
        NewContentRecord {
            kind: SubjectKind::BankCode,
            reference_id: 1,
            locale,
            result,
            source: "generated",
            model: Some("llama3.2"),
            written_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn migrations_apply() {
        let db = setup_db().await;
        let tables: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN \
             ('postal_codes', 'bank_codes', 'content_records', 'generation_checkpoints', 'merchants')",
        )
        .fetch_one(db.pool())
        .await
        .expect("fetch tables");
        assert_eq!(tables.0, 5);
    }

    #[tokio::test]
    async fn identical_upserts_leave_a_single_record() {
        let db = setup_db().await;
        let repo = db.content();
        let pk = locale("pk", "ur");
        let payload = result("Body");

        repo.upsert(&record(&pk, &payload)).await.expect("first upsert");
        repo.upsert(&record(&pk, &payload)).await.expect("second upsert");

        assert_eq!(repo.count(SubjectKind::BankCode).await.unwrap(), 1);
        let stored = repo
            .fetch(SubjectKind::BankCode, 1, "pk", "ur")
            .await
            .unwrap()
            .expect("record exists");
        assert_eq!(stored.result, payload);
        assert_eq!(stored.source, "generated");
        assert_eq!(stored.country_name, "PK");
    }

    #[tokio::test]
    async fn later_upsert_overwrites_payload() {
        let db = setup_db().await;
        let repo = db.content();
        let pk = locale("pk", "ur");
        let first = result("First");
        let second = result("Second");

        repo.upsert(&record(&pk, &first)).await.unwrap();
        let original = repo.fetch(SubjectKind::BankCode, 1, "pk", "ur").await.unwrap().unwrap();
        repo.upsert(&record(&pk, &second)).await.unwrap();

        let stored = repo.fetch(SubjectKind::BankCode, 1, "pk", "ur").await.unwrap().unwrap();
        assert_eq!(repo.count(SubjectKind::BankCode).await.unwrap(), 1);
        assert_eq!(stored.result.description, "Second");
        assert_eq!(stored.id, original.id);
    }

    #[tokio::test]
    async fn pages_follow_keyset_cursor_and_eligibility() {
        let db = setup_db().await;
        insert_postal(&db, 1, "10001", 1, 0).await;
        insert_postal(&db, 2, "10002", 0, 0).await;
        insert_postal(&db, 3, "10003", 1, 1).await;
        insert_postal(&db, 4, "10004", 1, 0).await;
        insert_postal(&db, 5, "10005", 1, 0).await;

        let pk = locale("pk", "ur");
        let repo = db.subjects();
        let mut query = SubjectPageQuery {
            kind: SubjectKind::PostalCode,
            locale: &pk,
            after_id: None,
            limit: 2,
            include_completed: false,
        };

        let first: Vec<i64> = repo.fetch_page(&query).await.unwrap().iter().map(|s| s.id).collect();
        assert_eq!(first, vec![1, 4]);

        query.after_id = Some(4);
        let second = repo.fetch_page(&query).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].label(), "10005");

        query.after_id = Some(5);
        assert!(repo.fetch_page(&query).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn subjects_with_content_for_the_locale_fall_out_of_pages() {
        let db = setup_db().await;
        insert_bank(&db, 1, "HABBPKKA").await;
        insert_bank(&db, 2, "MUCBPKKA").await;

        let pk = locale("pk", "ur");
        let payload = result("Body");
        db.content().upsert(&record(&pk, &payload)).await.unwrap();

        let query = SubjectPageQuery {
            kind: SubjectKind::BankCode,
            locale: &pk,
            after_id: None,
            limit: 10,
            include_completed: false,
        };
        let ids: Vec<i64> = db.subjects().fetch_page(&query).await.unwrap().iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![2]);

        let other = locale("us", "en");
        let query = SubjectPageQuery {
            locale: &other,
            ..query
        };
        assert_eq!(db.subjects().fetch_page(&query).await.unwrap().len(), 2);

        let forced = SubjectPageQuery {
            locale: &pk,
            include_completed: true,
            ..query
        };
        assert_eq!(db.subjects().fetch_page(&forced).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn processed_subjects_are_never_returned_again() {
        let db = setup_db().await;
        insert_bank(&db, 1, "HABBPKKA").await;
        insert_bank(&db, 2, "MUCBPKKA").await;

        let us = locale("us", "en");
        let query = SubjectPageQuery {
            kind: SubjectKind::BankCode,
            locale: &us,
            after_id: None,
            limit: 10,
            include_completed: false,
        };
        let repo = db.subjects();

        assert!(repo.mark_processed(SubjectKind::BankCode, 1, Utc::now()).await.unwrap());
        assert!(!repo.mark_processed(SubjectKind::BankCode, 1, Utc::now()).await.unwrap());
        assert_eq!(repo.is_processed(SubjectKind::BankCode, 1).await.unwrap(), Some(true));

        let ids: Vec<i64> = repo.fetch_page(&query).await.unwrap().iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![2]);
    }

    #[tokio::test]
    async fn postal_codes_have_no_progress_flag() {
        let db = setup_db().await;
        insert_postal(&db, 1, "10001", 1, 0).await;
        let repo = db.subjects();
        assert!(!repo.mark_processed(SubjectKind::PostalCode, 1, Utc::now()).await.unwrap());
        assert_eq!(repo.is_processed(SubjectKind::PostalCode, 1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn lists_locales_with_content() {
        let db = setup_db().await;
        let payload = result("Body");
        let pk = locale("pk", "ur");
        let us = locale("us", "en");
        db.content().upsert(&record(&us, &payload)).await.unwrap();
        db.content().upsert(&record(&pk, &payload)).await.unwrap();

        let locales = db.content().locales_for(SubjectKind::BankCode, 1).await.unwrap();
        assert_eq!(
            locales,
            vec![("pk".to_string(), "ur".to_string()), ("us".to_string(), "en".to_string())]
        );
        assert!(db.content().locales_for(SubjectKind::PostalCode, 1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn checkpoints_round_trip_and_update_in_place() {
        let db = setup_db().await;
        let repo = db.checkpoints();
        let now = Utc::now();
        let mut checkpoint = GenerationCheckpoint {
            kind: SubjectKind::PostalCode,
            country_code: "pk".into(),
            language: "ur".into(),
            status: CheckpointStatus::Running,
            cursor: None,
            processed: 0,
            failed: 0,
            started_at: now,
            updated_at: now,
        };
        repo.upsert(&checkpoint).await.unwrap();

        checkpoint.status = CheckpointStatus::Complete;
        checkpoint.cursor = Some(42);
        checkpoint.processed = 10;
        repo.upsert(&checkpoint).await.unwrap();

        let stored = repo
            .fetch(SubjectKind::PostalCode, "pk", "ur")
            .await
            .unwrap()
            .expect("checkpoint exists");
        assert_eq!(stored.status, CheckpointStatus::Complete);
        assert_eq!(stored.cursor, Some(42));
        assert!(stored.is_settled());
        assert!(repo.fetch(SubjectKind::BankCode, "pk", "ur").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn merchant_listing_resets_details_flag() {
        let db = setup_db().await;
        let repo = db.merchants();
        let listing = vec![
            MerchantListing {
                advertiser_id: 100,
                name: "Shop A".into(),
            },
            MerchantListing {
                advertiser_id: 200,
                name: "Shop B".into(),
            },
        ];
        repo.upsert_listing(&listing, Utc::now()).await.unwrap();
        assert_eq!(repo.count_pending().await.unwrap(), 2);

        let first = repo.next_pending(0).await.unwrap().expect("pending merchant");
        assert_eq!(first.advertiser_id, 100);
        let details = MerchantDetails {
            name: None,
            url: Some("https://shop-a.example"),
            description: Some("Shop"),
            details_json: "{}",
        };
        assert!(repo.store_details(first.id, &details, Utc::now()).await.unwrap());
        assert_eq!(repo.count_pending().await.unwrap(), 1);

        let second = repo.next_pending(first.id).await.unwrap().expect("second merchant");
        assert_eq!(second.advertiser_id, 200);
        assert!(repo.next_pending(second.id).await.unwrap().is_none());

        repo.upsert_listing(&listing, Utc::now()).await.unwrap();
        assert_eq!(repo.count_pending().await.unwrap(), 2);
    }
}
