use tracing::info;

use crate::error::StoreError;
use crate::store::Store;

pub const SCHEMA_VERSION: i64 = 1;

const TABLES: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS job_matches (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        job_url TEXT NOT NULL CHECK (length(job_url) > 0),
        search_term TEXT NOT NULL CHECK (length(trim(search_term)) > 0),
        cv_key TEXT NOT NULL CHECK (length(trim(cv_key)) > 0),
        job_title TEXT,
        company_name TEXT,
        location TEXT,
        posting_date TEXT,
        salary_range TEXT,
        overall_match INTEGER NOT NULL CHECK (overall_match BETWEEN 0 AND 100),
        skills_match INTEGER NOT NULL DEFAULT 0 CHECK (skills_match BETWEEN 0 AND 100),
        experience_match INTEGER NOT NULL DEFAULT 0 CHECK (experience_match BETWEEN 0 AND 100),
        education_fit INTEGER NOT NULL DEFAULT 0 CHECK (education_fit BETWEEN 0 AND 100),
        career_trajectory_alignment INTEGER NOT NULL DEFAULT 0 CHECK (career_trajectory_alignment BETWEEN 0 AND 100),
        preference_match INTEGER NOT NULL DEFAULT 0 CHECK (preference_match BETWEEN 0 AND 100),
        potential_satisfaction INTEGER NOT NULL DEFAULT 0 CHECK (potential_satisfaction BETWEEN 0 AND 100),
        location_compatibility TEXT,
        reasoning TEXT,
        scraped_data TEXT NOT NULL,
        scraped_at TEXT NOT NULL,
        matched_at TEXT NOT NULL,
        UNIQUE (job_url, search_term, cv_key)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS cv_versions (
        cv_key TEXT PRIMARY KEY,
        file_name TEXT NOT NULL,
        file_path TEXT NOT NULL,
        file_hash TEXT NOT NULL,
        upload_date TEXT NOT NULL,
        summary TEXT,
        metadata TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS applications (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        job_match_id INTEGER NOT NULL UNIQUE REFERENCES job_matches(id) ON DELETE CASCADE,
        status TEXT NOT NULL DEFAULT 'MATCHED' CHECK (status IN (
            'MATCHED', 'INTERESTED', 'PREPARING', 'APPLIED',
            'INTERVIEW', 'OFFER', 'REJECTED', 'ARCHIVED'
        )),
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        notes TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS scrape_history (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        search_term TEXT NOT NULL,
        page_number INTEGER NOT NULL CHECK (page_number >= 0),
        jobs_found INTEGER NOT NULL CHECK (jobs_found >= 0),
        new_jobs INTEGER NOT NULL CHECK (new_jobs >= 0),
        duplicate_jobs INTEGER NOT NULL CHECK (duplicate_jobs >= 0),
        scraped_at TEXT NOT NULL,
        duration_seconds REAL NOT NULL CHECK (duration_seconds >= 0)
    )
    "#,
];

const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_job_matches_search_term ON job_matches(search_term)",
    "CREATE INDEX IF NOT EXISTS idx_job_matches_cv_key ON job_matches(cv_key)",
    "CREATE INDEX IF NOT EXISTS idx_job_matches_overall ON job_matches(overall_match)",
    "CREATE INDEX IF NOT EXISTS idx_job_matches_matched_at ON job_matches(matched_at)",
    "CREATE INDEX IF NOT EXISTS idx_job_matches_location ON job_matches(location)",
    "CREATE INDEX IF NOT EXISTS idx_job_matches_term_cv_score ON job_matches(search_term, cv_key, overall_match DESC)",
    "CREATE INDEX IF NOT EXISTS idx_applications_status ON applications(status)",
    "CREATE INDEX IF NOT EXISTS idx_scrape_history_scraped_at ON scrape_history(scraped_at)",
];

/// Creates every table and index that is missing. Existing data is never touched.
///
/// The write lock is taken up front, so concurrent starters queue on the busy timeout
/// instead of failing when a read transaction cannot be upgraded.
pub async fn init_schema(store: &Store) -> Result<(), StoreError> {
    let mut tx = store.pool().begin_with("BEGIN IMMEDIATE").await?;
    for statement in TABLES.iter().chain(INDEXES) {
        sqlx::query(*statement).execute(&mut *tx).await?;
    }
    sqlx::query(&format!("PRAGMA user_version = {SCHEMA_VERSION}"))
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    info!(version = SCHEMA_VERSION, "schema ready");
    Ok(())
}

pub async fn schema_version(store: &Store) -> Result<i64, StoreError> {
    let version: i64 = sqlx::query_scalar("PRAGMA user_version")
        .fetch_one(store.pool())
        .await?;
    Ok(version)
}

pub async fn ensure_initialized(store: &Store) -> Result<(), StoreError> {
    let tables: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'job_matches'",
    )
    .fetch_one(store.pool())
    .await?;
    if tables == 0 {
        return Err(StoreError::SchemaMissing);
    }
    Ok(())
}
