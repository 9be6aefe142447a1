use jmt_core::{NewScrapeHistory, ScrapeHistory};
use sqlx::Row;

use crate::error::StoreError;
use crate::store::Store;

impl Store {
    /// Appends one page-level audit record.
    /// Negative or NaN durations are rejected, never clamped.
    pub async fn insert_scrape_history(&self, entry: &NewScrapeHistory) -> Result<i64, StoreError> {
        if entry.duration_seconds.is_nan() || entry.duration_seconds < 0.0 {
            return Err(StoreError::ConstraintViolation(format!(
                "scrape_history.duration_seconds must be a non-negative number, got {}",
                entry.duration_seconds
            )));
        }
        let id = sqlx::query(
            "INSERT INTO scrape_history
                 (search_term, page_number, jobs_found, new_jobs, duplicate_jobs, scraped_at, duration_seconds)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(&entry.search_term)
        .bind(entry.page_number)
        .bind(entry.jobs_found)
        .bind(entry.new_jobs)
        .bind(entry.duplicate_jobs)
        .bind(entry.scraped_at)
        .bind(entry.duration_seconds)
        .execute(self.pool())
        .await?
        .last_insert_rowid();
        Ok(id)
    }

    pub async fn recent_scrape_history(&self, limit: u32) -> Result<Vec<ScrapeHistory>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, search_term, page_number, jobs_found, new_jobs, duplicate_jobs, scraped_at, duration_seconds
               FROM scrape_history
              ORDER BY scraped_at DESC, id DESC
              LIMIT ?1",
        )
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter()
            .map(|row| -> Result<ScrapeHistory, StoreError> {
                Ok(ScrapeHistory {
                    id: row.try_get("id")?,
                    search_term: row.try_get("search_term")?,
                    page_number: row.try_get("page_number")?,
                    jobs_found: row.try_get("jobs_found")?,
                    new_jobs: row.try_get("new_jobs")?,
                    duplicate_jobs: row.try_get("duplicate_jobs")?,
                    scraped_at: row.try_get("scraped_at")?,
                    duration_seconds: row.try_get("duration_seconds")?,
                })
            })
            .collect()
    }
}
