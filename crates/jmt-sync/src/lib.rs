//! Page-level ingestion of scored scrape results into the match store.

use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use jmt_core::{MatchScores, NewJobMatch, NewScrapeHistory, ScrapedJob};
use jmt_storage::{InsertOutcome, Store, StoreConfig, StoreError};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

pub const CRATE_NAME: &str = "jmt-sync";

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub store: StoreConfig,
    /// CV key used when a caller does not name one explicitly.
    pub default_cv_key: Option<String>,
}

impl SyncConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            store: StoreConfig::from_env().context("reading store configuration")?,
            default_cv_key: std::env::var("JMT_CV_KEY")
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
        })
    }
}

/// One extracted and scored posting as handed over by the extraction collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapedRecord {
    pub job_url: String,
    #[serde(default)]
    pub scores: MatchScores,
    #[serde(default)]
    pub location_compatibility: Option<String>,
    #[serde(default)]
    pub reasoning: Option<String>,
    #[serde(default)]
    pub scraped: ScrapedJob,
    #[serde(default)]
    pub scraped_at: Option<DateTime<Utc>>,
}

impl ScrapedRecord {
    pub fn into_new_match(
        self,
        search_term: &str,
        cv_key: &str,
        fallback_scraped_at: DateTime<Utc>,
    ) -> NewJobMatch {
        let mut record = NewJobMatch::from_scraped(self.job_url, search_term, cv_key, self.scraped)
            .with_scores(self.scores);
        record.location_compatibility = self.location_compatibility;
        record.reasoning = self.reasoning;
        record.scraped_at = self.scraped_at.unwrap_or(fallback_scraped_at);
        record
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestSummary {
    pub run_id: Uuid,
    pub found: usize,
    pub inserted: usize,
    pub duplicates: usize,
    pub rejected: usize,
    pub duration: Duration,
}

pub struct IngestPipeline {
    store: Store,
}

impl IngestPipeline {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Stores every record of one result page and logs a scrape-history row for it.
    ///
    /// Duplicates are the normal case for re-scraped pages and only count toward
    /// `duplicates`. Records that fail validation are skipped and counted as `rejected`.
    /// Lock contention and other store failures abort the page. The history row is
    /// best-effort: a failure to write it is logged and never undoes the inserts.
    pub async fn ingest_page(
        &self,
        search_term: &str,
        page_number: u32,
        cv_key: &str,
        records: Vec<ScrapedRecord>,
    ) -> Result<IngestSummary> {
        let run_id = Uuid::new_v4();
        let span = info_span!("ingest_page", %run_id, search_term, page_number, cv_key);
        self.ingest_page_inner(run_id, search_term, page_number, cv_key, records)
            .instrument(span)
            .await
    }

    async fn ingest_page_inner(
        &self,
        run_id: Uuid,
        search_term: &str,
        page_number: u32,
        cv_key: &str,
        records: Vec<ScrapedRecord>,
    ) -> Result<IngestSummary> {
        let started = Instant::now();
        let scraped_at = Utc::now();
        let mut summary = IngestSummary {
            run_id,
            found: records.len(),
            inserted: 0,
            duplicates: 0,
            rejected: 0,
            duration: Duration::ZERO,
        };

        for record in records {
            let job_url = record.job_url.clone();
            let new_match = record.into_new_match(search_term, cv_key, scraped_at);
            match self.store.record_job_match(&new_match).await {
                Ok(InsertOutcome::Inserted(_)) => summary.inserted += 1,
                Ok(InsertOutcome::Duplicate) => summary.duplicates += 1,
                Err(
                    err @ (StoreError::InvalidUrl { .. }
                    | StoreError::InvalidPayload(_)
                    | StoreError::ConstraintViolation(_)),
                ) => {
                    debug!(%job_url, error = %err, "rejected scraped record");
                    summary.rejected += 1;
                }
                Err(err) => {
                    return Err(err).with_context(|| format!("storing job match for {job_url}"));
                }
            }
        }
        summary.duration = started.elapsed();

        let history = NewScrapeHistory {
            search_term: search_term.to_string(),
            page_number,
            jobs_found: count(summary.found),
            new_jobs: count(summary.inserted),
            duplicate_jobs: count(summary.duplicates),
            scraped_at,
            duration_seconds: summary.duration.as_secs_f64(),
        };
        if let Err(err) = self.store.insert_scrape_history(&history).await {
            warn!(error = %err, "failed to record scrape history");
        }

        info!(
            found = summary.found,
            inserted = summary.inserted,
            duplicates = summary.duplicates,
            rejected = summary.rejected,
            elapsed_ms = summary.duration.as_millis() as u64,
            "page ingested"
        );
        Ok(summary)
    }
}

fn count(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

/// Reads a JSON array of scraped records.
pub async fn load_records(path: impl AsRef<Path>) -> Result<Vec<ScrapedRecord>> {
    let path = path.as_ref();
    let bytes = fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("parsing records in {}", path.display()))
}
