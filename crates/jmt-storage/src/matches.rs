use chrono::Utc;
use jmt_core::{ApplicationStatus, JobMatch, MatchFilter, MatchOrder, MatchScores, NewJobMatch, ScrapedJob};
use sqlx::sqlite::SqliteRow;
use sqlx::types::Json;
use sqlx::{QueryBuilder, Row, Sqlite};
use tracing::debug;

use crate::error::StoreError;
use crate::normalizer::normalize;
use crate::store::Store;

pub(crate) const MATCH_COLUMNS: &str = "jm.id AS id, jm.job_url AS job_url, \
    jm.search_term AS search_term, jm.cv_key AS cv_key, jm.job_title AS job_title, \
    jm.company_name AS company_name, jm.location AS location, jm.posting_date AS posting_date, \
    jm.salary_range AS salary_range, jm.overall_match AS overall_match, \
    jm.skills_match AS skills_match, jm.experience_match AS experience_match, \
    jm.education_fit AS education_fit, \
    jm.career_trajectory_alignment AS career_trajectory_alignment, \
    jm.preference_match AS preference_match, jm.potential_satisfaction AS potential_satisfaction, \
    jm.location_compatibility AS location_compatibility, jm.reasoning AS reasoning, \
    jm.scraped_data AS scraped_data, jm.scraped_at AS scraped_at, jm.matched_at AS matched_at";

const INSERT_MATCH: &str = r#"
    INSERT INTO job_matches (
        job_url, search_term, cv_key, job_title, company_name, location, posting_date,
        salary_range, overall_match, skills_match, experience_match, education_fit,
        career_trajectory_alignment, preference_match, potential_satisfaction,
        location_compatibility, reasoning, scraped_data, scraped_at, matched_at
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

/// How an insert attempt resolved once duplicates are treated as an expected outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted(i64),
    Duplicate,
}

impl Store {
    /// Diagnostic existence check. Inserts never rely on it for deduplication.
    pub async fn job_exists(
        &self,
        url: &str,
        search_term: &str,
        cv_key: &str,
    ) -> Result<bool, StoreError> {
        let job_url = normalize(url)?;
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (
                SELECT 1 FROM job_matches WHERE job_url = ?1 AND search_term = ?2 AND cv_key = ?3
             )",
        )
        .bind(&job_url)
        .bind(search_term)
        .bind(cv_key)
        .fetch_one(self.pool())
        .await?;
        Ok(exists)
    }

    /// Inserts one match. The UNIQUE (job_url, search_term, cv_key) constraint arbitrates
    /// concurrent writers; the loser gets `DuplicateEntry`.
    pub async fn insert_job_match(&self, record: &NewJobMatch) -> Result<i64, StoreError> {
        record.validate()?;
        let job_url = normalize(&record.job_url)?;
        let matched_at = record.matched_at.unwrap_or_else(Utc::now);
        let scores = &record.scores;

        let mut tx = self.pool().begin().await?;
        let result = sqlx::query(INSERT_MATCH)
            .bind(&job_url)
            .bind(&record.search_term)
            .bind(&record.cv_key)
            .bind(&record.job_title)
            .bind(&record.company_name)
            .bind(&record.location)
            .bind(&record.posting_date)
            .bind(&record.salary_range)
            .bind(scores.overall)
            .bind(scores.skills)
            .bind(scores.experience)
            .bind(scores.education)
            .bind(scores.career_trajectory)
            .bind(scores.preference)
            .bind(scores.potential_satisfaction)
            .bind(&record.location_compatibility)
            .bind(&record.reasoning)
            .bind(Json(&record.scraped_data))
            .bind(record.scraped_at)
            .bind(matched_at)
            .execute(&mut *tx)
            .await;

        let id = match result {
            Ok(done) => done.last_insert_rowid(),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                debug!(%job_url, search_term = %record.search_term, cv_key = %record.cv_key, "duplicate job match");
                return Err(StoreError::DuplicateEntry {
                    job_url,
                    search_term: record.search_term.clone(),
                    cv_key: record.cv_key.clone(),
                });
            }
            Err(err) => return Err(err.into()),
        };
        tx.commit().await?;

        debug!(id, %job_url, search_term = %record.search_term, "inserted job match");
        Ok(id)
    }

    /// Same as [`Store::insert_job_match`] with the duplicate case folded into the outcome.
    pub async fn record_job_match(&self, record: &NewJobMatch) -> Result<InsertOutcome, StoreError> {
        match self.insert_job_match(record).await {
            Ok(id) => Ok(InsertOutcome::Inserted(id)),
            Err(StoreError::DuplicateEntry { .. }) => Ok(InsertOutcome::Duplicate),
            Err(err) => Err(err),
        }
    }

    pub async fn query_matches(&self, filter: &MatchFilter) -> Result<Vec<JobMatch>, StoreError> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {MATCH_COLUMNS} FROM job_matches jm WHERE 1 = 1"
        ));
        push_filter(&mut qb, filter);
        let rows = qb.build().fetch_all(self.pool()).await?;
        rows.iter().map(row_to_job_match).collect()
    }

    /// Matches joined with their effective lifecycle status; rows without an application are `MATCHED`.
    pub async fn query_board(
        &self,
        filter: &MatchFilter,
    ) -> Result<Vec<(JobMatch, ApplicationStatus)>, StoreError> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {MATCH_COLUMNS}, COALESCE(a.status, 'MATCHED') AS application_status
               FROM job_matches jm
               LEFT JOIN applications a ON a.job_match_id = jm.id
              WHERE 1 = 1"
        ));
        push_filter(&mut qb, filter);
        let rows = qb.build().fetch_all(self.pool()).await?;
        rows.iter()
            .map(|row| -> Result<(JobMatch, ApplicationStatus), StoreError> {
                let status: String = row.try_get("application_status")?;
                Ok((row_to_job_match(row)?, status.parse()?))
            })
            .collect()
    }

    /// Looks a posting up by URL and CV regardless of search term.
    /// When several search terms matched it, the most recently matched row wins.
    pub async fn get_job_by_url(&self, url: &str, cv_key: &str) -> Result<JobMatch, StoreError> {
        let job_url = normalize(url)?;
        let row = sqlx::query(&format!(
            "SELECT {MATCH_COLUMNS} FROM job_matches jm
              WHERE jm.job_url = ?1 AND jm.cv_key = ?2
              ORDER BY jm.matched_at DESC, jm.id DESC
              LIMIT 1"
        ))
        .bind(&job_url)
        .bind(cv_key)
        .fetch_optional(self.pool())
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("job match {job_url} for cv {cv_key}")))?;
        row_to_job_match(&row)
    }

    pub async fn get_job_match(&self, id: i64) -> Result<JobMatch, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {MATCH_COLUMNS} FROM job_matches jm WHERE jm.id = ?1"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await?
        .ok_or(StoreError::UnknownJobMatch(id))?;
        row_to_job_match(&row)
    }

    pub async fn search_terms(&self) -> Result<Vec<String>, StoreError> {
        let terms = sqlx::query_scalar(
            "SELECT DISTINCT search_term FROM job_matches ORDER BY search_term",
        )
        .fetch_all(self.pool())
        .await?;
        Ok(terms)
    }
}

fn push_filter(qb: &mut QueryBuilder<'_, Sqlite>, filter: &MatchFilter) {
    if let Some(term) = &filter.search_term {
        qb.push(" AND jm.search_term = ").push_bind(term.clone());
    }
    if let Some(cv_key) = &filter.cv_key {
        qb.push(" AND jm.cv_key = ").push_bind(cv_key.clone());
    }
    if let Some(min) = filter.min_overall_score {
        qb.push(" AND jm.overall_match >= ").push_bind(min);
    }
    if let Some(from) = filter.matched_from {
        qb.push(" AND jm.matched_at >= ").push_bind(from);
    }
    if let Some(to) = filter.matched_to {
        qb.push(" AND jm.matched_at <= ").push_bind(to);
    }
    if let Some(needle) = &filter.location {
        qb.push(" AND instr(lower(jm.location), lower(")
            .push_bind(needle.clone())
            .push(")) > 0");
    }

    match filter.order {
        MatchOrder::MatchedAtDesc => qb.push(" ORDER BY jm.matched_at DESC, jm.id DESC"),
        MatchOrder::OverallDesc => {
            qb.push(" ORDER BY jm.overall_match DESC, jm.matched_at DESC, jm.id DESC")
        }
    };

    match (filter.limit, filter.offset) {
        (Some(limit), offset) => {
            qb.push(" LIMIT ").push_bind(i64::from(limit));
            if let Some(offset) = offset {
                qb.push(" OFFSET ").push_bind(i64::from(offset));
            }
        }
        (None, Some(offset)) => {
            qb.push(" LIMIT -1 OFFSET ").push_bind(i64::from(offset));
        }
        (None, None) => {}
    }
}

pub(crate) fn row_to_job_match(row: &SqliteRow) -> Result<JobMatch, StoreError> {
    let scraped: Json<ScrapedJob> = row.try_get("scraped_data")?;
    Ok(JobMatch {
        id: row.try_get("id")?,
        job_url: row.try_get("job_url")?,
        search_term: row.try_get("search_term")?,
        cv_key: row.try_get("cv_key")?,
        job_title: row.try_get("job_title")?,
        company_name: row.try_get("company_name")?,
        location: row.try_get("location")?,
        posting_date: row.try_get("posting_date")?,
        salary_range: row.try_get("salary_range")?,
        scores: MatchScores {
            overall: row.try_get("overall_match")?,
            skills: row.try_get("skills_match")?,
            experience: row.try_get("experience_match")?,
            education: row.try_get("education_fit")?,
            career_trajectory: row.try_get("career_trajectory_alignment")?,
            preference: row.try_get("preference_match")?,
            potential_satisfaction: row.try_get("potential_satisfaction")?,
        },
        location_compatibility: row.try_get("location_compatibility")?,
        reasoning: row.try_get("reasoning")?,
        scraped_data: scraped.0,
        scraped_at: row.try_get("scraped_at")?,
        matched_at: row.try_get("matched_at")?,
    })
}
