//! Core domain model for JMT: job matches, CV versions, application lifecycle and scrape runs.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CRATE_NAME: &str = "jmt-core";

/// Upper bound of every match sub-score.
pub const SCORE_MAX: u8 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    #[error("{field} score {value} exceeds {max}", max = SCORE_MAX)]
    ScoreOutOfRange { field: &'static str, value: u8 },
    #[error("scraped payload field `{0}` contains a blank entry")]
    BlankListEntry(&'static str),
}

/// Score breakdown produced by the matching collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MatchScores {
    pub overall: u8,
    #[serde(default)]
    pub skills: u8,
    #[serde(default)]
    pub experience: u8,
    #[serde(default)]
    pub education: u8,
    #[serde(default)]
    pub career_trajectory: u8,
    #[serde(default)]
    pub preference: u8,
    #[serde(default)]
    pub potential_satisfaction: u8,
}

impl MatchScores {
    pub fn overall(overall: u8) -> Self {
        Self {
            overall,
            ..Self::default()
        }
    }

    fn named(&self) -> [(&'static str, u8); 7] {
        [
            ("overall", self.overall),
            ("skills", self.skills),
            ("experience", self.experience),
            ("education", self.education),
            ("career_trajectory", self.career_trajectory),
            ("preference", self.preference),
            ("potential_satisfaction", self.potential_satisfaction),
        ]
    }

    pub fn validate(&self) -> Result<(), PayloadError> {
        match self.named().into_iter().find(|(_, value)| *value > SCORE_MAX) {
            Some((field, value)) => Err(PayloadError::ScoreOutOfRange { field, value }),
            None => Ok(()),
        }
    }
}

/// Structured posting handed over by the extraction collaborator and stored verbatim as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScrapedJob {
    #[serde(default)]
    pub job_title: Option<String>,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub posting_date: Option<String>,
    #[serde(default)]
    pub salary_range: Option<String>,
    #[serde(default)]
    pub employment_type: Option<String>,
    #[serde(default)]
    pub workload: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub requirements: Vec<String>,
    #[serde(default)]
    pub benefits: Vec<String>,
    #[serde(default)]
    pub contact: Option<String>,
    #[serde(default)]
    pub application_url: Option<String>,
}

impl ScrapedJob {
    /// Structural checks only; every descriptive field is optional.
    pub fn validate(&self) -> Result<(), PayloadError> {
        if self.requirements.iter().any(|r| r.trim().is_empty()) {
            return Err(PayloadError::BlankListEntry("requirements"));
        }
        if self.benefits.iter().any(|b| b.trim().is_empty()) {
            return Err(PayloadError::BlankListEntry("benefits"));
        }
        Ok(())
    }
}

/// Insert contract for one scored posting under one (search term, CV) pairing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewJobMatch {
    pub job_url: String,
    pub search_term: String,
    pub cv_key: String,
    pub job_title: Option<String>,
    pub company_name: Option<String>,
    pub location: Option<String>,
    pub posting_date: Option<String>,
    pub salary_range: Option<String>,
    pub scores: MatchScores,
    pub location_compatibility: Option<String>,
    pub reasoning: Option<String>,
    pub scraped_data: ScrapedJob,
    pub scraped_at: DateTime<Utc>,
    /// Falls back to the insertion time when absent.
    pub matched_at: Option<DateTime<Utc>>,
}

impl NewJobMatch {
    /// Builds a record whose descriptive columns are lifted from the scraped payload.
    pub fn from_scraped(
        job_url: impl Into<String>,
        search_term: impl Into<String>,
        cv_key: impl Into<String>,
        scraped_data: ScrapedJob,
    ) -> Self {
        Self {
            job_url: job_url.into(),
            search_term: search_term.into(),
            cv_key: cv_key.into(),
            job_title: scraped_data.job_title.clone(),
            company_name: scraped_data.company_name.clone(),
            location: scraped_data.location.clone(),
            posting_date: scraped_data.posting_date.clone(),
            salary_range: scraped_data.salary_range.clone(),
            scores: MatchScores::default(),
            location_compatibility: None,
            reasoning: None,
            scraped_data,
            scraped_at: Utc::now(),
            matched_at: None,
        }
    }

    pub fn with_scores(mut self, scores: MatchScores) -> Self {
        self.scores = scores;
        self
    }

    pub fn with_matched_at(mut self, matched_at: DateTime<Utc>) -> Self {
        self.matched_at = Some(matched_at);
        self
    }

    pub fn validate(&self) -> Result<(), PayloadError> {
        self.scores.validate()?;
        self.scraped_data.validate()
    }
}

/// Persisted job match as returned to collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobMatch {
    pub id: i64,
    pub job_url: String,
    pub search_term: String,
    pub cv_key: String,
    pub job_title: Option<String>,
    pub company_name: Option<String>,
    pub location: Option<String>,
    pub posting_date: Option<String>,
    pub salary_range: Option<String>,
    pub scores: MatchScores,
    pub location_compatibility: Option<String>,
    pub reasoning: Option<String>,
    pub scraped_data: ScrapedJob,
    pub scraped_at: DateTime<Utc>,
    pub matched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CvMetadata {
    #[serde(default)]
    pub candidate_name: Option<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub years_experience: Option<u32>,
    #[serde(default)]
    pub page_count: Option<u32>,
}

/// One content-addressed version of the candidate's CV.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CvVersion {
    pub cv_key: String,
    pub file_name: String,
    pub file_path: String,
    pub file_hash: String,
    pub upload_date: DateTime<Utc>,
    pub summary: Option<String>,
    pub metadata: Option<CvMetadata>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown application status `{0}`")]
pub struct ParseStatusError(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplicationStatus {
    #[default]
    Matched,
    Interested,
    Preparing,
    Applied,
    Interview,
    Offer,
    Rejected,
    Archived,
}

impl ApplicationStatus {
    pub const ALL: [ApplicationStatus; 8] = [
        ApplicationStatus::Matched,
        ApplicationStatus::Interested,
        ApplicationStatus::Preparing,
        ApplicationStatus::Applied,
        ApplicationStatus::Interview,
        ApplicationStatus::Offer,
        ApplicationStatus::Rejected,
        ApplicationStatus::Archived,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ApplicationStatus::Matched => "MATCHED",
            ApplicationStatus::Interested => "INTERESTED",
            ApplicationStatus::Preparing => "PREPARING",
            ApplicationStatus::Applied => "APPLIED",
            ApplicationStatus::Interview => "INTERVIEW",
            ApplicationStatus::Offer => "OFFER",
            ApplicationStatus::Rejected => "REJECTED",
            ApplicationStatus::Archived => "ARCHIVED",
        }
    }

    /// No further transition is expected from these, though the store still accepts one.
    pub fn is_terminal(self) -> bool {
        matches!(self, ApplicationStatus::Rejected | ApplicationStatus::Archived)
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApplicationStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        ApplicationStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ParseStatusError(s.to_string()))
    }
}

/// Materialized lifecycle row for one job match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub id: i64,
    pub job_match_id: i64,
    pub status: ApplicationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub notes: Option<String>,
}

/// Result of looking up a match's lifecycle state. A match without a row is implicitly `MATCHED`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusLookup {
    Recorded(Application),
    Implicit,
}

impl StatusLookup {
    pub fn status(&self) -> ApplicationStatus {
        match self {
            StatusLookup::Recorded(application) => application.status,
            StatusLookup::Implicit => ApplicationStatus::Matched,
        }
    }

    pub fn application(&self) -> Option<&Application> {
        match self {
            StatusLookup::Recorded(application) => Some(application),
            StatusLookup::Implicit => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewScrapeHistory {
    pub search_term: String,
    pub page_number: u32,
    pub jobs_found: u32,
    pub new_jobs: u32,
    pub duplicate_jobs: u32,
    pub scraped_at: DateTime<Utc>,
    pub duration_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapeHistory {
    pub id: i64,
    pub search_term: String,
    pub page_number: u32,
    pub jobs_found: u32,
    pub new_jobs: u32,
    pub duplicate_jobs: u32,
    pub scraped_at: DateTime<Utc>,
    pub duration_seconds: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchOrder {
    #[default]
    MatchedAtDesc,
    OverallDesc,
}

/// Query filter for stored matches; every `None` field is unconstrained.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MatchFilter {
    pub search_term: Option<String>,
    pub cv_key: Option<String>,
    pub min_overall_score: Option<u8>,
    /// Inclusive lower bound on `matched_at`.
    pub matched_from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `matched_at`.
    pub matched_to: Option<DateTime<Utc>>,
    /// Case-insensitive substring of the stored location.
    pub location: Option<String>,
    #[serde(default)]
    pub order: MatchOrder,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl MatchFilter {
    pub fn search_term(mut self, term: impl Into<String>) -> Self {
        self.search_term = Some(term.into());
        self
    }

    pub fn cv_key(mut self, key: impl Into<String>) -> Self {
        self.cv_key = Some(key.into());
        self
    }

    pub fn min_overall_score(mut self, score: u8) -> Self {
        self.min_overall_score = Some(score);
        self
    }

    pub fn matched_between(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.matched_from = Some(from);
        self.matched_to = Some(to);
        self
    }

    pub fn location(mut self, needle: impl Into<String>) -> Self {
        self.location = Some(needle.into());
        self
    }

    pub fn order(mut self, order: MatchOrder) -> Self {
        self.order = order;
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }
}
