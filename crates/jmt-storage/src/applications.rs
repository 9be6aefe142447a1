use std::collections::BTreeMap;

use chrono::Utc;
use jmt_core::{Application, ApplicationStatus, StatusLookup};
use sqlx::Row;
use tracing::debug;

use crate::error::StoreError;
use crate::store::Store;

// Both upserts select from job_matches so an unknown id inserts nothing instead of
// depending on foreign-key enforcement being switched on.
const UPSERT_STATUS: &str = r#"
    INSERT INTO applications (job_match_id, status, created_at, updated_at)
    SELECT id, ?2, ?3, ?3 FROM job_matches WHERE id = ?1
    ON CONFLICT (job_match_id) DO UPDATE
        SET status = excluded.status, updated_at = excluded.updated_at
"#;

const UPSERT_NOTE: &str = r#"
    INSERT INTO applications (job_match_id, status, created_at, updated_at, notes)
    SELECT id, 'MATCHED', ?3, ?3, ?2 FROM job_matches WHERE id = ?1
    ON CONFLICT (job_match_id) DO UPDATE
        SET notes = excluded.notes, updated_at = excluded.updated_at
"#;

impl Store {
    pub async fn lookup_application(&self, job_match_id: i64) -> Result<StatusLookup, StoreError> {
        let row = sqlx::query(
            "SELECT jm.id AS match_id, a.id AS application_id, a.status, a.created_at, a.updated_at, a.notes
               FROM job_matches jm
               LEFT JOIN applications a ON a.job_match_id = jm.id
              WHERE jm.id = ?1",
        )
        .bind(job_match_id)
        .fetch_optional(self.pool())
        .await?
        .ok_or(StoreError::UnknownJobMatch(job_match_id))?;

        let application_id: Option<i64> = row.try_get("application_id")?;
        let Some(id) = application_id else {
            return Ok(StatusLookup::Implicit);
        };
        let status: String = row.try_get("status")?;
        Ok(StatusLookup::Recorded(Application {
            id,
            job_match_id,
            status: status.parse()?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            notes: row.try_get("notes")?,
        }))
    }

    /// Effective status of a match. Never creates a row.
    pub async fn get_application_status(
        &self,
        job_match_id: i64,
    ) -> Result<ApplicationStatus, StoreError> {
        Ok(self.lookup_application(job_match_id).await?.status())
    }

    /// Moves a match to `status`, materializing its application row on first use.
    /// Any status may follow any other; the forward order is a board convention only.
    pub async fn update_application_status(
        &self,
        job_match_id: i64,
        status: ApplicationStatus,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool().begin().await?;
        let affected = sqlx::query(UPSERT_STATUS)
            .bind(job_match_id)
            .bind(status.as_str())
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if affected == 0 {
            return Err(StoreError::UnknownJobMatch(job_match_id));
        }
        tx.commit().await?;

        debug!(job_match_id, %status, "application status updated");
        Ok(())
    }

    /// Replaces the notes of a match's application without touching its status.
    pub async fn add_application_note(&self, job_match_id: i64, note: &str) -> Result<(), StoreError> {
        let mut tx = self.pool().begin().await?;
        let affected = sqlx::query(UPSERT_NOTE)
            .bind(job_match_id)
            .bind(note)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if affected == 0 {
            return Err(StoreError::UnknownJobMatch(job_match_id));
        }
        tx.commit().await?;
        Ok(())
    }

    /// Number of matches per effective status, zero-filled across the whole status set.
    pub async fn status_counts(&self) -> Result<BTreeMap<ApplicationStatus, i64>, StoreError> {
        let rows = sqlx::query(
            "SELECT COALESCE(a.status, 'MATCHED') AS status, COUNT(*) AS total
               FROM job_matches jm
               LEFT JOIN applications a ON a.job_match_id = jm.id
              GROUP BY COALESCE(a.status, 'MATCHED')",
        )
        .fetch_all(self.pool())
        .await?;

        let mut counts: BTreeMap<ApplicationStatus, i64> =
            ApplicationStatus::ALL.into_iter().map(|s| (s, 0)).collect();
        for row in rows {
            let status: String = row.try_get("status")?;
            counts.insert(status.parse()?, row.try_get("total")?);
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_store;
    use jmt_core::{MatchScores, NewJobMatch, ScrapedJob};

    async fn seeded_match(store: &Store, url: &str) -> i64 {
        let scraped = ScrapedJob {
            job_title: Some("Engineer".into()),
            ..ScrapedJob::default()
        };
        store
            .insert_job_match(
                &NewJobMatch::from_scraped(url, "engineer", "abc123", scraped)
                    .with_scores(MatchScores::overall(75)),
            )
            .await
            .expect("seed match")
    }

    async fn application_rows(store: &Store) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM applications")
            .fetch_one(store.pool())
            .await
            .expect("count")
    }

    #[tokio::test]
    async fn missing_row_reads_as_matched_without_materializing() {
        let store = test_store().await;
        let id = seeded_match(&store, "ostjob.ch/job/1").await;

        assert_eq!(
            store.get_application_status(id).await.expect("status"),
            ApplicationStatus::Matched
        );
        assert_eq!(store.lookup_application(id).await.expect("lookup"), StatusLookup::Implicit);
        assert_eq!(application_rows(&store).await, 0);

        store
            .update_application_status(id, ApplicationStatus::Interested)
            .await
            .expect("update");
        assert_eq!(application_rows(&store).await, 1);
        let lookup = store.lookup_application(id).await.expect("lookup");
        let application = lookup.application().expect("recorded");
        assert_eq!(application.status, ApplicationStatus::Interested);
        assert_eq!(application.job_match_id, id);
    }

    #[tokio::test]
    async fn backward_transitions_are_allowed() {
        let store = test_store().await;
        let id = seeded_match(&store, "ostjob.ch/job/2").await;

        store.update_application_status(id, ApplicationStatus::Interview).await.expect("interview");
        let before = store.lookup_application(id).await.expect("lookup");
        store.update_application_status(id, ApplicationStatus::Interested).await.expect("back");
        let after = store.lookup_application(id).await.expect("lookup");

        assert_eq!(after.status(), ApplicationStatus::Interested);
        let (before, after) = (before.application().unwrap(), after.application().unwrap());
        assert_eq!(before.id, after.id);
        assert_eq!(before.created_at, after.created_at);
        assert!(after.updated_at >= before.updated_at);
        assert_eq!(application_rows(&store).await, 1);
    }

    #[tokio::test]
    async fn terminal_states_can_still_be_left() {
        let store = test_store().await;
        let id = seeded_match(&store, "ostjob.ch/job/3").await;
        store.update_application_status(id, ApplicationStatus::Rejected).await.expect("reject");
        store.update_application_status(id, ApplicationStatus::Applied).await.expect("reopen");
        assert_eq!(
            store.get_application_status(id).await.expect("status"),
            ApplicationStatus::Applied
        );
    }

    #[tokio::test]
    async fn unknown_match_is_an_error_everywhere() {
        let store = test_store().await;
        assert!(matches!(
            store.get_application_status(42).await,
            Err(StoreError::UnknownJobMatch(42))
        ));
        assert!(matches!(
            store.update_application_status(42, ApplicationStatus::Applied).await,
            Err(StoreError::UnknownJobMatch(42))
        ));
        assert!(matches!(
            store.add_application_note(42, "call back").await,
            Err(StoreError::UnknownJobMatch(42))
        ));
        assert_eq!(application_rows(&store).await, 0);
    }

    #[tokio::test]
    async fn invalid_status_text_is_rejected_before_storage() {
        let err = StoreError::from("HIRED".parse::<ApplicationStatus>().unwrap_err());
        assert!(matches!(err, StoreError::InvalidStatus(_)));

        let store = test_store().await;
        let id = seeded_match(&store, "ostjob.ch/job/4").await;
        let raw = sqlx::query(
            "INSERT INTO applications (job_match_id, status, created_at, updated_at)
             VALUES (?1, 'HIRED', '2026-01-01T00:00:00+00:00', '2026-01-01T00:00:00+00:00')",
        )
        .bind(id)
        .execute(store.pool())
        .await
        .map_err(StoreError::from);
        assert!(matches!(raw, Err(StoreError::ConstraintViolation(_))));
    }

    #[tokio::test]
    async fn notes_leave_status_alone() {
        let store = test_store().await;
        let id = seeded_match(&store, "ostjob.ch/job/5").await;

        store.add_application_note(id, "recruiter: Ms. Keller").await.expect("note");
        let lookup = store.lookup_application(id).await.expect("lookup");
        assert_eq!(lookup.status(), ApplicationStatus::Matched);
        assert_eq!(
            lookup.application().and_then(|a| a.notes.as_deref()),
            Some("recruiter: Ms. Keller")
        );

        store.update_application_status(id, ApplicationStatus::Preparing).await.expect("status");
        store.add_application_note(id, "cover letter drafted").await.expect("note");
        let lookup = store.lookup_application(id).await.expect("lookup");
        assert_eq!(lookup.status(), ApplicationStatus::Preparing);
        assert_eq!(
            lookup.application().and_then(|a| a.notes.as_deref()),
            Some("cover letter drafted")
        );
    }

    #[tokio::test]
    async fn counts_include_implicit_matches() {
        let store = test_store().await;
        let a = seeded_match(&store, "ostjob.ch/job/6").await;
        let _b = seeded_match(&store, "ostjob.ch/job/7").await;
        let c = seeded_match(&store, "ostjob.ch/job/8").await;
        store.update_application_status(a, ApplicationStatus::Applied).await.unwrap();
        store.update_application_status(c, ApplicationStatus::Applied).await.unwrap();

        let counts = store.status_counts().await.expect("counts");
        assert_eq!(counts[&ApplicationStatus::Applied], 2);
        assert_eq!(counts[&ApplicationStatus::Matched], 1);
        assert_eq!(counts[&ApplicationStatus::Offer], 0);
        assert_eq!(counts.len(), ApplicationStatus::ALL.len());
    }
}
