use jmt_core::{ApplicationStatus, MatchFilter, MatchScores, NewJobMatch, ScrapedJob};
use jmt_storage::{
    init_schema, normalize, schema_version, InsertOutcome, Store, StoreConfig, StoreError,
    SCHEMA_VERSION,
};
use tempfile::tempdir;

fn engineer_match(url: &str, cv_key: &str, overall: u8) -> NewJobMatch {
    let scraped = ScrapedJob {
        job_title: Some("Software Engineer".into()),
        company_name: Some("Ostschweiz AG".into()),
        location: Some("St. Gallen".into()),
        requirements: vec!["Rust".into(), "SQL".into()],
        ..ScrapedJob::default()
    };
    NewJobMatch::from_scraped(url, "engineer", cv_key, scraped)
        .with_scores(MatchScores::overall(overall))
}

async fn file_store(path: &std::path::Path, busy_timeout_ms: u64) -> Store {
    let mut config = StoreConfig::at(path);
    config.busy_timeout_ms = busy_timeout_ms;
    let store = Store::connect(&config).await.expect("connect");
    init_schema(&store).await.expect("schema");
    store
}

#[tokio::test]
async fn duplicate_triple_is_reported_not_stored() {
    let store = Store::open_in_memory().await.expect("store");
    init_schema(&store).await.expect("schema");

    let record = engineer_match("https://www.ostjob.ch/job/1", "abc123", 80);
    store.insert_job_match(&record).await.expect("first insert");
    assert!(store
        .job_exists("https://www.ostjob.ch/job/1", "engineer", "abc123")
        .await
        .expect("exists"));

    match store.insert_job_match(&record).await {
        Err(StoreError::DuplicateEntry {
            job_url,
            search_term,
            cv_key,
        }) => {
            assert_eq!(job_url, "https://www.ostjob.ch/job/1");
            assert_eq!(search_term, "engineer");
            assert_eq!(cv_key, "abc123");
        }
        other => panic!("expected DuplicateEntry, got {other:?}"),
    }
}

#[test]
fn bare_and_http_urls_share_one_canonical_form() {
    let bare = normalize("ostjob.ch/job/12345").expect("bare");
    assert_eq!(bare, "https://www.ostjob.ch/job/12345");
    assert_eq!(normalize("http://ostjob.ch/job/12345").expect("http"), bare);
}

#[tokio::test]
async fn unchanged_cv_resolves_to_the_same_version() {
    let dir = tempdir().expect("tempdir");
    let store = file_store(&dir.path().join("jobs.db"), 5_000).await;
    let cv_path = dir.path().join("cv.pdf");
    std::fs::write(&cv_path, b"%PDF-1.7 Jane Doe, Rust engineer").expect("write cv");

    let first = store.get_or_create_cv_metadata(&cv_path).await.expect("first");
    let second = store.get_or_create_cv_metadata(&cv_path).await.expect("second");
    assert_eq!(first.cv_key, second.cv_key);
    assert_eq!(first.upload_date, second.upload_date);
    assert_eq!(store.list_cv_versions().await.expect("list").len(), 1);
}

#[tokio::test]
async fn status_can_move_backwards_on_the_board() {
    let store = Store::open_in_memory().await.expect("store");
    init_schema(&store).await.expect("schema");
    let id = store
        .insert_job_match(&engineer_match("ostjob.ch/job/9", "abc123", 72))
        .await
        .expect("insert");

    store
        .update_application_status(id, "INTERVIEW".parse().expect("status"))
        .await
        .expect("interview");
    store
        .update_application_status(id, "INTERESTED".parse().expect("status"))
        .await
        .expect("interested");
    assert_eq!(
        store.get_application_status(id).await.expect("status"),
        ApplicationStatus::Interested
    );

    let board = store.query_board(&MatchFilter::default()).await.expect("board");
    assert_eq!(board.len(), 1);
    assert_eq!(board[0].1, ApplicationStatus::Interested);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_writers_store_exactly_one_row() {
    let dir = tempdir().expect("tempdir");
    let store = file_store(&dir.path().join("race.db"), 30_000).await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .record_job_match(&engineer_match("http://ostjob.ch/job/race", "abc123", 66))
                .await
        }));
    }

    let mut inserted = 0;
    let mut duplicates = 0;
    for handle in handles {
        match handle.await.expect("join").expect("record") {
            InsertOutcome::Inserted(_) => inserted += 1,
            InsertOutcome::Duplicate => duplicates += 1,
        }
    }
    assert_eq!(inserted, 1);
    assert_eq!(duplicates, 7);

    let rows = store.query_matches(&MatchFilter::default()).await.expect("query");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].job_url, "https://www.ostjob.ch/job/race");
}

#[tokio::test]
async fn held_write_lock_surfaces_as_store_busy() {
    let dir = tempdir().expect("tempdir");
    let store = file_store(&dir.path().join("busy.db"), 200).await;

    let mut blocker = store.pool().begin().await.expect("begin");
    sqlx::query(
        "INSERT INTO scrape_history (search_term, page_number, jobs_found, new_jobs, duplicate_jobs, scraped_at, duration_seconds)
         VALUES ('engineer', 1, 0, 0, 0, '2026-01-01T00:00:00+00:00', 0.0)",
    )
    .execute(&mut *blocker)
    .await
    .expect("take write lock");

    let err = store
        .insert_job_match(&engineer_match("ostjob.ch/job/busy", "abc123", 50))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::StoreBusy(_)), "got {err:?}");
    assert!(err.is_retryable());

    blocker.rollback().await.expect("rollback");
    store
        .insert_job_match(&engineer_match("ostjob.ch/job/busy", "abc123", 50))
        .await
        .expect("insert after lock released");
}

#[tokio::test]
async fn reads_see_committed_state_while_a_write_is_open() {
    let dir = tempdir().expect("tempdir");
    let store = file_store(&dir.path().join("wal.db"), 5_000).await;
    store
        .insert_job_match(&engineer_match("ostjob.ch/job/1", "abc123", 80))
        .await
        .expect("seed");

    let mut writer = store.pool().begin().await.expect("begin");
    sqlx::query("UPDATE job_matches SET overall_match = 10")
        .execute(&mut *writer)
        .await
        .expect("pending update");

    let rows = store.query_matches(&MatchFilter::default()).await.expect("read");
    assert_eq!(rows[0].scores.overall, 80);

    writer.commit().await.expect("commit");
    let rows = store.query_matches(&MatchFilter::default()).await.expect("read");
    assert_eq!(rows[0].scores.overall, 10);
}

#[tokio::test]
async fn reopening_a_file_store_keeps_its_rows() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("nested").join("jobs.db");

    let store = file_store(&path, 5_000).await;
    let id = store
        .insert_job_match(&engineer_match("ostjob.ch/job/persist", "abc123", 90))
        .await
        .expect("insert");
    store.update_application_status(id, ApplicationStatus::Applied).await.expect("apply");
    store.close().await;

    let reopened = file_store(&path, 5_000).await;
    let stored = reopened.get_job_match(id).await.expect("get");
    assert_eq!(stored.scores.overall, 90);
    assert_eq!(
        reopened.get_application_status(id).await.expect("status"),
        ApplicationStatus::Applied
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_startups_all_initialize_cleanly() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("startup.db");
    let seeded = file_store(&path, 30_000).await;
    let id = seeded
        .insert_job_match(&engineer_match("ostjob.ch/job/startup", "abc123", 70))
        .await
        .expect("seed");
    seeded.close().await;

    for _round in 0..5 {
        let mut handles = Vec::new();
        for _ in 0..8 {
            let config = StoreConfig::at(&path);
            handles.push(tokio::spawn(async move {
                let store = Store::connect(&config).await?;
                let result = init_schema(&store).await;
                store.close().await;
                result
            }));
        }
        for handle in handles {
            handle.await.expect("join").expect("init on a live database");
        }
    }

    let store = file_store(&path, 30_000).await;
    assert_eq!(schema_version(&store).await.expect("version"), SCHEMA_VERSION);
    assert_eq!(store.get_job_match(id).await.expect("seed survives").scores.overall, 70);
}
