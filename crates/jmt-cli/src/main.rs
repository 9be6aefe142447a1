use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use jmt_core::{ApplicationStatus, JobMatch, MatchFilter, MatchOrder};
use jmt_storage::{ensure_initialized, init_schema, normalize, Store, StoreConfig, StoreLocation};
use jmt_sync::{load_records, IngestPipeline, SyncConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "jmt-cli")]
#[command(about = "Job Match Tracker command-line interface")]
struct Cli {
    /// YAML store configuration; environment variables are used when absent.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Database file, or `:memory:`. Overrides the configured location.
    #[arg(long, global = true)]
    database: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create missing tables and indexes.
    Init,
    /// Store one page of scored records read from a JSON file.
    Ingest {
        file: PathBuf,
        #[arg(long)]
        term: String,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long)]
        cv_key: Option<String>,
    },
    /// List stored matches with their application status.
    Matches {
        #[arg(long)]
        term: Option<String>,
        #[arg(long)]
        cv_key: Option<String>,
        #[arg(long)]
        min_score: Option<u8>,
        #[arg(long)]
        location: Option<String>,
        #[arg(long, requires = "to")]
        from: Option<DateTime<Utc>>,
        #[arg(long, requires = "from")]
        to: Option<DateTime<Utc>>,
        #[arg(long)]
        by_score: bool,
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long)]
        offset: Option<u32>,
        #[arg(long)]
        json: bool,
    },
    /// Look up the most recent match for a URL under one CV.
    Find {
        url: String,
        #[arg(long)]
        cv_key: String,
    },
    /// Show a match's status, or move it to a new one.
    Status { id: i64, status: Option<String> },
    /// Replace the notes on a match's application.
    Note { id: i64, text: String },
    /// Number of matches in each board column.
    Counts,
    #[command(subcommand)]
    Cv(CvCommands),
    /// Recent scrape pages, newest first.
    History {
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// Print the canonical form of a job URL.
    Normalize { url: String },
}

#[derive(Debug, Subcommand)]
enum CvCommands {
    /// Register a CV file, reusing the existing version when the content is unchanged.
    Add { path: PathBuf },
    List,
    Show { cv_key: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    if let Commands::Normalize { url } = &cli.command {
        println!("{}", normalize(url)?);
        return Ok(());
    }

    let mut sync_config = SyncConfig::from_env()?;
    if let Some(path) = &cli.config {
        sync_config.store = load_store_config(path)?;
    }
    if let Some(database) = cli.database {
        sync_config.store.location = StoreLocation::from(database);
    }

    let store = Store::connect(&sync_config.store)
        .await
        .with_context(|| format!("opening store at {}", sync_config.store.location))?;

    if let Commands::Init = cli.command {
        init_schema(&store).await.context("initializing schema")?;
        info!(location = %sync_config.store.location, "store initialized");
        return Ok(());
    }
    ensure_initialized(&store).await?;

    match cli.command {
        Commands::Init | Commands::Normalize { .. } => {}
        Commands::Ingest {
            file,
            term,
            page,
            cv_key,
        } => {
            let cv_key = cv_key
                .or_else(|| sync_config.default_cv_key.clone())
                .context("no CV key given; pass --cv-key or set JMT_CV_KEY")?;
            let records = load_records(&file).await?;
            let summary = IngestPipeline::new(store.clone())
                .ingest_page(&term, page, &cv_key, records)
                .await?;
            println!(
                "ingest complete: run_id={} found={} new={} duplicates={} rejected={}",
                summary.run_id, summary.found, summary.inserted, summary.duplicates, summary.rejected
            );
        }
        Commands::Matches {
            term,
            cv_key,
            min_score,
            location,
            from,
            to,
            by_score,
            limit,
            offset,
            json,
        } => {
            let mut filter = MatchFilter::default();
            filter.search_term = term;
            filter.cv_key = cv_key;
            filter.min_overall_score = min_score;
            filter.location = location;
            if let (Some(from), Some(to)) = (from, to) {
                filter = filter.matched_between(from, to);
            }
            if by_score {
                filter = filter.order(MatchOrder::OverallDesc);
            }
            filter.limit = limit;
            filter.offset = offset;

            let board = store.query_board(&filter).await?;
            if json {
                let rows: Vec<_> = board
                    .iter()
                    .map(|(job, status)| serde_json::json!({ "job": job, "status": status }))
                    .collect();
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                for (job, status) in &board {
                    print_match(job, *status);
                }
            }
        }
        Commands::Find { url, cv_key } => {
            let job = store.get_job_by_url(&url, &cv_key).await?;
            let status = store.get_application_status(job.id).await?;
            print_match(&job, status);
        }
        Commands::Status { id, status } => {
            if let Some(raw) = status {
                let status: ApplicationStatus = raw.parse()?;
                store.update_application_status(id, status).await?;
            }
            println!("{id}\t{}", store.get_application_status(id).await?);
        }
        Commands::Note { id, text } => {
            store.add_application_note(id, &text).await?;
            println!("{id}\tnote saved");
        }
        Commands::Counts => {
            for (status, total) in store.status_counts().await? {
                println!("{:<11} {total}", status.as_str());
            }
        }
        Commands::Cv(CvCommands::Add { path }) => {
            let cv = store.get_or_create_cv_metadata(&path).await?;
            println!("{}\t{}\t{}", cv.cv_key, cv.file_name, cv.upload_date.to_rfc3339());
        }
        Commands::Cv(CvCommands::List) => {
            for cv in store.list_cv_versions().await? {
                println!("{}\t{}\t{}", cv.cv_key, cv.file_name, cv.upload_date.to_rfc3339());
            }
        }
        Commands::Cv(CvCommands::Show { cv_key }) => {
            let cv = store.get_cv_version(&cv_key).await?;
            println!("{}", serde_json::to_string_pretty(&cv)?);
        }
        Commands::History { limit } => {
            for entry in store.recent_scrape_history(limit).await? {
                println!(
                    "{}\t{}\tpage {}\tfound={} new={} duplicates={}\t{:.2}s",
                    entry.scraped_at.to_rfc3339(),
                    entry.search_term,
                    entry.page_number,
                    entry.jobs_found,
                    entry.new_jobs,
                    entry.duplicate_jobs,
                    entry.duration_seconds
                );
            }
        }
    }

    store.close().await;
    Ok(())
}

fn load_store_config(path: &Path) -> Result<StoreConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    serde_yaml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
}

fn print_match(job: &JobMatch, status: ApplicationStatus) {
    println!(
        "{}\t{:>3}\t{:<11}\t{}\t{}\t{}",
        job.id,
        job.scores.overall,
        status.as_str(),
        job.job_title.as_deref().unwrap_or("-"),
        job.location.as_deref().unwrap_or("-"),
        job.job_url
    );
}
