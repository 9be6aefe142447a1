//! Embedded SQLite persistence for job matches, CV versions, application state and
//! scrape history.
//!
//! Every operation hangs off [`Store`], which wraps a connection pool and is cheap to
//! clone across tasks. Deduplication is enforced by the database's uniqueness
//! constraint on `(job_url, search_term, cv_key)`, never by a read-then-write check.

mod applications;
mod config;
mod cv;
mod error;
mod history;
mod matches;
mod normalizer;
mod schema;
mod store;

pub const CRATE_NAME: &str = "jmt-storage";

pub use config::{
    ConfigError, JournalMode, StoreConfig, StoreLocation, Synchronous, DEFAULT_BUSY_TIMEOUT_MS,
    DEFAULT_DATABASE_PATH, DEFAULT_MAX_CONNECTIONS, MEMORY_PATH,
};
pub use cv::{file_hash, generate_cv_key, CV_KEY_LEN};
pub use error::StoreError;
pub use matches::InsertOutcome;
pub use normalizer::normalize;
pub use schema::{ensure_initialized, init_schema, schema_version, SCHEMA_VERSION};
pub use store::Store;
