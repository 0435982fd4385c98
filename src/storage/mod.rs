//! Storage implementations.
//!
//! Persistence of the canonical tables is an external capability of the
//! core: "write canonical tables" and "read canonical tables". Any failure
//! here is a backend failure and aborts the run.

use std::path::Path;

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tracing::info;

mod canonical_store;
pub mod mock;
pub mod schema;
pub mod sqlite;

pub use canonical_store::CanonicalStore;
pub use mock::MockCanonicalStore;
pub use sqlite::SqliteCanonicalStore;

/// Path value selecting a private in-memory SQLite database.
pub const IN_MEMORY_PATH: &str = ":memory:";

/// Errors raised by storage backends.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Query build error: {0}")]
    QueryBuild(#[from] sea_query::error::Error),

    #[error("Stored instant out of range: {micros} microseconds")]
    InvalidInstant { micros: i64 },

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Open a SQLite pool for `path`, creating the file and parent directories.
///
/// `":memory:"` opens a single-connection in-memory database; the pool keeps
/// that connection alive for its whole lifetime so the data is not lost.
pub async fn connect_sqlite(path: &str) -> Result<SqlitePool> {
    if path == IN_MEMORY_PATH {
        info!("Storage: sqlite in memory");
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        return Ok(pool);
    }

    info!("Storage: sqlite at {}", path);
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let pool = SqlitePool::connect(&format!("sqlite:{}?mode=rwc", path)).await?;
    Ok(pool)
}
