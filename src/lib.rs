pub mod appointments;
pub mod config;
pub mod db;
pub mod models;
pub mod profiles;
pub mod records;
pub mod stats; // Doctor statistics: recompute, hooks, cascade, drift repair

use rusqlite::Connection;
use tracing_subscriber::EnvFilter;

pub use records::{ClinicRecords, RecordError};
pub use stats::{FailureReporter, SystemClock, TracingReporter};

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` wins when set; otherwise `config::default_log_filter()`.
/// Calling it twice is harmless.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init();
}

/// Open (and migrate) the database at `config::database_path()`.
pub fn open_default_database() -> Result<Connection, db::DatabaseError> {
    let path = config::database_path();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    tracing::info!(path = %path.display(), "{} v{} opening database", config::APP_NAME, config::APP_VERSION);
    db::open_database(&path)
}
