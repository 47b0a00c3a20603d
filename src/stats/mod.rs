//! Doctor statistics: the denormalized `number_of_consultations`,
//! `rating`, `total_reviews` and `stats_last_updated` columns.
//!
//! The recalculator derives the correct values from consultations and
//! reviews. The hooks keep the stored copy in step after each committed
//! write, and the cascade turns a new prescription into a completed
//! consultation. Hook failures never undo the write that triggered them;
//! they go to a `FailureReporter` and are fixed later by a refresh or a
//! drift repair.

pub mod cascade;
pub mod clock;
pub mod drift;
pub mod hooks;
pub mod recalculator;
pub mod reporter;

use rusqlite::Connection;
use thiserror::Error;
use uuid::Uuid;

use crate::db::DatabaseError;

pub use cascade::{CascadeOutcome, FeeSource, PrescriptionCascade};
pub use clock::{Clock, FixedClock, SystemClock};
pub use drift::{check_doctor_stats, repair_doctor_stats, StatsConsistencyReport, StatsDrift};
pub use hooks::{ConsultationMutationHook, ReviewMutationHook};
pub(crate) use recalculator::refresh_doctor_stats_for;
pub use recalculator::{average_rating, compute_stats, recompute, refresh_doctor_stats, StatsSnapshot};
pub use reporter::{FailureReporter, HookFailure, HookKind, RecordedFailure, RecordingReporter, TracingReporter};

#[derive(Error, Debug)]
pub enum StatsError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Aggregate update failed for doctor {doctor_id}: {source}")]
    AggregateUpdateFailed {
        doctor_id: Uuid,
        #[source]
        source: DatabaseError,
    },

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

impl From<rusqlite::Error> for StatsError {
    fn from(err: rusqlite::Error) -> Self {
        StatsError::Database(DatabaseError::Sqlite(err))
    }
}

/// Typed handles every hook needs: the store, the time source and the
/// failure sink.
#[derive(Clone, Copy)]
pub struct StatsContext<'c> {
    pub conn: &'c Connection,
    pub clock: &'c dyn Clock,
    pub reporter: &'c dyn FailureReporter,
}

impl<'c> StatsContext<'c> {
    pub fn new(
        conn: &'c Connection,
        clock: &'c dyn Clock,
        reporter: &'c dyn FailureReporter,
    ) -> Self {
        Self { conn, clock, reporter }
    }
}

/// Parse a caller-supplied doctor or appointment identifier.
pub fn parse_id(kind: &str, raw: &str) -> Result<Uuid, StatsError> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| StatsError::InvalidArgument(format!("malformed {kind} id: {raw:?}")))
}
