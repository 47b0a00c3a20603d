//! Derives a doctor's statistics from the source-of-truth tables.
//!
//! `compute_stats` is the single formula shared by the hooks, the on-demand
//! refresh and drift detection. `recompute` is a pure read.

use chrono::{NaiveDateTime, SubsecRound};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde::Serialize;
use uuid::Uuid;

use super::{parse_id, Clock, StatsError};
use crate::db::{repository, DatabaseError};
use crate::models::{DoctorStats, RatingSummary};

/// Correct statistics for one doctor at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub consultation_count: i64,
    pub average_rating: f64,
    pub review_count: i64,
}

impl StatsSnapshot {
    /// Compare with ratings taken at one-decimal precision.
    pub fn matches(&self, other: &StatsSnapshot) -> bool {
        self.consultation_count == other.consultation_count
            && self.review_count == other.review_count
            && (self.average_rating * 10.0).round() == (other.average_rating * 10.0).round()
    }

    pub fn into_stats(self, at: NaiveDateTime) -> DoctorStats {
        DoctorStats {
            number_of_consultations: self.consultation_count,
            rating: self.average_rating,
            total_reviews: self.review_count,
            stats_last_updated: at,
        }
    }
}

impl From<&DoctorStats> for StatsSnapshot {
    fn from(stats: &DoctorStats) -> Self {
        Self {
            consultation_count: stats.number_of_consultations,
            average_rating: stats.rating,
            review_count: stats.total_reviews,
        }
    }
}

/// Mean rating rounded half-up to one decimal, or 0 with no reviews.
///
/// Ratings are integers, so the rounding runs on integer tenths:
/// `floor(sum * 10 / count + 1/2) = (20 * sum + count) / (2 * count)`.
pub fn average_rating(summary: &RatingSummary) -> f64 {
    if summary.review_count <= 0 {
        return 0.0;
    }
    let tenths = (summary.rating_sum * 20 + summary.review_count) / (summary.review_count * 2);
    tenths as f64 / 10.0
}

pub fn compute_stats(completed_consultations: i64, ratings: &RatingSummary) -> StatsSnapshot {
    StatsSnapshot {
        consultation_count: completed_consultations,
        average_rating: average_rating(ratings),
        review_count: ratings.review_count.max(0),
    }
}

/// Read the current source-of-truth values for `doctor_id`.
///
/// Fails only on a malformed identifier; an unknown doctor yields zeros.
pub fn recompute(conn: &Connection, doctor_id: &str) -> Result<StatsSnapshot, StatsError> {
    let doctor_id = parse_id("doctor", doctor_id)?;
    recompute_for(conn, &doctor_id)
}

pub(crate) fn recompute_for(conn: &Connection, doctor_id: &Uuid) -> Result<StatsSnapshot, StatsError> {
    let completed = repository::count_completed_consultations(conn, doctor_id)?;
    let ratings = repository::rating_summary(conn, doctor_id)?;
    Ok(compute_stats(completed, &ratings))
}

/// Recompute all four statistics and persist them. Idempotent; this is the
/// repair path for a doctor whose cached values have gone stale.
pub fn refresh_doctor_stats(
    conn: &Connection,
    doctor_id: &str,
    clock: &dyn Clock,
) -> Result<DoctorStats, StatsError> {
    let doctor_id = parse_id("doctor", doctor_id)?;
    refresh_doctor_stats_for(conn, &doctor_id, clock)
}

pub(crate) fn refresh_doctor_stats_for(
    conn: &Connection,
    doctor_id: &Uuid,
    clock: &dyn Clock,
) -> Result<DoctorStats, StatsError> {
    let doctor_id = *doctor_id;
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    if repository::get_doctor_stats(&tx, &doctor_id)?.is_none() {
        return Err(DatabaseError::not_found("Doctor", doctor_id).into());
    }
    // Stored timestamps carry whole seconds.
    let stats = recompute_for(&tx, &doctor_id)?.into_stats(clock.now().trunc_subsecs(0));
    repository::write_doctor_stats(&tx, &doctor_id, &stats)?;
    tx.commit()?;

    tracing::info!(
        %doctor_id,
        consultations = stats.number_of_consultations,
        rating = stats.rating,
        reviews = stats.total_reviews,
        "Refreshed doctor stats"
    );
    Ok(stats)
}
