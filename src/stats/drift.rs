use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde::Serialize;
use uuid::Uuid;

use super::recalculator::{compute_stats, StatsSnapshot};
use super::{Clock, StatsError};
use crate::db::repository;

/// One doctor whose cached statistics disagree with the source tables.
#[derive(Debug, Clone, Serialize)]
pub struct StatsDrift {
    pub doctor_id: Uuid,
    pub stored: StatsSnapshot,
    pub expected: StatsSnapshot,
}

/// Result of comparing every doctor's cached statistics with a recompute.
#[derive(Debug, Clone, Serialize)]
pub struct StatsConsistencyReport {
    pub drifts: Vec<StatsDrift>,
    pub doctors_checked: usize,
}

impl StatsConsistencyReport {
    pub fn is_consistent(&self) -> bool {
        self.drifts.is_empty()
    }
}

/// Compare every doctor's stored statistics with grouped aggregates.
///
/// Detects counter drift (missed or failed hooks), stale ratings and
/// review-count mismatches. Read-only.
pub fn check_doctor_stats(conn: &Connection) -> Result<StatsConsistencyReport, StatsError> {
    let completed = repository::completed_consultation_counts(conn)?;
    let ratings = repository::rating_summaries(conn)?;
    let stored = repository::list_doctor_stats(conn)?;

    let doctors_checked = stored.len();
    let drifts = stored
        .into_iter()
        .filter_map(|(doctor_id, stats)| {
            let expected = compute_stats(
                completed.get(&doctor_id).copied().unwrap_or(0),
                &ratings.get(&doctor_id).copied().unwrap_or_default(),
            );
            let stored = StatsSnapshot::from(&stats);
            (!stored.matches(&expected)).then_some(StatsDrift {
                doctor_id,
                stored,
                expected,
            })
        })
        .collect();

    Ok(StatsConsistencyReport {
        drifts,
        doctors_checked,
    })
}

/// Rewrite the statistics of every drifted doctor.
///
/// Returns the number of doctors repaired. Doctors already in step keep
/// their `stats_last_updated`.
pub fn repair_doctor_stats(conn: &Connection, clock: &dyn Clock) -> Result<usize, StatsError> {
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    let report = check_doctor_stats(&tx)?;
    let now = clock.now();

    for drift in &report.drifts {
        repository::write_doctor_stats(&tx, &drift.doctor_id, &drift.expected.into_stats(now))?;
        tracing::info!(
            doctor_id = %drift.doctor_id,
            stored_consultations = drift.stored.consultation_count,
            expected_consultations = drift.expected.consultation_count,
            stored_rating = drift.stored.average_rating,
            expected_rating = drift.expected.average_rating,
            stored_reviews = drift.stored.review_count,
            expected_reviews = drift.expected.review_count,
            "Repaired doctor stats drift"
        );
    }
    tx.commit()?;

    Ok(report.drifts.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::fixtures::*;
    use crate::db::sqlite::open_memory_database;
    use crate::models::enums::ConsultationStatus;
    use crate::models::{Consultation, Review};
    use crate::stats::FixedClock;

    fn raw_consultation(conn: &Connection, doctor_id: Uuid, patient_id: Uuid) {
        let appt = make_appointment(conn, doctor_id, patient_id, Some(100.0));
        repository::insert_consultation(
            conn,
            &Consultation {
                id: Uuid::new_v4(),
                doctor_id,
                patient_id,
                appointment_id: appt.id,
                prescription_id: None,
                status: ConsultationStatus::Completed,
                consultation_date: ts("2024-02-10 10:30:00"),
                duration_minutes: None,
                fees: 100.0,
                notes: None,
                created_at: ts("2024-02-10 10:30:00"),
            },
        )
        .unwrap();
    }

    fn raw_review(conn: &Connection, doctor_id: Uuid, patient_id: Uuid, rating: u8) {
        let appt = make_appointment(conn, doctor_id, patient_id, None);
        repository::insert_review(
            conn,
            &Review {
                id: Uuid::new_v4(),
                doctor_id,
                patient_id,
                appointment_id: appt.id,
                rating,
                comment: None,
                punctuality: None,
                communication: None,
                treatment: None,
                created_at: ts("2024-02-11 09:00:00"),
                updated_at: ts("2024-02-11 09:00:00"),
            },
        )
        .unwrap();
    }

    #[test]
    fn fresh_doctors_are_consistent() {
        let conn = open_memory_database().unwrap();
        make_doctor(&conn);
        make_doctor(&conn);

        let report = check_doctor_stats(&conn).unwrap();
        assert_eq!(report.doctors_checked, 2);
        assert!(report.is_consistent());
    }

    #[test]
    fn writes_that_bypass_hooks_show_up_as_drift() {
        let conn = open_memory_database().unwrap();
        let drifted = make_doctor(&conn);
        let clean = make_doctor(&conn);
        let patient = make_patient(&conn);
        raw_consultation(&conn, drifted.id, patient.id);
        raw_review(&conn, drifted.id, patient.id, 4);
        raw_review(&conn, drifted.id, patient.id, 5);

        let report = check_doctor_stats(&conn).unwrap();
        assert_eq!(report.drifts.len(), 1);
        let drift = &report.drifts[0];
        assert_eq!(drift.doctor_id, drifted.id);
        assert_eq!(drift.stored.consultation_count, 0);
        assert_eq!(drift.expected.consultation_count, 1);
        assert_eq!(drift.expected.average_rating, 4.5);
        assert_eq!(drift.expected.review_count, 2);
        assert!(report.drifts.iter().all(|d| d.doctor_id != clean.id));
    }

    #[test]
    fn repair_fixes_only_drifted_doctors() {
        let conn = open_memory_database().unwrap();
        let drifted = make_doctor(&conn);
        let clean = make_doctor(&conn);
        let patient = make_patient(&conn);
        raw_consultation(&conn, drifted.id, patient.id);
        raw_review(&conn, drifted.id, patient.id, 3);

        let clock = FixedClock::new(ts("2024-05-01 00:00:00"));
        assert_eq!(repair_doctor_stats(&conn, &clock).unwrap(), 1);

        let fixed = repository::get_doctor_stats(&conn, &drifted.id).unwrap().unwrap();
        assert_eq!(fixed.number_of_consultations, 1);
        assert_eq!(fixed.rating, 3.0);
        assert_eq!(fixed.total_reviews, 1);
        assert_eq!(fixed.stats_last_updated, ts("2024-05-01 00:00:00"));

        let untouched = repository::get_doctor_stats(&conn, &clean.id).unwrap().unwrap();
        assert_eq!(untouched.stats_last_updated, clean.stats.stats_last_updated);

        assert!(check_doctor_stats(&conn).unwrap().is_consistent());
        assert_eq!(repair_doctor_stats(&conn, &clock).unwrap(), 0);
    }
}
