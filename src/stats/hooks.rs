//! Post-commit hooks that keep the doctor statistics columns in step with
//! reviews and consultations.
//!
//! The write-path orchestrator calls these after the primary write has
//! committed. Every `on_*` method is fire-and-forget: errors are handed to
//! the `FailureReporter` and never returned.

use rusqlite::{Transaction, TransactionBehavior};
use uuid::Uuid;

use super::recalculator::average_rating;
use super::{HookFailure, HookKind, StatsContext, StatsError};
use crate::db::repository;
use crate::models::enums::ConsultationStatus;
use crate::models::{Consultation, Review};

/// Rating values written by one recompute.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatingUpdate {
    pub rating: f64,
    pub total_reviews: i64,
}

/// Recomputes `rating` and `total_reviews` from all current reviews.
///
/// Always a full recompute: updates and deletes move the mean in either
/// direction.
pub struct ReviewMutationHook<'c> {
    ctx: StatsContext<'c>,
}

impl<'c> ReviewMutationHook<'c> {
    pub fn new(ctx: StatsContext<'c>) -> Self {
        Self { ctx }
    }

    pub fn on_created(&self, review: &Review) {
        self.run("created", review.doctor_id);
    }

    pub fn on_updated(&self, review: &Review) {
        self.run("updated", review.doctor_id);
    }

    /// `removed` is `None` when the delete matched nothing.
    pub fn on_deleted(&self, removed: Option<&Review>) {
        if let Some(review) = removed {
            self.run("deleted", review.doctor_id);
        }
    }

    /// Recompute and persist the rating aggregate for `doctor_id`.
    ///
    /// Read and write share an IMMEDIATE transaction so two connections
    /// recomputing the same doctor serialize instead of interleaving.
    pub fn refresh_rating(&self, doctor_id: &Uuid) -> Result<RatingUpdate, StatsError> {
        let tx = Transaction::new_unchecked(self.ctx.conn, TransactionBehavior::Immediate)?;
        let summary = repository::rating_summary(&tx, doctor_id)?;
        let update = RatingUpdate {
            rating: average_rating(&summary),
            total_reviews: summary.review_count,
        };
        repository::write_rating_stats(
            &tx,
            doctor_id,
            update.rating,
            update.total_reviews,
            &self.ctx.clock.now(),
        )
        .map_err(|source| StatsError::AggregateUpdateFailed {
            doctor_id: *doctor_id,
            source,
        })?;
        tx.commit()?;
        Ok(update)
    }

    fn run(&self, event: &'static str, doctor_id: Uuid) {
        match self.refresh_rating(&doctor_id) {
            Ok(update) => tracing::debug!(
                %doctor_id,
                event,
                rating = update.rating,
                total_reviews = update.total_reviews,
                "Doctor rating recomputed"
            ),
            Err(error) => self.ctx.reporter.report(&HookFailure {
                hook: HookKind::ReviewRating,
                doctor_id: Some(doctor_id),
                appointment_id: None,
                error,
            }),
        }
    }
}

/// Maintains `number_of_consultations` incrementally.
///
/// Only consultations whose status is `completed` move the counter.
pub struct ConsultationMutationHook<'c> {
    ctx: StatsContext<'c>,
}

impl<'c> ConsultationMutationHook<'c> {
    pub fn new(ctx: StatsContext<'c>) -> Self {
        Self { ctx }
    }

    pub fn on_created(&self, consultation: &Consultation) {
        if consultation.status.is_counted() {
            self.run(consultation, 1);
        }
    }

    /// `removed` is `None` when the delete matched nothing.
    pub fn on_deleted(&self, removed: Option<&Consultation>) {
        if let Some(consultation) = removed.filter(|c| c.status.is_counted()) {
            self.run(consultation, -1);
        }
    }

    /// Status edits on an existing consultation. Moves the counter only when
    /// the edit crosses the `completed` boundary.
    pub fn on_status_changed(&self, previous: ConsultationStatus, current: &Consultation) {
        let delta = match (previous.is_counted(), current.status.is_counted()) {
            (false, true) => 1,
            (true, false) => -1,
            _ => return,
        };
        self.run(current, delta);
    }

    pub fn adjust(&self, doctor_id: &Uuid, delta: i64) -> Result<(), StatsError> {
        repository::adjust_consultation_count(self.ctx.conn, doctor_id, delta, &self.ctx.clock.now())
            .map_err(|source| StatsError::AggregateUpdateFailed {
                doctor_id: *doctor_id,
                source,
            })
    }

    fn run(&self, consultation: &Consultation, delta: i64) {
        match self.adjust(&consultation.doctor_id, delta) {
            Ok(()) => tracing::debug!(
                doctor_id = %consultation.doctor_id,
                consultation_id = %consultation.id,
                delta,
                "Doctor consultation count adjusted"
            ),
            Err(error) => self.ctx.reporter.report(&HookFailure {
                hook: HookKind::ConsultationCount,
                doctor_id: Some(consultation.doctor_id),
                appointment_id: Some(consultation.appointment_id),
                error,
            }),
        }
    }
}
