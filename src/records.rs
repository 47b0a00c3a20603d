//! Write path for reviews, consultations and prescriptions.
//!
//! Every operation commits its primary write first and then runs the matching
//! stats hook. Validation and storage errors of the primary write are
//! returned; hook failures go to the `FailureReporter` only.

use chrono::NaiveDate;
use rusqlite::{Transaction, TransactionBehavior};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::db::{repository, DatabaseError};
use crate::models::enums::ConsultationStatus;
use crate::models::{
    Appointment, Consultation, DoctorStats, Medicine, Prescription, Review, MAX_REVIEW_COMMENT_LEN,
};
use crate::stats::{
    self, CascadeOutcome, Clock, ConsultationMutationHook, FailureReporter, PrescriptionCascade,
    ReviewMutationHook, StatsConsistencyReport, StatsContext, StatsError,
};

// ═══════════════════════════════════════════
// Errors
// ═══════════════════════════════════════════

#[derive(Error, Debug)]
pub enum RecordError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Stats error: {0}")]
    Stats(#[from] StatsError),
}

impl From<rusqlite::Error> for RecordError {
    fn from(err: rusqlite::Error) -> Self {
        RecordError::Database(DatabaseError::Sqlite(err))
    }
}

// ═══════════════════════════════════════════
// Inputs
// ═══════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewReview {
    pub appointment_id: Uuid,
    /// Must be the patient the appointment was booked for.
    pub patient_id: Uuid,
    pub rating: u8,
    pub comment: Option<String>,
    pub punctuality: Option<u8>,
    pub communication: Option<u8>,
    pub treatment: Option<u8>,
}

/// Partial review edit. `None` leaves the field as it is.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReviewUpdate {
    pub rating: Option<u8>,
    pub comment: Option<String>,
    pub punctuality: Option<u8>,
    pub communication: Option<u8>,
    pub treatment: Option<u8>,
}

impl ReviewUpdate {
    pub fn is_empty(&self) -> bool {
        self.rating.is_none()
            && self.comment.is_none()
            && self.punctuality.is_none()
            && self.communication.is_none()
            && self.treatment.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewConsultation {
    pub appointment_id: Uuid,
    #[serde(default)]
    pub status: ConsultationStatus,
    pub duration_minutes: Option<u32>,
    /// Defaults to the fee snapshotted on the appointment, or 0.
    pub fees: Option<f64>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPrescription {
    pub appointment_id: Uuid,
    /// Must be the doctor the appointment was booked with.
    pub doctor_id: Uuid,
    pub medicines: Vec<Medicine>,
    pub diagnosis: String,
    pub notes: Option<String>,
    #[serde(default)]
    pub lab_tests: Vec<String>,
    pub follow_up_date: Option<NaiveDate>,
}

/// A stored prescription plus what the consultation cascade did with it.
#[derive(Debug, Clone)]
pub struct PrescriptionRecord {
    pub prescription: Prescription,
    pub cascade: CascadeOutcome,
}

// ═══════════════════════════════════════════
// Orchestrator
// ═══════════════════════════════════════════

pub struct ClinicRecords<'c> {
    ctx: StatsContext<'c>,
}

impl<'c> ClinicRecords<'c> {
    pub fn new(
        conn: &'c rusqlite::Connection,
        clock: &'c dyn Clock,
        reporter: &'c dyn FailureReporter,
    ) -> Self {
        Self {
            ctx: StatsContext::new(conn, clock, reporter),
        }
    }

    // ── Reviews ──────────────────────────────

    pub fn create_review(&self, input: NewReview) -> Result<Review, RecordError> {
        let appointment = self.appointment(&input.appointment_id)?;
        if appointment.patient_id != input.patient_id {
            return Err(RecordError::Forbidden(
                "Only the patient of this appointment can review it".into(),
            ));
        }
        if repository::get_review_by_appointment(self.ctx.conn, &appointment.id)?.is_some() {
            return Err(RecordError::AlreadyExists(format!(
                "Review for appointment {}",
                appointment.id
            )));
        }

        let now = self.ctx.clock.now();
        let review = Review {
            id: Uuid::new_v4(),
            doctor_id: appointment.doctor_id,
            patient_id: appointment.patient_id,
            appointment_id: appointment.id,
            rating: input.rating,
            comment: normalize_comment(input.comment),
            punctuality: input.punctuality,
            communication: input.communication,
            treatment: input.treatment,
            created_at: now,
            updated_at: now,
        };
        validate_review(&review)?;

        repository::insert_review(self.ctx.conn, &review).map_err(|e| {
            if e.is_constraint_violation() {
                RecordError::AlreadyExists(format!("Review for appointment {}", review.appointment_id))
            } else {
                e.into()
            }
        })?;
        tracing::info!(
            review_id = %review.id,
            doctor_id = %review.doctor_id,
            rating = review.rating,
            "Review created"
        );

        ReviewMutationHook::new(self.ctx).on_created(&review);
        Ok(review)
    }

    pub fn update_review(&self, review_id: &Uuid, changes: ReviewUpdate) -> Result<Review, RecordError> {
        if changes.is_empty() {
            return Err(RecordError::InvalidInput("No valid fields provided for update".into()));
        }
        let mut review = repository::get_review(self.ctx.conn, review_id)?
            .ok_or_else(|| RecordError::NotFound(format!("Review {review_id}")))?;

        if let Some(rating) = changes.rating {
            review.rating = rating;
        }
        if changes.comment.is_some() {
            review.comment = normalize_comment(changes.comment);
        }
        review.punctuality = changes.punctuality.or(review.punctuality);
        review.communication = changes.communication.or(review.communication);
        review.treatment = changes.treatment.or(review.treatment);
        validate_review(&review)?;

        let updated = repository::update_review(self.ctx.conn, &review, &self.ctx.clock.now())?
            .ok_or_else(|| RecordError::NotFound(format!("Review {review_id}")))?;
        tracing::info!(review_id = %updated.id, rating = updated.rating, "Review updated");

        ReviewMutationHook::new(self.ctx).on_updated(&updated);
        Ok(updated)
    }

    pub fn delete_review(&self, review_id: &Uuid) -> Result<Review, RecordError> {
        let removed = repository::delete_review(self.ctx.conn, review_id)?;
        ReviewMutationHook::new(self.ctx).on_deleted(removed.as_ref());

        let review = removed.ok_or_else(|| RecordError::NotFound(format!("Review {review_id}")))?;
        tracing::info!(review_id = %review.id, doctor_id = %review.doctor_id, "Review deleted");
        Ok(review)
    }

    // ── Consultations ────────────────────────

    pub fn create_consultation(&self, input: NewConsultation) -> Result<Consultation, RecordError> {
        let appointment = self.appointment(&input.appointment_id)?;
        if let Some(fees) = input.fees {
            validate_fee(fees)?;
        }
        if repository::get_consultation_by_appointment(self.ctx.conn, &appointment.id)?.is_some() {
            return Err(RecordError::AlreadyExists(format!(
                "Consultation for appointment {}",
                appointment.id
            )));
        }

        let now = self.ctx.clock.now();
        let consultation = Consultation {
            id: Uuid::new_v4(),
            doctor_id: appointment.doctor_id,
            patient_id: appointment.patient_id,
            appointment_id: appointment.id,
            prescription_id: None,
            status: input.status,
            consultation_date: now,
            duration_minutes: input.duration_minutes,
            fees: input.fees.or(appointment.consultation_fee).unwrap_or(0.0),
            notes: input.notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
            created_at: now,
        };

        repository::insert_consultation(self.ctx.conn, &consultation).map_err(|e| {
            if e.is_constraint_violation() {
                RecordError::AlreadyExists(format!(
                    "Consultation for appointment {}",
                    consultation.appointment_id
                ))
            } else {
                e.into()
            }
        })?;
        tracing::info!(
            consultation_id = %consultation.id,
            doctor_id = %consultation.doctor_id,
            status = %consultation.status,
            "Consultation created"
        );

        ConsultationMutationHook::new(self.ctx).on_created(&consultation);
        Ok(consultation)
    }

    pub fn update_consultation_status(
        &self,
        consultation_id: &Uuid,
        status: ConsultationStatus,
    ) -> Result<Consultation, RecordError> {
        // The previous status decides the counter delta, so it must be read
        // under the same write lock as the update.
        let tx = Transaction::new_unchecked(self.ctx.conn, TransactionBehavior::Immediate)?;
        let previous = repository::get_consultation(&tx, consultation_id)?
            .ok_or_else(|| RecordError::NotFound(format!("Consultation {consultation_id}")))?;
        let updated = repository::update_consultation_status(&tx, consultation_id, status)?
            .ok_or_else(|| RecordError::NotFound(format!("Consultation {consultation_id}")))?;
        tx.commit()?;
        tracing::info!(
            consultation_id = %updated.id,
            from = %previous.status,
            to = %updated.status,
            "Consultation status changed"
        );

        ConsultationMutationHook::new(self.ctx).on_status_changed(previous.status, &updated);
        Ok(updated)
    }

    pub fn delete_consultation(&self, consultation_id: &Uuid) -> Result<Consultation, RecordError> {
        let removed = repository::delete_consultation(self.ctx.conn, consultation_id)?;
        ConsultationMutationHook::new(self.ctx).on_deleted(removed.as_ref());

        let consultation =
            removed.ok_or_else(|| RecordError::NotFound(format!("Consultation {consultation_id}")))?;
        tracing::info!(
            consultation_id = %consultation.id,
            doctor_id = %consultation.doctor_id,
            "Consultation deleted"
        );
        Ok(consultation)
    }

    // ── Prescriptions ────────────────────────

    /// Store a prescription and make sure its appointment has a consultation.
    ///
    /// The prescription stays committed even when the cascade fails; the
    /// outcome says what happened.
    pub fn create_prescription(&self, input: NewPrescription) -> Result<PrescriptionRecord, RecordError> {
        let appointment = self.appointment(&input.appointment_id)?;
        if appointment.doctor_id != input.doctor_id {
            return Err(RecordError::Forbidden(
                "Only the doctor of this appointment can prescribe for it".into(),
            ));
        }
        let diagnosis = input.diagnosis.trim();
        if diagnosis.is_empty() {
            return Err(RecordError::InvalidInput("Diagnosis is required".into()));
        }
        if let Some(m) = input
            .medicines
            .iter()
            .find(|m| m.name.trim().is_empty() || m.dosage.trim().is_empty())
        {
            return Err(RecordError::InvalidInput(format!(
                "Medicine entry needs a name and dosage: {m:?}"
            )));
        }
        if repository::get_prescription_by_appointment(self.ctx.conn, &appointment.id)?.is_some() {
            return Err(RecordError::AlreadyExists(format!(
                "Prescription for appointment {}",
                appointment.id
            )));
        }

        let prescription = Prescription {
            id: Uuid::new_v4(),
            appointment_id: appointment.id,
            doctor_id: appointment.doctor_id,
            patient_id: appointment.patient_id,
            medicines: input.medicines,
            diagnosis: diagnosis.to_string(),
            notes: input.notes,
            lab_tests: input.lab_tests,
            follow_up_date: input.follow_up_date,
            created_at: self.ctx.clock.now(),
        };
        repository::insert_prescription(self.ctx.conn, &prescription).map_err(|e| {
            if e.is_constraint_violation() {
                RecordError::AlreadyExists(format!(
                    "Prescription for appointment {}",
                    prescription.appointment_id
                ))
            } else {
                e.into()
            }
        })?;
        tracing::info!(
            prescription_id = %prescription.id,
            appointment_id = %prescription.appointment_id,
            medicines = prescription.medicines.len(),
            "Prescription created"
        );

        let cascade = PrescriptionCascade::new(self.ctx).on_created(&prescription);
        Ok(PrescriptionRecord { prescription, cascade })
    }

    // ── Stats maintenance ────────────────────

    pub fn refresh_doctor_stats(&self, doctor_id: &str) -> Result<DoctorStats, RecordError> {
        stats::refresh_doctor_stats(self.ctx.conn, doctor_id, self.ctx.clock).map_err(|e| match e {
            StatsError::Database(DatabaseError::NotFound { entity_type, id }) => {
                RecordError::NotFound(format!("{entity_type} {id}"))
            }
            StatsError::InvalidArgument(msg) => RecordError::InvalidInput(msg),
            other => other.into(),
        })
    }

    pub fn check_stats(&self) -> Result<StatsConsistencyReport, RecordError> {
        Ok(stats::check_doctor_stats(self.ctx.conn)?)
    }

    pub fn repair_stats(&self) -> Result<usize, RecordError> {
        Ok(stats::repair_doctor_stats(self.ctx.conn, self.ctx.clock)?)
    }

    fn appointment(&self, id: &Uuid) -> Result<Appointment, RecordError> {
        repository::get_appointment(self.ctx.conn, id)?
            .ok_or_else(|| RecordError::NotFound(format!("Appointment {id}")))
    }
}

// ═══════════════════════════════════════════
// Validation
// ═══════════════════════════════════════════

fn normalize_comment(comment: Option<String>) -> Option<String> {
    comment
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
}

fn validate_score(field: &str, value: u8) -> Result<(), RecordError> {
    if (1..=5).contains(&value) {
        Ok(())
    } else {
        Err(RecordError::InvalidInput(format!(
            "{field} must be between 1 and 5, got {value}"
        )))
    }
}

fn validate_review(review: &Review) -> Result<(), RecordError> {
    validate_score("Rating", review.rating)?;
    for (field, value) in [
        ("Punctuality", review.punctuality),
        ("Communication", review.communication),
        ("Treatment", review.treatment),
    ] {
        if let Some(v) = value {
            validate_score(field, v)?;
        }
    }
    if let Some(comment) = &review.comment {
        if comment.chars().count() > MAX_REVIEW_COMMENT_LEN {
            return Err(RecordError::InvalidInput(format!(
                "Comment cannot exceed {MAX_REVIEW_COMMENT_LEN} characters"
            )));
        }
    }
    Ok(())
}

fn validate_fee(fee: f64) -> Result<(), RecordError> {
    if fee.is_finite() && fee >= 0.0 {
        Ok(())
    } else {
        Err(RecordError::InvalidInput(format!("Fee cannot be negative: {fee}")))
    }
}
