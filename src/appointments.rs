//! Appointment booking and status changes.
//!
//! The doctor's current fee is snapshotted onto the appointment at booking
//! so later fee edits do not change what an auto-created consultation
//! charges.

use chrono::NaiveDateTime;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::repository;
use crate::models::enums::{AppointmentStatus, CancelledBy, ConsultationType};
use crate::models::Appointment;
use crate::records::RecordError;
use crate::stats::Clock;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAppointment {
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub appointment_date: NaiveDateTime,
    pub time_slot: String,
    #[serde(default)]
    pub consultation_type: ConsultationType,
    pub reason_for_visit: String,
    /// Overrides the doctor's listed fee when set.
    pub consultation_fee: Option<f64>,
}

pub fn book_appointment(
    conn: &Connection,
    input: NewAppointment,
    clock: &dyn Clock,
) -> Result<Appointment, RecordError> {
    let doctor = repository::get_doctor(conn, &input.doctor_id)?
        .ok_or_else(|| RecordError::NotFound(format!("Doctor {}", input.doctor_id)))?;
    if !doctor.is_active {
        return Err(RecordError::Forbidden("Doctor is not accepting appointments".into()));
    }
    if repository::get_patient(conn, &input.patient_id)?.is_none() {
        return Err(RecordError::NotFound(format!("Patient {}", input.patient_id)));
    }

    let reason = input.reason_for_visit.trim();
    if reason.is_empty() {
        return Err(RecordError::InvalidInput("Reason for visit is required".into()));
    }
    if input.time_slot.trim().is_empty() {
        return Err(RecordError::InvalidInput("Time slot is required".into()));
    }
    let fee = input.consultation_fee.unwrap_or(doctor.consultation_fee);
    if !fee.is_finite() || fee < 0.0 {
        return Err(RecordError::InvalidInput(format!("Fee cannot be negative: {fee}")));
    }

    let appointment = Appointment {
        id: Uuid::new_v4(),
        patient_id: input.patient_id,
        doctor_id: doctor.id,
        appointment_date: input.appointment_date,
        time_slot: input.time_slot.trim().to_string(),
        status: AppointmentStatus::Pending,
        consultation_type: input.consultation_type,
        reason_for_visit: reason.to_string(),
        doctor_notes: None,
        meeting_link: None,
        cancelled_by: None,
        cancellation_reason: None,
        consultation_fee: Some(fee),
        created_at: clock.now(),
    };
    repository::insert_appointment(conn, &appointment)?;
    tracing::info!(
        appointment_id = %appointment.id,
        doctor_id = %appointment.doctor_id,
        fee,
        "Appointment booked"
    );
    Ok(appointment)
}

pub fn get_appointment(conn: &Connection, appointment_id: &Uuid) -> Result<Appointment, RecordError> {
    repository::get_appointment(conn, appointment_id)?
        .ok_or_else(|| RecordError::NotFound(format!("Appointment {appointment_id}")))
}

pub fn list_doctor_appointments(conn: &Connection, doctor_id: &Uuid) -> Result<Vec<Appointment>, RecordError> {
    Ok(repository::list_appointments_for_doctor(conn, doctor_id)?)
}

/// Move an appointment to `status`. Cancelling requires `cancelled_by`.
pub fn update_appointment_status(
    conn: &Connection,
    appointment_id: &Uuid,
    status: AppointmentStatus,
    cancelled_by: Option<CancelledBy>,
    cancellation_reason: Option<&str>,
) -> Result<Appointment, RecordError> {
    let current = get_appointment(conn, appointment_id)?;
    if status == AppointmentStatus::Cancelled && cancelled_by.is_none() {
        return Err(RecordError::InvalidInput(
            "Cancelling an appointment requires who cancelled it".into(),
        ));
    }
    let reason = cancellation_reason.map(str::trim).filter(|r| !r.is_empty());

    repository::update_appointment_status(conn, appointment_id, status, cancelled_by, reason)?;
    tracing::info!(
        %appointment_id,
        from = %current.status,
        to = %status,
        "Appointment status changed"
    );
    get_appointment(conn, appointment_id)
}
