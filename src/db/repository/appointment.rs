use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{datetime_col, enum_col, format_datetime, opt_enum_col, uuid_col};
use crate::db::DatabaseError;
use crate::models::enums::{AppointmentStatus, CancelledBy};
use crate::models::*;

const APPOINTMENT_COLUMNS: &str = "id, patient_id, doctor_id, appointment_date, time_slot,
     status, consultation_type, reason_for_visit, doctor_notes, meeting_link, cancelled_by,
     cancellation_reason, consultation_fee, created_at";

fn appointment_from_row(row: &Row) -> rusqlite::Result<Appointment> {
    Ok(Appointment {
        id: uuid_col(row, 0)?,
        patient_id: uuid_col(row, 1)?,
        doctor_id: uuid_col(row, 2)?,
        appointment_date: datetime_col(row, 3)?,
        time_slot: row.get(4)?,
        status: enum_col(row, 5)?,
        consultation_type: enum_col(row, 6)?,
        reason_for_visit: row.get(7)?,
        doctor_notes: row.get(8)?,
        meeting_link: row.get(9)?,
        cancelled_by: opt_enum_col(row, 10)?,
        cancellation_reason: row.get(11)?,
        consultation_fee: row.get(12)?,
        created_at: datetime_col(row, 13)?,
    })
}

pub fn insert_appointment(conn: &Connection, appt: &Appointment) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO appointments (id, patient_id, doctor_id, appointment_date, time_slot,
         status, consultation_type, reason_for_visit, doctor_notes, meeting_link, cancelled_by,
         cancellation_reason, consultation_fee, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            appt.id.to_string(),
            appt.patient_id.to_string(),
            appt.doctor_id.to_string(),
            format_datetime(&appt.appointment_date),
            appt.time_slot,
            appt.status.as_str(),
            appt.consultation_type.as_str(),
            appt.reason_for_visit,
            appt.doctor_notes,
            appt.meeting_link,
            appt.cancelled_by.map(|c| c.as_str()),
            appt.cancellation_reason,
            appt.consultation_fee,
            format_datetime(&appt.created_at),
        ],
    )?;
    Ok(())
}

pub fn get_appointment(conn: &Connection, id: &Uuid) -> Result<Option<Appointment>, DatabaseError> {
    conn.query_row(
        &format!("SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE id = ?1"),
        params![id.to_string()],
        appointment_from_row,
    )
    .optional()
    .map_err(DatabaseError::from)
}

pub fn list_appointments_for_doctor(
    conn: &Connection,
    doctor_id: &Uuid,
) -> Result<Vec<Appointment>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {APPOINTMENT_COLUMNS} FROM appointments
         WHERE doctor_id = ?1 ORDER BY appointment_date ASC"
    ))?;
    let rows = stmt.query_map(params![doctor_id.to_string()], appointment_from_row)?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

/// Set status; cancellation details are written only for `Cancelled`.
pub fn update_appointment_status(
    conn: &Connection,
    id: &Uuid,
    status: AppointmentStatus,
    cancelled_by: Option<CancelledBy>,
    cancellation_reason: Option<&str>,
) -> Result<(), DatabaseError> {
    let (cancelled_by, reason) = if status == AppointmentStatus::Cancelled {
        (cancelled_by.map(|c| c.as_str()), cancellation_reason)
    } else {
        (None, None)
    };
    let changed = conn.execute(
        "UPDATE appointments SET status = ?2, cancelled_by = ?3, cancellation_reason = ?4
         WHERE id = ?1",
        params![id.to_string(), status.as_str(), cancelled_by, reason],
    )?;
    if changed == 0 {
        return Err(DatabaseError::not_found("Appointment", id));
    }
    Ok(())
}
