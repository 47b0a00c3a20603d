use std::collections::HashMap;

use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{datetime_col, enum_col, format_datetime, opt_uuid_col, uuid_col};
use crate::db::DatabaseError;
use crate::models::enums::ConsultationStatus;
use crate::models::*;

const CONSULTATION_COLUMNS: &str = "id, doctor_id, patient_id, appointment_id, prescription_id,
     status, consultation_date, duration_minutes, fees, notes, created_at";

fn consultation_from_row(row: &Row) -> rusqlite::Result<Consultation> {
    Ok(Consultation {
        id: uuid_col(row, 0)?,
        doctor_id: uuid_col(row, 1)?,
        patient_id: uuid_col(row, 2)?,
        appointment_id: uuid_col(row, 3)?,
        prescription_id: opt_uuid_col(row, 4)?,
        status: enum_col(row, 5)?,
        consultation_date: datetime_col(row, 6)?,
        duration_minutes: row.get(7)?,
        fees: row.get(8)?,
        notes: row.get(9)?,
        created_at: datetime_col(row, 10)?,
    })
}

pub fn insert_consultation(conn: &Connection, c: &Consultation) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO consultations (id, doctor_id, patient_id, appointment_id, prescription_id,
         status, consultation_date, duration_minutes, fees, notes, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            c.id.to_string(),
            c.doctor_id.to_string(),
            c.patient_id.to_string(),
            c.appointment_id.to_string(),
            c.prescription_id.map(|id| id.to_string()),
            c.status.as_str(),
            format_datetime(&c.consultation_date),
            c.duration_minutes,
            c.fees,
            c.notes,
            format_datetime(&c.created_at),
        ],
    )?;
    Ok(())
}

pub fn get_consultation(conn: &Connection, id: &Uuid) -> Result<Option<Consultation>, DatabaseError> {
    conn.query_row(
        &format!("SELECT {CONSULTATION_COLUMNS} FROM consultations WHERE id = ?1"),
        params![id.to_string()],
        consultation_from_row,
    )
    .optional()
    .map_err(DatabaseError::from)
}

/// At most one consultation exists per appointment.
pub fn get_consultation_by_appointment(
    conn: &Connection,
    appointment_id: &Uuid,
) -> Result<Option<Consultation>, DatabaseError> {
    conn.query_row(
        &format!("SELECT {CONSULTATION_COLUMNS} FROM consultations WHERE appointment_id = ?1"),
        params![appointment_id.to_string()],
        consultation_from_row,
    )
    .optional()
    .map_err(DatabaseError::from)
}

pub fn list_consultations(
    conn: &Connection,
    filter: &ConsultationFilter,
) -> Result<Vec<Consultation>, DatabaseError> {
    let mut sql = format!("SELECT {CONSULTATION_COLUMNS} FROM consultations WHERE 1=1");
    let mut values: Vec<String> = Vec::new();

    if let Some(doctor_id) = filter.doctor_id {
        values.push(doctor_id.to_string());
        sql.push_str(&format!(" AND doctor_id = ?{}", values.len()));
    }
    if let Some(patient_id) = filter.patient_id {
        values.push(patient_id.to_string());
        sql.push_str(&format!(" AND patient_id = ?{}", values.len()));
    }
    if let Some(status) = filter.status {
        values.push(status.as_str().to_string());
        sql.push_str(&format!(" AND status = ?{}", values.len()));
    }
    sql.push_str(" ORDER BY consultation_date DESC");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(values.iter()), consultation_from_row)?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

/// Set a consultation's status, returning the updated row (`None` if absent).
pub fn update_consultation_status(
    conn: &Connection,
    id: &Uuid,
    status: ConsultationStatus,
) -> Result<Option<Consultation>, DatabaseError> {
    conn.query_row(
        &format!(
            "UPDATE consultations SET status = ?2 WHERE id = ?1 RETURNING {CONSULTATION_COLUMNS}"
        ),
        params![id.to_string(), status.as_str()],
        consultation_from_row,
    )
    .optional()
    .map_err(DatabaseError::from)
}

/// Delete by id, returning the removed row (`None` when nothing was deleted).
pub fn delete_consultation(conn: &Connection, id: &Uuid) -> Result<Option<Consultation>, DatabaseError> {
    conn.query_row(
        &format!("DELETE FROM consultations WHERE id = ?1 RETURNING {CONSULTATION_COLUMNS}"),
        params![id.to_string()],
        consultation_from_row,
    )
    .optional()
    .map_err(DatabaseError::from)
}

pub fn count_completed_consultations(conn: &Connection, doctor_id: &Uuid) -> Result<i64, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM consultations WHERE doctor_id = ?1 AND status = 'completed'",
        params![doctor_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Completed-consultation counts grouped by doctor. Doctors without any
/// completed consultation are absent from the map.
pub fn completed_consultation_counts(conn: &Connection) -> Result<HashMap<Uuid, i64>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT doctor_id, COUNT(*) FROM consultations
         WHERE status = 'completed' GROUP BY doctor_id",
    )?;
    let rows = stmt.query_map([], |row| Ok((uuid_col(row, 0)?, row.get::<_, i64>(1)?)))?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::fixtures::*;
    use crate::db::sqlite::open_memory_database;

    fn make_consultation(
        conn: &Connection,
        doctor_id: Uuid,
        patient_id: Uuid,
        status: ConsultationStatus,
    ) -> Consultation {
        let appt = make_appointment(conn, doctor_id, patient_id, Some(300.0));
        let c = Consultation {
            id: Uuid::new_v4(),
            doctor_id,
            patient_id,
            appointment_id: appt.id,
            prescription_id: None,
            status,
            consultation_date: ts("2024-02-10 10:30:00"),
            duration_minutes: Some(25),
            fees: 300.0,
            notes: None,
            created_at: ts("2024-02-10 10:30:00"),
        };
        insert_consultation(conn, &c).unwrap();
        c
    }

    #[test]
    fn one_consultation_per_appointment() {
        let conn = open_memory_database().unwrap();
        let doctor = make_doctor(&conn);
        let patient = make_patient(&conn);
        let first = make_consultation(&conn, doctor.id, patient.id, ConsultationStatus::Completed);

        let duplicate = Consultation {
            id: Uuid::new_v4(),
            ..first.clone()
        };
        let err = insert_consultation(&conn, &duplicate).unwrap_err();
        assert!(err.is_constraint_violation());

        let found = get_consultation_by_appointment(&conn, &first.appointment_id)
            .unwrap()
            .unwrap();
        assert_eq!(found.id, first.id);
    }

    #[test]
    fn completed_counts_ignore_other_statuses() {
        let conn = open_memory_database().unwrap();
        let doctor = make_doctor(&conn);
        let patient = make_patient(&conn);
        make_consultation(&conn, doctor.id, patient.id, ConsultationStatus::Completed);
        make_consultation(&conn, doctor.id, patient.id, ConsultationStatus::Completed);
        make_consultation(&conn, doctor.id, patient.id, ConsultationStatus::NoShow);
        make_consultation(&conn, doctor.id, patient.id, ConsultationStatus::Cancelled);

        assert_eq!(count_completed_consultations(&conn, &doctor.id).unwrap(), 2);
        let grouped = completed_consultation_counts(&conn).unwrap();
        assert_eq!(grouped.get(&doctor.id), Some(&2));

        let no_shows = list_consultations(
            &conn,
            &ConsultationFilter {
                doctor_id: Some(doctor.id),
                status: Some(ConsultationStatus::NoShow),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(no_shows.len(), 1);
    }

    #[test]
    fn delete_returns_removed_row_once() {
        let conn = open_memory_database().unwrap();
        let doctor = make_doctor(&conn);
        let patient = make_patient(&conn);
        let c = make_consultation(&conn, doctor.id, patient.id, ConsultationStatus::Completed);

        let removed = delete_consultation(&conn, &c.id).unwrap().unwrap();
        assert_eq!(removed, c);
        assert!(delete_consultation(&conn, &c.id).unwrap().is_none());
    }

    #[test]
    fn status_update_returns_new_row() {
        let conn = open_memory_database().unwrap();
        let doctor = make_doctor(&conn);
        let patient = make_patient(&conn);
        let c = make_consultation(&conn, doctor.id, patient.id, ConsultationStatus::Completed);

        let updated = update_consultation_status(&conn, &c.id, ConsultationStatus::Cancelled)
            .unwrap()
            .unwrap();
        assert_eq!(updated.status, ConsultationStatus::Cancelled);
        assert!(update_consultation_status(&conn, &Uuid::new_v4(), ConsultationStatus::Completed)
            .unwrap()
            .is_none());
    }
}
