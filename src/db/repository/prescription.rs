use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{datetime_col, format_datetime, json_col, opt_date_col, uuid_col};
use crate::db::DatabaseError;
use crate::models::*;

const PRESCRIPTION_COLUMNS: &str = "id, appointment_id, doctor_id, patient_id, medicines,
     diagnosis, notes, lab_tests, follow_up_date, created_at";

fn prescription_from_row(row: &Row) -> rusqlite::Result<Prescription> {
    Ok(Prescription {
        id: uuid_col(row, 0)?,
        appointment_id: uuid_col(row, 1)?,
        doctor_id: uuid_col(row, 2)?,
        patient_id: uuid_col(row, 3)?,
        medicines: json_col(row, 4)?,
        diagnosis: row.get(5)?,
        notes: row.get(6)?,
        lab_tests: json_col(row, 7)?,
        follow_up_date: opt_date_col(row, 8)?,
        created_at: datetime_col(row, 9)?,
    })
}

pub fn insert_prescription(conn: &Connection, p: &Prescription) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO prescriptions (id, appointment_id, doctor_id, patient_id, medicines,
         diagnosis, notes, lab_tests, follow_up_date, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            p.id.to_string(),
            p.appointment_id.to_string(),
            p.doctor_id.to_string(),
            p.patient_id.to_string(),
            serde_json::to_string(&p.medicines)?,
            p.diagnosis,
            p.notes,
            serde_json::to_string(&p.lab_tests)?,
            p.follow_up_date.map(|d| d.to_string()),
            format_datetime(&p.created_at),
        ],
    )?;
    Ok(())
}

pub fn get_prescription(conn: &Connection, id: &Uuid) -> Result<Option<Prescription>, DatabaseError> {
    conn.query_row(
        &format!("SELECT {PRESCRIPTION_COLUMNS} FROM prescriptions WHERE id = ?1"),
        params![id.to_string()],
        prescription_from_row,
    )
    .optional()
    .map_err(DatabaseError::from)
}

pub fn get_prescription_by_appointment(
    conn: &Connection,
    appointment_id: &Uuid,
) -> Result<Option<Prescription>, DatabaseError> {
    conn.query_row(
        &format!("SELECT {PRESCRIPTION_COLUMNS} FROM prescriptions WHERE appointment_id = ?1"),
        params![appointment_id.to_string()],
        prescription_from_row,
    )
    .optional()
    .map_err(DatabaseError::from)
}

pub fn list_prescriptions_for_patient(
    conn: &Connection,
    patient_id: &Uuid,
) -> Result<Vec<Prescription>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PRESCRIPTION_COLUMNS} FROM prescriptions
         WHERE patient_id = ?1 ORDER BY created_at DESC"
    ))?;
    let rows = stmt.query_map(params![patient_id.to_string()], prescription_from_row)?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::db::repository::fixtures::*;
    use crate::db::sqlite::open_memory_database;

    #[test]
    fn prescription_roundtrips_medicines_and_rejects_second_for_appointment() {
        let conn = open_memory_database().unwrap();
        let doctor = make_doctor(&conn);
        let patient = make_patient(&conn);
        let appt = make_appointment(&conn, doctor.id, patient.id, Some(500.0));

        let p = Prescription {
            id: Uuid::new_v4(),
            appointment_id: appt.id,
            doctor_id: doctor.id,
            patient_id: patient.id,
            medicines: vec![Medicine {
                name: "Atorvastatin".into(),
                dosage: "10mg".into(),
                duration: "30 days".into(),
                instructions: Some("After dinner".into()),
            }],
            diagnosis: "Hyperlipidemia".into(),
            notes: None,
            lab_tests: vec!["Lipid panel".into()],
            follow_up_date: NaiveDate::from_ymd_opt(2024, 3, 10),
            created_at: ts("2024-02-10 10:40:00"),
        };
        insert_prescription(&conn, &p).unwrap();

        let loaded = get_prescription_by_appointment(&conn, &appt.id).unwrap().unwrap();
        assert_eq!(loaded, p);
        assert_eq!(get_prescription(&conn, &p.id).unwrap(), Some(p.clone()));
        assert_eq!(list_prescriptions_for_patient(&conn, &patient.id).unwrap().len(), 1);

        let second = Prescription { id: Uuid::new_v4(), ..p };
        assert!(insert_prescription(&conn, &second).unwrap_err().is_constraint_violation());
    }
}
