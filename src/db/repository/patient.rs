use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{datetime_col, format_datetime, json_col, opt_date_col, opt_enum_col, uuid_col};
use crate::db::DatabaseError;
use crate::models::*;

const PATIENT_COLUMNS: &str = "id, user_id, phone_number, dob, gender, city, street,
     profile_image, blood_group, allergies, chronic_diseases, medications, medical_notes,
     emergency_contact_name, emergency_contact_phone, emergency_relation, created_at";

fn patient_from_row(row: &Row) -> rusqlite::Result<Patient> {
    Ok(Patient {
        id: uuid_col(row, 0)?,
        user_id: uuid_col(row, 1)?,
        phone_number: row.get(2)?,
        personal_info: PersonalInfo {
            dob: opt_date_col(row, 3)?,
            gender: opt_enum_col(row, 4)?,
            city: row.get(5)?,
            street: row.get(6)?,
            profile_image: row.get(7)?,
        },
        medical_info: MedicalInfo {
            blood_group: opt_enum_col(row, 8)?,
            allergies: json_col(row, 9)?,
            chronic_diseases: json_col(row, 10)?,
            medications: json_col(row, 11)?,
            medical_notes: row.get(12)?,
        },
        emergency_info: EmergencyInfo {
            contact_name: row.get(13)?,
            contact_phone: row.get(14)?,
            relation: row.get(15)?,
        },
        created_at: datetime_col(row, 16)?,
    })
}

pub fn insert_patient(conn: &Connection, patient: &Patient) -> Result<(), DatabaseError> {
    let info = &patient.personal_info;
    let medical = &patient.medical_info;
    let emergency = &patient.emergency_info;
    conn.execute(
        "INSERT INTO patients (id, user_id, phone_number, dob, gender, city, street,
         profile_image, blood_group, allergies, chronic_diseases, medications, medical_notes,
         emergency_contact_name, emergency_contact_phone, emergency_relation, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
        params![
            patient.id.to_string(),
            patient.user_id.to_string(),
            patient.phone_number,
            info.dob.map(|d| d.to_string()),
            info.gender.map(|g| g.as_str()),
            info.city,
            info.street,
            info.profile_image,
            medical.blood_group.map(|b| b.as_str()),
            serde_json::to_string(&medical.allergies)?,
            serde_json::to_string(&medical.chronic_diseases)?,
            serde_json::to_string(&medical.medications)?,
            medical.medical_notes,
            emergency.contact_name,
            emergency.contact_phone,
            emergency.relation,
            format_datetime(&patient.created_at),
        ],
    )?;
    Ok(())
}

pub fn get_patient(conn: &Connection, id: &Uuid) -> Result<Option<Patient>, DatabaseError> {
    conn.query_row(
        &format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE id = ?1"),
        params![id.to_string()],
        patient_from_row,
    )
    .optional()
    .map_err(DatabaseError::from)
}

pub fn get_patient_by_user(conn: &Connection, user_id: &Uuid) -> Result<Option<Patient>, DatabaseError> {
    conn.query_row(
        &format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE user_id = ?1"),
        params![user_id.to_string()],
        patient_from_row,
    )
    .optional()
    .map_err(DatabaseError::from)
}

pub fn update_patient(conn: &Connection, patient: &Patient) -> Result<(), DatabaseError> {
    let info = &patient.personal_info;
    let medical = &patient.medical_info;
    let emergency = &patient.emergency_info;
    let changed = conn.execute(
        "UPDATE patients SET phone_number = ?2, dob = ?3, gender = ?4, city = ?5, street = ?6,
         profile_image = ?7, blood_group = ?8, allergies = ?9, chronic_diseases = ?10,
         medications = ?11, medical_notes = ?12, emergency_contact_name = ?13,
         emergency_contact_phone = ?14, emergency_relation = ?15
         WHERE id = ?1",
        params![
            patient.id.to_string(),
            patient.phone_number,
            info.dob.map(|d| d.to_string()),
            info.gender.map(|g| g.as_str()),
            info.city,
            info.street,
            info.profile_image,
            medical.blood_group.map(|b| b.as_str()),
            serde_json::to_string(&medical.allergies)?,
            serde_json::to_string(&medical.chronic_diseases)?,
            serde_json::to_string(&medical.medications)?,
            medical.medical_notes,
            emergency.contact_name,
            emergency.contact_phone,
            emergency.relation,
        ],
    )?;
    if changed == 0 {
        return Err(DatabaseError::not_found("Patient", patient.id));
    }
    Ok(())
}

pub fn delete_patient_by_user(conn: &Connection, user_id: &Uuid) -> Result<Option<Patient>, DatabaseError> {
    conn.query_row(
        &format!("DELETE FROM patients WHERE user_id = ?1 RETURNING {PATIENT_COLUMNS}"),
        params![user_id.to_string()],
        patient_from_row,
    )
    .optional()
    .map_err(DatabaseError::from)
}

/// Doctors whose statistics count records owned by `patient_id`: any
/// review, or a completed consultation. Removing the patient cascades to
/// those rows, so each of these doctors needs a refresh afterwards.
pub fn doctors_with_patient_stats(conn: &Connection, patient_id: &Uuid) -> Result<Vec<Uuid>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT doctor_id FROM reviews WHERE patient_id = ?1
         UNION
         SELECT doctor_id FROM consultations WHERE patient_id = ?1 AND status = 'completed'",
    )?;
    let rows = stmt.query_map(params![patient_id.to_string()], |row| uuid_col(row, 0))?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::fixtures::*;
    use crate::db::sqlite::open_memory_database;
    use crate::models::enums::*;

    #[test]
    fn patient_roundtrips_nested_info() {
        let conn = open_memory_database().unwrap();
        let patient = make_patient(&conn);

        let loaded = get_patient(&conn, &patient.id).unwrap().unwrap();
        assert_eq!(loaded.personal_info, patient.personal_info);
        assert_eq!(loaded.medical_info.blood_group, Some(BloodGroup::OPositive));
        assert_eq!(loaded.medical_info.allergies, vec!["Penicillin".to_string()]);

        let by_user = get_patient_by_user(&conn, &patient.user_id).unwrap().unwrap();
        assert_eq!(by_user.id, patient.id);
    }

    #[test]
    fn patient_update_persists_emergency_contact() {
        let conn = open_memory_database().unwrap();
        let mut patient = make_patient(&conn);
        patient.emergency_info.contact_name = Some("Asha".into());
        patient.emergency_info.relation = Some("Sister".into());
        update_patient(&conn, &patient).unwrap();

        let loaded = get_patient(&conn, &patient.id).unwrap().unwrap();
        assert_eq!(loaded.emergency_info, patient.emergency_info);
    }

    #[test]
    fn doctors_with_patient_stats_skips_uncounted_consultations() {
        let conn = open_memory_database().unwrap();
        let patient = make_patient(&conn);
        let reviewed = make_doctor(&conn);
        let seen = make_doctor(&conn);
        let cancelled_only = make_doctor(&conn);
        assert!(doctors_with_patient_stats(&conn, &patient.id).unwrap().is_empty());

        let appt = make_appointment(&conn, reviewed.id, patient.id, None);
        conn.execute(
            "INSERT INTO reviews (id, doctor_id, patient_id, appointment_id, rating, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 4, '2024-01-01 00:00:00', '2024-01-01 00:00:00')",
            params![Uuid::new_v4().to_string(), reviewed.id.to_string(), patient.id.to_string(), appt.id.to_string()],
        )
        .unwrap();
        for (doctor, status) in [(&seen, "completed"), (&seen, "completed"), (&cancelled_only, "cancelled")] {
            let appt = make_appointment(&conn, doctor.id, patient.id, None);
            conn.execute(
                "INSERT INTO consultations (id, doctor_id, patient_id, appointment_id, status, consultation_date, fees, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, '2024-01-01 00:00:00', 0, '2024-01-01 00:00:00')",
                params![
                    Uuid::new_v4().to_string(),
                    doctor.id.to_string(),
                    patient.id.to_string(),
                    appt.id.to_string(),
                    status
                ],
            )
            .unwrap();
        }

        let mut doctors = doctors_with_patient_stats(&conn, &patient.id).unwrap();
        doctors.sort();
        let mut expected = vec![reviewed.id, seen.id];
        expected.sort();
        assert_eq!(doctors, expected);
    }
}
