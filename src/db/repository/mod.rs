//! Repository layer: entity-scoped database operations.
//!
//! Free functions over a borrowed `Connection`, one sub-module per table.
//! The doctor statistics columns have dedicated writers in `doctor` and
//! are not touched by the profile update path.

mod appointment;
mod consultation;
mod doctor;
mod patient;
mod prescription;
mod review;
mod user;

use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::types::Type;
use rusqlite::Row;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use super::DatabaseError;

pub use appointment::*;
pub use consultation::*;
pub use doctor::*;
pub use patient::*;
pub use prescription::*;
pub use review::*;
pub use user::*;

pub(crate) const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";

pub(crate) fn format_datetime(dt: &NaiveDateTime) -> String {
    dt.format(DATETIME_FORMAT).to_string()
}

pub(crate) fn uuid_col(row: &Row, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn opt_uuid_col(row: &Row, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    Ok(row
        .get::<_, Option<String>>(idx)?
        .and_then(|s| Uuid::parse_str(&s).ok()))
}

pub(crate) fn datetime_col(row: &Row, idx: usize) -> rusqlite::Result<NaiveDateTime> {
    row.get::<_, String>(idx)
        .map(|s| NaiveDateTime::parse_from_str(&s, DATETIME_FORMAT).unwrap_or_default())
}

pub(crate) fn opt_datetime_col(row: &Row, idx: usize) -> rusqlite::Result<Option<NaiveDateTime>> {
    Ok(row
        .get::<_, Option<String>>(idx)?
        .and_then(|s| NaiveDateTime::parse_from_str(&s, DATETIME_FORMAT).ok()))
}

pub(crate) fn opt_date_col(row: &Row, idx: usize) -> rusqlite::Result<Option<NaiveDate>> {
    Ok(row
        .get::<_, Option<String>>(idx)?
        .and_then(|s| NaiveDate::parse_from_str(&s, DATE_FORMAT).ok()))
}

pub(crate) fn enum_col<T>(row: &Row, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = DatabaseError>,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e: DatabaseError| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn opt_enum_col<T>(row: &Row, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr<Err = DatabaseError>,
{
    match row.get::<_, Option<String>>(idx)? {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e: DatabaseError| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))),
        None => Ok(None),
    }
}

pub(crate) fn json_col<T: DeserializeOwned>(row: &Row, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Seed helpers shared by test modules across the crate.
#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::{NaiveDate, NaiveDateTime};
    use rusqlite::Connection;
    use uuid::Uuid;

    use super::*;
    use crate::models::enums::*;
    use crate::models::*;

    pub fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, DATETIME_FORMAT).unwrap()
    }

    pub fn make_user(conn: &Connection, role: Role) -> User {
        let id = Uuid::new_v4();
        let user = User {
            id,
            username: format!("user-{}", &id.to_string()[..8]),
            email: format!("{id}@clinic.test"),
            role,
            status: UserStatus::Active,
            is_active: true,
            is_verified: false,
            last_login: None,
            created_at: ts("2024-01-01 09:00:00"),
        };
        insert_user(conn, &user).unwrap();
        user
    }

    pub fn make_doctor(conn: &Connection) -> Doctor {
        make_doctor_with_fee(conn, 500.0)
    }

    pub fn make_doctor_with_fee(conn: &Connection, fee: f64) -> Doctor {
        let user = make_user(conn, Role::Doctor);
        let doctor = Doctor {
            id: Uuid::new_v4(),
            user_id: user.id,
            gender: DoctorGender::Female,
            specialization: "Cardiology".into(),
            qualifications: "MBBS, MD".into(),
            experience: 12,
            location: Location {
                city: "Pune".into(),
                address: Some("FC Road".into()),
            },
            consultation_fee: fee,
            availability_slots: vec![AvailabilitySlot {
                day: Weekday::Monday,
                start_time: "09:00".into(),
                end_time: "13:00".into(),
                is_available: true,
            }],
            doctor_image: DEFAULT_DOCTOR_IMAGE.into(),
            certificate_image: None,
            is_verified: true,
            is_active: true,
            stats: DoctorStats::empty(ts("2024-01-01 09:00:00")),
            created_at: ts("2024-01-01 09:00:00"),
        };
        insert_doctor(conn, &doctor).unwrap();
        doctor
    }

    pub fn make_patient(conn: &Connection) -> Patient {
        let user = make_user(conn, Role::Patient);
        let patient = Patient {
            id: Uuid::new_v4(),
            user_id: user.id,
            phone_number: Some("+91 98765 43210".into()),
            personal_info: PersonalInfo {
                dob: NaiveDate::from_ymd_opt(1990, 5, 17),
                gender: Some(PatientGender::Male),
                city: Some("Pune".into()),
                street: None,
                profile_image: None,
            },
            medical_info: MedicalInfo {
                blood_group: Some(BloodGroup::OPositive),
                allergies: vec!["Penicillin".into()],
                ..Default::default()
            },
            emergency_info: EmergencyInfo::default(),
            created_at: ts("2024-01-01 09:00:00"),
        };
        insert_patient(conn, &patient).unwrap();
        patient
    }

    pub fn make_appointment(
        conn: &Connection,
        doctor_id: Uuid,
        patient_id: Uuid,
        fee: Option<f64>,
    ) -> Appointment {
        let appointment = Appointment {
            id: Uuid::new_v4(),
            patient_id,
            doctor_id,
            appointment_date: ts("2024-02-10 10:00:00"),
            time_slot: "10:00 AM - 10:30 AM".into(),
            status: AppointmentStatus::Approved,
            consultation_type: ConsultationType::Video,
            reason_for_visit: "Chest discomfort".into(),
            doctor_notes: None,
            meeting_link: None,
            cancelled_by: None,
            cancellation_reason: None,
            consultation_fee: fee,
            created_at: ts("2024-02-01 08:00:00"),
        };
        insert_appointment(conn, &appointment).unwrap();
        appointment
    }
}
