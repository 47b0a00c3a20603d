use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{datetime_col, enum_col, format_datetime, json_col, uuid_col};
use crate::db::DatabaseError;
use crate::models::*;

const DOCTOR_COLUMNS: &str = "id, user_id, gender, specialization, qualifications, experience,
     city, address, consultation_fee, availability_slots, doctor_image, certificate_image,
     is_verified, is_active, number_of_consultations, rating, total_reviews,
     stats_last_updated, created_at";

fn doctor_from_row(row: &Row) -> rusqlite::Result<Doctor> {
    Ok(Doctor {
        id: uuid_col(row, 0)?,
        user_id: uuid_col(row, 1)?,
        gender: enum_col(row, 2)?,
        specialization: row.get(3)?,
        qualifications: row.get(4)?,
        experience: row.get(5)?,
        location: Location {
            city: row.get(6)?,
            address: row.get(7)?,
        },
        consultation_fee: row.get(8)?,
        availability_slots: json_col(row, 9)?,
        doctor_image: row.get(10)?,
        certificate_image: row.get(11)?,
        is_verified: row.get::<_, i32>(12)? != 0,
        is_active: row.get::<_, i32>(13)? != 0,
        stats: DoctorStats {
            number_of_consultations: row.get(14)?,
            rating: row.get(15)?,
            total_reviews: row.get(16)?,
            stats_last_updated: datetime_col(row, 17)?,
        },
        created_at: datetime_col(row, 18)?,
    })
}

pub fn insert_doctor(conn: &Connection, doctor: &Doctor) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO doctors (id, user_id, gender, specialization, qualifications, experience,
         city, address, consultation_fee, availability_slots, doctor_image, certificate_image,
         is_verified, is_active, number_of_consultations, rating, total_reviews,
         stats_last_updated, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)",
        params![
            doctor.id.to_string(),
            doctor.user_id.to_string(),
            doctor.gender.as_str(),
            doctor.specialization,
            doctor.qualifications,
            doctor.experience,
            doctor.location.city,
            doctor.location.address,
            doctor.consultation_fee,
            serde_json::to_string(&doctor.availability_slots)?,
            doctor.doctor_image,
            doctor.certificate_image,
            doctor.is_verified as i32,
            doctor.is_active as i32,
            doctor.stats.number_of_consultations,
            doctor.stats.rating,
            doctor.stats.total_reviews,
            format_datetime(&doctor.stats.stats_last_updated),
            format_datetime(&doctor.created_at),
        ],
    )?;
    Ok(())
}

pub fn get_doctor(conn: &Connection, id: &Uuid) -> Result<Option<Doctor>, DatabaseError> {
    conn.query_row(
        &format!("SELECT {DOCTOR_COLUMNS} FROM doctors WHERE id = ?1"),
        params![id.to_string()],
        doctor_from_row,
    )
    .optional()
    .map_err(DatabaseError::from)
}

pub fn get_doctor_by_user(conn: &Connection, user_id: &Uuid) -> Result<Option<Doctor>, DatabaseError> {
    conn.query_row(
        &format!("SELECT {DOCTOR_COLUMNS} FROM doctors WHERE user_id = ?1"),
        params![user_id.to_string()],
        doctor_from_row,
    )
    .optional()
    .map_err(DatabaseError::from)
}

/// List doctors, best rated first.
pub fn list_doctors(conn: &Connection, filter: &DoctorFilter) -> Result<Vec<Doctor>, DatabaseError> {
    let mut sql = format!("SELECT {DOCTOR_COLUMNS} FROM doctors WHERE 1=1");
    let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(ref specialization) = filter.specialization {
        values.push(Box::new(specialization.clone()));
        sql.push_str(&format!(" AND specialization = ?{}", values.len()));
    }
    if let Some(ref city) = filter.city {
        values.push(Box::new(city.clone()));
        sql.push_str(&format!(" AND city = ?{}", values.len()));
    }
    if let Some(min_rating) = filter.min_rating {
        values.push(Box::new(min_rating));
        sql.push_str(&format!(" AND rating >= ?{}", values.len()));
    }
    if filter.verified_only {
        sql.push_str(" AND is_verified = 1");
    }
    if filter.active_only {
        sql.push_str(" AND is_active = 1");
    }
    sql.push_str(" ORDER BY rating DESC, number_of_consultations DESC");

    let mut stmt = conn.prepare(&sql)?;
    let params: Vec<&dyn rusqlite::ToSql> = values.iter().map(|v| v.as_ref()).collect();
    let rows = stmt.query_map(params.as_slice(), doctor_from_row)?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

/// Write the editable profile columns. Statistics columns are left alone.
pub fn update_doctor_profile(conn: &Connection, doctor: &Doctor) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE doctors SET gender = ?2, specialization = ?3, qualifications = ?4,
         experience = ?5, city = ?6, address = ?7, consultation_fee = ?8,
         availability_slots = ?9, doctor_image = ?10, certificate_image = ?11
         WHERE id = ?1",
        params![
            doctor.id.to_string(),
            doctor.gender.as_str(),
            doctor.specialization,
            doctor.qualifications,
            doctor.experience,
            doctor.location.city,
            doctor.location.address,
            doctor.consultation_fee,
            serde_json::to_string(&doctor.availability_slots)?,
            doctor.doctor_image,
            doctor.certificate_image,
        ],
    )?;
    if changed == 0 {
        return Err(DatabaseError::not_found("Doctor", doctor.id));
    }
    Ok(())
}

/// Delete the doctor profile owned by `user_id`, returning the removed row.
pub fn delete_doctor_by_user(conn: &Connection, user_id: &Uuid) -> Result<Option<Doctor>, DatabaseError> {
    conn.query_row(
        &format!("DELETE FROM doctors WHERE user_id = ?1 RETURNING {DOCTOR_COLUMNS}"),
        params![user_id.to_string()],
        doctor_from_row,
    )
    .optional()
    .map_err(DatabaseError::from)
}

// ═══════════════════════════════════════════
// Statistics columns
// ═══════════════════════════════════════════

pub fn get_doctor_stats(conn: &Connection, id: &Uuid) -> Result<Option<DoctorStats>, DatabaseError> {
    conn.query_row(
        "SELECT number_of_consultations, rating, total_reviews, stats_last_updated
         FROM doctors WHERE id = ?1",
        params![id.to_string()],
        |row| {
            Ok(DoctorStats {
                number_of_consultations: row.get(0)?,
                rating: row.get(1)?,
                total_reviews: row.get(2)?,
                stats_last_updated: datetime_col(row, 3)?,
            })
        },
    )
    .optional()
    .map_err(DatabaseError::from)
}

/// Stored statistics for every doctor, keyed by doctor id.
pub fn list_doctor_stats(conn: &Connection) -> Result<Vec<(Uuid, DoctorStats)>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, number_of_consultations, rating, total_reviews, stats_last_updated
         FROM doctors ORDER BY id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            uuid_col(row, 0)?,
            DoctorStats {
                number_of_consultations: row.get(1)?,
                rating: row.get(2)?,
                total_reviews: row.get(3)?,
                stats_last_updated: datetime_col(row, 4)?,
            },
        ))
    })?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

pub fn write_rating_stats(
    conn: &Connection,
    doctor_id: &Uuid,
    rating: f64,
    total_reviews: i64,
    at: &NaiveDateTime,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE doctors SET rating = ?2, total_reviews = ?3, stats_last_updated = ?4
         WHERE id = ?1",
        params![doctor_id.to_string(), rating, total_reviews, format_datetime(at)],
    )?;
    if changed == 0 {
        return Err(DatabaseError::not_found("Doctor", doctor_id));
    }
    Ok(())
}

/// Atomically shift the consultation counter by `delta`.
///
/// The `number_of_consultations >= 0` check constraint rejects a decrement
/// below zero, which only happens when the counter has already drifted.
pub fn adjust_consultation_count(
    conn: &Connection,
    doctor_id: &Uuid,
    delta: i64,
    at: &NaiveDateTime,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE doctors SET number_of_consultations = number_of_consultations + ?2,
         stats_last_updated = ?3
         WHERE id = ?1",
        params![doctor_id.to_string(), delta, format_datetime(at)],
    )?;
    if changed == 0 {
        return Err(DatabaseError::not_found("Doctor", doctor_id));
    }
    Ok(())
}

pub fn write_doctor_stats(
    conn: &Connection,
    doctor_id: &Uuid,
    stats: &DoctorStats,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE doctors SET number_of_consultations = ?2, rating = ?3, total_reviews = ?4,
         stats_last_updated = ?5
         WHERE id = ?1",
        params![
            doctor_id.to_string(),
            stats.number_of_consultations,
            stats.rating,
            stats.total_reviews,
            format_datetime(&stats.stats_last_updated),
        ],
    )?;
    if changed == 0 {
        return Err(DatabaseError::not_found("Doctor", doctor_id));
    }
    Ok(())
}
