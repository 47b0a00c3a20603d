use std::collections::HashMap;

use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{datetime_col, format_datetime, uuid_col};
use crate::db::DatabaseError;
use crate::models::*;

const REVIEW_COLUMNS: &str = "id, doctor_id, patient_id, appointment_id, rating, comment,
     punctuality, communication, treatment, created_at, updated_at";

fn review_from_row(row: &Row) -> rusqlite::Result<Review> {
    Ok(Review {
        id: uuid_col(row, 0)?,
        doctor_id: uuid_col(row, 1)?,
        patient_id: uuid_col(row, 2)?,
        appointment_id: uuid_col(row, 3)?,
        rating: row.get(4)?,
        comment: row.get(5)?,
        punctuality: row.get(6)?,
        communication: row.get(7)?,
        treatment: row.get(8)?,
        created_at: datetime_col(row, 9)?,
        updated_at: datetime_col(row, 10)?,
    })
}

pub fn insert_review(conn: &Connection, review: &Review) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO reviews (id, doctor_id, patient_id, appointment_id, rating, comment,
         punctuality, communication, treatment, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            review.id.to_string(),
            review.doctor_id.to_string(),
            review.patient_id.to_string(),
            review.appointment_id.to_string(),
            review.rating,
            review.comment,
            review.punctuality,
            review.communication,
            review.treatment,
            format_datetime(&review.created_at),
            format_datetime(&review.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_review(conn: &Connection, id: &Uuid) -> Result<Option<Review>, DatabaseError> {
    conn.query_row(
        &format!("SELECT {REVIEW_COLUMNS} FROM reviews WHERE id = ?1"),
        params![id.to_string()],
        review_from_row,
    )
    .optional()
    .map_err(DatabaseError::from)
}

pub fn get_review_by_appointment(
    conn: &Connection,
    appointment_id: &Uuid,
) -> Result<Option<Review>, DatabaseError> {
    conn.query_row(
        &format!("SELECT {REVIEW_COLUMNS} FROM reviews WHERE appointment_id = ?1"),
        params![appointment_id.to_string()],
        review_from_row,
    )
    .optional()
    .map_err(DatabaseError::from)
}

/// List reviews, newest first.
pub fn list_reviews(conn: &Connection, filter: &ReviewFilter) -> Result<Vec<Review>, DatabaseError> {
    let mut sql = format!("SELECT {REVIEW_COLUMNS} FROM reviews WHERE 1=1");
    let mut values: Vec<String> = Vec::new();

    if let Some(doctor_id) = filter.doctor_id {
        values.push(doctor_id.to_string());
        sql.push_str(&format!(" AND doctor_id = ?{}", values.len()));
    }
    if let Some(patient_id) = filter.patient_id {
        values.push(patient_id.to_string());
        sql.push_str(&format!(" AND patient_id = ?{}", values.len()));
    }
    if let Some(min_rating) = filter.min_rating {
        sql.push_str(&format!(" AND rating >= {}", min_rating));
    }
    sql.push_str(" ORDER BY created_at DESC");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(values.iter()), review_from_row)?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

/// Rewrite the editable review fields, returning the updated row
/// (`None` if the review does not exist).
pub fn update_review(
    conn: &Connection,
    review: &Review,
    at: &NaiveDateTime,
) -> Result<Option<Review>, DatabaseError> {
    conn.query_row(
        &format!(
            "UPDATE reviews SET rating = ?2, comment = ?3, punctuality = ?4,
             communication = ?5, treatment = ?6, updated_at = ?7
             WHERE id = ?1 RETURNING {REVIEW_COLUMNS}"
        ),
        params![
            review.id.to_string(),
            review.rating,
            review.comment,
            review.punctuality,
            review.communication,
            review.treatment,
            format_datetime(at),
        ],
        review_from_row,
    )
    .optional()
    .map_err(DatabaseError::from)
}

/// Delete by id, returning the removed row (`None` when nothing was deleted).
pub fn delete_review(conn: &Connection, id: &Uuid) -> Result<Option<Review>, DatabaseError> {
    conn.query_row(
        &format!("DELETE FROM reviews WHERE id = ?1 RETURNING {REVIEW_COLUMNS}"),
        params![id.to_string()],
        review_from_row,
    )
    .optional()
    .map_err(DatabaseError::from)
}

/// Sum and count of ratings for one doctor.
pub fn rating_summary(conn: &Connection, doctor_id: &Uuid) -> Result<RatingSummary, DatabaseError> {
    let summary = conn.query_row(
        "SELECT COALESCE(SUM(rating), 0), COUNT(*) FROM reviews WHERE doctor_id = ?1",
        params![doctor_id.to_string()],
        |row| {
            Ok(RatingSummary {
                rating_sum: row.get(0)?,
                review_count: row.get(1)?,
            })
        },
    )?;
    Ok(summary)
}

/// Rating summaries grouped by doctor. Doctors without reviews are absent.
pub fn rating_summaries(conn: &Connection) -> Result<HashMap<Uuid, RatingSummary>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT doctor_id, SUM(rating), COUNT(*) FROM reviews GROUP BY doctor_id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            uuid_col(row, 0)?,
            RatingSummary {
                rating_sum: row.get(1)?,
                review_count: row.get(2)?,
            },
        ))
    })?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}
