use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{datetime_col, enum_col, format_datetime, opt_datetime_col, uuid_col};
use crate::db::DatabaseError;
use crate::models::*;

const USER_COLUMNS: &str =
    "id, username, email, role, status, is_active, is_verified, last_login, created_at";

fn user_from_row(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: uuid_col(row, 0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        role: enum_col(row, 3)?,
        status: enum_col(row, 4)?,
        is_active: row.get::<_, i32>(5)? != 0,
        is_verified: row.get::<_, i32>(6)? != 0,
        last_login: opt_datetime_col(row, 7)?,
        created_at: datetime_col(row, 8)?,
    })
}

pub fn insert_user(conn: &Connection, user: &User) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO users (id, username, email, role, status, is_active, is_verified,
         last_login, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            user.id.to_string(),
            user.username,
            user.email.to_lowercase(),
            user.role.as_str(),
            user.status.as_str(),
            user.is_active as i32,
            user.is_verified as i32,
            user.last_login.as_ref().map(format_datetime),
            format_datetime(&user.created_at),
        ],
    )?;
    Ok(())
}

pub fn get_user(conn: &Connection, id: &Uuid) -> Result<Option<User>, DatabaseError> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
        params![id.to_string()],
        user_from_row,
    )
    .optional()
    .map_err(DatabaseError::from)
}

/// Lookup is case-insensitive; emails are stored lower-cased.
pub fn get_user_by_email(conn: &Connection, email: &str) -> Result<Option<User>, DatabaseError> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
        params![email.trim().to_lowercase()],
        user_from_row,
    )
    .optional()
    .map_err(DatabaseError::from)
}
