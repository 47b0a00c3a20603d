use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{DoctorGender, Weekday};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub city: String,
    pub address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailabilitySlot {
    pub day: Weekday,
    pub start_time: String,
    pub end_time: String,
    #[serde(default = "default_available")]
    pub is_available: bool,
}

fn default_available() -> bool {
    true
}

/// Cached statistics derived from consultations and reviews.
///
/// Only the stats hooks, the refresh operation and drift repair write
/// these columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoctorStats {
    pub number_of_consultations: i64,
    pub rating: f64,
    pub total_reviews: i64,
    pub stats_last_updated: NaiveDateTime,
}

impl DoctorStats {
    pub fn empty(now: NaiveDateTime) -> Self {
        Self {
            number_of_consultations: 0,
            rating: 0.0,
            total_reviews: 0,
            stats_last_updated: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Doctor {
    pub id: Uuid,
    pub user_id: Uuid,
    pub gender: DoctorGender,
    pub specialization: String,
    pub qualifications: String,
    pub experience: u32,
    pub location: Location,
    pub consultation_fee: f64,
    pub availability_slots: Vec<AvailabilitySlot>,
    pub doctor_image: String,
    pub certificate_image: Option<String>,
    pub is_verified: bool,
    pub is_active: bool,
    pub stats: DoctorStats,
    pub created_at: NaiveDateTime,
}

pub const DEFAULT_DOCTOR_IMAGE: &str = "default-doctor.png";
