use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::ConsultationStatus;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Consultation {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub appointment_id: Uuid,
    pub prescription_id: Option<Uuid>,
    pub status: ConsultationStatus,
    pub consultation_date: NaiveDateTime,
    pub duration_minutes: Option<u32>,
    pub fees: f64,
    pub notes: Option<String>,
    pub created_at: NaiveDateTime,
}
