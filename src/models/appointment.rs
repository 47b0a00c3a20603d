use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{AppointmentStatus, CancelledBy, ConsultationType};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub appointment_date: NaiveDateTime,
    pub time_slot: String, // e.g. "10:00 AM - 10:30 AM"
    pub status: AppointmentStatus,
    pub consultation_type: ConsultationType,
    pub reason_for_visit: String,
    pub doctor_notes: Option<String>,
    pub meeting_link: Option<String>,
    pub cancelled_by: Option<CancelledBy>,
    pub cancellation_reason: Option<String>,
    /// Fee agreed at booking; feeds auto-created consultations.
    pub consultation_fee: Option<f64>,
    pub created_at: NaiveDateTime,
}
