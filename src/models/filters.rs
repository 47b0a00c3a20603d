use uuid::Uuid;

use super::enums::ConsultationStatus;

#[derive(Debug, Default)]
pub struct DoctorFilter {
    pub specialization: Option<String>,
    pub city: Option<String>,
    pub verified_only: bool,
    pub active_only: bool,
    pub min_rating: Option<f64>,
}

#[derive(Debug, Default)]
pub struct ConsultationFilter {
    pub doctor_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
    pub status: Option<ConsultationStatus>,
}

#[derive(Debug, Default)]
pub struct ReviewFilter {
    pub doctor_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
    pub min_rating: Option<u8>,
}
