use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{BloodGroup, PatientGender};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersonalInfo {
    pub dob: Option<NaiveDate>,
    pub gender: Option<PatientGender>,
    pub city: Option<String>,
    pub street: Option<String>,
    pub profile_image: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MedicalInfo {
    pub blood_group: Option<BloodGroup>,
    pub allergies: Vec<String>,
    pub chronic_diseases: Vec<String>,
    pub medications: Vec<String>,
    pub medical_notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmergencyInfo {
    pub contact_name: Option<String>,
    pub contact_phone: Option<String>,
    pub relation: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub id: Uuid,
    pub user_id: Uuid,
    pub phone_number: Option<String>,
    pub personal_info: PersonalInfo,
    pub medical_info: MedicalInfo,
    pub emergency_info: EmergencyInfo,
    pub created_at: NaiveDateTime,
}
