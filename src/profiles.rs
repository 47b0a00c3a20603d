//! Accounts plus doctor and patient profiles.
//!
//! Profile updates go through a field whitelist. The doctor statistics
//! columns are never writable from here.

use std::sync::LazyLock;

use regex::Regex;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::db::{repository, DatabaseError};
use crate::models::enums::{DoctorGender, Role, UserStatus};
use crate::models::{
    AvailabilitySlot, Doctor, DoctorFilter, DoctorStats, EmergencyInfo, Location, MedicalInfo,
    Patient, PersonalInfo, User, DEFAULT_DOCTOR_IMAGE,
};
use crate::stats::{self, Clock, HookFailure, HookKind, StatsContext};

static SLOT_TIME: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^([01]\d|2[0-3]):([0-5]\d)$").unwrap());

static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s.]+(?:\.[^@\s.]+)+$").unwrap());

#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

// ═══════════════════════════════════════════
// Inputs
// ═══════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    #[serde(default = "default_role")]
    pub role: Role,
}

fn default_role() -> Role {
    Role::Patient
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDoctorProfile {
    pub gender: DoctorGender,
    pub specialization: String,
    pub qualifications: String,
    pub experience: u32,
    pub location: Location,
    pub consultation_fee: f64,
    #[serde(default)]
    pub availability_slots: Vec<AvailabilitySlot>,
    pub doctor_image: Option<String>,
    pub certificate_image: Option<String>,
}

/// Editable doctor fields. `None` leaves the field as it is.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DoctorProfileUpdate {
    pub gender: Option<DoctorGender>,
    pub specialization: Option<String>,
    pub qualifications: Option<String>,
    pub experience: Option<u32>,
    pub location: Option<Location>,
    pub consultation_fee: Option<f64>,
    pub availability_slots: Option<Vec<AvailabilitySlot>>,
    pub doctor_image: Option<String>,
    pub certificate_image: Option<String>,
}

impl DoctorProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.gender.is_none()
            && self.specialization.is_none()
            && self.qualifications.is_none()
            && self.experience.is_none()
            && self.location.is_none()
            && self.consultation_fee.is_none()
            && self.availability_slots.is_none()
            && self.doctor_image.is_none()
            && self.certificate_image.is_none()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewPatientProfile {
    pub phone_number: Option<String>,
    #[serde(default)]
    pub personal_info: PersonalInfo,
    #[serde(default)]
    pub medical_info: MedicalInfo,
    #[serde(default)]
    pub emergency_info: EmergencyInfo,
}

/// Patients may edit contact and personal details. Medical info is set at
/// creation only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatientProfileUpdate {
    pub phone_number: Option<String>,
    pub personal_info: Option<PersonalInfo>,
    pub emergency_info: Option<EmergencyInfo>,
}

impl PatientProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.phone_number.is_none() && self.personal_info.is_none() && self.emergency_info.is_none()
    }
}

// ═══════════════════════════════════════════
// Users
// ═══════════════════════════════════════════

pub fn register_user(conn: &Connection, input: NewUser, clock: &dyn Clock) -> Result<User, ProfileError> {
    let username = input.username.trim();
    if username.is_empty() {
        return Err(ProfileError::InvalidInput("Username is required".into()));
    }
    let email = input.email.trim().to_lowercase();
    if !is_plausible_email(&email) {
        return Err(ProfileError::InvalidInput(format!("Invalid email address: {email}")));
    }
    if repository::get_user_by_email(conn, &email)?.is_some() {
        return Err(ProfileError::AlreadyExists(format!("User with email {email}")));
    }

    let user = User {
        id: Uuid::new_v4(),
        username: username.to_string(),
        email,
        role: input.role,
        status: UserStatus::Active,
        is_active: true,
        is_verified: false,
        last_login: None,
        created_at: clock.now(),
    };
    repository::insert_user(conn, &user)?;
    tracing::info!(user_id = %user.id, role = %user.role, "User registered");
    Ok(user)
}

fn is_plausible_email(email: &str) -> bool {
    EMAIL.is_match(email)
}

fn require_user(conn: &Connection, user_id: &Uuid) -> Result<User, ProfileError> {
    repository::get_user(conn, user_id)?.ok_or_else(|| ProfileError::NotFound(format!("User {user_id}")))
}

// ═══════════════════════════════════════════
// Doctors
// ═══════════════════════════════════════════

pub fn create_doctor_profile(
    conn: &Connection,
    user_id: &Uuid,
    input: NewDoctorProfile,
    clock: &dyn Clock,
) -> Result<Doctor, ProfileError> {
    let user = require_user(conn, user_id)?;
    if user.role != Role::Doctor {
        return Err(ProfileError::Forbidden("Only doctors can create doctor profile".into()));
    }
    if repository::get_doctor_by_user(conn, user_id)?.is_some() {
        return Err(ProfileError::AlreadyExists(
            "Doctor profile already exists for this user".into(),
        ));
    }
    if input.availability_slots.is_empty() {
        tracing::debug!(%user_id, "Doctor profile created without availability slots");
    }

    let now = clock.now();
    let doctor = Doctor {
        id: Uuid::new_v4(),
        user_id: *user_id,
        gender: input.gender,
        specialization: input.specialization.trim().to_string(),
        qualifications: input.qualifications.trim().to_string(),
        experience: input.experience,
        location: trim_location(input.location),
        consultation_fee: input.consultation_fee,
        availability_slots: input.availability_slots,
        doctor_image: input.doctor_image.unwrap_or_else(|| DEFAULT_DOCTOR_IMAGE.to_string()),
        certificate_image: input.certificate_image,
        is_verified: false,
        is_active: true,
        stats: DoctorStats::empty(now),
        created_at: now,
    };
    validate_doctor(&doctor)?;

    repository::insert_doctor(conn, &doctor)?;
    tracing::info!(doctor_id = %doctor.id, %user_id, "Doctor profile created");
    Ok(doctor)
}

pub fn get_doctor(conn: &Connection, doctor_id: &Uuid) -> Result<Doctor, ProfileError> {
    repository::get_doctor(conn, doctor_id)?
        .ok_or_else(|| ProfileError::NotFound(format!("Doctor {doctor_id}")))
}

pub fn get_doctor_by_user(conn: &Connection, user_id: &Uuid) -> Result<Doctor, ProfileError> {
    repository::get_doctor_by_user(conn, user_id)?.ok_or_else(|| {
        ProfileError::NotFound("Doctor profile not found. Please complete your profile setup.".into())
    })
}

pub fn search_doctors(conn: &Connection, filter: &DoctorFilter) -> Result<Vec<Doctor>, ProfileError> {
    Ok(repository::list_doctors(conn, filter)?)
}

pub fn update_doctor_profile(
    conn: &Connection,
    user_id: &Uuid,
    changes: DoctorProfileUpdate,
) -> Result<Doctor, ProfileError> {
    if changes.is_empty() {
        return Err(ProfileError::InvalidInput("No valid fields provided for update".into()));
    }
    let mut doctor = get_doctor_by_user(conn, user_id)?;

    if let Some(gender) = changes.gender {
        doctor.gender = gender;
    }
    if let Some(specialization) = changes.specialization {
        doctor.specialization = specialization.trim().to_string();
    }
    if let Some(qualifications) = changes.qualifications {
        doctor.qualifications = qualifications.trim().to_string();
    }
    if let Some(experience) = changes.experience {
        doctor.experience = experience;
    }
    if let Some(location) = changes.location {
        doctor.location = trim_location(location);
    }
    if let Some(fee) = changes.consultation_fee {
        doctor.consultation_fee = fee;
    }
    if let Some(slots) = changes.availability_slots {
        doctor.availability_slots = slots;
    }
    if let Some(image) = changes.doctor_image {
        doctor.doctor_image = image;
    }
    if let Some(certificate) = changes.certificate_image {
        doctor.certificate_image = Some(certificate);
    }
    validate_doctor(&doctor)?;

    repository::update_doctor_profile(conn, &doctor)?;
    tracing::info!(doctor_id = %doctor.id, "Doctor profile updated");
    Ok(doctor)
}

pub fn delete_doctor_profile(conn: &Connection, user_id: &Uuid) -> Result<Doctor, ProfileError> {
    let removed = repository::delete_doctor_by_user(conn, user_id)?
        .ok_or_else(|| ProfileError::NotFound("Doctor profile not found".into()))?;
    tracing::info!(doctor_id = %removed.id, %user_id, "Doctor profile deleted");
    Ok(removed)
}

fn trim_location(location: Location) -> Location {
    Location {
        city: location.city.trim().to_string(),
        address: location
            .address
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty()),
    }
}

fn validate_doctor(doctor: &Doctor) -> Result<(), ProfileError> {
    required("Specialization", &doctor.specialization)?;
    required("Qualifications", &doctor.qualifications)?;
    required("City", &doctor.location.city)?;
    if !doctor.consultation_fee.is_finite() || doctor.consultation_fee < 0.0 {
        return Err(ProfileError::InvalidInput("Fee cannot be negative".into()));
    }
    for slot in &doctor.availability_slots {
        validate_slot(slot)?;
    }
    Ok(())
}

fn required(field: &str, value: &str) -> Result<(), ProfileError> {
    if value.is_empty() {
        return Err(ProfileError::InvalidInput(format!("{field} is required")));
    }
    Ok(())
}

/// Parse `HH:mm` (24-hour) into minutes since midnight.
fn parse_hh_mm(raw: &str) -> Option<u32> {
    let caps = SLOT_TIME.captures(raw)?;
    let (h, m): (u32, u32) = (caps[1].parse().ok()?, caps[2].parse().ok()?);
    Some(h * 60 + m)
}

fn validate_slot(slot: &AvailabilitySlot) -> Result<(), ProfileError> {
    let start = parse_hh_mm(&slot.start_time).ok_or_else(|| {
        ProfileError::InvalidInput(format!("Invalid time format HH:mm: {}", slot.start_time))
    })?;
    let end = parse_hh_mm(&slot.end_time).ok_or_else(|| {
        ProfileError::InvalidInput(format!("Invalid time format HH:mm: {}", slot.end_time))
    })?;
    if start >= end {
        return Err(ProfileError::InvalidInput(format!(
            "End time must be after start time on {}",
            slot.day
        )));
    }
    Ok(())
}

// ═══════════════════════════════════════════
// Patients
// ═══════════════════════════════════════════

pub fn create_patient_profile(
    conn: &Connection,
    user_id: &Uuid,
    input: NewPatientProfile,
    clock: &dyn Clock,
) -> Result<Patient, ProfileError> {
    let user = require_user(conn, user_id)?;
    if user.role != Role::Patient {
        return Err(ProfileError::Forbidden("Only patients can create patient profile".into()));
    }
    if repository::get_patient_by_user(conn, user_id)?.is_some() {
        return Err(ProfileError::AlreadyExists(
            "Patient profile already exists for this user".into(),
        ));
    }

    let patient = Patient {
        id: Uuid::new_v4(),
        user_id: *user_id,
        phone_number: input.phone_number,
        personal_info: input.personal_info,
        medical_info: input.medical_info,
        emergency_info: input.emergency_info,
        created_at: clock.now(),
    };
    repository::insert_patient(conn, &patient)?;
    tracing::info!(patient_id = %patient.id, %user_id, "Patient profile created");
    Ok(patient)
}

pub fn get_patient(conn: &Connection, patient_id: &Uuid) -> Result<Patient, ProfileError> {
    repository::get_patient(conn, patient_id)?
        .ok_or_else(|| ProfileError::NotFound(format!("Patient {patient_id}")))
}

pub fn get_patient_by_user(conn: &Connection, user_id: &Uuid) -> Result<Patient, ProfileError> {
    repository::get_patient_by_user(conn, user_id)?.ok_or_else(|| {
        ProfileError::NotFound("Patient profile not found. Please complete your profile setup.".into())
    })
}

pub fn update_patient_profile(
    conn: &Connection,
    user_id: &Uuid,
    changes: PatientProfileUpdate,
) -> Result<Patient, ProfileError> {
    if changes.is_empty() {
        return Err(ProfileError::InvalidInput("No valid fields provided for update".into()));
    }
    let mut patient = get_patient_by_user(conn, user_id)?;

    if let Some(phone) = changes.phone_number {
        patient.phone_number = Some(phone);
    }
    if let Some(info) = changes.personal_info {
        patient.personal_info = info;
    }
    if let Some(emergency) = changes.emergency_info {
        patient.emergency_info = emergency;
    }
    repository::update_patient(conn, &patient)?;
    tracing::info!(patient_id = %patient.id, "Patient profile updated");
    Ok(patient)
}

/// Delete a patient profile along with its appointments, consultations and
/// reviews.
///
/// Doctors who had counted any of those rows are refreshed once the delete
/// commits. A failed refresh goes to the reporter and leaves the delete in
/// place.
pub fn delete_patient_profile(ctx: StatsContext<'_>, user_id: &Uuid) -> Result<Patient, ProfileError> {
    let tx = Transaction::new_unchecked(ctx.conn, TransactionBehavior::Immediate)
        .map_err(DatabaseError::from)?;
    let patient = repository::get_patient_by_user(&tx, user_id)?
        .ok_or_else(|| ProfileError::NotFound("Patient profile not found".into()))?;
    let affected = repository::doctors_with_patient_stats(&tx, &patient.id)?;
    let removed = repository::delete_patient_by_user(&tx, user_id)?
        .ok_or_else(|| ProfileError::NotFound("Patient profile not found".into()))?;
    tx.commit().map_err(DatabaseError::from)?;
    tracing::info!(
        patient_id = %removed.id,
        %user_id,
        doctors = affected.len(),
        "Patient profile deleted"
    );

    for doctor_id in affected {
        if let Err(error) = stats::refresh_doctor_stats_for(ctx.conn, &doctor_id, ctx.clock) {
            ctx.reporter.report(&HookFailure {
                hook: HookKind::StatsRefresh,
                doctor_id: Some(doctor_id),
                appointment_id: None,
                error,
            });
        }
    }
    Ok(removed)
}
