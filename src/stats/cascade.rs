//! A new prescription implies a completed consultation for its appointment.

use serde::Serialize;
use uuid::Uuid;

use super::hooks::ConsultationMutationHook;
use super::{HookFailure, HookKind, StatsContext, StatsError};
use crate::db::repository;
use crate::models::enums::ConsultationStatus;
use crate::models::{Consultation, Prescription};

/// Where an auto-created consultation's fee came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeSource {
    Appointment,
    /// Appointment exists but carries no fee; charged 0.
    AppointmentWithoutFee,
    /// Appointment lookup came back empty; charged 0.
    AppointmentMissing,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CascadeOutcome {
    Created {
        consultation: Consultation,
        fee_source: FeeSource,
    },
    /// A consultation already covers this appointment; nothing was written.
    AlreadyExists { consultation_id: Uuid },
    /// Reported to the `FailureReporter`; the prescription stays committed.
    Failed,
}

pub struct PrescriptionCascade<'c> {
    ctx: StatsContext<'c>,
}

impl<'c> PrescriptionCascade<'c> {
    pub fn new(ctx: StatsContext<'c>) -> Self {
        Self { ctx }
    }

    /// Ensure exactly one consultation exists for the prescription's
    /// appointment. Safe to call repeatedly.
    pub fn on_created(&self, prescription: &Prescription) -> CascadeOutcome {
        match self.ensure_consultation(prescription) {
            Ok(outcome) => outcome,
            Err(error) => {
                self.ctx.reporter.report(&HookFailure {
                    hook: HookKind::PrescriptionCascade,
                    doctor_id: Some(prescription.doctor_id),
                    appointment_id: Some(prescription.appointment_id),
                    error,
                });
                CascadeOutcome::Failed
            }
        }
    }

    fn ensure_consultation(&self, prescription: &Prescription) -> Result<CascadeOutcome, StatsError> {
        let conn = self.ctx.conn;

        if let Some(existing) =
            repository::get_consultation_by_appointment(conn, &prescription.appointment_id)?
        {
            tracing::debug!(
                appointment_id = %prescription.appointment_id,
                consultation_id = %existing.id,
                "Consultation already recorded for appointment"
            );
            return Ok(CascadeOutcome::AlreadyExists {
                consultation_id: existing.id,
            });
        }

        let (fees, fee_source) = self.derive_fee(&prescription.appointment_id)?;
        let now = self.ctx.clock.now();
        let consultation = Consultation {
            id: Uuid::new_v4(),
            doctor_id: prescription.doctor_id,
            patient_id: prescription.patient_id,
            appointment_id: prescription.appointment_id,
            prescription_id: Some(prescription.id),
            status: ConsultationStatus::Completed,
            consultation_date: now,
            duration_minutes: None,
            fees,
            notes: None,
            created_at: now,
        };

        if let Err(e) = repository::insert_consultation(conn, &consultation) {
            // Lost a race with another writer for the same appointment.
            if e.is_constraint_violation() {
                if let Some(existing) =
                    repository::get_consultation_by_appointment(conn, &prescription.appointment_id)?
                {
                    return Ok(CascadeOutcome::AlreadyExists {
                        consultation_id: existing.id,
                    });
                }
            }
            return Err(e.into());
        }

        tracing::info!(
            consultation_id = %consultation.id,
            prescription_id = %prescription.id,
            appointment_id = %prescription.appointment_id,
            fees,
            ?fee_source,
            "Consultation created from prescription"
        );

        ConsultationMutationHook::new(self.ctx).on_created(&consultation);

        Ok(CascadeOutcome::Created {
            consultation,
            fee_source,
        })
    }

    fn derive_fee(&self, appointment_id: &Uuid) -> Result<(f64, FeeSource), StatsError> {
        match repository::get_appointment(self.ctx.conn, appointment_id)? {
            Some(appt) => match appt.consultation_fee {
                Some(fee) => Ok((fee, FeeSource::Appointment)),
                None => Ok((0.0, FeeSource::AppointmentWithoutFee)),
            },
            None => {
                tracing::warn!(%appointment_id, "Appointment not found for fee lookup, using 0");
                Ok((0.0, FeeSource::AppointmentMissing))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rusqlite::Connection;

    use super::*;
    use crate::db::repository::fixtures::*;
    use crate::db::sqlite::open_memory_database;
    use crate::models::{Medicine, Prescription};
    use crate::stats::{FixedClock, RecordingReporter};

    fn prescription_for(conn: &Connection, appointment_id: Uuid, doctor_id: Uuid, patient_id: Uuid) -> Prescription {
        let p = Prescription {
            id: Uuid::new_v4(),
            appointment_id,
            doctor_id,
            patient_id,
            medicines: vec![Medicine {
                name: "Amlodipine".into(),
                dosage: "5mg".into(),
                duration: "60 days".into(),
                instructions: None,
            }],
            diagnosis: "Hypertension".into(),
            notes: None,
            lab_tests: vec![],
            follow_up_date: NaiveDate::from_ymd_opt(2024, 4, 10),
            created_at: ts("2024-02-10 10:45:00"),
        };
        repository::insert_prescription(conn, &p).unwrap();
        p
    }

    #[test]
    fn creates_completed_consultation_with_appointment_fee() {
        let conn = open_memory_database().unwrap();
        let clock = FixedClock::new(ts("2024-02-10 10:45:00"));
        let reporter = RecordingReporter::new();
        let cascade = PrescriptionCascade::new(StatsContext::new(&conn, &clock, &reporter));
        let doctor = make_doctor(&conn);
        let patient = make_patient(&conn);
        let appt = make_appointment(&conn, doctor.id, patient.id, Some(500.0));
        let p = prescription_for(&conn, appt.id, doctor.id, patient.id);

        let (consultation, fee_source) = match cascade.on_created(&p) {
            CascadeOutcome::Created { consultation, fee_source } => (consultation, fee_source),
            other => panic!("expected a new consultation, got {other:?}"),
        };
        assert_eq!(fee_source, FeeSource::Appointment);
        assert_eq!(consultation.fees, 500.0);
        assert_eq!(consultation.status, ConsultationStatus::Completed);
        assert_eq!(consultation.prescription_id, Some(p.id));

        let stored = repository::get_consultation_by_appointment(&conn, &appt.id)
            .unwrap()
            .unwrap();
        assert_eq!(stored, consultation);

        let stats = repository::get_doctor_stats(&conn, &doctor.id).unwrap().unwrap();
        assert_eq!(stats.number_of_consultations, 1);
        assert!(reporter.is_empty());
    }

    #[test]
    fn second_invocation_is_a_no_op() {
        let conn = open_memory_database().unwrap();
        let clock = FixedClock::new(ts("2024-02-10 10:45:00"));
        let reporter = RecordingReporter::new();
        let cascade = PrescriptionCascade::new(StatsContext::new(&conn, &clock, &reporter));
        let doctor = make_doctor(&conn);
        let patient = make_patient(&conn);
        let appt = make_appointment(&conn, doctor.id, patient.id, Some(500.0));
        let p = prescription_for(&conn, appt.id, doctor.id, patient.id);

        let first = cascade.on_created(&p);
        let second = cascade.on_created(&p);

        let CascadeOutcome::Created { consultation, .. } = first else {
            panic!("first cascade should create");
        };
        assert_eq!(
            second,
            CascadeOutcome::AlreadyExists {
                consultation_id: consultation.id
            }
        );
        let all = repository::list_consultations(&conn, &Default::default()).unwrap();
        assert_eq!(all.len(), 1);
        let stats = repository::get_doctor_stats(&conn, &doctor.id).unwrap().unwrap();
        assert_eq!(stats.number_of_consultations, 1);
    }

    #[test]
    fn appointment_without_fee_charges_zero() {
        let conn = open_memory_database().unwrap();
        let clock = FixedClock::new(ts("2024-02-10 10:45:00"));
        let reporter = RecordingReporter::new();
        let cascade = PrescriptionCascade::new(StatsContext::new(&conn, &clock, &reporter));
        let doctor = make_doctor(&conn);
        let patient = make_patient(&conn);
        let appt = make_appointment(&conn, doctor.id, patient.id, None);
        let p = prescription_for(&conn, appt.id, doctor.id, patient.id);

        match cascade.on_created(&p) {
            CascadeOutcome::Created { consultation, fee_source } => {
                assert_eq!(consultation.fees, 0.0);
                assert_eq!(fee_source, FeeSource::AppointmentWithoutFee);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn missing_appointment_defaults_fee_then_fails_on_reference() {
        // With foreign keys on, the consultation insert for a vanished
        // appointment is refused; the failure is reported, not raised.
        let conn = open_memory_database().unwrap();
        let clock = FixedClock::new(ts("2024-02-10 10:45:00"));
        let reporter = RecordingReporter::new();
        let cascade = PrescriptionCascade::new(StatsContext::new(&conn, &clock, &reporter));
        let doctor = make_doctor(&conn);
        let patient = make_patient(&conn);
        let orphan = Prescription {
            id: Uuid::new_v4(),
            appointment_id: Uuid::new_v4(),
            doctor_id: doctor.id,
            patient_id: patient.id,
            medicines: vec![],
            diagnosis: "Follow-up".into(),
            notes: None,
            lab_tests: vec![],
            follow_up_date: None,
            created_at: ts("2024-02-10 10:45:00"),
        };

        assert_eq!(cascade.on_created(&orphan), CascadeOutcome::Failed);
        let failures = reporter.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].hook, HookKind::PrescriptionCascade);
        assert_eq!(failures[0].appointment_id, Some(orphan.appointment_id));
        let stats = repository::get_doctor_stats(&conn, &doctor.id).unwrap().unwrap();
        assert_eq!(stats.number_of_consultations, 0);
    }

    #[test]
    fn existing_cancelled_consultation_blocks_cascade() {
        let conn = open_memory_database().unwrap();
        let clock = FixedClock::new(ts("2024-02-10 10:45:00"));
        let reporter = RecordingReporter::new();
        let cascade = PrescriptionCascade::new(StatsContext::new(&conn, &clock, &reporter));
        let doctor = make_doctor(&conn);
        let patient = make_patient(&conn);
        let appt = make_appointment(&conn, doctor.id, patient.id, Some(500.0));
        let existing = Consultation {
            id: Uuid::new_v4(),
            doctor_id: doctor.id,
            patient_id: patient.id,
            appointment_id: appt.id,
            prescription_id: None,
            status: ConsultationStatus::NoShow,
            consultation_date: ts("2024-02-10 10:00:00"),
            duration_minutes: None,
            fees: 500.0,
            notes: None,
            created_at: ts("2024-02-10 10:00:00"),
        };
        repository::insert_consultation(&conn, &existing).unwrap();
        let p = prescription_for(&conn, appt.id, doctor.id, patient.id);

        assert_eq!(
            cascade.on_created(&p),
            CascadeOutcome::AlreadyExists {
                consultation_id: existing.id
            }
        );
        let stats = repository::get_doctor_stats(&conn, &doctor.id).unwrap().unwrap();
        assert_eq!(stats.number_of_consultations, 0);
    }
}
