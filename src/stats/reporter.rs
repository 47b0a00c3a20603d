use std::sync::Mutex;

use serde::Serialize;
use uuid::Uuid;

use super::StatsError;

/// Which side effect failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HookKind {
    ReviewRating,
    ConsultationCount,
    PrescriptionCascade,
    StatsRefresh,
}

impl HookKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReviewRating => "review_rating",
            Self::ConsultationCount => "consultation_count",
            Self::PrescriptionCascade => "prescription_cascade",
            Self::StatsRefresh => "stats_refresh",
        }
    }
}

/// A hook failure. The triggering write has already committed.
#[derive(Debug)]
pub struct HookFailure {
    pub hook: HookKind,
    pub doctor_id: Option<Uuid>,
    pub appointment_id: Option<Uuid>,
    pub error: StatsError,
}

/// Sink for fire-and-forget failures. Implementations must not panic and
/// must not retry.
pub trait FailureReporter {
    fn report(&self, failure: &HookFailure);
}

/// Emits each failure as a structured `tracing` error event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl FailureReporter for TracingReporter {
    fn report(&self, failure: &HookFailure) {
        tracing::error!(
            hook = failure.hook.as_str(),
            doctor_id = ?failure.doctor_id,
            appointment_id = ?failure.appointment_id,
            error = %failure.error,
            "Doctor stats side effect failed; triggering write kept"
        );
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordedFailure {
    pub hook: HookKind,
    pub doctor_id: Option<Uuid>,
    pub appointment_id: Option<Uuid>,
    pub message: String,
}

/// Keeps failures in memory. Forwards to `TracingReporter` as well.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    failures: Mutex<Vec<RecordedFailure>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failures(&self) -> Vec<RecordedFailure> {
        self.failures.lock().map(|f| f.clone()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.lock().map(|f| f.is_empty()).unwrap_or(true)
    }
}

impl FailureReporter for RecordingReporter {
    fn report(&self, failure: &HookFailure) {
        TracingReporter.report(failure);
        if let Ok(mut failures) = self.failures.lock() {
            failures.push(RecordedFailure {
                hook: failure.hook,
                doctor_id: failure.doctor_id,
                appointment_id: failure.appointment_id,
                message: failure.error.to_string(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_reporter_keeps_message() {
        let reporter = RecordingReporter::new();
        let doctor_id = Uuid::new_v4();
        reporter.report(&HookFailure {
            hook: HookKind::ConsultationCount,
            doctor_id: Some(doctor_id),
            appointment_id: None,
            error: StatsError::InvalidArgument("bad".into()),
        });

        let failures = reporter.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].hook, HookKind::ConsultationCount);
        assert_eq!(failures[0].doctor_id, Some(doctor_id));
        assert!(failures[0].message.contains("bad"));
    }
}
