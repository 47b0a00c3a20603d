use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(Role {
    Patient => "patient",
    Doctor => "doctor",
    Admin => "admin",
});

str_enum!(UserStatus {
    Active => "active",
    Blocked => "blocked",
    Pending => "pending",
});

str_enum!(DoctorGender {
    Male => "male",
    Female => "female",
    Other => "other",
});

str_enum!(PatientGender {
    Male => "male",
    Female => "female",
    Other => "other",
    PreferNotToSay => "prefer not to say",
});

str_enum!(Weekday {
    Monday => "Monday",
    Tuesday => "Tuesday",
    Wednesday => "Wednesday",
    Thursday => "Thursday",
    Friday => "Friday",
    Saturday => "Saturday",
    Sunday => "Sunday",
});

str_enum!(BloodGroup {
    APositive => "A+",
    ANegative => "A-",
    BPositive => "B+",
    BNegative => "B-",
    AbPositive => "AB+",
    AbNegative => "AB-",
    OPositive => "O+",
    ONegative => "O-",
});

str_enum!(AppointmentStatus {
    Pending => "pending",
    Approved => "approved",
    Rescheduled => "rescheduled",
    Cancelled => "cancelled",
    Completed => "completed",
});

str_enum!(ConsultationType {
    Video => "video",
    Audio => "audio",
    Chat => "chat",
});

str_enum!(CancelledBy {
    Patient => "patient",
    Doctor => "doctor",
    Admin => "admin",
});

str_enum!(ConsultationStatus {
    Completed => "completed",
    Cancelled => "cancelled",
    NoShow => "no-show",
});

impl ConsultationStatus {
    /// Only completed consultations count toward a doctor's statistics.
    pub fn is_counted(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl Default for ConsultationStatus {
    fn default() -> Self {
        Self::Completed
    }
}

impl Default for AppointmentStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl Default for ConsultationType {
    fn default() -> Self {
        Self::Video
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn consultation_status_uses_hyphenated_no_show() {
        assert_eq!(ConsultationStatus::NoShow.as_str(), "no-show");
        assert_eq!(
            ConsultationStatus::from_str("no-show").unwrap(),
            ConsultationStatus::NoShow
        );
    }

    #[test]
    fn only_completed_consultations_are_counted() {
        assert!(ConsultationStatus::Completed.is_counted());
        assert!(!ConsultationStatus::Cancelled.is_counted());
        assert!(!ConsultationStatus::NoShow.is_counted());
    }

    #[test]
    fn unknown_role_is_rejected() {
        let err = Role::from_str("nurse").unwrap_err();
        match err {
            DatabaseError::InvalidEnum { field, value } => {
                assert_eq!(field, "Role");
                assert_eq!(value, "nurse");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn serde_uses_stored_spelling() {
        let json = serde_json::to_string(&BloodGroup::AbNegative).unwrap();
        assert_eq!(json, "\"AB-\"");
        let back: PatientGender = serde_json::from_str("\"prefer not to say\"").unwrap();
        assert_eq!(back, PatientGender::PreferNotToSay);
    }
}
