use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

/// Lifecycle of an appointment. `Scheduled` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    Scheduled,
    Cancelled,
    Completed,
}

impl AppointmentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::Completed => "completed",
        }
    }

    pub fn can_transition_to(self, to: AppointmentStatus) -> bool {
        matches!(
            (self, to),
            (AppointmentStatus::Scheduled, AppointmentStatus::Cancelled)
                | (AppointmentStatus::Scheduled, AppointmentStatus::Completed)
        )
    }

    pub fn is_terminal(self) -> bool {
        self != AppointmentStatus::Scheduled
    }

    /// Verb used in error messages ("can be cancelled").
    pub(crate) fn past_action(self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppointmentStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(AppointmentStatus::Scheduled),
            "cancelled" => Ok(AppointmentStatus::Cancelled),
            "completed" => Ok(AppointmentStatus::Completed),
            other => anyhow::bail!("unknown appointment status {other:?}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub professional_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub scheduled_at: OffsetDateTime,
    pub status: AppointmentStatus,
    pub cancellation_reason: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Raw `appointments` row; status is plain text in the table.
#[derive(Debug, FromRow)]
pub struct AppointmentRow {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub professional_id: Uuid,
    pub scheduled_at: OffsetDateTime,
    pub status: String,
    pub cancellation_reason: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl TryFrom<AppointmentRow> for Appointment {
    type Error = anyhow::Error;

    fn try_from(r: AppointmentRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            patient_id: r.patient_id,
            professional_id: r.professional_id,
            scheduled_at: r.scheduled_at,
            status: r.status.parse()?,
            cancellation_reason: r.cancellation_reason,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

/// Appointment joined with the names shown in listings.
#[derive(Debug, Clone, Serialize)]
pub struct AppointmentListItem {
    #[serde(flatten)]
    pub appointment: Appointment,
    pub patient_name: String,
    pub professional_name: String,
    pub specialty: String,
}

#[derive(Debug, FromRow)]
pub struct AppointmentListRow {
    #[sqlx(flatten)]
    pub appointment: AppointmentRow,
    pub patient_name: String,
    pub professional_name: String,
    pub specialty: String,
}

impl TryFrom<AppointmentListRow> for AppointmentListItem {
    type Error = anyhow::Error;

    fn try_from(r: AppointmentListRow) -> Result<Self, Self::Error> {
        Ok(Self {
            appointment: r.appointment.try_into()?,
            patient_name: r.patient_name,
            professional_name: r.professional_name,
            specialty: r.specialty,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct AppointmentFilter {
    /// Matched against patient and professional names.
    pub search: Option<String>,
    pub status: Option<AppointmentStatus>,
    /// Calendar day of `scheduled_at`, in UTC.
    pub date: Option<Date>,
}

#[cfg(test)]
mod status_tests {
    use super::*;

    #[test]
    fn only_scheduled_can_move() {
        use AppointmentStatus::*;
        assert!(Scheduled.can_transition_to(Cancelled));
        assert!(Scheduled.can_transition_to(Completed));
        assert!(!Scheduled.can_transition_to(Scheduled));
        for terminal in [Cancelled, Completed] {
            assert!(terminal.is_terminal());
            for to in [Scheduled, Cancelled, Completed] {
                assert!(!terminal.can_transition_to(to));
            }
        }
    }

    #[test]
    fn status_text_matches_storage() {
        for s in ["scheduled", "cancelled", "completed"] {
            let parsed: AppointmentStatus = s.parse().unwrap();
            assert_eq!(parsed.as_str(), s);
            assert_eq!(serde_json::to_string(&parsed).unwrap(), format!("\"{s}\""));
        }
        assert!("agendada".parse::<AppointmentStatus>().is_err());
    }
}
