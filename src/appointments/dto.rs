use serde::Deserialize;
use time::{macros::format_description, Date, OffsetDateTime};
use uuid::Uuid;

use super::repo_types::{AppointmentFilter, AppointmentStatus};
use crate::error::AppError;

/// Body of `POST /appointments` and `PUT /appointments/:id`.
#[derive(Debug, Deserialize)]
pub struct AppointmentRequest {
    pub patient_id: Uuid,
    pub professional_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub scheduled_at: OffsetDateTime,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

/// `GET /appointments?q=&status=&date=YYYY-MM-DD`. Empty values are ignored.
#[derive(Debug, Default, Deserialize)]
pub struct AppointmentQuery {
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
}

fn non_blank(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

impl AppointmentQuery {
    pub fn into_filter(self) -> Result<AppointmentFilter, AppError> {
        let mut errors = Vec::new();

        let status = match non_blank(self.status) {
            None => None,
            Some(s) => match s.parse::<AppointmentStatus>() {
                Ok(st) => Some(st),
                Err(_) => {
                    errors.push(format!("unknown status {s:?}"));
                    None
                }
            },
        };

        let date = match non_blank(self.date) {
            None => None,
            Some(d) => match Date::parse(&d, format_description!("[year]-[month]-[day]")) {
                Ok(day) => Some(day),
                Err(_) => {
                    errors.push(format!("invalid date {d:?}, expected YYYY-MM-DD"));
                    None
                }
            },
        };

        if !errors.is_empty() {
            return Err(AppError::Validation(errors));
        }
        Ok(AppointmentFilter {
            search: non_blank(self.q),
            status,
            date,
        })
    }
}
