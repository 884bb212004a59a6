//! Appointment rule engine.
//!
//! Every check here is a pure function over snapshots the services already
//! loaded. Nothing in this module touches storage or the clock; `now` is
//! always passed in.

use std::fmt;

use thiserror::Error;
use time::{Duration, OffsetDateTime, UtcOffset};
use tracing::debug;
use uuid::Uuid;

use crate::appointments::repo_types::{Appointment, AppointmentStatus};

/// Two scheduled appointments of one professional closer than this conflict.
/// Both bounds are inclusive.
pub const DOUBLE_BOOKING_WINDOW: Duration = Duration::hours(1);

/// Minimum notice required to cancel.
pub const CANCELLATION_NOTICE: Duration = Duration::hours(2);

/// Entities whose deletion is blocked by dependent appointments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Patient,
    Professional,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Patient => f.write_str("patient"),
            EntityKind::Professional => f.write_str("professional"),
        }
    }
}

/// Business rule failures. All of them are recoverable and user-facing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleViolation {
    #[error("appointment time must be in the future")]
    InvalidTime,
    #[error("appointment time is out of range")]
    OutOfRange,
    #[error("professional already has an appointment scheduled at this time")]
    DoubleBooking { conflicting: Uuid },
    #[error("appointment is {status}; only scheduled appointments can be {action}")]
    NotScheduled {
        status: AppointmentStatus,
        action: &'static str,
    },
    #[error("cancellation must be made at least 2 hours in advance")]
    TooLate,
    #[error("cannot delete {0} with appointments")]
    HasDependents(EntityKind),
    #[error("email already registered")]
    DuplicateEmail,
}

/// A proposed slot for a new or edited appointment.
#[derive(Debug, Clone)]
pub struct ScheduleRequest {
    pub patient_id: Uuid,
    pub professional_id: Uuid,
    pub scheduled_at: OffsetDateTime,
    /// Set when editing, so the appointment never conflicts with itself.
    pub exclude_id: Option<Uuid>,
}

impl ScheduleRequest {
    pub fn window(&self) -> Result<(OffsetDateTime, OffsetDateTime), RuleViolation> {
        conflict_window(self.scheduled_at)
    }
}

/// Closed conflict window around `at`. Both bounds must stay representable
/// in UTC, which rules out the last hour of year 9999.
fn conflict_window(at: OffsetDateTime) -> Result<(OffsetDateTime, OffsetDateTime), RuleViolation> {
    let bound = |t: Option<OffsetDateTime>| {
        t.and_then(|t| t.checked_to_offset(UtcOffset::UTC))
            .ok_or(RuleViolation::OutOfRange)
    };
    Ok((
        bound(at.checked_sub(DOUBLE_BOOKING_WINDOW))?,
        bound(at.checked_add(DOUBLE_BOOKING_WINDOW))?,
    ))
}

/// The appointment must start strictly after `now` and leave room for its
/// conflict window.
pub fn validate_time(scheduled_at: OffsetDateTime, now: OffsetDateTime) -> Result<(), RuleViolation> {
    if scheduled_at <= now {
        return Err(RuleViolation::InvalidTime);
    }
    conflict_window(scheduled_at).map(|_| ())
}

pub fn validate_schedule(
    request: &ScheduleRequest,
    now: OffsetDateTime,
    existing: &[Appointment],
) -> Result<(), RuleViolation> {
    validate_time(request.scheduled_at, now)?;

    let (start, end) = request.window()?;
    let conflict = existing.iter().find(|a| {
        a.professional_id == request.professional_id
            && a.status == AppointmentStatus::Scheduled
            && Some(a.id) != request.exclude_id
            && a.scheduled_at >= start
            && a.scheduled_at <= end
    });

    if let Some(a) = conflict {
        debug!(
            professional_id = %request.professional_id,
            conflicting = %a.id,
            "double booking rejected"
        );
        return Err(RuleViolation::DoubleBooking { conflicting: a.id });
    }
    Ok(())
}

/// Editing is only allowed while the appointment is still open.
pub fn validate_reschedule(appointment: &Appointment) -> Result<(), RuleViolation> {
    require_scheduled(appointment, "edited")
}

pub fn validate_cancellation(
    appointment: &Appointment,
    now: OffsetDateTime,
) -> Result<(), RuleViolation> {
    ensure_transition(appointment, AppointmentStatus::Cancelled)?;
    if appointment.scheduled_at - now < CANCELLATION_NOTICE {
        return Err(RuleViolation::TooLate);
    }
    Ok(())
}

pub fn validate_completion(appointment: &Appointment) -> Result<(), RuleViolation> {
    ensure_transition(appointment, AppointmentStatus::Completed)
}

pub fn validate_deletion(
    kind: EntityKind,
    has_dependent_appointments: bool,
) -> Result<(), RuleViolation> {
    if has_dependent_appointments {
        return Err(RuleViolation::HasDependents(kind));
    }
    Ok(())
}

fn ensure_transition(
    appointment: &Appointment,
    to: AppointmentStatus,
) -> Result<(), RuleViolation> {
    if appointment.status.can_transition_to(to) {
        Ok(())
    } else {
        Err(RuleViolation::NotScheduled {
            status: appointment.status,
            action: to.past_action(),
        })
    }
}

fn require_scheduled(appointment: &Appointment, action: &'static str) -> Result<(), RuleViolation> {
    if appointment.status.is_terminal() {
        return Err(RuleViolation::NotScheduled {
            status: appointment.status,
            action,
        });
    }
    Ok(())
}
