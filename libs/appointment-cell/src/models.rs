// libs/appointment-cell/src/models.rs
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    /// The slot this appointment was booked against, when one was selected.
    /// Direct (slot-less) bookings leave this unset.
    pub slot_id: Option<Uuid>,
    /// Denormalized copy of the slot's date/start time at booking; the slot
    /// stays the source of truth for availability.
    pub appointment_date: NaiveDate,
    pub appointment_time: NaiveTime,
    pub status: AppointmentStatus,
    pub appointment_type: AppointmentType,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    /// Active appointments are the ones that hold a slot.
    pub fn is_active(&self) -> bool {
        matches!(self, AppointmentStatus::Pending | AppointmentStatus::Confirmed)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AppointmentStatus::Completed | AppointmentStatus::Cancelled)
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Pending => write!(f, "pending"),
            AppointmentStatus::Confirmed => write!(f, "confirmed"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentType {
    Unpaid,
    Paid,
}

impl fmt::Display for AppointmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentType::Unpaid => write!(f, "unpaid"),
            AppointmentType::Paid => write!(f, "paid"),
        }
    }
}

/// The three actions the state machine accepts. Every status change in the
/// system goes through one of these; nothing writes `status` directly.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransitionAction {
    Confirm,
    Cancel,
    Complete,
}

impl TransitionAction {
    pub fn target(&self) -> AppointmentStatus {
        match self {
            TransitionAction::Confirm => AppointmentStatus::Confirmed,
            TransitionAction::Cancel => AppointmentStatus::Cancelled,
            TransitionAction::Complete => AppointmentStatus::Completed,
        }
    }

    /// Statuses this action may be applied from.
    pub fn allowed_from(&self) -> &'static [AppointmentStatus] {
        match self {
            TransitionAction::Confirm => &[AppointmentStatus::Pending],
            TransitionAction::Cancel => {
                &[AppointmentStatus::Pending, AppointmentStatus::Confirmed]
            }
            TransitionAction::Complete => &[AppointmentStatus::Confirmed],
        }
    }
}

impl fmt::Display for TransitionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransitionAction::Confirm => write!(f, "confirm"),
            TransitionAction::Cancel => write!(f, "cancel"),
            TransitionAction::Complete => write!(f, "complete"),
        }
    }
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    /// Selected slot. When absent, `appointment_date`/`appointment_time`
    /// carry the requested window directly (the bypass path).
    pub slot_id: Option<Uuid>,
    pub appointment_date: Option<NaiveDate>,
    pub appointment_time: Option<NaiveTime>,
    pub reason: String,
    pub appointment_type: AppointmentType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingConfirmation {
    pub appointment: Appointment,
    /// Set when the doctor declared no availability at all and the request
    /// was accepted for manual review rather than rejected.
    pub manual_review: bool,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ListScope {
    #[default]
    Upcoming,
    Past,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Slot is no longer available")]
    SlotNoLongerAvailable,

    #[error("Doctor not found")]
    DoctorNotFound,

    #[error("Doctor is not approved for bookings")]
    DoctorNotApproved,

    #[error("Unauthorized access to appointment")]
    Unauthorized,

    #[error("Invalid transition: cannot {action} an appointment in status {from}")]
    InvalidTransition {
        from: AppointmentStatus,
        action: TransitionAction,
    },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}
