// libs/appointment-cell/src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

// ==============================================================================
// PERSISTED APPOINTMENT RECORD
// ==============================================================================

/// A booking row as stored in the `appointments` collection.
///
/// Field names and the `date` (`D/M/YYYY`) and `time` (`hh:mm AM/PM`) formats are
/// shared with existing stored data and must not change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "optional_id_as_string")]
    pub id: Option<String>,
    pub doctor_id: String,
    pub doctor_name: String,
    pub doctor_email: String,
    pub doctor_image: String,
    pub patient_id: String,
    pub patient_name: String,
    pub patient_email: String,
    pub patient_image: String,
    pub date: String,
    pub time: String,
    pub status: AppointmentStatus,
    #[serde(default)]
    pub cancelled_by: String,
    #[serde(default)]
    pub cancel_reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Insert payload for a new booking. The store assigns `id` and `timestamp`.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewAppointment {
    pub doctor_id: String,
    pub doctor_name: String,
    pub doctor_email: String,
    pub doctor_image: String,
    pub patient_id: String,
    pub patient_name: String,
    pub patient_email: String,
    pub patient_image: String,
    pub date: String,
    pub time: String,
    pub status: AppointmentStatus,
    pub cancelled_by: String,
    pub cancel_reason: String,
}

impl NewAppointment {
    /// Builds the stored form once the store has assigned an id and a timestamp.
    pub fn into_stored(self, id: String, timestamp: DateTime<Utc>) -> Appointment {
        Appointment {
            id: Some(id),
            doctor_id: self.doctor_id,
            doctor_name: self.doctor_name,
            doctor_email: self.doctor_email,
            doctor_image: self.doctor_image,
            patient_id: self.patient_id,
            patient_name: self.patient_name,
            patient_email: self.patient_email,
            patient_image: self.patient_image,
            date: self.date,
            time: self.time,
            status: self.status,
            cancelled_by: self.cancelled_by,
            cancel_reason: self.cancel_reason,
            timestamp: Some(timestamp),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AppointmentStatus {
    Booked,
    Cancelled,
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Booked => write!(f, "Booked"),
            AppointmentStatus::Cancelled => write!(f, "Cancelled"),
        }
    }
}

// ==============================================================================
// PROFILES (READ-ONLY INPUTS)
// ==============================================================================

/// Raw `patientCapacity` as found on a doctor row.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PatientCapacity {
    Integer(i64),
    DecimalString(String),
    #[default]
    Missing,
}

impl PatientCapacity {
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Number(n) => match n.as_i64() {
                Some(i) => PatientCapacity::Integer(i),
                None => PatientCapacity::Missing,
            },
            Value::String(s) => PatientCapacity::DecimalString(s.clone()),
            _ => PatientCapacity::Missing,
        }
    }

    /// Normalizes to a capacity, falling back to `default` when missing,
    /// unparsable, negative or out of range.
    pub fn resolve(&self, default: u32) -> u32 {
        let parsed = match self {
            PatientCapacity::Integer(i) => Some(*i),
            PatientCapacity::DecimalString(s) => s.trim().parse::<i64>().ok(),
            PatientCapacity::Missing => None,
        };

        parsed
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or(default)
    }
}

impl<'de> Deserialize<'de> for PatientCapacity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<Value>::deserialize(deserializer)?;
        Ok(raw.as_ref().map(PatientCapacity::from_json).unwrap_or_default())
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DoctorProfile {
    #[serde(default, deserialize_with = "id_as_string")]
    pub id: String,
    pub full_name: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub image_url: Option<String>,
    pub profile_image_url: Option<String>,
    #[serde(default)]
    pub patient_capacity: PatientCapacity,
}

impl DoctorProfile {
    pub fn display_name(&self) -> String {
        first_present(&[&self.full_name, &self.name]).unwrap_or_default()
    }

    pub fn image(&self) -> String {
        first_present(&[&self.image_url, &self.profile_image_url]).unwrap_or_default()
    }
}

pub const UNKNOWN_PATIENT: &str = "Unknown Patient";

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PatientProfile {
    #[serde(default, deserialize_with = "id_as_string")]
    pub id: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub image_url: Option<String>,
    pub profile_image_url: Option<String>,
}

impl PatientProfile {
    /// `firstName lastName` when both are set, else `fullName`, else "Unknown Patient".
    pub fn display_name(&self) -> String {
        match (present(&self.first_name), present(&self.last_name)) {
            (Some(first), Some(last)) => format!("{} {}", first, last).trim().to_string(),
            _ => present(&self.full_name)
                .map(str::to_string)
                .unwrap_or_else(|| UNKNOWN_PATIENT.to_string()),
        }
    }

    pub fn image(&self) -> String {
        first_present(&[&self.image_url, &self.profile_image_url]).unwrap_or_default()
    }
}

fn present(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|s| !s.trim().is_empty())
}

fn first_present(fields: &[&Option<String>]) -> Option<String> {
    fields.iter().find_map(|f| present(f)).map(str::to_string)
}

fn id_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => s,
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    })
}

fn optional_id_as_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Null) | None => None,
        Some(other) => Some(other.to_string()),
    })
}

// ==============================================================================
// WORKFLOW TYPES
// ==============================================================================

/// The slot a patient asks for.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BookingRequest {
    pub doctor_id: String,
    pub date: String,
    pub time: String,
}

/// Identifies the contended `(doctorId, date)` counter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SlotKey {
    pub doctor_id: String,
    pub date: String,
}

impl SlotKey {
    pub fn new(doctor_id: impl Into<String>, date: impl Into<String>) -> Self {
        Self {
            doctor_id: doctor_id.into(),
            date: date.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CapacitySnapshot {
    pub doctor_id: String,
    pub date: String,
    pub booked: u64,
    pub capacity: u32,
    pub available: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingState {
    Idle,
    SlotSelected,
    Confirming,
    Submitting,
    Succeeded,
    RejectedCapacity,
    Failed,
}

impl BookingState {
    pub fn can_transition_to(&self, target: &BookingState) -> bool {
        use BookingState::*;
        match (self, target) {
            (Idle, Idle) | (Idle, SlotSelected) => true,
            (SlotSelected, SlotSelected) | (SlotSelected, Idle) => true,
            (Idle, Confirming) | (SlotSelected, Confirming) => true,
            (Confirming, SlotSelected) => true,
            (Confirming, Submitting) => true,
            (Submitting, Succeeded) | (Submitting, RejectedCapacity) | (Submitting, Failed) => true,
            (RejectedCapacity, SlotSelected) | (Failed, SlotSelected) => true,
            _ => false,
        }
    }
}

impl fmt::Display for BookingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            BookingState::Idle => "IDLE",
            BookingState::SlotSelected => "SLOT_SELECTED",
            BookingState::Confirming => "CONFIRMING",
            BookingState::Submitting => "SUBMITTING",
            BookingState::Succeeded => "SUCCEEDED",
            BookingState::RejectedCapacity => "REJECTED_CAPACITY",
            BookingState::Failed => "FAILED",
        };
        write!(f, "{}", label)
    }
}

/// What a confirmed submission ended in.
#[derive(Debug, Clone, PartialEq)]
pub enum ReservationOutcome {
    Booked(Appointment),
    CapacityReached { current: u64, max: u32 },
    Failed { message: String, kind: FailureKind },
}

/// Coarse cause of a failed submission, kept so callers can tell a bad
/// request from a backend outage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Invalid,
    DoctorNotFound,
    Identity,
    Backend,
}

impl From<&BookingError> for FailureKind {
    fn from(error: &BookingError) -> Self {
        match error {
            BookingError::Validation(_)
            | BookingError::InvalidState { .. }
            | BookingError::CapacityExceeded { .. } => FailureKind::Invalid,
            BookingError::DoctorNotFound(_) => FailureKind::DoctorNotFound,
            BookingError::Identity(_) => FailureKind::Identity,
            BookingError::Store(_) => FailureKind::Backend,
        }
    }
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store request failed: {0}")]
    Request(String),

    #[error("Failed to decode store response: {0}")]
    Decode(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug)]
pub enum BookingError {
    #[error("{0}")]
    Validation(String),

    #[error("Cannot {action} while booking is {from}")]
    InvalidState { from: BookingState, action: &'static str },

    #[error("Doctor is fully booked ({current}/{max})")]
    CapacityExceeded { current: u64, max: u32 },

    #[error("Doctor not found: {0}")]
    DoctorNotFound(String),

    #[error("Identity lookup failed: {0}")]
    Identity(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
