// libs/appointment-cell/src/services/store.rs
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;

use crate::models::{
    Appointment, AppointmentStatus, DoctorProfile, NewAppointment, PatientProfile, SlotKey,
    StoreError,
};

/// Result of an insert that is conditional on remaining capacity.
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionalInsert {
    Inserted(Appointment),
    Full { current: u64 },
}

/// Narrow repository over the `doctors`, `patients` and `appointments` collections.
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    async fn doctor_profile(&self, doctor_id: &str) -> Result<Option<DoctorProfile>, StoreError>;

    async fn patient_profile(&self, patient_id: &str) -> Result<Option<PatientProfile>, StoreError>;

    /// Number of `Booked` appointments for the doctor on the date.
    async fn count_booked(&self, key: &SlotKey) -> Result<u64, StoreError>;

    async fn list_booked(&self, key: &SlotKey) -> Result<Vec<Appointment>, StoreError>;

    async fn insert_appointment(&self, record: &NewAppointment) -> Result<Appointment, StoreError>;

    /// Counts and inserts as one step, so concurrent callers cannot overshoot `max`.
    async fn insert_if_below_capacity(
        &self,
        record: &NewAppointment,
        max: u32,
    ) -> Result<ConditionalInsert, StoreError>;
}

// ==============================================================================
// SUPABASE (POSTGREST) STORE
// ==============================================================================

pub const DOCTORS_TABLE: &str = "doctors";
pub const PATIENTS_TABLE: &str = "patients";
pub const APPOINTMENTS_TABLE: &str = "appointments";
pub const CONDITIONAL_BOOKING_FN: &str = "book_appointment_if_capacity";

pub struct SupabaseAppointmentStore {
    supabase: Arc<SupabaseClient>,
    auth_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConditionalInsertRow {
    inserted: bool,
    current: u64,
    appointment: Option<Appointment>,
}

impl SupabaseAppointmentStore {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self {
            supabase,
            auth_token: None,
        }
    }

    /// Runs every query as the given caller so row-level security applies.
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    fn token(&self) -> Option<&str> {
        self.auth_token.as_deref()
    }

    fn booked_filter(key: &SlotKey) -> String {
        format!(
            "doctorId=eq.{}&date=eq.{}&status=eq.{}",
            urlencoding::encode(&key.doctor_id),
            urlencoding::encode(&key.date),
            AppointmentStatus::Booked
        )
    }

    async fn fetch_one<T>(&self, table: &str, id: &str) -> Result<Option<T>, StoreError>
    where
        T: serde::de::DeserializeOwned + Send,
    {
        let path = format!("/rest/v1/{}?id=eq.{}&limit=1", table, urlencoding::encode(id));

        let mut rows: Vec<T> = self
            .supabase
            .request(Method::GET, &path, self.token(), None)
            .await
            .map_err(|e| classify(&format!("Failed to load {} {}", table, id), e))?;

        if rows.is_empty() {
            debug!("No {} row with id {}", table, id);
            return Ok(None);
        }
        Ok(Some(rows.swap_remove(0)))
    }
}

fn classify(context: &str, error: anyhow::Error) -> StoreError {
    if let Some(req) = error.downcast_ref::<reqwest::Error>() {
        if req.is_connect() || req.is_timeout() {
            return StoreError::Unavailable(format!("{}: {}", context, req));
        }
        if req.is_decode() {
            return StoreError::Decode(format!("{}: {}", context, req));
        }
    }
    StoreError::Request(format!("{}: {}", context, error))
}

#[async_trait]
impl AppointmentStore for SupabaseAppointmentStore {
    async fn doctor_profile(&self, doctor_id: &str) -> Result<Option<DoctorProfile>, StoreError> {
        self.fetch_one(DOCTORS_TABLE, doctor_id).await
    }

    async fn patient_profile(&self, patient_id: &str) -> Result<Option<PatientProfile>, StoreError> {
        self.fetch_one(PATIENTS_TABLE, patient_id).await
    }

    async fn count_booked(&self, key: &SlotKey) -> Result<u64, StoreError> {
        let path = format!("/rest/v1/{}?select=id&{}", APPOINTMENTS_TABLE, Self::booked_filter(key));

        self.supabase
            .count(&path, self.token())
            .await
            .map_err(|e| classify("Failed to count booked appointments", e))
    }

    async fn list_booked(&self, key: &SlotKey) -> Result<Vec<Appointment>, StoreError> {
        let path = format!(
            "/rest/v1/{}?{}&order=timestamp.asc",
            APPOINTMENTS_TABLE,
            Self::booked_filter(key)
        );

        self.supabase
            .request(Method::GET, &path, self.token(), None)
            .await
            .map_err(|e| classify("Failed to list booked appointments", e))
    }

    async fn insert_appointment(&self, record: &NewAppointment) -> Result<Appointment, StoreError> {
        let row = serde_json::to_value(record)
            .map_err(|e| StoreError::Decode(format!("Failed to encode appointment: {}", e)))?;

        self.supabase
            .insert(APPOINTMENTS_TABLE, row, self.token())
            .await
            .map_err(|e| classify("Failed to insert appointment", e))
    }

    async fn insert_if_below_capacity(
        &self,
        record: &NewAppointment,
        max: u32,
    ) -> Result<ConditionalInsert, StoreError> {
        let args = json!({
            "appointment": record,
            "max_capacity": max,
        });

        let row: ConditionalInsertRow = self
            .supabase
            .rpc(CONDITIONAL_BOOKING_FN, args, self.token())
            .await
            .map_err(|e| classify("Conditional booking failed", e))?;

        match (row.inserted, row.appointment) {
            (true, Some(appointment)) => Ok(ConditionalInsert::Inserted(appointment)),
            (true, None) => Err(StoreError::Decode(
                "Conditional booking reported an insert without returning the row".to_string(),
            )),
            (false, _) => Ok(ConditionalInsert::Full { current: row.current }),
        }
    }
}

// ==============================================================================
// IN-MEMORY STORE
// ==============================================================================

#[derive(Default)]
struct InMemoryState {
    doctors: HashMap<String, DoctorProfile>,
    patients: HashMap<String, PatientProfile>,
    appointments: Vec<Appointment>,
}

impl InMemoryState {
    fn count_booked(&self, key: &SlotKey) -> u64 {
        self.appointments
            .iter()
            .filter(|a| is_booked_in(a, key))
            .count() as u64
    }

    fn insert(&mut self, record: &NewAppointment) -> Appointment {
        let stored = record
            .clone()
            .into_stored(Uuid::new_v4().to_string(), Utc::now());
        self.appointments.push(stored.clone());
        stored
    }
}

fn is_booked_in(appointment: &Appointment, key: &SlotKey) -> bool {
    appointment.doctor_id == key.doctor_id
        && appointment.date == key.date
        && appointment.status == AppointmentStatus::Booked
}

/// Process-local store for tests and local runs without a backend.
#[derive(Default)]
pub struct InMemoryAppointmentStore {
    state: RwLock<InMemoryState>,
}

impl InMemoryAppointmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_doctor(&self, doctor: DoctorProfile) {
        self.state.write().await.doctors.insert(doctor.id.clone(), doctor);
    }

    pub async fn add_patient(&self, patient: PatientProfile) {
        self.state.write().await.patients.insert(patient.id.clone(), patient);
    }

    /// Adds `count` placeholder bookings for the slot.
    pub async fn seed_booked(&self, key: &SlotKey, count: usize) {
        let mut state = self.state.write().await;
        for n in 0..count {
            let record = NewAppointment {
                doctor_id: key.doctor_id.clone(),
                doctor_name: String::new(),
                doctor_email: String::new(),
                doctor_image: String::new(),
                patient_id: format!("seed-{}", n),
                patient_name: format!("Seeded Patient {}", n),
                patient_email: String::new(),
                patient_image: String::new(),
                date: key.date.clone(),
                time: "09:00 AM".to_string(),
                status: AppointmentStatus::Booked,
                cancelled_by: String::new(),
                cancel_reason: String::new(),
            };
            state.insert(&record);
        }
    }

    pub async fn appointments(&self) -> Vec<Appointment> {
        self.state.read().await.appointments.clone()
    }
}

#[async_trait]
impl AppointmentStore for InMemoryAppointmentStore {
    async fn doctor_profile(&self, doctor_id: &str) -> Result<Option<DoctorProfile>, StoreError> {
        Ok(self.state.read().await.doctors.get(doctor_id).cloned())
    }

    async fn patient_profile(&self, patient_id: &str) -> Result<Option<PatientProfile>, StoreError> {
        Ok(self.state.read().await.patients.get(patient_id).cloned())
    }

    async fn count_booked(&self, key: &SlotKey) -> Result<u64, StoreError> {
        Ok(self.state.read().await.count_booked(key))
    }

    async fn list_booked(&self, key: &SlotKey) -> Result<Vec<Appointment>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .appointments
            .iter()
            .filter(|a| is_booked_in(a, key))
            .cloned()
            .collect())
    }

    async fn insert_appointment(&self, record: &NewAppointment) -> Result<Appointment, StoreError> {
        Ok(self.state.write().await.insert(record))
    }

    async fn insert_if_below_capacity(
        &self,
        record: &NewAppointment,
        max: u32,
    ) -> Result<ConditionalInsert, StoreError> {
        let mut state = self.state.write().await;
        let key = SlotKey::new(record.doctor_id.clone(), record.date.clone());
        let current = state.count_booked(&key);

        if current >= u64::from(max) {
            warn!("Conditional insert refused for doctor {} on {}: {}/{}",
                  key.doctor_id, key.date, current, max);
            return Ok(ConditionalInsert::Full { current });
        }

        Ok(ConditionalInsert::Inserted(state.insert(record)))
    }
}
