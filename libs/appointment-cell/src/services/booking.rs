// libs/appointment-cell/src/services/booking.rs
use std::sync::Arc;

use tracing::{debug, error, info, instrument, warn};

use shared_config::{AppConfig, CapacityGuard};
use shared_database::supabase::SupabaseClient;
use shared_models::auth::User;

use crate::models::{
    Appointment, AppointmentStatus, BookingError, BookingRequest, BookingState,
    CapacitySnapshot, FailureKind, NewAppointment, PatientProfile, ReservationOutcome, SlotKey,
};
use crate::services::capacity::CapacityPolicy;
use crate::services::identity::{IdentityProvider, StaticIdentity};
use crate::services::notification::{
    run_post_commit_hooks, NotifyDoctorHook, PostCommitHook, SupabaseNotificationDispatcher,
};
use crate::services::slot::{normalize_date_label, ClinicHours};
use crate::services::store::{AppointmentStore, ConditionalInsert, SupabaseAppointmentStore};

pub const CONFIRMATION_NOTICE: &str = "Appointments are first-come-first-served. \
Your time may shift slightly depending on the doctor's schedule.";
pub const SUCCESS_MESSAGE: &str = "Appointment booked successfully";
pub const SELECT_DATE_MESSAGE: &str = "Please select a date";
pub const SELECT_TIME_MESSAGE: &str = "Please select a time";

pub fn capacity_message(date: &str, current: u64, max: u32) -> String {
    format!(
        "This doctor is fully booked on {} ({}/{} patients). Please choose another date.",
        date, current, max
    )
}

pub fn failure_message(error: &BookingError) -> String {
    format!("Failed to book appointment: {}", error)
}

// ==============================================================================
// RESERVATION SERVICE
// ==============================================================================

/// Runs the capacity-checked write for one slot against the configured collaborators.
pub struct ReservationService {
    store: Arc<dyn AppointmentStore>,
    identity: Arc<dyn IdentityProvider>,
    hooks: Vec<Arc<dyn PostCommitHook>>,
    policy: CapacityPolicy,
    hours: ClinicHours,
}

impl ReservationService {
    pub fn new(
        store: Arc<dyn AppointmentStore>,
        identity: Arc<dyn IdentityProvider>,
        policy: CapacityPolicy,
        hours: ClinicHours,
    ) -> Self {
        Self {
            store,
            identity,
            hooks: Vec::new(),
            policy,
            hours,
        }
    }

    /// Supabase-backed service acting as `user`, notifying doctors through the
    /// `notifications` table.
    pub fn for_user(config: &AppConfig, user: User, auth_token: &str) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));
        let store = SupabaseAppointmentStore::new(Arc::clone(&supabase))
            .with_auth_token(auth_token);
        let dispatcher = SupabaseNotificationDispatcher::new(supabase, Some(auth_token.to_string()));

        Self::new(
            Arc::new(store),
            Arc::new(StaticIdentity::new(user)),
            CapacityPolicy::from_config(&config.booking),
            ClinicHours::from_config(&config.booking),
        )
        .with_hook(Arc::new(NotifyDoctorHook::new(Arc::new(dispatcher))))
    }

    pub fn with_hook(mut self, hook: Arc<dyn PostCommitHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn clinic_hours(&self) -> &ClinicHours {
        &self.hours
    }

    pub fn capacity_guard(&self) -> CapacityGuard {
        self.policy.guard()
    }

    /// Starts a fresh booking attempt for `doctor_id`.
    pub fn session(
        self: &Arc<Self>,
        doctor_id: impl Into<String>,
        observer: Arc<dyn BookingObserver>,
    ) -> ReservationSession {
        ReservationSession::new(Arc::clone(self), doctor_id.into(), observer)
    }

    /// Current booked count and ceiling for a doctor on a date.
    pub async fn availability(
        &self,
        doctor_id: &str,
        date: &str,
    ) -> Result<CapacitySnapshot, BookingError> {
        let date = stored_date(date)?;

        let doctor = self
            .store
            .doctor_profile(doctor_id)
            .await?
            .ok_or_else(|| BookingError::DoctorNotFound(doctor_id.to_string()))?;

        let booked = self.store.count_booked(&SlotKey::new(doctor_id, date.as_str())).await?;
        let capacity = self.policy.max_for(&doctor);

        Ok(CapacitySnapshot {
            doctor_id: doctor_id.to_string(),
            date,
            booked,
            capacity,
            available: u64::from(capacity).saturating_sub(booked),
        })
    }

    /// `Booked` appointments for a doctor on a date, oldest first.
    pub async fn booked_appointments(
        &self,
        doctor_id: &str,
        date: &str,
    ) -> Result<Vec<Appointment>, BookingError> {
        let date = stored_date(date)?;
        Ok(self.store.list_booked(&SlotKey::new(doctor_id, date)).await?)
    }

    /// Validates the slot, checks capacity and writes the booking.
    ///
    /// Post-commit hooks run after the write; their failures are logged only.
    #[instrument(skip(self), fields(doctor_id = %request.doctor_id, date = %request.date))]
    pub async fn submit(&self, request: &BookingRequest) -> Result<Appointment, BookingError> {
        let request = &self.validate(request)?;

        // A missing identity is tolerated: the booking is written with empty patient fields.
        let user = self
            .identity
            .current_user()
            .await
            .map_err(|e| BookingError::Identity(format!("{:#}", e)))?;
        let (patient_id, patient_email, profile) = match user {
            Some(user) => {
                let profile = self.store.patient_profile(&user.id).await?;
                if profile.is_none() {
                    warn!("No patient profile for {}, using fallback name", user.id);
                }
                (user.id, user.email.unwrap_or_default(), Some(profile.unwrap_or_default()))
            }
            None => {
                warn!("No authenticated patient, booking with empty patient identity");
                (String::new(), String::new(), None)
            }
        };

        let patient_name = profile
            .as_ref()
            .map(PatientProfile::display_name)
            .unwrap_or_default();
        let patient_email = if patient_email.is_empty() {
            profile.as_ref().and_then(|p| p.email.clone()).unwrap_or_default()
        } else {
            patient_email
        };
        let patient_image = profile.as_ref().map(PatientProfile::image).unwrap_or_default();

        let doctor = self
            .store
            .doctor_profile(&request.doctor_id)
            .await?
            .ok_or_else(|| BookingError::DoctorNotFound(request.doctor_id.clone()))?;

        let key = SlotKey::new(request.doctor_id.clone(), request.date.clone());
        let current = self.store.count_booked(&key).await?;
        let max = self.policy.max_for(&doctor);

        if let Err(e) = self.policy.check(current, max).into_result() {
            warn!("Doctor {} is fully booked on {} ({}/{})", key.doctor_id, key.date, current, max);
            return Err(e);
        }

        let record = NewAppointment {
            doctor_id: request.doctor_id.clone(),
            doctor_name: doctor.display_name(),
            doctor_email: doctor.email.clone().unwrap_or_default(),
            doctor_image: doctor.image(),
            patient_id,
            patient_name,
            patient_email,
            patient_image,
            date: request.date.clone(),
            time: request.time.clone(),
            status: AppointmentStatus::Booked,
            cancelled_by: String::new(),
            cancel_reason: String::new(),
        };

        let appointment = match self.policy.guard() {
            CapacityGuard::Optimistic => self.store.insert_appointment(&record).await?,
            CapacityGuard::Atomic => match self.store.insert_if_below_capacity(&record, max).await? {
                ConditionalInsert::Inserted(appointment) => appointment,
                ConditionalInsert::Full { current } => {
                    warn!("Doctor {} filled up on {} before insert ({}/{})",
                          key.doctor_id, key.date, current, max);
                    return Err(BookingError::CapacityExceeded { current, max });
                }
            },
        };

        info!("Appointment {:?} booked with doctor {} on {} at {}",
              appointment.id, appointment.doctor_id, appointment.date, appointment.time);

        let failures = run_post_commit_hooks(&self.hooks, &appointment).await;
        if !failures.is_empty() {
            debug!("{} post-commit hook(s) failed, booking stands", failures.len());
        }

        Ok(appointment)
    }

    /// Checks the slot and returns it with date and time in their stored form.
    fn validate(&self, request: &BookingRequest) -> Result<BookingRequest, BookingError> {
        if request.date.trim().is_empty() {
            return Err(BookingError::Validation(SELECT_DATE_MESSAGE.to_string()));
        }
        if request.time.trim().is_empty() {
            return Err(BookingError::Validation(SELECT_TIME_MESSAGE.to_string()));
        }
        let date = stored_date(&request.date)?;
        let time = self
            .hours
            .normalize(&request.time)
            .ok_or_else(|| BookingError::Validation(self.hours.rejection_message()))?;

        Ok(BookingRequest {
            doctor_id: request.doctor_id.clone(),
            date,
            time,
        })
    }
}

fn stored_date(date: &str) -> Result<String, BookingError> {
    normalize_date_label(date)
        .ok_or_else(|| BookingError::Validation(format!("Invalid date '{}', expected D/M/YYYY", date)))
}

// ==============================================================================
// OBSERVER
// ==============================================================================

/// Receives progress, success and user-facing messages for a booking attempt.
pub trait BookingObserver: Send + Sync {
    fn on_capacity_progress(&self, in_progress: bool);

    fn on_success(&self, appointment: &Appointment);

    fn on_user_message(&self, message: &str);
}

/// Observer that forwards every event to the log.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl BookingObserver for TracingObserver {
    fn on_capacity_progress(&self, in_progress: bool) {
        debug!("Capacity check in progress: {}", in_progress);
    }

    fn on_success(&self, appointment: &Appointment) {
        debug!("Booking succeeded: {:?}", appointment.id);
    }

    fn on_user_message(&self, message: &str) {
        debug!("User message: {}", message);
    }
}

/// Clears the in-progress flag however the submission ends.
struct ProgressGuard<'a> {
    observer: &'a dyn BookingObserver,
}

impl<'a> ProgressGuard<'a> {
    fn start(observer: &'a dyn BookingObserver) -> Self {
        observer.on_capacity_progress(true);
        Self { observer }
    }
}

impl Drop for ProgressGuard<'_> {
    fn drop(&mut self) {
        self.observer.on_capacity_progress(false);
    }
}

// ==============================================================================
// RESERVATION SESSION
// ==============================================================================

/// One booking attempt: slot selection, confirmation and submission.
pub struct ReservationSession {
    service: Arc<ReservationService>,
    observer: Arc<dyn BookingObserver>,
    doctor_id: String,
    date: Option<String>,
    time: Option<String>,
    state: BookingState,
    last_message: Option<String>,
}

impl ReservationSession {
    fn new(service: Arc<ReservationService>, doctor_id: String, observer: Arc<dyn BookingObserver>) -> Self {
        Self {
            service,
            observer,
            doctor_id,
            date: None,
            time: None,
            state: BookingState::Idle,
            last_message: None,
        }
    }

    pub fn state(&self) -> BookingState {
        self.state
    }

    pub fn doctor_id(&self) -> &str {
        &self.doctor_id
    }

    pub fn selected_date(&self) -> Option<&str> {
        self.date.as_deref()
    }

    pub fn selected_time(&self) -> Option<&str> {
        self.time.as_deref()
    }

    /// The most recent message shown to the user.
    pub fn last_message(&self) -> Option<&str> {
        self.last_message.as_deref()
    }

    /// Picks a `D/M/YYYY` date, stored without zero padding. Malformed labels
    /// are rejected and the previous selection kept.
    pub fn select_date(&mut self, date: &str) -> bool {
        if !self.is_selecting() {
            return false;
        }
        let Some(date) = normalize_date_label(date) else {
            self.tell_user(SELECT_DATE_MESSAGE.to_string());
            return false;
        };

        self.date = Some(date);
        self.refresh_selection_state();
        true
    }

    /// Picks a time, stored as zero-padded `hh:mm AM/PM`. Out-of-hours picks
    /// are rejected and the previous selection kept.
    pub fn select_time(&mut self, time: &str) -> bool {
        if !self.is_selecting() {
            return false;
        }
        let Some(time) = self.service.clinic_hours().normalize(time) else {
            self.tell_user(self.service.clinic_hours().rejection_message());
            return false;
        };

        self.time = Some(time);
        self.refresh_selection_state();
        true
    }

    /// Re-checks the selection and, if still valid, moves to the interstitial.
    pub fn request_confirmation(&mut self) -> bool {
        if !self.is_selecting() {
            return false;
        }

        let date = self.date.as_deref().unwrap_or_default();
        let time = self.time.as_deref().unwrap_or_default();

        let problem = if date.is_empty() {
            Some(SELECT_DATE_MESSAGE.to_string())
        } else if time.is_empty() {
            Some(SELECT_TIME_MESSAGE.to_string())
        } else if !self.service.clinic_hours().accepts(time) {
            Some(self.service.clinic_hours().rejection_message())
        } else {
            None
        };

        if let Some(message) = problem {
            self.tell_user(message);
            return false;
        }

        self.transition(BookingState::Confirming);
        true
    }

    /// Text of the acknowledgement shown while confirming.
    pub fn confirmation_notice(&self) -> &'static str {
        CONFIRMATION_NOTICE
    }

    /// The user backed out of the interstitial.
    pub fn dismiss_confirmation(&mut self) {
        if self.state == BookingState::Confirming {
            self.transition(BookingState::SlotSelected);
        }
    }

    /// Submits the confirmed slot. Only valid while confirming, so an attempt
    /// can be submitted once.
    pub async fn confirm_booking(&mut self) -> Result<ReservationOutcome, BookingError> {
        if self.state != BookingState::Confirming {
            return Err(BookingError::InvalidState {
                from: self.state,
                action: "confirm booking",
            });
        }

        let request = BookingRequest {
            doctor_id: self.doctor_id.clone(),
            date: self.date.clone().unwrap_or_default(),
            time: self.time.clone().unwrap_or_default(),
        };

        self.transition(BookingState::Submitting);

        let observer = Arc::clone(&self.observer);
        let progress = ProgressGuard::start(observer.as_ref());
        let result = self.service.submit(&request).await;
        drop(progress);

        let outcome = match result {
            Ok(appointment) => {
                self.transition(BookingState::Succeeded);
                self.tell_user(SUCCESS_MESSAGE.to_string());
                self.observer.on_success(&appointment);
                ReservationOutcome::Booked(appointment)
            }
            Err(BookingError::CapacityExceeded { current, max }) => {
                self.transition(BookingState::RejectedCapacity);
                self.tell_user(capacity_message(&request.date, current, max));
                self.transition(BookingState::SlotSelected);
                ReservationOutcome::CapacityReached { current, max }
            }
            Err(e) => {
                error!("Booking with doctor {} on {} at {} failed: {}",
                       request.doctor_id, request.date, request.time, e);
                let message = failure_message(&e);
                self.transition(BookingState::Failed);
                self.tell_user(message.clone());
                self.transition(BookingState::SlotSelected);
                ReservationOutcome::Failed { message, kind: FailureKind::from(&e) }
            }
        };

        Ok(outcome)
    }

    fn is_selecting(&self) -> bool {
        matches!(self.state, BookingState::Idle | BookingState::SlotSelected)
    }

    fn refresh_selection_state(&mut self) {
        let next = if self.date.is_some() && self.time.is_some() {
            BookingState::SlotSelected
        } else {
            BookingState::Idle
        };
        self.transition(next);
    }

    fn transition(&mut self, next: BookingState) {
        if !self.state.can_transition_to(&next) {
            warn!("Unexpected booking transition {} -> {}", self.state, next);
        }
        debug!("Booking {} -> {}", self.state, next);
        self.state = next;
    }

    fn tell_user(&mut self, message: String) {
        self.observer.on_user_message(&message);
        self.last_message = Some(message);
    }
}
