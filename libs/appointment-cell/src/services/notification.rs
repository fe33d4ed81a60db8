// libs/appointment-cell/src/services/notification.rs
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{error, info};

use shared_database::supabase::SupabaseClient;

use crate::models::Appointment;

pub const NOTIFICATIONS_TABLE: &str = "notifications";
pub const BOOKED_NOTIFICATION_TYPE: &str = "appointment_booked";

/// Tells a doctor that a patient booked with them.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn notify_booked(
        &self,
        doctor_id: &str,
        patient_name: &str,
        date: &str,
        time: &str,
    ) -> Result<()>;
}

pub fn booked_message(patient_name: &str, date: &str, time: &str) -> String {
    format!("{} booked an appointment with you on {} at {}", patient_name, date, time)
}

/// Writes an in-app notification row that the doctor's client picks up.
pub struct SupabaseNotificationDispatcher {
    supabase: Arc<SupabaseClient>,
    auth_token: Option<String>,
}

impl SupabaseNotificationDispatcher {
    pub fn new(supabase: Arc<SupabaseClient>, auth_token: Option<String>) -> Self {
        Self { supabase, auth_token }
    }
}

#[async_trait]
impl NotificationDispatcher for SupabaseNotificationDispatcher {
    async fn notify_booked(
        &self,
        doctor_id: &str,
        patient_name: &str,
        date: &str,
        time: &str,
    ) -> Result<()> {
        let row = json!({
            "userId": doctor_id,
            "title": "New Appointment Booked",
            "body": booked_message(patient_name, date, time),
            "type": BOOKED_NOTIFICATION_TYPE,
            "isRead": false,
        });

        let _: Value = self
            .supabase
            .insert(NOTIFICATIONS_TABLE, row, self.auth_token.as_deref())
            .await
            .with_context(|| format!("Failed to notify doctor {}", doctor_id))?;

        info!("Booking notification stored for doctor {}", doctor_id);
        Ok(())
    }
}

// ==============================================================================
// POST-COMMIT HOOKS
// ==============================================================================

/// Work that runs once a booking has been written. A failing hook never
/// undoes or fails the booking.
#[async_trait]
pub trait PostCommitHook: Send + Sync {
    fn name(&self) -> &'static str;

    async fn after_commit(&self, appointment: &Appointment) -> Result<()>;
}

pub struct NotifyDoctorHook {
    dispatcher: Arc<dyn NotificationDispatcher>,
}

impl NotifyDoctorHook {
    pub fn new(dispatcher: Arc<dyn NotificationDispatcher>) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl PostCommitHook for NotifyDoctorHook {
    fn name(&self) -> &'static str {
        "notify_doctor"
    }

    async fn after_commit(&self, appointment: &Appointment) -> Result<()> {
        self.dispatcher
            .notify_booked(
                &appointment.doctor_id,
                &appointment.patient_name,
                &appointment.date,
                &appointment.time,
            )
            .await
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HookFailure {
    pub hook: &'static str,
    pub message: String,
}

/// Runs hooks in order, logging and collecting failures instead of stopping.
pub async fn run_post_commit_hooks(
    hooks: &[Arc<dyn PostCommitHook>],
    appointment: &Appointment,
) -> Vec<HookFailure> {
    let mut failures = Vec::new();

    for hook in hooks {
        if let Err(e) = hook.after_commit(appointment).await {
            error!("Post-commit hook {} failed for appointment {:?}: {:#}",
                   hook.name(), appointment.id, e);
            failures.push(HookFailure {
                hook: hook.name(),
                message: e.to_string(),
            });
        }
    }

    failures
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AppointmentStatus;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHook(AtomicUsize);

    #[async_trait]
    impl PostCommitHook for CountingHook {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn after_commit(&self, _appointment: &Appointment) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingHook;

    #[async_trait]
    impl PostCommitHook for FailingHook {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn after_commit(&self, _appointment: &Appointment) -> Result<()> {
            anyhow::bail!("push gateway unreachable")
        }
    }

    fn appointment() -> Appointment {
        Appointment {
            id: Some("A1".to_string()),
            doctor_id: "D1".to_string(),
            doctor_name: String::new(),
            doctor_email: String::new(),
            doctor_image: String::new(),
            patient_id: "P1".to_string(),
            patient_name: "Jane Doe".to_string(),
            patient_email: String::new(),
            patient_image: String::new(),
            date: "5/3/2025".to_string(),
            time: "10:30 AM".to_string(),
            status: AppointmentStatus::Booked,
            cancelled_by: String::new(),
            cancel_reason: String::new(),
            timestamp: None,
        }
    }

    #[test]
    fn test_booked_message() {
        assert_eq!(
            booked_message("Jane Doe", "5/3/2025", "10:30 AM"),
            "Jane Doe booked an appointment with you on 5/3/2025 at 10:30 AM"
        );
    }

    #[tokio::test]
    async fn test_failing_hook_does_not_stop_later_hooks() {
        let counting = Arc::new(CountingHook(AtomicUsize::new(0)));
        let hooks: Vec<Arc<dyn PostCommitHook>> = vec![Arc::new(FailingHook), counting.clone()];

        let failures = run_post_commit_hooks(&hooks, &appointment()).await;

        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].hook, "failing");
        assert!(failures[0].message.contains("unreachable"));
        assert_eq!(counting.0.load(Ordering::SeqCst), 1);
    }
}
