// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{BookingError, FailureKind, ReservationOutcome};
use crate::services::booking::{
    ReservationService, TracingObserver, CONFIRMATION_NOTICE, SUCCESS_MESSAGE,
};
use crate::services::slot::ClinicHours;

// ==============================================================================
// REQUEST BODIES AND QUERY PARAMETERS
// ==============================================================================

#[derive(Debug, Deserialize)]
pub struct ValidateSlotRequest {
    pub time: String,
}

#[derive(Debug, Deserialize)]
pub struct DateQuery {
    pub date: String,
}

#[derive(Debug, Deserialize)]
pub struct BookAppointmentRequest {
    pub doctor_id: String,
    pub date: String,
    pub time: String,
    /// The caller has shown the first-come-first-served notice and the user accepted it.
    #[serde(default)]
    pub acknowledged: bool,
}

fn into_app_error(error: BookingError) -> AppError {
    match error {
        BookingError::Validation(msg) => AppError::ValidationError(msg),
        BookingError::InvalidState { .. } => AppError::BadRequest(error.to_string()),
        BookingError::CapacityExceeded { current, max } => AppError::CapacityReached {
            message: error.to_string(),
            current,
            max,
        },
        BookingError::DoctorNotFound(_) => AppError::NotFound(error.to_string()),
        BookingError::Identity(msg) => AppError::Auth(msg),
        BookingError::Store(e) => AppError::ExternalService(e.to_string()),
    }
}

// ==============================================================================
// HANDLERS
// ==============================================================================

/// Checks a `hh:mm AM/PM` label against clinic hours.
pub async fn validate_slot(
    State(state): State<Arc<AppConfig>>,
    Json(request): Json<ValidateSlotRequest>,
) -> Json<Value> {
    let hours = ClinicHours::from_config(&state.booking);
    let accepted = hours.accepts(&request.time);

    Json(json!({
        "time": request.time,
        "accepted": accepted,
        "message": if accepted { None } else { Some(hours.rejection_message()) },
    }))
}

pub async fn get_doctor_capacity(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(doctor_id): Path<String>,
    Query(query): Query<DateQuery>,
) -> Result<Json<Value>, AppError> {
    let service = ReservationService::for_user(&state, user, auth.token());

    let snapshot = service
        .availability(&doctor_id, &query.date)
        .await
        .map_err(into_app_error)?;

    Ok(Json(json!(snapshot)))
}

pub async fn get_booked_appointments(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(doctor_id): Path<String>,
    Query(query): Query<DateQuery>,
) -> Result<Json<Value>, AppError> {
    let service = ReservationService::for_user(&state, user, auth.token());

    let appointments = service
        .booked_appointments(&doctor_id, &query.date)
        .await
        .map_err(into_app_error)?;

    Ok(Json(json!({
        "doctor_id": doctor_id,
        "date": query.date,
        "total": appointments.len(),
        "appointments": appointments,
    })))
}

/// Runs a whole booking attempt: select, confirm, submit.
#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let patient_id = user.id.clone();
    let service = Arc::new(ReservationService::for_user(&state, user, auth.token()));
    let mut session = service.session(request.doctor_id.clone(), Arc::new(TracingObserver));

    let selected = session.select_date(&request.date)
        && session.select_time(&request.time)
        && session.request_confirmation();

    if !selected {
        let message = session.last_message().unwrap_or("Invalid booking request");
        return Err(AppError::ValidationError(message.to_string()));
    }

    if !request.acknowledged {
        session.dismiss_confirmation();
        return Err(AppError::BadRequest(CONFIRMATION_NOTICE.to_string()));
    }

    let outcome = session.confirm_booking().await.map_err(into_app_error)?;

    match outcome {
        ReservationOutcome::Booked(appointment) => {
            info!("Patient {} booked doctor {} on {} at {}",
                  patient_id, appointment.doctor_id, appointment.date, appointment.time);

            Ok((
                StatusCode::CREATED,
                Json(json!({
                    "success": true,
                    "appointment": appointment,
                    "message": SUCCESS_MESSAGE,
                })),
            ))
        }
        ReservationOutcome::CapacityReached { current, max } => Err(AppError::CapacityReached {
            message: session.last_message().unwrap_or_default().to_string(),
            current,
            max,
        }),
        ReservationOutcome::Failed { message, kind } => Err(match kind {
            FailureKind::Invalid => AppError::ValidationError(message),
            FailureKind::DoctorNotFound => AppError::NotFound(message),
            FailureKind::Identity => AppError::Auth(message),
            FailureKind::Backend => AppError::ExternalService(message),
        }),
    }
}
