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
use uuid::Uuid;

use doctor_cell::services::DoctorService;
use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{AppointmentError, BookAppointmentRequest, ListScope, TransitionAction};
use crate::services::authorization::{resolve_actor_role, ActorRole};
use crate::services::booking::AppointmentBookingService;
use crate::services::lifecycle::AppointmentLifecycleService;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub scope: ListScope,
}

fn map_appointment_error(e: AppointmentError) -> AppError {
    match e {
        AppointmentError::NotFound => AppError::NotFound("Appointment not found".to_string()),
        AppointmentError::DoctorNotFound => AppError::NotFound("Doctor not found".to_string()),
        AppointmentError::SlotNoLongerAvailable => AppError::Conflict(
            "Slot is no longer available, please select another slot".to_string(),
        ),
        AppointmentError::InvalidTransition { .. } => AppError::Conflict(e.to_string()),
        AppointmentError::Unauthorized => {
            AppError::Forbidden("Not authorized to perform this action".to_string())
        }
        AppointmentError::DoctorNotApproved => {
            AppError::BadRequest("Doctor is not approved for bookings".to_string())
        }
        AppointmentError::ValidationError(msg) => AppError::ValidationError(msg),
        AppointmentError::DatabaseError(msg) => AppError::Database(msg),
    }
}

fn is_admin(user: &User) -> bool {
    user.role.as_deref() == Some("admin")
}

// ==============================================================================
// BOOKING HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let token = auth.token();

    // Only the patient themselves (or an admin) may submit the booking.
    if request.patient_id.to_string() != user.id && !is_admin(&user) {
        return Err(AppError::Forbidden(
            "Not authorized to book appointment for this patient".to_string(),
        ));
    }

    let booking_service = AppointmentBookingService::new(&state);

    let confirmation = booking_service
        .book_appointment(request, token)
        .await
        .map_err(map_appointment_error)?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "appointment": confirmation.appointment,
            "manual_review": confirmation.manual_review,
            "warnings": confirmation.warnings,
            "message": if confirmation.manual_review {
                "Appointment requested; it will be reviewed manually"
            } else {
                "Appointment requested successfully, pending confirmation"
            }
        })),
    ))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let booking_service = AppointmentBookingService::new(&state);
    let doctor_service = DoctorService::new(&state);

    let appointment = booking_service
        .get_appointment(appointment_id, token)
        .await
        .map_err(map_appointment_error)?;

    // Only the two participants (or an admin) may view.
    if !is_admin(&user) {
        let actor = resolve_actor_role(&doctor_service, &user.id)
            .await
            .map_err(map_appointment_error)?;

        let is_participant = match actor {
            ActorRole::Patient { user_id } => user_id == appointment.patient_id,
            ActorRole::Doctor { doctor_id, user_id } => {
                doctor_id == appointment.doctor_id || user_id == appointment.patient_id
            }
        };

        if !is_participant {
            return Err(AppError::Forbidden(
                "Not authorized to view this appointment".to_string(),
            ));
        }
    }

    Ok(Json(json!(appointment)))
}

// ==============================================================================
// STATE MACHINE HANDLERS
// ==============================================================================

async fn run_transition(
    state: Arc<AppConfig>,
    appointment_id: Uuid,
    user: User,
    action: TransitionAction,
    token: &str,
) -> Result<Json<Value>, AppError> {
    let lifecycle_service = AppointmentLifecycleService::new(&state);

    let appointment = lifecycle_service
        .transition(appointment_id, &user.id, action, token)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": format!("Appointment {}", appointment.status)
    })))
}

#[axum::debug_handler]
pub async fn confirm_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token().to_string();
    run_transition(state, appointment_id, user, TransitionAction::Confirm, &token).await
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token().to_string();
    run_transition(state, appointment_id, user, TransitionAction::Cancel, &token).await
}

#[axum::debug_handler]
pub async fn complete_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token().to_string();
    run_transition(state, appointment_id, user, TransitionAction::Complete, &token).await
}

// ==============================================================================
// DASHBOARD LISTINGS
// ==============================================================================

#[axum::debug_handler]
pub async fn list_patient_appointments(
    State(state): State<Arc<AppConfig>>,
    Path(patient_id): Path<Uuid>,
    Query(query): Query<ListQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    if patient_id.to_string() != user.id && !is_admin(&user) {
        return Err(AppError::Forbidden(
            "Not authorized to view appointments for this patient".to_string(),
        ));
    }

    let booking_service = AppointmentBookingService::new(&state);
    let appointments = booking_service
        .list_for_patient(patient_id, query.scope, token)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "appointments": appointments,
        "total": appointments.len()
    })))
}

#[axum::debug_handler]
pub async fn list_doctor_appointments(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<ListQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let doctor_service = DoctorService::new(&state);

    if !is_admin(&user) {
        let owns_profile = matches!(
            resolve_actor_role(&doctor_service, &user.id)
                .await
                .map_err(map_appointment_error)?,
            ActorRole::Doctor { doctor_id: id, .. } if id == doctor_id
        );

        if !owns_profile {
            return Err(AppError::Forbidden(
                "Not authorized to view appointments for this doctor".to_string(),
            ));
        }
    }

    let booking_service = AppointmentBookingService::new(&state);
    let appointments = booking_service
        .list_for_doctor(doctor_id, query.scope, token)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "appointments": appointments,
        "total": appointments.len()
    })))
}
