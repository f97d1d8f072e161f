// libs/doctor-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use chrono::{DateTime, Utc};
use headers::{authorization::Bearer, Authorization};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{CreateSlotRequest, DoctorError, DoctorSearchFilters, UpdateScheduleRequest};
use crate::services::{DoctorService, SlotService};

#[derive(Debug, Deserialize)]
pub struct SlotListQuery {
    /// Moment to evaluate availability against; defaults to now.
    pub as_of: Option<DateTime<Utc>>,
}

fn map_doctor_error(e: DoctorError) -> AppError {
    match e {
        DoctorError::NotFound => AppError::NotFound("Doctor not found".to_string()),
        DoctorError::SlotNotFound => AppError::NotFound("Slot not found".to_string()),
        DoctorError::SlotConflict => {
            AppError::Conflict("An identical slot already exists".to_string())
        }
        DoctorError::InvalidTime(msg) => AppError::BadRequest(msg),
        DoctorError::ValidationError(msg) => AppError::ValidationError(msg),
        DoctorError::NotWorkingDay(_) | DoctorError::OutsideWorkingHours { .. } => {
            AppError::BadRequest(e.to_string())
        }
        DoctorError::DatabaseError(msg) => AppError::Database(msg),
    }
}

// ==============================================================================
// PUBLIC HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn list_doctors(
    State(state): State<Arc<AppConfig>>,
    Query(filters): Query<DoctorSearchFilters>,
) -> Result<Json<Value>, AppError> {
    let doctor_service = DoctorService::new(&state);

    let doctors = doctor_service
        .list_approved(filters)
        .await
        .map_err(map_doctor_error)?;

    Ok(Json(json!({
        "doctors": doctors,
        "total": doctors.len()
    })))
}

#[axum::debug_handler]
pub async fn get_doctor(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let doctor_service = DoctorService::new(&state);

    let doctor = doctor_service
        .get_doctor(doctor_id, None)
        .await
        .map_err(map_doctor_error)?;

    Ok(Json(json!(doctor)))
}

/// The availability filter: live, ordered booking candidates for one doctor.
/// An empty list is a valid answer (the booking UI falls back to manual
/// review), so this never 404s on a slot-less doctor.
#[axum::debug_handler]
pub async fn list_available_slots(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<SlotListQuery>,
) -> Result<Json<Value>, AppError> {
    let slot_service = SlotService::new(&state);
    let as_of = query.as_of.unwrap_or_else(Utc::now);

    let slots = slot_service
        .list_available_slots(doctor_id, as_of, None)
        .await
        .map_err(map_doctor_error)?;

    Ok(Json(json!({
        "doctor_id": doctor_id,
        "as_of": as_of,
        "slots": slots
    })))
}

// ==============================================================================
// PROTECTED HANDLERS (SCHEDULE + SLOT MANAGEMENT)
// ==============================================================================

async fn ensure_owns_profile(
    doctor_service: &DoctorService,
    doctor_id: Uuid,
    user: &User,
) -> Result<(), AppError> {
    let is_admin = user.role.as_deref() == Some("admin");
    if is_admin {
        return Ok(());
    }

    let doctor = doctor_service
        .get_doctor(doctor_id, None)
        .await
        .map_err(map_doctor_error)?;

    if doctor.user_id.to_string() != user.id {
        return Err(AppError::Forbidden(
            "Not authorized to manage this doctor profile".to_string(),
        ));
    }

    Ok(())
}

#[axum::debug_handler]
pub async fn update_schedule(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateScheduleRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let doctor_service = DoctorService::new(&state);

    ensure_owns_profile(&doctor_service, doctor_id, &user).await?;

    let doctor = doctor_service
        .update_schedule(doctor_id, request, token)
        .await
        .map_err(map_doctor_error)?;

    Ok(Json(json!({
        "success": true,
        "doctor": doctor,
        "message": "Schedule updated successfully"
    })))
}

#[axum::debug_handler]
pub async fn create_slot(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateSlotRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let doctor_service = DoctorService::new(&state);
    let slot_service = SlotService::new(&state);

    ensure_owns_profile(&doctor_service, doctor_id, &user).await?;

    let slot = slot_service
        .create_slot(doctor_id, request, token)
        .await
        .map_err(map_doctor_error)?;

    Ok(Json(json!({
        "success": true,
        "slot": slot,
        "message": "Slot created successfully"
    })))
}
