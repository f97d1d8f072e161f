// libs/appointment-cell/src/services/lifecycle.rs
//
// The appointment state machine. Every status change in the system goes
// through `transition`; slot availability side-effects ride along here so the
// two can never drift apart.
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use doctor_cell::services::{DoctorService, SlotService};
use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{Appointment, AppointmentError, TransitionAction};
use crate::services::authorization::{authorize, resolve_actor_role};
use crate::services::booking::AppointmentBookingService;

pub struct AppointmentLifecycleService {
    supabase: SupabaseClient,
    doctor_service: DoctorService,
    slot_service: SlotService,
    booking_service: AppointmentBookingService,
}

/// Pure transition gate, shared by the service and its tests.
pub fn validate_transition(
    appointment: &Appointment,
    action: TransitionAction,
) -> Result<(), AppointmentError> {
    if !action.allowed_from().contains(&appointment.status) {
        return Err(AppointmentError::InvalidTransition {
            from: appointment.status,
            action,
        });
    }
    Ok(())
}

impl AppointmentLifecycleService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            doctor_service: DoctorService::new(config),
            slot_service: SlotService::new(config),
            booking_service: AppointmentBookingService::new(config),
        }
    }

    /// Apply one state-machine action on behalf of a user.
    ///
    /// Order matters: resolve role, authorize, validate, all before any
    /// write. The status update itself is conditional on the status the
    /// decision was made against, so a concurrent transition (or a
    /// double-submitted form) turns into `InvalidTransition` instead of a
    /// second silent write.
    pub async fn transition(
        &self,
        appointment_id: Uuid,
        user_id: &str,
        action: TransitionAction,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        debug!(
            "Transition {} requested on appointment {} by user {}",
            action, appointment_id, user_id
        );

        let appointment = self
            .booking_service
            .get_appointment(appointment_id, auth_token)
            .await?;

        let actor = resolve_actor_role(&self.doctor_service, user_id).await?;
        authorize(&actor, &appointment, action)?;
        validate_transition(&appointment, action)?;

        let updated = self
            .apply_status_update(&appointment, action, auth_token)
            .await?;

        self.apply_slot_side_effect(&updated, action, auth_token)
            .await?;

        info!(
            "Appointment {} transitioned {} -> {} by {:?}",
            appointment_id, appointment.status, updated.status, actor
        );

        Ok(updated)
    }

    /// Conditional status write: only applies while the appointment is still
    /// in the status the caller saw. Zero rows back means the world moved on.
    async fn apply_status_update(
        &self,
        appointment: &Appointment,
        action: TransitionAction,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?id=eq.{}&status=eq.{}",
            appointment.id, appointment.status
        );

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(json!({ "status": action.target().to_string() })),
                Some(headers),
            )
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        match result.into_iter().next() {
            Some(row) => serde_json::from_value(row).map_err(|e| {
                AppointmentError::DatabaseError(format!("Failed to parse appointment: {}", e))
            }),
            None => {
                debug!(
                    "Conditional status update matched nothing for appointment {} (expected {})",
                    appointment.id, appointment.status
                );
                Err(AppointmentError::InvalidTransition {
                    from: appointment.status,
                    action,
                })
            }
        }
    }

    async fn apply_slot_side_effect(
        &self,
        appointment: &Appointment,
        action: TransitionAction,
        auth_token: &str,
    ) -> Result<(), AppointmentError> {
        let Some(slot_id) = appointment.slot_id else {
            return Ok(());
        };

        match action {
            // Already false since booking; re-asserting keeps confirm
            // idempotent against out-of-band slot edits.
            TransitionAction::Confirm => {
                self.slot_service
                    .set_availability(slot_id, false, auth_token)
                    .await
                    .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;
            }
            // Cancellation returns the slot to circulation. A slot deleted by
            // an administrator in the interim is tolerated: the cancellation
            // itself must not fail.
            TransitionAction::Cancel => {
                let released = self
                    .slot_service
                    .set_availability(slot_id, true, auth_token)
                    .await
                    .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

                if !released {
                    warn!(
                        "Slot {} for cancelled appointment {} is gone; nothing to release",
                        slot_id, appointment.id
                    );
                }
            }
            TransitionAction::Complete => {}
        }

        Ok(())
    }
}
