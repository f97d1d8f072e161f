// libs/appointment-cell/src/services/authorization.rs
//
// Who may drive which transition. The role lookup happens once, here, as an
// explicit tagged resolution; nothing downstream infers roles from lookup
// failures.
use tracing::warn;
use uuid::Uuid;

use doctor_cell::services::DoctorService;

use crate::models::{Appointment, AppointmentError, TransitionAction};

/// Resolved identity of the caller: either a plain patient, or the owner of a
/// doctor profile (who is also a user).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorRole {
    Patient { user_id: Uuid },
    Doctor { doctor_id: Uuid, user_id: Uuid },
}

/// One tagged lookup: a user with a doctor profile acts as that doctor,
/// everyone else acts as a patient.
pub async fn resolve_actor_role(
    doctor_service: &DoctorService,
    user_id: &str,
) -> Result<ActorRole, AppointmentError> {
    let user_uuid = Uuid::parse_str(user_id)
        .map_err(|_| AppointmentError::ValidationError("Invalid user id".to_string()))?;

    let doctor = doctor_service
        .get_doctor_by_user(user_id, None)
        .await
        .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

    Ok(match doctor {
        Some(doctor) => ActorRole::Doctor {
            doctor_id: doctor.id,
            user_id: user_uuid,
        },
        None => ActorRole::Patient { user_id: user_uuid },
    })
}

/// Permission gate for state-machine transitions. Runs before any mutation;
/// a failure leaves all state untouched.
pub fn authorize(
    actor: &ActorRole,
    appointment: &Appointment,
    action: TransitionAction,
) -> Result<(), AppointmentError> {
    let permitted = match action {
        // Confirm and complete are doctor-only, and only for the owning doctor.
        TransitionAction::Confirm | TransitionAction::Complete => matches!(
            actor,
            ActorRole::Doctor { doctor_id, .. } if *doctor_id == appointment.doctor_id
        ),
        // Either party to the appointment may cancel it. A doctor can also be
        // the booking patient on someone else's appointment, so the doctor arm
        // checks both ownerships.
        TransitionAction::Cancel => match actor {
            ActorRole::Doctor { doctor_id, user_id } => {
                *doctor_id == appointment.doctor_id || *user_id == appointment.patient_id
            }
            ActorRole::Patient { user_id } => *user_id == appointment.patient_id,
        },
    };

    if !permitted {
        warn!(
            "Unauthorized {} attempt on appointment {} by {:?}",
            action, appointment.id, actor
        );
        return Err(AppointmentError::Unauthorized);
    }

    Ok(())
}
