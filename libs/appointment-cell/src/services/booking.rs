// libs/appointment-cell/src/services/booking.rs
use chrono::{NaiveDate, NaiveTime, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use doctor_cell::models::{Doctor, DoctorError};
use doctor_cell::services::schedule::check_within_working_hours;
use doctor_cell::services::{DoctorService, SlotService};
use shared_config::AppConfig;
use shared_database::supabase::{self, SupabaseClient};

use crate::models::{
    Appointment, AppointmentError, AppointmentStatus, BookAppointmentRequest, BookingConfirmation,
    ListScope,
};

pub struct AppointmentBookingService {
    supabase: SupabaseClient,
    doctor_service: DoctorService,
    slot_service: SlotService,
}

impl AppointmentBookingService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            doctor_service: DoctorService::new(config),
            slot_service: SlotService::new(config),
        }
    }

    /// Book an appointment for a patient with a doctor, either against a
    /// selected slot or (bypass path) for a directly requested date/time.
    ///
    /// The slot path re-verifies availability right before committing: the
    /// patient picked the slot from a listing some time ago, and another
    /// patient may have taken it since. Losing that race yields
    /// `SlotNoLongerAvailable`; the caller must re-list and pick again, never
    /// get a silently substituted slot.
    pub async fn book_appointment(
        &self,
        request: BookAppointmentRequest,
        auth_token: &str,
    ) -> Result<BookingConfirmation, AppointmentError> {
        info!(
            "Booking appointment for patient {} with doctor {}",
            request.patient_id, request.doctor_id
        );

        if request.reason.trim().is_empty() {
            return Err(AppointmentError::ValidationError(
                "A reason for the appointment is required".to_string(),
            ));
        }

        let doctor = self
            .doctor_service
            .get_doctor(request.doctor_id, None)
            .await
            .map_err(|e| match e {
                DoctorError::NotFound => AppointmentError::DoctorNotFound,
                other => AppointmentError::DatabaseError(other.to_string()),
            })?;

        if !doctor.is_approved {
            return Err(AppointmentError::DoctorNotApproved);
        }

        // A doctor booking against their own profile is a form mistake, not a
        // permission problem.
        if doctor.user_id == request.patient_id {
            return Err(AppointmentError::ValidationError(
                "Doctors cannot book appointments with themselves".to_string(),
            ));
        }

        match request.slot_id {
            Some(slot_id) => self.book_against_slot(&doctor, slot_id, &request, auth_token).await,
            None => self.book_direct(&doctor, &request, auth_token).await,
        }
    }

    async fn book_against_slot(
        &self,
        doctor: &Doctor,
        slot_id: Uuid,
        request: &BookAppointmentRequest,
        auth_token: &str,
    ) -> Result<BookingConfirmation, AppointmentError> {
        let slot = self
            .slot_service
            .get_slot(slot_id, Some(auth_token))
            .await
            .map_err(|e| match e {
                DoctorError::SlotNotFound => {
                    AppointmentError::ValidationError("Selected slot does not exist".to_string())
                }
                other => AppointmentError::DatabaseError(other.to_string()),
            })?;

        if slot.doctor_id != doctor.id {
            return Err(AppointmentError::ValidationError(
                "Selected slot does not belong to this doctor".to_string(),
            ));
        }

        // Mandatory re-check: the availability listing the patient chose from
        // is stale by the time the form is submitted.
        if !slot.is_available || self.slot_has_active_appointment(slot.id, auth_token).await? {
            debug!("Slot {} already taken at re-check", slot.id);
            return Err(AppointmentError::SlotNoLongerAvailable);
        }

        // Create first, then flip the slot; the two must land together. A 409
        // here is the partial unique index on active-appointment-per-slot
        // catching a race the re-check missed.
        let appointment = self
            .create_appointment_record(
                request,
                slot.slot_date,
                slot.start_time,
                Some(slot.id),
                auth_token,
            )
            .await?;

        let claimed = self
            .slot_service
            .claim(slot.id, auth_token)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        if !claimed {
            // Someone else flipped the slot between our re-check and the
            // claim. Undo the insert so no appointment points at a slot it
            // never held.
            warn!(
                "Lost booking race for slot {}, rolling back appointment {}",
                slot.id, appointment.id
            );
            self.delete_appointment_record(appointment.id, auth_token).await?;
            return Err(AppointmentError::SlotNoLongerAvailable);
        }

        info!(
            "Appointment {} booked against slot {} for patient {}",
            appointment.id, slot.id, request.patient_id
        );

        Ok(BookingConfirmation {
            appointment,
            manual_review: false,
            warnings: vec![],
        })
    }

    async fn book_direct(
        &self,
        doctor: &Doctor,
        request: &BookAppointmentRequest,
        auth_token: &str,
    ) -> Result<BookingConfirmation, AppointmentError> {
        let (date, time) = match (request.appointment_date, request.appointment_time) {
            (Some(date), Some(time)) => (date, time),
            _ => {
                return Err(AppointmentError::ValidationError(
                    "Either a slot or an appointment date and time must be provided".to_string(),
                ))
            }
        };

        let now = Utc::now();
        if date < now.date_naive() || (date == now.date_naive() && time <= now.time()) {
            return Err(AppointmentError::ValidationError(
                "Appointment date and time must be in the future".to_string(),
            ));
        }

        let mut warnings = Vec::new();
        let mut manual_review = false;

        if doctor.has_declared_schedule() {
            check_within_working_hours(doctor, date, time, time)
                .map_err(|e| AppointmentError::ValidationError(e.to_string()))?;
        } else {
            // No declared availability to validate against: accept the
            // request but flag it for the clinic to review by hand.
            manual_review = true;
            warnings.push(
                "Doctor has not declared working hours; your request will be reviewed manually"
                    .to_string(),
            );
        }

        let appointment = self
            .create_appointment_record(request, date, time, None, auth_token)
            .await?;

        info!(
            "Appointment {} booked directly for patient {} (manual_review: {})",
            appointment.id, request.patient_id, manual_review
        );

        Ok(BookingConfirmation {
            appointment,
            manual_review,
            warnings,
        })
    }

    pub async fn get_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Fetching appointment: {}", appointment_id);

        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(AppointmentError::NotFound);
        }

        serde_json::from_value(result[0].clone())
            .map_err(|e| AppointmentError::DatabaseError(format!("Failed to parse appointment: {}", e)))
    }

    /// Dashboard listing for a patient: upcoming requests first by date, past
    /// ones most recent first.
    pub async fn list_for_patient(
        &self,
        patient_id: Uuid,
        scope: ListScope,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        self.list_appointments("patient_id", patient_id, scope, auth_token)
            .await
    }

    pub async fn list_for_doctor(
        &self,
        doctor_id: Uuid,
        scope: ListScope,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        self.list_appointments("doctor_id", doctor_id, scope, auth_token)
            .await
    }

    async fn list_appointments(
        &self,
        owner_column: &str,
        owner_id: Uuid,
        scope: ListScope,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let (status_filter, order) = match scope {
            ListScope::Upcoming => (
                "status=in.(pending,confirmed)",
                "order=appointment_date.asc,appointment_time.asc",
            ),
            ListScope::Past => (
                "status=in.(completed,cancelled)",
                "order=appointment_date.desc,appointment_time.desc",
            ),
        };

        let path = format!(
            "/rest/v1/appointments?{}=eq.{}&{}&{}",
            owner_column, owner_id, status_filter, order
        );

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .map(|row| serde_json::from_value(row))
            .collect::<Result<Vec<Appointment>, _>>()
            .map_err(|e| AppointmentError::DatabaseError(format!("Failed to parse appointments: {}", e)))
    }

    async fn slot_has_active_appointment(
        &self,
        slot_id: Uuid,
        auth_token: &str,
    ) -> Result<bool, AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?slot_id=eq.{}&status=in.(pending,confirmed)&limit=1",
            slot_id
        );

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        Ok(!result.is_empty())
    }

    async fn create_appointment_record(
        &self,
        request: &BookAppointmentRequest,
        date: NaiveDate,
        time: NaiveTime,
        slot_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let appointment_data = json!({
            "patient_id": request.patient_id,
            "doctor_id": request.doctor_id,
            "slot_id": slot_id,
            "appointment_date": date,
            "appointment_time": time.format("%H:%M:%S").to_string(),
            "status": AppointmentStatus::Pending.to_string(),
            "appointment_type": request.appointment_type.to_string(),
            "reason": request.reason,
            "created_at": Utc::now().to_rfc3339()
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/appointments",
                Some(auth_token),
                Some(appointment_data),
                Some(headers),
            )
            .await
            .map_err(|e| {
                if supabase::is_conflict(&e) {
                    // The storage-level one-active-appointment-per-slot
                    // constraint fired: a concurrent booking got there first.
                    AppointmentError::SlotNoLongerAvailable
                } else {
                    AppointmentError::DatabaseError(e.to_string())
                }
            })?;

        if result.is_empty() {
            return Err(AppointmentError::DatabaseError(
                "Failed to create appointment".to_string(),
            ));
        }

        serde_json::from_value(result[0].clone())
            .map_err(|e| AppointmentError::DatabaseError(format!("Failed to parse created appointment: {}", e)))
    }

    async fn delete_appointment_record(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<(), AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let _: Vec<Value> = self
            .supabase
            .request(Method::DELETE, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        Ok(())
    }
}
