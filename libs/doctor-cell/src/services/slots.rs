// libs/doctor-cell/src/services/slots.rs
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::{self, SupabaseClient};

use crate::models::{CreateSlotRequest, DoctorError, DoctorSlot};

pub struct SlotService {
    supabase: SupabaseClient,
}

fn validate_slot_times(
    slot_date: NaiveDate,
    start_time: NaiveTime,
    end_time: NaiveTime,
    today: NaiveDate,
) -> Result<(), DoctorError> {
    if start_time >= end_time {
        return Err(DoctorError::InvalidTime(
            "Slot start time must be before end time".to_string(),
        ));
    }

    if slot_date < today {
        return Err(DoctorError::InvalidTime(
            "Slot date cannot be in the past".to_string(),
        ));
    }

    Ok(())
}

impl SlotService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    /// Create one bookable slot for a doctor. The (doctor, date, start, end)
    /// uniqueness constraint lives in the store; a 409 from it is reported as
    /// a slot conflict rather than a raw storage error.
    pub async fn create_slot(
        &self,
        doctor_id: Uuid,
        request: CreateSlotRequest,
        auth_token: &str,
    ) -> Result<DoctorSlot, DoctorError> {
        debug!(
            "Creating slot for doctor {} on {} {}-{}",
            doctor_id, request.slot_date, request.start_time, request.end_time
        );

        validate_slot_times(
            request.slot_date,
            request.start_time,
            request.end_time,
            Utc::now().date_naive(),
        )?;

        let slot_data = json!({
            "doctor_id": doctor_id,
            "slot_date": request.slot_date,
            "start_time": request.start_time.format("%H:%M:%S").to_string(),
            "end_time": request.end_time.format("%H:%M:%S").to_string(),
            "is_available": true,
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
                "/rest/v1/doctor_slots",
                Some(auth_token),
                Some(slot_data),
                Some(headers),
            )
            .await
            .map_err(|e| {
                if supabase::is_conflict(&e) {
                    DoctorError::SlotConflict
                } else {
                    DoctorError::DatabaseError(e.to_string())
                }
            })?;

        if result.is_empty() {
            return Err(DoctorError::DatabaseError(
                "Failed to create slot".to_string(),
            ));
        }

        let slot: DoctorSlot = serde_json::from_value(result[0].clone())
            .map_err(|e| DoctorError::DatabaseError(format!("Failed to parse slot: {}", e)))?;

        info!("Slot {} created for doctor {}", slot.id, doctor_id);
        Ok(slot)
    }

    /// Booking candidates for a doctor as of a given moment: available,
    /// not in the past (today's slots must not have ended yet), ordered by
    /// date then start time. Each call re-queries the store, so callers always
    /// see live availability.
    pub async fn list_available_slots(
        &self,
        doctor_id: Uuid,
        as_of: DateTime<Utc>,
        auth_token: Option<&str>,
    ) -> Result<Vec<DoctorSlot>, DoctorError> {
        let today = as_of.date_naive();
        let now_time = as_of.time().format("%H:%M:%S");

        let path = format!(
            "/rest/v1/doctor_slots?doctor_id=eq.{}&is_available=eq.true\
             &or=(slot_date.gt.{},and(slot_date.eq.{},end_time.gt.{}))\
             &order=slot_date.asc,start_time.asc",
            doctor_id, today, today, now_time
        );

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, auth_token, None)
            .await
            .map_err(|e| DoctorError::DatabaseError(e.to_string()))?;

        let slots: Vec<DoctorSlot> = result
            .into_iter()
            .map(|row| serde_json::from_value(row))
            .collect::<Result<Vec<DoctorSlot>, _>>()
            .map_err(|e| DoctorError::DatabaseError(format!("Failed to parse slots: {}", e)))?;

        debug!(
            "Found {} bookable slots for doctor {} as of {}",
            slots.len(),
            doctor_id,
            as_of
        );
        Ok(slots)
    }

    pub async fn get_slot(
        &self,
        slot_id: Uuid,
        auth_token: Option<&str>,
    ) -> Result<DoctorSlot, DoctorError> {
        let path = format!("/rest/v1/doctor_slots?id=eq.{}", slot_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, auth_token, None)
            .await
            .map_err(|e| DoctorError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(DoctorError::SlotNotFound);
        }

        serde_json::from_value(result[0].clone())
            .map_err(|e| DoctorError::DatabaseError(format!("Failed to parse slot: {}", e)))
    }

    /// Conditionally take a slot out of circulation: the update only applies
    /// while `is_available` is still true, so of two concurrent claimants
    /// exactly one sees a row come back. Returns whether this caller won.
    pub async fn claim(&self, slot_id: Uuid, auth_token: &str) -> Result<bool, DoctorError> {
        let path = format!(
            "/rest/v1/doctor_slots?id=eq.{}&is_available=eq.true",
            slot_id
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
                Some(json!({ "is_available": false })),
                Some(headers),
            )
            .await
            .map_err(|e| DoctorError::DatabaseError(e.to_string()))?;

        Ok(!result.is_empty())
    }

    /// Unconditionally set a slot's availability flag. Returns whether the
    /// slot still exists; a missing slot is the caller's decision to tolerate.
    pub async fn set_availability(
        &self,
        slot_id: Uuid,
        available: bool,
        auth_token: &str,
    ) -> Result<bool, DoctorError> {
        let path = format!("/rest/v1/doctor_slots?id=eq.{}", slot_id);

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
                Some(json!({ "is_available": available })),
                Some(headers),
            )
            .await
            .map_err(|e| DoctorError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            warn!("Slot {} no longer exists, availability not updated", slot_id);
            return Ok(false);
        }

        Ok(true)
    }
}
