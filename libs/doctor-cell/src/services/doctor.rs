// libs/doctor-cell/src/services/doctor.rs
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{Doctor, DoctorError, DoctorSearchFilters, UpdateScheduleRequest, WorkingDays};

pub struct DoctorService {
    supabase: SupabaseClient,
}

impl DoctorService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    pub async fn get_doctor(
        &self,
        doctor_id: Uuid,
        auth_token: Option<&str>,
    ) -> Result<Doctor, DoctorError> {
        debug!("Fetching doctor: {}", doctor_id);

        let path = format!("/rest/v1/doctors?id=eq.{}", doctor_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, auth_token, None)
            .await
            .map_err(|e| DoctorError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(DoctorError::NotFound);
        }

        serde_json::from_value(result[0].clone())
            .map_err(|e| DoctorError::DatabaseError(format!("Failed to parse doctor: {}", e)))
    }

    /// Look up the doctor profile owned by an auth user, if any.
    pub async fn get_doctor_by_user(
        &self,
        user_id: &str,
        auth_token: Option<&str>,
    ) -> Result<Option<Doctor>, DoctorError> {
        let path = format!("/rest/v1/doctors?user_id=eq.{}", user_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, auth_token, None)
            .await
            .map_err(|e| DoctorError::DatabaseError(e.to_string()))?;

        match result.into_iter().next() {
            Some(row) => {
                let doctor: Doctor = serde_json::from_value(row).map_err(|e| {
                    DoctorError::DatabaseError(format!("Failed to parse doctor: {}", e))
                })?;
                Ok(Some(doctor))
            }
            None => Ok(None),
        }
    }

    /// Approved-doctor directory with optional name search and specialty
    /// filter, ordered by name.
    pub async fn list_approved(
        &self,
        filters: DoctorSearchFilters,
    ) -> Result<Vec<Doctor>, DoctorError> {
        debug!("Listing approved doctors with filters: {:?}", filters);

        let mut path = "/rest/v1/doctors?is_approved=eq.true".to_string();

        if let Some(q) = filters.q.as_deref().filter(|q| !q.is_empty()) {
            path.push_str(&format!("&full_name=ilike.*{}*", q));
        }
        if let Some(specialty) = filters.specialty.as_deref().filter(|s| !s.is_empty()) {
            path.push_str(&format!("&specialties=cs.{{{}}}", specialty));
        }

        path.push_str("&order=full_name.asc");

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, None, None)
            .await
            .map_err(|e| DoctorError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .map(|row| serde_json::from_value(row))
            .collect::<Result<Vec<Doctor>, _>>()
            .map_err(|e| DoctorError::DatabaseError(format!("Failed to parse doctors: {}", e)))
    }

    /// Update the declared recurring schedule. The raw working-days descriptor
    /// is parsed here and persisted in canonical form; nothing downstream ever
    /// sees the free-text input.
    pub async fn update_schedule(
        &self,
        doctor_id: Uuid,
        request: UpdateScheduleRequest,
        auth_token: &str,
    ) -> Result<Doctor, DoctorError> {
        debug!("Updating schedule for doctor: {}", doctor_id);

        let working_days = match request.working_days.as_deref() {
            Some(raw) => Some(
                raw.parse::<WorkingDays>()
                    .map_err(DoctorError::ValidationError)?,
            ),
            None => None,
        };

        if let (Some(start), Some(end)) = (request.work_start_time, request.work_end_time) {
            if start >= end {
                return Err(DoctorError::InvalidTime(
                    "Daily start time must be before end time".to_string(),
                ));
            }
        }

        let mut update_data = serde_json::Map::new();
        if let Some(days) = working_days {
            update_data.insert("working_days".to_string(), json!(days.to_string()));
        }
        if let Some(start) = request.work_start_time {
            update_data.insert(
                "work_start_time".to_string(),
                json!(start.format("%H:%M:%S").to_string()),
            );
        }
        if let Some(end) = request.work_end_time {
            update_data.insert(
                "work_end_time".to_string(),
                json!(end.format("%H:%M:%S").to_string()),
            );
        }
        update_data.insert(
            "updated_at".to_string(),
            json!(chrono::Utc::now().to_rfc3339()),
        );

        let path = format!("/rest/v1/doctors?id=eq.{}", doctor_id);
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
                Some(Value::Object(update_data)),
                Some(headers),
            )
            .await
            .map_err(|e| DoctorError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(DoctorError::NotFound);
        }

        let doctor: Doctor = serde_json::from_value(result[0].clone())
            .map_err(|e| DoctorError::DatabaseError(format!("Failed to parse doctor: {}", e)))?;

        info!("Schedule updated for doctor {}", doctor_id);
        Ok(doctor)
    }
}
