//! N concurrent booking attempts against one slot: exactly one wins.
//!
//! The store is mocked so that the first appointment insert succeeds and
//! every later one trips the active-appointment-per-slot uniqueness
//! constraint with a 409, which is how PostgREST surfaces the partial unique
//! index the schema carries.

use std::sync::Arc;

use futures::future::join_all;
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_cell::models::{AppointmentError, AppointmentType, BookAppointmentRequest};
use appointment_cell::services::AppointmentBookingService;
use shared_utils::test_utils::{MockSupabaseResponses, TestConfig};

const CONCURRENT_ATTEMPTS: usize = 8;

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_bookings_for_one_slot_yield_exactly_one_winner() {
    let mock_server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();
    let slot_id = Uuid::new_v4();
    let appointment_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .and(query_param("id", format!("eq.{}", doctor_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::doctor_response(
                &doctor_id.to_string(),
                &Uuid::new_v4().to_string(),
                "Dr. Sharma",
            )
        ])))
        .mount(&mock_server)
        .await;

    // Every attempt re-checks the same listing-time snapshot: slot available,
    // no active appointment yet. The race is decided at the insert.
    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_slots"))
        .and(query_param("id", format!("eq.{}", slot_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::slot_response(
                &slot_id.to_string(),
                &doctor_id.to_string(),
                "2099-03-10",
                "09:00:00",
                "09:30:00",
                true,
            )
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("slot_id", format!("eq.{}", slot_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    // First insert wins...
    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseResponses::appointment_response(
                &appointment_id.to_string(),
                &Uuid::new_v4().to_string(),
                &doctor_id.to_string(),
                Some(slot_id.to_string().as_str()),
                "pending",
            )
        ])))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;

    // ...every later one hits the unique constraint.
    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "message": "duplicate key value violates unique constraint \"uniq_active_appointment_per_slot\""
        })))
        .mount(&mock_server)
        .await;

    // Only the winner reaches the claim.
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/doctor_slots"))
        .and(query_param("id", format!("eq.{}", slot_id)))
        .and(query_param("is_available", "eq.true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::slot_response(
                &slot_id.to_string(),
                &doctor_id.to_string(),
                "2099-03-10",
                "09:00:00",
                "09:30:00",
                false,
            )
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut config = TestConfig::default().to_app_config();
    config.supabase_url = mock_server.uri();
    let service = Arc::new(AppointmentBookingService::new(&config));

    let attempts = (0..CONCURRENT_ATTEMPTS).map(|_| {
        let service = Arc::clone(&service);
        let request = BookAppointmentRequest {
            patient_id: Uuid::new_v4(),
            doctor_id,
            slot_id: Some(slot_id),
            appointment_date: None,
            appointment_time: None,
            reason: "Persistent headache".to_string(),
            appointment_type: AppointmentType::Unpaid,
        };
        tokio::spawn(async move { service.book_appointment(request, "test-token").await })
    });

    let outcomes: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.expect("booking task panicked"))
        .collect();

    let successes = outcomes.iter().filter(|r| r.is_ok()).count();
    let lost_races = outcomes
        .iter()
        .filter(|r| matches!(r, Err(AppointmentError::SlotNoLongerAvailable)))
        .count();

    assert_eq!(successes, 1, "exactly one booking must win the slot");
    assert_eq!(lost_races, CONCURRENT_ATTEMPTS - 1);
}
