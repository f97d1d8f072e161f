use assert_matches::assert_matches;
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_cell::models::{AppointmentError, AppointmentStatus, TransitionAction};
use appointment_cell::services::AppointmentLifecycleService;
use shared_utils::test_utils::{MockSupabaseResponses, TestConfig};

fn service_for(mock_server: &MockServer) -> AppointmentLifecycleService {
    let mut config = TestConfig::default().to_app_config();
    config.supabase_url = mock_server.uri();
    AppointmentLifecycleService::new(&config)
}

struct Scenario {
    appointment_id: Uuid,
    patient_id: Uuid,
    doctor_id: Uuid,
    doctor_user_id: Uuid,
    slot_id: Uuid,
}

impl Scenario {
    fn new() -> Self {
        Self {
            appointment_id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            doctor_id: Uuid::new_v4(),
            doctor_user_id: Uuid::new_v4(),
            slot_id: Uuid::new_v4(),
        }
    }

    fn appointment_row(&self, status: &str) -> serde_json::Value {
        MockSupabaseResponses::appointment_response(
            &self.appointment_id.to_string(),
            &self.patient_id.to_string(),
            &self.doctor_id.to_string(),
            Some(self.slot_id.to_string().as_str()),
            status,
        )
    }

    /// The current appointment row, as the initial fetch sees it.
    async fn mount_appointment_fetch(&self, mock_server: &MockServer, status: &str) {
        Mock::given(method("GET"))
            .and(path("/rest/v1/appointments"))
            .and(query_param("id", format!("eq.{}", self.appointment_id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                self.appointment_row(status)
            ])))
            .mount(mock_server)
            .await;
    }

    /// Actor resolution: the doctor's user owns a doctor profile.
    async fn mount_doctor_role(&self, mock_server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/rest/v1/doctors"))
            .and(query_param("user_id", format!("eq.{}", self.doctor_user_id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                MockSupabaseResponses::doctor_response(
                    &self.doctor_id.to_string(),
                    &self.doctor_user_id.to_string(),
                    "Dr. Sharma",
                )
            ])))
            .mount(mock_server)
            .await;
    }

    /// Actor resolution: the patient's user has no doctor profile.
    async fn mount_patient_role(&self, mock_server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/rest/v1/doctors"))
            .and(query_param("user_id", format!("eq.{}", self.patient_id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(mock_server)
            .await;
    }

    /// The conditional status write, guarded on the expected current status.
    async fn mount_status_update(
        &self,
        mock_server: &MockServer,
        expected_from: &str,
        resulting_status: &str,
    ) {
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/appointments"))
            .and(query_param("id", format!("eq.{}", self.appointment_id)))
            .and(query_param("status", format!("eq.{}", expected_from)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                self.appointment_row(resulting_status)
            ])))
            .mount(mock_server)
            .await;
    }
}

#[tokio::test]
async fn doctor_confirms_pending_appointment() {
    let mock_server = MockServer::start().await;
    let s = Scenario::new();

    s.mount_appointment_fetch(&mock_server, "pending").await;
    s.mount_doctor_role(&mock_server).await;
    s.mount_status_update(&mock_server, "pending", "confirmed").await;

    // Confirm re-asserts the slot as unavailable.
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/doctor_slots"))
        .and(query_param("id", format!("eq.{}", s.slot_id)))
        .and(body_json(json!({ "is_available": false })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::slot_response(
                &s.slot_id.to_string(),
                &s.doctor_id.to_string(),
                "2025-03-10",
                "09:00:00",
                "09:30:00",
                false,
            )
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let service = service_for(&mock_server);
    let updated = service
        .transition(
            s.appointment_id,
            &s.doctor_user_id.to_string(),
            TransitionAction::Confirm,
            "test-token",
        )
        .await
        .unwrap();

    assert_eq!(updated.status, AppointmentStatus::Confirmed);
}

#[tokio::test]
async fn patient_confirm_is_always_unauthorized() {
    let mock_server = MockServer::start().await;
    let s = Scenario::new();

    s.mount_appointment_fetch(&mock_server, "pending").await;
    s.mount_patient_role(&mock_server).await;
    // No PATCH mocks: an unauthorized confirm must not write anything.

    let service = service_for(&mock_server);
    let err = service
        .transition(
            s.appointment_id,
            &s.patient_id.to_string(),
            TransitionAction::Confirm,
            "test-token",
        )
        .await
        .unwrap_err();

    assert_matches!(err, AppointmentError::Unauthorized);
}

#[tokio::test]
async fn patient_cancel_releases_the_slot() {
    let mock_server = MockServer::start().await;
    let s = Scenario::new();

    s.mount_appointment_fetch(&mock_server, "confirmed").await;
    s.mount_patient_role(&mock_server).await;
    s.mount_status_update(&mock_server, "confirmed", "cancelled").await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/doctor_slots"))
        .and(query_param("id", format!("eq.{}", s.slot_id)))
        .and(body_json(json!({ "is_available": true })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::slot_response(
                &s.slot_id.to_string(),
                &s.doctor_id.to_string(),
                "2025-03-10",
                "09:00:00",
                "09:30:00",
                true,
            )
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let service = service_for(&mock_server);
    let updated = service
        .transition(
            s.appointment_id,
            &s.patient_id.to_string(),
            TransitionAction::Cancel,
            "test-token",
        )
        .await
        .unwrap();

    assert_eq!(updated.status, AppointmentStatus::Cancelled);
}

#[tokio::test]
async fn cancel_survives_administratively_deleted_slot() {
    let mock_server = MockServer::start().await;
    let s = Scenario::new();

    s.mount_appointment_fetch(&mock_server, "pending").await;
    s.mount_patient_role(&mock_server).await;
    s.mount_status_update(&mock_server, "pending", "cancelled").await;

    // Slot gone: the conditional update matches nothing.
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/doctor_slots"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let service = service_for(&mock_server);
    let updated = service
        .transition(
            s.appointment_id,
            &s.patient_id.to_string(),
            TransitionAction::Cancel,
            "test-token",
        )
        .await
        .unwrap();

    assert_eq!(updated.status, AppointmentStatus::Cancelled);
}

#[tokio::test]
async fn double_confirm_fails_on_the_conditional_write() {
    let mock_server = MockServer::start().await;
    let s = Scenario::new();

    // The fetch still shows pending (stale view), but the conditional write
    // finds the status already moved on.
    s.mount_appointment_fetch(&mock_server, "pending").await;
    s.mount_doctor_role(&mock_server).await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("status", "eq.pending"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let service = service_for(&mock_server);
    let err = service
        .transition(
            s.appointment_id,
            &s.doctor_user_id.to_string(),
            TransitionAction::Confirm,
            "test-token",
        )
        .await
        .unwrap_err();

    assert_matches!(err, AppointmentError::InvalidTransition { .. });
}

#[tokio::test]
async fn terminal_states_reject_all_actions_without_writes() {
    for (status, action) in [
        ("cancelled", TransitionAction::Confirm),
        ("cancelled", TransitionAction::Complete),
        ("completed", TransitionAction::Cancel),
        ("completed", TransitionAction::Confirm),
    ] {
        let mock_server = MockServer::start().await;
        let s = Scenario::new();

        s.mount_appointment_fetch(&mock_server, status).await;
        s.mount_doctor_role(&mock_server).await;
        // No PATCH mocks mounted: a write would fail the test loudly.

        let service = service_for(&mock_server);
        let err = service
            .transition(
                s.appointment_id,
                &s.doctor_user_id.to_string(),
                action,
                "test-token",
            )
            .await
            .unwrap_err();

        assert_matches!(err, AppointmentError::InvalidTransition { .. });
    }
}

#[tokio::test]
async fn doctor_completes_confirmed_appointment_without_slot_change() {
    let mock_server = MockServer::start().await;
    let s = Scenario::new();

    s.mount_appointment_fetch(&mock_server, "confirmed").await;
    s.mount_doctor_role(&mock_server).await;
    s.mount_status_update(&mock_server, "confirmed", "completed").await;
    // No doctor_slots mock: completion must not touch the slot.

    let service = service_for(&mock_server);
    let updated = service
        .transition(
            s.appointment_id,
            &s.doctor_user_id.to_string(),
            TransitionAction::Complete,
            "test-token",
        )
        .await
        .unwrap();

    assert_eq!(updated.status, AppointmentStatus::Completed);
}

#[tokio::test]
async fn foreign_doctor_cannot_drive_the_state_machine() {
    let mock_server = MockServer::start().await;
    let s = Scenario::new();
    let other_doctor_user = Uuid::new_v4();

    s.mount_appointment_fetch(&mock_server, "pending").await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .and(query_param("user_id", format!("eq.{}", other_doctor_user)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::doctor_response(
                &Uuid::new_v4().to_string(),
                &other_doctor_user.to_string(),
                "Dr. Stranger",
            )
        ])))
        .mount(&mock_server)
        .await;

    let service = service_for(&mock_server);
    let err = service
        .transition(
            s.appointment_id,
            &other_doctor_user.to_string(),
            TransitionAction::Confirm,
            "test-token",
        )
        .await
        .unwrap_err();

    assert_matches!(err, AppointmentError::Unauthorized);
}
