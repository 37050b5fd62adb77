// libs/availability-cell/tests/supabase_store_test.rs
use assert_matches::assert_matches;
use chrono::{Duration, NaiveDate, NaiveTime, Utc};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use availability_cell::models::{SlotError, SlotKey};
use availability_cell::services::{
    DoctorDirectory, SlotStore, SupabaseDoctorDirectory, SupabaseSlotStore,
};
use shared_database::SupabaseClient;
use shared_utils::test_utils::{MockSupabaseResponses, TestConfig};

fn client(server: &MockServer) -> SupabaseClient {
    SupabaseClient::new(&TestConfig::with_supabase_url(&server.uri()).to_app_config())
}

fn future_date() -> NaiveDate {
    (Utc::now() + Duration::days(3)).date_naive()
}

fn key(doctor_id: Uuid) -> SlotKey {
    SlotKey::new(
        doctor_id,
        future_date(),
        NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
        NaiveTime::from_hms_opt(10, 30, 0).unwrap(),
    )
}

fn slot_json(slot_id: Uuid, doctor_id: Uuid, booked: bool) -> serde_json::Value {
    MockSupabaseResponses::slot_response(
        &slot_id.to_string(),
        &doctor_id.to_string(),
        &future_date().to_string(),
        "10:00:00",
        "10:30:00",
        booked,
    )
}

#[tokio::test]
async fn insert_posts_identity_and_asks_for_representation() {
    let server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();
    let slot_id = Uuid::new_v4();

    Mock::given(method("POST"))
        .and(path("/rest/v1/availability_slots"))
        .and(header("Prefer", "return=representation"))
        .and(body_partial_json(json!({
            "doctor_id": doctor_id,
            "start_time": "10:00:00",
            "end_time": "10:30:00",
            "is_booked": false
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([slot_json(slot_id, doctor_id, false)])))
        .expect(1)
        .mount(&server)
        .await;

    let store = SupabaseSlotStore::new(client(&server));
    let slot = store.insert_slot(key(doctor_id)).await.unwrap();

    assert_eq!(slot.id, slot_id);
    assert!(!slot.is_booked);
}

#[tokio::test]
async fn unique_violation_becomes_overlap() {
    let server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();

    Mock::given(method("POST"))
        .and(path("/rest/v1/availability_slots"))
        .respond_with(ResponseTemplate::new(409).set_body_json(
            MockSupabaseResponses::error_response("duplicate key value violates unique constraint", "23505"),
        ))
        .mount(&server)
        .await;

    let store = SupabaseSlotStore::new(client(&server));
    let result = store.insert_slot(key(doctor_id)).await;

    assert_matches!(result, Err(SlotError::Overlap(k)) if k == key(doctor_id));
}

#[tokio::test]
async fn list_requests_date_then_start_ordering() {
    let server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/availability_slots"))
        .and(query_param("doctor_id", format!("eq.{}", doctor_id)))
        .and(query_param("order", "date.asc,start_time.asc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            slot_json(Uuid::new_v4(), doctor_id, false),
            slot_json(Uuid::new_v4(), doctor_id, true)
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let store = SupabaseSlotStore::new(client(&server));
    let slots = store.list_slots(doctor_id, None).await.unwrap();

    assert_eq!(slots.len(), 2);
}

#[tokio::test]
async fn guarded_delete_of_booked_slot_reports_slot_booked() {
    let server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();
    let slot_id = Uuid::new_v4();

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/availability_slots"))
        .and(query_param("is_booked", "eq.false"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/availability_slots"))
        .and(query_param("id", format!("eq.{}", slot_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([slot_json(slot_id, doctor_id, true)])))
        .mount(&server)
        .await;

    let store = SupabaseSlotStore::new(client(&server));

    assert_matches!(store.delete_unbooked_slot(slot_id).await, Err(SlotError::SlotBooked));
}

#[tokio::test]
async fn delete_of_slot_with_appointment_history_reports_in_use() {
    let server = MockServer::start().await;
    let slot_id = Uuid::new_v4();

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/availability_slots"))
        .and(query_param("id", format!("eq.{}", slot_id)))
        .respond_with(ResponseTemplate::new(409).set_body_json(MockSupabaseResponses::error_response(
            "update or delete on table \"availability_slots\" violates foreign key constraint",
            "23503",
        )))
        .expect(1)
        .mount(&server)
        .await;

    let store = SupabaseSlotStore::new(client(&server));

    assert_matches!(store.delete_unbooked_slot(slot_id).await, Err(SlotError::InUse));
}

#[tokio::test]
async fn guarded_update_of_missing_slot_reports_not_found() {
    let server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();
    let slot_id = Uuid::new_v4();

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/availability_slots"))
        .and(query_param("id", format!("eq.{}", slot_id)))
        .and(query_param("is_booked", "eq.false"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/availability_slots"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let store = SupabaseSlotStore::new(client(&server));

    assert_matches!(
        store.update_unbooked_slot(slot_id, key(doctor_id)).await,
        Err(SlotError::NotFound)
    );
}

#[tokio::test]
async fn directory_hides_inactive_doctors() {
    let server = MockServer::start().await;
    let active = Uuid::new_v4();
    let inactive = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .and(query_param("id", format!("eq.{}", active)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::doctor_response(&active.to_string(), "a@example.com", "Dr. A", true)
        ])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .and(query_param("id", format!("eq.{}", inactive)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::doctor_response(&inactive.to_string(), "b@example.com", "Dr. B", false)
        ])))
        .mount(&server)
        .await;

    let directory = SupabaseDoctorDirectory::new(client(&server));

    let doctor = directory.find_doctor(active).await.unwrap().unwrap();
    assert_eq!(doctor.display_name, "Dr. A");
    assert!(directory.find_doctor(inactive).await.unwrap().is_none());
}
