// libs/availability-cell/tests/handlers_test.rs
use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use availability_cell::router::availability_routes;
use availability_cell::services::{AvailabilityService, SupabaseDoctorDirectory, SupabaseSlotStore};
use shared_database::SupabaseClient;
use shared_utils::test_utils::{JwtTestUtils, MockSupabaseResponses, TestConfig, TestUser};

struct TestApp {
    router: Router,
    config: TestConfig,
}

impl TestApp {
    fn new(server: &MockServer) -> Self {
        let config = TestConfig::with_supabase_url(&server.uri());
        let supabase = SupabaseClient::new(&config.to_app_config());
        let service = Arc::new(AvailabilityService::new(
            Arc::new(SupabaseSlotStore::new(supabase.clone())),
            Arc::new(SupabaseDoctorDirectory::new(supabase)),
        ));

        Self {
            router: availability_routes(config.to_arc(), service),
            config,
        }
    }

    async fn send(&self, user: &TestUser, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let token = JwtTestUtils::create_test_token(user, &self.config.jwt_secret, None);
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("Authorization", format!("Bearer {}", token))
            .header("Content-Type", "application/json")
            .body(match body {
                Some(json) => Body::from(json.to_string()),
                None => Body::empty(),
            })
            .unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };

        (status, value)
    }
}

async fn mount_doctor(server: &MockServer, doctor: &TestUser, active: bool) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .and(query_param("id", format!("eq.{}", doctor.id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::doctor_response(&doctor.id, &doctor.email, "Dr. Test", active)
        ])))
        .mount(server)
        .await;
}

#[tokio::test]
async fn doctor_creates_slot() {
    let server = MockServer::start().await;
    let doctor = TestUser::doctor("doctor@example.com");
    let date = (Utc::now() + Duration::days(2)).date_naive().to_string();
    mount_doctor(&server, &doctor, true).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/availability_slots"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseResponses::slot_response(&Uuid::new_v4().to_string(), &doctor.id, &date, "10:00:00", "10:30:00", false)
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let app = TestApp::new(&server);
    let (status, body) = app
        .send(&doctor, "POST", "/", Some(json!({"date": date, "start_time": "10:00:00", "end_time": "10:30:00"})))
        .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(body["slot"]["doctor_id"], json!(doctor.id));
}

#[tokio::test]
async fn slot_in_the_past_is_rejected_without_touching_storage() {
    let server = MockServer::start().await;
    let doctor = TestUser::doctor("doctor@example.com");
    let yesterday = (Utc::now() - Duration::days(1)).date_naive().to_string();

    Mock::given(method("POST"))
        .and(path("/rest/v1/availability_slots"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let app = TestApp::new(&server);
    let (status, body) = app
        .send(&doctor, "POST", "/", Some(json!({"date": yesterday, "start_time": "10:00:00", "end_time": "10:30:00"})))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("past"));
}

#[tokio::test]
async fn patients_cannot_manage_slots() {
    let server = MockServer::start().await;
    let patient = TestUser::patient("patient@example.com");
    let date = (Utc::now() + Duration::days(2)).date_naive().to_string();

    let app = TestApp::new(&server);
    let (status, _) = app
        .send(&patient, "POST", "/", Some(json!({"date": date, "start_time": "10:00:00", "end_time": "10:30:00"})))
        .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn other_doctors_slots_are_not_found() {
    let server = MockServer::start().await;
    let owner = TestUser::doctor("owner@example.com");
    let intruder = TestUser::doctor("intruder@example.com");
    let slot_id = Uuid::new_v4();
    let date = (Utc::now() + Duration::days(2)).date_naive().to_string();

    Mock::given(method("GET"))
        .and(path("/rest/v1/availability_slots"))
        .and(query_param("id", format!("eq.{}", slot_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::slot_response(&slot_id.to_string(), &owner.id, &date, "10:00:00", "10:30:00", false)
        ])))
        .mount(&server)
        .await;

    let app = TestApp::new(&server);

    let (status, _) = app.send(&intruder, "GET", &format!("/{}", slot_id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app.send(&owner, "GET", &format!("/{}", slot_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], json!(slot_id));
}

#[tokio::test]
async fn booked_slot_cannot_be_deleted() {
    let server = MockServer::start().await;
    let doctor = TestUser::doctor("doctor@example.com");
    let slot_id = Uuid::new_v4();
    let date = (Utc::now() + Duration::days(2)).date_naive().to_string();

    Mock::given(method("GET"))
        .and(path("/rest/v1/availability_slots"))
        .and(query_param("id", format!("eq.{}", slot_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::slot_response(&slot_id.to_string(), &doctor.id, &date, "10:00:00", "10:30:00", true)
        ])))
        .mount(&server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/availability_slots"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let app = TestApp::new(&server);
    let (status, _) = app.send(&doctor, "DELETE", &format!("/{}", slot_id), None).await;

    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn available_slots_filters_booked_and_requires_active_doctor() {
    let server = MockServer::start().await;
    let doctor = TestUser::doctor("doctor@example.com");
    let retired = TestUser::doctor("retired@example.com");
    let patient = TestUser::patient("patient@example.com");
    let date = (Utc::now() + Duration::days(2)).date_naive().to_string();
    mount_doctor(&server, &doctor, true).await;
    mount_doctor(&server, &retired, false).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/availability_slots"))
        .and(query_param("doctor_id", format!("eq.{}", doctor.id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::slot_response(&Uuid::new_v4().to_string(), &doctor.id, &date, "09:00:00", "09:30:00", true),
            MockSupabaseResponses::slot_response(&Uuid::new_v4().to_string(), &doctor.id, &date, "10:00:00", "10:30:00", false)
        ])))
        .mount(&server)
        .await;

    let app = TestApp::new(&server);

    let (status, body) = app
        .send(&patient, "GET", &format!("/available-slots?doctor_id={}&date={}", doctor.id, date), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["slots"][0]["start_time"], "10:00:00");
    assert_eq!(body["slots"][0]["is_available"], true);

    let (status, _) = app
        .send(&patient, "GET", &format!("/available-slots?doctor_id={}", retired.id), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn requests_without_token_are_unauthorized() {
    let server = MockServer::start().await;
    let app = TestApp::new(&server);

    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
