use std::sync::Arc;

use assert_matches::assert_matches;
use axum::{
    body::Body,
    extract::{Extension, Path, Query, State},
    http::{Request, StatusCode},
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_cell::handlers::*;
use appointment_cell::router::appointment_routes;
use appointment_cell::services::booking::CONFIRMATION_NOTICE;
use shared_models::{auth::User, error::AppError};
use shared_utils::test_utils::{JwtTestUtils, MockSupabaseResponses, TestConfig, TestUser};

const DOCTOR_ID: &str = "D1";
const DATE: &str = "5/3/2025";

fn patient() -> TestUser {
    TestUser::patient("jane@example.com")
}

fn create_test_user_extension(user: &TestUser) -> Extension<User> {
    Extension(user.to_user())
}

fn create_auth_header(token: &str) -> TypedHeader<Authorization<Bearer>> {
    let auth = Authorization::bearer(token).unwrap();
    TypedHeader(auth)
}

fn book_request(time: &str, acknowledged: bool) -> Json<BookAppointmentRequest> {
    Json(BookAppointmentRequest {
        doctor_id: DOCTOR_ID.to_string(),
        date: DATE.to_string(),
        time: time.to_string(),
        acknowledged,
    })
}

async fn mount_profiles(mock_server: &MockServer, patient_id: &str, capacity: Value) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .and(query_param("id", format!("eq.{}", DOCTOR_ID)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::doctor_profile_response(DOCTOR_ID, capacity)
        ])))
        .mount(mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .and(query_param("id", format!("eq.{}", patient_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::patient_profile_response(patient_id, "Jane", "Doe")
        ])))
        .mount(mock_server)
        .await;
}

async fn mount_booked_count(mock_server: &MockServer, booked: u64) {
    let range = if booked == 0 {
        "*/0".to_string()
    } else {
        format!("0-{}/{}", booked - 1, booked)
    };

    Mock::given(method("HEAD"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("doctorId", format!("eq.{}", DOCTOR_ID)))
        .and(query_param("date", format!("eq.{}", DATE)))
        .and(query_param("status", "eq.Booked"))
        .respond_with(ResponseTemplate::new(200).insert_header("Content-Range", range.as_str()))
        .mount(mock_server)
        .await;
}

// ==============================================================================
// SLOT VALIDATION
// ==============================================================================

#[tokio::test]
async fn test_validate_slot_accepts_clinic_hours() {
    let config = TestConfig::default().to_arc();

    let Json(body) = validate_slot(
        State(config),
        Json(ValidateSlotRequest { time: "09:00 AM".to_string() }),
    )
    .await;

    assert_eq!(body["accepted"], true);
    assert!(body["message"].is_null());
}

#[tokio::test]
async fn test_validate_slot_rejects_closing_hour() {
    let config = TestConfig::default().to_arc();

    let Json(body) = validate_slot(
        State(config),
        Json(ValidateSlotRequest { time: "10:00 PM".to_string() }),
    )
    .await;

    assert_eq!(body["accepted"], false);
    assert_eq!(body["message"], "Please select a time between 9:00 AM and 9:59 PM");
}

// ==============================================================================
// CAPACITY
// ==============================================================================

#[tokio::test]
async fn test_get_doctor_capacity() {
    let mock_server = MockServer::start().await;
    let user = patient();
    mount_profiles(&mock_server, &user.id, json!(30)).await;
    mount_booked_count(&mock_server, 29).await;

    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_arc();
    let token = JwtTestUtils::create_test_token(&user, &config.supabase_jwt_secret, None);

    let result = get_doctor_capacity(
        State(config),
        create_auth_header(&token),
        create_test_user_extension(&user),
        Path(DOCTOR_ID.to_string()),
        Query(DateQuery { date: DATE.to_string() }),
    )
    .await;

    let Json(body) = result.unwrap();
    assert_eq!(body["booked"], 29);
    assert_eq!(body["capacity"], 30);
    assert_eq!(body["available"], 1);
}

#[tokio::test]
async fn test_get_doctor_capacity_unknown_doctor() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_arc();
    let user = patient();

    let result = get_doctor_capacity(
        State(config),
        create_auth_header("token"),
        create_test_user_extension(&user),
        Path("missing".to_string()),
        Query(DateQuery { date: DATE.to_string() }),
    )
    .await;

    assert_matches!(result, Err(AppError::NotFound(_)));
}

// ==============================================================================
// BOOKING
// ==============================================================================

#[tokio::test]
async fn test_book_appointment_created() {
    let mock_server = MockServer::start().await;
    let user = patient();
    mount_profiles(&mock_server, &user.id, json!("30")).await;
    mount_booked_count(&mock_server, 29).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseResponses::appointment_response(DOCTOR_ID, &user.id, DATE, "10:30 AM")
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/notifications"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([{ "id": 1 }])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_arc();

    let result = book_appointment(
        State(config),
        create_auth_header("token"),
        create_test_user_extension(&user),
        book_request("10:30 AM", true),
    )
    .await;

    let (status, Json(body)) = result.unwrap();
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Appointment booked successfully");
    assert_eq!(body["appointment"]["status"], "Booked");
    assert_eq!(body["appointment"]["time"], "10:30 AM");
}

#[tokio::test]
async fn test_book_appointment_capacity_reached() {
    let mock_server = MockServer::start().await;
    let user = patient();
    mount_profiles(&mock_server, &user.id, json!(30)).await;
    mount_booked_count(&mock_server, 30).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&mock_server)
        .await;

    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_arc();

    let result = book_appointment(
        State(config),
        create_auth_header("token"),
        create_test_user_extension(&user),
        book_request("10:30 AM", true),
    )
    .await;

    let error = result.unwrap_err();
    assert_eq!(error.status_code(), StatusCode::CONFLICT);
    assert_matches!(
        error,
        AppError::CapacityReached { current: 30, max: 30, ref message }
            if message == "This doctor is fully booked on 5/3/2025 (30/30 patients). Please choose another date."
    );
}

#[tokio::test]
async fn test_book_appointment_requires_acknowledgement() {
    let config = TestConfig::default().to_arc();
    let user = patient();

    let result = book_appointment(
        State(config),
        create_auth_header("token"),
        create_test_user_extension(&user),
        book_request("10:30 AM", false),
    )
    .await;

    assert_matches!(result, Err(AppError::BadRequest(ref msg)) if msg == CONFIRMATION_NOTICE);
}

#[tokio::test]
async fn test_book_appointment_rejects_out_of_hours_time() {
    let config = TestConfig::default().to_arc();
    let user = patient();

    let result = book_appointment(
        State(config),
        create_auth_header("token"),
        create_test_user_extension(&user),
        book_request("08:59 AM", true),
    )
    .await;

    assert_matches!(
        result,
        Err(AppError::ValidationError(ref msg)) if msg == "Please select a time between 9:00 AM and 9:59 PM"
    );
}

#[tokio::test]
async fn test_book_appointment_store_failure_is_bad_gateway() {
    let mock_server = MockServer::start().await;
    let user = patient();
    mount_profiles(&mock_server, &user.id, json!(30)).await;
    mount_booked_count(&mock_server, 3).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(500).set_body_json(
            MockSupabaseResponses::error_response("connection reset", "XX000"),
        ))
        .mount(&mock_server)
        .await;

    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_arc();

    let result = book_appointment(
        State(config),
        create_auth_header("token"),
        create_test_user_extension(&user),
        book_request("10:30 AM", true),
    )
    .await;

    let error = result.unwrap_err();
    assert_eq!(error.status_code(), StatusCode::BAD_GATEWAY);
    assert_matches!(error, AppError::ExternalService(ref msg) if msg.starts_with("Failed to book appointment: "));
}

#[tokio::test]
async fn test_book_appointment_unknown_doctor_is_not_found() {
    let mock_server = MockServer::start().await;
    let user = patient();

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::patient_profile_response(&user.id, "Jane", "Doe")
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_arc();

    let result = book_appointment(
        State(config),
        create_auth_header("token"),
        create_test_user_extension(&user),
        book_request("10:30 AM", true),
    )
    .await;

    let error = result.unwrap_err();
    assert_eq!(error.status_code(), StatusCode::NOT_FOUND);
    assert_matches!(error, AppError::NotFound(ref msg) if msg.contains("Doctor not found"));
}

#[tokio::test]
async fn test_book_appointment_normalizes_labels() {
    let mock_server = MockServer::start().await;
    let user = patient();
    mount_profiles(&mock_server, &user.id, json!(30)).await;
    mount_booked_count(&mock_server, 0).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .and(body_partial_json(json!({ "date": DATE, "time": "09:05 AM" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseResponses::appointment_response(DOCTOR_ID, &user.id, DATE, "09:05 AM")
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/notifications"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([{ "id": 1 }])))
        .mount(&mock_server)
        .await;

    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_arc();

    let result = book_appointment(
        State(config),
        create_auth_header("token"),
        create_test_user_extension(&user),
        Json(BookAppointmentRequest {
            doctor_id: DOCTOR_ID.to_string(),
            date: "05/03/2025".to_string(),
            time: "9:05 am".to_string(),
            acknowledged: true,
        }),
    )
    .await;

    let (status, _) = result.unwrap();
    assert_eq!(status, StatusCode::CREATED);
}

// ==============================================================================
// ROUTER
// ==============================================================================

#[tokio::test]
async fn test_routes_require_bearer_token() {
    let app = appointment_routes(TestConfig::default().to_arc());

    let request = Request::builder()
        .method("POST")
        .uri("/slots/validate")
        .header("content-type", "application/json")
        .body(Body::from(json!({ "time": "10:00 AM" }).to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_routes_reject_expired_token() {
    let config = TestConfig::default();
    let user = patient();
    let token = JwtTestUtils::create_expired_token(&user, &config.jwt_secret);
    let app = appointment_routes(config.to_arc());

    let request = Request::builder()
        .method("POST")
        .uri("/slots/validate")
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {}", token))
        .body(Body::from(json!({ "time": "10:00 AM" }).to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_capacity_route_with_valid_token() {
    let mock_server = MockServer::start().await;
    let user = patient();
    mount_profiles(&mock_server, &user.id, json!(10)).await;
    mount_booked_count(&mock_server, 4).await;

    let config = TestConfig::with_supabase_url(&mock_server.uri());
    let token = JwtTestUtils::create_test_token(&user, &config.jwt_secret, None);
    let app = appointment_routes(config.to_arc());

    let request = Request::builder()
        .method("GET")
        .uri(format!("/doctors/{}/capacity?date=5%2F3%2F2025", DOCTOR_ID))
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["doctor_id"], DOCTOR_ID);
    assert_eq!(json["available"], 6);
}
