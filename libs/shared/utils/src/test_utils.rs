use std::sync::Arc;
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use base64::{Engine as _, engine::general_purpose};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::{AppConfig, BookingConfig, CapacityGuard};
use shared_models::auth::User;

pub struct TestConfig {
    pub jwt_secret: String,
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub capacity_guard: CapacityGuard,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
            capacity_guard: CapacityGuard::Optimistic,
        }
    }
}

impl TestConfig {
    pub fn with_supabase_url(url: &str) -> Self {
        Self {
            supabase_url: url.to_string(),
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            supabase_jwt_secret: self.jwt_secret.clone(),
            port: 3000,
            booking: BookingConfig {
                capacity_guard: self.capacity_guard,
                ..BookingConfig::default()
            },
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct TestUser {
    pub id: String,
    pub email: String,
    pub role: String,
}

impl Default for TestUser {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: "test@example.com".to_string(),
            role: "patient".to_string(),
        }
    }
}

impl TestUser {
    pub fn new(email: &str, role: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            role: role.to_string(),
        }
    }

    pub fn patient(email: &str) -> Self {
        Self::new(email, "patient")
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id.clone(),
            email: Some(self.email.clone()),
            role: Some(self.role.clone()),
            metadata: None,
            created_at: Some(Utc::now()),
        }
    }
}

pub struct JwtTestUtils;

impl JwtTestUtils {
    pub fn create_test_token(user: &TestUser, secret: &str, exp_hours: Option<i64>) -> String {
        let now = Utc::now();
        let exp = now + Duration::hours(exp_hours.unwrap_or(24));

        let header = json!({
            "alg": "HS256",
            "typ": "JWT"
        });

        let payload = json!({
            "sub": user.id,
            "email": user.email,
            "role": user.role,
            "iat": now.timestamp(),
            "exp": exp.timestamp()
        });

        let header_encoded = general_purpose::URL_SAFE_NO_PAD.encode(header.to_string());
        let payload_encoded = general_purpose::URL_SAFE_NO_PAD.encode(payload.to_string());

        let signing_input = format!("{}.{}", header_encoded, payload_encoded);

        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(signing_input.as_bytes());
        let signature_encoded = general_purpose::URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        format!("{}.{}", signing_input, signature_encoded)
    }

    pub fn create_expired_token(user: &TestUser, secret: &str) -> String {
        Self::create_test_token(user, secret, Some(-1))
    }

    pub fn create_invalid_signature_token(user: &TestUser) -> String {
        Self::create_test_token(user, "wrong-secret", Some(24))
    }
}

/// Canned PostgREST rows for the `doctors`, `patients` and `appointments` tables.
pub struct MockSupabaseResponses;

impl MockSupabaseResponses {
    pub fn doctor_profile_response(doctor_id: &str, patient_capacity: Value) -> Value {
        json!({
            "id": doctor_id,
            "fullName": "Dr. Amina Test",
            "email": "doctor@example.com",
            "imageUrl": "https://cdn.example.com/doctors/amina.png",
            "specialty": "General Practice",
            "patientCapacity": patient_capacity
        })
    }

    pub fn patient_profile_response(patient_id: &str, first_name: &str, last_name: &str) -> Value {
        json!({
            "id": patient_id,
            "firstName": first_name,
            "lastName": last_name,
            "email": "patient@example.com",
            "profileImageUrl": null
        })
    }

    pub fn appointment_response(doctor_id: &str, patient_id: &str, date: &str, time: &str) -> Value {
        json!({
            "id": Uuid::new_v4().to_string(),
            "doctorId": doctor_id,
            "doctorName": "Dr. Amina Test",
            "doctorEmail": "doctor@example.com",
            "doctorImage": "https://cdn.example.com/doctors/amina.png",
            "patientId": patient_id,
            "patientName": "Jane Doe",
            "patientEmail": "patient@example.com",
            "patientImage": "",
            "date": date,
            "time": time,
            "status": "Booked",
            "cancelledBy": "",
            "cancelReason": "",
            "timestamp": "2025-03-01T10:00:00Z"
        })
    }

    pub fn error_response(message: &str, code: &str) -> Value {
        json!({
            "message": message,
            "code": code
        })
    }
}
