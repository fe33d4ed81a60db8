use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Claims carried by a Supabase-issued access token.
#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String,
    pub exp: Option<u64>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub user_metadata: Option<serde_json::Value>,
    pub iat: Option<u64>,
}

/// The authenticated caller. Only `id` and `email` matter to booking.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub role: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: Option<DateTime<Utc>>,
}

impl From<JwtClaims> for User {
    fn from(claims: JwtClaims) -> Self {
        let created_at = claims
            .iat
            .and_then(|issued| Utc.timestamp_opt(issued as i64, 0).single());

        User {
            id: claims.sub,
            email: claims.email,
            role: claims.role,
            metadata: claims.user_metadata,
            created_at,
        }
    }
}
