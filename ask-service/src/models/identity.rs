//! Caller identity established from a Firebase ID token.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Claims carried by a Firebase ID token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirebaseClaims {
    pub sub: String,
    pub aud: String,
    pub iss: String,
    pub exp: i64,
    pub iat: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_time: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default)]
    pub email_verified: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Identity of an authenticated caller, scoped to one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifiedIdentity {
    /// Firebase user id (`sub`).
    pub uid: String,
    pub email: Option<String>,
    pub email_verified: bool,
    pub name: Option<String>,
    pub auth_time: Option<DateTime<Utc>>,
    pub issued_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl VerifiedIdentity {
    /// Identity with only a uid, for callers that have nothing else.
    pub fn with_uid(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            email: None,
            email_verified: false,
            name: None,
            auth_time: None,
            issued_at: None,
            expires_at: None,
        }
    }
}

impl From<FirebaseClaims> for VerifiedIdentity {
    fn from(claims: FirebaseClaims) -> Self {
        Self {
            uid: claims.sub,
            email: claims.email,
            email_verified: claims.email_verified,
            name: claims.name,
            auth_time: claims
                .auth_time
                .and_then(|t| DateTime::from_timestamp(t, 0)),
            issued_at: DateTime::from_timestamp(claims.iat, 0),
            expires_at: DateTime::from_timestamp(claims.exp, 0),
        }
    }
}
