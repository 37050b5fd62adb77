use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtHeader {
    pub alg: String,
    pub typ: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String,
    pub exp: Option<u64>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub app_metadata: Option<serde_json::Value>,
    pub user_metadata: Option<serde_json::Value>,
    pub aud: Option<String>,
    pub iat: Option<u64>,
}

/// Scheduling role of an authenticated caller.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Doctor,
    Patient,
}

impl Role {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "doctor" => Some(Role::Doctor),
            "patient" => Some(Role::Patient),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Doctor => write!(f, "doctor"),
            Role::Patient => write!(f, "patient"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub role: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: Option<DateTime<Utc>>,
}

impl User {
    /// Resolves the scheduling role from the `role` claim, falling back to
    /// the `app_metadata.role` carried in `metadata` (Supabase puts
    /// `authenticated` in the top-level claim).
    pub fn app_role(&self) -> Option<Role> {
        self.role
            .as_deref()
            .and_then(Role::parse)
            .or_else(|| {
                self.metadata
                    .as_ref()
                    .and_then(|meta| meta.get("role"))
                    .and_then(|role| role.as_str())
                    .and_then(Role::parse)
            })
    }

    pub fn user_id(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.id).ok()
    }

    pub fn display_name(&self) -> String {
        self.metadata
            .as_ref()
            .and_then(|meta| meta.get("full_name"))
            .and_then(|name| name.as_str())
            .map(str::to_string)
            .or_else(|| self.email.clone())
            .unwrap_or_else(|| self.id.clone())
    }
}
