use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{TimeZone, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;
use tracing::debug;

use shared_models::auth::{JwtClaims, User};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("JWT secret is not set")]
    MissingSecret,

    #[error("Invalid token format")]
    Malformed,

    #[error("Invalid signature encoding")]
    SignatureEncoding,

    #[error("Invalid token signature")]
    BadSignature,

    #[error("Invalid claims encoding")]
    ClaimsEncoding,

    #[error("Invalid claims format")]
    ClaimsFormat,

    #[error("Token expired")]
    Expired,
}

/// Verifies an HS256 token and turns its claims into the caller identity.
pub fn validate_token(token: &str, jwt_secret: &str) -> Result<User, TokenError> {
    if jwt_secret.is_empty() {
        return Err(TokenError::MissingSecret);
    }

    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(TokenError::Malformed);
    }

    let (header_b64, claims_b64, signature_b64) = (parts[0], parts[1], parts[2]);

    let signature = URL_SAFE_NO_PAD.decode(signature_b64).map_err(|e| {
        debug!("Failed to decode signature: {}", e);
        TokenError::SignatureEncoding
    })?;

    let mut mac = HmacSha256::new_from_slice(jwt_secret.as_bytes())
        .map_err(|_| TokenError::MissingSecret)?;
    mac.update(format!("{}.{}", header_b64, claims_b64).as_bytes());

    if mac.verify_slice(&signature).is_err() {
        debug!("Token signature verification failed");
        return Err(TokenError::BadSignature);
    }

    let claims_json = URL_SAFE_NO_PAD
        .decode(claims_b64)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .ok_or(TokenError::ClaimsEncoding)?;

    let claims: JwtClaims = serde_json::from_str(&claims_json).map_err(|e| {
        debug!("Failed to parse claims: {}", e);
        TokenError::ClaimsFormat
    })?;

    if let Some(exp) = claims.exp {
        let now = Utc::now().timestamp() as u64;
        if exp < now {
            debug!("Token expired at {} (now: {})", exp, now);
            return Err(TokenError::Expired);
        }
    }

    let created_at = claims
        .iat
        .and_then(|timestamp| Utc.timestamp_opt(timestamp as i64, 0).single());

    // Users can write their own user_metadata; only app_metadata may carry the role.
    let metadata = merge_metadata(claims.user_metadata, claims.app_metadata);

    let user = User {
        id: claims.sub,
        email: claims.email,
        role: claims.role,
        metadata,
        created_at,
    };

    debug!("Token validated successfully for user: {}", user.id);
    Ok(user)
}

fn merge_metadata(
    user_metadata: Option<serde_json::Value>,
    app_metadata: Option<serde_json::Value>,
) -> Option<serde_json::Value> {
    let user_metadata = user_metadata.map(|mut user| {
        if let Some(fields) = user.as_object_mut() {
            fields.remove("role");
        }
        user
    });

    match (user_metadata, app_metadata) {
        (Some(serde_json::Value::Object(mut user)), Some(serde_json::Value::Object(app))) => {
            user.extend(app);
            Some(serde_json::Value::Object(user))
        }
        (Some(user), None) => Some(user),
        (None, Some(app)) => Some(app),
        (user, _) => user,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{JwtTestUtils, TestUser};
    use shared_models::auth::Role;

    const SECRET: &str = "unit-test-secret";

    #[test]
    fn accepts_token_signed_with_secret() {
        let doctor = TestUser::doctor("doc@example.com");
        let token = JwtTestUtils::create_test_token(&doctor, SECRET, Some(1));

        let user = validate_token(&token, SECRET).unwrap();
        assert_eq!(user.id, doctor.id);
        assert_eq!(user.app_role(), Some(Role::Doctor));
    }

    #[test]
    fn rejects_bad_signature_and_expiry() {
        let patient = TestUser::patient("pat@example.com");

        let forged = JwtTestUtils::create_invalid_signature_token(&patient);
        assert_eq!(validate_token(&forged, SECRET).unwrap_err(), TokenError::BadSignature);

        let expired = JwtTestUtils::create_expired_token(&patient, SECRET);
        assert_eq!(validate_token(&expired, SECRET).unwrap_err(), TokenError::Expired);

        assert!(validate_token(&JwtTestUtils::create_malformed_token(), SECRET).is_err());
        assert_eq!(validate_token("a.b", SECRET).unwrap_err(), TokenError::Malformed);
        assert_eq!(validate_token(&forged, "").unwrap_err(), TokenError::MissingSecret);
    }

    #[test]
    fn app_metadata_role_overrides_user_metadata() {
        let merged = merge_metadata(
            Some(serde_json::json!({ "role": "patient", "full_name": "X" })),
            Some(serde_json::json!({ "role": "doctor" })),
        )
        .unwrap();
        assert_eq!(merged["role"], "doctor");
        assert_eq!(merged["full_name"], "X");
    }

    #[test]
    fn user_metadata_cannot_grant_a_role() {
        let metadata = merge_metadata(
            Some(serde_json::json!({ "role": "doctor", "full_name": "Mallory" })),
            None,
        );
        let user = User {
            id: uuid::Uuid::new_v4().to_string(),
            email: None,
            role: Some("authenticated".to_string()),
            metadata,
            created_at: None,
        };

        assert_eq!(user.app_role(), None);
        assert_eq!(user.display_name(), "Mallory");
    }
}
