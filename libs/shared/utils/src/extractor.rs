use std::sync::Arc;

use axum::{
    body::Body,
    extract::{FromRequest, FromRequestParts, State},
    http::Request,
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::{Role, User};
use shared_models::error::AppError;

use crate::jwt::validate_token;

/// Validates the bearer token and stores the caller as a `User` extension.
pub async fn auth_middleware(
    State(config): State<Arc<AppConfig>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let auth_header = request
        .headers()
        .get("Authorization")
        .ok_or_else(|| AppError::Auth("Missing authorization header".to_string()))?;

    let auth_value = auth_header
        .to_str()
        .map_err(|_| AppError::Auth("Invalid authorization header format".to_string()))?;

    let token = auth_value
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::Auth("Invalid authorization header format".to_string()))?;

    let user = validate_token(token, &config.supabase_jwt_secret)
        .map_err(|e| AppError::Auth(e.to_string()))?;

    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}

/// `axum::Json` whose rejection is reported as an `AppError` validation error.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ValidJson<T>(pub T);

#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct ValidQuery<T>(pub T);

#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct ValidPath<T>(pub T);

/// Caller identity reduced to what the scheduling core authorizes on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub id: Uuid,
    pub role: Role,
}

impl Caller {
    pub fn from_user(user: &User) -> Result<Self, AppError> {
        let id = user
            .user_id()
            .ok_or_else(|| AppError::Auth("Token subject is not a valid user id".to_string()))?;
        let role = user.app_role().ok_or_else(|| {
            AppError::Forbidden(format!(
                "Unsupported user role: {}",
                user.role.as_deref().unwrap_or("none")
            ))
        })?;

        Ok(Self { id, role })
    }

    pub fn is_doctor(&self) -> bool {
        self.role == Role::Doctor
    }

    pub fn is_patient(&self) -> bool {
        self.role == Role::Patient
    }
}

/// Resolves the caller and insists on a specific role.
pub fn require_role(user: &User, role: Role, action: &str) -> Result<Caller, AppError> {
    let caller = Caller::from_user(user)?;
    if caller.role != role {
        return Err(AppError::Forbidden(format!(
            "Only {}s can {} (your role: {})",
            role, action, caller.role
        )));
    }
    Ok(caller)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{JwtTestUtils, TestConfig, TestUser};
    use assert_matches::assert_matches;
    use axum::{http::StatusCode, middleware, routing::get, Extension, Router};
    use tower::ServiceExt;

    async fn whoami(Extension(user): Extension<User>) -> String {
        user.id
    }

    fn app(config: Arc<AppConfig>) -> Router {
        Router::new()
            .route("/me", get(whoami))
            .layer(middleware::from_fn_with_state(config, auth_middleware))
    }

    #[tokio::test]
    async fn middleware_injects_user() {
        let config = TestConfig::default();
        let patient = TestUser::patient("pat@example.com");
        let token = JwtTestUtils::create_test_token(&patient, &config.jwt_secret, None);

        let response = app(config.to_arc())
            .oneshot(
                Request::builder()
                    .uri("/me")
                    .header("Authorization", format!("Bearer {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn middleware_rejects_missing_header() {
        let response = app(TestConfig::default().to_arc())
            .oneshot(Request::builder().uri("/me").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn require_role_checks_role() {
        let doctor = TestUser::doctor("doc@example.com").to_user();
        assert!(require_role(&doctor, Role::Doctor, "manage availability").is_ok());
        assert_matches!(
            require_role(&doctor, Role::Patient, "book appointments"),
            Err(AppError::Forbidden(_))
        );

        let mut admin = TestUser::admin("root@example.com").to_user();
        assert_matches!(Caller::from_user(&admin), Err(AppError::Forbidden(_)));

        admin.id = "not-a-uuid".to_string();
        assert_matches!(Caller::from_user(&admin), Err(AppError::Auth(_)));
    }

    #[derive(serde::Deserialize)]
    struct Window {
        date: chrono::NaiveDate,
    }

    async fn echo_date(ValidJson(window): ValidJson<Window>) -> String {
        window.date.to_string()
    }

    async fn echo_query(ValidQuery(window): ValidQuery<Window>) -> String {
        window.date.to_string()
    }

    async fn error_body(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn malformed_json_field_is_a_validation_error() {
        let app = Router::new().route("/window", axum::routing::post(echo_date));

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/window")
                    .header("Content-Type", "application/json")
                    .body(Body::from(r#"{"date":"2025-13-45"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(error_body(response).await["error"].as_str().unwrap().contains("date"));
    }

    #[tokio::test]
    async fn malformed_query_is_a_validation_error() {
        let app = Router::new().route("/window", get(echo_query));

        let ok = app
            .clone()
            .oneshot(Request::builder().uri("/window?date=2025-01-10").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(ok.status(), StatusCode::OK);

        let response = app
            .oneshot(Request::builder().uri("/window?date=tomorrow").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(error_body(response).await["error"].is_string());
    }
}
