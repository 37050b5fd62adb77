use reqwest::{
    Client,
    header::{HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION},
    Method,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error};

use shared_config::AppConfig;

#[derive(Debug, Error)]
pub enum SupabaseError {
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Unique or exclusion constraint violation (HTTP 409 / SQLSTATE 23505).
    #[error("Constraint violation: {0}")]
    Conflict(String),

    /// The row is still referenced by another table (SQLSTATE 23503).
    #[error("Row is still referenced: {0}")]
    Referenced(String),

    /// A Postgres exception raised by an RPC function.
    #[error("Database exception {code}: {message}")]
    Exception { code: String, message: String },

    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Invalid header value: {0}")]
    Header(String),

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl SupabaseError {
    /// The exception message raised by a SQL function, if that is what this is.
    pub fn exception_message(&self) -> Option<&str> {
        match self {
            SupabaseError::Exception { message, .. } => Some(message),
            _ => None,
        }
    }

    pub fn exception_code(&self) -> Option<&str> {
        match self {
            SupabaseError::Exception { code, .. } => Some(code),
            _ => None,
        }
    }
}

/// Thin PostgREST client authenticating with the service-role key.
#[derive(Clone)]
pub struct SupabaseClient {
    client: Client,
    base_url: String,
    anon_key: String,
    service_key: String,
}

impl SupabaseClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.supabase_url.trim_end_matches('/').to_string(),
            anon_key: config.supabase_anon_key.clone(),
            service_key: config.supabase_service_role_key.clone(),
        }
    }

    fn get_headers(&self) -> Result<HeaderMap, SupabaseError> {
        let mut headers = HeaderMap::new();

        headers.insert(
            "apikey",
            HeaderValue::from_str(&self.anon_key).map_err(|e| SupabaseError::Header(e.to_string()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.service_key))
                .map_err(|e| SupabaseError::Header(e.to_string()))?,
        );

        Ok(headers)
    }

    pub async fn request<T>(&self, method: Method, path: &str, body: Option<Value>) -> Result<T, SupabaseError>
    where
        T: DeserializeOwned,
    {
        self.request_with_headers(method, path, body, None).await
    }

    pub async fn request_with_headers<T>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        extra_headers: Option<HeaderMap>,
    ) -> Result<T, SupabaseError>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making {} request to {}", method, url);

        let mut headers = self.get_headers()?;
        if let Some(extra) = extra_headers {
            headers.extend(extra);
        }

        let mut req = self.client.request(method, &url).headers(headers);

        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            error!("API error ({}): {}", status, error_text);
            return Err(classify_error(status.as_u16(), error_text));
        }

        // PostgREST answers 204 with an empty body when no representation is requested.
        let bytes = response.bytes().await?;
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice::<Value>(&bytes).map_err(|e| SupabaseError::Api {
                status: status.as_u16(),
                body: format!("Invalid JSON: {}", e),
            })?
        };

        serde_json::from_value(value).map_err(|e| SupabaseError::Api {
            status: status.as_u16(),
            body: format!("Unexpected response shape: {}", e),
        })
    }

    /// Same as `request_with_headers` but asks PostgREST to echo the affected rows.
    pub async fn request_returning<T>(&self, method: Method, path: &str, body: Option<Value>) -> Result<T, SupabaseError>
    where
        T: DeserializeOwned,
    {
        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));
        self.request_with_headers(method, path, body, Some(headers)).await
    }

    /// Calls a SQL function exposed under `/rest/v1/rpc/{function}`.
    pub async fn rpc<T>(&self, function: &str, args: Value) -> Result<T, SupabaseError>
    where
        T: DeserializeOwned,
    {
        let path = format!("/rest/v1/rpc/{}", function);
        self.request(Method::POST, &path, Some(args)).await
    }
}

fn classify_error(status: u16, body: String) -> SupabaseError {
    let parsed: Option<Value> = serde_json::from_str(&body).ok();
    let code = parsed
        .as_ref()
        .and_then(|v| v.get("code"))
        .and_then(|c| c.as_str())
        .map(str::to_string);
    let message = parsed
        .as_ref()
        .and_then(|v| v.get("message"))
        .and_then(|m| m.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| body.clone());

    match (status, code) {
        (401 | 403, _) => SupabaseError::Auth(message),
        (_, Some(code)) if code == "23505" => SupabaseError::Conflict(message),
        (_, Some(code)) if code == "23503" => SupabaseError::Referenced(message),
        (409, _) => SupabaseError::Conflict(message),
        (_, Some(code)) if code.starts_with("P0") || code == "55P03" => {
            SupabaseError::Exception { code, message }
        }
        (404, _) => SupabaseError::NotFound(message),
        _ => SupabaseError::Api { status, body },
    }
}
