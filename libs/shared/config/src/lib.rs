use std::env;
use std::str::FromStr;
use tracing::warn;

/// Which persistence engine backs the slot and appointment stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    Supabase,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" | "in_memory" | "in-memory" => Ok(StorageBackend::Memory),
            "supabase" | "postgres" => Ok(StorageBackend::Supabase),
            other => Err(format!("unknown storage backend: {}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_service_role_key: String,
    pub supabase_jwt_secret: String,
    pub storage_backend: StorageBackend,
    pub email_service_url: Option<String>,
    pub calendar_service_url: Option<String>,
    pub slot_lock_timeout_ms: u64,
    pub notification_queue_capacity: usize,
    pub notification_max_retries: usize,
    pub notification_timeout_ms: u64,
    pub port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            supabase_service_role_key: String::new(),
            supabase_jwt_secret: String::new(),
            storage_backend: StorageBackend::Memory,
            email_service_url: None,
            calendar_service_url: None,
            slot_lock_timeout_ms: 5_000,
            notification_queue_capacity: 1_024,
            notification_max_retries: 3,
            notification_timeout_ms: 5_000,
            port: 3000,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_service_role_key: env::var("SUPABASE_SERVICE_ROLE_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_SERVICE_ROLE_KEY not set, using empty value");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            storage_backend: env::var("STORAGE_BACKEND")
                .ok()
                .and_then(|raw| match raw.parse() {
                    Ok(backend) => Some(backend),
                    Err(e) => {
                        warn!("{}, falling back to in-memory storage", e);
                        None
                    }
                })
                .unwrap_or(defaults.storage_backend),
            email_service_url: optional_var("EMAIL_SERVICE_URL"),
            calendar_service_url: optional_var("CALENDAR_SERVICE_URL"),
            slot_lock_timeout_ms: parsed_var("SLOT_LOCK_TIMEOUT_MS", defaults.slot_lock_timeout_ms),
            notification_queue_capacity: parsed_var(
                "NOTIFICATION_QUEUE_CAPACITY",
                defaults.notification_queue_capacity,
            ),
            notification_max_retries: parsed_var(
                "NOTIFICATION_MAX_RETRIES",
                defaults.notification_max_retries,
            ),
            notification_timeout_ms: parsed_var(
                "NOTIFICATION_TIMEOUT_MS",
                defaults.notification_timeout_ms,
            ),
            port: parsed_var("PORT", defaults.port),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    /// Identity can always be verified; the relational backend additionally needs Supabase.
    pub fn is_configured(&self) -> bool {
        let identity_ready = !self.supabase_jwt_secret.is_empty();
        match self.storage_backend {
            StorageBackend::Memory => identity_ready,
            StorageBackend::Supabase => {
                identity_ready
                    && !self.supabase_url.is_empty()
                    && !self.supabase_anon_key.is_empty()
                    && !self.supabase_service_role_key.is_empty()
            }
        }
    }

    pub fn is_email_configured(&self) -> bool {
        self.email_service_url.is_some()
    }

    pub fn is_calendar_configured(&self) -> bool {
        self.calendar_service_url.is_some()
    }
}

fn optional_var(name: &str) -> Option<String> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Some(value),
        _ => {
            warn!("{} not set, feature disabled", name);
            None
        }
    }
}

fn parsed_var<T: FromStr + Copy + std::fmt::Display>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("{} has invalid value {:?}, using default {}", name, raw, default);
            default
        }),
        Err(_) => default,
    }
}
