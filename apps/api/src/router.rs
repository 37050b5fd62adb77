use std::sync::Arc;

use axum::{routing::get, Router};

use appointment_cell::router::appointment_routes;
use availability_cell::router::availability_routes;
use shared_config::AppConfig;

use crate::services::AppServices;

pub fn create_router(config: Arc<AppConfig>, services: AppServices) -> Router {
    Router::new()
        .route("/", get(|| async { "Slot booking API is running!" }))
        .nest("/availability", availability_routes(config.clone(), services.availability))
        .nest("/appointments", appointment_routes(config, services.booking))
}
