// libs/availability-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::get,
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::services::AvailabilityService;

pub fn availability_routes(config: Arc<AppConfig>, service: Arc<AvailabilityService>) -> Router {
    Router::new()
        // Doctor slot management
        .route("/", get(handlers::list_slots).post(handlers::create_slot))
        .route("/available-slots", get(handlers::available_slots))
        .route(
            "/{slot_id}",
            get(handlers::get_slot)
                .put(handlers::update_slot)
                .delete(handlers::delete_slot),
        )
        .layer(middleware::from_fn_with_state(config, auth_middleware))
        .with_state(service)
}
