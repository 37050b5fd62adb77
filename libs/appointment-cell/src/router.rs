// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::services::booking::AppointmentBookingService;

pub fn appointment_routes(config: Arc<AppConfig>, service: Arc<AppointmentBookingService>) -> Router {
    // All appointment operations require authentication
    Router::new()
        .route("/book", post(handlers::book_appointment))
        .route("/", get(handlers::list_appointments))
        .route(
            "/{appointment_id}",
            get(handlers::get_appointment).put(handlers::update_appointment),
        )
        .route("/{appointment_id}/cancel", post(handlers::cancel_appointment))
        // Doctor views
        .route("/doctor/bookings", get(handlers::doctor_bookings))
        .route("/doctor/bookings/{appointment_id}", delete(handlers::cancel_doctor_booking))
        .route("/doctor/dashboard", get(handlers::doctor_dashboard))
        .route("/stats", get(handlers::booking_stats))
        .layer(middleware::from_fn_with_state(config, auth_middleware))
        .with_state(service)
}
