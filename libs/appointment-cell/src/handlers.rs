// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_models::auth::{Role, User};
use shared_models::error::AppError;
use shared_utils::extractor::{require_role, Caller, ValidJson, ValidPath, ValidQuery};

use crate::models::{
    AppointmentError, AppointmentQuery, BookAppointmentRequest, CallerContact,
    UpdateAppointmentRequest,
};
use crate::services::booking::AppointmentBookingService;

impl From<AppointmentError> for AppError {
    fn from(error: AppointmentError) -> Self {
        match error {
            AppointmentError::NotFound | AppointmentError::DoctorNotFound => {
                AppError::NotFound(error.to_string())
            }
            AppointmentError::SlotUnavailable
            | AppointmentError::BookingTimeout(_)
            | AppointmentError::AlreadyTerminal(_)
            | AppointmentError::InvalidStatusTransition { .. }
            | AppointmentError::ParticipantBusy => AppError::Conflict(error.to_string()),
            AppointmentError::Unauthorized => AppError::Forbidden(error.to_string()),
            AppointmentError::ValidationError(msg) => AppError::ValidationError(msg),
            AppointmentError::Slot(e) => e.into(),
            AppointmentError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}

fn contact_of(user: &User) -> CallerContact {
    CallerContact {
        email: user.email.clone(),
        display_name: user.display_name(),
    }
}

// ==============================================================================
// BOOKING
// ==============================================================================

#[axum::debug_handler]
pub async fn book_appointment(
    State(service): State<Arc<AppointmentBookingService>>,
    Extension(user): Extension<User>,
    ValidJson(request): ValidJson<BookAppointmentRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let patient = require_role(&user, Role::Patient, "book appointments")?;

    let appointment = service
        .book_appointment(patient.id, &contact_of(&user), request)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "appointment": appointment,
            "message": "Appointment booked successfully"
        })),
    ))
}

// ==============================================================================
// PARTICIPANT VIEWS
// ==============================================================================

#[axum::debug_handler]
pub async fn list_appointments(
    State(service): State<Arc<AppointmentBookingService>>,
    Extension(user): Extension<User>,
    ValidQuery(query): ValidQuery<AppointmentQuery>,
) -> Result<Json<Value>, AppError> {
    let caller = Caller::from_user(&user)?;

    let appointments = service.list_appointments(caller, query).await?;

    Ok(Json(json!({
        "appointments": appointments,
        "total": appointments.len()
    })))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(service): State<Arc<AppointmentBookingService>>,
    Extension(user): Extension<User>,
    ValidPath(appointment_id): ValidPath<Uuid>,
) -> Result<Json<Value>, AppError> {
    let caller = Caller::from_user(&user)?;

    let appointment = service.get_appointment(caller, appointment_id).await?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn update_appointment(
    State(service): State<Arc<AppointmentBookingService>>,
    Extension(user): Extension<User>,
    ValidPath(appointment_id): ValidPath<Uuid>,
    ValidJson(request): ValidJson<UpdateAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let caller = Caller::from_user(&user)?;

    let appointment = service
        .update_appointment(caller, &contact_of(&user), appointment_id, request)
        .await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment
    })))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(service): State<Arc<AppointmentBookingService>>,
    Extension(user): Extension<User>,
    ValidPath(appointment_id): ValidPath<Uuid>,
) -> Result<Json<Value>, AppError> {
    let caller = Caller::from_user(&user)?;

    let appointment = service
        .cancel_appointment(caller, &contact_of(&user), appointment_id)
        .await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment cancelled successfully"
    })))
}

// ==============================================================================
// DOCTOR VIEWS
// ==============================================================================

#[axum::debug_handler]
pub async fn doctor_bookings(
    State(service): State<Arc<AppointmentBookingService>>,
    Extension(user): Extension<User>,
    ValidQuery(query): ValidQuery<AppointmentQuery>,
) -> Result<Json<Value>, AppError> {
    let doctor = require_role(&user, Role::Doctor, "view bookings")?;

    let bookings = service.doctor_bookings(doctor, query).await?;

    Ok(Json(json!({
        "doctor_id": doctor.id,
        "bookings": bookings,
        "total_bookings": bookings.len()
    })))
}

#[axum::debug_handler]
pub async fn cancel_doctor_booking(
    State(service): State<Arc<AppointmentBookingService>>,
    Extension(user): Extension<User>,
    ValidPath(appointment_id): ValidPath<Uuid>,
) -> Result<Json<Value>, AppError> {
    let doctor = require_role(&user, Role::Doctor, "manage bookings")?;

    let appointment = service
        .cancel_doctor_booking(doctor, &contact_of(&user), appointment_id)
        .await?;

    Ok(Json(json!({
        "message": "Appointment cancelled successfully",
        "appointment_id": appointment.id
    })))
}

#[axum::debug_handler]
pub async fn doctor_dashboard(
    State(service): State<Arc<AppointmentBookingService>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let doctor = require_role(&user, Role::Doctor, "access this dashboard")?;

    let dashboard = service.doctor_dashboard(doctor).await?;
    let availability_status = match dashboard.next_available_slot {
        Some(_) => "available",
        None => "no_slots",
    };

    Ok(Json(json!({
        "doctor_id": doctor.id,
        "doctor_name": user.display_name(),
        "today_appointments": dashboard.today_confirmed,
        "upcoming_appointments": dashboard.upcoming,
        "total_upcoming_appointments": dashboard.total_upcoming,
        "availability_status": availability_status,
        "next_available_slot": dashboard.next_available_slot
    })))
}

#[axum::debug_handler]
pub async fn booking_stats(
    State(service): State<Arc<AppointmentBookingService>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    Caller::from_user(&user)?;

    Ok(Json(json!(service.stats())))
}
