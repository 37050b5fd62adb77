// libs/availability-cell/src/handlers.rs
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
use shared_utils::extractor::{require_role, ValidJson, ValidPath, ValidQuery};

use crate::models::{
    AvailableSlotsQuery, CreateSlotRequest, DoctorProfile, SlotError, SlotListQuery,
    UpdateSlotRequest,
};
use crate::services::AvailabilityService;

impl From<SlotError> for AppError {
    fn from(error: SlotError) -> Self {
        match error {
            SlotError::InvalidRange | SlotError::InThePast | SlotError::ValidationError(_) => {
                AppError::ValidationError(error.to_string())
            }
            SlotError::Overlap(_) | SlotError::SlotBooked | SlotError::InUse => {
                AppError::Conflict(error.to_string())
            }
            SlotError::NotFound | SlotError::DoctorNotFound => AppError::NotFound(error.to_string()),
            SlotError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}

// ==============================================================================
// DOCTOR SLOT MANAGEMENT
// ==============================================================================

#[axum::debug_handler]
pub async fn list_slots(
    State(service): State<Arc<AvailabilityService>>,
    Extension(user): Extension<User>,
    ValidQuery(query): ValidQuery<SlotListQuery>,
) -> Result<Json<Value>, AppError> {
    let caller = require_role(&user, Role::Doctor, "view availability slots")?;

    let slots: Vec<_> = service.list_slots(caller.id, query).await?.collect();

    Ok(Json(json!({
        "slots": slots,
        "total": slots.len()
    })))
}

#[axum::debug_handler]
pub async fn create_slot(
    State(service): State<Arc<AvailabilityService>>,
    Extension(user): Extension<User>,
    ValidJson(request): ValidJson<CreateSlotRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let caller = require_role(&user, Role::Doctor, "create availability slots")?;

    let doctor = DoctorProfile {
        id: caller.id,
        display_name: user.display_name(),
        email: user.email.clone(),
        is_active: true,
    };
    let slot = service.create_slot(doctor, request).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "slot": slot,
            "message": "Availability slot created"
        })),
    ))
}

#[axum::debug_handler]
pub async fn get_slot(
    State(service): State<Arc<AvailabilityService>>,
    Extension(user): Extension<User>,
    ValidPath(slot_id): ValidPath<Uuid>,
) -> Result<Json<Value>, AppError> {
    let caller = require_role(&user, Role::Doctor, "view availability slots")?;

    let slot = service.get_owned_slot(caller.id, slot_id).await?;

    Ok(Json(json!(slot)))
}

#[axum::debug_handler]
pub async fn update_slot(
    State(service): State<Arc<AvailabilityService>>,
    Extension(user): Extension<User>,
    ValidPath(slot_id): ValidPath<Uuid>,
    ValidJson(request): ValidJson<UpdateSlotRequest>,
) -> Result<Json<Value>, AppError> {
    let caller = require_role(&user, Role::Doctor, "update availability slots")?;

    let slot = service.update_slot(caller.id, slot_id, request).await?;

    Ok(Json(json!({
        "success": true,
        "slot": slot,
        "message": "Availability slot updated"
    })))
}

#[axum::debug_handler]
pub async fn delete_slot(
    State(service): State<Arc<AvailabilityService>>,
    Extension(user): Extension<User>,
    ValidPath(slot_id): ValidPath<Uuid>,
) -> Result<StatusCode, AppError> {
    let caller = require_role(&user, Role::Doctor, "delete availability slots")?;

    service.delete_slot(caller.id, slot_id).await?;

    Ok(StatusCode::NO_CONTENT)
}

// ==============================================================================
// PATIENT SLOT DISCOVERY
// ==============================================================================

#[axum::debug_handler]
pub async fn available_slots(
    State(service): State<Arc<AvailabilityService>>,
    Extension(user): Extension<User>,
    ValidQuery(query): ValidQuery<AvailableSlotsQuery>,
) -> Result<Json<Value>, AppError> {
    require_role(&user, Role::Patient, "browse available slots")?;

    let doctor_id = query
        .doctor_id
        .ok_or_else(|| AppError::BadRequest("doctor_id is required".to_string()))?;

    let slots = service.available_slots(doctor_id, query.date).await?;

    Ok(Json(json!({
        "doctor_id": doctor_id,
        "date": query.date,
        "slots": slots,
        "total": slots.len()
    })))
}
