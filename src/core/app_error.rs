use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::core::aliases::DieselError;

/// Standard success envelope returned by every handler.
#[derive(Serialize, Debug, ToSchema)]
pub struct StdResponse<T, M> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<M>,
}

impl<T: Serialize, M: Serialize> IntoResponse for StdResponse<T, M> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

/// Conflicts carry enough detail for the caller to decide how to resolve
/// them (clear the cart, force the availability write, ...). Nothing here is
/// retried automatically.
#[derive(Debug)]
pub enum ConflictKind {
    /// An active rule on the same day-of-week already covers part of the
    /// requested window.
    OverlappingRule { rule_id: i32 },
    /// Shrinking availability would leave these CONFIRMED bookings outside
    /// any working window.
    OrphanedBookings { booking_ids: Vec<Uuid> },
    /// The cart already holds items from another vendor.
    DifferentVendor { vendor_id: i32, vendor_name: String },
    /// The entity is not in a state that permits the requested transition.
    InvalidStatus { status: String },
}

impl ConflictKind {
    pub fn code(&self) -> &'static str {
        match self {
            ConflictKind::OverlappingRule { .. } => "OVERLAPPING_RULE",
            ConflictKind::OrphanedBookings { .. } => "ORPHANED_BOOKINGS",
            ConflictKind::DifferentVendor { .. } => "DIFFERENT_VENDOR",
            ConflictKind::InvalidStatus { .. } => "INVALID_STATUS",
        }
    }

    fn details(self) -> serde_json::Value {
        match self {
            ConflictKind::OverlappingRule { rule_id } => json!({ "overlappingRule": rule_id }),
            ConflictKind::OrphanedBookings { booking_ids } => {
                json!({ "orphanedBookings": booking_ids })
            }
            ConflictKind::DifferentVendor {
                vendor_id,
                vendor_name,
            } => json!({ "existingVendor": { "id": vendor_id, "name": vendor_name } }),
            ConflictKind::InvalidStatus { status } => json!({ "status": status }),
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("resource not found")]
    NotFound,
    #[error("conflict: {}", .0.code())]
    Conflict(ConflictKind),
    #[error("unavailable: {0}")]
    Unavailable(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<DieselError> for AppError {
    fn from(err: DieselError) -> Self {
        match err {
            DieselError::NotFound => AppError::NotFound,
            _ => AppError::Other(err.into()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unavailable(_) => StatusCode::CONFLICT,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let mut body = match self {
            AppError::Validation(message) => {
                json!({ "error": "VALIDATION", "message": message })
            }
            AppError::NotFound => json!({ "error": "NOT_FOUND" }),
            AppError::Conflict(kind) => {
                let code = kind.code();
                let mut details = kind.details();
                details["error"] = json!(code);
                details
            }
            AppError::Unavailable(message) => {
                json!({ "error": "UNAVAILABLE", "message": message })
            }
            AppError::Unauthorized => json!({ "error": "UNAUTHORIZED" }),
            AppError::Other(err) => {
                tracing::error!("unexpected error: {err:#}");
                json!({ "error": "INTERNAL" })
            }
        };
        body["success"] = json!(false);

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_codes_are_stable() {
        assert_eq!(
            ConflictKind::DifferentVendor {
                vendor_id: 1,
                vendor_name: "a".into()
            }
            .code(),
            "DIFFERENT_VENDOR"
        );
        assert_eq!(
            ConflictKind::OverlappingRule { rule_id: 3 }.code(),
            "OVERLAPPING_RULE"
        );
    }

    #[test]
    fn different_vendor_details_expose_the_existing_vendor() {
        let details = ConflictKind::DifferentVendor {
            vendor_id: 7,
            vendor_name: "Oasis Farm".into(),
        }
        .details();
        assert_eq!(details["existingVendor"]["id"], 7);
        assert_eq!(details["existingVendor"]["name"], "Oasis Farm");
    }

    #[test]
    fn diesel_not_found_maps_to_not_found() {
        let err: AppError = DieselError::NotFound.into();
        assert!(matches!(err, AppError::NotFound));
    }
}
