use anyhow::Context;
use axum::{
    Extension,
    extract::{Path, State},
    response::IntoResponse,
};
use diesel::{ExpressionMethods, QueryDsl, SelectableHelper};
use diesel_async::{AsyncConnection, RunQueryDsl};
use utoipa_axum::router::OpenApiRouter;
use uuid::Uuid;

use crate::{
    core::{
        app_error::{AppError, ConflictKind, StdResponse},
        app_state::AppState,
        middleware,
    },
    models::BookingEntity,
    schema::bookings,
};

/// Defines the provider-facing calendar routes.
pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    utoipa_axum::router::OpenApiRouter::new().nest(
        "/providers/bookings",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(get_bookings))
            .routes(utoipa_axum::routes!(confirm_booking))
            .routes(utoipa_axum::routes!(complete_booking))
            .route_layer(axum::middleware::from_fn(
                middleware::providers_authorization,
            )),
    )
}

/// Fetch the provider's calendar, soonest first.
#[utoipa::path(
    get,
    path = "/",
    tags = ["Bookings"],
    responses(
        (status = 200, description = "List provider bookings", body = StdResponse<Vec<BookingEntity>, String>)
    )
)]
async fn get_bookings(
    State(state): State<AppState>,
    Extension(provider_id): Extension<i32>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let calendar: Vec<BookingEntity> = bookings::table
        .filter(bookings::provider_id.eq(provider_id))
        .order_by(bookings::starts_at.asc())
        .get_results(conn)
        .await
        .context("Failed to get bookings")?;

    Ok(StdResponse {
        success: true,
        data: Some(calendar),
        message: Some("Get bookings successfully"),
    })
}

async fn transition(
    state: AppState,
    provider_id: i32,
    id: Uuid,
    from: &'static str,
    to: &'static str,
) -> Result<BookingEntity, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    conn.transaction(move |conn| {
        Box::pin(async move {
            let booking: BookingEntity = bookings::table
                .find(id)
                .filter(bookings::provider_id.eq(provider_id))
                .for_update()
                .get_result(conn)
                .await?;

            if booking.status != from {
                return Err(AppError::Conflict(ConflictKind::InvalidStatus {
                    status: booking.status,
                }));
            }

            let updated: BookingEntity = diesel::update(bookings::table.find(id))
                .set((
                    bookings::status.eq(to),
                    bookings::updated_at.eq(diesel::dsl::now),
                ))
                .returning(BookingEntity::as_returning())
                .get_result(conn)
                .await?;

            Ok::<BookingEntity, AppError>(updated)
        })
    })
    .await
}

/// Confirm a PENDING booking.
#[utoipa::path(
    patch,
    path = "/{id}/confirm",
    tags = ["Bookings"],
    params(
        ("id" = Uuid, Path, description = "Booking ID to confirm")
    ),
    responses(
        (status = 200, description = "Booking confirmed", body = StdResponse<BookingEntity, String>),
        (status = 409, description = "Booking is not PENDING")
    )
)]
async fn confirm_booking(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Extension(provider_id): Extension<i32>,
) -> Result<impl IntoResponse, AppError> {
    let booking = transition(state, provider_id, id, "PENDING", "CONFIRMED").await?;
    Ok(StdResponse {
        success: true,
        data: Some(booking),
        message: Some("Booking confirmed successfully"),
    })
}

/// Complete a CONFIRMED booking after the appointment took place.
#[utoipa::path(
    patch,
    path = "/{id}/complete",
    tags = ["Bookings"],
    params(
        ("id" = Uuid, Path, description = "Booking ID to complete")
    ),
    responses(
        (status = 200, description = "Booking completed", body = StdResponse<BookingEntity, String>),
        (status = 409, description = "Booking is not CONFIRMED")
    )
)]
async fn complete_booking(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Extension(provider_id): Extension<i32>,
) -> Result<impl IntoResponse, AppError> {
    let booking = transition(state, provider_id, id, "CONFIRMED", "COMPLETED").await?;
    Ok(StdResponse {
        success: true,
        data: Some(booking),
        message: Some("Booking completed successfully"),
    })
}
