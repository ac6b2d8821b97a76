use anyhow::Context;
use axum::{
    Extension,
    extract::{Path, State},
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use diesel::{ExpressionMethods, QueryDsl, SelectableHelper};
use diesel_async::{AsyncConnection, RunQueryDsl};
use serde::Deserialize;
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;
use uuid::Uuid;

use crate::{
    api,
    availability::slots,
    core::{
        app_error::{AppError, ConflictKind, StdResponse},
        app_state::AppState,
        middleware,
    },
    models::{BookingEntity, CreateBookingEntity, ServiceEntity},
    schema::{bookings, services},
};

/// Defines all customer-facing booking routes.
pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    utoipa_axum::router::OpenApiRouter::new().nest(
        "/customers/bookings",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(get_my_bookings))
            .routes(utoipa_axum::routes!(create_booking))
            .routes(utoipa_axum::routes!(cancel_booking))
            .route_layer(axum::middleware::from_fn(
                middleware::customers_authorization,
            )),
    )
}

/// Fetch the customer's bookings, newest first.
#[utoipa::path(
    get,
    path = "/",
    tags = ["Bookings"],
    responses(
        (status = 200, description = "List my bookings", body = StdResponse<Vec<BookingEntity>, String>)
    )
)]
async fn get_my_bookings(
    State(state): State<AppState>,
    Extension(customer_id): Extension<i32>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let mine: Vec<BookingEntity> = bookings::table
        .filter(bookings::customer_id.eq(customer_id))
        .order_by(bookings::starts_at.desc())
        .get_results(conn)
        .await
        .context("Failed to get my bookings")?;

    Ok(StdResponse {
        success: true,
        data: Some(mine),
        message: Some("Get my bookings successfully"),
    })
}

#[derive(Deserialize, ToSchema)]
struct CreateBookingReq {
    pub service_id: i32,
    pub starts_at: DateTime<Utc>,
    /// Created CONFIRMED instead of PENDING; set by flows that settle
    /// payment before booking.
    #[serde(default)]
    pub confirm: bool,
}

/// Book a slot. The requested start must be one of the currently bookable
/// candidates for the service's provider.
#[utoipa::path(
    post,
    path = "/",
    tags = ["Bookings"],
    responses(
        (status = 200, description = "Booking created", body = StdResponse<BookingEntity, String>),
        (status = 400, description = "Not a bookable start time"),
        (status = 409, description = "Slot no longer available")
    )
)]
async fn create_booking(
    State(state): State<AppState>,
    Extension(customer_id): Extension<i32>,
    axum::Json(body): axum::Json<CreateBookingReq>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let booking = conn
        .transaction(move |conn| {
            Box::pin(async move {
                let service: ServiceEntity =
                    services::table.find(body.service_id).get_result(conn).await?;
                if !service.active {
                    return Err(AppError::Unavailable(format!(
                        "service {} is not active",
                        service.id
                    )));
                }

                let requested = body.starts_at.naive_utc();
                let date = requested.date();

                let params = api::availability::load_params(conn, service.provider_id).await?;
                let rules = api::availability::load_weekly_rules(conn, service.provider_id).await?;
                let exceptions =
                    api::availability::load_exceptions(conn, service.provider_id).await?;
                let busy =
                    api::availability::load_busy_spans(conn, service.provider_id, date, date)
                        .await?;

                let days = slots::compute_slots(
                    date,
                    date,
                    Utc::now().naive_utc(),
                    service.duration_minutes,
                    &params,
                    &rules,
                    &exceptions,
                    &busy,
                );

                let candidate = days
                    .iter()
                    .flat_map(|day| day.slots.iter())
                    .find(|slot| slot.start == requested);

                match candidate {
                    None => {
                        return Err(AppError::Validation(
                            "requested start is not a bookable slot".to_string(),
                        ));
                    }
                    Some(slot) if !slot.available => {
                        return Err(AppError::Unavailable(
                            "requested slot is no longer available".to_string(),
                        ));
                    }
                    Some(_) => {}
                }

                let booking: BookingEntity = diesel::insert_into(bookings::table)
                    .values(CreateBookingEntity {
                        service_id: service.id,
                        provider_id: service.provider_id,
                        customer_id,
                        starts_at: body.starts_at,
                        duration_minutes: service.duration_minutes,
                        status: if body.confirm {
                            "CONFIRMED".to_string()
                        } else {
                            "PENDING".to_string()
                        },
                    })
                    .returning(BookingEntity::as_returning())
                    .get_result(conn)
                    .await?;

                Ok::<BookingEntity, AppError>(booking)
            })
        })
        .await?;

    Ok(StdResponse {
        success: true,
        data: Some(booking),
        message: Some("Booking created successfully"),
    })
}

/// Cancel a PENDING or CONFIRMED booking. CANCELLED and COMPLETED are
/// terminal.
#[utoipa::path(
    patch,
    path = "/{id}/cancel",
    tags = ["Bookings"],
    params(
        ("id" = Uuid, Path, description = "Booking ID to cancel")
    ),
    responses(
        (status = 200, description = "Booking cancelled", body = StdResponse<BookingEntity, String>),
        (status = 409, description = "Booking already terminal")
    )
)]
async fn cancel_booking(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Extension(customer_id): Extension<i32>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let booking = conn
        .transaction(move |conn| {
            Box::pin(async move {
                let booking: BookingEntity = bookings::table
                    .find(id)
                    .filter(bookings::customer_id.eq(customer_id))
                    .for_update()
                    .get_result(conn)
                    .await?;

                if booking.status != "PENDING" && booking.status != "CONFIRMED" {
                    return Err(AppError::Conflict(ConflictKind::InvalidStatus {
                        status: booking.status,
                    }));
                }

                let cancelled: BookingEntity = diesel::update(bookings::table.find(id))
                    .set((
                        bookings::status.eq("CANCELLED"),
                        bookings::updated_at.eq(diesel::dsl::now),
                    ))
                    .returning(BookingEntity::as_returning())
                    .get_result(conn)
                    .await?;

                Ok::<BookingEntity, AppError>(cancelled)
            })
        })
        .await?;

    Ok(StdResponse {
        success: true,
        data: Some(booking),
        message: Some("Booking cancelled successfully"),
    })
}
