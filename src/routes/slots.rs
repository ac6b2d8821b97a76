use anyhow::Context;
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
};
use chrono::{NaiveDate, Utc};
use diesel::{ExpressionMethods, QueryDsl};
use diesel_async::RunQueryDsl;
use serde::Deserialize;
use utoipa::IntoParams;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    api,
    availability::slots::{self, DaySlots},
    core::{
        app_error::{AppError, StdResponse},
        app_state::AppState,
    },
    models::ServiceEntity,
    schema::services,
};

/// Public slot lookup; no session required.
pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    utoipa_axum::router::OpenApiRouter::new().routes(utoipa_axum::routes!(get_provider_slots))
}

#[derive(Deserialize, IntoParams)]
struct SlotsQuery {
    service_id: i32,
    from: NaiveDate,
    to: NaiveDate,
}

/// Compute the bookable slots of one provider for one service over a date
/// window. The window is clamped to the provider's notice and horizon
/// settings; every candidate start is returned with an `available` tag.
#[utoipa::path(
    get,
    path = "/providers/{id}/slots",
    tags = ["Slots"],
    params(
        ("id" = i32, Path, description = "Provider ID"),
        SlotsQuery
    ),
    responses(
        (status = 200, description = "Slots per date", body = StdResponse<Vec<DaySlots>, String>),
        (status = 404, description = "Unknown service for this provider")
    )
)]
async fn get_provider_slots(
    Path(provider_id): Path<i32>,
    Query(query): Query<SlotsQuery>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    if query.from > query.to {
        return Err(AppError::Validation(
            "from must not be after to".to_string(),
        ));
    }

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let service: ServiceEntity = services::table
        .find(query.service_id)
        .filter(services::provider_id.eq(provider_id))
        .get_result(conn)
        .await?;

    if !service.active {
        return Err(AppError::Unavailable(format!(
            "service {} is not active",
            service.id
        )));
    }

    let params = api::availability::load_params(conn, provider_id).await?;
    let rules = api::availability::load_weekly_rules(conn, provider_id).await?;
    let exceptions = api::availability::load_exceptions(conn, provider_id).await?;
    let busy = api::availability::load_busy_spans(conn, provider_id, query.from, query.to).await?;

    let days = slots::compute_slots(
        query.from,
        query.to,
        Utc::now().naive_utc(),
        service.duration_minutes,
        &params,
        &rules,
        &exceptions,
        &busy,
    );

    Ok(StdResponse {
        success: true,
        data: Some(days),
        message: Some("Get slots successfully"),
    })
}
