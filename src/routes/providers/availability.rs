use anyhow::Context;
use axum::{
    Extension,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use chrono::{NaiveDate, NaiveTime};
use diesel::{ExpressionMethods, OptionalExtension, QueryDsl, SelectableHelper};
use diesel_async::{AsyncConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use utoipa_axum::router::OpenApiRouter;

use crate::{
    api,
    availability::{
        conflicts::{self, ExistingRule},
        slots::{DateException, SlotParams, TimeWindow, WeeklyRule},
    },
    core::{
        app_error::{AppError, ConflictKind, StdResponse},
        app_state::AppState,
        middleware,
    },
    models::{
        AvailabilityOverrideEntity, AvailabilityRuleEntity, AvailabilitySettingsEntity,
        CreateAvailabilityOverrideEntity, CreateAvailabilityRuleEntity,
        UpsertAvailabilitySettingsEntity,
    },
    schema::{availability_overrides, availability_rules, availability_settings},
};

/// Defines all provider-facing availability routes (rules, overrides and
/// settings, with the forced-override path for shrinking writes).
pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    utoipa_axum::router::OpenApiRouter::new().nest(
        "/providers/availability",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(get_rules))
            .routes(utoipa_axum::routes!(create_rule))
            .routes(utoipa_axum::routes!(update_rule))
            .routes(utoipa_axum::routes!(delete_rule))
            .routes(utoipa_axum::routes!(get_overrides))
            .routes(utoipa_axum::routes!(upsert_override))
            .routes(utoipa_axum::routes!(delete_override))
            .routes(utoipa_axum::routes!(get_settings))
            .routes(utoipa_axum::routes!(put_settings))
            .route_layer(axum::middleware::from_fn(
                middleware::providers_authorization,
            )),
    )
}

#[derive(Deserialize, IntoParams)]
struct ForceQuery {
    /// Skips the orphaned-booking check. Admin-only escape hatch; window
    /// shape validation and rule overlap are never skippable.
    #[serde(default)]
    force: bool,
}

fn existing_rules(rules: &[AvailabilityRuleEntity], exclude_id: Option<i32>) -> Vec<ExistingRule> {
    rules
        .iter()
        .filter(|rule| rule.active && Some(rule.id) != exclude_id)
        .map(|rule| ExistingRule {
            id: rule.id,
            weekday: rule.day_of_week,
            window: TimeWindow {
                start: rule.start_time,
                end: rule.end_time,
            },
        })
        .collect()
}

fn weekly_rules(rules: &[AvailabilityRuleEntity], exclude_id: Option<i32>) -> Vec<WeeklyRule> {
    rules
        .iter()
        .filter(|rule| rule.active && Some(rule.id) != exclude_id)
        .map(WeeklyRule::from)
        .collect()
}

/// Fetch the authenticated provider's availability rules.
#[utoipa::path(
    get,
    path = "/rules",
    tags = ["Availability"],
    responses(
        (status = 200, description = "List availability rules", body = StdResponse<Vec<AvailabilityRuleEntity>, String>)
    )
)]
async fn get_rules(
    State(state): State<AppState>,
    Extension(provider_id): Extension<i32>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let rules: Vec<AvailabilityRuleEntity> = availability_rules::table
        .filter(availability_rules::provider_id.eq(provider_id))
        .order_by((
            availability_rules::day_of_week.asc(),
            availability_rules::start_time.asc(),
        ))
        .get_results(conn)
        .await
        .context("Failed to get availability rules")?;

    Ok(StdResponse {
        success: true,
        data: Some(rules),
        message: Some("Get availability rules successfully"),
    })
}

#[derive(Deserialize, ToSchema)]
struct CreateRuleReq {
    pub day_of_week: i16,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// Create a recurring weekly rule. Overlapping an existing active rule on
/// the same day-of-week is a conflict, never a merge.
#[utoipa::path(
    post,
    path = "/rules",
    tags = ["Availability"],
    responses(
        (status = 200, description = "Availability rule created", body = StdResponse<AvailabilityRuleEntity, String>),
        (status = 409, description = "Overlapping active rule")
    )
)]
async fn create_rule(
    State(state): State<AppState>,
    Extension(provider_id): Extension<i32>,
    axum::Json(body): axum::Json<CreateRuleReq>,
) -> Result<impl IntoResponse, AppError> {
    conflicts::validate_weekday(body.day_of_week)?;
    let window = conflicts::validate_window(body.start_time, body.end_time)?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let rule = conn
        .transaction(move |conn| {
            Box::pin(async move {
                let rules: Vec<AvailabilityRuleEntity> = availability_rules::table
                    .filter(availability_rules::provider_id.eq(provider_id))
                    .get_results(conn)
                    .await?;

                if body.active {
                    if let Some(rule_id) = conflicts::find_overlapping_rule(
                        body.day_of_week,
                        window,
                        &existing_rules(&rules, None),
                    ) {
                        return Err(AppError::Conflict(ConflictKind::OverlappingRule { rule_id }));
                    }
                }

                let rule: AvailabilityRuleEntity = diesel::insert_into(availability_rules::table)
                    .values(CreateAvailabilityRuleEntity {
                        provider_id,
                        day_of_week: body.day_of_week,
                        start_time: body.start_time,
                        end_time: body.end_time,
                        active: body.active,
                    })
                    .returning(AvailabilityRuleEntity::as_returning())
                    .get_result(conn)
                    .await?;

                Ok::<AvailabilityRuleEntity, AppError>(rule)
            })
        })
        .await?;

    Ok(StdResponse {
        success: true,
        data: Some(rule),
        message: Some("Availability rule created successfully"),
    })
}

#[derive(Deserialize, ToSchema)]
struct UpdateRuleReq {
    pub day_of_week: Option<i16>,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub active: Option<bool>,
}

/// Update a rule. Shrinking or deactivating checks every future CONFIRMED
/// booking against the prospective windows unless `force` is set.
#[utoipa::path(
    patch,
    path = "/rules/{id}",
    tags = ["Availability"],
    params(
        ("id" = i32, Path, description = "Rule ID to update"),
        ForceQuery
    ),
    responses(
        (status = 200, description = "Availability rule updated", body = StdResponse<AvailabilityRuleEntity, String>),
        (status = 409, description = "Overlapping rule or orphaned bookings")
    )
)]
async fn update_rule(
    Path(id): Path<i32>,
    Query(query): Query<ForceQuery>,
    State(state): State<AppState>,
    Extension(provider_id): Extension<i32>,
    axum::Json(body): axum::Json<UpdateRuleReq>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let rule = conn
        .transaction(move |conn| {
            Box::pin(async move {
                let rule: AvailabilityRuleEntity = availability_rules::table
                    .find(id)
                    .filter(availability_rules::provider_id.eq(provider_id))
                    .get_result(conn)
                    .await?;

                let day_of_week = body.day_of_week.unwrap_or(rule.day_of_week);
                conflicts::validate_weekday(day_of_week)?;
                let window = conflicts::validate_window(
                    body.start_time.unwrap_or(rule.start_time),
                    body.end_time.unwrap_or(rule.end_time),
                )?;
                let active = body.active.unwrap_or(rule.active);

                let rules: Vec<AvailabilityRuleEntity> = availability_rules::table
                    .filter(availability_rules::provider_id.eq(provider_id))
                    .get_results(conn)
                    .await?;

                if active {
                    if let Some(rule_id) = conflicts::find_overlapping_rule(
                        day_of_week,
                        window,
                        &existing_rules(&rules, Some(id)),
                    ) {
                        return Err(AppError::Conflict(ConflictKind::OverlappingRule { rule_id }));
                    }
                }

                if !query.force {
                    let mut rules_after = weekly_rules(&rules, Some(id));
                    if active {
                        rules_after.push(WeeklyRule {
                            weekday: day_of_week,
                            window,
                        });
                    }
                    let exceptions = api::availability::load_exceptions(conn, provider_id).await?;
                    api::availability::ensure_no_orphaned_bookings(
                        conn,
                        provider_id,
                        &rules_after,
                        &exceptions,
                    )
                    .await?;
                }

                let updated: AvailabilityRuleEntity =
                    diesel::update(availability_rules::table.find(id))
                        .set((
                            availability_rules::day_of_week.eq(day_of_week),
                            availability_rules::start_time.eq(window.start),
                            availability_rules::end_time.eq(window.end),
                            availability_rules::active.eq(active),
                            availability_rules::updated_at.eq(diesel::dsl::now),
                        ))
                        .returning(AvailabilityRuleEntity::as_returning())
                        .get_result(conn)
                        .await?;

                Ok::<AvailabilityRuleEntity, AppError>(updated)
            })
        })
        .await?;

    Ok(StdResponse {
        success: true,
        data: Some(rule),
        message: Some("Availability rule updated successfully"),
    })
}

/// Delete a rule, refusing when that would orphan CONFIRMED bookings.
#[utoipa::path(
    delete,
    path = "/rules/{id}",
    tags = ["Availability"],
    params(
        ("id" = i32, Path, description = "Rule ID to delete"),
        ForceQuery
    ),
    responses(
        (status = 200, description = "Availability rule deleted", body = StdResponse<AvailabilityRuleEntity, String>),
        (status = 409, description = "Orphaned bookings")
    )
)]
async fn delete_rule(
    Path(id): Path<i32>,
    Query(query): Query<ForceQuery>,
    State(state): State<AppState>,
    Extension(provider_id): Extension<i32>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let rule = conn
        .transaction(move |conn| {
            Box::pin(async move {
                let rule: AvailabilityRuleEntity = availability_rules::table
                    .find(id)
                    .filter(availability_rules::provider_id.eq(provider_id))
                    .get_result(conn)
                    .await?;

                if !query.force && rule.active {
                    let rules: Vec<AvailabilityRuleEntity> = availability_rules::table
                        .filter(availability_rules::provider_id.eq(provider_id))
                        .get_results(conn)
                        .await?;
                    let rules_after = weekly_rules(&rules, Some(id));
                    let exceptions = api::availability::load_exceptions(conn, provider_id).await?;
                    api::availability::ensure_no_orphaned_bookings(
                        conn,
                        provider_id,
                        &rules_after,
                        &exceptions,
                    )
                    .await?;
                }

                let deleted: AvailabilityRuleEntity =
                    diesel::delete(availability_rules::table.find(id))
                        .returning(AvailabilityRuleEntity::as_returning())
                        .get_result(conn)
                        .await?;

                Ok::<AvailabilityRuleEntity, AppError>(deleted)
            })
        })
        .await?;

    Ok(StdResponse {
        success: true,
        data: Some(rule),
        message: Some("Availability rule deleted successfully"),
    })
}

/// Fetch the provider's date overrides.
#[utoipa::path(
    get,
    path = "/overrides",
    tags = ["Availability"],
    responses(
        (status = 200, description = "List availability overrides", body = StdResponse<Vec<AvailabilityOverrideEntity>, String>)
    )
)]
async fn get_overrides(
    State(state): State<AppState>,
    Extension(provider_id): Extension<i32>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let overrides: Vec<AvailabilityOverrideEntity> = availability_overrides::table
        .filter(availability_overrides::provider_id.eq(provider_id))
        .order_by(availability_overrides::date.asc())
        .get_results(conn)
        .await
        .context("Failed to get availability overrides")?;

    Ok(StdResponse {
        success: true,
        data: Some(overrides),
        message: Some("Get availability overrides successfully"),
    })
}

#[derive(Deserialize, ToSchema)]
struct UpsertOverrideReq {
    pub date: NaiveDate,
    #[serde(default)]
    pub blocked: bool,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
}

/// Create or replace the override for one date. A blocked override removes
/// the date entirely; a replacement window supersedes the weekly rule.
#[utoipa::path(
    put,
    path = "/overrides",
    tags = ["Availability"],
    params(ForceQuery),
    responses(
        (status = 200, description = "Availability override stored", body = StdResponse<AvailabilityOverrideEntity, String>),
        (status = 409, description = "Orphaned bookings")
    )
)]
async fn upsert_override(
    Query(query): Query<ForceQuery>,
    State(state): State<AppState>,
    Extension(provider_id): Extension<i32>,
    axum::Json(body): axum::Json<UpsertOverrideReq>,
) -> Result<impl IntoResponse, AppError> {
    let window = if body.blocked {
        None
    } else {
        match (body.start_time, body.end_time) {
            (Some(start), Some(end)) => Some(conflicts::validate_window(start, end)?),
            _ => {
                return Err(AppError::Validation(
                    "a replacement override requires start_time and end_time".to_string(),
                ));
            }
        }
    };

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let stored = conn
        .transaction(move |conn| {
            Box::pin(async move {
                if !query.force {
                    let rules = api::availability::load_weekly_rules(conn, provider_id).await?;
                    let mut exceptions =
                        api::availability::load_exceptions(conn, provider_id).await?;
                    exceptions.retain(|exception| exception.date != body.date);
                    exceptions.push(DateException {
                        date: body.date,
                        window,
                    });
                    api::availability::ensure_no_orphaned_bookings(
                        conn,
                        provider_id,
                        &rules,
                        &exceptions,
                    )
                    .await?;
                }

                let (start_time, end_time) = match window {
                    Some(window) => (Some(window.start), Some(window.end)),
                    None => (None, None),
                };

                let stored: AvailabilityOverrideEntity =
                    diesel::insert_into(availability_overrides::table)
                        .values(CreateAvailabilityOverrideEntity {
                            provider_id,
                            date: body.date,
                            blocked: body.blocked,
                            start_time,
                            end_time,
                        })
                        .on_conflict((
                            availability_overrides::provider_id,
                            availability_overrides::date,
                        ))
                        .do_update()
                        .set((
                            availability_overrides::blocked.eq(body.blocked),
                            availability_overrides::start_time.eq(start_time),
                            availability_overrides::end_time.eq(end_time),
                            availability_overrides::updated_at.eq(diesel::dsl::now),
                        ))
                        .returning(AvailabilityOverrideEntity::as_returning())
                        .get_result(conn)
                        .await?;

                Ok::<AvailabilityOverrideEntity, AppError>(stored)
            })
        })
        .await?;

    Ok(StdResponse {
        success: true,
        data: Some(stored),
        message: Some("Availability override stored successfully"),
    })
}

/// Delete an override, restoring the weekly rules for its date.
#[utoipa::path(
    delete,
    path = "/overrides/{id}",
    tags = ["Availability"],
    params(
        ("id" = i32, Path, description = "Override ID to delete"),
        ForceQuery
    ),
    responses(
        (status = 200, description = "Availability override deleted", body = StdResponse<AvailabilityOverrideEntity, String>),
        (status = 409, description = "Orphaned bookings")
    )
)]
async fn delete_override(
    Path(id): Path<i32>,
    Query(query): Query<ForceQuery>,
    State(state): State<AppState>,
    Extension(provider_id): Extension<i32>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let deleted = conn
        .transaction(move |conn| {
            Box::pin(async move {
                let existing: AvailabilityOverrideEntity = availability_overrides::table
                    .find(id)
                    .filter(availability_overrides::provider_id.eq(provider_id))
                    .get_result(conn)
                    .await?;

                if !query.force {
                    let rules = api::availability::load_weekly_rules(conn, provider_id).await?;
                    let mut exceptions =
                        api::availability::load_exceptions(conn, provider_id).await?;
                    exceptions.retain(|exception| exception.date != existing.date);
                    api::availability::ensure_no_orphaned_bookings(
                        conn,
                        provider_id,
                        &rules,
                        &exceptions,
                    )
                    .await?;
                }

                let deleted: AvailabilityOverrideEntity =
                    diesel::delete(availability_overrides::table.find(id))
                        .returning(AvailabilityOverrideEntity::as_returning())
                        .get_result(conn)
                        .await?;

                Ok::<AvailabilityOverrideEntity, AppError>(deleted)
            })
        })
        .await?;

    Ok(StdResponse {
        success: true,
        data: Some(deleted),
        message: Some("Availability override deleted successfully"),
    })
}

#[derive(Serialize, ToSchema)]
struct GetSettingsRes {
    pub slot_minutes: i32,
    pub buffer_minutes: i32,
    pub min_notice_minutes: i32,
    pub max_horizon_days: i32,
    /// False when the provider never stored settings and the platform
    /// defaults apply.
    pub customized: bool,
}

/// Fetch the provider's slot settings, falling back to defaults.
#[utoipa::path(
    get,
    path = "/settings",
    tags = ["Availability"],
    responses(
        (status = 200, description = "Get availability settings", body = StdResponse<GetSettingsRes, String>)
    )
)]
async fn get_settings(
    State(state): State<AppState>,
    Extension(provider_id): Extension<i32>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let settings: Option<AvailabilitySettingsEntity> = availability_settings::table
        .find(provider_id)
        .get_result(conn)
        .await
        .optional()
        .context("Failed to get availability settings")?;

    let customized = settings.is_some();
    let params = settings
        .as_ref()
        .map(SlotParams::from)
        .unwrap_or_default();

    Ok(StdResponse {
        success: true,
        data: Some(GetSettingsRes {
            slot_minutes: params.slot_minutes,
            buffer_minutes: params.buffer_minutes,
            min_notice_minutes: params.min_notice_minutes,
            max_horizon_days: params.max_horizon_days,
            customized,
        }),
        message: Some("Get availability settings successfully"),
    })
}

#[derive(Deserialize, ToSchema)]
struct PutSettingsReq {
    pub slot_minutes: i32,
    pub buffer_minutes: i32,
    pub min_notice_minutes: i32,
    pub max_horizon_days: i32,
}

/// Store the provider's slot settings.
#[utoipa::path(
    put,
    path = "/settings",
    tags = ["Availability"],
    responses(
        (status = 200, description = "Availability settings stored", body = StdResponse<AvailabilitySettingsEntity, String>)
    )
)]
async fn put_settings(
    State(state): State<AppState>,
    Extension(provider_id): Extension<i32>,
    axum::Json(body): axum::Json<PutSettingsReq>,
) -> Result<impl IntoResponse, AppError> {
    if body.slot_minutes <= 0 {
        return Err(AppError::Validation(
            "slot_minutes must be positive".to_string(),
        ));
    }
    if body.buffer_minutes < 0 || body.min_notice_minutes < 0 {
        return Err(AppError::Validation(
            "buffer_minutes and min_notice_minutes must not be negative".to_string(),
        ));
    }
    if body.max_horizon_days <= 0 {
        return Err(AppError::Validation(
            "max_horizon_days must be positive".to_string(),
        ));
    }

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let settings: AvailabilitySettingsEntity =
        diesel::insert_into(availability_settings::table)
            .values(UpsertAvailabilitySettingsEntity {
                provider_id,
                slot_minutes: body.slot_minutes,
                buffer_minutes: body.buffer_minutes,
                min_notice_minutes: body.min_notice_minutes,
                max_horizon_days: body.max_horizon_days,
            })
            .on_conflict(availability_settings::provider_id)
            .do_update()
            .set((
                availability_settings::slot_minutes.eq(body.slot_minutes),
                availability_settings::buffer_minutes.eq(body.buffer_minutes),
                availability_settings::min_notice_minutes.eq(body.min_notice_minutes),
                availability_settings::max_horizon_days.eq(body.max_horizon_days),
                availability_settings::updated_at.eq(diesel::dsl::now),
            ))
            .returning(AvailabilitySettingsEntity::as_returning())
            .get_result(conn)
            .await
            .context("Failed to store availability settings")?;

    Ok(StdResponse {
        success: true,
        data: Some(settings),
        message: Some("Availability settings stored successfully"),
    })
}
