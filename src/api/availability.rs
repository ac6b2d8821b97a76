//! Shared loaders for the availability state of one provider. Used by the
//! slot routes, the booking routes and the write-path conflict checks.

use anyhow::Context;
use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
use diesel::{ExpressionMethods, OptionalExtension, QueryDsl};
use diesel_async::RunQueryDsl;

use crate::availability::conflicts::{self, ConfirmedBooking};
use crate::availability::slots::{BusySpan, DateException, SlotParams, WeeklyRule};
use crate::core::app_error::{AppError, ConflictKind};
use crate::core::db::DbConn;
use crate::models::{
    AvailabilityOverrideEntity, AvailabilityRuleEntity, AvailabilitySettingsEntity, BookingEntity,
};
use crate::schema::{availability_overrides, availability_rules, availability_settings, bookings};

pub async fn load_weekly_rules(
    conn: &mut DbConn<'_>,
    provider_id: i32,
) -> Result<Vec<WeeklyRule>, AppError> {
    let rules: Vec<AvailabilityRuleEntity> = availability_rules::table
        .filter(availability_rules::provider_id.eq(provider_id))
        .filter(availability_rules::active.eq(true))
        .get_results(conn)
        .await
        .context("Failed to get availability rules")?;

    Ok(rules.iter().map(WeeklyRule::from).collect())
}

pub async fn load_exceptions(
    conn: &mut DbConn<'_>,
    provider_id: i32,
) -> Result<Vec<DateException>, AppError> {
    let overrides: Vec<AvailabilityOverrideEntity> = availability_overrides::table
        .filter(availability_overrides::provider_id.eq(provider_id))
        .get_results(conn)
        .await
        .context("Failed to get availability overrides")?;

    Ok(overrides.iter().map(DateException::from).collect())
}

/// Loads the provider's slot parameters, falling back to the platform
/// defaults when the provider never stored settings.
pub async fn load_params(
    conn: &mut DbConn<'_>,
    provider_id: i32,
) -> Result<SlotParams, AppError> {
    let settings: Option<AvailabilitySettingsEntity> = availability_settings::table
        .find(provider_id)
        .get_result(conn)
        .await
        .optional()
        .context("Failed to get availability settings")?;

    Ok(settings
        .as_ref()
        .map(SlotParams::from)
        .unwrap_or_default())
}

/// Occupied spans of every non-cancelled booking within `[from, to]`.
pub async fn load_busy_spans(
    conn: &mut DbConn<'_>,
    provider_id: i32,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<BusySpan>, AppError> {
    let range_start = Utc.from_utc_datetime(&from.and_time(NaiveTime::MIN));
    let range_end = Utc.from_utc_datetime(
        &to.succ_opt()
            .unwrap_or(to)
            .and_time(NaiveTime::MIN),
    );

    let taken: Vec<BookingEntity> = bookings::table
        .filter(bookings::provider_id.eq(provider_id))
        .filter(bookings::status.ne("CANCELLED"))
        .filter(bookings::starts_at.ge(range_start))
        .filter(bookings::starts_at.lt(range_end))
        .get_results(conn)
        .await
        .context("Failed to get bookings")?;

    Ok(taken.iter().map(BusySpan::from).collect())
}

/// Rejects an availability write that would leave a future CONFIRMED
/// booking outside every working window of the prospective state.
pub async fn ensure_no_orphaned_bookings(
    conn: &mut DbConn<'_>,
    provider_id: i32,
    rules_after: &[WeeklyRule],
    exceptions_after: &[DateException],
) -> Result<(), AppError> {
    let confirmed: Vec<BookingEntity> = bookings::table
        .filter(bookings::provider_id.eq(provider_id))
        .filter(bookings::status.eq("CONFIRMED"))
        .filter(bookings::starts_at.gt(Utc::now()))
        .get_results(conn)
        .await
        .context("Failed to get confirmed bookings")?;

    let confirmed: Vec<ConfirmedBooking> = confirmed.iter().map(ConfirmedBooking::from).collect();
    let orphaned = conflicts::orphaned_bookings(rules_after, exceptions_after, &confirmed);
    if orphaned.is_empty() {
        Ok(())
    } else {
        Err(AppError::Conflict(ConflictKind::OrphanedBookings {
            booking_ids: orphaned,
        }))
    }
}
