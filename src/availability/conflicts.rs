//! Write-path validation for availability rules and overrides.

use chrono::{NaiveDateTime, NaiveTime};
use uuid::Uuid;

use crate::availability::slots::{DateException, TimeWindow, WeeklyRule, effective_windows};
use crate::core::app_error::AppError;
use crate::models::BookingEntity;

pub fn validate_weekday(day_of_week: i16) -> Result<(), AppError> {
    if (0..=6).contains(&day_of_week) {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "day_of_week must be between 0 and 6, got {day_of_week}"
        )))
    }
}

pub fn validate_window(start: NaiveTime, end: NaiveTime) -> Result<TimeWindow, AppError> {
    if start >= end {
        return Err(AppError::Validation(format!(
            "window start {start} must be before end {end}"
        )));
    }
    Ok(TimeWindow { start, end })
}

/// An active rule of the same provider, used for overlap checks.
#[derive(Debug, Clone, Copy)]
pub struct ExistingRule {
    pub id: i32,
    pub weekday: i16,
    pub window: TimeWindow,
}

/// Returns the id of an active rule whose window overlaps the candidate on
/// the same day-of-week. Touching windows (end == start) do not overlap.
pub fn find_overlapping_rule(
    weekday: i16,
    window: TimeWindow,
    existing: &[ExistingRule],
) -> Option<i32> {
    existing
        .iter()
        .find(|rule| {
            rule.weekday == weekday
                && rule.window.start < window.end
                && window.start < rule.window.end
        })
        .map(|rule| rule.id)
}

/// A CONFIRMED booking checked against a prospective rule/override state.
#[derive(Debug, Clone, Copy)]
pub struct ConfirmedBooking {
    pub id: Uuid,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl From<&BookingEntity> for ConfirmedBooking {
    fn from(booking: &BookingEntity) -> Self {
        let start = booking.starts_at.naive_utc();
        Self {
            id: booking.id,
            start,
            end: start + chrono::Duration::minutes(i64::from(booking.duration_minutes)),
        }
    }
}

/// Bookings that would fall outside every working window under the
/// prospective rules and exceptions. A non-empty result blocks the write
/// unless the caller forces it.
pub fn orphaned_bookings(
    rules: &[WeeklyRule],
    exceptions: &[DateException],
    bookings: &[ConfirmedBooking],
) -> Vec<Uuid> {
    bookings
        .iter()
        .filter(|booking| {
            if booking.start.date() != booking.end.date() {
                return true;
            }
            let windows = effective_windows(booking.start.date(), rules, exceptions);
            !windows
                .iter()
                .any(|window| window.contains_span(booking.start.time(), booking.end.time()))
        })
        .map(|booking| booking.id)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn t(hour: u32, min: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, min, 0).unwrap()
    }

    fn window(start: (u32, u32), end: (u32, u32)) -> TimeWindow {
        TimeWindow {
            start: t(start.0, start.1),
            end: t(end.0, end.1),
        }
    }

    // 2025-09-01 is a Monday.
    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 9, 1).unwrap()
    }

    #[test]
    fn inverted_and_empty_windows_are_rejected() {
        assert!(validate_window(t(17, 0), t(9, 0)).is_err());
        assert!(validate_window(t(9, 0), t(9, 0)).is_err());
        assert!(validate_window(t(9, 0), t(17, 0)).is_ok());
    }

    #[test]
    fn out_of_range_weekdays_are_rejected() {
        assert!(validate_weekday(-1).is_err());
        assert!(validate_weekday(7).is_err());
        assert!(validate_weekday(0).is_ok());
        assert!(validate_weekday(6).is_ok());
    }

    #[test]
    fn overlap_is_detected_on_the_same_weekday_only() {
        let existing = [ExistingRule {
            id: 11,
            weekday: 1,
            window: window((9, 0), (12, 0)),
        }];
        assert_eq!(
            find_overlapping_rule(1, window((11, 0), (15, 0)), &existing),
            Some(11)
        );
        assert_eq!(
            find_overlapping_rule(2, window((11, 0), (15, 0)), &existing),
            None
        );
    }

    #[test]
    fn touching_windows_do_not_overlap() {
        let existing = [ExistingRule {
            id: 11,
            weekday: 1,
            window: window((9, 0), (12, 0)),
        }];
        assert_eq!(
            find_overlapping_rule(1, window((12, 0), (15, 0)), &existing),
            None
        );
    }

    #[test]
    fn booking_inside_the_new_window_is_not_orphaned() {
        let rules = [WeeklyRule {
            weekday: 1,
            window: window((9, 0), (17, 0)),
        }];
        let booking = ConfirmedBooking {
            id: Uuid::new_v4(),
            start: monday().and_time(t(10, 0)),
            end: monday().and_time(t(11, 0)),
        };
        assert!(orphaned_bookings(&rules, &[], &[booking]).is_empty());
    }

    #[test]
    fn shrinking_the_window_orphans_bookings_outside_it() {
        let rules = [WeeklyRule {
            weekday: 1,
            window: window((9, 0), (12, 0)),
        }];
        let booking = ConfirmedBooking {
            id: Uuid::new_v4(),
            start: monday().and_time(t(14, 0)),
            end: monday().and_time(t(15, 0)),
        };
        assert_eq!(orphaned_bookings(&rules, &[], &[booking]), vec![booking.id]);
    }

    #[test]
    fn blocking_exception_orphans_every_booking_on_that_date() {
        let rules = [WeeklyRule {
            weekday: 1,
            window: window((9, 0), (17, 0)),
        }];
        let exceptions = [DateException {
            date: monday(),
            window: None,
        }];
        let booking = ConfirmedBooking {
            id: Uuid::new_v4(),
            start: monday().and_time(t(10, 0)),
            end: monday().and_time(t(11, 0)),
        };
        assert_eq!(
            orphaned_bookings(&rules, &exceptions, &[booking]),
            vec![booking.id]
        );
    }

    #[test]
    fn removing_every_rule_orphans_future_bookings() {
        let booking = ConfirmedBooking {
            id: Uuid::new_v4(),
            start: monday().and_time(t(10, 0)),
            end: monday().and_time(t(11, 0)),
        };
        assert_eq!(orphaned_bookings(&[], &[], &[booking]), vec![booking.id]);
    }
}
