//! Slot computation for provider calendars.
//!
//! Everything in this module is a pure function of its inputs: the routes
//! load the provider's rules, overrides, settings and bookings and hand them
//! over as plain values, so the engine can be exercised without a database.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;
use utoipa::ToSchema;

use crate::models::{
    AvailabilityOverrideEntity, AvailabilityRuleEntity, AvailabilitySettingsEntity, BookingEntity,
};

/// Effective slot parameters for a provider. Providers without a settings
/// row get the platform defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotParams {
    pub slot_minutes: i32,
    pub buffer_minutes: i32,
    pub min_notice_minutes: i32,
    pub max_horizon_days: i32,
}

impl Default for SlotParams {
    fn default() -> Self {
        Self {
            slot_minutes: 30,
            buffer_minutes: 0,
            min_notice_minutes: 60,
            max_horizon_days: 30,
        }
    }
}

impl From<&AvailabilitySettingsEntity> for SlotParams {
    fn from(settings: &AvailabilitySettingsEntity) -> Self {
        Self {
            slot_minutes: settings.slot_minutes,
            buffer_minutes: settings.buffer_minutes,
            min_notice_minutes: settings.min_notice_minutes,
            max_horizon_days: settings.max_horizon_days,
        }
    }
}

/// A working window within a single day. Windows never span midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeWindow {
    pub fn contains_span(&self, start: NaiveTime, end: NaiveTime) -> bool {
        self.start <= start && end <= self.end
    }
}

/// A recurring weekly rule. Weekdays are numbered 0 (Sunday) through 6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeeklyRule {
    pub weekday: i16,
    pub window: TimeWindow,
}

impl From<&AvailabilityRuleEntity> for WeeklyRule {
    fn from(rule: &AvailabilityRuleEntity) -> Self {
        Self {
            weekday: rule.day_of_week,
            window: TimeWindow {
                start: rule.start_time,
                end: rule.end_time,
            },
        }
    }
}

/// A date-specific exception. `window: None` blocks the whole day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateException {
    pub date: NaiveDate,
    pub window: Option<TimeWindow>,
}

impl From<&AvailabilityOverrideEntity> for DateException {
    fn from(exception: &AvailabilityOverrideEntity) -> Self {
        let window = if exception.blocked {
            None
        } else {
            match (exception.start_time, exception.end_time) {
                (Some(start), Some(end)) => Some(TimeWindow { start, end }),
                _ => None,
            }
        };
        Self {
            date: exception.date,
            window,
        }
    }
}

/// The span a non-cancelled booking occupies on the provider's calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusySpan {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl BusySpan {
    fn overlaps(&self, start: NaiveDateTime, end: NaiveDateTime) -> bool {
        self.start < end && start < self.end
    }
}

impl From<&BookingEntity> for BusySpan {
    fn from(booking: &BookingEntity) -> Self {
        let start = booking.starts_at.naive_utc();
        Self {
            start,
            end: start + Duration::minutes(i64::from(booking.duration_minutes)),
        }
    }
}

pub fn weekday_index(date: NaiveDate) -> i16 {
    date.weekday().num_days_from_sunday() as i16
}

/// Resolves the working windows for one date. An exception for the date
/// always wins over recurring rules, even when a matching rule exists.
pub fn effective_windows(
    date: NaiveDate,
    rules: &[WeeklyRule],
    exceptions: &[DateException],
) -> Vec<TimeWindow> {
    if let Some(exception) = exceptions.iter().find(|e| e.date == date) {
        return exception.window.into_iter().collect();
    }

    let weekday = weekday_index(date);
    let mut windows: Vec<TimeWindow> = rules
        .iter()
        .filter(|rule| rule.weekday == weekday)
        .map(|rule| rule.window)
        .collect();
    windows.sort_by_key(|window| window.start);
    windows
}

/// A single bookable start time. `end` is the end of the service itself;
/// the configured buffer extends the occupied span but is not shown.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, ToSchema)]
pub struct Slot {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub available: bool,
}

/// Lazy candidate sequence over one working window. Cloning restarts the
/// sequence from the window start.
#[derive(Debug, Clone)]
pub struct WindowSlots<'a> {
    cursor: NaiveDateTime,
    window_end: NaiveDateTime,
    step: Duration,
    duration: Duration,
    buffer: Duration,
    earliest: NaiveDateTime,
    busy: &'a [BusySpan],
}

impl<'a> WindowSlots<'a> {
    pub fn new(
        date: NaiveDate,
        window: TimeWindow,
        params: &SlotParams,
        duration_minutes: i32,
        earliest: NaiveDateTime,
        busy: &'a [BusySpan],
    ) -> Self {
        Self {
            cursor: date.and_time(window.start),
            window_end: date.and_time(window.end),
            // malformed granularity is rejected at write time; the max(1)
            // keeps the iterator finite regardless
            step: Duration::minutes(i64::from(params.slot_minutes.max(1))),
            duration: Duration::minutes(i64::from(duration_minutes)),
            buffer: Duration::minutes(i64::from(params.buffer_minutes)),
            earliest,
            busy,
        }
    }
}

impl Iterator for WindowSlots<'_> {
    type Item = Slot;

    fn next(&mut self) -> Option<Slot> {
        let start = self.cursor;
        let occupied_end = start + self.duration + self.buffer;
        if occupied_end > self.window_end {
            return None;
        }
        self.cursor = start + self.step;

        let available = start >= self.earliest
            && !self.busy.iter().any(|span| span.overlaps(start, occupied_end));

        Some(Slot {
            start,
            end: start + self.duration,
            available,
        })
    }
}

#[derive(Debug, Serialize, PartialEq, ToSchema)]
pub struct DaySlots {
    pub date: NaiveDate,
    pub slots: Vec<Slot>,
}

/// Computes the candidate slots for every date in `[from, to]`, clamped to
/// the provider's advance-notice and advance-horizon bounds.
#[allow(clippy::too_many_arguments)]
pub fn compute_slots(
    from: NaiveDate,
    to: NaiveDate,
    now: NaiveDateTime,
    duration_minutes: i32,
    params: &SlotParams,
    rules: &[WeeklyRule],
    exceptions: &[DateException],
    busy: &[BusySpan],
) -> Vec<DaySlots> {
    let earliest = now + Duration::minutes(i64::from(params.min_notice_minutes));
    let horizon_end = now.date() + Duration::days(i64::from(params.max_horizon_days));

    let first = from.max(earliest.date());
    let last = to.min(horizon_end);

    let mut days = Vec::new();
    let mut date = first;
    while date <= last {
        let mut slots = Vec::new();
        for window in effective_windows(date, rules, exceptions) {
            slots.extend(WindowSlots::new(
                date,
                window,
                params,
                duration_minutes,
                earliest,
                busy,
            ));
        }
        days.push(DaySlots { date, slots });
        date = match date.succ_opt() {
            Some(next) => next,
            None => break,
        };
    }
    days
}

#[cfg(test)]
mod tests {
    use super::*;

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

    fn monday_rule() -> WeeklyRule {
        WeeklyRule {
            weekday: 1,
            window: window((9, 0), (17, 0)),
        }
    }

    fn hourly_params() -> SlotParams {
        SlotParams {
            slot_minutes: 60,
            buffer_minutes: 0,
            min_notice_minutes: 0,
            max_horizon_days: 365,
        }
    }

    fn week_before() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 8, 25).unwrap().and_time(t(8, 0))
    }

    fn available(days: &[DaySlots]) -> Vec<NaiveDateTime> {
        days.iter()
            .flat_map(|day| day.slots.iter())
            .filter(|slot| slot.available)
            .map(|slot| slot.start)
            .collect()
    }

    #[test]
    fn no_rules_and_no_exceptions_yield_no_slots() {
        let days = compute_slots(
            monday(),
            monday(),
            week_before(),
            60,
            &hourly_params(),
            &[],
            &[],
            &[],
        );
        assert_eq!(days.len(), 1);
        assert!(days[0].slots.is_empty());
    }

    #[test]
    fn monday_rule_yields_eight_hourly_slots() {
        let days = compute_slots(
            monday(),
            monday(),
            week_before(),
            60,
            &hourly_params(),
            &[monday_rule()],
            &[],
            &[],
        );
        let starts = available(&days);
        assert_eq!(starts.len(), 8);
        assert_eq!(starts[0], monday().and_time(t(9, 0)));
        assert_eq!(starts[7], monday().and_time(t(16, 0)));
    }

    #[test]
    fn confirmed_booking_makes_its_slot_unavailable() {
        let busy = [BusySpan {
            start: monday().and_time(t(10, 0)),
            end: monday().and_time(t(11, 0)),
        }];
        let days = compute_slots(
            monday(),
            monday(),
            week_before(),
            60,
            &hourly_params(),
            &[monday_rule()],
            &[],
            &busy,
        );
        let starts = available(&days);
        assert_eq!(starts.len(), 7);
        assert!(!starts.contains(&monday().and_time(t(10, 0))));
        // the candidate is still emitted, just tagged
        assert_eq!(days[0].slots.len(), 8);
    }

    #[test]
    fn exception_window_replaces_the_weekday_rule_entirely() {
        let exceptions = [DateException {
            date: monday(),
            window: Some(window((12, 0), (14, 0))),
        }];
        let days = compute_slots(
            monday(),
            monday(),
            week_before(),
            60,
            &hourly_params(),
            &[monday_rule()],
            &exceptions,
            &[],
        );
        let starts = available(&days);
        assert_eq!(
            starts,
            vec![monday().and_time(t(12, 0)), monday().and_time(t(13, 0))]
        );
    }

    #[test]
    fn blocked_exception_removes_the_day() {
        let exceptions = [DateException {
            date: monday(),
            window: None,
        }];
        let days = compute_slots(
            monday(),
            monday(),
            week_before(),
            60,
            &hourly_params(),
            &[monday_rule()],
            &exceptions,
            &[],
        );
        assert!(days[0].slots.is_empty());
    }

    #[test]
    fn buffer_counts_against_the_window_end() {
        let params = SlotParams {
            buffer_minutes: 30,
            ..hourly_params()
        };
        let days = compute_slots(
            monday(),
            monday(),
            week_before(),
            60,
            &params,
            &[monday_rule()],
            &[],
            &[],
        );
        let starts = available(&days);
        // 16:00 + 60min service + 30min buffer would exceed 17:00
        assert_eq!(starts.len(), 7);
        assert_eq!(*starts.last().unwrap(), monday().and_time(t(15, 0)));
    }

    #[test]
    fn buffer_extends_the_occupied_span_for_overlap_checks() {
        let params = SlotParams {
            buffer_minutes: 30,
            ..hourly_params()
        };
        // booking at 11:00; the 10:00 candidate occupies 10:00-11:30
        let busy = [BusySpan {
            start: monday().and_time(t(11, 0)),
            end: monday().and_time(t(12, 0)),
        }];
        let days = compute_slots(
            monday(),
            monday(),
            week_before(),
            60,
            &params,
            &[monday_rule()],
            &[],
            &busy,
        );
        let starts = available(&days);
        assert!(!starts.contains(&monday().and_time(t(10, 0))));
        assert!(!starts.contains(&monday().and_time(t(11, 0))));
        assert!(starts.contains(&monday().and_time(t(12, 0))));
    }

    #[test]
    fn candidates_before_the_notice_deadline_are_unavailable() {
        let params = SlotParams {
            min_notice_minutes: 120,
            ..hourly_params()
        };
        let now = monday().and_time(t(8, 0));
        let days = compute_slots(
            monday(),
            monday(),
            now,
            60,
            &params,
            &[monday_rule()],
            &[],
            &[],
        );
        let nine = days[0]
            .slots
            .iter()
            .find(|slot| slot.start.time() == t(9, 0))
            .unwrap();
        assert!(!nine.available);
        let ten = days[0]
            .slots
            .iter()
            .find(|slot| slot.start.time() == t(10, 0))
            .unwrap();
        assert!(ten.available);
    }

    #[test]
    fn horizon_clamps_the_requested_range() {
        let params = SlotParams {
            max_horizon_days: 3,
            ..hourly_params()
        };
        let now = monday().and_time(t(8, 0));
        let days = compute_slots(
            monday(),
            monday() + Duration::days(10),
            now,
            60,
            &params,
            &[monday_rule()],
            &[],
            &[],
        );
        assert_eq!(days.len(), 4);
        assert_eq!(days.last().unwrap().date, monday() + Duration::days(3));
    }

    #[test]
    fn dates_entirely_before_the_notice_deadline_are_skipped() {
        let now = monday().and_time(t(8, 0));
        let params = SlotParams {
            min_notice_minutes: 24 * 60,
            ..hourly_params()
        };
        let days = compute_slots(
            monday(),
            monday() + Duration::days(1),
            now,
            60,
            &params,
            &[monday_rule()],
            &[],
            &[],
        );
        assert_eq!(days.len(), 1);
        assert_eq!(days[0].date, monday() + Duration::days(1));
    }

    #[test]
    fn two_rules_on_one_weekday_both_contribute() {
        let rules = [
            WeeklyRule {
                weekday: 1,
                window: window((14, 0), (16, 0)),
            },
            WeeklyRule {
                weekday: 1,
                window: window((9, 0), (11, 0)),
            },
        ];
        let days = compute_slots(
            monday(),
            monday(),
            week_before(),
            60,
            &hourly_params(),
            &rules,
            &[],
            &[],
        );
        let starts = available(&days);
        assert_eq!(
            starts,
            vec![
                monday().and_time(t(9, 0)),
                monday().and_time(t(10, 0)),
                monday().and_time(t(14, 0)),
                monday().and_time(t(15, 0)),
            ]
        );
    }

    #[test]
    fn window_slots_is_restartable() {
        let busy = [BusySpan {
            start: monday().and_time(t(10, 0)),
            end: monday().and_time(t(11, 0)),
        }];
        let iter = WindowSlots::new(
            monday(),
            window((9, 0), (17, 0)),
            &hourly_params(),
            60,
            week_before(),
            &busy,
        );
        let first: Vec<Slot> = iter.clone().collect();
        let second: Vec<Slot> = iter.collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 8);
    }

    #[test]
    fn computation_is_idempotent() {
        let busy = [BusySpan {
            start: monday().and_time(t(10, 0)),
            end: monday().and_time(t(11, 0)),
        }];
        let run = || {
            compute_slots(
                monday(),
                monday() + Duration::days(7),
                week_before(),
                60,
                &hourly_params(),
                &[monday_rule()],
                &[],
                &busy,
            )
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn every_slot_fits_inside_its_window() {
        let params = SlotParams {
            slot_minutes: 45,
            buffer_minutes: 15,
            min_notice_minutes: 0,
            max_horizon_days: 365,
        };
        let days = compute_slots(
            monday(),
            monday(),
            week_before(),
            50,
            &params,
            &[monday_rule()],
            &[],
            &[],
        );
        let window_end = monday().and_time(t(17, 0));
        for slot in &days[0].slots {
            assert!(slot.end + Duration::minutes(15) <= window_end);
        }
    }

    #[test]
    fn default_params_match_the_documented_fallbacks() {
        let params = SlotParams::default();
        assert_eq!(params.slot_minutes, 30);
        assert_eq!(params.buffer_minutes, 0);
        assert_eq!(params.min_notice_minutes, 60);
        assert_eq!(params.max_horizon_days, 30);
    }
}
