use std::collections::BTreeSet;

use chrono::{Duration, NaiveDate, NaiveTime};

use crate::calendar::WorkingCalendar;
use crate::models::{AttendanceEntry, AttendanceStatus, Teacher};
use crate::score::{ratio_score, ATTENDANCE_WEIGHT, PUNCTUALITY_WEIGHT};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttendanceMetrics {
    pub working_days: u32,
    pub attended_days: u32,
    pub on_time_days: u32,
    pub attendance_score: f64,
    pub punctuality_score: f64,
}

pub const MAX_TOLERANCE_MINUTES: i64 = 24 * 60;

/// The on-time window after shift start. A teacher's own late flexibility
/// wins; `default_minutes` applies when the employee record has none.
pub fn tolerance_for(teacher: &Teacher, default_minutes: i64) -> Duration {
    let minutes = teacher
        .late_flexibility_minutes
        .filter(|minutes| *minutes >= 0)
        .unwrap_or(default_minutes.max(0))
        .min(MAX_TOLERANCE_MINUTES);
    Duration::try_minutes(minutes).unwrap_or(Duration::MAX)
}

pub fn is_on_time(time_in: NaiveTime, shift_start: NaiveTime, tolerance: Duration) -> bool {
    let (deadline, wrapped_seconds) = shift_start.overflowing_add_signed(tolerance);
    // A deadline past midnight admits every clock-in on the shift's own day.
    wrapped_seconds != 0 || time_in <= deadline
}

/// Entries outside the calendar's working days are ignored and each date is
/// counted at most once, so neither count can exceed `working_days`.
pub fn calculate(
    calendar: &WorkingCalendar,
    entries: &[AttendanceEntry],
    shift_start: Option<NaiveTime>,
    tolerance: Duration,
) -> AttendanceMetrics {
    let mut attended: BTreeSet<NaiveDate> = BTreeSet::new();
    let mut on_time: BTreeSet<NaiveDate> = BTreeSet::new();

    for entry in entries {
        if entry.status != AttendanceStatus::Present || !calendar.is_working_day(entry.date) {
            continue;
        }

        attended.insert(entry.date);

        let timely = match (shift_start, entry.time_in) {
            (Some(start), Some(time_in)) => is_on_time(time_in, start, tolerance),
            _ => false,
        };
        if timely {
            on_time.insert(entry.date);
        }
    }

    let working_days = calendar.working_days();
    let attended_days = attended.len() as u32;
    let on_time_days = on_time.len() as u32;

    AttendanceMetrics {
        working_days,
        attended_days,
        on_time_days,
        attendance_score: ratio_score(attended_days, working_days, ATTENDANCE_WEIGHT).unwrap_or(0.0),
        punctuality_score: ratio_score(on_time_days, working_days, PUNCTUALITY_WEIGHT)
            .unwrap_or(0.0),
    }
}
