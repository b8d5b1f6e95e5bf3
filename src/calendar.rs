use chrono::{Datelike, NaiveDate, Weekday};
use uuid::Uuid;

use crate::models::{HolidayRange, Period};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkingCalendar {
    pub campus_id: Uuid,
    pub period: Period,
    dates: Vec<NaiveDate>,
}

impl WorkingCalendar {
    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn working_days(&self) -> u32 {
        self.dates.len() as u32
    }

    pub fn is_working_day(&self, date: NaiveDate) -> bool {
        self.dates.binary_search(&date).is_ok()
    }
}

/// Every date of `period` except Sundays and dates covered by an active
/// holiday range of `campus_id`. Ranges for other campuses are ignored.
pub fn resolve(campus_id: Uuid, period: Period, holidays: &[HolidayRange]) -> WorkingCalendar {
    let holidays: Vec<&HolidayRange> = holidays
        .iter()
        .filter(|range| range.campus_id == campus_id)
        .collect();

    let dates = period
        .days()
        .filter(|day| day.weekday() != Weekday::Sun)
        .filter(|day| !holidays.iter().any(|range| range.covers(*day)))
        .collect();

    WorkingCalendar {
        campus_id,
        period,
        dates,
    }
}
