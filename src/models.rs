use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Months, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ScoringError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Teacher {
    pub id: Uuid,
    pub full_name: String,
    pub campus_id: Uuid,
    pub shift_start: Option<NaiveTime>,
    pub shift_end: Option<NaiveTime>,
    pub late_flexibility_minutes: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttendanceStatus {
    Present,
    Absent,
    Leave,
    Late,
    ShortLeave,
}

impl AttendanceStatus {
    pub fn label(self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Absent => "absent",
            AttendanceStatus::Leave => "leave",
            AttendanceStatus::Late => "late",
            AttendanceStatus::ShortLeave => "short_leave",
        }
    }
}

impl FromStr for AttendanceStatus {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace([' ', '-'], "_").as_str() {
            "present" => Ok(AttendanceStatus::Present),
            "absent" => Ok(AttendanceStatus::Absent),
            "leave" => Ok(AttendanceStatus::Leave),
            "late" => Ok(AttendanceStatus::Late),
            "short_leave" | "shortleave" => Ok(AttendanceStatus::ShortLeave),
            _ => Err(UnknownVariant::new("attendance status", value)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceEntry {
    pub employee_id: Uuid,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    pub time_in: Option<NaiveTime>,
    pub time_out: Option<NaiveTime>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HolidayRange {
    pub campus_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub is_holiday: bool,
    pub is_active: bool,
}

impl HolidayRange {
    /// Inclusive; a range without an end date covers only its start date.
    pub fn covers(&self, date: NaiveDate) -> bool {
        let end = self.end_date.unwrap_or(self.start_date);
        self.is_active && self.is_holiday && self.start_date <= date && date <= end
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeachingAssignment {
    pub teacher_id: Uuid,
    pub subject_id: Uuid,
    pub class_id: Uuid,
    pub section_id: Uuid,
    pub is_active: bool,
}

impl TeachingAssignment {
    pub fn class_section(&self) -> (Uuid, Uuid) {
        (self.class_id, self.section_id)
    }

    pub fn triple(&self) -> (Uuid, Uuid, Uuid) {
        (self.subject_id, self.class_id, self.section_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamMarkEntry {
    pub subject_id: Uuid,
    pub class_id: Uuid,
    pub section_id: Uuid,
    pub percentage: f64,
    pub recorded_date: NaiveDate,
}

/// `class_id`/`section_id` are the student's current placement, resolved by the source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurveyAnswer {
    pub student_id: Uuid,
    pub class_id: Uuid,
    pub section_id: Uuid,
    pub teacher_id: Uuid,
    pub response: bool,
    pub answered_date: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CheckingQuality {
    Good,
    Better,
    Bad,
}

impl CheckingQuality {
    pub fn label(self) -> &'static str {
        match self {
            CheckingQuality::Good => "good",
            CheckingQuality::Better => "better",
            CheckingQuality::Bad => "bad",
        }
    }
}

impl FromStr for CheckingQuality {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "good" => Ok(CheckingQuality::Good),
            "better" => Ok(CheckingQuality::Better),
            "bad" => Ok(CheckingQuality::Bad),
            _ => Err(UnknownVariant::new("checking quality", value)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestReturnEntry {
    pub teacher_id: Uuid,
    pub exam_date: NaiveDate,
    pub return_date: Option<NaiveDate>,
    pub checking_quality: CheckingQuality,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant {
    kind: &'static str,
    value: String,
}

impl UnknownVariant {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {} '{}'", self.kind, self.value)
    }
}

impl std::error::Error for UnknownVariant {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Period {
    pub month: u32,
    pub year: i32,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Period {
    pub fn new(month: u32, year: i32) -> Result<Self, ScoringError> {
        let start = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(|| {
            ScoringError::InvalidScope(format!("{year}-{month:02} is not a valid month"))
        })?;
        let end = start
            .checked_add_months(Months::new(1))
            .and_then(|next| next.pred_opt())
            .ok_or_else(|| ScoringError::InvalidScope(format!("{year}-{month:02} is out of range")))?;

        Ok(Self {
            month,
            year,
            start,
            end,
        })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |day| *day <= end)
    }

    pub fn day_count(&self) -> u32 {
        self.end.day()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    pub campus_id: Option<Uuid>,
    pub period: Period,
}

impl Scope {
    pub fn new(campus_id: Option<Uuid>, month: u32, year: i32) -> Result<Self, ScoringError> {
        Ok(Self {
            campus_id,
            period: Period::new(month, year)?,
        })
    }

    pub fn month(&self) -> u32 {
        self.period.month
    }

    pub fn year(&self) -> i32 {
        self.period.year
    }

    pub fn includes(&self, campus_id: Uuid, month: u32, year: i32) -> bool {
        self.period.month == month
            && self.period.year == year
            && self.campus_id.map_or(true, |scoped| scoped == campus_id)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.campus_id {
            Some(campus) => write!(f, "campus {} {}-{:02}", campus, self.year(), self.month()),
            None => write!(f, "all campuses {}-{:02}", self.year(), self.month()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Fallback {
    TestAverage,
    Survey,
    TestReturn,
}

impl Fallback {
    pub fn label(self) -> &'static str {
        match self {
            Fallback::TestAverage => "exam marks",
            Fallback::Survey => "survey",
            Fallback::TestReturn => "test returns",
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Fallback::TestAverage => "test_average",
            Fallback::Survey => "survey",
            Fallback::TestReturn => "test_return",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "test_average" => Some(Fallback::TestAverage),
            "survey" => Some(Fallback::Survey),
            "test_return" => Some(Fallback::TestReturn),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceResult {
    pub teacher_id: Uuid,
    pub teacher_name: String,
    pub campus_id: Uuid,
    pub month: u32,
    pub year: i32,

    pub attendance_score: f64,
    pub punctuality_score: f64,
    pub test_average_score: f64,
    pub survey_score: f64,
    pub test_return_score: f64,
    pub checking_quality_score: f64,
    pub total_score: f64,

    pub working_days: u32,
    pub attended_days: u32,
    pub on_time_days: u32,
    pub avg_test_percentage: f64,
    pub total_survey_responses: u32,
    pub positive_survey_responses: u32,
    pub total_tests_to_return: u32,
    pub tests_returned_on_time: u32,
    pub good_checking_count: u32,
    pub better_checking_count: u32,
    pub bad_checking_count: u32,

    pub fallbacks: Vec<Fallback>,
}

impl PerformanceResult {
    pub fn is_unmeasured(&self) -> bool {
        !self.fallbacks.is_empty()
    }
}
