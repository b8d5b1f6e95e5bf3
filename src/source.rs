use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::error::{SourceError, StoreError};
use crate::models::{
    AttendanceEntry, ExamMarkEntry, HolidayRange, PerformanceResult, Scope, SurveyAnswer, Teacher,
    TeachingAssignment, TestReturnEntry,
};

/// Read side of the scoring engine. Date bounds are inclusive.
#[async_trait]
pub trait PerformanceSource: Send + Sync {
    async fn active_teachers(&self, campus_id: Option<Uuid>) -> Result<Vec<Teacher>, SourceError>;

    async fn holiday_ranges(
        &self,
        campus_id: Uuid,
        month_start: NaiveDate,
        month_end: NaiveDate,
    ) -> Result<Vec<HolidayRange>, SourceError>;

    async fn attendance_entries(
        &self,
        employee_id: Uuid,
        period_start: NaiveDate,
        period_end: NaiveDate,
    ) -> Result<Vec<AttendanceEntry>, SourceError>;

    async fn active_assignments(&self, teacher_id: Uuid) -> Result<Vec<TeachingAssignment>, SourceError>;

    async fn exam_marks(
        &self,
        subject_id: Uuid,
        class_id: Uuid,
        section_id: Uuid,
        period_start: NaiveDate,
        period_end: NaiveDate,
    ) -> Result<Vec<ExamMarkEntry>, SourceError>;

    async fn survey_answers(
        &self,
        teacher_id: Uuid,
        period_start: NaiveDate,
        period_end: NaiveDate,
    ) -> Result<Vec<SurveyAnswer>, SourceError>;

    async fn test_returns(
        &self,
        teacher_id: Uuid,
        period_start: NaiveDate,
        period_end: NaiveDate,
    ) -> Result<Vec<TestReturnEntry>, SourceError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplaceSummary {
    pub deleted: u64,
    pub inserted: u64,
}

/// Write side. `replace_scope` is all-or-nothing: on error the scope's
/// previous rows are untouched.
#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn replace_scope(
        &self,
        scope: &Scope,
        results: &[PerformanceResult],
    ) -> Result<ReplaceSummary, StoreError>;

    async fn scope_results(&self, scope: &Scope) -> Result<Vec<PerformanceResult>, StoreError>;
}
