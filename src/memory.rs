use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::error::{SourceError, StoreError};
use crate::models::{
    AttendanceEntry, ExamMarkEntry, HolidayRange, PerformanceResult, Scope, SurveyAnswer, Teacher,
    TeachingAssignment, TestReturnEntry,
};
use crate::source::{PerformanceSource, ReplaceSummary, ResultStore};

#[derive(Debug, Default)]
pub struct MemoryData {
    pub teachers: Vec<Teacher>,
    pub holidays: Vec<HolidayRange>,
    pub attendance: Vec<AttendanceEntry>,
    pub assignments: Vec<TeachingAssignment>,
    pub marks: Vec<ExamMarkEntry>,
    pub surveys: Vec<SurveyAnswer>,
    pub test_returns: Vec<TestReturnEntry>,
    pub results: Vec<PerformanceResult>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    data: Mutex<MemoryData>,
    failing_teacher: Mutex<Option<Uuid>>,
    fail_next_replace: AtomicBool,
    conflict_next_replace: AtomicBool,
}

impl MemoryStore {
    pub fn with_data<T>(&self, f: impl FnOnce(&mut MemoryData) -> T) -> T {
        let mut data = self.data.lock().expect("memory store poisoned");
        f(&mut data)
    }

    pub fn stored_results(&self) -> Vec<PerformanceResult> {
        let mut results = self.with_data(|data| data.results.clone());
        results.sort_by_key(|result| (result.teacher_id, result.campus_id, result.year, result.month));
        results
    }

    /// Every per-teacher read for `teacher_id` fails from now on.
    pub fn fail_reads_for(&self, teacher_id: Uuid) {
        *self.failing_teacher.lock().expect("memory store poisoned") = Some(teacher_id);
    }

    /// The next replacement deletes, then fails before its inserts land.
    pub fn fail_next_replace(&self) {
        self.fail_next_replace.store(true, Ordering::SeqCst);
    }

    pub fn conflict_next_replace(&self) {
        self.conflict_next_replace.store(true, Ordering::SeqCst);
    }

    fn check_reads(&self, teacher_id: Uuid) -> Result<(), SourceError> {
        let failing = *self.failing_teacher.lock().expect("memory store poisoned");
        if failing == Some(teacher_id) {
            return Err(SourceError::Unavailable(format!("records for {teacher_id} unreadable")));
        }
        Ok(())
    }
}

fn within(date: NaiveDate, start: NaiveDate, end: NaiveDate) -> bool {
    start <= date && date <= end
}

#[async_trait]
impl PerformanceSource for MemoryStore {
    async fn active_teachers(&self, campus_id: Option<Uuid>) -> Result<Vec<Teacher>, SourceError> {
        Ok(self.with_data(|data| {
            data.teachers
                .iter()
                .filter(|teacher| campus_id.map_or(true, |campus| teacher.campus_id == campus))
                .cloned()
                .collect()
        }))
    }

    async fn holiday_ranges(
        &self,
        campus_id: Uuid,
        month_start: NaiveDate,
        month_end: NaiveDate,
    ) -> Result<Vec<HolidayRange>, SourceError> {
        Ok(self.with_data(|data| {
            data.holidays
                .iter()
                .filter(|range| range.campus_id == campus_id)
                .filter(|range| {
                    range.start_date <= month_end
                        && range.end_date.unwrap_or(range.start_date) >= month_start
                })
                .cloned()
                .collect()
        }))
    }

    async fn attendance_entries(
        &self,
        employee_id: Uuid,
        period_start: NaiveDate,
        period_end: NaiveDate,
    ) -> Result<Vec<AttendanceEntry>, SourceError> {
        self.check_reads(employee_id)?;
        Ok(self.with_data(|data| {
            data.attendance
                .iter()
                .filter(|entry| entry.employee_id == employee_id)
                .filter(|entry| within(entry.date, period_start, period_end))
                .cloned()
                .collect()
        }))
    }

    async fn active_assignments(&self, teacher_id: Uuid) -> Result<Vec<TeachingAssignment>, SourceError> {
        self.check_reads(teacher_id)?;
        Ok(self.with_data(|data| {
            data.assignments
                .iter()
                .filter(|assignment| assignment.teacher_id == teacher_id && assignment.is_active)
                .cloned()
                .collect()
        }))
    }

    async fn exam_marks(
        &self,
        subject_id: Uuid,
        class_id: Uuid,
        section_id: Uuid,
        period_start: NaiveDate,
        period_end: NaiveDate,
    ) -> Result<Vec<ExamMarkEntry>, SourceError> {
        Ok(self.with_data(|data| {
            data.marks
                .iter()
                .filter(|mark| {
                    mark.subject_id == subject_id
                        && mark.class_id == class_id
                        && mark.section_id == section_id
                })
                .filter(|mark| within(mark.recorded_date, period_start, period_end))
                .cloned()
                .collect()
        }))
    }

    async fn survey_answers(
        &self,
        teacher_id: Uuid,
        period_start: NaiveDate,
        period_end: NaiveDate,
    ) -> Result<Vec<SurveyAnswer>, SourceError> {
        self.check_reads(teacher_id)?;
        Ok(self.with_data(|data| {
            data.surveys
                .iter()
                .filter(|answer| answer.teacher_id == teacher_id)
                .filter(|answer| within(answer.answered_date, period_start, period_end))
                .cloned()
                .collect()
        }))
    }

    async fn test_returns(
        &self,
        teacher_id: Uuid,
        period_start: NaiveDate,
        period_end: NaiveDate,
    ) -> Result<Vec<TestReturnEntry>, SourceError> {
        self.check_reads(teacher_id)?;
        Ok(self.with_data(|data| {
            data.test_returns
                .iter()
                .filter(|entry| entry.teacher_id == teacher_id)
                .filter(|entry| within(entry.exam_date, period_start, period_end))
                .cloned()
                .collect()
        }))
    }
}

#[async_trait]
impl ResultStore for MemoryStore {
    async fn replace_scope(
        &self,
        scope: &Scope,
        results: &[PerformanceResult],
    ) -> Result<ReplaceSummary, StoreError> {
        if self.conflict_next_replace.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Conflict);
        }

        self.with_data(|data| {
            // Work on a copy; only a fully successful replacement is swapped in.
            let mut staged: Vec<PerformanceResult> = data
                .results
                .iter()
                .filter(|row| !scope.includes(row.campus_id, row.month, row.year))
                .cloned()
                .collect();
            let deleted = (data.results.len() - staged.len()) as u64;

            if self.fail_next_replace.swap(false, Ordering::SeqCst) {
                return Err(StoreError::Unavailable("insert failed after delete".to_string()));
            }

            let mut keys: HashSet<(Uuid, Uuid, u32, i32)> = staged
                .iter()
                .map(|row| (row.teacher_id, row.campus_id, row.month, row.year))
                .collect();
            for result in results {
                if !keys.insert((result.teacher_id, result.campus_id, result.month, result.year)) {
                    return Err(StoreError::Unavailable(format!(
                        "duplicate result for teacher {}",
                        result.teacher_id
                    )));
                }
                staged.push(result.clone());
            }

            data.results = staged;
            Ok(ReplaceSummary {
                deleted,
                inserted: results.len() as u64,
            })
        })
    }

    async fn scope_results(&self, scope: &Scope) -> Result<Vec<PerformanceResult>, StoreError> {
        Ok(self.with_data(|data| {
            data.results
                .iter()
                .filter(|row| scope.includes(row.campus_id, row.month, row.year))
                .cloned()
                .collect()
        }))
    }
}
