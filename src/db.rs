use anyhow::Context;
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, NaiveTime, Weekday};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{SourceError, StoreError};
use crate::models::{
    AttendanceEntry, AttendanceStatus, CheckingQuality, ExamMarkEntry, Fallback, HolidayRange,
    PerformanceResult, Scope, SurveyAnswer, Teacher, TeachingAssignment, TestReturnEntry,
};
use crate::source::{PerformanceSource, ReplaceSummary, ResultStore};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Transaction-scoped advisory lock key for a period. Every commit touching
/// the same month serializes on it, whatever its campus filter.
fn period_lock_key(scope: &Scope) -> i64 {
    const NAMESPACE: i64 = 0x5450_0000_0000;
    NAMESPACE + i64::from(scope.year()) * 100 + i64::from(scope.month())
}

fn count(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

fn uncount(row: &PgRow, column: &str) -> u32 {
    u32::try_from(row.get::<i32, _>(column)).unwrap_or(0)
}

fn teacher_from_row(row: &PgRow) -> Teacher {
    Teacher {
        id: row.get("id"),
        full_name: row.get("full_name"),
        campus_id: row.get("campus_id"),
        shift_start: row.get("shift_start"),
        shift_end: row.get("shift_end"),
        late_flexibility_minutes: row
            .get::<Option<i32>, _>("late_flexibility_minutes")
            .map(i64::from),
    }
}

fn result_from_row(row: &PgRow) -> PerformanceResult {
    let codes: Vec<String> = row.get("fallbacks");
    PerformanceResult {
        teacher_id: row.get("teacher_id"),
        teacher_name: row.get("teacher_name"),
        campus_id: row.get("campus_id"),
        month: uncount(row, "month"),
        year: row.get("year"),
        attendance_score: row.get("attendance_score"),
        punctuality_score: row.get("punctuality_score"),
        test_average_score: row.get("test_average_score"),
        survey_score: row.get("survey_score"),
        test_return_score: row.get("test_return_score"),
        checking_quality_score: row.get("checking_quality_score"),
        total_score: row.get("total_score"),
        working_days: uncount(row, "working_days"),
        attended_days: uncount(row, "attended_days"),
        on_time_days: uncount(row, "on_time_days"),
        avg_test_percentage: row.get("avg_test_percentage"),
        total_survey_responses: uncount(row, "total_survey_responses"),
        positive_survey_responses: uncount(row, "positive_survey_responses"),
        total_tests_to_return: uncount(row, "total_tests_to_return"),
        tests_returned_on_time: uncount(row, "tests_returned_on_time"),
        good_checking_count: uncount(row, "good_checking_count"),
        better_checking_count: uncount(row, "better_checking_count"),
        bad_checking_count: uncount(row, "bad_checking_count"),
        fallbacks: codes.iter().filter_map(|code| Fallback::from_code(code)).collect(),
    }
}

#[async_trait]
impl PerformanceSource for PgStore {
    async fn active_teachers(&self, campus_id: Option<Uuid>) -> Result<Vec<Teacher>, SourceError> {
        // Campus shift times stand in for teachers without their own.
        let rows = sqlx::query(
            r#"
            SELECT t.id, t.full_name, t.campus_id,
                   COALESCE(t.shift_start, c.shift_start) AS shift_start,
                   COALESCE(t.shift_end, c.shift_end) AS shift_end,
                   t.late_flexibility_minutes
            FROM teacher_performance.teachers t
            JOIN teacher_performance.campuses c ON c.id = t.campus_id
            WHERE t.is_active AND ($1::uuid IS NULL OR t.campus_id = $1)
            ORDER BY t.id
            "#,
        )
        .bind(campus_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(teacher_from_row).collect())
    }

    async fn holiday_ranges(
        &self,
        campus_id: Uuid,
        month_start: NaiveDate,
        month_end: NaiveDate,
    ) -> Result<Vec<HolidayRange>, SourceError> {
        let rows = sqlx::query(
            r#"
            SELECT campus_id, start_date, end_date, is_holiday, is_active
            FROM teacher_performance.holiday_ranges
            WHERE campus_id = $1
              AND start_date <= $3
              AND COALESCE(end_date, start_date) >= $2
            "#,
        )
        .bind(campus_id)
        .bind(month_start)
        .bind(month_end)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| HolidayRange {
                campus_id: row.get("campus_id"),
                start_date: row.get("start_date"),
                end_date: row.get("end_date"),
                is_holiday: row.get("is_holiday"),
                is_active: row.get("is_active"),
            })
            .collect())
    }

    async fn attendance_entries(
        &self,
        employee_id: Uuid,
        period_start: NaiveDate,
        period_end: NaiveDate,
    ) -> Result<Vec<AttendanceEntry>, SourceError> {
        let rows = sqlx::query(
            r#"
            SELECT employee_id, date, status, time_in, time_out
            FROM teacher_performance.attendance_entries
            WHERE employee_id = $1 AND date BETWEEN $2 AND $3
            ORDER BY date
            "#,
        )
        .bind(employee_id)
        .bind(period_start)
        .bind(period_end)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<AttendanceEntry, SourceError> {
                let status: String = row.get("status");
                Ok(AttendanceEntry {
                    employee_id: row.get("employee_id"),
                    date: row.get("date"),
                    status: status.parse().map_err(|_| SourceError::Malformed {
                        field: "attendance status",
                        value: status.clone(),
                    })?,
                    time_in: row.get("time_in"),
                    time_out: row.get("time_out"),
                })
            })
            .collect()
    }

    async fn active_assignments(&self, teacher_id: Uuid) -> Result<Vec<TeachingAssignment>, SourceError> {
        let rows = sqlx::query(
            r#"
            SELECT teacher_id, subject_id, class_id, section_id, is_active
            FROM teacher_performance.teaching_assignments
            WHERE teacher_id = $1 AND is_active
            "#,
        )
        .bind(teacher_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| TeachingAssignment {
                teacher_id: row.get("teacher_id"),
                subject_id: row.get("subject_id"),
                class_id: row.get("class_id"),
                section_id: row.get("section_id"),
                is_active: row.get("is_active"),
            })
            .collect())
    }

    async fn exam_marks(
        &self,
        subject_id: Uuid,
        class_id: Uuid,
        section_id: Uuid,
        period_start: NaiveDate,
        period_end: NaiveDate,
    ) -> Result<Vec<ExamMarkEntry>, SourceError> {
        let rows = sqlx::query(
            r#"
            SELECT subject_id, class_id, section_id, percentage, recorded_date
            FROM teacher_performance.exam_marks
            WHERE subject_id = $1 AND class_id = $2 AND section_id = $3
              AND recorded_date BETWEEN $4 AND $5
            "#,
        )
        .bind(subject_id)
        .bind(class_id)
        .bind(section_id)
        .bind(period_start)
        .bind(period_end)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| ExamMarkEntry {
                subject_id: row.get("subject_id"),
                class_id: row.get("class_id"),
                section_id: row.get("section_id"),
                percentage: row.get("percentage"),
                recorded_date: row.get("recorded_date"),
            })
            .collect())
    }

    async fn survey_answers(
        &self,
        teacher_id: Uuid,
        period_start: NaiveDate,
        period_end: NaiveDate,
    ) -> Result<Vec<SurveyAnswer>, SourceError> {
        let rows = sqlx::query(
            r#"
            SELECT a.student_id, s.class_id, s.section_id, a.teacher_id, a.response, a.answered_date
            FROM teacher_performance.survey_answers a
            JOIN teacher_performance.students s ON s.id = a.student_id
            WHERE a.teacher_id = $1 AND a.answered_date BETWEEN $2 AND $3
            "#,
        )
        .bind(teacher_id)
        .bind(period_start)
        .bind(period_end)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| SurveyAnswer {
                student_id: row.get("student_id"),
                class_id: row.get("class_id"),
                section_id: row.get("section_id"),
                teacher_id: row.get("teacher_id"),
                response: row.get("response"),
                answered_date: row.get("answered_date"),
            })
            .collect())
    }

    async fn test_returns(
        &self,
        teacher_id: Uuid,
        period_start: NaiveDate,
        period_end: NaiveDate,
    ) -> Result<Vec<TestReturnEntry>, SourceError> {
        let rows = sqlx::query(
            r#"
            SELECT teacher_id, exam_date, return_date, checking_quality
            FROM teacher_performance.test_returns
            WHERE teacher_id = $1 AND exam_date BETWEEN $2 AND $3
            "#,
        )
        .bind(teacher_id)
        .bind(period_start)
        .bind(period_end)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<TestReturnEntry, SourceError> {
                let quality: String = row.get("checking_quality");
                Ok(TestReturnEntry {
                    teacher_id: row.get("teacher_id"),
                    exam_date: row.get("exam_date"),
                    return_date: row.get("return_date"),
                    checking_quality: quality.parse::<CheckingQuality>().map_err(|_| {
                        SourceError::Malformed {
                            field: "checking quality",
                            value: quality.clone(),
                        }
                    })?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl ResultStore for PgStore {
    async fn replace_scope(
        &self,
        scope: &Scope,
        results: &[PerformanceResult],
    ) -> Result<ReplaceSummary, StoreError> {
        // Any early return drops `tx`, which rolls the delete back.
        let mut tx = self.pool.begin().await?;

        let locked: bool = sqlx::query_scalar("SELECT pg_try_advisory_xact_lock($1)")
            .bind(period_lock_key(scope))
            .fetch_one(&mut *tx)
            .await?;
        if !locked {
            return Err(StoreError::Conflict);
        }

        let deleted = sqlx::query(
            r#"
            DELETE FROM teacher_performance.performance_results
            WHERE month = $1 AND year = $2 AND ($3::uuid IS NULL OR campus_id = $3)
            "#,
        )
        .bind(count(scope.month()))
        .bind(scope.year())
        .bind(scope.campus_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let mut inserted = 0u64;
        for result in results {
            let fallbacks: Vec<String> = result
                .fallbacks
                .iter()
                .map(|fallback| fallback.code().to_string())
                .collect();

            inserted += sqlx::query(
                r#"
                INSERT INTO teacher_performance.performance_results (
                    teacher_id, teacher_name, campus_id, month, year,
                    attendance_score, punctuality_score, test_average_score,
                    survey_score, test_return_score, checking_quality_score, total_score,
                    working_days, attended_days, on_time_days, avg_test_percentage,
                    total_survey_responses, positive_survey_responses,
                    total_tests_to_return, tests_returned_on_time,
                    good_checking_count, better_checking_count, bad_checking_count,
                    fallbacks
                )
                VALUES (
                    $1, $2, $3, $4, $5,
                    $6, $7, $8,
                    $9, $10, $11, $12,
                    $13, $14, $15, $16,
                    $17, $18,
                    $19, $20,
                    $21, $22, $23,
                    $24
                )
                "#,
            )
            .bind(result.teacher_id)
            .bind(&result.teacher_name)
            .bind(result.campus_id)
            .bind(count(result.month))
            .bind(result.year)
            .bind(result.attendance_score)
            .bind(result.punctuality_score)
            .bind(result.test_average_score)
            .bind(result.survey_score)
            .bind(result.test_return_score)
            .bind(result.checking_quality_score)
            .bind(result.total_score)
            .bind(count(result.working_days))
            .bind(count(result.attended_days))
            .bind(count(result.on_time_days))
            .bind(result.avg_test_percentage)
            .bind(count(result.total_survey_responses))
            .bind(count(result.positive_survey_responses))
            .bind(count(result.total_tests_to_return))
            .bind(count(result.tests_returned_on_time))
            .bind(count(result.good_checking_count))
            .bind(count(result.better_checking_count))
            .bind(count(result.bad_checking_count))
            .bind(&fallbacks)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }

        tx.commit().await?;
        debug!(scope = %scope, deleted, inserted, "performance results replaced");

        Ok(ReplaceSummary { deleted, inserted })
    }

    async fn scope_results(&self, scope: &Scope) -> Result<Vec<PerformanceResult>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT *
            FROM teacher_performance.performance_results
            WHERE month = $1 AND year = $2 AND ($3::uuid IS NULL OR campus_id = $3)
            "#,
        )
        .bind(count(scope.month()))
        .bind(scope.year())
        .bind(scope.campus_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(result_from_row).collect())
    }
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let campus_id = Uuid::parse_str("6b0f3c1e-6f1d-4b8e-9a51-2f4c8d7e1a10")?;
    sqlx::query(
        r#"
        INSERT INTO teacher_performance.campuses (id, name, shift_start, shift_end)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (id) DO UPDATE
        SET shift_start = EXCLUDED.shift_start, shift_end = EXCLUDED.shift_end
        "#,
    )
    .bind(campus_id)
    .bind("Main Campus")
    .bind(NaiveTime::from_hms_opt(8, 0, 0).context("invalid time")?)
    .bind(NaiveTime::from_hms_opt(14, 0, 0).context("invalid time")?)
    .execute(pool)
    .await?;

    let teachers = vec![
        (
            Uuid::parse_str("3d7f5d6f-24f7-4e8e-8b4b-3e7e44b4a7b2")?,
            "Ayesha Siddiqui",
            "ayesha.siddiqui@school.example",
            Some(10),
        ),
        (
            Uuid::parse_str("0c22f1f1-9184-4fd4-9b21-28c68a6a89dc")?,
            "Bilal Hussain",
            "bilal.hussain@school.example",
            None,
        ),
        (
            Uuid::parse_str("d5a0a1a2-2a3c-44c2-8f73-60b7897a9dd2")?,
            "Nadia Rehman",
            "nadia.rehman@school.example",
            None,
        ),
    ];

    for (id, name, email, flexibility) in &teachers {
        sqlx::query(
            r#"
            INSERT INTO teacher_performance.teachers
            (id, full_name, email, campus_id, late_flexibility_minutes)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (email) DO UPDATE
            SET full_name = EXCLUDED.full_name, campus_id = EXCLUDED.campus_id
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(email)
        .bind(campus_id)
        .bind(*flexibility)
        .execute(pool)
        .await?;
    }

    let month_start = NaiveDate::from_ymd_opt(2026, 2, 1).context("invalid date")?;
    sqlx::query(
        r#"
        INSERT INTO teacher_performance.holiday_ranges
        (id, campus_id, start_date, end_date, is_holiday, is_active)
        VALUES ($1, $2, $3, $4, TRUE, TRUE)
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(Uuid::parse_str("a8c3b7d2-1e4f-4a5b-8c6d-7e8f9a0b1c2d")?)
    .bind(campus_id)
    .bind(NaiveDate::from_ymd_opt(2026, 2, 5).context("invalid date")?)
    .bind(NaiveDate::from_ymd_opt(2026, 2, 6))
    .execute(pool)
    .await?;

    for (index, (teacher_id, _, _, _)) in teachers.iter().enumerate() {
        for offset in 0..28u32 {
            let date = month_start + chrono::Duration::days(i64::from(offset));
            if date.weekday() == Weekday::Sun {
                continue;
            }
            let (status, time_in) = match (index, offset % 7) {
                (1, 2) => (AttendanceStatus::Late, NaiveTime::from_hms_opt(8, 35, 0)),
                (2, 4) => (AttendanceStatus::Absent, None),
                _ => (AttendanceStatus::Present, NaiveTime::from_hms_opt(7, 55, 0)),
            };
            sqlx::query(
                r#"
                INSERT INTO teacher_performance.attendance_entries
                (employee_id, date, status, time_in, time_out)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (employee_id, date) DO NOTHING
                "#,
            )
            .bind(teacher_id)
            .bind(date)
            .bind(status.label())
            .bind(time_in)
            .bind(NaiveTime::from_hms_opt(14, 5, 0))
            .execute(pool)
            .await?;
        }
    }

    let subject_id = Uuid::parse_str("1f2e3d4c-5b6a-4978-8a9b-0c1d2e3f4a5b")?;
    let class_id = Uuid::parse_str("2a3b4c5d-6e7f-4809-9a1b-2c3d4e5f6a7b")?;
    let section_id = Uuid::parse_str("3b4c5d6e-7f80-4912-a3b4-c5d6e7f8a9b0")?;
    let (first_teacher, _, _, _) = teachers[0];

    sqlx::query(
        r#"
        INSERT INTO teacher_performance.teaching_assignments
        (id, teacher_id, subject_id, class_id, section_id, is_active)
        VALUES ($1, $2, $3, $4, $5, TRUE)
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(Uuid::parse_str("4c5d6e7f-8091-4a23-b4c5-d6e7f8a9b0c1")?)
    .bind(first_teacher)
    .bind(subject_id)
    .bind(class_id)
    .bind(section_id)
    .execute(pool)
    .await?;

    let student_id = Uuid::parse_str("5d6e7f80-91a2-4b34-c5d6-e7f8a9b0c1d2")?;
    sqlx::query(
        r#"
        INSERT INTO teacher_performance.students (id, full_name, class_id, section_id)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(student_id)
    .bind("Zara Malik")
    .bind(class_id)
    .bind(section_id)
    .execute(pool)
    .await?;

    let marks = [
        ("6e7f8091-a2b3-4c45-d6e7-f8a9b0c1d2e3", 78.0, 10),
        ("7f8091a2-b3c4-4d56-e7f8-a9b0c1d2e3f4", 84.5, 17),
    ];
    for (id, percentage, day) in marks {
        sqlx::query(
            r#"
            INSERT INTO teacher_performance.exam_marks
            (id, subject_id, class_id, section_id, percentage, recorded_date)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(Uuid::parse_str(id)?)
        .bind(subject_id)
        .bind(class_id)
        .bind(section_id)
        .bind(percentage)
        .bind(NaiveDate::from_ymd_opt(2026, 2, day).context("invalid date")?)
        .execute(pool)
        .await?;
    }

    sqlx::query(
        r#"
        INSERT INTO teacher_performance.survey_answers
        (id, student_id, teacher_id, response, answered_date)
        VALUES ($1, $2, $3, TRUE, $4)
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(Uuid::parse_str("8091a2b3-c4d5-4e67-f8a9-b0c1d2e3f4a5")?)
    .bind(student_id)
    .bind(first_teacher)
    .bind(NaiveDate::from_ymd_opt(2026, 2, 20).context("invalid date")?)
    .execute(pool)
    .await?;

    let returns = [
        ("91a2b3c4-d5e6-4f78-a9b0-c1d2e3f4a5b6", 2, Some(4), CheckingQuality::Better),
        ("a2b3c4d5-e6f7-4089-b0c1-d2e3f4a5b6c7", 9, Some(16), CheckingQuality::Good),
        ("b3c4d5e6-f708-419a-c1d2-e3f4a5b6c7d8", 23, None, CheckingQuality::Bad),
    ];
    for (id, exam_day, return_day, quality) in returns {
        sqlx::query(
            r#"
            INSERT INTO teacher_performance.test_returns
            (id, teacher_id, exam_date, return_date, checking_quality)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(Uuid::parse_str(id)?)
        .bind(first_teacher)
        .bind(NaiveDate::from_ymd_opt(2026, 2, exam_day).context("invalid date")?)
        .bind(return_day.and_then(|day| NaiveDate::from_ymd_opt(2026, 2, day)))
        .bind(quality.label())
        .execute(pool)
        .await?;
    }

    info!(teachers = teachers.len(), "seed data inserted");
    Ok(())
}

#[derive(serde::Deserialize)]
struct AttendanceCsvRow {
    employee_id: Uuid,
    date: NaiveDate,
    status: String,
    time_in: Option<NaiveTime>,
    time_out: Option<NaiveTime>,
}

/// Reads classified attendance with a header row. Blank times are absent
/// times; errors name the file line of the offending record.
pub fn parse_attendance_csv<R: std::io::Read>(input: R) -> anyhow::Result<Vec<AttendanceEntry>> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(input);
    let mut entries = Vec::new();

    for (index, result) in reader.deserialize::<AttendanceCsvRow>().enumerate() {
        let line = index + 2;
        let row = result.with_context(|| format!("invalid attendance row {line}"))?;
        let status: AttendanceStatus = row
            .status
            .parse()
            .with_context(|| format!("invalid attendance row {line}"))?;

        entries.push(AttendanceEntry {
            employee_id: row.employee_id,
            date: row.date,
            status,
            time_in: row.time_in,
            time_out: row.time_out,
        });
    }

    Ok(entries)
}

/// Attendance is immutable per (employee, date): rows already on record are skipped.
pub async fn import_attendance_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let entries = parse_attendance_csv(file)?;
    let mut inserted = 0usize;

    for entry in &entries {
        let result = sqlx::query(
            r#"
            INSERT INTO teacher_performance.attendance_entries
            (employee_id, date, status, time_in, time_out)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (employee_id, date) DO NOTHING
            "#,
        )
        .bind(entry.employee_id)
        .bind(entry.date)
        .bind(entry.status.label())
        .bind(entry.time_in)
        .bind(entry.time_out)
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            inserted += 1;
        }
    }

    debug!(parsed = entries.len(), inserted, "attendance import finished");
    Ok(inserted)
}
