use crate::academic::AcademicMetrics;
use crate::attendance::AttendanceMetrics;
use crate::models::{Fallback, PerformanceResult, Period, Teacher};
use crate::survey::SurveyMetrics;
use crate::test_return::TestReturnMetrics;

pub const ATTENDANCE_WEIGHT: f64 = 3.5;
pub const PUNCTUALITY_WEIGHT: f64 = 2.5;
pub const TEST_AVERAGE_WEIGHT: f64 = 5.5;
pub const SURVEY_WEIGHT: f64 = 6.0;
pub const TEST_RETURN_WEIGHT: f64 = 1.5;
pub const CHECKING_QUALITY_WEIGHT: f64 = 1.0;

pub const MAX_TOTAL_SCORE: f64 = ATTENDANCE_WEIGHT
    + PUNCTUALITY_WEIGHT
    + TEST_AVERAGE_WEIGHT
    + SURVEY_WEIGHT
    + TEST_RETURN_WEIGHT
    + CHECKING_QUALITY_WEIGHT;

pub fn ratio_score(numerator: u32, denominator: u32, weight: f64) -> Option<f64> {
    if denominator == 0 {
        return None;
    }
    Some(bounded(numerator as f64 / denominator as f64 * weight, weight))
}

pub fn bounded(value: f64, max: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, max)
    }
}

pub fn aggregate(
    teacher: &Teacher,
    period: &Period,
    attendance: &AttendanceMetrics,
    academic: &AcademicMetrics,
    survey: &SurveyMetrics,
    test_return: &TestReturnMetrics,
) -> PerformanceResult {
    let mut fallbacks = Vec::new();
    if academic.used_fallback {
        fallbacks.push(Fallback::TestAverage);
    }
    if survey.used_fallback {
        fallbacks.push(Fallback::Survey);
    }
    if test_return.used_fallback {
        fallbacks.push(Fallback::TestReturn);
    }

    let attendance_score = bounded(attendance.attendance_score, ATTENDANCE_WEIGHT);
    let punctuality_score = bounded(attendance.punctuality_score, PUNCTUALITY_WEIGHT);
    let test_average_score = bounded(academic.test_average_score, TEST_AVERAGE_WEIGHT);
    let survey_score = bounded(survey.survey_score, SURVEY_WEIGHT);
    let test_return_score = bounded(test_return.test_return_score, TEST_RETURN_WEIGHT);
    let checking_quality_score = bounded(test_return.checking_quality_score, CHECKING_QUALITY_WEIGHT);

    PerformanceResult {
        teacher_id: teacher.id,
        teacher_name: teacher.full_name.clone(),
        campus_id: teacher.campus_id,
        month: period.month,
        year: period.year,
        attendance_score,
        punctuality_score,
        test_average_score,
        survey_score,
        test_return_score,
        checking_quality_score,
        total_score: attendance_score
            + punctuality_score
            + test_average_score
            + survey_score
            + test_return_score
            + checking_quality_score,
        working_days: attendance.working_days,
        attended_days: attendance.attended_days,
        on_time_days: attendance.on_time_days,
        avg_test_percentage: academic.avg_test_percentage,
        total_survey_responses: survey.total_responses,
        positive_survey_responses: survey.positive_responses,
        total_tests_to_return: test_return.total_tests_to_return,
        tests_returned_on_time: test_return.tests_returned_on_time,
        good_checking_count: test_return.good_count,
        better_checking_count: test_return.better_count,
        bad_checking_count: test_return.bad_count,
        fallbacks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{academic, survey, test_return};
    use uuid::Uuid;

    fn teacher() -> Teacher {
        Teacher {
            id: Uuid::new_v4(),
            full_name: "Hamza Qureshi".to_string(),
            campus_id: Uuid::new_v4(),
            shift_start: None,
            shift_end: None,
            late_flexibility_minutes: None,
        }
    }

    fn attendance(working_days: u32, attended_days: u32, on_time_days: u32) -> AttendanceMetrics {
        AttendanceMetrics {
            working_days,
            attended_days,
            on_time_days,
            attendance_score: ratio_score(attended_days, working_days, ATTENDANCE_WEIGHT).unwrap_or(0.0),
            punctuality_score: ratio_score(on_time_days, working_days, PUNCTUALITY_WEIGHT).unwrap_or(0.0),
        }
    }

    #[test]
    fn weights_sum_to_twenty() {
        assert!((MAX_TOTAL_SCORE - 20.0).abs() < 1e-12);
    }

    #[test]
    fn ratio_score_guards_zero_denominator() {
        assert_eq!(ratio_score(5, 0, 3.5), None);
        assert_eq!(ratio_score(0, 4, 3.5), Some(0.0));
        assert_eq!(ratio_score(9, 4, 2.0), Some(2.0));
    }

    #[test]
    fn bounded_collapses_nan_and_clamps() {
        assert_eq!(bounded(f64::NAN, 1.5), 0.0);
        assert_eq!(bounded(-0.2, 1.5), 0.0);
        assert_eq!(bounded(7.0, 6.0), 6.0);
    }

    #[test]
    fn unmeasured_teacher_gets_fallbacks_only() {
        let period = Period::new(3, 2024).unwrap();
        let result = aggregate(
            &teacher(),
            &period,
            &attendance(0, 0, 0),
            &academic::calculate(&[], &[], &period),
            &survey::calculate(&[], &[], &period),
            &test_return::calculate(&[], &period, 3),
        );

        assert_eq!(result.attendance_score, 0.0);
        assert_eq!(result.punctuality_score, 0.0);
        assert!((result.total_score - 14.0).abs() < 1e-9);
        assert_eq!(
            result.fallbacks,
            vec![Fallback::TestAverage, Fallback::Survey, Fallback::TestReturn]
        );
        assert!(result.is_unmeasured());
    }

    #[test]
    fn total_is_exact_sum_of_sub_scores() {
        let period = Period::new(3, 2024).unwrap();
        let result = aggregate(
            &teacher(),
            &period,
            &attendance(20, 18, 15),
            &AcademicMetrics {
                assessed_assignments: 2,
                mark_count: 10,
                avg_test_percentage: 72.0,
                test_average_score: 3.96,
                used_fallback: false,
            },
            &SurveyMetrics {
                total_responses: 10,
                positive_responses: 8,
                survey_score: 4.8,
                used_fallback: false,
            },
            &TestReturnMetrics {
                total_tests_to_return: 4,
                tests_returned_on_time: 3,
                good_count: 2,
                better_count: 1,
                bad_count: 1,
                test_return_score: 1.125,
                checking_quality_score: 0.6,
                used_fallback: false,
            },
        );

        let sum = result.attendance_score
            + result.punctuality_score
            + result.test_average_score
            + result.survey_score
            + result.test_return_score
            + result.checking_quality_score;
        assert_eq!(result.total_score, sum);
        assert!((result.total_score - (3.15 + 1.875 + 3.96 + 4.8 + 1.125 + 0.6)).abs() < 1e-9);
        assert!(result.total_score <= MAX_TOTAL_SCORE);
        assert!(result.fallbacks.is_empty());
    }

    #[test]
    fn perfect_teacher_scores_twenty() {
        let period = Period::new(3, 2024).unwrap();
        let result = aggregate(
            &teacher(),
            &period,
            &attendance(26, 26, 26),
            &academic::calculate(&[], &[], &period),
            &survey::calculate(&[], &[], &period),
            &test_return::calculate(&[], &period, 3),
        );
        assert!((result.total_score - MAX_TOTAL_SCORE).abs() < 1e-9);
    }
}
