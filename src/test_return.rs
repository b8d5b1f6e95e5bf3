use crate::models::{CheckingQuality, Period, TestReturnEntry};
use crate::score::{bounded, ratio_score, CHECKING_QUALITY_WEIGHT, TEST_RETURN_WEIGHT};

pub const DEFAULT_RETURN_FLEXIBILITY_DAYS: i64 = 3;

const BETTER_CREDIT: f64 = 1.0;
const GOOD_CREDIT: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TestReturnMetrics {
    pub total_tests_to_return: u32,
    pub tests_returned_on_time: u32,
    pub good_count: u32,
    pub better_count: u32,
    pub bad_count: u32,
    pub test_return_score: f64,
    pub checking_quality_score: f64,
    pub used_fallback: bool,
}

/// A test never handed back is late no matter how young it is.
pub fn is_returned_on_time(entry: &TestReturnEntry, flexibility_days: i64) -> bool {
    match entry.return_date {
        Some(returned) => (returned - entry.exam_date).num_days() <= flexibility_days,
        None => false,
    }
}

pub fn calculate(entries: &[TestReturnEntry], period: &Period, flexibility_days: i64) -> TestReturnMetrics {
    let mut metrics = TestReturnMetrics {
        total_tests_to_return: 0,
        tests_returned_on_time: 0,
        good_count: 0,
        better_count: 0,
        bad_count: 0,
        test_return_score: TEST_RETURN_WEIGHT,
        checking_quality_score: CHECKING_QUALITY_WEIGHT,
        used_fallback: true,
    };

    for entry in entries.iter().filter(|entry| period.contains(entry.exam_date)) {
        metrics.total_tests_to_return += 1;
        if is_returned_on_time(entry, flexibility_days) {
            metrics.tests_returned_on_time += 1;
        }
        match entry.checking_quality {
            CheckingQuality::Good => metrics.good_count += 1,
            CheckingQuality::Better => metrics.better_count += 1,
            CheckingQuality::Bad => metrics.bad_count += 1,
        }
    }

    if let Some(score) = ratio_score(
        metrics.tests_returned_on_time,
        metrics.total_tests_to_return,
        TEST_RETURN_WEIGHT,
    ) {
        let credit = metrics.better_count as f64 * BETTER_CREDIT + metrics.good_count as f64 * GOOD_CREDIT;
        metrics.test_return_score = score;
        metrics.checking_quality_score = bounded(
            credit / metrics.total_tests_to_return as f64,
            CHECKING_QUALITY_WEIGHT,
        );
        metrics.used_fallback = false;
    }

    metrics
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, d).unwrap()
    }

    fn entry(exam: NaiveDate, returned: Option<NaiveDate>, quality: CheckingQuality) -> TestReturnEntry {
        TestReturnEntry {
            teacher_id: Uuid::nil(),
            exam_date: exam,
            return_date: returned,
            checking_quality: quality,
        }
    }

    fn march() -> Period {
        Period::new(3, 2024).unwrap()
    }

    #[test]
    fn five_day_return_is_late_with_three_day_flexibility() {
        let late = entry(date(3, 1), Some(date(3, 6)), CheckingQuality::Good);
        assert!(!is_returned_on_time(&late, 3));

        let boundary = entry(date(3, 1), Some(date(3, 4)), CheckingQuality::Good);
        assert!(is_returned_on_time(&boundary, 3));
    }

    #[test]
    fn unreturned_test_is_not_on_time() {
        let pending = entry(date(3, 1), None, CheckingQuality::Better);
        assert!(!is_returned_on_time(&pending, 30));
    }

    #[test]
    fn no_entries_awards_full_weights() {
        let metrics = calculate(&[], &march(), DEFAULT_RETURN_FLEXIBILITY_DAYS);
        assert_eq!(metrics.test_return_score, 1.5);
        assert_eq!(metrics.checking_quality_score, 1.0);
        assert!(metrics.used_fallback);
    }

    #[test]
    fn mixes_timeliness_and_quality() {
        let entries = vec![
            entry(date(3, 1), Some(date(3, 2)), CheckingQuality::Better),
            entry(date(3, 5), Some(date(3, 8)), CheckingQuality::Good),
            entry(date(3, 10), Some(date(3, 20)), CheckingQuality::Bad),
            entry(date(3, 12), None, CheckingQuality::Good),
        ];

        let metrics = calculate(&entries, &march(), 3);
        assert_eq!(metrics.total_tests_to_return, 4);
        assert_eq!(metrics.tests_returned_on_time, 2);
        assert!((metrics.test_return_score - 0.75).abs() < 1e-9);
        // (1 * 1.0 + 2 * 0.7) / 4
        assert!((metrics.checking_quality_score - 0.6).abs() < 1e-9);
        assert_eq!(metrics.bad_count, 1);
        assert!(!metrics.used_fallback);
    }

    #[test]
    fn all_better_caps_quality_at_one() {
        let entries = vec![
            entry(date(3, 1), Some(date(3, 1)), CheckingQuality::Better),
            entry(date(3, 2), Some(date(3, 3)), CheckingQuality::Better),
        ];
        let metrics = calculate(&entries, &march(), 3);
        assert_eq!(metrics.checking_quality_score, 1.0);
        assert_eq!(metrics.test_return_score, 1.5);
    }

    #[test]
    fn exams_outside_period_are_ignored() {
        let entries = vec![entry(date(2, 27), Some(date(3, 10)), CheckingQuality::Bad)];
        let metrics = calculate(&entries, &march(), 3);
        assert_eq!(metrics.total_tests_to_return, 0);
        assert!(metrics.used_fallback);
    }
}
