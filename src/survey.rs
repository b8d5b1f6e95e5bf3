use std::collections::HashSet;

use crate::models::{Period, SurveyAnswer, TeachingAssignment};
use crate::score::{ratio_score, SURVEY_WEIGHT};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurveyMetrics {
    pub total_responses: u32,
    pub positive_responses: u32,
    pub survey_score: f64,
    pub used_fallback: bool,
}

/// Only answers from students currently placed in one of the teacher's
/// active class/sections count. No responses means no negative signal.
pub fn calculate(
    assignments: &[TeachingAssignment],
    answers: &[SurveyAnswer],
    period: &Period,
) -> SurveyMetrics {
    let taught: HashSet<_> = assignments
        .iter()
        .filter(|assignment| assignment.is_active)
        .map(TeachingAssignment::class_section)
        .collect();

    let (total_responses, positive_responses) = answers
        .iter()
        .filter(|answer| period.contains(answer.answered_date))
        .filter(|answer| taught.contains(&(answer.class_id, answer.section_id)))
        .fold((0u32, 0u32), |(total, positive), answer| {
            (total + 1, positive + u32::from(answer.response))
        });

    match ratio_score(positive_responses, total_responses, SURVEY_WEIGHT) {
        Some(survey_score) => SurveyMetrics {
            total_responses,
            positive_responses,
            survey_score,
            used_fallback: false,
        },
        None => SurveyMetrics {
            total_responses,
            positive_responses,
            survey_score: SURVEY_WEIGHT,
            used_fallback: true,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn assignment(class_id: Uuid, section_id: Uuid) -> TeachingAssignment {
        TeachingAssignment {
            teacher_id: Uuid::nil(),
            subject_id: Uuid::new_v4(),
            class_id,
            section_id,
            is_active: true,
        }
    }

    fn answer(class_id: Uuid, section_id: Uuid, response: bool, day: u32) -> SurveyAnswer {
        SurveyAnswer {
            student_id: Uuid::new_v4(),
            class_id,
            section_id,
            teacher_id: Uuid::nil(),
            response,
            answered_date: NaiveDate::from_ymd_opt(2024, 3, day).unwrap(),
        }
    }

    #[test]
    fn scores_positive_ratio() {
        let (class, section) = (Uuid::new_v4(), Uuid::new_v4());
        let answers = vec![
            answer(class, section, true, 2),
            answer(class, section, true, 3),
            answer(class, section, true, 4),
            answer(class, section, false, 5),
        ];

        let metrics = calculate(&[assignment(class, section)], &answers, &Period::new(3, 2024).unwrap());
        assert_eq!(metrics.total_responses, 4);
        assert_eq!(metrics.positive_responses, 3);
        assert!((metrics.survey_score - 4.5).abs() < 1e-9);
        assert!(!metrics.used_fallback);
    }

    #[test]
    fn no_answers_awards_full_weight() {
        let (class, section) = (Uuid::new_v4(), Uuid::new_v4());
        let metrics = calculate(&[assignment(class, section)], &[], &Period::new(3, 2024).unwrap());
        assert_eq!(metrics.survey_score, 6.0);
        assert!(metrics.used_fallback);
    }

    #[test]
    fn answers_from_untaught_sections_or_other_months_are_ignored() {
        let (class, section) = (Uuid::new_v4(), Uuid::new_v4());
        let mut april = answer(class, section, false, 1);
        april.answered_date = NaiveDate::from_ymd_opt(2024, 4, 1).unwrap();
        let answers = vec![
            answer(class, Uuid::new_v4(), false, 2),
            april,
            answer(class, section, true, 6),
        ];

        let metrics = calculate(&[assignment(class, section)], &answers, &Period::new(3, 2024).unwrap());
        assert_eq!(metrics.total_responses, 1);
        assert!((metrics.survey_score - 6.0).abs() < 1e-9);
        assert!(!metrics.used_fallback);
    }

    #[test]
    fn all_negative_scores_zero() {
        let (class, section) = (Uuid::new_v4(), Uuid::new_v4());
        let answers = vec![answer(class, section, false, 2), answer(class, section, false, 3)];
        let metrics = calculate(&[assignment(class, section)], &answers, &Period::new(3, 2024).unwrap());
        assert_eq!(metrics.survey_score, 0.0);
    }
}
