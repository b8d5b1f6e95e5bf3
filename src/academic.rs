use std::collections::BTreeMap;

use uuid::Uuid;

use crate::models::{ExamMarkEntry, Period, TeachingAssignment};
use crate::score::{bounded, TEST_AVERAGE_WEIGHT};

/// Percentage awarded when none of a teacher's classes has a mark on record.
pub const FALLBACK_PERCENTAGE: f64 = 100.0;

#[derive(Debug, Clone, PartialEq)]
pub struct AcademicMetrics {
    pub assessed_assignments: u32,
    pub mark_count: u32,
    pub avg_test_percentage: f64,
    pub test_average_score: f64,
    pub used_fallback: bool,
}

pub fn active_triples(assignments: &[TeachingAssignment]) -> Vec<(Uuid, Uuid, Uuid)> {
    let mut triples: Vec<_> = assignments
        .iter()
        .filter(|assignment| assignment.is_active)
        .map(TeachingAssignment::triple)
        .collect();
    triples.sort();
    triples.dedup();
    triples
}

/// Mean of per-assignment mean percentages; each assignment weighs the same
/// regardless of how many marks it holds.
pub fn calculate(
    assignments: &[TeachingAssignment],
    marks: &[ExamMarkEntry],
    period: &Period,
) -> AcademicMetrics {
    let mut per_assignment: BTreeMap<(Uuid, Uuid, Uuid), (u32, f64)> = active_triples(assignments)
        .into_iter()
        .map(|triple| (triple, (0, 0.0)))
        .collect();

    for mark in marks {
        if !period.contains(mark.recorded_date) || !mark.percentage.is_finite() {
            continue;
        }
        let key = (mark.subject_id, mark.class_id, mark.section_id);
        if let Some(entry) = per_assignment.get_mut(&key) {
            entry.0 += 1;
            entry.1 += mark.percentage.clamp(0.0, 100.0);
        }
    }

    let averages: Vec<f64> = per_assignment
        .values()
        .filter(|(count, _)| *count > 0)
        .map(|(count, sum)| sum / *count as f64)
        .collect();
    let mark_count = per_assignment.values().map(|(count, _)| *count).sum();

    let (avg_test_percentage, used_fallback) = if averages.is_empty() {
        (FALLBACK_PERCENTAGE, true)
    } else {
        (averages.iter().sum::<f64>() / averages.len() as f64, false)
    };

    AcademicMetrics {
        assessed_assignments: averages.len() as u32,
        mark_count,
        avg_test_percentage,
        test_average_score: bounded(avg_test_percentage * TEST_AVERAGE_WEIGHT / 100.0, TEST_AVERAGE_WEIGHT),
        used_fallback,
    }
}
