use std::cmp::Ordering;

use crate::models::PerformanceResult;

/// Highest total first; equal totals fall back to name, then teacher id, so
/// the order never depends on how the store returned the rows.
pub fn compare(a: &PerformanceResult, b: &PerformanceResult) -> Ordering {
    b.total_score
        .total_cmp(&a.total_score)
        .then_with(|| a.teacher_name.cmp(&b.teacher_name))
        .then_with(|| a.teacher_id.cmp(&b.teacher_id))
}

#[derive(Debug, Clone)]
pub struct Ranking {
    entries: Vec<PerformanceResult>,
}

impl Ranking {
    pub fn new(mut results: Vec<PerformanceResult>) -> Self {
        results.sort_by(compare);
        Self { entries: results }
    }

    pub fn all(&self) -> &[PerformanceResult] {
        &self.entries
    }

    pub fn top(&self, n: usize) -> &[PerformanceResult] {
        &self.entries[..n.min(self.entries.len())]
    }

    /// 1-based positions; tied totals share the lower position.
    pub fn positions(&self) -> Vec<(usize, &PerformanceResult)> {
        let mut positioned = Vec::with_capacity(self.entries.len());
        let mut current = 0;
        for (index, result) in self.entries.iter().enumerate() {
            let tied = index > 0 && self.entries[index - 1].total_score == result.total_score;
            if !tied {
                current = index + 1;
            }
            positioned.push((current, result));
        }
        positioned
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
