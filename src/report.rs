use std::collections::HashMap;
use std::fmt::Write;
use std::path::Path;

use serde::Serialize;
use uuid::Uuid;

use crate::models::{PerformanceResult, Scope};
use crate::ranking::Ranking;

#[derive(Debug, Clone, PartialEq)]
pub struct CampusSummary {
    pub campus_id: Uuid,
    pub teacher_count: usize,
    pub avg_total_score: f64,
    pub avg_working_days: f64,
}

pub fn summarize_by_campus(results: &[PerformanceResult]) -> Vec<CampusSummary> {
    let mut map: HashMap<Uuid, (usize, f64, u64)> = HashMap::new();

    for result in results {
        let entry = map.entry(result.campus_id).or_insert((0, 0.0, 0));
        entry.0 += 1;
        entry.1 += result.total_score;
        entry.2 += u64::from(result.working_days);
    }

    let mut summaries: Vec<CampusSummary> = map
        .into_iter()
        .map(|(campus_id, (count, total, working_days))| CampusSummary {
            campus_id,
            teacher_count: count,
            avg_total_score: if count == 0 { 0.0 } else { total / count as f64 },
            avg_working_days: if count == 0 {
                0.0
            } else {
                working_days as f64 / count as f64
            },
        })
        .collect();

    summaries.sort_by(|a, b| {
        b.avg_total_score
            .total_cmp(&a.avg_total_score)
            .then_with(|| a.campus_id.cmp(&b.campus_id))
    });
    summaries
}

pub fn build_report(scope: &Scope, ranking: &Ranking, top: usize) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Teacher Performance Report");
    let _ = writeln!(output, "Generated for {scope}");
    let _ = writeln!(output);
    let _ = writeln!(output, "## Campus Averages");

    let summaries = summarize_by_campus(ranking.all());
    if summaries.is_empty() {
        let _ = writeln!(output, "No results committed for this scope.");
    } else {
        for summary in &summaries {
            let _ = writeln!(
                output,
                "- campus {}: {} teachers, avg score {:.2}/20 over {:.1} working days",
                summary.campus_id,
                summary.teacher_count,
                summary.avg_total_score,
                summary.avg_working_days
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Ranking");

    if ranking.is_empty() {
        let _ = writeln!(output, "No teachers ranked for this scope.");
    } else {
        let _ = writeln!(
            output,
            "| # | Teacher | Attendance | Punctuality | Exams | Survey | Returns | Checking | Total |"
        );
        let _ = writeln!(output, "|---|---|---|---|---|---|---|---|---|");
        for (position, result) in ranking.positions().into_iter().take(top) {
            let _ = writeln!(
                output,
                "| {} | {} | {:.2} | {:.2} | {:.2} | {:.2} | {:.2} | {:.2} | {:.2} |",
                position,
                result.teacher_name,
                result.attendance_score,
                result.punctuality_score,
                result.test_average_score,
                result.survey_score,
                result.test_return_score,
                result.checking_quality_score,
                result.total_score
            );
        }
    }

    let unmeasured: Vec<&PerformanceResult> = ranking
        .all()
        .iter()
        .filter(|result| result.is_unmeasured())
        .collect();
    let _ = writeln!(output);
    let _ = writeln!(output, "## Scored Without Data");

    if unmeasured.is_empty() {
        let _ = writeln!(output, "Every teacher had data for every sub-metric.");
    } else {
        for result in unmeasured {
            let labels: Vec<&str> = result.fallbacks.iter().map(|fallback| fallback.label()).collect();
            let _ = writeln!(
                output,
                "- {} received full marks for: {}",
                result.teacher_name,
                labels.join(", ")
            );
        }
    }

    output
}

#[derive(Serialize)]
struct CsvRow<'a> {
    rank: usize,
    teacher_id: Uuid,
    teacher_name: &'a str,
    campus_id: Uuid,
    year: i32,
    month: u32,
    attendance_score: f64,
    punctuality_score: f64,
    test_average_score: f64,
    survey_score: f64,
    test_return_score: f64,
    checking_quality_score: f64,
    total_score: f64,
    working_days: u32,
    attended_days: u32,
    on_time_days: u32,
    avg_test_percentage: f64,
    fallbacks: String,
}

pub fn write_csv<W: std::io::Write>(ranking: &Ranking, out: W) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    for (rank, result) in ranking.positions() {
        writer.serialize(CsvRow {
            rank,
            teacher_id: result.teacher_id,
            teacher_name: &result.teacher_name,
            campus_id: result.campus_id,
            year: result.year,
            month: result.month,
            attendance_score: result.attendance_score,
            punctuality_score: result.punctuality_score,
            test_average_score: result.test_average_score,
            survey_score: result.survey_score,
            test_return_score: result.test_return_score,
            checking_quality_score: result.checking_quality_score,
            total_score: result.total_score,
            working_days: result.working_days,
            attended_days: result.attended_days,
            on_time_days: result.on_time_days,
            avg_test_percentage: result.avg_test_percentage,
            fallbacks: result
                .fallbacks
                .iter()
                .map(|fallback| fallback.code())
                .collect::<Vec<_>>()
                .join(";"),
        })?;
    }
    writer.flush()?;
    Ok(())
}

pub fn export_csv(ranking: &Ranking, path: &Path) -> anyhow::Result<()> {
    let file = std::fs::File::create(path)?;
    write_csv(ranking, file)
}
