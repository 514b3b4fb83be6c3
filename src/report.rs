use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::grading::{self, PerformanceGrade, SemesterGrade};
use crate::models::{AnalyticsSummary, Student, StudentList};

/// "7th-sem" -> "7TH SEM".
pub fn batch_label(batch: &str) -> String {
    batch.replacen('-', " ", 1).to_uppercase()
}

fn percent(value: Option<f64>, precision: usize) -> String {
    match value {
        Some(value) => format!("{value:.precision$}%"),
        None => "N/A".to_string(),
    }
}

pub fn render_student_list(list: &StudentList) -> String {
    let mut output = String::new();

    if list.students.is_empty() {
        let _ = writeln!(output, "No students found.");
        let _ = writeln!(output, "Try adjusting your search or filter criteria.");
        return output;
    }

    let _ = writeln!(output, "Showing {} of {} students", list.students.len(), list.total);
    let _ = writeln!(
        output,
        "{:<24} {:<12} {:<9} {:>9} {:>8}  {:<12} {}",
        "Name", "USN", "Batch", "Aggregate", "Backlogs", "Placement", "Eligible"
    );

    for student in &list.students {
        let _ = writeln!(
            output,
            "{:<24} {:<12} {:<9} {:>9} {:>8}  {:<12} {}",
            student.name,
            student.usn,
            student.batch.replacen('-', " ", 1),
            percent(student.aggregate_percentage, 1),
            student.active_backlogs,
            student.placement_status,
            if student.placement_eligible { "Eligible" } else { "Not Eligible" }
        );
    }

    output
}

pub fn render_student_detail(student: &Student, eligibility_threshold: f64) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "{} ({})", student.name, student.usn);
    let _ = writeln!(output, "Batch: {}", student.batch.replacen('-', " ", 1));
    let _ = writeln!(output);

    let _ = writeln!(output, "Academic Performance");
    let _ = writeln!(output, "  Aggregate: {}", percent(student.aggregate_percentage, 2));
    let _ = writeln!(output, "  10th: {}", percent(student.tenth_percentage, 1));
    let _ = writeln!(output, "  PUC: {}", percent(student.puc_percentage, 1));
    let _ = writeln!(
        output,
        "  Grade: {}",
        PerformanceGrade::from_aggregate(student.aggregate_percentage)
    );
    let _ = writeln!(
        output,
        "  Completed semesters: {}",
        grading::completed_semesters(student)
    );
    let _ = writeln!(output);

    let _ = writeln!(output, "Placement");
    let _ = writeln!(output, "  Status: {}", student.placement_status);
    let _ = writeln!(
        output,
        "  Eligibility: {}",
        if student.placement_eligible { "Eligible" } else { "Not Eligible" }
    );
    let _ = writeln!(output, "  Active backlogs: {}", student.active_backlogs);
    if let Some(reason) = grading::ineligibility_reason(student, eligibility_threshold) {
        let _ = writeln!(output, "  Reason: {reason}");
    }

    let trend: Vec<String> = grading::academic_trend(student)
        .iter()
        .map(|term| format!("{} {:.1}%", term.label, term.percentage))
        .collect();
    if !trend.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "Performance Trend");
        let _ = writeln!(output, "  {}", trend.join(" -> "));
    }

    let semesters = grading::semester_scores(student);
    let _ = writeln!(output);
    let _ = writeln!(output, "Semester Performance");
    if semesters.is_empty() {
        let _ = writeln!(output, "  No semester results recorded.");
    } else {
        for term in &semesters {
            let _ = writeln!(
                output,
                "  {:<6} {:>6.1}%  {}",
                term.label,
                term.percentage,
                SemesterGrade::from_percentage(term.percentage)
            );
        }
    }

    output
}

pub fn build_report(batch: Option<&str>, generated_at: DateTime<Utc>, summary: &AnalyticsSummary) -> String {
    let mut output = String::new();
    let batch_name = batch.map_or_else(|| "all batches".to_string(), batch_label);

    let _ = writeln!(output, "# Student Analytics Report");
    let _ = writeln!(
        output,
        "Generated for {} on {}",
        batch_name,
        generated_at.format("%Y-%m-%d %H:%M UTC")
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Overview");
    let _ = writeln!(output, "- Total students: {}", summary.total_students);
    let _ = writeln!(
        output,
        "- Placement eligible: {} ({:.1}%)",
        summary.placement_eligible_count, summary.placement_eligible_percentage
    );
    let _ = writeln!(output, "- Average aggregate: {:.1}%", summary.average_aggregate);
    let _ = writeln!(
        output,
        "- Not eligible: {}",
        summary.total_students - summary.placement_eligible_count
    );
    if summary.ungraded_count > 0 {
        let _ = writeln!(output, "- Without aggregate: {}", summary.ungraded_count);
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Performance Distribution");
    if summary.performance_distribution.iter().all(|b| b.count == 0) {
        let _ = writeln!(output, "No graded students in scope.");
    } else {
        let _ = writeln!(output, "| Range | Students | Share |");
        let _ = writeln!(output, "|-------|----------|-------|");
        for bucket in &summary.performance_distribution {
            let _ = writeln!(
                output,
                "| {} | {} | {:.1}% |",
                bucket.range, bucket.count, bucket.percentage
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Batch Comparison");
    if summary.batch_comparison.is_empty() {
        let _ = writeln!(output, "No batches in scope.");
    } else {
        let _ = writeln!(output, "| Batch | Students | Eligible | Average | Top performers |");
        let _ = writeln!(output, "|-------|----------|----------|---------|----------------|");
        for batch in &summary.batch_comparison {
            let _ = writeln!(
                output,
                "| {} | {} | {} | {:.1}% | {} |",
                batch_label(&batch.batch),
                batch.total_students,
                batch.placement_eligible,
                batch.average_aggregate,
                batch.top_performers
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Top Performers");
    if summary.top_performers.is_empty() {
        let _ = writeln!(output, "No top performers found.");
    } else {
        for (index, performer) in summary.top_performers.iter().enumerate() {
            let _ = writeln!(
                output,
                "{}. {} ({}, {}) {:.2}%",
                index + 1,
                performer.name,
                performer.usn,
                batch_label(&performer.batch),
                performer.aggregate_percentage
            );
        }
    }

    output
}
