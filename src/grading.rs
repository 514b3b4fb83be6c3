use std::fmt;

use serde::Serialize;

use crate::models::Student;

pub const DEFAULT_ELIGIBILITY_THRESHOLD: f64 = 70.0;

/// Eligible when the aggregate meets the threshold and no backlogs remain.
pub fn is_placement_eligible(aggregate: Option<f64>, active_backlogs: u32, threshold: f64) -> bool {
    active_backlogs == 0 && aggregate.is_some_and(|value| value >= threshold)
}

pub fn ineligibility_reason(student: &Student, threshold: f64) -> Option<String> {
    if student.placement_eligible {
        return None;
    }
    if student.active_backlogs > 0 {
        Some("Has active backlogs".to_string())
    } else {
        Some(format!("Aggregate below {threshold:.0}%"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PerformanceGrade {
    Excellent,
    Good,
    Average,
    BelowAverage,
}

impl PerformanceGrade {
    pub fn from_aggregate(aggregate: Option<f64>) -> Self {
        match aggregate.unwrap_or(0.0) {
            v if v >= 85.0 => PerformanceGrade::Excellent,
            v if v >= 75.0 => PerformanceGrade::Good,
            v if v >= 70.0 => PerformanceGrade::Average,
            _ => PerformanceGrade::BelowAverage,
        }
    }
}

impl fmt::Display for PerformanceGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PerformanceGrade::Excellent => "Excellent",
            PerformanceGrade::Good => "Good",
            PerformanceGrade::Average => "Average",
            PerformanceGrade::BelowAverage => "Below Average",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SemesterGrade {
    APlus,
    A,
    BPlus,
    B,
    C,
    F,
}

impl SemesterGrade {
    pub fn from_percentage(percentage: f64) -> Self {
        match percentage {
            v if v >= 90.0 => SemesterGrade::APlus,
            v if v >= 80.0 => SemesterGrade::A,
            v if v >= 70.0 => SemesterGrade::BPlus,
            v if v >= 60.0 => SemesterGrade::B,
            v if v >= 50.0 => SemesterGrade::C,
            _ => SemesterGrade::F,
        }
    }
}

impl fmt::Display for SemesterGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SemesterGrade::APlus => "A+",
            SemesterGrade::A => "A",
            SemesterGrade::BPlus => "B+",
            SemesterGrade::B => "B",
            SemesterGrade::C => "C",
            SemesterGrade::F => "F",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TermScore {
    pub label: &'static str,
    pub percentage: f64,
}

const SEMESTER_LABELS: [&str; 6] = ["Sem 1", "Sem 2", "Sem 3", "Sem 4", "Sem 5", "Sem 6"];

/// Schooling plus semester percentages in order, skipping terms with no score.
pub fn academic_trend(student: &Student) -> Vec<TermScore> {
    let schooling = [
        ("10th", student.tenth_percentage),
        ("PUC", student.puc_percentage),
    ];

    schooling
        .into_iter()
        .chain(SEMESTER_LABELS.into_iter().zip(student.semesters()))
        .filter_map(|(label, value)| value.map(|percentage| TermScore { label, percentage }))
        .collect()
}

pub fn semester_scores(student: &Student) -> Vec<TermScore> {
    SEMESTER_LABELS
        .into_iter()
        .zip(student.semesters())
        .filter_map(|(label, value)| value.map(|percentage| TermScore { label, percentage }))
        .collect()
}

pub fn completed_semesters(student: &Student) -> usize {
    student.semesters().iter().filter(|value| value.is_some()).count()
}

pub fn aggregate_from_semesters(student: &Student) -> Option<f64> {
    let scores: Vec<f64> = student.semesters().into_iter().flatten().collect();
    if scores.is_empty() {
        None
    } else {
        Some(scores.iter().sum::<f64>() / scores.len() as f64)
    }
}
