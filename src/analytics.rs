use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::models::{AnalyticsSummary, BatchComparison, DistributionBucket, Student, TopPerformer};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsOptions {
    #[serde(default = "default_bucket_width")]
    pub bucket_width: u32,
    #[serde(default = "default_top_limit")]
    pub top_limit: usize,
    #[serde(default = "default_top_performer_threshold")]
    pub top_performer_threshold: f64,
}

impl Default for AnalyticsOptions {
    fn default() -> Self {
        Self {
            bucket_width: default_bucket_width(),
            top_limit: default_top_limit(),
            top_performer_threshold: default_top_performer_threshold(),
        }
    }
}

fn default_bucket_width() -> u32 {
    10
}

fn default_top_limit() -> usize {
    10
}

fn default_top_performer_threshold() -> f64 {
    85.0
}

pub fn count_total(students: &[Student]) -> usize {
    students.len()
}

pub fn count_eligible<'a>(students: impl IntoIterator<Item = &'a Student>) -> usize {
    students.into_iter().filter(|s| s.placement_eligible).count()
}

pub fn percentage_of(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64 * 100.0
    }
}

pub fn average_aggregate<'a>(students: impl IntoIterator<Item = &'a Student>) -> f64 {
    let (sum, count) = students
        .into_iter()
        .filter_map(Student::graded_aggregate)
        .fold((0.0, 0usize), |(sum, count), value| (sum + value, count + 1));

    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Fixed-width histogram over aggregate percentage. Ungraded students are left out
/// of both the counts and the percentage base.
pub fn bucket_distribution(students: &[Student], bucket_width: u32) -> Vec<DistributionBucket> {
    let width = bucket_width.clamp(1, 100);
    let bucket_count = 100u32.div_ceil(width) as usize;
    let mut counts = vec![0usize; bucket_count];

    let graded: Vec<f64> = students.iter().filter_map(Student::graded_aggregate).collect();
    for value in &graded {
        let index = (value.clamp(0.0, 100.0) / f64::from(width)).floor() as usize;
        counts[index.min(bucket_count - 1)] += 1;
    }

    counts
        .into_iter()
        .enumerate()
        .map(|(index, count)| {
            let lower = index as u32 * width;
            let upper = (lower + width).min(100);
            DistributionBucket {
                range: format!("{lower}-{upper}"),
                count,
                percentage: percentage_of(count, graded.len()),
            }
        })
        .collect()
}

/// Descending by aggregate with ungraded students last, ties broken by USN.
pub fn compare_by_aggregate_desc(a: &Student, b: &Student) -> Ordering {
    match (a.graded_aggregate(), b.graded_aggregate()) {
        (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| a.usn.cmp(&b.usn))
}

pub fn rank_top_performers(students: &[Student], limit: usize) -> Vec<TopPerformer> {
    let mut ranked: Vec<&Student> = students.iter().collect();
    ranked.sort_by(|a, b| compare_by_aggregate_desc(a, b));

    ranked
        .into_iter()
        .take(limit)
        .filter_map(|student| {
            student.graded_aggregate().map(|aggregate| TopPerformer {
                name: student.name.clone(),
                usn: student.usn.clone(),
                aggregate_percentage: aggregate,
                batch: student.batch.clone(),
            })
        })
        .collect()
}

/// Batches whose label starts with a number ("5th-sem") order by it; anything
/// else follows alphabetically.
pub fn batch_order(a: &str, b: &str) -> Ordering {
    fn leading_number(batch: &str) -> Option<u32> {
        let digits: String = batch.chars().take_while(char::is_ascii_digit).collect();
        digits.parse().ok()
    }

    match (leading_number(a), leading_number(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| a.cmp(b))
}

pub fn compare_batches(students: &[Student], top_performer_threshold: f64) -> Vec<BatchComparison> {
    let mut groups: HashMap<&str, Vec<&Student>> = HashMap::new();
    for student in students {
        groups.entry(student.batch.as_str()).or_default().push(student);
    }

    let mut comparisons: Vec<BatchComparison> = groups
        .into_iter()
        .map(|(batch, members)| BatchComparison {
            batch: batch.to_string(),
            total_students: members.len(),
            placement_eligible: count_eligible(members.iter().copied()),
            average_aggregate: average_aggregate(members.iter().copied()),
            top_performers: members
                .iter()
                .copied()
                .filter_map(Student::graded_aggregate)
                .filter(|value| *value >= top_performer_threshold)
                .count(),
        })
        .collect();

    comparisons.sort_by(|a, b| batch_order(&a.batch, &b.batch));
    comparisons
}

pub fn summarize(students: &[Student], options: &AnalyticsOptions) -> AnalyticsSummary {
    let total_students = count_total(students);
    let placement_eligible_count = count_eligible(students);

    AnalyticsSummary {
        total_students,
        placement_eligible_count,
        placement_eligible_percentage: percentage_of(placement_eligible_count, total_students),
        average_aggregate: average_aggregate(students),
        ungraded_count: students
            .iter()
            .filter(|s| s.graded_aggregate().is_none())
            .count(),
        performance_distribution: bucket_distribution(students, options.bucket_width),
        batch_comparison: compare_batches(students, options.top_performer_threshold),
        top_performers: rank_top_performers(students, options.top_limit),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grading::tests::sample_student;
    use proptest::prelude::*;

    fn example_students() -> Vec<Student> {
        vec![
            sample_student("A", "7th-sem", Some(92.0)),
            sample_student("B", "7th-sem", Some(68.0)),
            sample_student("C", "5th-sem", None),
        ]
    }

    #[test]
    fn summarizes_the_worked_example() {
        let summary = summarize(&example_students(), &AnalyticsOptions::default());
        assert_eq!(summary.total_students, 3);
        assert_eq!(summary.ungraded_count, 1);
        assert!((summary.average_aggregate - 80.0).abs() < 1e-9);

        let usns: Vec<&str> = summary.top_performers.iter().map(|t| t.usn.as_str()).collect();
        assert_eq!(usns, vec!["A", "B"]);

        assert_eq!(summary.placement_eligible_count, 1);
        assert!((summary.placement_eligible_percentage - 100.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn empty_collection_yields_zeros() {
        let summary = summarize(&[], &AnalyticsOptions::default());
        assert_eq!(summary.total_students, 0);
        assert_eq!(summary.placement_eligible_percentage, 0.0);
        assert_eq!(summary.average_aggregate, 0.0);
        assert!(summary.top_performers.is_empty());
        assert!(summary.batch_comparison.is_empty());
        assert_eq!(summary.performance_distribution.len(), 10);
        assert!(summary
            .performance_distribution
            .iter()
            .all(|b| b.count == 0 && b.percentage == 0.0));
    }

    #[test]
    fn distribution_edges_land_in_expected_buckets() {
        let students = vec![
            sample_student("A", "7th-sem", Some(0.0)),
            sample_student("B", "7th-sem", Some(9.99)),
            sample_student("C", "7th-sem", Some(10.0)),
            sample_student("D", "7th-sem", Some(100.0)),
            sample_student("E", "7th-sem", Some(104.0)),
            sample_student("F", "7th-sem", Some(f64::NAN)),
        ];
        let buckets = bucket_distribution(&students, 10);

        assert_eq!(buckets[0].range, "0-10");
        assert_eq!(buckets[0].count, 2);
        assert_eq!(buckets[1].count, 1);
        assert_eq!(buckets[9].range, "90-100");
        assert_eq!(buckets[9].count, 2);
        assert!((buckets[0].percentage - 40.0).abs() < 1e-9);
    }

    #[test]
    fn infinite_aggregates_count_as_ungraded() {
        let students = vec![
            sample_student("A", "7th-sem", Some(-5.0)),
            sample_student("B", "7th-sem", Some(f64::INFINITY)),
            sample_student("C", "7th-sem", Some(f64::NEG_INFINITY)),
            sample_student("D", "7th-sem", Some(81.0)),
        ];

        let summary = summarize(&students, &AnalyticsOptions::default());
        assert_eq!(summary.ungraded_count, 2);
        assert!((summary.average_aggregate - 38.0).abs() < 1e-9);
        assert_eq!(
            summary
                .performance_distribution
                .iter()
                .map(|b| b.count)
                .sum::<usize>(),
            2
        );
        assert_eq!(summary.performance_distribution[0].count, 1);

        let usns: Vec<&str> = summary.top_performers.iter().map(|t| t.usn.as_str()).collect();
        assert_eq!(usns, vec!["D", "A"]);
        assert!(summary.batch_comparison[0].average_aggregate.is_finite());
    }

    #[test]
    fn uneven_width_shortens_last_bucket() {
        let buckets = bucket_distribution(&[], 30);
        let ranges: Vec<&str> = buckets.iter().map(|b| b.range.as_str()).collect();
        assert_eq!(ranges, vec!["0-30", "30-60", "60-90", "90-100"]);
        assert_eq!(bucket_distribution(&[], 0).len(), 100);
    }

    #[test]
    fn ties_break_on_usn() {
        let students = vec![
            sample_student("Z9", "7th-sem", Some(88.0)),
            sample_student("A1", "7th-sem", Some(88.0)),
            sample_student("M5", "7th-sem", Some(91.0)),
        ];
        let usns: Vec<String> = rank_top_performers(&students, 2)
            .into_iter()
            .map(|t| t.usn)
            .collect();
        assert_eq!(usns, vec!["M5", "A1"]);
    }

    #[test]
    fn batches_follow_semester_order() {
        let students = vec![
            sample_student("A", "7th-sem", Some(90.0)),
            sample_student("B", "alumni", Some(72.0)),
            sample_student("C", "5th-sem", Some(86.0)),
            sample_student("D", "5th-sem", Some(60.0)),
        ];
        let comparison = compare_batches(&students, 85.0);
        let batches: Vec<&str> = comparison.iter().map(|c| c.batch.as_str()).collect();
        assert_eq!(batches, vec!["5th-sem", "7th-sem", "alumni"]);

        let fifth = &comparison[0];
        assert_eq!(fifth.total_students, 2);
        assert_eq!(fifth.placement_eligible, 1);
        assert_eq!(fifth.top_performers, 1);
        assert!((fifth.average_aggregate - 73.0).abs() < 1e-9);
    }

    #[test]
    fn single_student_average_is_own_percentage() {
        let students = vec![sample_student("A", "5th-sem", Some(77.25))];
        assert_eq!(average_aggregate(&students), 77.25);
    }

    fn arb_students() -> impl Strategy<Value = Vec<Student>> {
        proptest::collection::vec(
            (
                proptest::option::of(0.0f64..=100.0),
                0u32..3,
                prop_oneof![Just("5th-sem"), Just("7th-sem")],
            ),
            0..40,
        )
        .prop_map(|rows| {
            rows.into_iter()
                .enumerate()
                .map(|(index, (aggregate, backlogs, batch))| {
                    let mut student = sample_student(&format!("U{index:03}"), batch, aggregate);
                    student.active_backlogs = backlogs;
                    student.placement_eligible =
                        crate::grading::is_placement_eligible(aggregate, backlogs, 70.0);
                    student
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn distribution_counts_cover_graded_students(
            students in arb_students(),
            width in 1u32..=100,
        ) {
            let graded = students.iter().filter(|s| s.aggregate_percentage.is_some()).count();
            let buckets = bucket_distribution(&students, width);
            prop_assert_eq!(buckets.iter().map(|b| b.count).sum::<usize>(), graded);
        }

        #[test]
        fn eligible_percentage_stays_in_range(students in arb_students()) {
            let summary = summarize(&students, &AnalyticsOptions::default());
            prop_assert!((0.0..=100.0).contains(&summary.placement_eligible_percentage));
            if summary.total_students > 0 {
                let expected = 100.0 * summary.placement_eligible_count as f64
                    / summary.total_students as f64;
                prop_assert!((summary.placement_eligible_percentage - expected).abs() < 1e-9);
            }
        }

        #[test]
        fn top_performers_never_increase(students in arb_students(), limit in 0usize..20) {
            let ranked = rank_top_performers(&students, limit);
            prop_assert!(ranked.len() <= limit);
            for pair in ranked.windows(2) {
                prop_assert!(pair[0].aggregate_percentage >= pair[1].aggregate_percentage);
            }
        }

        #[test]
        fn batch_totals_partition_the_collection(students in arb_students()) {
            let comparison = compare_batches(&students, 85.0);
            let total: usize = comparison.iter().map(|c| c.total_students).sum();
            prop_assert_eq!(total, students.len());
        }
    }
}
