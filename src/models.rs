use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PlacementStatus {
    Placed,
    #[default]
    NotPlaced,
    Other(String),
}

impl PlacementStatus {
    pub fn as_str(&self) -> &str {
        match self {
            PlacementStatus::Placed => "Placed",
            PlacementStatus::NotPlaced => "Not Placed",
            PlacementStatus::Other(value) => value,
        }
    }
}

impl From<String> for PlacementStatus {
    fn from(value: String) -> Self {
        match value.trim() {
            "Placed" => PlacementStatus::Placed,
            "" | "Not Placed" => PlacementStatus::NotPlaced,
            other => PlacementStatus::Other(other.to_string()),
        }
    }
}

impl From<PlacementStatus> for String {
    fn from(value: PlacementStatus) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for PlacementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub id: Uuid,
    pub usn: String,
    pub name: String,
    pub batch: String,
    pub tenth_percentage: Option<f64>,
    pub puc_percentage: Option<f64>,
    pub sem1_percentage: Option<f64>,
    pub sem2_percentage: Option<f64>,
    pub sem3_percentage: Option<f64>,
    pub sem4_percentage: Option<f64>,
    pub sem5_percentage: Option<f64>,
    pub sem6_percentage: Option<f64>,
    pub aggregate_percentage: Option<f64>,
    pub active_backlogs: u32,
    pub placement_status: PlacementStatus,
    pub placement_eligible: bool,
    pub updated_at: DateTime<Utc>,
}

impl Student {
    pub fn semesters(&self) -> [Option<f64>; 6] {
        [
            self.sem1_percentage,
            self.sem2_percentage,
            self.sem3_percentage,
            self.sem4_percentage,
            self.sem5_percentage,
            self.sem6_percentage,
        ]
    }

    /// Aggregate percentage, with NaN and infinities treated as missing.
    pub fn graded_aggregate(&self) -> Option<f64> {
        self.aggregate_percentage.filter(|value| value.is_finite())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentList {
    pub students: Vec<Student>,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistributionBucket {
    pub range: String,
    pub count: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchComparison {
    pub batch: String,
    pub total_students: usize,
    pub placement_eligible: usize,
    pub average_aggregate: f64,
    pub top_performers: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopPerformer {
    pub name: String,
    pub usn: String,
    pub aggregate_percentage: f64,
    pub batch: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsSummary {
    pub total_students: usize,
    pub placement_eligible_count: usize,
    pub placement_eligible_percentage: f64,
    pub average_aggregate: f64,
    pub ungraded_count: usize,
    pub performance_distribution: Vec<DistributionBucket>,
    pub batch_comparison: Vec<BatchComparison>,
    pub top_performers: Vec<TopPerformer>,
}
