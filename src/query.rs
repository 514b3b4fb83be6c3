use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::analytics;
use crate::error::RecordsError;
use crate::models::Student;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    #[default]
    Usn,
    Name,
    AggregatePercentage,
    ActiveBacklogs,
}

impl FromStr for SortBy {
    type Err = RecordsError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "usn" => Ok(SortBy::Usn),
            "name" => Ok(SortBy::Name),
            "aggregate" | "aggregate_percentage" => Ok(SortBy::AggregatePercentage),
            "backlogs" | "active_backlogs" => Ok(SortBy::ActiveBacklogs),
            other => Err(RecordsError::InvalidFilter(format!("unknown sort key '{other}'"))),
        }
    }
}

impl fmt::Display for SortBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let key = match self {
            SortBy::Usn => "usn",
            SortBy::Name => "name",
            SortBy::AggregatePercentage => "aggregate_percentage",
            SortBy::ActiveBacklogs => "active_backlogs",
        };
        f.write_str(key)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl FromStr for SortOrder {
    type Err = RecordsError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(RecordsError::InvalidFilter(format!("unknown sort order '{other}'"))),
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StudentFilters {
    pub search: Option<String>,
    pub batch: Option<String>,
    pub placement_eligible: Option<bool>,
    pub sort_by: SortBy,
    pub sort_order: SortOrder,
}

impl StudentFilters {
    /// Filters that only scope to a batch, as used for analytics.
    pub fn for_batch(batch: Option<&str>) -> Self {
        Self {
            batch: batch.map(str::to_string),
            ..Default::default()
        }
    }

    /// Batch to scope the database query to; "all" and blank mean every batch.
    pub fn batch_scope(&self) -> Option<&str> {
        self.batch
            .as_deref()
            .map(str::trim)
            .filter(|batch| !batch.is_empty() && !batch.eq_ignore_ascii_case("all"))
    }

    fn search_term(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|term| !term.is_empty())
            .map(str::to_lowercase)
    }

    pub fn matches(&self, student: &Student) -> bool {
        if let Some(batch) = self.batch_scope() {
            if student.batch != batch {
                return false;
            }
        }

        if let Some(eligible) = self.placement_eligible {
            if student.placement_eligible != eligible {
                return false;
            }
        }

        match self.search_term() {
            Some(term) => {
                student.name.to_lowercase().contains(&term)
                    || student.usn.to_lowercase().contains(&term)
            }
            None => true,
        }
    }

    pub fn compare(&self, a: &Student, b: &Student) -> Ordering {
        let ordering = match self.sort_by {
            SortBy::Usn => a.usn.cmp(&b.usn),
            SortBy::Name => a.name.cmp(&b.name).then_with(|| a.usn.cmp(&b.usn)),
            SortBy::ActiveBacklogs => a
                .active_backlogs
                .cmp(&b.active_backlogs)
                .then_with(|| a.usn.cmp(&b.usn)),
            SortBy::AggregatePercentage => {
                return compare_aggregate(a, b, self.sort_order);
            }
        };

        match self.sort_order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    }

    pub fn apply(&self, students: Vec<Student>) -> Vec<Student> {
        let mut selected: Vec<Student> = students.into_iter().filter(|s| self.matches(s)).collect();
        selected.sort_by(|a, b| self.compare(a, b));
        selected
    }
}

/// Ungraded students sort last in either direction; ties fall back to USN ascending.
fn compare_aggregate(a: &Student, b: &Student, order: SortOrder) -> Ordering {
    match (a.graded_aggregate(), b.graded_aggregate()) {
        (Some(_), Some(_)) if order == SortOrder::Desc => analytics::compare_by_aggregate_desc(a, b),
        (Some(x), Some(y)) => x
            .partial_cmp(&y)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.usn.cmp(&b.usn)),
        _ => analytics::compare_by_aggregate_desc(a, b),
    }
}
