use std::collections::HashMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const DEFAULT_TARGET_POINTS: f64 = 21.0;

/// Share of the target at which a student moves from `danger` to `warning`.
pub const WARNING_PROGRESS_PCT: f64 = 70.0;

/// Points a kind earns when it has no entry in the table.
pub const UNKNOWN_KIND_POINTS: f64 = 1.0;

/// Fixed weights per grade kind.
#[derive(Debug, Clone, PartialEq)]
pub struct PointTable {
    weights: HashMap<String, f64>,
}

impl Default for PointTable {
    fn default() -> Self {
        Self::from_pairs([
            ("performance", 1.0),
            ("supplement", 1.0),
            ("question", 1.0),
            ("plus", 1.0),
            ("minus", 0.0),
            ("numeric_2", 2.0),
            ("numeric_3", 3.0),
            ("numeric_4", 4.0),
            ("numeric_5", 5.0),
        ])
    }
}

impl PointTable {
    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        Self {
            weights: pairs.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// Unrecognised kinds count as one point so every recorded grade
    /// contributes unless it is explicitly zero-weighted.
    pub fn points_for(&self, kind: &str) -> f64 {
        self.weights.get(kind).copied().unwrap_or(UNKNOWN_KIND_POINTS)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.weights.keys().map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeEvent {
    pub id: i64,
    pub student_id: i64,
    pub subject_id: i64,
    pub kind: String,
    pub raw_value: String,
    pub points: f64,
    pub occurred_on: NaiveDate,
    pub comment: String,
}

/// A grade event that has not been stored yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewGradeEvent {
    pub student_id: i64,
    pub subject_id: i64,
    pub kind: String,
    pub raw_value: String,
    pub points: f64,
    pub occurred_on: NaiveDate,
    pub comment: String,
    pub source_key: Option<String>,
}

/// Cached per-(student, subject) sum over grade events.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerformanceAggregate {
    pub student_id: i64,
    pub subject_id: i64,
    pub total_points: f64,
    pub target_points: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Warning,
    Danger,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Success => "success",
            Status::Warning => "warning",
            Status::Danger => "danger",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub total: f64,
    pub target: f64,
    pub remaining: f64,
    pub progress_pct: f64,
    pub status: Status,
}

impl Snapshot {
    pub fn compute(total: f64, target: f64) -> Self {
        let remaining = (target - total).max(0.0);
        let progress_pct = progress_pct(total, target);
        let status = if total >= target {
            Status::Success
        } else if progress_pct >= WARNING_PROGRESS_PCT {
            Status::Warning
        } else {
            Status::Danger
        };

        Snapshot {
            total,
            target,
            remaining,
            progress_pct,
            status,
        }
    }
}

impl From<&PerformanceAggregate> for Snapshot {
    fn from(aggregate: &PerformanceAggregate) -> Self {
        Snapshot::compute(aggregate.total_points, aggregate.target_points)
    }
}

pub fn progress_pct(total: f64, target: f64) -> f64 {
    if target > 0.0 {
        (total / target * 100.0).clamp(0.0, 100.0)
    } else {
        0.0
    }
}

pub fn total_points<'a, I>(events: I) -> f64
where
    I: IntoIterator<Item = &'a GradeEvent>,
{
    events.into_iter().map(|event| event.points).sum()
}
