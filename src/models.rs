use serde::Serialize;

use crate::attendance::AbsenceSummary;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Student {
    pub id: i64,
    pub full_name: String,
    pub group_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Subject {
    pub id: i64,
    pub name: String,
    pub group_name: String,
    pub teacher: String,
}

/// One cached aggregate joined with the names it refers to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceRow {
    pub student_id: i64,
    pub student_name: String,
    pub subject_id: i64,
    pub subject_name: String,
    pub total_points: f64,
    pub target_points: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentStanding {
    pub student_id: i64,
    pub student_name: String,
    pub subject_count: usize,
    pub avg_progress: f64,
    pub at_risk: bool,
    pub ready: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentAbsences {
    pub student_name: String,
    pub summary: AbsenceSummary,
}
