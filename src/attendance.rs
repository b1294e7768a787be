use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{JournalError, Result};

pub const DEFAULT_ABSENCE_LIMIT_HOURS: i32 = 20;
pub const MAX_ABSENCE_HOURS: i32 = 8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Absence {
    pub id: i64,
    pub student_id: i64,
    pub occurred_on: NaiveDate,
    pub hours: i32,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbsenceSummary {
    pub total_hours: i32,
    pub remaining_hours: i32,
}

pub fn validate_hours(hours: i32) -> Result<i32> {
    if (1..=MAX_ABSENCE_HOURS).contains(&hours) {
        Ok(hours)
    } else {
        Err(JournalError::Invalid(format!(
            "absence must be 1..={MAX_ABSENCE_HOURS} hours, got {hours}"
        )))
    }
}

/// Always summed from the full absence list, never adjusted in place.
pub fn summarize(absences: &[Absence], limit_hours: i32) -> AbsenceSummary {
    let total_hours = absences.iter().map(|a| a.hours).sum();
    AbsenceSummary {
        total_hours,
        remaining_hours: (limit_hours - total_hours).max(0),
    }
}
