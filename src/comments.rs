use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{JournalError, Result};
use crate::parity::{Parity, WeekResolver};
use crate::schedule::WeekType;

/// A note pinned to a group's timetable.
///
/// Where it shows up depends on which fields are set: a calendar date wins,
/// then a weekday (optionally limited to one week type), then a week type on
/// its own. A comment with none of them is general and shows every day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleComment {
    pub id: i64,
    pub group_name: String,
    pub comment: String,
    pub week_type: Option<WeekType>,
    /// 1 = Monday .. 7 = Sunday.
    pub day: Option<u32>,
    pub lesson_id: Option<i64>,
    pub date: Option<NaiveDate>,
    pub is_urgent: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewScheduleComment {
    pub group_name: String,
    pub comment: String,
    pub week_type: Option<WeekType>,
    pub day: Option<u32>,
    pub lesson_id: Option<i64>,
    pub date: Option<NaiveDate>,
    pub is_urgent: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentScope {
    Date(NaiveDate),
    Weekday {
        day: u32,
        week_type: Option<WeekType>,
    },
    Week(WeekType),
    General,
}

impl CommentScope {
    /// Date and weekday scopes mark a specific calendar day.
    pub fn is_day_specific(self) -> bool {
        matches!(self, CommentScope::Date(_) | CommentScope::Weekday { .. })
    }
}

impl ScheduleComment {
    pub fn scope(&self) -> CommentScope {
        match (self.date, self.day, self.week_type) {
            (Some(date), _, _) => CommentScope::Date(date),
            (None, Some(day), week_type) => CommentScope::Weekday { day, week_type },
            (None, None, Some(week_type)) => CommentScope::Week(week_type),
            (None, None, None) => CommentScope::General,
        }
    }

    pub fn applies_on(&self, date: NaiveDate, parity: Parity) -> bool {
        if !self.is_active {
            return false;
        }
        match self.scope() {
            CommentScope::Date(pinned) => pinned == date,
            CommentScope::Weekday { day, week_type } => {
                day == date.weekday().number_from_monday()
                    && week_type.map_or(true, |w| w.runs_in(parity))
            }
            CommentScope::Week(week_type) => week_type.runs_in(parity),
            CommentScope::General => true,
        }
    }
}

/// Checks the fields of a comment before it is stored.
pub fn validate_comment(new: &NewScheduleComment) -> Result<()> {
    if new.comment.trim().is_empty() {
        return Err(JournalError::Invalid("comment text must not be empty".into()));
    }
    if new.group_name.trim().is_empty() {
        return Err(JournalError::Invalid("comment needs a group".into()));
    }
    if let Some(day) = new.day {
        if !(1..=7).contains(&day) {
            return Err(JournalError::Invalid(format!(
                "day must be between 1 and 7, got {day}"
            )));
        }
    }
    Ok(())
}

/// Active comments shown on `date`: urgent ones first, newest first within
/// each group.
pub fn comments_for_date<'a>(
    comments: &'a [ScheduleComment],
    date: NaiveDate,
    resolver: &WeekResolver,
) -> Vec<&'a ScheduleComment> {
    let parity = resolver.resolve(date);
    let mut shown: Vec<&ScheduleComment> = comments
        .iter()
        .filter(|comment| comment.applies_on(date, parity))
        .collect();
    sort_for_display(&mut shown);
    shown
}

pub fn sort_for_display(comments: &mut [&ScheduleComment]) {
    comments.sort_by(|a, b| {
        b.is_urgent
            .cmp(&a.is_urgent)
            .then_with(|| b.created_at.cmp(&a.created_at))
    });
}
