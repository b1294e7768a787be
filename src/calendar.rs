use chrono::{Datelike, Month, NaiveDate};
use serde::Serialize;

use crate::comments::ScheduleComment;
use crate::error::{JournalError, Result};
use crate::parity::{Parity, WeekResolver};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalendarDay {
    pub day: u32,
    pub date: NaiveDate,
    pub parity: Parity,
    pub is_today: bool,
    /// Comments pinned to this date or to its weekday.
    pub comment_count: usize,
    pub has_urgent: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthView {
    pub year: i32,
    pub month: u32,
    pub month_name: &'static str,
    /// Weekday of the 1st, 1 = Monday .. 7 = Sunday.
    pub first_weekday: u32,
    pub days: Vec<CalendarDay>,
}

pub fn month_view(
    year: i32,
    month: u32,
    resolver: &WeekResolver,
    comments: &[ScheduleComment],
    today: NaiveDate,
) -> Result<MonthView> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| JournalError::Invalid(format!("no such month: {year}-{month:02}")))?;
    let month_name = Month::try_from(month as u8)
        .map(|m| m.name())
        .map_err(|_| JournalError::Invalid(format!("no such month: {month}")))?;

    let days = first
        .iter_days()
        .take_while(|date| date.month() == month)
        .map(|date| {
            let parity = resolver.resolve(date);
            let pinned: Vec<&ScheduleComment> = comments
                .iter()
                .filter(|c| c.scope().is_day_specific() && c.applies_on(date, parity))
                .collect();
            CalendarDay {
                day: date.day(),
                date,
                parity,
                is_today: date == today,
                comment_count: pinned.len(),
                has_urgent: pinned.iter().any(|c| c.is_urgent),
            }
        })
        .collect();

    Ok(MonthView {
        year,
        month,
        month_name,
        first_weekday: first.weekday().number_from_monday(),
        days,
    })
}

/// Parses `YYYY-MM`.
pub fn parse_month(input: &str) -> Result<(i32, u32)> {
    let date = NaiveDate::parse_from_str(&format!("{}-01", input.trim()), "%Y-%m-%d")
        .map_err(|_| JournalError::Invalid(format!("expected YYYY-MM, got '{input}'")))?;
    Ok((date.year(), date.month()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn february_view_has_parity_per_day() {
        let resolver = WeekResolver::default();
        let today = NaiveDate::from_ymd_opt(2026, 2, 10).unwrap();
        let view = month_view(2026, 2, &resolver, &[], today).unwrap();

        assert_eq!(view.month_name, "February");
        assert_eq!(view.days.len(), 28);
        // 2026-02-01 is a Sunday
        assert_eq!(view.first_weekday, 7);
        assert_eq!(view.days[1].parity, Parity::Even);
        assert_eq!(view.days[8].parity, Parity::Odd);
        assert_eq!(view.days.iter().filter(|d| d.is_today).count(), 1);
        assert!(view.days[9].is_today);
    }

    #[test]
    fn days_count_pinned_comments() {
        use crate::comments::ScheduleComment;
        use crate::schedule::WeekType;
        use chrono::{TimeZone, Utc};

        let base = ScheduleComment {
            id: 1,
            group_name: "IS-21".to_string(),
            comment: "quiz".to_string(),
            week_type: None,
            day: None,
            lesson_id: None,
            date: Some(NaiveDate::from_ymd_opt(2026, 2, 3).unwrap()),
            is_urgent: true,
            is_active: true,
            created_at: Utc.with_ymd_and_hms(2026, 1, 20, 9, 0, 0).unwrap(),
        };
        // odd Mondays only
        let odd_mondays = ScheduleComment {
            id: 2,
            date: None,
            day: Some(1),
            week_type: Some(WeekType::Odd),
            is_urgent: false,
            ..base.clone()
        };
        let general = ScheduleComment {
            id: 3,
            date: None,
            ..base.clone()
        };

        let resolver = WeekResolver::default();
        let today = NaiveDate::from_ymd_opt(2026, 2, 10).unwrap();
        let view = month_view(2026, 2, &resolver, &[base, odd_mondays, general], today).unwrap();

        // 2026-02-03 carries the pinned urgent comment
        assert_eq!(view.days[2].comment_count, 1);
        assert!(view.days[2].has_urgent);
        // 2026-02-02 is an even Monday, 2026-02-09 an odd one
        assert_eq!(view.days[1].comment_count, 0);
        assert_eq!(view.days[8].comment_count, 1);
        assert!(!view.days[8].has_urgent);
        assert_eq!(view.days.iter().map(|d| d.comment_count).sum::<usize>(), 3);
    }

    #[test]
    fn invalid_month_is_rejected() {
        let resolver = WeekResolver::default();
        let today = NaiveDate::from_ymd_opt(2026, 2, 10).unwrap();
        assert!(month_view(2026, 13, &resolver, &[], today).is_err());
    }

    #[test]
    fn parses_year_month() {
        assert_eq!(parse_month("2026-03").unwrap(), (2026, 3));
        assert!(parse_month("March").is_err());
    }
}
