use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{JournalError, Result};
use crate::parity::{Parity, WeekResolver};

/// Which weeks a lesson runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeekType {
    Even,
    Odd,
    Both,
}

impl WeekType {
    pub fn as_str(self) -> &'static str {
        match self {
            WeekType::Even => "even",
            WeekType::Odd => "odd",
            WeekType::Both => "both",
        }
    }

    pub fn runs_in(self, parity: Parity) -> bool {
        match self {
            WeekType::Both => true,
            WeekType::Even => parity == Parity::Even,
            WeekType::Odd => parity == Parity::Odd,
        }
    }
}

impl fmt::Display for WeekType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WeekType {
    type Err = JournalError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "even" => Ok(WeekType::Even),
            "odd" => Ok(WeekType::Odd),
            "both" => Ok(WeekType::Both),
            other => Err(JournalError::Invalid(format!("unknown week type '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lesson {
    pub id: i64,
    pub group_name: String,
    /// 1 = Monday .. 7 = Sunday.
    pub day: u32,
    pub week_type: WeekType,
    pub pair_number: i32,
    pub start_time: String,
    pub end_time: String,
    pub subject: String,
    pub teacher: String,
    pub room: String,
    pub lesson_type: String,
}

/// Lessons held on `date`, ordered by pair number.
pub fn lessons_for_date<'a>(
    lessons: &'a [Lesson],
    date: NaiveDate,
    resolver: &WeekResolver,
) -> Vec<&'a Lesson> {
    let parity = resolver.resolve(date);
    let weekday = date.weekday().number_from_monday();

    let mut today: Vec<&Lesson> = lessons
        .iter()
        .filter(|lesson| lesson.day == weekday && lesson.week_type.runs_in(parity))
        .collect();
    today.sort_by_key(|lesson| lesson.pair_number);
    today
}

/// Speaking slots per seminar.
pub const SEMINAR_SLOTS: i32 = 2;

pub fn validate_slot_number(slot_number: i32) -> Result<i32> {
    if (1..=SEMINAR_SLOTS).contains(&slot_number) {
        Ok(slot_number)
    } else {
        Err(JournalError::Invalid(format!(
            "slot number must be between 1 and {SEMINAR_SLOTS}, got {slot_number}"
        )))
    }
}

/// A speaking slot of a seminar, with the assigned student's current total
/// in the seminar's subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeminarSlot {
    pub lesson_id: i64,
    pub slot_number: i32,
    pub student_id: Option<i64>,
    pub student_name: Option<String>,
    pub student_points: f64,
}

impl SeminarSlot {
    fn vacant(lesson_id: i64, slot_number: i32) -> Self {
        Self {
            lesson_id,
            slot_number,
            student_id: None,
            student_name: None,
            student_points: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Seminar<'a> {
    pub lesson: &'a Lesson,
    pub slots: Vec<SeminarSlot>,
}

pub fn is_seminar(lesson_type: &str) -> bool {
    lesson_type.trim().eq_ignore_ascii_case("seminar")
}

/// Seminars held in a week of the given parity, ordered by day and pair.
/// Every seminar lists all of its slots; unassigned ones are vacant.
pub fn seminars_for_week<'a>(
    lessons: &'a [Lesson],
    slots: &[SeminarSlot],
    parity: Parity,
) -> Vec<Seminar<'a>> {
    let mut seminars: Vec<&Lesson> = lessons
        .iter()
        .filter(|lesson| is_seminar(&lesson.lesson_type) && lesson.week_type.runs_in(parity))
        .collect();
    seminars.sort_by_key(|lesson| (lesson.day, lesson.pair_number));

    seminars
        .into_iter()
        .map(|lesson| Seminar {
            lesson,
            slots: (1..=SEMINAR_SLOTS)
                .map(|number| {
                    slots
                        .iter()
                        .find(|slot| slot.lesson_id == lesson.id && slot.slot_number == number)
                        .cloned()
                        .unwrap_or_else(|| SeminarSlot::vacant(lesson.id, number))
                })
                .collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lesson(day: u32, week_type: WeekType, pair_number: i32, subject: &str) -> Lesson {
        Lesson {
            id: pair_number as i64,
            group_name: "IS-21".to_string(),
            day,
            week_type,
            pair_number,
            start_time: "9:40".to_string(),
            end_time: "11:10".to_string(),
            subject: subject.to_string(),
            teacher: String::new(),
            room: String::new(),
            lesson_type: "lecture".to_string(),
        }
    }

    #[test]
    fn filters_by_weekday_and_parity() {
        let lessons = vec![
            lesson(1, WeekType::Odd, 3, "Databases"),
            lesson(1, WeekType::Both, 2, "Algebra"),
            lesson(1, WeekType::Even, 1, "History"),
            lesson(2, WeekType::Both, 1, "Physics"),
        ];
        let resolver = WeekResolver::default();

        // 2026-01-05 is an even Monday
        let monday = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();
        let subjects: Vec<&str> = lessons_for_date(&lessons, monday, &resolver)
            .iter()
            .map(|l| l.subject.as_str())
            .collect();
        assert_eq!(subjects, vec!["History", "Algebra"]);

        let next_monday = NaiveDate::from_ymd_opt(2026, 1, 12).unwrap();
        let subjects: Vec<&str> = lessons_for_date(&lessons, next_monday, &resolver)
            .iter()
            .map(|l| l.subject.as_str())
            .collect();
        assert_eq!(subjects, vec!["Algebra", "Databases"]);
    }

    fn seminar(id: i64, day: u32, week_type: WeekType, pair_number: i32) -> Lesson {
        Lesson {
            id,
            lesson_type: "seminar".to_string(),
            ..lesson(day, week_type, pair_number, "Algorithms")
        }
    }

    #[test]
    fn seminars_follow_week_parity_with_two_slots() {
        let lessons = vec![
            seminar(10, 3, WeekType::Odd, 2),
            seminar(11, 1, WeekType::Even, 2),
            seminar(12, 1, WeekType::Both, 1),
            lesson(1, WeekType::Even, 3, "Databases"),
        ];
        let slots = vec![
            SeminarSlot {
                lesson_id: 11,
                slot_number: 2,
                student_id: Some(7),
                student_name: Some("Avery Lee".to_string()),
                student_points: 12.0,
            },
            SeminarSlot {
                lesson_id: 10,
                slot_number: 1,
                student_id: Some(8),
                student_name: Some("Jules Moreno".to_string()),
                student_points: 3.0,
            },
        ];

        let even = seminars_for_week(&lessons, &slots, Parity::Even);
        let ids: Vec<i64> = even.iter().map(|s| s.lesson.id).collect();
        assert_eq!(ids, vec![12, 11]);
        assert!(even.iter().all(|s| s.slots.len() == 2));
        assert_eq!(even[0].slots[0], SeminarSlot::vacant(12, 1));
        assert_eq!(even[1].slots[0].student_id, None);
        assert_eq!(even[1].slots[1].student_name.as_deref(), Some("Avery Lee"));
        assert_eq!(even[1].slots[1].student_points, 12.0);

        let odd = seminars_for_week(&lessons, &slots, Parity::Odd);
        let ids: Vec<i64> = odd.iter().map(|s| s.lesson.id).collect();
        assert_eq!(ids, vec![12, 10]);
        assert_eq!(odd[1].slots[0].student_id, Some(8));
    }

    #[test]
    fn slot_numbers_are_bounded() {
        assert_eq!(validate_slot_number(1).unwrap(), 1);
        assert_eq!(validate_slot_number(2).unwrap(), 2);
        assert!(validate_slot_number(0).is_err());
        assert!(validate_slot_number(3).is_err());
    }

    #[test]
    fn week_type_parsing() {
        assert_eq!("Both".parse::<WeekType>().unwrap(), WeekType::Both);
        assert!("weekly".parse::<WeekType>().is_err());
        assert!(WeekType::Both.runs_in(Parity::Odd));
        assert!(!WeekType::Even.runs_in(Parity::Odd));
    }
}
