use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::JournalError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    Even,
    Odd,
}

impl Parity {
    pub fn as_str(self) -> &'static str {
        match self {
            Parity::Even => "even",
            Parity::Odd => "odd",
        }
    }

    pub fn opposite(self) -> Parity {
        match self {
            Parity::Even => Parity::Odd,
            Parity::Odd => Parity::Even,
        }
    }
}

impl fmt::Display for Parity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Parity {
    type Err = JournalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "even" => Ok(Parity::Even),
            "odd" => Ok(Parity::Odd),
            other => Err(JournalError::Invalid(format!(
                "week parity must be 'even' or 'odd', got '{other}'"
            ))),
        }
    }
}

/// A known (date, parity) reference point of the academic calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleAnchor {
    pub date: NaiveDate,
    pub parity: Parity,
}

impl ScheduleAnchor {
    pub fn new(date: NaiveDate, parity: Parity) -> Self {
        Self { date, parity }
    }
}

/// Operator-supplied exception to the computed parity of a date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekOverride {
    pub date: NaiveDate,
    pub parity: Parity,
}

/// Reference date used when a date precedes every anchor.
pub fn default_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 1, 1).expect("2026-01-01 is a valid date")
}

/// Spring 2026 term: every Monday from 2026-01-05 (even) to 2026-06-29 (odd).
pub fn default_anchors() -> Vec<ScheduleAnchor> {
    let first = NaiveDate::from_ymd_opt(2026, 1, 5).expect("2026-01-05 is a valid date");
    let mut parity = Parity::Even;
    (0..26)
        .map(|week| {
            let anchor = ScheduleAnchor::new(first + chrono::Duration::weeks(week), parity);
            parity = parity.opposite();
            anchor
        })
        .collect()
}

/// Resolves the week parity of calendar dates.
///
/// Lookup order: the override table, then the latest anchor on or before the
/// date, then the fixed epoch. The epoch branch maps an even week offset to
/// `Odd`, the inverse of the anchor branch; callers already depend on it.
#[derive(Debug, Clone)]
pub struct WeekResolver {
    anchors: Vec<ScheduleAnchor>,
    overrides: BTreeMap<NaiveDate, Parity>,
    epoch: NaiveDate,
}

impl Default for WeekResolver {
    fn default() -> Self {
        Self::new(default_anchors(), default_epoch())
    }
}

impl WeekResolver {
    pub fn new(mut anchors: Vec<ScheduleAnchor>, epoch: NaiveDate) -> Self {
        anchors.sort_by_key(|anchor| anchor.date);
        anchors.dedup_by_key(|anchor| anchor.date);
        Self {
            anchors,
            overrides: BTreeMap::new(),
            epoch,
        }
    }

    pub fn with_overrides<I>(mut self, overrides: I) -> Self
    where
        I: IntoIterator<Item = WeekOverride>,
    {
        self.overrides = overrides
            .into_iter()
            .map(|entry| (entry.date, entry.parity))
            .collect();
        self
    }

    pub fn anchors(&self) -> &[ScheduleAnchor] {
        &self.anchors
    }

    pub fn override_for(&self, date: NaiveDate) -> Option<Parity> {
        self.overrides.get(&date).copied()
    }

    pub fn resolve(&self, date: NaiveDate) -> Parity {
        if let Some(parity) = self.override_for(date) {
            return parity;
        }

        // anchors are sorted ascending, so this is the count of anchors <= date
        let idx = self.anchors.partition_point(|anchor| anchor.date <= date);
        if idx > 0 {
            let anchor = self.anchors[idx - 1];
            let weeks = weeks_between(anchor.date, date);
            return if weeks.rem_euclid(2) == 0 {
                anchor.parity
            } else {
                anchor.parity.opposite()
            };
        }

        if weeks_between(self.epoch, date).rem_euclid(2) == 0 {
            Parity::Odd
        } else {
            Parity::Even
        }
    }

    pub fn resolve_today(&self) -> Parity {
        self.resolve(Local::now().date_naive())
    }
}

fn weeks_between(from: NaiveDate, to: NaiveDate) -> i64 {
    (to - from).num_days().div_euclid(7)
}
