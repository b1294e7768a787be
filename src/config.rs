//! Runtime configuration shared by every subcommand.
//!
//! Values come from flags, then environment variables (a `.env` file is
//! loaded first by `main`), then defaults. Every flag is global, so it may be
//! given before or after the subcommand.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use clap::Args;
use serde::Deserialize;

use crate::attendance::DEFAULT_ABSENCE_LIMIT_HOURS;
use crate::error::{JournalError, Result};
use crate::parity::{default_anchors, Parity, ScheduleAnchor};
use crate::performance::DEFAULT_TARGET_POINTS;

#[derive(Args, Debug, Clone)]
pub struct Config {
    /// Postgres connection string
    #[arg(long, global = true, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: Option<String>,

    /// Maximum pooled connections
    #[arg(long, global = true, env = "MAX_CONNECTIONS", default_value_t = 5)]
    pub max_connections: u32,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Points a student needs per subject
    #[arg(long, global = true, env = "TARGET_POINTS", default_value_t = DEFAULT_TARGET_POINTS)]
    pub target_points: f64,

    /// Absence hours allowed per student
    #[arg(long, global = true, env = "ABSENCE_LIMIT_HOURS", default_value_t = DEFAULT_ABSENCE_LIMIT_HOURS)]
    pub absence_limit_hours: i32,

    /// CSV of `date,parity` rows replacing the built-in term anchors
    #[arg(long, global = true, env = "ANCHORS_CSV")]
    pub anchors_csv: Option<PathBuf>,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.target_points.is_nan() || self.target_points <= 0.0 {
            return Err(JournalError::Invalid(format!(
                "TARGET_POINTS must be positive, got {}",
                self.target_points
            )));
        }
        if self.absence_limit_hours < 0 {
            return Err(JournalError::Invalid(format!(
                "ABSENCE_LIMIT_HOURS must not be negative, got {}",
                self.absence_limit_hours
            )));
        }
        if self.max_connections == 0 {
            return Err(JournalError::Invalid("MAX_CONNECTIONS must be at least 1".into()));
        }
        Ok(())
    }

    pub fn database_url(&self) -> Result<&str> {
        self.database_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| JournalError::Invalid("DATABASE_URL or --database-url is required".into()))
    }

    pub fn anchors(&self) -> Result<Vec<ScheduleAnchor>> {
        match &self.anchors_csv {
            Some(path) => load_anchors(path),
            None => Ok(default_anchors()),
        }
    }
}

pub fn load_anchors(path: &Path) -> Result<Vec<ScheduleAnchor>> {
    let reader = csv::Reader::from_path(path)?;
    read_anchors(reader)
}

fn read_anchors<R: std::io::Read>(mut reader: csv::Reader<R>) -> Result<Vec<ScheduleAnchor>> {
    #[derive(Deserialize)]
    struct AnchorRow {
        date: NaiveDate,
        parity: String,
    }

    let mut anchors: BTreeMap<NaiveDate, Parity> = BTreeMap::new();
    for result in reader.deserialize::<AnchorRow>() {
        let row = result?;
        let parity: Parity = row.parity.parse()?;
        match anchors.insert(row.date, parity) {
            Some(previous) if previous != parity => {
                return Err(JournalError::Invalid(format!(
                    "anchor {} is listed as both {previous} and {parity}",
                    row.date
                )));
            }
            _ => {}
        }
    }

    if anchors.is_empty() {
        return Err(JournalError::Invalid("anchor file has no rows".into()));
    }
    Ok(anchors
        .into_iter()
        .map(|(date, parity)| ScheduleAnchor::new(date, parity))
        .collect())
}
