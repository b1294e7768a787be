//! Week-parity resolution and grade performance tracking for study groups.

pub mod aggregator;
pub mod attendance;
pub mod calendar;
pub mod comments;
pub mod config;
pub mod db;
pub mod error;
pub mod import;
pub mod models;
pub mod parity;
pub mod performance;
pub mod report;
pub mod schedule;
pub mod store;

pub use aggregator::{GradeInput, PerformanceAggregator};
pub use error::{JournalError, Result};
pub use parity::{Parity, ScheduleAnchor, WeekOverride, WeekResolver};
pub use performance::{GradeEvent, PerformanceAggregate, PointTable, Snapshot, Status};
pub use store::{GradeStore, MemoryGradeStore};
