use std::path::PathBuf;

use anyhow::Context;
use chrono::{Datelike, Local, NaiveDate};
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{debug, error};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use group_journal::attendance::summarize;
use group_journal::calendar::{month_view, parse_month};
use group_journal::comments::{comments_for_date, NewScheduleComment};
use group_journal::config::Config;
use group_journal::db::{self, PgGradeStore};
use group_journal::import::import_csv;
use group_journal::models::StudentAbsences;
use group_journal::report::{build_report, standings};
use group_journal::schedule::{lessons_for_date, seminars_for_week, WeekType};
use group_journal::{
    GradeInput, Parity, PerformanceAggregator, PointTable, WeekOverride, WeekResolver,
};

#[derive(Parser)]
#[command(name = "group-journal")]
#[command(about = "Week parity and grade performance tracker for study groups", long_about = None)]
struct Cli {
    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load a sample group with lessons and subjects
    Seed,
    /// Show whether a date falls in an even or odd week
    Week {
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Show a month with the week parity of every day
    Calendar {
        /// Month as YYYY-MM, defaults to the current month
        #[arg(long)]
        month: Option<String>,
        /// Mark days that carry this group's comments
        #[arg(long)]
        group: Option<String>,
    },
    /// Manage manual week parity overrides
    Override {
        #[command(subcommand)]
        action: OverrideAction,
    },
    /// Record or remove grades
    Grade {
        #[command(subcommand)]
        action: GradeAction,
    },
    /// Show a student's standing in one subject
    Standing {
        #[arg(long)]
        student: i64,
        #[arg(long)]
        subject: i64,
        #[arg(long)]
        json: bool,
    },
    /// Show every student's standing in one subject
    Progress {
        #[arg(long)]
        subject: i64,
    },
    /// Recompute every cached total from recorded grades
    Rebuild,
    /// Import grades from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// List a group's lessons for a date
    Schedule {
        #[arg(long)]
        group: String,
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// List the seminars of a week with their speaking slots
    Seminars {
        #[arg(long)]
        group: String,
        /// Any date in the week, defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Assign or free seminar speaking slots
    Slot {
        #[command(subcommand)]
        action: SlotAction,
    },
    /// Manage timetable comments
    Comment {
        #[command(subcommand)]
        action: CommentAction,
    },
    /// Record or summarise absence hours
    Absence {
        #[command(subcommand)]
        action: AbsenceAction,
    },
    /// Generate a markdown standing report for a group
    Report {
        #[arg(long)]
        group: String,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

#[derive(Subcommand)]
enum OverrideAction {
    /// Force the parity of a date
    Set {
        #[arg(long)]
        date: NaiveDate,
        #[arg(long)]
        parity: Parity,
    },
    /// Remove the override of a date
    Clear {
        #[arg(long)]
        date: NaiveDate,
    },
    /// List overrides in a date range
    List {
        #[arg(long)]
        from: NaiveDate,
        #[arg(long)]
        to: NaiveDate,
    },
}

#[derive(Subcommand)]
enum GradeAction {
    Add {
        #[arg(long)]
        student: i64,
        #[arg(long)]
        subject: i64,
        /// performance, supplement, question, plus, minus, numeric_2..numeric_5
        #[arg(long)]
        kind: String,
        #[arg(long)]
        raw_value: Option<String>,
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long, default_value = "")]
        comment: String,
    },
    Remove {
        #[arg(long)]
        id: i64,
    },
}

#[derive(Subcommand)]
enum SlotAction {
    Assign {
        #[arg(long)]
        lesson: i64,
        #[arg(long)]
        slot: i32,
        #[arg(long)]
        student: i64,
    },
    Clear {
        #[arg(long)]
        lesson: i64,
        #[arg(long)]
        slot: i32,
    },
}

#[derive(Subcommand)]
enum CommentAction {
    /// Without --date, --day or --week-type the comment shows every day
    Add {
        #[arg(long)]
        group: String,
        #[arg(long)]
        text: String,
        #[arg(long)]
        date: Option<NaiveDate>,
        /// 1 = Monday .. 7 = Sunday
        #[arg(long)]
        day: Option<u32>,
        #[arg(long)]
        week_type: Option<WeekType>,
        #[arg(long)]
        lesson: Option<i64>,
        #[arg(long)]
        urgent: bool,
    },
    /// Show the comments that apply to a date
    List {
        #[arg(long)]
        group: String,
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    Remove {
        #[arg(long)]
        id: i64,
    },
}

#[derive(Subcommand)]
enum AbsenceAction {
    Add {
        #[arg(long)]
        student: i64,
        #[arg(long)]
        hours: i32,
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long, default_value = "")]
        reason: String,
    },
    Summary {
        #[arg(long)]
        student: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    let config = cli.config;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("group_journal={},info", config.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }
    let database_url = match config.database_url() {
        Ok(url) => url.to_string(),
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    let aggregator = PerformanceAggregator::with_config(
        PgGradeStore::new(pool.clone()),
        PointTable::default(),
        config.target_points,
    );
    let today = Local::now().date_naive();

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Week { date } => {
            let date = date.unwrap_or(today);
            let resolver = resolver_for(&pool, &config, date, date).await?;
            println!("{} is in an {} week.", date, resolver.resolve(date));
        }
        Commands::Calendar { month, group } => {
            let (year, month) = match month {
                Some(value) => parse_month(&value)?,
                None => (today.year(), today.month()),
            };
            let first = NaiveDate::from_ymd_opt(year, month, 1).context("invalid month")?;
            let last = first
                .checked_add_months(chrono::Months::new(1))
                .and_then(|next| next.pred_opt())
                .context("month out of range")?;
            let resolver = resolver_for(&pool, &config, first, last).await?;
            let comments = match &group {
                Some(group) => db::fetch_comments(&pool, group).await?,
                None => Vec::new(),
            };
            let view = month_view(year, month, &resolver, &comments, today)?;

            println!("{} {}", view.month_name, view.year);
            for day in view.days {
                let marker = if day.is_today { " <- today" } else { "" };
                let notes = match (day.comment_count, day.has_urgent) {
                    (0, _) => String::new(),
                    (n, true) => format!(" [{n} comments, urgent]"),
                    (n, false) => format!(" [{n} comments]"),
                };
                println!(
                    "{:>2} {} {}{}{}",
                    day.day,
                    day.date.weekday(),
                    day.parity,
                    notes,
                    marker
                );
            }
        }
        Commands::Override { action } => match action {
            OverrideAction::Set { date, parity } => {
                db::set_override(&pool, WeekOverride { date, parity }).await?;
                println!("{} is now an {} week.", date, parity);
            }
            OverrideAction::Clear { date } => {
                if db::clear_override(&pool, date).await? {
                    println!("Override for {} removed.", date);
                } else {
                    println!("No override set for {}.", date);
                }
            }
            OverrideAction::List { from, to } => {
                let overrides = db::fetch_overrides(&pool, from, to).await?;
                if overrides.is_empty() {
                    println!("No overrides between {} and {}.", from, to);
                }
                for entry in overrides {
                    println!("- {} {}", entry.date, entry.parity);
                }
            }
        },
        Commands::Grade { action } => match action {
            GradeAction::Add {
                student,
                subject,
                kind,
                raw_value,
                date,
                comment,
            } => {
                let input = GradeInput {
                    student_id: student,
                    subject_id: subject,
                    kind,
                    raw_value,
                    occurred_on: date.unwrap_or(today),
                    comment,
                    source_key: None,
                };
                let recorded = aggregator.record(input).await?;
                println!(
                    "Recorded grade {} ({} points); total now {}.",
                    recorded.event.id, recorded.event.points, recorded.aggregate.total_points
                );
            }
            GradeAction::Remove { id } => {
                let removed = aggregator.remove_event(id).await?;
                println!(
                    "Removed grade {}; total now {}.",
                    id, removed.aggregate.total_points
                );
            }
        },
        Commands::Standing {
            student,
            subject,
            json,
        } => {
            let snapshot = aggregator.snapshot(student, subject).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            } else {
                println!(
                    "{:.1}/{} points, {:.1} remaining, {:.1}% ({})",
                    snapshot.total,
                    snapshot.target,
                    snapshot.remaining,
                    snapshot.progress_pct,
                    snapshot.status
                );
            }
        }
        Commands::Progress { subject } => {
            let subject = db::fetch_subject(&pool, subject).await?;
            let students = db::fetch_students(&pool, &subject.group_name).await?;
            if students.is_empty() {
                println!("No students in {}.", subject.group_name);
                return Ok(());
            }

            println!("{} ({}):", subject.name, subject.group_name);
            let mut rows = Vec::new();
            for student in students {
                let snapshot = aggregator.snapshot(student.id, subject.id).await?;
                rows.push((student, snapshot));
            }
            // furthest behind first
            rows.sort_by(|a, b| {
                b.1.remaining
                    .partial_cmp(&a.1.remaining)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            for (student, snapshot) in rows {
                println!(
                    "- {} {:.1}/{} ({:.1}%, {})",
                    student.full_name,
                    snapshot.total,
                    snapshot.target,
                    snapshot.progress_pct,
                    snapshot.status
                );
            }
        }
        Commands::Rebuild => {
            let count = aggregator.rebuild().await?;
            println!("Rebuilt {count} aggregates.");
        }
        Commands::Import { csv } => {
            let summary = import_csv(&aggregator, &csv).await?;
            println!(
                "Inserted {} grades from {} ({} already imported).",
                summary.inserted,
                csv.display(),
                summary.duplicates
            );
        }
        Commands::Schedule { group, date } => {
            let date = date.unwrap_or(today);
            let resolver = resolver_for(&pool, &config, date, date).await?;
            let lessons = db::fetch_lessons(&pool, &group).await?;
            let todays = lessons_for_date(&lessons, date, &resolver);

            println!("{} {} ({} week):", group, date, resolver.resolve(date));
            if todays.is_empty() {
                println!("No lessons.");
            }
            for lesson in todays {
                println!(
                    "{}. {}-{} {} [{}] {}",
                    lesson.pair_number,
                    lesson.start_time,
                    lesson.end_time,
                    lesson.subject,
                    lesson.lesson_type,
                    lesson.room
                );
            }

            let comments = db::fetch_comments(&pool, &group).await?;
            for comment in comments_for_date(&comments, date, &resolver) {
                let flag = if comment.is_urgent { "!" } else { "-" };
                println!("{} {}", flag, comment.comment);
            }
        }
        Commands::Seminars { group, date } => {
            let date = date.unwrap_or(today);
            let resolver = resolver_for(&pool, &config, date, date).await?;
            let parity = resolver.resolve(date);
            let lessons = db::fetch_lessons(&pool, &group).await?;
            let slots = db::fetch_seminar_slots(&pool, &group).await?;
            let seminars = seminars_for_week(&lessons, &slots, parity);

            println!("{} seminars, {} week:", group, parity);
            if seminars.is_empty() {
                println!("No seminars.");
            }
            for seminar in seminars {
                let lesson = seminar.lesson;
                println!(
                    "[{}] day {} pair {} {}-{} {} ({})",
                    lesson.id,
                    lesson.day,
                    lesson.pair_number,
                    lesson.start_time,
                    lesson.end_time,
                    lesson.subject,
                    lesson.teacher
                );
                for slot in seminar.slots {
                    match slot.student_name {
                        Some(name) => println!(
                            "  {}. {} ({:.1} points)",
                            slot.slot_number, name, slot.student_points
                        ),
                        None => println!("  {}. free", slot.slot_number),
                    }
                }
            }
        }
        Commands::Slot { action } => match action {
            SlotAction::Assign {
                lesson,
                slot,
                student,
            } => {
                db::assign_slot(&pool, lesson, slot, student).await?;
                println!("Student {} takes slot {} of lesson {}.", student, slot, lesson);
            }
            SlotAction::Clear { lesson, slot } => {
                if db::clear_slot(&pool, lesson, slot).await? {
                    println!("Slot {} of lesson {} is free.", slot, lesson);
                } else {
                    println!("Slot {} of lesson {} was already free.", slot, lesson);
                }
            }
        },
        Commands::Comment { action } => match action {
            CommentAction::Add {
                group,
                text,
                date,
                day,
                week_type,
                lesson,
                urgent,
            } => {
                let comment = db::add_comment(
                    &pool,
                    &NewScheduleComment {
                        group_name: group,
                        comment: text,
                        week_type,
                        day,
                        lesson_id: lesson,
                        date,
                        is_urgent: urgent,
                    },
                )
                .await?;
                println!("Added comment {}.", comment.id);
            }
            CommentAction::List { group, date } => {
                let date = date.unwrap_or(today);
                let resolver = resolver_for(&pool, &config, date, date).await?;
                let comments = db::fetch_comments(&pool, &group).await?;
                let shown = comments_for_date(&comments, date, &resolver);
                if shown.is_empty() {
                    println!("No comments for {} on {}.", group, date);
                }
                for comment in shown {
                    let flag = if comment.is_urgent { " (urgent)" } else { "" };
                    println!("- [{}] {}{}", comment.id, comment.comment, flag);
                }
            }
            CommentAction::Remove { id } => {
                if db::deactivate_comment(&pool, id).await? {
                    println!("Comment {} removed.", id);
                } else {
                    println!("No active comment {}.", id);
                }
            }
        },
        Commands::Absence { action } => match action {
            AbsenceAction::Add {
                student,
                hours,
                date,
                reason,
            } => {
                let absence =
                    db::add_absence(&pool, student, date.unwrap_or(today), hours, &reason).await?;
                let summary = summarize(
                    &db::fetch_absences(&pool, student).await?,
                    config.absence_limit_hours,
                );
                println!(
                    "Recorded {} hours on {}; {} hours missed, {} remaining.",
                    absence.hours, absence.occurred_on, summary.total_hours, summary.remaining_hours
                );
            }
            AbsenceAction::Summary { student } => {
                let absences = db::fetch_absences(&pool, student).await?;
                let summary = summarize(&absences, config.absence_limit_hours);
                println!(
                    "{} hours missed, {} remaining.",
                    summary.total_hours, summary.remaining_hours
                );
            }
        },
        Commands::Report { group, out } => {
            let resolver = resolver_for(&pool, &config, today, today).await?;
            let students = db::fetch_students(&pool, &group).await?;
            let rows = db::fetch_performance_rows(&pool, &group).await?;

            let mut absences = Vec::new();
            for student in students.iter() {
                let summary = summarize(
                    &db::fetch_absences(&pool, student.id).await?,
                    config.absence_limit_hours,
                );
                absences.push(StudentAbsences {
                    student_name: student.full_name.clone(),
                    summary,
                });
            }

            let report = build_report(
                &group,
                today,
                resolver.resolve(today),
                &standings(&students, &rows),
                &absences,
            );
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

async fn resolver_for(
    pool: &PgPool,
    config: &Config,
    from: NaiveDate,
    to: NaiveDate,
) -> anyhow::Result<WeekResolver> {
    let anchors = config.anchors().context("failed to load schedule anchors")?;
    let overrides = db::fetch_overrides(pool, from, to).await?;
    debug!(
        anchors = anchors.len(),
        overrides = overrides.len(),
        "week resolver ready"
    );
    Ok(WeekResolver::new(anchors, group_journal::parity::default_epoch()).with_overrides(overrides))
}
