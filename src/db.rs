use chrono::NaiveDate;
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Row};
use tracing::{debug, info};

use crate::attendance::{validate_hours, Absence};
use crate::comments::{validate_comment, NewScheduleComment, ScheduleComment};
use crate::error::{JournalError, Result};
use crate::models::{PerformanceRow, Student, Subject};
use crate::parity::WeekOverride;
use crate::performance::{total_points, GradeEvent, NewGradeEvent, PerformanceAggregate};
use crate::schedule::{is_seminar, validate_slot_number, Lesson, SeminarSlot};
use crate::store::{GradeStore, Recorded};

pub async fn init_db(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool) -> Result<()> {
    let students = [
        ("Avery Lee", "IS-21"),
        ("Jules Moreno", "IS-21"),
        ("Kiara Patel", "IS-21"),
    ];
    for (name, group) in students {
        sqlx::query(
            r#"
            INSERT INTO group_journal.students (full_name, group_name)
            VALUES ($1, $2)
            ON CONFLICT (full_name, group_name) DO NOTHING
            "#,
        )
        .bind(name)
        .bind(group)
        .execute(pool)
        .await?;
    }

    let lessons = [
        (1, "both", 1, "9:40", "11:10", "Databases", "lecture"),
        (1, "even", 2, "11:20", "12:50", "Algorithms", "seminar"),
        (1, "odd", 2, "11:20", "12:50", "Linear Algebra", "practice"),
        (3, "both", 1, "9:40", "11:10", "Algorithms", "lecture"),
        (4, "odd", 3, "13:20", "14:50", "Databases", "lab"),
    ];
    for (day, week_type, pair_number, start, end, subject, lesson_type) in lessons {
        sqlx::query(
            r#"
            INSERT INTO group_journal.lessons
            (group_name, day, week_type, pair_number, start_time, end_time, subject, lesson_type)
            VALUES ('IS-21', $1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (group_name, day, week_type, pair_number) DO NOTHING
            "#,
        )
        .bind(day)
        .bind(week_type)
        .bind(pair_number)
        .bind(start)
        .bind(end)
        .bind(subject)
        .bind(lesson_type)
        .execute(pool)
        .await?;

        // every scheduled subject is gradable in its group
        sqlx::query(
            r#"
            INSERT INTO group_journal.subjects (name, group_name)
            VALUES ($1, 'IS-21')
            ON CONFLICT (name, group_name) DO NOTHING
            "#,
        )
        .bind(subject)
        .execute(pool)
        .await?;
    }

    info!("seed data written");
    Ok(())
}

pub async fn fetch_overrides(
    pool: &PgPool,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<WeekOverride>> {
    let rows = sqlx::query(
        "SELECT date, parity FROM group_journal.week_overrides \
         WHERE date BETWEEN $1 AND $2 ORDER BY date",
    )
    .bind(from)
    .bind(to)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| -> Result<WeekOverride> {
            Ok(WeekOverride {
                date: row.get("date"),
                parity: row.get::<String, _>("parity").parse()?,
            })
        })
        .collect()
}

pub async fn set_override(pool: &PgPool, entry: WeekOverride) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO group_journal.week_overrides (date, parity)
        VALUES ($1, $2)
        ON CONFLICT (date) DO UPDATE
        SET parity = EXCLUDED.parity, updated_at = now()
        "#,
    )
    .bind(entry.date)
    .bind(entry.parity.as_str())
    .execute(pool)
    .await?;

    info!(date = %entry.date, parity = %entry.parity, "week override set");
    Ok(())
}

pub async fn clear_override(pool: &PgPool, date: NaiveDate) -> Result<bool> {
    let result = sqlx::query("DELETE FROM group_journal.week_overrides WHERE date = $1")
        .bind(date)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn fetch_students(pool: &PgPool, group: &str) -> Result<Vec<Student>> {
    let rows = sqlx::query(
        "SELECT id, full_name, group_name FROM group_journal.students \
         WHERE group_name = $1 AND is_active ORDER BY full_name",
    )
    .bind(group)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| Student {
            id: row.get("id"),
            full_name: row.get("full_name"),
            group_name: row.get("group_name"),
        })
        .collect())
}

pub async fn fetch_subject(pool: &PgPool, id: i64) -> Result<Subject> {
    let row = sqlx::query(
        "SELECT id, name, group_name, teacher FROM group_journal.subjects WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| JournalError::not_found("subject", id))?;

    Ok(Subject {
        id: row.get("id"),
        name: row.get("name"),
        group_name: row.get("group_name"),
        teacher: row.get("teacher"),
    })
}

pub async fn fetch_performance_rows(pool: &PgPool, group: &str) -> Result<Vec<PerformanceRow>> {
    let rows = sqlx::query(
        "SELECT p.student_id, st.full_name, p.subject_id, su.name AS subject_name, \
         p.total_points, p.target_points \
         FROM group_journal.performance p \
         JOIN group_journal.students st ON st.id = p.student_id \
         JOIN group_journal.subjects su ON su.id = p.subject_id \
         WHERE st.group_name = $1 AND st.is_active",
    )
    .bind(group)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| PerformanceRow {
            student_id: row.get("student_id"),
            student_name: row.get("full_name"),
            subject_id: row.get("subject_id"),
            subject_name: row.get("subject_name"),
            total_points: row.get("total_points"),
            target_points: row.get("target_points"),
        })
        .collect())
}

pub async fn fetch_lessons(pool: &PgPool, group: &str) -> Result<Vec<Lesson>> {
    let rows = sqlx::query(
        "SELECT id, group_name, day, week_type, pair_number, start_time, end_time, \
         subject, teacher, room, lesson_type \
         FROM group_journal.lessons WHERE group_name = $1 ORDER BY day, pair_number",
    )
    .bind(group)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| -> Result<Lesson> {
            Ok(Lesson {
                id: row.get("id"),
                group_name: row.get("group_name"),
                day: row.get::<i32, _>("day") as u32,
                week_type: row.get::<String, _>("week_type").parse()?,
                pair_number: row.get("pair_number"),
                start_time: row.get("start_time"),
                end_time: row.get("end_time"),
                subject: row.get("subject"),
                teacher: row.get("teacher"),
                room: row.get("room"),
                lesson_type: row.get("lesson_type"),
            })
        })
        .collect()
}

pub async fn add_absence(
    pool: &PgPool,
    student_id: i64,
    occurred_on: NaiveDate,
    hours: i32,
    reason: &str,
) -> Result<Absence> {
    let hours = validate_hours(hours)?;
    let mut conn = pool.acquire().await?;
    ensure_student(&mut conn, student_id).await?;

    let id: i64 = sqlx::query(
        r#"
        INSERT INTO group_journal.absences (student_id, occurred_on, hours, reason)
        VALUES ($1, $2, $3, $4)
        RETURNING id
        "#,
    )
    .bind(student_id)
    .bind(occurred_on)
    .bind(hours)
    .bind(reason)
    .fetch_one(&mut *conn)
    .await?
    .get("id");

    info!(absence_id = id, student_id, hours, "absence recorded");
    Ok(Absence {
        id,
        student_id,
        occurred_on,
        hours,
        reason: reason.to_string(),
    })
}

pub async fn fetch_absences(pool: &PgPool, student_id: i64) -> Result<Vec<Absence>> {
    let rows = sqlx::query(
        "SELECT id, student_id, occurred_on, hours, reason FROM group_journal.absences \
         WHERE student_id = $1 ORDER BY occurred_on DESC",
    )
    .bind(student_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| Absence {
            id: row.get("id"),
            student_id: row.get("student_id"),
            occurred_on: row.get("occurred_on"),
            hours: row.get("hours"),
            reason: row.get("reason"),
        })
        .collect())
}

/// Slots of every seminar in the group, with each assigned student's total in
/// the seminar's subject.
pub async fn fetch_seminar_slots(pool: &PgPool, group: &str) -> Result<Vec<SeminarSlot>> {
    let rows = sqlx::query(
        "SELECT s.lesson_id, s.slot_number, s.student_id, st.full_name, \
         COALESCE(p.total_points, 0) AS student_points \
         FROM group_journal.seminar_slots s \
         JOIN group_journal.lessons l ON l.id = s.lesson_id \
         LEFT JOIN group_journal.students st ON st.id = s.student_id \
         LEFT JOIN group_journal.subjects su \
           ON su.name = l.subject AND su.group_name = l.group_name \
         LEFT JOIN group_journal.performance p \
           ON p.student_id = s.student_id AND p.subject_id = su.id \
         WHERE l.group_name = $1 \
         ORDER BY l.day, l.pair_number, s.slot_number",
    )
    .bind(group)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| SeminarSlot {
            lesson_id: row.get("lesson_id"),
            slot_number: row.get("slot_number"),
            student_id: row.get("student_id"),
            student_name: row.get("full_name"),
            student_points: row.get("student_points"),
        })
        .collect())
}

pub async fn assign_slot(
    pool: &PgPool,
    lesson_id: i64,
    slot_number: i32,
    student_id: i64,
) -> Result<()> {
    let slot_number = validate_slot_number(slot_number)?;
    let mut conn = pool.acquire().await?;
    ensure_student(&mut conn, student_id).await?;

    let lesson = sqlx::query("SELECT lesson_type FROM group_journal.lessons WHERE id = $1")
        .bind(lesson_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| JournalError::not_found("lesson", lesson_id))?;
    let lesson_type: String = lesson.get("lesson_type");
    if !is_seminar(&lesson_type) {
        return Err(JournalError::Invalid(format!(
            "lesson {lesson_id} is a {lesson_type}, not a seminar"
        )));
    }

    sqlx::query(
        r#"
        INSERT INTO group_journal.seminar_slots (lesson_id, slot_number, student_id)
        VALUES ($1, $2, $3)
        ON CONFLICT (lesson_id, slot_number) DO UPDATE
        SET student_id = EXCLUDED.student_id, updated_at = now()
        "#,
    )
    .bind(lesson_id)
    .bind(slot_number)
    .bind(student_id)
    .execute(&mut *conn)
    .await?;

    info!(lesson_id, slot_number, student_id, "seminar slot assigned");
    Ok(())
}

/// Leaves the slot in place with nobody assigned.
pub async fn clear_slot(pool: &PgPool, lesson_id: i64, slot_number: i32) -> Result<bool> {
    let slot_number = validate_slot_number(slot_number)?;
    let result = sqlx::query(
        "UPDATE group_journal.seminar_slots SET student_id = NULL, updated_at = now() \
         WHERE lesson_id = $1 AND slot_number = $2 AND student_id IS NOT NULL",
    )
    .bind(lesson_id)
    .bind(slot_number)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn add_comment(pool: &PgPool, new: &NewScheduleComment) -> Result<ScheduleComment> {
    validate_comment(new)?;

    let row = sqlx::query(
        r#"
        INSERT INTO group_journal.schedule_comments
        (group_name, comment, week_type, day, lesson_id, date, is_urgent)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id, created_at
        "#,
    )
    .bind(&new.group_name)
    .bind(&new.comment)
    .bind(new.week_type.map(|w| w.as_str()))
    .bind(new.day.map(|d| d as i32))
    .bind(new.lesson_id)
    .bind(new.date)
    .bind(new.is_urgent)
    .fetch_one(pool)
    .await?;

    let comment = ScheduleComment {
        id: row.get("id"),
        group_name: new.group_name.clone(),
        comment: new.comment.clone(),
        week_type: new.week_type,
        day: new.day,
        lesson_id: new.lesson_id,
        date: new.date,
        is_urgent: new.is_urgent,
        is_active: true,
        created_at: row.get("created_at"),
    };
    info!(comment_id = comment.id, group = %comment.group_name, urgent = comment.is_urgent, "schedule comment added");
    Ok(comment)
}

pub async fn fetch_comments(pool: &PgPool, group: &str) -> Result<Vec<ScheduleComment>> {
    let rows = sqlx::query(
        "SELECT id, group_name, comment, week_type, day, lesson_id, date, is_urgent, \
         is_active, created_at \
         FROM group_journal.schedule_comments \
         WHERE group_name = $1 AND is_active ORDER BY created_at DESC",
    )
    .bind(group)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| -> Result<ScheduleComment> {
            Ok(ScheduleComment {
                id: row.get("id"),
                group_name: row.get("group_name"),
                comment: row.get("comment"),
                week_type: row
                    .get::<Option<String>, _>("week_type")
                    .map(|w| w.parse())
                    .transpose()?,
                day: row.get::<Option<i32>, _>("day").map(|d| d as u32),
                lesson_id: row.get("lesson_id"),
                date: row.get("date"),
                is_urgent: row.get("is_urgent"),
                is_active: row.get("is_active"),
                created_at: row.get("created_at"),
            })
        })
        .collect()
}

pub async fn deactivate_comment(pool: &PgPool, id: i64) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE group_journal.schedule_comments SET is_active = FALSE \
         WHERE id = $1 AND is_active",
    )
    .bind(id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Grade storage in Postgres. Each mutation is one transaction that row-locks
/// the pair's aggregate before summing its events.
#[derive(Debug, Clone)]
pub struct PgGradeStore {
    pool: PgPool,
}

impl PgGradeStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl GradeStore for PgGradeStore {
    async fn record(&self, event: NewGradeEvent, target_points: f64) -> Result<Recorded> {
        let mut tx = self.pool.begin().await?;
        ensure_student(&mut tx, event.student_id).await?;
        ensure_subject(&mut tx, event.subject_id).await?;
        lock_pair(&mut tx, event.student_id, event.subject_id, target_points).await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO group_journal.grade_events
            (student_id, subject_id, kind, raw_value, points, occurred_on, comment, source_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (source_key) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(event.student_id)
        .bind(event.subject_id)
        .bind(&event.kind)
        .bind(&event.raw_value)
        .bind(event.points)
        .bind(event.occurred_on)
        .bind(&event.comment)
        .bind(&event.source_key)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = inserted else {
            return Err(JournalError::Duplicate(event.source_key.unwrap_or_default()));
        };

        let aggregate = recompute(&mut tx, event.student_id, event.subject_id).await?;
        tx.commit().await?;

        Ok(Recorded {
            event: GradeEvent {
                id: row.get("id"),
                student_id: event.student_id,
                subject_id: event.subject_id,
                kind: event.kind,
                raw_value: event.raw_value,
                points: event.points,
                occurred_on: event.occurred_on,
                comment: event.comment,
            },
            aggregate,
        })
    }

    async fn remove(&self, event_id: i64, target_points: f64) -> Result<Recorded> {
        let mut tx = self.pool.begin().await?;
        let removed = sqlx::query(
            "DELETE FROM group_journal.grade_events WHERE id = $1 \
             RETURNING id, student_id, subject_id, kind, raw_value, points, occurred_on, comment",
        )
        .bind(event_id)
        .fetch_optional(&mut *tx)
        .await?
        .map(|row| grade_event_from_row(&row))
        .ok_or_else(|| JournalError::not_found("grade event", event_id))?;

        lock_pair(&mut tx, removed.student_id, removed.subject_id, target_points).await?;
        let aggregate = recompute(&mut tx, removed.student_id, removed.subject_id).await?;
        tx.commit().await?;

        Ok(Recorded {
            event: removed,
            aggregate,
        })
    }

    async fn aggregate(
        &self,
        student_id: i64,
        subject_id: i64,
    ) -> Result<Option<PerformanceAggregate>> {
        let row = sqlx::query(
            "SELECT total_points, target_points FROM group_journal.performance \
             WHERE student_id = $1 AND subject_id = $2",
        )
        .bind(student_id)
        .bind(subject_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| PerformanceAggregate {
            student_id,
            subject_id,
            total_points: row.get("total_points"),
            target_points: row.get("target_points"),
        }))
    }

    async fn events(&self, student_id: i64, subject_id: i64) -> Result<Vec<GradeEvent>> {
        let mut conn = self.pool.acquire().await?;
        pair_events(&mut conn, student_id, subject_id).await
    }

    async fn rebuild(&self, target_points: f64) -> Result<usize> {
        let pairs = sqlx::query(
            "SELECT student_id, subject_id FROM group_journal.performance \
             UNION SELECT DISTINCT student_id, subject_id FROM group_journal.grade_events",
        )
        .fetch_all(&self.pool)
        .await?;

        for row in pairs.iter() {
            let student_id: i64 = row.get("student_id");
            let subject_id: i64 = row.get("subject_id");
            let mut tx = self.pool.begin().await?;
            lock_pair(&mut tx, student_id, subject_id, target_points).await?;
            sqlx::query(
                "UPDATE group_journal.performance SET target_points = $3 \
                 WHERE student_id = $1 AND subject_id = $2",
            )
            .bind(student_id)
            .bind(subject_id)
            .bind(target_points)
            .execute(&mut *tx)
            .await?;
            recompute(&mut tx, student_id, subject_id).await?;
            tx.commit().await?;
        }

        Ok(pairs.len())
    }
}

async fn ensure_student(conn: &mut PgConnection, id: i64) -> Result<()> {
    let exists: bool =
        sqlx::query("SELECT EXISTS (SELECT 1 FROM group_journal.students WHERE id = $1) AS found")
            .bind(id)
            .fetch_one(&mut *conn)
            .await?
            .get("found");
    if exists {
        Ok(())
    } else {
        Err(JournalError::not_found("student", id))
    }
}

async fn ensure_subject(conn: &mut PgConnection, id: i64) -> Result<()> {
    let exists: bool =
        sqlx::query("SELECT EXISTS (SELECT 1 FROM group_journal.subjects WHERE id = $1) AS found")
            .bind(id)
            .fetch_one(&mut *conn)
            .await?
            .get("found");
    if exists {
        Ok(())
    } else {
        Err(JournalError::not_found("subject", id))
    }
}

/// Creates the aggregate row if needed and holds its row lock until the
/// surrounding transaction ends.
async fn lock_pair(
    conn: &mut PgConnection,
    student_id: i64,
    subject_id: i64,
    target_points: f64,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO group_journal.performance (student_id, subject_id, total_points, target_points)
        VALUES ($1, $2, 0, $3)
        ON CONFLICT (student_id, subject_id) DO NOTHING
        "#,
    )
    .bind(student_id)
    .bind(subject_id)
    .bind(target_points)
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        "SELECT 1 FROM group_journal.performance \
         WHERE student_id = $1 AND subject_id = $2 FOR UPDATE",
    )
    .bind(student_id)
    .bind(subject_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn recompute(
    conn: &mut PgConnection,
    student_id: i64,
    subject_id: i64,
) -> Result<PerformanceAggregate> {
    let events = pair_events(conn, student_id, subject_id).await?;
    let total = total_points(&events);

    let target_points: f64 = sqlx::query(
        r#"
        UPDATE group_journal.performance
        SET total_points = $3, updated_at = now()
        WHERE student_id = $1 AND subject_id = $2
        RETURNING target_points
        "#,
    )
    .bind(student_id)
    .bind(subject_id)
    .bind(total)
    .fetch_one(&mut *conn)
    .await?
    .get("target_points");

    debug!(student_id, subject_id, events = events.len(), total, "aggregate recomputed");
    Ok(PerformanceAggregate {
        student_id,
        subject_id,
        total_points: total,
        target_points,
    })
}

async fn pair_events(
    conn: &mut PgConnection,
    student_id: i64,
    subject_id: i64,
) -> Result<Vec<GradeEvent>> {
    let rows = sqlx::query(
        "SELECT id, student_id, subject_id, kind, raw_value, points, occurred_on, comment \
         FROM group_journal.grade_events \
         WHERE student_id = $1 AND subject_id = $2 ORDER BY occurred_on, id",
    )
    .bind(student_id)
    .bind(subject_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.iter().map(grade_event_from_row).collect())
}

fn grade_event_from_row(row: &PgRow) -> GradeEvent {
    GradeEvent {
        id: row.get("id"),
        student_id: row.get("student_id"),
        subject_id: row.get("subject_id"),
        kind: row.get("kind"),
        raw_value: row.get("raw_value"),
        points: row.get("points"),
        occurred_on: row.get("occurred_on"),
        comment: row.get("comment"),
    }
}
