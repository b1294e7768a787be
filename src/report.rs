use std::fmt::Write;

use chrono::NaiveDate;

use crate::models::{PerformanceRow, Student, StudentAbsences, StudentStanding};
use crate::parity::Parity;
use crate::performance::progress_pct;

/// Any subject below this many points puts a student at risk.
pub const AT_RISK_POINTS: f64 = 15.0;

pub fn standings(students: &[Student], rows: &[PerformanceRow]) -> Vec<StudentStanding> {
    let mut standings: Vec<StudentStanding> = students
        .iter()
        .map(|student| {
            let own: Vec<&PerformanceRow> = rows
                .iter()
                .filter(|row| row.student_id == student.id)
                .collect();

            let avg_progress = if own.is_empty() {
                0.0
            } else {
                let sum: f64 = own
                    .iter()
                    .map(|row| progress_pct(row.total_points, row.target_points))
                    .sum();
                ((sum / own.len() as f64) * 10.0).round() / 10.0
            };

            StudentStanding {
                student_id: student.id,
                student_name: student.full_name.clone(),
                subject_count: own.len(),
                avg_progress,
                at_risk: own.iter().any(|row| row.total_points < AT_RISK_POINTS),
                ready: !own.is_empty() && own.iter().all(|row| row.total_points >= row.target_points),
            }
        })
        .collect();

    standings.sort_by(|a, b| a.student_name.cmp(&b.student_name));
    standings
}

pub fn build_report(
    group: &str,
    generated_on: NaiveDate,
    parity: Parity,
    standings: &[StudentStanding],
    absences: &[StudentAbsences],
) -> String {
    let mut output = String::new();
    let at_risk = standings.iter().filter(|s| s.at_risk).count();
    let ready = standings.iter().filter(|s| s.ready).count();

    let _ = writeln!(output, "# Group Standing Report");
    let _ = writeln!(
        output,
        "Generated for {} on {} ({} week)",
        group, generated_on, parity
    );
    let _ = writeln!(output);
    let _ = writeln!(
        output,
        "{} students, {} at risk, {} ready",
        standings.len(),
        at_risk,
        ready
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Progress");

    if standings.is_empty() {
        let _ = writeln!(output, "No students in this group.");
    } else {
        let _ = writeln!(output, "| Student | Subjects | Avg progress | Flag |");
        let _ = writeln!(output, "|---|---|---|---|");
        for standing in standings {
            let flag = if standing.ready {
                "ready"
            } else if standing.at_risk {
                "at risk"
            } else {
                ""
            };
            let _ = writeln!(
                output,
                "| {} | {} | {:.1}% | {} |",
                standing.student_name, standing.subject_count, standing.avg_progress, flag
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Absences");

    let mut ordered = absences.to_vec();
    ordered.sort_by(|a, b| b.summary.total_hours.cmp(&a.summary.total_hours));
    let with_hours: Vec<&StudentAbsences> =
        ordered.iter().filter(|a| a.summary.total_hours > 0).collect();

    if with_hours.is_empty() {
        let _ = writeln!(output, "No absences recorded.");
    } else {
        for entry in with_hours {
            let _ = writeln!(
                output,
                "- {}: {} hours missed, {} remaining",
                entry.student_name, entry.summary.total_hours, entry.summary.remaining_hours
            );
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attendance::AbsenceSummary;

    fn student(id: i64, name: &str) -> Student {
        Student {
            id,
            full_name: name.to_string(),
            group_name: "IS-21".to_string(),
        }
    }

    fn row(student_id: i64, subject_id: i64, total: f64) -> PerformanceRow {
        PerformanceRow {
            student_id,
            student_name: String::new(),
            subject_id,
            subject_name: String::new(),
            total_points: total,
            target_points: 21.0,
        }
    }

    #[test]
    fn standings_flag_risk_and_readiness() {
        let students = vec![student(1, "Kiara Patel"), student(2, "Avery Lee"), student(3, "Jules Moreno")];
        let rows = vec![row(1, 1, 21.0), row(1, 2, 30.0), row(2, 1, 14.0), row(2, 2, 21.0)];

        let result = standings(&students, &rows);
        assert_eq!(result.len(), 3);
        assert_eq!(result[0].student_name, "Avery Lee");

        let avery = &result[0];
        assert!(avery.at_risk);
        assert!(!avery.ready);
        // (66.67 + 100) / 2
        assert_eq!(avery.avg_progress, 83.3);

        let jules = &result[1];
        assert_eq!(jules.subject_count, 0);
        assert!(!jules.ready);
        assert!(!jules.at_risk);

        let kiara = &result[2];
        assert!(kiara.ready);
        assert_eq!(kiara.avg_progress, 100.0);
    }

    #[test]
    fn report_lists_counts_and_absences() {
        let students = vec![student(1, "Kiara Patel"), student(2, "Avery Lee")];
        let rows = vec![row(1, 1, 22.0), row(2, 1, 4.0)];
        let absences = vec![
            StudentAbsences {
                student_name: "Avery Lee".to_string(),
                summary: AbsenceSummary { total_hours: 6, remaining_hours: 14 },
            },
            StudentAbsences {
                student_name: "Kiara Patel".to_string(),
                summary: AbsenceSummary { total_hours: 0, remaining_hours: 20 },
            },
        ];
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();

        let report = build_report("IS-21", date, Parity::Even, &standings(&students, &rows), &absences);
        assert!(report.contains("Generated for IS-21 on 2026-03-02 (even week)"));
        assert!(report.contains("2 students, 1 at risk, 1 ready"));
        assert!(report.contains("| Avery Lee | 1 | 19.0% | at risk |"));
        assert!(report.contains("- Avery Lee: 6 hours missed, 14 remaining"));
        assert!(!report.contains("- Kiara Patel"));
    }

    #[test]
    fn empty_group_report() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let report = build_report("IS-22", date, Parity::Odd, &[], &[]);
        assert!(report.contains("No students in this group."));
        assert!(report.contains("No absences recorded."));
    }
}
