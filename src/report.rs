use std::fmt::Write;

use chrono::NaiveDate;

use crate::models::{StudentStats, Violation, ViolationStats};

pub fn build_report(
    generated_on: NaiveDate,
    violations: &[Violation],
    violation_stats: &ViolationStats,
    student_stats: &StudentStats,
) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Student Violation Report");
    let _ = writeln!(output, "Generated on {generated_on}");
    let _ = writeln!(output);
    let _ = writeln!(output, "## Summary");
    let _ = writeln!(
        output,
        "- {} violations on record ({} pending, {} resolved, {} reported today)",
        violation_stats.total,
        violation_stats.pending,
        violation_stats.resolved,
        violation_stats.today
    );
    let _ = writeln!(
        output,
        "- {} students tracked ({} active)",
        student_stats.total, student_stats.active
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Violation Mix");

    if violation_stats.by_type.is_empty() {
        let _ = writeln!(output, "No violations recorded.");
    } else {
        let mut by_type: Vec<(&String, &usize)> = violation_stats.by_type.iter().collect();
        by_type.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        for (violation_type, count) in by_type {
            let _ = writeln!(output, "- {violation_type}: {count}");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Violations");

    if violations.is_empty() {
        let _ = writeln!(output, "No violations recorded.");
    } else {
        for violation in violations.iter().take(5) {
            let _ = writeln!(
                output,
                "- {} ({}): {} at {} on {}: {}",
                violation.student_name,
                violation.student_id,
                violation.violation_type,
                violation.location,
                violation.reported_at.date_naive(),
                violation.description
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Students by Program");

    if student_stats.by_program.is_empty() {
        let _ = writeln!(output, "No students on record.");
    } else {
        for (program, count) in &student_stats.by_program {
            let _ = writeln!(output, "- {program}: {count} students");
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Student, StudentStatus, ViolationStatus};
    use crate::stats;
    use chrono::Utc;
    use uuid::Uuid;

    fn fixture() -> (Vec<Violation>, Vec<Student>) {
        let violations = vec![Violation {
            id: Uuid::new_v4(),
            student_name: "Ahmad Rizki Pratama".to_string(),
            student_id: "210441100001".to_string(),
            violation_type: "Late to Class".to_string(),
            description: "Arrived 40 minutes late".to_string(),
            location: "Building A".to_string(),
            image_url: None,
            reported_by: "staff@campus.example".to_string(),
            reported_at: Utc::now(),
            status: ViolationStatus::Pending,
        }];
        let students = vec![Student {
            id: Uuid::new_v4(),
            name: "Ahmad Rizki Pratama".to_string(),
            nim: "210441100001".to_string(),
            program: "Teknik Informatika".to_string(),
            email: None,
            phone: None,
            address: None,
            enrollment_year: 2021,
            status: StudentStatus::Active,
            created_at: Utc::now(),
        }];
        (violations, students)
    }

    #[test]
    fn report_names_counts_and_recent_entries() {
        let (violations, students) = fixture();
        let vstats = stats::violation_stats(&violations, stats::local_day(Utc::now()));
        let sstats = stats::student_stats(&students);

        let report = build_report(stats::local_day(Utc::now()), &violations, &vstats, &sstats);
        assert!(report.contains("# Student Violation Report"));
        assert!(report.contains("1 violations on record (1 pending, 0 resolved, 1 reported today)"));
        assert!(report.contains("- Late to Class: 1"));
        assert!(report.contains("Ahmad Rizki Pratama (210441100001)"));
        assert!(report.contains("- Teknik Informatika: 1 students"));
    }

    #[test]
    fn empty_stores_render_placeholders() {
        let vstats = stats::violation_stats(&[], stats::local_day(Utc::now()));
        let sstats = stats::student_stats(&[]);
        let report = build_report(stats::local_day(Utc::now()), &[], &vstats, &sstats);
        assert!(report.contains("No violations recorded."));
        assert!(report.contains("No students on record."));
    }
}
