use std::collections::BTreeMap;

use chrono::{DateTime, Local, NaiveDate, Utc};

use crate::models::{
    Student, StudentStats, StudentStatus, Violation, ViolationFilter, ViolationStats,
    ViolationStatus,
};

/// Reduce the full violation set into dashboard counts. Recomputed on every
/// call; nothing is cached. The "today" bucket truncates timestamps to the
/// local calendar day.
pub fn violation_stats(violations: &[Violation], today: NaiveDate) -> ViolationStats {
    let mut by_type: BTreeMap<String, usize> = BTreeMap::new();
    let mut pending = 0;
    let mut resolved = 0;
    let mut today_count = 0;

    for violation in violations {
        match violation.status {
            ViolationStatus::Pending => pending += 1,
            ViolationStatus::Resolved => resolved += 1,
            ViolationStatus::Investigating => {}
        }
        if local_day(violation.reported_at) == today {
            today_count += 1;
        }
        *by_type.entry(violation.violation_type.clone()).or_insert(0) += 1;
    }

    ViolationStats {
        total: violations.len(),
        pending,
        resolved,
        today: today_count,
        by_type,
    }
}

pub fn student_stats(students: &[Student]) -> StudentStats {
    let mut by_program: BTreeMap<String, usize> = BTreeMap::new();
    let mut by_year: BTreeMap<i32, usize> = BTreeMap::new();

    for student in students {
        *by_program.entry(student.program.clone()).or_insert(0) += 1;
        *by_year.entry(student.enrollment_year).or_insert(0) += 1;
    }

    StudentStats {
        total: students.len(),
        active: students
            .iter()
            .filter(|s| s.status == StudentStatus::Active)
            .count(),
        by_program,
        by_year,
    }
}

/// Date-range filtering runs in memory over the equality-filtered result
/// set; the backing store only sees the equality predicates.
pub fn apply_date_range(violations: Vec<Violation>, filter: &ViolationFilter) -> Vec<Violation> {
    violations
        .into_iter()
        .filter(|v| filter.date_from.is_none_or(|from| v.reported_at >= from))
        .filter(|v| filter.date_to.is_none_or(|to| v.reported_at <= to))
        .collect()
}

/// Search predicate: case-insensitive substring on name and program,
/// plain substring on the institutional number.
pub fn student_matches(student: &Student, query: &str) -> bool {
    let query_lower = query.to_lowercase();
    student.name.to_lowercase().contains(&query_lower)
        || student.nim.contains(query)
        || student.program.to_lowercase().contains(&query_lower)
}

pub fn local_day(at: DateTime<Utc>) -> NaiveDate {
    at.with_timezone(&Local).date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use uuid::Uuid;

    fn sample_violation(status: ViolationStatus, violation_type: &str, days_ago: i64) -> Violation {
        Violation {
            id: Uuid::new_v4(),
            student_name: "Ahmad Rizki Pratama".to_string(),
            student_id: "210441100001".to_string(),
            violation_type: violation_type.to_string(),
            description: "observed by staff".to_string(),
            location: "Building A".to_string(),
            image_url: None,
            reported_by: "staff@campus.example".to_string(),
            reported_at: Utc::now() - Duration::days(days_ago),
            status,
        }
    }

    fn sample_student(name: &str, nim: &str, program: &str, year: i32) -> Student {
        Student {
            id: Uuid::new_v4(),
            name: name.to_string(),
            nim: nim.to_string(),
            program: program.to_string(),
            email: None,
            phone: None,
            address: None,
            enrollment_year: year,
            status: StudentStatus::Active,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn counts_fixed_three_violation_set() {
        let violations = vec![
            sample_violation(ViolationStatus::Pending, "Late to Class", 0),
            sample_violation(ViolationStatus::Resolved, "Smoking on Campus", 3),
            sample_violation(ViolationStatus::Investigating, "Late to Class", 5),
        ];

        let stats = violation_stats(&violations, local_day(Utc::now()));
        assert_eq!(stats.total, 3);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.resolved, 1);
        assert_eq!(stats.by_type.values().sum::<usize>(), 3);
        assert_eq!(stats.by_type["Late to Class"], 2);
        assert_eq!(stats.by_type["Smoking on Campus"], 1);
    }

    #[test]
    fn today_bucket_uses_local_day() {
        let violations = vec![
            sample_violation(ViolationStatus::Pending, "Late to Class", 0),
            sample_violation(ViolationStatus::Pending, "Late to Class", 2),
        ];

        let stats = violation_stats(&violations, local_day(Utc::now()));
        assert_eq!(stats.today, 1);
    }

    #[test]
    fn date_range_keeps_inclusive_bounds() {
        let recent = sample_violation(ViolationStatus::Pending, "Late to Class", 1);
        let old = sample_violation(ViolationStatus::Pending, "Late to Class", 20);
        let filter = ViolationFilter {
            date_from: Some(Utc::now() - Duration::days(7)),
            ..Default::default()
        };

        let kept = apply_date_range(vec![recent.clone(), old], &filter);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, recent.id);
    }

    #[test]
    fn search_matches_name_nim_and_program() {
        let student = sample_student(
            "Siti Nurhaliza",
            "210441100002",
            "Teknik Elektro",
            2021,
        );
        assert!(student_matches(&student, "siti"));
        assert!(student_matches(&student, "NURHALIZA"));
        assert!(student_matches(&student, "4411000"));
        assert!(student_matches(&student, "elektro"));
        assert!(!student_matches(&student, "informatika"));
    }

    #[test]
    fn student_stats_groups_by_program_and_year() {
        let mut students = vec![
            sample_student("Ahmad Rizki Pratama", "210441100001", "Teknik Informatika", 2021),
            sample_student("Siti Nurhaliza", "210441100002", "Teknik Elektro", 2021),
            sample_student("Budi Santoso", "220441100003", "Teknik Informatika", 2022),
        ];
        students[2].status = StudentStatus::Graduated;

        let stats = student_stats(&students);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.active, 2);
        assert_eq!(stats.by_program["Teknik Informatika"], 2);
        assert_eq!(stats.by_program["Teknik Elektro"], 1);
        assert_eq!(stats.by_year[&2021], 2);
        assert_eq!(stats.by_year[&2022], 1);
    }
}
