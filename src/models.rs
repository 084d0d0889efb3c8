use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;

/// Fixed catalog of violation categories offered by the submission form.
/// Freeform entries outside this list are stored as given.
pub const VIOLATION_TYPES: &[&str] = &[
    "Late to Class",
    "Uniform Violation",
    "Smoking on Campus",
    "Skipped Practicum",
    "Code of Conduct Violation",
    "Other",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StudentStatus {
    Active,
    Inactive,
    Graduated,
}

impl StudentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Graduated => "graduated",
        }
    }
}

impl fmt::Display for StudentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StudentStatus {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            "graduated" => Ok(Self::Graduated),
            other => Err(Error::validation(format!(
                "unknown student status '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViolationStatus {
    Pending,
    Investigating,
    Resolved,
}

impl ViolationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Investigating => "investigating",
            Self::Resolved => "resolved",
        }
    }

    /// Status moves forward only: pending may go to investigating or
    /// straight to resolved, investigating may go to resolved.
    pub fn can_transition_to(self, next: ViolationStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Investigating)
                | (Self::Pending, Self::Resolved)
                | (Self::Investigating, Self::Resolved)
        )
    }
}

impl fmt::Display for ViolationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ViolationStatus {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(Self::Pending),
            "investigating" => Ok(Self::Investigating),
            "resolved" => Ok(Self::Resolved),
            other => Err(Error::validation(format!(
                "unknown violation status '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Student {
    pub id: Uuid,
    pub name: String,
    /// Institutional student number, unique per student across the store.
    pub nim: String,
    pub program: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub enrollment_year: i32,
    pub status: StudentStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    pub id: Uuid,
    pub student_name: String,
    /// References Student.nim. A logical join only, not a foreign key.
    pub student_id: String,
    pub violation_type: String,
    pub description: String,
    pub location: String,
    pub image_url: Option<String>,
    pub reported_by: String,
    pub reported_at: DateTime<Utc>,
    pub status: ViolationStatus,
}

/// Submission input. Id, timestamp, and status are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewViolation {
    pub student_name: String,
    pub student_id: String,
    pub violation_type: String,
    pub description: String,
    pub location: String,
    pub reported_by: String,
}

impl NewViolation {
    /// Required-field checks, run before any network call.
    pub fn validate(&self) -> crate::error::Result<()> {
        let required = [
            ("student name", &self.student_name),
            ("student id", &self.student_id),
            ("violation type", &self.violation_type),
            ("description", &self.description),
            ("location", &self.location),
            ("reporter", &self.reported_by),
        ];
        for (label, value) in required {
            if value.trim().is_empty() {
                return Err(Error::validation(format!("{label} is required")));
            }
        }
        Ok(())
    }
}

/// Read-only projection joining a student to their violation history.
#[derive(Debug, Clone, Serialize)]
pub struct StudentWithViolations {
    #[serde(flatten)]
    pub student: Student,
    pub violation_count: usize,
    pub last_violation: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct ViolationFilter {
    pub student_id: Option<String>,
    pub status: Option<ViolationStatus>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViolationStats {
    pub total: usize,
    pub pending: usize,
    pub resolved: usize,
    pub today: usize,
    pub by_type: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StudentStats {
    pub total: usize,
    pub active: usize,
    pub by_program: BTreeMap<String, usize>,
    pub by_year: BTreeMap<i32, usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_transitions_move_forward_only() {
        use ViolationStatus::*;
        assert!(Pending.can_transition_to(Investigating));
        assert!(Pending.can_transition_to(Resolved));
        assert!(Investigating.can_transition_to(Resolved));

        assert!(!Resolved.can_transition_to(Pending));
        assert!(!Resolved.can_transition_to(Investigating));
        assert!(!Investigating.can_transition_to(Pending));
        assert!(!Pending.can_transition_to(Pending));
    }

    #[test]
    fn statuses_round_trip_through_text() {
        for status in ["pending", "investigating", "resolved"] {
            let parsed: ViolationStatus = status.parse().unwrap();
            assert_eq!(parsed.as_str(), status);
        }
        assert!("archived".parse::<ViolationStatus>().is_err());
    }

    #[test]
    fn submission_requires_every_field() {
        let input = NewViolation {
            student_name: "Ahmad Rizki Pratama".to_string(),
            student_id: "210441100001".to_string(),
            violation_type: "Late to Class".to_string(),
            description: "Arrived 30 minutes late".to_string(),
            location: "Building A".to_string(),
            reported_by: "staff@campus.example".to_string(),
        };
        assert!(input.validate().is_ok());

        let mut missing = input.clone();
        missing.location = "  ".to_string();
        let err = missing.validate().unwrap_err();
        assert!(err.to_string().contains("location"));
    }
}
