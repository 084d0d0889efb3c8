use async_trait::async_trait;
use tracing::warn;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    NewViolation, Student, StudentStats, StudentWithViolations, Violation, ViolationFilter,
    ViolationStats, ViolationStatus,
};

/// Owns violation records exclusively. Serves filtered queries and
/// on-demand aggregate counts.
#[async_trait]
pub trait ViolationStore: Send + Sync {
    /// Persist a new record with pending status and a store-assigned
    /// timestamp. When image bytes are supplied they are uploaded first;
    /// the record is only created after the upload succeeds.
    async fn add(&self, input: &NewViolation, image: Option<&[u8]>) -> Result<Uuid>;

    /// Violations descending by reported time. Equality filters are pushed
    /// to the backend; the date range is applied after retrieval.
    async fn query(&self, filter: &ViolationFilter) -> Result<Vec<Violation>>;

    async fn stats(&self) -> Result<ViolationStats>;

    /// Persist a status change. Only forward transitions are accepted.
    async fn update_status(&self, id: Uuid, status: ViolationStatus) -> Result<()>;
}

/// Owns student records exclusively. Depends on the violation store for
/// the violation-count projection, never the reverse.
#[async_trait]
pub trait StudentStore: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<StudentWithViolations>>;

    /// Lookup by store id or institutional number, whichever matches first.
    async fn get_by_id(&self, id: &str) -> Result<Option<Student>>;

    /// All students, ordered by name ascending.
    async fn list_all(&self) -> Result<Vec<Student>>;

    async fn stats(&self) -> Result<StudentStats>;
}

/// Write raw bytes under a generated key, get back a retrieval reference.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<String>;
}

/// Resolve the violation projection for each matched student. A failed
/// lookup degrades that student to a zero count instead of dropping them
/// or failing the whole search.
pub async fn attach_violations(
    violations: &dyn ViolationStore,
    students: Vec<Student>,
) -> Vec<StudentWithViolations> {
    let mut joined = Vec::with_capacity(students.len());

    for student in students {
        let filter = ViolationFilter {
            student_id: Some(student.nim.clone()),
            ..Default::default()
        };
        let (violation_count, last_violation) = match violations.query(&filter).await {
            Ok(found) => {
                let last = found.first().map(|v| v.reported_at);
                (found.len(), last)
            }
            Err(err) => {
                warn!(nim = %student.nim, error = %err, "violation lookup failed, returning zero count");
                (0, None)
            }
        };
        joined.push(StudentWithViolations {
            student,
            violation_count,
            last_violation,
        });
    }

    joined
}
