use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::blob;
use crate::error::{Error, Result};
use crate::models::{
    NewViolation, Student, StudentStats, StudentWithViolations, Violation, ViolationFilter,
    ViolationStats, ViolationStatus,
};
use crate::stats;
use crate::store::{attach_violations, BlobStore, StudentStore, ViolationStore};

/// In-memory violation store. Backs tests and offline runs with the same
/// contract as the Postgres store.
pub struct MemoryViolationStore {
    violations: Mutex<Vec<Violation>>,
    blobs: Arc<dyn BlobStore>,
}

impl MemoryViolationStore {
    pub fn new(blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            violations: Mutex::new(Vec::new()),
            blobs,
        }
    }

    /// Insert a fully-formed record, bypassing submission semantics.
    pub fn insert(&self, violation: Violation) {
        self.violations.lock().unwrap().push(violation);
    }
}

#[async_trait]
impl ViolationStore for MemoryViolationStore {
    async fn add(&self, input: &NewViolation, image: Option<&[u8]>) -> Result<Uuid> {
        input.validate()?;

        let image_url = match image {
            Some(bytes) => Some(self.blobs.put(&blob::image_key(), bytes).await?),
            None => None,
        };

        let id = Uuid::new_v4();
        self.violations.lock().unwrap().push(Violation {
            id,
            student_name: input.student_name.clone(),
            student_id: input.student_id.clone(),
            violation_type: input.violation_type.clone(),
            description: input.description.clone(),
            location: input.location.clone(),
            image_url,
            reported_by: input.reported_by.clone(),
            reported_at: Utc::now(),
            status: ViolationStatus::Pending,
        });
        Ok(id)
    }

    async fn query(&self, filter: &ViolationFilter) -> Result<Vec<Violation>> {
        let mut found: Vec<Violation> = self
            .violations
            .lock()
            .unwrap()
            .iter()
            .filter(|v| {
                filter
                    .student_id
                    .as_ref()
                    .is_none_or(|id| &v.student_id == id)
            })
            .filter(|v| filter.status.is_none_or(|s| v.status == s))
            .cloned()
            .collect();

        found.sort_by(|a, b| b.reported_at.cmp(&a.reported_at));
        Ok(stats::apply_date_range(found, filter))
    }

    async fn stats(&self) -> Result<ViolationStats> {
        let all = self.query(&ViolationFilter::default()).await?;
        Ok(stats::violation_stats(&all, stats::local_day(Utc::now())))
    }

    async fn update_status(&self, id: Uuid, status: ViolationStatus) -> Result<()> {
        let mut violations = self.violations.lock().unwrap();
        let violation = violations
            .iter_mut()
            .find(|v| v.id == id)
            .ok_or_else(|| Error::query(format!("violation {id} not found")))?;

        if !violation.status.can_transition_to(status) {
            return Err(Error::validation(format!(
                "cannot move violation from {} to {}",
                violation.status, status
            )));
        }
        violation.status = status;
        Ok(())
    }
}

/// In-memory student store. Resolves the violation projection through the
/// injected violation store, mirroring the one-directional dependency of
/// the real backend.
pub struct MemoryStudentStore {
    students: Mutex<Vec<Student>>,
    violations: Arc<dyn ViolationStore>,
}

impl MemoryStudentStore {
    pub fn new(violations: Arc<dyn ViolationStore>) -> Self {
        Self {
            students: Mutex::new(Vec::new()),
            violations,
        }
    }

    pub fn insert(&self, student: Student) {
        self.students.lock().unwrap().push(student);
    }
}

#[async_trait]
impl StudentStore for MemoryStudentStore {
    async fn search(&self, query: &str) -> Result<Vec<StudentWithViolations>> {
        let matched: Vec<Student> = self
            .students
            .lock()
            .unwrap()
            .iter()
            .filter(|s| stats::student_matches(s, query))
            .cloned()
            .collect();

        Ok(attach_violations(self.violations.as_ref(), matched).await)
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Student>> {
        Ok(self
            .students
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.id.to_string() == id || s.nim == id)
            .cloned())
    }

    async fn list_all(&self) -> Result<Vec<Student>> {
        let mut students = self.students.lock().unwrap().clone();
        students.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(students)
    }

    async fn stats(&self) -> Result<StudentStats> {
        let students = self.list_all().await?;
        Ok(stats::student_stats(&students))
    }
}
