//! Enrollment input seam
//!
//! Enrollments are owned by the external student-management system; the
//! engine only ever reads them. Only an `Active` enrollment lets a
//! student through the access gate — progress records survive a status
//! change, but further access is suspended with them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

use crate::types::{ProgramId, StudentId};

/// Lifecycle status of an enrollment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnrollmentStatus {
    Pending,
    Active,
    Completed,
    Suspended,
    Withdrawn,
}

impl std::fmt::Display for EnrollmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnrollmentStatus::Pending => write!(f, "pending"),
            EnrollmentStatus::Active => write!(f, "active"),
            EnrollmentStatus::Completed => write!(f, "completed"),
            EnrollmentStatus::Suspended => write!(f, "suspended"),
            EnrollmentStatus::Withdrawn => write!(f, "withdrawn"),
        }
    }
}

/// A student's binding to a program, as reported by the student system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Enrollment {
    pub student: StudentId,
    pub program: ProgramId,
    pub status: EnrollmentStatus,
    pub enrolled_at: DateTime<Utc>,
}

/// Read-only view onto the external enrollment system
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EnrollmentService: Send + Sync {
    /// The student's `Active` enrollment in the program, if any
    async fn active_enrollment(
        &self,
        student: StudentId,
        program: ProgramId,
    ) -> anyhow::Result<Option<Enrollment>>;
}

/// In-process enrollment table for tests and embedding hosts
#[derive(Debug, Default)]
pub struct InMemoryEnrollmentService {
    enrollments: RwLock<HashMap<(StudentId, ProgramId), Enrollment>>,
}

impl InMemoryEnrollmentService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace an enrollment
    pub fn enroll(
        &self,
        student: StudentId,
        program: ProgramId,
        status: EnrollmentStatus,
        enrolled_at: DateTime<Utc>,
    ) {
        let mut enrollments = self.enrollments.write().unwrap();
        enrollments.insert(
            (student, program),
            Enrollment {
                student,
                program,
                status,
                enrolled_at,
            },
        );
    }

    /// Change an existing enrollment's status; no-op if absent
    pub fn set_status(&self, student: StudentId, program: ProgramId, status: EnrollmentStatus) {
        let mut enrollments = self.enrollments.write().unwrap();
        if let Some(enrollment) = enrollments.get_mut(&(student, program)) {
            enrollment.status = status;
        }
    }
}

#[async_trait]
impl EnrollmentService for InMemoryEnrollmentService {
    async fn active_enrollment(
        &self,
        student: StudentId,
        program: ProgramId,
    ) -> anyhow::Result<Option<Enrollment>> {
        let enrollments = self.enrollments.read().unwrap();
        Ok(enrollments
            .get(&(student, program))
            .filter(|e| e.status == EnrollmentStatus::Active)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_only_active_enrollment_is_returned() {
        let service = InMemoryEnrollmentService::new();
        let student = StudentId::new();
        let program = ProgramId::new();

        service.enroll(student, program, EnrollmentStatus::Pending, Utc::now());
        assert!(service
            .active_enrollment(student, program)
            .await
            .unwrap()
            .is_none());

        service.set_status(student, program, EnrollmentStatus::Active);
        assert!(service
            .active_enrollment(student, program)
            .await
            .unwrap()
            .is_some());

        service.set_status(student, program, EnrollmentStatus::Suspended);
        assert!(service
            .active_enrollment(student, program)
            .await
            .unwrap()
            .is_none());
    }
}
