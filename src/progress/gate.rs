//! Access gating
//!
//! Answers "can this student open this unit" by consulting, in order:
//! the active enrollment, the persisted unlock flag (authoritative once
//! a record exists), and finally computed eligibility from sequence
//! order and explicit prerequisites. First-in-sequence units under an
//! accessible parent are unlocked lazily on their first access check;
//! every other unlock is persisted exclusively by the cascade.

use std::sync::Arc;

use tracing::debug;

use crate::clock::Clock;
use crate::config::ProgressConfig;
use crate::content::ContentCatalog;
use crate::enrollment::EnrollmentService;
use crate::error::ProgressError;
use crate::types::{StudentId, UnitId, UnitKind, UnitRef};

use super::store::SqliteProgressStore;

/// One unmet prerequisite, with enough context for a useful message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingPrerequisite {
    pub unit: UnitRef,
    pub title: String,
}

/// Outcome of a prerequisite check, suitable for showing the student
#[derive(Debug, Clone)]
pub struct PrerequisiteStatus {
    pub met: bool,
    pub missing: Vec<MissingPrerequisite>,
    pub message: String,
}

/// Prerequisite-aware access checks
pub struct AccessGate {
    catalog: Arc<ContentCatalog>,
    store: Arc<SqliteProgressStore>,
    enrollment: Arc<dyn EnrollmentService>,
    config: ProgressConfig,
    clock: Arc<dyn Clock>,
}

impl AccessGate {
    pub fn new(
        catalog: Arc<ContentCatalog>,
        store: Arc<SqliteProgressStore>,
        enrollment: Arc<dyn EnrollmentService>,
        config: ProgressConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            catalog,
            store,
            enrollment,
            config,
            clock,
        }
    }

    /// Whether the student may open the unit right now
    ///
    /// Unknown and inactive units are simply not accessible; neither is
    /// an error here.
    pub async fn can_access(
        &self,
        student: StudentId,
        unit: UnitId,
    ) -> Result<bool, ProgressError> {
        let Some(kind) = self.catalog.kind_of(unit) else {
            debug!(%student, %unit, "access check for unknown unit");
            return Ok(false);
        };
        let unit = UnitRef::new(kind, unit);
        if !self.catalog.is_active(unit) {
            return Ok(false);
        }

        match kind {
            UnitKind::Module => self.can_access_module(student, unit).await,
            UnitKind::Topic => self.can_access_topic(student, unit).await,
            UnitKind::Lesson => self.can_access_lesson(student, unit).await,
            // Resources and assignments are not individually gated;
            // they open with their parent
            UnitKind::Resource | UnitKind::Assignment => {
                let Some(parent) = self.catalog.parent_of(unit) else {
                    return Ok(false);
                };
                match parent.kind {
                    UnitKind::Topic => self.can_access_topic(student, parent).await,
                    _ => self.can_access_lesson(student, parent).await,
                }
            }
        }
    }

    async fn can_access_module(
        &self,
        student: StudentId,
        unit: UnitRef,
    ) -> Result<bool, ProgressError> {
        let Some(module) = self.catalog.module(unit.id) else {
            return Ok(false);
        };
        if !module.is_active {
            return Ok(false);
        }

        let enrolled = self
            .enrollment
            .active_enrollment(student, module.program)
            .await
            .map_err(ProgressError::Enrollment)?
            .is_some();
        if !enrolled {
            debug!(%student, unit = %unit, "access denied: no active enrollment");
            return Ok(false);
        }

        self.persisted_or_computed(student, unit, true).await
    }

    async fn can_access_topic(
        &self,
        student: StudentId,
        unit: UnitRef,
    ) -> Result<bool, ProgressError> {
        let Some(topic) = self.catalog.topic(unit.id) else {
            return Ok(false);
        };
        if !topic.is_active {
            return Ok(false);
        }

        let module = UnitRef::new(UnitKind::Module, topic.module);
        let parent_accessible = self.can_access_module(student, module).await?;
        self.persisted_or_computed(student, unit, parent_accessible)
            .await
    }

    async fn can_access_lesson(
        &self,
        student: StudentId,
        unit: UnitRef,
    ) -> Result<bool, ProgressError> {
        let Some(lesson) = self.catalog.lesson(unit.id) else {
            return Ok(false);
        };
        if !lesson.is_active {
            return Ok(false);
        }

        let topic = UnitRef::new(UnitKind::Topic, lesson.topic);
        let parent_accessible = self.can_access_topic(student, topic).await?;
        self.persisted_or_computed(student, unit, parent_accessible)
            .await
    }

    /// Two-tier check shared by all granularities: behind an accessible
    /// parent, a persisted record's unlock flag is authoritative; with
    /// no record, first-in-sequence units self-unlock and anything else
    /// falls back to computed eligibility without persisting.
    async fn persisted_or_computed(
        &self,
        student: StudentId,
        unit: UnitRef,
        parent_accessible: bool,
    ) -> Result<bool, ProgressError> {
        if !parent_accessible {
            return Ok(false);
        }

        if let Some(record) = self.store.get(student, unit.id).await? {
            return Ok(record.is_unlocked);
        }

        if self.catalog.is_first_in_sequence(unit) {
            self.store
                .mark_unlocked(student, unit.id, unit.kind, self.clock.now())
                .await?;
            debug!(%student, unit = %unit, "first unit auto-unlocked");
            return Ok(true);
        }

        prerequisites_satisfied(&self.catalog, &self.store, &self.config, student, unit).await
    }

    /// Prerequisite report with the concrete list of missing units
    pub async fn prerequisite_status(
        &self,
        student: StudentId,
        unit: UnitId,
    ) -> Result<PrerequisiteStatus, ProgressError> {
        let kind = self
            .catalog
            .kind_of(unit)
            .ok_or(ProgressError::UnitNotFound(unit))?;
        let unit = UnitRef::new(kind, unit);

        if self.catalog.is_first_in_sequence(unit) && self.catalog.prerequisites_of(unit).is_empty()
        {
            return Ok(PrerequisiteStatus {
                met: true,
                missing: Vec::new(),
                message: "First in sequence - no prerequisites".to_string(),
            });
        }

        let mut missing = Vec::new();

        if let Some(prev) = self.catalog.preceding_sibling(unit) {
            let done = self
                .store
                .get(student, prev.id)
                .await?
                .is_some_and(|r| r.is_completed);
            if !done {
                missing.push(MissingPrerequisite {
                    unit: prev,
                    title: self.catalog.title_of(prev).unwrap_or_default().to_string(),
                });
            }
        }

        for prereq in self.catalog.prerequisites_of(unit) {
            let Some(kind) = self.catalog.kind_of(*prereq) else {
                continue;
            };
            let prereq = UnitRef::new(kind, *prereq);
            let threshold = self.catalog.completion_threshold(prereq, &self.config);
            let done = self
                .store
                .get(student, prereq.id)
                .await?
                .is_some_and(|r| r.is_completed && r.completion_percentage >= threshold);
            if !done && !missing.iter().any(|m| m.unit == prereq) {
                missing.push(MissingPrerequisite {
                    unit: prereq,
                    title: self
                        .catalog
                        .title_of(prereq)
                        .unwrap_or_default()
                        .to_string(),
                });
            }
        }

        let met = missing.is_empty();
        let message = if met {
            "All prerequisites completed".to_string()
        } else {
            format!("Complete {} prerequisite unit(s)", missing.len())
        };
        Ok(PrerequisiteStatus {
            met,
            missing,
            message,
        })
    }
}

/// Whether a unit's gating conditions hold: the immediately preceding
/// active sibling (if any) is completed, and every explicit
/// prerequisite is completed at its own threshold.
///
/// Shared by the gate (computed fallback) and the cascade (eligibility
/// re-check on unlock).
pub(crate) async fn prerequisites_satisfied(
    catalog: &ContentCatalog,
    store: &SqliteProgressStore,
    config: &ProgressConfig,
    student: StudentId,
    unit: UnitRef,
) -> Result<bool, ProgressError> {
    if let Some(prev) = catalog.preceding_sibling(unit) {
        let done = store
            .get(student, prev.id)
            .await?
            .is_some_and(|r| r.is_completed);
        if !done {
            return Ok(false);
        }
    }

    for prereq in catalog.prerequisites_of(unit) {
        let Some(kind) = catalog.kind_of(*prereq) else {
            return Ok(false);
        };
        let prereq_ref = UnitRef::new(kind, *prereq);
        let threshold = catalog.completion_threshold(prereq_ref, config);
        let done = store
            .get(student, *prereq)
            .await?
            .is_some_and(|r| r.is_completed && r.completion_percentage >= threshold);
        if !done {
            return Ok(false);
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::content::{CourseModule, Lesson, Topic};
    use crate::enrollment::{EnrollmentStatus, InMemoryEnrollmentService, MockEnrollmentService};
    use crate::types::ProgramId;
    use chrono::{TimeZone, Utc};

    fn now() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap()
    }

    struct World {
        gate: AccessGate,
        store: Arc<SqliteProgressStore>,
        enrollment: Arc<InMemoryEnrollmentService>,
        student: StudentId,
        program: ProgramId,
        m1: UnitId,
        t1: UnitId,
        t2: UnitId,
        l1: UnitId,
        l2: UnitId,
    }

    /// Module with two topics (T2 requires T1), two lessons in T1
    fn world() -> World {
        let program = ProgramId::new();
        let m1 = CourseModule::new(program, "Foundations", "GCA-M101", 1);
        let t1 = Topic::new(m1.id, "Orientation", 1);
        let t2 = Topic::new(m1.id, "Practice", 2).with_prerequisites(vec![t1.id]);
        let l1 = Lesson::new(t1.id, "Welcome", 1);
        let l2 = Lesson::new(t1.id, "Going deeper", 2);
        let ids = (m1.id, t1.id, t2.id, l1.id, l2.id);

        let catalog = Arc::new(
            ContentCatalog::builder()
                .module(m1)
                .topic(t1)
                .topic(t2)
                .lesson(l1)
                .lesson(l2)
                .build()
                .unwrap(),
        );
        let store = Arc::new(SqliteProgressStore::in_memory().unwrap());
        let enrollment = Arc::new(InMemoryEnrollmentService::new());
        let student = StudentId::new();
        enrollment.enroll(student, program, EnrollmentStatus::Active, now());

        let gate = AccessGate::new(
            catalog,
            store.clone(),
            enrollment.clone(),
            ProgressConfig::default(),
            Arc::new(ManualClock::new(now())),
        );

        World {
            gate,
            store,
            enrollment,
            student,
            program,
            m1: ids.0,
            t1: ids.1,
            t2: ids.2,
            l1: ids.3,
            l2: ids.4,
        }
    }

    #[tokio::test]
    async fn test_first_chain_is_accessible_without_events() {
        let w = world();
        assert!(w.gate.can_access(w.student, w.m1).await.unwrap());
        assert!(w.gate.can_access(w.student, w.t1).await.unwrap());
        assert!(w.gate.can_access(w.student, w.l1).await.unwrap());
        // Second lesson stays locked until the first completes
        assert!(!w.gate.can_access(w.student, w.l2).await.unwrap());
        // And the lazy unlocks were persisted
        assert!(w.store.get(w.student, w.m1).await.unwrap().unwrap().is_unlocked);
        assert!(w.store.get(w.student, w.l1).await.unwrap().unwrap().is_unlocked);
    }

    #[tokio::test]
    async fn test_no_enrollment_denies_everything() {
        let w = world();
        let stranger = StudentId::new();
        assert!(!w.gate.can_access(stranger, w.m1).await.unwrap());
        assert!(!w.gate.can_access(stranger, w.l1).await.unwrap());
    }

    #[tokio::test]
    async fn test_suspension_denies_but_keeps_records() {
        let w = world();
        assert!(w.gate.can_access(w.student, w.t1).await.unwrap());

        w.enrollment
            .set_status(w.student, w.program, EnrollmentStatus::Suspended);
        assert!(!w.gate.can_access(w.student, w.t1).await.unwrap());
        // The record survives the suspension
        assert!(w.store.get(w.student, w.t1).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_persisted_flag_is_authoritative() {
        let w = world();
        // Unlock T2 directly, skipping its prerequisites
        w.store
            .mark_unlocked(w.student, w.t2, UnitKind::Topic, now())
            .await
            .unwrap();
        assert!(w.gate.can_access(w.student, w.t2).await.unwrap());
    }

    #[tokio::test]
    async fn test_computed_eligibility_without_persisting() {
        let w = world();
        // Complete T1 by hand; T2 has no record yet
        w.store
            .apply_evaluation(w.student, w.t1, UnitKind::Topic, 100.0, true, now())
            .await
            .unwrap();

        assert!(w.gate.can_access(w.student, w.t2).await.unwrap());
        // Only the cascade persists non-first unlocks
        assert!(w.store.get(w.student, w.t2).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_unit_is_not_accessible() {
        let w = world();
        assert!(!w.gate.can_access(w.student, UnitId::new()).await.unwrap());
    }

    #[tokio::test]
    async fn test_prerequisite_status_lists_missing() {
        let w = world();
        let status = w.gate.prerequisite_status(w.student, w.t2).await.unwrap();
        assert!(!status.met);
        assert_eq!(status.missing.len(), 1);
        assert_eq!(status.missing[0].unit.id, w.t1);
        assert_eq!(status.missing[0].title, "Orientation");

        w.store
            .apply_evaluation(w.student, w.t1, UnitKind::Topic, 100.0, true, now())
            .await
            .unwrap();
        let status = w.gate.prerequisite_status(w.student, w.t2).await.unwrap();
        assert!(status.met);
        assert!(status.missing.is_empty());
    }

    #[tokio::test]
    async fn test_enrollment_service_failure_propagates() {
        let program = ProgramId::new();
        let m1 = CourseModule::new(program, "M", "GCA-M1", 1);
        let m1_id = m1.id;
        let catalog = Arc::new(ContentCatalog::builder().module(m1).build().unwrap());

        let mut mock = MockEnrollmentService::new();
        mock.expect_active_enrollment()
            .returning(|_, _| Err(anyhow::anyhow!("enrollment backend down")));

        let gate = AccessGate::new(
            catalog,
            Arc::new(SqliteProgressStore::in_memory().unwrap()),
            Arc::new(mock),
            ProgressConfig::default(),
            Arc::new(ManualClock::new(now())),
        );

        let err = gate.can_access(StudentId::new(), m1_id).await.unwrap_err();
        assert!(matches!(err, ProgressError::Enrollment(_)));
    }
}
