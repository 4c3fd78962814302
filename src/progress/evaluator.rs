//! Completion evaluation
//!
//! Computes a unit's completion percentage from its children's recorded
//! progress and graded submissions, persists the fresh measurement, and
//! reports the one-way edge into the completed state so the cascade can
//! react exactly once per transition.

use std::sync::Arc;

use tracing::debug;

use crate::clock::Clock;
use crate::config::ProgressConfig;
use crate::content::ContentCatalog;
use crate::error::ProgressError;
use crate::types::{StudentId, UnitKind, UnitRef};

use super::store::SqliteProgressStore;

/// Result of re-evaluating one unit
#[derive(Debug, Clone, Copy)]
pub struct Evaluation {
    pub unit: UnitRef,
    pub percentage: f64,
    pub is_completed: bool,
    /// True only when this evaluation performed the transition into
    /// the completed state
    pub freshly_completed: bool,
}

/// Recomputes completion percentages bottom-up from recorded progress
#[derive(Clone)]
pub struct CompletionEvaluator {
    catalog: Arc<ContentCatalog>,
    store: Arc<SqliteProgressStore>,
    config: ProgressConfig,
    clock: Arc<dyn Clock>,
}

impl CompletionEvaluator {
    pub fn new(
        catalog: Arc<ContentCatalog>,
        store: Arc<SqliteProgressStore>,
        config: ProgressConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            catalog,
            store,
            config,
            clock,
        }
    }

    /// Recompute and persist a unit's completion state
    ///
    /// Lessons, topics and modules store the fresh measurement and may
    /// cross their threshold; resources and assignments are read back
    /// without writes (their state is set directly by events).
    pub async fn evaluate(
        &self,
        student: StudentId,
        unit: UnitRef,
    ) -> Result<Evaluation, ProgressError> {
        let percentage = self.percentage(student, unit).await?;
        let threshold = self.catalog.completion_threshold(unit, &self.config);
        let meets_threshold = percentage >= threshold;

        let freshly_completed = match unit.kind {
            UnitKind::Lesson | UnitKind::Topic | UnitKind::Module => {
                self.store
                    .apply_evaluation(
                        student,
                        unit.id,
                        unit.kind,
                        percentage,
                        meets_threshold,
                        self.clock.now(),
                    )
                    .await?
            }
            UnitKind::Resource | UnitKind::Assignment => false,
        };

        debug!(
            %student,
            unit = %unit,
            percentage,
            completed = meets_threshold,
            fresh = freshly_completed,
            "unit evaluated"
        );

        Ok(Evaluation {
            unit,
            percentage,
            is_completed: meets_threshold,
            freshly_completed,
        })
    }

    /// Pure percentage computation, no writes; usable for display
    pub async fn percentage(
        &self,
        student: StudentId,
        unit: UnitRef,
    ) -> Result<f64, ProgressError> {
        match unit.kind {
            UnitKind::Lesson => self.lesson_percentage(student, unit).await,
            UnitKind::Topic => self.topic_percentage(student, unit).await,
            UnitKind::Module => self.module_percentage(student, unit).await,
            UnitKind::Resource => {
                self.catalog
                    .resource(unit.id)
                    .ok_or(ProgressError::UnitNotFound(unit.id))?;
                Ok(self
                    .store
                    .get(student, unit.id)
                    .await?
                    .map(|r| r.completion_percentage)
                    .unwrap_or(0.0))
            }
            UnitKind::Assignment => {
                self.catalog
                    .assignment(unit.id)
                    .ok_or(ProgressError::UnitNotFound(unit.id))?;
                let passing = self
                    .store
                    .has_passing_submission(
                        student,
                        unit.id,
                        self.config.passing_grade_percentage,
                    )
                    .await?;
                Ok(if passing { 100.0 } else { 0.0 })
            }
        }
    }

    /// Lesson percentage: completed required resources plus passed
    /// required assignments over the total required items. A lesson
    /// with nothing required is complete by definition.
    async fn lesson_percentage(
        &self,
        student: StudentId,
        unit: UnitRef,
    ) -> Result<f64, ProgressError> {
        self.catalog
            .lesson(unit.id)
            .ok_or(ProgressError::UnitNotFound(unit.id))?;

        let resources = self.catalog.required_resources(unit.id);
        let assignments = self.catalog.required_lesson_assignments(unit.id);
        let total = resources.len() + assignments.len();
        if total == 0 {
            return Ok(100.0);
        }

        let mut completed = 0usize;
        for resource in resources {
            let done = self
                .store
                .get(student, resource.id)
                .await?
                .is_some_and(|r| r.is_completed);
            if done {
                completed += 1;
            }
        }
        for assignment in assignments {
            if self
                .store
                .has_passing_submission(
                    student,
                    assignment.id,
                    self.config.passing_grade_percentage,
                )
                .await?
            {
                completed += 1;
            }
        }

        Ok((completed as f64 / total as f64) * 100.0)
    }

    /// Topic percentage: share of completed lessons, capped below 100
    /// while any required assignment (on the topic or its lessons) still
    /// lacks a passing submission
    async fn topic_percentage(
        &self,
        student: StudentId,
        unit: UnitRef,
    ) -> Result<f64, ProgressError> {
        self.catalog
            .topic(unit.id)
            .ok_or(ProgressError::UnitNotFound(unit.id))?;

        let lessons = self.catalog.active_lessons(unit.id);
        if lessons.is_empty() {
            return Ok(0.0);
        }

        let mut completed = 0usize;
        for lesson in &lessons {
            let done = self
                .store
                .get(student, lesson.id)
                .await?
                .is_some_and(|r| r.is_completed);
            if done {
                completed += 1;
            }
        }
        let base = (completed as f64 / lessons.len() as f64) * 100.0;

        let gate = self.catalog.topic_gate_assignments(unit.id);
        if !gate.is_empty() {
            for assignment in gate {
                let passed = self
                    .store
                    .has_passing_submission(
                        student,
                        assignment.id,
                        self.config.passing_grade_percentage,
                    )
                    .await?;
                if !passed {
                    return Ok(base.min(self.config.topic_assignment_cap));
                }
            }
        }
        Ok(base)
    }

    /// Module percentage: mean of active topic percentages, credit
    /// weighted when every active topic declares a credit weight
    async fn module_percentage(
        &self,
        student: StudentId,
        unit: UnitRef,
    ) -> Result<f64, ProgressError> {
        self.catalog
            .module(unit.id)
            .ok_or(ProgressError::UnitNotFound(unit.id))?;

        let topics = self.catalog.active_topics(unit.id);
        if topics.is_empty() {
            return Ok(0.0);
        }

        let mut percentages = Vec::with_capacity(topics.len());
        for topic in &topics {
            let pct = self
                .topic_percentage(student, UnitRef::new(UnitKind::Topic, topic.id))
                .await?;
            percentages.push(pct);
        }

        let weighted = topics.iter().all(|t| t.credit_weight.is_some());
        if weighted {
            let total: u32 = topics.iter().filter_map(|t| t.credit_weight).sum();
            if total > 0 {
                let sum: f64 = topics
                    .iter()
                    .zip(&percentages)
                    .map(|(t, pct)| pct * f64::from(t.credit_weight.unwrap_or(0)))
                    .sum();
                return Ok(sum / f64::from(total));
            }
        }

        Ok(percentages.iter().sum::<f64>() / percentages.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::content::{Assignment, AssignmentParent, CourseModule, Lesson, ResourceItem, ResourceKind, Topic};
    use crate::types::ProgramId;
    use chrono::{TimeZone, Utc};

    struct Fixture {
        evaluator: CompletionEvaluator,
        store: Arc<SqliteProgressStore>,
        student: StudentId,
        lesson: UnitRef,
        topic: UnitRef,
        resources: Vec<UnitRef>,
        assignment: UnitRef,
    }

    /// One module, one topic, one lesson with two required resources and
    /// one required lesson assignment
    fn fixture() -> Fixture {
        let program = ProgramId::new();
        let module = CourseModule::new(program, "Foundations", "GCA-M101", 1);
        let topic = Topic::new(module.id, "Orientation", 1);
        let lesson = Lesson::new(topic.id, "Welcome", 1);
        let r1 = ResourceItem::new(lesson.id, "Intro video", ResourceKind::Video, 1);
        let r2 = ResourceItem::new(lesson.id, "Handbook", ResourceKind::Pdf, 2);
        let assignment = Assignment::new(AssignmentParent::Lesson(lesson.id), "Reflection");

        let refs = (
            UnitRef::new(UnitKind::Topic, topic.id),
            UnitRef::new(UnitKind::Lesson, lesson.id),
            vec![
                UnitRef::new(UnitKind::Resource, r1.id),
                UnitRef::new(UnitKind::Resource, r2.id),
            ],
            UnitRef::new(UnitKind::Assignment, assignment.id),
        );

        let catalog = Arc::new(
            ContentCatalog::builder()
                .module(module)
                .topic(topic)
                .lesson(lesson)
                .resource(r1)
                .resource(r2)
                .assignment(assignment)
                .build()
                .unwrap(),
        );
        let store = Arc::new(SqliteProgressStore::in_memory().unwrap());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap(),
        ));
        let evaluator = CompletionEvaluator::new(
            catalog,
            store.clone(),
            ProgressConfig::default(),
            clock,
        );

        Fixture {
            evaluator,
            store,
            student: StudentId::new(),
            topic: refs.0,
            lesson: refs.1,
            resources: refs.2,
            assignment: refs.3,
        }
    }

    fn now() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_lesson_counts_required_items() {
        let f = fixture();

        // Nothing done: 0 of 3 required items
        let eval = f.evaluator.evaluate(f.student, f.lesson).await.unwrap();
        assert_eq!(eval.percentage, 0.0);
        assert!(!eval.is_completed);

        // One resource done: 1 of 3
        f.store
            .apply_evaluation(f.student, f.resources[0].id, UnitKind::Resource, 100.0, true, now())
            .await
            .unwrap();
        let eval = f.evaluator.evaluate(f.student, f.lesson).await.unwrap();
        assert!((eval.percentage - 100.0 / 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_vacuous_lesson_is_complete() {
        let program = ProgramId::new();
        let module = CourseModule::new(program, "M", "GCA-M1", 1);
        let topic = Topic::new(module.id, "T", 1);
        let lesson = Lesson::new(topic.id, "Empty", 1);
        let lesson_ref = UnitRef::new(UnitKind::Lesson, lesson.id);

        let catalog = Arc::new(
            ContentCatalog::builder()
                .module(module)
                .topic(topic)
                .lesson(lesson)
                .build()
                .unwrap(),
        );
        let store = Arc::new(SqliteProgressStore::in_memory().unwrap());
        let evaluator = CompletionEvaluator::new(
            catalog,
            store,
            ProgressConfig::default(),
            Arc::new(ManualClock::new(now())),
        );

        let eval = evaluator.evaluate(StudentId::new(), lesson_ref).await.unwrap();
        assert_eq!(eval.percentage, 100.0);
        assert!(eval.is_completed);
        assert!(eval.freshly_completed);
    }

    #[tokio::test]
    async fn test_topic_capped_while_assignment_unpassed() {
        let f = fixture();

        // Complete the lesson record directly; the required assignment
        // still has no passing submission
        f.store
            .apply_evaluation(f.student, f.lesson.id, UnitKind::Lesson, 100.0, true, now())
            .await
            .unwrap();

        let eval = f.evaluator.evaluate(f.student, f.topic).await.unwrap();
        assert_eq!(eval.percentage, 99.0);
        assert!(!eval.is_completed);

        // A failing grade does not lift the cap
        f.store
            .record_submission(&crate::submissions::AssignmentSubmission {
                student: f.student,
                assignment: f.assignment.id,
                attempt_number: 1,
                submitted_at: now(),
                is_graded: true,
                points_earned: Some(60.0),
                grade_percentage: Some(60.0),
                is_late: false,
            })
            .await
            .unwrap();
        let eval = f.evaluator.evaluate(f.student, f.topic).await.unwrap();
        assert_eq!(eval.percentage, 99.0);

        // A passing regrade lifts it
        f.store
            .record_submission(&crate::submissions::AssignmentSubmission {
                student: f.student,
                assignment: f.assignment.id,
                attempt_number: 2,
                submitted_at: now(),
                is_graded: true,
                points_earned: Some(85.0),
                grade_percentage: Some(85.0),
                is_late: false,
            })
            .await
            .unwrap();
        let eval = f.evaluator.evaluate(f.student, f.topic).await.unwrap();
        assert_eq!(eval.percentage, 100.0);
        assert!(eval.freshly_completed);
    }

    #[tokio::test]
    async fn test_module_mean_of_topics() {
        let program = ProgramId::new();
        let module = CourseModule::new(program, "M", "GCA-M1", 1);
        let t1 = Topic::new(module.id, "T1", 1);
        let t2 = Topic::new(module.id, "T2", 2);
        let l1 = Lesson::new(t1.id, "L1", 1);
        let l2 = Lesson::new(t2.id, "L2", 1);
        let module_ref = UnitRef::new(UnitKind::Module, module.id);
        let l1_id = l1.id;

        let catalog = Arc::new(
            ContentCatalog::builder()
                .module(module)
                .topic(t1)
                .topic(t2)
                .lesson(l1)
                .lesson(l2)
                .build()
                .unwrap(),
        );
        let store = Arc::new(SqliteProgressStore::in_memory().unwrap());
        let student = StudentId::new();
        let evaluator = CompletionEvaluator::new(
            catalog,
            store.clone(),
            ProgressConfig::default(),
            Arc::new(ManualClock::new(now())),
        );

        // T1's lesson complete, T2's untouched: mean of 100 and 0
        store
            .apply_evaluation(student, l1_id, UnitKind::Lesson, 100.0, true, now())
            .await
            .unwrap();
        let eval = evaluator.evaluate(student, module_ref).await.unwrap();
        assert_eq!(eval.percentage, 50.0);
        assert!(!eval.is_completed);
    }

    #[tokio::test]
    async fn test_module_credit_weighted_mean() {
        let program = ProgramId::new();
        let module = CourseModule::new(program, "M", "GCA-M1", 1);
        let t1 = Topic::new(module.id, "T1", 1).with_credit_weight(3);
        let t2 = Topic::new(module.id, "T2", 2).with_credit_weight(1);
        let l1 = Lesson::new(t1.id, "L1", 1);
        let l2 = Lesson::new(t2.id, "L2", 1);
        let module_ref = UnitRef::new(UnitKind::Module, module.id);
        let l1_id = l1.id;

        let catalog = Arc::new(
            ContentCatalog::builder()
                .module(module)
                .topic(t1)
                .topic(t2)
                .lesson(l1)
                .lesson(l2)
                .build()
                .unwrap(),
        );
        let store = Arc::new(SqliteProgressStore::in_memory().unwrap());
        let student = StudentId::new();
        let evaluator = CompletionEvaluator::new(
            catalog,
            store.clone(),
            ProgressConfig::default(),
            Arc::new(ManualClock::new(now())),
        );

        store
            .apply_evaluation(student, l1_id, UnitKind::Lesson, 100.0, true, now())
            .await
            .unwrap();
        // (100 * 3 + 0 * 1) / 4
        let eval = evaluator.evaluate(student, module_ref).await.unwrap();
        assert_eq!(eval.percentage, 75.0);
    }

    #[tokio::test]
    async fn test_completed_unit_stays_completed() {
        let f = fixture();

        // Complete everything required for the lesson
        for resource in &f.resources {
            f.store
                .apply_evaluation(f.student, resource.id, UnitKind::Resource, 100.0, true, now())
                .await
                .unwrap();
        }
        f.store
            .record_submission(&crate::submissions::AssignmentSubmission {
                student: f.student,
                assignment: f.assignment.id,
                attempt_number: 1,
                submitted_at: now(),
                is_graded: true,
                points_earned: Some(90.0),
                grade_percentage: Some(90.0),
                is_late: false,
            })
            .await
            .unwrap();

        let eval = f.evaluator.evaluate(f.student, f.lesson).await.unwrap();
        assert!(eval.freshly_completed);

        // Second evaluation: still complete, edge not re-reported
        let eval = f.evaluator.evaluate(f.student, f.lesson).await.unwrap();
        assert!(eval.is_completed);
        assert!(!eval.freshly_completed);
    }
}
