//! Progressive access manager
//!
//! The façade the surrounding application talks to. External events
//! (resource viewed/completed, submission graded, lesson marked done)
//! come in here; the manager re-evaluates the affected unit and its
//! ancestors, lets the cascade react to every fresh completion, and
//! emits fire-and-forget notifications. Read-only projections for
//! dashboards live here too.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::ProgressConfig;
use crate::content::ContentCatalog;
use crate::enrollment::EnrollmentService;
use crate::error::ProgressError;
use crate::notify::{Notifier, NoopNotifier, ProgressEvent};
use crate::submissions::{self, AssignmentSubmission};
use crate::types::{ProgramId, StudentId, UnitId, UnitKind, UnitRef, UnitStatus};

use super::cascade::{CascadeOutcome, UnlockCascade};
use super::evaluator::{CompletionEvaluator, Evaluation};
use super::gate::{AccessGate, PrerequisiteStatus};
use super::store::SqliteProgressStore;

/// One row of a progression listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressionEntry {
    pub unit: UnitRef,
    pub title: String,
    pub status: UnitStatus,
    pub completion_percentage: f64,
    pub prerequisites: Vec<UnitId>,
}

/// A single unmet requirement inside a lesson or topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RequiredItem {
    /// The resource has never been opened
    ViewResource { resource: UnitId, title: String },
    /// Opened but not yet marked complete
    CompleteResource { resource: UnitId, title: String },
    /// No passing graded submission yet
    PassAssignment {
        assignment: UnitId,
        title: String,
        best_grade: Option<f64>,
    },
}

/// Advisory pointer at the student's next piece of work
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum NextAction {
    /// No active enrollment in the program
    Enroll,
    /// Work the listed requirements of this unit
    Complete {
        module: UnitId,
        topic: UnitId,
        /// Absent when the open items are topic-level assignments
        lesson: Option<UnitId>,
        items: Vec<RequiredItem>,
        message: String,
    },
    /// Everything currently available is done
    AllComplete,
}

/// Per-module line of a program summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleSummary {
    pub module: UnitId,
    pub title: String,
    pub course_code: String,
    pub credits: u32,
    pub status: UnitStatus,
    pub completion_percentage: f64,
}

/// Credit-accounted view over a whole program
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramSummary {
    pub program: ProgramId,
    pub modules: Vec<ModuleSummary>,
    pub credits_earned: u32,
    pub total_credits: u32,
    pub percent_complete: f64,
}

/// Counts from an administrative bulk recalculation
#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize)]
pub struct RecalculationReport {
    pub lessons: usize,
    pub topics: usize,
    pub modules: usize,
    pub fresh_completions: usize,
}

/// Orchestrates evaluator, gate and cascade behind one API
pub struct ProgressiveAccessManager {
    catalog: Arc<ContentCatalog>,
    store: Arc<SqliteProgressStore>,
    enrollment: Arc<dyn EnrollmentService>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    config: ProgressConfig,
    gate: AccessGate,
    evaluator: CompletionEvaluator,
    cascade: UnlockCascade,
}

impl ProgressiveAccessManager {
    pub fn new(
        catalog: Arc<ContentCatalog>,
        store: Arc<SqliteProgressStore>,
        enrollment: Arc<dyn EnrollmentService>,
        config: ProgressConfig,
    ) -> Self {
        Self::assemble(
            catalog,
            store,
            enrollment,
            config,
            Arc::new(SystemClock),
            Arc::new(NoopNotifier),
        )
    }

    /// Replace the time source (tests, replay)
    pub fn with_clock(self, clock: Arc<dyn Clock>) -> Self {
        Self::assemble(
            self.catalog,
            self.store,
            self.enrollment,
            self.config,
            clock,
            self.notifier,
        )
    }

    /// Attach a notification subscriber
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    fn assemble(
        catalog: Arc<ContentCatalog>,
        store: Arc<SqliteProgressStore>,
        enrollment: Arc<dyn EnrollmentService>,
        config: ProgressConfig,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let evaluator = CompletionEvaluator::new(
            catalog.clone(),
            store.clone(),
            config.clone(),
            clock.clone(),
        );
        let gate = AccessGate::new(
            catalog.clone(),
            store.clone(),
            enrollment.clone(),
            config.clone(),
            clock.clone(),
        );
        let cascade = UnlockCascade::new(
            catalog.clone(),
            store.clone(),
            evaluator.clone(),
            config.clone(),
            clock.clone(),
        );

        Self {
            catalog,
            store,
            enrollment,
            notifier,
            clock,
            config,
            gate,
            evaluator,
            cascade,
        }
    }

    /// Idempotently open a program's entry points for a newly (or re-)
    /// enrolled student: first module, its first topic, that topic's
    /// first lesson
    pub async fn initialize_enrollment(
        &self,
        student: StudentId,
        program: ProgramId,
    ) -> Result<(), ProgressError> {
        let enrolled = self
            .enrollment
            .active_enrollment(student, program)
            .await
            .map_err(ProgressError::Enrollment)?
            .is_some();
        if !enrolled {
            warn!(%student, %program, "initialize requested without active enrollment");
            return Ok(());
        }

        let Some(module) = self.catalog.first_module(program) else {
            warn!(%program, "program has no active modules");
            return Ok(());
        };

        let mut targets = vec![UnitRef::new(UnitKind::Module, module.id)];
        if let Some(topic) = self.catalog.first_topic(module.id) {
            targets.push(UnitRef::new(UnitKind::Topic, topic.id));
            if let Some(lesson) = self.catalog.first_lesson(topic.id) {
                targets.push(UnitRef::new(UnitKind::Lesson, lesson.id));
            }
        }

        let now = self.clock.now();
        for target in targets {
            if self
                .store
                .mark_unlocked(student, target.id, target.kind, now)
                .await?
            {
                info!(%student, unit = %target, "enrollment initialization unlocked unit");
                self.emit(ProgressEvent::UnitUnlocked {
                    student,
                    unit: target.id,
                    kind: target.kind,
                })
                .await;
            }
        }
        Ok(())
    }

    /// Whether the student may open the unit
    pub async fn can_access(
        &self,
        student: StudentId,
        unit: UnitId,
    ) -> Result<bool, ProgressError> {
        self.gate.can_access(student, unit).await
    }

    /// Actionable prerequisite report for a unit
    pub async fn prerequisite_status(
        &self,
        student: StudentId,
        unit: UnitId,
    ) -> Result<PrerequisiteStatus, ProgressError> {
        self.gate.prerequisite_status(student, unit).await
    }

    /// Record that a student opened a resource; informational only
    pub async fn record_resource_view(
        &self,
        student: StudentId,
        resource: UnitId,
    ) -> Result<(), ProgressError> {
        let item = self
            .catalog
            .resource(resource)
            .ok_or(ProgressError::UnitNotFound(resource))?;
        if !item.is_active {
            warn!(%student, %resource, "view of inactive resource ignored");
            return Ok(());
        }
        self.store
            .record_view(student, resource, UnitKind::Resource, self.clock.now())
            .await
    }

    /// Record that a student finished a resource and ripple the
    /// completion through the lesson, topic and module
    pub async fn record_resource_completed(
        &self,
        student: StudentId,
        resource: UnitId,
    ) -> Result<(), ProgressError> {
        let item = self
            .catalog
            .resource(resource)
            .ok_or(ProgressError::UnitNotFound(resource))?;
        if !item.is_active {
            warn!(%student, %resource, "completion of inactive resource ignored");
            return Ok(());
        }
        let lesson = item.lesson;

        let now = self.clock.now();
        self.store
            .record_view(student, resource, UnitKind::Resource, now)
            .await?;
        let fresh = self
            .store
            .apply_evaluation(student, resource, UnitKind::Resource, 100.0, true, now)
            .await?;
        if fresh {
            info!(%student, %resource, "resource completed");
        }

        self.reevaluate_chain(student, UnitRef::new(UnitKind::Lesson, lesson))
            .await?;
        Ok(())
    }

    /// Record a graded submission attempt and ripple its effect
    ///
    /// Returns the stored submission, including the computed attempt
    /// number and lateness.
    pub async fn record_graded_submission(
        &self,
        student: StudentId,
        assignment: UnitId,
        grade_percentage: f64,
        points_earned: Option<f64>,
    ) -> Result<AssignmentSubmission, ProgressError> {
        let unit = self
            .catalog
            .assignment(assignment)
            .ok_or(ProgressError::UnitNotFound(assignment))?;
        let parent = self
            .catalog
            .parent_of(UnitRef::new(UnitKind::Assignment, assignment))
            .ok_or(ProgressError::UnitNotFound(assignment))?;
        let due_in_days = unit.due_in_days;
        let is_active = unit.is_active;

        let now = self.clock.now();
        let parent_record = self.store.get(student, parent.id).await?;
        let attempt_number = self.store.next_attempt_number(student, assignment).await?;

        let submission = AssignmentSubmission {
            student,
            assignment,
            attempt_number,
            submitted_at: now,
            is_graded: true,
            points_earned,
            grade_percentage: Some(grade_percentage),
            is_late: submissions::is_late(
                now,
                parent_record.and_then(|r| r.unlocked_at),
                due_in_days,
            ),
        };
        self.store.record_submission(&submission).await?;
        info!(
            %student,
            %assignment,
            attempt = attempt_number,
            grade = grade_percentage,
            late = submission.is_late,
            "graded submission recorded"
        );

        if is_active {
            self.reevaluate_chain(student, parent).await?;
        } else {
            warn!(%student, %assignment, "inactive assignment graded; no re-evaluation");
        }
        Ok(submission)
    }

    /// Explicit "mark lesson done" request: re-evaluates the lesson and
    /// returns whether it is (now) completed. Requirements still apply -
    /// an unfinished lesson stays incomplete.
    pub async fn mark_lesson_done(
        &self,
        student: StudentId,
        lesson: UnitId,
    ) -> Result<bool, ProgressError> {
        let unit = self
            .catalog
            .lesson(lesson)
            .ok_or(ProgressError::UnitNotFound(lesson))?;
        if !unit.is_active {
            warn!(%student, %lesson, "mark-done on inactive lesson ignored");
            return Ok(false);
        }

        let evaluation = self
            .reevaluate_chain(student, UnitRef::new(UnitKind::Lesson, lesson))
            .await?;
        Ok(evaluation.is_completed)
    }

    /// Ordered read-only listing of a unit's children with status and
    /// live percentages
    pub async fn progression(
        &self,
        student: StudentId,
        parent: UnitId,
    ) -> Result<Vec<ProgressionEntry>, ProgressError> {
        let kind = self
            .catalog
            .kind_of(parent)
            .ok_or(ProgressError::UnitNotFound(parent))?;

        let children: Vec<UnitRef> = match kind {
            UnitKind::Module => self
                .catalog
                .active_topics(parent)
                .iter()
                .map(|t| UnitRef::new(UnitKind::Topic, t.id))
                .collect(),
            UnitKind::Topic => {
                let mut refs: Vec<UnitRef> = self
                    .catalog
                    .active_lessons(parent)
                    .iter()
                    .map(|l| UnitRef::new(UnitKind::Lesson, l.id))
                    .collect();
                refs.extend(
                    self.catalog
                        .topic_gate_assignments(parent)
                        .iter()
                        .filter(|a| a.parent.unit_id() == parent)
                        .map(|a| UnitRef::new(UnitKind::Assignment, a.id)),
                );
                refs
            }
            UnitKind::Lesson => {
                let mut refs: Vec<UnitRef> = self
                    .catalog
                    .active_resources(parent)
                    .iter()
                    .map(|r| UnitRef::new(UnitKind::Resource, r.id))
                    .collect();
                refs.extend(
                    self.catalog
                        .required_lesson_assignments(parent)
                        .iter()
                        .map(|a| UnitRef::new(UnitKind::Assignment, a.id)),
                );
                refs
            }
            UnitKind::Resource | UnitKind::Assignment => Vec::new(),
        };

        self.entries_for(student, children).await
    }

    /// Module listing for a whole program
    pub async fn program_progression(
        &self,
        student: StudentId,
        program: ProgramId,
    ) -> Result<Vec<ProgressionEntry>, ProgressError> {
        let children: Vec<UnitRef> = self
            .catalog
            .active_modules(program)
            .iter()
            .map(|m| UnitRef::new(UnitKind::Module, m.id))
            .collect();
        self.entries_for(student, children).await
    }

    async fn entries_for(
        &self,
        student: StudentId,
        children: Vec<UnitRef>,
    ) -> Result<Vec<ProgressionEntry>, ProgressError> {
        let mut entries = Vec::with_capacity(children.len());
        for child in children {
            let status = self.status_of(student, child).await?;
            let completion_percentage = self.evaluator.percentage(student, child).await?;
            entries.push(ProgressionEntry {
                unit: child,
                title: self.catalog.title_of(child).unwrap_or_default().to_string(),
                status,
                completion_percentage,
                prerequisites: self.catalog.prerequisites_of(child).to_vec(),
            });
        }
        Ok(entries)
    }

    async fn status_of(
        &self,
        student: StudentId,
        unit: UnitRef,
    ) -> Result<UnitStatus, ProgressError> {
        let completed = match unit.kind {
            UnitKind::Assignment => {
                self.store
                    .has_passing_submission(student, unit.id, self.config.passing_grade_percentage)
                    .await?
            }
            _ => self
                .store
                .get(student, unit.id)
                .await?
                .is_some_and(|r| r.is_completed),
        };
        if completed {
            return Ok(UnitStatus::Completed);
        }
        if self.gate.can_access(student, unit.id).await? {
            Ok(UnitStatus::Unlocked)
        } else {
            Ok(UnitStatus::Locked)
        }
    }

    /// First unlocked-but-incomplete unit and its first unmet
    /// requirements; purely advisory, mutates nothing
    pub async fn next_required_action(
        &self,
        student: StudentId,
        program: ProgramId,
    ) -> Result<NextAction, ProgressError> {
        let enrolled = self
            .enrollment
            .active_enrollment(student, program)
            .await
            .map_err(ProgressError::Enrollment)?
            .is_some();
        if !enrolled {
            return Ok(NextAction::Enroll);
        }

        for module in self.catalog.active_modules(program) {
            if !self.gate.can_access(student, module.id).await? {
                break;
            }
            for topic in self.catalog.active_topics(module.id) {
                if !self.gate.can_access(student, topic.id).await? {
                    break;
                }
                for lesson in self.catalog.active_lessons(topic.id) {
                    if !self.gate.can_access(student, lesson.id).await? {
                        break;
                    }
                    let done = self
                        .store
                        .get(student, lesson.id)
                        .await?
                        .is_some_and(|r| r.is_completed);
                    if done {
                        continue;
                    }

                    let items = self.lesson_requirements(student, lesson.id).await?;
                    if !items.is_empty() {
                        return Ok(NextAction::Complete {
                            module: module.id,
                            topic: topic.id,
                            lesson: Some(lesson.id),
                            message: format!("Complete lesson '{}'", lesson.title),
                            items,
                        });
                    }
                }

                // Topic-level assignments gate the topic even when every
                // lesson is finished
                let mut items = Vec::new();
                for assignment in self.catalog.topic_gate_assignments(topic.id) {
                    if assignment.parent.unit_id() != topic.id {
                        continue;
                    }
                    if !self
                        .store
                        .has_passing_submission(
                            student,
                            assignment.id,
                            self.config.passing_grade_percentage,
                        )
                        .await?
                    {
                        items.push(RequiredItem::PassAssignment {
                            assignment: assignment.id,
                            title: assignment.title.clone(),
                            best_grade: self.store.best_grade(student, assignment.id).await?,
                        });
                    }
                }
                if !items.is_empty() {
                    return Ok(NextAction::Complete {
                        module: module.id,
                        topic: topic.id,
                        lesson: None,
                        message: format!("Submit assignments for topic '{}'", topic.title),
                        items,
                    });
                }
            }
        }

        Ok(NextAction::AllComplete)
    }

    async fn lesson_requirements(
        &self,
        student: StudentId,
        lesson: UnitId,
    ) -> Result<Vec<RequiredItem>, ProgressError> {
        let mut items = Vec::new();

        for resource in self.catalog.required_resources(lesson) {
            let record = self.store.get(student, resource.id).await?;
            match record {
                Some(record) if record.is_completed => {}
                Some(record) if record.view_count > 0 => {
                    items.push(RequiredItem::CompleteResource {
                        resource: resource.id,
                        title: resource.title.clone(),
                    });
                }
                _ => items.push(RequiredItem::ViewResource {
                    resource: resource.id,
                    title: resource.title.clone(),
                }),
            }
        }

        for assignment in self.catalog.required_lesson_assignments(lesson) {
            if !self
                .store
                .has_passing_submission(
                    student,
                    assignment.id,
                    self.config.passing_grade_percentage,
                )
                .await?
            {
                items.push(RequiredItem::PassAssignment {
                    assignment: assignment.id,
                    title: assignment.title.clone(),
                    best_grade: self.store.best_grade(student, assignment.id).await?,
                });
            }
        }
        Ok(items)
    }

    /// Credit-accounted summary across a program's modules
    pub async fn program_summary(
        &self,
        student: StudentId,
        program: ProgramId,
    ) -> Result<ProgramSummary, ProgressError> {
        let mut modules = Vec::new();
        let mut credits_earned = 0;

        for module in self.catalog.active_modules(program) {
            let unit = UnitRef::new(UnitKind::Module, module.id);
            let status = self.status_of(student, unit).await?;
            if status == UnitStatus::Completed {
                credits_earned += module.credits;
            }
            modules.push(ModuleSummary {
                module: module.id,
                title: module.title.clone(),
                course_code: module.course_code.clone(),
                credits: module.credits,
                status,
                completion_percentage: self.evaluator.percentage(student, unit).await?,
            });
        }

        let total_credits = self.catalog.program_credits(program);
        let percent_complete = if total_credits > 0 {
            (f64::from(credits_earned) / f64::from(total_credits)) * 100.0
        } else {
            0.0
        };

        Ok(ProgramSummary {
            program,
            modules,
            credits_earned,
            total_credits,
            percent_complete,
        })
    }

    /// Administrative bulk recomputation over a whole program,
    /// bottom-up; fresh completion edges cascade as usual
    pub async fn recalculate_program(
        &self,
        student: StudentId,
        program: ProgramId,
    ) -> Result<RecalculationReport, ProgressError> {
        let mut report = RecalculationReport::default();

        for module in self.catalog.active_modules(program) {
            for topic in self.catalog.active_topics(module.id) {
                for lesson in self.catalog.active_lessons(topic.id) {
                    let evaluation = self
                        .evaluator
                        .evaluate(student, UnitRef::new(UnitKind::Lesson, lesson.id))
                        .await?;
                    report.lessons += 1;
                    if evaluation.freshly_completed {
                        report.fresh_completions += 1;
                        self.handle_fresh_completion(student, evaluation.unit).await?;
                    }
                }
                let evaluation = self
                    .evaluator
                    .evaluate(student, UnitRef::new(UnitKind::Topic, topic.id))
                    .await?;
                report.topics += 1;
                if evaluation.freshly_completed {
                    report.fresh_completions += 1;
                    self.handle_fresh_completion(student, evaluation.unit).await?;
                }
            }
            let evaluation = self
                .evaluator
                .evaluate(student, UnitRef::new(UnitKind::Module, module.id))
                .await?;
            report.modules += 1;
            if evaluation.freshly_completed {
                report.fresh_completions += 1;
                self.handle_fresh_completion(student, evaluation.unit).await?;
            }
        }

        info!(
            %student,
            %program,
            lessons = report.lessons,
            topics = report.topics,
            modules = report.modules,
            fresh = report.fresh_completions,
            "program recalculated"
        );
        Ok(report)
    }

    /// Administrative reset: wipe every progress record for the student
    pub async fn reset_student(&self, student: StudentId) -> Result<usize, ProgressError> {
        let deleted = self.store.reset_student(student).await?;
        info!(%student, deleted, "student progress reset");
        Ok(deleted)
    }

    /// Administrative reset scoped to one program
    pub async fn reset_program(
        &self,
        student: StudentId,
        program: ProgramId,
    ) -> Result<usize, ProgressError> {
        let units = self.catalog.program_unit_ids(program);
        let deleted = self.store.reset_units(student, &units).await?;
        info!(%student, %program, deleted, "program progress reset");
        Ok(deleted)
    }

    /// Evaluate a unit and every ancestor above it; each fresh
    /// completion edge triggers the cascade exactly once (the cascade
    /// consumes parent edges internally, so the walk upward never
    /// double-fires)
    async fn reevaluate_chain(
        &self,
        student: StudentId,
        start: UnitRef,
    ) -> Result<Evaluation, ProgressError> {
        let start_evaluation = self.evaluator.evaluate(student, start).await?;
        if start_evaluation.freshly_completed {
            self.handle_fresh_completion(student, start).await?;
        }

        let mut current = self.catalog.parent_of(start);
        while let Some(unit) = current {
            let evaluation = self.evaluator.evaluate(student, unit).await?;
            if evaluation.freshly_completed {
                self.handle_fresh_completion(student, unit).await?;
            }
            current = self.catalog.parent_of(unit);
        }
        Ok(start_evaluation)
    }

    async fn handle_fresh_completion(
        &self,
        student: StudentId,
        unit: UnitRef,
    ) -> Result<(), ProgressError> {
        self.emit_completed(student, unit).await;
        let outcome = self.cascade.on_completed(student, unit).await?;
        self.emit_outcome(student, &outcome).await;
        Ok(())
    }

    async fn emit_outcome(&self, student: StudentId, outcome: &CascadeOutcome) {
        for unit in &outcome.completed {
            self.emit_completed(student, *unit).await;
        }
        for unit in &outcome.unlocked {
            self.emit(ProgressEvent::UnitUnlocked {
                student,
                unit: unit.id,
                kind: unit.kind,
            })
            .await;
        }
    }

    async fn emit_completed(&self, student: StudentId, unit: UnitRef) {
        self.emit(ProgressEvent::UnitCompleted {
            student,
            unit: unit.id,
            kind: unit.kind,
        })
        .await;
        if unit.kind == UnitKind::Module {
            self.emit(ProgressEvent::ModuleCompleted {
                student,
                module: unit.id,
            })
            .await;
        }
    }

    /// Fire-and-forget: a failing notifier is logged and ignored
    async fn emit(&self, event: ProgressEvent) {
        if let Err(e) = self.notifier.notify(event).await {
            warn!(error = %e, "notifier failure ignored");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::content::{
        Assignment, AssignmentParent, CourseModule, Lesson, ResourceItem, ResourceKind, Topic,
    };
    use crate::enrollment::{EnrollmentStatus, InMemoryEnrollmentService};
    use crate::notify::test_support::RecordingNotifier;
    use chrono::{TimeZone, Utc};

    fn now() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap()
    }

    struct World {
        manager: ProgressiveAccessManager,
        notifier: Arc<RecordingNotifier>,
        student: StudentId,
        program: ProgramId,
        m1: UnitId,
        t1: UnitId,
        l1: UnitId,
        l2: UnitId,
        r1: UnitId,
        r2: UnitId,
    }

    /// One module, one topic, two lessons; the first lesson has two
    /// required resources, the second none
    fn world() -> World {
        let program = ProgramId::new();
        let m1 = CourseModule::new(program, "Foundations", "GCA-M101", 1);
        let t1 = Topic::new(m1.id, "Orientation", 1);
        let l1 = Lesson::new(t1.id, "Welcome", 1);
        let l2 = Lesson::new(t1.id, "Going deeper", 2);
        let r1 = ResourceItem::new(l1.id, "Intro video", ResourceKind::Video, 1);
        let r2 = ResourceItem::new(l1.id, "Handbook", ResourceKind::Pdf, 2);
        let a1 = Assignment::new(AssignmentParent::Lesson(l2.id), "Field notes");
        let ids = (m1.id, t1.id, l1.id, l2.id, r1.id, r2.id);

        let catalog = Arc::new(
            ContentCatalog::builder()
                .module(m1)
                .topic(t1)
                .lesson(l1)
                .lesson(l2)
                .resource(r1)
                .resource(r2)
                .assignment(a1)
                .build()
                .unwrap(),
        );
        let store = Arc::new(SqliteProgressStore::in_memory().unwrap());
        let enrollment = Arc::new(InMemoryEnrollmentService::new());
        let student = StudentId::new();
        enrollment.enroll(student, program, EnrollmentStatus::Active, now());

        let notifier = Arc::new(RecordingNotifier::default());
        let manager = ProgressiveAccessManager::new(
            catalog,
            store,
            enrollment,
            ProgressConfig::default(),
        )
        .with_clock(Arc::new(ManualClock::new(now())))
        .with_notifier(notifier.clone());

        World {
            manager,
            notifier,
            student,
            program,
            m1: ids.0,
            t1: ids.1,
            l1: ids.2,
            l2: ids.3,
            r1: ids.4,
            r2: ids.5,
        }
    }

    #[tokio::test]
    async fn test_initialize_enrollment_is_idempotent() {
        let w = world();
        w.manager
            .initialize_enrollment(w.student, w.program)
            .await
            .unwrap();
        assert!(w.manager.can_access(w.student, w.l1).await.unwrap());

        let first_events = w.notifier.events.lock().unwrap().len();
        assert_eq!(first_events, 3);

        // Re-initialization unlocks nothing new and emits nothing
        w.manager
            .initialize_enrollment(w.student, w.program)
            .await
            .unwrap();
        assert_eq!(w.notifier.events.lock().unwrap().len(), first_events);
    }

    #[tokio::test]
    async fn test_resource_completion_ripples_to_lesson() {
        let w = world();
        w.manager
            .initialize_enrollment(w.student, w.program)
            .await
            .unwrap();

        w.manager
            .record_resource_completed(w.student, w.r1)
            .await
            .unwrap();
        // One of two required resources: lesson not yet complete,
        // second lesson still locked
        assert!(!w.manager.can_access(w.student, w.l2).await.unwrap());

        w.manager
            .record_resource_completed(w.student, w.r2)
            .await
            .unwrap();
        // Lesson completed, successor lesson unlocked
        assert!(w.manager.can_access(w.student, w.l2).await.unwrap());

        let events = w.notifier.events.lock().unwrap();
        assert!(events.iter().any(|e| matches!(
            e,
            ProgressEvent::UnitCompleted { unit, .. } if *unit == w.l1
        )));
        assert!(events.iter().any(|e| matches!(
            e,
            ProgressEvent::UnitUnlocked { unit, .. } if *unit == w.l2
        )));
    }

    #[tokio::test]
    async fn test_next_required_action_walks_requirements() {
        let w = world();
        w.manager
            .initialize_enrollment(w.student, w.program)
            .await
            .unwrap();

        // First: view/complete the resources of lesson 1
        let action = w
            .manager
            .next_required_action(w.student, w.program)
            .await
            .unwrap();
        match &action {
            NextAction::Complete { lesson, items, .. } => {
                assert_eq!(*lesson, Some(w.l1));
                assert_eq!(items.len(), 2);
                assert!(matches!(items[0], RequiredItem::ViewResource { .. }));
            }
            other => panic!("unexpected action: {other:?}"),
        }

        // A view without completion turns the advice into "complete"
        w.manager.record_resource_view(w.student, w.r1).await.unwrap();
        let action = w
            .manager
            .next_required_action(w.student, w.program)
            .await
            .unwrap();
        match &action {
            NextAction::Complete { items, .. } => {
                assert!(matches!(items[0], RequiredItem::CompleteResource { .. }));
            }
            other => panic!("unexpected action: {other:?}"),
        }

        // Unenrolled students are told to enroll
        let stranger = StudentId::new();
        assert!(matches!(
            w.manager
                .next_required_action(stranger, w.program)
                .await
                .unwrap(),
            NextAction::Enroll
        ));
    }

    #[tokio::test]
    async fn test_graded_submission_completes_lesson_and_module() {
        let w = world();
        w.manager
            .initialize_enrollment(w.student, w.program)
            .await
            .unwrap();
        w.manager
            .record_resource_completed(w.student, w.r1)
            .await
            .unwrap();
        w.manager
            .record_resource_completed(w.student, w.r2)
            .await
            .unwrap();

        // Lesson 2 requires a passing assignment grade
        let assignments = w.manager.progression(w.student, w.l2).await.unwrap();
        let assignment = assignments
            .iter()
            .find(|e| e.unit.kind == UnitKind::Assignment)
            .unwrap()
            .unit
            .id;

        let failing = w
            .manager
            .record_graded_submission(w.student, assignment, 60.0, Some(60.0))
            .await
            .unwrap();
        assert_eq!(failing.attempt_number, 1);
        let summary = w.manager.program_summary(w.student, w.program).await.unwrap();
        assert_eq!(summary.credits_earned, 0);

        let passing = w
            .manager
            .record_graded_submission(w.student, assignment, 85.0, Some(85.0))
            .await
            .unwrap();
        assert_eq!(passing.attempt_number, 2);

        // Lesson 2, topic and module all complete; credits awarded
        let summary = w.manager.program_summary(w.student, w.program).await.unwrap();
        assert_eq!(summary.credits_earned, summary.total_credits);
        assert_eq!(summary.percent_complete, 100.0);
        assert!(matches!(
            w.manager
                .next_required_action(w.student, w.program)
                .await
                .unwrap(),
            NextAction::AllComplete
        ));

        let events = w.notifier.events.lock().unwrap();
        assert!(events.iter().any(|e| matches!(
            e,
            ProgressEvent::ModuleCompleted { module, .. } if *module == w.m1
        )));
    }

    #[tokio::test]
    async fn test_progression_lists_status_and_percentage() {
        let w = world();
        w.manager
            .initialize_enrollment(w.student, w.program)
            .await
            .unwrap();

        let entries = w.manager.progression(w.student, w.t1).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].unit.id, w.l1);
        assert_eq!(entries[0].status, UnitStatus::Unlocked);
        assert_eq!(entries[1].status, UnitStatus::Locked);

        let modules = w
            .manager
            .program_progression(w.student, w.program)
            .await
            .unwrap();
        assert_eq!(modules.len(), 1);
        assert_eq!(modules[0].unit.id, w.m1);
    }

    #[tokio::test]
    async fn test_progression_serializes_for_presentation() {
        let w = world();
        w.manager
            .initialize_enrollment(w.student, w.program)
            .await
            .unwrap();

        let entries = w.manager.progression(w.student, w.t1).await.unwrap();
        let json = serde_json::to_string(&entries).unwrap();
        // The presentation layer receives the three enumerated states
        // in lowercase and percentages as plain floats
        assert!(json.contains("\"status\":\"unlocked\""));
        assert!(json.contains("\"status\":\"locked\""));
        assert!(json.contains("\"completion_percentage\":0.0"));
    }

    #[tokio::test]
    async fn test_reset_behaves_like_fresh_enrollment() {
        let w = world();
        w.manager
            .initialize_enrollment(w.student, w.program)
            .await
            .unwrap();
        w.manager
            .record_resource_completed(w.student, w.r1)
            .await
            .unwrap();

        let deleted = w.manager.reset_student(w.student).await.unwrap();
        assert!(deleted > 0);

        // Lazy auto-unlock works again exactly as for a new student
        assert!(w.manager.can_access(w.student, w.l1).await.unwrap());
        assert!(!w.manager.can_access(w.student, w.l2).await.unwrap());
    }

    #[tokio::test]
    async fn test_recalculate_program_reports_counts() {
        let w = world();
        w.manager
            .initialize_enrollment(w.student, w.program)
            .await
            .unwrap();

        let report = w
            .manager
            .recalculate_program(w.student, w.program)
            .await
            .unwrap();
        assert_eq!(report.lessons, 2);
        assert_eq!(report.topics, 1);
        assert_eq!(report.modules, 1);

        // The unknown-unit error path
        let err = w
            .manager
            .record_resource_completed(w.student, UnitId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ProgressError::UnitNotFound(_)));
    }
}
