//! Unlock cascade
//!
//! Reacts to a fresh completion by unlocking everything that just became
//! eligible: the sequential successor, any unit anywhere in the program
//! listing the completed unit as an explicit prerequisite, and - when
//! the completion pushes a parent over its own threshold - the same
//! again one level up. Every write is an idempotent single-record
//! update, so re-running the cascade after a partial failure converges
//! on the same unlocked set.

use std::sync::Arc;

use tracing::{debug, info};

use crate::clock::Clock;
use crate::config::ProgressConfig;
use crate::content::ContentCatalog;
use crate::error::ProgressError;
use crate::types::{StudentId, UnitKind, UnitRef};

use super::evaluator::CompletionEvaluator;
use super::gate::prerequisites_satisfied;
use super::store::SqliteProgressStore;

/// Everything a cascade run changed
#[derive(Debug, Default, Clone)]
pub struct CascadeOutcome {
    /// Units freshly unlocked, in discovery order
    pub unlocked: Vec<UnitRef>,
    /// Units freshly completed by upward propagation (the triggering
    /// unit itself is not included)
    pub completed: Vec<UnitRef>,
}

/// The state-transition engine behind completion events
pub struct UnlockCascade {
    catalog: Arc<ContentCatalog>,
    store: Arc<SqliteProgressStore>,
    evaluator: CompletionEvaluator,
    config: ProgressConfig,
    clock: Arc<dyn Clock>,
}

impl UnlockCascade {
    pub fn new(
        catalog: Arc<ContentCatalog>,
        store: Arc<SqliteProgressStore>,
        evaluator: CompletionEvaluator,
        config: ProgressConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            catalog,
            store,
            evaluator,
            config,
            clock,
        }
    }

    /// React to the fresh completion of `unit`
    ///
    /// Safe to invoke more than once for the same completion: eligibility
    /// is re-derived from current store state and already-unlocked units
    /// are left untouched.
    pub async fn on_completed(
        &self,
        student: StudentId,
        unit: UnitRef,
    ) -> Result<CascadeOutcome, ProgressError> {
        let mut outcome = CascadeOutcome::default();
        let mut work = vec![unit];

        while let Some(current) = work.pop() {
            debug!(%student, unit = %current, "cascade step");

            // Sequential successor
            if let Some(next) = self.catalog.next_sibling(current) {
                if prerequisites_satisfied(
                    &self.catalog,
                    &self.store,
                    &self.config,
                    student,
                    next,
                )
                .await?
                {
                    self.unlock_with_entry_points(student, next, &mut outcome)
                        .await?;
                }
            }

            // Units anywhere that list the completed unit as an explicit
            // prerequisite; each is re-checked against its full set
            for dependent in self.catalog.dependents_of(current.id).to_vec() {
                if prerequisites_satisfied(
                    &self.catalog,
                    &self.store,
                    &self.config,
                    student,
                    dependent,
                )
                .await?
                {
                    self.unlock_with_entry_points(student, dependent, &mut outcome)
                        .await?;
                }
            }

            // Upward propagation: the parent may have crossed its own
            // threshold with this completion
            if let Some(parent) = self.catalog.parent_of(current) {
                let evaluation = self.evaluator.evaluate(student, parent).await?;
                if evaluation.freshly_completed {
                    info!(%student, unit = %parent, "completion propagated upward");
                    outcome.completed.push(parent);
                    work.push(parent);
                }
            }
        }

        Ok(outcome)
    }

    /// Unlock a unit and the entry points below it: a module opens its
    /// first topic, a topic opens its first lesson
    async fn unlock_with_entry_points(
        &self,
        student: StudentId,
        unit: UnitRef,
        outcome: &mut CascadeOutcome,
    ) -> Result<(), ProgressError> {
        let mut targets = vec![unit];
        match unit.kind {
            UnitKind::Module => {
                if let Some(topic) = self.catalog.first_topic(unit.id) {
                    targets.push(UnitRef::new(UnitKind::Topic, topic.id));
                    if let Some(lesson) = self.catalog.first_lesson(topic.id) {
                        targets.push(UnitRef::new(UnitKind::Lesson, lesson.id));
                    }
                }
            }
            UnitKind::Topic => {
                if let Some(lesson) = self.catalog.first_lesson(unit.id) {
                    targets.push(UnitRef::new(UnitKind::Lesson, lesson.id));
                }
            }
            _ => {}
        }

        let now = self.clock.now();
        for target in targets {
            let fresh = self
                .store
                .mark_unlocked(student, target.id, target.kind, now)
                .await?;
            if fresh {
                info!(%student, unit = %target, "unit unlocked");
                outcome.unlocked.push(target);
            }
        }
        Ok(())
    }
}
