//! Progressive access engine
//!
//! Provides:
//! - SQLite-backed progress records per (student, unit)
//! - Completion percentage evaluation at every granularity
//! - Prerequisite-aware access gating
//! - The unlock cascade reacting to completion events
//! - The `ProgressiveAccessManager` façade tying them together

pub mod cascade;
pub mod evaluator;
pub mod gate;
pub mod manager;
pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{StudentId, UnitId, UnitKind, UnitStatus};

pub use cascade::{CascadeOutcome, UnlockCascade};
pub use evaluator::{CompletionEvaluator, Evaluation};
pub use gate::{AccessGate, MissingPrerequisite, PrerequisiteStatus};
pub use manager::{
    NextAction, ProgressionEntry, ProgramSummary, ModuleSummary, ProgressiveAccessManager,
    RecalculationReport, RequiredItem,
};
pub use store::SqliteProgressStore;

/// Durable per-student progress state for one content unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub student: StudentId,
    pub unit: UnitId,
    pub kind: UnitKind,
    /// Set by the unlock cascade (or first-unit auto-unlock), never
    /// inferred; monotonic — there is no re-lock path
    pub is_unlocked: bool,
    /// Stamped once, on the unlock edge
    pub unlocked_at: Option<DateTime<Utc>>,
    /// Latest measured percentage, 0-100
    pub completion_percentage: f64,
    /// Monotonic: once true, never reverts
    pub is_completed: bool,
    /// Stamped once, on the completion edge
    pub completed_at: Option<DateTime<Utc>>,
    /// Informational view counter; not consulted for gating
    pub view_count: u32,
    pub last_accessed: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProgressRecord {
    /// Status as shown to callers
    pub fn status(&self) -> UnitStatus {
        if self.is_completed {
            UnitStatus::Completed
        } else if self.is_unlocked {
            UnitStatus::Unlocked
        } else {
            UnitStatus::Locked
        }
    }
}
