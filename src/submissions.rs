//! Graded assignment submissions
//!
//! Students may attempt an assignment any number of times; attempts are
//! numbered and persisted alongside the progress records. Only a graded
//! attempt at or above the passing threshold counts toward completion.
//! Grading workflow and file storage stay with the external submission
//! system — the engine only records the graded outcome it is told about.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{StudentId, UnitId};

/// One graded (or not yet graded) attempt at an assignment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentSubmission {
    pub student: StudentId,
    pub assignment: UnitId,
    pub attempt_number: u32,
    pub submitted_at: DateTime<Utc>,
    pub is_graded: bool,
    pub points_earned: Option<f64>,
    pub grade_percentage: Option<f64>,
    pub is_late: bool,
}

impl AssignmentSubmission {
    /// Whether this attempt counts toward completion at the given
    /// passing threshold
    pub fn is_passing(&self, passing_grade: f64) -> bool {
        self.is_graded && self.grade_percentage.is_some_and(|g| g >= passing_grade)
    }
}

/// Lateness relative to the assignment's due window: the parent unit's
/// unlock time plus the configured number of days. With no unlock time
/// or no due window the submission is never late.
pub fn is_late(
    submitted_at: DateTime<Utc>,
    unlocked_at: Option<DateTime<Utc>>,
    due_in_days: Option<i64>,
) -> bool {
    match (unlocked_at, due_in_days) {
        (Some(unlocked), Some(days)) => submitted_at > unlocked + Duration::days(days),
        _ => false,
    }
}
