//! SQLite-backed storage for progress records and submissions
//!
//! One row per (student, unit) at every granularity, protected by a
//! uniqueness constraint so concurrent get-or-create resolves to a
//! single row (first writer wins, the second reads what the first
//! created). All writes are single-record and monotonic: `is_unlocked`
//! and `is_completed` never revert, `unlocked_at`/`completed_at` are
//! stamped exactly once.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::ProgressError;
use crate::submissions::AssignmentSubmission;
use crate::types::{StudentId, UnitId, UnitKind};

use super::ProgressRecord;

/// SQLite-based progress store
pub struct SqliteProgressStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteProgressStore {
    /// Open (or create) a progress store at the given path
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, ProgressError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let conn = Connection::open(&path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory store (tests, ephemeral embedding)
    pub fn in_memory() -> Result<Self, ProgressError> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Initialize the database schema
    fn init_schema(conn: &Connection) -> Result<(), ProgressError> {
        conn.execute_batch(
            r#"
            -- One row per (student, unit); the uniqueness constraint is
            -- the concurrency safety net for get-or-create
            CREATE TABLE IF NOT EXISTS progress (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                student_id TEXT NOT NULL,
                unit_id TEXT NOT NULL,
                unit_kind TEXT NOT NULL,
                is_unlocked INTEGER NOT NULL DEFAULT 0,
                unlocked_at TEXT,
                completion_percentage REAL NOT NULL DEFAULT 0,
                is_completed INTEGER NOT NULL DEFAULT 0,
                completed_at TEXT,
                view_count INTEGER NOT NULL DEFAULT 0,
                last_accessed TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(student_id, unit_id)
            );

            CREATE TABLE IF NOT EXISTS submissions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                student_id TEXT NOT NULL,
                assignment_id TEXT NOT NULL,
                attempt_number INTEGER NOT NULL,
                submitted_at TEXT NOT NULL,
                is_graded INTEGER NOT NULL DEFAULT 0,
                points_earned REAL,
                grade_percentage REAL,
                is_late INTEGER NOT NULL DEFAULT 0,
                UNIQUE(student_id, assignment_id, attempt_number)
            );

            CREATE INDEX IF NOT EXISTS idx_progress_student ON progress(student_id);
            CREATE INDEX IF NOT EXISTS idx_progress_unit ON progress(unit_id);
            CREATE INDEX IF NOT EXISTS idx_submissions_assignment
                ON submissions(student_id, assignment_id);
            "#,
        )?;
        Ok(())
    }

    /// Fetch the record for (student, unit), if one exists
    pub async fn get(
        &self,
        student: StudentId,
        unit: UnitId,
    ) -> Result<Option<ProgressRecord>, ProgressError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT student_id, unit_id, unit_kind, is_unlocked, unlocked_at,
                    completion_percentage, is_completed, completed_at,
                    view_count, last_accessed, created_at, updated_at
             FROM progress WHERE student_id = ?1 AND unit_id = ?2",
        )?;

        let record = stmt
            .query_row(params![student.to_string(), unit.to_string()], row_to_record)
            .optional()?;
        Ok(record)
    }

    /// Fetch or lazily create the record for (student, unit)
    ///
    /// New records start locked at 0%. `INSERT OR IGNORE` plus the
    /// uniqueness constraint makes concurrent calls converge on one row.
    pub async fn get_or_create(
        &self,
        student: StudentId,
        unit: UnitId,
        kind: UnitKind,
        now: DateTime<Utc>,
    ) -> Result<ProgressRecord, ProgressError> {
        let conn = self.conn.lock().await;
        ensure_row(&conn, student, unit, kind, now)?;

        let mut stmt = conn.prepare_cached(
            "SELECT student_id, unit_id, unit_kind, is_unlocked, unlocked_at,
                    completion_percentage, is_completed, completed_at,
                    view_count, last_accessed, created_at, updated_at
             FROM progress WHERE student_id = ?1 AND unit_id = ?2",
        )?;
        let record = stmt.query_row(params![student.to_string(), unit.to_string()], row_to_record)?;
        Ok(record)
    }

    /// Unlock a unit for a student, creating the record if needed
    ///
    /// Returns `true` only on the fresh edge; re-unlocking is a no-op,
    /// and `unlocked_at` is never overwritten.
    pub async fn mark_unlocked(
        &self,
        student: StudentId,
        unit: UnitId,
        kind: UnitKind,
        now: DateTime<Utc>,
    ) -> Result<bool, ProgressError> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        ensure_row(&tx, student, unit, kind, now)?;
        let changed = tx.execute(
            "UPDATE progress
             SET is_unlocked = 1, unlocked_at = ?3, updated_at = ?3
             WHERE student_id = ?1 AND unit_id = ?2 AND is_unlocked = 0",
            params![student.to_string(), unit.to_string(), now.to_rfc3339()],
        )?;
        tx.commit()?;

        if changed > 0 {
            debug!(%student, %unit, kind = %kind, "unit unlocked");
        }
        Ok(changed > 0)
    }

    /// Store a freshly computed completion percentage and, when the
    /// threshold is met, flip `is_completed` on its one-way edge
    ///
    /// Returns `true` only when this call performed the not-completed to
    /// completed transition. A unit that is already completed keeps its
    /// flag and `completed_at` even if the new measurement is lower.
    pub async fn apply_evaluation(
        &self,
        student: StudentId,
        unit: UnitId,
        kind: UnitKind,
        percentage: f64,
        meets_threshold: bool,
        now: DateTime<Utc>,
    ) -> Result<bool, ProgressError> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        ensure_row(&tx, student, unit, kind, now)?;
        tx.execute(
            "UPDATE progress SET completion_percentage = ?3, updated_at = ?4
             WHERE student_id = ?1 AND unit_id = ?2",
            params![
                student.to_string(),
                unit.to_string(),
                percentage,
                now.to_rfc3339()
            ],
        )?;

        let fresh = if meets_threshold {
            tx.execute(
                "UPDATE progress SET is_completed = 1, completed_at = ?3, updated_at = ?3
                 WHERE student_id = ?1 AND unit_id = ?2 AND is_completed = 0",
                params![student.to_string(), unit.to_string(), now.to_rfc3339()],
            )? > 0
        } else {
            false
        };
        tx.commit()?;

        if fresh {
            debug!(%student, %unit, kind = %kind, percentage, "unit completed");
        }
        Ok(fresh)
    }

    /// Record a view of a unit: bumps the counter and refreshes
    /// `last_accessed` without touching any gating state
    pub async fn record_view(
        &self,
        student: StudentId,
        unit: UnitId,
        kind: UnitKind,
        now: DateTime<Utc>,
    ) -> Result<(), ProgressError> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        ensure_row(&tx, student, unit, kind, now)?;
        tx.execute(
            "UPDATE progress
             SET view_count = view_count + 1, last_accessed = ?3, updated_at = ?3
             WHERE student_id = ?1 AND unit_id = ?2",
            params![student.to_string(), unit.to_string(), now.to_rfc3339()],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Administrative reset: delete every progress record for a student
    ///
    /// Graded submissions are kept — after re-initialization the next
    /// evaluation sees them again, exactly as for a fresh enrollment
    /// with prior grades on file.
    pub async fn reset_student(&self, student: StudentId) -> Result<usize, ProgressError> {
        let conn = self.conn.lock().await;
        let deleted = conn.execute(
            "DELETE FROM progress WHERE student_id = ?1",
            params![student.to_string()],
        )?;
        debug!(%student, deleted, "progress reset");
        Ok(deleted)
    }

    /// Administrative reset scoped to a set of units (one program)
    pub async fn reset_units(
        &self,
        student: StudentId,
        units: &[UnitId],
    ) -> Result<usize, ProgressError> {
        let conn = self.conn.lock().await;
        let mut deleted = 0;
        for unit in units {
            deleted += conn.execute(
                "DELETE FROM progress WHERE student_id = ?1 AND unit_id = ?2",
                params![student.to_string(), unit.to_string()],
            )?;
        }
        Ok(deleted)
    }

    /// Persist a submission attempt
    pub async fn record_submission(
        &self,
        submission: &AssignmentSubmission,
    ) -> Result<(), ProgressError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR REPLACE INTO submissions
             (student_id, assignment_id, attempt_number, submitted_at,
              is_graded, points_earned, grade_percentage, is_late)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                submission.student.to_string(),
                submission.assignment.to_string(),
                submission.attempt_number,
                submission.submitted_at.to_rfc3339(),
                submission.is_graded,
                submission.points_earned,
                submission.grade_percentage,
                submission.is_late,
            ],
        )?;
        Ok(())
    }

    /// Next free attempt number for (student, assignment)
    pub async fn next_attempt_number(
        &self,
        student: StudentId,
        assignment: UnitId,
    ) -> Result<u32, ProgressError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT COALESCE(MAX(attempt_number), 0) FROM submissions
             WHERE student_id = ?1 AND assignment_id = ?2",
        )?;
        let max: u32 = stmt.query_row(
            params![student.to_string(), assignment.to_string()],
            |row| row.get(0),
        )?;
        Ok(max + 1)
    }

    /// Whether any graded attempt reaches the passing threshold
    pub async fn has_passing_submission(
        &self,
        student: StudentId,
        assignment: UnitId,
        passing_grade: f64,
    ) -> Result<bool, ProgressError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT EXISTS(
                SELECT 1 FROM submissions
                WHERE student_id = ?1 AND assignment_id = ?2
                  AND is_graded = 1 AND grade_percentage >= ?3
             )",
        )?;
        let exists: bool = stmt.query_row(
            params![student.to_string(), assignment.to_string(), passing_grade],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Best graded percentage across attempts, if any
    pub async fn best_grade(
        &self,
        student: StudentId,
        assignment: UnitId,
    ) -> Result<Option<f64>, ProgressError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT MAX(grade_percentage) FROM submissions
             WHERE student_id = ?1 AND assignment_id = ?2 AND is_graded = 1",
        )?;
        let best: Option<f64> = stmt.query_row(
            params![student.to_string(), assignment.to_string()],
            |row| row.get(0),
        )?;
        Ok(best)
    }
}

/// Create the row if it does not exist yet; the uniqueness constraint
/// absorbs the race between two concurrent creators
fn ensure_row(
    conn: &Connection,
    student: StudentId,
    unit: UnitId,
    kind: UnitKind,
    now: DateTime<Utc>,
) -> Result<(), ProgressError> {
    conn.execute(
        "INSERT OR IGNORE INTO progress
         (student_id, unit_id, unit_kind, is_unlocked, unlocked_at,
          completion_percentage, is_completed, completed_at,
          view_count, last_accessed, created_at, updated_at)
         VALUES (?1, ?2, ?3, 0, NULL, 0, 0, NULL, 0, NULL, ?4, ?4)",
        params![
            student.to_string(),
            unit.to_string(),
            kind.as_str(),
            now.to_rfc3339()
        ],
    )?;
    Ok(())
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<ProgressRecord> {
    let student: String = row.get(0)?;
    let unit: String = row.get(1)?;
    let kind: String = row.get(2)?;
    let unlocked_at: Option<String> = row.get(4)?;
    let completed_at: Option<String> = row.get(7)?;
    let last_accessed: Option<String> = row.get(9)?;
    let created_at: String = row.get(10)?;
    let updated_at: String = row.get(11)?;

    Ok(ProgressRecord {
        student: StudentId(parse_uuid(&student, 0)?),
        unit: UnitId(parse_uuid(&unit, 1)?),
        kind: UnitKind::from_str_opt(&kind).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                2,
                rusqlite::types::Type::Text,
                format!("unknown unit kind '{kind}'").into(),
            )
        })?,
        is_unlocked: row.get(3)?,
        unlocked_at: unlocked_at.as_deref().map(|s| parse_timestamp(s, 4)).transpose()?,
        completion_percentage: row.get(5)?,
        is_completed: row.get(6)?,
        completed_at: completed_at.as_deref().map(|s| parse_timestamp(s, 7)).transpose()?,
        view_count: row.get(8)?,
        last_accessed: last_accessed
            .as_deref()
            .map(|s| parse_timestamp(s, 9))
            .transpose()?,
        created_at: parse_timestamp(&created_at, 10)?,
        updated_at: parse_timestamp(&updated_at, 11)?,
    })
}

fn parse_uuid(s: &str, column: usize) -> rusqlite::Result<uuid::Uuid> {
    uuid::Uuid::parse_str(s).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn parse_timestamp(s: &str, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                column,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
}
