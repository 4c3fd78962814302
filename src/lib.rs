//! Academy Progress - progressive access and completion gating
//!
//! The core engine behind the academy learning platform:
//! - Durable per-student progress records (SQLite)
//! - Completion evaluation for lessons, topics and modules
//! - Prerequisite-aware access gating with lazy first-unit unlock
//! - The unlock cascade reacting to completion events
//! - Read-only progression projections for dashboards
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use academy_progress::{
//!     ContentCatalog, CourseModule, InMemoryEnrollmentService, ProgressConfig,
//!     ProgressiveAccessManager, SqliteProgressStore,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let catalog = Arc::new(ContentCatalog::builder()
//!         .module(CourseModule::new(program, "Foundations", "GCA-M101", 1))
//!         .build()?);
//!     let store = Arc::new(SqliteProgressStore::open("progress.db").await?);
//!     let manager = ProgressiveAccessManager::new(
//!         catalog, store, enrollment, ProgressConfig::default());
//!     manager.initialize_enrollment(student, program).await?;
//!     Ok(())
//! }
//! ```

// Core modules (order matters for cross-module dependencies)
pub mod types;
pub mod error;
pub mod clock;
pub mod config;
pub mod content;
pub mod enrollment;
pub mod submissions;
pub mod notify;
pub mod progress;

// Re-export commonly used types for convenience
pub use types::{ProgramId, StudentId, UnitId, UnitKind, UnitRef, UnitStatus};

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::ProgressConfig;
pub use error::{CatalogError, ProgressError};

pub use content::{
    Assignment, AssignmentParent, CatalogBuilder, ContentCatalog, CourseModule, Lesson,
    ResourceItem, ResourceKind, Topic,
};

pub use enrollment::{
    Enrollment, EnrollmentService, EnrollmentStatus, InMemoryEnrollmentService,
};

pub use notify::{Notifier, NoopNotifier, ProgressEvent};
pub use submissions::AssignmentSubmission;

pub use progress::{
    AccessGate, CascadeOutcome, CompletionEvaluator, Evaluation, MissingPrerequisite,
    ModuleSummary, NextAction, PrerequisiteStatus, ProgramSummary, ProgressionEntry,
    ProgressRecord, ProgressiveAccessManager, RecalculationReport, RequiredItem,
    SqliteProgressStore, UnlockCascade,
};
