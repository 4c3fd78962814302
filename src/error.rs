//! Error taxonomy for the progress engine
//!
//! Access denials (missing enrollment, locked units, inactive content)
//! are answers, not errors; they surface as `false` or `Locked` status.
//! Only genuinely exceptional conditions reach this module: unknown
//! units, catalog misconfiguration and store failures.

use thiserror::Error;

use crate::types::UnitId;

/// Errors returned by the progress engine at runtime
#[derive(Debug, Error)]
pub enum ProgressError {
    /// The referenced unit does not exist in the content catalog
    #[error("unknown content unit {0}")]
    UnitNotFound(UnitId),

    /// The persistence layer failed; the caller may retry, the engine
    /// re-derives state from the store so at-least-once retries are safe
    #[error("progress store unavailable: {0}")]
    Store(#[from] rusqlite::Error),

    /// Filesystem failure while opening or creating the store
    #[error("progress store I/O failure: {0}")]
    Io(#[from] std::io::Error),

    /// The external enrollment service failed while being consulted
    #[error("enrollment service failure: {0}")]
    Enrollment(#[source] anyhow::Error),
}

/// Errors detected while building a content catalog
///
/// All of these are configuration-time failures. Runtime code assumes a
/// validated catalog, in particular an acyclic prerequisite graph.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("unit {0} is declared more than once")]
    DuplicateUnit(UnitId),

    #[error("unit {child} references unknown parent {parent}")]
    UnknownParent { child: UnitId, parent: UnitId },

    #[error("unit {unit} references unknown prerequisite {prerequisite}")]
    UnknownPrerequisite { unit: UnitId, prerequisite: UnitId },

    #[error("unit {unit} has a prerequisite of a different granularity: {prerequisite}")]
    MismatchedPrerequisite { unit: UnitId, prerequisite: UnitId },

    #[error("unit {0} lists itself as a prerequisite")]
    SelfPrerequisite(UnitId),

    #[error("prerequisite cycle involving unit {0}")]
    PrerequisiteCycle(UnitId),

    #[error("unit {unit} duplicates sequence order {order} under its parent")]
    DuplicateSequenceOrder { unit: UnitId, order: u32 },
}
